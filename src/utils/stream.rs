use crate::utils::cleanup::WorkDir;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStatus {
    Open,
    /// Read to the end by the consumer
    Drained,
    /// Dropped by the consumer
    Closed,
    /// Closed by the idle watchdog
    Destroyed,
}

#[derive(Debug)]
struct StreamState {
    status: StreamStatus,
    file: Option<File>,
    dir: Option<Arc<WorkDir>>,
}

impl StreamState {
    fn finish(&mut self, status: StreamStatus) {
        if self.status == StreamStatus::Open {
            self.status = status;
        }
        self.file = None;
        self.dir = None;
    }
}

#[derive(Debug)]
struct Shared {
    state: Mutex<StreamState>,
    finished: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, StreamState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A rendered artifact handed out as a reader.
///
/// Unless the consumer reads it to the end or drops it within the idle
/// timeout, the stream is destroyed and further reads fail. The stream keeps
/// the coverage directory alive until it is finished one way or the other.
#[derive(Debug)]
pub struct ArtifactStream {
    shared: Arc<Shared>,
}

impl ArtifactStream {
    pub fn open(path: &Path, dir: Arc<WorkDir>, idle_timeout: Duration) -> io::Result<Self> {
        let file = File::open(path)?;
        let shared = Arc::new(Shared {
            state: Mutex::new(StreamState {
                status: StreamStatus::Open,
                file: Some(file),
                dir: Some(dir),
            }),
            finished: Condvar::new(),
        });

        let watchdog = Arc::clone(&shared);
        let name = path.display().to_string();
        thread::spawn(move || {
            let state = watchdog.lock();
            let (mut state, _) = watchdog
                .finished
                .wait_timeout_while(state, idle_timeout, |s| s.status == StreamStatus::Open)
                .unwrap_or_else(PoisonError::into_inner);
            if state.status == StreamStatus::Open {
                debug!("Destroying unconsumed stream {}", name);
                state.finish(StreamStatus::Destroyed);
            }
        });

        Ok(ArtifactStream { shared })
    }

    pub fn status(&self) -> StreamStatus {
        self.shared.lock().status
    }

    pub fn is_destroyed(&self) -> bool {
        self.status() == StreamStatus::Destroyed
    }

    /// Read everything that is left into a string
    pub fn into_string(mut self) -> io::Result<String> {
        let mut content = String::new();
        self.read_to_string(&mut content)?;
        Ok(content)
    }

    fn finish(&self, status: StreamStatus) {
        self.shared.lock().finish(status);
        self.shared.finished.notify_all();
    }
}

impl Read for ArtifactStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = {
            let mut guard = self.shared.lock();
            let state = &mut *guard;
            match (&mut state.file, state.status) {
                (Some(file), _) => file.read(buf)?,
                (None, StreamStatus::Destroyed) => {
                    return Err(io::Error::new(
                        io::ErrorKind::BrokenPipe,
                        "stream destroyed after idle timeout",
                    ));
                }
                (None, _) => return Ok(0),
            }
        };
        if read == 0 && !buf.is_empty() {
            self.finish(StreamStatus::Drained);
        }
        Ok(read)
    }
}

impl Drop for ArtifactStream {
    fn drop(&mut self) {
        self.finish(StreamStatus::Closed);
    }
}
