use crate::types::errors::Error;
use crate::types::models::{RawFileCoverage, RawFunctionCoverage, RawRange};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;
use url::Url;

/// Something that can record per-range execution counts
pub trait Instrumenter: Send {
    /// Begin recording, discarding anything recorded before
    fn start(&mut self) -> Result<(), Error>;

    /// Stop recording and hand over what was recorded
    fn stop(&mut self) -> Result<Vec<RawFileCoverage>, Error>;
}

/// Owns the single active recording of an instrumenter.
///
/// Starting while a recording is active stops it and throws its data away.
pub struct CoverageSession {
    instrumenter: Box<dyn Instrumenter>,
    active: bool,
}

impl CoverageSession {
    pub fn new(instrumenter: impl Instrumenter + 'static) -> Self {
        CoverageSession {
            instrumenter: Box::new(instrumenter),
            active: false,
        }
    }

    /// Wrap an instrumenter that is already recording, e.g. a dump directory
    /// another process has been writing to
    pub fn attach(instrumenter: impl Instrumenter + 'static) -> Self {
        CoverageSession {
            instrumenter: Box::new(instrumenter),
            active: true,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn start(&mut self) -> Result<(), Error> {
        if self.active {
            debug!("Coverage session already started, restarting it");
            let discarded = self.instrumenter.stop()?;
            debug!("Discarded coverage of {} files", discarded.len());
            self.active = false;
        }
        self.instrumenter.start()?;
        self.active = true;
        debug!("Started instrumenting");
        Ok(())
    }

    /// Stop the active recording and return its data
    pub fn take(&mut self) -> Result<Vec<RawFileCoverage>, Error> {
        if !self.active {
            return Err(Error::NotStarted);
        }
        self.active = false;
        let coverage = self.instrumenter.stop()?;
        debug!("Stopped instrumenting, {} files recorded", coverage.len());
        Ok(coverage)
    }
}

#[derive(Debug, Default)]
struct RecorderState {
    recording: bool,
    files: BTreeMap<String, Vec<RawFunctionCoverage>>,
}

fn lock(state: &Mutex<RecorderState>) -> MutexGuard<'_, RecorderState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-process instrumenter: instrumented code reports hits through a [`Probe`]
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    state: Arc<Mutex<RecorderState>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn probe(&self) -> Probe {
        Probe {
            state: Arc::clone(&self.state),
        }
    }
}

impl Instrumenter for Recorder {
    fn start(&mut self) -> Result<(), Error> {
        let mut state = lock(&self.state);
        state.files.clear();
        state.recording = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<Vec<RawFileCoverage>, Error> {
        let mut state = lock(&self.state);
        state.recording = false;
        let files = std::mem::take(&mut state.files);
        Ok(files
            .into_iter()
            .map(|(url, functions)| RawFileCoverage { url, functions })
            .collect())
    }
}

/// Handle through which running code reports executed ranges to a [`Recorder`]
#[derive(Debug, Clone)]
pub struct Probe {
    state: Arc<Mutex<RecorderState>>,
}

impl Probe {
    /// Record one execution of `start..end` inside `function_name` of `file`.
    /// The empty name stands for the file's top-level code.
    pub fn hit(&self, file: &Path, function_name: &str, start: u64, end: u64) {
        let Ok(url) = Url::from_file_path(file) else {
            debug!("Ignoring hit in non-absolute path {}", file.display());
            return;
        };

        let mut state = lock(&self.state);
        if !state.recording {
            return;
        }

        let functions = state.files.entry(url.to_string()).or_default();
        let function = match functions
            .iter_mut()
            .position(|f| f.function_name == function_name)
        {
            Some(index) => &mut functions[index],
            None => {
                functions.push(RawFunctionCoverage {
                    function_name: function_name.to_string(),
                    ranges: Vec::new(),
                    is_block_coverage: true,
                });
                let last = functions.len() - 1;
                &mut functions[last]
            }
        };

        match function.ranges.iter_mut().find(|r| r.span() == (start, end)) {
            Some(range) => range.count += 1,
            None => function.ranges.push(RawRange::new(start, end, 1)),
        }
    }

    pub fn is_recording(&self) -> bool {
        lock(&self.state).recording
    }
}
