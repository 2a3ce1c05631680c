use crate::coverage::baseline::{BaselineSource, ModuleRegistry, collect_baseline};
use crate::filter::FilterConfig;
use crate::types::errors::Error;
use crate::types::models::RawFileCoverage;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdout, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Request sent to a baseline worker as a single JSON line on stdin
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BaselineRequest {
    pub files: Vec<PathBuf>,
    #[serde(flatten)]
    pub filter: FilterConfig,
}

/// Reply written by a baseline worker as a single JSON line on stdout
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum BaselineReply {
    Ok { coverage: Vec<RawFileCoverage> },
    Error { message: String },
}

/// Collects the baseline in a child process speaking the JSON line protocol.
///
/// A child that crashes, exits non-zero, answers garbage or does not answer
/// within the timeout fails the whole request; a silent child is killed.
#[derive(Debug, Clone)]
pub struct WorkerProcess {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl WorkerProcess {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        WorkerProcess {
            program: program.into(),
            args: Vec::new(),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn spawn(&self) -> Result<Child, Error> {
        Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                Error::WorkerFailed(format!(
                    "failed to spawn '{}': {}",
                    self.program.display(),
                    e
                ))
            })
    }
}

fn terminate(child: &mut Child) {
    if let Err(e) = child.kill() {
        debug!("Failed to kill baseline worker: {}", e);
    }
    let _ = child.wait();
}

fn wait_until(child: &mut Child, deadline: Instant, timeout: Duration) -> Result<ExitStatus, Error> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        if Instant::now() >= deadline {
            warn!("Baseline worker did not exit in time, killing it");
            terminate(child);
            return Err(Error::WorkerTimeout(timeout));
        }
        thread::sleep(Duration::from_millis(10));
    }
}

fn read_reply(stdout: ChildStdout) -> mpsc::Receiver<std::io::Result<String>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut line = String::new();
        let result = BufReader::new(stdout).read_line(&mut line).map(|_| line);
        let _ = tx.send(result);
    });
    rx
}

impl BaselineSource for WorkerProcess {
    fn collect(
        &self,
        files: &[PathBuf],
        filter: &FilterConfig,
    ) -> Result<Vec<RawFileCoverage>, Error> {
        let request = serde_json::to_string(&BaselineRequest {
            files: files.to_vec(),
            filter: filter.clone(),
        })?;

        let deadline = Instant::now() + self.timeout;
        let mut child = self.spawn()?;
        debug!("Spawned baseline worker {} for {} files", child.id(), files.len());

        if let Some(mut stdin) = child.stdin.take() {
            // Written from a thread: a worker that never reads must not block us
            thread::spawn(move || {
                if let Err(e) = writeln!(stdin, "{}", request) {
                    debug!("Failed to send baseline request: {}", e);
                }
            });
        }

        let Some(stdout) = child.stdout.take() else {
            terminate(&mut child);
            return Err(Error::WorkerFailed("worker stdout unavailable".to_string()));
        };

        let remaining = deadline.saturating_duration_since(Instant::now());
        let reply = match read_reply(stdout).recv_timeout(remaining) {
            Ok(Ok(line)) => line,
            Ok(Err(e)) => {
                terminate(&mut child);
                return Err(Error::Io(e));
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!("Baseline worker {} did not reply, killing it", child.id());
                terminate(&mut child);
                return Err(Error::WorkerTimeout(self.timeout));
            }
            Err(RecvTimeoutError::Disconnected) => {
                terminate(&mut child);
                return Err(Error::WorkerFailed("reply reader exited".to_string()));
            }
        };

        let status = wait_until(&mut child, deadline, self.timeout)?;
        if reply.trim().is_empty() {
            return Err(Error::WorkerFailed(format!(
                "worker exited with {} without replying",
                status
            )));
        }
        if !status.success() {
            return Err(Error::WorkerFailed(format!("worker exited with {}", status)));
        }

        match serde_json::from_str(&reply)? {
            BaselineReply::Ok { coverage } => Ok(coverage),
            BaselineReply::Error { message } => Err(Error::WorkerFailed(message)),
        }
    }
}

/// Worker side of the protocol: answer one request read from `input`.
///
/// Embedders call this from the binary they hand to [`WorkerProcess`], with
/// their modules registered. A failed collection is reported to the parent
/// and returned, so the worker can exit non-zero.
pub fn serve_baseline(
    mut input: impl BufRead,
    mut output: impl Write,
    registry: &ModuleRegistry,
) -> Result<(), Error> {
    let mut line = String::new();
    input.read_line(&mut line)?;

    let result = serde_json::from_str::<BaselineRequest>(&line)
        .map_err(Error::from)
        .and_then(|request| collect_baseline(&request.files, &request.filter, registry));

    let (reply, outcome) = match result {
        Ok(coverage) => (BaselineReply::Ok { coverage }, Ok(())),
        Err(e) => (
            BaselineReply::Error {
                message: e.to_string(),
            },
            Err(e),
        ),
    };
    writeln!(output, "{}", serde_json::to_string(&reply)?)?;
    output.flush()?;
    outcome
}
