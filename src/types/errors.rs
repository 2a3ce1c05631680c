use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Formatting error: {0}")]
    Fmt(#[from] std::fmt::Error),

    #[error("Invalid options: {0}")]
    Config(String),

    #[error("You need to start coverage first!")]
    NotStarted,

    #[error("Failed to load '{}': {reason}", path.display())]
    Load { path: PathBuf, reason: String },

    #[error(
        "Branch '{id}' in '{file}' has {found} arms but {expected} were already recorded"
    )]
    BranchArity {
        file: String,
        id: u32,
        expected: usize,
        found: usize,
    },

    #[error("Invalid file URL: {0}")]
    InvalidUrl(String),

    #[error("Baseline worker failed: {0}")]
    WorkerFailed(String),

    #[error("Baseline worker did not reply within {0:?}")]
    WorkerTimeout(Duration),
}
