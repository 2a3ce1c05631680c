use crate::filter::{FileFilter, FilterConfig};
use crate::types::errors::Error;
use crate::utils::paths::{absolutize, contains_path};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Reporter name that exposes the raw instrumentation data instead of rendering
pub const RAW_REPORTER: &str = "raw";

/// Options for a single `get_coverage` request, as given by the caller
///
/// Every field has a default, so a JSON options file only needs to name
/// the fields it changes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Options {
    /// Starting directory for files that need coverage, defaults to the current directory
    pub root_dir: Option<PathBuf>,
    /// Wildcard patterns of files to leave out of the report
    pub exclude: Vec<String>,
    /// Extension of the measured source files
    pub extension: String,
    /// Include project files the instrumentation never saw
    pub all: bool,
    /// Synthesize a zero-count whole-file block so every line is reported
    pub force_line_mode: bool,
    /// Reconcile observed coverage with a baseline collected in a worker process
    pub reload: bool,
    /// Directory the reporters write to, defaults to a fresh temporary directory
    pub coverage_directory: Option<PathBuf>,
    /// Delete the coverage directory once the results are returned
    pub delete_coverage: bool,
    /// Return the rendered artifacts instead of a bare success flag
    #[serde(rename = "return")]
    pub return_results: bool,
    /// Return artifacts as streams instead of strings
    pub stream: bool,
    /// Idle time after which an unconsumed stream is destroyed
    pub stream_timeout_ms: u64,
    pub reporters: Vec<String>,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            root_dir: None,
            exclude: vec!["**/node_modules/**".to_string()],
            extension: ".js".to_string(),
            all: false,
            force_line_mode: false,
            reload: false,
            coverage_directory: None,
            delete_coverage: true,
            return_results: true,
            stream: false,
            stream_timeout_ms: 5000,
            reporters: vec!["text".to_string()],
        }
    }
}

/// Options with every default filled in and every path made absolute
#[derive(Debug, Clone)]
pub struct ResolvedOptions {
    pub root_dir: PathBuf,
    pub exclude: Vec<String>,
    pub extension: String,
    pub all: bool,
    pub force_line_mode: bool,
    pub reload: bool,
    /// `None` means a fresh temporary directory, created by the pipeline
    pub coverage_dir: Option<PathBuf>,
    pub delete_coverage: bool,
    pub return_results: bool,
    pub stream: bool,
    pub stream_timeout: Duration,
    pub reporters: Vec<String>,
}

impl Options {
    /// Load options from a JSON file
    pub fn from_json_file(path: &std::path::Path) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read options file '{}': {}", path.display(), e))
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Fill in defaults and validate.
    ///
    /// Fails when the coverage directory is the root directory or one of its
    /// ancestors, since it gets deleted after reporting.
    pub fn resolve(&self) -> Result<ResolvedOptions, Error> {
        let cwd = std::env::current_dir()?;
        let root_dir = absolutize(self.root_dir.as_deref().unwrap_or(&cwd), &cwd);

        let coverage_dir = match &self.coverage_directory {
            Some(dir) => {
                let dir = absolutize(dir, &cwd);
                check_output_dir(&dir, &root_dir)?;
                Some(dir)
            }
            None => None,
        };

        let reporters = if self.reporters.is_empty() {
            vec!["text".to_string()]
        } else {
            self.reporters.clone()
        };

        Ok(ResolvedOptions {
            root_dir,
            exclude: self.exclude.clone(),
            extension: self.extension.clone(),
            all: self.all,
            force_line_mode: self.force_line_mode,
            reload: self.reload,
            coverage_dir,
            delete_coverage: self.delete_coverage,
            return_results: self.return_results,
            stream: self.stream,
            stream_timeout: Duration::from_millis(self.stream_timeout_ms),
            reporters,
        })
    }
}

fn check_output_dir(coverage_dir: &std::path::Path, root_dir: &std::path::Path) -> Result<(), Error> {
    if contains_path(coverage_dir, root_dir) {
        return Err(Error::Config(format!(
            "coverage directory '{}' must not be the root directory '{}' or contain it",
            coverage_dir.display(),
            root_dir.display()
        )));
    }
    Ok(())
}

impl ResolvedOptions {
    pub fn filter(&self) -> FileFilter {
        self.filter_config().build()
    }

    pub fn filter_config(&self) -> FilterConfig {
        FilterConfig {
            root_dir: self.root_dir.clone(),
            exclude: self.exclude.clone(),
            extension: self.extension.clone(),
        }
    }

    /// Whether the debug reporter asking for raw coverage was requested
    pub fn wants_raw(&self) -> bool {
        self.reporters.iter().any(|r| r == RAW_REPORTER)
    }
}
