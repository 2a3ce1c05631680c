use crate::coverage::session::Instrumenter;
use crate::types::errors::Error;
use crate::types::models::{RawFileCoverage, RawFunctionCoverage};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable that makes Node.js write coverage dumps to a directory
pub const COVERAGE_ENV: &str = "NODE_V8_COVERAGE";

/// One dump file as written by the V8 profiler
#[derive(Debug, Deserialize)]
struct CoverageDump {
    result: Vec<ScriptCoverage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScriptCoverage {
    url: String,
    functions: Vec<RawFunctionCoverage>,
}

/// Instrumenter backed by a directory of V8 coverage dumps.
///
/// Starting clears the directory; stopping parses every dump found in it.
/// The processes being measured write the dumps themselves when
/// [`COVERAGE_ENV`] points at the directory.
#[derive(Debug, Clone)]
pub struct DumpCollector {
    dir: PathBuf,
}

impl DumpCollector {
    pub fn new(dir: &Path) -> Self {
        DumpCollector {
            dir: dir.to_path_buf(),
        }
    }

    fn dump_files(&self) -> Result<Vec<PathBuf>, Error> {
        let mut dumps = Vec::new();
        if !self.dir.exists() {
            return Ok(dumps);
        }
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
                dumps.push(path);
            }
        }
        dumps.sort();
        Ok(dumps)
    }
}

impl Instrumenter for DumpCollector {
    fn start(&mut self) -> Result<(), Error> {
        fs::create_dir_all(&self.dir)?;
        for dump in self.dump_files()? {
            debug!("Removing stale dump {}", dump.display());
            fs::remove_file(&dump)?;
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<Vec<RawFileCoverage>, Error> {
        let mut coverage = Vec::new();
        for dump in self.dump_files()? {
            let content = fs::read_to_string(&dump)?;
            let parsed: CoverageDump = match serde_json::from_str(&content) {
                Ok(parsed) => parsed,
                Err(e) => {
                    // Not a coverage dump
                    warn!("Ignoring '{}': {}", dump.display(), e);
                    continue;
                }
            };
            coverage.extend(parsed.result.into_iter().map(|script| RawFileCoverage {
                url: script.url,
                functions: script.functions,
            }));
        }
        debug!(
            "Read {} script entries from {}",
            coverage.len(),
            self.dir.display()
        );
        Ok(coverage)
    }
}
