use crate::reporters::{COBERTURA_FILE, RendererRegistry};
use crate::types::errors::Error;
use crate::types::models::{CoverageMap, RawFileCoverage};
use crate::types::options::{RAW_REPORTER, ResolvedOptions};
use crate::utils::cleanup::WorkDir;
use crate::utils::io::fix_cobertura_report;
use crate::utils::paths::artifact_name;
use crate::utils::stream::ArtifactStream;
use std::collections::BTreeMap;
use std::fs;
use std::sync::Arc;
use tracing::{debug, info};

/// One rendered file handed back to the caller
#[derive(Debug)]
pub enum Artifact {
    Text(String),
    Stream(ArtifactStream),
}

impl Artifact {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Artifact::Text(text) => Some(text),
            Artifact::Stream(_) => None,
        }
    }

    /// The artifact's content, reading a stream to its end
    pub fn into_string(self) -> std::io::Result<String> {
        match self {
            Artifact::Text(text) => Ok(text),
            Artifact::Stream(stream) => stream.into_string(),
        }
    }
}

/// Rendered artifacts by file name, plus the raw coverage when the `raw`
/// reporter was requested
#[derive(Debug, Default)]
pub struct Artifacts {
    pub files: BTreeMap<String, Artifact>,
    pub raw: Option<Vec<RawFileCoverage>>,
}

impl Artifacts {
    pub fn get(&self, name: &str) -> Option<&Artifact> {
        self.files.get(name)
    }

    pub fn take(&mut self, name: &str) -> Option<Artifact> {
        self.files.remove(name)
    }
}

/// Result of a coverage request
#[derive(Debug)]
pub enum CoverageOutput {
    /// Reports were written to the coverage directory
    Written,
    Artifacts(Artifacts),
}

impl CoverageOutput {
    pub fn artifacts(self) -> Option<Artifacts> {
        match self {
            CoverageOutput::Written => None,
            CoverageOutput::Artifacts(artifacts) => Some(artifacts),
        }
    }
}

/// Runs the configured reporters against a coverage map
pub struct ReportPipeline<'a> {
    registry: &'a RendererRegistry,
    options: &'a ResolvedOptions,
}

impl<'a> ReportPipeline<'a> {
    pub fn new(registry: &'a RendererRegistry, options: &'a ResolvedOptions) -> Self {
        ReportPipeline { registry, options }
    }

    pub fn run(
        &self,
        map: &CoverageMap,
        raw: Option<Vec<RawFileCoverage>>,
    ) -> Result<CoverageOutput, Error> {
        let delete = self.options.delete_coverage;
        let workdir = Arc::new(match &self.options.coverage_dir {
            Some(dir) => WorkDir::create(dir, delete)?,
            None => WorkDir::temporary(delete)?,
        });

        for name in &self.options.reporters {
            if name == RAW_REPORTER {
                continue;
            }
            let renderer = self.registry.get(name).ok_or_else(|| {
                Error::Config(format!("unknown reporter '{}'", name))
            })?;
            debug!("Running reporter {}", name);
            renderer.render(map, workdir.path())?;
        }

        let entries = self.artifact_paths(&workdir)?;
        for path in &entries {
            if artifact_name(path).is_some_and(|name| name.contains(COBERTURA_FILE))
                && fix_cobertura_report(path)?
            {
                debug!("Escaped computed markers in {}", path.display());
            }
        }

        if !self.options.return_results {
            info!("Coverage written to {}", workdir.path().display());
            return Ok(CoverageOutput::Written);
        }

        let mut artifacts = Artifacts {
            files: BTreeMap::new(),
            raw,
        };
        for path in entries {
            let Some(name) = artifact_name(&path) else {
                continue;
            };
            let artifact = if self.options.stream {
                Artifact::Stream(ArtifactStream::open(
                    &path,
                    Arc::clone(&workdir),
                    self.options.stream_timeout,
                )?)
            } else {
                Artifact::Text(fs::read_to_string(&path)?)
            };
            artifacts.files.insert(name, artifact);
        }
        // Streams still hold the directory; it goes away after the last one
        Ok(CoverageOutput::Artifacts(artifacts))
    }

    /// Top-level files of the coverage directory; subdirectories are skipped
    fn artifact_paths(&self, workdir: &WorkDir) -> Result<Vec<std::path::PathBuf>, Error> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(workdir.path())? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                paths.push(entry.path());
            }
        }
        paths.sort();
        Ok(paths)
    }
}
