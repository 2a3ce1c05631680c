// src/reporters.rs
pub mod cobertura;
pub mod json;
pub mod lcov;
pub mod text;

use crate::types::errors::Error;
use crate::types::models::CoverageMap;
use crate::types::options::RAW_REPORTER;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub use cobertura::{COBERTURA_FILE, CoberturaReport};
pub use json::{JsonReport, JsonSummaryReport};
pub use lcov::LcovReport;
pub use text::{TextReport, TextSummaryReport};

/// Writes one output format for a coverage map into a directory
pub trait Renderer: Send + Sync {
    fn render(&self, map: &CoverageMap, dir: &Path) -> Result<(), Error>;
}

/// Renderers by reporter name
pub struct RendererRegistry {
    renderers: BTreeMap<String, Box<dyn Renderer>>,
}

impl Default for RendererRegistry {
    fn default() -> Self {
        let mut registry = RendererRegistry::empty();
        registry.register("text", TextReport::new("text"));
        registry.register("text-summary", TextSummaryReport::new("text-summary"));
        registry.register("json", JsonReport);
        registry.register("json-summary", JsonSummaryReport);
        registry.register("lcovonly", LcovReport);
        registry.register("cobertura", CoberturaReport);
        registry
    }
}

impl RendererRegistry {
    pub fn empty() -> Self {
        RendererRegistry {
            renderers: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, name: &str, renderer: impl Renderer + 'static) {
        self.renderers.insert(name.to_string(), Box::new(renderer));
    }

    pub fn get(&self, name: &str) -> Option<&dyn Renderer> {
        self.renderers.get(name).map(|r| &**r)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.renderers.keys().map(String::as_str)
    }

    /// Fail on the first reporter name nothing is registered for
    pub fn check(&self, reporters: &[String]) -> Result<(), Error> {
        for name in reporters {
            if name != RAW_REPORTER && !self.renderers.contains_key(name) {
                return Err(Error::Config(format!(
                    "unknown reporter '{}', expected one of: {}",
                    name,
                    self.names().collect::<Vec<_>>().join(", ")
                )));
            }
        }
        Ok(())
    }
}

/// Deepest directory containing every file of the map
pub(crate) fn common_root(map: &CoverageMap) -> PathBuf {
    let mut parents = map
        .files
        .keys()
        .map(|path| Path::new(path).parent().unwrap_or(Path::new("")));
    let Some(first) = parents.next() else {
        return PathBuf::new();
    };
    let mut root = first.to_path_buf();
    for parent in parents {
        while !parent.starts_with(&root) {
            if !root.pop() {
                return PathBuf::new();
            }
        }
    }
    root
}

/// `path` relative to `root`, for display
pub(crate) fn relative(path: &str, root: &Path) -> String {
    Path::new(path)
        .strip_prefix(root)
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|_| path.to_string())
}
