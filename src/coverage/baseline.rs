use crate::coverage::session::{Instrumenter, Probe, Recorder};
use crate::filter::FilterConfig;
use crate::types::errors::Error;
use crate::types::models::{RawFileCoverage, RawFunctionCoverage};
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// An exported function, called without arguments
pub type Callable = Arc<dyn Fn(&Probe) -> Result<(), Error> + Send + Sync>;

#[derive(Clone)]
pub enum ExportValue {
    Callable(Callable),
    Value(serde_json::Value),
}

#[derive(Clone)]
pub struct Export {
    pub name: String,
    pub value: ExportValue,
}

impl Export {
    pub fn function(
        name: &str,
        f: impl Fn(&Probe) -> Result<(), Error> + Send + Sync + 'static,
    ) -> Self {
        Export {
            name: name.to_string(),
            value: ExportValue::Callable(Arc::new(f)),
        }
    }

    pub fn value(name: &str, value: serde_json::Value) -> Self {
        Export {
            name: name.to_string(),
            value: ExportValue::Value(value),
        }
    }
}

impl fmt::Debug for Export {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            ExportValue::Callable(_) => write!(f, "Export({}: fn)", self.name),
            ExportValue::Value(v) => write!(f, "Export({}: {})", self.name, v),
        }
    }
}

/// Whatever a module obtained from one of its imports
pub trait Binding {
    fn get(&self, property: &str) -> Box<dyn Binding>;
    fn call(&self) -> Box<dyn Binding>;
}

/// Capability a module uses to resolve its own imports
pub trait Imports {
    fn import(&self, specifier: &str) -> Box<dyn Binding>;
}

/// Inert binding: every property and every call yields another `NullBinding`
#[derive(Debug, Clone)]
pub struct NullBinding {
    specifier: String,
}

impl Binding for NullBinding {
    fn get(&self, property: &str) -> Box<dyn Binding> {
        debug!("{}: tried to access prop {}", self.specifier, property);
        Box::new(self.clone())
    }

    fn call(&self) -> Box<dyn Binding> {
        Box::new(self.clone())
    }
}

/// Imports that never load anything, so only the module's own code runs
#[derive(Debug, Default, Clone, Copy)]
pub struct StubImports;

impl Imports for StubImports {
    fn import(&self, specifier: &str) -> Box<dyn Binding> {
        debug!("Attempted to import {}", specifier);
        Box::new(NullBinding {
            specifier: specifier.to_string(),
        })
    }
}

/// A loadable unit of instrumented code
pub trait Module: Send + Sync {
    /// Run the module's top-level code and return its exports
    fn evaluate(&self, imports: &dyn Imports, probe: &Probe) -> Result<Vec<Export>, Error>;
}

type Loaded = Arc<Vec<Export>>;

/// Known modules by path, plus the cache of the ones already loaded
#[derive(Default)]
pub struct ModuleRegistry {
    modules: BTreeMap<PathBuf, Arc<dyn Module>>,
    cache: Mutex<HashMap<PathBuf, Loaded>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, path: &Path, module: impl Module + 'static) {
        self.modules.insert(path.to_path_buf(), Arc::new(module));
    }

    fn cache(&self) -> MutexGuard<'_, HashMap<PathBuf, Loaded>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Load a module once; later calls return the cached exports
    pub fn require(
        &self,
        path: &Path,
        imports: &dyn Imports,
        probe: &Probe,
    ) -> Result<Loaded, Error> {
        if let Some(loaded) = self.cache().get(path) {
            return Ok(Arc::clone(loaded));
        }
        let loaded = Arc::new(self.load_fresh(path, imports, probe)?);
        self.cache()
            .insert(path.to_path_buf(), Arc::clone(&loaded));
        Ok(loaded)
    }

    pub fn is_cached(&self, path: &Path) -> bool {
        self.cache().contains_key(path)
    }

    /// Evaluate a module, bypassing the cache
    pub fn load_fresh(
        &self,
        path: &Path,
        imports: &dyn Imports,
        probe: &Probe,
    ) -> Result<Vec<Export>, Error> {
        let module = self.modules.get(path).ok_or_else(|| Error::Load {
            path: path.to_path_buf(),
            reason: "module is not registered".to_string(),
        })?;
        module.evaluate(imports, probe)
    }
}

/// Evicts a cache entry and puts it back when dropped
struct CacheRestore<'a> {
    registry: &'a ModuleRegistry,
    path: &'a Path,
    prior: Option<Loaded>,
}

impl<'a> CacheRestore<'a> {
    fn evict(registry: &'a ModuleRegistry, path: &'a Path) -> Self {
        let prior = registry.cache().remove(path);
        CacheRestore {
            registry,
            path,
            prior,
        }
    }
}

impl Drop for CacheRestore<'_> {
    fn drop(&mut self) {
        let mut cache = self.registry.cache();
        match self.prior.take() {
            Some(prior) => {
                cache.insert(self.path.to_path_buf(), prior);
            }
            None => {
                cache.remove(self.path);
            }
        }
    }
}

fn describe_panic(payload: Box<dyn std::any::Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panic".to_string())
}

/// Load every file with stubbed imports, call all of its exported
/// functions, and return the recorded coverage with every count set to zero.
///
/// A file failing to load, or an export failing when called, is logged and
/// does not stop the pass.
pub fn collect_baseline(
    files: &[PathBuf],
    filter: &FilterConfig,
    registry: &ModuleRegistry,
) -> Result<Vec<RawFileCoverage>, Error> {
    let mut recorder = Recorder::new();
    recorder.start()?;
    let probe = recorder.probe();

    for file in files {
        let _restore = CacheRestore::evict(registry, file);
        let loaded = panic::catch_unwind(AssertUnwindSafe(|| {
            registry.load_fresh(file, &StubImports, &probe)
        }));
        let exports = match loaded {
            Ok(Ok(exports)) => exports,
            Ok(Err(e)) => {
                debug!("Require failed: {}", e);
                continue;
            }
            Err(payload) => {
                debug!("Require of {} panicked: {}", file.display(), describe_panic(payload));
                continue;
            }
        };

        // Call every exported function for the most detailed empty coverage
        for export in &exports {
            let ExportValue::Callable(callable) = &export.value else {
                continue;
            };
            match panic::catch_unwind(AssertUnwindSafe(|| callable(&probe))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!("func call {} failed: {}", export.name, e),
                Err(payload) => debug!(
                    "func call {} panicked: {}",
                    export.name,
                    describe_panic(payload)
                ),
            }
        }
    }

    let coverage = recorder.stop()?;
    let mut selected = filter.build().select(coverage);
    selected
        .par_iter_mut()
        .for_each(|file| file.functions.iter_mut().for_each(zero_counts));
    Ok(selected)
}

fn zero_counts(function: &mut RawFunctionCoverage) {
    for range in &mut function.ranges {
        range.count = 0;
    }
}

/// Where the never-executed baseline comes from
pub trait BaselineSource {
    fn collect(
        &self,
        files: &[PathBuf],
        filter: &FilterConfig,
    ) -> Result<Vec<RawFileCoverage>, Error>;
}

/// Collects the baseline inside the current process.
///
/// Module code runs next to the caller; use a worker process
/// (`coverage::worker::WorkerProcess`) to keep it isolated.
pub struct InProcessBaseline {
    registry: Arc<ModuleRegistry>,
}

impl InProcessBaseline {
    pub fn new(registry: Arc<ModuleRegistry>) -> Self {
        InProcessBaseline { registry }
    }
}

impl BaselineSource for InProcessBaseline {
    fn collect(
        &self,
        files: &[PathBuf],
        filter: &FilterConfig,
    ) -> Result<Vec<RawFileCoverage>, Error> {
        collect_baseline(files, filter, &self.registry)
    }
}
