// Shared fixtures for the integration tests
#![allow(dead_code)]

use runcov::Error;
use runcov::coverage::{Export, Imports, Module, Probe};
use std::fs;
use std::path::{Path, PathBuf};

pub fn demo_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/demoproj")
}

pub fn math_path() -> PathBuf {
    demo_root().join("lib/math.js")
}

pub fn untested_path() -> PathBuf {
    demo_root().join("lib/untested.js")
}

/// Byte span of the function starting at `needle`, up to its closing brace
pub fn span_of(source: &str, needle: &str) -> (u64, u64) {
    let start = source.find(needle).unwrap();
    let end = start + source[start..].find("\n}").unwrap() + 2;
    (start as u64, end as u64)
}

/// Instrumented stand-in for `lib/math.js`.
///
/// Evaluating it reports the top-level code; calling an export reports
/// that function's body.
pub struct MathModule {
    path: PathBuf,
    source: String,
}

impl MathModule {
    pub fn new() -> Self {
        let path = math_path();
        let source = fs::read_to_string(&path).unwrap();
        MathModule { path, source }
    }

    pub fn size(&self) -> u64 {
        self.source.len() as u64
    }

    pub fn span(&self, function: &str) -> (u64, u64) {
        span_of(&self.source, &format!("function {}", function))
    }

    fn export(&self, name: &str) -> Export {
        let path = self.path.clone();
        let function = name.to_string();
        let (start, end) = self.span(name);
        Export::function(name, move |probe: &Probe| {
            probe.hit(&path, &function, start, end);
            Ok(())
        })
    }
}

impl Module for MathModule {
    fn evaluate(&self, _imports: &dyn Imports, probe: &Probe) -> Result<Vec<Export>, Error> {
        probe.hit(&self.path, "", 0, self.size());
        Ok(vec![
            self.export("add"),
            self.export("mult"),
            Export::value("version", serde_json::json!("1.0.0")),
        ])
    }
}

/// Stand-in for `lib/untested.js`, which pokes at an import while loading
pub struct UntestedModule;

impl Module for UntestedModule {
    fn evaluate(&self, imports: &dyn Imports, probe: &Probe) -> Result<Vec<Export>, Error> {
        let path = untested_path();
        let source = fs::read_to_string(&path)?;
        let helper = imports.import("./helper");
        let _answer = helper.get("answer").call().get("value");
        probe.hit(&path, "", 0, source.len() as u64);

        let (start, end) = span_of(&source, "function unused");
        Ok(vec![Export::function("default", move |probe: &Probe| {
            probe.hit(&path, "unused", start, end);
            Ok(())
        })])
    }
}

/// A module whose top-level code fails
pub struct BrokenModule;

impl Module for BrokenModule {
    fn evaluate(&self, _imports: &dyn Imports, _probe: &Probe) -> Result<Vec<Export>, Error> {
        Err(Error::Config("syntax error".to_string()))
    }
}

/// A module whose top-level code panics
pub struct PanickingModule;

impl Module for PanickingModule {
    fn evaluate(&self, _imports: &dyn Imports, _probe: &Probe) -> Result<Vec<Export>, Error> {
        panic!("module blew up while loading")
    }
}
