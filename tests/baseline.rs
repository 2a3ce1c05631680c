// tests/baseline.rs
mod common;

use common::{
    BrokenModule, MathModule, PanickingModule, UntestedModule, demo_root, math_path,
    untested_path,
};
use rstest::*;
use runcov::Error;
use runcov::coverage::{
    BaselineReply, Export, Imports, Instrumenter, Module, ModuleRegistry, Probe, Recorder,
    StubImports, collect_baseline, serve_baseline,
};
use runcov::filter::FilterConfig;
use runcov::types::models::RawFileCoverage;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[fixture]
fn filter() -> FilterConfig {
    FilterConfig {
        root_dir: demo_root(),
        exclude: vec!["**/node_modules/**".to_string()],
        extension: ".js".to_string(),
    }
}

#[fixture]
fn registry() -> ModuleRegistry {
    let mut registry = ModuleRegistry::new();
    registry.register(&math_path(), MathModule::new());
    registry.register(&untested_path(), UntestedModule);
    registry
}

fn find<'a>(coverage: &'a [RawFileCoverage], path: &Path) -> &'a RawFileCoverage {
    coverage
        .iter()
        .find(|file| Path::new(&file.url) == path)
        .unwrap_or_else(|| panic!("no coverage for {}", path.display()))
}

fn function_names(file: &RawFileCoverage) -> Vec<&str> {
    file.functions
        .iter()
        .map(|f| f.function_name.as_str())
        .collect()
}

#[rstest]
fn test_baseline_calls_every_export_with_zero_counts(
    registry: ModuleRegistry,
    filter: FilterConfig,
) {
    let files = vec![math_path(), untested_path()];

    let coverage = collect_baseline(&files, &filter, &registry).unwrap();

    assert_eq!(coverage.len(), 2);
    let math = find(&coverage, &math_path());
    assert_eq!(function_names(math), vec!["", "add", "mult"]);
    let untested = find(&coverage, &untested_path());
    assert_eq!(function_names(untested), vec!["", "unused"]);

    for file in &coverage {
        for function in &file.functions {
            assert!(
                function.ranges.iter().all(|r| r.count == 0),
                "{} in {} has a non-zero count",
                function.function_name,
                file.url
            );
        }
    }
}

#[rstest]
fn test_failing_modules_do_not_abort_the_pass(filter: FilterConfig) {
    let broken = demo_root().join("lib/broken.js");
    let panicking = demo_root().join("lib/panicking.js");
    let unregistered = demo_root().join("lib/unregistered.js");

    let mut registry = ModuleRegistry::new();
    registry.register(&broken, BrokenModule);
    registry.register(&panicking, PanickingModule);
    registry.register(&math_path(), MathModule::new());

    let files = vec![broken, panicking, unregistered, math_path()];
    let coverage = collect_baseline(&files, &filter, &registry).unwrap();

    assert_eq!(coverage.len(), 1);
    assert_eq!(PathBuf::from(&coverage[0].url), math_path());
}

struct ExplodingExports;

impl Module for ExplodingExports {
    fn evaluate(&self, _imports: &dyn Imports, probe: &Probe) -> Result<Vec<Export>, Error> {
        probe.hit(&math_path(), "", 0, 10);
        Ok(vec![
            Export::function("fails", |_| Err(Error::Config("bad input".to_string()))),
            Export::function("panics", |_| panic!("called without arguments")),
            Export::function("works", |probe| {
                probe.hit(&math_path(), "works", 0, 5);
                Ok(())
            }),
        ])
    }
}

#[rstest]
fn test_failing_exports_do_not_stop_the_others(filter: FilterConfig) {
    let mut registry = ModuleRegistry::new();
    registry.register(&math_path(), ExplodingExports);

    let coverage = collect_baseline(&[math_path()], &filter, &registry).unwrap();

    assert_eq!(function_names(&coverage[0]), vec!["", "works"]);
}

#[rstest]
fn test_module_cache_is_restored(registry: ModuleRegistry, filter: FilterConfig) {
    let mut recorder = Recorder::new();
    recorder.start().unwrap();
    let probe = recorder.probe();

    // math.js is already loaded, untested.js is not
    let cached = registry.require(&math_path(), &StubImports, &probe).unwrap();
    assert!(!registry.is_cached(&untested_path()));

    collect_baseline(&[math_path(), untested_path()], &filter, &registry).unwrap();

    assert!(registry.is_cached(&math_path()));
    assert!(!registry.is_cached(&untested_path()));
    let after = registry.require(&math_path(), &StubImports, &probe).unwrap();
    assert!(Arc::ptr_eq(&cached, &after));
}

#[test]
fn test_stub_imports_are_infinitely_navigable() {
    let imports = StubImports;
    let binding = imports.import("fs");

    // Any chain of property accesses and calls yields another binding
    let deep = binding.get("promises").get("readFile").call().call().get("then");
    let _ = deep.get("anything").call();
}

#[rstest]
fn test_serve_baseline_replies_with_coverage(registry: ModuleRegistry, filter: FilterConfig) {
    let request = serde_json::json!({
        "files": [math_path()],
        "rootDir": filter.root_dir,
        "exclude": filter.exclude,
        "extension": filter.extension,
    });
    let input = Cursor::new(format!("{}\n", request));
    let mut output = Vec::new();

    serve_baseline(input, &mut output, &registry).unwrap();

    let reply: BaselineReply = serde_json::from_slice(&output).unwrap();
    match reply {
        BaselineReply::Ok { coverage } => {
            assert_eq!(coverage.len(), 1);
            assert_eq!(function_names(&coverage[0]), vec!["", "add", "mult"]);
        }
        other => panic!("expected coverage, got {:?}", other),
    }
}

#[rstest]
fn test_serve_baseline_reports_bad_requests(registry: ModuleRegistry) {
    let input = Cursor::new("not json\n");
    let mut output = Vec::new();

    let result = serve_baseline(input, &mut output, &registry);

    assert!(result.is_err());
    let reply: BaselineReply = serde_json::from_slice(&output).unwrap();
    assert!(matches!(reply, BaselineReply::Error { .. }));
}
