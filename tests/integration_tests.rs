// tests/integration_tests.rs
mod common;

use common::{MathModule, UntestedModule, demo_root, math_path, untested_path};
use rstest::*;
use runcov::coverage::{
    Converter, CoverageSession, DumpCollector, Engine, ExportValue, InProcessBaseline,
    Instrumenter, ModuleRegistry, Probe, Recorder, StubImports,
};
use runcov::types::models::{CoverageMap, FileCoverage, Location, Position, RawFunctionCoverage};
use runcov::{Artifact, Error, Options};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::{TempDir, tempdir};
use url::Url;

#[fixture]
fn temp_dir() -> TempDir {
    tempdir().unwrap()
}

#[fixture]
fn registry() -> Arc<ModuleRegistry> {
    let mut registry = ModuleRegistry::new();
    registry.register(&math_path(), MathModule::new());
    registry.register(&untested_path(), UntestedModule);
    Arc::new(registry)
}

fn key(path: PathBuf) -> String {
    path.to_string_lossy().into_owned()
}

/// `require("./lib/math").add(1, 2)` against the instrumented module
fn call_add(registry: &ModuleRegistry, probe: &Probe) {
    let exports = registry.require(&math_path(), &StubImports, probe).unwrap();
    let add = exports.iter().find(|e| e.name == "add").unwrap();
    let ExportValue::Callable(add) = &add.value else {
        panic!("add is not a function");
    };
    add(probe).unwrap();
}

fn function_hits(file: &FileCoverage) -> Vec<(String, u64)> {
    file.fn_map
        .iter()
        .map(|(id, mapping)| (mapping.name.clone(), file.f[id]))
        .collect()
}

fn json_report(artifact: Option<&Artifact>) -> CoverageMap {
    let text = artifact.and_then(Artifact::as_text).unwrap();
    serde_json::from_str(text).unwrap()
}

#[rstest]
#[case::observed_only(false, vec![("add", 1)])]
#[case::reloaded(true, vec![("add", 1), ("mult", 0)])]
fn test_add_end_to_end(
    registry: Arc<ModuleRegistry>,
    temp_dir: TempDir,
    #[case] reload: bool,
    #[case] expected_functions: Vec<(&str, u64)>,
) {
    let recorder = Recorder::new();
    let probe = recorder.probe();
    let mut engine = Engine::with_instrumenter(recorder)
        .with_baseline(InProcessBaseline::new(Arc::clone(&registry)));

    engine.start_coverage().unwrap();
    call_add(&registry, &probe);

    let options = Options {
        root_dir: Some(demo_root()),
        all: true,
        reload,
        coverage_directory: Some(temp_dir.path().join("coverage")),
        reporters: vec!["json".to_string(), "text".to_string()],
        ..Options::default()
    };
    let artifacts = engine.get_coverage(&options).unwrap().artifacts().unwrap();
    let map = json_report(artifacts.get("coverage-final.json"));

    // Dependencies and hidden files stay out, the untested file comes in
    let files: Vec<&String> = map.files.keys().collect();
    assert_eq!(files, vec![&key(math_path()), &key(untested_path())]);

    let math = map.get(&key(math_path())).unwrap();
    let expected: Vec<(String, u64)> = expected_functions
        .into_iter()
        .map(|(name, hits)| (name.to_string(), hits))
        .collect();
    assert_eq!(function_hits(math), expected);
    assert!(math.line_hits()[&1] >= 1, "add's declaration line ran");

    let untested = map.get(&key(untested_path())).unwrap();
    assert!(untested.f.is_empty());
    assert!(!untested.s.is_empty());
    assert!(untested.s.values().all(|hits| *hits == 0));

    let text = artifacts.get("text").and_then(Artifact::as_text).unwrap();
    assert!(text.contains("All files"));
    assert!(text.contains("math.js"));
    assert!(text.contains("untested.js"));

    // Recording stopped with the request
    assert!(!probe.is_recording());
}

#[test]
fn test_coverage_requires_started_session() {
    let mut engine = Engine::with_instrumenter(Recorder::new());

    let result = engine.get_coverage(&Options::default());

    assert!(matches!(result, Err(Error::NotStarted)), "{:?}", result);
}

#[rstest]
fn test_second_request_requires_restart(temp_dir: TempDir) {
    let mut engine = Engine::with_instrumenter(Recorder::new());
    engine.start_coverage().unwrap();
    let options = Options {
        root_dir: Some(demo_root()),
        coverage_directory: Some(temp_dir.path().join("coverage")),
        ..Options::default()
    };

    assert!(engine.get_coverage(&options).is_ok());
    assert!(matches!(
        engine.get_coverage(&options),
        Err(Error::NotStarted)
    ));
}

#[rstest]
#[case::root_itself(demo_root())]
#[case::ancestor_of_root(demo_root().parent().unwrap().to_path_buf())]
fn test_coverage_directory_must_not_contain_root(#[case] coverage_dir: PathBuf) {
    let mut engine = Engine::with_instrumenter(Recorder::new());
    engine.start_coverage().unwrap();
    let options = Options {
        root_dir: Some(demo_root()),
        coverage_directory: Some(coverage_dir),
        ..Options::default()
    };

    let result = engine.get_coverage(&options);

    assert!(matches!(result, Err(Error::Config(_))), "{:?}", result);
    assert!(math_path().exists(), "the project is untouched");
}

#[rstest]
fn test_reload_without_baseline_source_is_rejected(temp_dir: TempDir) {
    let mut engine = Engine::with_instrumenter(Recorder::new());
    engine.start_coverage().unwrap();
    let options = Options {
        root_dir: Some(demo_root()),
        reload: true,
        coverage_directory: Some(temp_dir.path().join("coverage")),
        ..Options::default()
    };

    let result = engine.get_coverage(&options);

    assert!(matches!(result, Err(Error::Config(_))), "{:?}", result);
}

#[test]
fn test_restarting_session_discards_earlier_data() {
    let recorder = Recorder::new();
    let probe = recorder.probe();
    let mut session = CoverageSession::new(recorder);

    session.start().unwrap();
    probe.hit(&math_path(), "add", 0, 38);
    session.start().unwrap();
    probe.hit(&untested_path(), "", 0, 10);

    let coverage = session.take().unwrap();
    assert_eq!(coverage.len(), 1);
    assert_eq!(
        coverage[0].url,
        Url::from_file_path(untested_path()).unwrap().to_string()
    );
    assert!(!session.is_active());
}

#[test]
fn test_probe_counts_repeated_hits() {
    let mut recorder = Recorder::new();
    let probe = recorder.probe();

    probe.hit(&math_path(), "add", 0, 38);
    recorder.start().unwrap();
    probe.hit(&math_path(), "add", 0, 38);
    probe.hit(&math_path(), "add", 0, 38);
    probe.hit(&math_path(), "add", 21, 36);
    let coverage = recorder.stop().unwrap();

    let ranges = &coverage[0].functions[0].ranges;
    assert_eq!(ranges.len(), 2);
    assert_eq!(ranges[0].count, 2, "hits before start are not recorded");
    assert_eq!(ranges[1].count, 1);
}

fn write_dump(dir: &Path, name: &str, functions: serde_json::Value) {
    let dump = serde_json::json!({
        "result": [
            {
                "scriptId": "42",
                "url": Url::from_file_path(math_path()).unwrap().to_string(),
                "functions": functions,
            },
            {
                "scriptId": "1",
                "url": "node:internal/main/run_main_module",
                "functions": [],
            }
        ]
    });
    fs::write(dir.join(name), dump.to_string()).unwrap();
}

#[rstest]
#[case::line_mode_off(false, 1)]
#[case::line_mode_forced(true, 0)]
fn test_dump_directory_report(
    temp_dir: TempDir,
    #[case] force_line_mode: bool,
    #[case] last_line_hits: u64,
) {
    let module = MathModule::new();
    let (start, end) = module.span("add");
    let dumps = temp_dir.path().join("dumps");
    fs::create_dir_all(&dumps).unwrap();

    // Only `add` was reported; no top-level entry
    write_dump(
        &dumps,
        "coverage-1234-1-0.json",
        serde_json::json!([{
            "functionName": "add",
            "ranges": [{"startOffset": start, "endOffset": end, "count": 1}],
            "isBlockCoverage": false,
        }]),
    );
    fs::write(dumps.join("not-a-dump.json"), "{\"hello\": true}").unwrap();

    let mut engine = Engine::new(CoverageSession::attach(DumpCollector::new(&dumps)));
    let options = Options {
        root_dir: Some(demo_root()),
        force_line_mode,
        coverage_directory: Some(temp_dir.path().join("coverage")),
        reporters: vec!["json".to_string()],
        ..Options::default()
    };
    let artifacts = engine.get_coverage(&options).unwrap().artifacts().unwrap();
    let map = json_report(artifacts.get("coverage-final.json"));

    assert_eq!(map.len(), 1);
    let math = map.get(&key(math_path())).unwrap();
    assert_eq!(function_hits(math), vec![("add".to_string(), 1)]);
    assert_eq!(math.line_hits()[&2], 1);
    assert_eq!(math.line_hits()[&9], last_line_hits);
}

#[rstest]
fn test_same_script_in_several_dumps(temp_dir: TempDir) {
    let module = MathModule::new();
    let (add_start, add_end) = module.span("add");
    let (mult_start, mult_end) = module.span("mult");
    let dumps = temp_dir.path().join("dumps");
    fs::create_dir_all(&dumps).unwrap();

    write_dump(
        &dumps,
        "coverage-1.json",
        serde_json::json!([{
            "functionName": "add",
            "ranges": [{"startOffset": add_start, "endOffset": add_end, "count": 5}],
            "isBlockCoverage": false,
        }]),
    );
    write_dump(
        &dumps,
        "coverage-2.json",
        serde_json::json!([
            {
                "functionName": "mult",
                "ranges": [{"startOffset": mult_start, "endOffset": mult_end, "count": 7}],
                "isBlockCoverage": false,
            },
            {
                "functionName": "add",
                "ranges": [{"startOffset": add_start, "endOffset": add_end, "count": 0}],
                "isBlockCoverage": false,
            }
        ]),
    );

    let mut engine = Engine::new(CoverageSession::attach(DumpCollector::new(&dumps)));
    let options = Options {
        root_dir: Some(demo_root()),
        coverage_directory: Some(temp_dir.path().join("coverage")),
        reporters: vec!["json".to_string()],
        ..Options::default()
    };
    let artifacts = engine.get_coverage(&options).unwrap().artifacts().unwrap();
    let map = json_report(artifacts.get("coverage-final.json"));

    assert_eq!(map.len(), 1);
    let math = map.get(&key(math_path())).unwrap();
    assert_eq!(
        function_hits(math),
        vec![("add".to_string(), 5), ("mult".to_string(), 7)]
    );
    assert_eq!(math.line_hits()[&2], 5);
    assert_eq!(math.line_hits()[&6], 7);
}

#[rstest]
fn test_dump_collector_start_clears_stale_dumps(temp_dir: TempDir) {
    let dumps = temp_dir.path().join("dumps");
    fs::create_dir_all(&dumps).unwrap();
    write_dump(&dumps, "coverage-stale.json", serde_json::json!([]));
    fs::write(dumps.join("notes.txt"), "kept").unwrap();

    let mut collector = DumpCollector::new(&dumps);
    collector.start().unwrap();

    assert!(!dumps.join("coverage-stale.json").exists());
    assert!(dumps.join("notes.txt").exists());
    assert!(collector.stop().unwrap().is_empty());
}

/// Reports every file as a single statement that ran once
struct OneStatement;

impl Converter for OneStatement {
    fn convert(
        &self,
        path: &Path,
        _functions: &[RawFunctionCoverage],
    ) -> Result<FileCoverage, Error> {
        let mut coverage = FileCoverage::new(path.to_string_lossy());
        let start = Position { line: 1, column: 0 };
        coverage.statement_map.insert(0, Location { start, end: start });
        coverage.s.insert(0, 1);
        Ok(coverage)
    }
}

#[rstest]
fn test_custom_converter(registry: Arc<ModuleRegistry>, temp_dir: TempDir) {
    let recorder = Recorder::new();
    let probe = recorder.probe();
    let mut engine = Engine::with_instrumenter(recorder).with_converter(OneStatement);

    engine.start_coverage().unwrap();
    call_add(&registry, &probe);

    let options = Options {
        root_dir: Some(demo_root()),
        coverage_directory: Some(temp_dir.path().join("coverage")),
        reporters: vec!["json".to_string()],
        ..Options::default()
    };
    let artifacts = engine.get_coverage(&options).unwrap().artifacts().unwrap();
    let map = json_report(artifacts.get("coverage-final.json"));

    let math = map.get(&key(math_path())).unwrap();
    assert_eq!(math.s.len(), 1);
    assert!(math.fn_map.is_empty());
}
