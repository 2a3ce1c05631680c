pub mod analysis;
pub mod baseline;
pub mod convert;
pub mod merge;
pub mod reconcile;
pub mod session;
pub mod v8;
pub mod worker;

// Re-export main types
pub use analysis::Engine;
pub use baseline::{
    BaselineSource, Binding, Export, ExportValue, Imports, InProcessBaseline, Module, ModuleRegistry,
    NullBinding, StubImports, collect_baseline,
};
pub use convert::{Converter, LineConverter};
pub use merge::merge_map;
pub use reconcile::{combine, empty_block, force_line_mode, reconcile};
pub use session::{CoverageSession, Instrumenter, Probe, Recorder};
pub use v8::{COVERAGE_ENV, DumpCollector};
pub use worker::{BaselineReply, BaselineRequest, WorkerProcess, serve_baseline};
