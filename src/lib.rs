// src/lib.rs
pub mod cli;
pub mod coverage;
pub mod filter;
pub mod reporters;
pub mod types;
pub mod utils;

pub use coverage::Engine;
pub use filter::FileFilter;
pub use types::*;
pub use utils::pipeline::{Artifact, Artifacts, CoverageOutput};
