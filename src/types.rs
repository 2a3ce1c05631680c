// src/types.rs
pub mod errors;
pub mod models;
pub mod options;

pub use errors::Error;
pub use models::*;
pub use options::{Options, RAW_REPORTER, ResolvedOptions};
