pub mod commands;

pub use commands::{Cli, Commands, ReportArgs, execute_report_command, execute_run_command};
