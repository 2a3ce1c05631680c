use clap::Parser;
use runcov::cli::{Cli, Commands, execute_report_command, execute_run_command};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("RUNCOV_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            dumps,
            report,
            command,
        } => {
            execute_run_command(dumps.as_deref(), &report, &command)?;
        }
        Commands::Report { dumps, report } => {
            execute_report_command(&dumps, &report)?;
        }
    }

    Ok(())
}
