use crate::coverage::analysis::Engine;
use crate::coverage::session::CoverageSession;
use crate::coverage::v8::{COVERAGE_ENV, DumpCollector};
use crate::coverage::worker::WorkerProcess;
use crate::types::options::Options;
use crate::utils::pipeline::{Artifact, CoverageOutput};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

#[derive(Parser)]
#[command(
    name = "runcov",
    about = "Report runtime coverage, including code that never ran",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a command with coverage enabled, then report it
    Run {
        /// Directory the measured processes write coverage dumps to (defaults to a temporary directory)
        #[arg(short, long)]
        dumps: Option<PathBuf>,

        #[command(flatten)]
        report: ReportArgs,

        /// The command to run
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },

    /// Report coverage dumps that already exist
    Report {
        /// Directory holding the coverage dumps
        #[arg(short, long)]
        dumps: PathBuf,

        #[command(flatten)]
        report: ReportArgs,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct ReportArgs {
    /// JSON options file; flags given on the command line take precedence
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Project root, defaults to the current directory
    #[arg(short, long)]
    pub root: Option<PathBuf>,

    /// Exclude files matching this wildcard pattern (repeatable)
    #[arg(short, long)]
    pub exclude: Vec<String>,

    /// Extension of the measured source files
    #[arg(long)]
    pub extension: Option<String>,

    /// Include project files that never ran
    #[arg(short, long)]
    pub all: bool,

    /// Report every line, even in files without top-level coverage
    #[arg(long)]
    pub force_line_mode: bool,

    /// Directory for the reports; kept after the run
    #[arg(short = 'o', long)]
    pub coverage_dir: Option<PathBuf>,

    /// Keep the reports directory even when it is a temporary one
    #[arg(long)]
    pub keep: bool,

    /// Reporter to run (repeatable), e.g. text, json, lcovonly, cobertura
    #[arg(long = "reporter")]
    pub reporters: Vec<String>,

    /// Worker program answering baseline requests; enables reconciliation
    #[arg(long)]
    pub baseline_command: Option<PathBuf>,

    /// Argument passed to the baseline worker (repeatable)
    #[arg(long = "baseline-arg", allow_hyphen_values = true)]
    pub baseline_args: Vec<String>,

    /// Time the baseline worker gets to answer
    #[arg(long, default_value_t = 60_000)]
    pub baseline_timeout_ms: u64,
}

impl ReportArgs {
    /// Options from the config file (or defaults) with the flags applied on top
    pub fn to_options(&self) -> Result<Options, Box<dyn std::error::Error>> {
        let mut options = match &self.config {
            Some(path) => Options::from_json_file(path)?,
            None => Options::default(),
        };

        if let Some(root) = &self.root {
            options.root_dir = Some(root.clone());
        }
        if !self.exclude.is_empty() {
            options.exclude = self.exclude.clone();
        }
        if let Some(extension) = &self.extension {
            options.extension = extension.clone();
        }
        options.all |= self.all;
        options.force_line_mode |= self.force_line_mode;
        if let Some(dir) = &self.coverage_dir {
            options.coverage_directory = Some(dir.clone());
            options.delete_coverage = false;
        }
        if self.keep {
            options.delete_coverage = false;
        }
        if !self.reporters.is_empty() {
            options.reporters = self.reporters.clone();
        }
        options.reload |= self.baseline_command.is_some();
        // The CLI always prints what it can
        options.return_results = true;
        options.stream = false;
        Ok(options)
    }

    fn engine(&self, session: CoverageSession) -> Engine {
        let engine = Engine::new(session);
        match &self.baseline_command {
            Some(program) => engine.with_baseline(
                WorkerProcess::new(program)
                    .with_args(self.baseline_args.clone())
                    .with_timeout(Duration::from_millis(self.baseline_timeout_ms)),
            ),
            None => engine,
        }
    }
}

/// Print text reports to stdout and list everything else
fn print_output(output: CoverageOutput) -> Result<(), Box<dyn std::error::Error>> {
    let Some(artifacts) = output.artifacts() else {
        println!("Coverage written.");
        return Ok(());
    };

    if let Some(raw) = &artifacts.raw {
        println!("{}", serde_json::to_string_pretty(raw)?);
    }
    for (name, artifact) in artifacts.files {
        match artifact {
            Artifact::Text(text) if name.starts_with("text") => print!("{}", text),
            artifact => {
                let content = artifact.into_string()?;
                println!("Generated {} ({} bytes)", name, content.len());
            }
        }
    }
    Ok(())
}

pub fn execute_run_command(
    dumps: Option<&Path>,
    report: &ReportArgs,
    command: &[String],
) -> Result<(), Box<dyn std::error::Error>> {
    let options = report.to_options()?;
    let Some((program, args)) = command.split_first() else {
        return Err("No command to run".into());
    };

    // Hold the temporary dump directory for the whole run
    let temp_dumps;
    let dump_dir: &Path = match dumps {
        Some(dir) => dir,
        None => {
            temp_dumps = tempfile::Builder::new().prefix("runcov-dumps-").tempdir()?;
            temp_dumps.path()
        }
    };

    let mut engine = report.engine(CoverageSession::new(DumpCollector::new(dump_dir)));
    engine.start_coverage()?;

    println!("Running {} with coverage enabled", command.join(" "));
    let status = Command::new(program)
        .args(args)
        .env(COVERAGE_ENV, dump_dir)
        .status()
        .map_err(|e| format!("Failed to execute '{}': {}", program, e))?;
    if !status.success() {
        println!("Warning: '{}' exited with {}", program, status);
    }

    print_output(engine.get_coverage(&options)?)?;

    if !status.success() {
        return Err(format!("'{}' exited with {}", program, status).into());
    }
    Ok(())
}

pub fn execute_report_command(
    dumps: &Path,
    report: &ReportArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    if !dumps.is_dir() {
        return Err(format!("Dump directory '{}' does not exist", dumps.display()).into());
    }
    let options = report.to_options()?;
    let mut engine = report.engine(CoverageSession::attach(DumpCollector::new(dumps)));
    print_output(engine.get_coverage(&options)?)
}
