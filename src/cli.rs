//! Command-line interface definitions using clap.

use crate::launcher::{ChildImportance, ResourceHandle, WorkerClass};
use crate::logging::LogFormat;
use crate::output::OutputFormat;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;

/// Launch and supervise sandboxed worker processes.
#[derive(Parser, Debug)]
#[command(name = "warden")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the host configuration file.
    #[arg(long, env = "WARDEN_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output (-v for info, -vv for debug).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors.
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    pub quiet: bool,

    /// Disable colored output.
    #[arg(long, env = "NO_COLOR", global = true)]
    pub no_color: bool,

    /// Log output format (pretty, compact, json).
    #[arg(long, global = true)]
    pub log_format: Option<LogFormat>,

    /// Also write logs to this file.
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the host, launch workers and report on them.
    Launch(LaunchArgs),

    /// Show the effective configuration.
    Config(ConfigArgs),

    /// Generate shell completions.
    Completions(CompletionsArgs),

    /// Run as a worker process (spawned by the host).
    #[command(hide = true)]
    Worker(WorkerArgs),
}

/// Arguments for shell completions.
#[derive(Parser, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for.
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate and print completions to stdout.
    pub fn generate(&self) {
        clap_complete::generate(
            self.shell,
            &mut Cli::command(),
            "warden",
            &mut std::io::stdout(),
        );
    }
}

/// Arguments for the launch command.
#[derive(Parser, Debug)]
pub struct LaunchArgs {
    /// Worker class to launch.
    #[arg(long, default_value = "sandboxed")]
    pub class: WorkerClass,

    /// Number of workers to launch.
    #[arg(short = 'n', long, default_value_t = 1)]
    pub count: usize,

    /// Process type passed to the worker as `--type=<TYPE>`.
    #[arg(long = "type", value_name = "TYPE")]
    pub process_type: Option<String>,

    /// Importance assigned to each worker after launch.
    #[arg(long)]
    pub importance: Option<ChildImportance>,

    /// Mark the workers as visible.
    #[arg(long)]
    pub foreground: bool,

    /// Frame depth used with --foreground (0 is top level).
    #[arg(long, default_value_t = 0)]
    pub depth: u32,

    /// Hand a file to every worker, as ID=PATH.
    #[arg(long = "resource", value_name = "ID=PATH", value_parser = parse_resource)]
    pub resources: Vec<ResourceHandle>,

    /// Start a spare worker connection before launching.
    #[arg(long)]
    pub warm_up: bool,

    /// Keep the workers running until Ctrl-C.
    #[arg(long)]
    pub hold: bool,

    /// Output format.
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormatArg,

    /// Use ASCII table borders instead of Unicode.
    #[arg(long)]
    pub ascii: bool,

    /// Extra switches for the worker command line.
    #[arg(last = true)]
    pub worker_args: Vec<String>,
}

impl LaunchArgs {
    /// Command line handed to each worker at setup.
    pub fn command_line(&self) -> Vec<String> {
        let mut command_line = Vec::with_capacity(self.worker_args.len() + 1);
        if let Some(process_type) = &self.process_type {
            command_line.push(format!("--type={}", process_type));
        }
        command_line.extend(self.worker_args.iter().cloned());
        command_line
    }
}

/// Arguments for the config command.
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Print the config file path instead of its contents.
    #[arg(long)]
    pub path: bool,
}

/// Arguments for the hidden worker command.
#[derive(Parser, Debug)]
pub struct WorkerArgs {
    /// Class the host launched this worker as.
    #[arg(long)]
    pub class: WorkerClass,
}

fn parse_resource(value: &str) -> Result<ResourceHandle, String> {
    let (id, path) = value
        .split_once('=')
        .ok_or_else(|| format!("expected ID=PATH, got '{}'", value))?;
    if id.is_empty() || path.is_empty() {
        return Err(format!("expected ID=PATH, got '{}'", value));
    }
    Ok(ResourceHandle::file(id, crate::paths::expand_tilde(path)))
}

/// Output format options.
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum OutputFormatArg {
    /// Colored table output.
    #[default]
    Table,
    /// JSON output.
    Json,
    /// Plain text (tab-separated).
    Plain,
}

impl From<OutputFormatArg> for OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Table => OutputFormat::Table,
            OutputFormatArg::Json => OutputFormat::Json,
            OutputFormatArg::Plain => OutputFormat::Plain,
        }
    }
}

/// Verbosity level derived from CLI flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    Quiet,
    Normal,
    Info,
    Debug,
}

impl Verbosity {
    pub fn from_flags(quiet: bool, verbose: u8) -> Self {
        if quiet {
            return Self::Quiet;
        }
        match verbose {
            0 => Self::Normal,
            1 => Self::Info,
            _ => Self::Debug,
        }
    }

    /// Log level for this verbosity.
    pub fn level(self) -> tracing::Level {
        match self {
            Self::Quiet => tracing::Level::ERROR,
            Self::Normal => tracing::Level::WARN,
            Self::Info => tracing::Level::INFO,
            Self::Debug => tracing::Level::DEBUG,
        }
    }
}
