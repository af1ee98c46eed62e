//! warden - bounded out-of-process worker launcher

use anyhow::{Context, Result, bail};
use clap::Parser;
use crossbeam_channel::select;
use owo_colors::{OwoColorize, Stream::Stderr};
use std::collections::BTreeSet;

use warden::cli::{Cli, Commands, ConfigArgs, LaunchArgs, Verbosity};
use warden::launcher::run_worker_main;
use warden::logging::{self, LogConfig};
use warden::output::{self, ExitRecord, LaunchReport, TableOptions};
use warden::theme::{self, Themed};
use warden::{
    ChildImportance, Host, HostConfig, HostEvent, LaunchRequest, ProcessId, StartupLevel, paths,
};

fn main() {
    let cli = Cli::parse();

    // Handle no-color flag - affects both owo_colors and comfy_table
    if cli.no_color {
        theme::disable_colors();
    }

    let base = match cli.command {
        Commands::Worker(_) => LogConfig::for_worker(),
        _ => LogConfig::for_host(),
    };
    init_logging(&cli, base);

    let result = match &cli.command {
        Commands::Launch(args) => cmd_launch(&cli, args),
        Commands::Config(args) => cmd_config(&cli, args),
        Commands::Completions(args) => {
            args.generate();
            Ok(())
        }
        Commands::Worker(args) => run_worker_main(args.class),
    };

    if let Err(e) = result {
        eprintln!(
            "{}: {}",
            "error"
                .if_supports_color(Stderr, |text| text.red())
                .if_supports_color(Stderr, |text| text.bold()),
            e
        );
        // Print the error chain if there are causes
        for cause in e.chain().skip(1) {
            eprintln!(
                "  {}: {}",
                "caused by".if_supports_color(Stderr, |text| text.yellow()),
                cause
            );
        }
        std::process::exit(1);
    }
}

/// Environment settings apply first; -v/-q on the command line win over them.
fn init_logging(cli: &Cli, base: LogConfig) {
    let mut config = base.with_ansi(!cli.no_color).with_env_overrides();

    let verbosity = Verbosity::from_flags(cli.quiet, cli.verbose);
    if verbosity != Verbosity::Normal {
        config = config.with_level(verbosity.level());
        config.filter = None;
    }
    if let Some(format) = cli.log_format {
        config = config.with_format(format);
    }
    if let Some(path) = &cli.log_file {
        config = config.with_file(path.clone());
    }

    logging::init(config);
}

fn cmd_launch(cli: &Cli, args: &LaunchArgs) -> Result<()> {
    if args.count == 0 {
        bail!("--count must be at least 1");
    }

    let config = HostConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let host = Host::new(config).context("Failed to create host")?;
    let events = host.subscribe();

    host.ensure_started_sync(StartupLevel::Full)
        .context("Host startup failed")?;
    if args.warm_up {
        host.warm_up(args.class)?;
    }

    // One at a time: a launch into a full class can only evict a worker that
    // has finished launching.
    let mut pids: Vec<ProcessId> = Vec::with_capacity(args.count);
    for _ in 0..args.count {
        let request = args
            .resources
            .iter()
            .cloned()
            .fold(LaunchRequest::new(args.class, args.command_line()), |request, resource| {
                request.with_resource(resource)
            });
        match host.create_and_launch(request)?.wait() {
            Ok(pid) => pids.push(pid),
            Err(e) => {
                host.shutdown()?;
                return Err(e).context("Worker launch failed");
            }
        }
    }

    if args.importance.is_some() || args.foreground {
        let importance = args.importance.unwrap_or(ChildImportance::Moderate);
        for &pid in &pids {
            host.set_importance(pid, args.foreground, args.depth, importance)?;
        }
    }

    let workers = host.workers()?;

    if args.hold {
        if !cli.quiet {
            eprintln!(
                "Holding {} worker(s); press {} to stop.",
                workers.len().count(),
                "Ctrl-C".warning()
            );
        }
        let live: Vec<ProcessId> = workers.iter().map(|worker| worker.pid).collect();
        hold(&events, &live)?;
    }

    host.shutdown()?;

    let mut exits = Vec::with_capacity(pids.len());
    for &pid in &pids {
        if let Some(info) = host.query_termination_info(pid)? {
            exits.push(ExitRecord::new(pid, &info));
        }
    }

    output::print_report(
        &LaunchReport { workers, exits },
        args.format.into(),
        TableOptions { ascii: args.ascii },
    );
    Ok(())
}

/// Wait for Ctrl-C, or until every worker in `pids` has exited on its own.
fn hold(events: &crossbeam_channel::Receiver<HostEvent>, pids: &[ProcessId]) -> Result<()> {
    let (interrupt_tx, interrupt_rx) = crossbeam_channel::bounded(1);
    ctrlc::set_handler(move || {
        let _ = interrupt_tx.try_send(());
    })
    .context("Failed to install Ctrl-C handler")?;

    let mut alive: BTreeSet<ProcessId> = pids.iter().copied().collect();
    while !alive.is_empty() {
        select! {
            recv(interrupt_rx) -> _ => break,
            recv(events) -> event => match event {
                Ok(HostEvent::ProcessExited { pid, info }) => {
                    if alive.remove(&pid) {
                        tracing::warn!(
                            pid,
                            binding = %info.binding_state,
                            "Worker exited while held"
                        );
                    }
                }
                Ok(HostEvent::ProcessStarted { .. }) => {}
                Err(_) => break,
            },
        }
    }
    Ok(())
}

fn cmd_config(cli: &Cli, args: &ConfigArgs) -> Result<()> {
    let path = match &cli.config {
        Some(path) => paths::expand_tilde(path),
        None => paths::get_config_path(),
    };

    if args.path {
        println!("{}", path.display());
        return Ok(());
    }

    let config = HostConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if !cli.quiet {
        let source = if path.exists() {
            path.display().to_string()
        } else {
            "defaults".to_string()
        };
        eprintln!("{} {}", "Configuration from".section_header(), source);
    }
    print!("{}", config.to_toml_string()?);
    Ok(())
}
