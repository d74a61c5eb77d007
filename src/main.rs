mod config;
mod duration;
mod metrics;
mod outcome;
mod reader;
mod runner;
mod session;
mod signals;
mod watchdog;

use clap::Parser;
use config::{Overrides, Settings};
use session::GroupSlot;
use signals::SignalHandler;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

/// Wait until there is no input for a given amount of time.
///
/// Reads lines from stdin, or from the stdout of `--command`, and exits as
/// soon as no new line has arrived for `--timeout`.
#[derive(Parser, Debug)]
#[command(name = "waitsilence", version, about)]
pub struct Cli {
    /// Amount of silence required before quitting (e.g. 500ms, 2s, 1m30s)
    #[arg(short, long, value_parser = duration::parse)]
    timeout: Option<Duration>,

    /// Command to execute and wait for silence on (run via `sh -c`)
    #[arg(short, long)]
    command: Option<String>,

    /// Show stderr of the command and a running line count
    #[arg(short, long)]
    verbose: bool,

    /// Optional TOML config file with a [wait] table
    #[arg(long)]
    config: Option<PathBuf>,

    /// Validate config and print resolved settings, don't run
    #[arg(long)]
    dry_run: bool,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .init();
}

fn resolve_settings(cli: &Cli) -> Result<Settings, config::ConfigError> {
    let file = match &cli.config {
        Some(path) => config::load(path)?,
        None => config::FileConfig::default(),
    };
    Settings::resolve(
        &file.wait,
        Overrides {
            timeout: cli.timeout,
            command: cli.command.clone(),
            verbose: cli.verbose,
        },
    )
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    // Always exit explicitly: a pending stdin read would otherwise keep the
    // runtime from shutting down.
    std::process::exit(run_cli(cli).await);
}

async fn run_cli(cli: Cli) -> i32 {
    let start = Instant::now();

    let settings = match resolve_settings(&cli) {
        Ok(settings) => settings,
        Err(e) => {
            init_tracing(cli.verbose);
            tracing::error!("{e}");
            return 1;
        }
    };
    init_tracing(settings.verbose);
    tracing::debug!(?cli, "parsed CLI arguments");

    if cli.dry_run {
        println!("timeout: {}", duration::format(settings.timeout));
        println!("command: {}", settings.command.as_deref().unwrap_or("(stdin)"));
        println!("verbose: {}", settings.verbose);
        return 0;
    }

    let group = GroupSlot::default();
    match SignalHandler::install() {
        Ok(handler) => handler.spawn(group.clone(), settings.timeout, start),
        Err(e) => {
            tracing::error!(error = %e, "failed to install signal handlers");
            return 1;
        }
    }

    match runner::run(&settings, &group).await {
        Ok(outcome) => {
            outcome.report(settings.timeout, start.elapsed());
            outcome.exit_code()
        }
        Err(e) => {
            tracing::error!("{e}");
            1
        }
    }
}
