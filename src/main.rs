//! fence-recorder - Fence agent entry point
//!
//! Invoked by the cluster resource manager. The exit status is the fence
//! result.

use anyhow::{Context, Result};
use clap::Parser;
use fence_recorder::audit::DIAGNOSTIC_LOG_FILE;
use fence_recorder::config::AgentArgs;
use fence_recorder::requester::FenceRequester;
use std::fs::OpenOptions;
use std::io::{IsTerminal, Read};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Mutex;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

fn main() -> ExitCode {
    let args = parse_args();
    setup_logging(&args.log_dir, args.verbose);

    match run(args) {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: AgentArgs) -> Result<ExitCode> {
    let config = args.to_config().context("Invalid configuration")?;

    let Some(action) = args.action.fence_action() else {
        let report = FenceRequester::from_config(config).monitor();
        return Ok(if report.is_healthy() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        });
    };

    let target = args.target()?;
    let requester = FenceRequester::from_config(config);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    let outcome = runtime.block_on(requester.fence(action, target));

    info!("Fence {} for {} finished: {}", action, target, outcome.kind());
    Ok(outcome.exit_code())
}

/// Options from argv, or from stdin when started without arguments
fn parse_args() -> AgentArgs {
    let stdin = std::io::stdin();
    if std::env::args_os().len() > 1 || stdin.is_terminal() {
        return AgentArgs::parse();
    }

    let mut text = String::new();
    if let Err(e) = stdin.lock().read_to_string(&mut text) {
        eprintln!("Warning: failed to read options from stdin: {}", e);
    }
    AgentArgs::from_stdin_options(&text).unwrap_or_else(|e| e.exit())
}

/// Log to stderr and to the diagnostic log under `log_dir`
///
/// A log directory that cannot be opened is reported and skipped; it never
/// prevents the fence call.
fn setup_logging(log_dir: &Path, verbose: bool) {
    let default = if verbose {
        "fence_recorder=debug,warn"
    } else {
        "fence_recorder=info,warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    let file_layer = match open_diagnostic_log(log_dir) {
        Ok(file) => Some(
            fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_target(false),
        ),
        Err(e) => {
            eprintln!("Warning: diagnostic log disabled: {:#}", e);
            None
        }
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
}

fn open_diagnostic_log(log_dir: &Path) -> Result<std::fs::File> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create {}", log_dir.display()))?;
    let path = log_dir.join(DIAGNOSTIC_LOG_FILE);
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open {}", path.display()))
}
