//! fence-watcher - External fencing component
//!
//! Consumes fence requests written by the fence agent, runs the configured
//! fence mechanism and writes a response for each.

use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use fence_recorder::channel::FileChannel;
use fence_recorder::config::{WatcherArgs, WatcherConfig};
use fence_recorder::watcher::{RequestConsumer, WatchMode, WatcherStats};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let args = WatcherArgs::parse();
    setup_logging(args.verbose);

    let config = args.to_config().context("Invalid configuration")?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    ctrlc::set_handler(move || {
        if shutdown_clone.load(Ordering::Relaxed) {
            eprintln!("\nForce shutdown!");
            std::process::exit(130);
        }
        eprintln!("\nShutting down gracefully... (press Ctrl+C again to force)");
        shutdown_clone.store(true, Ordering::SeqCst);
    })
    .context("Failed to set signal handler")?;

    let channel = FileChannel::new(config.channel.clone());
    channel
        .ensure_dirs()
        .context("Failed to create channel directories")?;

    let actuator = config
        .actuator
        .build()
        .context("Failed to configure actuator")?;

    print_banner(&config, actuator.name());
    info!(
        request_dir = %config.channel.request_dir.display(),
        response_dir = %config.channel.response_dir.display(),
        mode = %config.watch_mode,
        actuator = actuator.name(),
        "External fence watcher started"
    );

    let mut consumer = RequestConsumer::new(channel, actuator, config.consumer.clone());
    let mut scheduler = config.watch_mode.scheduler(
        config.poll_interval,
        config.rescan_interval,
        shutdown.clone(),
    );
    scheduler
        .run(&mut consumer)
        .await
        .context("Watcher stopped unexpectedly")?;

    print_summary(consumer.stats());
    Ok(())
}

fn setup_logging(verbose: bool) {
    let default = if verbose {
        "fence_recorder=debug,warn"
    } else {
        "fence_recorder=info,warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();
}

fn print_banner(config: &WatcherConfig, actuator: &str) {
    println!(
        "{} Watching {}",
        style("[Watcher]").cyan().bold(),
        style(config.channel.request_dir.display()).green()
    );
    println!("  Responses: {}", style(config.channel.response_dir.display()).yellow());
    let trigger = match config.watch_mode {
        WatchMode::Events => format!("events (rescan every {:?})", config.rescan_interval),
        WatchMode::Poll => format!("poll every {:?}", config.poll_interval),
    };
    println!("  Trigger: {}", style(trigger).dim());
    println!(
        "  Actuator: {} (timeout {:?})",
        style(actuator).green(),
        config.consumer.actuator_timeout
    );
    println!("  Request retention: {}", style(config.consumer.request_retention).dim());
}

fn print_summary(stats: &WatcherStats) {
    println!();
    println!("{}", style("Watcher Stopped").green().bold());
    println!("  Scans: {}", style(stats.passes).dim());
    println!("  Requests processed: {}", style(stats.processed).cyan());
    println!("  Fenced successfully: {}", style(stats.succeeded).green());
    if stats.failed > 0 {
        println!("  Fence failures: {}", style(stats.failed).red());
    }
    println!("  Skipped: {}", style(stats.skipped).dim());
    if stats.rejected > 0 {
        println!("  Rejected: {}", style(stats.rejected).red());
    }
}
