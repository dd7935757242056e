//! CLI entry point for the wishlist tool.

use std::io::{self, IsTerminal};
use std::sync::Arc;
use std::sync::atomic::Ordering;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info};
use wishlist_core::{Config, DownloadStats, Pipeline};

mod cli;
mod progress;

use cli::{Args, Command};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");

    let mut config = Config::load(args.config.as_deref(), &args.config_dir())
        .context("failed to load configuration")?;
    args.apply_overrides(&mut config);
    let download_progress = Arc::new(DownloadStats::new());
    let pipeline = Pipeline::new(config)?.with_download_progress(Arc::clone(&download_progress));

    info!(work_dir = %pipeline.config().work_dir.display(), "wishlist starting");

    let command = args.command();
    let use_spinner = matches!(command, Command::Run | Command::Download)
        && progress::should_use_spinner(
            io::stderr().is_terminal(),
            args.quiet,
            progress::is_dumb_terminal(),
        );
    let (progress_handle, progress_stop) =
        progress::spawn_progress_ui(use_spinner, download_progress);

    let result = dispatch(&args, command, &pipeline).await;

    progress_stop.store(true, Ordering::SeqCst);
    if let Some(handle) = progress_handle {
        let _ = handle.await;
    }
    result
}

async fn dispatch(args: &Args, command: Command, pipeline: &Pipeline) -> Result<()> {
    match command {
        Command::Run => {
            let summary = pipeline.run().await?;
            report(args, &summary);
        }
        Command::Ingest { retry_failures } => {
            let ingest = pipeline.ingest(retry_failures)?;
            report(
                args,
                format_args!(
                    "ingest: {} capture file(s), {} added, {} duplicate(s){}",
                    ingest.capture_files,
                    ingest.added,
                    ingest.duplicates,
                    if ingest.reseeded_failures {
                        ", failure log re-queued"
                    } else {
                        ""
                    }
                ),
            );
        }
        Command::Resolve => {
            let stats = pipeline.resolve().await?;
            report(
                args,
                format_args!(
                    "resolve: {} attempted, {} succeeded, {} failed ({} rate limited) in {} batch(es)",
                    stats.attempted, stats.succeeded, stats.failed, stats.rate_limited, stats.batches
                ),
            );
        }
        Command::Download => {
            let stats = pipeline.download().await?;
            report(
                args,
                format_args!(
                    "download: {} attempted, {} succeeded, {} failed",
                    stats.attempted(),
                    stats.succeeded(),
                    stats.failed()
                ),
            );
        }
        Command::Reconcile => {
            let outcome = pipeline.reconcile()?;
            if outcome.logs_found {
                report(
                    args,
                    format_args!(
                        "reconcile: {} failed, {} completed, {} still pending",
                        outcome.failed.len(),
                        outcome.completed,
                        outcome.kept
                    ),
                );
            } else {
                report(args, "reconcile: no run logs found, nothing to do");
            }
        }
    }

    Ok(())
}

fn report(args: &Args, summary: impl std::fmt::Display) {
    if !args.quiet {
        println!("{summary}");
    }
}
