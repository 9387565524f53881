//! ASN ingest - main entry point

use anyhow::Context;
use asn_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use asn_ingest::config::Config;
use asn_ingest::watch::InboxWatcher;
use asn_ingest::{db, Cli, Commands, IngestOutcome, IngestPipeline};
use clap::Parser;
use std::process;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_config = LogConfig::builder()
        .level(if cli.verbose { LogLevel::Debug } else { LogLevel::Info })
        .output(LogOutput::Console)
        .log_file_prefix("asn-ingest")
        .build();

    // Environment variables take precedence over the flags
    let log_config = LogConfig::from_env_or(log_config.clone()).unwrap_or(log_config);

    // Keep the guard alive so buffered file logs are flushed on exit
    let _log_guard = match init_logging(&log_config) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Warning: logging disabled: {e}");
            None
        }
    };

    if let Err(e) = run(cli).await {
        error!(error = %e, "Command failed");
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load().context("Failed to load configuration")?;
    cli.apply_overrides(&mut config);
    config.validate()?;

    let pool = db::connect(&config.database)
        .await
        .context("Failed to open database")?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown requested");
                cancel.cancel();
            }
        }
    });

    let pipeline = IngestPipeline::new(pool.clone(), &config);

    let result = match cli.command.unwrap_or(Commands::Watch) {
        Commands::Watch => {
            let watcher = InboxWatcher::new(pipeline, &config.folders, config.watch.clone());
            watcher.run(cancel).await.map(|summary| {
                println!(
                    "Ingested {}, duplicates {}, failed {}, abandoned {}",
                    summary.ingested,
                    summary.duplicates,
                    summary.failed,
                    summary.abandoned.len()
                );
            })
        }
        Commands::Process { file } => {
            pipeline.ingest(&file, &cancel).await.map(|outcome| match outcome {
                IngestOutcome::AlreadyProcessed {
                    content_hash,
                    first_seen: Some(first),
                } => {
                    println!(
                        "Already processed as {} at {} ({content_hash}), nothing to do",
                        first.file_name,
                        first.processed_at.to_rfc3339()
                    );
                }
                IngestOutcome::AlreadyProcessed { content_hash, .. } => {
                    println!("Already processed ({content_hash}), nothing to do");
                }
                IngestOutcome::Ingested(report) => {
                    println!(
                        "Ingested {} boxes / {} lines in {} batches, archived to {}",
                        report.boxes,
                        report.lines,
                        report.batches,
                        report.archived_to.display()
                    );
                }
            })
        }
    };

    pool.close().await;
    result?;
    Ok(())
}
