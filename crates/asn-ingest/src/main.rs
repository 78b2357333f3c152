//! ASN Ingest - warehouse shipment-notice ingestion service

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::info;

use asn_common::logging::{init_logging, LogConfig, LogLevel};
use asn_ingest::config::IngestConfig;
use asn_ingest::pipeline::{FileOutcome, IngestPipeline};
use asn_ingest::recovery;
use asn_ingest::store::IngestStore;
use asn_ingest::watcher::WatcherService;

#[derive(Parser)]
#[command(name = "asn-ingest")]
#[command(author, version, about = "ASN inbox ingestion service")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Watch the inbox directory and ingest new manifest files
    Watch,
    /// Ingest a single manifest file and exit
    Ingest {
        /// Path to the manifest file
        file: PathBuf,
    },
    /// Run one recovery pass over the inbox and exit
    Recover,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    let mut log_config = LogConfig::builder()
        .level(log_level)
        .file_prefix("asn-ingest")
        .build();
    // Fields with an ASN_LOG_* variable set are overridden; the flag and
    // the prefix stand otherwise.
    log_config.apply_env()?;
    init_logging(&log_config)?;

    let config = IngestConfig::from_env()?;

    let store = IngestStore::connect(&config.database, config.store).await?;
    let pipeline = IngestPipeline::new(store, config.batch_size);

    match cli.command {
        Command::Watch => {
            let totals = pipeline.store().totals().await?;
            info!(
                processed_files = totals.processed_files,
                boxes = totals.boxes,
                "Store ready"
            );

            let service = WatcherService::new(pipeline, &config);
            service.run(shutdown_signal()).await?;
            info!("Watcher stopped");
        }
        Command::Ingest { file } => {
            let file = tokio::fs::canonicalize(&file).await?;
            match pipeline.ingest_file(&file).await? {
                FileOutcome::Ingested(stats) => {
                    info!(
                        boxes = stats.boxes,
                        contents = stats.contents,
                        batches = stats.batches,
                        "File ingested"
                    );
                }
                FileOutcome::AlreadyProcessed => {
                    info!(path = %file.display(), "File already processed");
                }
            }
        }
        Command::Recover => {
            tokio::fs::create_dir_all(&config.watch_dir).await?;
            let dir = tokio::fs::canonicalize(&config.watch_dir).await?;
            let stats = recovery::recover_pending(&pipeline, &dir).await?;
            info!(
                scanned = stats.scanned,
                recovered = stats.recovered,
                already_processed = stats.already_processed,
                failed = stats.failed,
                "Recovery pass complete"
            );
        }
    }

    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }
}
