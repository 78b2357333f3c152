//! Startup recovery
//!
//! Reconciles the watched directory against the processed-file ledger once
//! per service start. Files dropped while the service was down, or files
//! whose ingestion was interrupted before the final batch, show up here as
//! unprocessed and get ingested sequentially.

use std::collections::HashSet;
use std::path::Path;

use tracing::{error, info, warn};

use crate::error::Result;
use crate::pipeline::{file_identity, is_manifest, FileOutcome, IngestPipeline};

/// Counters from one recovery pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryStats {
    /// Manifest files found in the directory
    pub scanned: usize,
    /// Files ingested by this pass
    pub recovered: usize,
    /// Files already in the ledger
    pub already_processed: usize,
    /// Files that failed and were left for a later pass
    pub failed: usize,
}

/// Run one recovery pass over `dir`.
///
/// Per-file failures are logged, counted, and skipped; failures of the
/// directory listing or the store abort the pass.
pub async fn recover_pending(pipeline: &IngestPipeline, dir: &Path) -> Result<RecoveryStats> {
    info!(dir = %dir.display(), "Starting recovery scan");

    let processed: HashSet<String> = pipeline
        .store()
        .processed_files()
        .await?
        .into_iter()
        .collect();

    let mut stats = RecoveryStats::default();
    let mut entries = tokio::fs::read_dir(dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !entry.file_type().await?.is_file() || !is_manifest(&path) {
            continue;
        }

        stats.scanned += 1;
        if processed.contains(&file_identity(&path)) {
            stats.already_processed += 1;
            continue;
        }

        info!(path = %path.display(), "Recovering unprocessed file");
        match pipeline.ingest_file(&path).await {
            Ok(FileOutcome::Ingested(_)) => stats.recovered += 1,
            Ok(FileOutcome::AlreadyProcessed) => stats.already_processed += 1,
            Err(e) if e.is_fatal() => {
                error!(path = %path.display(), error = %e, "Recovery aborted by store failure");
                return Err(e);
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to recover file; leaving for retry");
                stats.failed += 1;
            }
        }
    }

    info!(
        scanned = stats.scanned,
        recovered = stats.recovered,
        already_processed = stats.already_processed,
        failed = stats.failed,
        "Recovery scan complete"
    );

    Ok(stats)
}
