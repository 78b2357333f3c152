//! Per-file ingestion pipeline
//!
//! Streams one manifest through the parser and flushes closed boxes to the
//! store in bounded batches. Shared by the live watcher, the recovery
//! scanner, and the one-shot CLI command.

use std::path::Path;

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use crate::error::{IngestError, Result};
use crate::parser::ManifestParser;
use crate::store::{BatchOutcome, IngestStore};

/// File extension accepted by the watcher and the recovery scanner.
pub const MANIFEST_EXTENSION: &str = "txt";

/// Whether `path` looks like an ASN manifest file.
pub fn is_manifest(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext == MANIFEST_EXTENSION)
}

/// Ledger identity of a file: its path rendered as a string. Callers
/// canonicalize paths before handing them in, so one on-disk file always
/// maps to one identity.
pub(crate) fn file_identity(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Outcome of ingesting one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    /// The file was fully ingested and recorded in the ledger.
    Ingested(FileStats),
    /// The ledger already had the file; nothing was written.
    AlreadyProcessed,
}

/// Counters for one ingested file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileStats {
    /// Boxes inserted
    pub boxes: usize,
    /// Content rows inserted
    pub contents: usize,
    /// Transactions committed, the final one included
    pub batches: usize,
    /// Input lines dropped as unrecognized or out of context
    pub dropped_lines: usize,
}

/// Parse-and-persist pipeline for manifest files.
#[derive(Clone)]
pub struct IngestPipeline {
    store: IngestStore,
    batch_size: usize,
}

impl IngestPipeline {
    pub fn new(store: IngestStore, batch_size: usize) -> Self {
        Self { store, batch_size }
    }

    pub fn store(&self) -> &IngestStore {
        &self.store
    }

    /// Ingest one manifest file end to end.
    ///
    /// Skips without reading when the ledger already has the file; the
    /// in-transaction gate inside the store covers the window between this
    /// check and the commits. A parse error abandons the file mid-stream,
    /// leaving any batches committed so far but never the ledger row, so
    /// the file stays eligible for a retry after the data is cleaned up.
    pub async fn ingest_file(&self, path: &Path) -> Result<FileOutcome> {
        let file_name = file_identity(path);

        if self.store.is_processed(&file_name).await? {
            info!(path = %path.display(), "File already processed; skipping");
            return Ok(FileOutcome::AlreadyProcessed);
        }

        info!(path = %path.display(), "Processing file");

        let file = File::open(path).await?;
        let mut lines = BufReader::new(file).lines();
        let mut parser = ManifestParser::new();
        let mut stats = FileStats::default();

        while let Some(line) = lines.next_line().await? {
            parser
                .feed_line(&line)
                .map_err(|e| IngestError::parse(&file_name, e))?;

            if parser.closed_len() >= self.batch_size {
                let batch = parser.drain_closed();
                match self.store.ingest_batch(&file_name, &batch, false).await? {
                    BatchOutcome::Committed { boxes, contents } => {
                        stats.boxes += boxes;
                        stats.contents += contents;
                        stats.batches += 1;
                        debug!(
                            path = %path.display(),
                            batch = stats.batches,
                            boxes,
                            "Batch committed"
                        );
                    }
                    BatchOutcome::AlreadyProcessed => {
                        return Ok(FileOutcome::AlreadyProcessed);
                    }
                }
            }
        }

        stats.dropped_lines = parser.dropped_lines();

        // The final batch carries the ledger row even when it holds no
        // boxes, so empty files are still marked processed.
        let last = parser.finish();
        match self.store.ingest_batch(&file_name, &last, true).await? {
            BatchOutcome::Committed { boxes, contents } => {
                stats.boxes += boxes;
                stats.contents += contents;
                stats.batches += 1;
            }
            BatchOutcome::AlreadyProcessed => {
                return Ok(FileOutcome::AlreadyProcessed);
            }
        }

        if stats.dropped_lines > 0 {
            warn!(
                path = %path.display(),
                dropped = stats.dropped_lines,
                "Unrecognized lines were dropped"
            );
        }

        info!(
            path = %path.display(),
            boxes = stats.boxes,
            contents = stats.contents,
            batches = stats.batches,
            "File ingested"
        );

        Ok(FileOutcome::Ingested(stats))
    }
}
