//! Inbox directory watcher
//!
//! Subscribes to OS file-system notifications for the inbox and dispatches
//! every new manifest to the pipeline after a settling delay. Detection
//! never waits on ingestion: each detected file runs as its own task, so a
//! large file cannot delay the next event.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::event::{EventKind, ModifyKind};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::IngestConfig;
use crate::error::{IngestError, Result};
use crate::pipeline::{is_manifest, FileOutcome, IngestPipeline};
use crate::recovery;

/// Watches the inbox directory and owns the dispatch of detected files.
pub struct WatcherService {
    pipeline: IngestPipeline,
    watch_dir: PathBuf,
    settle_delay: Duration,
}

impl WatcherService {
    pub fn new(pipeline: IngestPipeline, config: &IngestConfig) -> Self {
        Self {
            pipeline,
            watch_dir: config.watch_dir.clone(),
            settle_delay: config.settle_delay(),
        }
    }

    /// Run until `shutdown` resolves or a fatal ingestion failure is
    /// reported.
    ///
    /// The OS watch is registered before the recovery pass starts, so a
    /// file arriving in between is seen by at least one of the two; the
    /// ledger suppresses the duplicate. Shutdown stops detection but does
    /// not cancel ingestions already dispatched.
    pub async fn run(&self, shutdown: impl std::future::Future<Output = ()>) -> Result<()> {
        tokio::fs::create_dir_all(&self.watch_dir).await?;
        let watch_dir = tokio::fs::canonicalize(&self.watch_dir).await?;

        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<PathBuf>();
        let watcher = register_watch(&watch_dir, event_tx)?;
        info!(dir = %watch_dir.display(), "File watcher started");

        let (fatal_tx, mut fatal_rx) = mpsc::unbounded_channel::<IngestError>();

        // Recovery runs concurrently with live watching.
        let recovery_pipeline = self.pipeline.clone();
        let recovery_dir = watch_dir.clone();
        let recovery_fatal = fatal_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = recovery::recover_pending(&recovery_pipeline, &recovery_dir).await {
                let _ = recovery_fatal.send(e);
            }
        });

        tokio::pin!(shutdown);

        let result = loop {
            tokio::select! {
                maybe_path = event_rx.recv() => match maybe_path {
                    Some(path) => self.dispatch(path, fatal_tx.clone()),
                    None => {
                        error!("Watch event channel closed unexpectedly");
                        break Err(IngestError::Watch(notify::Error::generic(
                            "watch event channel closed",
                        )));
                    }
                },
                Some(err) = fatal_rx.recv() => {
                    error!(error = %err, "Stopping watcher: fatal ingestion failure");
                    break Err(err);
                },
                _ = &mut shutdown => {
                    info!("Shutdown requested; stopping file watcher");
                    break Ok(());
                },
            }
        };

        // Dropping the watcher releases the OS watch; dispatched
        // ingestions keep running on the runtime.
        drop(watcher);
        result
    }

    /// Fire-and-forget ingestion of one detected file.
    fn dispatch(&self, path: PathBuf, fatal_tx: mpsc::UnboundedSender<IngestError>) {
        if !is_manifest(&path) {
            debug!(path = %path.display(), "Ignoring non-manifest file");
            return;
        }

        info!(path = %path.display(), "New file detected");

        let pipeline = self.pipeline.clone();
        let settle = self.settle_delay;
        tokio::spawn(async move {
            // Give the writer time to finish flushing before we read.
            tokio::time::sleep(settle).await;

            match tokio::fs::try_exists(&path).await {
                Ok(true) => {}
                Ok(false) => {
                    warn!(path = %path.display(), "File disappeared before processing");
                    return;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Could not stat file; dropping trigger");
                    return;
                }
            }

            match pipeline.ingest_file(&path).await {
                Ok(FileOutcome::Ingested(stats)) => {
                    debug!(
                        path = %path.display(),
                        boxes = stats.boxes,
                        contents = stats.contents,
                        "File processed successfully"
                    );
                }
                Ok(FileOutcome::AlreadyProcessed) => {}
                Err(e) if e.is_fatal() => {
                    let _ = fatal_tx.send(e);
                }
                Err(e) => {
                    error!(path = %path.display(), error = %e, "Error processing file");
                }
            }
        });
    }
}

/// Register the OS watch and bridge its callback thread onto a tokio
/// channel.
fn register_watch(dir: &Path, tx: mpsc::UnboundedSender<PathBuf>) -> Result<RecommendedWatcher> {
    let mut watcher =
        notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
            Ok(event) => {
                if is_arrival(&event.kind) {
                    for path in event.paths {
                        let _ = tx.send(path);
                    }
                }
            }
            Err(e) => warn!(error = %e, "Watch backend error"),
        })?;

    watcher.watch(dir, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}

/// Creations plus renames, so files moved into the inbox atomically are
/// picked up too.
fn is_arrival(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(_))
    )
}
