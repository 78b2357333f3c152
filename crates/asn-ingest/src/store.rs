//! Ingestion store
//!
//! Persists parsed boxes and the processed-file ledger to SQLite through
//! sqlx. Each batch is one transaction, and the ledger row for a file is
//! written inside the same transaction as the file's final batch, so a file
//! becomes visible as processed exactly when its last data row commits.

use std::str::FromStr;
use std::time::Duration;

use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use asn_common::BoxRecord;

use crate::config::{ConflictPolicy, ContentKeyScope, DatabaseConfig, StorePolicy};
use crate::error::{IngestError, Result};

/// Attempts per batch before a busy database is reported as an error.
const MAX_BUSY_RETRIES: u32 = 3;

/// Outcome of one batch handed to [`IngestStore::ingest_batch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    /// The batch transaction committed. Counts are rows actually inserted,
    /// which under [`ConflictPolicy::Skip`] may be less than the batch held.
    Committed { boxes: usize, contents: usize },
    /// A ledger row for the file already exists; nothing was written.
    AlreadyProcessed,
}

/// Row totals, used for startup reporting and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreTotals {
    pub boxes: i64,
    pub contents: i64,
    pub processed_files: i64,
}

/// Handle to the shipment database. Cheap to clone; wraps a pool.
#[derive(Clone)]
pub struct IngestStore {
    pool: SqlitePool,
    policy: StorePolicy,
}

impl IngestStore {
    /// Open the database (creating the file if missing) and prepare the
    /// schema.
    pub async fn connect(config: &DatabaseConfig, policy: StorePolicy) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(config.busy_timeout())
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        Self::with_pool(pool, policy).await
    }

    /// Build a store over an existing pool, running migrations and ensuring
    /// the configured content-key index. Used directly by tests.
    pub async fn with_pool(pool: SqlitePool, policy: StorePolicy) -> Result<Self> {
        sqlx::migrate!("./migrations").run(&pool).await?;

        let store = Self { pool, policy };
        store.ensure_content_key_index().await?;
        Ok(store)
    }

    /// Create the uniqueness index matching the configured scope and drop
    /// the one for the other scope. The index is policy-dependent, which is
    /// why it lives here rather than in the migration.
    async fn ensure_content_key_index(&self) -> Result<()> {
        let (drop_other, create) = match self.policy.content_key {
            ContentKeyScope::Corpus => (
                "DROP INDEX IF EXISTS ux_box_contents_file_po_isbn",
                "CREATE UNIQUE INDEX IF NOT EXISTS ux_box_contents_po_isbn \
                 ON box_contents (po_number, isbn)",
            ),
            ContentKeyScope::PerFile => (
                "DROP INDEX IF EXISTS ux_box_contents_po_isbn",
                "CREATE UNIQUE INDEX IF NOT EXISTS ux_box_contents_file_po_isbn \
                 ON box_contents (source_file, po_number, isbn)",
            ),
        };

        sqlx::query(drop_other).execute(&self.pool).await?;
        sqlx::query(create).execute(&self.pool).await?;

        debug!(scope = %self.policy.content_key, "Content key index ensured");
        Ok(())
    }

    /// Whether a ledger row exists for the file identity.
    pub async fn is_processed(&self, file_name: &str) -> Result<bool> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM processed_files WHERE file_name = ?1",
        )
        .bind(file_name)
        .fetch_one(&self.pool)
        .await?;

        Ok(count > 0)
    }

    /// All file identities present in the ledger.
    pub async fn processed_files(&self) -> Result<Vec<String>> {
        let names = sqlx::query_scalar::<_, String>(
            "SELECT file_name FROM processed_files ORDER BY file_name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(names)
    }

    /// Row counts across all three tables.
    pub async fn totals(&self) -> Result<StoreTotals> {
        let boxes = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM boxes")
            .fetch_one(&self.pool)
            .await?;
        let contents = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM box_contents")
            .fetch_one(&self.pool)
            .await?;
        let processed_files = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM processed_files")
            .fetch_one(&self.pool)
            .await?;

        Ok(StoreTotals {
            boxes,
            contents,
            processed_files,
        })
    }

    /// Apply one batch of boxes for `file_name` in a single transaction.
    ///
    /// The transaction re-checks the ledger before writing, so a batch for
    /// an already-recorded file is a no-op even when the caller's earlier
    /// check raced another ingestion. When `final_batch` is true the ledger
    /// row is written with the batch, which is what makes the whole file
    /// all-or-nothing at its last commit.
    ///
    /// A uniqueness violation rolls the batch back. If a ledger row for the
    /// file exists by the time we re-check, a concurrent ingestion of the
    /// same file won and the result is [`BatchOutcome::AlreadyProcessed`];
    /// otherwise the collision is with foreign data and surfaces as
    /// [`IngestError::Conflict`].
    pub async fn ingest_batch(
        &self,
        file_name: &str,
        batch: &[BoxRecord],
        final_batch: bool,
    ) -> Result<BatchOutcome> {
        if batch.is_empty() && !final_batch {
            return Ok(BatchOutcome::Committed {
                boxes: 0,
                contents: 0,
            });
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_ingest_batch(file_name, batch, final_batch).await {
                Ok(outcome) => return Ok(outcome),
                Err(IngestError::Database(e)) if is_unique_violation(&e) => {
                    return if self.is_processed(file_name).await? {
                        info!(file = file_name, "File was ingested concurrently; skipping");
                        Ok(BatchOutcome::AlreadyProcessed)
                    } else {
                        Err(IngestError::conflict(file_name, e.to_string()))
                    };
                }
                // The gate SELECT makes every batch transaction
                // read-before-write. If another writer commits in between,
                // SQLite refuses the lock upgrade (SQLITE_BUSY_SNAPSHOT)
                // and the transaction must be retried on a fresh snapshot.
                Err(IngestError::Database(e)) if is_busy(&e) && attempt < MAX_BUSY_RETRIES => {
                    warn!(file = file_name, attempt, "Database busy; retrying batch");
                    tokio::time::sleep(Duration::from_millis(50 * u64::from(attempt))).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn try_ingest_batch(
        &self,
        file_name: &str,
        batch: &[BoxRecord],
        final_batch: bool,
    ) -> Result<BatchOutcome> {
        let mut tx = self.pool.begin().await?;

        let already = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM processed_files WHERE file_name = ?1",
        )
        .bind(file_name)
        .fetch_one(&mut *tx)
        .await?;

        if already > 0 {
            debug!(file = file_name, "Ledger already has file; batch skipped");
            return Ok(BatchOutcome::AlreadyProcessed);
        }

        let (insert_box, insert_content) = match self.policy.on_conflict {
            ConflictPolicy::Fail => (
                "INSERT INTO boxes (box_id, supplier_id) VALUES (?1, ?2)",
                r#"
                INSERT INTO box_contents (box_id, po_number, isbn, quantity, source_file)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            ),
            ConflictPolicy::Skip => (
                "INSERT OR IGNORE INTO boxes (box_id, supplier_id) VALUES (?1, ?2)",
                r#"
                INSERT OR IGNORE INTO box_contents (box_id, po_number, isbn, quantity, source_file)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            ),
        };

        let mut boxes_inserted = 0usize;
        let mut contents_inserted = 0usize;
        let mut rows_skipped = 0usize;

        for record in batch {
            let result = sqlx::query(insert_box)
                .bind(&record.box_id)
                .bind(&record.supplier_id)
                .execute(&mut *tx)
                .await?;
            if result.rows_affected() > 0 {
                boxes_inserted += 1;
            } else {
                rows_skipped += 1;
            }

            for content in &record.contents {
                let result = sqlx::query(insert_content)
                    .bind(&record.box_id)
                    .bind(&content.po_number)
                    .bind(&content.isbn)
                    .bind(i64::from(content.quantity))
                    .bind(file_name)
                    .execute(&mut *tx)
                    .await?;
                if result.rows_affected() > 0 {
                    contents_inserted += 1;
                } else {
                    rows_skipped += 1;
                }
            }
        }

        if final_batch {
            // Always a strict insert: two ledger rows for one file would
            // mean the idempotency gate failed.
            sqlx::query("INSERT INTO processed_files (file_name, processed_at) VALUES (?1, ?2)")
                .bind(file_name)
                .bind(Utc::now())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        if rows_skipped > 0 {
            warn!(
                file = file_name,
                skipped = rows_skipped,
                "Duplicate rows skipped by conflict policy"
            );
        }

        Ok(BatchOutcome::Committed {
            boxes: boxes_inserted,
            contents: contents_inserted,
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err.as_database_error(), Some(db) if db.is_unique_violation())
}

/// Busy result codes, the snapshot-upgrade variant included. Plain lock
/// waits are already absorbed by the configured busy timeout.
fn is_busy(err: &sqlx::Error) -> bool {
    matches!(
        err.as_database_error().and_then(|db| db.code()),
        Some(code) if code == "5" || code == "261" || code == "517"
    )
}
