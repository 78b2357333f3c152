//! ASN Ingest Library
//!
//! Ingestion core for the warehouse advance-shipment-notice pipeline:
//! watches an inbox directory for manifest files, parses them into box
//! records, and persists each file exactly once behind a processed-file
//! ledger.
//!
//! # Example
//!
//! ```no_run
//! use asn_ingest::config::IngestConfig;
//! use asn_ingest::pipeline::IngestPipeline;
//! use asn_ingest::store::IngestStore;
//! use asn_ingest::watcher::WatcherService;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = IngestConfig::from_env()?;
//!     let store = IngestStore::connect(&config.database, config.store).await?;
//!     let pipeline = IngestPipeline::new(store, config.batch_size);
//!
//!     WatcherService::new(pipeline, &config)
//!         .run(std::future::pending::<()>())
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod parser;
pub mod pipeline;
pub mod recovery;
pub mod store;
pub mod watcher;

pub use error::{IngestError, Result};
