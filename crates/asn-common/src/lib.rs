//! ASN Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared building blocks for the ASN ingest workspace:
//!
//! - **Types**: the shipment records exchanged between parser and store
//! - **Logging**: tracing setup shared by every binary
//!
//! # Example
//!
//! ```no_run
//! use asn_common::logging::{init_logging, LogConfig};
//! use asn_common::BoxRecord;
//!
//! fn main() -> anyhow::Result<()> {
//!     init_logging(&LogConfig::from_env()?)?;
//!     let rec = BoxRecord::new("TRSP117", "6874454I");
//!     tracing::info!(box_id = %rec.box_id, "Parsed box");
//!     Ok(())
//! }
//! ```

pub mod logging;
pub mod types;

// Re-export commonly used types
pub use types::{BoxContent, BoxRecord};
