//! Error types for the ASN ingest service

use thiserror::Error;

/// Result type alias using IngestError
pub type Result<T> = std::result::Result<T, IngestError>;

/// Failures raised by the ingestion pipeline and its collaborators.
///
/// The variants split into two classes: per-file failures, which abandon
/// one file and leave the service running, and infrastructure failures
/// ([`is_fatal`](IngestError::is_fatal)), which stop the whole loop.
#[derive(Error, Debug)]
pub enum IngestError {
    /// Filesystem failure while reading a manifest or listing the inbox.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Store failure other than a mapped uniqueness conflict.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration failure at startup.
    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// Structural error in a manifest; fatal for that file only.
    #[error("Parse error in {file}: {source}")]
    Parse {
        file: String,
        #[source]
        source: crate::parser::ParseError,
    },

    /// Uniqueness violation with no ledger row for the file: the file's
    /// rows collide with data from another ingestion. The file stays
    /// unprocessed and eligible for retry.
    #[error("Conflict ingesting {file}: {detail}")]
    Conflict { file: String, detail: String },

    /// Failure registering or running the filesystem watch.
    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),
}

impl IngestError {
    pub fn parse(file: impl Into<String>, source: crate::parser::ParseError) -> Self {
        Self::Parse {
            file: file.into(),
            source,
        }
    }

    pub fn conflict(file: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Conflict {
            file: file.into(),
            detail: detail.into(),
        }
    }

    /// Whether this failure should stop the whole service rather than
    /// abandon a single file. Store-level errors mean the shared resource
    /// is unavailable; everything else is confined to one file.
    pub fn is_fatal(&self) -> bool {
        matches!(self, IngestError::Database(_) | IngestError::Migrate(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ParseError;

    #[test]
    fn test_database_errors_are_fatal() {
        let err = IngestError::Database(sqlx::Error::PoolClosed);
        assert!(err.is_fatal());
    }

    #[test]
    fn test_per_file_errors_are_not_fatal() {
        let parse = IngestError::parse(
            "inbox/asn-001.txt",
            ParseError::InvalidQuantity {
                line: 3,
                token: "abc".to_string(),
            },
        );
        assert!(!parse.is_fatal());

        let conflict = IngestError::conflict("inbox/asn-001.txt", "UNIQUE constraint failed");
        assert!(!conflict.is_fatal());

        let io = IngestError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert!(!io.is_fatal());
    }

    #[test]
    fn test_parse_error_display_names_file_and_line() {
        let err = IngestError::parse(
            "inbox/asn-001.txt",
            ParseError::InvalidQuantity {
                line: 7,
                token: "12x".to_string(),
            },
        );
        let msg = err.to_string();
        assert!(msg.contains("inbox/asn-001.txt"));
    }
}
