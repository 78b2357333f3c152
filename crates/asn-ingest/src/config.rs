//! Service configuration
//!
//! Environment-driven settings for the watcher, the pipeline, and the
//! store. Every knob has a default, so the service runs with no
//! configuration at all; `ASN_*` variables override per deployment.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Default directory watched for manifest files
pub const DEFAULT_WATCH_DIR: &str = "./inbox";
/// Default number of boxes per store batch
pub const DEFAULT_BATCH_SIZE: usize = 1000;
/// Default settling delay before a newly detected file is read
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 2000;
/// Default SQLite database URL
pub const DEFAULT_DATABASE_URL: &str = "sqlite:asn.db";
/// Default connection pool size
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;
/// Default SQLite busy timeout
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

/// Top-level service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Directory watched for new manifest files
    pub watch_dir: PathBuf,
    /// Number of boxes handed to the store per transaction
    pub batch_size: usize,
    /// Milliseconds to wait after a detection event before reading the file
    pub settle_delay_ms: u64,
    /// Database settings
    pub database: DatabaseConfig,
    /// Store policies (uniqueness scope, conflict handling)
    pub store: StorePolicy,
}

impl IngestConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> anyhow::Result<Self> {
        let config = Self {
            watch_dir: std::env::var("ASN_WATCH_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_WATCH_DIR)),
            batch_size: std::env::var("ASN_BATCH_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_BATCH_SIZE),
            settle_delay_ms: std::env::var("ASN_SETTLE_DELAY_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_SETTLE_DELAY_MS),
            database: DatabaseConfig::from_env(),
            store: StorePolicy::from_env()?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.watch_dir.as_os_str().is_empty() {
            anyhow::bail!("ASN_WATCH_DIR cannot be empty");
        }
        if self.batch_size == 0 {
            anyhow::bail!("ASN_BATCH_SIZE must be greater than 0");
        }
        self.database.validate()?;
        Ok(())
    }

    /// Settling delay as a [`Duration`]
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            watch_dir: PathBuf::from(DEFAULT_WATCH_DIR),
            batch_size: DEFAULT_BATCH_SIZE,
            settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
            database: DatabaseConfig::default(),
            store: StorePolicy::default(),
        }
    }
}

/// Database connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// sqlx SQLite URL, e.g. `sqlite:asn.db`
    pub url: String,
    /// Connection pool size
    pub max_connections: u32,
    /// SQLite busy timeout in milliseconds
    pub busy_timeout_ms: u64,
}

impl DatabaseConfig {
    pub fn from_env() -> Self {
        Self {
            url: std::env::var("ASN_DATABASE_URL")
                .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
            max_connections: std::env::var("ASN_DB_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_MAX_CONNECTIONS),
            busy_timeout_ms: std::env::var("ASN_DB_BUSY_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_BUSY_TIMEOUT_MS),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.url.is_empty() {
            anyhow::bail!("ASN_DATABASE_URL cannot be empty");
        }
        if self.max_connections == 0 {
            anyhow::bail!("ASN_DB_MAX_CONNECTIONS must be greater than 0");
        }
        Ok(())
    }

    /// Busy timeout as a [`Duration`]
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

/// Store policies derived from the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct StorePolicy {
    /// Scope of the uniqueness key enforced on box contents
    pub content_key: ContentKeyScope,
    /// How row-level uniqueness collisions are handled during inserts
    pub on_conflict: ConflictPolicy,
}

impl StorePolicy {
    /// Read both policies from the environment. Unset variables fall back
    /// to the defaults; unrecognized values are an error rather than a
    /// silent fallback.
    pub fn from_env() -> anyhow::Result<Self> {
        let content_key = match std::env::var("ASN_CONTENT_KEY") {
            Ok(s) => s.parse()?,
            Err(_) => ContentKeyScope::default(),
        };
        let on_conflict = match std::env::var("ASN_ON_CONFLICT") {
            Ok(s) => s.parse()?,
            Err(_) => ConflictPolicy::default(),
        };
        Ok(Self {
            content_key,
            on_conflict,
        })
    }
}

/// Scope of the uniqueness key enforced on `box_contents`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ContentKeyScope {
    /// `(po_number, isbn)` is unique across every ingested file.
    #[default]
    Corpus,
    /// `(po_number, isbn)` is unique only within its originating file.
    PerFile,
}

impl FromStr for ContentKeyScope {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "corpus" | "global" => Ok(ContentKeyScope::Corpus),
            "per-file" | "per_file" | "file" => Ok(ContentKeyScope::PerFile),
            _ => anyhow::bail!(
                "Invalid ASN_CONTENT_KEY: {}. Must be 'corpus' or 'per-file'",
                s
            ),
        }
    }
}

impl std::fmt::Display for ContentKeyScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContentKeyScope::Corpus => write!(f, "corpus"),
            ContentKeyScope::PerFile => write!(f, "per-file"),
        }
    }
}

/// How uniqueness collisions are handled while inserting rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// Fail the batch; the transaction rolls back and the file stays
    /// unprocessed.
    #[default]
    Fail,
    /// Skip colliding rows and keep going. Lets a partially committed
    /// file complete on retry at the cost of masking duplicate data.
    Skip,
}

impl FromStr for ConflictPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fail" | "strict" => Ok(ConflictPolicy::Fail),
            "skip" | "ignore" => Ok(ConflictPolicy::Skip),
            _ => anyhow::bail!("Invalid ASN_ON_CONFLICT: {}. Must be 'fail' or 'skip'", s),
        }
    }
}

impl std::fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictPolicy::Fail => write!(f, "fail"),
            ConflictPolicy::Skip => write!(f, "skip"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = IngestConfig::default();
        assert_eq!(config.watch_dir, PathBuf::from("./inbox"));
        assert_eq!(config.batch_size, 1000);
        assert_eq!(config.settle_delay_ms, 2000);
        assert_eq!(config.database.url, "sqlite:asn.db");
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.store.content_key, ContentKeyScope::Corpus);
        assert_eq!(config.store.on_conflict, ConflictPolicy::Fail);
    }

    #[test]
    fn test_validate_default_config() {
        let config = IngestConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_batch_size() {
        let config = IngestConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_database_url() {
        let config = IngestConfig {
            database: DatabaseConfig {
                url: String::new(),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_connections() {
        let config = IngestConfig {
            database: DatabaseConfig {
                max_connections: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duration_helpers() {
        let config = IngestConfig {
            settle_delay_ms: 250,
            ..Default::default()
        };
        assert_eq!(config.settle_delay(), Duration::from_millis(250));
        assert_eq!(
            config.database.busy_timeout(),
            Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS)
        );
    }

    #[test]
    fn test_content_key_scope_from_str() {
        assert_eq!(
            "corpus".parse::<ContentKeyScope>().unwrap(),
            ContentKeyScope::Corpus
        );
        assert_eq!(
            "per-file".parse::<ContentKeyScope>().unwrap(),
            ContentKeyScope::PerFile
        );
        assert_eq!(
            "PER_FILE".parse::<ContentKeyScope>().unwrap(),
            ContentKeyScope::PerFile
        );
        assert!("boxwise".parse::<ContentKeyScope>().is_err());
    }

    #[test]
    fn test_conflict_policy_from_str() {
        assert_eq!("fail".parse::<ConflictPolicy>().unwrap(), ConflictPolicy::Fail);
        assert_eq!("skip".parse::<ConflictPolicy>().unwrap(), ConflictPolicy::Skip);
        assert_eq!(
            "IGNORE".parse::<ConflictPolicy>().unwrap(),
            ConflictPolicy::Skip
        );
        assert!("merge".parse::<ConflictPolicy>().is_err());
    }

    #[test]
    fn test_policy_display_round_trip() {
        for scope in [ContentKeyScope::Corpus, ContentKeyScope::PerFile] {
            assert_eq!(scope.to_string().parse::<ContentKeyScope>().unwrap(), scope);
        }
        for policy in [ConflictPolicy::Fail, ConflictPolicy::Skip] {
            assert_eq!(policy.to_string().parse::<ConflictPolicy>().unwrap(), policy);
        }
    }
}
