//! Configuration management
//!
//! Settings come from the environment (a `.env` file is loaded first) with the
//! defaults below. Folder settings resolve against the data root unless they
//! are absolute.

use sqlx::sqlite::SqliteSynchronous;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{IngestError, Result};

// ============================================================================
// Configuration Constants
// ============================================================================

/// Default SQLite database file.
pub const DEFAULT_DATABASE_PATH: &str = "asn.db";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 5;

/// Default time a connection waits on a locked database, in seconds.
pub const DEFAULT_DATABASE_BUSY_TIMEOUT_SECS: u64 = 30;

/// Default synchronous mode. WAL + NORMAL keeps commits atomic while skipping
/// the fsync on every transaction.
pub const DEFAULT_DATABASE_SYNCHRONOUS: &str = "normal";

/// Default root under which the inbox, archive and failure folders live.
pub const DEFAULT_DATA_ROOT: &str = "data";

pub const DEFAULT_INBOX_FOLDER: &str = "inbox";
pub const DEFAULT_ARCHIVE_FOLDER: &str = "archive";
pub const DEFAULT_FAILED_FOLDER: &str = "failed";

/// Default number of boxes buffered before a flush.
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

/// Default capacity of the watcher's work queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Only files with this extension are picked up by the watcher.
pub const DEFAULT_FILE_EXTENSION: &str = "txt";

/// Default interval between file-size polls while a file settles.
pub const DEFAULT_SETTLE_POLL_MS: u64 = 250;

/// Default number of size polls before a file is handed over regardless.
pub const DEFAULT_SETTLE_MAX_POLLS: u32 = 20;

/// Full configuration of the ingestion service
#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub folders: FolderConfig,
    pub ingest: IngestSettings,
    pub watch: WatchConfig,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
    pub busy_timeout_secs: u64,
    pub synchronous: SqliteSynchronous,
}

/// Inbox, archive and failure folder locations
#[derive(Debug, Clone)]
pub struct FolderConfig {
    pub data_root: PathBuf,
    pub inbox_folder: PathBuf,
    pub archive_folder: PathBuf,
    pub failed_folder: PathBuf,
}

/// Write-path settings
#[derive(Debug, Clone)]
pub struct IngestSettings {
    /// Boxes buffered per flush
    pub batch_size: usize,
}

/// Inbox watcher settings
#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub queue_capacity: usize,
    pub file_extension: String,
    pub settle_poll_interval_ms: u64,
    pub settle_max_polls: u32,
    /// Move files whose content was already ingested into the archive
    pub archive_duplicates: bool,
}

impl FolderConfig {
    pub fn inbox_path(&self) -> PathBuf {
        self.data_root.join(&self.inbox_folder)
    }

    pub fn archive_path(&self) -> PathBuf {
        self.data_root.join(&self.archive_folder)
    }

    pub fn failed_path(&self) -> PathBuf {
        self.data_root.join(&self.failed_folder)
    }

    /// Put all three folders under `root`
    pub fn rooted_at(root: impl AsRef<Path>) -> Self {
        Self {
            data_root: root.as_ref().to_path_buf(),
            ..Self::default()
        }
    }
}

impl WatchConfig {
    pub fn settle_poll_interval(&self) -> Duration {
        Duration::from_millis(self.settle_poll_interval_ms)
    }

    /// Whether `path` carries the configured extension (case-insensitive)
    pub fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(&self.file_extension))
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_path(key: &str, default: &str) -> PathBuf {
    std::env::var(key)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(default))
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        let config = Self::from_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Read the environment without loading `.env` or validating
    pub fn from_env() -> Result<Self> {
        let synchronous_raw = std::env::var("ASN_DB_SYNCHRONOUS")
            .unwrap_or_else(|_| DEFAULT_DATABASE_SYNCHRONOUS.to_string());
        let synchronous = SqliteSynchronous::from_str(synchronous_raw.trim()).map_err(|_| {
            IngestError::config(format!(
                "Invalid ASN_DB_SYNCHRONOUS '{}'. Must be off, normal, full or extra",
                synchronous_raw
            ))
        })?;

        Ok(Config {
            database: DatabaseConfig {
                path: env_path("ASN_DATABASE_PATH", DEFAULT_DATABASE_PATH),
                max_connections: env_or("ASN_DB_MAX_CONNECTIONS", DEFAULT_DATABASE_MAX_CONNECTIONS),
                busy_timeout_secs: env_or(
                    "ASN_DB_BUSY_TIMEOUT_SECS",
                    DEFAULT_DATABASE_BUSY_TIMEOUT_SECS,
                ),
                synchronous,
            },
            folders: FolderConfig {
                data_root: env_path("ASN_DATA_ROOT", DEFAULT_DATA_ROOT),
                inbox_folder: env_path("ASN_INBOX_FOLDER", DEFAULT_INBOX_FOLDER),
                archive_folder: env_path("ASN_ARCHIVE_FOLDER", DEFAULT_ARCHIVE_FOLDER),
                failed_folder: env_path("ASN_FAILED_FOLDER", DEFAULT_FAILED_FOLDER),
            },
            ingest: IngestSettings {
                batch_size: env_or("ASN_BATCH_SIZE", DEFAULT_BATCH_SIZE),
            },
            watch: WatchConfig {
                queue_capacity: env_or("ASN_QUEUE_CAPACITY", DEFAULT_QUEUE_CAPACITY),
                file_extension: std::env::var("ASN_FILE_EXTENSION")
                    .map(|ext| ext.trim_start_matches('.').to_string())
                    .unwrap_or_else(|_| DEFAULT_FILE_EXTENSION.to_string()),
                settle_poll_interval_ms: env_or("ASN_SETTLE_POLL_MS", DEFAULT_SETTLE_POLL_MS),
                settle_max_polls: env_or("ASN_SETTLE_MAX_POLLS", DEFAULT_SETTLE_MAX_POLLS),
                archive_duplicates: env_or("ASN_ARCHIVE_DUPLICATES", false),
            },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.database.path.as_os_str().is_empty() {
            return Err(IngestError::config("Database path cannot be empty"));
        }

        if self.database.max_connections == 0 {
            return Err(IngestError::config(
                "ASN_DB_MAX_CONNECTIONS must be greater than 0",
            ));
        }

        if self.ingest.batch_size == 0 {
            return Err(IngestError::config("ASN_BATCH_SIZE must be greater than 0"));
        }

        if self.watch.queue_capacity == 0 {
            return Err(IngestError::config(
                "ASN_QUEUE_CAPACITY must be greater than 0",
            ));
        }

        if self.folders.archive_path() == self.folders.failed_path() {
            return Err(IngestError::config(format!(
                "Archive and failure folders must differ (both are '{}')",
                self.folders.archive_path().display()
            )));
        }

        if self.folders.inbox_path() == self.folders.archive_path()
            || self.folders.inbox_path() == self.folders.failed_path()
        {
            return Err(IngestError::config(
                "Inbox folder must differ from the archive and failure folders",
            ));
        }

        Ok(())
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_DATABASE_PATH),
            max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
            busy_timeout_secs: DEFAULT_DATABASE_BUSY_TIMEOUT_SECS,
            synchronous: SqliteSynchronous::Normal,
        }
    }
}

impl Default for FolderConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from(DEFAULT_DATA_ROOT),
            inbox_folder: PathBuf::from(DEFAULT_INBOX_FOLDER),
            archive_folder: PathBuf::from(DEFAULT_ARCHIVE_FOLDER),
            failed_folder: PathBuf::from(DEFAULT_FAILED_FOLDER),
        }
    }
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            file_extension: DEFAULT_FILE_EXTENSION.to_string(),
            settle_poll_interval_ms: DEFAULT_SETTLE_POLL_MS,
            settle_max_polls: DEFAULT_SETTLE_MAX_POLLS,
            archive_duplicates: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            folders: FolderConfig::default(),
            ingest: IngestSettings::default(),
            watch: WatchConfig::default(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    // Every variable `Config::from_env` reads
    const VARS: &[&str] = &[
        "ASN_DATABASE_PATH",
        "ASN_DB_MAX_CONNECTIONS",
        "ASN_DB_BUSY_TIMEOUT_SECS",
        "ASN_DB_SYNCHRONOUS",
        "ASN_DATA_ROOT",
        "ASN_INBOX_FOLDER",
        "ASN_ARCHIVE_FOLDER",
        "ASN_FAILED_FOLDER",
        "ASN_BATCH_SIZE",
        "ASN_QUEUE_CAPACITY",
        "ASN_FILE_EXTENSION",
        "ASN_SETTLE_POLL_MS",
        "ASN_SETTLE_MAX_POLLS",
        "ASN_ARCHIVE_DUPLICATES",
    ];

    fn clear_env() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.ingest.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.folders.inbox_path(), PathBuf::from("data/inbox"));
        assert_eq!(config.folders.archive_path(), PathBuf::from("data/archive"));
        assert_eq!(config.folders.failed_path(), PathBuf::from("data/failed"));
    }

    #[test]
    #[serial]
    fn test_config_from_env() {
        clear_env();
        std::env::set_var("ASN_DATABASE_PATH", "/tmp/asn-test.db");
        std::env::set_var("ASN_BATCH_SIZE", "10");
        std::env::set_var("ASN_DB_SYNCHRONOUS", "off");
        std::env::set_var("ASN_FILE_EXTENSION", ".asn");
        std::env::set_var("ASN_ARCHIVE_DUPLICATES", "true");

        let config = Config::from_env().unwrap();
        assert_eq!(config.database.path, PathBuf::from("/tmp/asn-test.db"));
        assert_eq!(config.ingest.batch_size, 10);
        assert!(matches!(config.database.synchronous, SqliteSynchronous::Off));
        assert_eq!(config.watch.file_extension, "asn");
        assert!(config.watch.archive_duplicates);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_cleared_env_yields_defaults() {
        for var in VARS {
            std::env::set_var(var, "7");
        }
        clear_env();

        let config = Config::from_env().unwrap();
        assert_eq!(config.database.path, PathBuf::from(DEFAULT_DATABASE_PATH));
        assert_eq!(config.database.max_connections, DEFAULT_DATABASE_MAX_CONNECTIONS);
        assert_eq!(config.database.busy_timeout_secs, DEFAULT_DATABASE_BUSY_TIMEOUT_SECS);
        assert!(matches!(config.database.synchronous, SqliteSynchronous::Normal));
        assert_eq!(config.folders.inbox_path(), PathBuf::from("data/inbox"));
        assert_eq!(config.folders.archive_path(), PathBuf::from("data/archive"));
        assert_eq!(config.folders.failed_path(), PathBuf::from("data/failed"));
        assert_eq!(config.ingest.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.watch.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert_eq!(config.watch.file_extension, DEFAULT_FILE_EXTENSION);
        assert_eq!(config.watch.settle_poll_interval_ms, DEFAULT_SETTLE_POLL_MS);
        assert_eq!(config.watch.settle_max_polls, DEFAULT_SETTLE_MAX_POLLS);
        assert!(!config.watch.archive_duplicates);
    }

    #[test]
    #[serial]
    fn test_unparsable_number_falls_back_to_default() {
        clear_env();
        std::env::set_var("ASN_BATCH_SIZE", "lots");

        let config = Config::from_env().unwrap();
        assert_eq!(config.ingest.batch_size, DEFAULT_BATCH_SIZE);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_invalid_synchronous_mode() {
        clear_env();
        std::env::set_var("ASN_DB_SYNCHRONOUS", "sometimes");

        let result = Config::from_env();
        assert!(matches!(result, Err(IngestError::Config(_))));

        clear_env();
    }

    #[test]
    #[serial]
    fn test_absolute_folder_overrides_data_root() {
        clear_env();
        std::env::set_var("ASN_DATA_ROOT", "/srv/asn");
        std::env::set_var("ASN_ARCHIVE_FOLDER", "/mnt/cold/archive");

        let config = Config::from_env().unwrap();
        assert_eq!(config.folders.inbox_path(), PathBuf::from("/srv/asn/inbox"));
        assert_eq!(
            config.folders.archive_path(),
            PathBuf::from("/mnt/cold/archive")
        );

        clear_env();
    }

    #[test]
    fn test_validate_rejects_zero_batch_size() {
        let mut config = Config::default();
        config.ingest.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_shared_archive_and_failed_folder() {
        let mut config = Config::default();
        config.folders.failed_folder = PathBuf::from(DEFAULT_ARCHIVE_FOLDER);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_extension_matching() {
        let watch = WatchConfig::default();
        assert!(watch.matches(Path::new("inbox/asn_001.txt")));
        assert!(watch.matches(Path::new("inbox/ASN_002.TXT")));
        assert!(!watch.matches(Path::new("inbox/asn_003.txt.part")));
        assert!(!watch.matches(Path::new("inbox/README")));
    }
}
