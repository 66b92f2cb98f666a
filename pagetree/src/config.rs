//! Store configuration module.
//!
//! Loads the settings for opening a [`FileStore`] and creating trees in it
//! from environment variables.
//!
//! # Environment Variables
//!
//! - `PAGETREE_DATA_PATH`: Store file path (default: `./data/pagetree.db`)
//! - `PAGETREE_ENCODING`: `compact` or `legacy` (default: `compact`)
//! - `PAGETREE_PAGE_CAPACITY`: Node capacity for new trees (default: `16`)
//! - `PAGETREE_SYNC_ON_WRITE`: `true` or `false` (default: `false`)
//!
//! # Invariants
//!
//! - `page_capacity` is always even and at least 2
//! - `encoding` only applies to stores created from this config; an existing
//!   store keeps the encoding recorded in its superblock

use std::path::PathBuf;

use crate::btree::{DEFAULT_PAGE_CAPACITY, TreeOptions};
use crate::encoding::Encoding;
use crate::storage::{FileStore, StorageError};

const DATA_PATH_VAR: &str = "PAGETREE_DATA_PATH";
const ENCODING_VAR: &str = "PAGETREE_ENCODING";
const PAGE_CAPACITY_VAR: &str = "PAGETREE_PAGE_CAPACITY";
const SYNC_ON_WRITE_VAR: &str = "PAGETREE_SYNC_ON_WRITE";

/// Store configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Path of the store file.
    pub data_path: PathBuf,
    /// Persisted encoding used when the store file is created.
    pub encoding: Encoding,
    /// Node capacity for trees created with [`StoreConfig::tree_options`].
    pub page_capacity: u32,
    /// Sync the file after every mutating call.
    pub sync_on_write: bool,
}

/// Error returned when loading configuration fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
}

impl ConfigError {
    fn invalid(name: &str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            name: name.to_string(),
            message: message.into(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from(Self::DEFAULT_DATA_PATH),
            encoding: Encoding::Compact,
            page_capacity: DEFAULT_PAGE_CAPACITY,
            sync_on_write: false,
        }
    }
}

impl StoreConfig {
    /// Default store file path.
    pub const DEFAULT_DATA_PATH: &'static str = "./data/pagetree.db";

    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `PAGETREE_ENCODING` is set but names no known encoding
    /// - `PAGETREE_PAGE_CAPACITY` is set but is not an even number of at least 2
    /// - `PAGETREE_SYNC_ON_WRITE` is set but is not `true` or `false`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to its
    /// value. Unset variables take their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let data_path = lookup(DATA_PATH_VAR).map_or(defaults.data_path, PathBuf::from);

        let encoding = match lookup(ENCODING_VAR) {
            Some(value) => value
                .parse::<Encoding>()
                .map_err(|message| ConfigError::invalid(ENCODING_VAR, message))?,
            None => defaults.encoding,
        };

        let page_capacity = match lookup(PAGE_CAPACITY_VAR) {
            Some(value) => Self::parse_page_capacity(&value)?,
            None => defaults.page_capacity,
        };

        let sync_on_write = match lookup(SYNC_ON_WRITE_VAR) {
            Some(value) => value.trim().parse::<bool>().map_err(|_| {
                ConfigError::invalid(
                    SYNC_ON_WRITE_VAR,
                    format!("'{value}' is not 'true' or 'false'"),
                )
            })?,
            None => defaults.sync_on_write,
        };

        Ok(Self {
            data_path,
            encoding,
            page_capacity,
            sync_on_write,
        })
    }

    fn parse_page_capacity(value: &str) -> Result<u32, ConfigError> {
        let capacity = value.trim().parse::<u32>().map_err(|_| {
            ConfigError::invalid(PAGE_CAPACITY_VAR, format!("'{value}' is not a number"))
        })?;
        if capacity < 2 || capacity % 2 != 0 || i32::try_from(capacity).is_err() {
            return Err(ConfigError::invalid(
                PAGE_CAPACITY_VAR,
                format!("{capacity} is not an even number of at least 2"),
            ));
        }
        Ok(capacity)
    }

    /// Open the configured store, creating it and its parent directory if
    /// the file does not exist yet.
    pub fn open_or_create(&self) -> Result<FileStore, StorageError> {
        let store = if self.data_path.exists() {
            FileStore::open(&self.data_path)?
        } else {
            if let Some(parent) = self.data_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            FileStore::create(&self.data_path, self.encoding)?
        };
        Ok(store.with_sync_on_write(self.sync_on_write))
    }

    /// Tree options carrying the configured page capacity.
    #[must_use]
    pub fn tree_options(&self) -> TreeOptions {
        TreeOptions::default().with_page_capacity(self.page_capacity)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::storage::RecordStore;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_default_values() {
        let config = StoreConfig::from_lookup(lookup(&[])).expect("defaults load");
        assert_eq!(config, StoreConfig::default());
        assert_eq!(config.data_path, PathBuf::from("./data/pagetree.db"));
        assert_eq!(config.encoding, Encoding::Compact);
        assert_eq!(config.page_capacity, 16);
        assert!(!config.sync_on_write);
    }

    #[test]
    fn test_all_values_set() {
        let config = StoreConfig::from_lookup(lookup(&[
            ("PAGETREE_DATA_PATH", "/tmp/trees.db"),
            ("PAGETREE_ENCODING", "Legacy"),
            ("PAGETREE_PAGE_CAPACITY", "64"),
            ("PAGETREE_SYNC_ON_WRITE", "true"),
        ]))
        .expect("config loads");

        assert_eq!(config.data_path, PathBuf::from("/tmp/trees.db"));
        assert_eq!(config.encoding, Encoding::Legacy);
        assert_eq!(config.page_capacity, 64);
        assert!(config.sync_on_write);
        assert_eq!(config.tree_options().page_capacity, 64);
    }

    #[test]
    fn test_invalid_encoding() {
        let result = StoreConfig::from_lookup(lookup(&[("PAGETREE_ENCODING", "zip")]));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { ref name, .. }) if name == "PAGETREE_ENCODING"
        ));
    }

    #[test]
    fn test_invalid_page_capacity() {
        for value in ["0", "7", "-2", "lots"] {
            let result = StoreConfig::from_lookup(lookup(&[("PAGETREE_PAGE_CAPACITY", value)]));
            assert!(result.is_err(), "capacity {value} should be rejected");
        }
    }

    #[test]
    fn test_invalid_sync_flag() {
        let result = StoreConfig::from_lookup(lookup(&[("PAGETREE_SYNC_ON_WRITE", "yes")]));
        assert_eq!(
            result.map(|_| ()).map_err(|e| e.to_string()),
            Err("invalid value for PAGETREE_SYNC_ON_WRITE: 'yes' is not 'true' or 'false'"
                .to_string())
        );
    }

    #[test]
    fn test_open_or_create_makes_parent_directory() {
        let dir = tempfile::tempdir().expect("temp dir");
        let config = StoreConfig {
            data_path: dir.path().join("nested").join("store.db"),
            encoding: Encoding::Legacy,
            ..StoreConfig::default()
        };

        let store = config.open_or_create().expect("create store");
        assert_eq!(store.encoding(), Encoding::Legacy);
        let id = store.insert(b"hello").expect("insert");
        store.close().expect("close");

        // Reopening ignores the configured encoding.
        let reopen = StoreConfig {
            encoding: Encoding::Compact,
            ..config
        };
        let store = reopen.open_or_create().expect("open store");
        assert_eq!(store.encoding(), Encoding::Legacy);
        assert_eq!(store.fetch(id).expect("fetch"), b"hello".to_vec());
    }
}
