//! In-memory record store with fault injection.
//!
//! Records live in a `HashMap` keyed by one-up ids. A seeded RNG decides
//! whether each call fails, so the same seed always produces the same
//! failure pattern:
//! - Read errors on `fetch`
//! - Write errors on `insert`, `update`, and `delete`

use std::collections::HashMap;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::encoding::Encoding;
use crate::storage::io::{RecordId, RecordStore, StorageError};

/// Configuration for fault injection.
#[derive(Debug, Clone, Copy, Default)]
pub struct FaultConfig {
    /// Probability of a read error (0.0 - 1.0).
    pub read_error_rate: f64,
    /// Probability of a write error (0.0 - 1.0).
    pub write_error_rate: f64,
}

impl FaultConfig {
    #[must_use]
    pub fn no_faults() -> Self {
        Self::default()
    }

    /// Every call fails.
    #[must_use]
    pub const fn always() -> Self {
        Self {
            read_error_rate: 1.0,
            write_error_rate: 1.0,
        }
    }
}

/// Statistics about store operations, counted before fault injection.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MemoryStoreStats {
    pub reads: u64,
    pub inserts: u64,
    pub updates: u64,
    pub deletes: u64,
    pub injected_read_errors: u64,
    pub injected_write_errors: u64,
}

/// In-memory record store.
pub struct MemoryStore {
    encoding: Encoding,
    inner: Mutex<MemoryInner>,
}

struct MemoryInner {
    records: HashMap<RecordId, Vec<u8>>,
    next_id: RecordId,
    fault_config: FaultConfig,
    rng: StdRng,
    stats: MemoryStoreStats,
}

impl MemoryInner {
    fn should_inject_fault(&mut self, rate: f64) -> bool {
        if rate <= 0.0 {
            return false;
        }
        self.rng.random::<f64>() < rate
    }

    fn check_write(&mut self, operation: &str) -> Result<(), StorageError> {
        if self.should_inject_fault(self.fault_config.write_error_rate) {
            self.stats.injected_write_errors += 1;
            tracing::warn!(operation, "injecting write fault");
            return Err(StorageError::InjectedFault(format!(
                "simulated {operation} error"
            )));
        }
        Ok(())
    }
}

impl MemoryStore {
    /// Create an empty store with no faults.
    #[must_use]
    pub fn new(encoding: Encoding) -> Self {
        Self::with_config(encoding, 0, FaultConfig::default())
    }

    /// Create an empty store with seeded fault injection.
    #[must_use]
    pub fn with_config(encoding: Encoding, seed: u64, fault_config: FaultConfig) -> Self {
        Self::starting_at(encoding, seed, fault_config, 1)
    }

    /// Create an empty store whose first id is `first_id`.
    #[must_use]
    pub fn starting_at(
        encoding: Encoding,
        seed: u64,
        fault_config: FaultConfig,
        first_id: RecordId,
    ) -> Self {
        Self {
            encoding,
            inner: Mutex::new(MemoryInner {
                records: HashMap::new(),
                next_id: first_id.max(1),
                fault_config,
                rng: StdRng::seed_from_u64(seed),
                stats: MemoryStoreStats::default(),
            }),
        }
    }

    #[must_use]
    pub fn stats(&self) -> MemoryStoreStats {
        self.inner.lock().stats
    }

    pub fn reset_stats(&self) {
        self.inner.lock().stats = MemoryStoreStats::default();
    }

    pub fn set_fault_config(&self, config: FaultConfig) {
        self.inner.lock().fault_config = config;
    }

    /// Number of live records.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.inner.lock().records.len()
    }

    /// Overwrite a record's bytes without going through fault injection or stats.
    pub fn corrupt(&self, id: RecordId, bytes: Vec<u8>) -> Result<(), StorageError> {
        let mut inner = self.inner.lock();
        let record = inner.records.get_mut(&id).ok_or(StorageError::NotFound(id))?;
        *record = bytes;
        Ok(())
    }
}

impl RecordStore for MemoryStore {
    fn encoding(&self) -> Encoding {
        self.encoding
    }

    fn insert(&self, bytes: &[u8]) -> Result<RecordId, StorageError> {
        let mut inner = self.inner.lock();
        inner.stats.inserts += 1;
        inner.check_write("insert")?;

        let id = inner.next_id;
        inner.next_id = id.checked_add(1).ok_or(StorageError::IdSpaceExhausted)?;
        inner.records.insert(id, bytes.to_vec());
        Ok(id)
    }

    fn fetch(&self, id: RecordId) -> Result<Vec<u8>, StorageError> {
        let mut inner = self.inner.lock();
        inner.stats.reads += 1;

        let rate = inner.fault_config.read_error_rate;
        if inner.should_inject_fault(rate) {
            inner.stats.injected_read_errors += 1;
            tracing::warn!(id, "injecting read fault");
            return Err(StorageError::InjectedFault(
                "simulated fetch error".to_string(),
            ));
        }

        inner
            .records
            .get(&id)
            .map(|bytes| bytes.to_vec())
            .ok_or(StorageError::NotFound(id))
    }

    fn update(&self, id: RecordId, bytes: &[u8]) -> Result<(), StorageError> {
        let mut inner = self.inner.lock();
        inner.stats.updates += 1;
        inner.check_write("update")?;

        let record = inner.records.get_mut(&id).ok_or(StorageError::NotFound(id))?;
        bytes.clone_into(record);
        Ok(())
    }

    fn delete(&self, id: RecordId) -> Result<(), StorageError> {
        let mut inner = self.inner.lock();
        inner.stats.deletes += 1;
        inner.check_write("delete")?;

        inner
            .records
            .remove(&id)
            .map(|_| ())
            .ok_or(StorageError::NotFound(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_basic() {
        let store = MemoryStore::new(Encoding::Compact);

        let id = store.insert(b"hello world").expect("should insert");
        assert_eq!(id, 1);
        assert_eq!(store.fetch(id).expect("should fetch"), b"hello world");

        store.update(id, b"bye").expect("should update");
        assert_eq!(store.fetch(id).expect("should fetch"), b"bye");

        store.delete(id).expect("should delete");
        assert!(matches!(store.fetch(id), Err(StorageError::NotFound(1))));

        let stats = store.stats();
        assert_eq!(
            (stats.inserts, stats.reads, stats.updates, stats.deletes),
            (1, 3, 1, 1)
        );
    }

    #[test]
    fn test_id_space_exhausted() {
        let store =
            MemoryStore::starting_at(Encoding::Compact, 0, FaultConfig::default(), u64::MAX);
        assert!(matches!(
            store.insert(b"last"),
            Err(StorageError::IdSpaceExhausted)
        ));
        assert_eq!(store.record_count(), 0);
    }

    #[test]
    fn test_memory_store_fault_injection() {
        let config = FaultConfig {
            read_error_rate: 1.0,
            ..Default::default()
        };
        let store = MemoryStore::with_config(Encoding::Compact, 12345, config);

        let id = store.insert(b"x").expect("writes still succeed");
        assert!(matches!(
            store.fetch(id),
            Err(StorageError::InjectedFault(_))
        ));
        assert_eq!(store.stats().injected_read_errors, 1);
    }

    #[test]
    fn test_memory_store_deterministic() {
        let config = FaultConfig {
            write_error_rate: 0.5,
            ..Default::default()
        };

        let outcomes = |seed| {
            let store = MemoryStore::with_config(Encoding::Compact, seed, config);
            (0..20)
                .map(|_| store.insert(b"v").is_ok())
                .collect::<Vec<_>>()
        };

        assert_eq!(
            outcomes(12345),
            outcomes(12345),
            "Same seed should produce same fault pattern"
        );
    }
}
