//! In-process snapshot store.

use async_trait::async_trait;
use capflow_core::{PersistenceError, PersistenceResult, Snapshot, SnapshotStore};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

/// Keeps finalized snapshots in memory, newest last.
///
/// Read and write failures can be switched on to exercise error paths.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    snapshots: RwLock<Vec<Snapshot>>,
    fail_reads: AtomicBool,
    fail_saves: AtomicBool,
}

impl MemorySnapshotStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that already holds `snapshot`.
    #[must_use]
    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        let store = Self::default();
        store.snapshots.write().push(snapshot);
        store
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// All stored snapshots, oldest first.
    #[must_use]
    pub fn snapshots(&self) -> Vec<Snapshot> {
        self.snapshots.read().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshots.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshots.read().is_empty()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn latest(&self) -> PersistenceResult<Option<Snapshot>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(PersistenceError::database("snapshot store unavailable"));
        }
        Ok(self
            .snapshots
            .read()
            .iter()
            .max_by_key(|s| s.run_at)
            .cloned())
    }

    async fn save(&self, snapshot: &Snapshot) -> PersistenceResult<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(PersistenceError::database("snapshot store unavailable"));
        }
        self.snapshots.write().push(snapshot.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capflow_core::RiskScore;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    fn snapshot(hour: u32) -> Snapshot {
        Snapshot::new(
            Utc.with_ymd_and_hms(2025, 6, 1, hour, 0, 0).unwrap(),
            RiskScore::new(dec!(50), BTreeMap::new()),
            Vec::new(),
        )
    }

    #[tokio::test]
    async fn test_latest_returns_newest_run() {
        let store = MemorySnapshotStore::new();
        assert!(store.latest().await.unwrap().is_none());

        store.save(&snapshot(9)).await.unwrap();
        store.save(&snapshot(8)).await.unwrap();

        let latest = store.latest().await.unwrap().unwrap();
        assert_eq!(latest.run_at, Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap());
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_failing_save_stores_nothing() {
        let store = MemorySnapshotStore::new();
        store.set_fail_saves(true);

        assert!(store.save(&snapshot(8)).await.is_err());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_failing_reads() {
        let store = MemorySnapshotStore::with_snapshot(snapshot(8));
        store.set_fail_reads(true);
        assert!(matches!(
            store.latest().await,
            Err(PersistenceError::Database(_))
        ));
    }
}
