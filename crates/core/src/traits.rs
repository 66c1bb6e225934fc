use crate::entity::ProviderId;
use crate::error::{PersistenceResult, ProviderResult};
use crate::records::RawRecord;
use crate::snapshot::Snapshot;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Fetches one provider's payload and maps it to raw records.
///
/// Implementations stamp every record with their own clock and perform a
/// single attempt; retries and deadlines belong to the caller.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn provider(&self) -> &ProviderId;
    async fn fetch(&self) -> ProviderResult<Vec<RawRecord>>;
}

/// Durable home of finalized snapshots.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Most recent finalized snapshot, if any.
    async fn latest(&self) -> PersistenceResult<Option<Snapshot>>;

    /// Records a snapshot atomically: either every entry and the risk score
    /// are stored, or nothing is.
    async fn save(&self, snapshot: &Snapshot) -> PersistenceResult<()>;
}

/// Source of the current time for adapters and runs.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Always returns the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
