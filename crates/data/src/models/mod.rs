//! Database models for persisted snapshots.

pub mod snapshot;

pub use snapshot::{assemble_snapshot, indicators_to_json, SnapshotEntryRecord, SnapshotRecord};
