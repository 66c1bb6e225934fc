//! Repository pattern implementations for database access.

pub mod snapshot_repo;

pub use snapshot_repo::SnapshotRepository;
