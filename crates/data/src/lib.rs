//! Snapshot persistence for the capital-flow pipeline.
//!
//! This crate provides:
//! - `PostgreSQL` connection setup
//! - Row models for snapshot headers and entries
//! - A repository implementing [`SnapshotStore`](capflow_core::SnapshotStore) with atomic writes
//! - An in-memory store

pub mod database;
pub mod memory;
pub mod models;
pub mod repositories;

pub use database::connect;
pub use memory::MemorySnapshotStore;
pub use models::{SnapshotEntryRecord, SnapshotRecord};
pub use repositories::SnapshotRepository;
