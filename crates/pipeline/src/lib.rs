//! Capital-flow pipeline stages and run orchestration.
//!
//! Stages, in order:
//! - [`normalizer`]: canonical identity and unit reconciliation
//! - [`filter`]: data-quality heuristics with first-match rejection
//! - [`aggregator`]: one aggregate per canonical entity
//! - [`classifier`], [`scorer`], [`migration`]: run-level analysis
//!
//! [`runner::Pipeline`] ties them together behind the fetch barrier and
//! produces a [`report::RunReport`].

pub mod aggregator;
pub mod classifier;
pub mod fetch;
pub mod filter;
pub mod migration;
pub mod normalizer;
pub mod report;
pub mod resolution;
pub mod runner;
pub mod scorer;
mod stats;

pub use aggregator::aggregate;
pub use classifier::{top_n, Classification, StateClassifier};
pub use fetch::{fetch_adapter, fetch_all, FetchOutcome, RetryPolicy, MAX_RETRY_DELAY};
pub use filter::{AnomalyFilter, FilterOutcome, FilterVerdict, RejectReason, RejectedObservation};
pub use migration::{FlowDirection, MigrationDetector, MigrationEvent, MigrationRoute};
pub use normalizer::{resolve, NormalizedBatch, Normalizer, Resolved, UnresolvedIdentifier};
pub use report::{Diagnostics, ProviderFailure, RunCounts, RunReport, RunStatus};
pub use runner::{evaluate, Evaluation, Pipeline};
pub use scorer::{Scorer, NEUTRAL_SCORE};
