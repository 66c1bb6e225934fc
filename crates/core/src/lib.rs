//! Core types, configuration, and collaborator traits for the capital-flow pipeline.
//!
//! This crate provides:
//! - Canonical entity keys and provider ids
//! - Raw and normalized record shapes
//! - Aggregates, risk score, and snapshots
//! - Configuration loading via figment
//! - Source adapter and snapshot store traits

pub mod config;
pub mod config_loader;
pub mod entity;
pub mod error;
pub mod records;
pub mod snapshot;
pub mod telemetry;
pub mod traits;

pub use config::{
    AppConfig, BinanceConfig, ClassifierConfig, DatabaseConfig, DefiLlamaConfig,
    DexScreenerConfig, FilterConfig, MigrationConfig, PipelineConfig, ReportConfig, ScorerConfig,
    SourcesConfig, TelemetryConfig,
};
pub use config_loader::ConfigLoader;
pub use entity::{EntityKey, EntityKind, ParseEntityKeyError, ProviderId, GLOBAL_CHAIN};
pub use error::{PersistenceError, PersistenceResult, ProviderError, ProviderResult};
pub use records::{
    AssetCategory, NormalizedObservation, ObservationWindow, RateUnit, RawRecord, ValueUnit,
};
pub use snapshot::{
    Aggregate, Composition, Indicator, MomentumState, RiskBand, RiskScore, Snapshot,
    SnapshotEntry,
};
pub use telemetry::init_tracing;
pub use traits::{Clock, FixedClock, SnapshotStore, SourceAdapter, SystemClock};
