//! Row shapes of persisted snapshots.
//!
//! A snapshot is stored as one header row (run timestamp and risk score)
//! plus one row per entity.

use capflow_core::{
    EntityKey, Indicator, MomentumState, PersistenceError, PersistenceResult, RiskScore,
    Snapshot, SnapshotEntry,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Snapshot header row.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SnapshotRecord {
    pub id: i64,
    pub run_at: DateTime<Utc>,
    /// Risk index in [0, 100]
    pub risk_score: Decimal,
    /// Band label, e.g. "neutral"
    pub risk_band: String,
    /// Normalized indicator values keyed by indicator name
    pub indicators: serde_json::Value,
}

/// One entity of a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SnapshotEntryRecord {
    pub snapshot_id: i64,
    /// Display form of the entity key, e.g. "chain:ethereum"
    pub entity_id: String,
    pub tvl: Option<Decimal>,
    pub volume: Option<Decimal>,
    pub price_change_pct: Option<Decimal>,
    pub momentum_state: Option<String>,
    pub source_count: i32,
}

impl SnapshotEntryRecord {
    /// Creates a row for `entry` belonging to `snapshot_id`.
    #[must_use]
    pub fn from_entry(snapshot_id: i64, entry: &SnapshotEntry) -> Self {
        Self {
            snapshot_id,
            entity_id: entry.entity.to_string(),
            tvl: entry.tvl,
            volume: entry.volume,
            price_change_pct: entry.price_change_pct,
            momentum_state: entry.momentum_state.map(|s| s.as_str().to_string()),
            source_count: i32::try_from(entry.source_count).unwrap_or(i32::MAX),
        }
    }

    /// Converts the row back into a snapshot entry.
    ///
    /// # Errors
    /// Returns [`PersistenceError::Corrupt`] if the entity id or state is unknown.
    pub fn into_entry(self) -> PersistenceResult<SnapshotEntry> {
        let entity: EntityKey = self
            .entity_id
            .parse()
            .map_err(|e| PersistenceError::corrupt(format!("{e}")))?;
        let momentum_state = self
            .momentum_state
            .as_deref()
            .map(str::parse::<MomentumState>)
            .transpose()
            .map_err(PersistenceError::corrupt)?;

        Ok(SnapshotEntry {
            entity,
            tvl: self.tvl,
            volume: self.volume,
            price_change_pct: self.price_change_pct,
            momentum_state,
            source_count: usize::try_from(self.source_count).unwrap_or(0),
        })
    }
}

/// Serializes indicator values for the `indicators` column.
///
/// # Errors
/// Returns a serialization error if encoding fails.
pub fn indicators_to_json(
    indicators: &BTreeMap<Indicator, Decimal>,
) -> PersistenceResult<serde_json::Value> {
    Ok(serde_json::to_value(indicators)?)
}

/// Rebuilds a snapshot from its header and entry rows.
///
/// The band is recomputed from the stored score.
///
/// # Errors
/// Returns an error if any row is corrupt.
pub fn assemble_snapshot(
    header: SnapshotRecord,
    entries: Vec<SnapshotEntryRecord>,
) -> PersistenceResult<Snapshot> {
    let indicators: BTreeMap<Indicator, Decimal> = serde_json::from_value(header.indicators)?;
    let risk = RiskScore::new(header.risk_score, indicators);
    if risk.band.as_str() != header.risk_band {
        tracing::warn!(
            stored = %header.risk_band,
            computed = %risk.band,
            run_at = %header.run_at,
            "stored risk band disagrees with score"
        );
    }

    let entries = entries
        .into_iter()
        .map(SnapshotEntryRecord::into_entry)
        .collect::<PersistenceResult<Vec<_>>>()?;

    Ok(Snapshot::new(header.run_at, risk, entries))
}
