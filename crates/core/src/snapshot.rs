//! Per-run aggregates, risk score, and the finalized snapshot.

use crate::entity::EntityKey;
use crate::records::AssetCategory;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Share of a chain's traded volume per asset category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Composition {
    pub shares: BTreeMap<AssetCategory, Decimal>,
    pub dominant: AssetCategory,
    pub total_volume: Decimal,
}

impl Composition {
    /// Builds a composition from per-category volume. Returns `None` when no
    /// volume was attributed.
    #[must_use]
    pub fn from_volumes(volumes: &BTreeMap<AssetCategory, Decimal>) -> Option<Self> {
        let total_volume = volumes
            .values()
            .fold(Decimal::ZERO, |acc, v| acc.saturating_add(*v));
        if total_volume <= Decimal::ZERO {
            return None;
        }

        let shares: BTreeMap<AssetCategory, Decimal> = volumes
            .iter()
            .map(|(category, volume)| (*category, *volume / total_volume))
            .collect();

        // Ties resolve to the earlier category in declaration order.
        let dominant = AssetCategory::ALL
            .iter()
            .copied()
            .filter(|c| shares.contains_key(c))
            .fold(None::<(AssetCategory, Decimal)>, |best, c| {
                let share = shares[&c];
                match best {
                    Some((_, best_share)) if best_share >= share => best,
                    _ => Some((c, share)),
                }
            })
            .map(|(c, _)| c)?;

        Some(Self {
            shares,
            dominant,
            total_volume,
        })
    }
}

/// Combined view of one canonical entity for one run.
///
/// Created by the aggregator and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    pub entity: EntityKey,
    pub tvl: Option<Decimal>,
    pub volume: Option<Decimal>,
    pub price_change_pct: Option<Decimal>,
    pub funding_rate: Option<Decimal>,
    /// Projected daily volume from the most recent hour relative to the 24h volume, in percent.
    pub flow_trend_pct: Option<Decimal>,
    /// Number of accepted observations that contributed.
    pub source_count: usize,
    /// Chain aggregates only.
    pub composition: Option<Composition>,
}

/// Run-local momentum state of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MomentumState {
    Breakout,
    Accumulation,
    Distribution,
    Cooling,
}

impl MomentumState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Breakout => "breakout",
            Self::Accumulation => "accumulation",
            Self::Distribution => "distribution",
            Self::Cooling => "cooling",
        }
    }
}

impl fmt::Display for MomentumState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MomentumState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "breakout" => Ok(Self::Breakout),
            "accumulation" => Ok(Self::Accumulation),
            "distribution" => Ok(Self::Distribution),
            "cooling" => Ok(Self::Cooling),
            other => Err(format!("unknown momentum state: {other}")),
        }
    }
}

/// Qualitative band of the risk index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskBand {
    ExtremeFear,
    Healthy,
    Neutral,
    Overheated,
    ExtremeOverheated,
}

impl RiskBand {
    /// Maps a score to its band.
    ///
    /// Bands are `[0,25) [25,40) [40,60) [60,80) [80,100]`. Scores outside
    /// `[0,100]` are clamped first.
    #[must_use]
    pub fn from_score(score: Decimal) -> Self {
        let score = clamp_score(score);
        if score < Decimal::from(25) {
            Self::ExtremeFear
        } else if score < Decimal::from(40) {
            Self::Healthy
        } else if score < Decimal::from(60) {
            Self::Neutral
        } else if score < Decimal::from(80) {
            Self::Overheated
        } else {
            Self::ExtremeOverheated
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExtremeFear => "extreme_fear",
            Self::Healthy => "healthy",
            Self::Neutral => "neutral",
            Self::Overheated => "overheated",
            Self::ExtremeOverheated => "extreme_overheated",
        }
    }
}

impl fmt::Display for RiskBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Macro indicators feeding the risk index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Indicator {
    /// Funding rate deviation from neutral.
    Funding,
    /// Mean token price change.
    Momentum,
    /// Fraction of tokens with positive change.
    Breadth,
    /// Spread of token price changes.
    Dispersion,
    /// Share of chain DEX volume traded outside stablecoins.
    Rotation,
    /// Recent-hour token volume trend.
    FlowTrend,
}

impl Indicator {
    pub const ALL: [Self; 6] = [
        Self::Funding,
        Self::Momentum,
        Self::Breadth,
        Self::Dispersion,
        Self::Rotation,
        Self::FlowTrend,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Funding => "funding",
            Self::Momentum => "momentum",
            Self::Breadth => "breadth",
            Self::Dispersion => "dispersion",
            Self::Rotation => "rotation",
            Self::FlowTrend => "flow_trend",
        }
    }
}

impl FromStr for Indicator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|i| i.as_str() == s.trim().to_lowercase())
            .ok_or_else(|| format!("unknown indicator: {s}"))
    }
}

fn clamp_score(score: Decimal) -> Decimal {
    score.clamp(Decimal::ZERO, Decimal::ONE_HUNDRED)
}

/// Market risk index in `[0, 100]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskScore {
    pub value: Decimal,
    pub band: RiskBand,
    /// Normalized value in `[0, 1]` of every indicator that had data.
    pub indicators: BTreeMap<Indicator, Decimal>,
}

impl RiskScore {
    /// Clamps `value` to `[0, 100]` and assigns its band.
    #[must_use]
    pub fn new(value: Decimal, indicators: BTreeMap<Indicator, Decimal>) -> Self {
        let value = clamp_score(value);
        Self {
            value,
            band: RiskBand::from_score(value),
            indicators,
        }
    }
}

/// One row of a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub entity: EntityKey,
    pub tvl: Option<Decimal>,
    pub volume: Option<Decimal>,
    pub price_change_pct: Option<Decimal>,
    /// Tokens only.
    pub momentum_state: Option<MomentumState>,
    pub source_count: usize,
}

/// Finalized result of one run. Immutable once built.
///
/// Deserializing goes through [`Snapshot::new`], so stored entries are
/// re-sorted whatever order they were written in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "SnapshotFields")]
pub struct Snapshot {
    pub run_at: DateTime<Utc>,
    pub risk: RiskScore,
    entries: Vec<SnapshotEntry>,
}

#[derive(Deserialize)]
struct SnapshotFields {
    run_at: DateTime<Utc>,
    risk: RiskScore,
    entries: Vec<SnapshotEntry>,
}

impl From<SnapshotFields> for Snapshot {
    fn from(fields: SnapshotFields) -> Self {
        Self::new(fields.run_at, fields.risk, fields.entries)
    }
}

impl Snapshot {
    /// Builds a snapshot; entries are ordered by entity key.
    #[must_use]
    pub fn new(run_at: DateTime<Utc>, risk: RiskScore, mut entries: Vec<SnapshotEntry>) -> Self {
        entries.sort_by(|a, b| a.entity.cmp(&b.entity));
        Self {
            run_at,
            risk,
            entries,
        }
    }

    #[must_use]
    pub fn entries(&self) -> &[SnapshotEntry] {
        &self.entries
    }

    #[must_use]
    pub fn entry(&self, entity: &EntityKey) -> Option<&SnapshotEntry> {
        self.entries
            .binary_search_by(|e| e.entity.cmp(entity))
            .ok()
            .map(|idx| &self.entries[idx])
    }

    /// TVL per chain id for chain entries that carry one.
    #[must_use]
    pub fn chain_tvls(&self) -> BTreeMap<String, Decimal> {
        self.entries
            .iter()
            .filter_map(|e| match (&e.entity, e.tvl) {
                (EntityKey::Chain(id), Some(tvl)) => Some((id.clone(), tvl)),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
