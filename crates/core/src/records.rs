//! Provider-agnostic records flowing through a run.
//!
//! A [`RawRecord`] is exactly what one adapter saw; a
//! [`NormalizedObservation`] is the same data re-keyed to a canonical entity
//! with every monetary field in USD and every rate in a fixed unit.

use crate::entity::{EntityKey, EntityKind, ProviderId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Scale of the monetary fields (`volume`, `volume_recent`, `tvl`) of a raw record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueUnit {
    #[default]
    Usd,
    Thousands,
    Millions,
    Billions,
}

impl ValueUnit {
    /// Factor converting a value in this unit to plain USD.
    #[must_use]
    pub fn multiplier(self) -> Decimal {
        match self {
            Self::Usd => Decimal::ONE,
            Self::Thousands => Decimal::from(1_000),
            Self::Millions => Decimal::from(1_000_000),
            Self::Billions => Decimal::from(1_000_000_000),
        }
    }
}

/// Unit of the `price_change` field of a raw record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateUnit {
    /// `1.5` means 1.5%.
    #[default]
    Percent,
    /// `0.015` means 1.5%.
    Fraction,
}

/// One provider's observation of one entity, as captured by an adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub provider: ProviderId,
    pub kind: EntityKind,
    /// Identifier exactly as the provider spelled it.
    pub raw_id: String,
    /// Chain the token trades on, as the provider spelled it.
    pub chain_hint: Option<String>,
    /// Quote asset of a DEX pair.
    pub quote_symbol: Option<String>,
    /// Unit price in USD. Not affected by `value_unit`.
    pub price: Option<Decimal>,
    pub volume: Option<Decimal>,
    /// Volume traded during the most recent hour.
    pub volume_recent: Option<Decimal>,
    pub tvl: Option<Decimal>,
    pub price_change: Option<Decimal>,
    /// Fraction per funding interval (`0.0001` is 0.01%).
    pub funding_rate: Option<Decimal>,
    pub value_unit: ValueUnit,
    pub rate_unit: RateUnit,
    /// Adapter clock at capture time.
    pub observed_at: DateTime<Utc>,
    /// Time the provider claims for the data, if any.
    pub source_time: Option<DateTime<Utc>>,
}

impl RawRecord {
    fn new(
        provider: ProviderId,
        kind: EntityKind,
        raw_id: impl Into<String>,
        observed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            provider,
            kind,
            raw_id: raw_id.into(),
            chain_hint: None,
            quote_symbol: None,
            price: None,
            volume: None,
            volume_recent: None,
            tvl: None,
            price_change: None,
            funding_rate: None,
            value_unit: ValueUnit::Usd,
            rate_unit: RateUnit::Percent,
            observed_at,
            source_time: None,
        }
    }

    /// Creates an empty chain record.
    pub fn chain(
        provider: ProviderId,
        raw_id: impl Into<String>,
        observed_at: DateTime<Utc>,
    ) -> Self {
        Self::new(provider, EntityKind::Chain, raw_id, observed_at)
    }

    /// Creates an empty token record.
    pub fn token(
        provider: ProviderId,
        raw_id: impl Into<String>,
        observed_at: DateTime<Utc>,
    ) -> Self {
        Self::new(provider, EntityKind::Token, raw_id, observed_at)
    }

    #[must_use]
    pub fn with_chain_hint(mut self, chain: impl Into<String>) -> Self {
        self.chain_hint = Some(chain.into());
        self
    }

    #[must_use]
    pub fn with_quote_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.quote_symbol = Some(symbol.into());
        self
    }

    #[must_use]
    pub fn with_price(mut self, price: Decimal) -> Self {
        self.price = Some(price);
        self
    }

    #[must_use]
    pub fn with_volume(mut self, volume: Decimal) -> Self {
        self.volume = Some(volume);
        self
    }

    #[must_use]
    pub fn with_volume_recent(mut self, volume: Decimal) -> Self {
        self.volume_recent = Some(volume);
        self
    }

    #[must_use]
    pub fn with_tvl(mut self, tvl: Decimal) -> Self {
        self.tvl = Some(tvl);
        self
    }

    #[must_use]
    pub fn with_price_change(mut self, change: Decimal) -> Self {
        self.price_change = Some(change);
        self
    }

    #[must_use]
    pub fn with_funding_rate(mut self, rate: Decimal) -> Self {
        self.funding_rate = Some(rate);
        self
    }

    #[must_use]
    pub fn with_value_unit(mut self, unit: ValueUnit) -> Self {
        self.value_unit = unit;
        self
    }

    #[must_use]
    pub fn with_rate_unit(mut self, unit: RateUnit) -> Self {
        self.rate_unit = unit;
        self
    }

    #[must_use]
    pub fn with_source_time(mut self, time: DateTime<Utc>) -> Self {
        self.source_time = Some(time);
        self
    }
}

/// Coarse asset class used for chain flow composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetCategory {
    Native,
    Stablecoin,
    Btc,
    Altcoin,
}

impl AssetCategory {
    pub const ALL: [Self; 4] = [Self::Native, Self::Stablecoin, Self::Btc, Self::Altcoin];
}

/// Time window shared by every observation of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ObservationWindow {
    #[must_use]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at <= self.end
    }
}

/// A raw record re-expressed against its canonical entity.
///
/// Monetary fields are plain USD, `price_change_pct` is a percentage and
/// `funding_rate` a fraction. Several raw records from the same provider for
/// the same entity are folded into one observation (`merged_records`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedObservation {
    pub entity: EntityKey,
    pub provider: ProviderId,
    pub price: Option<Decimal>,
    pub volume: Option<Decimal>,
    pub volume_recent: Option<Decimal>,
    pub tvl: Option<Decimal>,
    pub price_change_pct: Option<Decimal>,
    pub funding_rate: Option<Decimal>,
    /// DEX volume per venue chain, split between the base and quote
    /// asset categories of each pair.
    pub flow_mix: BTreeMap<String, BTreeMap<AssetCategory, Decimal>>,
    /// Oldest adapter capture time among the merged records.
    pub observed_at: DateTime<Utc>,
    /// Oldest provider-claimed time among the merged records.
    pub source_time: Option<DateTime<Utc>>,
    pub window: ObservationWindow,
    pub merged_records: usize,
}
