//! Canonical identity and unit reconciliation.
//!
//! Raw records are resolved against the tables in [`crate::resolution`],
//! scaled to USD and percent, then folded per `(entity, provider)` so that
//! the aggregator never counts one provider twice for the same entity.

use crate::resolution::{categorize, resolve_chain, resolve_token};
use crate::stats::{mean, sum_present, weighted_mean};
use capflow_core::{
    AssetCategory, EntityKey, EntityKind, NormalizedObservation, ObservationWindow, ProviderId,
    RateUnit, RawRecord,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

/// A raw identifier that no resolution rule could map.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct UnresolvedIdentifier {
    pub provider: ProviderId,
    pub kind: EntityKind,
    pub raw_id: String,
    pub chain_hint: Option<String>,
    pub reason: String,
}

/// Output of one normalization pass.
#[derive(Debug, Clone, Default)]
pub struct NormalizedBatch {
    /// Ordered by entity, then provider.
    pub observations: Vec<NormalizedObservation>,
    /// Sorted and deduplicated.
    pub unresolved: Vec<UnresolvedIdentifier>,
}

/// Canonical identity of one raw record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub entity: EntityKey,
    pub venue_chain: Option<String>,
    pub price_divisor: Decimal,
}

/// Resolves a raw record's identity. Pure: depends only on the record.
///
/// # Errors
/// Returns the unresolved identifier with the reason it failed.
pub fn resolve(record: &RawRecord) -> Result<Resolved, UnresolvedIdentifier> {
    let unresolved = |reason: String| UnresolvedIdentifier {
        provider: record.provider.clone(),
        kind: record.kind,
        raw_id: record.raw_id.clone(),
        chain_hint: record.chain_hint.clone(),
        reason,
    };

    match record.kind {
        EntityKind::Chain => {
            let chain = resolve_chain(&record.raw_id)
                .ok_or_else(|| unresolved("unrecognized chain name".to_string()))?;
            Ok(Resolved {
                entity: EntityKey::chain(chain),
                venue_chain: None,
                price_divisor: Decimal::ONE,
            })
        }
        EntityKind::Token => {
            let token = resolve_token(&record.raw_id, record.chain_hint.as_deref())
                .map_err(unresolved)?;
            let venue_chain = record.chain_hint.as_deref().and_then(resolve_chain);
            Ok(Resolved {
                entity: EntityKey::token(&token.symbol, &token.chain),
                venue_chain,
                price_divisor: token.price_divisor,
            })
        }
    }
}

/// One record after unit conversion, before folding.
#[derive(Debug, Clone)]
struct Scaled {
    raw_id: String,
    chain_hint: Option<String>,
    quote_symbol: Option<String>,
    price: Option<Decimal>,
    volume: Option<Decimal>,
    volume_recent: Option<Decimal>,
    tvl: Option<Decimal>,
    price_change_pct: Option<Decimal>,
    funding_rate: Option<Decimal>,
    flow: Option<(String, Vec<(AssetCategory, Decimal)>)>,
    observed_at: DateTime<Utc>,
    source_time: Option<DateTime<Utc>>,
}

impl Scaled {
    fn new(record: RawRecord, resolved: &Resolved) -> Self {
        let unit = record.value_unit.multiplier();
        let non_negative = |v: Option<Decimal>| v.filter(|v| !v.is_sign_negative());
        // Amounts scaled past the Decimal range are dropped as absent.
        let money = |v: Option<Decimal>| non_negative(v).and_then(|v| v.checked_mul(unit));

        let price = non_negative(record.price).map(|p| p / resolved.price_divisor);
        let volume = money(record.volume);
        let price_change_pct = record.price_change.and_then(|c| match record.rate_unit {
            RateUnit::Percent => Some(c),
            RateUnit::Fraction => c.checked_mul(Decimal::ONE_HUNDRED),
        });

        let flow = match (&resolved.entity, &resolved.venue_chain, volume) {
            (EntityKey::Token { symbol, .. }, Some(venue), Some(volume)) if volume > Decimal::ZERO => {
                let base = categorize(symbol, venue);
                let split = match record.quote_symbol.as_deref() {
                    Some(quote) => {
                        let half = volume / Decimal::TWO;
                        vec![(base, half), (categorize(quote, venue), half)]
                    }
                    None => vec![(base, volume)],
                };
                Some((venue.clone(), split))
            }
            _ => None,
        };

        Self {
            raw_id: record.raw_id,
            chain_hint: record.chain_hint,
            quote_symbol: record.quote_symbol,
            price,
            volume,
            volume_recent: money(record.volume_recent),
            tvl: money(record.tvl),
            price_change_pct,
            funding_rate: record.funding_rate,
            flow,
            observed_at: record.observed_at,
            source_time: record.source_time,
        }
    }

    /// Total order used to fold records deterministically.
    fn fold_order(&self, other: &Self) -> Ordering {
        self.raw_id
            .cmp(&other.raw_id)
            .then_with(|| self.chain_hint.cmp(&other.chain_hint))
            .then_with(|| self.quote_symbol.cmp(&other.quote_symbol))
            .then_with(|| self.observed_at.cmp(&other.observed_at))
            .then_with(|| self.volume.cmp(&other.volume))
            .then_with(|| self.tvl.cmp(&other.tvl))
            .then_with(|| self.price.cmp(&other.price))
            .then_with(|| self.price_change_pct.cmp(&other.price_change_pct))
    }
}

/// Maps raw records onto canonical entities for one run.
#[derive(Debug, Clone, Copy)]
pub struct Normalizer {
    window: ObservationWindow,
}

impl Normalizer {
    #[must_use]
    pub fn new(window: ObservationWindow) -> Self {
        Self { window }
    }

    /// Resolves, scales, and folds `records`.
    ///
    /// The result does not depend on the order of `records`.
    #[must_use]
    pub fn normalize(&self, records: Vec<RawRecord>) -> NormalizedBatch {
        let mut groups: BTreeMap<(EntityKey, ProviderId), Vec<Scaled>> = BTreeMap::new();
        let mut unresolved = BTreeSet::new();

        for record in records {
            match resolve(&record) {
                Ok(resolved) => {
                    let key = (resolved.entity.clone(), record.provider.clone());
                    groups
                        .entry(key)
                        .or_default()
                        .push(Scaled::new(record, &resolved));
                }
                Err(identifier) => {
                    unresolved.insert(identifier);
                }
            }
        }

        let observations: Vec<NormalizedObservation> = groups
            .into_iter()
            .map(|((entity, provider), mut items)| {
                items.sort_by(Scaled::fold_order);
                self.fold(entity, provider, &items)
            })
            .collect();

        tracing::debug!(
            observations = observations.len(),
            unresolved = unresolved.len(),
            "normalized records"
        );

        NormalizedBatch {
            observations,
            unresolved: unresolved.into_iter().collect(),
        }
    }

    fn fold(&self, entity: EntityKey, provider: ProviderId, items: &[Scaled]) -> NormalizedObservation {
        let prices: Vec<(Decimal, Option<Decimal>)> = items
            .iter()
            .filter_map(|s| s.price.map(|p| (p, s.volume)))
            .collect();
        let changes: Vec<(Decimal, Option<Decimal>)> = items
            .iter()
            .filter_map(|s| s.price_change_pct.map(|c| (c, s.volume)))
            .collect();

        let mut flow_mix: BTreeMap<String, BTreeMap<AssetCategory, Decimal>> = BTreeMap::new();
        for (chain, split) in items.iter().filter_map(|s| s.flow.as_ref()) {
            let per_chain = flow_mix.entry(chain.clone()).or_default();
            for (category, volume) in split {
                let total = per_chain.entry(*category).or_default();
                *total = total.saturating_add(*volume);
            }
        }

        NormalizedObservation {
            entity,
            provider,
            price: weighted_mean(&prices),
            volume: sum_present(items.iter().map(|s| s.volume)),
            volume_recent: sum_present(items.iter().map(|s| s.volume_recent)),
            tvl: sum_present(items.iter().map(|s| s.tvl)),
            price_change_pct: weighted_mean(&changes),
            funding_rate: mean(items.iter().filter_map(|s| s.funding_rate)),
            flow_mix,
            observed_at: items
                .iter()
                .map(|s| s.observed_at)
                .min()
                .unwrap_or(self.window.end),
            source_time: items.iter().filter_map(|s| s.source_time).min(),
            window: self.window,
            merged_records: items.len(),
        }
    }
}
