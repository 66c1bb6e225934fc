//! Per-entity roll-up of accepted observations.
//!
//! Each observation already folds every record of one provider. TVL from
//! several providers is a repeated measurement of the same quantity and is
//! averaged; volume is traded on each provider's own venues and is summed.
//! Price change is weighted by volume.

use crate::stats::{mean, sum_present, weighted_mean};
use capflow_core::{Aggregate, AssetCategory, Composition, EntityKey, NormalizedObservation};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

const HOURS_PER_DAY: i64 = 24;

/// Builds one aggregate per entity with at least one accepted observation.
///
/// Entities without accepted observations get no aggregate at all. Output
/// is ordered by entity.
#[must_use]
pub fn aggregate(accepted: &[NormalizedObservation]) -> Vec<Aggregate> {
    let mut by_entity: BTreeMap<&EntityKey, Vec<&NormalizedObservation>> = BTreeMap::new();
    for obs in accepted {
        by_entity.entry(&obs.entity).or_default().push(obs);
    }

    let flows = chain_flows(accepted);

    by_entity
        .into_iter()
        .map(|(entity, observations)| {
            let composition = match entity {
                EntityKey::Chain(id) => flows.get(id.as_str()).and_then(Composition::from_volumes),
                EntityKey::Token { .. } => None,
            };
            build(entity.clone(), &observations, composition)
        })
        .collect()
}

fn build(
    entity: EntityKey,
    observations: &[&NormalizedObservation],
    composition: Option<Composition>,
) -> Aggregate {
    let changes: Vec<(Decimal, Option<Decimal>)> = observations
        .iter()
        .filter_map(|o| o.price_change_pct.map(|c| (c, o.volume)))
        .collect();

    Aggregate {
        entity,
        tvl: mean(observations.iter().filter_map(|o| o.tvl)),
        volume: sum_present(observations.iter().map(|o| o.volume)),
        price_change_pct: weighted_mean(&changes),
        funding_rate: mean(observations.iter().filter_map(|o| o.funding_rate)),
        flow_trend_pct: flow_trend(observations),
        source_count: observations.len(),
        composition,
    }
}

/// Recent-hour volume projected over a day, relative to the 24h volume.
fn flow_trend(observations: &[&NormalizedObservation]) -> Option<Decimal> {
    let paired: Vec<&&NormalizedObservation> = observations
        .iter()
        .filter(|o| o.volume_recent.is_some() && o.volume.is_some())
        .collect();
    let recent = sum_present(paired.iter().map(|o| o.volume_recent))?;
    let daily = sum_present(paired.iter().map(|o| o.volume))?;
    if daily <= Decimal::ZERO {
        return None;
    }

    let projected = recent.checked_mul(Decimal::from(HOURS_PER_DAY))?;
    projected
        .checked_sub(daily)?
        .checked_div(daily)?
        .checked_mul(Decimal::ONE_HUNDRED)
}

/// DEX volume per chain and asset category across all accepted observations.
fn chain_flows(accepted: &[NormalizedObservation]) -> BTreeMap<&str, BTreeMap<AssetCategory, Decimal>> {
    let mut flows: BTreeMap<&str, BTreeMap<AssetCategory, Decimal>> = BTreeMap::new();
    for obs in accepted {
        for (chain, mix) in &obs.flow_mix {
            let per_chain = flows.entry(chain.as_str()).or_default();
            for (category, volume) in mix {
                let total = per_chain.entry(*category).or_default();
                *total = total.saturating_add(*volume);
            }
        }
    }
    flows
}
