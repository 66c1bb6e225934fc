//! Market risk index.
//!
//! Each indicator is normalized to `[0, 1]` where higher means more
//! overheated. The score is the weighted mean of available indicators scaled
//! to `[0, 100]`; indicators without data drop out and the remaining weights
//! are renormalized.
//!
//! Token aggregates feed funding, momentum, breadth, dispersion and flow
//! trend. Chain compositions feed rotation: capital parked in stablecoins
//! reads as fear, capital rotated into other assets as appetite.

use crate::stats::{mean, std_dev, weighted_mean};
use capflow_core::{Aggregate, AssetCategory, Indicator, RiskScore, ScorerConfig};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Score reported when no indicator has data.
pub const NEUTRAL_SCORE: Decimal = Decimal::from_parts(50, 0, 0, false, 0);

const HALF: Decimal = Decimal::from_parts(5, 0, 0, false, 1);

/// Weighted combination of macro indicators.
#[derive(Debug, Clone)]
pub struct Scorer {
    weights: BTreeMap<Indicator, Decimal>,
    funding_neutral: Decimal,
    funding_scale: Decimal,
    momentum_scale: Decimal,
    dispersion_scale: Decimal,
    flow_trend_scale: Decimal,
}

impl Scorer {
    /// Scorer with the given weights and the default indicator scales.
    #[must_use]
    pub fn new(weights: BTreeMap<Indicator, Decimal>) -> Self {
        Self {
            weights,
            ..Self::from_config(&ScorerConfig::default())
        }
    }

    /// Builds the scorer from configuration; unknown indicator names are skipped.
    #[must_use]
    pub fn from_config(config: &ScorerConfig) -> Self {
        let weights = config
            .weights
            .iter()
            .filter_map(|(name, weight)| match name.parse::<Indicator>() {
                Ok(indicator) => Some((indicator, Decimal::try_from(*weight).ok()?)),
                Err(e) => {
                    tracing::warn!(indicator = %name, error = %e, "ignoring scorer weight");
                    None
                }
            })
            .collect();

        // Non-finite values fail validation; zero disables the indicator scale.
        let dec = |v: f64| Decimal::try_from(v).unwrap_or_default();
        Self {
            weights,
            funding_neutral: dec(config.funding_neutral),
            funding_scale: dec(config.funding_scale),
            momentum_scale: dec(config.momentum_scale_pct),
            dispersion_scale: dec(config.dispersion_scale_pct),
            flow_trend_scale: dec(config.flow_trend_scale_pct),
        }
    }

    /// Normalized indicator values that have data in `aggregates`.
    #[must_use]
    pub fn indicators(&self, aggregates: &[Aggregate]) -> BTreeMap<Indicator, Decimal> {
        let (chains, tokens): (Vec<&Aggregate>, Vec<&Aggregate>) =
            aggregates.iter().partition(|a| a.entity.is_chain());
        let changes: Vec<Decimal> = tokens.iter().filter_map(|a| a.price_change_pct).collect();
        let mut values = BTreeMap::new();

        if let Some(funding) = mean(tokens.iter().filter_map(|a| a.funding_rate)) {
            let deviation = funding.saturating_sub(self.funding_neutral);
            values.insert(
                Indicator::Funding,
                centered(deviation, self.funding_scale),
            );
        }

        if let Some(momentum) = mean(changes.iter().copied()) {
            values.insert(Indicator::Momentum, centered(momentum, self.momentum_scale));
        }

        if !changes.is_empty() {
            let positive = changes.iter().filter(|c| **c > Decimal::ZERO).count();
            values.insert(
                Indicator::Breadth,
                Decimal::from(positive) / Decimal::from(changes.len()),
            );
        }

        if let Some(spread) = std_dev(&changes) {
            values.insert(Indicator::Dispersion, proportion(spread, self.dispersion_scale));
        }

        let rotation: Vec<(Decimal, Option<Decimal>)> = chains
            .iter()
            .filter_map(|a| a.composition.as_ref())
            .map(|c| {
                let stable = c
                    .shares
                    .get(&AssetCategory::Stablecoin)
                    .copied()
                    .unwrap_or_default();
                (unit(Decimal::ONE - stable), Some(c.total_volume))
            })
            .collect();
        if let Some(rotated) = weighted_mean(&rotation) {
            values.insert(Indicator::Rotation, unit(rotated));
        }

        if let Some(trend) = mean(tokens.iter().filter_map(|a| a.flow_trend_pct)) {
            values.insert(Indicator::FlowTrend, centered(trend, self.flow_trend_scale));
        }

        values
    }

    /// Computes the risk score for one run.
    #[must_use]
    pub fn score(&self, aggregates: &[Aggregate]) -> RiskScore {
        let indicators = self.indicators(aggregates);

        let (weighted, total_weight) = indicators.iter().fold(
            (Decimal::ZERO, Decimal::ZERO),
            |(sum, total), (indicator, value)| {
                let weight = self
                    .weights
                    .get(indicator)
                    .copied()
                    .filter(|w| *w > Decimal::ZERO)
                    .unwrap_or(Decimal::ZERO);
                (
                    sum.saturating_add(weight.saturating_mul(*value)),
                    total.saturating_add(weight),
                )
            },
        );

        let value = weighted
            .checked_div(total_weight)
            .map_or(NEUTRAL_SCORE, |v| unit(v) * Decimal::ONE_HUNDRED);

        let score = RiskScore::new(value.round_dp(2), indicators);
        tracing::debug!(score = %score.value, band = %score.band, "risk score computed");
        score
    }
}

/// Maps a signed deviation onto `[0, 1]` with zero at 0.5.
fn centered(deviation: Decimal, scale: Decimal) -> Decimal {
    if scale <= Decimal::ZERO {
        return HALF;
    }
    match deviation.checked_div(scale.saturating_mul(Decimal::TWO)) {
        Some(offset) => unit(HALF.saturating_add(offset)),
        None => pinned(deviation),
    }
}

/// `value / scale` on `[0, 1]`; a ratio past the `Decimal` range pins to an end.
fn proportion(value: Decimal, scale: Decimal) -> Decimal {
    if scale <= Decimal::ZERO {
        return pinned(value);
    }
    value.checked_div(scale).map_or_else(|| pinned(value), unit)
}

fn pinned(value: Decimal) -> Decimal {
    if value > Decimal::ZERO {
        Decimal::ONE
    } else {
        Decimal::ZERO
    }
}

fn unit(value: Decimal) -> Decimal {
    value.clamp(Decimal::ZERO, Decimal::ONE)
}
