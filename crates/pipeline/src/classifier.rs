//! Run-local momentum classification of tokens.
//!
//! Rules are evaluated in priority order; the first that matches wins:
//! Breakout, Accumulation, Distribution, then Cooling as the default.

use capflow_core::{Aggregate, ClassifierConfig, EntityKey, MomentumState};
use rust_decimal::Decimal;
use serde::Serialize;
use std::cmp::Ordering;

/// Momentum state of one token with a heuristic confidence in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub entity: EntityKey,
    pub state: MomentumState,
    pub confidence: Decimal,
    /// Percentile rank of the token's volume in this run.
    pub volume_rank: Decimal,
}

/// Decision table thresholds.
#[derive(Debug, Clone)]
pub struct StateClassifier {
    breakout_volume_rank: Decimal,
    breakout_change_pct: Decimal,
    flat_change_pct: Decimal,
    distribution_change_pct: Decimal,
}

impl StateClassifier {
    #[must_use]
    pub fn new(
        breakout_volume_rank: Decimal,
        breakout_change_pct: Decimal,
        flat_change_pct: Decimal,
        distribution_change_pct: Decimal,
    ) -> Self {
        Self {
            breakout_volume_rank,
            breakout_change_pct,
            flat_change_pct,
            distribution_change_pct,
        }
    }

    #[must_use]
    pub fn from_config(config: &ClassifierConfig) -> Self {
        let dec = |v: f64, fallback: Decimal| Decimal::try_from(v).unwrap_or(fallback);
        Self::new(
            dec(config.breakout_volume_rank, Decimal::new(9, 1)),
            dec(config.breakout_change_pct, Decimal::from(5)),
            dec(config.flat_change_pct, Decimal::TWO),
            dec(config.distribution_change_pct, Decimal::from(5)),
        )
    }

    /// Classifies every token aggregate. Chain aggregates are ignored.
    ///
    /// Output is ordered by entity.
    #[must_use]
    pub fn classify(&self, aggregates: &[Aggregate]) -> Vec<Classification> {
        let tokens: Vec<&Aggregate> = aggregates.iter().filter(|a| !a.entity.is_chain()).collect();
        let volumes: Vec<Decimal> = tokens.iter().filter_map(|a| a.volume).collect();

        let mut classifications: Vec<Classification> = tokens
            .into_iter()
            .map(|aggregate| {
                let rank = aggregate
                    .volume
                    .map_or(Decimal::ZERO, |v| percentile_rank(v, &volumes));
                self.classify_one(aggregate, rank)
            })
            .collect();

        classifications.sort_by(|a, b| a.entity.cmp(&b.entity));
        classifications
    }

    fn classify_one(&self, aggregate: &Aggregate, rank: Decimal) -> Classification {
        let change = aggregate.price_change_pct;
        let trend = aggregate.flow_trend_pct.filter(|t| *t > Decimal::ZERO);
        let trend_strength = trend.map(|t| (t / Decimal::ONE_HUNDRED).min(Decimal::ONE));

        let (state, confidence) = match (change, trend_strength) {
            (Some(c), _) if rank >= self.breakout_volume_rank && c > self.breakout_change_pct => {
                let strength = ratio(c, self.breakout_change_pct.saturating_mul(Decimal::TWO));
                (MomentumState::Breakout, (rank + strength) / Decimal::TWO)
            }
            (Some(c), Some(t)) if c.abs() < self.flat_change_pct => {
                let flatness = Decimal::ONE - ratio(c.abs(), self.flat_change_pct);
                (MomentumState::Accumulation, (t + flatness) / Decimal::TWO)
            }
            (Some(c), Some(t)) if c < -self.distribution_change_pct => {
                let strength = ratio(c.abs(), self.distribution_change_pct.saturating_mul(Decimal::TWO));
                (MomentumState::Distribution, (t + strength) / Decimal::TWO)
            }
            _ => (
                MomentumState::Cooling,
                (Decimal::ONE - rank) / Decimal::TWO,
            ),
        };

        Classification {
            entity: aggregate.entity.clone(),
            state,
            confidence: confidence.clamp(Decimal::ZERO, Decimal::ONE),
            volume_rank: rank,
        }
    }
}

/// `value / scale` capped at 1; zero scale or an out-of-range ratio counts
/// as saturated.
fn ratio(value: Decimal, scale: Decimal) -> Decimal {
    if scale <= Decimal::ZERO {
        return Decimal::ONE;
    }
    value
        .checked_div(scale)
        .map_or(Decimal::ONE, |r| r.min(Decimal::ONE))
}

/// Mid-rank percentile of `value` among `population`.
fn percentile_rank(value: Decimal, population: &[Decimal]) -> Decimal {
    if population.is_empty() {
        return Decimal::ZERO;
    }
    let below = population.iter().filter(|v| **v < value).count();
    let equal = population.iter().filter(|v| **v == value).count();
    let position = Decimal::from(below) + Decimal::from(equal) / Decimal::TWO;
    position / Decimal::from(population.len())
}

/// Highest-confidence classifications, ties broken by entity.
#[must_use]
pub fn top_n(classifications: &[Classification], n: usize) -> Vec<Classification> {
    let mut ranked = classifications.to_vec();
    ranked.sort_by(|a, b| match b.confidence.cmp(&a.confidence) {
        Ordering::Equal => a.entity.cmp(&b.entity),
        other => other,
    });
    ranked.truncate(n);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn classifier() -> StateClassifier {
        StateClassifier::new(dec!(0.9), dec!(5), dec!(2), dec!(5))
    }

    fn token(symbol: &str, volume: Decimal, change: Decimal, trend: Option<Decimal>) -> Aggregate {
        Aggregate {
            entity: EntityKey::token(symbol, "ethereum"),
            tvl: Some(dec!(1000000)),
            volume: Some(volume),
            price_change_pct: Some(change),
            funding_rate: None,
            flow_trend_pct: trend,
            source_count: 1,
            composition: None,
        }
    }

    /// Nine quiet tokens plus whatever is under test.
    fn with_background(subject: Aggregate) -> Vec<Aggregate> {
        let mut aggregates: Vec<Aggregate> = (1..=9)
            .map(|i| token(&format!("BG{i}"), Decimal::from(i * 1000), dec!(0), None))
            .collect();
        aggregates.push(subject);
        aggregates
    }

    fn state_of(classifications: &[Classification], symbol: &str) -> MomentumState {
        classifications
            .iter()
            .find(|c| c.entity == EntityKey::token(symbol, "ethereum"))
            .unwrap()
            .state
    }

    #[test]
    fn test_breakout_requires_top_decile_and_gain() {
        let result = classifier().classify(&with_background(token("HOT", dec!(1000000), dec!(12), None)));
        assert_eq!(state_of(&result, "HOT"), MomentumState::Breakout);

        let result = classifier().classify(&with_background(token("SLOW", dec!(500), dec!(12), None)));
        assert_eq!(state_of(&result, "SLOW"), MomentumState::Cooling);
    }

    #[test]
    fn test_accumulation_needs_rising_flow_and_flat_price() {
        let result = classifier().classify(&with_background(token("ACC", dec!(100), dec!(0.5), Some(dec!(40)))));
        assert_eq!(state_of(&result, "ACC"), MomentumState::Accumulation);

        let result = classifier().classify(&with_background(token("FLAT", dec!(100), dec!(0.5), Some(dec!(-10)))));
        assert_eq!(state_of(&result, "FLAT"), MomentumState::Cooling);
    }

    #[test]
    fn test_distribution_needs_rising_flow_and_drop() {
        let result = classifier().classify(&with_background(token("DUMP", dec!(100), dec!(-8), Some(dec!(30)))));
        assert_eq!(state_of(&result, "DUMP"), MomentumState::Distribution);

        let result = classifier().classify(&with_background(token("DIP", dec!(100), dec!(-3), Some(dec!(30)))));
        assert_eq!(state_of(&result, "DIP"), MomentumState::Cooling);
    }

    #[test]
    fn test_out_of_range_strength_saturates() {
        let classifier = StateClassifier::new(
            dec!(0.9),
            dec!(0.0000000000000000000000001),
            dec!(2),
            dec!(5),
        );
        let result = classifier.classify(&with_background(token("HOT", dec!(1000000), Decimal::MAX, None)));
        let hot = result
            .iter()
            .find(|c| c.entity == EntityKey::token("HOT", "ethereum"))
            .unwrap();
        assert_eq!(hot.state, MomentumState::Breakout);
        assert_eq!(hot.confidence, dec!(0.975));
    }

    #[test]
    fn test_breakout_outranks_other_rules() {
        let result = classifier().classify(&with_background(token("BOTH", dec!(1000000), dec!(6), Some(dec!(80)))));
        assert_eq!(state_of(&result, "BOTH"), MomentumState::Breakout);
    }

    #[test]
    fn test_every_token_gets_exactly_one_state() {
        let mut aggregates = with_background(token("X", dec!(10), dec!(1), None));
        aggregates.push(Aggregate {
            entity: EntityKey::chain("ethereum"),
            tvl: Some(dec!(1)),
            volume: None,
            price_change_pct: None,
            funding_rate: None,
            flow_trend_pct: None,
            source_count: 1,
            composition: None,
        });

        let result = classifier().classify(&aggregates);
        assert_eq!(result.len(), 10);
        assert!(result.iter().all(|c| !c.entity.is_chain()));
        assert!(result
            .iter()
            .all(|c| c.confidence >= Decimal::ZERO && c.confidence <= Decimal::ONE));
    }

    #[test]
    fn test_percentile_rank() {
        let population = [dec!(1), dec!(2), dec!(3), dec!(4)];
        assert_eq!(percentile_rank(dec!(4), &population), dec!(0.875));
        assert_eq!(percentile_rank(dec!(1), &population), dec!(0.125));
        assert_eq!(percentile_rank(dec!(5), &[]), dec!(0));
    }

    #[test]
    fn test_top_n_orders_by_confidence() {
        let make = |symbol: &str, confidence: Decimal| Classification {
            entity: EntityKey::token(symbol, "base"),
            state: MomentumState::Cooling,
            confidence,
            volume_rank: dec!(0),
        };
        let all = vec![make("A", dec!(0.2)), make("B", dec!(0.9)), make("C", dec!(0.9))];

        let top = top_n(&all, 2);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].entity, EntityKey::token("B", "base"));
        assert_eq!(top[1].entity, EntityKey::token("C", "base"));
    }
}
