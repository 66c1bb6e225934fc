//! Data-quality heuristics.
//!
//! Heuristics run in a fixed order and the first failure decides the
//! rejection reason:
//! 1. stale
//! 2. turnover outlier (volume / TVL above the configured multiple)
//! 3. zombie volume (volume without price movement)
//! 4. missing required field

use capflow_core::{AppConfig, EntityKind, NormalizedObservation};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

/// Why an observation was excluded from aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    Stale,
    TurnoverOutlier,
    ZombieVolume,
    MissingField,
}

impl RejectReason {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stale => "stale",
            Self::TurnoverOutlier => "turnover_outlier",
            Self::ZombieVolume => "zombie_volume",
            Self::MissingField => "missing_field",
        }
    }
}

/// Outcome of filtering one observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "verdict", content = "reason")]
pub enum FilterVerdict {
    Accepted,
    Rejected(RejectReason),
}

/// A rejected observation kept for audit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedObservation {
    pub observation: NormalizedObservation,
    pub reason: RejectReason,
}

/// Observations split by verdict, each side in input order.
#[derive(Debug, Clone, Default)]
pub struct FilterOutcome {
    pub accepted: Vec<NormalizedObservation>,
    pub rejected: Vec<RejectedObservation>,
}

/// Thresholds of the anomaly filter for one run.
#[derive(Debug, Clone)]
pub struct AnomalyFilter {
    run_at: DateTime<Utc>,
    freshness: Duration,
    turnover_multiple: Decimal,
    zombie_change_pct: Decimal,
    zombie_min_volume: Decimal,
}

impl AnomalyFilter {
    #[must_use]
    pub fn new(
        run_at: DateTime<Utc>,
        freshness: Duration,
        turnover_multiple: Decimal,
        zombie_change_pct: Decimal,
        zombie_min_volume: Decimal,
    ) -> Self {
        Self {
            run_at,
            freshness,
            turnover_multiple,
            zombie_change_pct,
            zombie_min_volume,
        }
    }

    /// Builds the filter from configuration.
    #[must_use]
    pub fn from_config(config: &AppConfig, run_at: DateTime<Utc>) -> Self {
        let freshness =
            Duration::from_std(config.freshness_threshold()).unwrap_or(Duration::MAX);
        let filter = &config.filter;

        Self::new(
            run_at,
            freshness,
            Decimal::try_from(filter.turnover_multiple).unwrap_or(Decimal::ONE_HUNDRED),
            Decimal::try_from(filter.zombie_price_change_pct).unwrap_or_default(),
            Decimal::try_from(filter.zombie_min_volume_usd).unwrap_or_default(),
        )
    }

    fn is_stale(&self, obs: &NormalizedObservation) -> bool {
        let oldest = obs
            .source_time
            .map_or(obs.observed_at, |t| t.min(obs.observed_at));
        self.run_at - oldest > self.freshness
    }

    fn is_turnover_outlier(&self, obs: &NormalizedObservation) -> bool {
        match (obs.volume, obs.tvl) {
            // A ratio past the Decimal range is an outlier by any multiple.
            (Some(volume), Some(tvl)) if tvl > Decimal::ZERO => volume
                .checked_div(tvl)
                .map_or(true, |turnover| turnover > self.turnover_multiple),
            (Some(volume), Some(_)) => volume > Decimal::ZERO,
            _ => false,
        }
    }

    fn is_zombie(&self, obs: &NormalizedObservation) -> bool {
        match (obs.volume, obs.price_change_pct) {
            (Some(volume), Some(change)) => {
                volume > self.zombie_min_volume && change.abs() < self.zombie_change_pct
            }
            _ => false,
        }
    }

    fn is_missing_field(obs: &NormalizedObservation) -> bool {
        match obs.entity.kind() {
            EntityKind::Chain => obs.tvl.is_none(),
            EntityKind::Token => {
                obs.price.is_none() || obs.volume.is_none() || obs.price_change_pct.is_none()
            }
        }
    }

    /// Verdict for a single observation.
    #[must_use]
    pub fn verdict(&self, obs: &NormalizedObservation) -> FilterVerdict {
        if self.is_stale(obs) {
            FilterVerdict::Rejected(RejectReason::Stale)
        } else if self.is_turnover_outlier(obs) {
            FilterVerdict::Rejected(RejectReason::TurnoverOutlier)
        } else if self.is_zombie(obs) {
            FilterVerdict::Rejected(RejectReason::ZombieVolume)
        } else if Self::is_missing_field(obs) {
            FilterVerdict::Rejected(RejectReason::MissingField)
        } else {
            FilterVerdict::Accepted
        }
    }

    /// Splits observations into accepted and rejected.
    #[must_use]
    pub fn apply(&self, observations: Vec<NormalizedObservation>) -> FilterOutcome {
        let mut outcome = FilterOutcome::default();

        for observation in observations {
            match self.verdict(&observation) {
                FilterVerdict::Accepted => outcome.accepted.push(observation),
                FilterVerdict::Rejected(reason) => {
                    tracing::debug!(
                        entity = %observation.entity,
                        provider = %observation.provider,
                        reason = reason.as_str(),
                        "observation rejected"
                    );
                    outcome.rejected.push(RejectedObservation {
                        observation,
                        reason,
                    });
                }
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capflow_core::{EntityKey, ObservationWindow, ProviderId};
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    fn run_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap()
    }

    fn filter() -> AnomalyFilter {
        AnomalyFilter::new(
            run_at(),
            Duration::hours(1),
            dec!(100),
            dec!(0.01),
            dec!(50000),
        )
    }

    fn token(volume: Option<Decimal>, tvl: Option<Decimal>, change: Option<Decimal>) -> NormalizedObservation {
        NormalizedObservation {
            entity: EntityKey::token("PEPE", "ethereum"),
            provider: ProviderId::new("dexscreener"),
            price: Some(dec!(0.00001)),
            volume,
            volume_recent: None,
            tvl,
            price_change_pct: change,
            funding_rate: None,
            flow_mix: BTreeMap::new(),
            observed_at: run_at(),
            source_time: None,
            window: ObservationWindow {
                start: run_at() - Duration::hours(1),
                end: run_at(),
            },
            merged_records: 1,
        }
    }

    fn chain(tvl: Option<Decimal>) -> NormalizedObservation {
        NormalizedObservation {
            entity: EntityKey::chain("base"),
            price: None,
            ..token(None, tvl, None)
        }
    }

    // ==================== Heuristic Tests ====================

    #[test]
    fn test_healthy_observations_accepted() {
        let f = filter();
        assert_eq!(
            f.verdict(&token(Some(dec!(500000)), Some(dec!(200000)), Some(dec!(4.2)))),
            FilterVerdict::Accepted
        );
        assert_eq!(f.verdict(&chain(Some(dec!(3000000000)))), FilterVerdict::Accepted);
    }

    #[test]
    fn test_turnover_outlier_scenario() {
        let obs = token(Some(dec!(500)), Some(dec!(2)), Some(dec!(3)));
        assert_eq!(
            filter().verdict(&obs),
            FilterVerdict::Rejected(RejectReason::TurnoverOutlier)
        );
    }

    #[test]
    fn test_turnover_at_multiple_is_accepted() {
        let obs = token(Some(dec!(200)), Some(dec!(2)), Some(dec!(3)));
        assert_eq!(filter().verdict(&obs), FilterVerdict::Accepted);
    }

    #[test]
    fn test_turnover_beyond_decimal_range_is_outlier() {
        let obs = token(Some(Decimal::MAX), Some(dec!(0.0000001)), Some(dec!(3)));
        assert_eq!(
            filter().verdict(&obs),
            FilterVerdict::Rejected(RejectReason::TurnoverOutlier)
        );
    }

    #[test]
    fn test_zero_tvl_with_volume_is_outlier() {
        let obs = token(Some(dec!(10)), Some(dec!(0)), Some(dec!(3)));
        assert_eq!(
            filter().verdict(&obs),
            FilterVerdict::Rejected(RejectReason::TurnoverOutlier)
        );
    }

    #[test]
    fn test_zombie_volume() {
        let obs = token(Some(dec!(80000)), Some(dec!(100000)), Some(dec!(0.001)));
        assert_eq!(
            filter().verdict(&obs),
            FilterVerdict::Rejected(RejectReason::ZombieVolume)
        );

        let small = token(Some(dec!(1000)), Some(dec!(100000)), Some(dec!(0)));
        assert_eq!(filter().verdict(&small), FilterVerdict::Accepted);
    }

    #[test]
    fn test_stale_uses_older_of_adapter_and_source_time() {
        let mut obs = token(Some(dec!(500000)), Some(dec!(200000)), Some(dec!(4)));
        obs.observed_at = run_at() - Duration::minutes(61);
        assert_eq!(filter().verdict(&obs), FilterVerdict::Rejected(RejectReason::Stale));

        let mut obs = token(Some(dec!(500000)), Some(dec!(200000)), Some(dec!(4)));
        obs.source_time = Some(run_at() - Duration::hours(3));
        assert_eq!(filter().verdict(&obs), FilterVerdict::Rejected(RejectReason::Stale));

        let mut obs = token(Some(dec!(500000)), Some(dec!(200000)), Some(dec!(4)));
        obs.observed_at = run_at() - Duration::minutes(60);
        assert_eq!(filter().verdict(&obs), FilterVerdict::Accepted);
    }

    #[test]
    fn test_missing_fields() {
        assert_eq!(
            filter().verdict(&chain(None)),
            FilterVerdict::Rejected(RejectReason::MissingField)
        );
        assert_eq!(
            filter().verdict(&token(Some(dec!(1000)), Some(dec!(1000)), None)),
            FilterVerdict::Rejected(RejectReason::MissingField)
        );
        assert_eq!(
            filter().verdict(&token(None, Some(dec!(1000)), Some(dec!(1)))),
            FilterVerdict::Rejected(RejectReason::MissingField)
        );
    }

    // ==================== Priority Tests ====================

    #[test]
    fn test_first_failing_heuristic_wins() {
        let mut obs = token(Some(dec!(500)), Some(dec!(2)), Some(dec!(0)));
        assert_eq!(
            filter().verdict(&obs),
            FilterVerdict::Rejected(RejectReason::TurnoverOutlier)
        );

        obs.observed_at = run_at() - Duration::hours(2);
        assert_eq!(filter().verdict(&obs), FilterVerdict::Rejected(RejectReason::Stale));

        let zombie_and_missing = NormalizedObservation {
            price: None,
            ..token(Some(dec!(90000)), Some(dec!(100000)), Some(dec!(0)))
        };
        assert_eq!(
            filter().verdict(&zombie_and_missing),
            FilterVerdict::Rejected(RejectReason::ZombieVolume)
        );
    }

    #[test]
    fn test_apply_is_deterministic_and_keeps_rejections() {
        let observations = vec![
            token(Some(dec!(500)), Some(dec!(2)), Some(dec!(3))),
            chain(Some(dec!(1000))),
            chain(None),
        ];

        let first = filter().apply(observations.clone());
        let second = filter().apply(observations);

        assert_eq!(first.accepted, second.accepted);
        assert_eq!(first.rejected, second.rejected);
        assert_eq!(first.accepted.len(), 1);
        assert_eq!(first.rejected.len(), 2);
        assert_eq!(first.rejected[0].reason, RejectReason::TurnoverOutlier);
        assert_eq!(first.rejected[1].reason, RejectReason::MissingField);
    }

    #[test]
    fn test_from_config_defaults() {
        let config = AppConfig::default();
        let f = AnomalyFilter::from_config(&config, run_at());
        assert_eq!(f.freshness, Duration::hours(1));
        assert_eq!(f.turnover_multiple, dec!(100));
        assert_eq!(f.zombie_min_volume, dec!(50000));
    }
}
