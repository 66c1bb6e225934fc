//! Cross-run chain TVL migration detection.

use capflow_core::{MigrationConfig, Snapshot};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Percentage strength assigned to a leg without a bounded percentage.
const UNBOUNDED_PCT: Decimal = Decimal::ONE_HUNDRED;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowDirection {
    Inflow,
    Outflow,
}

impl fmt::Display for FlowDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Inflow => "inflow",
            Self::Outflow => "outflow",
        })
    }
}

/// A material TVL change on one chain between two consecutive snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationEvent {
    pub chain: String,
    pub previous_tvl: Decimal,
    pub current_tvl: Decimal,
    pub delta: Decimal,
    /// `None` when the previous TVL was zero or too small for the change to
    /// be expressed as a percentage.
    pub delta_pct: Option<Decimal>,
    pub direction: FlowDirection,
}

impl MigrationEvent {
    fn strength(&self) -> Decimal {
        self.delta_pct.map_or(UNBOUNDED_PCT, |pct| pct.abs())
    }
}

/// Inferred capital movement from an outflow chain to an inflow chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationRoute {
    pub from: String,
    pub to: String,
    pub strength: Decimal,
}

#[derive(Debug, Clone)]
pub struct MigrationDetector {
    min_abs_delta: Decimal,
    min_pct_change: Decimal,
    max_routes: usize,
}

impl MigrationDetector {
    #[must_use]
    pub fn new(min_abs_delta: Decimal, min_pct_change: Decimal, max_routes: usize) -> Self {
        Self {
            min_abs_delta,
            min_pct_change,
            max_routes,
        }
    }

    #[must_use]
    pub fn from_config(config: &MigrationConfig) -> Self {
        Self::new(
            Decimal::try_from(config.min_abs_delta_usd).unwrap_or(Decimal::ZERO),
            Decimal::try_from(config.min_pct_change).unwrap_or(Decimal::ZERO),
            config.max_routes,
        )
    }

    /// Compares chain TVL between `previous` and `current`.
    ///
    /// Returns no events on a cold start. Chains missing from either snapshot
    /// are skipped: absence means no data, not zero TVL. Both the absolute and
    /// the percentage threshold must be met.
    #[must_use]
    pub fn detect(&self, previous: Option<&Snapshot>, current: &Snapshot) -> Vec<MigrationEvent> {
        let Some(previous) = previous else {
            tracing::debug!("no prior snapshot, skipping migration detection");
            return Vec::new();
        };

        let before = previous.chain_tvls();
        let mut events: Vec<MigrationEvent> = current
            .chain_tvls()
            .into_iter()
            .filter_map(|(chain, current_tvl)| {
                let previous_tvl = *before.get(&chain)?;
                self.evaluate(chain, previous_tvl, current_tvl)
            })
            .collect();

        events.sort_by(|a, b| {
            b.delta
                .abs()
                .cmp(&a.delta.abs())
                .then_with(|| a.chain.cmp(&b.chain))
        });

        for event in &events {
            tracing::info!(
                chain = %event.chain,
                direction = %event.direction,
                delta = %event.delta,
                delta_pct = ?event.delta_pct,
                "chain migration detected"
            );
        }
        events
    }

    fn evaluate(
        &self,
        chain: String,
        previous_tvl: Decimal,
        current_tvl: Decimal,
    ) -> Option<MigrationEvent> {
        let delta = current_tvl.saturating_sub(previous_tvl);
        if delta.is_zero() || delta.abs() < self.min_abs_delta {
            return None;
        }

        let delta_pct = delta
            .checked_div(previous_tvl)
            .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED));
        if let Some(pct) = delta_pct {
            if pct.abs() < self.min_pct_change {
                return None;
            }
        }

        Some(MigrationEvent {
            chain,
            previous_tvl,
            current_tvl,
            delta,
            delta_pct,
            direction: if delta > Decimal::ZERO {
                FlowDirection::Inflow
            } else {
                FlowDirection::Outflow
            },
        })
    }

    /// Pairs every outflow with every inflow, strongest first.
    #[must_use]
    pub fn routes(&self, events: &[MigrationEvent]) -> Vec<MigrationRoute> {
        let (inflows, outflows): (Vec<&MigrationEvent>, Vec<&MigrationEvent>) = events
            .iter()
            .partition(|e| e.direction == FlowDirection::Inflow);

        let mut routes: Vec<MigrationRoute> = outflows
            .iter()
            .flat_map(|out| {
                inflows.iter().map(move |inflow| MigrationRoute {
                    from: out.chain.clone(),
                    to: inflow.chain.clone(),
                    strength: out.strength().saturating_add(inflow.strength()),
                })
            })
            .collect();

        routes.sort_by(|a, b| match b.strength.cmp(&a.strength) {
            Ordering::Equal => (&a.from, &a.to).cmp(&(&b.from, &b.to)),
            other => other,
        });
        routes.truncate(self.max_routes);
        routes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capflow_core::{EntityKey, RiskScore, SnapshotEntry};
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    fn snapshot(hour: u32, chains: &[(&str, Decimal)]) -> Snapshot {
        let entries = chains
            .iter()
            .map(|(chain, tvl)| SnapshotEntry {
                entity: EntityKey::chain(*chain),
                tvl: Some(*tvl),
                volume: None,
                price_change_pct: None,
                momentum_state: None,
                source_count: 1,
            })
            .collect();
        Snapshot::new(
            Utc.with_ymd_and_hms(2026, 3, 1, hour, 0, 0).unwrap(),
            RiskScore::new(dec!(50), BTreeMap::new()),
            entries,
        )
    }

    fn detector() -> MigrationDetector {
        MigrationDetector::new(dec!(100000), dec!(10), 5)
    }

    // ==================== Detection Tests ====================

    #[test]
    fn test_cold_start_emits_nothing() {
        let current = snapshot(1, &[("y", dec!(1300000))]);
        assert!(detector().detect(None, &current).is_empty());
    }

    #[test]
    fn test_material_inflow_detected() {
        let previous = snapshot(0, &[("y", dec!(1000000)), ("z", dec!(5000000))]);
        let current = snapshot(1, &[("y", dec!(1300000)), ("z", dec!(5000000))]);

        let events = detector().detect(Some(&previous), &current);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].chain, "y");
        assert_eq!(events[0].delta, dec!(300000));
        assert_eq!(events[0].delta_pct, Some(dec!(30)));
        assert_eq!(events[0].direction, FlowDirection::Inflow);
    }

    #[test]
    fn test_both_thresholds_required() {
        // 200k absolute but only 2%.
        let previous = snapshot(0, &[("big", dec!(10000000)), ("small", dec!(100))]);
        // 50% but only 50 USD.
        let current = snapshot(1, &[("big", dec!(10200000)), ("small", dec!(150))]);

        assert!(detector().detect(Some(&previous), &current).is_empty());
    }

    #[test]
    fn test_missing_chain_is_not_zero() {
        let previous = snapshot(0, &[("gone", dec!(9000000))]);
        let current = snapshot(1, &[("new", dec!(9000000))]);

        assert!(detector().detect(Some(&previous), &current).is_empty());
    }

    #[test]
    fn test_zero_previous_tvl_is_unbounded() {
        let previous = snapshot(0, &[("fresh", dec!(0))]);
        let current = snapshot(1, &[("fresh", dec!(400000))]);

        let events = detector().detect(Some(&previous), &current);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].delta_pct, None);
    }

    #[test]
    fn test_move_from_dust_tvl_is_unbounded() {
        let previous = snapshot(0, &[("dust", dec!(0.0000000000000000000001))]);
        let current = snapshot(1, &[("dust", dec!(50000000000000000))]);

        let events = detector().detect(Some(&previous), &current);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].delta_pct, None);
        assert_eq!(events[0].direction, FlowDirection::Inflow);
    }

    #[test]
    fn test_events_ordered_by_magnitude() {
        let previous = snapshot(0, &[("a", dec!(1000000)), ("b", dec!(1000000))]);
        let current = snapshot(1, &[("a", dec!(1200000)), ("b", dec!(500000))]);

        let events = detector().detect(Some(&previous), &current);
        let chains: Vec<&str> = events.iter().map(|e| e.chain.as_str()).collect();
        assert_eq!(chains, vec!["b", "a"]);
        assert_eq!(events[0].direction, FlowDirection::Outflow);
        assert_eq!(events[0].delta_pct, Some(dec!(-50)));
    }

    // ==================== Route Tests ====================

    #[test]
    fn test_routes_pair_outflows_with_inflows() {
        let previous = snapshot(
            0,
            &[("a", dec!(1000000)), ("b", dec!(1000000)), ("c", dec!(1000000))],
        );
        let current = snapshot(
            1,
            &[("a", dec!(500000)), ("b", dec!(1200000)), ("c", dec!(1400000))],
        );
        let detector = detector();
        let events = detector.detect(Some(&previous), &current);
        let routes = detector.routes(&events);

        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].from, "a");
        assert_eq!(routes[0].to, "c");
        assert_eq!(routes[0].strength, dec!(90));
        assert_eq!(routes[1].to, "b");
    }

    #[test]
    fn test_routes_truncated() {
        let detector = MigrationDetector::new(dec!(1), dec!(1), 1);
        let previous = snapshot(0, &[("a", dec!(100)), ("b", dec!(100)), ("c", dec!(100))]);
        let current = snapshot(1, &[("a", dec!(50)), ("b", dec!(150)), ("c", dec!(170))]);

        let events = detector.detect(Some(&previous), &current);
        assert_eq!(detector.routes(&events).len(), 1);
    }

    #[test]
    fn test_no_routes_without_both_directions() {
        let previous = snapshot(0, &[("a", dec!(1000000))]);
        let current = snapshot(1, &[("a", dec!(2000000))]);
        let detector = detector();
        let events = detector.detect(Some(&previous), &current);
        assert_eq!(events.len(), 1);
        assert!(detector.routes(&events).is_empty());
    }
}
