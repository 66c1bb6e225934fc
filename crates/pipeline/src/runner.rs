//! Run orchestration.
//!
//! A run reads the prior snapshot, fetches every adapter concurrently, then
//! normalizes, filters, aggregates, classifies, scores and detects
//! migrations on a single task before handing the snapshot to the store.
//! Runs are serialized: a second call to [`Pipeline::run`] waits until the
//! previous run's snapshot write has completed.

use crate::aggregator::aggregate;
use crate::classifier::{top_n, Classification, StateClassifier};
use crate::fetch::{fetch_all, RetryPolicy};
use crate::filter::{AnomalyFilter, RejectedObservation};
use crate::migration::{MigrationDetector, MigrationEvent, MigrationRoute};
use crate::normalizer::{Normalizer, UnresolvedIdentifier};
use crate::report::{Diagnostics, ProviderFailure, RunCounts, RunReport, RunStatus};
use crate::scorer::Scorer;
use anyhow::Context;
use capflow_core::{
    Aggregate, AppConfig, Clock, MomentumState, ObservationWindow, RawRecord, Snapshot,
    SnapshotEntry, SnapshotStore, SourceAdapter, SystemClock,
};
use capflow_data::SnapshotRepository;
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// Everything a run derives from its joined records.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub snapshot: Snapshot,
    pub aggregates: Vec<Aggregate>,
    pub migrations: Vec<MigrationEvent>,
    pub routes: Vec<MigrationRoute>,
    pub top_classifications: Vec<Classification>,
    pub unresolved: Vec<UnresolvedIdentifier>,
    pub rejected: Vec<RejectedObservation>,
    pub counts: RunCounts,
}

/// Runs every stage after the fetch barrier. Pure: no I/O and no clock.
#[must_use]
pub fn evaluate(
    records: Vec<RawRecord>,
    prior: Option<&Snapshot>,
    run_at: DateTime<Utc>,
    config: &AppConfig,
) -> Evaluation {
    let mut counts = RunCounts {
        raw_records: records.len(),
        ..RunCounts::default()
    };

    let freshness = Duration::from_std(config.freshness_threshold()).unwrap_or(Duration::MAX);
    let window = ObservationWindow {
        start: run_at
            .checked_sub_signed(freshness)
            .unwrap_or(DateTime::<Utc>::MIN_UTC),
        end: run_at,
    };

    let batch = Normalizer::new(window).normalize(records);
    counts.normalized = batch.observations.len();
    counts.unresolved = batch.unresolved.len();

    let outcome = AnomalyFilter::from_config(config, run_at).apply(batch.observations);
    counts.accepted = outcome.accepted.len();
    counts.rejected = outcome.rejected.len();
    for rejected in &outcome.rejected {
        *counts.rejected_by_reason.entry(rejected.reason).or_default() += 1;
    }

    let aggregates = aggregate(&outcome.accepted);
    counts.aggregates = aggregates.len();

    info!(
        raw = counts.raw_records,
        normalized = counts.normalized,
        unresolved = counts.unresolved,
        accepted = counts.accepted,
        rejected = counts.rejected,
        aggregates = counts.aggregates,
        "stages complete"
    );
    for (reason, count) in &counts.rejected_by_reason {
        info!(reason = reason.as_str(), count, "observations rejected");
    }

    let classifications = StateClassifier::from_config(&config.classifier).classify(&aggregates);
    let risk = Scorer::from_config(&config.scorer).score(&aggregates);
    info!(score = %risk.value, band = %risk.band, "risk score");

    let states: BTreeMap<_, MomentumState> = classifications
        .iter()
        .map(|c| (c.entity.clone(), c.state))
        .collect();
    let entries = aggregates
        .iter()
        .map(|a| SnapshotEntry {
            entity: a.entity.clone(),
            tvl: a.tvl,
            volume: a.volume,
            price_change_pct: a.price_change_pct,
            momentum_state: states.get(&a.entity).copied(),
            source_count: a.source_count,
        })
        .collect();
    let snapshot = Snapshot::new(run_at, risk, entries);

    let detector = MigrationDetector::from_config(&config.migration);
    let migrations = detector.detect(prior, &snapshot);
    let routes = detector.routes(&migrations);
    info!(events = migrations.len(), routes = routes.len(), "migration detection");

    Evaluation {
        snapshot,
        aggregates,
        migrations,
        routes,
        top_classifications: top_n(&classifications, config.report.top_n),
        unresolved: batch.unresolved,
        rejected: outcome.rejected,
        counts,
    }
}

/// The capital-flow pipeline with its collaborators.
pub struct Pipeline {
    adapters: Vec<Arc<dyn SourceAdapter>>,
    store: Arc<dyn SnapshotStore>,
    config: AppConfig,
    clock: Arc<dyn Clock>,
    run_guard: Mutex<()>,
}

impl Pipeline {
    #[must_use]
    pub fn new(
        adapters: Vec<Arc<dyn SourceAdapter>>,
        store: Arc<dyn SnapshotStore>,
        config: AppConfig,
    ) -> Self {
        Self {
            adapters,
            store,
            config,
            clock: Arc::new(SystemClock),
            run_guard: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Wires the configured HTTP adapters and the `PostgreSQL` store.
    ///
    /// # Errors
    /// Returns error if the configuration is invalid, an HTTP client cannot
    /// be built, or the database is unreachable.
    pub async fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let adapters = capflow_sources::build_adapters(&config.sources, clock.clone())
            .context("failed to build source adapters")?;
        let pool = capflow_data::connect(&config.database)
            .await
            .context("failed to connect to snapshot database")?;
        let repository = SnapshotRepository::new(pool);
        repository
            .ensure_schema()
            .await
            .context("failed to create snapshot schema")?;

        Ok(Self::new(adapters, Arc::new(repository), config).with_clock(clock))
    }

    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Executes one run. Never panics on provider or store failures; the
    /// report's status reflects them.
    pub async fn run(&self) -> RunReport {
        let _guard = self.run_guard.lock().await;
        let run_at = self.clock.now();
        info!(%run_at, adapters = self.adapters.len(), "pipeline run started");

        let mut diagnostics = Diagnostics::default();

        let prior = match self.store.latest().await {
            Ok(prior) => prior,
            Err(e) => {
                warn!(error = %e, "prior snapshot unreadable, treating run as cold start");
                diagnostics.prior_snapshot_error = Some(e.to_string());
                None
            }
        };
        let previous_run_at = prior.as_ref().map(|s| s.run_at);

        let policy = RetryPolicy::from_config(&self.config.sources);
        let outcomes = fetch_all(&self.adapters, policy).await;
        let mut records = Vec::new();
        let mut succeeded = 0usize;
        for outcome in outcomes {
            match outcome.result {
                Ok(batch) => {
                    succeeded += 1;
                    records.extend(batch);
                }
                Err(e) => diagnostics.provider_failures.push(ProviderFailure::new(
                    outcome.provider,
                    &e,
                    outcome.attempts,
                )),
            }
        }

        if succeeded == 0 {
            error!(
                adapters = self.adapters.len(),
                "every source adapter failed, no snapshot produced"
            );
            return RunReport {
                previous_run_at,
                ..RunReport::failed(run_at, diagnostics)
            };
        }

        let evaluation = evaluate(records, prior.as_ref(), run_at, &self.config);
        diagnostics.unresolved = evaluation.unresolved;
        diagnostics.rejected = evaluation.rejected;
        diagnostics.counts = evaluation.counts;

        let saved = self.store.save(&evaluation.snapshot).await;
        let (status, snapshot) = match saved {
            Ok(()) => {
                if evaluation.aggregates.is_empty() {
                    warn!(
                        raw = diagnostics.counts.raw_records,
                        rejected = diagnostics.counts.rejected,
                        "no observation survived filtering, snapshot is empty"
                    );
                }
                let degraded = !diagnostics.provider_failures.is_empty()
                    || diagnostics.prior_snapshot_error.is_some()
                    || evaluation.aggregates.is_empty();
                let status = if degraded {
                    RunStatus::Degraded
                } else {
                    RunStatus::Ok
                };
                (status, Some(evaluation.snapshot))
            }
            Err(e) => {
                error!(error = %e, "snapshot could not be persisted");
                diagnostics.persistence_error = Some(e.to_string());
                (RunStatus::Failed, None)
            }
        };

        info!(
            %run_at,
            status = %status,
            failures = diagnostics.provider_failures.len(),
            rejected = diagnostics.counts.rejected,
            unresolved = diagnostics.counts.unresolved,
            "pipeline run finished"
        );

        RunReport {
            run_at,
            status,
            previous_run_at,
            snapshot,
            aggregates: evaluation.aggregates,
            migrations: evaluation.migrations,
            routes: evaluation.routes,
            top_classifications: evaluation.top_classifications,
            diagnostics,
        }
    }
}
