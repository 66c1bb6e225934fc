//! Plain-data result of one run, handed to report and notification
//! collaborators.

use crate::classifier::Classification;
use crate::filter::{RejectReason, RejectedObservation};
use crate::migration::{MigrationEvent, MigrationRoute};
use crate::normalizer::UnresolvedIdentifier;
use capflow_core::{Aggregate, ProviderError, ProviderId, Snapshot};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Ok,
    Degraded,
    Failed,
}

impl RunStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Degraded => "degraded",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final error of one adapter after all attempts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderFailure {
    pub provider: ProviderId,
    pub message: String,
    pub retryable: bool,
    pub attempts: u32,
}

impl ProviderFailure {
    #[must_use]
    pub fn new(provider: ProviderId, error: &ProviderError, attempts: u32) -> Self {
        Self {
            provider,
            message: error.to_string(),
            retryable: error.is_retryable(),
            attempts,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunCounts {
    pub raw_records: usize,
    pub normalized: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub unresolved: usize,
    pub aggregates: usize,
    pub rejected_by_reason: BTreeMap<RejectReason, usize>,
}

/// Everything that went wrong or was excluded during a run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    pub provider_failures: Vec<ProviderFailure>,
    pub unresolved: Vec<UnresolvedIdentifier>,
    pub rejected: Vec<RejectedObservation>,
    pub prior_snapshot_error: Option<String>,
    pub persistence_error: Option<String>,
    pub counts: RunCounts,
}

/// Outcome of one pipeline run.
///
/// `snapshot` is only set when the snapshot was durably recorded.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_at: DateTime<Utc>,
    pub status: RunStatus,
    pub previous_run_at: Option<DateTime<Utc>>,
    pub snapshot: Option<Snapshot>,
    pub aggregates: Vec<Aggregate>,
    pub migrations: Vec<MigrationEvent>,
    pub routes: Vec<MigrationRoute>,
    pub top_classifications: Vec<Classification>,
    pub diagnostics: Diagnostics,
}

impl RunReport {
    /// A run that produced nothing.
    #[must_use]
    pub fn failed(run_at: DateTime<Utc>, diagnostics: Diagnostics) -> Self {
        Self {
            run_at,
            status: RunStatus::Failed,
            previous_run_at: None,
            snapshot: None,
            aggregates: Vec::new(),
            migrations: Vec::new(),
            routes: Vec::new(),
            top_classifications: Vec::new(),
            diagnostics,
        }
    }

    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.snapshot.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_failed_report_is_empty() {
        let run_at = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let report = RunReport::failed(run_at, Diagnostics::default());
        assert_eq!(report.status, RunStatus::Failed);
        assert!(!report.is_finalized());
        assert!(report.aggregates.is_empty());
    }

    #[test]
    fn test_provider_failure_captures_retryability() {
        let failure = ProviderFailure::new(
            ProviderId::new("binance"),
            &ProviderError::Timeout("deadline".to_string()),
            3,
        );
        assert!(failure.retryable);
        assert_eq!(failure.message, "timeout: deadline");

        let failure =
            ProviderFailure::new(ProviderId::new("x"), &ProviderError::malformed("bad"), 1);
        assert!(!failure.retryable);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&RunStatus::Degraded).unwrap();
        assert_eq!(json, "\"degraded\"");
        assert_eq!(RunStatus::Ok.to_string(), "ok");
    }
}
