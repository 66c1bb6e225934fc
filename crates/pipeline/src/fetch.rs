//! Concurrent adapter fetches with retries and a per-adapter deadline.

use capflow_core::{ProviderError, ProviderId, RawRecord, SourceAdapter, SourcesConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Upper bound on any single backoff, including provider `Retry-After`.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Exponential backoff for retryable adapter errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    /// Deadline for the whole attempt sequence of one adapter.
    pub deadline: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub fn from_config(config: &SourcesConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            deadline: Duration::from_secs(config.fetch_timeout_secs),
        }
    }

    /// Delay before retry number `attempt` (zero based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32, error: &ProviderError) -> Duration {
        let delay = match error.retry_delay_secs() {
            Some(secs) => Duration::from_secs(secs),
            None => self
                .base_delay
                .saturating_mul(2u32.saturating_pow(attempt)),
        };
        delay.min(MAX_RETRY_DELAY)
    }
}

/// Result of fetching one adapter.
#[derive(Debug)]
pub struct FetchOutcome {
    pub provider: ProviderId,
    pub attempts: u32,
    pub result: Result<Vec<RawRecord>, ProviderError>,
}

async fn fetch_with_retry(
    adapter: &dyn SourceAdapter,
    policy: &RetryPolicy,
    attempts: &mut u32,
) -> Result<Vec<RawRecord>, ProviderError> {
    loop {
        let attempt = *attempts;
        *attempts += 1;

        match adapter.fetch().await {
            Ok(records) => return Ok(records),
            Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                let delay = policy.delay_for(attempt, &e);
                warn!(
                    provider = %adapter.provider(),
                    attempt = attempt + 1,
                    max_retries = policy.max_retries,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "fetch failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Fetches one adapter, bounding every attempt and backoff by the deadline.
pub async fn fetch_adapter(adapter: Arc<dyn SourceAdapter>, policy: RetryPolicy) -> FetchOutcome {
    let provider = adapter.provider().clone();
    let mut attempts = 0;

    let result = match tokio::time::timeout(
        policy.deadline,
        fetch_with_retry(adapter.as_ref(), &policy, &mut attempts),
    )
    .await
    {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Timeout(format!(
            "no response within {}s",
            policy.deadline.as_secs()
        ))),
    };

    match &result {
        Ok(records) => info!(provider = %provider, records = records.len(), attempts, "fetch succeeded"),
        Err(e) => warn!(provider = %provider, error = %e, attempts, "fetch failed"),
    }

    FetchOutcome {
        provider,
        attempts,
        result,
    }
}

/// Fetches every adapter in its own task and waits for all of them.
///
/// Outcomes are returned in adapter order. A panicking adapter task is
/// reported as a failure of that provider.
pub async fn fetch_all(adapters: &[Arc<dyn SourceAdapter>], policy: RetryPolicy) -> Vec<FetchOutcome> {
    let handles: Vec<_> = adapters
        .iter()
        .map(|adapter| tokio::spawn(fetch_adapter(Arc::clone(adapter), policy)))
        .collect();

    let joined = futures_util::future::join_all(handles).await;

    adapters
        .iter()
        .zip(joined)
        .map(|(adapter, joined)| {
            joined.unwrap_or_else(|e| {
                debug!(provider = %adapter.provider(), error = %e, "fetch task aborted");
                FetchOutcome {
                    provider: adapter.provider().clone(),
                    attempts: 0,
                    result: Err(ProviderError::Network(format!("fetch task aborted: {e}"))),
                }
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use capflow_core::{EntityKind, ProviderResult};
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Flaky {
        provider: ProviderId,
        failures: u32,
        error: ProviderError,
        calls: AtomicU32,
    }

    impl Flaky {
        fn new(failures: u32, error: ProviderError) -> Self {
            Self {
                provider: ProviderId::new("flaky"),
                failures,
                error,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl SourceAdapter for Flaky {
        fn provider(&self) -> &ProviderId {
            &self.provider
        }

        async fn fetch(&self) -> ProviderResult<Vec<RawRecord>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(self.error.clone());
            }
            let at = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
            Ok(vec![RawRecord::chain(self.provider.clone(), "Ethereum", at)])
        }
    }

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(100),
            deadline: Duration::from_secs(30),
        }
    }

    // ==================== Backoff Tests ====================

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_retries: 10,
            base_delay: Duration::from_secs(2),
            deadline: Duration::from_secs(600),
        };
        let err = ProviderError::Network("reset".to_string());
        assert_eq!(policy.delay_for(0, &err), Duration::from_secs(2));
        assert_eq!(policy.delay_for(1, &err), Duration::from_secs(4));
        assert_eq!(policy.delay_for(3, &err), Duration::from_secs(16));
        assert_eq!(policy.delay_for(8, &err), MAX_RETRY_DELAY);
        assert_eq!(policy.delay_for(40, &err), MAX_RETRY_DELAY);
    }

    #[test]
    fn test_backoff_honours_retry_after() {
        let policy = policy(3);
        assert_eq!(
            policy.delay_for(0, &ProviderError::rate_limit(7)),
            Duration::from_secs(7)
        );
        assert_eq!(
            policy.delay_for(0, &ProviderError::rate_limit(600)),
            MAX_RETRY_DELAY
        );
    }

    #[test]
    fn test_policy_from_config() {
        let policy = RetryPolicy::from_config(&SourcesConfig::default());
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.base_delay, Duration::from_millis(2000));
        assert_eq!(policy.deadline, Duration::from_secs(30));
    }

    // ==================== Retry Tests ====================

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_are_retried() {
        let adapter = Arc::new(Flaky::new(2, ProviderError::api(503, "busy")));
        let outcome = fetch_adapter(adapter.clone(), policy(3)).await;

        assert_eq!(outcome.attempts, 3);
        let records = outcome.result.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, EntityKind::Chain);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_exhausted() {
        let adapter = Arc::new(Flaky::new(10, ProviderError::Network("reset".to_string())));
        let outcome = fetch_adapter(adapter.clone(), policy(2)).await;

        assert_eq!(outcome.attempts, 3);
        assert!(matches!(outcome.result, Err(ProviderError::Network(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_not_retried() {
        let adapter = Arc::new(Flaky::new(1, ProviderError::malformed("not json")));
        let outcome = fetch_adapter(adapter.clone(), policy(3)).await;

        assert_eq!(outcome.attempts, 1);
        assert!(matches!(outcome.result, Err(ProviderError::MalformedPayload(_))));
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_bounds_backoff() {
        // Retry-After of 60s per attempt cannot fit in a 30s deadline.
        let adapter = Arc::new(Flaky::new(10, ProviderError::rate_limit(60)));
        let outcome = fetch_adapter(adapter, policy(5)).await;

        assert_eq!(outcome.attempts, 1);
        assert!(matches!(outcome.result, Err(ProviderError::Timeout(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_all_keeps_adapter_order() {
        let adapters: Vec<Arc<dyn SourceAdapter>> = vec![
            Arc::new(Flaky::new(0, ProviderError::malformed("x"))),
            Arc::new(Flaky::new(5, ProviderError::malformed("x"))),
        ];
        let outcomes = fetch_all(&adapters, policy(0)).await;

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[0].result.is_ok());
        assert!(outcomes[1].result.is_err());
    }
}
