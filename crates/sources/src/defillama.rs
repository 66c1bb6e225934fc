//! DefiLlama chain TVL listing.

use crate::decimal_from_f64;
use crate::http::{HttpClient, HttpClientConfig};
use async_trait::async_trait;
use capflow_core::{
    Clock, DefiLlamaConfig, ProviderId, ProviderResult, RawRecord, SourceAdapter, ValueUnit,
};
use serde::Deserialize;
use std::cmp::Ordering;
use std::sync::Arc;

/// Provider id of this adapter.
pub const DEFILLAMA_PROVIDER: &str = "defillama";

#[derive(Debug, Clone, Deserialize)]
struct RawChain {
    name: String,
    tvl: Option<f64>,
}

/// Chain-TVL adapter keeping the largest chains by TVL.
pub struct DefiLlamaChainsAdapter {
    provider: ProviderId,
    client: HttpClient,
    top_n: usize,
    clock: Arc<dyn Clock>,
}

impl DefiLlamaChainsAdapter {
    /// Creates an adapter from configuration.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(
        config: &DefiLlamaConfig,
        timeout_secs: u64,
        clock: Arc<dyn Clock>,
    ) -> ProviderResult<Self> {
        let client = HttpClient::new(
            HttpClientConfig::new(&config.base_url)
                .with_rate_limit(config.requests_per_minute)
                .with_timeout_secs(timeout_secs),
        )?;

        Ok(Self {
            provider: ProviderId::new(DEFILLAMA_PROVIDER),
            client,
            top_n: config.top_n,
            clock,
        })
    }
}

#[async_trait]
impl SourceAdapter for DefiLlamaChainsAdapter {
    fn provider(&self) -> &ProviderId {
        &self.provider
    }

    async fn fetch(&self) -> ProviderResult<Vec<RawRecord>> {
        let mut chains: Vec<RawChain> = self.client.get_json("/v2/chains", &[]).await?;
        let observed_at = self.clock.now();

        chains.retain(|c| c.tvl.is_some_and(|tvl| tvl.is_finite() && tvl > 0.0));
        chains.sort_by(|a, b| {
            b.tvl
                .partial_cmp(&a.tvl)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.name.cmp(&b.name))
        });
        chains.truncate(self.top_n);

        let records: Vec<RawRecord> = chains
            .into_iter()
            .map(|chain| {
                let record = RawRecord::chain(self.provider.clone(), chain.name, observed_at)
                    .with_value_unit(ValueUnit::Usd);
                match chain.tvl.and_then(decimal_from_f64) {
                    Some(tvl) => record.with_tvl(tvl),
                    None => record,
                }
            })
            .collect();

        tracing::info!(provider = DEFILLAMA_PROVIDER, records = records.len(), "fetched chain TVL");
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capflow_core::{EntityKind, FixedClock, ProviderError};
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn adapter_for(server: &MockServer, top_n: usize) -> DefiLlamaChainsAdapter {
        let config = DefiLlamaConfig {
            base_url: server.uri(),
            top_n,
            ..Default::default()
        };
        let clock = Arc::new(FixedClock(Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap()));
        DefiLlamaChainsAdapter::new(&config, 5, clock).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_keeps_top_chains_by_tvl() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/chains"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"name": "Tron", "tvl": 5500000000.0, "tokenSymbol": "TRX"},
                {"name": "Ethereum", "tvl": 62000000000.0, "tokenSymbol": "ETH"},
                {"name": "Binance Smart Chain", "tvl": 5800000000.0},
                {"name": "Dead Chain", "tvl": 0.0},
                {"name": "Unknown", "tvl": null}
            ])))
            .mount(&server)
            .await;

        let adapter = adapter_for(&server, 2);
        let records = adapter.fetch().await.unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].raw_id, "Ethereum");
        assert_eq!(records[0].kind, EntityKind::Chain);
        assert_eq!(records[0].tvl, Some(dec!(62000000000)));
        assert_eq!(records[1].raw_id, "Binance Smart Chain");
    }

    #[tokio::test]
    async fn test_api_error_propagates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/chains"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let adapter = adapter_for(&server, 20);
        let err = adapter.fetch().await.unwrap_err();
        assert!(matches!(err, ProviderError::Api { status_code: 500, .. }));
    }
}
