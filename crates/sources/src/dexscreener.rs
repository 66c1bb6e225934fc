//! DexScreener pair search.
//!
//! Each configured chain is searched with one or more DEX keywords. Results
//! are restricted to that chain, deduplicated by pair address, and pairs
//! below the liquidity floor are dropped.

use crate::decimal_from_f64;
use crate::http::{HttpClient, HttpClientConfig};
use crate::parse_decimal;
use async_trait::async_trait;
use capflow_core::{
    Clock, DexScreenerConfig, ProviderError, ProviderId, ProviderResult, RateUnit, RawRecord,
    SourceAdapter,
};
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// Provider id of this adapter.
pub const DEXSCREENER_PROVIDER: &str = "dexscreener";

#[derive(Debug, Clone, Deserialize)]
struct RawSearchResponse {
    pairs: Option<Vec<RawPair>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawWindowed {
    h24: Option<f64>,
    h1: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawToken {
    symbol: String,
}

#[derive(Debug, Clone, Deserialize)]
struct RawLiquidity {
    usd: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPair {
    chain_id: String,
    pair_address: String,
    base_token: RawToken,
    quote_token: RawToken,
    price_usd: Option<String>,
    #[serde(default)]
    volume: RawWindowed,
    #[serde(default)]
    price_change: RawWindowed,
    liquidity: Option<RawLiquidity>,
}

impl RawPair {
    fn liquidity_usd(&self) -> f64 {
        self.liquidity.as_ref().and_then(|l| l.usd).unwrap_or(0.0)
    }

    fn into_record(self, provider: &ProviderId, observed_at: DateTime<Utc>) -> RawRecord {
        let liquidity = self.liquidity.as_ref().and_then(|l| l.usd);
        let mut record = RawRecord::token(provider.clone(), self.base_token.symbol, observed_at)
            .with_chain_hint(self.chain_id)
            .with_quote_symbol(self.quote_token.symbol)
            .with_rate_unit(RateUnit::Percent);

        if let Some(price) = self.price_usd.as_deref().and_then(parse_decimal) {
            record = record.with_price(price);
        }
        if let Some(volume) = self.volume.h24.and_then(decimal_from_f64) {
            record = record.with_volume(volume);
        }
        if let Some(volume) = self.volume.h1.and_then(decimal_from_f64) {
            record = record.with_volume_recent(volume);
        }
        if let Some(change) = self.price_change.h24.and_then(decimal_from_f64) {
            record = record.with_price_change(change);
        }
        if let Some(tvl) = liquidity.and_then(decimal_from_f64) {
            record = record.with_tvl(tvl);
        }

        record
    }
}

/// DEX-pair adapter.
pub struct DexScreenerAdapter {
    provider: ProviderId,
    client: HttpClient,
    queries: BTreeMap<String, Vec<String>>,
    min_liquidity_usd: f64,
    clock: Arc<dyn Clock>,
}

impl DexScreenerAdapter {
    /// Creates an adapter from configuration.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(
        config: &DexScreenerConfig,
        timeout_secs: u64,
        clock: Arc<dyn Clock>,
    ) -> ProviderResult<Self> {
        let client = HttpClient::new(
            HttpClientConfig::new(&config.base_url)
                .with_rate_limit(config.requests_per_minute)
                .with_timeout_secs(timeout_secs),
        )?;

        Ok(Self {
            provider: ProviderId::new(DEXSCREENER_PROVIDER),
            client,
            queries: config.queries.clone(),
            min_liquidity_usd: config.min_liquidity_usd,
            clock,
        })
    }

    async fn search(&self, chain: &str, keyword: &str) -> ProviderResult<Vec<RawPair>> {
        let response: RawSearchResponse = self
            .client
            .get_json("/latest/dex/search", &[("q", keyword)])
            .await?;

        Ok(response
            .pairs
            .unwrap_or_default()
            .into_iter()
            .filter(|p| p.chain_id.eq_ignore_ascii_case(chain))
            .collect())
    }
}

#[async_trait]
impl SourceAdapter for DexScreenerAdapter {
    fn provider(&self) -> &ProviderId {
        &self.provider
    }

    async fn fetch(&self) -> ProviderResult<Vec<RawRecord>> {
        let searches: Vec<(&str, &str)> = self
            .queries
            .iter()
            .flat_map(|(chain, keywords)| {
                keywords.iter().map(move |k| (chain.as_str(), k.as_str()))
            })
            .collect();

        let results = join_all(
            searches
                .iter()
                .map(|(chain, keyword)| self.search(chain, keyword)),
        )
        .await;
        let observed_at = self.clock.now();

        let mut seen = HashSet::new();
        let mut records = Vec::new();
        let mut first_error: Option<ProviderError> = None;
        let mut succeeded = 0usize;

        for ((chain, keyword), result) in searches.iter().zip(results) {
            match result {
                Ok(pairs) => {
                    succeeded += 1;
                    for pair in pairs {
                        if pair.liquidity_usd() < self.min_liquidity_usd {
                            continue;
                        }
                        if !seen.insert(pair.pair_address.clone()) {
                            continue;
                        }
                        records.push(pair.into_record(&self.provider, observed_at));
                    }
                }
                Err(e) => {
                    tracing::warn!(provider = DEXSCREENER_PROVIDER, chain, keyword, error = %e, "search failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        if succeeded == 0 {
            if let Some(e) = first_error {
                return Err(e);
            }
        }

        tracing::info!(
            provider = DEXSCREENER_PROVIDER,
            records = records.len(),
            searches = searches.len(),
            failed = searches.len() - succeeded,
            "fetched DEX pairs"
        );
        Ok(records)
    }
}
