//! Binance USDT-margined futures: mark price, funding rate, and 24h ticker.

use crate::http::{HttpClient, HttpClientConfig};
use crate::parse_decimal;
use async_trait::async_trait;
use capflow_core::{
    BinanceConfig, Clock, ProviderId, ProviderResult, RateUnit, RawRecord, SourceAdapter,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Provider id of this adapter.
pub const BINANCE_PROVIDER: &str = "binance";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPremiumIndex {
    symbol: String,
    mark_price: String,
    last_funding_rate: Option<String>,
    time: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTicker24h {
    symbol: String,
    last_price: Option<String>,
    price_change_percent: Option<String>,
    quote_volume: Option<String>,
}

/// Spot-price and funding-rate adapter.
pub struct BinanceFuturesAdapter {
    provider: ProviderId,
    client: HttpClient,
    symbols: BTreeSet<String>,
    clock: Arc<dyn Clock>,
}

impl BinanceFuturesAdapter {
    /// Creates an adapter from configuration.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(
        config: &BinanceConfig,
        timeout_secs: u64,
        clock: Arc<dyn Clock>,
    ) -> ProviderResult<Self> {
        let client = HttpClient::new(
            HttpClientConfig::new(&config.base_url)
                .with_rate_limit(config.requests_per_minute)
                .with_timeout_secs(timeout_secs),
        )?;

        Ok(Self {
            provider: ProviderId::new(BINANCE_PROVIDER),
            client,
            symbols: config.symbols.iter().map(|s| s.to_uppercase()).collect(),
            clock,
        })
    }

    fn to_record(
        &self,
        index: RawPremiumIndex,
        ticker: Option<&RawTicker24h>,
        observed_at: DateTime<Utc>,
    ) -> RawRecord {
        let mut record = RawRecord::token(self.provider.clone(), index.symbol, observed_at)
            .with_rate_unit(RateUnit::Percent);

        let last_price = ticker.and_then(|t| t.last_price.as_deref().and_then(parse_decimal));
        if let Some(price) = parse_decimal(&index.mark_price).or(last_price) {
            record = record.with_price(price);
        }
        if let Some(rate) = index.last_funding_rate.as_deref().and_then(parse_decimal) {
            record = record.with_funding_rate(rate);
        }
        if let Some(time) = index.time.and_then(DateTime::from_timestamp_millis) {
            record = record.with_source_time(time);
        }
        if let Some(ticker) = ticker {
            if let Some(volume) = ticker.quote_volume.as_deref().and_then(parse_decimal) {
                record = record.with_volume(volume);
            }
            if let Some(change) = ticker.price_change_percent.as_deref().and_then(parse_decimal) {
                record = record.with_price_change(change);
            }
        }

        record
    }
}

#[async_trait]
impl SourceAdapter for BinanceFuturesAdapter {
    fn provider(&self) -> &ProviderId {
        &self.provider
    }

    async fn fetch(&self) -> ProviderResult<Vec<RawRecord>> {
        let (indices, tickers) = tokio::try_join!(
            self.client
                .get_json::<Vec<RawPremiumIndex>>("/fapi/v1/premiumIndex", &[]),
            self.client
                .get_json::<Vec<RawTicker24h>>("/fapi/v1/ticker/24hr", &[]),
        )?;
        let observed_at = self.clock.now();

        let tickers: HashMap<String, RawTicker24h> = tickers
            .into_iter()
            .filter(|t| self.symbols.contains(&t.symbol))
            .map(|t| (t.symbol.clone(), t))
            .collect();

        let records: Vec<RawRecord> = indices
            .into_iter()
            .filter(|i| self.symbols.contains(&i.symbol))
            .map(|index| {
                let ticker = tickers.get(&index.symbol);
                self.to_record(index, ticker, observed_at)
            })
            .collect();

        if records.len() < self.symbols.len() {
            let seen: BTreeSet<&str> = records.iter().map(|r| r.raw_id.as_str()).collect();
            let missing: Vec<&str> = self
                .symbols
                .iter()
                .map(String::as_str)
                .filter(|s| !seen.contains(s))
                .collect();
            tracing::warn!(provider = BINANCE_PROVIDER, ?missing, "symbols absent from premium index");
        }

        tracing::info!(provider = BINANCE_PROVIDER, records = records.len(), "fetched funding and tickers");
        Ok(records)
    }
}
