//! Source adapters for the capital-flow pipeline.
//!
//! Each adapter performs one fetch against a fixed external API and maps
//! the payload onto [`RawRecord`](capflow_core::RawRecord)s stamped with the
//! adapter's own clock.

pub mod binance;
pub mod defillama;
pub mod dexscreener;
pub mod http;

pub use binance::{BinanceFuturesAdapter, BINANCE_PROVIDER};
pub use defillama::{DefiLlamaChainsAdapter, DEFILLAMA_PROVIDER};
pub use dexscreener::{DexScreenerAdapter, DEXSCREENER_PROVIDER};
pub use http::{HttpClient, HttpClientConfig};

use capflow_core::{Clock, ProviderResult, SourceAdapter, SourcesConfig};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;

/// Builds every enabled adapter.
///
/// # Errors
/// Returns error if an HTTP client cannot be built.
pub fn build_adapters(
    config: &SourcesConfig,
    clock: Arc<dyn Clock>,
) -> ProviderResult<Vec<Arc<dyn SourceAdapter>>> {
    let timeout = config.fetch_timeout_secs;
    let mut adapters: Vec<Arc<dyn SourceAdapter>> = Vec::new();

    if config.binance.enabled {
        adapters.push(Arc::new(BinanceFuturesAdapter::new(
            &config.binance,
            timeout,
            clock.clone(),
        )?));
    }
    if config.defillama.enabled {
        adapters.push(Arc::new(DefiLlamaChainsAdapter::new(
            &config.defillama,
            timeout,
            clock.clone(),
        )?));
    }
    if config.dexscreener.enabled {
        adapters.push(Arc::new(DexScreenerAdapter::new(
            &config.dexscreener,
            timeout,
            clock,
        )?));
    }

    Ok(adapters)
}

/// Parses a provider decimal string, accepting scientific notation.
pub(crate) fn parse_decimal(raw: &str) -> Option<Decimal> {
    let raw = raw.trim();
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .ok()
}

pub(crate) fn decimal_from_f64(value: f64) -> Option<Decimal> {
    if value.is_finite() {
        Decimal::try_from(value).ok()
    } else {
        None
    }
}
