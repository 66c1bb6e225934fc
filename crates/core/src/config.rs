use crate::snapshot::Indicator;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub pipeline: PipelineConfig,
    pub sources: SourcesConfig,
    pub filter: FilterConfig,
    pub classifier: ClassifierConfig,
    pub scorer: ScorerConfig,
    pub migration: MigrationConfig,
    pub report: ReportConfig,
    pub database: DatabaseConfig,
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    /// Checks value ranges that serde cannot express.
    ///
    /// # Errors
    /// Returns an error naming the first invalid option.
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.run_interval_secs == 0 {
            bail!("pipeline.run_interval_secs must be positive");
        }
        if self.sources.fetch_timeout_secs == 0 {
            bail!("sources.fetch_timeout_secs must be positive");
        }
        if self.filter.freshness_threshold_secs == Some(0) {
            bail!("filter.freshness_threshold_secs must be positive");
        }
        if self.filter.turnover_multiple <= 0.0 {
            bail!("filter.turnover_multiple must be positive");
        }
        if self.filter.zombie_price_change_pct < 0.0 || self.filter.zombie_min_volume_usd < 0.0 {
            bail!("filter zombie thresholds must not be negative");
        }
        if self.migration.min_abs_delta_usd < 0.0 || self.migration.min_pct_change < 0.0 {
            bail!("migration thresholds must not be negative");
        }
        if !(0.0..=1.0).contains(&self.classifier.breakout_volume_rank) {
            bail!("classifier.breakout_volume_rank must be within [0, 1]");
        }
        self.scorer.validate()
    }

    /// Freshness threshold, defaulting to twice the run interval.
    #[must_use]
    pub fn freshness_threshold(&self) -> Duration {
        Duration::from_secs(
            self.filter
                .freshness_threshold_secs
                .unwrap_or(self.pipeline.run_interval_secs.saturating_mul(2)),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Informational; runs are triggered externally.
    pub run_interval_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            run_interval_secs: 1800,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// Deadline for one adapter, retries included.
    pub fetch_timeout_secs: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub binance: BinanceConfig,
    pub defillama: DefiLlamaConfig,
    pub dexscreener: DexScreenerConfig,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: 30,
            max_retries: 3,
            retry_base_delay_ms: 2000,
            binance: BinanceConfig::default(),
            defillama: DefiLlamaConfig::default(),
            dexscreener: DexScreenerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BinanceConfig {
    pub enabled: bool,
    pub base_url: String,
    /// USDT-margined perpetual symbols.
    pub symbols: Vec<String>,
    pub requests_per_minute: u32,
}

impl Default for BinanceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://fapi.binance.com".to_string(),
            symbols: ["BTCUSDT", "ETHUSDT", "SOLUSDT", "BNBUSDT"]
                .iter()
                .map(ToString::to_string)
                .collect(),
            requests_per_minute: 600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DefiLlamaConfig {
    pub enabled: bool,
    pub base_url: String,
    /// Number of chains kept, ranked by TVL.
    pub top_n: usize,
    pub requests_per_minute: u32,
}

impl Default for DefiLlamaConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://api.llama.fi".to_string(),
            top_n: 20,
            requests_per_minute: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DexScreenerConfig {
    pub enabled: bool,
    pub base_url: String,
    /// Search keywords per chain id.
    pub queries: BTreeMap<String, Vec<String>>,
    pub min_liquidity_usd: f64,
    pub requests_per_minute: u32,
}

impl Default for DexScreenerConfig {
    fn default() -> Self {
        let queries = [
            ("ethereum", vec!["uniswap", "sushiswap"]),
            ("solana", vec!["raydium", "orca"]),
            ("bsc", vec!["pancakeswap"]),
            ("base", vec!["aerodrome"]),
            ("arbitrum", vec!["camelot"]),
        ]
        .into_iter()
        .map(|(chain, keywords)| {
            (
                chain.to_string(),
                keywords.into_iter().map(ToString::to_string).collect(),
            )
        })
        .collect();

        Self {
            enabled: true,
            base_url: "https://api.dexscreener.com".to_string(),
            queries,
            min_liquidity_usd: 10_000.0,
            requests_per_minute: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Defaults to twice the run interval when unset.
    pub freshness_threshold_secs: Option<u64>,
    /// Maximum volume-to-TVL ratio.
    pub turnover_multiple: f64,
    /// Absolute price change, in percent, below which volume is considered zombie.
    pub zombie_price_change_pct: f64,
    pub zombie_min_volume_usd: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            freshness_threshold_secs: None,
            turnover_multiple: 100.0,
            zombie_price_change_pct: 0.01,
            zombie_min_volume_usd: 50_000.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Minimum volume percentile rank for a breakout.
    pub breakout_volume_rank: f64,
    pub breakout_change_pct: f64,
    /// Absolute change below which price counts as flat.
    pub flat_change_pct: f64,
    pub distribution_change_pct: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            breakout_volume_rank: 0.9,
            breakout_change_pct: 5.0,
            flat_change_pct: 2.0,
            distribution_change_pct: 5.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScorerConfig {
    /// `{indicator: weight}` for `funding`, `momentum`, `breadth`, `dispersion`,
    /// `rotation`, `flow_trend`.
    pub weights: BTreeMap<String, f64>,
    /// Funding rate (fraction per interval) considered neutral.
    pub funding_neutral: f64,
    /// Funding deviation mapped to the edge of the scale.
    pub funding_scale: f64,
    pub momentum_scale_pct: f64,
    pub dispersion_scale_pct: f64,
    /// Mean recent-hour volume trend mapped to the edge of the scale.
    pub flow_trend_scale_pct: f64,
}

impl ScorerConfig {
    fn validate(&self) -> Result<()> {
        if let Some(name) = self
            .weights
            .keys()
            .find(|name| name.parse::<Indicator>().is_err())
        {
            bail!("scorer.weights has unknown indicator '{name}'");
        }
        if self.weights.values().any(|w| *w < 0.0 || !w.is_finite()) {
            bail!("scorer.weights must be finite and non-negative");
        }
        if self.weights.values().all(|w| *w == 0.0) {
            bail!("scorer.weights must contain at least one positive weight");
        }
        let scales = [
            self.funding_scale,
            self.momentum_scale_pct,
            self.dispersion_scale_pct,
            self.flow_trend_scale_pct,
        ];
        if scales.iter().any(|s| *s <= 0.0 || !s.is_finite()) {
            bail!("scorer scales must be finite and positive");
        }
        if !self.funding_neutral.is_finite() {
            bail!("scorer.funding_neutral must be finite");
        }
        Ok(())
    }
}

impl Default for ScorerConfig {
    fn default() -> Self {
        let weights = [
            ("funding", 0.25),
            ("momentum", 0.25),
            ("breadth", 0.20),
            ("dispersion", 0.10),
            ("rotation", 0.10),
            ("flow_trend", 0.10),
        ]
        .into_iter()
        .map(|(name, weight)| (name.to_string(), weight))
        .collect();

        Self {
            weights,
            funding_neutral: 0.0001,
            funding_scale: 0.0005,
            momentum_scale_pct: 10.0,
            dispersion_scale_pct: 20.0,
            flow_trend_scale_pct: 100.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    pub min_abs_delta_usd: f64,
    pub min_pct_change: f64,
    /// Cap on outflow-to-inflow routes reported.
    pub max_routes: usize,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            min_abs_delta_usd: 100_000_000.0,
            min_pct_change: 5.0,
            max_routes: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub top_n: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self { top_n: 10 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost/capflow".to_string(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pipeline.run_interval_secs, 1800);
        assert_eq!(config.filter.turnover_multiple, 100.0);
        assert_eq!(config.scorer.weights.len(), 6);
        assert_eq!(config.sources.dexscreener.min_liquidity_usd, 10_000.0);
    }

    #[test]
    fn test_freshness_defaults_to_twice_interval() {
        let mut config = AppConfig::default();
        assert_eq!(config.freshness_threshold(), Duration::from_secs(3600));

        config.filter.freshness_threshold_secs = Some(600);
        assert_eq!(config.freshness_threshold(), Duration::from_secs(600));
    }

    #[test]
    fn test_freshness_saturates_for_huge_interval() {
        let mut config = AppConfig::default();
        config.pipeline.run_interval_secs = u64::MAX;
        assert_eq!(config.freshness_threshold(), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn test_validate_rejects_bad_scales() {
        let mut config = AppConfig::default();
        config.scorer.flow_trend_scale_pct = 0.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.scorer.momentum_scale_pct = f64::INFINITY;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = AppConfig::default();
        config.sources.fetch_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_weights() {
        let mut config = AppConfig::default();
        config.scorer.weights.insert("funding".to_string(), -0.1);
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        for weight in config.scorer.weights.values_mut() {
            *weight = 0.0;
        }
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.scorer.weights.insert("sentiment".to_string(), 0.1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_rank_out_of_range() {
        let mut config = AppConfig::default();
        config.classifier.breakout_volume_rank = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"filter": {"turnover_multiple": 50.0}}"#).unwrap();
        assert_eq!(config.filter.turnover_multiple, 50.0);
        assert_eq!(config.filter.zombie_min_volume_usd, 50_000.0);
        assert_eq!(config.migration.max_routes, 5);
    }
}
