//! Identifier resolution tables.
//!
//! Every function here is a pure lookup plus fallback normalization, so a
//! raw identifier always resolves to the same canonical key regardless of
//! what else is in the run.

use capflow_core::{AssetCategory, GLOBAL_CHAIN};
use rust_decimal::Decimal;

/// Quote suffixes stripped from centralized-exchange contract symbols.
const CEX_QUOTE_SUFFIXES: [&str; 4] = ["USDT", "USDC", "FDUSD", "BUSD"];

const STABLECOINS: [&str; 19] = [
    "USDT", "USDC", "DAI", "FDUSD", "TUSD", "BUSD", "USDD", "PYUSD", "GUSD", "LUSD", "FRAX",
    "USDP", "USDE", "CRVUSD", "GHO", "DOLA", "EURC", "USDS", "USD1",
];

/// Chain-agnostic assets keyed under [`GLOBAL_CHAIN`].
const GLOBAL_MAJORS: [&str; 6] = ["BTC", "ETH", "SOL", "BNB", "USDT", "USDC"];

/// Canonical chain id for a provider's chain name.
///
/// Known aliases are looked up first; anything else is lower-cased with
/// spaces and underscores turned into dashes. Returns `None` for names that
/// do not reduce to `[a-z0-9-]+`.
#[must_use]
pub fn resolve_chain(raw: &str) -> Option<String> {
    let lowered = raw.trim().to_lowercase();
    let aliased = match lowered.as_str() {
        "bsc" | "binance smart chain" | "bnb chain" | "bnb smart chain" | "binance" | "bnb" => {
            "bsc"
        }
        "arbitrum one" | "arbitrum" | "arb" => "arbitrum",
        "op mainnet" | "optimism" | "op" => "optimism",
        "hyperliquid l1" | "hyperliquid" => "hyperliquid",
        "vaulta" | "eos" => "eos",
        "zksync era" | "zksync" | "zksync-era" => "zksync",
        "avalanche" | "avalanche c-chain" | "avax" => "avalanche",
        "polygon" | "polygon pos" | "matic" | "polygon-pos" => "polygon",
        "ethereum" | "eth" | "ethereum mainnet" => "ethereum",
        "solana" | "sol" => "solana",
        "tron" | "trx" => "tron",
        "ton" | "the open network" => "ton",
        "xrpl" | "xrp ledger" => "xrpl",
        other => other,
    };

    let normalized: String = aliased
        .split(|c: char| c.is_whitespace() || c == '_')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-");

    let valid = !normalized.is_empty()
        && !normalized.starts_with('-')
        && normalized
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');

    valid.then_some(normalized)
}

/// Canonical symbol for wrapped and bridged aliases.
fn alias_symbol(symbol: &str) -> &str {
    match symbol {
        "WBTC" | "BTCB" | "CBBTC" => "BTC",
        "WETH" => "ETH",
        "WBNB" => "BNB",
        "WSOL" => "SOL",
        "WMATIC" => "MATIC",
        "WAVAX" => "AVAX",
        "WTRX" => "TRX",
        other => other,
    }
}

/// Home chain of tokens that centralized exchanges list without a chain.
fn home_chain(symbol: &str) -> Option<&'static str> {
    match symbol {
        "PEPE" | "SHIB" | "FLOKI" | "LINK" | "UNI" | "AAVE" | "MKR" | "LDO" => Some("ethereum"),
        "BONK" | "WIF" | "JUP" | "PYTH" | "RAY" => Some("solana"),
        "ARB" => Some("arbitrum"),
        "OP" => Some("optimism"),
        "AVAX" => Some("avalanche"),
        "TRX" => Some("tron"),
        "SUI" => Some("sui"),
        "APT" => Some("aptos"),
        "HYPE" => Some("hyperliquid"),
        _ => None,
    }
}

/// Splits a leading multiplier (`1000PEPE`, `1MBABYDOGE`) off a symbol.
fn split_multiplier(symbol: &str) -> (Decimal, &str) {
    if let Some(rest) = symbol.strip_prefix("1M") {
        if rest.len() > 1 && rest.chars().all(|c| c.is_ascii_alphabetic()) {
            return (Decimal::from(1_000_000), rest);
        }
    }

    let digits = symbol.chars().take_while(char::is_ascii_digit).count();
    let (prefix, rest) = symbol.split_at(digits);
    let is_power_of_ten = prefix.len() >= 4
        && prefix.starts_with('1')
        && prefix[1..].chars().all(|c| c == '0');

    if is_power_of_ten && !rest.is_empty() && rest.chars().all(|c| c.is_ascii_alphabetic()) {
        if let Ok(multiplier) = prefix.parse::<u64>() {
            return (Decimal::from(multiplier), rest);
        }
    }

    (Decimal::ONE, symbol)
}

fn valid_symbol(symbol: &str) -> bool {
    !symbol.is_empty()
        && symbol.len() <= 20
        && symbol
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || matches!(c, '.' | '-' | '$'))
}

/// Outcome of resolving a token identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenResolution {
    pub symbol: String,
    /// Chain tag of the canonical key.
    pub chain: String,
    /// Contract multiplier; raw prices are divided by it.
    pub price_divisor: Decimal,
}

/// Resolves a token identifier to its canonical symbol and chain tag.
///
/// Without a venue chain the identifier is treated as a centralized-exchange
/// contract symbol: a quote suffix is stripped and the home-chain table
/// decides the tag. Chain-agnostic majors always resolve to [`GLOBAL_CHAIN`].
///
/// # Errors
/// Returns a short reason when the identifier cannot be resolved.
pub fn resolve_token(raw_id: &str, venue_chain: Option<&str>) -> Result<TokenResolution, String> {
    let upper = raw_id.trim().to_uppercase();
    let venue = match venue_chain {
        Some(raw_chain) => Some(
            resolve_chain(raw_chain).ok_or_else(|| format!("unknown chain '{raw_chain}'"))?,
        ),
        None => None,
    };

    let base = if venue.is_none() {
        CEX_QUOTE_SUFFIXES
            .iter()
            .find_map(|quote| upper.strip_suffix(quote).filter(|b| !b.is_empty()))
            .unwrap_or(upper.as_str())
    } else {
        upper.as_str()
    };

    let (price_divisor, unscaled) = split_multiplier(base);
    let symbol = alias_symbol(unscaled);
    if !valid_symbol(symbol) {
        return Err(format!("unrecognized symbol '{raw_id}'"));
    }

    let chain = if GLOBAL_MAJORS.contains(&symbol) {
        GLOBAL_CHAIN.to_string()
    } else if let Some(venue) = venue {
        venue
    } else {
        home_chain(symbol).unwrap_or(GLOBAL_CHAIN).to_string()
    };

    Ok(TokenResolution {
        symbol: symbol.to_string(),
        chain,
        price_divisor,
    })
}

/// Native gas token of a canonical chain.
#[must_use]
pub fn native_symbol(chain: &str) -> Option<&'static str> {
    match chain {
        "ethereum" | "arbitrum" | "optimism" | "base" | "linea" | "scroll" | "blast"
        | "zksync" | "starknet" | "manta" => Some("ETH"),
        "solana" => Some("SOL"),
        "bsc" => Some("BNB"),
        "polygon" => Some("MATIC"),
        "avalanche" => Some("AVAX"),
        "tron" => Some("TRX"),
        "sui" => Some("SUI"),
        "aptos" => Some("APT"),
        "ton" => Some("TON"),
        "fantom" => Some("FTM"),
        "cronos" => Some("CRO"),
        "mantle" => Some("MNT"),
        "hyperliquid" => Some("HYPE"),
        "sei" => Some("SEI"),
        "near" => Some("NEAR"),
        "cardano" => Some("ADA"),
        "bitcoin" => Some("BTC"),
        _ => None,
    }
}

/// Asset category of a symbol traded on `chain`.
#[must_use]
pub fn categorize(symbol: &str, chain: &str) -> AssetCategory {
    let upper = symbol.trim().to_uppercase();
    let canonical = alias_symbol(&upper);

    if STABLECOINS.contains(&canonical) {
        AssetCategory::Stablecoin
    } else if canonical == "BTC" || matches!(canonical, "TBTC" | "RENBTC" | "SBTC" | "HBTC") {
        AssetCategory::Btc
    } else if native_symbol(chain) == Some(canonical) {
        AssetCategory::Native
    } else {
        AssetCategory::Altcoin
    }
}
