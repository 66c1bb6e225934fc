//! Canonical identities for chains, tokens, and data providers.
//!
//! Every observation in a run is keyed by an [`EntityKey`], which is
//! independent of the provider that reported it. Chain-agnostic majors such
//! as BTC live under the [`GLOBAL_CHAIN`] tag.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Chain tag for assets that are not bound to a single chain.
pub const GLOBAL_CHAIN: &str = "global";

/// Whether an entity is a chain or a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Chain,
    Token,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Chain => write!(f, "chain"),
            Self::Token => write!(f, "token"),
        }
    }
}

/// Provider-independent key of a chain or token.
///
/// Chain ids are lower case (`ethereum`, `bsc`). Token symbols are upper
/// case and carry the chain they trade on (`PEPE@ethereum`, `BTC@global`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EntityKey {
    Chain(String),
    Token { symbol: String, chain: String },
}

impl EntityKey {
    /// Creates a chain key, lower-casing the id.
    pub fn chain(id: impl AsRef<str>) -> Self {
        Self::Chain(id.as_ref().trim().to_lowercase())
    }

    /// Creates a token key, upper-casing the symbol and lower-casing the chain tag.
    pub fn token(symbol: impl AsRef<str>, chain: impl AsRef<str>) -> Self {
        Self::Token {
            symbol: symbol.as_ref().trim().to_uppercase(),
            chain: chain.as_ref().trim().to_lowercase(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Chain(_) => EntityKind::Chain,
            Self::Token { .. } => EntityKind::Token,
        }
    }

    #[must_use]
    pub fn is_chain(&self) -> bool {
        matches!(self, Self::Chain(_))
    }

    /// Returns the chain this entity belongs to (the chain itself for chain keys).
    #[must_use]
    pub fn chain_tag(&self) -> &str {
        match self {
            Self::Chain(id) => id,
            Self::Token { chain, .. } => chain,
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Chain(id) => write!(f, "chain:{id}"),
            Self::Token { symbol, chain } => write!(f, "token:{symbol}@{chain}"),
        }
    }
}

/// Failure to parse the display form of an [`EntityKey`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid entity key: {0}")]
pub struct ParseEntityKeyError(pub String);

impl FromStr for EntityKey {
    type Err = ParseEntityKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseEntityKeyError(s.to_string());
        let (kind, rest) = s.split_once(':').ok_or_else(invalid)?;

        match kind {
            "chain" if !rest.is_empty() => Ok(Self::chain(rest)),
            "token" => {
                let (symbol, chain) = rest.rsplit_once('@').ok_or_else(invalid)?;
                if symbol.is_empty() || chain.is_empty() {
                    return Err(invalid());
                }
                Ok(Self::token(symbol, chain))
            }
            _ => Err(invalid()),
        }
    }
}

impl TryFrom<String> for EntityKey {
    type Error = ParseEntityKeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EntityKey> for String {
    fn from(key: EntityKey) -> Self {
        key.to_string()
    }
}

/// Identifier of an upstream data provider (e.g. `defillama`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(String);

impl ProviderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProviderId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}
