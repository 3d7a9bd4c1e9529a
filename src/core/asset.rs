//! Convertible assets and the static fallback universe

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Fiat,
    Crypto,
}

impl Display for AssetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                AssetKind::Fiat => "fiat",
                AssetKind::Crypto => "crypto",
            }
        )
    }
}

impl FromStr for AssetKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fiat" => Ok(AssetKind::Fiat),
            "crypto" => Ok(AssetKind::Crypto),
            _ => Err(anyhow::anyhow!("Invalid asset kind: {}", s)),
        }
    }
}

/// A currency or crypto asset. Identity is `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub id: String,
    pub symbol: String,
    pub name: String,
    pub kind: AssetKind,
}

impl Asset {
    pub fn fiat(code: &str) -> Self {
        let code = code.to_lowercase();
        Asset {
            name: code.to_uppercase(),
            symbol: code.clone(),
            id: code,
            kind: AssetKind::Fiat,
        }
    }

    pub fn crypto(id: &str, symbol: &str, name: &str) -> Self {
        Asset {
            id: id.to_string(),
            symbol: symbol.to_string(),
            name: name.to_string(),
            kind: AssetKind::Crypto,
        }
    }

    pub fn is_crypto(&self) -> bool {
        self.kind == AssetKind::Crypto
    }
}

/// Ids or symbols shown first in pickers.
pub const POPULAR_ASSETS: [&str; 7] = ["usd", "eur", "gbp", "btc", "eth", "usdt", "bnb"];

pub fn find_asset<'a>(assets: &'a [Asset], id: &str) -> Option<&'a Asset> {
    assets.iter().find(|a| a.id == id)
}

/// Finds an asset by id, then by symbol, so `btc` and `bitcoin` both work.
pub fn lookup_asset<'a>(assets: &'a [Asset], key: &str) -> Option<&'a Asset> {
    find_asset(assets, key).or_else(|| assets.iter().find(|a| a.symbol == key))
}

pub fn popular_assets(assets: &[Asset]) -> Vec<Asset> {
    assets
        .iter()
        .filter(|a| {
            POPULAR_ASSETS.contains(&a.id.as_str()) || POPULAR_ASSETS.contains(&a.symbol.as_str())
        })
        .cloned()
        .collect()
}

pub fn assets_of_kind(assets: &[Asset], kind: AssetKind) -> Vec<Asset> {
    assets.iter().filter(|a| a.kind == kind).cloned().collect()
}

const FALLBACK_FIAT: [&str; 16] = [
    "usd", "eur", "gbp", "jpy", "cny", "inr", "cad", "aud", "chf", "krw", "brl", "mxn", "sgd",
    "hkd", "sek", "zar",
];

const FALLBACK_CRYPTO: [(&str, &str, &str); 10] = [
    ("bitcoin", "btc", "Bitcoin"),
    ("ethereum", "eth", "Ethereum"),
    ("tether", "usdt", "Tether"),
    ("binancecoin", "bnb", "BNB"),
    ("solana", "sol", "Solana"),
    ("usd-coin", "usdc", "USDC"),
    ("ripple", "xrp", "XRP"),
    ("dogecoin", "doge", "Dogecoin"),
    ("cardano", "ada", "Cardano"),
    ("litecoin", "ltc", "Litecoin"),
];

/// Hand-curated universe used when the pricing provider is unreachable.
pub fn fallback_assets() -> Vec<Asset> {
    FALLBACK_FIAT
        .iter()
        .map(|code| Asset::fiat(code))
        .chain(
            FALLBACK_CRYPTO
                .iter()
                .map(|(id, symbol, name)| Asset::crypto(id, symbol, name)),
        )
        .collect()
}
