//! Pricing provider abstractions

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;

/// `asset id -> denomination id -> price`
pub type PriceMatrix = HashMap<String, HashMap<String, f64>>;

#[derive(Debug, Clone, Deserialize)]
pub struct CryptoListing {
    pub id: String,
    pub symbol: String,
    pub name: String,
}

#[async_trait]
pub trait PricingProvider: Send + Sync {
    /// Fiat codes the provider can price in.
    async fn fiat_codes(&self) -> Result<Vec<String>>;

    /// Top `count` crypto assets by market capitalization.
    async fn top_crypto(&self, count: usize) -> Result<Vec<CryptoListing>>;

    /// Prices of every id in `ids` denominated in every id of `vs`.
    async fn prices(&self, ids: &[String], vs: &[String]) -> Result<PriceMatrix>;
}
