//! Asset universe and exchange rate resolution

use super::asset::{Asset, AssetKind, fallback_assets, find_asset, lookup_asset};
use super::pricing::{PriceMatrix, PricingProvider};
use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, instrument, warn};

/// Units of target per 1 unit of base, keyed by target asset id.
pub type RateTable = HashMap<String, f64>;

/// Crypto asset used to triangulate fiat to fiat rates.
pub const REFERENCE_CRYPTO: &str = "bitcoin";
/// Fiat used to triangulate crypto to crypto rates.
pub const REFERENCE_FIAT: &str = "usd";
pub const DEFAULT_CRYPTO_COUNT: usize = 100;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateStatus {
    /// The asset universe is the fallback table.
    pub degraded: bool,
    pub asset_error: Option<String>,
    pub rate_error: Option<String>,
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct RateState {
    assets: Vec<Asset>,
    rates: RateTable,
    status: RateStatus,
    applied_seq: u64,
}

/// Targets of one resolution call split by kind.
struct RateQuery {
    base: Asset,
    fiat_targets: Vec<String>,
    crypto_targets: Vec<String>,
}

impl RateQuery {
    fn new(assets: &[Asset], base_id: &str, target_ids: &[String]) -> Result<Self> {
        let base = lookup_asset(assets, base_id)
            .cloned()
            .ok_or_else(|| anyhow!("Base currency not found: {}", base_id))?;

        let mut fiat_targets = Vec::new();
        let mut crypto_targets = Vec::new();
        for id in target_ids {
            match find_asset(assets, id).map(|a| a.kind) {
                Some(AssetKind::Fiat) => fiat_targets.push(id.clone()),
                Some(AssetKind::Crypto) => crypto_targets.push(id.clone()),
                None => debug!("Skipping unknown target currency: {}", id),
            }
        }

        Ok(Self {
            base,
            fiat_targets,
            crypto_targets,
        })
    }

    fn is_empty(&self) -> bool {
        self.fiat_targets.is_empty() && self.crypto_targets.is_empty()
    }
}

fn push_unique(list: &mut Vec<String>, id: &str) {
    if !list.iter().any(|x| x == id) {
        list.push(id.to_string());
    }
}

fn positive_price(matrix: &PriceMatrix, id: &str, vs: &str) -> Option<f64> {
    matrix
        .get(id)
        .and_then(|prices| prices.get(vs))
        .copied()
        .filter(|p| *p > 0.0 && p.is_finite())
}

/// Resolves assets and rates against a [`PricingProvider`].
///
/// Failures never propagate: the asset list degrades to [`fallback_assets`]
/// and a failed rate refresh keeps the last table. Both are reported through
/// [`RateService::status`].
pub struct RateService<P: PricingProvider> {
    provider: P,
    crypto_count: usize,
    state: Mutex<RateState>,
    request_seq: AtomicU64,
}

impl<P: PricingProvider> RateService<P> {
    pub fn new(provider: P) -> Self {
        Self::with_crypto_count(provider, DEFAULT_CRYPTO_COUNT)
    }

    pub fn with_crypto_count(provider: P, crypto_count: usize) -> Self {
        Self {
            provider,
            crypto_count,
            state: Mutex::new(RateState::default()),
            request_seq: AtomicU64::new(0),
        }
    }

    fn state(&self) -> MutexGuard<'_, RateState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn assets(&self) -> Vec<Asset> {
        self.state().assets.clone()
    }

    pub fn current_rates(&self) -> RateTable {
        self.state().rates.clone()
    }

    pub fn status(&self) -> RateStatus {
        self.state().status.clone()
    }

    /// Fetches fiat codes and top crypto assets. Falls back to the static
    /// table on any failure.
    #[instrument(name = "ListAssets", skip(self))]
    pub async fn list_assets(&self) -> Vec<Asset> {
        let fetched = futures::try_join!(
            self.provider.fiat_codes(),
            self.provider.top_crypto(self.crypto_count)
        )
        .and_then(|(fiat, crypto)| {
            let mut seen = HashSet::new();
            let assets: Vec<Asset> = fiat
                .iter()
                .map(|code| Asset::fiat(code))
                .chain(
                    crypto
                        .iter()
                        .map(|c| Asset::crypto(&c.id, &c.symbol, &c.name)),
                )
                .filter(|a| seen.insert(a.id.clone()))
                .collect();
            if assets.is_empty() {
                return Err(anyhow!("Pricing provider returned no assets"));
            }
            Ok(assets)
        });

        let mut state = self.state();
        match fetched {
            Ok(assets) => {
                debug!("Loaded {} assets", assets.len());
                state.assets = assets;
                state.status.degraded = false;
                state.status.asset_error = None;
            }
            Err(e) => {
                warn!(error = %e, "Failed to fetch currencies, using fallback list");
                state.assets = fallback_assets();
                state.status.degraded = true;
                state.status.asset_error = Some(e.to_string());
            }
        }
        state.assets.clone()
    }

    /// Resolves "target per base" multipliers for every known target.
    ///
    /// Targets without a usable price are omitted. On failure the previous
    /// table is kept, and a response older than one already applied is
    /// discarded.
    #[instrument(name = "ResolveRates", skip(self, target_ids), fields(base = %base_id))]
    pub async fn resolve_rates(&self, base_id: &str, target_ids: &[String]) -> RateTable {
        let seq = self.request_seq.fetch_add(1, Ordering::SeqCst) + 1;
        if target_ids.is_empty() {
            return self.commit(seq, Ok(RateTable::new()), false);
        }

        let query = RateQuery::new(&self.state().assets, base_id, target_ids);
        let outcome = match query {
            Ok(query) if query.is_empty() => Ok(RateTable::new()),
            Ok(query) => self.fetch_rates(&query).await,
            Err(e) => Err(e),
        };
        self.commit(seq, outcome, true)
    }

    async fn fetch_rates(&self, query: &RateQuery) -> Result<RateTable> {
        match query.base.kind {
            AssetKind::Crypto => self.fetch_crypto_base(query).await,
            AssetKind::Fiat => self.fetch_fiat_base(query).await,
        }
    }

    async fn fetch_crypto_base(&self, query: &RateQuery) -> Result<RateTable> {
        let base = &query.base.id;
        let mut ids = vec![base.clone()];
        query.crypto_targets.iter().for_each(|t| push_unique(&mut ids, t));
        let mut vs = query.fiat_targets.clone();
        if query.crypto_targets.iter().any(|t| t != base) {
            push_unique(&mut vs, REFERENCE_FIAT);
        }

        let matrix = if vs.is_empty() {
            PriceMatrix::new()
        } else {
            self.provider.prices(&ids, &vs).await?
        };
        let mut rates = RateTable::new();

        for fiat in &query.fiat_targets {
            if let Some(price) = positive_price(&matrix, base, fiat) {
                rates.insert(fiat.clone(), price);
            }
        }

        let base_ref = positive_price(&matrix, base, REFERENCE_FIAT);
        for crypto in &query.crypto_targets {
            if crypto == base {
                rates.insert(crypto.clone(), 1.0);
                continue;
            }
            if let (Some(base_price), Some(target_price)) =
                (base_ref, positive_price(&matrix, crypto, REFERENCE_FIAT))
            {
                rates.insert(crypto.clone(), base_price / target_price);
            }
        }

        Ok(rates)
    }

    async fn fetch_fiat_base(&self, query: &RateQuery) -> Result<RateTable> {
        let base = &query.base.id;
        let mut ids = query.crypto_targets.clone();
        if query.fiat_targets.iter().any(|t| t != base) {
            push_unique(&mut ids, REFERENCE_CRYPTO);
        }
        let mut vs = vec![base.clone()];
        query.fiat_targets.iter().for_each(|t| push_unique(&mut vs, t));

        let matrix = if ids.is_empty() {
            PriceMatrix::new()
        } else {
            self.provider.prices(&ids, &vs).await?
        };
        let mut rates = RateTable::new();

        for crypto in &query.crypto_targets {
            if let Some(price) = positive_price(&matrix, crypto, base) {
                rates.insert(crypto.clone(), 1.0 / price);
            }
        }

        let base_ref = positive_price(&matrix, REFERENCE_CRYPTO, base);
        for fiat in &query.fiat_targets {
            if fiat == base {
                rates.insert(fiat.clone(), 1.0);
                continue;
            }
            if let (Some(base_price), Some(target_price)) =
                (base_ref, positive_price(&matrix, REFERENCE_CRYPTO, fiat))
            {
                rates.insert(fiat.clone(), target_price / base_price);
            }
        }

        Ok(rates)
    }

    fn commit(&self, seq: u64, outcome: Result<RateTable>, refreshed: bool) -> RateTable {
        let mut state = self.state();
        if seq < state.applied_seq {
            debug!(
                seq,
                applied = state.applied_seq,
                "Discarding stale rate response"
            );
            return state.rates.clone();
        }
        state.applied_seq = seq;

        match outcome {
            Ok(rates) => {
                debug!("Resolved {} rates", rates.len());
                state.rates = rates;
                if refreshed {
                    state.status.last_updated = Some(Utc::now());
                    state.status.rate_error = None;
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to fetch exchange rates");
                if state.rates.is_empty() {
                    state.status.rate_error = Some(e.to_string());
                }
            }
        }
        state.rates.clone()
    }
}
