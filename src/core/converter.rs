//! Conversion state and the intents that mutate it

use super::asset::{Asset, find_asset};
use super::preferences::{Preference, PreferenceStore};
use super::pricing::PricingProvider;
use super::rates::{RateService, RateStatus, RateTable};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

pub const MAX_TARGETS: usize = 10;

pub const SOURCE_CURRENCY_KEY: &str = "source_currency";
pub const SOURCE_AMOUNT_KEY: &str = "source_amount";
pub const TARGET_CURRENCIES_KEY: &str = "target_currencies";

/// Values used when nothing has been stored yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterDefaults {
    pub source_currency: String,
    pub amount: f64,
    pub targets: Vec<String>,
}

impl Default for ConverterDefaults {
    fn default() -> Self {
        Self {
            source_currency: "usd".to_string(),
            amount: 100.0,
            targets: vec!["eur".to_string(), "gbp".to_string(), "bitcoin".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TargetSelection {
    pub selection_id: String,
    pub asset: Asset,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConversionState {
    pub base_asset_id: String,
    pub base_amount: f64,
    pub targets: Vec<TargetSelection>,
}

impl ConversionState {
    pub fn target_ids(&self) -> Vec<String> {
        self.targets.iter().map(|t| t.asset.id.clone()).collect()
    }

    fn position_of_asset(&self, asset_id: &str) -> Option<usize> {
        self.targets.iter().position(|t| t.asset.id == asset_id)
    }

    fn position_of_slot(&self, selection_id: &str) -> Option<usize> {
        self.targets
            .iter()
            .position(|t| t.selection_id == selection_id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Conversion {
    pub asset: Asset,
    pub rate: f64,
    pub amount: f64,
}

pub fn convert(amount: f64, rate: f64) -> f64 {
    amount * rate
}

/// Converted amount per target. Empty when the amount is not positive or
/// the base is not part of `universe`.
pub fn compute_conversions(
    state: &ConversionState,
    universe: &[Asset],
    rates: &RateTable,
) -> Vec<Conversion> {
    if state.base_amount <= 0.0 || find_asset(universe, &state.base_asset_id).is_none() {
        return Vec::new();
    }

    state
        .targets
        .iter()
        .map(|target| {
            let rate = rates.get(&target.asset.id).copied().unwrap_or(0.0);
            Conversion {
                asset: target.asset.clone(),
                rate,
                amount: convert(state.base_amount, rate),
            }
        })
        .collect()
}

/// A user edit of the conversion state.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    SetBaseAmount(f64),
    SetBaseCurrency(String),
    AddTarget(Asset),
    RemoveTarget(String),
    SwapBaseWithTarget(String),
}

impl Intent {
    /// Whether the rate table must be re-resolved after this intent.
    pub fn affects_rates(&self) -> bool {
        !matches!(self, Intent::SetBaseAmount(_))
    }
}

/// Owns the [`ConversionState`], keeps it persisted and publishes derived
/// conversions after every change.
///
/// Call [`Converter::init`] once before issuing intents so stored targets
/// can be restored against the asset universe.
pub struct Converter<P: PricingProvider> {
    rates: Arc<RateService<P>>,
    source_currency: Preference<String>,
    source_amount: Preference<f64>,
    target_ids: Preference<Vec<String>>,
    state: ConversionState,
    assets: Vec<Asset>,
    rate_table: RateTable,
    unresolved_targets: Vec<String>,
    next_slot: u64,
    conversions: watch::Sender<Vec<Conversion>>,
}

impl<P: PricingProvider> Converter<P> {
    pub fn new(
        rates: Arc<RateService<P>>,
        store: &Arc<PreferenceStore>,
        defaults: &ConverterDefaults,
    ) -> Self {
        let source_currency =
            Preference::load(store, SOURCE_CURRENCY_KEY, defaults.source_currency.clone());
        let source_amount = Preference::load(store, SOURCE_AMOUNT_KEY, defaults.amount);
        let target_ids = Preference::load(store, TARGET_CURRENCIES_KEY, defaults.targets.clone());

        let state = ConversionState {
            base_asset_id: source_currency.get().clone(),
            base_amount: source_amount.get().max(0.0),
            targets: Vec::new(),
        };
        let (conversions, _) = watch::channel(Vec::new());

        Self {
            rates,
            source_currency,
            source_amount,
            target_ids,
            state,
            assets: Vec::new(),
            rate_table: RateTable::new(),
            unresolved_targets: Vec::new(),
            next_slot: 0,
            conversions,
        }
    }

    /// Loads the asset universe, restores stored targets and resolves rates.
    pub async fn init(&mut self) {
        self.restore().await;
        self.refresh_rates().await;
    }

    /// Loads the asset universe and restores stored targets without
    /// resolving rates.
    ///
    /// Against the offline universe, stored ids it does not know are kept in
    /// storage so they come back once the provider is reachable.
    pub async fn restore(&mut self) {
        self.assets = self.rates.list_assets().await;
        let degraded = self.rates.status().degraded;

        let mut targets: Vec<TargetSelection> = Vec::new();
        let mut unresolved = Vec::new();
        for id in self.target_ids.get().clone() {
            if targets.len() >= MAX_TARGETS {
                break;
            }
            if id == self.state.base_asset_id || targets.iter().any(|t| t.asset.id == id) {
                continue;
            }
            match find_asset(&self.assets, &id).cloned() {
                Some(asset) => targets.push(TargetSelection {
                    selection_id: self.next_slot_id(&asset.id),
                    asset,
                }),
                None if degraded => {
                    debug!("Keeping stored target missing from offline list: {}", id);
                    unresolved.push(id);
                }
                None => debug!("Dropping stored target not in universe: {}", id),
            }
        }
        self.state.targets = targets;
        self.unresolved_targets = unresolved;

        self.persist();
    }

    pub async fn refresh_rates(&mut self) {
        let target_ids = self.state.target_ids();
        self.rate_table = self
            .rates
            .resolve_rates(&self.state.base_asset_id, &target_ids)
            .await;
        self.recompute();
    }

    /// Applies `intent` and re-resolves rates when it was accepted and the
    /// rates depend on it.
    pub async fn dispatch(&mut self, intent: Intent) -> bool {
        let refresh = intent.affects_rates();
        let accepted = match intent {
            Intent::SetBaseAmount(amount) => self.set_base_amount(amount),
            Intent::SetBaseCurrency(id) => self.set_base_currency(&id),
            Intent::AddTarget(asset) => self.add_target(asset),
            Intent::RemoveTarget(selection_id) => self.remove_target(&selection_id),
            Intent::SwapBaseWithTarget(selection_id) => self.swap_base_with_target(&selection_id),
        };
        if accepted && refresh {
            self.refresh_rates().await;
        }
        accepted
    }

    pub fn set_base_amount(&mut self, amount: f64) -> bool {
        // Non-finite input clamps to zero as well.
        self.state.base_amount = if amount.is_finite() {
            amount.max(0.0)
        } else {
            0.0
        };
        self.settle();
        true
    }

    pub fn set_base_currency(&mut self, id: &str) -> bool {
        if !self.assets.is_empty() && find_asset(&self.assets, id).is_none() {
            debug!("Rejecting unknown base currency: {}", id);
            return false;
        }
        if let Some(index) = self.state.position_of_asset(id) {
            self.state.targets.remove(index);
        }
        self.state.base_asset_id = id.to_string();
        self.settle();
        true
    }

    pub fn add_target(&mut self, asset: Asset) -> bool {
        if !self.can_add_more_targets() {
            debug!("Target limit of {} reached", MAX_TARGETS);
            return false;
        }
        if self.state.position_of_asset(&asset.id).is_some()
            || asset.id == self.state.base_asset_id
        {
            debug!("Rejecting duplicate target: {}", asset.id);
            return false;
        }
        if !self.assets.is_empty() && find_asset(&self.assets, &asset.id).is_none() {
            debug!("Rejecting unknown target: {}", asset.id);
            return false;
        }

        let selection_id = self.next_slot_id(&asset.id);
        self.state.targets.push(TargetSelection {
            selection_id,
            asset,
        });
        self.settle();
        true
    }

    pub fn remove_target(&mut self, selection_id: &str) -> bool {
        let Some(index) = self.state.position_of_slot(selection_id) else {
            return false;
        };
        self.state.targets.remove(index);
        self.settle();
        true
    }

    /// Exchanges the base with the target in `selection_id`. The slot keeps
    /// its position and receives a new id.
    pub fn swap_base_with_target(&mut self, selection_id: &str) -> bool {
        let Some(index) = self.state.position_of_slot(selection_id) else {
            return false;
        };
        let Some(old_base) = self.base_asset().cloned() else {
            return false;
        };

        let selection_id = self.next_slot_id(&old_base.id);
        let previous = std::mem::replace(
            &mut self.state.targets[index],
            TargetSelection {
                selection_id,
                asset: old_base,
            },
        );
        self.state.base_asset_id = previous.asset.id;
        self.settle();
        true
    }

    pub fn state(&self) -> &ConversionState {
        &self.state
    }

    pub fn assets(&self) -> &[Asset] {
        &self.assets
    }

    pub fn base_asset(&self) -> Option<&Asset> {
        find_asset(&self.assets, &self.state.base_asset_id)
    }

    pub fn rates(&self) -> &RateTable {
        &self.rate_table
    }

    pub fn status(&self) -> RateStatus {
        self.rates.status()
    }

    pub fn can_add_more_targets(&self) -> bool {
        self.state.targets.len() < MAX_TARGETS
    }

    pub fn slot_for_asset(&self, asset_id: &str) -> Option<&str> {
        self.state
            .targets
            .iter()
            .find(|t| t.asset.id == asset_id)
            .map(|t| t.selection_id.as_str())
    }

    pub fn conversions(&self) -> Vec<Conversion> {
        self.conversions.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<Conversion>> {
        self.conversions.subscribe()
    }

    fn next_slot_id(&mut self, asset_id: &str) -> String {
        self.next_slot += 1;
        format!("target-{}-{}", asset_id, self.next_slot)
    }

    fn settle(&mut self) {
        self.persist();
        self.recompute();
    }

    fn persist(&mut self) {
        self.source_currency.set(self.state.base_asset_id.clone());
        self.source_amount.set(self.state.base_amount);
        self.target_ids.set(self.stored_target_ids());
    }

    fn stored_target_ids(&self) -> Vec<String> {
        let mut ids = self.state.target_ids();
        for id in &self.unresolved_targets {
            if ids.len() >= MAX_TARGETS {
                break;
            }
            if !ids.contains(id) && *id != self.state.base_asset_id {
                ids.push(id.clone());
            }
        }
        ids
    }

    fn recompute(&self) {
        let conversions = compute_conversions(&self.state, &self.assets, &self.rate_table);
        self.conversions.send_replace(conversions);
    }
}
