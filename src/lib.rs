pub mod cli;
pub mod core;
pub mod providers;
pub mod store;

use crate::core::asset::AssetKind;
use crate::core::config::AppConfig;
use crate::core::converter::Converter;
use crate::core::preferences::PreferenceStore;
use crate::core::rates::RateService;
use crate::providers::CoinGeckoProvider;
use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info};

pub enum AppCommand {
    Show,
    Amount(f64),
    Base(String),
    Add(String),
    Remove(String),
    Swap(String),
    Assets {
        kind: Option<AssetKind>,
        popular: bool,
    },
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("xconv starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let provider = CoinGeckoProvider::from_config(&config.providers.coingecko);
    let rates = Arc::new(RateService::with_crypto_count(provider, config.crypto_count));

    if let AppCommand::Assets { kind, popular } = command {
        return cli::assets::run(rates.as_ref(), kind, popular).await;
    }

    let backend = store::open_backend(&config.default_data_path()?);
    let preferences = Arc::new(PreferenceStore::new(backend));
    let mut converter = Converter::new(rates, &preferences, &config.defaults);

    let result = cli::convert::run(&mut converter, &command).await;
    preferences.flush();
    result
}
