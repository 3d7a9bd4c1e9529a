//! Core business logic abstractions

pub mod asset;
pub mod config;
pub mod converter;
pub mod log;
pub mod preferences;
pub mod pricing;
pub mod rates;

// Re-export main types for cleaner imports
pub use asset::{Asset, AssetKind};
pub use converter::{Conversion, ConversionState, Converter, Intent, TargetSelection};
pub use preferences::{Preference, PreferenceStore};
pub use pricing::{CryptoListing, PriceMatrix, PricingProvider};
pub use rates::{RateService, RateStatus, RateTable};
