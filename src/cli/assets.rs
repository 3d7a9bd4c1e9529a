use super::ui;
use crate::core::asset::{Asset, AssetKind, assets_of_kind, popular_assets};
use crate::core::{PricingProvider, RateService};
use anyhow::Result;
use comfy_table::Cell;

/// Lists the asset universe, optionally narrowed to one kind or to the
/// popular picks.
pub async fn run<P: PricingProvider>(
    rates: &RateService<P>,
    kind: Option<AssetKind>,
    popular: bool,
) -> Result<()> {
    let pb = ui::new_spinner("Fetching currencies...");
    let assets = rates.list_assets().await;
    pb.finish_and_clear();

    let assets = filter_assets(&assets, kind, popular);
    println!("{}", display_assets(&assets));

    let status = rates.status();
    if status.degraded {
        let reason = status.asset_error.as_deref().unwrap_or("unknown error");
        println!(
            "{}",
            ui::style_text(
                &format!("Using offline currency list ({reason})"),
                ui::StyleType::Error
            )
        );
    }
    Ok(())
}

fn filter_assets(assets: &[Asset], kind: Option<AssetKind>, popular: bool) -> Vec<Asset> {
    let assets = if popular {
        popular_assets(assets)
    } else {
        assets.to_vec()
    };
    match kind {
        Some(kind) => assets_of_kind(&assets, kind),
        None => assets,
    }
}

pub fn display_assets(assets: &[Asset]) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Id"),
        ui::header_cell("Symbol"),
        ui::header_cell("Name"),
        ui::header_cell("Kind"),
    ]);
    for asset in assets {
        table.add_row(vec![
            Cell::new(&asset.id),
            Cell::new(asset.symbol.to_uppercase()),
            Cell::new(&asset.name),
            Cell::new(asset.kind.to_string()),
        ]);
    }

    format!(
        "{}\n\n{} {}",
        table,
        ui::style_text("Total:", ui::StyleType::TotalLabel),
        assets.len()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::asset::fallback_assets;

    #[test]
    fn test_filter_assets() {
        let assets = fallback_assets();

        let crypto = filter_assets(&assets, Some(AssetKind::Crypto), false);
        assert_eq!(crypto.len(), 10);
        assert!(crypto.iter().all(Asset::is_crypto));

        let popular_fiat = filter_assets(&assets, Some(AssetKind::Fiat), true);
        let ids: Vec<&str> = popular_fiat.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["usd", "eur", "gbp"]);

        assert_eq!(filter_assets(&assets, None, false).len(), assets.len());
    }

    #[test]
    fn test_display_assets() {
        let output = display_assets(&[
            Asset::fiat("eur"),
            Asset::crypto("bitcoin", "btc", "Bitcoin"),
        ]);
        assert!(output.contains("bitcoin"));
        assert!(output.contains("BTC"));
        assert!(output.contains("crypto"));
        assert!(output.contains("Total:"));
    }
}
