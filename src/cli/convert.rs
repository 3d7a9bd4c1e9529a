use super::ui;
use crate::AppCommand;
use crate::core::asset::lookup_asset;
use crate::core::converter::MAX_TARGETS;
use crate::core::{Converter, Intent, PricingProvider, RateStatus};
use anyhow::{Result, anyhow, bail};
use comfy_table::Cell;

/// Applies the edit carried by `command` (if any) and prints the resulting
/// conversions.
pub async fn run<P: PricingProvider>(
    converter: &mut Converter<P>,
    command: &AppCommand,
) -> Result<()> {
    let pb = ui::new_spinner("Fetching exchange rates...");
    converter.restore().await;

    // Rates are resolved once: by the intent when it affects them, here
    // otherwise.
    let outcome = match to_intent(converter, command) {
        Ok(Some(intent)) => {
            let refreshed = intent.affects_rates();
            let rejection = rejection_message(converter, &intent);
            if converter.dispatch(intent).await {
                if !refreshed {
                    converter.refresh_rates().await;
                }
                Ok(())
            } else {
                Err(anyhow!(rejection))
            }
        }
        Ok(None) => {
            converter.refresh_rates().await;
            Ok(())
        }
        Err(e) => Err(e),
    };
    pb.finish_and_clear();

    if let Err(e) = outcome {
        println!("{}", ui::style_text(&e.to_string(), ui::StyleType::Error));
        return Err(e);
    }

    println!("{}", display_conversions(converter));
    Ok(())
}

fn to_intent<P: PricingProvider>(
    converter: &Converter<P>,
    command: &AppCommand,
) -> Result<Option<Intent>> {
    let resolve_id = |key: &str| {
        let key = key.to_lowercase();
        lookup_asset(converter.assets(), &key).map_or(key, |asset| asset.id.clone())
    };
    let slot_of = |key: &str| {
        let id = resolve_id(key);
        converter
            .slot_for_asset(&id)
            .map(str::to_string)
            .ok_or_else(|| anyhow!("{} is not one of the target currencies", id))
    };

    let intent = match command {
        AppCommand::Show | AppCommand::Assets { .. } => return Ok(None),
        AppCommand::Amount(amount) => Intent::SetBaseAmount(*amount),
        AppCommand::Base(key) => Intent::SetBaseCurrency(resolve_id(key)),
        AppCommand::Add(key) => {
            let id = resolve_id(key);
            match lookup_asset(converter.assets(), &id) {
                Some(asset) => Intent::AddTarget(asset.clone()),
                None => bail!("Unknown currency: {}", id),
            }
        }
        AppCommand::Remove(key) => Intent::RemoveTarget(slot_of(key)?),
        AppCommand::Swap(key) => Intent::SwapBaseWithTarget(slot_of(key)?),
    };
    Ok(Some(intent))
}

fn rejection_message<P: PricingProvider>(converter: &Converter<P>, intent: &Intent) -> String {
    match intent {
        Intent::AddTarget(_) if !converter.can_add_more_targets() => {
            format!("Cannot add more than {MAX_TARGETS} target currencies")
        }
        Intent::AddTarget(asset) if asset.id == converter.state().base_asset_id => {
            format!("{} is already the source currency", asset.id)
        }
        Intent::AddTarget(asset) => format!("{} is already a target currency", asset.id),
        Intent::SetBaseCurrency(id) => format!("Unknown currency: {id}"),
        Intent::SwapBaseWithTarget(_) => {
            format!("Unknown source currency: {}", converter.state().base_asset_id)
        }
        _ => "Could not apply change".to_string(),
    }
}

fn status_lines(status: &RateStatus) -> Vec<String> {
    let mut lines = Vec::new();
    if status.degraded {
        let reason = status.asset_error.as_deref().unwrap_or("unknown error");
        lines.push(ui::style_text(
            &format!("Using offline currency list ({reason})"),
            ui::StyleType::Error,
        ));
    }
    if let Some(e) = &status.rate_error {
        lines.push(ui::style_text(
            &format!("Exchange rates unavailable: {e}"),
            ui::StyleType::Error,
        ));
    }
    match status.last_updated {
        Some(ts) => lines.push(ui::style_text(
            &format!("Last updated: {}", ts.format("%Y-%m-%d %H:%M:%S UTC")),
            ui::StyleType::Subtle,
        )),
        None => lines.push(ui::style_text("Rates not updated", ui::StyleType::Subtle)),
    }
    lines
}

pub fn display_conversions<P: PricingProvider>(converter: &Converter<P>) -> String {
    let state = converter.state();
    let status = converter.status();

    let source = match converter.base_asset() {
        Some(asset) => format!("{} ({})", ui::format_amount(state.base_amount, asset), asset.name),
        None => format!("{} {}", state.base_amount, state.base_asset_id.to_uppercase()),
    };
    let mut output = format!(
        "Converting {}\n\n",
        ui::style_text(&source, ui::StyleType::Title)
    );

    let conversions = converter.conversions();
    if state.targets.is_empty() {
        output.push_str("No target currencies selected. Add one with `xconv add <currency>`.");
    } else if conversions.is_empty() {
        output.push_str("Enter a positive amount to see conversions.");
    } else {
        let mut table = ui::new_styled_table();
        table.set_header(vec![
            ui::header_cell("Currency"),
            ui::header_cell("Name"),
            ui::header_cell(&format!("Rate (per 1 {})", state.base_asset_id.to_uppercase())),
            ui::header_cell("Amount"),
        ]);

        let has_error = status.rate_error.is_some();
        for conversion in &conversions {
            let priced = conversion.rate > 0.0;
            table.add_row(vec![
                Cell::new(conversion.asset.symbol.to_uppercase()),
                Cell::new(&conversion.asset.name),
                if priced {
                    ui::number_cell(ui::format_rate(conversion.rate))
                } else {
                    ui::na_cell(has_error)
                },
                if priced {
                    ui::amount_cell(ui::format_amount(conversion.amount, &conversion.asset))
                } else {
                    ui::na_cell(has_error)
                },
            ]);
        }
        output.push_str(&table.to_string());
    }

    output.push_str(&format!(
        "\n\n{} {}/{}",
        ui::style_text("Targets:", ui::StyleType::TotalLabel),
        state.targets.len(),
        MAX_TARGETS
    ));
    for line in status_lines(&status) {
        output.push('\n');
        output.push_str(&line);
    }
    output
}
