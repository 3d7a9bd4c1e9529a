use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use xconv::core::asset::AssetKind;
use xconv::core::log::init_logging;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Increase logging verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

impl From<Commands> for xconv::AppCommand {
    fn from(cmd: Commands) -> xconv::AppCommand {
        match cmd {
            Commands::Show => xconv::AppCommand::Show,
            Commands::Amount { value } => xconv::AppCommand::Amount(value),
            Commands::Base { currency } => xconv::AppCommand::Base(currency),
            Commands::Add { currency } => xconv::AppCommand::Add(currency),
            Commands::Remove { currency } => xconv::AppCommand::Remove(currency),
            Commands::Swap { currency } => xconv::AppCommand::Swap(currency),
            Commands::Assets { kind, popular } => xconv::AppCommand::Assets { kind, popular },
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Write the example configuration
    Setup,
    /// Display conversions for the stored selection
    Show,
    /// Set the amount to convert
    Amount {
        #[arg(allow_negative_numbers = true)]
        value: f64,
    },
    /// Set the source currency
    Base { currency: String },
    /// Add a target currency
    Add { currency: String },
    /// Remove a target currency
    Remove { currency: String },
    /// Swap the source currency with a target currency
    Swap { currency: String },
    /// List supported currencies
    Assets {
        /// Only list `fiat` or `crypto` assets
        #[arg(short, long)]
        kind: Option<AssetKind>,

        /// Only list popular assets
        #[arg(short, long)]
        popular: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => {
            xconv::cli::setup::setup(cli.config_path.as_deref()).map(|_| ())
        }
        Some(cmd) => xconv::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
