use clap::{Parser, Subcommand};
use whale_watch_core::AssetClass;

mod commands;

use commands::ScanArgs;

#[derive(Parser)]
#[command(name = "whale-watch")]
#[command(about = "Detect and classify whale trades in US equities and listed options", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan equity prints for block trades and sweeps
    Stocks(ScanArgs),
    /// Scan option prints for large premium trades and sweeps
    Options(ScanArgs),
}

impl Commands {
    fn asset(&self) -> AssetClass {
        match self {
            Self::Stocks(_) => AssetClass::Equity,
            Self::Options(_) => AssetClass::Option,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let asset = cli.command.asset();
    match cli.command {
        Commands::Stocks(args) | Commands::Options(args) => {
            commands::run_scan(args, asset).await?;
        }
    }

    Ok(())
}
