//! Whale scan command.
//!
//! Loads configuration, resolves the universe, runs one scan cycle against the
//! Alpaca market data API and writes the summary and trades documents.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Args;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use whale_watch_alpaca::{AlpacaClient, AlpacaClientConfig};
use whale_watch_core::universe::{
    parse_ticker_list, spx_universe, EQUITY_TEST_TICKERS, OPTIONS_TEST_TICKERS,
};
use whale_watch_core::{
    AppConfig, AssetClass, ClassifiedTrade, ConfigLoader, Instrument, RateLimiter, SectorMap,
};
use whale_watch_detector::{write_reports, RunReport, UniverseScanner, WhaleEngine};

/// Whale trades listed on the console after a run.
const CONSOLE_TOP_TRADES: usize = 5;
const CONSOLE_TOP_SECTORS: usize = 5;

/// Arguments shared by the `stocks` and `options` commands.
#[derive(Args, Debug, Clone)]
pub struct ScanArgs {
    /// Scan the fixed five-ticker sample instead of the full universe
    #[arg(long)]
    pub test: bool,

    /// Comma-separated tickers to scan (overrides --test)
    #[arg(long)]
    pub tickers: Option<String>,

    /// Directory for the JSON outputs (defaults to output.dir from config)
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Config file path
    #[arg(short, long, env = "WHALE_WATCH_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Tickers to scan: `--tickers`, then `--test`, then the bundled S&P 500 list.
///
/// # Errors
/// Returns an error for an invalid ticker list or an empty universe.
pub fn resolve_universe(args: &ScanArgs, asset: AssetClass) -> Result<Vec<String>> {
    let universe = if let Some(list) = &args.tickers {
        parse_ticker_list(list).context("invalid --tickers")?
    } else if args.test {
        let sample = match asset {
            AssetClass::Equity => EQUITY_TEST_TICKERS,
            AssetClass::Option => OPTIONS_TEST_TICKERS,
        };
        sample.iter().map(|t| (*t).to_string()).collect()
    } else {
        spx_universe()
    };

    if universe.is_empty() {
        bail!("universe is empty");
    }
    Ok(universe)
}

fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    match path {
        Some(path) => ConfigLoader::load_from(path),
        None => ConfigLoader::load(),
    }
}

/// Runs the `stocks` or `options` command.
///
/// Per-security failures are reported in the outputs and do not fail the run.
///
/// # Errors
/// Returns an error for invalid configuration, missing credentials, an empty
/// universe or a failed output write.
pub async fn run_scan(args: ScanArgs, asset: AssetClass) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let universe = resolve_universe(&args, asset)?;
    let output_dir = args
        .output_dir
        .clone()
        .unwrap_or_else(|| config.output.dir.clone());

    let client = AlpacaClient::from_env(AlpacaClientConfig::from(&config.provider))
        .context("failed to create Alpaca client")?;
    let sectors = SectorMap::bundled()
        .context("failed to load bundled sector table")?
        .with_overrides(&config.sectors);

    info!(
        asset = %asset,
        securities = universe.len(),
        source = client.base_url(),
        "starting whale scan"
    );

    let limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
    let scanner = UniverseScanner::new(
        Arc::new(client),
        limiter,
        config.retry.clone(),
        config.provider.clone(),
    )
    .with_concurrency(config.scan.concurrency);
    let engine = WhaleEngine::new(&config, asset, scanner, sectors);

    let run = engine.run(&universe, Utc::now()).await?;
    info!(stats = %run.stats.summary(), "scan finished");

    let big_whale_floor = engine.analyzer().detection().large_floor;
    let paths = write_reports(&run, &output_dir, big_whale_floor, config.output.pretty)
        .context("failed to write reports")?;

    print_summary(&run);
    println!("Summary: {}", paths.summary.display());
    println!("Trades:  {}", paths.trades.display());
    Ok(())
}

fn instrument_label(trade: &ClassifiedTrade) -> &str {
    match &trade.sweep.instrument {
        Instrument::Equity => &trade.sweep.symbol,
        Instrument::Option { contract, .. } => &contract.occ_symbol,
    }
}

fn print_summary(run: &RunReport) {
    let overall = run.sentiment.overall();
    println!();
    println!("=== {} whale scan ===", run.asset);
    println!("{}", run.stats.summary());
    println!(
        "Whales: {} | score {:+.3} ({:?}) | bullish ${} / bearish ${}",
        overall.trade_count,
        overall.score(),
        overall.direction(),
        overall.bullish_notional.round_dp(0),
        overall.bearish_notional.round_dp(0)
    );

    let sectors = run.sentiment.top_sectors(CONSOLE_TOP_SECTORS);
    if !sectors.is_empty() {
        println!("Top sectors: {}", sectors.join(", "));
    }

    for trade in run.whales().into_iter().take(CONSOLE_TOP_TRADES) {
        println!(
            "  {:<22} {:>16} {:?} {:?} {} prints @ {}",
            instrument_label(trade),
            format!("${}", trade.notional().round_dp(0)),
            trade.tier,
            trade.direction,
            trade.sweep.print_count,
            trade.sweep.start_time.format("%Y-%m-%d %H:%M:%S")
        );
    }
    println!();
}
