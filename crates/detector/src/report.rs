//! JSON output documents: the run summary and the per-security trade listing.
//!
//! Both documents carry the same metadata block. File names are
//! `{prefix}_whale_summary.json` and `{prefix}_whale_trades.json` where the
//! prefix is `stock` or `options`.

use crate::normalizer::DropCounts;
use crate::pipeline::{Phase, RunReport, SecurityStatus};
use crate::scanner::ScanStatsSnapshot;
use crate::sentiment::{SentimentScore, TierCounts};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;
use whale_watch_core::{
    AssetClass, ClassifiedTrade, Direction, DteBucket, ThresholdSet, Tier, TimeWindow,
};

/// Entries kept in the top bullish / bearish lists.
pub const TOP_SECURITIES: usize = 10;

/// Entries kept in the top sectors list.
pub const TOP_SECTORS: usize = 5;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

// =============================================================================
// Shared views
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct StatusCounts {
    pub ok: usize,
    pub no_data: usize,
    pub insufficient_data: usize,
    pub failed: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Metadata {
    pub asset_class: AssetClass,
    pub source: String,
    pub generated_at: DateTime<Utc>,
    pub as_of: DateTime<Utc>,
    pub window: TimeWindow,
    pub duration_secs: f64,
    pub universe_size: usize,
    pub status_counts: StatusCounts,
    pub scan: ScanStatsSnapshot,
    pub dropped_records: DropCounts,
    pub phases: Vec<Phase>,
}

impl Metadata {
    fn from_run(run: &RunReport) -> Self {
        let duration = run.finished_at - run.started_at;
        Self {
            asset_class: run.asset,
            source: run.source.clone(),
            generated_at: run.finished_at,
            as_of: run.as_of,
            window: run.window,
            duration_secs: duration.num_milliseconds() as f64 / 1000.0,
            universe_size: run.universe_size,
            status_counts: StatusCounts {
                ok: run.count_status(SecurityStatus::Ok),
                no_data: run.count_status(SecurityStatus::NoData),
                insufficient_data: run.count_status(SecurityStatus::InsufficientData),
                failed: run.count_status(SecurityStatus::Failed),
                skipped: run.count_status(SecurityStatus::Skipped),
            },
            scan: run.stats,
            dropped_records: run.dropped,
            phases: run.phases.clone(),
        }
    }
}

/// Sentiment with the derived score and direction spelled out.
#[derive(Debug, Clone, Serialize)]
pub struct SentimentView {
    pub direction: Direction,
    pub score: f64,
    pub whale_count: usize,
    pub total_notional: Decimal,
    pub bullish_notional: Decimal,
    pub bearish_notional: Decimal,
    pub neutral_notional: Decimal,
    pub bullish_count: usize,
    pub bearish_count: usize,
    pub neutral_count: usize,
    pub tiers: TierCounts,
}

impl From<&SentimentScore> for SentimentView {
    fn from(score: &SentimentScore) -> Self {
        Self {
            direction: score.direction(),
            score: score.score(),
            whale_count: score.trade_count,
            total_notional: score.total_notional(),
            bullish_notional: score.bullish_notional,
            bearish_notional: score.bearish_notional,
            neutral_notional: score.neutral_notional,
            bullish_count: score.bullish_count,
            bearish_count: score.bearish_count,
            neutral_count: score.neutral_count,
            tiers: score.tiers,
        }
    }
}

/// Count and notional for one bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Bucket {
    pub count: usize,
    pub notional: Decimal,
}

impl Bucket {
    fn add(&mut self, notional: Decimal) {
        self.count += 1;
        self.notional += notional;
    }
}

// =============================================================================
// Summary document
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct BigWhaleSentiment {
    pub min_notional: Decimal,
    #[serde(flatten)]
    pub sentiment: SentimentView,
}

#[derive(Debug, Clone, Serialize)]
pub struct DarkPoolSplit {
    pub dark_pool: SentimentView,
    pub lit: SentimentView,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepsSummary {
    pub total_count: usize,
    pub total_notional: Decimal,
    pub bullish_count: usize,
    pub bullish_notional: Decimal,
    pub bearish_count: usize,
    pub bearish_notional: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct SectorView {
    #[serde(flatten)]
    pub sentiment: SentimentView,
    pub security_count: usize,
    pub securities_with_whales: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SecuritySummary {
    pub status: SecurityStatus,
    pub sector: Option<String>,
    #[serde(flatten)]
    pub sentiment: SentimentView,
}

/// One security in the top bullish / bearish lists, represented by its largest trade.
#[derive(Debug, Clone, Serialize)]
pub struct TopSecurity {
    pub symbol: String,
    pub sector: Option<String>,
    pub notional: Decimal,
    pub tier: Tier,
    pub timestamp: DateTime<Utc>,
    pub flags: Vec<String>,
    pub trade_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryDocument {
    pub metadata: Metadata,
    pub overall_sentiment: SentimentView,
    pub big_whale_sentiment: BigWhaleSentiment,
    pub tier_breakdown: BTreeMap<Tier, Bucket>,
    pub venue_breakdown: BTreeMap<String, Bucket>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dark_pool_vs_lit: Option<DarkPoolSplit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration_breakdown: Option<BTreeMap<DteBucket, Bucket>>,
    pub sweeps_summary: SweepsSummary,
    pub sector_sentiment: BTreeMap<String, SectorView>,
    pub top_sectors: Vec<String>,
    pub top_bullish: Vec<TopSecurity>,
    pub top_bearish: Vec<TopSecurity>,
    pub securities: BTreeMap<String, SecuritySummary>,
}

fn flag_labels(trade: &ClassifiedTrade) -> Vec<String> {
    trade
        .flags
        .iter()
        .filter_map(|f| serde_json::to_value(f).ok())
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect()
}

/// One entry per security, represented by its largest trade in `direction`.
fn top_securities(run: &RunReport, direction: Direction) -> Vec<TopSecurity> {
    let mut entries: Vec<TopSecurity> = run
        .securities
        .values()
        .filter_map(|security| {
            let matching: Vec<&ClassifiedTrade> = security
                .whales
                .iter()
                .filter(|t| t.direction == direction)
                .collect();
            let largest = matching.iter().max_by_key(|t| t.notional())?;
            Some(TopSecurity {
                symbol: security.symbol.clone(),
                sector: security.sector.clone(),
                notional: largest.notional(),
                tier: largest.tier,
                timestamp: largest.sweep.start_time,
                flags: flag_labels(largest),
                trade_count: matching.len(),
            })
        })
        .collect();
    entries.sort_by(|a, b| b.notional.cmp(&a.notional).then_with(|| a.symbol.cmp(&b.symbol)));
    entries.truncate(TOP_SECURITIES);
    entries
}

/// Builds the summary document. `big_whale_floor` selects the trades for
/// the big-whale sentiment block.
#[must_use]
pub fn build_summary(run: &RunReport, big_whale_floor: Decimal) -> SummaryDocument {
    let whales = run.whales();

    let big = SentimentScore::from_trades(
        whales
            .iter()
            .copied()
            .filter(|t| t.notional() >= big_whale_floor),
    );

    let mut tier_breakdown: BTreeMap<Tier, Bucket> =
        Tier::ALL.iter().map(|t| (*t, Bucket::default())).collect();
    let mut venue_breakdown: BTreeMap<String, Bucket> = BTreeMap::new();
    let mut expiration: BTreeMap<DteBucket, Bucket> = BTreeMap::new();
    let mut dark = SentimentScore::default();
    let mut lit = SentimentScore::default();
    let mut sweeps = SweepsSummary::default();

    for trade in &whales {
        tier_breakdown.entry(trade.tier).or_default().add(trade.notional());
        for event in &trade.sweep.events {
            venue_breakdown
                .entry(event.venue.clone())
                .or_default()
                .add(event.notional);
        }
        if let Some(bucket) = trade.dte_bucket {
            expiration.entry(bucket).or_default().add(trade.notional());
        }
        if trade.sweep.any_dark_pool() {
            dark.add(trade);
        } else {
            lit.add(trade);
        }
        if trade.sweep.is_sweep {
            sweeps.total_count += 1;
            sweeps.total_notional += trade.notional();
            match trade.direction {
                Direction::Bullish => {
                    sweeps.bullish_count += 1;
                    sweeps.bullish_notional += trade.notional();
                }
                Direction::Bearish => {
                    sweeps.bearish_count += 1;
                    sweeps.bearish_notional += trade.notional();
                }
                Direction::Neutral => {}
            }
        }
    }

    let is_equity = run.asset == AssetClass::Equity;
    let sector_sentiment = run
        .sentiment
        .sectors()
        .iter()
        .map(|(name, rollup)| {
            (
                name.clone(),
                SectorView {
                    sentiment: SentimentView::from(&rollup.sentiment),
                    security_count: rollup.security_count,
                    securities_with_whales: rollup.securities_with_whales,
                },
            )
        })
        .collect();

    let empty = SentimentScore::default();
    let securities = run
        .securities
        .values()
        .map(|security| {
            let score = run.sentiment.security(&security.symbol).unwrap_or(&empty);
            (
                security.symbol.clone(),
                SecuritySummary {
                    status: security.status,
                    sector: security.sector.clone(),
                    sentiment: SentimentView::from(score),
                },
            )
        })
        .collect();

    SummaryDocument {
        metadata: Metadata::from_run(run),
        overall_sentiment: SentimentView::from(run.sentiment.overall()),
        big_whale_sentiment: BigWhaleSentiment {
            min_notional: big_whale_floor,
            sentiment: SentimentView::from(&big),
        },
        tier_breakdown,
        venue_breakdown,
        dark_pool_vs_lit: is_equity.then(|| DarkPoolSplit {
            dark_pool: SentimentView::from(&dark),
            lit: SentimentView::from(&lit),
        }),
        expiration_breakdown: (!is_equity).then_some(expiration),
        sweeps_summary: sweeps,
        sector_sentiment,
        top_sectors: run
            .sentiment
            .top_sectors(TOP_SECTORS)
            .into_iter()
            .map(str::to_string)
            .collect(),
        top_bullish: top_securities(run, Direction::Bullish),
        top_bearish: top_securities(run, Direction::Bearish),
        securities,
    }
}

// =============================================================================
// Trades document
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct SecurityTrades {
    pub sector: Option<String>,
    pub status: SecurityStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub thresholds: Option<ThresholdSet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub underlying_price: Option<Decimal>,
    pub raw_trades: usize,
    pub events: usize,
    pub clusters: usize,
    pub sweeps: usize,
    pub below_threshold: usize,
    pub dropped: DropCounts,
    pub sentiment: SentimentView,
    pub trades: Vec<ClassifiedTrade>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TradesDocument {
    pub metadata: Metadata,
    pub securities: BTreeMap<String, SecurityTrades>,
}

/// Builds the per-security trade listing (every security, whales largest first).
#[must_use]
pub fn build_trades(run: &RunReport) -> TradesDocument {
    let securities = run
        .securities
        .values()
        .map(|security| {
            (
                security.symbol.clone(),
                SecurityTrades {
                    sector: security.sector.clone(),
                    status: security.status,
                    reason: security.reason.clone(),
                    thresholds: security.thresholds.clone(),
                    underlying_price: security.underlying_price,
                    raw_trades: security.raw_trades,
                    events: security.events,
                    clusters: security.clusters,
                    sweeps: security.sweeps,
                    below_threshold: security.below_threshold,
                    dropped: security.dropped,
                    sentiment: SentimentView::from(&SentimentScore::from_trades(&security.whales)),
                    trades: security.whales.clone(),
                },
            )
        })
        .collect();

    TradesDocument {
        metadata: Metadata::from_run(run),
        securities,
    }
}

// =============================================================================
// Writing
// =============================================================================

/// Paths of the two files written for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportPaths {
    pub summary: PathBuf,
    pub trades: PathBuf,
}

impl ReportPaths {
    #[must_use]
    pub fn for_asset(dir: &Path, asset: AssetClass) -> Self {
        let prefix = asset.file_prefix();
        Self {
            summary: dir.join(format!("{prefix}_whale_summary.json")),
            trades: dir.join(format!("{prefix}_whale_trades.json")),
        }
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T, pretty: bool) -> Result<(), ReportError> {
    let file = File::create(path).map_err(|source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut writer = BufWriter::new(file);
    let result = if pretty {
        serde_json::to_writer_pretty(&mut writer, value)
    } else {
        serde_json::to_writer(&mut writer, value)
    };
    result.map_err(|source| ReportError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    writer.flush().map_err(|source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Writes both documents into `dir`, creating it if needed.
pub fn write_reports(
    run: &RunReport,
    dir: &Path,
    big_whale_floor: Decimal,
    pretty: bool,
) -> Result<ReportPaths, ReportError> {
    fs::create_dir_all(dir).map_err(|source| ReportError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let paths = ReportPaths::for_asset(dir, run.asset);
    write_json(&paths.summary, &build_summary(run, big_whale_floor), pretty)?;
    write_json(&paths.trades, &build_trades(run), pretty)?;

    info!(
        summary = %paths.summary.display(),
        trades = %paths.trades.display(),
        "reports written"
    );
    Ok(paths)
}
