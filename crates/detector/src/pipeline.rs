//! The scan cycle: fetch, normalize, threshold, cluster, classify, aggregate.
//!
//! Each run walks a [`ScanCycle`] through its phases in order. Phases only
//! move forward; asking to re-enter an earlier phase is a [`PhaseError`].
//!
//! # Example
//!
//! ```ignore
//! let engine = WhaleEngine::new(&config, AssetClass::Option, scanner, sectors);
//! let report = engine.run(&tickers, Utc::now()).await?;
//! ```

use crate::classifier::{Classification, TradeClassifier};
use crate::normalizer::{normalize_equity, normalize_options, DropCounts, Normalized, SideInference};
use crate::scanner::{lookback_window, ScanFailure, ScanStatsSnapshot, UniverseScanner};
use crate::sentiment::SentimentAggregator;
use crate::sweep::SweepDetector;
use crate::threshold::{threshold_set, ThresholdError};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info};
use whale_watch_core::{
    AppConfig, AssetClass, ClassifiedTrade, DetectionConfig, OptionFlagConfig, RawBatch,
    SectorMap, Sweep, ThresholdSet, TickerSizeConfig, TimeWindow, TradeEvent,
};

// =============================================================================
// Phase state machine
// =============================================================================

/// Phases of one scan cycle, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Scanning,
    Normalizing,
    Thresholding,
    Clustering,
    Classifying,
    Aggregating,
    Done,
}

/// Illegal phase transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PhaseError {
    #[error("cannot move from {from:?} to {to:?}: phases only advance")]
    Backwards { from: Phase, to: Phase },
}

/// Forward-only phase tracker.
#[derive(Debug, Clone)]
pub struct ScanCycle {
    phase: Phase,
    history: Vec<Phase>,
}

impl Default for ScanCycle {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanCycle {
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            history: vec![Phase::Idle],
        }
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Phases visited so far, in order.
    #[must_use]
    pub fn history(&self) -> &[Phase] {
        &self.history
    }

    /// Moves to `next`, which must come strictly after the current phase.
    pub fn advance(&mut self, next: Phase) -> Result<(), PhaseError> {
        if next <= self.phase {
            return Err(PhaseError::Backwards {
                from: self.phase,
                to: next,
            });
        }
        debug!(from = ?self.phase, to = ?next, "phase transition");
        self.phase = next;
        self.history.push(next);
        Ok(())
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.phase == Phase::Done
    }
}

// =============================================================================
// Per-security report
// =============================================================================

/// Final state of one security in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SecurityStatus {
    Ok,
    NoData,
    /// Too few usable prints to set a threshold. Written as `no-data`; the
    /// reason carries the population size.
    #[serde(rename = "no-data")]
    InsufficientData,
    Failed,
    Skipped,
}

impl SecurityStatus {
    /// Whether the security counts toward its sector's coverage.
    #[must_use]
    pub fn counts_toward_sector(&self) -> bool {
        matches!(self, Self::Ok | Self::NoData | Self::InsufficientData)
    }
}

/// Everything the run learned about one security.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SecurityReport {
    pub symbol: String,
    pub sector: Option<String>,
    pub status: SecurityStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub thresholds: Option<ThresholdSet>,
    pub raw_trades: usize,
    pub events: usize,
    pub dropped: DropCounts,
    /// All clusters, including single prints.
    pub clusters: usize,
    /// Clusters that qualified as true sweeps.
    pub sweeps: usize,
    pub below_threshold: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub underlying_price: Option<Decimal>,
    /// Whale trades, largest first.
    pub whales: Vec<ClassifiedTrade>,
}

impl SecurityReport {
    pub fn new(symbol: impl Into<String>, sector: Option<String>, status: SecurityStatus) -> Self {
        Self {
            symbol: symbol.into(),
            sector,
            status,
            reason: None,
            thresholds: None,
            raw_trades: 0,
            events: 0,
            dropped: DropCounts::default(),
            clusters: 0,
            sweeps: 0,
            below_threshold: 0,
            underlying_price: None,
            whales: Vec::new(),
        }
    }

    fn from_failure(symbol: &str, sector: Option<String>, failure: &ScanFailure) -> Self {
        let (status, reason) = match failure {
            ScanFailure::NoData => (SecurityStatus::NoData, None),
            ScanFailure::Skipped { reason } => (SecurityStatus::Skipped, Some(reason.clone())),
            ScanFailure::Failed { reason } => (SecurityStatus::Failed, Some(reason.clone())),
        };
        Self {
            reason,
            ..Self::new(symbol, sector, status)
        }
    }
}

// =============================================================================
// Analyzer (pure stages)
// =============================================================================

/// The pure detection stages for one asset class.
#[derive(Debug, Clone)]
pub struct Analyzer {
    asset: AssetClass,
    detection: DetectionConfig,
    flags: OptionFlagConfig,
    ticker_size: TickerSizeConfig,
    inference: SideInference,
    sweeps: SweepDetector,
    classifier: TradeClassifier,
}

impl Analyzer {
    pub fn new(
        asset: AssetClass,
        detection: DetectionConfig,
        flags: OptionFlagConfig,
        ticker_size: TickerSizeConfig,
    ) -> Self {
        Self {
            asset,
            inference: SideInference::from(&detection),
            sweeps: SweepDetector::from_config(&detection),
            classifier: TradeClassifier::new(flags.clone()),
            detection,
            flags,
            ticker_size,
        }
    }

    #[must_use]
    pub fn from_config(config: &AppConfig, asset: AssetClass) -> Self {
        Self::new(
            asset,
            config.detection(asset).clone(),
            config.option_flags.clone(),
            config.ticker_size.clone(),
        )
    }

    #[must_use]
    pub fn asset(&self) -> AssetClass {
        self.asset
    }

    #[must_use]
    pub fn detection(&self) -> &DetectionConfig {
        &self.detection
    }

    pub fn normalize(&self, symbol: &str, batch: &RawBatch, as_of: NaiveDate) -> Normalized {
        match batch {
            RawBatch::Equity(equity) => normalize_equity(symbol, equity, &self.inference),
            RawBatch::Options(options) => {
                normalize_options(symbol, options, as_of, &self.inference, &self.flags)
            }
        }
    }

    pub fn thresholds(
        &self,
        symbol: &str,
        events: &[TradeEvent],
    ) -> Result<ThresholdSet, ThresholdError> {
        let notionals: Vec<Decimal> = events.iter().map(|e| e.notional).collect();
        threshold_set(
            &notionals,
            &self.detection,
            self.ticker_size.multiplier_for(symbol),
        )
    }

    pub fn cluster(&self, events: &[TradeEvent]) -> Vec<Sweep> {
        self.sweeps.detect(events)
    }

    pub fn classify(&self, sweeps: Vec<Sweep>, thresholds: &ThresholdSet) -> Classification {
        self.classifier.classify_all(sweeps, thresholds)
    }

    /// Runs every pure stage for one security's raw batch.
    pub fn analyze_security(
        &self,
        symbol: &str,
        sector: Option<String>,
        batch: &RawBatch,
        as_of: NaiveDate,
    ) -> SecurityReport {
        let mut work = Work::new(symbol, sector, batch);
        self.normalize_work(&mut work, batch, as_of);
        self.threshold_work(&mut work);
        self.cluster_work(&mut work);
        self.classify_work(&mut work);
        work.report
    }

    fn normalize_work(&self, work: &mut Work, batch: &RawBatch, as_of: NaiveDate) {
        let normalized = self.normalize(&work.report.symbol, batch, as_of);
        if normalized.dropped.malformed() > 0 {
            debug!(
                symbol = %work.report.symbol,
                dropped = normalized.dropped.malformed(),
                "dropped malformed records"
            );
        }
        work.report.events = normalized.events.len();
        work.report.dropped = normalized.dropped;
        work.events = normalized.events;
    }

    fn threshold_work(&self, work: &mut Work) {
        match self.thresholds(&work.report.symbol, &work.events) {
            Ok(set) => work.report.thresholds = Some(set),
            Err(err) => {
                debug!(symbol = %work.report.symbol, %err, "skipping detection");
                work.report.status = SecurityStatus::InsufficientData;
                work.report.reason = Some(err.to_string());
            }
        }
    }

    fn cluster_work(&self, work: &mut Work) {
        if work.report.thresholds.is_none() {
            return;
        }
        work.sweeps = self.cluster(&work.events);
        work.report.clusters = work.sweeps.len();
        work.report.sweeps = work.sweeps.iter().filter(|s| s.is_sweep).count();
    }

    fn classify_work(&self, work: &mut Work) {
        let Some(thresholds) = work.report.thresholds.as_ref() else {
            return;
        };
        let classification = self.classify(std::mem::take(&mut work.sweeps), thresholds);
        work.report.below_threshold = classification.below_threshold;
        work.report.whales = classification.trades;
    }
}

/// Intermediate state for one security between phases.
struct Work {
    report: SecurityReport,
    events: Vec<TradeEvent>,
    sweeps: Vec<Sweep>,
}

impl Work {
    fn new(symbol: &str, sector: Option<String>, batch: &RawBatch) -> Self {
        let mut report = SecurityReport::new(symbol, sector, SecurityStatus::Ok);
        report.raw_trades = batch.trade_count();
        if let RawBatch::Options(options) = batch {
            report.underlying_price = options
                .underlying_price
                .filter(|p| p.is_finite() && *p > 0.0)
                .and_then(|p| Decimal::from_str(&p.to_string()).ok());
        }
        Self {
            report,
            events: Vec::new(),
            sweeps: Vec::new(),
        }
    }
}

// =============================================================================
// Engine
// =============================================================================

/// Output of one full run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub asset: AssetClass,
    pub source: String,
    pub as_of: DateTime<Utc>,
    pub window: TimeWindow,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub universe_size: usize,
    pub stats: ScanStatsSnapshot,
    pub dropped: DropCounts,
    pub securities: BTreeMap<String, SecurityReport>,
    pub sentiment: SentimentAggregator,
    pub phases: Vec<Phase>,
}

impl RunReport {
    /// All whale trades across securities, largest first.
    #[must_use]
    pub fn whales(&self) -> Vec<&ClassifiedTrade> {
        let mut all: Vec<&ClassifiedTrade> = self
            .securities
            .values()
            .flat_map(|s| s.whales.iter())
            .collect();
        all.sort_by(|a, b| b.notional().cmp(&a.notional()));
        all
    }

    #[must_use]
    pub fn count_status(&self, status: SecurityStatus) -> usize {
        self.securities
            .values()
            .filter(|s| s.status == status)
            .count()
    }
}

/// Drives a [`ScanCycle`] over a universe.
pub struct WhaleEngine {
    analyzer: Analyzer,
    scanner: UniverseScanner,
    sectors: SectorMap,
    lookback_trading_days: u32,
}

impl WhaleEngine {
    pub fn new(
        config: &AppConfig,
        asset: AssetClass,
        scanner: UniverseScanner,
        sectors: SectorMap,
    ) -> Self {
        Self {
            analyzer: Analyzer::from_config(config, asset),
            scanner,
            sectors,
            lookback_trading_days: config.scan.lookback_trading_days,
        }
    }

    #[must_use]
    pub fn analyzer(&self) -> &Analyzer {
        &self.analyzer
    }

    /// Runs one full cycle over `securities` with the window ending at `as_of`.
    pub async fn run(
        &self,
        securities: &[String],
        as_of: DateTime<Utc>,
    ) -> Result<RunReport, PhaseError> {
        let started_at = Utc::now();
        let asset = self.analyzer.asset();
        let window = lookback_window(as_of, self.lookback_trading_days);
        let as_of_date = as_of.date_naive();
        let mut cycle = ScanCycle::new();

        cycle.advance(Phase::Scanning)?;
        let scanned = self
            .scanner
            .scan(securities, asset, window, self.analyzer.detection())
            .await;

        cycle.advance(Phase::Normalizing)?;
        let mut finished: BTreeMap<String, SecurityReport> = BTreeMap::new();
        let mut working: Vec<Work> = Vec::new();
        for (symbol, outcome) in &scanned {
            let sector = self.sectors.sector_of(symbol).map(str::to_string);
            match outcome {
                Ok(batch) => {
                    let mut work = Work::new(symbol, sector, batch);
                    self.analyzer.normalize_work(&mut work, batch, as_of_date);
                    working.push(work);
                }
                Err(failure) => {
                    finished.insert(
                        symbol.clone(),
                        SecurityReport::from_failure(symbol, sector, failure),
                    );
                }
            }
        }
        let events: usize = working.iter().map(|w| w.events.len()).sum();
        info!(securities = working.len(), events, "normalized");

        cycle.advance(Phase::Thresholding)?;
        for work in &mut working {
            self.analyzer.threshold_work(work);
        }

        cycle.advance(Phase::Clustering)?;
        for work in &mut working {
            self.analyzer.cluster_work(work);
        }
        let sweeps: usize = working.iter().map(|w| w.report.sweeps).sum();
        info!(sweeps, "clustered");

        cycle.advance(Phase::Classifying)?;
        for work in &mut working {
            self.analyzer.classify_work(work);
        }
        for work in working {
            finished.insert(work.report.symbol.clone(), work.report);
        }

        cycle.advance(Phase::Aggregating)?;
        let mut sentiment = SentimentAggregator::new();
        let mut dropped = DropCounts::default();
        for report in finished.values() {
            dropped.merge(&report.dropped);
            if report.status.counts_toward_sector() {
                sentiment.record(&report.symbol, report.sector.as_deref(), &report.whales);
            }
        }
        info!(
            whales = sentiment.overall().trade_count,
            score = sentiment.overall().score(),
            "aggregated"
        );

        cycle.advance(Phase::Done)?;
        Ok(RunReport {
            asset,
            source: self.scanner.source_name().to_string(),
            as_of,
            window,
            started_at,
            finished_at: Utc::now(),
            universe_size: securities.len(),
            stats: self.scanner.stats(),
            dropped,
            securities: finished,
            sentiment,
            phases: cycle.history().to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;
    use whale_watch_core::{EquityBatch, RawQuote, RawTrade, Tier};

    // ==================== Phase Tests ====================

    #[test]
    fn test_phases_advance_in_order() {
        let mut cycle = ScanCycle::new();
        for phase in [
            Phase::Scanning,
            Phase::Normalizing,
            Phase::Thresholding,
            Phase::Clustering,
            Phase::Classifying,
            Phase::Aggregating,
            Phase::Done,
        ] {
            cycle.advance(phase).unwrap();
        }
        assert!(cycle.is_done());
        assert_eq!(cycle.history().len(), 8);
    }

    #[test]
    fn test_reentering_phase_is_error() {
        let mut cycle = ScanCycle::new();
        cycle.advance(Phase::Scanning).unwrap();
        cycle.advance(Phase::Normalizing).unwrap();
        assert_eq!(
            cycle.advance(Phase::Scanning),
            Err(PhaseError::Backwards {
                from: Phase::Normalizing,
                to: Phase::Scanning
            })
        );
        assert!(cycle.advance(Phase::Normalizing).is_err());
        assert_eq!(cycle.phase(), Phase::Normalizing);
    }

    // ==================== Analyzer Tests ====================

    fn print(secs: i64, price: f64, size: u64, venue: &str) -> RawTrade {
        let ts = Utc.with_ymd_and_hms(2025, 3, 3, 15, 0, 0).unwrap() + Duration::seconds(secs);
        RawTrade {
            timestamp: Some(ts.to_rfc3339()),
            price: Some(price),
            size: Some(size),
            exchange: Some(venue.to_string()),
            ..RawTrade::default()
        }
    }

    fn analyzer() -> Analyzer {
        Analyzer::new(
            AssetClass::Equity,
            DetectionConfig::equities(),
            OptionFlagConfig::default(),
            TickerSizeConfig::uniform(),
        )
    }

    #[test]
    fn test_insufficient_data_status() {
        let batch = RawBatch::Equity(EquityBatch {
            trades: vec![print(0, 10.0, 100, "V"), print(60, 10.0, 100, "V")],
            quotes: Vec::new(),
        });
        let as_of = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap();
        let report = analyzer().analyze_security("XYZ", None, &batch, as_of);
        assert_eq!(report.status, SecurityStatus::InsufficientData);
        assert!(report.thresholds.is_none());
        assert!(report.whales.is_empty());
        assert_eq!(report.raw_trades, 2);
    }

    #[test]
    fn test_analyze_security_finds_whale() {
        let mut trades: Vec<RawTrade> = (0..20).map(|i| print(i * 60, 100.0, 100, "V")).collect();
        trades.push(print(5_000, 200.0, 20_000, "N"));
        let batch = RawBatch::Equity(EquityBatch {
            trades,
            quotes: vec![RawQuote {
                timestamp: Some("2025-03-03T14:00:00+00:00".to_string()),
                bid_price: Some(199.0),
                ask_price: Some(200.0),
                bid_size: Some(1),
                ask_size: Some(1),
            }],
        });
        let as_of = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap();
        let report = analyzer().analyze_security(
            "XYZ",
            Some("Industrials".to_string()),
            &batch,
            as_of,
        );
        assert_eq!(report.status, SecurityStatus::Ok);
        assert_eq!(report.whales.len(), 1);
        assert_eq!(report.whales[0].notional(), dec!(4000000));
        assert_eq!(report.whales[0].tier, Tier::Notable);
        assert_eq!(report.thresholds.as_ref().unwrap().notable, dec!(1000000));
        assert_eq!(report.below_threshold, 20);
    }

    #[test]
    fn test_failure_statuses() {
        let skipped = SecurityReport::from_failure(
            "BRK-A",
            None,
            &ScanFailure::Skipped {
                reason: "unsupported".to_string(),
            },
        );
        assert_eq!(skipped.status, SecurityStatus::Skipped);
        assert!(!skipped.status.counts_toward_sector());
        assert!(SecurityStatus::NoData.counts_toward_sector());
        assert_eq!(
            serde_json::to_string(&SecurityStatus::InsufficientData).unwrap(),
            "\"no-data\""
        );
        assert_eq!(
            serde_json::to_string(&SecurityStatus::NoData).unwrap(),
            "\"no-data\""
        );
    }
}
