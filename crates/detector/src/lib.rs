//! Whale trade detection for equities and listed options.
//!
//! A run scans a universe through a rate-limited [`TradeSource`](whale_watch_core::TradeSource),
//! then runs the pure stages over each security:
//!
//! 1. [`normalizer`]: raw prints to [`TradeEvent`](whale_watch_core::TradeEvent)s with inferred side
//! 2. [`threshold`]: adaptive per-security whale cutoff
//! 3. [`sweep`]: time/price clustering into sweeps
//! 4. [`classifier`]: tiers, flags, direction
//! 5. [`sentiment`]: per-security, per-sector and overall rollups
//!
//! [`pipeline::WhaleEngine`] drives the phases; [`report`] renders the JSON outputs.

pub mod classifier;
pub mod normalizer;
pub mod pipeline;
pub mod report;
pub mod scanner;
pub mod sentiment;
pub mod sweep;
pub mod threshold;

pub use classifier::{moneyness, Classification, TradeClassifier};
pub use normalizer::{
    normalize_equity, normalize_options, parse_occ_symbol, DropCounts, Normalized, SideInference,
};
pub use pipeline::{
    Analyzer, Phase, PhaseError, RunReport, ScanCycle, SecurityReport, SecurityStatus, WhaleEngine,
};
pub use report::{build_summary, build_trades, write_reports, ReportError, ReportPaths};
pub use scanner::{
    lookback_window, ScanFailure, ScanResults, ScanStatsSnapshot, UniverseScanner,
};
pub use sentiment::{SectorSentiment, SentimentAggregator, SentimentScore, TierCounts};
pub use sweep::SweepDetector;
pub use threshold::{adaptive_threshold, threshold_set, ThresholdError};
