//! Fetches raw trades for a universe of securities through one shared rate limiter.
//!
//! Each security is scanned independently: a timeout, a malformed page or an
//! empty result marks that security and the scan moves on. Upstream 429s get
//! a full cooldown (the limiter window is reset afterwards) and the same
//! request is retried; transient failures get exponential backoff.
//!
//! # Example
//!
//! ```ignore
//! let scanner = UniverseScanner::new(source, limiter, config.retry.clone(), config.provider.clone())
//!     .with_concurrency(config.scan.concurrency);
//! let results = scanner.scan(&tickers, AssetClass::Equity, window, &config.equities).await;
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use futures::stream::{self, StreamExt};
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use whale_watch_core::calendar::lookback_start;
use whale_watch_core::{
    AssetClass, DetectionConfig, EquityBatch, OptionsBatch, Page, ProviderConfig, ProviderError,
    RateLimiter, RawBatch, RawTrade, RetryConfig, Sleeper, TimeWindow, TokioSleeper, TradeSource,
};

// =============================================================================
// Outcomes
// =============================================================================

/// Why a security produced no raw batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanFailure {
    /// The provider returned nothing for the window.
    #[error("no data")]
    NoData,

    /// The provider cannot serve this ticker.
    #[error("skipped: {reason}")]
    Skipped { reason: String },

    /// Retries exhausted or a permanent error.
    #[error("failed: {reason}")]
    Failed { reason: String },
}

impl From<ProviderError> for ScanFailure {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Unsupported(symbol) => Self::Skipped {
                reason: format!("unsupported symbol {symbol}"),
            },
            other => Self::Failed {
                reason: other.to_string(),
            },
        }
    }
}

/// Per-security scan results in ticker order.
pub type ScanResults = BTreeMap<String, Result<RawBatch, ScanFailure>>;

// =============================================================================
// Statistics
// =============================================================================

/// Run counters, safe to bump from concurrent workers.
#[derive(Debug, Default)]
pub struct ScanStats {
    attempted: AtomicU64,
    succeeded: AtomicU64,
    no_data: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
    requests: AtomicU64,
    retries: AtomicU64,
    cooldowns: AtomicU64,
}

/// Point-in-time copy of [`ScanStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanStatsSnapshot {
    pub attempted: u64,
    pub succeeded: u64,
    pub no_data: u64,
    pub failed: u64,
    pub skipped: u64,
    pub requests: u64,
    pub retries: u64,
    pub rate_limit_cooldowns: u64,
}

impl ScanStats {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn record_outcome(&self, outcome: &Result<RawBatch, ScanFailure>) {
        match outcome {
            Ok(_) => Self::bump(&self.succeeded),
            Err(ScanFailure::NoData) => Self::bump(&self.no_data),
            Err(ScanFailure::Skipped { .. }) => Self::bump(&self.skipped),
            Err(ScanFailure::Failed { .. }) => Self::bump(&self.failed),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> ScanStatsSnapshot {
        ScanStatsSnapshot {
            attempted: self.attempted.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            no_data: self.no_data.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            requests: self.requests.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            rate_limit_cooldowns: self.cooldowns.load(Ordering::Relaxed),
        }
    }
}

impl ScanStatsSnapshot {
    /// One-line human summary for logs.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "{} attempted, {} ok, {} no data, {} failed, {} skipped | {} requests, {} retries, {} cooldowns",
            self.attempted,
            self.succeeded,
            self.no_data,
            self.failed,
            self.skipped,
            self.requests,
            self.retries,
            self.rate_limit_cooldowns
        )
    }
}

// =============================================================================
// Window helpers
// =============================================================================

/// Scan window ending at `as_of` and starting at midnight UTC of the
/// `trading_days`-th most recent trading day.
#[must_use]
pub fn lookback_window(as_of: DateTime<Utc>, trading_days: u32) -> TimeWindow {
    let start = lookback_start(as_of.date_naive(), trading_days)
        .and_hms_opt(0, 0, 0)
        .map_or(as_of, |dt| dt.and_utc());
    TimeWindow { start, end: as_of }
}

/// Loose pre-filter deciding whether quotes are worth fetching.
#[must_use]
pub fn is_candidate(trade: &RawTrade, config: &DetectionConfig) -> bool {
    let (Some(price), Some(size)) = (trade.price, trade.size) else {
        return false;
    };
    if config.candidate_min_size > 0 && size >= config.candidate_min_size {
        return true;
    }
    let min_notional = config.candidate_min_notional.to_f64().unwrap_or(f64::MAX);
    price * size as f64 >= min_notional
}

/// `YYMMDD` expiration field of an OCC symbol, if long enough to have one.
fn expiration_code(occ_symbol: &str) -> &str {
    let len = occ_symbol.len();
    if len >= 15 && occ_symbol.is_char_boundary(len - 15) && occ_symbol.is_char_boundary(len - 9) {
        &occ_symbol[len - 15..len - 9]
    } else {
        ""
    }
}

/// Parses an OCC `YYMMDD` code; used only for log context.
fn expiration_date(code: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(code, "%y%m%d").ok()
}

// =============================================================================
// Scanner
// =============================================================================

/// Scans securities against a [`TradeSource`], sharing one [`RateLimiter`].
pub struct UniverseScanner {
    source: Arc<dyn TradeSource>,
    limiter: Arc<RateLimiter>,
    sleeper: Arc<dyn Sleeper>,
    retry: RetryConfig,
    max_pages: usize,
    symbols_per_request: usize,
    concurrency: usize,
    stats: ScanStats,
}

impl UniverseScanner {
    pub fn new(
        source: Arc<dyn TradeSource>,
        limiter: Arc<RateLimiter>,
        retry: RetryConfig,
        provider: ProviderConfig,
    ) -> Self {
        Self {
            source,
            limiter,
            sleeper: Arc::new(TokioSleeper),
            retry,
            max_pages: provider.max_pages.max(1),
            symbols_per_request: provider.option_symbols_per_request.max(1),
            concurrency: 1,
            stats: ScanStats::default(),
        }
    }

    /// Replaces the sleeper used for cooldowns and backoff.
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Securities in flight at once (minimum 1).
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    #[must_use]
    pub fn stats(&self) -> ScanStatsSnapshot {
        self.stats.snapshot()
    }

    #[must_use]
    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    /// Scans every security; individual failures are recorded, never propagated.
    pub async fn scan(
        &self,
        securities: &[String],
        asset: AssetClass,
        window: TimeWindow,
        detection: &DetectionConfig,
    ) -> ScanResults {
        info!(
            source = self.source.name(),
            asset = %asset,
            securities = securities.len(),
            concurrency = self.concurrency,
            start = %window.start,
            end = %window.end,
            "starting scan"
        );

        let results: Vec<(String, Result<RawBatch, ScanFailure>)> = stream::iter(securities)
            .map(|symbol| async move {
                let outcome = self.scan_security(symbol, asset, window, detection).await;
                (symbol.clone(), outcome)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let results: ScanResults = results.into_iter().collect();
        info!(stats = %self.stats().summary(), "scan complete");
        results
    }

    /// Scans one security.
    pub async fn scan_security(
        &self,
        symbol: &str,
        asset: AssetClass,
        window: TimeWindow,
        detection: &DetectionConfig,
    ) -> Result<RawBatch, ScanFailure> {
        ScanStats::bump(&self.stats.attempted);

        let outcome = if self.source.supports(symbol) {
            match asset {
                AssetClass::Equity => self.scan_equity(symbol, window, detection).await,
                AssetClass::Option => self.scan_options(symbol, window).await,
            }
        } else {
            Err(ScanFailure::Skipped {
                reason: format!("{} does not serve {symbol}", self.source.name()),
            })
        };

        match &outcome {
            Ok(batch) => info!(symbol, trades = batch.trade_count(), "security scanned"),
            Err(ScanFailure::NoData) => info!(symbol, "no data"),
            Err(ScanFailure::Skipped { reason }) => warn!(symbol, %reason, "security skipped"),
            Err(ScanFailure::Failed { reason }) => error!(symbol, %reason, "security failed"),
        }
        self.stats.record_outcome(&outcome);
        outcome
    }

    async fn scan_equity(
        &self,
        symbol: &str,
        window: TimeWindow,
        detection: &DetectionConfig,
    ) -> Result<RawBatch, ScanFailure> {
        let trades = self
            .paginate("equity_trades", symbol, |token| async move {
                self.source
                    .equity_trades(symbol, window, token.as_deref())
                    .await
            })
            .await?;
        if trades.is_empty() {
            return Err(ScanFailure::NoData);
        }

        let candidates = trades.iter().filter(|t| is_candidate(t, detection)).count();
        let quotes = if candidates > 0 {
            self.paginate("equity_quotes", symbol, |token| async move {
                self.source
                    .equity_quotes(symbol, window, token.as_deref())
                    .await
            })
            .await?
        } else {
            debug!(symbol, "no candidate prints, skipping quotes");
            Vec::new()
        };

        Ok(RawBatch::Equity(EquityBatch { trades, quotes }))
    }

    async fn scan_options(
        &self,
        symbol: &str,
        window: TimeWindow,
    ) -> Result<RawBatch, ScanFailure> {
        let underlying_price = self
            .call("latest_price", symbol, || self.source.latest_price(symbol))
            .await?;

        let contracts = self
            .paginate("option_chain", symbol, |token| async move {
                self.source.option_chain(symbol, token.as_deref()).await
            })
            .await?;
        if contracts.is_empty() {
            return Err(ScanFailure::NoData);
        }

        let mut by_expiration: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        for contract in &contracts {
            by_expiration
                .entry(expiration_code(&contract.symbol))
                .or_default()
                .push(contract.symbol.clone());
        }

        let mut batch = OptionsBatch {
            underlying_price,
            contracts: Vec::new(),
            trades: BTreeMap::new(),
        };

        for (code, symbols) in &by_expiration {
            debug!(
                symbol,
                expiration = ?expiration_date(code),
                contracts = symbols.len(),
                "fetching option trades"
            );
            for chunk in symbols.chunks(self.symbols_per_request) {
                let trades = self
                    .paginate("option_trades", symbol, |token| async move {
                        self.source
                            .option_trades(chunk, window, token.as_deref())
                            .await
                    })
                    .await?;
                for raw in trades {
                    batch.trades.entry(raw.symbol).or_default().push(raw.trade);
                }
            }
        }

        if batch.trades.is_empty() {
            return Err(ScanFailure::NoData);
        }
        batch.contracts = contracts;
        Ok(RawBatch::Options(batch))
    }

    /// Follows `next_page_token` until exhausted, repeated, or `max_pages` is hit.
    async fn paginate<T, F, Fut>(
        &self,
        op: &'static str,
        symbol: &str,
        fetch: F,
    ) -> Result<Vec<T>, ProviderError>
    where
        F: Fn(Option<String>) -> Fut,
        Fut: Future<Output = Result<Page<T>, ProviderError>>,
    {
        let mut items = Vec::new();
        let mut token: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let page = self.call(op, symbol, || fetch(token.clone())).await?;
            pages += 1;
            items.extend(page.items);

            match page.next_page_token {
                Some(next) if token.as_deref() == Some(next.as_str()) => {
                    warn!(symbol, op, "provider repeated page token, stopping");
                    break;
                }
                Some(_) if pages >= self.max_pages => {
                    warn!(symbol, op, pages, "page limit reached, results truncated");
                    break;
                }
                Some(next) => token = Some(next),
                None => break,
            }
        }
        Ok(items)
    }

    /// One rate-limited request with cooldown and backoff handling.
    async fn call<T, F, Fut>(
        &self,
        op: &'static str,
        symbol: &str,
        request: F,
    ) -> Result<T, ProviderError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut retries = 0u32;
        let mut cooldowns = 0u32;

        loop {
            self.limiter.acquire().await;
            ScanStats::bump(&self.stats.requests);
            debug!(symbol, op, "request");

            match request().await {
                Ok(value) => return Ok(value),
                Err(err)
                    if err.is_rate_limit() && cooldowns < self.retry.max_rate_limit_retries =>
                {
                    cooldowns += 1;
                    ScanStats::bump(&self.stats.cooldowns);
                    let wait = err
                        .retry_after()
                        .map_or(self.retry.rate_limit_cooldown, |after| {
                            after.max(self.retry.rate_limit_cooldown)
                        });
                    warn!(symbol, op, wait_secs = wait.as_secs(), "rate limited, cooling down");
                    self.sleeper.sleep(wait).await;
                    self.limiter.reset();
                }
                Err(err) if err.is_transient() && retries < self.retry.max_retries => {
                    let delay = self.retry.backoff_for(retries);
                    retries += 1;
                    ScanStats::bump(&self.stats.retries);
                    warn!(symbol, op, attempt = retries, error = %err, "transient error, retrying");
                    self.sleeper.sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn raw(price: f64, size: u64) -> RawTrade {
        RawTrade {
            price: Some(price),
            size: Some(size),
            ..RawTrade::default()
        }
    }

    // ==================== Candidate Filter Tests ====================

    #[test]
    fn test_equity_candidate_by_size_or_notional() {
        let config = DetectionConfig::equities();
        assert!(is_candidate(&raw(1.0, 5_000), &config));
        assert!(is_candidate(&raw(500.0, 2_000), &config));
        assert!(!is_candidate(&raw(100.0, 1_000), &config));
        assert!(!is_candidate(&RawTrade::default(), &config));
    }

    // ==================== Helper Tests ====================

    #[test]
    fn test_expiration_code() {
        assert_eq!(expiration_code("AAPL251219C00275000"), "251219");
        assert_eq!(expiration_code("F250117P00012000"), "250117");
        assert_eq!(expiration_code("BAD"), "");
        assert_eq!(
            expiration_date("251219"),
            NaiveDate::from_ymd_opt(2025, 12, 19)
        );
    }

    #[test]
    fn test_lookback_window_spans_trading_days() {
        // Friday 2025-03-07; five trading days back is Monday 2025-03-03
        let as_of = Utc.with_ymd_and_hms(2025, 3, 7, 20, 0, 0).unwrap();
        let window = lookback_window(as_of, 5);
        assert_eq!(window.start, Utc.with_ymd_and_hms(2025, 3, 3, 0, 0, 0).unwrap());
        assert_eq!(window.end, as_of);
    }

    // ==================== Outcome Tests ====================

    #[test]
    fn test_unsupported_maps_to_skipped() {
        let failure: ScanFailure = ProviderError::Unsupported("BRK-A".to_string()).into();
        assert!(matches!(failure, ScanFailure::Skipped { .. }));

        let failure: ScanFailure = ProviderError::Malformed("eof".to_string()).into();
        assert!(matches!(failure, ScanFailure::Failed { .. }));
    }

    #[test]
    fn test_stats_snapshot() {
        let stats = ScanStats::default();
        ScanStats::bump(&stats.attempted);
        ScanStats::bump(&stats.attempted);
        stats.record_outcome(&Err(ScanFailure::NoData));
        stats.record_outcome(&Ok(RawBatch::Equity(EquityBatch::default())));
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.attempted, 2);
        assert_eq!(snapshot.no_data, 1);
        assert_eq!(snapshot.succeeded, 1);
        assert!(snapshot.summary().contains("2 attempted"));
    }
}
