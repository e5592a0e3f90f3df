//! Shared fixtures: an in-memory trade source and a sleeper that only records.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use whale_watch_core::{
    ChainContract, Page, ProviderError, RawOptionTrade, RawQuote, RawTrade, Result, Sleeper,
    TimeWindow, TradeSource,
};

// =============================================================================
// Helper Functions
// =============================================================================

/// 2025-03-03 15:00:00 UTC, a Monday session.
pub fn session_open() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 3, 15, 0, 0).unwrap()
}

pub fn print_at(millis: i64, price: f64, size: u64, venue: &str) -> RawTrade {
    RawTrade {
        timestamp: Some((session_open() + ChronoDuration::milliseconds(millis)).to_rfc3339()),
        price: Some(price),
        size: Some(size),
        exchange: Some(venue.to_string()),
        ..RawTrade::default()
    }
}

pub fn quote_at(millis: i64, bid: f64, ask: f64) -> RawQuote {
    RawQuote {
        timestamp: Some((session_open() + ChronoDuration::milliseconds(millis)).to_rfc3339()),
        bid_price: Some(bid),
        ask_price: Some(ask),
        bid_size: Some(5),
        ask_size: Some(5),
    }
}

fn paged<T: Clone>(items: &[T], token: Option<&str>, page_size: usize) -> Page<T> {
    if page_size == 0 {
        return Page::last(items.to_vec());
    }
    let start: usize = token.and_then(|t| t.parse().ok()).unwrap_or(0).min(items.len());
    let end = (start + page_size).min(items.len());
    Page {
        items: items[start..end].to_vec(),
        next_page_token: (end < items.len()).then(|| end.to_string()),
    }
}

// =============================================================================
// Mock Trade Source
// =============================================================================

/// Scripted [`TradeSource`]. Errors queued with [`MockSource::fail_next`] are
/// returned (in order) before the scripted data.
#[derive(Default)]
pub struct MockSource {
    trades: HashMap<String, Vec<RawTrade>>,
    quotes: HashMap<String, Vec<RawQuote>>,
    prices: HashMap<String, f64>,
    chains: HashMap<String, Vec<ChainContract>>,
    option_prints: HashMap<String, Vec<RawTrade>>,
    unsupported: Vec<String>,
    page_size: usize,
    errors: Mutex<HashMap<(String, String), VecDeque<ProviderError>>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Items per page; 0 returns everything in one page.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_trades(mut self, symbol: &str, trades: Vec<RawTrade>) -> Self {
        self.trades.insert(symbol.to_string(), trades);
        self
    }

    pub fn with_quotes(mut self, symbol: &str, quotes: Vec<RawQuote>) -> Self {
        self.quotes.insert(symbol.to_string(), quotes);
        self
    }

    pub fn with_price(mut self, symbol: &str, price: f64) -> Self {
        self.prices.insert(symbol.to_string(), price);
        self
    }

    pub fn with_chain(mut self, underlying: &str, contracts: Vec<ChainContract>) -> Self {
        self.chains.insert(underlying.to_string(), contracts);
        self
    }

    pub fn with_option_prints(mut self, occ_symbol: &str, trades: Vec<RawTrade>) -> Self {
        self.option_prints.insert(occ_symbol.to_string(), trades);
        self
    }

    pub fn with_unsupported(mut self, symbol: &str) -> Self {
        self.unsupported.push(symbol.to_string());
        self
    }

    /// Queues an error for the next `op` call on `symbol`.
    pub fn fail_next(&self, op: &str, symbol: &str, err: ProviderError) {
        self.errors
            .lock()
            .entry((op.to_string(), symbol.to_string()))
            .or_default()
            .push_back(err);
    }

    /// Number of `op` calls made so far (all symbols).
    pub fn calls(&self, op: &str) -> usize {
        self.calls.lock().iter().filter(|(o, _)| o == op).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().len()
    }

    fn enter(&self, op: &str, symbol: &str) -> Result<()> {
        self.calls.lock().push((op.to_string(), symbol.to_string()));
        let queued = self
            .errors
            .lock()
            .get_mut(&(op.to_string(), symbol.to_string()))
            .and_then(VecDeque::pop_front);
        match queued {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl TradeSource for MockSource {
    async fn equity_trades(
        &self,
        symbol: &str,
        _window: TimeWindow,
        page_token: Option<&str>,
    ) -> Result<Page<RawTrade>> {
        self.enter("equity_trades", symbol)?;
        let items = self.trades.get(symbol).cloned().unwrap_or_default();
        Ok(paged(&items, page_token, self.page_size))
    }

    async fn equity_quotes(
        &self,
        symbol: &str,
        _window: TimeWindow,
        page_token: Option<&str>,
    ) -> Result<Page<RawQuote>> {
        self.enter("equity_quotes", symbol)?;
        let items = self.quotes.get(symbol).cloned().unwrap_or_default();
        Ok(paged(&items, page_token, self.page_size))
    }

    async fn latest_price(&self, symbol: &str) -> Result<Option<f64>> {
        self.enter("latest_price", symbol)?;
        Ok(self.prices.get(symbol).copied())
    }

    async fn option_chain(
        &self,
        underlying: &str,
        page_token: Option<&str>,
    ) -> Result<Page<ChainContract>> {
        self.enter("option_chain", underlying)?;
        let items = self.chains.get(underlying).cloned().unwrap_or_default();
        Ok(paged(&items, page_token, self.page_size))
    }

    async fn option_trades(
        &self,
        contracts: &[String],
        _window: TimeWindow,
        page_token: Option<&str>,
    ) -> Result<Page<RawOptionTrade>> {
        let key = contracts.first().cloned().unwrap_or_default();
        self.enter("option_trades", &key)?;
        let items: Vec<RawOptionTrade> = contracts
            .iter()
            .flat_map(|symbol| {
                self.option_prints
                    .get(symbol)
                    .cloned()
                    .unwrap_or_default()
                    .into_iter()
                    .map(move |trade| RawOptionTrade {
                        symbol: symbol.clone(),
                        trade,
                    })
            })
            .collect();
        Ok(paged(&items, page_token, self.page_size))
    }

    fn supports(&self, symbol: &str) -> bool {
        !self.unsupported.iter().any(|s| s == symbol)
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// =============================================================================
// Recording Sleeper
// =============================================================================

/// Records requested sleeps and returns immediately.
#[derive(Default)]
pub struct RecordingSleeper {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().push(duration);
    }
}
