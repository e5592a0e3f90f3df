//! Raw provider records, exactly as they come off the wire.
//!
//! Fields are optional so that a single bad record never fails a whole page;
//! the normalizer decides what is usable and counts the rest.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Inclusive time range a scan covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// One page of a paginated listing.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_page_token: Option<String>,
}

impl<T> Page<T> {
    /// A final page (no continuation token).
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_page_token: None,
        }
    }
}

/// A trade print (`t`/`p`/`s`/`x`/`c`/`z` in the provider's compact format).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTrade {
    #[serde(rename = "t", default)]
    pub timestamp: Option<String>,
    #[serde(rename = "p", default)]
    pub price: Option<f64>,
    #[serde(rename = "s", default)]
    pub size: Option<u64>,
    #[serde(rename = "x", default)]
    pub exchange: Option<String>,
    #[serde(rename = "c", default)]
    pub conditions: Vec<String>,
    #[serde(rename = "z", default)]
    pub tape: Option<String>,
}

/// A top-of-book quote.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawQuote {
    #[serde(rename = "t", default)]
    pub timestamp: Option<String>,
    #[serde(rename = "bp", default)]
    pub bid_price: Option<f64>,
    #[serde(rename = "ap", default)]
    pub ask_price: Option<f64>,
    #[serde(rename = "bs", default)]
    pub bid_size: Option<u64>,
    #[serde(rename = "as", default)]
    pub ask_size: Option<u64>,
}

/// A trade print tagged with the option contract it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct RawOptionTrade {
    pub symbol: String,
    pub trade: RawTrade,
}

/// One contract of an option chain snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainContract {
    /// OCC symbol.
    pub symbol: String,
    pub latest_quote: Option<RawQuote>,
    pub open_interest: Option<u64>,
}

/// Everything fetched for one equity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EquityBatch {
    pub trades: Vec<RawTrade>,
    pub quotes: Vec<RawQuote>,
}

/// Everything fetched for one underlying's options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OptionsBatch {
    pub underlying_price: Option<f64>,
    pub contracts: Vec<ChainContract>,
    /// Trades keyed by OCC symbol.
    pub trades: BTreeMap<String, Vec<RawTrade>>,
}

impl OptionsBatch {
    #[must_use]
    pub fn trade_count(&self) -> usize {
        self.trades.values().map(Vec::len).sum()
    }
}

/// Raw results for one security, tagged by asset class.
#[derive(Debug, Clone, PartialEq)]
pub enum RawBatch {
    Equity(EquityBatch),
    Options(OptionsBatch),
}

impl RawBatch {
    /// Number of raw trade records in the batch.
    #[must_use]
    pub fn trade_count(&self) -> usize {
        match self {
            Self::Equity(batch) => batch.trades.len(),
            Self::Options(batch) => batch.trade_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_trade_compact_format() {
        let json = r#"{"t":"2025-03-03T15:00:00.123456789Z","p":187.5,"s":12000,"x":"D","c":["@"],"z":"C","i":52983525029461}"#;
        let trade: RawTrade = serde_json::from_str(json).unwrap();
        assert_eq!(trade.price, Some(187.5));
        assert_eq!(trade.size, Some(12000));
        assert_eq!(trade.exchange.as_deref(), Some("D"));
        assert_eq!(trade.conditions, vec!["@".to_string()]);
    }

    #[test]
    fn test_raw_trade_missing_fields() {
        let trade: RawTrade = serde_json::from_str(r#"{"x":"V"}"#).unwrap();
        assert!(trade.price.is_none());
        assert!(trade.timestamp.is_none());
        assert!(trade.conditions.is_empty());
    }

    #[test]
    fn test_raw_quote_format() {
        let json = r#"{"t":"2025-03-03T15:00:00Z","bp":1.2,"ap":1.3,"bs":10,"as":12}"#;
        let quote: RawQuote = serde_json::from_str(json).unwrap();
        assert_eq!(quote.bid_price, Some(1.2));
        assert_eq!(quote.ask_size, Some(12));
    }

    #[test]
    fn test_batch_trade_count() {
        let mut options = OptionsBatch::default();
        options
            .trades
            .insert("A".to_string(), vec![RawTrade::default(); 2]);
        options
            .trades
            .insert("B".to_string(), vec![RawTrade::default(); 3]);
        assert_eq!(RawBatch::Options(options).trade_count(), 5);
        assert_eq!(RawBatch::Equity(EquityBatch::default()).trade_count(), 0);
    }
}
