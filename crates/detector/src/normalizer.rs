//! Raw provider records → canonical [`TradeEvent`]s.
//!
//! Both entry points are pure. Records that cannot be trusted (missing or
//! non-positive price/size, bad timestamp, unparsable contract symbol) are
//! dropped and counted in [`DropCounts`]; side is inferred from where each
//! print sat in the prevailing quote.

use crate::classifier::moneyness;
use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;
use whale_watch_core::types::UNKNOWN_VENUE;
use whale_watch_core::{
    DetectionConfig, EquityBatch, Instrument, MoneynessClass, OptionContract, OptionFlagConfig,
    OptionRight, OptionsBatch, RawQuote, RawTrade, Side, TradeEvent,
};

// =============================================================================
// Drop accounting
// =============================================================================

/// Why records were left out, by reason.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DropCounts {
    pub invalid_price: u64,
    pub invalid_size: u64,
    pub invalid_timestamp: u64,
    pub invalid_symbol: u64,
    /// In-the-money option prints excluded from detection.
    pub filtered_itm: u64,
}

impl DropCounts {
    /// Malformed records (excludes deliberate filtering).
    #[must_use]
    pub fn malformed(&self) -> u64 {
        self.invalid_price + self.invalid_size + self.invalid_timestamp + self.invalid_symbol
    }

    pub fn merge(&mut self, other: &DropCounts) {
        self.invalid_price += other.invalid_price;
        self.invalid_size += other.invalid_size;
        self.invalid_timestamp += other.invalid_timestamp;
        self.invalid_symbol += other.invalid_symbol;
        self.filtered_itm += other.filtered_itm;
    }
}

/// Normalizer output for one security.
#[derive(Debug, Clone, Default)]
pub struct Normalized {
    /// Events in timestamp order.
    pub events: Vec<TradeEvent>,
    pub dropped: DropCounts,
}

// =============================================================================
// Side inference
// =============================================================================

/// Quote-position cutoffs and quote freshness for side inference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SideInference {
    pub near_ask: f64,
    pub near_bid: f64,
    pub max_quote_age: Duration,
}

impl Default for SideInference {
    fn default() -> Self {
        Self {
            near_ask: 0.7,
            near_bid: 0.3,
            max_quote_age: Duration::from_secs(5),
        }
    }
}

impl From<&DetectionConfig> for SideInference {
    fn from(config: &DetectionConfig) -> Self {
        Self {
            near_ask: config.near_ask,
            near_bid: config.near_bid,
            max_quote_age: config.max_quote_age,
        }
    }
}

impl SideInference {
    /// Side for a spread position; `None` (no usable quote) is `Unknown`.
    #[must_use]
    pub fn side(&self, position: Option<f64>) -> Side {
        match position {
            Some(p) if p >= self.near_ask => Side::Buy,
            Some(p) if p <= self.near_bid => Side::Sell,
            _ => Side::Unknown,
        }
    }

    /// Whether a quote stamped `quote_ts` may describe a print at `trade_ts`.
    #[must_use]
    pub fn is_fresh(&self, trade_ts: DateTime<Utc>, quote_ts: DateTime<Utc>) -> bool {
        let gap = if trade_ts >= quote_ts {
            trade_ts - quote_ts
        } else {
            quote_ts - trade_ts
        };
        gap.to_std().map_or(false, |age| age <= self.max_quote_age)
    }
}

/// Where `price` sits in `[bid, ask]` (0 = bid, 1 = ask; outside the quote is <0 or >1).
///
/// Returns `None` for missing, non-positive, crossed or zero-width quotes.
#[must_use]
pub fn spread_position(price: f64, bid: Option<f64>, ask: Option<f64>) -> Option<f64> {
    let (bid, ask) = (bid?, ask?);
    if !(bid.is_finite() && ask.is_finite()) || bid <= 0.0 || ask <= bid {
        return None;
    }
    Some((price - bid) / (ask - bid))
}

/// Time-sorted quotes for "latest quote at or before" lookups.
struct QuoteBook {
    times: Vec<DateTime<Utc>>,
    quotes: Vec<BidAsk>,
}

type BidAsk = (Option<f64>, Option<f64>);

impl QuoteBook {
    fn new(raw: &[RawQuote]) -> Self {
        let mut rows: Vec<(DateTime<Utc>, BidAsk)> = raw
            .iter()
            .filter_map(|q| {
                let ts = parse_timestamp(q.timestamp.as_deref()?)?;
                Some((ts, (q.bid_price, q.ask_price)))
            })
            .collect();
        rows.sort_by_key(|(ts, _)| *ts);
        let (times, quotes) = rows.into_iter().unzip();
        Self { times, quotes }
    }

    fn at_or_before(&self, ts: DateTime<Utc>) -> Option<(DateTime<Utc>, BidAsk)> {
        let idx = self.times.partition_point(|t| *t <= ts);
        idx.checked_sub(1).map(|i| (self.times[i], self.quotes[i]))
    }
}

// =============================================================================
// Parsing helpers
// =============================================================================

/// Parses an RFC 3339 timestamp (nanosecond precision accepted).
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Positive, finite float → Decimal via its shortest decimal rendering.
fn positive_decimal(value: Option<f64>) -> Option<Decimal> {
    let value = value.filter(|v| v.is_finite() && *v > 0.0)?;
    Decimal::from_str(&value.to_string()).ok()
}

fn occ_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^([A-Z]{1,6})(\d{6})([CP])(\d{8})$").ok())
        .as_ref()
}

/// Decodes an OCC option symbol such as `AAPL251219C00275000`.
///
/// Expiration is `YYMMDD` (20YY); strike is the 8-digit field divided by 1000.
#[must_use]
pub fn parse_occ_symbol(symbol: &str) -> Option<OptionContract> {
    let caps = occ_pattern()?.captures(symbol)?;
    let underlying = caps.get(1)?.as_str();
    let date = caps.get(2)?.as_str();
    let right = caps.get(3)?.as_str().chars().next()?;
    let strike_raw: i64 = caps.get(4)?.as_str().parse().ok()?;

    let year = 2000 + date[0..2].parse::<i32>().ok()?;
    let month = date[2..4].parse::<u32>().ok()?;
    let day = date[4..6].parse::<u32>().ok()?;

    Some(OptionContract {
        occ_symbol: symbol.to_string(),
        underlying: underlying.to_string(),
        expiration: NaiveDate::from_ymd_opt(year, month, day)?,
        strike: Decimal::new(strike_raw, 3).normalize(),
        right: OptionRight::from_code(right)?,
    })
}

enum RecordError {
    Timestamp,
    Price,
    Size,
}

struct ValidTrade {
    timestamp: DateTime<Utc>,
    price: Decimal,
    price_f64: f64,
    size: u64,
    venue: String,
}

fn validate(trade: &RawTrade) -> Result<ValidTrade, RecordError> {
    let timestamp = trade
        .timestamp
        .as_deref()
        .and_then(parse_timestamp)
        .ok_or(RecordError::Timestamp)?;
    let price = positive_decimal(trade.price).ok_or(RecordError::Price)?;
    let size = trade.size.filter(|s| *s > 0).ok_or(RecordError::Size)?;
    let venue = trade
        .exchange
        .as_deref()
        .map(str::trim)
        .filter(|x| !x.is_empty())
        .unwrap_or(UNKNOWN_VENUE)
        .to_string();
    Ok(ValidTrade {
        timestamp,
        price,
        price_f64: trade.price.unwrap_or_default(),
        size,
        venue,
    })
}

fn count_drop(dropped: &mut DropCounts, err: RecordError) {
    match err {
        RecordError::Timestamp => dropped.invalid_timestamp += 1,
        RecordError::Price => dropped.invalid_price += 1,
        RecordError::Size => dropped.invalid_size += 1,
    }
}

// =============================================================================
// Entry points
// =============================================================================

/// Normalizes one equity's trades, inferring side from the latest quote at or
/// before each print. A quote older than `inference.max_quote_age` leaves the
/// side unknown.
#[must_use]
pub fn normalize_equity(
    symbol: &str,
    batch: &EquityBatch,
    inference: &SideInference,
) -> Normalized {
    let book = QuoteBook::new(&batch.quotes);
    let mut out = Normalized::default();

    for raw in &batch.trades {
        let trade = match validate(raw) {
            Ok(t) => t,
            Err(e) => {
                count_drop(&mut out.dropped, e);
                continue;
            }
        };
        let position = book
            .at_or_before(trade.timestamp)
            .filter(|(quote_ts, _)| inference.is_fresh(trade.timestamp, *quote_ts))
            .and_then(|(_, (bid, ask))| spread_position(trade.price_f64, bid, ask));
        let event = TradeEvent::new(
            symbol,
            Instrument::Equity,
            trade.timestamp,
            trade.price,
            trade.size,
            trade.venue,
            inference.side(position),
        )
        .with_quote_position(position);
        out.events.push(event);
    }

    out.events.sort_by_key(|e| e.timestamp);
    out
}

/// Normalizes one underlying's option trades.
///
/// Side comes from each contract's snapshot quote, and only for prints within
/// `inference.max_quote_age` of it; an undated quote is never used. Days to
/// expiration are counted from `as_of` and floored at zero. In-the-money
/// prints are filtered out when `flags.exclude_itm` is set.
#[must_use]
pub fn normalize_options(
    underlying: &str,
    batch: &OptionsBatch,
    as_of: NaiveDate,
    inference: &SideInference,
    flags: &OptionFlagConfig,
) -> Normalized {
    let underlying_price = positive_decimal(batch.underlying_price);
    let chain: HashMap<&str, (Option<&RawQuote>, Option<u64>)> = batch
        .contracts
        .iter()
        .map(|c| (c.symbol.as_str(), (c.latest_quote.as_ref(), c.open_interest)))
        .collect();

    let mut out = Normalized::default();

    for (symbol, trades) in &batch.trades {
        let Some(contract) = parse_occ_symbol(symbol) else {
            out.dropped.invalid_symbol += trades.len() as u64;
            continue;
        };

        let class = moneyness(
            contract.strike,
            underlying_price,
            contract.right,
            flags.atm_band,
        )
        .class;
        if flags.exclude_itm && class == MoneynessClass::Itm {
            out.dropped.filtered_itm += trades.len() as u64;
            continue;
        }

        let (quote, open_interest) = chain.get(symbol.as_str()).copied().unwrap_or((None, None));
        let quote = quote.and_then(|q| {
            let ts = parse_timestamp(q.timestamp.as_deref()?)?;
            Some((ts, (q.bid_price, q.ask_price)))
        });
        let days_to_expiration = (contract.expiration - as_of).num_days().max(0);
        let instrument = Instrument::Option {
            contract,
            days_to_expiration,
            underlying_price,
            open_interest,
        };

        for raw in trades {
            let trade = match validate(raw) {
                Ok(t) => t,
                Err(e) => {
                    count_drop(&mut out.dropped, e);
                    continue;
                }
            };
            let position = quote
                .filter(|(quote_ts, _)| inference.is_fresh(trade.timestamp, *quote_ts))
                .and_then(|(_, (bid, ask))| spread_position(trade.price_f64, bid, ask));
            let event = TradeEvent::new(
                underlying,
                instrument.clone(),
                trade.timestamp,
                trade.price,
                trade.size,
                trade.venue,
                inference.side(position),
            )
            .with_quote_position(position);
            out.events.push(event);
        }
    }

    out.events.sort_by_key(|e| e.timestamp);
    out
}
