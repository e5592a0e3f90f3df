//! Bullish / bearish rollups per security, per sector and overall.
//!
//! Every rollup is built from [`SentimentScore`], a commutative monoid:
//! `merge` is associative and order-independent, so how securities are
//! partitioned or ordered never changes the totals.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use whale_watch_core::{ClassifiedTrade, Direction, Tier};

// =============================================================================
// Score
// =============================================================================

/// Whale counts by tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TierCounts {
    pub notable: usize,
    pub large: usize,
    pub mega: usize,
}

impl TierCounts {
    pub fn add(&mut self, tier: Tier) {
        match tier {
            Tier::Notable => self.notable += 1,
            Tier::Large => self.large += 1,
            Tier::Mega => self.mega += 1,
        }
    }

    pub fn merge(&mut self, other: &TierCounts) {
        self.notable += other.notable;
        self.large += other.large;
        self.mega += other.mega;
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.notable + self.large + self.mega
    }
}

/// Directional notional and counts over a set of whale trades.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SentimentScore {
    pub trade_count: usize,
    pub tiers: TierCounts,
    pub bullish_count: usize,
    pub bearish_count: usize,
    pub neutral_count: usize,
    pub bullish_notional: Decimal,
    pub bearish_notional: Decimal,
    /// Notional of trades whose side could not be inferred.
    pub neutral_notional: Decimal,
}

impl SentimentScore {
    pub fn from_trades<'a, I>(trades: I) -> Self
    where
        I: IntoIterator<Item = &'a ClassifiedTrade>,
    {
        let mut score = Self::default();
        for trade in trades {
            score.add(trade);
        }
        score
    }

    pub fn add(&mut self, trade: &ClassifiedTrade) {
        let notional = trade.notional();
        self.trade_count += 1;
        self.tiers.add(trade.tier);
        match trade.direction {
            Direction::Bullish => {
                self.bullish_count += 1;
                self.bullish_notional += notional;
            }
            Direction::Bearish => {
                self.bearish_count += 1;
                self.bearish_notional += notional;
            }
            Direction::Neutral => {
                self.neutral_count += 1;
                self.neutral_notional += notional;
            }
        }
    }

    pub fn merge(&mut self, other: &SentimentScore) {
        self.trade_count += other.trade_count;
        self.tiers.merge(&other.tiers);
        self.bullish_count += other.bullish_count;
        self.bearish_count += other.bearish_count;
        self.neutral_count += other.neutral_count;
        self.bullish_notional += other.bullish_notional;
        self.bearish_notional += other.bearish_notional;
        self.neutral_notional += other.neutral_notional;
    }

    #[must_use]
    pub fn total_notional(&self) -> Decimal {
        self.bullish_notional + self.bearish_notional + self.neutral_notional
    }

    /// `(bull - bear) / (bull + bear)` in `[-1, 1]`; 0 with no directional flow.
    #[must_use]
    pub fn score(&self) -> f64 {
        let directional = self.bullish_notional + self.bearish_notional;
        if directional.is_zero() {
            return 0.0;
        }
        ((self.bullish_notional - self.bearish_notional) / directional)
            .to_f64()
            .unwrap_or(0.0)
    }

    #[must_use]
    pub fn direction(&self) -> Direction {
        match self.bullish_notional.cmp(&self.bearish_notional) {
            std::cmp::Ordering::Greater => Direction::Bullish,
            std::cmp::Ordering::Less => Direction::Bearish,
            std::cmp::Ordering::Equal => Direction::Neutral,
        }
    }
}

// =============================================================================
// Sector rollup
// =============================================================================

/// Sector totals plus coverage counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SectorSentiment {
    pub sentiment: SentimentScore,
    /// Scanned securities mapped to the sector, including those without data.
    pub security_count: usize,
    pub securities_with_whales: usize,
}

impl SectorSentiment {
    pub fn merge(&mut self, other: &SectorSentiment) {
        self.sentiment.merge(&other.sentiment);
        self.security_count += other.security_count;
        self.securities_with_whales += other.securities_with_whales;
    }
}

// =============================================================================
// Aggregator
// =============================================================================

/// Accumulates per-security results into sector and overall rollups.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SentimentAggregator {
    securities: BTreeMap<String, SentimentScore>,
    sectors: BTreeMap<String, SectorSentiment>,
    overall: SentimentScore,
}

impl SentimentAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one scanned security.
    ///
    /// Pass an empty slice for securities that produced no whales or no data;
    /// they still count toward their sector's `security_count`. Securities
    /// without a sector only feed the per-security and overall totals.
    pub fn record(&mut self, symbol: &str, sector: Option<&str>, trades: &[ClassifiedTrade]) {
        let score = SentimentScore::from_trades(trades);

        if let Some(sector) = sector {
            let contribution = SectorSentiment {
                sentiment: score.clone(),
                security_count: 1,
                securities_with_whales: usize::from(!trades.is_empty()),
            };
            self.sectors
                .entry(sector.to_string())
                .or_default()
                .merge(&contribution);
        }

        self.overall.merge(&score);
        self.securities
            .entry(symbol.to_string())
            .or_default()
            .merge(&score);
    }

    pub fn merge(&mut self, other: &SentimentAggregator) {
        for (symbol, score) in &other.securities {
            self.securities.entry(symbol.clone()).or_default().merge(score);
        }
        for (sector, rollup) in &other.sectors {
            self.sectors.entry(sector.clone()).or_default().merge(rollup);
        }
        self.overall.merge(&other.overall);
    }

    #[must_use]
    pub fn security(&self, symbol: &str) -> Option<&SentimentScore> {
        self.securities.get(symbol)
    }

    #[must_use]
    pub fn securities(&self) -> &BTreeMap<String, SentimentScore> {
        &self.securities
    }

    #[must_use]
    pub fn sectors(&self) -> &BTreeMap<String, SectorSentiment> {
        &self.sectors
    }

    #[must_use]
    pub fn overall(&self) -> &SentimentScore {
        &self.overall
    }

    /// Sectors ordered by whale notional, busiest first, at most `limit`.
    ///
    /// Sectors without whales are left out.
    #[must_use]
    pub fn top_sectors(&self, limit: usize) -> Vec<&str> {
        let mut active: Vec<(&String, &SectorSentiment)> = self
            .sectors
            .iter()
            .filter(|(_, s)| s.sentiment.trade_count > 0)
            .collect();
        active.sort_by(|a, b| {
            b.1.sentiment
                .total_notional()
                .cmp(&a.1.sentiment.total_notional())
                .then_with(|| a.0.cmp(b.0))
        });
        active
            .into_iter()
            .take(limit)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;
    use std::collections::BTreeSet;
    use whale_watch_core::{Instrument, Side, Sweep, TradeEvent};

    fn whale(symbol: &str, notional: Decimal, side: Side, tier: Tier) -> ClassifiedTrade {
        let event = TradeEvent::new(
            symbol,
            Instrument::Equity,
            Utc.with_ymd_and_hms(2025, 3, 3, 15, 0, 0).unwrap(),
            notional,
            1,
            "V",
            side,
        );
        ClassifiedTrade {
            sweep: Sweep::from_events(vec![event]).unwrap(),
            tier,
            flags: BTreeSet::new(),
            direction: Direction::from_side(side, None),
            dte_bucket: None,
            moneyness: None,
        }
    }

    // ==================== Score Tests ====================

    #[test]
    fn test_score_range_and_direction() {
        let trades = vec![
            whale("AAPL", dec!(3000000), Side::Buy, Tier::Large),
            whale("AAPL", dec!(1000000), Side::Sell, Tier::Notable),
        ];
        let score = SentimentScore::from_trades(&trades);
        assert!((score.score() - 0.5).abs() < 1e-12);
        assert_eq!(score.direction(), Direction::Bullish);
        assert_eq!(score.tiers.total(), 2);
        assert_eq!(score.tiers.large, 1);
    }

    #[test]
    fn test_all_unknown_side_scores_zero() {
        let trades = vec![
            whale("AAPL", dec!(2000000), Side::Unknown, Tier::Notable),
            whale("AAPL", dec!(9000000), Side::Unknown, Tier::Mega),
        ];
        let score = SentimentScore::from_trades(&trades);
        assert_eq!(score.score(), 0.0);
        assert_eq!(score.direction(), Direction::Neutral);
        assert_eq!(score.neutral_count, 2);
        assert_eq!(score.neutral_notional, dec!(11000000));
        assert_eq!(score.trade_count, 2);
    }

    #[test]
    fn test_empty_score() {
        let score = SentimentScore::default();
        assert_eq!(score.score(), 0.0);
        assert_eq!(score.total_notional(), Decimal::ZERO);
    }

    // ==================== Aggregator Tests ====================

    #[test]
    fn test_sector_counts_include_no_data_securities() {
        let mut agg = SentimentAggregator::new();
        agg.record(
            "AAPL",
            Some("Technology"),
            &[whale("AAPL", dec!(2000000), Side::Buy, Tier::Notable)],
        );
        agg.record("MSFT", Some("Technology"), &[]);
        agg.record("XYZ", None, &[whale("XYZ", dec!(5000000), Side::Sell, Tier::Large)]);

        let tech = &agg.sectors()["Technology"];
        assert_eq!(tech.security_count, 2);
        assert_eq!(tech.securities_with_whales, 1);
        assert_eq!(tech.sentiment.bullish_notional, dec!(2000000));
        assert_eq!(agg.sectors().len(), 1);
        assert_eq!(agg.overall().trade_count, 2);
        assert!(agg.security("XYZ").is_some());
    }

    #[test]
    fn test_totals_independent_of_order_and_partition() {
        let inputs: Vec<(&str, Option<&str>, Vec<ClassifiedTrade>)> = vec![
            (
                "AAPL",
                Some("Technology"),
                vec![whale("AAPL", dec!(2000000), Side::Buy, Tier::Notable)],
            ),
            (
                "MSFT",
                Some("Technology"),
                vec![whale("MSFT", dec!(4000000), Side::Sell, Tier::Large)],
            ),
            ("JPM", Some("Financials"), vec![]),
            (
                "XOM",
                Some("Energy"),
                vec![whale("XOM", dec!(1500000), Side::Unknown, Tier::Notable)],
            ),
            ("ZZZ", None, vec![whale("ZZZ", dec!(7000000), Side::Buy, Tier::Mega)]),
        ];

        let mut forward = SentimentAggregator::new();
        for (symbol, sector, trades) in &inputs {
            forward.record(symbol, *sector, trades);
        }

        let mut reversed = SentimentAggregator::new();
        for (symbol, sector, trades) in inputs.iter().rev() {
            reversed.record(symbol, *sector, trades);
        }

        let (left, right) = inputs.split_at(2);
        let mut a = SentimentAggregator::new();
        for (symbol, sector, trades) in left {
            a.record(symbol, *sector, trades);
        }
        let mut b = SentimentAggregator::new();
        for (symbol, sector, trades) in right {
            b.record(symbol, *sector, trades);
        }
        b.merge(&a);

        assert_eq!(forward, reversed);
        assert_eq!(forward, b);
    }

    #[test]
    fn test_top_sectors_by_notional() {
        let mut agg = SentimentAggregator::new();
        agg.record(
            "AAPL",
            Some("Technology"),
            &[whale("AAPL", dec!(2000000), Side::Buy, Tier::Notable)],
        );
        agg.record(
            "XOM",
            Some("Energy"),
            &[whale("XOM", dec!(9000000), Side::Sell, Tier::Large)],
        );
        agg.record("JPM", Some("Financials"), &[]);
        assert_eq!(agg.top_sectors(5), vec!["Energy", "Technology"]);
        assert_eq!(agg.top_sectors(1), vec!["Energy"]);
    }
}
