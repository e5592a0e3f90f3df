//! Tiering, flags and direction for detected sweeps.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::BTreeSet;
use whale_watch_core::{
    ClassifiedTrade, Direction, DteBucket, Flag, Instrument, Moneyness, MoneynessClass,
    OptionFlagConfig, OptionRight, Sweep, ThresholdSet,
};

/// Moneyness from `strike / underlying` with an at-the-money band.
///
/// Calls above `1 + band` are out of the money, below `1 - band` in the money;
/// puts are mirrored. Without an underlying price the class is `Unknown`.
#[must_use]
pub fn moneyness(
    strike: Decimal,
    underlying_price: Option<Decimal>,
    right: OptionRight,
    band: f64,
) -> Moneyness {
    let ratio = underlying_price
        .filter(|p| *p > Decimal::ZERO)
        .and_then(|p| (strike / p).to_f64());

    let Some(ratio) = ratio else {
        return Moneyness {
            class: MoneynessClass::Unknown,
            ratio: None,
        };
    };

    let class = if ratio > 1.0 + band {
        match right {
            OptionRight::Call => MoneynessClass::Otm,
            OptionRight::Put => MoneynessClass::Itm,
        }
    } else if ratio < 1.0 - band {
        match right {
            OptionRight::Call => MoneynessClass::Itm,
            OptionRight::Put => MoneynessClass::Otm,
        }
    } else {
        MoneynessClass::Atm
    };

    Moneyness {
        class,
        ratio: Some(ratio),
    }
}

/// Classified sweeps for one security plus the count that fell short of `notable`.
#[derive(Debug, Clone, Default)]
pub struct Classification {
    pub trades: Vec<ClassifiedTrade>,
    pub below_threshold: usize,
}

/// Assigns tiers, flags and direction.
#[derive(Debug, Clone, Default)]
pub struct TradeClassifier {
    flags: OptionFlagConfig,
}

impl TradeClassifier {
    pub fn new(flags: OptionFlagConfig) -> Self {
        Self { flags }
    }

    /// Classifies one sweep; `None` when it is below the notable boundary.
    #[must_use]
    pub fn classify(&self, sweep: Sweep, thresholds: &ThresholdSet) -> Option<ClassifiedTrade> {
        let tier = thresholds.tier_for(sweep.total_notional)?;
        let direction = Direction::from_side(sweep.side, sweep.instrument.option_right());

        let mut flags = BTreeSet::new();
        if sweep.is_sweep {
            flags.insert(Flag::Sweep);
        }
        if sweep.venue_count > 1 {
            flags.insert(Flag::MultiVenue);
        }
        if sweep.any_above_ask() {
            flags.insert(Flag::AboveAsk);
        }
        if sweep.any_below_bid() {
            flags.insert(Flag::BelowBid);
        }

        let (dte_bucket, moneyness) = match &sweep.instrument {
            Instrument::Equity => {
                if sweep.any_dark_pool() {
                    flags.insert(Flag::DarkPool);
                }
                (None, None)
            }
            Instrument::Option {
                contract,
                days_to_expiration,
                underlying_price,
                open_interest,
            } => {
                let dte = *days_to_expiration;
                if dte <= self.flags.near_expiration_days {
                    flags.insert(Flag::NearExpiration);
                }
                if dte == 0 {
                    flags.insert(Flag::ZeroDte);
                }

                let m = moneyness(
                    contract.strike,
                    *underlying_price,
                    contract.right,
                    self.flags.atm_band,
                );
                if m.ratio.is_some_and(|r| (r - 1.0).abs() >= self.flags.deep_band) {
                    flags.insert(Flag::DeepMoneyness);
                }

                if let Some(oi) = open_interest.filter(|oi| *oi > 0) {
                    let vol_oi = sweep.total_size as f64 / oi as f64;
                    if vol_oi >= self.flags.high_vol_oi {
                        flags.insert(Flag::HighVolOi);
                    } else if vol_oi >= self.flags.notable_vol_oi {
                        flags.insert(Flag::NotableVolOi);
                    }
                }

                (Some(DteBucket::from_days(dte)), Some(m))
            }
        };

        Some(ClassifiedTrade {
            sweep,
            tier,
            flags,
            direction,
            dte_bucket,
            moneyness,
        })
    }

    /// Classifies every sweep, largest notional first.
    #[must_use]
    pub fn classify_all(&self, sweeps: Vec<Sweep>, thresholds: &ThresholdSet) -> Classification {
        let mut out = Classification::default();
        for sweep in sweeps {
            match self.classify(sweep, thresholds) {
                Some(trade) => out.trades.push(trade),
                None => out.below_threshold += 1,
            }
        }
        out.trades
            .sort_by(|a, b| b.notional().cmp(&a.notional()));
        out
    }
}
