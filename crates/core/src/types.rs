//! Canonical domain types shared by the scanner, the detector stages and the reports.
//!
//! Everything downstream of normalization speaks in [`TradeEvent`]s; the detector
//! groups them into [`Sweep`]s and the classifier wraps each sweep in a
//! [`ClassifiedTrade`].

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;

// =============================================================================
// Constants
// =============================================================================

/// Contract multiplier for US listed equity options.
pub const OPTION_CONTRACT_MULTIPLIER: u32 = 100;

/// Exchange code of the FINRA ADF, where off-exchange ("dark pool") prints are reported.
pub const DARK_POOL_VENUE: &str = "D";

/// Venue recorded when the provider omits the exchange code.
pub const UNKNOWN_VENUE: &str = "unknown";

// =============================================================================
// Asset Class
// =============================================================================

/// Which engine instantiation a run belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetClass {
    Equity,
    Option,
}

impl AssetClass {
    /// Prefix used for the output file names (`stock_whale_summary.json`, ...).
    #[must_use]
    pub fn file_prefix(&self) -> &'static str {
        match self {
            Self::Equity => "stock",
            Self::Option => "options",
        }
    }
}

impl fmt::Display for AssetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equity => write!(f, "equity"),
            Self::Option => write!(f, "option"),
        }
    }
}

// =============================================================================
// Side / Direction
// =============================================================================

/// Aggressor side inferred from where a print landed in the prevailing quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Buy,
    Sell,
    Unknown,
}

impl Side {
    /// Unanimous side among the known sides, `Unknown` when they disagree or none is known.
    pub fn unanimous<I: IntoIterator<Item = Side>>(sides: I) -> Side {
        let mut agreed: Option<Side> = None;
        for side in sides {
            if side == Side::Unknown {
                continue;
            }
            match agreed {
                None => agreed = Some(side),
                Some(prev) if prev != side => return Side::Unknown,
                Some(_) => {}
            }
        }
        agreed.unwrap_or(Side::Unknown)
    }
}

/// Directional reading of a trade for sentiment purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Bullish,
    Bearish,
    Neutral,
}

impl Direction {
    /// Maps an aggressor side (and the option right, if any) to a direction.
    ///
    /// Bought calls and sold puts are bullish; sold calls and bought puts are bearish.
    #[must_use]
    pub fn from_side(side: Side, right: Option<OptionRight>) -> Self {
        match (side, right) {
            (Side::Unknown, _) => Self::Neutral,
            (Side::Buy, None | Some(OptionRight::Call)) => Self::Bullish,
            (Side::Sell, None | Some(OptionRight::Call)) => Self::Bearish,
            (Side::Buy, Some(OptionRight::Put)) => Self::Bearish,
            (Side::Sell, Some(OptionRight::Put)) => Self::Bullish,
        }
    }
}

// =============================================================================
// Options
// =============================================================================

/// Option right (call or put).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionRight {
    Call,
    Put,
}

impl OptionRight {
    /// Parses the single-letter OCC code.
    #[must_use]
    pub fn from_code(code: char) -> Option<Self> {
        match code {
            'C' => Some(Self::Call),
            'P' => Some(Self::Put),
            _ => None,
        }
    }
}

impl fmt::Display for OptionRight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Call => write!(f, "C"),
            Self::Put => write!(f, "P"),
        }
    }
}

/// A listed option contract decoded from its OCC symbol.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OptionContract {
    /// Full OCC symbol, e.g. `AAPL251219C00275000`.
    pub occ_symbol: String,
    pub underlying: String,
    pub expiration: NaiveDate,
    pub strike: Decimal,
    pub right: OptionRight,
}

/// What a trade was printed on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Instrument {
    Equity,
    Option {
        contract: OptionContract,
        days_to_expiration: i64,
        underlying_price: Option<Decimal>,
        open_interest: Option<u64>,
    },
}

impl Instrument {
    /// Notional multiplier: 1 for shares, 100 for option contracts.
    #[must_use]
    pub fn multiplier(&self) -> Decimal {
        match self {
            Self::Equity => Decimal::ONE,
            Self::Option { .. } => Decimal::from(OPTION_CONTRACT_MULTIPLIER),
        }
    }

    #[must_use]
    pub fn option_right(&self) -> Option<OptionRight> {
        match self {
            Self::Equity => None,
            Self::Option { contract, .. } => Some(contract.right),
        }
    }

    #[must_use]
    pub fn asset_class(&self) -> AssetClass {
        match self {
            Self::Equity => AssetClass::Equity,
            Self::Option { .. } => AssetClass::Option,
        }
    }
}

// =============================================================================
// Trade Event
// =============================================================================

/// One normalized print.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeEvent {
    /// Ticker of the security (the underlying for options).
    pub symbol: String,
    pub instrument: Instrument,
    pub timestamp: DateTime<Utc>,
    pub price: Decimal,
    pub size: u64,
    pub venue: String,
    /// `price * size * multiplier`.
    pub notional: Decimal,
    pub side: Side,
    /// Position of the price in the prevailing spread (0 = bid, 1 = ask).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quote_position: Option<f64>,
}

impl TradeEvent {
    /// Creates an event, deriving the notional from the instrument's multiplier.
    pub fn new(
        symbol: impl Into<String>,
        instrument: Instrument,
        timestamp: DateTime<Utc>,
        price: Decimal,
        size: u64,
        venue: impl Into<String>,
        side: Side,
    ) -> Self {
        let notional = price * Decimal::from(size) * instrument.multiplier();
        Self {
            symbol: symbol.into(),
            instrument,
            timestamp,
            price,
            size,
            venue: venue.into(),
            notional,
            side,
            quote_position: None,
        }
    }

    /// Attaches the spread position used for side inference.
    #[must_use]
    pub fn with_quote_position(mut self, position: Option<f64>) -> Self {
        self.quote_position = position;
        self
    }

    /// Key identifying the instrument: the OCC symbol for options, the ticker otherwise.
    #[must_use]
    pub fn instrument_key(&self) -> &str {
        match &self.instrument {
            Instrument::Equity => &self.symbol,
            Instrument::Option { contract, .. } => &contract.occ_symbol,
        }
    }

    #[must_use]
    pub fn is_dark_pool(&self) -> bool {
        self.venue == DARK_POOL_VENUE
    }
}

// =============================================================================
// Sweep
// =============================================================================

/// Inclusive price range covered by a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceRange {
    pub low: Decimal,
    pub high: Decimal,
}

/// A cluster of prints on one instrument inside one clustering window.
///
/// A single-print cluster is a degenerate sweep with `is_sweep == false`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sweep {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub symbol: String,
    pub instrument: Instrument,
    pub events: Vec<TradeEvent>,
    pub total_size: u64,
    pub total_notional: Decimal,
    pub venue_count: usize,
    pub price_range: PriceRange,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub print_count: usize,
    pub side: Side,
    pub is_sweep: bool,
}

impl Sweep {
    /// Builds the aggregate view of a non-empty, time-ordered event list.
    ///
    /// Returns `None` for an empty list.
    #[must_use]
    pub fn from_events(events: Vec<TradeEvent>) -> Option<Self> {
        let first = events.first()?;
        let symbol = first.symbol.clone();
        let instrument = first.instrument.clone();
        let start_time = first.timestamp;

        let mut total_size = 0u64;
        let mut total_notional = Decimal::ZERO;
        let mut low = first.price;
        let mut high = first.price;
        let mut end_time = first.timestamp;
        let mut venues = HashSet::new();

        for event in &events {
            total_size = total_size.saturating_add(event.size);
            total_notional += event.notional;
            low = low.min(event.price);
            high = high.max(event.price);
            end_time = end_time.max(event.timestamp);
            venues.insert(event.venue.as_str());
        }

        let venue_count = venues.len();
        let side = Side::unanimous(events.iter().map(|e| e.side));
        let print_count = events.len();

        Some(Self {
            id: None,
            symbol,
            instrument,
            events,
            total_size,
            total_notional,
            venue_count,
            price_range: PriceRange { low, high },
            start_time,
            end_time,
            print_count,
            side,
            is_sweep: false,
        })
    }

    #[must_use]
    pub fn any_dark_pool(&self) -> bool {
        self.events.iter().any(TradeEvent::is_dark_pool)
    }

    /// True when any print landed above the ask.
    #[must_use]
    pub fn any_above_ask(&self) -> bool {
        self.events
            .iter()
            .any(|e| e.quote_position.is_some_and(|p| p > 1.0))
    }

    /// True when any print landed below the bid.
    #[must_use]
    pub fn any_below_bid(&self) -> bool {
        self.events
            .iter()
            .any(|e| e.quote_position.is_some_and(|p| p < 0.0))
    }
}

// =============================================================================
// Classification
// =============================================================================

/// Size tier, ordered from smallest to largest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Notable,
    Large,
    Mega,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Notable, Tier::Large, Tier::Mega];
}

/// Qualitative markers attached to a classified trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Flag {
    Sweep,
    MultiVenue,
    DarkPool,
    AboveAsk,
    BelowBid,
    NearExpiration,
    ZeroDte,
    DeepMoneyness,
    HighVolOi,
    NotableVolOi,
}

/// Days-to-expiration bucket for options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DteBucket {
    #[serde(rename = "0dte")]
    ZeroDte,
    #[serde(rename = "1_7_days")]
    UpToWeek,
    #[serde(rename = "8_30_days")]
    UpToMonth,
    #[serde(rename = "31_90_days")]
    UpToQuarter,
    #[serde(rename = "90_plus")]
    Long,
}

impl DteBucket {
    #[must_use]
    pub fn from_days(days: i64) -> Self {
        match days {
            i64::MIN..=0 => Self::ZeroDte,
            1..=7 => Self::UpToWeek,
            8..=30 => Self::UpToMonth,
            31..=90 => Self::UpToQuarter,
            _ => Self::Long,
        }
    }

    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::ZeroDte => "0dte",
            Self::UpToWeek => "1_7_days",
            Self::UpToMonth => "8_30_days",
            Self::UpToQuarter => "31_90_days",
            Self::Long => "90_plus",
        }
    }
}

/// In/at/out of the money.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoneynessClass {
    Itm,
    Atm,
    Otm,
    /// Underlying price not available.
    Unknown,
}

/// Moneyness class plus the strike / underlying ratio it was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Moneyness {
    pub class: MoneynessClass,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ratio: Option<f64>,
}

/// Per-security tier boundaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdSet {
    /// Adaptive cutoff found by the threshold search (before floors).
    pub base: Decimal,
    pub notable: Decimal,
    pub large: Decimal,
    pub mega: Decimal,
    /// Ticker size multiplier applied to the floors.
    pub multiplier: Decimal,
    /// Number of candidate events the search ran over.
    pub population: usize,
    pub target_count: usize,
}

impl ThresholdSet {
    /// Tier for a notional; lower bounds are inclusive. `None` below `notable`.
    #[must_use]
    pub fn tier_for(&self, notional: Decimal) -> Option<Tier> {
        if notional >= self.mega {
            Some(Tier::Mega)
        } else if notional >= self.large {
            Some(Tier::Large)
        } else if notional >= self.notable {
            Some(Tier::Notable)
        } else {
            None
        }
    }
}

/// A sweep that cleared the notable boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedTrade {
    pub sweep: Sweep,
    pub tier: Tier,
    pub flags: BTreeSet<Flag>,
    pub direction: Direction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dte_bucket: Option<DteBucket>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub moneyness: Option<Moneyness>,
}

impl ClassifiedTrade {
    #[must_use]
    pub fn notional(&self) -> Decimal {
        self.sweep.total_notional
    }

    #[must_use]
    pub fn has_flag(&self, flag: Flag) -> bool {
        self.flags.contains(&flag)
    }
}
