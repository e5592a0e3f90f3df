use crate::rate_limiter::{duration_millis, RateLimiterConfig};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Configuration validation failure.
#[derive(Debug, Error)]
#[error("invalid configuration: {field}: {reason}")]
pub struct ConfigError {
    pub field: &'static str,
    pub reason: String,
}

impl ConfigError {
    fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub provider: ProviderConfig,
    pub rate_limit: RateLimiterConfig,
    pub retry: RetryConfig,
    pub scan: ScanConfig,
    pub equities: DetectionConfig,
    pub options: DetectionConfig,
    pub option_flags: OptionFlagConfig,
    pub ticker_size: TickerSizeConfig,
    /// Extra `ticker = "sector"` assignments layered over the bundled table.
    pub sectors: BTreeMap<String, String>,
    pub output: OutputConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            provider: ProviderConfig::default(),
            rate_limit: RateLimiterConfig::default(),
            retry: RetryConfig::default(),
            scan: ScanConfig::default(),
            equities: DetectionConfig::equities(),
            options: DetectionConfig::options(),
            option_flags: OptionFlagConfig::default(),
            ticker_size: TickerSizeConfig::default(),
            sectors: BTreeMap::new(),
            output: OutputConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    /// Records requested per page.
    pub page_limit: u32,
    /// Pages followed per listing before the rest is left unfetched.
    pub max_pages: usize,
    /// Contracts per option-trades request (provider maximum is 100).
    pub option_symbols_per_request: usize,
    /// Options data feed (`indicative` or `opra`).
    pub options_feed: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://data.alpaca.markets".to_string(),
            timeout_secs: 30,
            page_limit: 10_000,
            max_pages: 10,
            option_symbols_per_request: 100,
            options_feed: "indicative".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries for transient failures before a security is marked failed.
    pub max_retries: u32,
    #[serde(with = "duration_millis")]
    pub initial_backoff: Duration,
    #[serde(with = "duration_millis")]
    pub max_backoff: Duration,
    /// Full pause after an upstream 429.
    #[serde(with = "duration_millis")]
    pub rate_limit_cooldown: Duration,
    /// Cooldowns allowed per request before giving up.
    pub max_rate_limit_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            rate_limit_cooldown: Duration::from_secs(60),
            max_rate_limit_retries: 5,
        }
    }
}

impl RetryConfig {
    /// Exponential backoff for the given (zero-based) retry attempt, capped at `max_backoff`.
    #[must_use]
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(16));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub lookback_trading_days: u32,
    /// Securities fetched concurrently.
    pub concurrency: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            lookback_trading_days: 5,
            concurrency: 1,
        }
    }
}

/// Threshold, sweep and side-inference parameters for one asset class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Whale trades wanted per security.
    pub target_count: usize,
    /// Fewer normalized events than this is insufficient data.
    pub min_events: usize,
    /// Absolute notional floor for the notable tier (before the size multiplier).
    pub floor_notional: Decimal,
    pub large_factor: Decimal,
    pub mega_factor: Decimal,
    pub large_floor: Decimal,
    pub mega_floor: Decimal,
    /// Step added to the maximum when ties at the top defeat the search.
    pub resolution: Decimal,
    #[serde(with = "duration_millis")]
    pub sweep_window: Duration,
    /// Relative price tolerance for merging prints into a sweep.
    pub price_tolerance: Decimal,
    /// Size at which a single-venue cluster still counts as a sweep.
    pub min_sweep_size: u64,
    /// Loose pre-filter deciding whether quotes are worth fetching.
    pub candidate_min_size: u64,
    pub candidate_min_notional: Decimal,
    /// Spread position at or above which a print is a buy.
    pub near_ask: f64,
    /// Spread position at or below which a print is a sell.
    pub near_bid: f64,
    /// Quotes further than this from a print (either direction) leave its side unknown.
    #[serde(with = "duration_millis")]
    pub max_quote_age: Duration,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self::equities()
    }
}

impl DetectionConfig {
    /// Equity defaults: $1M floor, 5K-share candidate filter.
    #[must_use]
    pub fn equities() -> Self {
        Self {
            target_count: 10,
            min_events: 5,
            floor_notional: Decimal::from(1_000_000),
            large_factor: Decimal::from(2),
            mega_factor: Decimal::from(5),
            large_floor: Decimal::from(5_000_000),
            mega_floor: Decimal::from(25_000_000),
            resolution: Decimal::new(1, 2),
            sweep_window: Duration::from_secs(2),
            price_tolerance: Decimal::new(5, 3),
            min_sweep_size: 10_000,
            candidate_min_size: 5_000,
            candidate_min_notional: Decimal::from(1_000_000),
            near_ask: 0.7,
            near_bid: 0.3,
            max_quote_age: Duration::from_secs(5),
        }
    }

    /// Option defaults: $100K premium floor, $250K large floor.
    #[must_use]
    pub fn options() -> Self {
        Self {
            floor_notional: Decimal::from(100_000),
            large_floor: Decimal::from(250_000),
            mega_floor: Decimal::from(1_000_000),
            price_tolerance: Decimal::new(1, 2),
            min_sweep_size: 100,
            candidate_min_size: 0,
            candidate_min_notional: Decimal::from(100_000),
            max_quote_age: Duration::from_secs(60),
            ..Self::equities()
        }
    }

    #[must_use]
    pub fn with_target_count(mut self, target_count: usize) -> Self {
        self.target_count = target_count;
        self
    }

    #[must_use]
    pub fn with_floor_notional(mut self, floor: Decimal) -> Self {
        self.floor_notional = floor;
        self
    }

    #[must_use]
    pub fn with_min_events(mut self, min_events: usize) -> Self {
        self.min_events = min_events;
        self
    }

    fn validate(&self, section: &'static str) -> Result<(), ConfigError> {
        if self.target_count == 0 {
            return Err(ConfigError::new(section, "target_count must be at least 1"));
        }
        if self.large_factor < Decimal::ONE || self.mega_factor < self.large_factor {
            return Err(ConfigError::new(
                section,
                "tier factors must satisfy 1 <= large_factor <= mega_factor",
            ));
        }
        if self.floor_notional.is_sign_negative()
            || self.large_floor < self.floor_notional
            || self.mega_floor < self.large_floor
        {
            return Err(ConfigError::new(
                section,
                "floors must satisfy 0 <= floor_notional <= large_floor <= mega_floor",
            ));
        }
        if self.resolution <= Decimal::ZERO {
            return Err(ConfigError::new(section, "resolution must be positive"));
        }
        if self.price_tolerance.is_sign_negative() {
            return Err(ConfigError::new(section, "price_tolerance must not be negative"));
        }
        if !(0.0..=1.0).contains(&self.near_bid)
            || !(0.0..=1.0).contains(&self.near_ask)
            || self.near_bid >= self.near_ask
        {
            return Err(ConfigError::new(
                section,
                "side inference bounds must satisfy 0 <= near_bid < near_ask <= 1",
            ));
        }
        if self.max_quote_age.is_zero() {
            return Err(ConfigError::new(section, "max_quote_age must be positive"));
        }
        Ok(())
    }
}

/// Option-only classification parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptionFlagConfig {
    /// Half-width of the at-the-money band around a strike/spot ratio of 1.
    pub atm_band: f64,
    /// |strike/spot - 1| at or beyond which a contract is deep in/out of the money.
    pub deep_band: f64,
    pub near_expiration_days: i64,
    pub high_vol_oi: f64,
    pub notable_vol_oi: f64,
    /// Drop in-the-money contracts before detection.
    pub exclude_itm: bool,
}

impl Default for OptionFlagConfig {
    fn default() -> Self {
        Self {
            atm_band: 0.02,
            deep_band: 0.15,
            near_expiration_days: 7,
            high_vol_oi: 0.20,
            notable_vol_oi: 0.05,
            exclude_itm: true,
        }
    }
}

/// Ticker size classes scale the absolute floors (bigger names need bigger prints).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TickerSizeConfig {
    pub default_class: String,
    /// Size class → floor multiplier.
    pub multipliers: BTreeMap<String, Decimal>,
    /// Ticker → size class.
    pub classes: BTreeMap<String, String>,
}

impl Default for TickerSizeConfig {
    fn default() -> Self {
        let multipliers = [
            ("mega_cap", Decimal::from(3)),
            ("large_cap", Decimal::new(15, 1)),
            ("mid", Decimal::ONE),
            ("small", Decimal::new(5, 1)),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        let classes = [
            "AAPL", "MSFT", "NVDA", "AMZN", "GOOGL", "GOOG", "META", "TSLA", "AVGO", "BRK-B",
        ]
        .into_iter()
        .map(|t| (t.to_string(), "mega_cap".to_string()))
        .collect();

        Self {
            default_class: "mid".to_string(),
            multipliers,
            classes,
        }
    }
}

impl TickerSizeConfig {
    /// Floor multiplier for a ticker; unknown tickers and classes use 1.
    #[must_use]
    pub fn multiplier_for(&self, ticker: &str) -> Decimal {
        let class = self
            .classes
            .get(ticker)
            .unwrap_or(&self.default_class);
        self.multipliers.get(class).copied().unwrap_or(Decimal::ONE)
    }

    /// Every ticker falls back to the default class.
    #[must_use]
    pub fn uniform() -> Self {
        Self {
            classes: BTreeMap::new(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub pretty: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("output"),
            pretty: true,
        }
    }
}

impl AppConfig {
    /// Checks cross-field constraints.
    ///
    /// # Errors
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rate_limit.max_calls == 0 {
            return Err(ConfigError::new("rate_limit.max_calls", "must be at least 1"));
        }
        if self.rate_limit.window.is_zero() {
            return Err(ConfigError::new("rate_limit.window", "must be positive"));
        }
        if self.retry.rate_limit_cooldown < self.rate_limit.window {
            return Err(ConfigError::new(
                "retry.rate_limit_cooldown",
                "must be at least the rate limit window",
            ));
        }
        if self.scan.concurrency == 0 {
            return Err(ConfigError::new("scan.concurrency", "must be at least 1"));
        }
        if self.scan.lookback_trading_days == 0 {
            return Err(ConfigError::new("scan.lookback_trading_days", "must be at least 1"));
        }
        if !(1..=100).contains(&self.provider.option_symbols_per_request) {
            return Err(ConfigError::new(
                "provider.option_symbols_per_request",
                "must be between 1 and 100",
            ));
        }
        if self.provider.max_pages == 0 {
            return Err(ConfigError::new("provider.max_pages", "must be at least 1"));
        }
        if self.provider.timeout_secs == 0 {
            return Err(ConfigError::new("provider.timeout_secs", "must be positive"));
        }
        self.equities.validate("equities")?;
        self.options.validate("options")?;

        let flags = &self.option_flags;
        if flags.atm_band < 0.0 || flags.deep_band < flags.atm_band {
            return Err(ConfigError::new(
                "option_flags",
                "bands must satisfy 0 <= atm_band <= deep_band",
            ));
        }
        if flags.notable_vol_oi > flags.high_vol_oi {
            return Err(ConfigError::new(
                "option_flags",
                "notable_vol_oi must not exceed high_vol_oi",
            ));
        }
        Ok(())
    }

    /// Detection parameters for an asset class.
    #[must_use]
    pub fn detection(&self, asset: crate::types::AssetClass) -> &DetectionConfig {
        match asset {
            crate::types::AssetClass::Equity => &self.equities,
            crate::types::AssetClass::Option => &self.options,
        }
    }
}
