//! Core types, traits and shared infrastructure for whale trade detection.
//!
//! - [`types`]: canonical trade events, sweeps and classifications
//! - [`raw`]: provider records before normalization
//! - [`traits`]: the [`TradeSource`] and [`Sleeper`] seams
//! - [`rate_limiter`]: sliding-window quota shared by scan workers
//! - [`calendar`]: NYSE trading days for lookback windows
//! - [`universe`]: bundled ticker universes and the sector table
//! - [`config`] / [`config_loader`]: layered configuration

pub mod calendar;
pub mod config;
pub mod config_loader;
pub mod error;
pub mod rate_limiter;
pub mod raw;
pub mod traits;
pub mod types;
pub mod universe;

pub use config::{
    AppConfig, ConfigError, DetectionConfig, OptionFlagConfig, OutputConfig, ProviderConfig,
    RetryConfig, ScanConfig, TickerSizeConfig,
};
pub use config_loader::ConfigLoader;
pub use error::{ProviderError, Result};
pub use rate_limiter::{RateLimiter, RateLimiterConfig};
pub use raw::{
    ChainContract, EquityBatch, OptionsBatch, Page, RawBatch, RawOptionTrade, RawQuote, RawTrade,
    TimeWindow,
};
pub use traits::{Sleeper, TokioSleeper, TradeSource};
pub use types::{
    AssetClass, ClassifiedTrade, Direction, DteBucket, Flag, Instrument, Moneyness,
    MoneynessClass, OptionContract, OptionRight, PriceRange, Side, Sweep, ThresholdSet, Tier,
    TradeEvent,
};
pub use universe::{SectorMap, UniverseError};
