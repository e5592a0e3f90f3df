use crate::error::Result;
use crate::raw::{ChainContract, Page, RawOptionTrade, RawQuote, RawTrade, TimeWindow};
use async_trait::async_trait;
use std::time::Duration;

/// A market-data provider the scanner can pull trades from.
///
/// Listing calls are paginated: pass the previous page's `next_page_token`
/// to continue, `None` to start.
#[async_trait]
pub trait TradeSource: Send + Sync {
    /// Equity trade prints for `symbol` within `window`.
    async fn equity_trades(
        &self,
        symbol: &str,
        window: TimeWindow,
        page_token: Option<&str>,
    ) -> Result<Page<RawTrade>>;

    /// Equity quotes for `symbol` within `window`.
    async fn equity_quotes(
        &self,
        symbol: &str,
        window: TimeWindow,
        page_token: Option<&str>,
    ) -> Result<Page<RawQuote>>;

    /// Last traded price, `None` when the provider has no trade on record.
    async fn latest_price(&self, symbol: &str) -> Result<Option<f64>>;

    /// Option chain snapshot for an underlying.
    async fn option_chain(
        &self,
        underlying: &str,
        page_token: Option<&str>,
    ) -> Result<Page<ChainContract>>;

    /// Trade prints for a batch of option contracts within `window`.
    async fn option_trades(
        &self,
        contracts: &[String],
        window: TimeWindow,
        page_token: Option<&str>,
    ) -> Result<Page<RawOptionTrade>>;

    /// Whether the provider can serve this ticker at all.
    fn supports(&self, _symbol: &str) -> bool {
        true
    }

    fn name(&self) -> &str;
}

/// Async sleep, injectable so retry and cooldown paths can be tested without waiting.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// [`Sleeper`] backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
