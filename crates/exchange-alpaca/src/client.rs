//! Alpaca market data REST client.
//!
//! Typed access to the stock trades/quotes endpoints (v2) and the option
//! snapshot/trades endpoints (v1beta1). Request pacing is the caller's job: the
//! scanner owns a shared [`RateLimiter`](whale_watch_core::RateLimiter) and
//! acquires a slot before every call made through [`TradeSource`].
//!
//! # Example
//!
//! ```ignore
//! use whale_watch_alpaca::{AlpacaClient, AlpacaClientConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = AlpacaClient::from_env(AlpacaClientConfig::default())?;
//!     let price = client.get_latest_trade("AAPL").await?;
//!     println!("AAPL last: {:?}", price.and_then(|t| t.price));
//!     Ok(())
//! }
//! ```

use crate::error::{AlpacaError, Result};
use crate::symbols;
use async_trait::async_trait;
use chrono::SecondsFormat;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::debug;
use whale_watch_core::{
    ChainContract, Page, ProviderConfig, ProviderError, RawOptionTrade, RawQuote, RawTrade,
    TimeWindow, TradeSource,
};

// =============================================================================
// Constants
// =============================================================================

/// Alpaca market data base URL.
pub const ALPACA_DATA_URL: &str = "https://data.alpaca.markets";

/// Primary credential variables.
pub const API_KEY_ENV: &str = "ALPACA_API_KEY";
pub const API_SECRET_ENV: &str = "ALPACA_API_SECRET";

/// Fallback credential variables (Alpaca SDK naming).
pub const API_KEY_ENV_FALLBACK: &str = "APCA_API_KEY_ID";
pub const API_SECRET_ENV_FALLBACK: &str = "APCA_API_SECRET_KEY";

/// Largest page the snapshot endpoint accepts.
const MAX_SNAPSHOT_LIMIT: u32 = 1000;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the Alpaca client.
#[derive(Debug, Clone)]
pub struct AlpacaClientConfig {
    /// Base URL for the API.
    pub base_url: String,

    /// Request timeout in seconds.
    pub timeout_secs: u64,

    /// Records requested per page.
    pub page_limit: u32,

    /// Options feed (`indicative` or `opra`).
    pub options_feed: String,
}

impl Default for AlpacaClientConfig {
    fn default() -> Self {
        Self {
            base_url: ALPACA_DATA_URL.to_string(),
            timeout_secs: 30,
            page_limit: 10_000,
            options_feed: "indicative".to_string(),
        }
    }
}

impl From<&ProviderConfig> for AlpacaClientConfig {
    fn from(config: &ProviderConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            timeout_secs: config.timeout_secs,
            page_limit: config.page_limit,
            options_feed: config.options_feed.clone(),
        }
    }
}

impl AlpacaClientConfig {
    /// Sets the base URL.
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Sets the page size.
    #[must_use]
    pub fn with_page_limit(mut self, limit: u32) -> Self {
        self.page_limit = limit;
        self
    }
}

/// API key pair.
#[derive(Clone)]
pub struct Credentials {
    key_id: String,
    secret: SecretString,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

impl Credentials {
    pub fn new(key_id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            key_id: key_id.into(),
            secret: SecretString::from(secret.into()),
        }
    }

    /// Reads the key pair from the environment, trying the fallback names second.
    ///
    /// # Errors
    /// Returns a configuration error naming the missing variable.
    pub fn from_env() -> Result<Self> {
        let read = |primary: &str, fallback: &str| {
            std::env::var(primary)
                .or_else(|_| std::env::var(fallback))
                .ok()
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| {
                    AlpacaError::Configuration(format!(
                        "missing environment variable: {primary} (or {fallback})"
                    ))
                })
        };
        let key_id = read(API_KEY_ENV, API_KEY_ENV_FALLBACK)?;
        let secret = read(API_SECRET_ENV, API_SECRET_ENV_FALLBACK)?;
        Ok(Self::new(key_id, secret))
    }
}

// =============================================================================
// API Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct RawTradesResponse {
    #[serde(default)]
    trades: Option<Vec<RawTrade>>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawQuotesResponse {
    #[serde(default)]
    quotes: Option<Vec<RawQuote>>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawLatestTradeResponse {
    #[serde(default)]
    trade: Option<RawTrade>,
}

#[derive(Debug, Deserialize)]
struct RawSnapshot {
    #[serde(rename = "latestQuote", default)]
    latest_quote: Option<RawQuote>,
}

#[derive(Debug, Deserialize)]
struct RawSnapshotsResponse {
    #[serde(default)]
    snapshots: Option<BTreeMap<String, RawSnapshot>>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawOptionTradesResponse {
    #[serde(default)]
    trades: Option<BTreeMap<String, Vec<RawTrade>>>,
    #[serde(default)]
    next_page_token: Option<String>,
}

impl RawSnapshot {
    fn into_contract(self, symbol: String) -> ChainContract {
        // Alpaca does not publish open interest; displayed quote depth stands in for it.
        let open_interest = self
            .latest_quote
            .as_ref()
            .map(|q| q.bid_size.unwrap_or(0) + q.ask_size.unwrap_or(0))
            .filter(|depth| *depth > 0);
        ChainContract {
            symbol,
            latest_quote: self.latest_quote,
            open_interest,
        }
    }
}

// =============================================================================
// Client
// =============================================================================

/// Alpaca market data client.
pub struct AlpacaClient {
    config: AlpacaClientConfig,
    http: Client,
    credentials: Credentials,
}

impl std::fmt::Debug for AlpacaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlpacaClient")
            .field("base_url", &self.config.base_url)
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}

impl AlpacaClient {
    /// Creates a new client.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(config: AlpacaClientConfig, credentials: Credentials) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AlpacaError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            config,
            http,
            credentials,
        })
    }

    /// Creates a client with credentials from the environment.
    ///
    /// # Errors
    /// Returns error if credentials are missing or the HTTP client cannot be built.
    pub fn from_env(config: AlpacaClientConfig) -> Result<Self> {
        Self::new(config, Credentials::from_env()?)
    }

    /// Returns the base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Rejects symbols that would escape the URL path segment.
    fn validate_symbol(symbol: &str) -> Result<&str> {
        let valid = !symbol.is_empty()
            && symbol.len() <= 32
            && symbol
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');
        if valid && !symbol.contains("..") {
            Ok(symbol)
        } else {
            Err(AlpacaError::UnsupportedSymbol(symbol.to_string()))
        }
    }

    fn window_params(window: TimeWindow) -> [(&'static str, String); 2] {
        [
            ("start", window.start.to_rfc3339_opts(SecondsFormat::Secs, true)),
            ("end", window.end.to_rfc3339_opts(SecondsFormat::Secs, true)),
        ]
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let url = format!("{}{}", self.config.base_url, path);
        debug!(url = %url, params = query.len(), "GET");

        let response = self
            .http
            .get(&url)
            .header("APCA-API-KEY-ID", &self.credentials.key_id)
            .header(
                "APCA-API-SECRET-KEY",
                self.credentials.secret.expose_secret(),
            )
            .query(query)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Handles API response, checking for errors.
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(60);
            return Err(AlpacaError::rate_limit(retry_after));
        }

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AlpacaError::api(status.as_u16(), text));
        }

        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    // =========================================================================
    // Stock Endpoints
    // =========================================================================

    /// Gets one page of stock trades.
    ///
    /// # Errors
    /// Returns error if the API call fails.
    pub async fn get_stock_trades(
        &self,
        symbol: &str,
        window: TimeWindow,
        page_token: Option<&str>,
    ) -> Result<Page<RawTrade>> {
        let symbol = Self::validate_symbol(symbol)?;
        let mut query: Vec<(&str, String)> = Self::window_params(window).into();
        query.push(("limit", self.config.page_limit.to_string()));
        query.push(("sort", "asc".to_string()));
        if let Some(token) = page_token {
            query.push(("page_token", token.to_string()));
        }

        let raw: RawTradesResponse = self
            .get(&format!("/v2/stocks/{symbol}/trades"), &query)
            .await?;
        Ok(Page {
            items: raw.trades.unwrap_or_default(),
            next_page_token: raw.next_page_token,
        })
    }

    /// Gets one page of stock quotes.
    ///
    /// # Errors
    /// Returns error if the API call fails.
    pub async fn get_stock_quotes(
        &self,
        symbol: &str,
        window: TimeWindow,
        page_token: Option<&str>,
    ) -> Result<Page<RawQuote>> {
        let symbol = Self::validate_symbol(symbol)?;
        let mut query: Vec<(&str, String)> = Self::window_params(window).into();
        query.push(("limit", self.config.page_limit.to_string()));
        query.push(("sort", "asc".to_string()));
        if let Some(token) = page_token {
            query.push(("page_token", token.to_string()));
        }

        let raw: RawQuotesResponse = self
            .get(&format!("/v2/stocks/{symbol}/quotes"), &query)
            .await?;
        Ok(Page {
            items: raw.quotes.unwrap_or_default(),
            next_page_token: raw.next_page_token,
        })
    }

    /// Gets the latest trade for a stock.
    ///
    /// # Errors
    /// Returns error if the API call fails.
    pub async fn get_latest_trade(&self, symbol: &str) -> Result<Option<RawTrade>> {
        let symbol = Self::validate_symbol(symbol)?;
        let raw: RawLatestTradeResponse = self
            .get(&format!("/v2/stocks/{symbol}/trades/latest"), &[])
            .await?;
        Ok(raw.trade)
    }

    // =========================================================================
    // Option Endpoints
    // =========================================================================

    /// Gets one page of option snapshots for an underlying.
    ///
    /// # Errors
    /// Returns error if the API call fails.
    pub async fn get_option_snapshots(
        &self,
        underlying: &str,
        page_token: Option<&str>,
    ) -> Result<Page<ChainContract>> {
        let underlying = Self::validate_symbol(underlying)?;
        let mut query = vec![
            ("feed", self.config.options_feed.clone()),
            (
                "limit",
                self.config.page_limit.min(MAX_SNAPSHOT_LIMIT).to_string(),
            ),
        ];
        if let Some(token) = page_token {
            query.push(("page_token", token.to_string()));
        }

        let raw: RawSnapshotsResponse = self
            .get(&format!("/v1beta1/options/snapshots/{underlying}"), &query)
            .await?;
        Ok(Page {
            items: raw
                .snapshots
                .unwrap_or_default()
                .into_iter()
                .map(|(symbol, snapshot)| snapshot.into_contract(symbol))
                .collect(),
            next_page_token: raw.next_page_token,
        })
    }

    /// Gets one page of trades for a batch of option contracts.
    ///
    /// # Errors
    /// Returns error if the API call fails.
    pub async fn get_option_trades(
        &self,
        contracts: &[String],
        window: TimeWindow,
        page_token: Option<&str>,
    ) -> Result<Page<RawOptionTrade>> {
        if contracts.is_empty() {
            return Ok(Page::last(Vec::new()));
        }
        for contract in contracts {
            Self::validate_symbol(contract)?;
        }

        let mut query: Vec<(&str, String)> = Self::window_params(window).into();
        query.push(("symbols", contracts.join(",")));
        query.push(("limit", self.config.page_limit.to_string()));
        query.push(("sort", "asc".to_string()));
        if let Some(token) = page_token {
            query.push(("page_token", token.to_string()));
        }

        let raw: RawOptionTradesResponse = self.get("/v1beta1/options/trades", &query).await?;
        let items = raw
            .trades
            .unwrap_or_default()
            .into_iter()
            .flat_map(|(symbol, trades)| {
                trades.into_iter().map(move |trade| RawOptionTrade {
                    symbol: symbol.clone(),
                    trade,
                })
            })
            .collect();
        Ok(Page {
            items,
            next_page_token: raw.next_page_token,
        })
    }

    fn provider_symbol(ticker: &str) -> std::result::Result<String, ProviderError> {
        symbols::to_provider_symbol(ticker)
            .ok_or_else(|| ProviderError::Unsupported(ticker.to_string()))
    }
}

// =============================================================================
// TradeSource
// =============================================================================

#[async_trait]
impl TradeSource for AlpacaClient {
    async fn equity_trades(
        &self,
        symbol: &str,
        window: TimeWindow,
        page_token: Option<&str>,
    ) -> whale_watch_core::Result<Page<RawTrade>> {
        let symbol = Self::provider_symbol(symbol)?;
        Ok(self.get_stock_trades(&symbol, window, page_token).await?)
    }

    async fn equity_quotes(
        &self,
        symbol: &str,
        window: TimeWindow,
        page_token: Option<&str>,
    ) -> whale_watch_core::Result<Page<RawQuote>> {
        let symbol = Self::provider_symbol(symbol)?;
        Ok(self.get_stock_quotes(&symbol, window, page_token).await?)
    }

    async fn latest_price(&self, symbol: &str) -> whale_watch_core::Result<Option<f64>> {
        let symbol = Self::provider_symbol(symbol)?;
        let trade = self.get_latest_trade(&symbol).await?;
        Ok(trade.and_then(|t| t.price).filter(|p| *p > 0.0))
    }

    async fn option_chain(
        &self,
        underlying: &str,
        page_token: Option<&str>,
    ) -> whale_watch_core::Result<Page<ChainContract>> {
        let underlying = Self::provider_symbol(underlying)?;
        Ok(self.get_option_snapshots(&underlying, page_token).await?)
    }

    async fn option_trades(
        &self,
        contracts: &[String],
        window: TimeWindow,
        page_token: Option<&str>,
    ) -> whale_watch_core::Result<Page<RawOptionTrade>> {
        Ok(self.get_option_trades(contracts, window, page_token).await?)
    }

    fn supports(&self, symbol: &str) -> bool {
        symbols::is_supported(symbol)
    }

    fn name(&self) -> &str {
        "alpaca"
    }
}
