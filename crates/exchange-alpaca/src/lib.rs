//! Alpaca market data integration for whale trade detection.
//!
//! This crate provides:
//! - REST client for Alpaca stock and option market data
//! - Ticker conversion between index notation (`BRK-B`) and Alpaca notation (`BRK.B`)
//! - A [`TradeSource`](whale_watch_core::TradeSource) implementation for the scanner
//!
//! # Authentication
//!
//! Set `ALPACA_API_KEY` and `ALPACA_API_SECRET` (or `APCA_API_KEY_ID` and
//! `APCA_API_SECRET_KEY`).
//!
//! # API Endpoints
//!
//! - `GET /v2/stocks/{symbol}/trades` - Historical stock trades
//! - `GET /v2/stocks/{symbol}/quotes` - Historical stock quotes
//! - `GET /v2/stocks/{symbol}/trades/latest` - Latest stock trade
//! - `GET /v1beta1/options/snapshots/{underlying}` - Option chain snapshot
//! - `GET /v1beta1/options/trades` - Historical option trades (up to 100 contracts)

pub mod client;
pub mod error;
pub mod symbols;

pub use client::{AlpacaClient, AlpacaClientConfig, Credentials, ALPACA_DATA_URL};
pub use error::{AlpacaError, Result};
