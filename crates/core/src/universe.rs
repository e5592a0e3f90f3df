//! Scan universes and the security → sector table.
//!
//! Both are bundled with the crate; sector assignments can be extended or
//! overridden from configuration.

use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;

const SPX_UNIVERSE: &str = include_str!("../data/spx_universe.txt");
const SECTOR_TABLE: &str = include_str!("../data/sectors.csv");

/// Fixed sample used by `--test` runs for equities.
pub const EQUITY_TEST_TICKERS: [&str; 5] = ["AAPL", "MSFT", "NVDA", "TSLA", "GOOGL"];

/// Fixed sample used by `--test` runs for options.
pub const OPTIONS_TEST_TICKERS: [&str; 5] = ["AAPL", "MSFT", "NVDA", "TSLA", "META"];

/// Errors building a universe or sector map.
#[derive(Debug, Error)]
pub enum UniverseError {
    #[error("ticker universe is empty")]
    Empty,

    #[error("invalid ticker: {0:?}")]
    InvalidTicker(String),

    #[error("sector table: {0}")]
    SectorTable(#[from] csv::Error),
}

/// Normalizes a user-supplied ticker: trims, upper-cases, maps `.` class separators to `-`.
fn canonical_ticker(raw: &str) -> Result<String, UniverseError> {
    let ticker = raw.trim().to_ascii_uppercase().replace('.', "-");
    let valid = !ticker.is_empty()
        && ticker.len() <= 10
        && ticker.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
    if valid {
        Ok(ticker)
    } else {
        Err(UniverseError::InvalidTicker(raw.to_string()))
    }
}

/// The bundled S&P 500 constituent list, in alphabetical order.
#[must_use]
pub fn spx_universe() -> Vec<String> {
    SPX_UNIVERSE
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Parses a `--tickers` list (`"aapl, msft,BRK.B"`), de-duplicating while keeping order.
///
/// # Errors
/// Returns an error for an invalid ticker or an empty list.
pub fn parse_ticker_list(list: &str) -> Result<Vec<String>, UniverseError> {
    let mut seen = BTreeSet::new();
    let mut tickers = Vec::new();
    for part in list.split(',').filter(|p| !p.trim().is_empty()) {
        let ticker = canonical_ticker(part)?;
        if seen.insert(ticker.clone()) {
            tickers.push(ticker);
        }
    }
    if tickers.is_empty() {
        return Err(UniverseError::Empty);
    }
    Ok(tickers)
}

// =============================================================================
// Sector Map
// =============================================================================

#[derive(Debug, Deserialize)]
struct SectorRow {
    ticker: String,
    sector: String,
}

/// Static security → GICS sector mapping.
#[derive(Debug, Clone, Default)]
pub struct SectorMap {
    sectors: HashMap<String, String>,
}

impl SectorMap {
    /// Loads the bundled table.
    ///
    /// # Errors
    /// Returns an error if the bundled CSV cannot be parsed.
    pub fn bundled() -> Result<Self, UniverseError> {
        Self::from_csv(SECTOR_TABLE)
    }

    /// Parses a `ticker,sector` CSV with a header row.
    ///
    /// # Errors
    /// Returns an error on malformed rows.
    pub fn from_csv(data: &str) -> Result<Self, UniverseError> {
        let mut reader = csv::Reader::from_reader(data.as_bytes());
        let mut sectors = HashMap::new();
        for row in reader.deserialize::<SectorRow>() {
            let row = row?;
            sectors.insert(row.ticker.trim().to_ascii_uppercase(), row.sector.trim().to_string());
        }
        Ok(Self { sectors })
    }

    /// Adds or replaces assignments.
    #[must_use]
    pub fn with_overrides<'a, I>(mut self, overrides: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        for (ticker, sector) in overrides {
            self.sectors
                .insert(ticker.to_ascii_uppercase(), sector.clone());
        }
        self
    }

    /// Sector of a ticker; `BRK.B` and `BRK-B` resolve alike.
    #[must_use]
    pub fn sector_of(&self, ticker: &str) -> Option<&str> {
        let key = ticker.to_ascii_uppercase().replace('.', "-");
        self.sectors.get(&key).map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sectors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sectors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== Universe Tests ====================

    #[test]
    fn test_spx_universe_loaded() {
        let universe = spx_universe();
        assert_eq!(universe.len(), 500);
        assert!(universe.contains(&"AAPL".to_string()));
        assert!(universe.contains(&"BRK-B".to_string()));
    }

    #[test]
    fn test_parse_ticker_list() {
        let tickers = parse_ticker_list(" aapl, MSFT ,brk.b,AAPL").unwrap();
        assert_eq!(tickers, vec!["AAPL", "MSFT", "BRK-B"]);
    }

    #[test]
    fn test_parse_ticker_list_rejects_garbage() {
        assert!(matches!(
            parse_ticker_list("AAPL,../etc"),
            Err(UniverseError::InvalidTicker(_))
        ));
        assert!(matches!(parse_ticker_list(" , "), Err(UniverseError::Empty)));
    }

    // ==================== Sector Tests ====================

    #[test]
    fn test_bundled_sectors() {
        let map = SectorMap::bundled().unwrap();
        assert!(map.len() >= 500);
        assert_eq!(map.sector_of("AAPL"), Some("Information Technology"));
        assert_eq!(map.sector_of("BRK.B"), Some("Financials"));
        assert_eq!(map.sector_of("ZZZZ"), None);
    }

    #[test]
    fn test_every_test_ticker_has_sector() {
        let map = SectorMap::bundled().unwrap();
        for ticker in EQUITY_TEST_TICKERS.iter().chain(OPTIONS_TEST_TICKERS.iter()) {
            assert!(map.sector_of(ticker).is_some(), "{ticker} unmapped");
        }
    }

    #[test]
    fn test_sector_overrides() {
        let overrides: HashMap<String, String> =
            [("ZZZZ".to_string(), "Utilities".to_string())].into_iter().collect();
        let map = SectorMap::bundled().unwrap().with_overrides(&overrides);
        assert_eq!(map.sector_of("zzzz"), Some("Utilities"));
    }
}
