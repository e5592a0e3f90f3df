//! Ticker conversion between index-list notation and Alpaca notation.
//!
//! Index lists write share classes with a dash (`BRK-B`); Alpaca uses a dot (`BRK.B`).

/// Tickers Alpaca does not serve at all.
const UNSUPPORTED: [&str; 2] = ["BRK-A", "BRK.A"];

/// True when the ticker is on the skip list.
#[must_use]
pub fn is_supported(ticker: &str) -> bool {
    !UNSUPPORTED.contains(&ticker.to_ascii_uppercase().as_str())
}

/// Converts a universe ticker to Alpaca notation, `None` for skipped tickers.
///
/// Only single-letter class suffixes are rewritten (`BF-B` → `BF.B`).
#[must_use]
pub fn to_provider_symbol(ticker: &str) -> Option<String> {
    let ticker = ticker.trim().to_ascii_uppercase();
    if !is_supported(&ticker) {
        return None;
    }
    match ticker.rsplit_once('-') {
        Some((base, class)) if class.len() == 1 && !base.is_empty() => {
            Some(format!("{base}.{class}"))
        }
        _ => Some(ticker),
    }
}
