//! UniverseScanner against a scripted trade source.

mod common;

use common::{print_at, quote_at, MockSource, RecordingSleeper};
use std::sync::Arc;
use std::time::Duration;
use whale_watch_core::{
    AssetClass, ChainContract, DetectionConfig, ProviderConfig, ProviderError, RateLimiter,
    RateLimiterConfig, RawBatch, RetryConfig, TimeWindow,
};
use whale_watch_detector::{ScanFailure, UniverseScanner};

// =============================================================================
// Helper Functions
// =============================================================================

fn window() -> TimeWindow {
    let end = common::session_open() + chrono::Duration::hours(6);
    TimeWindow {
        start: common::session_open() - chrono::Duration::days(4),
        end,
    }
}

fn scanner(source: Arc<MockSource>, sleeper: Arc<RecordingSleeper>) -> UniverseScanner {
    scanner_with(source, sleeper, ProviderConfig::default())
}

fn scanner_with(
    source: Arc<MockSource>,
    sleeper: Arc<RecordingSleeper>,
    provider: ProviderConfig,
) -> UniverseScanner {
    let limiter = Arc::new(RateLimiter::new(RateLimiterConfig::alpaca_basic()));
    UniverseScanner::new(source, limiter, RetryConfig::default(), provider).with_sleeper(sleeper)
}

fn tickers(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn contract(symbol: &str) -> ChainContract {
    ChainContract {
        symbol: symbol.to_string(),
        latest_quote: Some(quote_at(0, 1.9, 2.1)),
        open_interest: Some(500),
    }
}

// =============================================================================
// Equity Tests
// =============================================================================

#[tokio::test]
async fn test_equity_pages_followed_and_quotes_fetched_for_candidates() {
    let source = Arc::new(
        MockSource::new()
            .with_page_size(2)
            .with_trades(
                "AAPL",
                vec![
                    print_at(0, 200.0, 100, "V"),
                    print_at(1_000, 200.0, 100, "V"),
                    print_at(2_000, 200.0, 6_000, "D"),
                    print_at(3_000, 200.0, 100, "N"),
                    print_at(4_000, 200.0, 100, "V"),
                ],
            )
            .with_quotes("AAPL", vec![quote_at(0, 199.9, 200.0), quote_at(2_500, 199.9, 200.1)]),
    );
    let sleeper = Arc::new(RecordingSleeper::default());
    let scanner = scanner(Arc::clone(&source), sleeper);

    let results = scanner
        .scan(&tickers(&["AAPL"]), AssetClass::Equity, window(), &DetectionConfig::equities())
        .await;

    match &results["AAPL"] {
        Ok(RawBatch::Equity(batch)) => {
            assert_eq!(batch.trades.len(), 5);
            assert_eq!(batch.quotes.len(), 2);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(source.calls("equity_trades"), 3);
    assert_eq!(source.calls("equity_quotes"), 1);

    let stats = scanner.stats();
    assert_eq!(stats.requests, 4);
    assert_eq!(stats.succeeded, 1);
}

#[tokio::test]
async fn test_quotes_skipped_without_candidates() {
    let source = Arc::new(
        MockSource::new().with_trades("MSFT", vec![print_at(0, 400.0, 100, "V")]),
    );
    let scanner = scanner(Arc::clone(&source), Arc::new(RecordingSleeper::default()));

    let results = scanner
        .scan(&tickers(&["MSFT"]), AssetClass::Equity, window(), &DetectionConfig::equities())
        .await;

    assert!(results["MSFT"].is_ok());
    assert_eq!(source.calls("equity_quotes"), 0);
}

#[tokio::test]
async fn test_no_trades_is_no_data() {
    let source = Arc::new(MockSource::new());
    let scanner = scanner(Arc::clone(&source), Arc::new(RecordingSleeper::default()));

    let results = scanner
        .scan(&tickers(&["NVDA"]), AssetClass::Equity, window(), &DetectionConfig::equities())
        .await;

    assert_eq!(results["NVDA"], Err(ScanFailure::NoData));
    assert_eq!(scanner.stats().no_data, 1);
}

#[tokio::test]
async fn test_unsupported_symbol_skipped_without_requests() {
    let source = Arc::new(MockSource::new().with_unsupported("BRK-A"));
    let scanner = scanner(Arc::clone(&source), Arc::new(RecordingSleeper::default()));

    let results = scanner
        .scan(&tickers(&["BRK-A"]), AssetClass::Equity, window(), &DetectionConfig::equities())
        .await;

    assert!(matches!(results["BRK-A"], Err(ScanFailure::Skipped { .. })));
    assert_eq!(source.total_calls(), 0);
    assert_eq!(scanner.stats().skipped, 1);
}

#[tokio::test]
async fn test_page_limit_truncates() {
    let trades = (0..5).map(|i| print_at(i * 1_000, 10.0, 10, "V")).collect();
    let source = Arc::new(MockSource::new().with_page_size(1).with_trades("F", trades));
    let provider = ProviderConfig {
        max_pages: 2,
        ..ProviderConfig::default()
    };
    let scanner = scanner_with(
        Arc::clone(&source),
        Arc::new(RecordingSleeper::default()),
        provider,
    );

    let results = scanner
        .scan(&tickers(&["F"]), AssetClass::Equity, window(), &DetectionConfig::equities())
        .await;

    match &results["F"] {
        Ok(batch) => assert_eq!(batch.trade_count(), 2),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(source.calls("equity_trades"), 2);
}

// =============================================================================
// Retry Tests
// =============================================================================

#[tokio::test]
async fn test_transient_error_retried_with_backoff() {
    let source = Arc::new(MockSource::new().with_trades("AAPL", vec![print_at(0, 200.0, 10, "V")]));
    source.fail_next("equity_trades", "AAPL", ProviderError::Timeout("30s".to_string()));
    let sleeper = Arc::new(RecordingSleeper::default());
    let scanner = scanner(Arc::clone(&source), Arc::clone(&sleeper));

    let results = scanner
        .scan(&tickers(&["AAPL"]), AssetClass::Equity, window(), &DetectionConfig::equities())
        .await;

    assert!(results["AAPL"].is_ok());
    assert_eq!(sleeper.sleeps(), vec![RetryConfig::default().initial_backoff]);
    let stats = scanner.stats();
    assert_eq!(stats.retries, 1);
    assert_eq!(stats.rate_limit_cooldowns, 0);
    assert_eq!(stats.requests, 2);
}

#[tokio::test]
async fn test_exhausted_retries_fail_only_that_security() {
    let source = Arc::new(
        MockSource::new()
            .with_trades("AAPL", vec![print_at(0, 200.0, 10, "V")])
            .with_trades("MSFT", vec![print_at(0, 400.0, 10, "V")]),
    );
    for _ in 0..4 {
        source.fail_next("equity_trades", "MSFT", ProviderError::Network("reset".to_string()));
    }
    let sleeper = Arc::new(RecordingSleeper::default());
    let scanner = scanner(Arc::clone(&source), Arc::clone(&sleeper));

    let results = scanner
        .scan(
            &tickers(&["AAPL", "MSFT"]),
            AssetClass::Equity,
            window(),
            &DetectionConfig::equities(),
        )
        .await;

    assert!(results["AAPL"].is_ok());
    assert!(matches!(results["MSFT"], Err(ScanFailure::Failed { .. })));
    // 1s, 2s, 4s
    assert_eq!(
        sleeper.sleeps(),
        vec![Duration::from_secs(1), Duration::from_secs(2), Duration::from_secs(4)]
    );
    let stats = scanner.stats();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.succeeded, 1);
    assert_eq!(stats.retries, 3);
}

#[tokio::test]
async fn test_permanent_error_not_retried() {
    let source = Arc::new(MockSource::new());
    source.fail_next("equity_trades", "TSLA", ProviderError::api(403, "forbidden"));
    let sleeper = Arc::new(RecordingSleeper::default());
    let scanner = scanner(Arc::clone(&source), Arc::clone(&sleeper));

    let results = scanner
        .scan(&tickers(&["TSLA"]), AssetClass::Equity, window(), &DetectionConfig::equities())
        .await;

    assert!(matches!(results["TSLA"], Err(ScanFailure::Failed { .. })));
    assert!(sleeper.sleeps().is_empty());
    assert_eq!(source.calls("equity_trades"), 1);
}

#[tokio::test]
async fn test_rate_limit_cooldown_uses_longer_of_config_and_retry_after() {
    let source = Arc::new(MockSource::new().with_trades("AAPL", vec![print_at(0, 200.0, 10, "V")]));
    source.fail_next("equity_trades", "AAPL", ProviderError::rate_limited(90));
    let sleeper = Arc::new(RecordingSleeper::default());
    let scanner = scanner(Arc::clone(&source), Arc::clone(&sleeper));

    let results = scanner
        .scan(&tickers(&["AAPL"]), AssetClass::Equity, window(), &DetectionConfig::equities())
        .await;

    assert!(results["AAPL"].is_ok());
    assert_eq!(sleeper.sleeps(), vec![Duration::from_secs(90)]);
    assert_eq!(scanner.stats().rate_limit_cooldowns, 1);
}

// =============================================================================
// Options Tests
// =============================================================================

#[tokio::test]
async fn test_options_grouped_by_expiration_and_chunked() {
    let source = Arc::new(
        MockSource::new()
            .with_price("AAPL", 200.0)
            .with_chain(
                "AAPL",
                vec![
                    contract("AAPL250307C00220000"),
                    contract("AAPL250307P00180000"),
                    contract("AAPL250321C00250000"),
                ],
            )
            .with_option_prints("AAPL250307C00220000", vec![print_at(0, 2.0, 600, "C")])
            .with_option_prints("AAPL250321C00250000", vec![print_at(500, 1.0, 50, "X")]),
    );
    let provider = ProviderConfig {
        option_symbols_per_request: 1,
        ..ProviderConfig::default()
    };
    let scanner = scanner_with(
        Arc::clone(&source),
        Arc::new(RecordingSleeper::default()),
        provider,
    );

    let results = scanner
        .scan(&tickers(&["AAPL"]), AssetClass::Option, window(), &DetectionConfig::options())
        .await;

    match &results["AAPL"] {
        Ok(RawBatch::Options(batch)) => {
            assert_eq!(batch.underlying_price, Some(200.0));
            assert_eq!(batch.contracts.len(), 3);
            assert_eq!(batch.trades.len(), 2);
            assert_eq!(batch.trade_count(), 2);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(source.calls("option_trades"), 3);
    assert_eq!(source.calls("latest_price"), 1);
}

#[tokio::test]
async fn test_empty_chain_is_no_data() {
    let source = Arc::new(MockSource::new().with_price("META", 600.0));
    let scanner = scanner(Arc::clone(&source), Arc::new(RecordingSleeper::default()));

    let results = scanner
        .scan(&tickers(&["META"]), AssetClass::Option, window(), &DetectionConfig::options())
        .await;

    assert_eq!(results["META"], Err(ScanFailure::NoData));
    assert_eq!(source.calls("option_trades"), 0);
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[tokio::test]
async fn test_concurrent_scan_matches_sequential() {
    let build = || {
        let mut source = MockSource::new();
        for (i, symbol) in ["AAPL", "MSFT", "NVDA", "TSLA", "GOOGL", "AMZN"].iter().enumerate() {
            let trades = (0..3)
                .map(|j| print_at(j * 1_000, 10.0 + i as f64, 100, "V"))
                .collect();
            source = source.with_trades(symbol, trades);
        }
        Arc::new(source)
    };
    let symbols = tickers(&["AAPL", "MSFT", "NVDA", "TSLA", "GOOGL", "AMZN", "NONE"]);

    let sequential = scanner(build(), Arc::new(RecordingSleeper::default()));
    let concurrent = scanner(build(), Arc::new(RecordingSleeper::default())).with_concurrency(4);

    let a = sequential
        .scan(&symbols, AssetClass::Equity, window(), &DetectionConfig::equities())
        .await;
    let b = concurrent
        .scan(&symbols, AssetClass::Equity, window(), &DetectionConfig::equities())
        .await;

    assert_eq!(a, b);
    assert_eq!(sequential.stats(), concurrent.stats());
    assert_eq!(concurrent.stats().attempted, 7);
    assert_eq!(concurrent.stats().no_data, 1);
}
