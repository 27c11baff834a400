//! PerformanceService orchestration against mock ledger and price sources.

mod common;

use approx::assert_relative_eq;
use common::*;
use foliotrack::domain::error::FoliotrackError;
use foliotrack::domain::window::{BarInterval, WindowLabel};
use std::sync::atomic::Ordering;
use std::time::Duration;

fn now() -> chrono::DateTime<chrono::Utc> {
    utc(2024, 6, 12, 15, 30)
}

fn sample_ledger() -> MockLedgerSource {
    MockLedgerSource::new().with_portfolio(
        "p1",
        "alice",
        Some(utc(2024, 6, 1, 9, 0)),
        vec![
            cash(1_000.0, "2024-06-01T09:00:00Z"),
            trade("AAA", 10.0, 20.0, "2024-06-03T15:00:00Z"),
        ],
    )
}

fn sample_prices() -> MockPriceSource {
    MockPriceSource::new().with_bars(
        "AAA",
        &[("2024-06-03", 20.0), ("2024-06-04", 21.0), ("2024-06-11", 25.0)],
    )
}

mod happy_path {
    use super::*;

    #[tokio::test]
    async fn computes_all_window() {
        let svc = service(sample_ledger(), sample_prices(), now());
        let report = svc.get_performance("alice", "p1", "ALL").await.unwrap();

        assert_eq!(report.window.label, WindowLabel::All);
        assert_eq!(report.window.start, utc(2024, 6, 2, 0, 0));
        assert_eq!(report.series.timestamps().last(), Some(&now()));
        assert_relative_eq!(report.final_value(), 800.0 + 250.0);
        assert!(!report.quality.is_degraded());
    }

    #[tokio::test]
    async fn inception_falls_back_to_first_order() {
        let ledger = MockLedgerSource::new().with_portfolio(
            "p2",
            "alice",
            None,
            vec![cash(50.0, "2024-06-05T10:00:00Z")],
        );
        let svc = service(ledger, MockPriceSource::new(), now());
        let window = svc.resolve("alice", "p2", "ALL").await.unwrap();
        assert_eq!(window.inception, Some(utc(2024, 6, 5, 10, 0)));
        assert_eq!(window.start, utc(2024, 6, 6, 0, 0));
    }

    #[tokio::test]
    async fn empty_portfolio_skips_price_fetch() {
        let ledger = MockLedgerSource::new().with_portfolio("p3", "alice", None, vec![]);
        let prices = MockPriceSource::new();
        let calls = prices.calls.clone();
        let svc = service(ledger, prices, now());

        let report = svc.get_performance("alice", "p3", "1W").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(!report.series.is_empty());
        assert!(
            report
                .series
                .values("pv:TOTAL")
                .unwrap()
                .iter()
                .all(|v| *v == 0.0)
        );
    }

    #[tokio::test]
    async fn descriptor_follows_window() {
        let prices = sample_prices();
        let requests = prices.requests.clone();
        let svc = service(sample_ledger(), prices, now());

        svc.get_performance("alice", "p1", "1d").await.unwrap();
        let seen = requests.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].1.interval, BarInterval::OneMinute);
        assert!(seen[0].0.contains("AAA"));
    }
}

mod batching {
    use super::*;

    #[tokio::test]
    async fn tickers_are_split_into_batches() {
        let orders = ["AAA", "BBB", "CCC", "DDD", "EEE"]
            .iter()
            .map(|t| trade(t, 1.0, 10.0, "2024-06-03T15:00:00Z"))
            .collect();
        let ledger =
            MockLedgerSource::new().with_portfolio("p1", "alice", Some(utc(2024, 6, 1, 0, 0)), orders);
        let mut prices = MockPriceSource::new();
        for t in ["AAA", "BBB", "CCC", "DDD", "EEE"] {
            prices = prices.with_bars(t, &[("2024-06-04", 11.0)]);
        }
        let requests = prices.requests.clone();
        let svc = service(ledger, prices, now()).with_batch_size(2);

        let report = svc.get_performance("alice", "p1", "ALL").await.unwrap();

        let seen = requests.lock().unwrap();
        assert_eq!(seen.len(), 3);
        let mut sizes: Vec<_> = seen.iter().map(|(batch, _)| batch.len()).collect();
        sizes.sort();
        assert_eq!(sizes, vec![1, 2, 2]);
        assert!(seen.iter().all(|(_, d)| *d == seen[0].1));
        // -50 cash + 5 * 11
        assert_relative_eq!(report.final_value(), 5.0);
        assert_eq!(report.valuation.tickers.len(), 5);
    }
}

mod failures {
    use super::*;

    #[tokio::test]
    async fn unknown_window_is_validation_without_io() {
        let prices = sample_prices();
        let calls = prices.calls.clone();
        let svc = service(sample_ledger(), prices, now());

        let err = svc.get_performance("alice", "p1", "5Y").await.unwrap_err();
        assert!(matches!(err, FoliotrackError::Validation { .. }));
        assert!(err.is_client_error());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn malformed_portfolio_id_is_validation() {
        let prices = sample_prices();
        let calls = prices.calls.clone();
        let svc = service(sample_ledger(), prices, now());

        let err = svc
            .get_performance("alice", "p1; drop table", "ALL")
            .await
            .unwrap_err();
        assert!(matches!(err, FoliotrackError::Validation { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn other_users_portfolio_is_not_found() {
        let prices = sample_prices();
        let calls = prices.calls.clone();
        let svc = service(sample_ledger(), prices, now());

        let err = svc.get_performance("mallory", "p1", "ALL").await.unwrap_err();
        assert!(matches!(err, FoliotrackError::NotFound { ref portfolio_id } if portfolio_id == "p1"));
        assert!(err.is_client_error());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let err = svc.get_performance("alice", "nope", "ALL").await.unwrap_err();
        assert!(matches!(err, FoliotrackError::NotFound { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_upstream_times_out() {
        let prices = sample_prices().with_delay(Duration::from_secs(30));
        let svc = service(sample_ledger(), prices, now()).with_timeout(Duration::from_secs(5));

        let err = svc.get_performance("alice", "p1", "ALL").await.unwrap_err();
        assert!(matches!(err, FoliotrackError::UpstreamTimeout { seconds: 5 }));
        assert!(err.is_retryable());
        assert!(!err.is_client_error());
    }

    #[tokio::test(start_paused = true)]
    async fn upstream_within_deadline_succeeds() {
        let prices = sample_prices().with_delay(Duration::from_secs(2));
        let svc = service(sample_ledger(), prices, now()).with_timeout(Duration::from_secs(5));
        assert!(svc.get_performance("alice", "p1", "ALL").await.is_ok());
    }

    #[tokio::test]
    async fn upstream_error_propagates() {
        let prices = sample_prices().with_error("vendor unavailable");
        let svc = service(sample_ledger(), prices, now());

        let err = svc.get_performance("alice", "p1", "1M").await.unwrap_err();
        assert!(matches!(err, FoliotrackError::Upstream { ref reason } if reason.contains("vendor")));
        assert!(err.is_retryable());
    }
}
