//! The full computation: normalized ledger + raw prices + window → series.
//!
//! Pure and synchronous; fetching happens in [`crate::service`].

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use super::engine::{run_engine, Valuation};
use super::error::FoliotrackError;
use super::order::{normalize_orders, NormalizedLedger, RawOrder, Side};
use super::price_matrix::{PriceMatrix, RawPriceHistory};
use super::quality::DataQuality;
use super::returns::cumulative_return;
use super::series::{serialize, SerializeOptions, TimeSeriesResult};
use super::timeline::{align_orders, Timeline};
use super::window::{resolve_window, ResolvedWindow, VendorLimits, WindowLabel};

/// Inputs that are not part of the ledger or the price payload.
#[derive(Debug, Clone)]
pub struct PerformanceContext {
    pub now: DateTime<Utc>,
    /// Portfolio creation instant. Falls back to the first order.
    pub inception: Option<DateTime<Utc>>,
    pub limits: VendorLimits,
    pub output: SerializeOptions,
}

impl PerformanceContext {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now,
            inception: None,
            limits: VendorLimits::default(),
            output: SerializeOptions::default(),
        }
    }

    pub fn with_inception(mut self, inception: Option<DateTime<Utc>>) -> Self {
        self.inception = inception;
        self
    }

    /// Resolve a label against this context, filling inception from the
    /// ledger when the portfolio has none.
    pub fn resolve(&self, label: WindowLabel, ledger: &NormalizedLedger) -> ResolvedWindow {
        let inception = self.inception.or_else(|| ledger.first_instant());
        resolve_window(label, self.now, inception, &self.limits)
    }
}

#[derive(Debug, Clone)]
pub struct PerformanceReport {
    pub window: ResolvedWindow,
    pub valuation: Valuation,
    pub series: TimeSeriesResult,
    pub quality: DataQuality,
    /// Orders past the last bar of this window.
    pub excluded_orders: usize,
    /// Normalized orders per side, over the whole ledger.
    pub order_sides: BTreeMap<Side, usize>,
}

impl PerformanceReport {
    pub fn final_value(&self) -> f64 {
        self.valuation.total_value.last().copied().unwrap_or(0.0)
    }

    pub fn total_return(&self) -> f64 {
        cumulative_return(&self.valuation.total_value)
    }

    pub fn degraded_bars(&self) -> usize {
        self.valuation.degraded.iter().filter(|d| **d).count()
    }
}

/// Compute the report for an already resolved window.
pub fn compute_resolved(
    ledger: &NormalizedLedger,
    prices: &RawPriceHistory,
    window: &ResolvedWindow,
    options: &SerializeOptions,
) -> PerformanceReport {
    let (matrix, price_quality) = PriceMatrix::build(prices);
    let timeline = Timeline::build(window, &matrix);
    let aligned = align_orders(&timeline, &ledger.orders);
    let valuation = run_engine(&timeline, &aligned, &matrix);
    let series = serialize(&valuation, options);

    let mut quality = ledger.quality.clone();
    quality.merge(&price_quality);
    quality.merge(&valuation.quality);
    quality.orders_after_window += aligned.excluded;

    tracing::debug!(
        window = %window.label,
        bars = timeline.len(),
        tickers = aligned.tickers.len(),
        excluded = aligned.excluded,
        "performance computed"
    );

    PerformanceReport {
        window: *window,
        valuation,
        series,
        quality,
        excluded_orders: aligned.excluded,
        order_sides: ledger.side_counts(),
    }
}

/// Compute the keyed series for raw orders and prices under `window_label`.
///
/// Fails only when the label is not one of `1D, 1W, 1M, YTD, 1Y, ALL`
/// (any case). Bad rows and missing prices degrade the result instead.
pub fn compute_performance(
    orders: &[RawOrder],
    prices: &RawPriceHistory,
    window_label: &str,
    ctx: &PerformanceContext,
) -> Result<PerformanceReport, FoliotrackError> {
    let label: WindowLabel = window_label.parse()?;
    let ledger = normalize_orders(orders);
    let window = ctx.resolve(label, &ledger);
    Ok(compute_resolved(&ledger, prices, &window, &ctx.output))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::price_matrix::RawPriceBar;
    use approx::assert_relative_eq;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 12, 15, 30, 0).unwrap()
    }

    #[test]
    fn rejects_unknown_label_before_work() {
        let err = compute_performance(&[], &RawPriceHistory::new(), "5Y", &PerformanceContext::new(now()))
            .unwrap_err();
        assert!(matches!(err, FoliotrackError::Validation { .. }));
    }

    #[test]
    fn empty_ledger_produces_flat_zero_series() {
        let report =
            compute_performance(&[], &RawPriceHistory::new(), "ytd", &PerformanceContext::new(now()))
                .unwrap();
        assert!(!report.series.is_empty());
        assert!(report.valuation.total_value.iter().all(|v| *v == 0.0));
        assert_eq!(report.total_return(), 0.0);
    }

    #[test]
    fn inception_falls_back_to_first_order() {
        let orders = vec![RawOrder::new(None, "1000", "", "2024-05-01T14:00:00Z")];
        let report =
            compute_performance(&orders, &RawPriceHistory::new(), "ALL", &PerformanceContext::new(now()))
                .unwrap();
        assert_eq!(
            report.window.start,
            Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap()
        );
        assert_relative_eq!(report.valuation.total_value[0], 1000.0);
        assert_relative_eq!(report.final_value(), 1000.0);
    }

    #[test]
    fn quality_collects_all_stages() {
        let orders = vec![
            RawOrder::new(None, "1000", "", "2024-06-01"),
            RawOrder::new(Some("GHOST"), "1", "bad", "2024-06-03"),
            RawOrder::new(Some("AAA"), "1", "10", "garbage"),
        ];
        let mut prices = RawPriceHistory::new();
        prices.insert(
            "AAA".into(),
            vec![RawPriceBar::new("2024-06-05", 10.0), RawPriceBar::new("junk", 1.0)],
        );
        let report = compute_performance(&orders, &prices, "ALL", &PerformanceContext::new(now())).unwrap();
        assert_eq!(report.quality.non_numeric_prices, 1);
        assert_eq!(report.quality.unparseable_timestamps, 1);
        assert_eq!(report.quality.unusable_price_rows, 1);
        assert!(report.quality.unpriced_bars > 0);
        assert!(report.degraded_bars() > 0);
    }

    #[test]
    fn ticker_named_total_cannot_shadow_totals() {
        let orders = vec![
            RawOrder::new(Some("CA$H"), "1000", "", "2024-06-01"),
            RawOrder::new(Some("total"), "1", "10", "2024-06-03"),
        ];
        let mut prices = RawPriceHistory::new();
        prices.insert("TOTAL".into(), vec![RawPriceBar::new("2024-06-03", 50.0)]);
        let report = compute_performance(&orders, &prices, "ALL", &PerformanceContext::new(now())).unwrap();

        let keys: Vec<_> = report.series.keys().collect();
        assert_eq!(keys, vec!["TIMESTAMP", "pv:CA$H", "dv:CA$H", "pv:TOTAL", "dv:TOTAL"]);
        assert_eq!(
            report.series.values("pv:TOTAL").unwrap(),
            report.valuation.total_value.as_slice()
        );
        assert!(report.valuation.total_value.iter().all(|v| *v == 1000.0));
        assert_eq!(report.quality.reserved_tickers, 1);
        assert_eq!(report.order_sides.get(&Side::Deposit), Some(&1));
        assert_eq!(report.order_sides.get(&Side::Buy), None);
    }
}
