//! Non-fatal data-quality counters.
//!
//! Every degradation the pipeline absorbs locally (zero-fill, forward-fill,
//! dropped rows) is counted here so it can be logged and inspected.

use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DataQuality {
    /// Order rows dropped because the timestamp could not be parsed.
    pub unparseable_timestamps: usize,
    /// Order quantities that were not numeric and were floored to zero.
    pub non_numeric_quantities: usize,
    /// Order prices that were not numeric and were floored to zero.
    pub non_numeric_prices: usize,
    /// Trade rows dropped because the ticker is a reserved output name.
    pub reserved_tickers: usize,
    /// Orders dropped because their net quantity was zero.
    pub zero_quantity_orders: usize,
    /// Price rows dropped for an unparseable instant or non-finite close.
    pub unusable_price_rows: usize,
    /// Orders after the last bar of the resolved timeline.
    pub orders_after_window: usize,
    /// Bars valued while a held ticker had no observed price at all.
    pub unpriced_bars: usize,
    /// Bars valued using a carried-forward price.
    pub forward_filled_values: usize,
}

impl DataQuality {
    pub fn merge(&mut self, other: &DataQuality) {
        self.unparseable_timestamps += other.unparseable_timestamps;
        self.non_numeric_quantities += other.non_numeric_quantities;
        self.non_numeric_prices += other.non_numeric_prices;
        self.reserved_tickers += other.reserved_tickers;
        self.zero_quantity_orders += other.zero_quantity_orders;
        self.unusable_price_rows += other.unusable_price_rows;
        self.orders_after_window += other.orders_after_window;
        self.unpriced_bars += other.unpriced_bars;
        self.forward_filled_values += other.forward_filled_values;
    }

    /// True when the computed series lost information: a row was dropped or
    /// a held position had to be valued at zero.
    pub fn is_degraded(&self) -> bool {
        self.unparseable_timestamps > 0
            || self.non_numeric_quantities > 0
            || self.non_numeric_prices > 0
            || self.reserved_tickers > 0
            || self.unusable_price_rows > 0
            || self.unpriced_bars > 0
    }

    pub fn log(&self, portfolio_id: &str) {
        if self.is_degraded() {
            tracing::warn!(
                portfolio_id,
                unparseable_timestamps = self.unparseable_timestamps,
                non_numeric_quantities = self.non_numeric_quantities,
                non_numeric_prices = self.non_numeric_prices,
                reserved_tickers = self.reserved_tickers,
                unusable_price_rows = self.unusable_price_rows,
                unpriced_bars = self.unpriced_bars,
                "performance computed with degraded data"
            );
        }
        tracing::debug!(
            portfolio_id,
            zero_quantity_orders = self.zero_quantity_orders,
            orders_after_window = self.orders_after_window,
            forward_filled_values = self.forward_filled_values,
            "data quality summary"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_clean() {
        assert!(!DataQuality::default().is_degraded());
    }

    #[test]
    fn forward_fill_alone_is_not_degraded() {
        let q = DataQuality {
            forward_filled_values: 12,
            orders_after_window: 1,
            ..DataQuality::default()
        };
        assert!(!q.is_degraded());
    }

    #[test]
    fn unpriced_bar_is_degraded() {
        let q = DataQuality {
            unpriced_bars: 1,
            ..DataQuality::default()
        };
        assert!(q.is_degraded());
    }

    #[test]
    fn merge_adds_counters() {
        let mut a = DataQuality {
            non_numeric_prices: 1,
            unpriced_bars: 2,
            ..DataQuality::default()
        };
        let b = DataQuality {
            non_numeric_prices: 3,
            forward_filled_values: 4,
            ..DataQuality::default()
        };
        a.merge(&b);
        assert_eq!(a.non_numeric_prices, 4);
        assert_eq!(a.unpriced_bars, 2);
        assert_eq!(a.forward_filled_values, 4);
    }
}
