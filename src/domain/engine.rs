//! Position engine: walks the bar grid carrying running quantities and cash,
//! and values the book at every bar.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use super::price_matrix::{PriceLookup, PriceMatrix};
use super::quality::DataQuality;
use super::returns::period_deltas;
use super::timeline::{AlignedLedger, BarActivity, Timeline};

/// Residual quantities below this are treated as a closed position.
const QUANTITY_EPSILON: f64 = 1e-9;

/// Running holdings for one computation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PositionState {
    positions: BTreeMap<String, f64>,
    cash: f64,
}

impl PositionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one bar's netted activity.
    pub fn apply(&mut self, activity: &BarActivity) {
        self.cash += activity.cash_flow;
        for (ticker, bucket) in &activity.trades {
            let quantity = self.positions.entry(ticker.clone()).or_insert(0.0);
            *quantity += bucket.net_quantity;
            if quantity.abs() < QUANTITY_EPSILON {
                *quantity = 0.0;
            }
            self.cash += bucket.cash_effect();
        }
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn quantity(&self, ticker: &str) -> f64 {
        self.positions.get(ticker).copied().unwrap_or(0.0)
    }
}

/// Per-ticker series aligned to the timeline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickerSeries {
    pub quantity: Vec<f64>,
    pub value: Vec<f64>,
    pub delta: Vec<f64>,
    /// Share of the summed position values, cash excluded. 0 on bars where
    /// that sum is 0.
    pub weight: Vec<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Valuation {
    pub timestamps: Vec<DateTime<Utc>>,
    pub cash: Vec<f64>,
    pub cash_delta: Vec<f64>,
    pub tickers: BTreeMap<String, TickerSeries>,
    pub total_value: Vec<f64>,
    pub total_delta: Vec<f64>,
    /// Bars where a held ticker had never been priced and was valued at 0.
    pub degraded: Vec<bool>,
    pub quality: DataQuality,
}

impl Valuation {
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

/// Walk `timeline`, applying `aligned` activity bar by bar and valuing every
/// traded ticker against `matrix`.
///
/// Prices missing at a bar are carried forward from the last observation.
/// A held ticker never observed is valued at zero and the bar is flagged.
/// Never fails.
pub fn run_engine(timeline: &Timeline, aligned: &AlignedLedger, matrix: &PriceMatrix) -> Valuation {
    let n = timeline.len();
    let mut state = PositionState::new();
    let mut quality = DataQuality::default();

    let mut cursors: Vec<_> = aligned
        .tickers
        .iter()
        .map(|t| (t.clone(), matrix.cursor(t)))
        .collect();
    let mut quantities: Vec<Vec<f64>> = vec![Vec::with_capacity(n); cursors.len()];
    let mut values: Vec<Vec<f64>> = vec![Vec::with_capacity(n); cursors.len()];

    let mut cash = Vec::with_capacity(n);
    let mut total_value = Vec::with_capacity(n);
    let mut equities = Vec::with_capacity(n);
    let mut degraded = Vec::with_capacity(n);

    for (i, bar) in timeline.bars().iter().enumerate() {
        if let Some(activity) = aligned.activity.get(i) {
            state.apply(activity);
        }

        let mut equity = 0.0;
        let mut unpriced = false;
        for (k, (ticker, cursor)) in cursors.iter_mut().enumerate() {
            let quantity = state.quantity(ticker);
            let value = match cursor.at(*bar) {
                PriceLookup::Exact(price) => quantity * price,
                PriceLookup::Carried(price) => {
                    if quantity != 0.0 {
                        quality.forward_filled_values += 1;
                    }
                    quantity * price
                }
                PriceLookup::Missing => {
                    if quantity != 0.0 {
                        unpriced = true;
                        tracing::debug!(%ticker, %bar, "no price observed yet, valued at zero");
                    }
                    0.0
                }
            };
            quantities[k].push(quantity);
            values[k].push(value);
            equity += value;
        }

        if unpriced {
            quality.unpriced_bars += 1;
        }
        degraded.push(unpriced);
        cash.push(state.cash());
        total_value.push(state.cash() + equity);
        equities.push(equity);
    }

    let tickers = cursors
        .into_iter()
        .zip(quantities.into_iter().zip(values))
        .map(|((ticker, _), (quantity, value))| {
            let delta = period_deltas(&value);
            let weight = value
                .iter()
                .zip(&equities)
                .map(|(v, total)| if *total != 0.0 { v / total } else { 0.0 })
                .collect();
            (
                ticker,
                TickerSeries {
                    quantity,
                    value,
                    delta,
                    weight,
                },
            )
        })
        .collect();

    Valuation {
        timestamps: timeline.bars().to_vec(),
        cash_delta: period_deltas(&cash),
        cash,
        tickers,
        total_delta: period_deltas(&total_value),
        total_value,
        degraded,
        quality,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::Order;
    use crate::domain::price_matrix::{RawPriceBar, RawPriceHistory};
    use crate::domain::timeline::align_orders;
    use approx::assert_relative_eq;
    use chrono::TimeZone;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap()
    }

    fn prices(rows: &[(&str, u32, f64)]) -> PriceMatrix {
        let mut raw = RawPriceHistory::new();
        for (ticker, d, close) in rows {
            raw.entry(ticker.to_string())
                .or_default()
                .push(RawPriceBar::new(&format!("2024-01-{d:02}"), *close));
        }
        PriceMatrix::build(&raw).0
    }

    fn run(bars: &[u32], orders: &[Order], matrix: &PriceMatrix) -> Valuation {
        let tl = Timeline::new(bars.iter().map(|d| day(*d)));
        let aligned = align_orders(&tl, orders);
        run_engine(&tl, &aligned, matrix)
    }

    #[test]
    fn state_applies_cash_and_trades() {
        let tl = Timeline::new([day(1)]);
        let aligned = align_orders(
            &tl,
            &[Order::cash(day(1), 500.0), Order::trade(day(1), "AAA", 4.0, 25.0)],
        );
        let mut state = PositionState::new();
        state.apply(&aligned.activity[0]);
        assert_relative_eq!(state.cash(), 400.0);
        assert_relative_eq!(state.quantity("AAA"), 4.0);
        assert_relative_eq!(state.quantity("ZZZ"), 0.0);
    }

    #[test]
    fn pure_cash_ledger_is_flat() {
        let v = run(&[1, 2, 3, 4], &[Order::cash(day(1), 10_000.0)], &PriceMatrix::default());
        assert_eq!(v.total_value, vec![10_000.0; 4]);
        assert_eq!(v.total_delta, vec![0.0; 4]);
        assert!(v.tickers.is_empty());
        assert!(!v.quality.is_degraded());
    }

    #[test]
    fn valuation_arithmetic() {
        let m = prices(&[("TICKER_A", 2, 670.67), ("TICKER_A", 3, 675.20), ("TICKER_A", 4, 680.00)]);
        let orders = [
            Order::cash(day(1), 10_000.0),
            Order::trade(day(2), "TICKER_A", 2.0, 670.67),
        ];
        let v = run(&[1, 2, 3, 4], &orders, &m);
        assert_relative_eq!(v.cash[1], 8658.66, epsilon = 1e-9);
        assert_relative_eq!(v.total_value[1], 10_000.00, epsilon = 1e-9);
        assert_relative_eq!(v.total_value[2], 10_009.06, epsilon = 1e-9);
        assert_relative_eq!(v.total_value[3], 10_018.66, epsilon = 1e-9);
        assert_relative_eq!(v.total_delta[3], 9.60, epsilon = 1e-9);
        assert_relative_eq!(v.total_delta[0], 0.0);

        let a = &v.tickers["TICKER_A"];
        assert_eq!(a.quantity, vec![0.0, 2.0, 2.0, 2.0]);
        assert_relative_eq!(a.value[3], 1360.0, epsilon = 1e-9);
        assert_relative_eq!(a.delta[1], 1341.34, epsilon = 1e-9);
    }

    #[test]
    fn missing_price_is_forward_filled() {
        let m = prices(&[("AAA", 1, 10.0), ("AAA", 3, 12.0), ("BBB", 2, 1.0)]);
        let v = run(&[1, 2, 3], &[Order::trade(day(1), "AAA", 1.0, 10.0)], &m);
        let a = &v.tickers["AAA"];
        assert_eq!(a.value, vec![10.0, 10.0, 12.0]);
        assert_eq!(v.quality.forward_filled_values, 1);
        assert_eq!(v.degraded, vec![false; 3]);
    }

    #[test]
    fn never_priced_ticker_is_zero_and_flagged() {
        let m = prices(&[("AAA", 2, 10.0)]);
        let orders = [
            Order::cash(day(1), 100.0),
            Order::trade(day(1), "AAA", 1.0, 10.0),
            Order::trade(day(1), "GHOST", 1.0, 5.0),
        ];
        let v = run(&[1, 2], &orders, &m);
        assert_eq!(v.tickers["GHOST"].value, vec![0.0, 0.0]);
        assert_eq!(v.tickers["AAA"].value, vec![0.0, 10.0]);
        assert_eq!(v.degraded, vec![true, true]);
        assert_eq!(v.quality.unpriced_bars, 2);
        assert_relative_eq!(v.total_value[1], 85.0 + 10.0);
    }

    #[test]
    fn weights_split_position_value_and_exclude_cash() {
        let m = prices(&[("AAA", 2, 30.0), ("BBB", 2, 10.0)]);
        let orders = [
            Order::cash(day(1), 1_000.0),
            Order::trade(day(2), "AAA", 1.0, 30.0),
            Order::trade(day(2), "BBB", 1.0, 10.0),
        ];
        let v = run(&[1, 2], &orders, &m);
        assert_eq!(v.tickers["AAA"].weight, vec![0.0, 0.75]);
        assert_eq!(v.tickers["BBB"].weight, vec![0.0, 0.25]);
        assert!(v.tickers.values().all(|t| t.weight.iter().all(|w| w.is_finite())));
    }

    #[test]
    fn closed_position_values_to_zero() {
        let m = prices(&[("AAA", 1, 10.0), ("AAA", 2, 11.0), ("AAA", 3, 12.0)]);
        let orders = [
            Order::trade(day(1), "AAA", 0.1, 10.0),
            Order::trade(day(1), "AAA", 0.2, 10.0),
            Order::trade(day(2), "AAA", -0.3, 11.0),
        ];
        let v = run(&[1, 2, 3], &orders, &m);
        assert_eq!(v.tickers["AAA"].quantity[2], 0.0);
        assert_eq!(v.tickers["AAA"].value[2], 0.0);
        assert_eq!(v.tickers["AAA"].weight[2], 0.0);
    }

    #[test]
    fn empty_timeline_yields_empty_valuation() {
        let v = run(&[], &[Order::cash(day(1), 1.0)], &PriceMatrix::default());
        assert!(v.is_empty());
        assert!(v.total_delta.is_empty());
    }
}
