//! Bar grid construction and order-to-bar alignment.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};

use super::order::{Order, OrderKind};
use super::price_matrix::PriceMatrix;
use super::window::ResolvedWindow;

/// Ascending, deduplicated bar instants for one computation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Timeline {
    bars: Vec<DateTime<Utc>>,
}

impl Timeline {
    pub fn new(bars: impl IntoIterator<Item = DateTime<Utc>>) -> Self {
        let bars = bars
            .into_iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        Self { bars }
    }

    /// Grid for `window` over the instants observed in `matrix`.
    ///
    /// Daily grids hold the window start, every price instant in
    /// `[start, end)` and a live bar at `end`. Intraday grids hold the price
    /// instants in `[start, end)`, or a regular grid at the bar interval when
    /// the vendor printed nothing in range.
    pub fn build(window: &ResolvedWindow, matrix: &PriceMatrix) -> Self {
        let in_window = matrix
            .index()
            .iter()
            .copied()
            .filter(|t| *t >= window.start && *t < window.end);

        if window.is_daily() {
            let anchor = (window.start < window.end).then_some(window.start);
            return Self::new(anchor.into_iter().chain(in_window).chain([window.end]));
        }

        let observed = Self::new(in_window);
        if !observed.is_empty() {
            return observed;
        }

        let step = window.interval().duration();
        let mut synthetic = Vec::new();
        let mut t = window.start;
        while t < window.end {
            synthetic.push(t);
            t += step;
        }
        if synthetic.is_empty() {
            synthetic.push(window.end);
        }
        Self::new(synthetic)
    }

    pub fn bars(&self) -> &[DateTime<Utc>] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last(&self) -> Option<DateTime<Utc>> {
        self.bars.last().copied()
    }

    /// Index of the first bar at or after `t`, or `None` when `t` is past
    /// the last bar.
    pub fn effective_bar(&self, t: DateTime<Utc>) -> Option<usize> {
        let i = self.bars.partition_point(|bar| *bar < t);
        (i < self.bars.len()).then_some(i)
    }
}

/// Net trading in one ticker within one bar.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TradeBucket {
    pub net_quantity: f64,
    /// Signed sum of `quantity * price`.
    pub notional: f64,
}

impl TradeBucket {
    fn add(&mut self, quantity: f64, price: f64) {
        self.net_quantity += quantity;
        self.notional += quantity * price;
    }

    /// Change in cash caused by the bucket.
    pub fn cash_effect(&self) -> f64 {
        -self.notional
    }
}

/// Everything that happened within one bar, netted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BarActivity {
    pub cash_flow: f64,
    pub trades: BTreeMap<String, TradeBucket>,
}

impl BarActivity {
    pub fn is_empty(&self) -> bool {
        self.cash_flow == 0.0 && self.trades.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlignedLedger {
    /// One entry per timeline bar.
    pub activity: Vec<BarActivity>,
    /// Tickers traded on or before the last bar, sorted.
    pub tickers: BTreeSet<String>,
    /// Orders past the last bar, not visible in this window.
    pub excluded: usize,
}

/// Bind each order to its effective bar and net orders sharing a bar.
///
/// Orders earlier than the first bar land on it. Orders are netted in
/// canonical order so the sums are identical for any arrival order.
pub fn align_orders(timeline: &Timeline, orders: &[Order]) -> AlignedLedger {
    let mut sorted: Vec<&Order> = orders.iter().collect();
    sorted.sort_by(|a, b| a.canonical_cmp(b));

    let mut aligned = AlignedLedger {
        activity: vec![BarActivity::default(); timeline.len()],
        ..AlignedLedger::default()
    };

    for order in sorted {
        let Some(bar) = timeline.effective_bar(order.timestamp) else {
            aligned.excluded += 1;
            continue;
        };
        let activity = &mut aligned.activity[bar];
        match &order.kind {
            OrderKind::Cash { amount } => activity.cash_flow += amount,
            OrderKind::Trade {
                ticker,
                quantity,
                price,
            } => {
                activity
                    .trades
                    .entry(ticker.clone())
                    .or_default()
                    .add(*quantity, *price);
                aligned.tickers.insert(ticker.clone());
            }
        }
    }

    if aligned.excluded > 0 {
        tracing::debug!(
            excluded = aligned.excluded,
            last_bar = ?timeline.last(),
            "orders after the last bar left out of this window"
        );
    }
    aligned
}
