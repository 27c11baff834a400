//! Order ledger model and normalization.
//!
//! Raw ledger rows arrive loosely typed (text fields, sentinel tickers for
//! cash). [`normalize_orders`] turns them into a deterministic, time-sorted
//! sequence of typed [`Order`]s.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::instant::parse_instant;
use super::quality::DataQuality;
use super::series::TOTAL_KEY;

/// Ticker literal the ledger uses for pure currency movements.
pub const CASH_MARKER: &str = "CA$H";

const NULL_LIKE: [&str; 6] = ["", "NONE", "NULL", "NAN", "NAT", "<NA>"];

/// One ledger row as stored, before any coercion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawOrder {
    pub ticker: Option<String>,
    pub quantity: Option<String>,
    pub price: Option<String>,
    pub timestamp: Option<String>,
}

impl RawOrder {
    pub fn new(ticker: Option<&str>, quantity: &str, price: &str, timestamp: &str) -> Self {
        Self {
            ticker: ticker.map(str::to_string),
            quantity: Some(quantity.to_string()),
            price: Some(price.to_string()),
            timestamp: Some(timestamp.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrderKind {
    /// Currency in (positive) or out (negative), priced at 1.0.
    Cash { amount: f64 },
    /// Security trade; positive quantity buys, negative sells.
    Trade {
        ticker: String,
        quantity: f64,
        price: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Side {
    Buy,
    Sell,
    Deposit,
    Withdrawal,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
            Side::Deposit => "deposit",
            Side::Withdrawal => "withdrawal",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub timestamp: DateTime<Utc>,
    pub kind: OrderKind,
}

impl Order {
    pub fn cash(timestamp: DateTime<Utc>, amount: f64) -> Self {
        Self {
            timestamp,
            kind: OrderKind::Cash { amount },
        }
    }

    pub fn trade(timestamp: DateTime<Utc>, ticker: &str, quantity: f64, price: f64) -> Self {
        Self {
            timestamp,
            kind: OrderKind::Trade {
                ticker: ticker.to_string(),
                quantity,
                price,
            },
        }
    }

    pub fn ticker(&self) -> Option<&str> {
        match &self.kind {
            OrderKind::Cash { .. } => None,
            OrderKind::Trade { ticker, .. } => Some(ticker),
        }
    }

    /// Signed quantity: cash amount for transfers, shares for trades.
    pub fn quantity(&self) -> f64 {
        match &self.kind {
            OrderKind::Cash { amount } => *amount,
            OrderKind::Trade { quantity, .. } => *quantity,
        }
    }

    pub fn side(&self) -> Side {
        match &self.kind {
            OrderKind::Cash { amount } if *amount >= 0.0 => Side::Deposit,
            OrderKind::Cash { .. } => Side::Withdrawal,
            OrderKind::Trade { quantity, .. } if *quantity >= 0.0 => Side::Buy,
            OrderKind::Trade { .. } => Side::Sell,
        }
    }

    pub(crate) fn canonical_cmp(&self, other: &Order) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then_with(|| match (&self.kind, &other.kind) {
                (OrderKind::Cash { amount: a }, OrderKind::Cash { amount: b }) => a.total_cmp(b),
                (OrderKind::Cash { .. }, OrderKind::Trade { .. }) => Ordering::Less,
                (OrderKind::Trade { .. }, OrderKind::Cash { .. }) => Ordering::Greater,
                (
                    OrderKind::Trade {
                        ticker: ta,
                        quantity: qa,
                        price: pa,
                    },
                    OrderKind::Trade {
                        ticker: tb,
                        quantity: qb,
                        price: pb,
                    },
                ) => ta
                    .cmp(tb)
                    .then_with(|| qa.total_cmp(qb))
                    .then_with(|| pa.total_cmp(pb)),
            })
    }
}

#[derive(Debug, Clone, Default)]
pub struct NormalizedLedger {
    pub orders: Vec<Order>,
    pub quality: DataQuality,
}

impl NormalizedLedger {
    /// Distinct security tickers, sorted.
    pub fn tickers(&self) -> BTreeSet<String> {
        self.orders
            .iter()
            .filter_map(|o| o.ticker().map(str::to_string))
            .collect()
    }

    pub fn first_instant(&self) -> Option<DateTime<Utc>> {
        self.orders.first().map(|o| o.timestamp)
    }

    /// Number of orders per side.
    pub fn side_counts(&self) -> BTreeMap<Side, usize> {
        let mut counts = BTreeMap::new();
        for order in &self.orders {
            *counts.entry(order.side()).or_insert(0) += 1;
        }
        counts
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

/// Canonical ticker, or `None` when the value denotes cash.
pub fn canonical_ticker(raw: Option<&str>) -> Option<String> {
    let upper = raw?.trim().to_uppercase();
    if NULL_LIKE.contains(&upper.as_str()) || upper == CASH_MARKER {
        None
    } else {
        Some(upper)
    }
}

/// Coerce a text field to a finite real. Non-numeric input yields `None`.
fn coerce_number(raw: Option<&str>) -> Option<f64> {
    raw.and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

/// Canonicalize raw ledger rows.
///
/// Tickers are upper-cased and null-like values become cash. Non-numeric
/// quantities and prices are floored to zero. Rows without a parseable
/// timestamp, rows whose quantity ends up zero, and trades on the reserved
/// ticker `TOTAL` (it names the totals columns) are dropped. The result
/// is sorted by timestamp with a total tie-break, so any permutation of the
/// same rows normalizes to the same sequence.
pub fn normalize_orders(raw: &[RawOrder]) -> NormalizedLedger {
    let mut quality = DataQuality::default();
    let mut orders = Vec::with_capacity(raw.len());

    for row in raw {
        let Some(timestamp) = row.timestamp.as_deref().and_then(parse_instant) else {
            quality.unparseable_timestamps += 1;
            continue;
        };

        let quantity = match coerce_number(row.quantity.as_deref()) {
            Some(q) => q,
            None => {
                quality.non_numeric_quantities += 1;
                0.0
            }
        };
        if quantity == 0.0 {
            quality.zero_quantity_orders += 1;
            continue;
        }

        let order = match canonical_ticker(row.ticker.as_deref()) {
            None => Order::cash(timestamp, quantity),
            Some(ticker) if ticker == TOTAL_KEY => {
                quality.reserved_tickers += 1;
                tracing::debug!(%ticker, "trade on a reserved ticker name dropped");
                continue;
            }
            Some(ticker) => {
                let price = match coerce_number(row.price.as_deref()) {
                    Some(p) => p,
                    None => {
                        quality.non_numeric_prices += 1;
                        0.0
                    }
                };
                Order {
                    timestamp,
                    kind: OrderKind::Trade {
                        ticker,
                        quantity,
                        price,
                    },
                }
            }
        };
        orders.push(order);
    }

    orders.sort_by(Order::canonical_cmp);
    NormalizedLedger { orders, quality }
}
