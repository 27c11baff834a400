//! Wide price matrix: one ascending instant index, one close column per
//! ticker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::instant::parse_instant;
use super::order::canonical_ticker;
use super::quality::DataQuality;

/// One vendor row: an instant and its closing price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPriceBar {
    pub timestamp: String,
    pub close: Option<f64>,
}

impl RawPriceBar {
    pub fn new(timestamp: &str, close: f64) -> Self {
        Self {
            timestamp: timestamp.to_string(),
            close: Some(close),
        }
    }
}

/// Vendor payload keyed by ticker, at whatever resolution was returned.
pub type RawPriceHistory = BTreeMap<String, Vec<RawPriceBar>>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceMatrix {
    index: Vec<DateTime<Utc>>,
    columns: BTreeMap<String, Vec<Option<f64>>>,
}

/// Result of asking for a ticker's price at a bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PriceLookup {
    /// A close printed at exactly this instant.
    Exact(f64),
    /// The last close printed before this instant.
    Carried(f64),
    /// No close has been printed at or before this instant.
    Missing,
}

impl PriceMatrix {
    /// Merge per-ticker histories into one matrix.
    ///
    /// Rows with an unparseable instant or a non-finite close are dropped and
    /// counted. Two rows for the same ticker at the same instant keep the one
    /// that came last. Cash-like keys and tickers left without rows get no
    /// column.
    pub fn build(raw: &RawPriceHistory) -> (Self, DataQuality) {
        let mut quality = DataQuality::default();
        let mut series: BTreeMap<String, BTreeMap<DateTime<Utc>, f64>> = BTreeMap::new();

        for (ticker, bars) in raw {
            let Some(ticker) = canonical_ticker(Some(ticker.as_str())) else {
                continue;
            };
            let column = series.entry(ticker).or_default();
            for bar in bars {
                let instant = parse_instant(&bar.timestamp);
                let close = bar.close.filter(|c| c.is_finite());
                match (instant, close) {
                    (Some(t), Some(c)) => {
                        column.insert(t, c);
                    }
                    _ => quality.unusable_price_rows += 1,
                }
            }
        }
        series.retain(|_, column| !column.is_empty());

        let index: Vec<DateTime<Utc>> = series
            .values()
            .flat_map(|column| column.keys().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let columns = series
            .into_iter()
            .map(|(ticker, column)| {
                let values = index.iter().map(|t| column.get(t).copied()).collect();
                (ticker, values)
            })
            .collect();

        (Self { index, columns }, quality)
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn index(&self) -> &[DateTime<Utc>] {
        &self.index
    }

    pub fn tickers(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// A forward-filling reader over one ticker's column. Query instants
    /// must be non-decreasing.
    pub fn cursor(&self, ticker: &str) -> PriceCursor<'_> {
        PriceCursor {
            index: &self.index,
            column: self.columns.get(ticker).map(Vec::as_slice),
            pos: 0,
            last: None,
        }
    }
}

pub struct PriceCursor<'a> {
    index: &'a [DateTime<Utc>],
    column: Option<&'a [Option<f64>]>,
    pos: usize,
    last: Option<(DateTime<Utc>, f64)>,
}

impl PriceCursor<'_> {
    pub fn at(&mut self, instant: DateTime<Utc>) -> PriceLookup {
        let Some(column) = self.column else {
            return PriceLookup::Missing;
        };
        while self.pos < self.index.len() && self.index[self.pos] <= instant {
            if let Some(close) = column[self.pos] {
                self.last = Some((self.index[self.pos], close));
            }
            self.pos += 1;
        }
        match self.last {
            Some((t, close)) if t == instant => PriceLookup::Exact(close),
            Some((_, close)) => PriceLookup::Carried(close),
            None => PriceLookup::Missing,
        }
    }
}
