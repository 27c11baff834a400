//! Flattening of a valuation into the keyed time-series contract:
//! `TIMESTAMP`, cash, tickers in lexical order, then totals.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::io::Write;

use super::engine::Valuation;
use super::error::FoliotrackError;
use super::order::CASH_MARKER;
use super::returns::period_returns;

pub const TIMESTAMP_KEY: &str = "TIMESTAMP";
pub const TOTAL_KEY: &str = "TOTAL";

pub fn value_key(name: &str) -> String {
    format!("pv:{name}")
}

pub fn delta_key(name: &str) -> String {
    format!("dv:{name}")
}

pub fn return_key(name: &str) -> String {
    format!("rt:{name}")
}

pub fn holding_key(name: &str) -> String {
    format!("qty:{name}")
}

pub fn weight_key(name: &str) -> String {
    format!("wt:{name}")
}

#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Instants(Vec<DateTime<Utc>>),
    Values(Vec<f64>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Instants(v) => v.len(),
            Column::Values(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn cell(&self, row: usize) -> String {
        match self {
            Column::Instants(v) => v[row].to_rfc3339_opts(SecondsFormat::Secs, true),
            Column::Values(v) => v[row].to_string(),
        }
    }
}

impl Serialize for Column {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Column::Instants(v) => v.serialize(serializer),
            Column::Values(v) => v.serialize(serializer),
        }
    }
}

/// Ordered key/value series, every column the same length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeSeriesResult {
    columns: Vec<(String, Column)>,
}

impl TimeSeriesResult {
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(k, _)| k.as_str())
    }

    pub fn get(&self, key: &str) -> Option<&Column> {
        self.columns.iter().find(|(k, _)| k == key).map(|(_, c)| c)
    }

    pub fn values(&self, key: &str) -> Option<&[f64]> {
        match self.get(key)? {
            Column::Values(v) => Some(v),
            Column::Instants(_) => None,
        }
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        match self.get(TIMESTAMP_KEY) {
            Some(Column::Instants(v)) => v,
            _ => &[],
        }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.columns.first().map(|(_, c)| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&mut self, key: String, column: Column) {
        self.columns.push((key, column));
    }

    pub fn write_csv<W: Write>(&self, out: W) -> Result<(), FoliotrackError> {
        let mut wtr = csv::Writer::from_writer(out);
        let csv_err = |e: csv::Error| FoliotrackError::Io(std::io::Error::other(e));

        wtr.write_record(self.keys()).map_err(csv_err)?;
        for row in 0..self.len() {
            wtr.write_record(self.columns.iter().map(|(_, c)| c.cell(row)))
                .map_err(csv_err)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

impl Serialize for TimeSeriesResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (key, column) in &self.columns {
            map.serialize_entry(key, column)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SerializeOptions {
    /// Emit `pv:`/`dv:` columns per ticker. Cash and totals are always
    /// emitted.
    pub include_tickers: bool,
    /// Emit `rt:TOTAL` period returns.
    pub include_returns: bool,
    /// Emit `qty:` share counts per ticker.
    pub include_holdings: bool,
    /// Emit `wt:` weights per ticker.
    pub include_weights: bool,
    /// Round values to this many decimals.
    pub decimals: Option<u32>,
}

impl Default for SerializeOptions {
    fn default() -> Self {
        Self {
            include_tickers: true,
            include_returns: false,
            include_holdings: false,
            include_weights: false,
            decimals: Some(4),
        }
    }
}

fn round_all(values: &[f64], decimals: Option<u32>) -> Vec<f64> {
    let Some(d) = decimals else {
        return values.to_vec();
    };
    let scale = 10f64.powi(d as i32);
    values
        .iter()
        .map(|v| {
            let r = (v * scale).round() / scale;
            // no negative zero in output
            if r == 0.0 { 0.0 } else { r }
        })
        .collect()
}

pub fn serialize(valuation: &Valuation, options: &SerializeOptions) -> TimeSeriesResult {
    let mut out = TimeSeriesResult::default();
    let round = |v: &[f64]| Column::Values(round_all(v, options.decimals));

    out.push(
        TIMESTAMP_KEY.to_string(),
        Column::Instants(valuation.timestamps.clone()),
    );
    out.push(value_key(CASH_MARKER), round(&valuation.cash));
    out.push(delta_key(CASH_MARKER), round(&valuation.cash_delta));

    for (ticker, series) in &valuation.tickers {
        if options.include_tickers {
            out.push(value_key(ticker), round(&series.value));
            out.push(delta_key(ticker), round(&series.delta));
        }
        if options.include_holdings {
            out.push(holding_key(ticker), round(&series.quantity));
        }
        if options.include_weights {
            out.push(weight_key(ticker), round(&series.weight));
        }
    }

    out.push(value_key(TOTAL_KEY), round(&valuation.total_value));
    out.push(delta_key(TOTAL_KEY), round(&valuation.total_delta));
    if options.include_returns {
        out.push(
            return_key(TOTAL_KEY),
            Column::Values(round_all(&period_returns(&valuation.total_value), Some(6))),
        );
    }
    out
}
