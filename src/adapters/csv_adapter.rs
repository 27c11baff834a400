//! CSV file adapters: a ledger directory and a price history directory.
//!
//! Ledger layout: `portfolios.csv` (`id,user_id,name,created_at`) and
//! `orders.csv` (`portfolio_id,ticker,quantity,price,timestamp`).
//! Price layout: one vendor export per ticker, `<TICKER>_<interval>.csv`
//! or `<TICKER>.csv`, with a `Datetime`/`Date`/`timestamp` column and a
//! `Close` column.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::error::FoliotrackError;
use crate::domain::instant::parse_instant;
use crate::domain::order::RawOrder;
use crate::domain::price_matrix::{RawPriceBar, RawPriceHistory};
use crate::domain::window::BarDescriptor;
use crate::ports::ledger_port::{LedgerSource, Portfolio};
use crate::ports::price_port::PriceSource;

const TIMESTAMP_HEADERS: [&str; 4] = ["datetime", "date", "timestamp", "time"];
const CLOSE_HEADER: &str = "close";

fn read_file(path: &Path) -> Result<String, FoliotrackError> {
    fs::read_to_string(path).map_err(|e| FoliotrackError::Database {
        reason: format!("failed to read {}: {}", path.display(), e),
    })
}

fn reader(content: &str) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(content.as_bytes())
}

fn parse_error(path: &Path, e: csv::Error) -> FoliotrackError {
    FoliotrackError::DatabaseQuery {
        reason: format!("CSV parse error in {}: {}", path.display(), e),
    }
}

/// True for names that stay inside one directory when joined to it.
fn is_plain_file_stem(name: &str) -> bool {
    !name.is_empty()
        && !name.contains("..")
        && !name.contains(['/', '\\', ':', '\0'])
}

#[derive(Debug, Deserialize)]
struct PortfolioRow {
    id: String,
    user_id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrderRow {
    portfolio_id: String,
    #[serde(default)]
    ticker: Option<String>,
    #[serde(default)]
    quantity: Option<String>,
    #[serde(default)]
    price: Option<String>,
    #[serde(default)]
    timestamp: Option<String>,
}

pub struct CsvLedgerAdapter {
    base_path: PathBuf,
}

impl CsvLedgerAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn portfolios_path(&self) -> PathBuf {
        self.base_path.join("portfolios.csv")
    }

    fn orders_path(&self) -> PathBuf {
        self.base_path.join("orders.csv")
    }
}

#[async_trait]
impl LedgerSource for CsvLedgerAdapter {
    async fn get_portfolio(
        &self,
        user_id: &str,
        portfolio_id: &str,
    ) -> Result<Portfolio, FoliotrackError> {
        let path = self.portfolios_path();
        let content = read_file(&path)?;
        let mut rdr = reader(&content);

        for result in rdr.deserialize::<PortfolioRow>() {
            let row = result.map_err(|e| parse_error(&path, e))?;
            if row.id != portfolio_id {
                continue;
            }
            if row.user_id != user_id {
                tracing::debug!(portfolio_id, "portfolio owned by another user");
                break;
            }
            return Ok(Portfolio {
                created_at: row.created_at.as_deref().and_then(parse_instant),
                name: row.name.unwrap_or_default(),
                id: row.id,
                user_id: row.user_id,
            });
        }

        Err(FoliotrackError::NotFound {
            portfolio_id: portfolio_id.to_string(),
        })
    }

    async fn get_orders(&self, portfolio_id: &str) -> Result<Vec<RawOrder>, FoliotrackError> {
        let path = self.orders_path();
        let content = read_file(&path)?;
        let mut rdr = reader(&content);
        let mut orders = Vec::new();

        for result in rdr.deserialize::<OrderRow>() {
            let row = result.map_err(|e| parse_error(&path, e))?;
            if row.portfolio_id != portfolio_id {
                continue;
            }
            orders.push(RawOrder {
                ticker: row.ticker,
                quantity: row.quantity,
                price: row.price,
                timestamp: row.timestamp,
            });
        }

        tracing::debug!(portfolio_id, orders = orders.len(), "orders read from csv");
        Ok(orders)
    }
}

pub struct CsvPriceAdapter {
    base_path: PathBuf,
}

impl CsvPriceAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    /// Interval-specific export first, then the plain one. Tickers that
    /// could name a file outside the price directory have no history.
    fn history_path(&self, ticker: &str, descriptor: BarDescriptor) -> Option<PathBuf> {
        if !is_plain_file_stem(ticker) {
            tracing::warn!(%ticker, "ticker is not a plain file name, no price history read");
            return None;
        }
        [
            format!("{}_{}.csv", ticker, descriptor.interval.code()),
            format!("{}.csv", ticker),
        ]
        .into_iter()
        .map(|name| self.base_path.join(name))
        .find(|p| p.is_file())
    }

    fn read_history(path: &Path) -> Result<Vec<RawPriceBar>, FoliotrackError> {
        let content = read_file(path)?;
        let mut rdr = reader(&content);

        let headers = rdr.headers().map_err(|e| parse_error(path, e))?.clone();
        let position = |names: &[&str]| {
            headers
                .iter()
                .position(|h| names.contains(&h.to_lowercase().as_str()))
        };
        let missing = |what: &str| FoliotrackError::DatabaseQuery {
            reason: format!("{}: no {} column", path.display(), what),
        };
        let ts_col = position(&TIMESTAMP_HEADERS[..]).ok_or_else(|| missing("timestamp"))?;
        let close_col = position(&[CLOSE_HEADER][..]).ok_or_else(|| missing("close"))?;

        let mut bars = Vec::new();
        for result in rdr.records() {
            let record = result.map_err(|e| parse_error(path, e))?;
            bars.push(RawPriceBar {
                timestamp: record.get(ts_col).unwrap_or_default().to_string(),
                close: record.get(close_col).and_then(|c| c.parse::<f64>().ok()),
            });
        }
        Ok(bars)
    }
}

#[async_trait]
impl PriceSource for CsvPriceAdapter {
    async fn get_prices(
        &self,
        tickers: &BTreeSet<String>,
        descriptor: BarDescriptor,
    ) -> Result<RawPriceHistory, FoliotrackError> {
        let mut history = RawPriceHistory::new();
        for ticker in tickers {
            let Some(path) = self.history_path(ticker, descriptor) else {
                tracing::debug!(%ticker, %descriptor, "no price history file");
                continue;
            };
            history.insert(ticker.clone(), Self::read_history(&path)?);
        }
        Ok(history)
    }
}
