#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use foliotrack::adapters::system_clock::FixedClock;
use foliotrack::domain::error::FoliotrackError;
use foliotrack::domain::order::RawOrder;
pub use foliotrack::domain::price_matrix::{RawPriceBar, RawPriceHistory};
use foliotrack::domain::window::BarDescriptor;
use foliotrack::ports::ledger_port::{LedgerSource, Portfolio};
use foliotrack::ports::price_port::PriceSource;
use foliotrack::service::PerformanceService;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub struct MockLedgerSource {
    pub portfolios: HashMap<String, Portfolio>,
    pub orders: HashMap<String, Vec<RawOrder>>,
}

impl MockLedgerSource {
    pub fn new() -> Self {
        Self {
            portfolios: HashMap::new(),
            orders: HashMap::new(),
        }
    }

    pub fn with_portfolio(
        mut self,
        id: &str,
        user_id: &str,
        created_at: Option<DateTime<Utc>>,
        orders: Vec<RawOrder>,
    ) -> Self {
        self.portfolios.insert(
            id.to_string(),
            Portfolio {
                id: id.to_string(),
                user_id: user_id.to_string(),
                name: format!("portfolio {id}"),
                created_at,
            },
        );
        self.orders.insert(id.to_string(), orders);
        self
    }
}

#[async_trait]
impl LedgerSource for MockLedgerSource {
    async fn get_portfolio(
        &self,
        user_id: &str,
        portfolio_id: &str,
    ) -> Result<Portfolio, FoliotrackError> {
        match self.portfolios.get(portfolio_id) {
            Some(p) if p.user_id == user_id => Ok(p.clone()),
            _ => Err(FoliotrackError::NotFound {
                portfolio_id: portfolio_id.to_string(),
            }),
        }
    }

    async fn get_orders(&self, portfolio_id: &str) -> Result<Vec<RawOrder>, FoliotrackError> {
        Ok(self.orders.get(portfolio_id).cloned().unwrap_or_default())
    }
}

/// Serves a fixed history, optionally after a delay, and records requests.
pub struct MockPriceSource {
    pub history: RawPriceHistory,
    pub delay: Option<Duration>,
    pub error: Option<String>,
    pub calls: Arc<AtomicUsize>,
    pub requests: Arc<Mutex<Vec<(BTreeSet<String>, BarDescriptor)>>>,
}

impl MockPriceSource {
    pub fn new() -> Self {
        Self {
            history: RawPriceHistory::new(),
            delay: None,
            error: None,
            calls: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_bars(mut self, ticker: &str, bars: &[(&str, f64)]) -> Self {
        self.history.insert(
            ticker.to_string(),
            bars.iter().map(|(t, c)| RawPriceBar::new(t, *c)).collect(),
        );
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_error(mut self, reason: &str) -> Self {
        self.error = Some(reason.to_string());
        self
    }
}

#[async_trait]
impl PriceSource for MockPriceSource {
    async fn get_prices(
        &self,
        tickers: &BTreeSet<String>,
        descriptor: BarDescriptor,
    ) -> Result<RawPriceHistory, FoliotrackError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap()
            .push((tickers.clone(), descriptor));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(reason) = &self.error {
            return Err(FoliotrackError::Upstream {
                reason: reason.clone(),
            });
        }
        Ok(self
            .history
            .iter()
            .filter(|(t, _)| tickers.contains(*t))
            .map(|(t, b)| (t.clone(), b.clone()))
            .collect())
    }
}

pub fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
}

pub fn cash(amount: f64, ts: &str) -> RawOrder {
    RawOrder::new(None, &amount.to_string(), "", ts)
}

pub fn trade(ticker: &str, quantity: f64, price: f64, ts: &str) -> RawOrder {
    RawOrder::new(Some(ticker), &quantity.to_string(), &price.to_string(), ts)
}

pub fn service(
    ledger: MockLedgerSource,
    prices: MockPriceSource,
    now: DateTime<Utc>,
) -> PerformanceService {
    PerformanceService::new(Arc::new(ledger), Arc::new(prices), Arc::new(FixedClock(now)))
}

pub fn write_file(dir: &std::path::Path, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}
