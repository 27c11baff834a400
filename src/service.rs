//! Request orchestration: validate, load the ledger, fetch prices under a
//! deadline, then run the pure pipeline.

use futures::future::join_all;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::config_validation::ServiceSettings;
use crate::domain::error::FoliotrackError;
use crate::domain::order::normalize_orders;
use crate::domain::performance::{compute_resolved, PerformanceReport};
use crate::domain::price_matrix::RawPriceHistory;
use crate::domain::series::SerializeOptions;
use crate::domain::window::{resolve_window, BarDescriptor, ResolvedWindow, VendorLimits, WindowLabel};
use crate::ports::clock_port::Clock;
use crate::ports::ledger_port::{LedgerSource, Portfolio};
use crate::ports::price_port::PriceSource;

const MAX_ID_LEN: usize = 64;

/// Reject identifiers that cannot name a portfolio or user.
pub fn validate_identifier(field: &str, value: &str) -> Result<(), FoliotrackError> {
    if value.is_empty() {
        return Err(FoliotrackError::validation(format!("{field} must not be empty")));
    }
    if value.len() > MAX_ID_LEN {
        return Err(FoliotrackError::validation(format!(
            "{field} longer than {MAX_ID_LEN} characters"
        )));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(FoliotrackError::validation(format!(
            "{field} may only contain letters, digits, '-' and '_'"
        )));
    }
    Ok(())
}

pub struct PerformanceService {
    ledger: Arc<dyn LedgerSource>,
    prices: Arc<dyn PriceSource>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
    batch_size: usize,
    limits: VendorLimits,
    output: SerializeOptions,
}

impl PerformanceService {
    pub fn new(
        ledger: Arc<dyn LedgerSource>,
        prices: Arc<dyn PriceSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            ledger,
            prices,
            clock,
            timeout: Duration::from_secs(10),
            batch_size: 8,
            limits: VendorLimits::default(),
            output: SerializeOptions::default(),
        }
    }

    /// Apply the price, vendor and output settings of a validated config.
    pub fn with_settings(self, settings: &ServiceSettings) -> Self {
        self.with_timeout(settings.timeout)
            .with_batch_size(settings.batch_size)
            .with_limits(settings.limits.clone())
            .with_output(settings.output.clone())
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_limits(mut self, limits: VendorLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_output(mut self, output: SerializeOptions) -> Self {
        self.output = output;
        self
    }

    async fn load_portfolio(
        &self,
        user_id: &str,
        portfolio_id: &str,
    ) -> Result<Portfolio, FoliotrackError> {
        validate_identifier("user_id", user_id)?;
        validate_identifier("portfolio_id", portfolio_id)?;
        self.ledger.get_portfolio(user_id, portfolio_id).await
    }

    /// Resolve a window for a portfolio without fetching prices.
    pub async fn resolve(
        &self,
        user_id: &str,
        portfolio_id: &str,
        window_label: &str,
    ) -> Result<ResolvedWindow, FoliotrackError> {
        let label: WindowLabel = window_label.parse()?;
        let portfolio = self.load_portfolio(user_id, portfolio_id).await?;
        let inception = match portfolio.created_at {
            Some(t) => Some(t),
            None => {
                let raw = self.ledger.get_orders(portfolio_id).await?;
                normalize_orders(&raw).first_instant()
            }
        };
        Ok(resolve_window(label, self.clock.now(), inception, &self.limits))
    }

    /// Compute the performance series of one portfolio.
    ///
    /// Validation and ownership failures are reported before any price is
    /// fetched. A price fetch that outlives the timeout aborts the whole
    /// computation with [`FoliotrackError::UpstreamTimeout`].
    pub async fn get_performance(
        &self,
        user_id: &str,
        portfolio_id: &str,
        window_label: &str,
    ) -> Result<PerformanceReport, FoliotrackError> {
        let label: WindowLabel = window_label.parse()?;
        let portfolio = self.load_portfolio(user_id, portfolio_id).await?;

        let raw = self.ledger.get_orders(portfolio_id).await?;
        let ledger = normalize_orders(&raw);
        let inception = portfolio.created_at.or_else(|| ledger.first_instant());
        let window = resolve_window(label, self.clock.now(), inception, &self.limits);

        let prices = self.fetch_prices(&ledger.tickers(), window.descriptor).await?;
        let report = compute_resolved(&ledger, &prices, &window, &self.output);

        report.quality.log(portfolio_id);
        tracing::info!(
            portfolio_id,
            window = %window.label,
            bars = report.series.len(),
            final_value = report.final_value(),
            "performance served"
        );
        Ok(report)
    }

    /// Fetch prices for `tickers` in concurrent batches under one deadline.
    async fn fetch_prices(
        &self,
        tickers: &BTreeSet<String>,
        descriptor: BarDescriptor,
    ) -> Result<RawPriceHistory, FoliotrackError> {
        if tickers.is_empty() {
            return Ok(RawPriceHistory::new());
        }

        let all: Vec<&String> = tickers.iter().collect();
        let batches: Vec<BTreeSet<String>> = all
            .chunks(self.batch_size)
            .map(|chunk| chunk.iter().map(|t| (*t).clone()).collect())
            .collect();

        let fetches = batches
            .iter()
            .map(|batch| self.prices.get_prices(batch, descriptor));

        let results = tokio::time::timeout(self.timeout, join_all(fetches))
            .await
            .map_err(|_| {
                tracing::warn!(
                    tickers = tickers.len(),
                    %descriptor,
                    timeout_secs = self.timeout.as_secs(),
                    "price fetch timed out"
                );
                FoliotrackError::UpstreamTimeout {
                    seconds: self.timeout.as_secs(),
                }
            })?;

        let mut history = RawPriceHistory::new();
        for result in results {
            history.extend(result?);
        }
        tracing::debug!(
            batches = batches.len(),
            priced = history.len(),
            requested = tickers.len(),
            "prices fetched"
        );
        Ok(history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_are_checked() {
        assert!(validate_identifier("portfolio_id", "p-1_A").is_ok());
        for bad in ["", "has space", "semi;colon", "é"] {
            let err = validate_identifier("portfolio_id", bad).unwrap_err();
            assert!(err.is_client_error(), "{bad:?}");
        }
        let long = "a".repeat(MAX_ID_LEN + 1);
        assert!(validate_identifier("user_id", &long).is_err());
    }
}
