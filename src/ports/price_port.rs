//! Market price access port.

use async_trait::async_trait;
use std::collections::BTreeSet;

use crate::domain::error::FoliotrackError;
use crate::domain::price_matrix::RawPriceHistory;
use crate::domain::window::BarDescriptor;

#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Closing prices for `tickers` at the bar size and range preset in
    /// `descriptor`.
    ///
    /// Tickers the vendor knows nothing about are simply absent from the
    /// result. Callers bound the call with their own deadline.
    async fn get_prices(
        &self,
        tickers: &BTreeSet<String>,
        descriptor: BarDescriptor,
    ) -> Result<RawPriceHistory, FoliotrackError>;
}
