//! Portfolio and order ledger access port.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::error::FoliotrackError;
use crate::domain::order::RawOrder;

/// Portfolio header record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Portfolio {
    pub id: String,
    pub user_id: String,
    pub name: String,
    /// Inception instant. `None` when the store has no creation time.
    pub created_at: Option<DateTime<Utc>>,
}

/// Read access to portfolios and their orders.
#[async_trait]
pub trait LedgerSource: Send + Sync {
    /// Fetch a portfolio owned by `user_id`.
    ///
    /// Returns [`FoliotrackError::NotFound`] both when the portfolio does
    /// not exist and when it belongs to another user.
    async fn get_portfolio(
        &self,
        user_id: &str,
        portfolio_id: &str,
    ) -> Result<Portfolio, FoliotrackError>;

    /// All orders of a portfolio, in no particular order.
    async fn get_orders(&self, portfolio_id: &str) -> Result<Vec<RawOrder>, FoliotrackError>;
}
