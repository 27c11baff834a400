//! SQLite ledger adapter.

use async_trait::async_trait;
use chrono::SecondsFormat;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Value;
use rusqlite::{params, OptionalExtension, Row};

use crate::domain::config_validation::pool_size;
use crate::domain::error::FoliotrackError;
use crate::domain::instant::parse_instant;
use crate::domain::order::RawOrder;
use crate::ports::config_port::ConfigPort;
use crate::ports::ledger_port::{LedgerSource, Portfolio};

#[derive(Clone)]
pub struct SqliteLedgerAdapter {
    pool: Pool<SqliteConnectionManager>,
}

fn pool_error(e: r2d2::Error) -> FoliotrackError {
    FoliotrackError::Database {
        reason: e.to_string(),
    }
}

fn query_error(e: rusqlite::Error) -> FoliotrackError {
    FoliotrackError::DatabaseQuery {
        reason: e.to_string(),
    }
}

/// Ledger columns are loosely typed; read whatever is stored back as text.
fn text(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<String>> {
    Ok(match row.get::<_, Value>(idx)? {
        Value::Null | Value::Blob(_) => None,
        Value::Integer(i) => Some(i.to_string()),
        Value::Real(r) => Some(r.to_string()),
        Value::Text(s) => Some(s),
    })
}

impl SqliteLedgerAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, FoliotrackError> {
        let db_path =
            config
                .get_string("sqlite", "path")
                .ok_or_else(|| FoliotrackError::ConfigMissing {
                    section: "sqlite".into(),
                    key: "path".into(),
                })?;
        Self::open(SqliteConnectionManager::file(&db_path), pool_size(config)?)
    }

    pub fn in_memory() -> Result<Self, FoliotrackError> {
        Self::open(SqliteConnectionManager::memory(), 1)
    }

    fn open(manager: SqliteConnectionManager, pool_size: u32) -> Result<Self, FoliotrackError> {
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(pool_error)?;
        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, FoliotrackError> {
        self.pool.get().map_err(pool_error)
    }

    pub fn initialize_schema(&self) -> Result<(), FoliotrackError> {
        self.conn()?
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS portfolios (
                    id TEXT PRIMARY KEY,
                    user_id TEXT NOT NULL,
                    name TEXT NOT NULL DEFAULT '',
                    created_at TEXT
                );
                CREATE TABLE IF NOT EXISTS orders (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    portfolio_id TEXT NOT NULL REFERENCES portfolios(id),
                    ticker TEXT,
                    quantity,
                    price,
                    timestamp TEXT
                );
                CREATE INDEX IF NOT EXISTS idx_orders_portfolio ON orders(portfolio_id);",
            )
            .map_err(query_error)
    }

    pub fn insert_portfolio(&self, portfolio: &Portfolio) -> Result<(), FoliotrackError> {
        self.conn()?
            .execute(
                "INSERT OR REPLACE INTO portfolios (id, user_id, name, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    portfolio.id,
                    portfolio.user_id,
                    portfolio.name,
                    portfolio
                        .created_at
                        .map(|t| t.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
                ],
            )
            .map_err(query_error)?;
        Ok(())
    }

    pub fn insert_orders(
        &self,
        portfolio_id: &str,
        orders: &[RawOrder],
    ) -> Result<(), FoliotrackError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_error)?;
        for order in orders {
            tx.execute(
                "INSERT INTO orders (portfolio_id, ticker, quantity, price, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    portfolio_id,
                    order.ticker,
                    order.quantity,
                    order.price,
                    order.timestamp
                ],
            )
            .map_err(query_error)?;
        }
        tx.commit().map_err(query_error)?;
        Ok(())
    }

    fn find_portfolio(&self, portfolio_id: &str) -> Result<Option<Portfolio>, FoliotrackError> {
        self.conn()?
            .query_row(
                "SELECT id, user_id, name, created_at FROM portfolios WHERE id = ?1",
                params![portfolio_id],
                |row| {
                    let created_at: Option<String> = text(row, 3)?;
                    Ok(Portfolio {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        name: row.get(2)?,
                        created_at: created_at.as_deref().and_then(parse_instant),
                    })
                },
            )
            .optional()
            .map_err(query_error)
    }

    fn load_orders(&self, portfolio_id: &str) -> Result<Vec<RawOrder>, FoliotrackError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT ticker, quantity, price, timestamp FROM orders
                 WHERE portfolio_id = ?1 ORDER BY id",
            )
            .map_err(query_error)?;
        let rows = stmt
            .query_map(params![portfolio_id], |row| {
                Ok(RawOrder {
                    ticker: text(row, 0)?,
                    quantity: text(row, 1)?,
                    price: text(row, 2)?,
                    timestamp: text(row, 3)?,
                })
            })
            .map_err(query_error)?;

        let mut orders = Vec::new();
        for row in rows {
            orders.push(row.map_err(query_error)?);
        }
        Ok(orders)
    }
}

async fn blocking<T, F>(f: F) -> Result<T, FoliotrackError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, FoliotrackError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| FoliotrackError::Database {
            reason: format!("ledger task failed: {e}"),
        })?
}

#[async_trait]
impl LedgerSource for SqliteLedgerAdapter {
    async fn get_portfolio(
        &self,
        user_id: &str,
        portfolio_id: &str,
    ) -> Result<Portfolio, FoliotrackError> {
        let this = self.clone();
        let id = portfolio_id.to_string();
        let found = blocking(move || this.find_portfolio(&id)).await?;
        match found {
            Some(p) if p.user_id == user_id => Ok(p),
            _ => Err(FoliotrackError::NotFound {
                portfolio_id: portfolio_id.to_string(),
            }),
        }
    }

    async fn get_orders(&self, portfolio_id: &str) -> Result<Vec<RawOrder>, FoliotrackError> {
        let this = self.clone();
        let id = portfolio_id.to_string();
        let orders = blocking(move || this.load_orders(&id)).await?;
        tracing::debug!(portfolio_id, orders = orders.len(), "orders read from sqlite");
        Ok(orders)
    }
}
