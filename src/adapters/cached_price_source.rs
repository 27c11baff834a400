//! Short-lived read-through cache in front of a [`PriceSource`].

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::domain::error::FoliotrackError;
use crate::domain::price_matrix::RawPriceHistory;
use crate::domain::window::BarDescriptor;
use crate::ports::price_port::PriceSource;

type CacheKey = (Vec<String>, BarDescriptor);

struct CacheEntry {
    fetched_at: Instant,
    history: Arc<RawPriceHistory>,
}

/// Caches vendor responses per (ticker set, bar descriptor) for `ttl`.
///
/// Entries are replaced whole on refill and never mutated; concurrent
/// misses for the same key each fetch and the last insert wins.
pub struct CachedPriceSource<S> {
    inner: S,
    ttl: Duration,
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
}

impl<S: PriceSource> CachedPriceSource<S> {
    pub fn new(inner: S, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get_or_fetch(
        &self,
        tickers: &BTreeSet<String>,
        descriptor: BarDescriptor,
    ) -> Result<Arc<RawPriceHistory>, FoliotrackError> {
        let key: CacheKey = (tickers.iter().cloned().collect(), descriptor);

        if let Some(entry) = self.entries.read().await.get(&key) {
            if entry.fetched_at.elapsed() < self.ttl {
                tracing::info!(tickers = key.0.len(), %descriptor, "price cache hit");
                return Ok(Arc::clone(&entry.history));
            }
        }

        let started = Instant::now();
        let history = Arc::new(self.inner.get_prices(tickers, descriptor).await?);
        tracing::info!(
            tickers = key.0.len(),
            %descriptor,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "price cache miss, fetched"
        );

        if !self.ttl.is_zero() {
            let mut entries = self.entries.write().await;
            let ttl = self.ttl;
            entries.retain(|_, e| e.fetched_at.elapsed() < ttl);
            entries.insert(
                key,
                CacheEntry {
                    fetched_at: Instant::now(),
                    history: Arc::clone(&history),
                },
            );
        }
        Ok(history)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

#[async_trait]
impl<S: PriceSource> PriceSource for CachedPriceSource<S> {
    async fn get_prices(
        &self,
        tickers: &BTreeSet<String>,
        descriptor: BarDescriptor,
    ) -> Result<RawPriceHistory, FoliotrackError> {
        let history = self.get_or_fetch(tickers, descriptor).await?;
        Ok(RawPriceHistory::clone(&history))
    }
}
