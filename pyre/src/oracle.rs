//! Market price resolution for the payment token.
//!
//! [`PriceOracle`] resolves a USD price per whole token from an ordered list of
//! [`PriceSource`]s, caching the last good price in a [`PriceCache`] it owns:
//!
//! 1. A cached price younger than the TTL (60 s by default) is returned without I/O.
//! 2. Otherwise sources are queried in order; the first strictly positive price
//!    wins and replaces the cache.
//! 3. If every source fails, the stale cached price is returned.
//! 4. Without any cached price, the configured static fallback price is used.
//! 5. Otherwise resolution fails with [`PriceError::Unavailable`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::error::{PriceError, PriceSourceError};

/// A market price source for a token.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Short name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Fetches the current USD price of one whole token of `mint`.
    async fn fetch_price(&self, mint: &str) -> Result<Decimal, PriceSourceError>;
}

/// A price observed at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricePoint {
    /// USD per whole token.
    pub price: Decimal,
    /// When the price was fetched.
    pub fetched_at: Instant,
}

/// Process-lifetime cache of the last good price.
///
/// Writes replace the single cached value, so concurrent writers resolve as
/// last-write-wins; readers may observe a value a few milliseconds old.
#[derive(Debug)]
pub struct PriceCache {
    ttl: Duration,
    state: RwLock<Option<PricePoint>>,
}

impl PriceCache {
    /// Creates an empty cache with the given TTL.
    #[must_use]
    pub const fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            state: RwLock::const_new(None),
        }
    }

    /// Returns the configured TTL.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the cached price if it is younger than the TTL.
    pub async fn fresh(&self) -> Option<Decimal> {
        let guard = self.state.read().await;
        let point = guard.as_ref()?;
        (point.fetched_at.elapsed() < self.ttl).then_some(point.price)
    }

    /// Returns the cached price regardless of age.
    pub async fn last(&self) -> Option<PricePoint> {
        *self.state.read().await
    }

    /// Stores a freshly fetched price.
    pub async fn set(&self, price: Decimal) {
        let mut guard = self.state.write().await;
        *guard = Some(PricePoint {
            price,
            fetched_at: Instant::now(),
        });
    }

    /// Drops the cached price.
    pub async fn clear(&self) {
        let mut guard = self.state.write().await;
        *guard = None;
    }
}

impl Default for PriceCache {
    fn default() -> Self {
        Self::new(PriceOracle::DEFAULT_CACHE_TTL)
    }
}

/// Resolves the USD price of the payment token.
pub struct PriceOracle {
    mint: Option<String>,
    sources: Vec<Arc<dyn PriceSource>>,
    cache: PriceCache,
    fallback_price: Option<Decimal>,
}

impl std::fmt::Debug for PriceOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriceOracle")
            .field("mint", &self.mint)
            .field(
                "sources",
                &self.sources.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .field("cache", &self.cache)
            .field("fallback_price", &self.fallback_price)
            .finish()
    }
}

impl PriceOracle {
    /// Default freshness window of a cached price.
    pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);

    /// Creates an oracle for `mint` with no sources.
    ///
    /// Without a mint, live sources are never queried.
    #[must_use]
    pub fn new(mint: Option<String>) -> Self {
        Self {
            mint,
            sources: Vec::new(),
            cache: PriceCache::default(),
            fallback_price: None,
        }
    }

    /// Appends a source. Sources are queried in insertion order.
    #[must_use]
    pub fn with_source(mut self, source: Arc<dyn PriceSource>) -> Self {
        self.sources.push(source);
        self
    }

    /// Sets the static price used when nothing was ever fetched.
    ///
    /// Non-positive prices are ignored.
    #[must_use]
    pub fn with_fallback_price(mut self, price: Option<Decimal>) -> Self {
        self.fallback_price = price.filter(|p| *p > Decimal::ZERO);
        self
    }

    /// Replaces the cache with an empty one using `ttl`.
    #[must_use]
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache = PriceCache::new(ttl);
        self
    }

    /// Returns the price cache.
    #[must_use]
    pub const fn cache(&self) -> &PriceCache {
        &self.cache
    }

    /// Resolves the current token price in USD.
    ///
    /// # Errors
    ///
    /// Returns [`PriceError::Unavailable`] if no source, cached price, or
    /// fallback price yields a positive value.
    pub async fn resolve_price(&self) -> Result<Decimal, PriceError> {
        if let Some(price) = self.cache.fresh().await {
            return Ok(price);
        }

        if let Some(mint) = self.mint.as_deref() {
            for source in &self.sources {
                match source.fetch_price(mint).await {
                    Ok(price) if price > Decimal::ZERO => {
                        self.cache.set(price).await;
                        #[cfg(feature = "telemetry")]
                        tracing::debug!(source = source.name(), %price, "Fetched token price");
                        return Ok(price);
                    }
                    #[cfg_attr(not(feature = "telemetry"), allow(unused_variables))]
                    Ok(price) => {
                        #[cfg(feature = "telemetry")]
                        tracing::debug!(source = source.name(), %price, "Ignoring non-positive price");
                    }
                    #[cfg_attr(not(feature = "telemetry"), allow(unused_variables))]
                    Err(err) => {
                        #[cfg(feature = "telemetry")]
                        tracing::debug!(source = source.name(), error = %err, "Price source failed, trying next");
                    }
                }
            }
        }

        if let Some(point) = self.cache.last().await {
            #[cfg(feature = "telemetry")]
            tracing::warn!(price = %point.price, "Using stale cached token price");
            return Ok(point.price);
        }

        if let Some(price) = self.fallback_price {
            #[cfg(feature = "telemetry")]
            tracing::warn!(%price, "Using static fallback token price");
            return Ok(price);
        }

        Err(PriceError::Unavailable)
    }

    /// Resolves the current token price, returning zero if it is unavailable.
    pub async fn resolve_price_safe(&self) -> Decimal {
        self.resolve_price().await.unwrap_or(Decimal::ZERO)
    }
}
