//! In-memory caching using moka
//!
//! Tier sets are read on every price preview and quote. They only change
//! through the tier endpoints, which invalidate the affected entry. Billing
//! never reads through this cache.

use moka::future::Cache;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use crate::pricing::models::PriceTier;

/// Application cache holding tier sets per room price
#[derive(Clone)]
pub struct AppCache {
    /// Room price id -> tiers sorted by from_minutes
    pub tiers: Cache<Uuid, Arc<Vec<PriceTier>>>,
}

impl AppCache {
    /// Create a new cache instance with configured TTLs
    pub fn new() -> Self {
        Self {
            // 1000 tier sets, 30 min TTL, 10 min idle
            tiers: Cache::builder()
                .max_capacity(1000)
                .time_to_live(Duration::from_secs(30 * 60))
                .time_to_idle(Duration::from_secs(10 * 60))
                .build(),
        }
    }

    /// Get cache statistics for monitoring
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            tier_sets: self.tiers.entry_count(),
        }
    }

    /// Drop the cached tier set of one price
    pub async fn invalidate_tiers(&self, price_id: Uuid) {
        self.tiers.invalidate(&price_id).await;
        info!("Tier cache invalidated for price {}", price_id);
    }
}

impl Default for AppCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Cache statistics for the health endpoint
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub tier_sets: u64,
}
