//! # Reference Data Cache
//!
//! Read-through in-memory cache over the reference repositories.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        ReferenceCache                                   │
//! │                                                                         │
//! │   lookup ──► slot loaded? ──yes──► answer from memory                   │
//! │                  │                                                      │
//! │                  no                                                     │
//! │                  ▼                                                      │
//! │            load whole dataset from SQLite ──► fill slot ──► answer      │
//! │                                                                         │
//! │   sync completion ──► invalidate(partitions) ──► slots emptied,         │
//! │                       next lookup re-reads storage                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Hydration Is All-or-Nothing
//! A slot is either empty or holds the complete dataset. There is no
//! per-record negative caching: a lookup that misses in a loaded slot is an
//! authoritative "not found", not a reason to hit storage again.
//!
//! ## Failure Posture
//! A storage error during hydration is logged and degrades to a miss. The
//! slot stays empty, so the next lookup retries; order entry keeps working
//! off whatever it can resolve.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, warn};

use atlas_core::types::{
    CalculationSettings, Category, DiscountDefinition, ProductType, TaxRate,
};

use crate::error::DbResult;
use crate::repository::reference::ReferenceRepository;

// =============================================================================
// Partitions
// =============================================================================

/// Independently invalidatable regions of the cache.
///
/// Partitions are coarser than datasets on purpose: a tax change must also
/// flush calculation settings, a category change must flush everything that
/// joins against categories. The sync layer maps each pulled dataset onto
/// the partitions it touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CachePartition {
    /// Terminal-wide calculation settings.
    CalculationSettings,
    /// Categories, product types and tax rates.
    Relations,
    /// Discount definitions.
    Discounts,
}

impl CachePartition {
    pub const ALL: [CachePartition; 3] = [
        CachePartition::CalculationSettings,
        CachePartition::Relations,
        CachePartition::Discounts,
    ];

    pub const fn name(&self) -> &'static str {
        match self {
            CachePartition::CalculationSettings => "calculation_settings",
            CachePartition::Relations => "relations",
            CachePartition::Discounts => "discounts",
        }
    }
}

// =============================================================================
// Cache
// =============================================================================

/// One cache slot: empty until first use, then the complete dataset.
type Slot<T> = RwLock<Option<Arc<T>>>;

/// Read-through cache over the reference datasets.
///
/// An explicit object, created once at startup and passed to whoever needs
/// it; cloning shares the underlying slots.
#[derive(Debug, Clone)]
pub struct ReferenceCache {
    repo: ReferenceRepository,
    inner: Arc<CacheInner>,
}

#[derive(Debug, Default)]
struct CacheInner {
    settings: Slot<CalculationSettings>,
    categories: Slot<HashMap<String, Category>>,
    product_types: Slot<HashMap<String, ProductType>>,
    tax_rates: Slot<HashMap<String, TaxRate>>,
    discounts: Slot<HashMap<String, DiscountDefinition>>,
}

impl ReferenceCache {
    pub fn new(repo: ReferenceRepository) -> Self {
        ReferenceCache {
            repo,
            inner: Arc::new(CacheInner::default()),
        }
    }

    /// Warms every partition. Failures are logged and swallowed: startup
    /// must not depend on a complete warm, lookups re-hydrate on demand.
    pub async fn preload(&self) {
        if let Err(e) = self.settings().await {
            warn!(error = %e, "Preload of calculation settings failed");
        }
        if let Err(e) = self.load_categories().await {
            warn!(error = %e, "Preload of categories failed");
        }
        if let Err(e) = self.load_product_types().await {
            warn!(error = %e, "Preload of product types failed");
        }
        if let Err(e) = self.load_tax_rates().await {
            warn!(error = %e, "Preload of tax rates failed");
        }
        if let Err(e) = self.load_discounts().await {
            warn!(error = %e, "Preload of discounts failed");
        }
        debug!("Reference cache preload complete");
    }

    /// Empties the given partitions. The datasets are re-read from storage
    /// on the next lookup, not eagerly.
    pub async fn invalidate(&self, partitions: &[CachePartition]) {
        for partition in partitions {
            match partition {
                CachePartition::CalculationSettings => {
                    *self.inner.settings.write().await = None;
                }
                CachePartition::Relations => {
                    *self.inner.categories.write().await = None;
                    *self.inner.product_types.write().await = None;
                    *self.inner.tax_rates.write().await = None;
                }
                CachePartition::Discounts => {
                    *self.inner.discounts.write().await = None;
                }
            }
            debug!(partition = partition.name(), "Cache partition invalidated");
        }
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    /// Current calculation settings. `Ok(None)` means the dataset has never
    /// been synced.
    pub async fn settings(&self) -> DbResult<Option<Arc<CalculationSettings>>> {
        // Fast path: shared lock, already loaded
        if let Some(s) = self.inner.settings.read().await.as_ref() {
            return Ok(Some(Arc::clone(s)));
        }
        let mut slot = self.inner.settings.write().await;
        // Double-check: another task may have hydrated while we waited
        if let Some(s) = slot.as_ref() {
            return Ok(Some(Arc::clone(s)));
        }
        match self.repo.calculation_settings().await? {
            Some(settings) => {
                let settings = Arc::new(settings);
                *slot = Some(Arc::clone(&settings));
                Ok(Some(settings))
            }
            None => Ok(None),
        }
    }

    pub async fn category_by_id(&self, id: &str) -> Option<Category> {
        self.load_categories()
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "Category lookup degraded to miss");
                Arc::new(HashMap::new())
            })
            .get(id)
            .cloned()
    }

    pub async fn product_type_by_id(&self, id: &str) -> Option<ProductType> {
        self.load_product_types()
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "Product type lookup degraded to miss");
                Arc::new(HashMap::new())
            })
            .get(id)
            .cloned()
    }

    pub async fn tax_rate_by_id(&self, id: &str) -> Option<TaxRate> {
        self.load_tax_rates()
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "Tax rate lookup degraded to miss");
                Arc::new(HashMap::new())
            })
            .get(id)
            .cloned()
    }

    pub async fn discount_by_id(&self, id: &str) -> Option<DiscountDefinition> {
        self.all_discounts().await.get(id).cloned()
    }

    /// Every known discount definition, keyed by id. Degrades to empty on
    /// storage failure.
    pub async fn all_discounts(&self) -> Arc<HashMap<String, DiscountDefinition>> {
        self.load_discounts().await.unwrap_or_else(|e| {
            warn!(error = %e, "Discount lookup degraded to empty set");
            Arc::new(HashMap::new())
        })
    }

    /// Product type index as the discount engine consumes it. Degrades to
    /// empty on storage failure, which leaves every line eligible.
    pub async fn product_type_index(&self) -> Arc<HashMap<String, ProductType>> {
        self.load_product_types().await.unwrap_or_else(|e| {
            warn!(error = %e, "Product type index degraded to empty");
            Arc::new(HashMap::new())
        })
    }

    // =========================================================================
    // Hydration
    // =========================================================================

    async fn load_categories(&self) -> DbResult<Arc<HashMap<String, Category>>> {
        if let Some(m) = self.inner.categories.read().await.as_ref() {
            return Ok(Arc::clone(m));
        }
        let mut slot = self.inner.categories.write().await;
        if let Some(m) = slot.as_ref() {
            return Ok(Arc::clone(m));
        }
        let map: HashMap<_, _> = self
            .repo
            .all_categories()
            .await?
            .into_iter()
            .map(|c| (c.id.clone(), c))
            .collect();
        debug!(count = map.len(), "Hydrated categories");
        let map = Arc::new(map);
        *slot = Some(Arc::clone(&map));
        Ok(map)
    }

    async fn load_product_types(&self) -> DbResult<Arc<HashMap<String, ProductType>>> {
        if let Some(m) = self.inner.product_types.read().await.as_ref() {
            return Ok(Arc::clone(m));
        }
        let mut slot = self.inner.product_types.write().await;
        if let Some(m) = slot.as_ref() {
            return Ok(Arc::clone(m));
        }
        let map: HashMap<_, _> = self
            .repo
            .all_product_types()
            .await?
            .into_iter()
            .map(|t| (t.id.clone(), t))
            .collect();
        debug!(count = map.len(), "Hydrated product types");
        let map = Arc::new(map);
        *slot = Some(Arc::clone(&map));
        Ok(map)
    }

    async fn load_tax_rates(&self) -> DbResult<Arc<HashMap<String, TaxRate>>> {
        if let Some(m) = self.inner.tax_rates.read().await.as_ref() {
            return Ok(Arc::clone(m));
        }
        let mut slot = self.inner.tax_rates.write().await;
        if let Some(m) = slot.as_ref() {
            return Ok(Arc::clone(m));
        }
        let map: HashMap<_, _> = self
            .repo
            .all_tax_rates()
            .await?
            .into_iter()
            .map(|r| (r.id.clone(), r))
            .collect();
        debug!(count = map.len(), "Hydrated tax rates");
        let map = Arc::new(map);
        *slot = Some(Arc::clone(&map));
        Ok(map)
    }

    async fn load_discounts(&self) -> DbResult<Arc<HashMap<String, DiscountDefinition>>> {
        if let Some(m) = self.inner.discounts.read().await.as_ref() {
            return Ok(Arc::clone(m));
        }
        let mut slot = self.inner.discounts.write().await;
        if let Some(m) = slot.as_ref() {
            return Ok(Arc::clone(m));
        }
        let map: HashMap<_, _> = self
            .repo
            .all_discounts()
            .await?
            .into_iter()
            .map(|d| (d.id.clone(), d))
            .collect();
        debug!(count = map.len(), "Hydrated discounts");
        let map = Arc::new(map);
        *slot = Some(Arc::clone(&map));
        Ok(map)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{DbConfig, Store};

    fn category(id: &str, name: &str) -> Category {
        Category {
            id: id.into(),
            name: name.into(),
            parent_id: None,
            is_active: true,
        }
    }

    async fn store() -> Store {
        Store::open(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_read_through_hydration() {
        let store = store().await;
        store
            .reference()
            .replace_categories(&[category("c1", "Drinks")])
            .await
            .unwrap();

        let cache = ReferenceCache::new(store.reference());
        let got = cache.category_by_id("c1").await.unwrap();
        assert_eq!(got.name, "Drinks");

        // Loaded slot answers "not found" without touching storage
        assert!(cache.category_by_id("nope").await.is_none());
    }

    #[tokio::test]
    async fn test_stale_until_invalidated() {
        let store = store().await;
        let repo = store.reference();
        repo.replace_categories(&[category("c1", "Drinks")]).await.unwrap();

        let cache = ReferenceCache::new(store.reference());
        assert_eq!(cache.category_by_id("c1").await.unwrap().name, "Drinks");

        // Storage changes underneath; the loaded slot keeps serving old data
        repo.replace_categories(&[category("c1", "Beverages")]).await.unwrap();
        assert_eq!(cache.category_by_id("c1").await.unwrap().name, "Drinks");

        // Invalidation forces a re-read
        cache.invalidate(&[CachePartition::Relations]).await;
        assert_eq!(cache.category_by_id("c1").await.unwrap().name, "Beverages");
    }

    #[tokio::test]
    async fn test_relations_partition_covers_three_datasets() {
        let store = store().await;
        let repo = store.reference();
        repo.replace_categories(&[category("c1", "Drinks")]).await.unwrap();

        let cache = ReferenceCache::new(store.reference());
        cache.preload().await;

        repo.replace_categories(&[]).await.unwrap();
        repo.replace_product_types(&[]).await.unwrap();
        repo.replace_tax_rates(&[]).await.unwrap();

        // Discounts partition untouched by a Relations flush
        cache.invalidate(&[CachePartition::Relations]).await;
        assert!(cache.category_by_id("c1").await.is_none());
        assert!(cache.product_type_index().await.is_empty());
    }

    #[tokio::test]
    async fn test_settings_none_before_first_sync() {
        let store = store().await;
        let cache = ReferenceCache::new(store.reference());
        assert!(cache.settings().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_storage_error_degrades_to_miss() {
        let store = store().await;
        let repo = store.reference();
        repo.replace_categories(&[category("c1", "Drinks")]).await.unwrap();

        let cache = ReferenceCache::new(store.reference());
        store.close().await;

        // Hydration fails, lookup degrades instead of propagating
        assert!(cache.category_by_id("c1").await.is_none());
    }
}
