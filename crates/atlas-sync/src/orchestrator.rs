//! # Sync Orchestrator
//!
//! Pulls reference datasets from the backend, replaces the local tables,
//! and invalidates exactly the cache partitions the applied datasets touch.
//!
//! ## Sync Cycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         One Sync Cycle                                  │
//! │                                                                         │
//! │  for each dataset (categories, product_types, tax_rates,               │
//! │                    discounts, settings):                               │
//! │     1. read cursor from sync_state                                      │
//! │     2. pull snapshot (backend may answer "unchanged")                   │
//! │     3. replace the local table in one transaction                       │
//! │     4. advance the cursor                                               │
//! │                                                                         │
//! │  afterwards, ONCE:                                                      │
//! │     5. invalidate the union of partitions the APPLIED datasets map to   │
//! │     6. re-warm the cache                                                │
//! │                                                                         │
//! │  A dataset that fails to pull or apply is skipped whole: its table      │
//! │  keeps the previous snapshot and none of its partitions are flushed.    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dataset → Partition Mapping
//! The mapping is static and deliberately over-invalidates: a tax change
//! flushes calculation settings because settings derive from tax state, and
//! product types sit in both the relation partition and the settings one.
//! Re-reading an unchanged dataset from SQLite is cheap; serving a stale
//! price calculation is not.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use atlas_db::{CachePartition, ReferenceCache, ReferenceRepository};

use crate::backend::{BackendApi, Dataset, DatasetPayload};
use crate::error::{SyncError, SyncResult};
use crate::identity::IdentityManager;

/// Cache partitions a dataset's change ripples into.
pub fn affected_partitions(dataset: Dataset) -> &'static [CachePartition] {
    match dataset {
        Dataset::Categories => &[CachePartition::Relations],
        Dataset::ProductTypes => {
            &[CachePartition::Relations, CachePartition::CalculationSettings]
        }
        Dataset::TaxRates => {
            &[CachePartition::Relations, CachePartition::CalculationSettings]
        }
        Dataset::Discounts => &[CachePartition::Discounts],
        Dataset::Settings => &[CachePartition::CalculationSettings],
    }
}

/// What one sync cycle did.
#[derive(Debug, Default)]
pub struct SyncReport {
    /// Datasets whose snapshot was applied.
    pub applied: Vec<Dataset>,
    /// Datasets the backend reported unchanged.
    pub unchanged: Vec<Dataset>,
    /// Datasets that failed to pull or apply, with the reason.
    pub failed: Vec<(Dataset, SyncError)>,
    /// Partitions invalidated at the end of the cycle.
    pub invalidated: Vec<CachePartition>,
}

impl SyncReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Drives sync cycles. One instance per process.
pub struct SyncOrchestrator {
    api: Arc<dyn BackendApi>,
    repo: ReferenceRepository,
    cache: ReferenceCache,
    identity: IdentityManager,
}

impl SyncOrchestrator {
    pub fn new(
        api: Arc<dyn BackendApi>,
        repo: ReferenceRepository,
        cache: ReferenceCache,
        identity: IdentityManager,
    ) -> Self {
        SyncOrchestrator {
            api,
            repo,
            cache,
            identity,
        }
    }

    /// Runs one full sync cycle over every dataset.
    ///
    /// Fails fast only when the terminal is unpaired; per-dataset failures
    /// are collected in the report and the cycle continues.
    pub async fn sync_all(&self) -> SyncResult<SyncReport> {
        let identity = self.identity.require().await?;
        let cycle_id = uuid::Uuid::new_v4();
        info!(%cycle_id, device_id = %identity.device_id, "Sync cycle started");
        let mut report = SyncReport::default();

        for dataset in Dataset::ALL {
            let started_at = Utc::now();
            let cursor = match self.repo.last_synced_at(dataset.name()).await {
                Ok(cursor) => cursor,
                Err(e) => {
                    warn!(dataset = %dataset, error = %e, "Cursor read failed, skipping dataset");
                    report.failed.push((dataset, e.into()));
                    continue;
                }
            };

            match self.api.pull_dataset(&identity, dataset, cursor).await {
                Ok(Some(payload)) => match self.apply(payload).await {
                    Ok(()) => {
                        if let Err(e) =
                            self.repo.set_last_synced_at(dataset.name(), started_at).await
                        {
                            warn!(dataset = %dataset, error = %e, "Cursor write failed");
                        }
                        report.applied.push(dataset);
                    }
                    Err(e) => {
                        warn!(dataset = %dataset, error = %e, "Snapshot apply failed");
                        report.failed.push((dataset, e));
                    }
                },
                Ok(None) => report.unchanged.push(dataset),
                Err(e) => {
                    warn!(dataset = %dataset, error = %e, "Dataset pull failed");
                    report.failed.push((dataset, e));
                }
            }
        }

        // Invalidate once, for the union of what actually changed locally.
        // Unchanged and failed datasets left their tables alone, so their
        // partitions keep serving.
        let mut partitions: HashSet<CachePartition> = HashSet::new();
        for dataset in &report.applied {
            partitions.extend(affected_partitions(*dataset));
        }
        report.invalidated = partitions.into_iter().collect();

        if !report.invalidated.is_empty() {
            self.cache.invalidate(&report.invalidated).await;
            self.cache.preload().await;
        }

        info!(
            %cycle_id,
            applied = report.applied.len(),
            unchanged = report.unchanged.len(),
            failed = report.failed.len(),
            "Sync cycle finished"
        );
        Ok(report)
    }

    async fn apply(&self, payload: DatasetPayload) -> SyncResult<()> {
        match payload {
            DatasetPayload::Categories(records) => {
                self.repo.replace_categories(&records).await?
            }
            DatasetPayload::ProductTypes(records) => {
                self.repo.replace_product_types(&records).await?
            }
            DatasetPayload::TaxRates(records) => self.repo.replace_tax_rates(&records).await?,
            DatasetPayload::Discounts(records) => self.repo.replace_discounts(&records).await?,
            DatasetPayload::Settings(Some(settings)) => {
                self.repo.replace_calculation_settings(&settings).await?
            }
            // A backend with no settings row yet is not an error; keep
            // whatever we have
            DatasetPayload::Settings(None) => {}
        }
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::collections::HashMap;
    use std::sync::Mutex;

    use atlas_core::types::{Category, OfflineLimits, TerminalIdentity};
    use atlas_db::{DbConfig, Store};

    use crate::backend::DeviceAuthorization;
    use crate::error::PairingError;

    fn identity() -> TerminalIdentity {
        TerminalIdentity {
            device_id: "dev-1".into(),
            device_fingerprint: "fp-1".into(),
            tenant_id: "tenant-1".into(),
            tenant_slug: "demo".into(),
            location_id: "loc-1".into(),
            location_name: "Downtown".into(),
            signing_secret: "secret".into(),
            offline_limits: OfflineLimits::default(),
        }
    }

    fn category(id: &str, name: &str) -> Category {
        Category {
            id: id.into(),
            name: name.into(),
            parent_id: None,
            is_active: true,
        }
    }

    /// Per-dataset scripted pulls: `Some(payload)` applies, `None` means
    /// unchanged, absent datasets fail with a transport error.
    struct ScriptedPulls {
        responses: Mutex<HashMap<Dataset, Option<DatasetPayload>>>,
        cursors_seen: Mutex<HashMap<Dataset, Option<DateTime<Utc>>>>,
    }

    impl ScriptedPulls {
        fn new(responses: HashMap<Dataset, Option<DatasetPayload>>) -> Arc<Self> {
            Arc::new(ScriptedPulls {
                responses: Mutex::new(responses),
                cursors_seen: Mutex::new(HashMap::new()),
            })
        }

        fn all_unchanged() -> Arc<Self> {
            Self::new(Dataset::ALL.iter().map(|d| (*d, None)).collect())
        }
    }

    #[async_trait]
    impl BackendApi for ScriptedPulls {
        async fn request_device_authorization(
            &self,
            _fingerprint: &str,
        ) -> SyncResult<DeviceAuthorization> {
            unimplemented!("not exercised here")
        }

        async fn poll_token(&self, _device_code: &str) -> Result<TerminalIdentity, PairingError> {
            unimplemented!("not exercised here")
        }

        async fn registration_by_fingerprint(
            &self,
            _fingerprint: &str,
        ) -> SyncResult<Option<TerminalIdentity>> {
            Ok(None)
        }

        async fn pull_dataset(
            &self,
            _identity: &TerminalIdentity,
            dataset: Dataset,
            updated_since: Option<DateTime<Utc>>,
        ) -> SyncResult<Option<DatasetPayload>> {
            self.cursors_seen
                .lock()
                .unwrap()
                .insert(dataset, updated_since);
            match self.responses.lock().unwrap().get(&dataset) {
                Some(response) => Ok(response.clone()),
                None => Err(SyncError::RequestFailed("connection refused".into())),
            }
        }
    }

    async fn orchestrator_with(
        api: Arc<ScriptedPulls>,
    ) -> (SyncOrchestrator, ReferenceCache, ReferenceRepository) {
        let store = Store::open(DbConfig::in_memory()).await.unwrap();
        let repo = store.reference();
        let cache = ReferenceCache::new(store.reference());

        let manager = IdentityManager::new(store.identity(), api.clone());
        manager.complete_pairing(identity()).await.unwrap();

        (
            SyncOrchestrator::new(api, repo.clone(), cache.clone(), manager),
            cache,
            repo,
        )
    }

    #[tokio::test]
    async fn test_applied_snapshot_lands_in_cache() {
        let mut responses: HashMap<Dataset, Option<DatasetPayload>> =
            Dataset::ALL.iter().map(|d| (*d, None)).collect();
        responses.insert(
            Dataset::Categories,
            Some(DatasetPayload::Categories(vec![category("c1", "Drinks")])),
        );
        let api = ScriptedPulls::new(responses);
        let (orchestrator, cache, _) = orchestrator_with(api).await;

        // Cache holds the pre-sync (empty) snapshot
        assert!(cache.category_by_id("c1").await.is_none());

        let report = orchestrator.sync_all().await.unwrap();
        assert_eq!(report.applied, vec![Dataset::Categories]);
        assert_eq!(report.unchanged.len(), 4);
        assert!(report.is_clean());
        assert!(report.invalidated.contains(&CachePartition::Relations));

        assert_eq!(cache.category_by_id("c1").await.unwrap().name, "Drinks");
    }

    #[tokio::test]
    async fn test_unchanged_datasets_invalidate_nothing() {
        let api = ScriptedPulls::all_unchanged();
        let (orchestrator, _, _) = orchestrator_with(api).await;

        let report = orchestrator.sync_all().await.unwrap();
        assert!(report.applied.is_empty());
        assert!(report.invalidated.is_empty());
        assert_eq!(report.unchanged.len(), Dataset::ALL.len());
    }

    #[tokio::test]
    async fn test_failed_dataset_keeps_previous_snapshot() {
        // Seed categories, then fail the categories pull
        let mut responses: HashMap<Dataset, Option<DatasetPayload>> =
            Dataset::ALL.iter().map(|d| (*d, None)).collect();
        responses.remove(&Dataset::Categories);
        let api = ScriptedPulls::new(responses);
        let (orchestrator, cache, repo) = orchestrator_with(api).await;

        repo.replace_categories(&[category("c1", "Drinks")]).await.unwrap();
        cache.preload().await;

        let report = orchestrator.sync_all().await.unwrap();
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, Dataset::Categories);
        // Nothing applied, nothing flushed; the old snapshot serves on
        assert!(report.invalidated.is_empty());
        assert_eq!(cache.category_by_id("c1").await.unwrap().name, "Drinks");
        assert_eq!(repo.all_categories().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cursor_advances_only_on_apply() {
        let mut responses: HashMap<Dataset, Option<DatasetPayload>> =
            Dataset::ALL.iter().map(|d| (*d, None)).collect();
        responses.insert(
            Dataset::Discounts,
            Some(DatasetPayload::Discounts(vec![])),
        );
        let api = ScriptedPulls::new(responses);
        let (orchestrator, _, repo) = orchestrator_with(api.clone()).await;

        orchestrator.sync_all().await.unwrap();

        assert!(repo.last_synced_at("discounts").await.unwrap().is_some());
        assert!(repo.last_synced_at("categories").await.unwrap().is_none());

        // First cycle had no cursor to send
        assert_eq!(
            api.cursors_seen.lock().unwrap()[&Dataset::Discounts],
            None
        );

        // Second cycle sends the cursor recorded by the first
        orchestrator.sync_all().await.unwrap();
        assert!(api.cursors_seen.lock().unwrap()[&Dataset::Discounts].is_some());
    }

    #[tokio::test]
    async fn test_partition_mapping() {
        assert_eq!(
            affected_partitions(Dataset::Categories),
            &[CachePartition::Relations]
        );
        assert!(affected_partitions(Dataset::TaxRates)
            .contains(&CachePartition::CalculationSettings));
        assert!(affected_partitions(Dataset::ProductTypes)
            .contains(&CachePartition::Relations));
        assert_eq!(
            affected_partitions(Dataset::Discounts),
            &[CachePartition::Discounts]
        );
        assert_eq!(
            affected_partitions(Dataset::Settings),
            &[CachePartition::CalculationSettings]
        );
    }

    #[tokio::test]
    async fn test_unpaired_terminal_cannot_sync() {
        let api = ScriptedPulls::all_unchanged();
        let store = Store::open(DbConfig::in_memory()).await.unwrap();
        let cache = ReferenceCache::new(store.reference());
        let manager = IdentityManager::new(store.identity(), api.clone());
        manager.initialize().await.unwrap();

        let orchestrator =
            SyncOrchestrator::new(api, store.reference(), cache, manager);
        assert!(matches!(
            orchestrator.sync_all().await,
            Err(SyncError::NotPaired)
        ));
    }
}
