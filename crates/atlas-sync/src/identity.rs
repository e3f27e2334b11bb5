//! # Identity Manager
//!
//! Owns the terminal's identity at runtime.
//!
//! ## Stale-While-Revalidate
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Identity Lifecycle                                 │
//! │                                                                         │
//! │  startup ──► load persisted identity ──► serve it IMMEDIATELY           │
//! │                      │                                                  │
//! │                      └──► spawn background refresh:                     │
//! │                           GET /registrations/by-fingerprint/{fp}        │
//! │                             200 ──► persist + swap whole record         │
//! │                             404 ──► keep the cached identity; the       │
//! │                                     backend re-validates on reconnect   │
//! │                             err ──► keep serving the cached identity    │
//! │                                                                         │
//! │  Order entry never waits on the network to know who the terminal is.   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The in-memory identity is an `Arc` swapped atomically under a lock:
//! readers hold a consistent snapshot, never a half-updated record.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use atlas_core::types::TerminalIdentity;
use atlas_db::IdentityRepository;

use crate::backend::BackendApi;
use crate::error::{SyncError, SyncResult};

/// What a background refresh found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Backend returned a registration; local copy replaced.
    Updated,
    /// Backend does not know this fingerprint right now. The cached
    /// identity stays; offline operation must not hinge on one 404.
    NotRegistered,
    /// No local identity to refresh.
    NotPaired,
}

/// Runtime owner of the terminal identity. Cheap to clone; clones share
/// the same state.
#[derive(Clone)]
pub struct IdentityManager {
    inner: Arc<Inner>,
}

struct Inner {
    repo: IdentityRepository,
    api: Arc<dyn BackendApi>,
    current: RwLock<Option<Arc<TerminalIdentity>>>,
}

impl IdentityManager {
    pub fn new(repo: IdentityRepository, api: Arc<dyn BackendApi>) -> Self {
        IdentityManager {
            inner: Arc::new(Inner {
                repo,
                api,
                current: RwLock::new(None),
            }),
        }
    }

    /// Loads the persisted identity into memory. Called once at startup,
    /// before any UI; no network involved.
    pub async fn initialize(&self) -> SyncResult<Option<Arc<TerminalIdentity>>> {
        let loaded = self.inner.repo.load().await?.map(Arc::new);
        match &loaded {
            Some(identity) => {
                info!(device_id = %identity.device_id, "Terminal identity loaded");
            }
            None => debug!("No persisted identity, terminal is unpaired"),
        }
        *self.inner.current.write().await = loaded.clone();
        Ok(loaded)
    }

    /// Current identity snapshot, if paired.
    pub async fn current(&self) -> Option<Arc<TerminalIdentity>> {
        self.inner.current.read().await.clone()
    }

    /// Current identity, or `NotPaired`.
    pub async fn require(&self) -> SyncResult<Arc<TerminalIdentity>> {
        self.current().await.ok_or(SyncError::NotPaired)
    }

    /// Records a freshly approved pairing: persists, then swaps in memory.
    pub async fn complete_pairing(&self, identity: TerminalIdentity) -> SyncResult<()> {
        self.inner.repo.store(&identity).await?;
        info!(device_id = %identity.device_id, "Pairing persisted");
        *self.inner.current.write().await = Some(Arc::new(identity));
        Ok(())
    }

    /// Drops the identity locally (unpair).
    pub async fn clear(&self) -> SyncResult<()> {
        self.inner.repo.clear().await?;
        *self.inner.current.write().await = None;
        info!("Terminal identity cleared");
        Ok(())
    }

    /// Re-fetches the registration by fingerprint and replaces the local
    /// record wholesale. Transport failures propagate; the caller decides
    /// whether to keep serving the cached identity (it is left untouched).
    pub async fn refresh(&self) -> SyncResult<RefreshOutcome> {
        let Some(current) = self.current().await else {
            return Ok(RefreshOutcome::NotPaired);
        };

        match self
            .inner
            .api
            .registration_by_fingerprint(&current.device_fingerprint)
            .await?
        {
            Some(fresh) => {
                self.inner.repo.store(&fresh).await?;
                *self.inner.current.write().await = Some(Arc::new(fresh));
                debug!("Terminal identity refreshed");
                Ok(RefreshOutcome::Updated)
            }
            None => {
                warn!("Registration not found on backend, keeping cached identity");
                Ok(RefreshOutcome::NotRegistered)
            }
        }
    }

    /// Fire-and-forget refresh for startup: the cached identity keeps
    /// serving while this runs, and a failure only logs.
    pub fn spawn_refresh(&self) {
        let manager = self.clone();
        tokio::spawn(async move {
            if let Err(e) = manager.refresh().await {
                warn!(error = %e, "Background identity refresh failed, keeping cached identity");
            }
        });
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
    use std::sync::Mutex;

    use atlas_core::types::OfflineLimits;
    use atlas_db::{DbConfig, Store};

    use crate::backend::{Dataset, DatasetPayload, DeviceAuthorization};
    use crate::error::PairingError;

    fn identity(location_name: &str) -> TerminalIdentity {
        TerminalIdentity {
            device_id: "dev-1".into(),
            device_fingerprint: "fp-1".into(),
            tenant_id: "tenant-1".into(),
            tenant_slug: "demo".into(),
            location_id: "loc-1".into(),
            location_name: location_name.into(),
            signing_secret: "secret".into(),
            offline_limits: OfflineLimits::default(),
        }
    }

    /// Backend fake whose by-fingerprint answer can be swapped per test.
    struct FixedBackend {
        registration: Mutex<Result<Option<TerminalIdentity>, ()>>,
    }

    impl FixedBackend {
        fn answering(reg: Option<TerminalIdentity>) -> Arc<Self> {
            Arc::new(FixedBackend {
                registration: Mutex::new(Ok(reg)),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(FixedBackend {
                registration: Mutex::new(Err(())),
            })
        }
    }

    #[async_trait]
    impl BackendApi for FixedBackend {
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
            self.registration
                .lock()
                .unwrap()
                .clone()
                .map_err(|_| SyncError::RequestFailed("connection refused".into()))
        }

        async fn pull_dataset(
            &self,
            _identity: &TerminalIdentity,
            _dataset: Dataset,
            _updated_since: Option<DateTime<Utc>>,
        ) -> SyncResult<Option<DatasetPayload>> {
            unimplemented!("not exercised here")
        }
    }

    async fn repo() -> IdentityRepository {
        Store::open(DbConfig::in_memory()).await.unwrap().identity()
    }

    #[tokio::test]
    async fn test_initialize_from_persisted() {
        let repo = repo().await;
        repo.store(&identity("Downtown")).await.unwrap();

        let manager = IdentityManager::new(repo, FixedBackend::answering(None));
        let loaded = manager.initialize().await.unwrap().unwrap();
        assert_eq!(loaded.location_name, "Downtown");
        assert!(manager.current().await.is_some());
    }

    #[tokio::test]
    async fn test_unpaired_terminal() {
        let manager = IdentityManager::new(repo().await, FixedBackend::answering(None));
        assert!(manager.initialize().await.unwrap().is_none());
        assert!(matches!(manager.require().await, Err(SyncError::NotPaired)));
        assert_eq!(manager.refresh().await.unwrap(), RefreshOutcome::NotPaired);
    }

    #[tokio::test]
    async fn test_refresh_replaces_whole_record() {
        let repo = repo().await;
        repo.store(&identity("Downtown")).await.unwrap();

        let manager = IdentityManager::new(
            repo.clone(),
            FixedBackend::answering(Some(identity("Uptown"))),
        );
        manager.initialize().await.unwrap();

        assert_eq!(manager.refresh().await.unwrap(), RefreshOutcome::Updated);
        assert_eq!(manager.current().await.unwrap().location_name, "Uptown");
        // Persisted copy replaced too
        assert_eq!(repo.load().await.unwrap().unwrap().location_name, "Uptown");
    }

    #[tokio::test]
    async fn test_refresh_not_registered_keeps_cached() {
        let repo = repo().await;
        repo.store(&identity("Downtown")).await.unwrap();

        let manager = IdentityManager::new(repo.clone(), FixedBackend::answering(None));
        manager.initialize().await.unwrap();

        assert_eq!(
            manager.refresh().await.unwrap(),
            RefreshOutcome::NotRegistered
        );
        assert_eq!(manager.current().await.unwrap().location_name, "Downtown");
        assert!(repo.load().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_refresh_failure_keeps_cached() {
        let repo = repo().await;
        repo.store(&identity("Downtown")).await.unwrap();

        let manager = IdentityManager::new(repo, FixedBackend::failing());
        manager.initialize().await.unwrap();

        assert!(manager.refresh().await.is_err());
        // Stale identity still served
        assert_eq!(manager.current().await.unwrap().location_name, "Downtown");
    }

    #[tokio::test]
    async fn test_complete_pairing_persists() {
        let repo = repo().await;
        let manager = IdentityManager::new(repo.clone(), FixedBackend::answering(None));
        manager.initialize().await.unwrap();

        manager.complete_pairing(identity("Downtown")).await.unwrap();
        assert!(manager.current().await.is_some());
        assert!(repo.load().await.unwrap().is_some());
    }
}
