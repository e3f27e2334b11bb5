//! # Atlas Sync
//!
//! Everything that connects the terminal to the backend: hardware
//! fingerprinting, device-authorization pairing, identity lifecycle, and
//! reference-dataset sync.
//!
//! ## Crate Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           atlas-sync                                    │
//! │                                                                         │
//! │  fingerprint  ── stable hardware-derived device fingerprint             │
//! │  pairing      ── RFC 8628 style device-authorization state machine      │
//! │  identity     ── IdentityManager: cached load, background refresh       │
//! │  backend      ── BackendApi seam + reqwest client                       │
//! │  orchestrator ── dataset pull, table replace, cache invalidation        │
//! │  config       ── TOML + env configuration                               │
//! │  error        ── SyncError / PairingError taxonomies                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Typical Wiring
//! ```rust,ignore
//! let config = AtlasConfig::load_or_default(None);
//! let store = Store::open(DbConfig::new(&config.storage.database_path)).await?;
//! let api: Arc<dyn BackendApi> = Arc::new(BackendClient::new(
//!     config.backend_url(),
//!     config.client_id(),
//!     Duration::from_secs(config.backend.request_timeout_secs),
//! )?);
//!
//! let cache = ReferenceCache::new(store.reference());
//! cache.preload().await;
//!
//! let identity = IdentityManager::new(store.identity(), api.clone());
//! if identity.initialize().await?.is_some() {
//!     identity.spawn_refresh();
//! } else {
//!     let session = PairingFlow::new(api.clone())
//!         .begin(&fingerprint::device_fingerprint()?)
//!         .await?;
//!     // display session.user_code() / session.verification_uri() ...
//! }
//!
//! let orchestrator = SyncOrchestrator::new(api, store.reference(), cache, identity);
//! orchestrator.sync_all().await?;
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod identity;
pub mod orchestrator;
pub mod pairing;

pub use backend::{BackendApi, BackendClient, Dataset, DatasetPayload, DeviceAuthorization};
pub use config::AtlasConfig;
pub use error::{PairingError, SyncError, SyncResult};
pub use fingerprint::device_fingerprint;
pub use identity::{IdentityManager, RefreshOutcome};
pub use orchestrator::{affected_partitions, SyncOrchestrator, SyncReport};
pub use pairing::{PairingCancel, PairingFlow, PairingOutcome, PairingSession};
