//! # Device Pairing
//!
//! Device-authorization pairing flow (RFC 8628 style).
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Pairing Flow States                              │
//! │                                                                         │
//! │   Unpaired                                                              │
//! │      │ begin(): POST device-authorization                               │
//! │      ▼                                                                  │
//! │   AwaitingApproval ──── poll every `interval` ────┐                     │
//! │      │    display user_code + verification_uri    │                     │
//! │      │                                            │                     │
//! │      ├── token OK ──────────► Approved(identity)  │                     │
//! │      ├── access_denied ─────► Denied              │                     │
//! │      ├── expired / clock ───► Expired             │                     │
//! │      ├── cancel() ──────────► Cancelled           │                     │
//! │      └── authorization_pending / slow_down ───────┘ (keep polling)      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Polls are strictly sequential: one request in flight, then a full
//! interval of sleep. `slow_down` widens the interval by five seconds, per
//! the RFC. Expiry is also enforced locally against `expires_in`, so a
//! backend that stops answering cannot keep the flow alive forever.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, warn};

use atlas_core::types::TerminalIdentity;

use crate::backend::{BackendApi, DeviceAuthorization};
use crate::error::{PairingError, SyncResult};

/// How much `slow_down` widens the poll interval (RFC 8628 §3.5).
const SLOW_DOWN_INCREMENT: Duration = Duration::from_secs(5);

/// Terminal outcome of a pairing attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum PairingOutcome {
    /// Operator approved; the returned identity must be persisted.
    Approved(TerminalIdentity),
    /// Operator rejected the request.
    Denied,
    /// The device code expired before a decision.
    Expired,
    /// The terminal abandoned the attempt locally.
    Cancelled,
}

/// Cancellation handle for an in-flight pairing attempt.
///
/// Cancellation takes effect at the next poll boundary; an in-flight HTTP
/// request is not aborted.
#[derive(Debug, Clone, Default)]
pub struct PairingCancel(Arc<AtomicBool>);

impl PairingCancel {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Entry point for pairing. Holds the API handle; each attempt produces a
/// fresh [`PairingSession`].
pub struct PairingFlow {
    api: Arc<dyn BackendApi>,
}

impl PairingFlow {
    pub fn new(api: Arc<dyn BackendApi>) -> Self {
        PairingFlow { api }
    }

    /// Starts a pairing attempt: requests codes from the backend and returns
    /// the session to display and then await.
    pub async fn begin(&self, device_fingerprint: &str) -> SyncResult<PairingSession> {
        let authorization = self
            .api
            .request_device_authorization(device_fingerprint)
            .await?;

        info!(
            user_code = %authorization.user_code,
            expires_in = authorization.expires_in,
            "Pairing started"
        );

        let expires_at = Instant::now() + Duration::from_secs(authorization.expires_in);
        let interval = Duration::from_secs(authorization.interval);

        Ok(PairingSession {
            api: Arc::clone(&self.api),
            authorization,
            expires_at,
            interval,
            cancel: PairingCancel::default(),
        })
    }
}

/// One in-flight pairing attempt.
pub struct PairingSession {
    api: Arc<dyn BackendApi>,
    authorization: DeviceAuthorization,
    expires_at: Instant,
    interval: Duration,
    cancel: PairingCancel,
}

impl PairingSession {
    /// Code the operator types into the management console.
    pub fn user_code(&self) -> &str {
        &self.authorization.user_code
    }

    /// Where the operator approves the pairing.
    pub fn verification_uri(&self) -> &str {
        &self.authorization.verification_uri
    }

    /// Approval URI with the user code pre-filled, when the backend offers
    /// one (for QR display).
    pub fn verification_uri_complete(&self) -> Option<&str> {
        self.authorization.verification_uri_complete.as_deref()
    }

    /// Handle for abandoning this attempt from another task.
    pub fn cancel_handle(&self) -> PairingCancel {
        self.cancel.clone()
    }

    /// Polls until the operator decides, the code expires, or the attempt
    /// is cancelled.
    ///
    /// Only backend rejections of the request itself and non-retryable
    /// transport failures surface as `Err`; every ordinary ending is a
    /// [`PairingOutcome`].
    pub async fn wait_for_approval(mut self) -> Result<PairingOutcome, PairingError> {
        loop {
            if self.cancel.is_cancelled() {
                info!("Pairing cancelled");
                return Ok(PairingOutcome::Cancelled);
            }
            if Instant::now() >= self.expires_at {
                info!("Pairing expired before approval");
                return Ok(PairingOutcome::Expired);
            }

            tokio::time::sleep(self.interval).await;

            if self.cancel.is_cancelled() {
                info!("Pairing cancelled");
                return Ok(PairingOutcome::Cancelled);
            }

            match self.api.poll_token(&self.authorization.device_code).await {
                Ok(identity) => {
                    info!(device_id = %identity.device_id, "Pairing approved");
                    return Ok(PairingOutcome::Approved(identity));
                }
                Err(e) if e.is_pending() => {
                    if matches!(e, PairingError::SlowDown) {
                        self.interval += SLOW_DOWN_INCREMENT;
                        warn!(interval_secs = self.interval.as_secs(), "Backend requested slower polling");
                    }
                }
                Err(PairingError::AccessDenied) => {
                    info!("Pairing denied by operator");
                    return Ok(PairingOutcome::Denied);
                }
                Err(PairingError::ExpiredToken) => {
                    info!("Device code expired");
                    return Ok(PairingOutcome::Expired);
                }
                Err(PairingError::Transport(e)) if e.is_retryable() => {
                    // Transient network trouble: the local expiry bound
                    // still ends the flow eventually
                    warn!(error = %e, "Token poll failed, will retry");
                }
                Err(e) => return Err(e),
            }
        }
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
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use atlas_core::types::OfflineLimits;
    use crate::backend::{Dataset, DatasetPayload};
    use crate::error::SyncError;

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

    /// Scripted backend: hands out fixed codes, then pops poll responses
    /// in order. Running out of script is a test failure surfaced as an
    /// unexpected rejection.
    struct ScriptedBackend {
        expires_in: u64,
        interval: u64,
        polls: Mutex<VecDeque<Result<TerminalIdentity, PairingError>>>,
    }

    impl ScriptedBackend {
        fn new(
            expires_in: u64,
            interval: u64,
            polls: Vec<Result<TerminalIdentity, PairingError>>,
        ) -> Arc<Self> {
            Arc::new(ScriptedBackend {
                expires_in,
                interval,
                polls: Mutex::new(polls.into()),
            })
        }

        fn remaining_polls(&self) -> usize {
            self.polls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl BackendApi for ScriptedBackend {
        async fn request_device_authorization(
            &self,
            _fingerprint: &str,
        ) -> SyncResult<DeviceAuthorization> {
            Ok(DeviceAuthorization {
                device_code: "dc-1".into(),
                user_code: "WDJB-MJHT".into(),
                verification_uri: "https://example.com/activate".into(),
                verification_uri_complete: None,
                expires_in: self.expires_in,
                interval: self.interval,
            })
        }

        async fn poll_token(&self, _device_code: &str) -> Result<TerminalIdentity, PairingError> {
            self.polls
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(PairingError::Rejected("script exhausted".into())))
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
            _dataset: Dataset,
            _updated_since: Option<DateTime<Utc>>,
        ) -> SyncResult<Option<DatasetPayload>> {
            Ok(None)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_then_approved() {
        let backend = ScriptedBackend::new(
            1800,
            5,
            vec![
                Err(PairingError::AuthorizationPending),
                Err(PairingError::AuthorizationPending),
                Ok(identity()),
            ],
        );
        let flow = PairingFlow::new(backend.clone());

        let session = flow.begin("fp-1").await.unwrap();
        assert_eq!(session.user_code(), "WDJB-MJHT");

        let outcome = session.wait_for_approval().await.unwrap();
        assert_eq!(outcome, PairingOutcome::Approved(identity()));
        assert_eq!(backend.remaining_polls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_denied() {
        let backend = ScriptedBackend::new(
            1800,
            5,
            vec![
                Err(PairingError::AuthorizationPending),
                Err(PairingError::AccessDenied),
            ],
        );
        let flow = PairingFlow::new(backend.clone());

        let outcome = flow
            .begin("fp-1")
            .await
            .unwrap()
            .wait_for_approval()
            .await
            .unwrap();
        assert_eq!(outcome, PairingOutcome::Denied);
    }

    #[tokio::test(start_paused = true)]
    async fn test_local_expiry_stops_polling() {
        // 60s lifetime, 30s interval: polls at t=30 and t=60, then the
        // local clock guard ends the flow with no further requests
        let backend = ScriptedBackend::new(
            60,
            30,
            vec![
                Err(PairingError::AuthorizationPending),
                Err(PairingError::AuthorizationPending),
            ],
        );
        let flow = PairingFlow::new(backend.clone());

        let outcome = flow
            .begin("fp-1")
            .await
            .unwrap()
            .wait_for_approval()
            .await
            .unwrap();
        assert_eq!(outcome, PairingOutcome::Expired);
        assert_eq!(backend.remaining_polls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_token_from_backend() {
        let backend =
            ScriptedBackend::new(1800, 5, vec![Err(PairingError::ExpiredToken)]);
        let flow = PairingFlow::new(backend);

        let outcome = flow
            .begin("fp-1")
            .await
            .unwrap()
            .wait_for_approval()
            .await
            .unwrap();
        assert_eq!(outcome, PairingOutcome::Expired);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_down_widens_interval() {
        let backend = ScriptedBackend::new(
            1800,
            5,
            vec![Err(PairingError::SlowDown), Ok(identity())],
        );
        let flow = PairingFlow::new(backend);

        let start = Instant::now();
        let outcome = flow
            .begin("fp-1")
            .await
            .unwrap()
            .wait_for_approval()
            .await
            .unwrap();
        assert_eq!(outcome, PairingOutcome::Approved(identity()));

        // 5s to the first poll, then a widened 10s to the second
        assert_eq!(start.elapsed(), Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_any_poll() {
        let backend = ScriptedBackend::new(1800, 5, vec![]);
        let flow = PairingFlow::new(backend.clone());

        let session = flow.begin("fp-1").await.unwrap();
        session.cancel_handle().cancel();

        let outcome = session.wait_for_approval().await.unwrap();
        assert_eq!(outcome, PairingOutcome::Cancelled);
        assert_eq!(backend.remaining_polls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_transport_error_keeps_polling() {
        let backend = ScriptedBackend::new(
            1800,
            5,
            vec![
                Err(PairingError::Transport(SyncError::Timeout(5))),
                Ok(identity()),
            ],
        );
        let flow = PairingFlow::new(backend);

        let outcome = flow
            .begin("fp-1")
            .await
            .unwrap()
            .wait_for_approval()
            .await
            .unwrap();
        assert_eq!(outcome, PairingOutcome::Approved(identity()));
    }
}
