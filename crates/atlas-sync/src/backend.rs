//! # Backend Client
//!
//! HTTP/JSON client for the backend API: device-authorization pairing,
//! registration lookup, and reference-dataset pulls.
//!
//! ## API Seam
//! Everything that performs network I/O sits behind [`BackendApi`], so the
//! pairing state machine and the sync orchestrator can be driven by scripted
//! fakes in tests. [`BackendClient`] is the real implementation over reqwest.
//!
//! ## Endpoints
//! ```text
//! POST /terminals/pairing/device-authorization/     start pairing
//! POST /terminals/pairing/token/                    poll for approval
//! GET  /terminals/registrations/by-fingerprint/{fp} recover registration
//! GET  /terminals/sync/datasets/{name}/             pull one dataset
//! ```
//!
//! Authenticated requests carry `X-Device-ID` and `X-Location-ID` headers
//! from the terminal identity.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use atlas_core::types::{
    CalculationSettings, Category, DiscountDefinition, ProductType, TaxRate, TerminalIdentity,
};

use crate::error::{PairingError, SyncError, SyncResult};

/// OAuth grant type for the device-authorization token exchange (RFC 8628).
pub const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";

// =============================================================================
// Datasets
// =============================================================================

/// Reference datasets the backend serves, in pull order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dataset {
    Categories,
    ProductTypes,
    TaxRates,
    Discounts,
    Settings,
}

impl Dataset {
    pub const ALL: [Dataset; 5] = [
        Dataset::Categories,
        Dataset::ProductTypes,
        Dataset::TaxRates,
        Dataset::Discounts,
        Dataset::Settings,
    ];

    /// Wire name, also the key in the local `sync_state` table.
    pub const fn name(&self) -> &'static str {
        match self {
            Dataset::Categories => "categories",
            Dataset::ProductTypes => "product_types",
            Dataset::TaxRates => "tax_rates",
            Dataset::Discounts => "discounts",
            Dataset::Settings => "settings",
        }
    }
}

impl std::fmt::Display for Dataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One pulled dataset, typed per dataset.
#[derive(Debug, Clone)]
pub enum DatasetPayload {
    Categories(Vec<Category>),
    ProductTypes(Vec<ProductType>),
    TaxRates(Vec<TaxRate>),
    Discounts(Vec<DiscountDefinition>),
    Settings(Option<CalculationSettings>),
}

impl DatasetPayload {
    pub fn dataset(&self) -> Dataset {
        match self {
            DatasetPayload::Categories(_) => Dataset::Categories,
            DatasetPayload::ProductTypes(_) => Dataset::ProductTypes,
            DatasetPayload::TaxRates(_) => Dataset::TaxRates,
            DatasetPayload::Discounts(_) => Dataset::Discounts,
            DatasetPayload::Settings(_) => Dataset::Settings,
        }
    }
}

// =============================================================================
// Wire Types
// =============================================================================

/// Response to a device-authorization request (RFC 8628 §3.2).
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceAuthorization {
    /// Opaque code the terminal presents when polling.
    pub device_code: String,
    /// Short human code the operator types into the management console.
    pub user_code: String,
    /// Where the operator goes to approve.
    pub verification_uri: String,
    /// Convenience URI with the user code pre-filled, when offered.
    #[serde(default)]
    pub verification_uri_complete: Option<String>,
    /// Lifetime of the device code, seconds.
    pub expires_in: u64,
    /// Minimum seconds between token polls.
    #[serde(default = "default_poll_interval")]
    pub interval: u64,
}

fn default_poll_interval() -> u64 {
    5
}

#[derive(Serialize)]
struct DeviceAuthorizationRequest<'a> {
    client_id: &'a str,
    device_fingerprint: &'a str,
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    grant_type: &'a str,
    device_code: &'a str,
    client_id: &'a str,
}

/// OAuth-style error body on a pending/denied token poll.
#[derive(Debug, Deserialize)]
struct TokenErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Deserialize)]
struct DatasetEnvelope<T> {
    records: Vec<T>,
}

// =============================================================================
// API Trait
// =============================================================================

/// Backend operations the pairing flow, identity manager and orchestrator
/// depend on. Implemented by [`BackendClient`]; fakeable in tests.
#[async_trait]
pub trait BackendApi: Send + Sync {
    /// Starts a pairing attempt; returns the codes to display.
    async fn request_device_authorization(
        &self,
        device_fingerprint: &str,
    ) -> SyncResult<DeviceAuthorization>;

    /// Polls for the operator's decision on a pairing attempt.
    async fn poll_token(&self, device_code: &str) -> Result<TerminalIdentity, PairingError>;

    /// Looks up an existing registration by hardware fingerprint.
    /// `Ok(None)` means this device has never been paired.
    async fn registration_by_fingerprint(
        &self,
        device_fingerprint: &str,
    ) -> SyncResult<Option<TerminalIdentity>>;

    /// Pulls one reference dataset as a complete snapshot.
    ///
    /// `updated_since` lets the backend answer "nothing changed" cheaply,
    /// reported here as `Ok(None)`. A `Some` payload is always the full
    /// dataset, never a partial delta.
    async fn pull_dataset(
        &self,
        identity: &TerminalIdentity,
        dataset: Dataset,
        updated_since: Option<DateTime<Utc>>,
    ) -> SyncResult<Option<DatasetPayload>>;
}

// =============================================================================
// HTTP Implementation
// =============================================================================

/// reqwest-backed [`BackendApi`] implementation.
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
    client_id: String,
}

impl BackendClient {
    pub fn new(base_url: &str, client_id: &str, timeout: std::time::Duration) -> SyncResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Internal(format!("HTTP client build failed: {}", e)))?;

        Ok(BackendClient {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            client_id: client_id.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Reads the body of a non-success response into a `BadStatus` error.
    async fn bad_status(response: reqwest::Response) -> SyncError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        SyncError::BadStatus { status, body }
    }

    fn device_headers(
        builder: reqwest::RequestBuilder,
        identity: &TerminalIdentity,
    ) -> reqwest::RequestBuilder {
        builder
            .header("X-Device-ID", &identity.device_id)
            .header("X-Location-ID", &identity.location_id)
    }

    async fn pull_envelope<T: serde::de::DeserializeOwned>(
        &self,
        identity: &TerminalIdentity,
        dataset: Dataset,
        updated_since: Option<DateTime<Utc>>,
    ) -> SyncResult<Option<Vec<T>>> {
        let mut request = Self::device_headers(
            self.http
                .get(self.url(&format!("/terminals/sync/datasets/{}/", dataset.name()))),
            identity,
        );
        if let Some(since) = updated_since {
            request = request.query(&[("updated_since", since.to_rfc3339())]);
        }

        let response = request.send().await?;
        if response.status() == StatusCode::NOT_MODIFIED {
            debug!(dataset = %dataset, "Dataset unchanged");
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Self::bad_status(response).await);
        }
        let envelope: DatasetEnvelope<T> = response.json().await?;
        debug!(dataset = %dataset, count = envelope.records.len(), "Dataset pulled");
        Ok(Some(envelope.records))
    }
}

#[async_trait]
impl BackendApi for BackendClient {
    async fn request_device_authorization(
        &self,
        device_fingerprint: &str,
    ) -> SyncResult<DeviceAuthorization> {
        let response = self
            .http
            .post(self.url("/terminals/pairing/device-authorization/"))
            .json(&DeviceAuthorizationRequest {
                client_id: &self.client_id,
                device_fingerprint,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::bad_status(response).await);
        }
        Ok(response.json().await?)
    }

    async fn poll_token(&self, device_code: &str) -> Result<TerminalIdentity, PairingError> {
        let response = self
            .http
            .post(self.url("/terminals/pairing/token/"))
            .json(&TokenRequest {
                grant_type: DEVICE_CODE_GRANT,
                device_code,
                client_id: &self.client_id,
            })
            .send()
            .await
            .map_err(SyncError::from)?;

        let status = response.status();
        if status.is_success() {
            let identity: TerminalIdentity =
                response.json().await.map_err(SyncError::from)?;
            return Ok(identity);
        }

        // RFC 8628 reports pending/denied as HTTP 400 with an OAuth error
        // code in the body.
        if status == StatusCode::BAD_REQUEST {
            let body: TokenErrorBody = response.json().await.map_err(SyncError::from)?;
            return Err(match body.error.as_str() {
                "authorization_pending" => PairingError::AuthorizationPending,
                "slow_down" => PairingError::SlowDown,
                "access_denied" => PairingError::AccessDenied,
                "expired_token" => PairingError::ExpiredToken,
                other => {
                    warn!(error = other, "Unrecognized token poll error");
                    PairingError::Rejected(
                        body.error_description.unwrap_or_else(|| other.to_string()),
                    )
                }
            });
        }

        Err(PairingError::Transport(Self::bad_status(response).await))
    }

    async fn registration_by_fingerprint(
        &self,
        device_fingerprint: &str,
    ) -> SyncResult<Option<TerminalIdentity>> {
        let response = self
            .http
            .get(self.url(&format!(
                "/terminals/registrations/by-fingerprint/{}",
                device_fingerprint
            )))
            .send()
            .await?;

        // 404 is an answer, not a failure: this device was never paired
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Self::bad_status(response).await);
        }
        Ok(Some(response.json().await?))
    }

    async fn pull_dataset(
        &self,
        identity: &TerminalIdentity,
        dataset: Dataset,
        updated_since: Option<DateTime<Utc>>,
    ) -> SyncResult<Option<DatasetPayload>> {
        Ok(match dataset {
            Dataset::Categories => self
                .pull_envelope(identity, dataset, updated_since)
                .await?
                .map(DatasetPayload::Categories),
            Dataset::ProductTypes => self
                .pull_envelope(identity, dataset, updated_since)
                .await?
                .map(DatasetPayload::ProductTypes),
            Dataset::TaxRates => self
                .pull_envelope(identity, dataset, updated_since)
                .await?
                .map(DatasetPayload::TaxRates),
            Dataset::Discounts => self
                .pull_envelope(identity, dataset, updated_since)
                .await?
                .map(DatasetPayload::Discounts),
            Dataset::Settings => self
                .pull_envelope::<CalculationSettings>(identity, dataset, updated_since)
                .await?
                .map(|mut records| DatasetPayload::Settings(records.pop())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dataset_names_match_cursor_keys() {
        let names: Vec<&str> = Dataset::ALL.iter().map(|d| d.name()).collect();
        assert_eq!(
            names,
            ["categories", "product_types", "tax_rates", "discounts", "settings"]
        );
    }

    #[test]
    fn test_device_authorization_defaults() {
        let json = r#"{
            "device_code": "dc-1",
            "user_code": "WDJB-MJHT",
            "verification_uri": "https://example.com/activate",
            "expires_in": 1800
        }"#;
        let auth: DeviceAuthorization = serde_json::from_str(json).unwrap();
        assert_eq!(auth.interval, 5);
        assert!(auth.verification_uri_complete.is_none());
    }

    #[test]
    fn test_device_headers_tag_requests() {
        use atlas_core::types::OfflineLimits;

        let identity = TerminalIdentity {
            device_id: "dev-42".into(),
            device_fingerprint: "fp-1".into(),
            tenant_id: "tenant-1".into(),
            tenant_slug: "demo".into(),
            location_id: "loc-7".into(),
            location_name: "Downtown".into(),
            signing_secret: "secret".into(),
            offline_limits: OfflineLimits::default(),
        };

        let http = reqwest::Client::new();
        let request = BackendClient::device_headers(
            http.get("https://api.example.com/terminals/sync/datasets/categories/"),
            &identity,
        )
        .build()
        .unwrap();

        assert_eq!(request.headers()["X-Device-ID"], "dev-42");
        assert_eq!(request.headers()["X-Location-ID"], "loc-7");
    }

    #[test]
    fn test_base_url_normalized() {
        let client = BackendClient::new(
            "https://api.example.com/",
            "atlas-terminal",
            std::time::Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            client.url("/terminals/pairing/token/"),
            "https://api.example.com/terminals/pairing/token/"
        );
    }
}
