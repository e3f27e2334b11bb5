//! # Sync Error Types
//!
//! Error types for pairing, identity and dataset sync.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Transport     │  │     Pairing             │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  RequestFailed  │  │  PairingError           │ │
//! │  │  ConfigLoad     │  │  Timeout        │  │  (own taxonomy, maps    │ │
//! │  │  ConfigSave     │  │  BadStatus      │  │   OAuth error codes)    │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────────────────────────────────┐ │
//! │  │    Database     │  │     Identity                                │ │
//! │  │                 │  │                                             │ │
//! │  │  DatabaseError  │  │  NotPaired, FingerprintUnavailable          │ │
//! │  └─────────────────┘  └─────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering configuration, transport, storage and identity
/// failures. Pairing has its own taxonomy ([`PairingError`]) because its
/// outcomes drive a state machine, not just logging.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// HTTP request failed before a response arrived (DNS, connect, TLS).
    #[error("Request failed: {0}")]
    RequestFailed(String),

    /// Request timed out.
    #[error("Request timeout after {0} seconds")]
    Timeout(u64),

    /// Backend answered with an unexpected status.
    #[error("Backend returned {status}: {body}")]
    BadStatus { status: u16, body: String },

    /// Response body did not match the expected shape.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    // =========================================================================
    // Identity Errors
    // =========================================================================
    /// No identity persisted; the terminal has never completed pairing.
    #[error("Terminal is not paired")]
    NotPaired,

    /// No hardware identifier source could be read.
    #[error("Hardware fingerprint unavailable: {0}")]
    FingerprintUnavailable(String),

    // =========================================================================
    // Database Errors
    // =========================================================================
    /// Local store operation failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Terminal-side view of the device-authorization pairing outcome.
///
/// The poll loop maps the backend's OAuth error codes onto these variants;
/// everything except `AuthorizationPending` and `SlowDown` ends the flow.
#[derive(Debug, Error)]
pub enum PairingError {
    /// Backend has not seen an operator decision yet. Keep polling.
    #[error("Authorization pending")]
    AuthorizationPending,

    /// Backend asked us to widen the poll interval. Keep polling, slower.
    #[error("Backend requested a slower poll rate")]
    SlowDown,

    /// Operator rejected the pairing request.
    #[error("Pairing was denied by the operator")]
    AccessDenied,

    /// The device code expired before the operator approved.
    #[error("Device code expired before approval")]
    ExpiredToken,

    /// Backend rejected the request itself (bad client id, unknown code).
    #[error("Pairing request rejected: {0}")]
    Rejected(String),

    /// Transport failure while talking to the backend.
    #[error(transparent)]
    Transport(#[from] SyncError),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<atlas_db::DbError> for SyncError {
    fn from(err: atlas_db::DbError) -> Self {
        SyncError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::MalformedResponse(err.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            // reqwest does not expose the configured timeout here
            SyncError::Timeout(0)
        } else if err.is_decode() {
            SyncError::MalformedResponse(err.to_string())
        } else {
            SyncError::RequestFailed(err.to_string())
        }
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl SyncError {
    /// Returns true if the operation may be retried later.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::RequestFailed(_) | SyncError::Timeout(_) => true,
            SyncError::BadStatus { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl PairingError {
    /// Returns true if the poll loop should continue after this error.
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            PairingError::AuthorizationPending | PairingError::SlowDown
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(SyncError::RequestFailed("connection refused".into()).is_retryable());
        assert!(SyncError::Timeout(30).is_retryable());
        assert!(SyncError::BadStatus { status: 503, body: String::new() }.is_retryable());
        assert!(SyncError::BadStatus { status: 429, body: String::new() }.is_retryable());

        assert!(!SyncError::BadStatus { status: 404, body: String::new() }.is_retryable());
        assert!(!SyncError::NotPaired.is_retryable());
        assert!(!SyncError::InvalidConfig("bad".into()).is_retryable());
    }

    #[test]
    fn test_pairing_error_classes() {
        assert!(PairingError::AuthorizationPending.is_pending());
        assert!(PairingError::SlowDown.is_pending());
        assert!(!PairingError::AccessDenied.is_pending());
        assert!(!PairingError::Transport(SyncError::Timeout(5)).is_pending());
    }
}
