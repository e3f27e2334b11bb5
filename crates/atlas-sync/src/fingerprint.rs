//! # Hardware Fingerprint
//!
//! Derives a stable identifier for the physical device.
//!
//! ## Source Priority
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. /etc/machine-id          stable across reinstalls of the same OS   │
//! │  2. DMI product UUID         stable across OS reinstalls entirely      │
//! │     (/sys/class/dmi/id/product_uuid)                                   │
//! │  3. hostname                 last resort; weakest stability            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The raw identifier is never sent anywhere. The fingerprint is a SHA-256
//! digest over a namespaced input, hex-encoded, so two terminals that share
//! no hardware source can never collide on an empty string.

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{SyncError, SyncResult};

const MACHINE_ID_PATH: &str = "/etc/machine-id";
const DMI_PRODUCT_UUID_PATH: &str = "/sys/class/dmi/id/product_uuid";

/// Namespace prefix so the digest can never be confused with a digest of
/// the same identifier computed elsewhere.
const FINGERPRINT_NAMESPACE: &str = "atlas-pos-terminal-v1";

/// Computes the hardware fingerprint for this device.
///
/// Deterministic: the same machine always produces the same fingerprint,
/// which is what lets a wiped terminal recover its registration via the
/// by-fingerprint lookup instead of pairing again.
pub fn device_fingerprint() -> SyncResult<String> {
    let (source, raw) = read_hardware_id()?;
    debug!(source, "Hardware identifier resolved");
    Ok(digest(&raw))
}

fn read_hardware_id() -> SyncResult<(&'static str, String)> {
    if let Some(id) = read_trimmed(MACHINE_ID_PATH) {
        return Ok(("machine-id", id));
    }
    if let Some(id) = read_trimmed(DMI_PRODUCT_UUID_PATH) {
        return Ok(("dmi-product-uuid", id));
    }
    if let Ok(hostname) = std::env::var("HOSTNAME") {
        if !hostname.is_empty() {
            return Ok(("hostname", hostname));
        }
    }
    if let Some(hostname) = read_trimmed("/etc/hostname") {
        return Ok(("hostname-file", hostname));
    }
    Err(SyncError::FingerprintUnavailable(
        "no machine-id, DMI product UUID, or hostname".into(),
    ))
}

fn read_trimmed(path: &str) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(contents) => {
            let trimmed = contents.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Err(_) => None,
    }
}

fn digest(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(FINGERPRINT_NAMESPACE.as_bytes());
    hasher.update(b":");
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}
