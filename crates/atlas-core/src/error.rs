//! # Error Types
//!
//! Domain-specific error types for atlas-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  atlas-core errors (this file)                                          │
//! │  ├── CoreError          - Money parsing / domain failures               │
//! │  └── DiscountRejection  - Policy-gate outcomes (discount module)        │
//! │                                                                         │
//! │  atlas-db errors                                                        │
//! │  └── DbError            - Storage failures (converted to cache misses)  │
//! │                                                                         │
//! │  atlas-sync errors                                                      │
//! │  └── SyncError          - Pairing / transport failures                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Note that calculation code never *returns* errors for malformed reference
//! data: an unrecognized strategy or empty id list yields a zero amount plus
//! a log entry. `CoreError` covers the cases where the caller handed us
//! something unparseable at the boundary (decimal strings, currency codes).

use thiserror::Error;

/// Core domain errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A decimal amount string could not be parsed.
    ///
    /// ## When This Occurs
    /// - Non-numeric input at the decimal boundary
    /// - More fraction digits than the currency's minor-unit exponent
    #[error("Invalid decimal amount '{input}': {reason}")]
    InvalidDecimal { input: String, reason: String },

    /// Unknown ISO currency code.
    #[error("Unknown currency code: {0}")]
    UnknownCurrency(String),

    /// Unknown enum tag in stored or synced reference data.
    #[error("Unknown {kind} tag: '{tag}'")]
    UnknownTag { kind: &'static str, tag: String },

    /// An arithmetic result does not fit in 64-bit minor units.
    #[error("Monetary amount overflow")]
    AmountOverflow,
}

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;
