//! # atlas-core: Pure Business Logic for the Atlas POS Offline Core
//!
//! This crate is the **heart** of the offline core. It turns a cart of items
//! and a set of backend-defined discount rules into a penny-exact total that
//! matches what the order-management backend would compute, using nothing but
//! already-resident data.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Atlas POS Offline Core                              │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              Order-entry UI (external collaborator)             │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ atlas-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌──────────────────────────┐   │   │
//! │  │   │   money   │  │   types   │  │        discount          │   │   │
//! │  │   │   Money   │  │ CartLine  │  │  strategy dispatch       │   │   │
//! │  │   │ half-even │  │ TaxRate   │  │  BOGO, stacking, policy  │   │   │
//! │  │   └───────────┘  └───────────┘  └──────────────────────────┘   │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │          atlas-db (reference cache over SQLite)                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`money`] - Money kernel: integer minor units, round-half-even
//! - [`types`] - Domain types (reference data, cart input, identity)
//! - [`discount`] - Discount engine and application policy
//! - [`error`] - Domain error types
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: same input = same output; the current time is an
//!    explicit argument, never read from a clock
//! 2. **No I/O**: database, network, file system access is FORBIDDEN here
//! 3. **Integer Money**: all monetary values are minor units (i64); the
//!    decimal conversion happens exactly once, at the output boundary
//! 4. **Zero, not panic**: a malformed discount definition contributes zero
//!    and a log entry, so one bad rule cannot break pricing for a cart

pub mod discount;
pub mod error;
pub mod money;
pub mod types;

pub use discount::{
    calculate_all_discounts, calculate_discount_amount, validate_discount_application,
    AppliedDiscountAmount, DiscountRejection, DiscountStrategy, DiscountTotals,
};
pub use error::{CoreError, CoreResult};
pub use money::{round_half_even, Currency, Money};
pub use types::*;
