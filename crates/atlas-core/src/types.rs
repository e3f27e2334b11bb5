//! # Domain Types
//!
//! Plain data types shared across the offline core: the reference datasets
//! the cache serves, the cart input the discount engine consumes, and the
//! terminal's persisted identity.
//!
//! ## Data Flow Context
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Where These Types Flow                              │
//! │                                                                         │
//! │  Backend sync ──► SQLite ──► ReferenceCache ──► Discount Engine         │
//! │  (reference data: Category, ProductType, TaxRate, DiscountDefinition,   │
//! │   CalculationSettings; immutable from the terminal's perspective)       │
//! │                                                                         │
//! │  Order-entry UI ──► CartLine / CartModifier ──► Discount Engine         │
//! │  (read-only input, owned by the external cart state)                    │
//! │                                                                         │
//! │  Pairing approval ──► TerminalIdentity ──► every outbound API call      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Canonical Shapes
//! Discount values carry one integer shape each on the wire: `value` is a
//! **whole percent** in `[0, 100]` for PERCENTAGE discounts (10 = 10%) and
//! **minor units** for FIXED_AMOUNT discounts. The engine converts percent
//! to basis points once at classification and never branches on alternative
//! input shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Money;

// =============================================================================
// Reference Data
// =============================================================================

/// A product category. Used for CATEGORY-scoped discount matching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    /// Parent category, if nested.
    pub parent_id: Option<String>,
    pub is_active: bool,
}

/// A product type. The discount engine only cares about one flag here:
/// lines whose product type opts out of discounts are removed from
/// consideration for *every* discount, regardless of scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductType {
    pub id: String,
    pub name: String,
    pub exclude_from_discounts: bool,
    pub is_active: bool,
}

/// A tax rate in basis points (825 = 8.25%).
///
/// Tax computation itself is an external collaborator; this record is cached
/// because tax changes ripple into calculation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxRate {
    pub id: String,
    pub name: String,
    pub rate_bps: i64,
    pub is_active: bool,
}

/// Terminal-wide calculation settings (single logical row, dataset
/// "settings"). Warmed at startup so order entry never waits on storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalculationSettings {
    pub id: String,
    /// ISO 4217 code; parsed to [`crate::money::Currency`] at the boundary.
    pub currency: String,
    pub price_includes_tax: bool,
    /// Rounding rule name, informational. The kernel always quantizes
    /// half-even; a mismatch here is a configuration error to surface.
    pub rounding_mode: String,
}

// =============================================================================
// Discounts
// =============================================================================

/// Discount kind. `value` semantics depend on this tag (see module docs).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscountType {
    Percentage,
    FixedAmount,
    BuyXGetY,
}

/// What a discount applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscountScope {
    Order,
    Product,
    Category,
}

impl DiscountType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            DiscountType::Percentage => "PERCENTAGE",
            DiscountType::FixedAmount => "FIXED_AMOUNT",
            DiscountType::BuyXGetY => "BUY_X_GET_Y",
        }
    }
}

impl std::str::FromStr for DiscountType {
    type Err = crate::error::CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PERCENTAGE" => Ok(DiscountType::Percentage),
            "FIXED_AMOUNT" => Ok(DiscountType::FixedAmount),
            "BUY_X_GET_Y" => Ok(DiscountType::BuyXGetY),
            other => Err(crate::error::CoreError::UnknownTag {
                kind: "discount type",
                tag: other.to_string(),
            }),
        }
    }
}

impl DiscountScope {
    pub const fn as_str(&self) -> &'static str {
        match self {
            DiscountScope::Order => "ORDER",
            DiscountScope::Product => "PRODUCT",
            DiscountScope::Category => "CATEGORY",
        }
    }
}

impl std::str::FromStr for DiscountScope {
    type Err = crate::error::CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ORDER" => Ok(DiscountScope::Order),
            "PRODUCT" => Ok(DiscountScope::Product),
            "CATEGORY" => Ok(DiscountScope::Category),
            other => Err(crate::error::CoreError::UnknownTag {
                kind: "discount scope",
                tag: other.to_string(),
            }),
        }
    }
}

/// A discount definition, as synced from the backend.
///
/// Immutable reference data from the terminal's perspective: never created
/// or edited locally, only applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscountDefinition {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub discount_type: DiscountType,
    pub scope: DiscountScope,
    /// Whole percent in `[0, 100]` for PERCENTAGE (10 = 10%), minor units
    /// for FIXED_AMOUNT, unused for BUY_X_GET_Y.
    pub value: i64,
    /// Minimum order subtotal (minor units) before this discount
    /// contributes anything. Zero means no minimum.
    #[serde(default)]
    pub min_purchase_amount: i64,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    pub is_active: bool,
    /// Product ids for PRODUCT scope and BUY_X_GET_Y matching.
    #[serde(default)]
    pub applicable_product_ids: Vec<String>,
    /// Category ids for CATEGORY scope matching.
    #[serde(default)]
    pub applicable_category_ids: Vec<String>,
    #[serde(default)]
    pub buy_quantity: Option<i64>,
    #[serde(default)]
    pub get_quantity: Option<i64>,
    /// Whether this discount may coexist with others on one order.
    /// Consulted by the application policy gate, not the amount math.
    #[serde(default = "default_stackable")]
    pub stackable: bool,
}

fn default_stackable() -> bool {
    true
}

impl DiscountDefinition {
    /// A discount is active iff `is_active` and `now` falls inside
    /// `[start_date, end_date]`. A missing bound is unbounded on that side.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        if !self.is_active {
            return false;
        }
        if let Some(start) = self.start_date {
            if now < start {
                return false;
            }
        }
        if let Some(end) = self.end_date {
            if now > end {
                return false;
            }
        }
        true
    }
}

// =============================================================================
// Cart Input
// =============================================================================

/// A modifier attached to a cart line (e.g. "extra shot"), priced per unit
/// of the modifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartModifier {
    pub id: String,
    pub price_minor: i64,
    pub quantity: i64,
}

/// One line of the external cart state. Read-only input to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: String,
    pub product_type_id: String,
    pub category_id: String,
    pub unit_price_minor: i64,
    pub quantity: i64,
    #[serde(default)]
    pub modifiers: Vec<CartModifier>,
}

impl CartLine {
    /// Total modifier cost for the whole line.
    pub fn modifier_total(&self) -> Money {
        self.modifiers
            .iter()
            .map(|m| Money::from_minor(m.price_minor) * m.quantity)
            .sum()
    }

    /// Line total: unit price times quantity, plus all modifiers.
    pub fn line_total(&self) -> Money {
        Money::from_minor(self.unit_price_minor) * self.quantity + self.modifier_total()
    }
}

// =============================================================================
// Terminal Identity
// =============================================================================

/// Caps on what the terminal will accept while disconnected, assigned by
/// the backend at pairing approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfflineLimits {
    /// Maximum number of orders held locally before sync is forced.
    pub max_offline_orders: i64,
    /// Maximum cumulative order value (minor units) held locally.
    pub max_offline_amount_minor: i64,
}

impl Default for OfflineLimits {
    fn default() -> Self {
        OfflineLimits {
            max_offline_orders: 100,
            max_offline_amount_minor: 500_000,
        }
    }
}

/// Who this terminal is.
///
/// Created once per device via pairing. The fingerprint is hardware-derived
/// and stable across reinstalls; everything else is assigned by the backend
/// at approval. Owned exclusively by the terminal process, persisted
/// durably, and mutated only by a successful pairing or a background
/// fingerprint-refresh (which replaces the whole record atomically).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalIdentity {
    pub device_id: String,
    pub device_fingerprint: String,
    pub tenant_id: String,
    pub tenant_slug: String,
    pub location_id: String,
    pub location_name: String,
    /// Secret used to sign offline artifacts for later backend validation.
    pub signing_secret: String,
    #[serde(default)]
    pub offline_limits: OfflineLimits,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn discount_with_window(
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> DiscountDefinition {
        DiscountDefinition {
            id: "d1".into(),
            name: "Test".into(),
            discount_type: DiscountType::Percentage,
            scope: DiscountScope::Order,
            value: 10,
            min_purchase_amount: 0,
            start_date: start,
            end_date: end,
            is_active: true,
            applicable_product_ids: vec![],
            applicable_category_ids: vec![],
            buy_quantity: None,
            get_quantity: None,
            stackable: true,
        }
    }

    #[test]
    fn test_activity_window() {
        let jan = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let jun = Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap();
        let dec = Utc.with_ymd_and_hms(2026, 12, 1, 0, 0, 0).unwrap();

        // Missing bounds are unbounded
        assert!(discount_with_window(None, None).is_active_at(jun));
        assert!(discount_with_window(Some(jan), None).is_active_at(jun));
        assert!(discount_with_window(None, Some(dec)).is_active_at(jun));

        // Outside the window
        assert!(!discount_with_window(Some(jun), None).is_active_at(jan));
        assert!(!discount_with_window(None, Some(jun)).is_active_at(dec));

        // Inactive flag wins regardless of window
        let mut d = discount_with_window(None, None);
        d.is_active = false;
        assert!(!d.is_active_at(jun));
    }

    #[test]
    fn test_line_total_includes_modifiers() {
        let line = CartLine {
            product_id: "p1".into(),
            product_type_id: "t1".into(),
            category_id: "c1".into(),
            unit_price_minor: 1000,
            quantity: 3,
            modifiers: vec![CartModifier {
                id: "m1".into(),
                price_minor: 50,
                quantity: 2,
            }],
        };
        // 3 x $10.00 + 2 x $0.50 = $31.00
        assert_eq!(line.line_total().minor(), 3100);
    }

    #[test]
    fn test_discount_wire_format() {
        let json = r#"{
            "id": "disc-1",
            "name": "10% off",
            "type": "PERCENTAGE",
            "scope": "ORDER",
            "value": 10,
            "is_active": true
        }"#;
        let d: DiscountDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(d.discount_type, DiscountType::Percentage);
        assert_eq!(d.scope, DiscountScope::Order);
        assert_eq!(d.min_purchase_amount, 0);
        assert!(d.stackable);
        assert!(d.applicable_product_ids.is_empty());
    }
}
