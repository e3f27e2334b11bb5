//! # Discount Engine
//!
//! Pure functions that turn a cart plus backend-defined discount rules into
//! penny-exact discount amounts. This is the code that must agree with the
//! backend to the cent, or offline totals diverge from server totals.
//!
//! ## Strategy Dispatch
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │              (scope × type) -> DiscountStrategy                         │
//! │                                                                         │
//! │              PERCENTAGE       FIXED_AMOUNT      BUY_X_GET_Y             │
//! │  ORDER       OrderPercentage  OrderFixedAmount  (malformed)             │
//! │  PRODUCT     ProductPercent.  ProductFixedAm.   BuyXGetY                │
//! │  CATEGORY    CategoryPercent. CategoryFixedAm.  (malformed)             │
//! │                                                                         │
//! │  Classification happens ONCE at ingress. The engine then works on the   │
//! │  tagged union with an exhaustive match, so a new combination is a       │
//! │  compile-time-checked addition, not a silently missing map entry.       │
//! │                                                                         │
//! │  A definition that does not classify (or has an empty required id      │
//! │  list) contributes ZERO and logs a warning. One malformed rule must     │
//! │  never break pricing for an entire cart.                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Stacking
//! `calculate_all_discounts` computes each discount independently against
//! the *same original* discountable subtotal and sums the results. Stacking
//! is additive, never compounded against a progressively-discounted
//! remainder. The backend's exact stacking order under multiple discounts is
//! the highest-risk divergence point; this matches observed behavior and is
//! the first thing to re-verify if totals drift.
//!
//! ## Eligibility
//! A cart line whose product type sets `exclude_from_discounts` is removed
//! from consideration for every discount, regardless of scope. A *missing*
//! product-type record is treated as NOT excluded: failing permissive means
//! a cold cache still honors backend-validated discounts.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::warn;

use crate::money::{Currency, Money};
use crate::types::{CartLine, DiscountDefinition, DiscountScope, DiscountType, ProductType};

// =============================================================================
// Strategy Classification
// =============================================================================

/// The seven supported (scope, type) combinations as a tagged union.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscountStrategy<'a> {
    OrderPercentage { bps: i64 },
    OrderFixedAmount { amount: Money },
    ProductPercentage { bps: i64, product_ids: &'a [String] },
    ProductFixedAmount { amount: Money, product_ids: &'a [String] },
    CategoryPercentage { bps: i64, category_ids: &'a [String] },
    CategoryFixedAmount { amount: Money, category_ids: &'a [String] },
    BuyXGetY { buy: i64, get: i64, product_ids: &'a [String] },
}

/// Why a definition failed to classify. Surfaced as a warning log (and as
/// [`DiscountRejection::Malformed`] from the policy gate), never a panic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedDiscount {
    #[error("PRODUCT-scoped discount has an empty applicable_product_ids list")]
    EmptyProductList,

    #[error("CATEGORY-scoped discount has an empty applicable_category_ids list")]
    EmptyCategoryList,

    #[error("BUY_X_GET_Y discount is missing buy_quantity/get_quantity")]
    MissingBogoQuantities,

    #[error("Unsupported scope/type combination: {scope:?} x {discount_type:?}")]
    UnsupportedCombination {
        scope: DiscountScope,
        discount_type: DiscountType,
    },
}

impl<'a> DiscountStrategy<'a> {
    /// Classifies a definition into a strategy. This is the single ingress
    /// point: everything downstream matches exhaustively on the result.
    ///
    /// Percentage `value` arrives as whole percent (10 = 10%) and is
    /// converted to basis points here; the math below only ever sees bps.
    pub fn classify(def: &'a DiscountDefinition) -> Result<Self, MalformedDiscount> {
        use DiscountScope::*;
        use DiscountType::*;

        match (def.scope, def.discount_type) {
            (Order, Percentage) => Ok(DiscountStrategy::OrderPercentage {
                bps: def.value * 100,
            }),
            (Order, FixedAmount) => Ok(DiscountStrategy::OrderFixedAmount {
                amount: Money::from_minor(def.value),
            }),
            (Product, Percentage) if def.applicable_product_ids.is_empty() => {
                Err(MalformedDiscount::EmptyProductList)
            }
            (Product, Percentage) => Ok(DiscountStrategy::ProductPercentage {
                bps: def.value * 100,
                product_ids: &def.applicable_product_ids,
            }),
            (Product, FixedAmount) if def.applicable_product_ids.is_empty() => {
                Err(MalformedDiscount::EmptyProductList)
            }
            (Product, FixedAmount) => Ok(DiscountStrategy::ProductFixedAmount {
                amount: Money::from_minor(def.value),
                product_ids: &def.applicable_product_ids,
            }),
            (Category, Percentage) if def.applicable_category_ids.is_empty() => {
                Err(MalformedDiscount::EmptyCategoryList)
            }
            (Category, Percentage) => Ok(DiscountStrategy::CategoryPercentage {
                bps: def.value * 100,
                category_ids: &def.applicable_category_ids,
            }),
            (Category, FixedAmount) if def.applicable_category_ids.is_empty() => {
                Err(MalformedDiscount::EmptyCategoryList)
            }
            (Category, FixedAmount) => Ok(DiscountStrategy::CategoryFixedAmount {
                amount: Money::from_minor(def.value),
                category_ids: &def.applicable_category_ids,
            }),
            (Product, BuyXGetY) => match (def.buy_quantity, def.get_quantity) {
                (Some(buy), Some(get)) if buy > 0 && get > 0 => {
                    if def.applicable_product_ids.is_empty() {
                        Err(MalformedDiscount::EmptyProductList)
                    } else {
                        Ok(DiscountStrategy::BuyXGetY {
                            buy,
                            get,
                            product_ids: &def.applicable_product_ids,
                        })
                    }
                }
                _ => Err(MalformedDiscount::MissingBogoQuantities),
            },
            // BOGO only makes sense against a concrete product list.
            (scope @ (Order | Category), discount_type @ BuyXGetY) => {
                Err(MalformedDiscount::UnsupportedCombination {
                    scope,
                    discount_type,
                })
            }
        }
    }
}

// =============================================================================
// Eligibility
// =============================================================================

/// Index of product types by id, as served by the reference cache.
pub type ProductTypeIndex = HashMap<String, ProductType>;

/// A line is discount-eligible unless its product type opts out.
/// A missing record is NOT excluded (permissive default, see module docs).
fn is_line_eligible(line: &CartLine, type_index: &ProductTypeIndex) -> bool {
    type_index
        .get(&line.product_type_id)
        .map(|t| !t.exclude_from_discounts)
        .unwrap_or(true)
}

fn eligible_lines<'a>(
    cart_lines: &'a [CartLine],
    type_index: &ProductTypeIndex,
) -> Vec<&'a CartLine> {
    cart_lines
        .iter()
        .filter(|l| is_line_eligible(l, type_index))
        .collect()
}

/// Sum of eligible line totals: the base every ORDER-scoped discount
/// computes against.
fn discountable_subtotal(lines: &[&CartLine]) -> Money {
    lines.iter().map(|l| l.line_total()).sum()
}

/// Flattens lines into per-unit prices, each including its pro-rated share
/// of the line's modifier cost. Qty 3 @ $10 becomes three $10 entries.
///
/// When the line total does not divide evenly, the leftover minor units go
/// to the later entries (one each), so the flattened sum always equals the
/// exact line total.
fn flatten_unit_prices(lines: &[&CartLine]) -> Vec<i64> {
    let mut units = Vec::new();
    for line in lines {
        if line.quantity <= 0 {
            continue;
        }
        let total = line.line_total().minor();
        let base = total / line.quantity;
        let remainder = total % line.quantity;
        for _ in 0..(line.quantity - remainder) {
            units.push(base);
        }
        for _ in 0..remainder {
            units.push(base + 1);
        }
    }
    units
}

// =============================================================================
// Amount Calculation
// =============================================================================

/// Computes the amount a single discount contributes, in minor units.
///
/// ## Contract
/// - `subtotal` is the full order subtotal, used only for the
///   `min_purchase_amount` gate.
/// - ORDER-scoped math runs against the *discountable* subtotal (eligible
///   lines only), which may be smaller.
/// - `now` is an explicit argument so the function stays deterministic.
/// - Inactive, below-minimum, or malformed definitions contribute zero.
///   Malformed ones additionally log a warning; this function never fails.
pub fn calculate_discount_amount(
    discount: &DiscountDefinition,
    cart_lines: &[CartLine],
    subtotal: Money,
    type_index: &ProductTypeIndex,
    now: DateTime<Utc>,
) -> Money {
    if !discount.is_active_at(now) {
        return Money::zero();
    }
    if discount.min_purchase_amount > 0 && subtotal.minor() < discount.min_purchase_amount {
        return Money::zero();
    }

    let strategy = match DiscountStrategy::classify(discount) {
        Ok(s) => s,
        Err(reason) => {
            warn!(discount_id = %discount.id, %reason, "Skipping malformed discount definition");
            return Money::zero();
        }
    };

    let eligible = eligible_lines(cart_lines, type_index);

    match strategy {
        DiscountStrategy::OrderPercentage { bps } => {
            discountable_subtotal(&eligible).percentage(bps)
        }

        DiscountStrategy::OrderFixedAmount { amount } => {
            // Never discount more than what is discountable.
            discountable_subtotal(&eligible).min(amount)
        }

        DiscountStrategy::ProductPercentage { bps, product_ids } => {
            let matched: Money = eligible
                .iter()
                .filter(|l| product_ids.contains(&l.product_id))
                .map(|l| l.line_total())
                .sum();
            matched.percentage(bps)
        }

        DiscountStrategy::ProductFixedAmount { amount, product_ids } => eligible
            .iter()
            .filter(|l| product_ids.contains(&l.product_id))
            .map(|l| l.line_total().min(amount))
            .sum(),

        DiscountStrategy::CategoryPercentage { bps, category_ids } => {
            let matched: Money = eligible
                .iter()
                .filter(|l| category_ids.contains(&l.category_id))
                .map(|l| l.line_total())
                .sum();
            matched.percentage(bps)
        }

        DiscountStrategy::CategoryFixedAmount { amount, category_ids } => eligible
            .iter()
            .filter(|l| category_ids.contains(&l.category_id))
            .map(|l| l.line_total().min(amount))
            .sum(),

        DiscountStrategy::BuyXGetY { buy, get, product_ids } => {
            let matching: Vec<&CartLine> = eligible
                .iter()
                .copied()
                .filter(|l| product_ids.contains(&l.product_id))
                .collect();
            buy_x_get_y_amount(&matching, buy, get)
        }
    }
}

/// BUY_X_GET_Y:
/// 1. Flatten matching eligible lines by quantity into per-unit prices.
/// 2. `group_size = buy + get`; `groups = units / group_size`;
///    zero groups means zero discount.
/// 3. `free = groups * get`.
/// 4. Sort ascending and sum the cheapest `free` units.
///
/// Cheapest-first is a deliberate, customer-favorable tie-break that must
/// match the backend exactly or totals diverge.
fn buy_x_get_y_amount(matching: &[&CartLine], buy: i64, get: i64) -> Money {
    let mut unit_prices = flatten_unit_prices(matching);

    let group_size = buy + get;
    let num_groups = unit_prices.len() as i64 / group_size;
    if num_groups == 0 {
        return Money::zero();
    }
    let num_free = (num_groups * get) as usize;

    unit_prices.sort_unstable();
    Money::from_minor(unit_prices[..num_free].iter().sum())
}

// =============================================================================
// Aggregation
// =============================================================================

/// One entry of the discount breakdown returned to the order-entry layer.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct AppliedDiscountAmount {
    pub discount: DiscountDefinition,
    pub amount_minor: i64,
    /// Decimal rendering of `amount_minor`; formatted once, at this boundary.
    pub amount: String,
}

/// The running discount total for a cart.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct DiscountTotals {
    pub total_minor: i64,
    pub total: String,
    pub breakdown: Vec<AppliedDiscountAmount>,
}

/// Sums independent per-discount amounts computed against the *same
/// original* subtotal and cart. Additive, not compounded. Idempotent:
/// identical inputs always produce identical output.
pub fn calculate_all_discounts(
    applied_discounts: &[DiscountDefinition],
    cart_lines: &[CartLine],
    subtotal: Money,
    type_index: &ProductTypeIndex,
    currency: Currency,
    now: DateTime<Utc>,
) -> DiscountTotals {
    let mut breakdown = Vec::with_capacity(applied_discounts.len());
    let mut total = Money::zero();

    for discount in applied_discounts {
        let amount = calculate_discount_amount(discount, cart_lines, subtotal, type_index, now);
        total += amount;
        breakdown.push(AppliedDiscountAmount {
            discount: discount.clone(),
            amount_minor: amount.minor(),
            amount: amount.to_decimal_string(currency),
        });
    }

    DiscountTotals {
        total_minor: total.minor(),
        total: total.to_decimal_string(currency),
        breakdown,
    }
}

// =============================================================================
// Application Policy Gate
// =============================================================================

/// Why a *new* discount may not be added to an order. Independent of the
/// amount math above: a discount that passes this gate can still compute to
/// zero (and vice versa, an applied discount keeps its slot even if the cart
/// shrinks below its minimum).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiscountRejection {
    #[error("Discount {id} is not currently active")]
    NotActive { id: String },

    #[error("Order subtotal {subtotal_minor} is below the required minimum {required_minor}")]
    MinimumPurchaseNotMet {
        required_minor: i64,
        subtotal_minor: i64,
    },

    #[error("Discount {id} is already applied to this order")]
    AlreadyApplied { id: String },

    #[error("Discount {id} cannot be combined with the discounts already applied")]
    StackingNotAllowed { id: String },

    #[error("Not enough qualifying units for buy {buy} get {get}")]
    BogoQuantityUnavailable { buy: i64, get: i64 },

    #[error("Discount {id} is malformed: {reason}")]
    Malformed { id: String, reason: String },
}

/// Policy gate for adding a discount to an order.
///
/// Checks, in order: active window, minimum purchase, not already applied,
/// stacking allowed, and (for BOGO) at least one full buy+get group among
/// the qualifying units.
pub fn validate_discount_application(
    candidate: &DiscountDefinition,
    already_applied: &[DiscountDefinition],
    cart_lines: &[CartLine],
    subtotal: Money,
    type_index: &ProductTypeIndex,
    now: DateTime<Utc>,
) -> Result<(), DiscountRejection> {
    if !candidate.is_active_at(now) {
        return Err(DiscountRejection::NotActive {
            id: candidate.id.clone(),
        });
    }

    if candidate.min_purchase_amount > 0 && subtotal.minor() < candidate.min_purchase_amount {
        return Err(DiscountRejection::MinimumPurchaseNotMet {
            required_minor: candidate.min_purchase_amount,
            subtotal_minor: subtotal.minor(),
        });
    }

    if already_applied.iter().any(|d| d.id == candidate.id) {
        return Err(DiscountRejection::AlreadyApplied {
            id: candidate.id.clone(),
        });
    }

    if !already_applied.is_empty()
        && (!candidate.stackable || already_applied.iter().any(|d| !d.stackable))
    {
        return Err(DiscountRejection::StackingNotAllowed {
            id: candidate.id.clone(),
        });
    }

    let strategy =
        DiscountStrategy::classify(candidate).map_err(|reason| DiscountRejection::Malformed {
            id: candidate.id.clone(),
            reason: reason.to_string(),
        })?;

    if let DiscountStrategy::BuyXGetY { buy, get, product_ids } = strategy {
        let matching: Vec<&CartLine> = eligible_lines(cart_lines, type_index)
            .into_iter()
            .filter(|l| product_ids.contains(&l.product_id))
            .collect();
        let units = flatten_unit_prices(&matching).len() as i64;
        if units < buy + get {
            return Err(DiscountRejection::BogoQuantityUnavailable { buy, get });
        }
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
