//! # Money Kernel
//!
//! Integer minor-unit arithmetic with a single rounding rule.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In floating point:                                                     │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                           │
//! │                                                                         │
//! │  Worse for an offline terminal: repeated decimal rounding across many   │
//! │  cart lines DRIFTS from the backend's integer math, and then the        │
//! │  terminal's preview total disagrees with the server-authoritative one.  │
//! │                                                                         │
//! │  OUR SOLUTION: integer minor units + round-half-even                    │
//! │    All intermediate math stays integer (i128-widened).                  │
//! │    Decimal conversion happens exactly ONCE, at the output boundary.     │
//! │    Rounding is banker's rounding, matching the backend's quantization.  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use atlas_core::money::{Currency, Money};
//!
//! // Parse once at the boundary
//! let price = Money::from_decimal_str("10.99", Currency::Usd).unwrap();
//! assert_eq!(price.minor(), 1099);
//!
//! // Integer math in between
//! let discounted = price.percentage(1000); // 10.00% in basis points
//! assert_eq!(discounted.minor(), 110);     // 109.9 rounds half-even to 110
//!
//! // Format once at the boundary
//! assert_eq!(price.to_decimal_string(Currency::Usd), "10.99");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};
use std::str::FromStr;

use crate::error::CoreError;

// =============================================================================
// Currency
// =============================================================================

/// ISO 4217 currency with its minor-unit exponent.
///
/// The exponent is the only property the kernel needs: it tells us where the
/// decimal boundary sits (2 for USD cents, 0 for JPY).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
    Eur,
    Gbp,
    Cad,
    Aud,
    Jpy,
}

impl Currency {
    /// Number of decimal digits in the minor unit (2 for USD, 0 for JPY).
    pub const fn minor_exponent(&self) -> u32 {
        match self {
            Currency::Jpy => 0,
            _ => 2,
        }
    }

    /// Minor units per major unit (100 for USD, 1 for JPY).
    pub const fn minor_per_major(&self) -> i64 {
        10_i64.pow(self.minor_exponent())
    }

    /// ISO 4217 code.
    pub const fn code(&self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Gbp => "GBP",
            Currency::Cad => "CAD",
            Currency::Aud => "AUD",
            Currency::Jpy => "JPY",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "USD" => Ok(Currency::Usd),
            "EUR" => Ok(Currency::Eur),
            "GBP" => Ok(Currency::Gbp),
            "CAD" => Ok(Currency::Cad),
            "AUD" => Ok(Currency::Aud),
            "JPY" => Ok(Currency::Jpy),
            other => Err(CoreError::UnknownCurrency(other.to_string())),
        }
    }
}

// =============================================================================
// Rounding
// =============================================================================

/// Rounds `numerator / denominator` to the nearest integer, ties to even
/// (banker's rounding). `denominator` must be positive.
///
/// ## Why Half-Even?
/// Standard rounding always rounds 0.5 up, which accumulates a systematic
/// bias over many lines. Ties-to-even alternates, and it is what the backend
/// uses when quantizing at the minor-unit boundary. Matching it exactly is
/// required for offline totals to ever agree with server totals.
///
/// ## Examples
/// ```rust
/// use atlas_core::money::round_half_even;
///
/// assert_eq!(round_half_even(5, 10), 0);   // 0.5 -> 0 (even)
/// assert_eq!(round_half_even(15, 10), 2);  // 1.5 -> 2 (even)
/// assert_eq!(round_half_even(25, 10), 2);  // 2.5 -> 2 (even)
/// assert_eq!(round_half_even(26, 10), 3);  // 2.6 -> 3
/// assert_eq!(round_half_even(-15, 10), -2);
/// ```
pub fn round_half_even(numerator: i128, denominator: i128) -> i64 {
    debug_assert!(denominator > 0, "denominator must be positive");

    // Euclidean division keeps the remainder in [0, denominator) for
    // negative numerators too, so one comparison covers both signs.
    let quotient = numerator.div_euclid(denominator);
    let remainder = numerator.rem_euclid(denominator);

    let doubled = remainder * 2;
    let rounded = if doubled > denominator {
        quotient + 1
    } else if doubled < denominator {
        quotient
    } else if quotient % 2 == 0 {
        quotient // exact tie, quotient already even
    } else {
        quotient + 1
    };

    rounded as i64
}

// =============================================================================
// Money
// =============================================================================

/// A monetary value in the smallest currency unit (cents for USD).
///
/// ## Design Decisions
/// - **i64 (signed)**: allows negative values for refunds and adjustments
/// - **Single-field tuple struct**: zero-cost abstraction over i64
/// - **Currency-agnostic internally**: the currency only matters at the
///   decimal boundary, so conversion methods take it as an argument
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from minor units.
    #[inline]
    pub const fn from_minor(minor: i64) -> Self {
        Money(minor)
    }

    /// Returns the value in minor units.
    #[inline]
    pub const fn minor(&self) -> i64 {
        self.0
    }

    /// Returns zero.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Returns the smaller of two amounts.
    #[inline]
    pub fn min(self, other: Money) -> Money {
        Money(self.0.min(other.0))
    }

    /// Applies a percentage expressed in basis points (1000 = 10.00%),
    /// quantized with round-half-even.
    ///
    /// ## Example
    /// ```rust
    /// use atlas_core::money::Money;
    ///
    /// let subtotal = Money::from_minor(10000); // $100.00
    /// assert_eq!(subtotal.percentage(1000).minor(), 1000); // 10% = $10.00
    /// ```
    pub fn percentage(&self, bps: i64) -> Money {
        // i128 to prevent overflow on large carts
        Money(round_half_even(self.0 as i128 * bps as i128, 10_000))
    }

    /// Parses a decimal string ("10.99") into minor units.
    ///
    /// This is the *only* inbound decimal conversion in the system. Fraction
    /// digits beyond the currency's minor-unit exponent are rejected rather
    /// than rounded: reference data is expected to already be quantized.
    pub fn from_decimal_str(input: &str, currency: Currency) -> Result<Self, CoreError> {
        let invalid = |reason: &str| CoreError::InvalidDecimal {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = input.trim();
        let (negative, body) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };
        if body.is_empty() {
            return Err(invalid("empty amount"));
        }

        let (whole, frac) = match body.split_once('.') {
            Some((w, f)) => (w, f),
            None => (body, ""),
        };

        let exponent = currency.minor_exponent() as usize;
        if frac.len() > exponent {
            return Err(invalid("too many fraction digits"));
        }
        if !whole.chars().all(|c| c.is_ascii_digit())
            || !frac.chars().all(|c| c.is_ascii_digit())
            || (whole.is_empty() && frac.is_empty())
        {
            return Err(invalid("not a decimal number"));
        }

        let whole_part: i64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid("whole part out of range"))?
        };
        // Right-pad the fraction to the full exponent: "9" -> 90 for USD
        let frac_part: i64 = if frac.is_empty() {
            0
        } else {
            let padded = format!("{:0<width$}", frac, width = exponent);
            padded.parse().map_err(|_| invalid("fraction out of range"))?
        };

        let minor = whole_part
            .checked_mul(currency.minor_per_major())
            .and_then(|w| w.checked_add(frac_part))
            .ok_or(CoreError::AmountOverflow)?;

        Ok(Money(if negative { -minor } else { minor }))
    }

    /// Formats minor units as a decimal string ("10.99").
    ///
    /// This is the *only* outbound decimal conversion in the system.
    pub fn to_decimal_string(&self, currency: Currency) -> String {
        let per_major = currency.minor_per_major();
        if per_major == 1 {
            return self.0.to_string();
        }
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let per_major = per_major as u64;
        format!(
            "{}{}.{:0width$}",
            sign,
            abs / per_major,
            abs % per_major,
            width = currency.minor_exponent() as usize
        )
    }
}

/// Display shows the raw minor-unit value; use [`Money::to_decimal_string`]
/// for anything operator-facing.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}m", self.0)
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
