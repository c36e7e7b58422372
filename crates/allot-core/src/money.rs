//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In floating point:                                                     │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                           │
//! │                                                                         │
//! │  A 10% coupon on 33,333:                                                │
//! │    33333 * 0.1 = 3333.3000000000002  → which way does it round?        │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Minor Units                                      │
//! │    33333 * 10 / 100 = 3333 (floor, always)                             │
//! │    The customer never gets a fractional unit of discount                │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use allot_core::money::Money;
//!
//! let order = Money::from_minor(50_000);
//! let ten_percent = order.percentage_floor(10);
//! assert_eq!(ten_percent.minor(), 5_000);
//!
//! let remaining = order - ten_percent;
//! assert_eq!(remaining.minor(), 45_000);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub, SubAssign};

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit.
///
/// ## Design Decisions
/// - **i64 (signed)**: Subtraction never panics on intermediate values;
///   validation rejects negative inputs at the edges instead
/// - **Single field tuple struct**: Zero-cost abstraction over i64, and
///   serializes as a bare number
/// - **No currency**: Every amount in one request shares the caller's currency
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from minor units.
    ///
    /// ## Example
    /// ```rust
    /// use allot_core::money::Money;
    ///
    /// let amount = Money::from_minor(20_000);
    /// assert_eq!(amount.minor(), 20_000);
    /// ```
    #[inline]
    pub const fn from_minor(minor: i64) -> Self {
        Money(minor)
    }

    /// Returns the value in minor units.
    #[inline]
    pub const fn minor(&self) -> i64 {
        self.0
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is positive (greater than zero).
    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Takes `percent` percentage points of this amount, rounding down.
    ///
    /// ## Floor, Not Round
    /// ```text
    /// ┌─────────────────────────────────────────────────────────────────────┐
    /// │  amount * percent / 100, integer division                           │
    /// │                                                                     │
    /// │  12345 at 10%  →  1234.5  →  1234                                   │
    /// │  99    at 33%  →  32.67   →  32                                     │
    /// │                                                                     │
    /// │  A percentage discount never grants a fractional unit, so the      │
    /// │  quote is reproducible to the unit across every caller.             │
    /// └─────────────────────────────────────────────────────────────────────┘
    /// ```
    ///
    /// ## Example
    /// ```rust
    /// use allot_core::money::Money;
    ///
    /// assert_eq!(Money::from_minor(12_345).percentage_floor(10).minor(), 1_234);
    /// ```
    pub fn percentage_floor(&self, percent: i64) -> Money {
        // i128 so that amount * percent cannot overflow for any i64 amount
        let scaled = (self.0 as i128 * percent as i128).div_euclid(100);
        Money::from_minor(scaled as i64)
    }

    /// Adds, pinning at `i64::MAX` / `i64::MIN` instead of wrapping.
    #[inline]
    pub const fn saturating_add(self, other: Money) -> Money {
        Money(self.0.saturating_add(other.0))
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Display shows the raw minor-unit amount.
///
/// ## Note
/// Currency formatting belongs to whoever renders the quote.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
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

/// Saturates, so a sum of many large amounts pins at `i64::MAX`.
impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), Money::saturating_add)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_minor() {
        let money = Money::from_minor(20_000);
        assert_eq!(money.minor(), 20_000);
        assert_eq!(format!("{}", money), "20000");
    }

    #[test]
    fn test_arithmetic() {
        let a = Money::from_minor(1000);
        let b = Money::from_minor(500);

        assert_eq!((a + b).minor(), 1500);
        assert_eq!((a - b).minor(), 500);

        let mut c = a;
        c += b;
        c -= Money::from_minor(100);
        assert_eq!(c.minor(), 1400);

        let total: Money = [a, b, b].into_iter().sum();
        assert_eq!(total.minor(), 2000);
    }

    #[test]
    fn test_percentage_floor() {
        assert_eq!(Money::from_minor(50_000).percentage_floor(10).minor(), 5_000);
        assert_eq!(Money::from_minor(12_345).percentage_floor(10).minor(), 1_234);
        assert_eq!(Money::from_minor(99).percentage_floor(33).minor(), 32);
        assert_eq!(Money::from_minor(1).percentage_floor(50).minor(), 0);
        assert_eq!(Money::from_minor(777).percentage_floor(100).minor(), 777);
    }

    #[test]
    fn test_percentage_floor_large_amount_does_not_overflow() {
        let huge = Money::from_minor(i64::MAX);
        assert_eq!(huge.percentage_floor(100).minor(), i64::MAX);
        assert_eq!(huge.percentage_floor(50).minor(), i64::MAX / 2);
    }

    #[test]
    fn test_sum_saturates() {
        let near_max = Money::from_minor(i64::MAX - 10);
        let total: Money = [near_max, near_max, Money::from_minor(5)].into_iter().sum();
        assert_eq!(total.minor(), i64::MAX);
        assert_eq!(near_max.saturating_add(Money::from_minor(3)).minor(), i64::MAX - 7);
    }

    #[test]
    fn test_zero_and_checks() {
        let zero = Money::zero();
        assert!(zero.is_zero());
        assert!(!zero.is_positive());
        assert!(!zero.is_negative());

        assert!(Money::from_minor(100).is_positive());
        assert!(Money::from_minor(-100).is_negative());
    }

    #[test]
    fn test_serializes_as_bare_number() {
        let json = serde_json::to_string(&Money::from_minor(42_000)).unwrap();
        assert_eq!(json, "42000");
    }
}
