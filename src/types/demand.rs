//! Demand: the credit a consumer extends to a producer.
//!
//! A demand is either a finite count of values or [`Demand::Unlimited`].
//! Arithmetic saturates: adding anything to unlimited stays unlimited, an
//! overflowing finite sum becomes unlimited, and subtraction never goes
//! below zero. Unlimited minus anything (including unlimited) is still
//! unlimited, which is what lets a queue keep forwarding "unlimited"
//! upstream once it has been granted.
//!
//! Signed balances that may dip below zero live in
//! [`DemandBalance`](crate::lab::DemandBalance); `Demand` itself is never
//! negative.

use core::cmp::Ordering;
use core::fmt;
use core::ops::{Add, AddAssign, Sub, SubAssign};
use serde::{Deserialize, Serialize};

/// Credit granted to a producer.
///
/// Variant order matters: the derived ordering places every finite demand
/// below `Unlimited`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Demand {
    /// At most this many further values.
    Max(u64),
    /// No limit on further values.
    Unlimited,
}

impl Demand {
    /// No credit.
    pub const NONE: Self = Self::Max(0);
    /// Unbounded credit.
    pub const UNLIMITED: Self = Self::Unlimited;

    /// A finite demand of `count` values.
    #[inline]
    #[must_use]
    pub const fn max(count: u64) -> Self {
        Self::Max(count)
    }

    /// Returns true for [`Demand::Unlimited`].
    #[inline]
    #[must_use]
    pub const fn is_unlimited(self) -> bool {
        matches!(self, Self::Unlimited)
    }

    /// Returns true for a zero finite demand.
    #[inline]
    #[must_use]
    pub const fn is_none(self) -> bool {
        matches!(self, Self::Max(0))
    }

    /// Returns the finite count, or `None` when unlimited.
    #[inline]
    #[must_use]
    pub const fn as_finite(self) -> Option<u64> {
        match self {
            Self::Max(count) => Some(count),
            Self::Unlimited => None,
        }
    }
}

impl Default for Demand {
    fn default() -> Self {
        Self::NONE
    }
}

impl From<u64> for Demand {
    fn from(count: u64) -> Self {
        Self::Max(count)
    }
}

impl fmt::Display for Demand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Max(count) => write!(f, "max({count})"),
            Self::Unlimited => f.write_str("unlimited"),
        }
    }
}

impl Add for Demand {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        match (self, rhs) {
            (Self::Max(a), Self::Max(b)) => a.checked_add(b).map_or(Self::Unlimited, Self::Max),
            _ => Self::Unlimited,
        }
    }
}

impl AddAssign for Demand {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for Demand {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        match (self, rhs) {
            (Self::Unlimited, _) => Self::Unlimited,
            (Self::Max(_), Self::Unlimited) => Self::NONE,
            (Self::Max(a), Self::Max(b)) => Self::Max(a.saturating_sub(b)),
        }
    }
}

impl SubAssign for Demand {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl Add<u64> for Demand {
    type Output = Self;

    fn add(self, rhs: u64) -> Self {
        self + Self::Max(rhs)
    }
}

impl AddAssign<u64> for Demand {
    fn add_assign(&mut self, rhs: u64) {
        *self = *self + rhs;
    }
}

impl PartialEq<u64> for Demand {
    fn eq(&self, other: &u64) -> bool {
        matches!(self, Self::Max(count) if count == other)
    }
}

impl PartialOrd<u64> for Demand {
    fn partial_cmp(&self, other: &u64) -> Option<Ordering> {
        match self {
            Self::Max(count) => Some(count.cmp(other)),
            Self::Unlimited => Some(Ordering::Greater),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::init_test_logging;

    fn init_test(name: &str) {
        init_test_logging();
        crate::test_phase!(name);
    }

    #[test]
    fn unlimited_orders_above_every_finite_demand() {
        init_test("unlimited_orders_above_every_finite_demand");
        crate::assert_with_log!(
            Demand::max(u64::MAX) < Demand::UNLIMITED,
            "unlimited is the top element",
            true,
            Demand::max(u64::MAX) < Demand::UNLIMITED
        );
        crate::assert_with_log!(Demand::max(3) > 2u64, "compares with integers", true, Demand::max(3));
        crate::assert_with_log!(Demand::UNLIMITED > 0u64, "unlimited exceeds zero", true, Demand::UNLIMITED);
        crate::assert_with_log!(Demand::NONE == 0u64, "none equals zero", true, Demand::NONE);
        crate::test_complete!("unlimited_orders_above_every_finite_demand");
    }

    #[test]
    fn addition_saturates_to_unlimited() {
        init_test("addition_saturates_to_unlimited");
        let sum = Demand::max(2) + Demand::max(3);
        crate::assert_with_log!(sum == Demand::max(5), "finite sum", Demand::max(5), sum);
        let overflow = Demand::max(u64::MAX) + 1;
        crate::assert_with_log!(
            overflow.is_unlimited(),
            "overflow becomes unlimited",
            Demand::UNLIMITED,
            overflow
        );
        let absorbed = Demand::UNLIMITED + Demand::max(7);
        crate::assert_with_log!(absorbed.is_unlimited(), "unlimited absorbs", Demand::UNLIMITED, absorbed);
        crate::test_complete!("addition_saturates_to_unlimited");
    }

    #[test]
    fn subtraction_never_goes_negative() {
        init_test("subtraction_never_goes_negative");
        let diff = Demand::max(2) - Demand::max(5);
        crate::assert_with_log!(diff.is_none(), "floors at zero", Demand::NONE, diff);
        let minus_unlimited = Demand::max(9) - Demand::UNLIMITED;
        crate::assert_with_log!(minus_unlimited.is_none(), "finite minus unlimited", Demand::NONE, minus_unlimited);
        let stays = Demand::UNLIMITED - Demand::UNLIMITED;
        crate::assert_with_log!(stays.is_unlimited(), "unlimited minus anything", Demand::UNLIMITED, stays);
        crate::test_complete!("subtraction_never_goes_negative");
    }

    #[test]
    fn display_matches_variant() {
        init_test("display_matches_variant");
        crate::assert_with_log!(
            Demand::max(4).to_string() == "max(4)",
            "finite display",
            "max(4)",
            Demand::max(4).to_string()
        );
        crate::assert_with_log!(
            Demand::UNLIMITED.to_string() == "unlimited",
            "unlimited display",
            "unlimited",
            Demand::UNLIMITED.to_string()
        );
        crate::test_complete!("display_matches_variant");
    }
}
