//! Virtual instants and durations.
//!
//! Virtual time is a plain signed tick count. It never reads the wall clock
//! and only moves when the [`VirtualTimeScheduler`] executes a task that is
//! due later than the current instant.
//!
//! Arithmetic saturates at the `i64` bounds instead of overflowing, so a
//! script that schedules "forever" ahead pins to [`VirtualTime::MAX`].
//!
//! [`VirtualTimeScheduler`]: crate::lab::VirtualTimeScheduler

use core::fmt;
use core::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};
use serde::{Deserialize, Serialize};

/// An instant on the virtual clock.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct VirtualTime(i64);

impl VirtualTime {
    /// The origin of the virtual clock.
    pub const ZERO: Self = Self(0);
    /// The latest representable instant.
    pub const MAX: Self = Self(i64::MAX);

    /// Creates an instant from a raw tick count.
    #[inline]
    #[must_use]
    pub const fn new(ticks: i64) -> Self {
        Self(ticks)
    }

    /// Returns the raw tick count.
    #[inline]
    #[must_use]
    pub const fn ticks(self) -> i64 {
        self.0
    }

    /// Returns the interval elapsed since [`VirtualTime::ZERO`].
    ///
    /// Cold scripts store their offsets as instants; this turns such an
    /// offset back into a delay relative to the subscription instant.
    #[inline]
    #[must_use]
    pub const fn since_origin(self) -> VirtualTimeInterval {
        VirtualTimeInterval(self.0)
    }

    /// Returns the signed interval from `self` to `later`.
    #[inline]
    #[must_use]
    pub const fn distance_to(self, later: Self) -> VirtualTimeInterval {
        VirtualTimeInterval(later.0.saturating_sub(self.0))
    }

    /// Returns this instant shifted by `interval`, saturating at the bounds.
    #[inline]
    #[must_use]
    pub const fn advanced_by(self, interval: VirtualTimeInterval) -> Self {
        Self(self.0.saturating_add(interval.0))
    }
}

impl From<i64> for VirtualTime {
    fn from(ticks: i64) -> Self {
        Self(ticks)
    }
}

impl fmt::Display for VirtualTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add<VirtualTimeInterval> for VirtualTime {
    type Output = Self;

    fn add(self, rhs: VirtualTimeInterval) -> Self {
        self.advanced_by(rhs)
    }
}

impl AddAssign<VirtualTimeInterval> for VirtualTime {
    fn add_assign(&mut self, rhs: VirtualTimeInterval) {
        *self = *self + rhs;
    }
}

impl Sub<VirtualTimeInterval> for VirtualTime {
    type Output = Self;

    fn sub(self, rhs: VirtualTimeInterval) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl SubAssign<VirtualTimeInterval> for VirtualTime {
    fn sub_assign(&mut self, rhs: VirtualTimeInterval) {
        *self = *self - rhs;
    }
}

impl Sub for VirtualTime {
    type Output = VirtualTimeInterval;

    fn sub(self, rhs: Self) -> VirtualTimeInterval {
        rhs.distance_to(self)
    }
}

/// A signed span of virtual time.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct VirtualTimeInterval(i64);

impl VirtualTimeInterval {
    /// The empty interval.
    pub const ZERO: Self = Self(0);

    /// Creates an interval from a raw tick count.
    #[inline]
    #[must_use]
    pub const fn new(ticks: i64) -> Self {
        Self(ticks)
    }

    /// Returns the raw tick count.
    #[inline]
    #[must_use]
    pub const fn ticks(self) -> i64 {
        self.0
    }

    /// Returns true if the interval points backwards in time.
    #[inline]
    #[must_use]
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }
}

impl From<i64> for VirtualTimeInterval {
    fn from(ticks: i64) -> Self {
        Self(ticks)
    }
}

impl fmt::Display for VirtualTimeInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add for VirtualTimeInterval {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl Sub for VirtualTimeInterval {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl Neg for VirtualTimeInterval {
    type Output = Self;

    fn neg(self) -> Self {
        Self(self.0.saturating_neg())
    }
}

impl Mul<i64> for VirtualTimeInterval {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self {
        Self(self.0.saturating_mul(rhs))
    }
}
