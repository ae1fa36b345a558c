//! Monotonic time points.
//!
//! Every clock in the kernel counts from its own epoch (power-on for the
//! hardware tick, construction for the host clock, zero for a virtual clock).
//! A [`TimePoint`] is the elapsed time since that epoch, so two time points are
//! only comparable when they came from the same clock.

use std::fmt;
use std::ops::{Add, AddAssign, Sub};
use std::time::Duration;

/// A point on a clock's timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TimePoint(Duration);

impl TimePoint {
    /// The clock's epoch.
    pub const ZERO: TimePoint = TimePoint(Duration::ZERO);

    /// A time point that is never reached. Used as the wake time of tasks that
    /// do not wait on the clock.
    pub const MAX: TimePoint = TimePoint(Duration::MAX);

    /// Create a time point at `since_epoch` after the epoch.
    #[must_use]
    pub const fn from_duration(since_epoch: Duration) -> Self {
        Self(since_epoch)
    }

    /// Create a time point from whole microseconds since the epoch.
    #[must_use]
    pub const fn from_micros(micros: u64) -> Self {
        Self(Duration::from_micros(micros))
    }

    /// Create a time point from whole milliseconds since the epoch.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(Duration::from_millis(millis))
    }

    /// Point `secs` seconds after the epoch.
    #[must_use]
    pub const fn from_secs(secs: u64) -> Self {
        Self(Duration::from_secs(secs))
    }

    /// Elapsed time since the epoch.
    #[must_use]
    pub const fn since_epoch(self) -> Duration {
        self.0
    }

    /// Whole microseconds since the epoch, saturating at `u64::MAX`.
    #[must_use]
    pub fn as_micros(self) -> u64 {
        u64::try_from(self.0.as_micros()).unwrap_or(u64::MAX)
    }

    /// Whole milliseconds since the epoch, saturating at `u64::MAX`.
    #[must_use]
    pub fn as_millis(self) -> u64 {
        u64::try_from(self.0.as_millis()).unwrap_or(u64::MAX)
    }

    /// Time elapsed from `earlier` to `self`, or zero if `earlier` is later.
    #[must_use]
    pub fn saturating_duration_since(self, earlier: TimePoint) -> Duration {
        self.0.saturating_sub(earlier.0)
    }

    /// `self + d`, saturating at [`TimePoint::MAX`].
    #[must_use]
    pub fn saturating_add(self, d: Duration) -> TimePoint {
        TimePoint(self.0.saturating_add(d))
    }
}

impl Add<Duration> for TimePoint {
    type Output = TimePoint;

    fn add(self, rhs: Duration) -> TimePoint {
        self.saturating_add(rhs)
    }
}

impl AddAssign<Duration> for TimePoint {
    fn add_assign(&mut self, rhs: Duration) {
        *self = *self + rhs;
    }
}

impl Sub for TimePoint {
    type Output = Duration;

    fn sub(self, rhs: TimePoint) -> Duration {
        self.saturating_duration_since(rhs)
    }
}

impl fmt::Display for TimePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == TimePoint::MAX {
            return write!(f, "T+never");
        }
        write!(f, "T+{}.{:06}s", self.0.as_secs(), self.0.subsec_micros())
    }
}
