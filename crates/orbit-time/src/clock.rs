//! The clock surface consumed by the rest of the kernel.

use orbit_common::time::TimePoint;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic time source.
///
/// Implementations must never go backwards. Sleeping on a virtual clock
/// advances virtual time instead of blocking the caller.
pub trait Clock: Send + Sync {
    /// Current time on this clock's timeline.
    fn now(&self) -> TimePoint;

    /// Block (or advance time) for `duration`.
    fn sleep(&self, duration: Duration);

    /// Block (or advance time) until `deadline`. Returns immediately if the
    /// deadline has already passed.
    fn sleep_until(&self, deadline: TimePoint) {
        let now = self.now();
        if deadline > now {
            self.sleep(deadline - now);
        }
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> TimePoint {
        (**self).now()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration);
    }

    fn sleep_until(&self, deadline: TimePoint) {
        (**self).sleep_until(deadline);
    }
}

/// Free-running host clock.
///
/// Counts from the moment it was constructed.
#[derive(Debug, Clone, Copy)]
pub struct SteadyClock {
    epoch: Instant,
}

impl Default for SteadyClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SteadyClock {
    /// Create a clock whose epoch is now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    /// Host instant corresponding to `t` on this clock.
    #[must_use]
    pub fn to_instant(&self, t: TimePoint) -> Option<Instant> {
        self.epoch.checked_add(t.since_epoch())
    }
}

impl Clock for SteadyClock {
    fn now(&self) -> TimePoint {
        TimePoint::from_duration(self.epoch.elapsed())
    }

    #[cfg(target_os = "linux")]
    fn sleep(&self, duration: Duration) {
        if duration.is_zero() {
            return;
        }

        let mut request = libc::timespec {
            tv_sec: libc::time_t::try_from(duration.as_secs()).unwrap_or(libc::time_t::MAX),
            tv_nsec: duration.subsec_nanos() as libc::c_long,
        };
        let mut remaining = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };

        loop {
            // SAFETY: both timespec pointers are valid for the duration of the call.
            let rc = unsafe {
                libc::clock_nanosleep(libc::CLOCK_MONOTONIC, 0, &request, &mut remaining)
            };
            // Interrupted by a signal: sleep for whatever is left.
            if rc == libc::EINTR {
                request = remaining;
                continue;
            }
            break;
        }
    }

    #[cfg(not(target_os = "linux"))]
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
