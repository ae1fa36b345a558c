//! Virtual clock for simulation and testing.
//!
//! The clock is a host-time base, a scale factor and an explicit offset.
//! In scaled mode `now()` runs at `scale` simulated seconds per host second;
//! in frozen mode it only moves when somebody sets it. Either way, moving the
//! clock explicitly goes through the registered [`Clockable`]s so that no
//! participant sees time skip past an event it must handle first.

use crate::clock::Clock;
use crate::clockable::{Clockable, ClockableId};
use orbit_common::config::{ClockConfig, ClockMode};
use orbit_common::error::{fatal, KernelError, KernelResult};
use orbit_common::time::TimePoint;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Default bound on clamp/react rounds for a single advance.
pub const DEFAULT_MAX_ADVANCE_STEPS: usize = 100_000;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Host-time anchor for the virtual timeline.
#[derive(Debug, Clone, Copy)]
struct TimeBase {
    /// Host instant at which `offset` was the current time.
    wall: Instant,
    /// Virtual time at `wall`.
    offset: TimePoint,
}

struct Registration {
    id: ClockableId,
    clockable: Weak<dyn Clockable>,
}

/// A clock that can be frozen, scaled and advanced programmatically.
pub struct VirtualClock {
    base: Mutex<TimeBase>,
    /// `None` when frozen.
    scale: Option<f64>,
    clockables: Mutex<Vec<Registration>>,
    /// Serializes advancement; never held by `now()`.
    advance: Mutex<()>,
    next_id: AtomicU64,
    max_advance_steps: usize,
}

impl std::fmt::Debug for VirtualClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualClock")
            .field("now", &self.now())
            .field("scale", &self.scale)
            .field("clockables", &lock(&self.clockables).len())
            .finish()
    }
}

impl VirtualClock {
    fn with_scale(scale: Option<f64>) -> Self {
        Self {
            base: Mutex::new(TimeBase {
                wall: Instant::now(),
                offset: TimePoint::ZERO,
            }),
            scale,
            clockables: Mutex::new(Vec::new()),
            advance: Mutex::new(()),
            next_id: AtomicU64::new(0),
            max_advance_steps: DEFAULT_MAX_ADVANCE_STEPS,
        }
    }

    /// Create a clock at time zero that only moves when set.
    #[must_use]
    pub fn frozen() -> Self {
        Self::with_scale(None)
    }

    /// Create a clock at time zero running at `scale` simulated seconds per
    /// host second.
    ///
    /// # Panics
    ///
    /// Panics if `scale` is not a positive, finite number.
    #[must_use]
    pub fn scaled(scale: f64) -> Self {
        assert!(
            scale.is_finite() && scale > 0.0,
            "clock scale must be positive and finite, got {scale}"
        );
        Self::with_scale(Some(scale))
    }

    /// Create a clock from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::Config`] if the scale or step bound is invalid.
    pub fn from_config(config: &ClockConfig) -> KernelResult<Self> {
        if config.max_advance_steps == 0 {
            return Err(KernelError::Config(
                "max_advance_steps must be at least 1".into(),
            ));
        }
        let clock = match config.mode {
            ClockMode::Frozen => Self::frozen(),
            ClockMode::Scaled => {
                if !(config.scale.is_finite() && config.scale > 0.0) {
                    return Err(KernelError::Config(format!(
                        "clock scale must be positive and finite, got {}",
                        config.scale
                    )));
                }
                Self::scaled(config.scale)
            }
        };
        Ok(clock.with_max_advance_steps(config.max_advance_steps))
    }

    /// Override the bound on clamp/react rounds per advance.
    #[must_use]
    pub fn with_max_advance_steps(mut self, steps: usize) -> Self {
        self.max_advance_steps = steps.max(1);
        self
    }

    /// Scale factor, or `None` for a frozen clock.
    #[must_use]
    pub fn scale(&self) -> Option<f64> {
        self.scale
    }

    /// Whether time only moves when set.
    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.scale.is_none()
    }

    /// Register a participant in time advancement.
    ///
    /// The clock only keeps a weak reference; a participant that has been
    /// dropped is skipped and pruned.
    pub fn register_clockable(&self, clockable: Weak<dyn Clockable>) -> ClockableId {
        let id = ClockableId(self.next_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.clockables).push(Registration { id, clockable });
        debug!(id = id.0, "Clockable registered");
        id
    }

    /// Remove a participant. Unknown ids are ignored.
    pub fn deregister_clockable(&self, id: ClockableId) {
        lock(&self.clockables).retain(|r| r.id != id);
        debug!(id = id.0, "Clockable deregistered");
    }

    /// Number of live registered participants.
    #[must_use]
    pub fn clockable_count(&self) -> usize {
        lock(&self.clockables)
            .iter()
            .filter(|r| r.clockable.strong_count() > 0)
            .count()
    }

    fn participants(&self) -> Vec<std::sync::Arc<dyn Clockable>> {
        let mut registrations = lock(&self.clockables);
        registrations.retain(|r| r.clockable.strong_count() > 0);
        registrations
            .iter()
            .filter_map(|r| r.clockable.upgrade())
            .collect()
    }

    /// Move the clock to `target`.
    ///
    /// Each round asks every clockable to clamp the proposed time, adopts the
    /// smallest clamp, and then lets every clockable react to it. Rounds repeat
    /// until `target` itself is adopted. Targets in the past are ignored.
    ///
    /// Clockables must not advance this clock from `update_time` or `run`.
    ///
    /// # Panics
    ///
    /// Halts through [`fatal`] if the target is not reached within the step
    /// bound, which means some clockable keeps clamping without making
    /// progress.
    pub fn set_current_time(&self, target: TimePoint) {
        let _advancing = lock(&self.advance);

        let mut current = self.now();
        if target < current {
            debug!(%target, %current, "Ignoring request to move virtual time backwards");
            return;
        }

        {
            let mut base = lock(&self.base);
            base.wall = Instant::now();
            base.offset = current;
        }

        let mut steps = 0usize;
        loop {
            let participants = self.participants();

            let mut adopted = target;
            for clockable in &participants {
                adopted = adopted.min(clockable.update_time(adopted)).max(current);
            }

            // The wall anchor stays put so scaled time keeps moving forward.
            lock(&self.base).offset = adopted;
            current = adopted;
            trace!(%adopted, %target, step = steps, "Virtual time adopted");

            for clockable in &participants {
                clockable.run(adopted);
            }

            if adopted == target {
                break;
            }

            steps += 1;
            if steps >= self.max_advance_steps {
                fatal(KernelError::ClockDidNotConverge { target, steps });
            }
        }
    }

    /// Advance the clock by `d`.
    pub fn increment_current_time(&self, d: Duration) {
        self.set_current_time(self.now() + d);
    }

    /// Advance the clock by `ms` milliseconds.
    pub fn increment_current_time_millis(&self, ms: u64) {
        self.increment_current_time(Duration::from_millis(ms));
    }

    /// Advance the clock by `us` microseconds.
    pub fn increment_current_time_micros(&self, us: u64) {
        self.increment_current_time(Duration::from_micros(us));
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> TimePoint {
        let base = *lock(&self.base);
        match self.scale {
            None => base.offset,
            Some(scale) => base.offset + base.wall.elapsed().mul_f64(scale),
        }
    }

    fn sleep(&self, duration: Duration) {
        self.increment_current_time(duration);
    }

    fn sleep_until(&self, deadline: TimePoint) {
        self.set_current_time(deadline);
    }
}
