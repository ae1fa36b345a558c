//! Call recording for simulated drivers.
//!
//! An [`Interceptor`] wraps a driver, writes a record to the simulation log
//! for each intercepted call, then forwards the call. Wrapping the power
//! hooks of a peripheral shows exactly when the hardware would have been
//! switched on and off:
//!
//! ```ignore
//! let gpio = Peripheral::new(Interceptor::new(SimGpio::default(), clock, logger));
//! ```
//!
//! Driver interfaces defined elsewhere can be intercepted the same way by
//! implementing them for `Interceptor<Driver>` and calling
//! [`Interceptor::log_call`] before delegating to [`Interceptor::inner`].

use crate::logger::SimLogger;
use orbit_common::time::TimePoint;
use orbit_hal::peripheral::PowerControl;
use orbit_time::Clock;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Driver wrapper that logs calls before forwarding them.
pub struct Interceptor<I> {
    inner: I,
    clock: Arc<dyn Clock>,
    logger: Arc<SimLogger>,
}

impl<I> Interceptor<I> {
    /// Wrap `inner`, timestamping records with `clock`.
    pub fn new(inner: I, clock: Arc<dyn Clock>, logger: Arc<SimLogger>) -> Self {
        Self {
            inner,
            clock,
            logger,
        }
    }

    /// The wrapped driver.
    pub fn inner(&self) -> &I {
        &self.inner
    }

    /// The log receiving the records.
    pub fn logger(&self) -> &Arc<SimLogger> {
        &self.logger
    }

    /// Record a call to `name` at the caller's source location.
    ///
    /// Log failures are reported and otherwise ignored; they never change
    /// what the driver does.
    #[track_caller]
    pub fn log_call(&self, name: &str) {
        let location = Location::caller();
        if let Err(e) =
            self.logger
                .log_fn(self.clock.now(), name, location.file(), location.line())
        {
            warn!(function = name, "Failed to record intercepted call: {e}");
        }
    }
}

impl<I: PowerControl> PowerControl for Interceptor<I> {
    fn enable(&self) {
        self.log_call("enable");
        self.inner.enable();
    }

    fn disable(&self) {
        self.log_call("disable");
        self.inner.disable();
    }
}

impl<I: Clock> Clock for Interceptor<I> {
    fn now(&self) -> TimePoint {
        self.inner.now()
    }

    fn sleep(&self, duration: Duration) {
        self.log_call("sleep");
        self.inner.sleep(duration);
    }

    fn sleep_until(&self, wake_time: TimePoint) {
        self.log_call("sleep_until");
        self.inner.sleep_until(wake_time);
    }
}

impl<I: fmt::Debug> fmt::Debug for Interceptor<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interceptor")
            .field("inner", &self.inner)
            .field("log", &self.logger.path())
            .finish()
    }
}
