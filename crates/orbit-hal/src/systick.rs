//! System tick.

/// Monotonic microsecond counter driven by a periodic tick interrupt.
pub trait SysTick: Send + Sync {
    /// Microseconds counted since the tick started.
    fn current_time_micros(&self) -> u64;

    /// Advance the counter, normally from the tick handler.
    fn increment_micros(&self, micros: u64);
}
