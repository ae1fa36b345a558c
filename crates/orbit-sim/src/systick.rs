//! Simulated system tick.

use crate::irq::IrqGenerator;
use orbit_common::time::TimePoint;
use orbit_hal::systick::SysTick;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// A 1 kHz system tick driven by the reactor.
#[derive(Debug, Default)]
pub struct FakeSysTick {
    ticks_us: AtomicU64,
}

impl FakeSysTick {
    /// Cortex-M SysTick exception number.
    pub const IRQ: u32 = 15;

    /// Tick period.
    pub const INTERVAL: Duration = Duration::from_micros(1000);

    /// Create a tick counter at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SysTick for FakeSysTick {
    fn current_time_micros(&self) -> u64 {
        self.ticks_us.load(Ordering::Acquire)
    }

    fn increment_micros(&self, micros: u64) {
        self.ticks_us.fetch_add(micros, Ordering::AcqRel);
    }
}

impl IrqGenerator for FakeSysTick {
    fn irq(&self) -> u32 {
        Self::IRQ
    }

    fn irq_name(&self) -> &str {
        "SysTick"
    }

    fn next_interrupt_in(&self, _now: TimePoint) -> Duration {
        Self::INTERVAL
    }

    fn handle_interrupt(&self) {
        self.increment_micros(Self::INTERVAL.as_micros() as u64);
    }
}
