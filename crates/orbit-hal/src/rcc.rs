//! Reset and clock control.
//!
//! The core clock tree is board specific. The kernel only needs to ask for a
//! handful of coarse operating points, so that is all this interface offers.

use std::sync::atomic::{AtomicU8, Ordering};
use tracing::debug;

/// Coarse core clock operating point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ClockSpeed {
    /// Whatever the board booted with.
    #[default]
    Reset,
    /// Highest supported frequency.
    Max,
    /// Lowest supported frequency.
    Min,
    /// Best work-per-joule point for the board.
    EnergyEfficient,
}

impl ClockSpeed {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Max,
            2 => Self::Min,
            3 => Self::EnergyEfficient,
            _ => Self::Reset,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Reset => 0,
            Self::Max => 1,
            Self::Min => 2,
            Self::EnergyEfficient => 3,
        }
    }
}

/// Core clock tree control.
pub trait Rcc: Send + Sync {
    /// Run the core at its highest frequency.
    fn set_clock_to_max_speed(&self);

    /// Run the core at its lowest frequency.
    fn set_clock_to_min_speed(&self);

    /// Run the core at the board's energy-efficient operating point.
    fn set_clock_to_energy_efficient_speed(&self);

    /// Go back to the speed in effect before the last change.
    fn restore_clock_speed(&self);
}

/// Clock control for hosts without a clock tree.
///
/// Requests only change what [`RccNoop::speed`] reports.
#[derive(Debug, Default)]
pub struct RccNoop {
    current: AtomicU8,
    previous: AtomicU8,
}

impl RccNoop {
    /// Create at [`ClockSpeed::Reset`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recently requested operating point.
    #[must_use]
    pub fn speed(&self) -> ClockSpeed {
        ClockSpeed::from_u8(self.current.load(Ordering::Acquire))
    }

    fn switch_to(&self, speed: ClockSpeed) {
        let old = self.current.swap(speed.as_u8(), Ordering::AcqRel);
        self.previous.store(old, Ordering::Release);
        debug!(?speed, "Clock speed change requested");
    }
}

impl Rcc for RccNoop {
    fn set_clock_to_max_speed(&self) {
        self.switch_to(ClockSpeed::Max);
    }

    fn set_clock_to_min_speed(&self) {
        self.switch_to(ClockSpeed::Min);
    }

    fn set_clock_to_energy_efficient_speed(&self) {
        self.switch_to(ClockSpeed::EnergyEfficient);
    }

    fn restore_clock_speed(&self) {
        let previous = ClockSpeed::from_u8(self.previous.load(Ordering::Acquire));
        self.switch_to(previous);
    }
}
