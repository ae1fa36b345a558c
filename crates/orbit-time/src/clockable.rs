//! Participants in virtual-time advancement.

use orbit_common::time::TimePoint;

/// A simulated subsystem that runs in parallel with the core: a daughterboard,
/// an external chipset, the interrupt reactor.
///
/// A clockable registers with a [`VirtualClock`](crate::VirtualClock). Every
/// time the clock is asked to move, each clockable first gets to pull the
/// proposed time back to the next event it must handle, and is then told which
/// time was adopted so it can catch up.
pub trait Clockable: Send + Sync {
    /// Clamp a proposed new time.
    ///
    /// Return `proposed` if nothing happens before it, otherwise the time of the
    /// earliest event this participant must process first.
    fn update_time(&self, proposed: TimePoint) -> TimePoint;

    /// React to the clock having moved to `current`.
    fn run(&self, current: TimePoint);
}

/// Handle identifying one registration with a virtual clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClockableId(pub(crate) u64);
