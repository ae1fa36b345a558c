//! Simulated interrupt sources.

use orbit_common::time::TimePoint;
use std::time::Duration;
use tracing::trace;

/// A source of simulated hardware interrupts.
///
/// Registered with a [`Reactor`](crate::Reactor), which asks for the time
/// until the next interrupt after every firing. Handlers run on the
/// reactor's thread and must not move the virtual clock.
pub trait IrqGenerator: Send + Sync {
    /// Interrupt number.
    fn irq(&self) -> u32;

    /// Human-readable interrupt name.
    fn irq_name(&self) -> &str;

    /// Time from `now` until the next interrupt.
    fn next_interrupt_in(&self, now: TimePoint) -> Duration;

    /// The interrupt service routine.
    fn handle_interrupt(&self);

    /// Raise the interrupt at `now`.
    fn generate_interrupt(&self, now: TimePoint) {
        trace!(irq = self.irq(), name = self.irq_name(), %now, "Interrupt");
        self.handle_interrupt();
    }
}
