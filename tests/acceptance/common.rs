//! Common utilities for integration tests.
//!
//! Provides helpers for:
//! - Building frozen virtual clocks
//! - Power-counting devices and scripted interrupt sources
//! - Reading back simulation logs

#![allow(dead_code)] // Not every helper is used by every test module

use orbit_common::time::TimePoint;
use orbit_hal::PowerControl;
use orbit_sim::{EventKind, IrqGenerator, SimEvent, SimLogReader, SimLogger};
use orbit_time::{Clock, VirtualClock};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A frozen clock, both concrete and as the trait object tasks take.
pub fn frozen_clock() -> (Arc<VirtualClock>, Arc<dyn Clock>) {
    let clock = Arc::new(VirtualClock::frozen());
    let dyn_clock: Arc<dyn Clock> = clock.clone();
    (clock, dyn_clock)
}

/// A logger writing into `dir`.
pub fn logger_in(dir: &tempfile::TempDir, name: &str) -> Arc<SimLogger> {
    Arc::new(SimLogger::create(dir.path().join(name)).expect("create simulation log"))
}

/// Flush `logger` and read every record back.
pub fn read_events(logger: &SimLogger) -> Vec<SimEvent> {
    logger.flush().expect("flush simulation log");
    SimLogReader::open(logger.path())
        .expect("open simulation log")
        .collect::<Result<Vec<_>, _>>()
        .expect("read simulation log")
}

/// Function-call records as `(timestamp_us, name)`.
pub fn function_calls(events: &[SimEvent]) -> Vec<(u64, String)> {
    events
        .iter()
        .filter_map(|event| match &event.kind {
            EventKind::Function { name, .. } => Some((event.timestamp_us, name.clone())),
            EventKind::Irq { .. } => None,
        })
        .collect()
}

/// Interrupt records as `(timestamp_us, irq_number)`.
pub fn interrupts(events: &[SimEvent]) -> Vec<(u64, u32)> {
    events
        .iter()
        .filter_map(|event| match &event.kind {
            EventKind::Irq { irq_number, .. } => Some((event.timestamp_us, *irq_number)),
            EventKind::Function { .. } => None,
        })
        .collect()
}

/// Device that counts power transitions.
#[derive(Debug, Default)]
pub struct CountingDevice {
    enables: AtomicU32,
    disables: AtomicU32,
}

impl CountingDevice {
    /// Power-ups so far.
    pub fn enables(&self) -> u32 {
        self.enables.load(Ordering::SeqCst)
    }

    /// Power-downs so far.
    pub fn disables(&self) -> u32 {
        self.disables.load(Ordering::SeqCst)
    }
}

impl PowerControl for CountingDevice {
    fn enable(&self) {
        self.enables.fetch_add(1, Ordering::SeqCst);
    }

    fn disable(&self) {
        self.disables.fetch_add(1, Ordering::SeqCst);
    }
}

/// Interrupt source that fires on a fixed period and raises a flag.
pub struct FlagSource {
    irq: u32,
    interval: Duration,
    flag: Arc<AtomicBool>,
    fired_at: Mutex<Vec<TimePoint>>,
}

impl FlagSource {
    /// A source firing every `interval`.
    pub fn new(irq: u32, interval: Duration) -> Arc<Self> {
        Arc::new(Self {
            irq,
            interval,
            flag: Arc::new(AtomicBool::new(false)),
            fired_at: Mutex::new(Vec::new()),
        })
    }

    /// Flag raised by every interrupt.
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }

    /// Virtual times at which the source fired.
    pub fn fired_at(&self) -> Vec<TimePoint> {
        self.fired_at.lock().expect("fire times").clone()
    }
}

impl IrqGenerator for FlagSource {
    fn irq(&self) -> u32 {
        self.irq
    }

    fn irq_name(&self) -> &str {
        "FLAG"
    }

    fn next_interrupt_in(&self, _now: TimePoint) -> Duration {
        self.interval
    }

    fn handle_interrupt(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    fn generate_interrupt(&self, now: TimePoint) {
        self.fired_at.lock().expect("fire times").push(now);
        self.handle_interrupt();
    }
}
