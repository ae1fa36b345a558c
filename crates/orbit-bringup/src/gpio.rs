//! GPIO port driver interface and its simulated implementation.

use orbit_hal::peripheral::{Functional, Peripheral, PowerControl};
use orbit_sim::Interceptor;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

/// Pin number within a port.
pub type Pin = u8;

/// Pins per port.
pub const PINS_PER_PORT: Pin = 16;

/// Register-level operations of a GPIO port.
pub trait GpioDriver: Send + Sync {
    /// Drive `pin` to `level`.
    fn write_pin(&self, pin: Pin, level: bool);

    /// Invert the output level of `pin`.
    fn toggle_pin(&self, pin: Pin);

    /// Current level of `pin`.
    fn read_pin(&self, pin: Pin) -> bool;
}

/// GPIO port simulated in memory.
#[derive(Debug, Default)]
pub struct SimGpio {
    levels: AtomicU32,
    toggles: AtomicU64,
    enables: AtomicU64,
    disables: AtomicU64,
}

impl SimGpio {
    /// Number of pin toggles so far.
    pub fn toggles(&self) -> u64 {
        self.toggles.load(Ordering::Relaxed)
    }

    /// Number of times the port was powered up.
    pub fn enables(&self) -> u64 {
        self.enables.load(Ordering::Relaxed)
    }

    /// Number of times the port was powered down.
    pub fn disables(&self) -> u64 {
        self.disables.load(Ordering::Relaxed)
    }

    fn mask(pin: Pin) -> u32 {
        1 << (pin % PINS_PER_PORT)
    }
}

impl PowerControl for SimGpio {
    fn enable(&self) {
        self.enables.fetch_add(1, Ordering::Relaxed);
    }

    fn disable(&self) {
        self.disables.fetch_add(1, Ordering::Relaxed);
    }
}

impl GpioDriver for SimGpio {
    fn write_pin(&self, pin: Pin, level: bool) {
        if level {
            self.levels.fetch_or(Self::mask(pin), Ordering::Relaxed);
        } else {
            self.levels.fetch_and(!Self::mask(pin), Ordering::Relaxed);
        }
    }

    fn toggle_pin(&self, pin: Pin) {
        self.levels.fetch_xor(Self::mask(pin), Ordering::Relaxed);
        self.toggles.fetch_add(1, Ordering::Relaxed);
    }

    fn read_pin(&self, pin: Pin) -> bool {
        self.levels.load(Ordering::Relaxed) & Self::mask(pin) != 0
    }
}

impl<G: GpioDriver> GpioDriver for Interceptor<G> {
    fn write_pin(&self, pin: Pin, level: bool) {
        self.log_call("write_pin");
        self.inner().write_pin(pin, level);
    }

    fn toggle_pin(&self, pin: Pin) {
        self.log_call("toggle_pin");
        self.inner().toggle_pin(pin);
    }

    fn read_pin(&self, pin: Pin) -> bool {
        self.log_call("read_pin");
        self.inner().read_pin(pin)
    }
}

/// A GPIO port as seen by the board: intercepted, power managed.
pub type GpioPeripheral = Peripheral<Interceptor<SimGpio>>;

/// Powered handle to a GPIO port.
pub struct Gpio<D: GpioDriver + PowerControl> {
    functional: Functional<D>,
}

impl<D: GpioDriver + PowerControl> Gpio<D> {
    /// Power up the port (if needed) and take a handle to it.
    pub fn new(peripheral: &Arc<Peripheral<D>>) -> Self {
        Self {
            functional: peripheral.access(),
        }
    }

    /// Drive `pin` to `level`.
    pub fn write_pin(&self, pin: Pin, level: bool) {
        if let Some(device) = self.functional.device() {
            device.write_pin(pin, level);
        }
    }

    /// Invert the output level of `pin`.
    pub fn toggle_pin(&self, pin: Pin) {
        if let Some(device) = self.functional.device() {
            device.toggle_pin(pin);
        }
    }

    /// Current level of `pin`.
    pub fn read_pin(&self, pin: Pin) -> bool {
        self.functional
            .device()
            .is_some_and(|device| device.read_pin(pin))
    }
}
