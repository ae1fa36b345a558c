//! Simulated board.
//!
//! Wires a virtual clock, the interrupt reactor, a fake SysTick and two
//! intercepted GPIO ports together. Port A carries the status LEDs; port B
//! drives a payload line that is only powered during bursts.

use crate::gpio::{GpioPeripheral, SimGpio};
use orbit_common::config::KernelConfig;
use orbit_common::error::KernelResult;
use orbit_hal::rcc::RccNoop;
use orbit_hal::Peripheral;
use orbit_sim::{FakeSysTick, Interceptor, Reactor, SimLogger};
use orbit_time::{Clock, VirtualClock};
use std::sync::Arc;
use tracing::info;

/// Everything a bringup program runs against.
pub struct SimulationBoard {
    clock: Arc<VirtualClock>,
    reactor: Reactor,
    systick: Arc<FakeSysTick>,
    rcc: Arc<RccNoop>,
    gpio_a: Arc<GpioPeripheral>,
    gpio_b: Arc<GpioPeripheral>,
    logger: Arc<SimLogger>,
}

impl SimulationBoard {
    /// Pin of the first status LED on port A.
    pub const GREEN_LED_PIN: u8 = 5;

    /// Payload line on port B.
    pub const PAYLOAD_PIN: u8 = 0;

    /// Build the board from configuration.
    ///
    /// # Errors
    ///
    /// Fails if the clock settings are invalid, the simulation log cannot be
    /// created or the reactor thread cannot be started.
    pub fn new(config: &KernelConfig) -> KernelResult<Self> {
        let clock = Arc::new(VirtualClock::from_config(&config.clock)?);
        let logger = Arc::new(SimLogger::from_config(&config.simulation)?);
        let reactor = Reactor::with_logger(&clock, &config.reactor, Some(Arc::clone(&logger)))?;

        let systick = Arc::new(FakeSysTick::new());
        reactor.add_generator(systick.clone());

        let dyn_clock: Arc<dyn Clock> = clock.clone();
        let port = || {
            Peripheral::new(Interceptor::new(
                SimGpio::default(),
                Arc::clone(&dyn_clock),
                Arc::clone(&logger),
            ))
        };
        let gpio_a = port();
        let gpio_b = port();

        info!(
            mode = ?config.clock.mode,
            log = %logger.path().display(),
            "Simulation board ready"
        );

        Ok(Self {
            clock,
            reactor,
            systick,
            rcc: Arc::new(RccNoop::new()),
            gpio_a,
            gpio_b,
            logger,
        })
    }

    /// The board's virtual clock.
    pub fn clock(&self) -> &Arc<VirtualClock> {
        &self.clock
    }

    /// The interrupt reactor.
    pub fn reactor(&self) -> &Reactor {
        &self.reactor
    }

    /// The system tick.
    pub fn systick(&self) -> &Arc<FakeSysTick> {
        &self.systick
    }

    /// Clock tree control.
    pub fn rcc(&self) -> &Arc<RccNoop> {
        &self.rcc
    }

    /// GPIO port A (status LEDs).
    pub fn gpio_a(&self) -> &Arc<GpioPeripheral> {
        &self.gpio_a
    }

    /// GPIO port B (payload).
    pub fn gpio_b(&self) -> &Arc<GpioPeripheral> {
        &self.gpio_b
    }

    /// The simulation log.
    pub fn logger(&self) -> &Arc<SimLogger> {
        &self.logger
    }

    /// Stop the reactor and flush the simulation log.
    ///
    /// # Errors
    ///
    /// Fails if the log cannot be flushed.
    pub fn shutdown(self) -> KernelResult<()> {
        self.reactor.shutdown();
        self.logger.flush()
    }
}
