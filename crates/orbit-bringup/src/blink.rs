//! Bringup tasks.

use crate::gpio::{Gpio, GpioDriver, Pin};
use orbit_hal::peripheral::{Peripheral, PowerControl};
use orbit_runtime::Task;
use orbit_time::Clock;
use std::sync::Arc;
use std::time::Duration;

/// Toggle `pin` every `delay` for `duration`, then leave it low.
///
/// The port stays powered for the whole run.
pub fn blink<D>(
    clock: Arc<dyn Clock>,
    port: Arc<Peripheral<D>>,
    pin: Pin,
    delay: Duration,
    duration: Duration,
) -> Task
where
    D: GpioDriver + PowerControl + 'static,
{
    Task::new(move |cx| async move {
        let gpio = Gpio::new(&port);
        let stop_time = clock.now() + duration;

        gpio.write_pin(pin, false);
        while clock.now() < stop_time {
            gpio.toggle_pin(pin);
            cx.delay(delay).await;
        }
        gpio.write_pin(pin, false);
    })
}

/// Shape of a payload burst.
#[derive(Debug, Clone, Copy)]
pub struct Burst {
    /// Idle time between bursts, with the port powered down.
    pub period: Duration,
    /// Pulses per burst.
    pub pulses: u32,
    /// High and low time of each pulse.
    pub pulse_width: Duration,
}

impl Default for Burst {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(1),
            pulses: 3,
            pulse_width: Duration::from_millis(10),
        }
    }
}

/// Pulse `pin` in bursts for `duration`, powering the port only while a
/// burst is in progress.
pub fn power_gated_bursts<D>(
    clock: Arc<dyn Clock>,
    port: Arc<Peripheral<D>>,
    pin: Pin,
    burst: Burst,
    duration: Duration,
) -> Task
where
    D: GpioDriver + PowerControl + 'static,
{
    Task::new(move |cx| async move {
        let stop_time = clock.now() + duration;
        while clock.now() < stop_time {
            let gpio = Gpio::new(&port);
            for _ in 0..burst.pulses {
                gpio.write_pin(pin, true);
                cx.delay(burst.pulse_width).await;
                gpio.write_pin(pin, false);
                cx.delay(burst.pulse_width).await;
            }
            drop(gpio);
            cx.delay(burst.period).await;
        }
    })
}
