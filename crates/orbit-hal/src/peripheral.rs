//! Power and clock management for peripherals.
//!
//! A peripheral should be powered only while something is using it. The
//! [`Peripheral`] owns the device and counts live [`Functional`] handles; the
//! first handle turns the device on and the last one to go turns it off.
//! Functionality is reached only through a handle, so holding a handle is
//! the same thing as needing the hardware.
//!
//! Drivers implement [`PowerControl`] with their register writes and wrap a
//! `Functional` in their own handle type that exposes the device's
//! operations.

use orbit_common::error::{fatal, KernelError};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Enable/disable hooks for a device.
///
/// Only the reference counting in [`Peripheral`] calls these, and only on the
/// 0→1 and 1→0 transitions.
pub trait PowerControl: Send + Sync {
    /// Turn on power and clock to the device.
    fn enable(&self);

    /// Turn off power and clock to the device.
    fn disable(&self);
}

/// A physical device together with its live handle count.
///
/// One per device, for the lifetime of the firmware.
pub struct Peripheral<D: PowerControl> {
    device: D,
    /// Enable/disable run while this lock is held, so transitions are
    /// strictly ordered even when handles move between threads.
    ref_count: Mutex<usize>,
}

impl<D: PowerControl> Peripheral<D> {
    /// Wrap a device. The device starts disabled.
    pub fn new(device: D) -> Arc<Self> {
        Arc::new(Self {
            device,
            ref_count: Mutex::new(0),
        })
    }

    /// Get a handle to the device's functions, powering it up if this is the
    /// only handle.
    #[must_use]
    pub fn access(self: &Arc<Self>) -> Functional<D> {
        self.inc_ref_count();
        Functional {
            peripheral: Some(Arc::clone(self)),
        }
    }

    /// Number of live handles.
    #[must_use]
    pub fn ref_count(&self) -> usize {
        *self.count()
    }

    /// Whether the device is currently powered.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.ref_count() > 0
    }

    /// The underlying device, for inspection.
    ///
    /// Calling device functions through this reference bypasses power
    /// management; use [`Peripheral::access`] for that.
    #[must_use]
    pub fn device(&self) -> &D {
        &self.device
    }

    fn count(&self) -> MutexGuard<'_, usize> {
        self.ref_count.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn inc_ref_count(&self) {
        let mut count = self.count();
        if *count == 0 {
            debug!(peripheral = std::any::type_name::<D>(), "Enabling peripheral");
            self.device.enable();
        }
        *count += 1;
    }

    fn dec_ref_count(&self) {
        let mut count = self.count();
        let Some(remaining) = count.checked_sub(1) else {
            drop(count);
            fatal(KernelError::RefcountUnderflow {
                peripheral: std::any::type_name::<D>().to_string(),
            });
        };
        *count = remaining;
        if remaining == 0 {
            debug!(peripheral = std::any::type_name::<D>(), "Disabling peripheral");
            self.device.disable();
        }
    }
}

impl<D: PowerControl> fmt::Debug for Peripheral<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Peripheral")
            .field("device", &std::any::type_name::<D>())
            .field("ref_count", &self.ref_count())
            .finish()
    }
}

/// A handle that keeps its peripheral powered.
///
/// Cloning takes another reference, moving transfers this one, dropping
/// releases it. A default handle references nothing and has no effect on
/// any peripheral.
pub struct Functional<D: PowerControl> {
    peripheral: Option<Arc<Peripheral<D>>>,
}

impl<D: PowerControl> Functional<D> {
    /// Whether this handle references a peripheral.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.peripheral.is_some()
    }

    /// The device behind this handle.
    #[must_use]
    pub fn device(&self) -> Option<&D> {
        self.peripheral.as_deref().map(|p| &p.device)
    }

    /// The peripheral behind this handle.
    #[must_use]
    pub fn peripheral(&self) -> Option<&Arc<Peripheral<D>>> {
        self.peripheral.as_ref()
    }

    /// Release the reference early, leaving an empty handle.
    pub fn invalidate(&mut self) {
        if let Some(peripheral) = self.peripheral.take() {
            peripheral.dec_ref_count();
        }
    }
}

impl<D: PowerControl> Default for Functional<D> {
    fn default() -> Self {
        Self { peripheral: None }
    }
}

impl<D: PowerControl> Clone for Functional<D> {
    fn clone(&self) -> Self {
        if let Some(peripheral) = &self.peripheral {
            peripheral.inc_ref_count();
        }
        Self {
            peripheral: self.peripheral.clone(),
        }
    }
}

impl<D: PowerControl> Drop for Functional<D> {
    fn drop(&mut self) {
        self.invalidate();
    }
}

impl<D: PowerControl> fmt::Debug for Functional<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Functional")
            .field("peripheral", &self.peripheral)
            .finish()
    }
}
