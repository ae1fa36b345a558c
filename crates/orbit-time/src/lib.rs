//! Clocks for the Orbit kernel.
//!
//! This crate provides:
//! - [`Clock`] trait consumed by the scheduler, reactor and drivers
//! - [`SteadyClock`], a free-running host clock
//! - [`VirtualClock`], a clock that can be frozen, scaled and stepped
//! - [`Clockable`] trait for subsystems that gate virtual-time advancement

pub mod clock;
pub mod clockable;
pub mod virtual_clock;

pub use clock::*;
pub use clockable::*;
pub use virtual_clock::*;
