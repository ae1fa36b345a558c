//! Off-target simulation for the Orbit kernel.
//!
//! This crate provides:
//! - [`Reactor`], which fires simulated interrupts against a virtual clock
//! - [`IrqGenerator`], the interface for simulated interrupt sources
//! - [`SimLogger`] and [`SimLogReader`] for the binary simulation log
//! - [`Interceptor`], which records driver calls to the simulation log
//! - [`FakeSysTick`], a 1 kHz system tick

pub mod interceptor;
pub mod irq;
pub mod logger;
pub mod reactor;
pub mod systick;

pub use interceptor::Interceptor;
pub use irq::IrqGenerator;
pub use logger::{EventKind, SimEvent, SimLogReader, SimLogger};
pub use reactor::Reactor;
pub use systick::FakeSysTick;
