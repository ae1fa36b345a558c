//! Hardware abstraction contracts.
//!
//! This crate provides:
//! - [`Peripheral`] and [`Functional`], the reference-counted power lifecycle
//!   every driver plugs into through [`PowerControl`]
//! - [`rcc`] module with the clock-tree interface used by the scheduler
//! - [`systick`] module with the system tick interface
//!
//! Concrete drivers live outside the kernel and implement these traits.

pub mod peripheral;
pub mod rcc;
pub mod systick;

pub use peripheral::*;
pub use rcc::{ClockSpeed, Rcc, RccNoop};
pub use systick::SysTick;
