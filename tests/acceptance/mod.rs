//! Integration tests for Orbit kernel acceptance testing.
//!
//! Each module drives a full stack: clock, scheduler, drivers and, where
//! interrupts matter, the reactor with its simulation log.

mod common;
mod power_test;
mod reactor_test;
mod scheduler_test;
