#![doc = "Cooperative execution engine for the Orbit kernel."]

pub mod scheduler;
pub mod task;

pub use scheduler::*;
pub use task::*;
