// Timing primitives for the sweep driver
pub mod pacing;
pub mod trigger;

pub use pacing::Pacer;
pub use trigger::{SingleFlight, SweepTimer, TimerFire};
