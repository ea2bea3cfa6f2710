//! Core value types shared by the stream contract and the lab harness.
//!
//! - [`time`]: virtual instants and durations
//! - [`demand`]: saturating credit counts
//! - [`signal`]: subscription / value / terminal signals

pub mod demand;
pub mod signal;
pub mod time;

pub use demand::Demand;
pub use signal::{Signal, Terminal};
pub use time::{VirtualTime, VirtualTimeInterval};
