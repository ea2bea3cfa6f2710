//! Paceline: pull-based streams with demand negotiation, and a
//! deterministic virtual-time harness for testing them.
//!
//! # Overview
//!
//! A [`Source`](stream::Source) delivers values to a [`Sink`](stream::Sink)
//! only as fast as the sink has requested them. [`DemandQueue`] does the
//! credit accounting for one source/sink edge and [`ReplaySubject`] fans one
//! stream out to many independently paced subscribers.
//!
//! The [`lab`] module drives such streams on a virtual clock:
//!
//! ```ignore
//! use paceline::lab::{TestConfiguration, VirtualTimeScheduler};
//! use paceline::Signal;
//!
//! let scheduler = VirtualTimeScheduler::new();
//! let sink = scheduler.start(TestConfiguration::default(), |scheduler| {
//!     scheduler
//!         .create_cold_source(vec![(0_i64, Signal::<u32, ()>::Value(1))])
//!         .expect("valid script")
//! });
//! assert_eq!(sink.values(), vec![1]);
//! ```
//!
//! # Modules
//!
//! - [`types`]: virtual time, demand, signals
//! - [`util`]: FIFO queue, slab, trampoline
//! - [`stream`]: the source/sink contract, demand queue, replay subject
//! - [`lab`]: scheduler, scripted sources, recording sinks, lifecycle
//! - [`error`]: crate error type
//!
//! Everything is single-threaded: handles are `Rc`, not `Arc`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod lab;
pub mod stream;
pub mod types;
pub mod util;

#[cfg(test)]
mod test_utils;

pub use error::{Error, Result};
pub use lab::{RecordingOptions, RecordingSink, TestConfiguration, VirtualTimeScheduler};
pub use stream::{DemandQueue, ReplaySubject, Sink, Source, Subscription};
pub use types::{Demand, Signal, Terminal, VirtualTime, VirtualTimeInterval};
