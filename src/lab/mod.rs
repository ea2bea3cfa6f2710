//! Deterministic virtual-time test harness.
//!
//! The harness provides:
//!
//! - A virtual clock and task queue ([`VirtualTimeScheduler`])
//! - Scripted hot and cold sources ([`ScriptedSource`])
//! - A recording, demand-accounting sink ([`RecordingSink`], [`DemandLedger`])
//! - A standard created/subscribed/cancelled lifecycle
//!   ([`VirtualTimeScheduler::start`])
//!
//! Nothing here reads the wall clock. The same script and configuration
//! always produce the same recording.

pub mod config;
mod harness;
pub mod ledger;
pub mod recording;
pub mod scheduler;
pub mod scripted;

pub use config::{NegativeBalanceHandler, RecordingOptions, SchedulerConfig, TestConfiguration};
pub use ledger::{DemandBalance, DemandLedger, DemandLedgerEntry, Transaction};
pub use recording::{RecordingSink, SinkPhase, TestSequence};
pub use scheduler::{CancelHandle, TaskId, VirtualTimeScheduler};
pub use scripted::{ScriptedEvent, ScriptedSource, SourceBehavior};
