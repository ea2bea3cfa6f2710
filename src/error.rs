//! Error types for the streaming contract and the virtual-time harness.
//!
//! Most irregularities in a stream (enqueue after close, cancel twice,
//! subscribing to a finished subject) are defined as no-ops and never
//! surface here. Only two things are errors:
//!
//! - a sink receiving more values than it credited ([`Error::ProtocolViolation`])
//! - a source script containing a subscription signal ([`Error::IllegalScriptedEvent`])

use crate::types::VirtualTime;
use thiserror::Error;

/// Errors raised by the harness.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A sink received a value while its demand balance was exhausted.
    #[error("protocol violation at {time}: value received with demand balance {balance}")]
    ProtocolViolation {
        /// Virtual time of the offending delivery.
        time: VirtualTime,
        /// Balance after the unauthorized debit.
        balance: i64,
    },

    /// A source script contained a `Subscription` signal.
    #[error("illegal scripted event #{index} at {time}: subscription signals cannot be scripted")]
    IllegalScriptedEvent {
        /// Position of the event in the script.
        index: usize,
        /// Scripted time of the event.
        time: VirtualTime,
    },
}

/// Result alias for harness operations.
pub type Result<T> = core::result::Result<T, Error>;
