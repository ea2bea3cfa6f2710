//! Pull-based streaming with demand negotiation.
//!
//! A [`Source`] pushes values to a [`Sink`] only as fast as the sink has
//! granted credit through its [`Subscription`]. Everything here is
//! single-threaded: handles are `Rc` and state lives in `RefCell`s that are
//! never borrowed across a call into another participant.
//!
//! # Building blocks
//!
//! - [`DemandQueue`]: buffering and credit accounting for one edge
//! - [`ReplaySubject`]: multicast hub replaying recent history

mod contract;
mod demand_queue;
mod replay;

pub use contract::{
    EmptySubscription, Sink, SinkHandle, SinkId, Source, Subscription, SubscriptionHandle,
};
pub(crate) use contract::cancel_refused;
pub use demand_queue::DemandQueue;
pub use replay::{ReplaySubject, SubscribeRefusal};
