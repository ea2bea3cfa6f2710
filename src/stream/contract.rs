//! The pull-based source/sink contract.
//!
//! A [`Source`] is subscribed with a [`Sink`]. Before anything else it must
//! hand the sink a [`Subscription`] through [`Sink::receive_subscription`].
//! The sink then grants credit with [`Subscription::request`], and the source
//! may deliver at most that many values through [`Sink::receive_value`]. Each
//! delivery may grant further credit through its return value. A stream ends
//! with exactly one [`Sink::receive_terminal`], after which nothing else is
//! delivered.
//!
//! Everything here is single-threaded: handles are `Rc`-shared and every
//! method takes `&self`, because a sink routinely calls back into its
//! subscription while a delivery to it is still on the stack.

use crate::types::{Demand, Terminal};
use core::cell::Cell;
use std::rc::Rc;

/// Per-edge handle through which a sink controls its source.
pub trait Subscription {
    /// Grants `demand` additional values.
    fn request(&self, demand: Demand);

    /// Stops the stream. Calling this more than once has no further effect.
    fn cancel(&self);
}

/// Consumer side of the contract.
pub trait Sink<T, E> {
    /// Receives the subscription handle. Always the first call a sink sees.
    fn receive_subscription(&self, subscription: SubscriptionHandle);

    /// Receives one value and returns any additional credit it grants.
    fn receive_value(&self, value: T) -> Demand;

    /// Receives the terminal signal.
    fn receive_terminal(&self, terminal: Terminal<E>);
}

/// Producer side of the contract.
pub trait Source<T, E> {
    /// Attaches `sink`, which must first receive a subscription handle.
    fn subscribe(&self, sink: SinkHandle<T, E>);
}

/// Shared subscription handle.
pub type SubscriptionHandle = Rc<dyn Subscription>;

/// Shared sink handle.
pub type SinkHandle<T, E> = Rc<dyn Sink<T, E>>;

impl<T, E, S> Source<T, E> for Rc<S>
where
    S: Source<T, E> + ?Sized,
{
    fn subscribe(&self, sink: SinkHandle<T, E>) {
        (**self).subscribe(sink);
    }
}

/// A subscription that ignores every request.
///
/// Handed to sinks that are refused before the terminal signal that
/// immediately follows.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptySubscription;

impl EmptySubscription {
    /// Returns a shared empty subscription handle.
    #[must_use]
    pub fn handle() -> SubscriptionHandle {
        Rc::new(Self)
    }
}

impl Subscription for EmptySubscription {
    fn request(&self, _demand: Demand) {}

    fn cancel(&self) {}
}

/// Cancels a refused `subscription` with `refusing` raised.
///
/// Cancelling may synchronously deliver a terminal back into the refusing
/// sink. That terminal belongs to the refused stream, so sinks check the
/// flag and drop it instead of ending their live stream.
pub(crate) fn cancel_refused(refusing: &Cell<bool>, subscription: &SubscriptionHandle) {
    struct Restore<'a> {
        flag: &'a Cell<bool>,
        previous: bool,
    }

    impl Drop for Restore<'_> {
        fn drop(&mut self) {
            self.flag.set(self.previous);
        }
    }

    let _restore = Restore {
        flag: refusing,
        previous: refusing.replace(true),
    };
    subscription.cancel();
}

/// Identity of a sink, derived from the address of its shared allocation.
///
/// Two handles compare equal exactly when they are clones of the same `Rc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SinkId(usize);

impl SinkId {
    /// Returns the identity of `sink`.
    #[must_use]
    pub fn of<T, E>(sink: &SinkHandle<T, E>) -> Self {
        Self(Rc::as_ptr(sink).cast::<()>() as usize)
    }
}
