//! Multicast subject with bounded replay.
//!
//! A [`ReplaySubject`] fans one input stream out to many subscribers. Each
//! subscriber gets its own [`DemandQueue`], so a slow subscriber never
//! blocks delivery to the others. New subscribers first receive the most
//! recent `capacity` values, released as their demand allows.
//!
//! Subscriptions hold only a weak reference to the subject plus a registry
//! token; the subject's lifetime is governed by its own handles.

use crate::stream::contract::{
    cancel_refused, EmptySubscription, Sink, SinkHandle, SinkId, Source, Subscription,
    SubscriptionHandle,
};
use crate::stream::demand_queue::DemandQueue;
use crate::types::{Demand, Terminal};
use crate::util::{FifoQueue, TrampolineQueue};
use core::cell::{Cell, RefCell};
use core::fmt;
use std::rc::{Rc, Weak};
use tracing::debug;

/// Why a subscribe call was answered with an immediate `finished`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeRefusal {
    /// The sink is already registered with this subject.
    Duplicate,
    /// The subject has already published its terminal.
    Completed,
}

struct Registered<T, E> {
    id: SinkId,
    token: u64,
    queue: Rc<DemandQueue<T, E>>,
}

struct SubjectState<T, E> {
    completed: bool,
    buffer: FifoQueue<T>,
    capacity: Option<usize>,
    subscribers: Vec<Registered<T, E>>,
    next_token: u64,
    upstream: Option<SubscriptionHandle>,
}

/// Replaying multicast hub.
pub struct ReplaySubject<T, E> {
    state: Rc<RefCell<SubjectState<T, E>>>,
    /// Raised while a refused upstream is being cancelled.
    refusing: Rc<Cell<bool>>,
    trampoline: Rc<TrampolineQueue>,
}

impl<T, E> Clone for ReplaySubject<T, E> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
            refusing: Rc::clone(&self.refusing),
            trampoline: Rc::clone(&self.trampoline),
        }
    }
}

impl<T, E> fmt::Debug for ReplaySubject<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("ReplaySubject")
            .field("completed", &state.completed)
            .field("buffered", &state.buffer.len())
            .field("capacity", &state.capacity)
            .field("subscribers", &state.subscribers.len())
            .finish()
    }
}

impl<T, E> ReplaySubject<T, E> {
    /// Creates a subject that replays the last `capacity` values.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self::with_capacity_limit(Some(capacity))
    }

    /// Creates a subject that replays its whole history.
    #[must_use]
    pub fn unbounded() -> Self {
        Self::with_capacity_limit(None)
    }

    fn with_capacity_limit(capacity: Option<usize>) -> Self {
        Self {
            state: Rc::new(RefCell::new(SubjectState {
                completed: false,
                buffer: FifoQueue::new(),
                capacity,
                subscribers: Vec::new(),
                next_token: 0,
                upstream: None,
            })),
            refusing: Rc::new(Cell::new(false)),
            trampoline: Rc::new(TrampolineQueue::new()),
        }
    }

    /// Routes subscriber demand through `trampoline` instead of a private
    /// one. Use the scheduler's trampoline so demand requested from inside
    /// scheduled tasks is flattened alongside everything else.
    #[must_use]
    pub fn with_trampoline(mut self, trampoline: Rc<TrampolineQueue>) -> Self {
        self.trampoline = trampoline;
        self
    }

    /// Returns true until the terminal has been published.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.state.borrow().completed
    }

    /// Returns the number of registered subscribers.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.state.borrow().subscribers.len()
    }

    /// Returns whether subscribing `sink` now would be refused, and why.
    #[must_use]
    pub fn refusal_for(&self, sink: &SinkHandle<T, E>) -> Option<SubscribeRefusal> {
        let state = self.state.borrow();
        if state.completed {
            return Some(SubscribeRefusal::Completed);
        }
        let id = SinkId::of(sink);
        state
            .subscribers
            .iter()
            .any(|entry| entry.id == id)
            .then_some(SubscribeRefusal::Duplicate)
    }
}

impl<T: Clone, E: Clone> ReplaySubject<T, E> {
    /// Returns a snapshot of the replay buffer, oldest first.
    #[must_use]
    pub fn replay_buffer(&self) -> Vec<T> {
        self.state.borrow().buffer.iter().cloned().collect()
    }

    /// Records `value` for replay and enqueues it to every subscriber.
    ///
    /// No-op once the subject has completed.
    pub fn publish(&self, value: T) {
        let queues = {
            let mut state = self.state.borrow_mut();
            if state.completed {
                debug!("publish after completion ignored");
                return;
            }
            match state.capacity {
                Some(0) => {}
                Some(capacity) => {
                    state.buffer.enqueue(value.clone());
                    while state.buffer.len() > capacity {
                        let _ = state.buffer.dequeue();
                    }
                }
                None => state.buffer.enqueue(value.clone()),
            }
            state
                .subscribers
                .iter()
                .map(|entry| Rc::clone(&entry.queue))
                .collect::<Vec<_>>()
        };
        for queue in queues {
            let _ = queue.enqueue(value.clone());
        }
    }

    /// Completes the subject and expedites `terminal` to every subscriber.
    ///
    /// The registry is cleared; later subscribers receive `finished`.
    pub fn publish_terminal(&self, terminal: Terminal<E>) {
        let (subscribers, upstream) = {
            let mut state = self.state.borrow_mut();
            if state.completed {
                debug!("terminal after completion ignored");
                return;
            }
            state.completed = true;
            (
                core::mem::take(&mut state.subscribers),
                state.upstream.take(),
            )
        };
        drop(upstream);
        debug!(
            subscribers = subscribers.len(),
            failed = terminal.is_failure(),
            "replay subject completed"
        );
        for entry in subscribers {
            entry.queue.expedite_terminal(terminal.clone());
        }
    }
}

impl<T: Clone + 'static, E: Clone + 'static> Source<T, E> for ReplaySubject<T, E> {
    fn subscribe(&self, sink: SinkHandle<T, E>) {
        if let Some(refusal) = self.refusal_for(&sink) {
            debug!(?refusal, "replay subscription refused");
            sink.receive_subscription(EmptySubscription::handle());
            sink.receive_terminal(Terminal::Finished);
            return;
        }

        let queue = Rc::new(DemandQueue::new(Rc::clone(&sink)));
        let token = {
            let mut state = self.state.borrow_mut();
            queue.preload(state.buffer.iter().cloned());
            let token = state.next_token;
            state.next_token += 1;
            state.subscribers.push(Registered {
                id: SinkId::of(&sink),
                token,
                queue: Rc::clone(&queue),
            });
            token
        };
        debug!(token, replayed = queue.buffered(), "replay subscriber registered");

        let subscription = ReplaySubscription {
            subject: Rc::downgrade(&self.state),
            token,
            queue,
            trampoline: Rc::clone(&self.trampoline),
        };
        sink.receive_subscription(Rc::new(subscription));
    }
}

impl<T: Clone + 'static, E: Clone + 'static> Sink<T, E> for ReplaySubject<T, E> {
    fn receive_subscription(&self, subscription: SubscriptionHandle) {
        let refused = {
            let mut state = self.state.borrow_mut();
            if state.completed || state.upstream.is_some() {
                true
            } else {
                state.upstream = Some(Rc::clone(&subscription));
                false
            }
        };
        if refused {
            debug!("replay subject already has an upstream; cancelling");
            cancel_refused(&self.refusing, &subscription);
            return;
        }
        subscription.request(Demand::UNLIMITED);
    }

    fn receive_value(&self, value: T) -> Demand {
        self.publish(value);
        Demand::NONE
    }

    fn receive_terminal(&self, terminal: Terminal<E>) {
        if self.refusing.get() {
            debug!("terminal from a refused upstream ignored");
            return;
        }
        self.publish_terminal(terminal);
    }
}

/// Handle given to each registered subscriber.
struct ReplaySubscription<T, E> {
    subject: Weak<RefCell<SubjectState<T, E>>>,
    token: u64,
    queue: Rc<DemandQueue<T, E>>,
    trampoline: Rc<TrampolineQueue>,
}

impl<T: 'static, E: 'static> Subscription for ReplaySubscription<T, E> {
    fn request(&self, demand: Demand) {
        let queue = Rc::clone(&self.queue);
        self.trampoline.push(move || {
            let _ = queue.request_demand(demand);
        });
    }

    fn cancel(&self) {
        if let Some(subject) = self.subject.upgrade() {
            let mut state = subject.borrow_mut();
            let before = state.subscribers.len();
            state.subscribers.retain(|entry| entry.token != self.token);
            if state.subscribers.len() != before {
                debug!(token = self.token, "replay subscriber cancelled");
            }
        }
        self.queue.expedite_terminal(Terminal::Finished);
    }
}
