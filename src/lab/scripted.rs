//! Sources that replay a fixed script against the virtual clock.
//!
//! A [`ScriptedSource`] holds a list of `(time, signal)` events. Each
//! subscriber gets its own [`DemandQueue`] and one scheduled task per event;
//! the task enqueues the signal when the clock reaches it.
//!
//! - **Hot** sources use absolute times shared by every subscriber. Events
//!   before the subscription time are skipped.
//! - **Cold** sources use times relative to each subscription.

use crate::error::{Error, Result};
use crate::lab::scheduler::{CancelHandle, VirtualTimeScheduler};
use crate::stream::{DemandQueue, SinkHandle, Source, Subscription};
use crate::types::{Demand, Signal, Terminal, VirtualTime};
use crate::util::TrampolineQueue;
use core::cell::RefCell;
use core::fmt;
use std::rc::Rc;
use tracing::debug;

/// Timing model of a scripted source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceBehavior {
    /// Absolute times, shared by all subscribers.
    Hot,
    /// Times relative to each subscription.
    Cold,
}

/// One scripted signal. Never a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedEvent<T, E> {
    time: VirtualTime,
    signal: Signal<T, E>,
}

impl<T, E> ScriptedEvent<T, E> {
    /// Creates an event, rejecting `Signal::Subscription`.
    pub fn try_new(time: impl Into<VirtualTime>, signal: Signal<T, E>) -> Result<Self> {
        Self::at_index(0, time.into(), signal)
    }

    fn at_index(index: usize, time: VirtualTime, signal: Signal<T, E>) -> Result<Self> {
        if signal.is_subscription() {
            return Err(Error::IllegalScriptedEvent { index, time });
        }
        Ok(Self { time, signal })
    }

    /// Returns the scripted time.
    #[must_use]
    pub const fn time(&self) -> VirtualTime {
        self.time
    }

    /// Returns the scripted signal.
    #[must_use]
    pub const fn signal(&self) -> &Signal<T, E> {
        &self.signal
    }
}

/// A source driven by a fixed event script.
pub struct ScriptedSource<T, E> {
    scheduler: VirtualTimeScheduler,
    behavior: SourceBehavior,
    events: Rc<[ScriptedEvent<T, E>]>,
}

impl<T, E> Clone for ScriptedSource<T, E> {
    fn clone(&self) -> Self {
        Self {
            scheduler: self.scheduler.clone(),
            behavior: self.behavior,
            events: Rc::clone(&self.events),
        }
    }
}

impl<T: fmt::Debug, E: fmt::Debug> fmt::Debug for ScriptedSource<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedSource")
            .field("behavior", &self.behavior)
            .field("events", &self.events)
            .finish()
    }
}

impl<T, E> ScriptedSource<T, E> {
    /// Returns whether this source is hot or cold.
    #[must_use]
    pub const fn behavior(&self) -> SourceBehavior {
        self.behavior
    }

    /// Returns the script.
    #[must_use]
    pub fn events(&self) -> &[ScriptedEvent<T, E>] {
        &self.events
    }
}

impl VirtualTimeScheduler {
    /// Creates a hot source from absolute `(time, signal)` pairs.
    pub fn create_hot_source<T, E, I, V>(&self, events: I) -> Result<ScriptedSource<T, E>>
    where
        I: IntoIterator<Item = (V, Signal<T, E>)>,
        V: Into<VirtualTime>,
    {
        self.create_scripted_source(SourceBehavior::Hot, events)
    }

    /// Creates a cold source from `(offset, signal)` pairs, offsets counted
    /// from each subscription.
    pub fn create_cold_source<T, E, I, V>(&self, events: I) -> Result<ScriptedSource<T, E>>
    where
        I: IntoIterator<Item = (V, Signal<T, E>)>,
        V: Into<VirtualTime>,
    {
        self.create_scripted_source(SourceBehavior::Cold, events)
    }

    fn create_scripted_source<T, E, I, V>(
        &self,
        behavior: SourceBehavior,
        events: I,
    ) -> Result<ScriptedSource<T, E>>
    where
        I: IntoIterator<Item = (V, Signal<T, E>)>,
        V: Into<VirtualTime>,
    {
        let events = events
            .into_iter()
            .enumerate()
            .map(|(index, (time, signal))| ScriptedEvent::at_index(index, time.into(), signal))
            .collect::<Result<Vec<_>>>()?;
        Ok(ScriptedSource {
            scheduler: self.clone(),
            behavior,
            events: events.into(),
        })
    }
}

impl<T: Clone + 'static, E: Clone + 'static> Source<T, E> for ScriptedSource<T, E> {
    fn subscribe(&self, sink: SinkHandle<T, E>) {
        let queue = Rc::new(DemandQueue::new(Rc::clone(&sink)));
        let trampoline = self.scheduler.trampoline();
        let now = self.scheduler.now();

        let mut handles = Vec::with_capacity(self.events.len());
        let mut skipped = 0usize;
        for event in self.events.iter() {
            let at = match self.behavior {
                SourceBehavior::Hot if event.time < now => {
                    skipped += 1;
                    continue;
                }
                SourceBehavior::Hot => event.time,
                SourceBehavior::Cold => now + event.time.since_origin(),
            };
            let queue = Rc::clone(&queue);
            let trampoline = Rc::clone(&trampoline);
            let signal = event.signal.clone();
            handles.push(self.scheduler.schedule_at(at, move || {
                trampoline.push(move || {
                    let _ = queue.enqueue_signal(signal);
                });
            }));
        }
        if skipped > 0 {
            debug!(skipped, at = %now, "hot source skipped events before subscription");
        }

        let subscription = ScriptedSubscription {
            queue,
            deliveries: RefCell::new(handles),
            trampoline,
        };
        sink.receive_subscription(Rc::new(subscription));
    }
}

struct ScriptedSubscription<T, E> {
    queue: Rc<DemandQueue<T, E>>,
    deliveries: RefCell<Vec<CancelHandle>>,
    trampoline: Rc<TrampolineQueue>,
}

impl<T: 'static, E: 'static> Subscription for ScriptedSubscription<T, E> {
    fn request(&self, demand: Demand) {
        let queue = Rc::clone(&self.queue);
        self.trampoline.push(move || {
            let _ = queue.request_demand(demand);
        });
    }

    fn cancel(&self) {
        let deliveries = core::mem::take(&mut *self.deliveries.borrow_mut());
        let cancelled = deliveries.iter().filter(|handle| handle.cancel()).count();
        if cancelled > 0 {
            debug!(cancelled, "scripted deliveries cancelled");
        }
        self.queue.expedite_terminal(Terminal::Finished);
    }
}
