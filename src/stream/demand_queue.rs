//! Backpressure-correct buffering for one source/sink edge.
//!
//! A [`DemandQueue`] sits between a producer and exactly one downstream
//! sink. The producer enqueues values and the terminal signal at its own
//! pace; the queue releases them to the sink only as fast as the sink has
//! granted credit.
//!
//! # Accounting
//!
//! - `requested`: cumulative credit granted by the sink
//! - `processed`: cumulative values delivered to the sink
//! - `forwarded`: credit already reported upstream
//!
//! Values are delivered while `processed < requested`. Whatever the sink
//! returns from [`Sink::receive_value`] is added back into `requested`.
//! After each pass the queue reports `requested - forwarded` upstream.
//!
//! # Invariants
//!
//! - delivered values never exceed credit, unless credit is unlimited
//! - at most one terminal reaches the sink
//! - nothing is delivered after the terminal
//!
//! # Reentrancy
//!
//! No `RefCell` borrow is held while the sink runs, so a sink may call back
//! into the queue (request more, cancel) from inside a delivery.

use crate::stream::contract::SinkHandle;
use crate::types::{Demand, Signal, Terminal};
use crate::util::FifoQueue;
use core::cell::RefCell;
use core::fmt;
use tracing::{debug, warn};

struct QueueState<T, E> {
    buffer: FifoQueue<T>,
    requested: Demand,
    processed: Demand,
    forwarded: Demand,
    pending_terminal: Option<Terminal<E>>,
}

/// Demand-gated buffer in front of one sink.
pub struct DemandQueue<T, E> {
    /// `None` once the terminal has been delivered.
    sink: RefCell<Option<SinkHandle<T, E>>>,
    state: RefCell<QueueState<T, E>>,
}

impl<T, E> fmt::Debug for DemandQueue<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("DemandQueue")
            .field("closed", &self.is_closed())
            .field("buffered", &state.buffer.len())
            .field("requested", &state.requested)
            .field("processed", &state.processed)
            .field("forwarded", &state.forwarded)
            .field("terminal_pending", &state.pending_terminal.is_some())
            .finish()
    }
}

impl<T, E> DemandQueue<T, E> {
    /// Creates an open queue in front of `sink` with no credit.
    #[must_use]
    pub fn new(sink: SinkHandle<T, E>) -> Self {
        Self {
            sink: RefCell::new(Some(sink)),
            state: RefCell::new(QueueState {
                buffer: FifoQueue::new(),
                requested: Demand::NONE,
                processed: Demand::NONE,
                forwarded: Demand::NONE,
                pending_terminal: None,
            }),
        }
    }

    /// Returns true once the terminal has been delivered.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sink.borrow().is_none()
    }

    /// Returns true while values are still accepted: open and no terminal
    /// pending.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.is_closed() && self.state.borrow().pending_terminal.is_none()
    }

    /// Returns the number of buffered values awaiting credit.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.state.borrow().buffer.len()
    }

    /// Returns cumulative credit granted by the sink.
    #[must_use]
    pub fn requested(&self) -> Demand {
        self.state.borrow().requested
    }

    /// Returns cumulative values delivered to the sink.
    #[must_use]
    pub fn processed(&self) -> Demand {
        self.state.borrow().processed
    }

    /// Buffers `values` without attempting delivery.
    ///
    /// Used to seed a fresh queue with replayed history before the sink has
    /// seen its subscription.
    pub fn preload<I>(&self, values: I)
    where
        I: IntoIterator<Item = T>,
    {
        if !self.is_active() {
            warn!("preload into an inactive demand queue ignored");
            return;
        }
        self.state.borrow_mut().buffer.extend(values);
    }

    /// Adds sink credit and delivers what it allows.
    ///
    /// Returns the credit to forward upstream.
    pub fn request_demand(&self, demand: Demand) -> Demand {
        if self.is_closed() {
            return Demand::NONE;
        }
        self.state.borrow_mut().requested += demand;
        self.process_demand()
    }

    /// Accepts one value from the producer.
    ///
    /// With unlimited credit and an empty buffer the value goes straight to
    /// the sink; otherwise it is buffered and released as credit allows.
    /// Returns the credit to forward upstream.
    pub fn enqueue(&self, value: T) -> Demand {
        if !self.is_active() {
            warn!("value enqueued into a closed demand queue; dropping it");
            return Demand::NONE;
        }

        let direct = {
            let mut state = self.state.borrow_mut();
            if state.requested.is_unlimited() && state.buffer.is_empty() {
                state.processed += 1;
                Some(value)
            } else {
                state.buffer.enqueue(value);
                None
            }
        };

        if let Some(value) = direct {
            self.deliver(value);
        }
        self.process_demand()
    }

    /// Accepts the producer's terminal signal.
    ///
    /// The terminal waits behind any buffered values and is delivered as
    /// soon as the buffer drains. Returns the credit to forward upstream.
    pub fn enqueue_terminal(&self, terminal: Terminal<E>) -> Demand {
        if !self.is_active() {
            warn!("terminal enqueued into a closed demand queue; dropping it");
            return Demand::NONE;
        }
        self.state.borrow_mut().pending_terminal = Some(terminal);
        self.process_demand()
    }

    /// Routes a scripted signal to [`enqueue`](Self::enqueue) or
    /// [`enqueue_terminal`](Self::enqueue_terminal).
    pub fn enqueue_signal(&self, signal: Signal<T, E>) -> Demand {
        match signal {
            Signal::Value(value) => self.enqueue(value),
            Signal::Terminal(terminal) => self.enqueue_terminal(terminal),
            Signal::Subscription => {
                warn!("subscription signal cannot be enqueued; ignoring it");
                Demand::NONE
            }
        }
    }

    /// Delivers `terminal` immediately, discarding buffered values and
    /// bypassing demand, then closes the queue for good.
    pub fn expedite_terminal(&self, terminal: Terminal<E>) {
        let Some(sink) = self.sink.borrow_mut().take() else {
            return;
        };
        let discarded = {
            let mut state = self.state.borrow_mut();
            let discarded = state.buffer.len();
            state.buffer.clear();
            state.pending_terminal = None;
            discarded
        };
        if discarded > 0 {
            debug!(discarded, "expedited terminal discarded buffered values");
        }
        sink.receive_terminal(terminal);
    }

    /// Delivers buffered values while credit remains, then the pending
    /// terminal once the buffer is empty.
    ///
    /// Returns `requested - forwarded` and marks it as forwarded.
    pub fn process_demand(&self) -> Demand {
        loop {
            let next = {
                let mut state = self.state.borrow_mut();
                if self.sink.borrow().is_none() || state.processed >= state.requested {
                    None
                } else {
                    let value = state.buffer.dequeue();
                    if value.is_some() {
                        state.processed += 1;
                    }
                    value
                }
            };
            let Some(value) = next else { break };
            self.deliver(value);
        }

        if self.is_closed() {
            return Demand::NONE;
        }

        let terminal = {
            let mut state = self.state.borrow_mut();
            if state.buffer.is_empty() {
                state.pending_terminal.take()
            } else {
                None
            }
        };
        if let Some(terminal) = terminal {
            self.expedite_terminal(terminal);
            return Demand::NONE;
        }

        let mut state = self.state.borrow_mut();
        let forwardable = state.requested - state.forwarded;
        state.forwarded += forwardable;
        forwardable
    }

    fn deliver(&self, value: T) {
        let sink = self.sink.borrow().clone();
        if let Some(sink) = sink {
            let extra = sink.receive_value(value);
            self.state.borrow_mut().requested += extra;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::contract::{Sink, SubscriptionHandle};
    use crate::test_utils::init_test_logging;
    use std::rc::Rc;

    fn init_test(name: &str) {
        init_test_logging();
        crate::test_phase!(name);
    }

    /// Records deliveries and optionally grants fixed credit per value.
    struct ProbeSink {
        log: RefCell<Vec<Signal<u32, &'static str>>>,
        grant_per_value: Demand,
    }

    impl ProbeSink {
        fn new(grant_per_value: Demand) -> Rc<Self> {
            Rc::new(Self {
                log: RefCell::new(Vec::new()),
                grant_per_value,
            })
        }

        fn log(&self) -> Vec<Signal<u32, &'static str>> {
            self.log.borrow().clone()
        }
    }

    impl Sink<u32, &'static str> for ProbeSink {
        fn receive_subscription(&self, _subscription: SubscriptionHandle) {
            self.log.borrow_mut().push(Signal::Subscription);
        }

        fn receive_value(&self, value: u32) -> Demand {
            self.log.borrow_mut().push(Signal::Value(value));
            self.grant_per_value
        }

        fn receive_terminal(&self, terminal: Terminal<&'static str>) {
            self.log.borrow_mut().push(Signal::Terminal(terminal));
        }
    }

    fn queue_for(sink: &Rc<ProbeSink>) -> DemandQueue<u32, &'static str> {
        let handle: SinkHandle<u32, &'static str> = Rc::clone(sink) as _;
        DemandQueue::new(handle)
    }

    #[test]
    fn buffers_until_credit_arrives() {
        init_test("buffers_until_credit_arrives");
        let sink = ProbeSink::new(Demand::NONE);
        let queue = queue_for(&sink);
        let _ = queue.enqueue(1);
        let _ = queue.enqueue(2);
        let _ = queue.enqueue(3);
        crate::assert_with_log!(sink.log().is_empty(), "nothing without credit", 0usize, sink.log().len());

        let forwarded = queue.request_demand(Demand::max(2));
        crate::assert_with_log!(
            sink.log() == vec![Signal::Value(1), Signal::Value(2)],
            "two credited values delivered",
            "[1, 2]",
            sink.log()
        );
        crate::assert_with_log!(forwarded == Demand::max(2), "credit forwarded", Demand::max(2), forwarded);
        crate::assert_with_log!(queue.buffered() == 1, "one left", 1usize, queue.buffered());
        crate::test_complete!("buffers_until_credit_arrives");
    }

    #[test]
    fn credit_returned_by_sink_keeps_draining() {
        init_test("credit_returned_by_sink_keeps_draining");
        let sink = ProbeSink::new(Demand::max(1));
        let queue = queue_for(&sink);
        for value in 0..5 {
            let _ = queue.enqueue(value);
        }
        let forwarded = queue.request_demand(Demand::max(1));
        crate::assert_with_log!(sink.log().len() == 5, "each delivery re-grants one", 5usize, sink.log().len());
        crate::assert_with_log!(
            forwarded == Demand::max(6),
            "requested grew to 6",
            Demand::max(6),
            forwarded
        );
        crate::test_complete!("credit_returned_by_sink_keeps_draining");
    }

    #[test]
    fn forwarded_credit_is_reported_once() {
        init_test("forwarded_credit_is_reported_once");
        let sink = ProbeSink::new(Demand::NONE);
        let queue = queue_for(&sink);
        let first = queue.request_demand(Demand::max(3));
        let second = queue.process_demand();
        crate::assert_with_log!(first == Demand::max(3), "first report", Demand::max(3), first);
        crate::assert_with_log!(second.is_none(), "nothing new to forward", Demand::NONE, second);
        crate::test_complete!("forwarded_credit_is_reported_once");
    }

    #[test]
    fn unlimited_credit_takes_fast_path() {
        init_test("unlimited_credit_takes_fast_path");
        let sink = ProbeSink::new(Demand::NONE);
        let queue = queue_for(&sink);
        let _ = queue.request_demand(Demand::UNLIMITED);
        let _ = queue.enqueue(7);
        crate::assert_with_log!(queue.buffered() == 0, "never buffered", 0usize, queue.buffered());
        crate::assert_with_log!(sink.log() == vec![Signal::Value(7)], "delivered directly", "[7]", sink.log());
        let _ = queue.enqueue_terminal(Terminal::Finished);
        crate::assert_with_log!(queue.is_closed(), "closed after terminal", true, queue.is_closed());
        crate::test_complete!("unlimited_credit_takes_fast_path");
    }

    #[test]
    fn terminal_waits_behind_buffered_values() {
        init_test("terminal_waits_behind_buffered_values");
        let sink = ProbeSink::new(Demand::NONE);
        let queue = queue_for(&sink);
        let _ = queue.enqueue(1);
        let _ = queue.enqueue_terminal(Terminal::Failed("late"));
        crate::assert_with_log!(sink.log().is_empty(), "terminal held back", 0usize, sink.log().len());
        crate::assert_with_log!(!queue.is_active(), "no more input accepted", false, queue.is_active());

        let _ = queue.request_demand(Demand::max(1));
        let expected = vec![Signal::Value(1), Signal::Terminal(Terminal::Failed("late"))];
        crate::assert_with_log!(sink.log() == expected, "value then terminal", expected, sink.log());
        crate::assert_with_log!(queue.is_closed(), "closed", true, queue.is_closed());
        crate::test_complete!("terminal_waits_behind_buffered_values");
    }

    #[test]
    fn terminal_on_empty_buffer_needs_no_credit() {
        init_test("terminal_on_empty_buffer_needs_no_credit");
        let sink = ProbeSink::new(Demand::NONE);
        let queue = queue_for(&sink);
        let _ = queue.enqueue_terminal(Terminal::Finished);
        crate::assert_with_log!(
            sink.log() == vec![Signal::Terminal(Terminal::Finished)],
            "delivered at once",
            "[Finished]",
            sink.log()
        );
        crate::test_complete!("terminal_on_empty_buffer_needs_no_credit");
    }

    #[test]
    fn expedite_discards_buffer_and_closes() {
        init_test("expedite_discards_buffer_and_closes");
        let sink = ProbeSink::new(Demand::NONE);
        let queue = queue_for(&sink);
        let _ = queue.enqueue(1);
        let _ = queue.enqueue(2);
        queue.expedite_terminal(Terminal::Finished);
        queue.expedite_terminal(Terminal::Failed("again"));
        let _ = queue.enqueue(3);
        let _ = queue.request_demand(Demand::UNLIMITED);
        crate::assert_with_log!(
            sink.log() == vec![Signal::Terminal(Terminal::Finished)],
            "only the first terminal, no values",
            "[Finished]",
            sink.log()
        );
        crate::test_complete!("expedite_discards_buffer_and_closes");
    }

    #[test]
    fn preload_is_released_by_later_credit() {
        init_test("preload_is_released_by_later_credit");
        let sink = ProbeSink::new(Demand::NONE);
        let queue = queue_for(&sink);
        queue.preload([10, 11]);
        crate::assert_with_log!(queue.buffered() == 2, "preloaded", 2usize, queue.buffered());
        let _ = queue.request_demand(Demand::UNLIMITED);
        crate::assert_with_log!(
            sink.log() == vec![Signal::Value(10), Signal::Value(11)],
            "replayed in order",
            "[10, 11]",
            sink.log()
        );
        crate::test_complete!("preload_is_released_by_later_credit");
    }

    #[test]
    fn subscription_signal_is_rejected() {
        init_test("subscription_signal_is_rejected");
        let sink = ProbeSink::new(Demand::NONE);
        let queue = queue_for(&sink);
        let forwarded = queue.enqueue_signal(Signal::Subscription);
        crate::assert_with_log!(forwarded.is_none(), "no credit", Demand::NONE, forwarded);
        crate::assert_with_log!(queue.is_active(), "still open", true, queue.is_active());
        crate::test_complete!("subscription_signal_is_rejected");
    }

    /// A sink that requests more credit from inside each delivery.
    struct ReentrantSink {
        queue: RefCell<Option<Rc<DemandQueue<u32, ()>>>>,
        seen: RefCell<Vec<u32>>,
    }

    impl Sink<u32, ()> for ReentrantSink {
        fn receive_subscription(&self, _subscription: SubscriptionHandle) {}

        fn receive_value(&self, value: u32) -> Demand {
            self.seen.borrow_mut().push(value);
            let queue = self.queue.borrow().clone();
            if let Some(queue) = queue {
                let _ = queue.request_demand(Demand::max(1));
            }
            Demand::NONE
        }

        fn receive_terminal(&self, _terminal: Terminal<()>) {}
    }

    #[test]
    fn reentrant_request_preserves_order() {
        init_test("reentrant_request_preserves_order");
        let sink = Rc::new(ReentrantSink {
            queue: RefCell::new(None),
            seen: RefCell::new(Vec::new()),
        });
        let handle: SinkHandle<u32, ()> = Rc::clone(&sink) as _;
        let queue = Rc::new(DemandQueue::new(handle));
        *sink.queue.borrow_mut() = Some(Rc::clone(&queue));

        for value in 0..4 {
            let _ = queue.enqueue(value);
        }
        let _ = queue.request_demand(Demand::max(1));
        let seen = sink.seen.borrow().clone();
        crate::assert_with_log!(seen == vec![0, 1, 2, 3], "order kept", vec![0, 1, 2, 3], seen);
        crate::assert_with_log!(
            queue.processed() == Demand::max(4),
            "processed matches deliveries",
            Demand::max(4),
            queue.processed()
        );
        *sink.queue.borrow_mut() = None;
        crate::test_complete!("reentrant_request_preserves_order");
    }
}
