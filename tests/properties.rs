//! Property tests for ordering and backpressure guarantees.

#[macro_use]
mod common;

use common::{init_test_logging, test_proptest_config};
use paceline::stream::{DemandQueue, ReplaySubject, Sink, SinkHandle, Source, SubscriptionHandle};
use paceline::util::{FifoQueue, TrampolineQueue};
use paceline::{Demand, Signal, Terminal, VirtualTime, VirtualTimeScheduler};
use proptest::prelude::*;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

#[derive(Debug, Clone)]
enum QueueOp {
    Push(u16),
    Pop,
}

fn arb_queue_op() -> impl Strategy<Value = QueueOp> {
    prop_oneof![3 => any::<u16>().prop_map(QueueOp::Push), 2 => Just(QueueOp::Pop)]
}

#[derive(Debug, Clone)]
enum EdgeOp {
    Value(u8),
    Request(u8),
    Finish,
}

fn arb_edge_op() -> impl Strategy<Value = EdgeOp> {
    prop_oneof![
        5 => any::<u8>().prop_map(EdgeOp::Value),
        3 => (0u8..4).prop_map(EdgeOp::Request),
        1 => Just(EdgeOp::Finish),
    ]
}

/// Sink that logs deliveries and optionally re-grants one credit per value.
struct LoggingSink {
    log: RefCell<Vec<Signal<u8, ()>>>,
    regrant: bool,
}

impl Sink<u8, ()> for LoggingSink {
    fn receive_subscription(&self, _subscription: SubscriptionHandle) {}

    fn receive_value(&self, value: u8) -> Demand {
        self.log.borrow_mut().push(Signal::Value(value));
        if self.regrant {
            Demand::max(1)
        } else {
            Demand::NONE
        }
    }

    fn receive_terminal(&self, terminal: Terminal<()>) {
        self.log.borrow_mut().push(Signal::Terminal(terminal));
    }
}

/// Sink that requests unlimited demand as soon as it is subscribed.
#[derive(Default)]
struct UnlimitedSink {
    values: RefCell<Vec<u8>>,
}

impl Sink<u8, ()> for UnlimitedSink {
    fn receive_subscription(&self, subscription: SubscriptionHandle) {
        subscription.request(Demand::UNLIMITED);
    }

    fn receive_value(&self, value: u8) -> Demand {
        self.values.borrow_mut().push(value);
        Demand::NONE
    }

    fn receive_terminal(&self, _terminal: Terminal<()>) {}
}

proptest! {
    #![proptest_config(test_proptest_config(256))]

    /// FIFO output order equals input order and the count tracks net pushes.
    #[test]
    fn fifo_matches_model(ops in prop::collection::vec(arb_queue_op(), 0..200)) {
        init_test_logging();
        let mut queue = FifoQueue::new();
        let mut model = VecDeque::new();
        for op in ops {
            match op {
                QueueOp::Push(value) => {
                    queue.enqueue(value);
                    model.push_back(value);
                }
                QueueOp::Pop => prop_assert_eq!(queue.dequeue(), model.pop_front()),
            }
            prop_assert_eq!(queue.len(), model.len());
        }
        prop_assert_eq!(queue.drain().collect::<Vec<_>>(), model.into_iter().collect::<Vec<_>>());
    }

    /// Tasks run sorted by time, and in schedule order at equal times.
    #[test]
    fn equal_time_tasks_keep_schedule_order(times in prop::collection::vec(0i64..6, 1..64)) {
        init_test_logging();
        let scheduler = VirtualTimeScheduler::new();
        let ran = Rc::new(RefCell::new(Vec::new()));
        for (index, time) in times.iter().copied().enumerate() {
            let ran = Rc::clone(&ran);
            scheduler.schedule_at(VirtualTime::new(time), move || ran.borrow_mut().push((time, index)));
        }
        scheduler.resume();

        let mut expected: Vec<(i64, usize)> = times.iter().copied().enumerate().map(|(i, t)| (t, i)).collect();
        expected.sort_by_key(|(time, _)| *time);
        prop_assert_eq!(ran.borrow().clone(), expected);
    }

    /// A demand queue never delivers past its credit, delivers in order,
    /// and ends with at most one terminal.
    #[test]
    fn demand_queue_respects_credit(
        ops in prop::collection::vec(arb_edge_op(), 0..120),
        regrant in any::<bool>(),
    ) {
        init_test_logging();
        let sink = Rc::new(LoggingSink { log: RefCell::new(Vec::new()), regrant });
        let queue = DemandQueue::new(Rc::clone(&sink) as SinkHandle<u8, ()>);
        let mut enqueued = Vec::new();
        let mut credited = 0u64;
        for op in ops {
            match op {
                EdgeOp::Value(value) => {
                    if queue.is_active() {
                        enqueued.push(value);
                    }
                    let _ = queue.enqueue(value);
                }
                EdgeOp::Request(count) => {
                    credited += u64::from(count);
                    let _ = queue.request_demand(Demand::max(u64::from(count)));
                }
                EdgeOp::Finish => {
                    let _ = queue.enqueue_terminal(Terminal::Finished);
                }
            }
        }

        let log = sink.log.borrow().clone();
        let delivered: Vec<u8> = log.iter().filter_map(|signal| signal.value().copied()).collect();
        let regranted = if regrant { delivered.len() as u64 } else { 0 };
        prop_assert!(delivered.len() as u64 <= credited + regranted);
        if regrant && credited > 0 {
            prop_assert_eq!(delivered.len(), enqueued.len());
        }
        prop_assert_eq!(&delivered[..], &enqueued[..delivered.len()]);

        let terminals = log.iter().filter(|signal| signal.is_terminal()).count();
        prop_assert!(terminals <= 1);
        if let Some(position) = log.iter().position(Signal::is_terminal) {
            prop_assert_eq!(position, log.len() - 1);
        }
    }

    /// A subscriber arriving after k published values sees the last
    /// min(k, n) of them, in order, before anything newer.
    #[test]
    fn replay_delivers_last_n(capacity in 0usize..8, published in 0u8..20) {
        init_test_logging();
        let subject = ReplaySubject::<u8, ()>::new(capacity);
        for value in 0..published {
            subject.publish(value);
        }
        let sink = Rc::new(UnlimitedSink::default());
        subject.subscribe(Rc::clone(&sink) as SinkHandle<u8, ()>);
        subject.publish(published);

        let skip = usize::from(published).saturating_sub(capacity);
        let mut expected: Vec<u8> = (0..published).skip(skip).collect();
        expected.push(published);
        prop_assert_eq!(sink.values.borrow().clone(), expected);
    }

    /// Nested trampoline pushes run breadth-first in push order.
    #[test]
    fn trampoline_preserves_push_order(fanout in prop::collection::vec(0usize..4, 1..16)) {
        init_test_logging();
        let trampoline = Rc::new(TrampolineQueue::new());
        let order = Rc::new(RefCell::new(Vec::new()));
        let root_order = Rc::clone(&order);
        let inner = Rc::clone(&trampoline);
        let plan = fanout.clone();
        trampoline.push(move || {
            for (parent, children) in plan.iter().copied().enumerate() {
                root_order.borrow_mut().push((parent, None));
                for child in 0..children {
                    let order = Rc::clone(&root_order);
                    inner.push(move || order.borrow_mut().push((parent, Some(child))));
                }
            }
        });

        let mut expected: Vec<(usize, Option<usize>)> = (0..fanout.len()).map(|parent| (parent, None)).collect();
        for (parent, children) in fanout.iter().copied().enumerate() {
            expected.extend((0..children).map(|child| (parent, Some(child))));
        }
        prop_assert_eq!(order.borrow().clone(), expected);
        prop_assert!(!trampoline.is_active());
    }
}
