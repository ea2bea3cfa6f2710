//! A demand-limited sink that records everything it sees.
//!
//! [`RecordingSink`] stamps each signal with the virtual time it arrived,
//! grants credit according to its [`RecordingOptions`], and keeps a
//! [`DemandLedger`] of every credit and debit. A value arriving without
//! credit is a protocol violation: it goes to the configured handler, or
//! panics when there is none.
//!
//! Phases: `Unattached -> Attached -> {Terminated, Cancelled}`. The last
//! two are absorbing.

use crate::error::Error;
use crate::lab::config::RecordingOptions;
use crate::lab::ledger::{DemandBalance, DemandLedger, Transaction};
use crate::lab::scheduler::{CancelHandle, VirtualTimeScheduler};
use crate::stream::{cancel_refused, Sink, SinkHandle, SubscriptionHandle};
use crate::types::{Demand, Signal, Terminal, VirtualTime};
use core::cell::{Cell, RefCell};
use core::fmt;
use serde::{Deserialize, Serialize};
use std::rc::{Rc, Weak};
use tracing::{debug, error};

/// Signals in arrival order, each with its arrival time.
pub type TestSequence<T, E> = Vec<(VirtualTime, Signal<T, E>)>;

/// Lifecycle phase of a [`RecordingSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkPhase {
    /// No subscription received yet.
    Unattached,
    /// Subscribed and receiving.
    Attached,
    /// A terminal signal arrived.
    Terminated,
    /// Cancelled by the test.
    Cancelled,
}

struct RecordingState<T, E> {
    phase: SinkPhase,
    subscription: Option<SubscriptionHandle>,
    balance: DemandBalance,
    events: TestSequence<T, E>,
    ledger: DemandLedger,
    replenishment: Option<CancelHandle>,
}

/// Recording, demand-accounting sink driven by a [`VirtualTimeScheduler`].
pub struct RecordingSink<T, E> {
    scheduler: VirtualTimeScheduler,
    options: RecordingOptions,
    this: Weak<Self>,
    /// Raised while a refused subscription is being cancelled.
    refusing: Cell<bool>,
    state: RefCell<RecordingState<T, E>>,
}

impl<T, E> fmt::Debug for RecordingSink<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("RecordingSink")
            .field("phase", &state.phase)
            .field("balance", &state.balance)
            .field("events", &state.events.len())
            .field("options", &self.options)
            .finish()
    }
}

impl VirtualTimeScheduler {
    /// Creates a recording sink whose timestamps come from this scheduler.
    #[must_use]
    pub fn create_recording_sink<T: 'static, E: 'static>(
        &self,
        options: RecordingOptions,
    ) -> Rc<RecordingSink<T, E>> {
        RecordingSink::new(self.clone(), options)
    }
}

impl<T: 'static, E: 'static> RecordingSink<T, E> {
    /// Creates an unattached sink.
    #[must_use]
    pub fn new(scheduler: VirtualTimeScheduler, options: RecordingOptions) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            scheduler,
            options,
            this: this.clone(),
            refusing: Cell::new(false),
            state: RefCell::new(RecordingState {
                phase: SinkPhase::Unattached,
                subscription: None,
                balance: DemandBalance::ZERO,
                events: Vec::new(),
                ledger: DemandLedger::new(),
                replenishment: None,
            }),
        })
    }

    /// Returns this sink as a handle for [`Source::subscribe`](crate::stream::Source::subscribe).
    #[must_use]
    pub fn handle(self: &Rc<Self>) -> SinkHandle<T, E> {
        Rc::clone(self) as SinkHandle<T, E>
    }

    /// Cancels the upstream subscription and any pending replenishment.
    ///
    /// Has no effect once terminated or cancelled.
    pub fn cancel(&self) {
        let (subscription, replenishment) = {
            let mut state = self.state.borrow_mut();
            match state.phase {
                SinkPhase::Unattached | SinkPhase::Attached => state.phase = SinkPhase::Cancelled,
                SinkPhase::Terminated | SinkPhase::Cancelled => return,
            }
            (state.subscription.take(), state.replenishment.take())
        };
        debug!(at = %self.scheduler.now(), "recording sink cancelled");
        if let Some(replenishment) = replenishment {
            replenishment.cancel();
        }
        if let Some(subscription) = subscription {
            subscription.cancel();
        }
    }

    fn credit(&self, amount: Demand) {
        let subscription = {
            let mut state = self.state.borrow_mut();
            if state.phase != SinkPhase::Attached {
                return;
            }
            state.balance = state.balance.credit(amount);
            let balance = state.balance;
            state
                .ledger
                .record(self.scheduler.now(), balance, Transaction::Credit { amount });
            state.subscription.clone()
        };
        if let Some(subscription) = subscription {
            subscription.request(amount);
        }
    }

    fn arm_replenishment(&self) {
        let amount = self.options.subsequent_demand;
        if amount.is_none() {
            return;
        }
        let mut state = self.state.borrow_mut();
        if state.phase != SinkPhase::Attached
            || !state.balance.is_zero()
            || state.replenishment.is_some()
        {
            return;
        }
        let this = self.this.clone();
        let handle = self
            .scheduler
            .schedule_after(self.options.replenishment_delay, move || {
                if let Some(sink) = this.upgrade() {
                    sink.replenish();
                }
            });
        state.replenishment = Some(handle);
    }

    fn replenish(&self) {
        self.state.borrow_mut().replenishment = None;
        self.credit(self.options.subsequent_demand);
        self.arm_replenishment();
    }

    fn report_violation(&self, error: &Error) {
        match &self.options.negative_balance_handler {
            Some(handler) => handler(error),
            None => {
                error!(%error, "sink received more values than it requested");
                panic!("{error}");
            }
        }
    }
}

impl<T, E> RecordingSink<T, E> {
    /// Returns the current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> SinkPhase {
        self.state.borrow().phase
    }

    /// Returns the current demand balance.
    #[must_use]
    pub fn balance(&self) -> DemandBalance {
        self.state.borrow().balance
    }

    /// Returns a copy of the demand ledger.
    #[must_use]
    pub fn ledger(&self) -> DemandLedger {
        self.state.borrow().ledger.clone()
    }

    /// Returns the options this sink was created with.
    #[must_use]
    pub fn options(&self) -> &RecordingOptions {
        &self.options
    }
}

impl<T: Clone, E: Clone> RecordingSink<T, E> {
    /// Returns everything recorded so far.
    #[must_use]
    pub fn recorded_output(&self) -> TestSequence<T, E> {
        self.state.borrow().events.clone()
    }

    /// Returns the recorded values, without timestamps.
    #[must_use]
    pub fn values(&self) -> Vec<T> {
        self.state
            .borrow()
            .events
            .iter()
            .filter_map(|(_, signal)| signal.value().cloned())
            .collect()
    }

    /// Returns the recorded terminal, if any.
    #[must_use]
    pub fn terminal(&self) -> Option<Terminal<E>> {
        self.state
            .borrow()
            .events
            .iter()
            .find_map(|(_, signal)| match signal {
                Signal::Terminal(terminal) => Some(terminal.clone()),
                _ => None,
            })
    }
}

impl<T: Serialize, E: Serialize> RecordingSink<T, E> {
    /// Returns a JSON report of the recording and its ledger.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::json;

        let state = self.state.borrow();
        let events: Vec<_> = state
            .events
            .iter()
            .map(|(time, signal)| json!({ "time": time, "signal": signal }))
            .collect();
        json!({
            "phase": state.phase,
            "balance": state.balance,
            "events": events,
            "ledger": state.ledger.to_json(),
        })
    }
}

impl<T: 'static, E: 'static> Sink<T, E> for RecordingSink<T, E> {
    fn receive_subscription(&self, subscription: SubscriptionHandle) {
        let accepted = {
            let mut state = self.state.borrow_mut();
            if state.phase == SinkPhase::Unattached {
                state.phase = SinkPhase::Attached;
                state.subscription = Some(Rc::clone(&subscription));
                state.balance = DemandBalance::ZERO;
                state.events.push((self.scheduler.now(), Signal::Subscription));
                true
            } else {
                false
            }
        };
        if !accepted {
            debug!(phase = ?self.phase(), "recording sink refused a second subscription");
            cancel_refused(&self.refusing, &subscription);
            return;
        }
        self.credit(self.options.initial_demand);
        self.arm_replenishment();
    }

    fn receive_value(&self, value: T) -> Demand {
        let now = self.scheduler.now();
        let debit = {
            let mut state = self.state.borrow_mut();
            if state.phase == SinkPhase::Attached {
                state.events.push((now, Signal::Value(value)));
                let authorized = state.balance.is_positive();
                state.balance = state.balance.debit();
                let balance = state.balance;
                state
                    .ledger
                    .record(now, balance, Transaction::Debit { authorized });
                Some((authorized, balance))
            } else {
                None
            }
        };
        let Some((authorized, balance)) = debit else {
            debug!(phase = ?self.phase(), "value outside attached phase ignored");
            return Demand::NONE;
        };
        if !authorized {
            self.report_violation(&Error::ProtocolViolation {
                time: now,
                balance: balance.finite().unwrap_or(i64::MAX),
            });
        }
        self.arm_replenishment();
        Demand::NONE
    }

    fn receive_terminal(&self, terminal: Terminal<E>) {
        if self.refusing.get() {
            debug!("terminal from a refused subscription ignored");
            return;
        }
        let (subscription, replenishment) = {
            let mut state = self.state.borrow_mut();
            if state.phase != SinkPhase::Attached {
                return;
            }
            state
                .events
                .push((self.scheduler.now(), Signal::Terminal(terminal)));
            state.phase = SinkPhase::Terminated;
            (state.subscription.take(), state.replenishment.take())
        };
        if let Some(replenishment) = replenishment {
            replenishment.cancel();
        }
        drop(subscription);
    }
}
