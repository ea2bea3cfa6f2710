//! Reentrancy guard that flattens "run now" actions into a FIFO loop.
//!
//! When an action running on the trampoline pushes another action, the new
//! action is queued instead of being run on top of the current stack frame.
//! The outermost [`TrampolineQueue::push`] drains the queue in order until it
//! is empty, so call-stack depth stays constant no matter how deeply actions
//! re-enter, and actions always run in the order they were pushed.
//!
//! Each scheduler owns its own queue; there is no thread-local state.

use super::fifo::FifoQueue;
use core::cell::{Cell, RefCell};
use core::fmt;
use tracing::{debug, trace};

type Action = Box<dyn FnOnce()>;

/// Whether a drain loop is currently running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrampolineState {
    /// No drain loop is running; the next push runs immediately.
    #[default]
    Idle,
    /// A drain loop is running; pushes are queued behind it.
    Active,
}

/// FIFO trampoline for synchronous, self-scheduling actions.
#[derive(Default)]
pub struct TrampolineQueue {
    pending: RefCell<FifoQueue<Action>>,
    state: Cell<TrampolineState>,
}

impl fmt::Debug for TrampolineQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrampolineQueue")
            .field("state", &self.state.get())
            .field("pending", &self.pending_len())
            .finish()
    }
}

/// Returns the trampoline to `Idle` even if an action unwinds.
///
/// On unwind the actions still queued are discarded, so a later unrelated
/// push does not run them outside the drain that queued them.
struct ActiveGuard<'a> {
    queue: &'a TrampolineQueue,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            let discarded = self
                .queue
                .pending
                .try_borrow_mut()
                .map(|mut pending| core::mem::replace(&mut *pending, FifoQueue::new()))
                .ok();
            if let Some(discarded) = discarded {
                debug!(discarded = discarded.len(), "trampoline unwound; pending actions dropped");
            }
        }
        self.queue.state.set(TrampolineState::Idle);
    }
}

impl TrampolineQueue {
    /// Creates an idle trampoline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> TrampolineState {
        self.state.get()
    }

    /// Returns true while a drain loop is running.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state.get() == TrampolineState::Active
    }

    /// Returns the number of actions waiting for the running loop.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.try_borrow().map_or(0, |pending| pending.len())
    }

    /// Queues `action`; if idle, runs it and everything it queues before
    /// returning.
    pub fn push<F>(&self, action: F)
    where
        F: FnOnce() + 'static,
    {
        self.pending.borrow_mut().enqueue(Box::new(action));
        if self.is_active() {
            return;
        }

        self.state.set(TrampolineState::Active);
        let _guard = ActiveGuard { queue: self };
        let mut ran = 0usize;
        loop {
            let next = self.pending.borrow_mut().dequeue();
            let Some(action) = next else { break };
            action();
            ran += 1;
        }
        trace!(actions = ran, "trampoline drained");
    }
}
