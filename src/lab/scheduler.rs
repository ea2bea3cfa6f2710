//! Virtual-time task scheduler.
//!
//! [`VirtualTimeScheduler`] keeps a virtual clock and a min-heap of pending
//! tasks ordered by `(time, id)`. Ids increase monotonically, so tasks
//! scheduled for the same instant run in the order they were scheduled.
//! That ordering is what makes every harness run reproducible.
//!
//! The clock only moves when [`resume`](VirtualTimeScheduler::resume) or
//! [`advance_to`](VirtualTimeScheduler::advance_to) pops a task. A task
//! scheduled in the past runs next without moving the clock backwards.
//!
//! Actions may schedule further tasks, including for the current instant;
//! they join the same heap and run before `resume` returns. A chain of
//! tasks that keeps rescheduling itself keeps `resume` running forever.

use crate::lab::config::SchedulerConfig;
use crate::stream::ReplaySubject;
use crate::types::{VirtualTime, VirtualTimeInterval};
use crate::util::{Slab, SlabKey, TrampolineQueue};
use core::cell::RefCell;
use core::cmp::Ordering;
use core::fmt;
use std::collections::BinaryHeap;
use std::rc::{Rc, Weak};
use tracing::{debug, trace};

type Action = Box<dyn FnOnce()>;

/// Identifier of a scheduled task, unique per scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u64);

impl TaskId {
    /// Returns the raw sequence number.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TaskEntry {
    time: VirtualTime,
    id: TaskId,
    key: SlabKey,
}

impl Ord for TaskEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap (earliest time, then lowest id).
        other
            .time
            .cmp(&self.time)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for TaskEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct SchedulerState {
    now: VirtualTime,
    queue: BinaryHeap<TaskEntry>,
    /// Pending actions. Cancelled entries stay in `queue` until popped or
    /// compacted away, and are skipped because their slot is gone.
    actions: Slab<Action>,
    next_id: u64,
    running: bool,
    executed: u64,
}

/// Heap size below which cancelled entries are never compacted.
const COMPACT_MIN_ENTRIES: usize = 64;

impl SchedulerState {
    /// Drops heap entries of cancelled tasks once they outnumber live ones.
    fn compact_if_sparse(&mut self) {
        let live = self.actions.len();
        if self.queue.len() < COMPACT_MIN_ENTRIES || self.queue.len() <= live * 2 {
            return;
        }
        let before = self.queue.len();
        let Self { queue, actions, .. } = self;
        queue.retain(|entry| actions.contains(entry.key));
        trace!(before, after = self.queue.len(), "compacted cancelled tasks");
    }
}

/// Resets the `running` flag even if an action panics.
struct RunningGuard<'a> {
    state: &'a RefCell<SchedulerState>,
}

impl<'a> RunningGuard<'a> {
    fn enter(state: &'a RefCell<SchedulerState>) -> Option<Self> {
        let mut inner = state.borrow_mut();
        if inner.running {
            return None;
        }
        inner.running = true;
        Some(Self { state })
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.state.borrow_mut().running = false;
    }
}

/// Deterministic single-threaded scheduler driven by a virtual clock.
///
/// Cloning yields another handle to the same clock and queue.
#[derive(Clone)]
pub struct VirtualTimeScheduler {
    state: Rc<RefCell<SchedulerState>>,
    trampoline: Rc<TrampolineQueue>,
}

impl fmt::Debug for VirtualTimeScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("VirtualTimeScheduler")
            .field("now", &state.now)
            .field("pending", &state.actions.len())
            .field("executed", &state.executed)
            .field("running", &state.running)
            .finish()
    }
}

impl Default for VirtualTimeScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualTimeScheduler {
    /// Creates a scheduler with the clock at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    /// Creates a scheduler from `config`.
    #[must_use]
    pub fn with_config(config: SchedulerConfig) -> Self {
        Self {
            state: Rc::new(RefCell::new(SchedulerState {
                now: config.initial_clock,
                queue: BinaryHeap::new(),
                actions: Slab::new(),
                next_id: 0,
                running: false,
                executed: 0,
            })),
            trampoline: Rc::new(TrampolineQueue::new()),
        }
    }

    /// Returns the current virtual time.
    #[must_use]
    pub fn now(&self) -> VirtualTime {
        self.state.borrow().now
    }

    /// Returns the trampoline shared by everything this scheduler drives.
    #[must_use]
    pub fn trampoline(&self) -> Rc<TrampolineQueue> {
        Rc::clone(&self.trampoline)
    }

    /// Returns the number of tasks still waiting to run.
    #[must_use]
    pub fn pending_tasks(&self) -> usize {
        self.state.borrow().actions.len()
    }

    /// Returns true if no task is waiting to run.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.pending_tasks() == 0
    }

    /// Returns the number of tasks executed so far.
    #[must_use]
    pub fn executed_tasks(&self) -> u64 {
        self.state.borrow().executed
    }

    /// Schedules `action` at the current time.
    pub fn schedule_now<F>(&self, action: F) -> CancelHandle
    where
        F: FnOnce() + 'static,
    {
        let now = self.now();
        self.schedule_at(now, action)
    }

    /// Schedules `action` at the absolute time `time`.
    pub fn schedule_at<F>(&self, time: impl Into<VirtualTime>, action: F) -> CancelHandle
    where
        F: FnOnce() + 'static,
    {
        let time = time.into();
        let mut state = self.state.borrow_mut();
        let id = TaskId(state.next_id);
        state.next_id += 1;
        let key = state.actions.insert(Box::new(action));
        state.queue.push(TaskEntry { time, id, key });
        trace!(task = %id, at = %time, "task scheduled");
        CancelHandle {
            task: id,
            key,
            scheduler: Rc::downgrade(&self.state),
        }
    }

    /// Schedules `action` `delay` ticks after the current time.
    pub fn schedule_after<F>(&self, delay: impl Into<VirtualTimeInterval>, action: F) -> CancelHandle
    where
        F: FnOnce() + 'static,
    {
        let time = self.now() + delay.into();
        self.schedule_at(time, action)
    }

    /// Schedules `action` once at `time`.
    ///
    /// `interval` is accepted for callers that expect a periodic timer, but
    /// the task does not re-arm itself.
    pub fn schedule_repeating<F>(
        &self,
        time: impl Into<VirtualTime>,
        interval: impl Into<VirtualTimeInterval>,
        action: F,
    ) -> CancelHandle
    where
        F: FnOnce() + 'static,
    {
        let interval = interval.into();
        debug!(%interval, "repeating schedule fires once; interval ignored");
        self.schedule_at(time, action)
    }

    /// Removes the task behind `handle` if it has not run yet.
    ///
    /// Returns true if a pending task was removed.
    pub fn cancel(&self, handle: &CancelHandle) -> bool {
        handle.cancel()
    }

    /// Runs tasks until the queue is empty.
    ///
    /// Returns the number of tasks executed. Called from inside a running
    /// task, this returns 0 immediately: the outer loop will pick up
    /// whatever the task scheduled.
    pub fn resume(&self) -> u64 {
        self.run_until(None)
    }

    /// Runs every task due at or before `target`, then moves the clock to
    /// `target` if it is still behind.
    pub fn advance_to(&self, target: impl Into<VirtualTime>) -> u64 {
        let target = target.into();
        let ran = self.run_until(Some(target));
        let mut state = self.state.borrow_mut();
        if !state.running && state.now < target {
            state.now = target;
        }
        ran
    }

    /// Same as [`advance_to`](Self::advance_to) with `now + delta`.
    pub fn advance_by(&self, delta: impl Into<VirtualTimeInterval>) -> u64 {
        let target = self.now() + delta.into();
        self.advance_to(target)
    }

    /// Creates a replay subject whose demand flows through this scheduler's
    /// trampoline.
    #[must_use]
    pub fn create_replay_subject<T, E>(&self, capacity: usize) -> ReplaySubject<T, E> {
        ReplaySubject::new(capacity).with_trampoline(self.trampoline())
    }

    fn run_until(&self, limit: Option<VirtualTime>) -> u64 {
        let Some(_guard) = RunningGuard::enter(&self.state) else {
            debug!("resume called from inside a running task; ignoring");
            return 0;
        };

        let mut ran = 0;
        loop {
            let next = {
                let mut state = self.state.borrow_mut();
                let due = match state.queue.peek() {
                    Some(entry) => limit.map_or(true, |limit| entry.time <= limit),
                    None => false,
                };
                if !due {
                    break;
                }
                let Some(entry) = state.queue.pop() else { break };
                let action = state.actions.remove(entry.key);
                if action.is_some() && entry.time > state.now {
                    state.now = entry.time;
                }
                action.map(|action| (entry.id, state.now, action))
            };

            if let Some((id, now, action)) = next {
                trace!(task = %id, at = %now, "executing scheduled task");
                action();
                self.state.borrow_mut().executed += 1;
                ran += 1;
            }
        }
        ran
    }
}

/// Handle that removes a scheduled task if it has not run yet.
#[derive(Clone)]
pub struct CancelHandle {
    task: TaskId,
    key: SlabKey,
    scheduler: Weak<RefCell<SchedulerState>>,
}

impl fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelHandle")
            .field("task", &self.task)
            .field("pending", &self.is_pending())
            .finish()
    }
}

impl CancelHandle {
    /// Returns the id of the task this handle controls.
    #[must_use]
    pub const fn task_id(&self) -> TaskId {
        self.task
    }

    /// Returns true while the task is still waiting to run.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.scheduler
            .upgrade()
            .is_some_and(|state| state.borrow().actions.contains(self.key))
    }

    /// Removes the task if still pending. Returns true if it was.
    ///
    /// Cancelling a task that already ran, or was already cancelled, does
    /// nothing.
    pub fn cancel(&self) -> bool {
        let Some(state) = self.scheduler.upgrade() else {
            return false;
        };
        // Dropped outside the borrow: the action may own arbitrary state.
        let removed = {
            let mut state = state.borrow_mut();
            let removed = state.actions.remove(self.key);
            if removed.is_some() {
                state.compact_if_sparse();
            }
            removed
        };
        let cancelled = removed.is_some();
        drop(removed);
        if cancelled {
            trace!(task = %self.task, "scheduled task cancelled");
        }
        cancelled
    }
}
