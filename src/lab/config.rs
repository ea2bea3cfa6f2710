//! Configuration for the virtual-time harness.
//!
//! All configuration types use a move-based builder style: each method
//! consumes `self` and returns the updated value, so options chain.
//!
//! ```ignore
//! use paceline::lab::{RecordingOptions, TestConfiguration};
//! use paceline::Demand;
//!
//! let config = TestConfiguration::default()
//!     .subscribed(250_i64)
//!     .options(RecordingOptions::default().initial_demand(Demand::max(2)));
//! ```

use crate::error::Error;
use crate::types::{Demand, VirtualTime, VirtualTimeInterval};
use core::fmt;
use std::rc::Rc;

/// Callback invoked when a recording sink is delivered a value it did not
/// credit. Without one, the violation is fatal.
pub type NegativeBalanceHandler = Rc<dyn Fn(&Error)>;

/// Scheduler construction options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Clock reading before any task runs.
    pub initial_clock: VirtualTime,
}

impl SchedulerConfig {
    /// Creates the default configuration (clock at zero).
    #[must_use]
    pub const fn new() -> Self {
        Self {
            initial_clock: VirtualTime::ZERO,
        }
    }

    /// Sets the initial clock reading.
    #[must_use]
    pub fn initial_clock(mut self, time: impl Into<VirtualTime>) -> Self {
        self.initial_clock = time.into();
        self
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Demand behavior of a [`RecordingSink`](crate::lab::RecordingSink).
#[derive(Clone)]
pub struct RecordingOptions {
    /// Credit granted as soon as the subscription arrives.
    pub initial_demand: Demand,
    /// Credit granted each time the balance reaches zero.
    pub subsequent_demand: Demand,
    /// Delay between the balance reaching zero and replenishment.
    pub replenishment_delay: VirtualTimeInterval,
    /// Called on an unauthorized delivery instead of panicking.
    pub negative_balance_handler: Option<NegativeBalanceHandler>,
}

impl RecordingOptions {
    /// Unlimited initial demand, no replenishment, delay of 100.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            initial_demand: Demand::UNLIMITED,
            subsequent_demand: Demand::NONE,
            replenishment_delay: VirtualTimeInterval::new(100),
            negative_balance_handler: None,
        }
    }

    /// Sets the initial demand.
    #[must_use]
    pub const fn initial_demand(mut self, demand: Demand) -> Self {
        self.initial_demand = demand;
        self
    }

    /// Sets the replenishment demand.
    #[must_use]
    pub const fn subsequent_demand(mut self, demand: Demand) -> Self {
        self.subsequent_demand = demand;
        self
    }

    /// Sets the replenishment delay.
    #[must_use]
    pub fn replenishment_delay(mut self, delay: impl Into<VirtualTimeInterval>) -> Self {
        self.replenishment_delay = delay.into();
        self
    }

    /// Installs a handler for unauthorized deliveries.
    #[must_use]
    pub fn negative_balance_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Error) + 'static,
    {
        self.negative_balance_handler = Some(Rc::new(handler));
        self
    }
}

impl Default for RecordingOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RecordingOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordingOptions")
            .field("initial_demand", &self.initial_demand)
            .field("subsequent_demand", &self.subsequent_demand)
            .field("replenishment_delay", &self.replenishment_delay)
            .field(
                "negative_balance_handler",
                &self.negative_balance_handler.is_some(),
            )
            .finish()
    }
}

/// Lifecycle timing for [`VirtualTimeScheduler::start`](crate::lab::VirtualTimeScheduler::start).
#[derive(Debug, Clone)]
pub struct TestConfiguration {
    /// When true, `start` schedules the lifecycle but does not resume.
    pub paused_on_start: bool,
    /// Time at which the source factory runs.
    pub created: VirtualTime,
    /// Time at which the recording sink subscribes.
    pub subscribed: VirtualTime,
    /// Time at which the recording sink cancels.
    pub cancelled: VirtualTime,
    /// Demand behavior of the recording sink.
    pub options: RecordingOptions,
}

impl TestConfiguration {
    /// Creates the default lifecycle: created 100, subscribed 200,
    /// cancelled 900, not paused.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            paused_on_start: false,
            created: VirtualTime::new(100),
            subscribed: VirtualTime::new(200),
            cancelled: VirtualTime::new(900),
            options: RecordingOptions::new(),
        }
    }

    /// Sets whether `start` leaves the scheduler paused.
    #[must_use]
    pub const fn paused_on_start(mut self, value: bool) -> Self {
        self.paused_on_start = value;
        self
    }

    /// Sets the creation time.
    #[must_use]
    pub fn created(mut self, time: impl Into<VirtualTime>) -> Self {
        self.created = time.into();
        self
    }

    /// Sets the subscription time.
    #[must_use]
    pub fn subscribed(mut self, time: impl Into<VirtualTime>) -> Self {
        self.subscribed = time.into();
        self
    }

    /// Sets the cancellation time.
    #[must_use]
    pub fn cancelled(mut self, time: impl Into<VirtualTime>) -> Self {
        self.cancelled = time.into();
        self
    }

    /// Sets the recording sink options.
    #[must_use]
    pub fn options(mut self, options: RecordingOptions) -> Self {
        self.options = options;
        self
    }
}

impl Default for TestConfiguration {
    fn default() -> Self {
        Self::new()
    }
}
