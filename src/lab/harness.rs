//! The created/subscribed/cancelled test lifecycle.

use crate::lab::config::TestConfiguration;
use crate::lab::recording::RecordingSink;
use crate::lab::scheduler::VirtualTimeScheduler;
use crate::stream::Source;
use core::cell::RefCell;
use std::rc::Rc;
use tracing::{debug, warn};

impl VirtualTimeScheduler {
    /// Runs a source through a standard lifecycle and records its output.
    ///
    /// Schedules three tasks: at `config.created` the factory builds the
    /// source, at `config.subscribed` a fresh [`RecordingSink`] subscribes to
    /// it, and at `config.cancelled` the sink cancels and the source is
    /// released. Unless `config.paused_on_start` is set, the scheduler is
    /// then resumed until idle.
    pub fn start<T, E, S, F>(&self, config: TestConfiguration, factory: F) -> Rc<RecordingSink<T, E>>
    where
        T: 'static,
        E: 'static,
        S: Source<T, E> + 'static,
        F: FnOnce(&VirtualTimeScheduler) -> S + 'static,
    {
        let sink = self.create_recording_sink::<T, E>(config.options.clone());
        let source: Rc<RefCell<Option<Rc<S>>>> = Rc::new(RefCell::new(None));

        let slot = Rc::clone(&source);
        let scheduler = self.clone();
        self.schedule_at(config.created, move || {
            debug!(at = %scheduler.now(), "creating source under test");
            *slot.borrow_mut() = Some(Rc::new(factory(&scheduler)));
        });

        let slot = Rc::clone(&source);
        let subscriber = Rc::clone(&sink);
        self.schedule_at(config.subscribed, move || {
            let created = slot.borrow().clone();
            match created {
                Some(source) => source.subscribe(subscriber.handle()),
                None => warn!("subscription time reached before the source was created"),
            }
        });

        let slot = source;
        let canceller = Rc::clone(&sink);
        self.schedule_at(config.cancelled, move || {
            canceller.cancel();
            slot.borrow_mut().take();
        });

        if !config.paused_on_start {
            self.resume();
        }
        sink
    }
}
