//! Single-threaded event loop that drives readiness, deferred tasks and timers.
//!
//! One loop turn runs, in order:
//! 1. the scheduler (with a fresh budget),
//! 2. `epoll_wait`, without blocking when tasks are still queued and otherwise
//!    until the next timer deadline (or indefinitely),
//! 3. the scheduler again, for tasks queued by readiness callbacks,
//! 4. expired timers,
//! 5. the scheduler once more.
//!
//! All three scheduler drains share the turn's budget. [`EventLoop::run`]
//! returns once nothing keeps the loop alive: no queued task, no armed
//! readiness subscription and no referenced timer.

use crate::builder::EventLoopBuilder;
use crate::error::{Error, Result};
use crate::reactor::Readiness;
use crate::reactor::ReadinessEvent;
use crate::reactor::core::Reactor;
use crate::runtime::context::{current_handle, enter_context, try_current_handle};
use crate::runtime::scheduler::{Scheduled, Scheduler};
use crate::timer::{TimerDriver, TimerHandle};

use std::cell::Cell;
use std::os::fd::RawFd;
use std::rc::Rc;
use std::time::Duration;

struct Shared {
    reactor: Rc<Reactor>,
    scheduler: Scheduler,
    timers: Rc<TimerDriver>,
    stopped: Cell<bool>,
}

/// Cheap, clonable reference to an [`EventLoop`].
///
/// Handles are `!Send`: everything they reach lives on the loop's thread.
#[derive(Clone)]
pub struct Handle {
    shared: Rc<Shared>,
}

impl Handle {
    /// Returns the handle of the loop running on this thread.
    ///
    /// # Panics
    /// Panics if called outside of [`EventLoop::run`] or [`EventLoop::enter`].
    pub fn current() -> Self {
        current_handle()
    }

    pub fn try_current() -> Option<Self> {
        try_current_handle()
    }

    /// Queues `task` to run on a later scheduler drain.
    ///
    /// Tasks run in FIFO order. A panic inside a task propagates out of
    /// [`EventLoop::run`].
    ///
    /// # Example
    /// ```ignore
    /// let scheduled = handle.schedule(|| println!("later"));
    /// assert!(scheduled.is_pending());
    /// ```
    pub fn schedule<F>(&self, task: F) -> Scheduled
    where
        F: FnOnce() + 'static,
    {
        self.shared.scheduler.schedule(Box::new(task))
    }

    /// Subscribes to readiness of `fd`. The subscription starts with an empty
    /// interest mask.
    pub fn subscribe<F>(&self, fd: RawFd, callback: F) -> Readiness
    where
        F: Fn(ReadinessEvent) + 'static,
    {
        self.shared.reactor.subscribe(fd, Rc::new(callback))
    }

    /// Runs `callback` once after `delay`.
    pub fn set_timeout<F>(&self, delay: Duration, callback: F) -> TimerHandle
    where
        F: Fn() + 'static,
    {
        let id = self
            .shared
            .timers
            .register(delay, None, Rc::new(callback));

        TimerHandle::new(id, &self.shared.timers)
    }

    /// Runs `callback` every `interval` until cancelled.
    pub fn set_interval<F>(&self, interval: Duration, callback: F) -> TimerHandle
    where
        F: Fn() + 'static,
    {
        let id = self
            .shared
            .timers
            .register(interval, Some(interval), Rc::new(callback));

        TimerHandle::new(id, &self.shared.timers)
    }

    /// Makes [`EventLoop::run`] return at the end of the current turn.
    pub fn stop(&self) {
        self.shared.stopped.set(true);
    }

    fn is_alive(&self) -> bool {
        let shared = &self.shared;

        !shared.stopped.get()
            && (shared.scheduler.has_pending()
                || shared.reactor.armed() > 0
                || shared.timers.has_referenced())
    }
}

/// The event loop.
///
/// # Example
/// ```ignore
/// let event_loop = EventLoop::new()?;
/// event_loop.handle().schedule(|| println!("hello"));
/// event_loop.run()?;
/// ```
pub struct EventLoop {
    handle: Handle,
}

impl EventLoop {
    /// Creates an event loop with default settings.
    pub fn new() -> Result<Self> {
        EventLoopBuilder::new().build()
    }

    pub(crate) fn with_config(max_operations_per_turn: usize, max_events: usize) -> Result<Self> {
        let reactor = Reactor::new(max_events).map_err(|errno| Error::Os {
            operation: "epoll_create1",
            code: errno.0,
        })?;

        Ok(Self {
            handle: Handle {
                shared: Rc::new(Shared {
                    reactor,
                    scheduler: Scheduler::new(max_operations_per_turn),
                    timers: Rc::new(TimerDriver::new()),
                    stopped: Cell::new(false),
                }),
            },
        })
    }

    pub fn handle(&self) -> Handle {
        self.handle.clone()
    }

    /// Runs `function` with this loop installed as the current context,
    /// without driving the loop.
    pub fn enter<F, R>(&self, function: F) -> R
    where
        F: FnOnce() -> R,
    {
        enter_context(self.handle.clone(), function)
    }

    /// Drives the loop until it runs out of work or [`Handle::stop`] is called.
    ///
    /// # Returns
    /// An error only if waiting for readiness itself fails.
    pub fn run(&self) -> Result<()> {
        self.handle.shared.stopped.set(false);

        enter_context(self.handle.clone(), || {
            while self.turn(true)? {}
            Ok(())
        })
    }

    /// Performs a single turn without blocking.
    ///
    /// # Returns
    /// `true` while the loop still has work.
    pub fn run_once(&self) -> Result<bool> {
        enter_context(self.handle.clone(), || self.turn(false))
    }

    fn turn(&self, block: bool) -> Result<bool> {
        let shared = &self.handle.shared;

        shared.scheduler.reset_budget();
        shared.scheduler.drain();

        if !self.handle.is_alive() {
            return Ok(false);
        }

        let timeout = if !block || shared.scheduler.has_pending() {
            Some(Duration::ZERO)
        } else {
            shared.timers.next_remaining()
        };

        shared.reactor.poll(timeout).map_err(|errno| Error::Os {
            operation: "epoll_wait",
            code: errno.0,
        })?;
        shared.scheduler.drain();

        shared.timers.fire_expired();
        shared.scheduler.drain();

        Ok(self.handle.is_alive())
    }
}
