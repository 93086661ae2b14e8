//! Callback timers for the event loop.
//!
//! Timers are stored as plain `(deadline, callback)` entries and fired by the
//! event loop once per turn. A timer can be *unreferenced*: it still fires
//! while the loop is running for other reasons, but it does not keep
//! [`EventLoop::run`](crate::EventLoop::run) from returning on its own.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::{Duration, Instant};

type TimerCallback = Rc<dyn Fn()>;

struct TimerEntry {
    id: u64,
    deadline: Instant,
    interval: Option<Duration>,
    referenced: bool,
    callback: TimerCallback,
}

/// Stores registered timers and fires them when their deadline is reached.
pub(crate) struct TimerDriver {
    timers: RefCell<Vec<TimerEntry>>,
    next_id: Cell<u64>,
}

impl TimerDriver {
    pub(crate) fn new() -> Self {
        Self {
            timers: RefCell::new(Vec::new()),
            next_id: Cell::new(1),
        }
    }

    /// Registers a new timer.
    ///
    /// # Arguments
    /// * `delay` - Time until the first expiry
    /// * `interval` - Re-arm period, or `None` for a one-shot timer
    /// * `callback` - Invoked on every expiry
    pub(crate) fn register(
        &self,
        delay: Duration,
        interval: Option<Duration>,
        callback: TimerCallback,
    ) -> u64 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);

        self.timers.borrow_mut().push(TimerEntry {
            id,
            deadline: Instant::now() + delay,
            interval,
            referenced: true,
            callback,
        });

        id
    }

    pub(crate) fn cancel(&self, id: u64) {
        self.timers.borrow_mut().retain(|entry| entry.id != id);
    }

    pub(crate) fn set_referenced(&self, id: u64, referenced: bool) {
        if let Some(entry) = self.timers.borrow_mut().iter_mut().find(|e| e.id == id) {
            entry.referenced = referenced;
        }
    }

    pub(crate) fn is_active(&self, id: u64) -> bool {
        self.timers.borrow().iter().any(|entry| entry.id == id)
    }

    /// `true` while some timer keeps the loop alive.
    pub(crate) fn has_referenced(&self) -> bool {
        self.timers.borrow().iter().any(|entry| entry.referenced)
    }

    /// Returns the time remaining until the next deadline, if any.
    pub(crate) fn next_remaining(&self) -> Option<Duration> {
        let now = Instant::now();

        self.timers
            .borrow()
            .iter()
            .map(|entry| entry.deadline.saturating_duration_since(now))
            .min()
    }

    /// Fires every timer whose deadline has passed, earliest deadline first.
    ///
    /// One-shot timers are removed before their callback runs; interval timers
    /// are re-armed. A timer cancelled by an earlier callback in the same batch
    /// does not fire.
    ///
    /// # Returns
    /// The number of callbacks invoked.
    pub(crate) fn fire_expired(&self) -> usize {
        let now = Instant::now();
        let mut expired: Vec<(Instant, u64)> = self
            .timers
            .borrow()
            .iter()
            .filter(|entry| entry.deadline <= now)
            .map(|entry| (entry.deadline, entry.id))
            .collect();
        expired.sort_unstable();

        let mut fired = 0;
        for (_, id) in expired {
            let callback = {
                let mut timers = self.timers.borrow_mut();
                let Some(index) = timers.iter().position(|entry| entry.id == id) else {
                    continue;
                };

                match timers[index].interval {
                    Some(interval) => {
                        let entry = &mut timers[index];
                        entry.deadline = now + interval;
                        entry.callback.clone()
                    }
                    None => timers.remove(index).callback,
                }
            };

            callback();
            fired += 1;
        }

        fired
    }
}

/// Handle to a registered timer.
///
/// Dropping the handle does not cancel the timer; call [`cancel`](Self::cancel).
#[derive(Clone)]
pub struct TimerHandle {
    id: u64,
    driver: Weak<TimerDriver>,
}

impl TimerHandle {
    pub(crate) fn new(id: u64, driver: &Rc<TimerDriver>) -> Self {
        Self {
            id,
            driver: Rc::downgrade(driver),
        }
    }

    pub fn cancel(&self) {
        if let Some(driver) = self.driver.upgrade() {
            driver.cancel(self.id);
        }
    }

    /// Lets the event loop exit even though this timer is still armed.
    pub fn unref(&self) {
        if let Some(driver) = self.driver.upgrade() {
            driver.set_referenced(self.id, false);
        }
    }

    /// Makes this timer keep the event loop alive again.
    pub fn reref(&self) {
        if let Some(driver) = self.driver.upgrade() {
            driver.set_referenced(self.id, true);
        }
    }

    /// `false` once a one-shot timer fired or the timer was cancelled.
    pub fn is_active(&self) -> bool {
        self.driver
            .upgrade()
            .is_some_and(|driver| driver.is_active(self.id))
    }
}
