use crate::reactor::event::Event;
use crate::reactor::readiness::{Readiness, ReadinessEvent};
use crate::sys::SysResult;

use libc::{EINTR, EIO, close};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::os::fd::RawFd;
use std::rc::Rc;
use std::time::Duration;

pub(crate) type ReadinessCallback = Rc<dyn Fn(ReadinessEvent)>;

struct Entry {
    callback: ReadinessCallback,
}

/// Owns the epoll instance and the table of readiness subscriptions.
///
/// Subscriptions are keyed by a monotonically increasing token rather than by
/// descriptor, so an event that arrives for a subscription closed earlier in
/// the same batch is recognised as stale and dropped.
pub(crate) struct Reactor {
    epoll: RawFd,
    events: RefCell<Vec<Event>>,
    registry: RefCell<HashMap<u64, Entry>>,
    next_token: Cell<u64>,
    armed: Cell<usize>,
}

impl Reactor {
    pub(crate) fn new(max_events: usize) -> SysResult<Rc<Self>> {
        let epoll = Event::create()?;

        Ok(Rc::new(Self {
            epoll,
            events: RefCell::new(vec![Event::EMPTY; max_events.max(1)]),
            registry: RefCell::new(HashMap::new()),
            next_token: Cell::new(1),
            armed: Cell::new(0),
        }))
    }

    pub(crate) fn epoll(&self) -> RawFd {
        self.epoll
    }

    /// Registers `callback` for readiness of `fd`. The subscription starts
    /// disarmed; see [`Readiness::set_interest`].
    pub(crate) fn subscribe(self: &Rc<Self>, fd: RawFd, callback: ReadinessCallback) -> Readiness {
        let token = self.next_token.get();
        self.next_token.set(token + 1);

        self.registry.borrow_mut().insert(token, Entry { callback });

        Readiness::new(self.clone(), token, fd)
    }

    pub(crate) fn forget(&self, token: u64) {
        self.registry.borrow_mut().remove(&token);
    }

    pub(crate) fn armed_changed(&self, armed: bool) {
        let count = self.armed.get();
        self.armed.set(if armed {
            count + 1
        } else {
            count.saturating_sub(1)
        });
    }

    /// Number of subscriptions currently registered with epoll.
    pub(crate) fn armed(&self) -> usize {
        self.armed.get()
    }

    /// Waits for readiness and dispatches callbacks.
    ///
    /// Events are copied out before any callback runs, so callbacks may freely
    /// subscribe, re-arm or close subscriptions.
    ///
    /// # Returns
    /// The number of callbacks invoked.
    pub(crate) fn poll(&self, timeout: Option<Duration>) -> SysResult<usize> {
        let ready: Vec<(u64, ReadinessEvent)> = {
            let mut events = self.events.borrow_mut();

            let count = match Event::wait(self.epoll, &mut events, timeout) {
                Ok(count) => count,
                Err(errno) if errno.0 == EINTR => 0,
                Err(errno) => return Err(errno),
            };

            events
                .iter()
                .take(count)
                .map(|event| {
                    let readiness = ReadinessEvent {
                        readable: event.is_readable(),
                        writable: event.is_writable(),
                        status: if event.is_error() { -EIO } else { 0 },
                    };

                    (event.token(), readiness)
                })
                .collect()
        };

        let mut dispatched = 0;
        for (token, readiness) in ready {
            let callback = match self.registry.borrow().get(&token) {
                Some(entry) => entry.callback.clone(),
                None => continue,
            };

            callback(readiness);
            dispatched += 1;
        }

        Ok(dispatched)
    }
}

impl Drop for Reactor {
    fn drop(&mut self) {
        unsafe { close(self.epoll) };
    }
}
