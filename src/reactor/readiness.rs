//! Per-descriptor readiness subscription.
//!
//! A [`Readiness`] is the only way the rest of the crate talks to epoll. The
//! interest mask is level-triggered and idempotent: [`Readiness::set_interest`]
//! issues `epoll_ctl` only when the mask actually changes, and an empty mask
//! removes the descriptor from epoll entirely so a disarmed subscription
//! never keeps the event loop alive.

use crate::reactor::core::Reactor;
use crate::reactor::event::Event;
use crate::sys::SysResult;

use std::os::fd::RawFd;
use std::rc::Rc;

/// Which readiness directions a subscription wants to hear about.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Interest {
    pub readable: bool,
    pub writable: bool,
}

impl Interest {
    pub const NONE: Self = Self {
        readable: false,
        writable: false,
    };
    pub const READABLE: Self = Self {
        readable: true,
        writable: false,
    };
    pub const WRITABLE: Self = Self {
        readable: false,
        writable: true,
    };
    pub const BOTH: Self = Self {
        readable: true,
        writable: true,
    };

    pub fn is_none(&self) -> bool {
        !self.readable && !self.writable
    }
}

/// What a readiness callback receives.
///
/// `status` is `0` unless epoll flagged an error condition (`EPOLLERR`), in
/// which case it is a negative error number. Hang-ups report both directions
/// as ready so the owner observes the condition through its next syscall.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReadinessEvent {
    pub readable: bool,
    pub writable: bool,
    pub status: i32,
}

/// A readiness subscription for one descriptor.
///
/// Created by [`Handle::subscribe`](crate::Handle::subscribe). Dropping it
/// closes the subscription.
pub struct Readiness {
    reactor: Rc<Reactor>,
    token: u64,
    fd: RawFd,
    interest: Interest,
    closed: bool,
}

impl Readiness {
    pub(crate) fn new(reactor: Rc<Reactor>, token: u64, fd: RawFd) -> Self {
        Self {
            reactor,
            token,
            fd,
            interest: Interest::NONE,
            closed: false,
        }
    }

    /// The currently armed interest.
    pub fn interest(&self) -> Interest {
        self.interest
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Arms the subscription for `interest`.
    ///
    /// Calling this with the mask already in effect is a no-op. After
    /// [`close`](Self::close) every call is a no-op.
    pub fn set_interest(&mut self, interest: Interest) -> SysResult<()> {
        if self.closed || interest == self.interest {
            return Ok(());
        }

        let epoll = self.reactor.epoll();
        let event = Event::new(self.token, interest.readable, interest.writable);

        match (self.interest.is_none(), interest.is_none()) {
            (true, false) => {
                event.register(epoll, self.fd)?;
                self.reactor.armed_changed(true);
            }
            (false, true) => {
                Event::unregister(epoll, self.fd)?;
                self.reactor.armed_changed(false);
            }
            _ => event.modify(epoll, self.fd)?,
        }

        self.interest = interest;
        Ok(())
    }

    /// Tears the subscription down. Idempotent.
    ///
    /// Must be called before the descriptor itself is closed; a failing
    /// `EPOLL_CTL_DEL` is ignored since the descriptor may already be gone.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if !self.interest.is_none() {
            let _ = Event::unregister(self.reactor.epoll(), self.fd);
            self.reactor.armed_changed(false);
            self.interest = Interest::NONE;
        }

        self.reactor.forget(self.token);
    }
}

impl Drop for Readiness {
    fn drop(&mut self) {
        self.close();
    }
}
