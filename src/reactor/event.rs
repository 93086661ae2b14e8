use crate::sys::{Errno, SysResult};

use libc::{
    EPOLL_CLOEXEC, EPOLL_CTL_ADD, EPOLL_CTL_DEL, EPOLL_CTL_MOD, EPOLLERR, EPOLLHUP, EPOLLIN,
    EPOLLOUT, EPOLLRDHUP, epoll_create1, epoll_ctl, epoll_event, epoll_wait,
};
use std::os::fd::RawFd;
use std::ptr;
use std::time::Duration;

/// Thin wrapper over `epoll_event`.
///
/// `epoll_event` is packed on x86_64, so fields are always copied out by value.
#[derive(Clone, Copy)]
#[repr(transparent)]
pub(crate) struct Event(epoll_event);

impl Event {
    pub(crate) const EMPTY: Self = Self(epoll_event { events: 0, u64: 0 });

    pub(crate) fn new(token: u64, readable: bool, writable: bool) -> Self {
        let mut events = 0;
        if readable {
            events |= EPOLLIN as u32;
        }
        if writable {
            events |= EPOLLOUT as u32;
        }

        Self(epoll_event { events, u64: token })
    }

    pub(crate) fn token(&self) -> u64 {
        self.0.u64
    }

    fn flags(&self) -> u32 {
        self.0.events
    }

    pub(crate) fn is_readable(&self) -> bool {
        self.flags() & (EPOLLIN | EPOLLRDHUP | EPOLLHUP) as u32 != 0
    }

    pub(crate) fn is_writable(&self) -> bool {
        self.flags() & (EPOLLOUT | EPOLLHUP) as u32 != 0
    }

    pub(crate) fn is_error(&self) -> bool {
        self.flags() & EPOLLERR as u32 != 0
    }

    pub(crate) fn create() -> SysResult<RawFd> {
        let fd = unsafe { epoll_create1(EPOLL_CLOEXEC) };
        if fd < 0 {
            return Err(Errno::last());
        }

        Ok(fd)
    }

    pub(crate) fn register(&self, epoll: RawFd, fd: RawFd) -> SysResult<()> {
        self.control(epoll, EPOLL_CTL_ADD, fd)
    }

    pub(crate) fn modify(&self, epoll: RawFd, fd: RawFd) -> SysResult<()> {
        self.control(epoll, EPOLL_CTL_MOD, fd)
    }

    pub(crate) fn unregister(epoll: RawFd, fd: RawFd) -> SysResult<()> {
        let ret = unsafe { epoll_ctl(epoll, EPOLL_CTL_DEL, fd, ptr::null_mut()) };
        if ret < 0 {
            return Err(Errno::last());
        }

        Ok(())
    }

    fn control(&self, epoll: RawFd, op: i32, fd: RawFd) -> SysResult<()> {
        let mut raw = self.0;
        let ret = unsafe { epoll_ctl(epoll, op, fd, &mut raw) };
        if ret < 0 {
            return Err(Errno::last());
        }

        Ok(())
    }

    /// Waits for events, blocking for at most `timeout` (`None` blocks
    /// indefinitely).
    ///
    /// # Returns
    /// The number of entries of `events` that were filled.
    pub(crate) fn wait(
        epoll: RawFd,
        events: &mut [Event],
        timeout: Option<Duration>,
    ) -> SysResult<usize> {
        let timeout_ms = match timeout {
            None => -1,
            // round up so a pending timer is never polled too early
            Some(duration) => duration
                .as_nanos()
                .div_ceil(1_000_000)
                .min(i32::MAX as u128) as i32,
        };

        let count = unsafe {
            epoll_wait(
                epoll,
                events.as_mut_ptr() as *mut epoll_event,
                events.len() as i32,
                timeout_ms,
            )
        };

        if count < 0 {
            return Err(Errno::last());
        }

        Ok(count as usize)
    }
}
