//! Listening endpoints.
//!
//! An [`SctpListener`] owns a listening one-to-one SCTP socket and turns each
//! accepted socket into an [`Association`], handed to the callback given at
//! bind time. Closing (or dropping) the listener stops accepting; accepted
//! associations are unaffected.

use crate::association::Association;
use crate::config::{AssociationConfig, ListenOptions, SocketOptions};
use crate::error::{Error, Result};
use crate::reactor::{Interest, Readiness};
use crate::runtime::Handle;
use crate::sys::{AddressFamily, LinuxSctp, SctpSys};

use log::{debug, warn};
use std::cell::{Cell, RefCell};
use std::net::SocketAddr;
use std::os::fd::RawFd;
use std::rc::Rc;

/// Upper bound on accepts per readiness callback.
const ACCEPT_BATCH: usize = 16;

type AcceptCallback = Box<dyn FnMut(Result<Association>)>;

struct ListenerInner {
    handle: Handle,
    sys: Rc<dyn SctpSys>,
    fd: Cell<Option<RawFd>>,
    readiness: RefCell<Option<Readiness>>,
    socket: SocketOptions,
    association: AssociationConfig,
    on_association: RefCell<AcceptCallback>,
}

/// A listening SCTP endpoint.
///
/// # Example
///
/// ```ignore
/// let listener = SctpListener::bind(ListenOptions::new("0.0.0.0:3868".parse()?), |accepted| {
///     match accepted {
///         Ok(association) => association.set_handler(Session::new()),
///         Err(error) => eprintln!("accept failed: {error}"),
///     }
/// })?;
/// println!("Listening on {}", listener.local_addr()?);
/// ```
pub struct SctpListener {
    inner: Rc<ListenerInner>,
}

impl SctpListener {
    /// Binds a listener on the current event loop.
    ///
    /// This method performs the following:
    /// 1. Creates a non-blocking SCTP socket
    /// 2. Applies the socket options
    /// 3. Binds every local address (`sctp_bindx`)
    /// 4. Starts listening with the configured backlog
    ///
    /// # Arguments
    /// * `options` - Local addresses, backlog and options
    /// * `on_association` - Called once per accepted association, or with the
    ///   error that prevented setting one up
    ///
    /// # Returns
    /// The listener, or an error ([`Error::AddressInUse`] when the port is
    /// taken).
    ///
    /// # Panics
    /// Panics if called outside of [`EventLoop::run`](crate::EventLoop::run) or
    /// [`EventLoop::enter`](crate::EventLoop::enter).
    pub fn bind<F>(options: ListenOptions, on_association: F) -> Result<Self>
    where
        F: FnMut(Result<Association>) + 'static,
    {
        Self::bind_with(
            &Handle::current(),
            Rc::new(LinuxSctp::new()),
            options,
            on_association,
        )
    }

    /// Binds a listener on `handle`'s loop through `sys`.
    ///
    /// This is the explicit version of [`bind`](Self::bind).
    pub fn bind_with<F>(
        handle: &Handle,
        sys: Rc<dyn SctpSys>,
        options: ListenOptions,
        on_association: F,
    ) -> Result<Self>
    where
        F: FnMut(Result<Association>) + 'static,
    {
        let Some(first) = options.local.first() else {
            return Err(Error::InvalidArgument("no local address".to_owned()));
        };

        let fd = sys
            .create_socket(AddressFamily::of(first))
            .map_err(|errno| Error::from_errno("socket", errno))?;

        if let Err(error) = prepare(sys.as_ref(), fd, &options) {
            release(sys.as_ref(), fd);
            return Err(error);
        }

        let inner = Rc::new(ListenerInner {
            handle: handle.clone(),
            sys: sys.clone(),
            fd: Cell::new(Some(fd)),
            readiness: RefCell::new(None),
            socket: options.socket,
            association: options.association,
            on_association: RefCell::new(Box::new(on_association)),
        });

        let weak = Rc::downgrade(&inner);
        let mut readiness = handle.subscribe(fd, move |_event| {
            if let Some(inner) = weak.upgrade() {
                inner.accept_ready();
            }
        });

        if let Err(errno) = readiness.set_interest(Interest::READABLE) {
            readiness.close();
            release(sys.as_ref(), fd);
            return Err(Error::from_errno("epoll_ctl", errno));
        }

        *inner.readiness.borrow_mut() = Some(readiness);
        debug!("fd {fd}: listening on {:?}", options.local);

        Ok(Self { inner })
    }

    /// Returns the primary local address this listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        let fd = self.fd("local_addr")?;

        self.inner
            .sys
            .local_name(fd)
            .map_err(|errno| Error::from_errno("getsockname", errno))
    }

    /// Returns every address this listener is bound to.
    pub fn local_addresses(&self) -> Result<Vec<SocketAddr>> {
        let fd = self.fd("local_addresses")?;

        self.inner
            .sys
            .local_addresses(fd)
            .map_err(|errno| Error::from_errno("sctp_getladdrs", errno))
    }

    pub fn is_closed(&self) -> bool {
        self.inner.fd.get().is_none()
    }

    /// Stops accepting and closes the socket. Idempotent.
    pub fn close(&self) {
        self.inner.close();
    }

    fn fd(&self, method: &'static str) -> Result<RawFd> {
        self.inner.fd.get().ok_or(Error::Destroyed { method })
    }
}

impl Drop for SctpListener {
    fn drop(&mut self) {
        self.inner.close();
    }
}

fn prepare(sys: &dyn SctpSys, fd: RawFd, options: &ListenOptions) -> Result<()> {
    options.socket.apply(sys, fd)?;

    sys.bindx(fd, &options.local)
        .map_err(|errno| Error::from_errno("bind", errno))?;
    sys.listen(fd, options.backlog)
        .map_err(|errno| Error::from_errno("listen", errno))?;

    Ok(())
}

impl ListenerInner {
    fn accept_ready(&self) {
        for _ in 0..ACCEPT_BATCH {
            let Some(fd) = self.fd.get() else {
                return;
            };

            match self.sys.accept(fd) {
                Ok((accepted, peer)) => {
                    let result = self.adopt(accepted, peer);
                    (self.on_association.borrow_mut())(result);
                }
                Err(errno) if errno.is_would_block() => return,
                Err(errno) if errno.0 == libc::ECONNABORTED || errno.0 == libc::EINTR => {
                    continue;
                }
                Err(errno) => {
                    warn!("fd {fd}: accept failed, closing listener: {errno}");
                    self.close();
                    (self.on_association.borrow_mut())(Err(Error::from_errno("accept", errno)));
                    return;
                }
            }
        }
    }

    fn adopt(&self, fd: RawFd, peer: SocketAddr) -> Result<Association> {
        debug!("fd {fd}: accepted association from {peer}");

        let result = self.socket.apply(self.sys.as_ref(), fd).and_then(|()| {
            Association::from_fd(
                &self.handle,
                self.sys.clone(),
                fd,
                true,
                Some(peer),
                self.association.clone(),
            )
        });

        if result.is_err() {
            release(self.sys.as_ref(), fd);
        }

        result
    }

    fn close(&self) {
        if let Some(mut readiness) = self.readiness.borrow_mut().take() {
            readiness.close();
        }

        if let Some(fd) = self.fd.take() {
            release(self.sys.as_ref(), fd);
            debug!("fd {fd}: listener closed");
        }
    }
}

fn release(sys: &dyn SctpSys, fd: RawFd) {
    if let Err(errno) = sys.close(fd) {
        warn!("fd {fd}: close failed: {errno}");
    }
}
