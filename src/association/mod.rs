//! SCTP associations.
//!
//! An [`Association`] is one established (or establishing) one-to-one SCTP
//! association, driven by the event loop it was created on. It is a cheap,
//! clonable handle; the engine behind it lives until the association is
//! destroyed, whether or not user handles remain.
//!
//! # Lifecycle
//!
//! ```text
//! Connecting ──connect──> Established ──end──> LocallyShutdown
//!     │                       │                      │
//!     │                  remote end             remote end
//!     │                       v                      v
//!     └──error──────────> Ended ──────────────> Destroyed
//! ```
//!
//! Every path ends in [`Phase::Destroyed`]; the handler then sees `on_close`
//! exactly once, preceded by `on_error` if the association failed.
//!
//! # Flow control
//!
//! Incoming data is pulled: the engine only reads while the handler wants
//! data. [`AssociationHandler::on_data`] returns whether it wants the next
//! message; returning `false` pauses reading until [`Association::resume`].
//! Outgoing messages are queued and written in submission order, each
//! completion firing once the kernel has accepted the whole message.
//!
//! # Example
//!
//! ```ignore
//! struct Echo;
//!
//! impl AssociationHandler for Echo {
//!     fn on_data(&mut self, association: &Association, message: Message) -> bool {
//!         let _ = association.write(message, |_| {});
//!         true
//!     }
//! }
//!
//! let association = net::connect(ConnectOptions::new(peer))?;
//! association.set_handler(Echo);
//! association.resume()?;
//! ```

mod engine;
pub mod notification;
mod queue;
pub mod status;
pub mod tracker;

pub use notification::Notification;
pub use queue::{Completion, Message};
pub use status::{AssociationState, AssociationStatus, PathInfo, PathState};
pub use tracker::AddressSnapshot;

use crate::config::AssociationConfig;
use crate::error::{Error, Result};
use crate::runtime::Handle;
use crate::sys::SctpSys;

use engine::Inner;
use std::net::SocketAddr;
use std::os::fd::RawFd;
use std::rc::Rc;

/// Where an association is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Connect in progress.
    Connecting,
    Established,
    /// The local side has shut down; data may still arrive.
    LocallyShutdown,
    /// The peer has shut down.
    Ended,
    Destroyed,
}

/// Receives the events of one association.
///
/// Every method has a no-op default. Methods are never called re-entrantly
/// and never while the engine is mid-step, so handlers may call any
/// [`Association`] method.
pub trait AssociationHandler {
    /// The connect finished. Not emitted for accepted associations.
    fn on_connect(&mut self, association: &Association) {
        let _ = association;
    }

    /// One complete message arrived.
    ///
    /// # Returns
    /// `true` to keep reading, `false` to pause until
    /// [`Association::resume`].
    fn on_data(&mut self, association: &Association, message: Message) -> bool {
        let _ = (association, message);
        true
    }

    fn on_notification(&mut self, association: &Association, notification: Notification) {
        let _ = (association, notification);
    }

    /// A primary address or the set of local or remote addresses changed.
    fn on_address_change(&mut self, association: &Association, snapshot: AddressSnapshot) {
        let _ = (association, snapshot);
    }

    /// The peer has shut down its side.
    fn on_end(&mut self, association: &Association) {
        let _ = association;
    }

    fn on_error(&mut self, association: &Association, error: Error) {
        let _ = (association, error);
    }

    /// The association is gone. Always the last call.
    fn on_close(&mut self, association: &Association) {
        let _ = association;
    }
}

/// Handle to one SCTP association.
///
/// Clones share the same association. The event loop, not the handle, keeps
/// it running: dropping every handle neither closes the socket nor cancels
/// queued writes. The descriptor is released only when the association is
/// destroyed, either explicitly with [`destroy`](Self::destroy), on a fatal
/// error, or once both sides have ended. An idle association that nobody
/// destroys keeps its descriptor open after [`EventLoop::run`](crate::EventLoop::run)
/// returns.
#[derive(Clone)]
pub struct Association {
    inner: Rc<Inner>,
}

impl Association {
    pub(crate) fn from_inner(inner: Rc<Inner>) -> Self {
        Self { inner }
    }

    /// Wraps an already created SCTP socket.
    ///
    /// Used by [`connect`](crate::net::connect) and
    /// [`SctpListener`](crate::net::SctpListener); also the entry point for
    /// driving the engine over a custom [`SctpSys`].
    ///
    /// # Arguments
    /// * `fd` - Non-blocking one-to-one SCTP socket; ownership moves to the
    ///   association on success
    /// * `connected` - `false` while a connect is still in progress
    /// * `remote` - The peer's primary address, if known
    ///
    /// # Returns
    /// The association, or an error if the socket's local address cannot be
    /// read. `fd` is left open on error.
    pub fn from_fd(
        handle: &Handle,
        sys: Rc<dyn SctpSys>,
        fd: RawFd,
        connected: bool,
        remote: Option<SocketAddr>,
        config: AssociationConfig,
    ) -> Result<Self> {
        Inner::create(handle, sys, fd, connected, remote, config).map(Self::from_inner)
    }

    /// Installs the event handler, replacing any previous one.
    ///
    /// Events that happened while no handler was installed are delivered now,
    /// in order.
    pub fn set_handler<H>(&self, handler: H)
    where
        H: AssociationHandler + 'static,
    {
        self.inner.set_handler(Box::new(handler));
    }

    /// Asks for the next incoming message.
    pub fn resume(&self) -> Result<()> {
        self.check("resume")?;
        self.inner.request_data();
        Ok(())
    }

    /// Stops reading until [`resume`](Self::resume). A read already in
    /// progress is unaffected.
    pub fn pause(&self) -> Result<()> {
        self.check("pause")?;
        self.inner.state.borrow_mut().wants_data = false;
        Ok(())
    }

    /// Queues `message` for sending.
    ///
    /// `completion` runs exactly once: with `Ok(())` once the kernel accepted
    /// the message, or with the error that destroyed the association.
    ///
    /// # Returns
    /// An error without queueing if the association is destroyed, was ended,
    /// or the message is empty.
    ///
    /// # Example
    /// ```ignore
    /// association.write(Message::new(b"ping".to_vec()).with_stream_id(1), |result| {
    ///     if let Err(error) = result {
    ///         eprintln!("ping lost: {error}");
    ///     }
    /// })?;
    /// ```
    pub fn write<F>(&self, message: Message, completion: F) -> Result<()>
    where
        F: FnOnce(Result<()>) + 'static,
    {
        let mut state = self.inner.state.borrow_mut();

        if state.destroyed {
            return Err(Error::Destroyed { method: "write" });
        }
        if state.end_requested {
            return Err(Error::WriteAfterEnd);
        }
        if message.payload.is_empty() {
            return Err(Error::InvalidArgument("empty message".to_owned()));
        }

        state.queue.push(message, Box::new(completion));
        self.inner.schedule_step(&mut state);

        Ok(())
    }

    /// Shuts down the local side once every queued write has been sent.
    ///
    /// `completion` runs with `Ok(())` after the shutdown was issued, or with
    /// the error that destroyed the association first. Calling `end` again is
    /// allowed; later completions fire with the same outcome.
    pub fn end<F>(&self, completion: F) -> Result<()>
    where
        F: FnOnce(Result<()>) + 'static,
    {
        {
            let mut state = self.inner.state.borrow_mut();

            if state.destroyed {
                return Err(Error::Destroyed { method: "end" });
            }

            self.inner.push_end_callback(&mut state, Box::new(completion));
            self.inner.schedule_step(&mut state);
        }

        self.inner.dispatch();
        Ok(())
    }

    /// Destroys the association. Idempotent.
    ///
    /// Unless the local side was already shut down, the socket is aborted.
    /// Queued writes fail with `error`, or with [`Error::Destroyed`].
    pub fn destroy(&self, error: Option<Error>) {
        {
            let mut state = self.inner.state.borrow_mut();
            self.inner.destroy_locked(&mut state, error);
        }

        self.inner.dispatch();
    }

    pub fn phase(&self) -> Phase {
        self.inner.state.borrow().phase()
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.state.borrow().destroyed
    }

    /// Number of writes still waiting for the socket.
    pub fn pending_writes(&self) -> usize {
        self.inner.state.borrow().queue.len()
    }

    /// The underlying socket, until the association is destroyed.
    pub fn raw_fd(&self) -> Option<RawFd> {
        self.inner.state.borrow().fd
    }

    /// Kernel view of the association (`SCTP_STATUS`).
    pub fn status(&self) -> Result<AssociationStatus> {
        let fd = self.fd("status")?;

        self.inner
            .sys
            .status(fd)
            .map_err(|errno| Error::from_errno("getsockopt(SCTP_STATUS)", errno))
    }

    pub fn set_nodelay(&self, nodelay: bool) -> Result<()> {
        let fd = self.fd("set_nodelay")?;

        self.inner
            .sys
            .set_nodelay(fd, nodelay)
            .map_err(|errno| Error::from_errno("setsockopt(SCTP_NODELAY)", errno))
    }

    /// The local primary address.
    pub fn address(&self) -> Result<SocketAddr> {
        self.inner
            .snapshot("address")
            .map(|snapshot| snapshot.local_primary)
    }

    /// The complete address snapshot.
    pub fn addresses(&self) -> Result<AddressSnapshot> {
        self.inner.snapshot("addresses")
    }

    pub fn local_addresses(&self) -> Result<Vec<SocketAddr>> {
        self.inner
            .snapshot("local_addresses")
            .map(|snapshot| snapshot.local)
    }

    pub fn local_primary_address(&self) -> Result<SocketAddr> {
        self.inner
            .snapshot("local_primary_address")
            .map(|snapshot| snapshot.local_primary)
    }

    /// Peer addresses; empty for a socket without a peer.
    pub fn remote_addresses(&self) -> Result<Vec<SocketAddr>> {
        self.inner
            .snapshot("remote_addresses")
            .map(|snapshot| snapshot.remote.unwrap_or_default())
    }

    pub fn remote_primary_address(&self) -> Result<Option<SocketAddr>> {
        self.inner
            .snapshot("remote_primary_address")
            .map(|snapshot| snapshot.remote_primary)
    }

    /// Per-path metrics from the latest snapshot.
    pub fn path_info(&self) -> Result<Vec<PathInfo>> {
        self.inner
            .snapshot("path_info")
            .map(|snapshot| snapshot.paths)
    }

    fn check(&self, method: &'static str) -> Result<()> {
        self.fd(method).map(|_| ())
    }

    fn fd(&self, method: &'static str) -> Result<RawFd> {
        let state = self.inner.state.borrow();

        match state.fd {
            Some(fd) if !state.destroyed => Ok(fd),
            _ => Err(Error::Destroyed { method }),
        }
    }
}
