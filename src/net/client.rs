//! Outgoing associations.

use crate::association::Association;
use crate::config::ConnectOptions;
use crate::error::{Error, Result};
use crate::runtime::Handle;
use crate::sys::{AddressFamily, LinuxSctp, SctpSys};

use log::{debug, warn};
use std::os::fd::RawFd;
use std::rc::Rc;

/// Starts a connect on the current event loop.
///
/// The returned association is in [`Phase::Connecting`](crate::Phase); its
/// handler sees `on_connect` once the handshake completes, or `on_error`
/// followed by `on_close` if it fails (a refused connect surfaces as
/// [`Error::ConnectionRefused`]). Writes and `end` may be issued right away;
/// they take effect after the connect.
///
/// # Arguments
/// * `options` - Peer addresses, optional local bind and socket options
///
/// # Returns
/// The connecting association, or an error if the socket could not be set up
/// or the connect was rejected synchronously.
///
/// # Panics
/// Panics if called outside of [`EventLoop::run`](crate::EventLoop::run) or
/// [`EventLoop::enter`](crate::EventLoop::enter).
///
/// # Example
/// ```ignore
/// let event_loop = EventLoop::new()?;
/// event_loop.enter(|| {
///     let association = net::connect(ConnectOptions::new("127.0.0.1:3868".parse()?))?;
///     association.set_handler(Client::default());
///     Ok::<_, Error>(())
/// })?;
/// event_loop.run()?;
/// ```
pub fn connect(options: ConnectOptions) -> Result<Association> {
    connect_with(&Handle::current(), Rc::new(LinuxSctp::new()), options)
}

/// Starts a connect on `handle`'s loop through `sys`.
///
/// This is the explicit version of [`connect`].
pub fn connect_with(
    handle: &Handle,
    sys: Rc<dyn SctpSys>,
    options: ConnectOptions,
) -> Result<Association> {
    let Some(primary) = options.remote.first().copied() else {
        return Err(Error::InvalidArgument("no remote address".to_owned()));
    };

    let fd = sys
        .create_socket(AddressFamily::of(&primary))
        .map_err(|errno| Error::from_errno("socket", errno))?;

    let result = start(sys.as_ref(), fd, &options).and_then(|()| {
        Association::from_fd(
            handle,
            sys.clone(),
            fd,
            false,
            Some(primary),
            options.association,
        )
    });

    if result.is_err()
        && let Err(errno) = sys.close(fd)
    {
        warn!("fd {fd}: close after failed connect: {errno}");
    }

    result
}

fn start(sys: &dyn SctpSys, fd: RawFd, options: &ConnectOptions) -> Result<()> {
    options.socket.apply(sys, fd)?;

    if !options.local.is_empty() {
        sys.bindx(fd, &options.local)
            .map_err(|errno| Error::from_errno("bind", errno))?;
    }

    sys.connectx(fd, &options.remote)
        .map_err(|errno| Error::from_errno("connect", errno))?;

    debug!("fd {fd}: connecting to {:?}", options.remote);
    Ok(())
}
