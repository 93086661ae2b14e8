//! Configuration for associations, outgoing connects and listeners.
//!
//! All option structs follow the same fluent style as
//! [`EventLoopBuilder`](crate::EventLoopBuilder): start from `new()` or
//! `Default`, chain setters, pass the result by value.

use crate::error::{Error, Result};
use crate::sys::{Errno, EventKind, InitMsg, SackInfo, SctpSys};

use log::trace;
use std::net::SocketAddr;
use std::os::fd::RawFd;
use std::time::Duration;

/// Largest message the engine can receive in one piece.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 128 * 1024;

pub const DEFAULT_ADDRESS_REFRESH_INTERVAL: Duration = Duration::from_secs(5);

pub const DEFAULT_BACKLOG: i32 = 128;

/// Behaviour of one association engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssociationConfig {
    /// Size of the receive buffer. A message that does not fit is a protocol
    /// violation.
    pub max_message_size: usize,
    /// Period of the background address refresh; `None` disables it.
    pub address_refresh_interval: Option<Duration>,
    /// When `false`, the association ends its own side as soon as the peer
    /// has ended.
    pub allow_half_open: bool,
}

impl Default for AssociationConfig {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            address_refresh_interval: Some(DEFAULT_ADDRESS_REFRESH_INTERVAL),
            allow_half_open: false,
        }
    }
}

impl AssociationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    pub fn address_refresh_interval(mut self, interval: Option<Duration>) -> Self {
        self.address_refresh_interval = interval;
        self
    }

    pub fn allow_half_open(mut self, allow: bool) -> Self {
        self.allow_half_open = allow;
        self
    }
}

/// Socket options applied right after socket creation (and again on every
/// accepted socket).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SocketOptions {
    pub sack: Option<SackInfo>,
    pub init: Option<InitMsg>,
    pub no_delay: bool,
    /// Notification classes to subscribe to.
    pub notifications: Vec<EventKind>,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            sack: None,
            init: None,
            no_delay: false,
            notifications: vec![
                EventKind::AssociationChange,
                EventKind::PeerAddressChange,
                EventKind::Shutdown,
            ],
        }
    }
}

impl SocketOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delayed SACK timer (milliseconds) and frequency.
    pub fn sack(mut self, delay: u32, freq: u32) -> Self {
        self.sack = Some(SackInfo { delay, freq });
        self
    }

    /// Requested outgoing streams (OS) and accepted incoming streams (MIS).
    pub fn init_streams(mut self, outgoing: u16, max_incoming: u16) -> Self {
        let init = self.init.get_or_insert_with(InitMsg::default);
        init.outgoing_streams = outgoing;
        init.max_incoming_streams = max_incoming;
        self
    }

    pub fn init_msg(mut self, init: InitMsg) -> Self {
        self.init = Some(init);
        self
    }

    pub fn no_delay(mut self, no_delay: bool) -> Self {
        self.no_delay = no_delay;
        self
    }

    pub fn notifications(mut self, notifications: Vec<EventKind>) -> Self {
        self.notifications = notifications;
        self
    }

    /// Applies every option to `fd`.
    ///
    /// Receive info is always requested: data without it cannot be attributed
    /// to a stream.
    pub(crate) fn apply(&self, sys: &dyn SctpSys, fd: RawFd) -> Result<()> {
        sys.set_recv_rcvinfo(fd, true)
            .map_err(failed("setsockopt(SCTP_RECVRCVINFO)"))?;

        for event in &self.notifications {
            sys.subscribe_event(fd, *event, true)
                .map_err(failed("setsockopt(SCTP_EVENT)"))?;
        }

        if let Some(sack) = self.sack {
            sys.set_sack_info(fd, sack)
                .map_err(failed("setsockopt(SCTP_DELAYED_ACK_TIME)"))?;
        }

        if let Some(init) = self.init {
            sys.set_init_msg(fd, init)
                .map_err(failed("setsockopt(SCTP_INITMSG)"))?;
        }

        if self.no_delay {
            sys.set_nodelay(fd, true)
                .map_err(failed("setsockopt(SCTP_NODELAY)"))?;
        }

        trace!("fd {fd}: socket options applied");
        Ok(())
    }
}

fn failed(operation: &'static str) -> impl Fn(Errno) -> Error {
    move |errno| Error::from_errno(operation, errno)
}

/// Options for [`connect`](crate::net::connect).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Peer addresses; more than one makes the connect multi-homed.
    pub remote: Vec<SocketAddr>,
    /// Local addresses to bind before connecting; empty lets the kernel pick.
    pub local: Vec<SocketAddr>,
    pub socket: SocketOptions,
    pub association: AssociationConfig,
}

impl ConnectOptions {
    pub fn new(remote: SocketAddr) -> Self {
        Self::multi_homed(vec![remote])
    }

    pub fn multi_homed(remote: Vec<SocketAddr>) -> Self {
        Self {
            remote,
            local: Vec::new(),
            socket: SocketOptions::default(),
            association: AssociationConfig::default(),
        }
    }

    pub fn bind(mut self, local: Vec<SocketAddr>) -> Self {
        self.local = local;
        self
    }

    pub fn socket(mut self, socket: SocketOptions) -> Self {
        self.socket = socket;
        self
    }

    pub fn association(mut self, association: AssociationConfig) -> Self {
        self.association = association;
        self
    }
}

/// Options for [`SctpListener::bind`](crate::net::SctpListener::bind).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListenOptions {
    /// Addresses to listen on; more than one makes the endpoint multi-homed.
    pub local: Vec<SocketAddr>,
    pub backlog: i32,
    pub socket: SocketOptions,
    /// Configuration handed to every accepted association.
    pub association: AssociationConfig,
}

impl ListenOptions {
    pub fn new(local: SocketAddr) -> Self {
        Self::multi_homed(vec![local])
    }

    pub fn multi_homed(local: Vec<SocketAddr>) -> Self {
        Self {
            local,
            backlog: DEFAULT_BACKLOG,
            socket: SocketOptions::default(),
            association: AssociationConfig::default(),
        }
    }

    pub fn backlog(mut self, backlog: i32) -> Self {
        self.backlog = backlog;
        self
    }

    pub fn socket(mut self, socket: SocketOptions) -> Self {
        self.socket = socket;
        self
    }

    pub fn association(mut self, association: AssociationConfig) -> Self {
        self.association = association;
        self
    }
}
