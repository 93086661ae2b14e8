//! System call boundary for SCTP sockets.
//!
//! Everything the association engine, the client and the listener need from
//! the kernel goes through the [`SctpSys`] trait. [`LinuxSctp`] implements it
//! with raw `libc` calls; tests substitute a scripted implementation.
//!
//! Every operation is non-blocking and reports failures as an [`Errno`].
//! `EAGAIN` is surfaced as an ordinary [`Errno`] so callers can check
//! [`Errno::is_would_block`] and wait for readiness.

pub(crate) mod ffi;
mod linux;
pub(crate) mod sockaddr;

pub use linux::LinuxSctp;

use crate::association::status::{AssociationStatus, PathInfo};

use std::fmt;
use std::io;
use std::net::{Shutdown, SocketAddr};
use std::os::fd::RawFd;
use std::time::Duration;

/// An OS error number.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Errno(pub i32);

impl Errno {
    /// Reads `errno` for the calling thread.
    pub fn last() -> Self {
        Self(errno())
    }

    /// Returns `true` for `EAGAIN` / `EWOULDBLOCK`.
    pub fn is_would_block(self) -> bool {
        self.0 == libc::EAGAIN || self.0 == libc::EWOULDBLOCK
    }

    /// The raw error number.
    pub fn code(self) -> i32 {
        self.0
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", io::Error::from_raw_os_error(self.0))
    }
}

pub type SysResult<T> = std::result::Result<T, Errno>;

pub(crate) fn errno() -> i32 {
    unsafe { *libc::__errno_location() }
}

/// Address family of a new socket.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddressFamily {
    Ipv4,
    Ipv6,
}

impl AddressFamily {
    pub fn of(address: &SocketAddr) -> Self {
        match address {
            SocketAddr::V4(_) => Self::Ipv4,
            SocketAddr::V6(_) => Self::Ipv6,
        }
    }
}

/// Per-message receive metadata (`struct sctp_rcvinfo`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RcvInfo {
    pub stream_id: u16,
    pub ssn: u16,
    pub flags: u16,
    /// Payload protocol identifier, already converted to host byte order.
    pub ppid: u32,
    pub tsn: u32,
    pub cumulative_tsn: u32,
    pub context: u32,
    pub assoc_id: i32,
}

/// Per-message send metadata (`struct sctp_sndinfo`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SndInfo {
    pub stream_id: u16,
    pub flags: u16,
    /// Payload protocol identifier in host byte order.
    pub ppid: u32,
    pub context: u32,
}

/// Outcome of one successful `recvmsg`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Received {
    /// Number of bytes written into the caller's buffer. Zero means the peer
    /// shut the association down.
    pub len: usize,
    /// `MSG_EOR`: the buffer holds a complete message.
    pub end_of_record: bool,
    /// `MSG_NOTIFICATION`: the buffer holds an SCTP notification.
    pub notification: bool,
    pub rcv_info: Option<RcvInfo>,
}

/// `SCTP_INITMSG` parameters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InitMsg {
    pub outgoing_streams: u16,
    pub max_incoming_streams: u16,
    pub max_attempts: u16,
    pub max_init_timeout: u16,
}

/// `SCTP_DELAYED_ACK_TIME` parameters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SackInfo {
    /// Delay in milliseconds.
    pub delay: u32,
    pub freq: u32,
}

/// Notification classes that can be subscribed with `SCTP_EVENT`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    AssociationChange,
    PeerAddressChange,
    SendFailed,
    RemoteError,
    Shutdown,
    PartialDelivery,
    Adaptation,
    Authentication,
    SenderDry,
}

impl EventKind {
    pub(crate) fn raw(self) -> u16 {
        match self {
            Self::AssociationChange => ffi::SCTP_ASSOC_CHANGE,
            Self::PeerAddressChange => ffi::SCTP_PEER_ADDR_CHANGE,
            Self::SendFailed => ffi::SCTP_SEND_FAILED,
            Self::RemoteError => ffi::SCTP_REMOTE_ERROR,
            Self::Shutdown => ffi::SCTP_SHUTDOWN_EVENT,
            Self::PartialDelivery => ffi::SCTP_PARTIAL_DELIVERY_EVENT,
            Self::Adaptation => ffi::SCTP_ADAPTATION_INDICATION,
            Self::Authentication => ffi::SCTP_AUTHENTICATION_EVENT,
            Self::SenderDry => ffi::SCTP_SENDER_DRY_EVENT,
        }
    }
}

/// The socket operations the crate relies on.
///
/// Implementations must never block: operations that cannot complete
/// immediately fail with `EAGAIN`, and [`connectx`](Self::connectx) treats
/// `EINPROGRESS` as success.
pub trait SctpSys {
    /// Creates a non-blocking, close-on-exec, one-to-one SCTP socket.
    fn create_socket(&self, family: AddressFamily) -> SysResult<RawFd>;

    fn bindx(&self, fd: RawFd, addresses: &[SocketAddr]) -> SysResult<()>;

    /// Starts a (possibly multi-homed) connect.
    fn connectx(&self, fd: RawFd, addresses: &[SocketAddr]) -> SysResult<()>;

    fn listen(&self, fd: RawFd, backlog: i32) -> SysResult<()>;

    /// Accepts one pending association as a non-blocking socket.
    fn accept(&self, fd: RawFd) -> SysResult<(RawFd, SocketAddr)>;

    /// Receives at most one message (or notification) into `buffer`.
    fn recv_message(&self, fd: RawFd, buffer: &mut [u8]) -> SysResult<Received>;

    /// Sends one complete message.
    fn send_message(&self, fd: RawFd, payload: &[u8], info: &SndInfo) -> SysResult<usize>;

    /// Reads and clears `SO_ERROR`.
    fn pending_error(&self, fd: RawFd) -> SysResult<Option<Errno>>;

    fn local_name(&self, fd: RawFd) -> SysResult<SocketAddr>;

    fn peer_name(&self, fd: RawFd) -> SysResult<SocketAddr>;

    fn local_addresses(&self, fd: RawFd) -> SysResult<Vec<SocketAddr>>;

    fn peer_addresses(&self, fd: RawFd) -> SysResult<Vec<SocketAddr>>;

    fn peer_path_info(&self, fd: RawFd, address: SocketAddr) -> SysResult<PathInfo>;

    fn status(&self, fd: RawFd) -> SysResult<AssociationStatus>;

    fn set_sack_info(&self, fd: RawFd, sack: SackInfo) -> SysResult<()>;

    fn set_init_msg(&self, fd: RawFd, init: InitMsg) -> SysResult<()>;

    fn set_nodelay(&self, fd: RawFd, nodelay: bool) -> SysResult<()>;

    /// `None` disables lingering; `Some(Duration::ZERO)` makes `close` abort.
    fn set_linger(&self, fd: RawFd, linger: Option<Duration>) -> SysResult<()>;

    fn subscribe_event(&self, fd: RawFd, event: EventKind, on: bool) -> SysResult<()>;

    /// Requests `SCTP_RCVINFO` ancillary data on every received message.
    fn set_recv_rcvinfo(&self, fd: RawFd, on: bool) -> SysResult<()>;

    fn shutdown(&self, fd: RawFd, how: Shutdown) -> SysResult<()>;

    fn close(&self, fd: RawFd) -> SysResult<()>;
}
