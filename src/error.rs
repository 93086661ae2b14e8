//! Failure taxonomy surfaced by associations, the client and the listener.
//!
//! Kernel error numbers are folded into a handful of named variants that
//! callers commonly branch on (`ECONNREFUSED`, `ECONNRESET`, `EPIPE`,
//! `EADDRINUSE`); everything else is reported as [`Error::Os`] together with
//! the operation that failed.
//!
//! `EAGAIN` never becomes an [`Error`]: it only means "wait for readiness"
//! and is handled inside the engine.

use crate::sys::Errno;

use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("Connection refused")]
    ConnectionRefused,

    #[error("Connection reset by peer")]
    ConnectionReset,

    #[error("Broken pipe")]
    BrokenPipe,

    #[error("Address already in use")]
    AddressInUse,

    /// The peer or the kernel produced something the engine cannot handle,
    /// such as a message split across several receive calls.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Error during {operation}: {}", describe(.code))]
    Os { operation: &'static str, code: i32 },

    #[error("{method} called after destroy")]
    Destroyed { method: &'static str },

    #[error("write after end")]
    WriteAfterEnd,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

fn describe(code: &i32) -> String {
    io::Error::from_raw_os_error(*code).to_string()
}

impl Error {
    /// Maps an error number returned by `operation`.
    ///
    /// # Example
    /// ```ignore
    /// let error = Error::from_errno("connect", Errno(libc::ECONNREFUSED));
    /// assert_eq!(error, Error::ConnectionRefused);
    /// ```
    pub fn from_errno(operation: &'static str, errno: Errno) -> Self {
        match errno.0 {
            libc::ECONNREFUSED => Self::ConnectionRefused,
            libc::ECONNRESET => Self::ConnectionReset,
            libc::EPIPE => Self::BrokenPipe,
            libc::EADDRINUSE => Self::AddressInUse,
            code => Self::Os { operation, code },
        }
    }

    /// The `errno` mnemonic for this error, when one applies.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            Self::ConnectionRefused => Some("ECONNREFUSED"),
            Self::ConnectionReset => Some("ECONNRESET"),
            Self::BrokenPipe => Some("EPIPE"),
            Self::AddressInUse => Some("EADDRINUSE"),
            Self::ProtocolViolation(_) => Some("EPROTO"),
            Self::InvalidArgument(_) => Some("EINVAL"),
            Self::Os { code, .. } => errno_name(*code),
            Self::Destroyed { .. } | Self::WriteAfterEnd => None,
        }
    }

    /// The raw error number, for errors that came from the kernel.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::ConnectionRefused => Some(libc::ECONNREFUSED),
            Self::ConnectionReset => Some(libc::ECONNRESET),
            Self::BrokenPipe => Some(libc::EPIPE),
            Self::AddressInUse => Some(libc::EADDRINUSE),
            Self::Os { code, .. } => Some(*code),
            _ => None,
        }
    }
}

fn errno_name(code: i32) -> Option<&'static str> {
    let name = match code {
        libc::EACCES => "EACCES",
        libc::EADDRNOTAVAIL => "EADDRNOTAVAIL",
        libc::EAFNOSUPPORT => "EAFNOSUPPORT",
        libc::EBADF => "EBADF",
        libc::EHOSTUNREACH => "EHOSTUNREACH",
        libc::EINVAL => "EINVAL",
        libc::EIO => "EIO",
        libc::EMFILE => "EMFILE",
        libc::ENETUNREACH => "ENETUNREACH",
        libc::ENFILE => "ENFILE",
        libc::ENOBUFS => "ENOBUFS",
        libc::ENOMEM => "ENOMEM",
        libc::ENOTCONN => "ENOTCONN",
        libc::EPROTONOSUPPORT => "EPROTONOSUPPORT",
        libc::ESOCKTNOSUPPORT => "ESOCKTNOSUPPORT",
        libc::ETIMEDOUT => "ETIMEDOUT",
        _ => return None,
    };

    Some(name)
}

impl From<Error> for io::Error {
    fn from(error: Error) -> Self {
        match error.raw_os_error() {
            Some(code) => io::Error::from_raw_os_error(code),
            None => io::Error::other(error),
        }
    }
}
