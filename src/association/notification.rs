//! Decoding of SCTP notifications.
//!
//! Notifications arrive in-band: `recvmsg` flags them with `MSG_NOTIFICATION`
//! and the buffer holds a `union sctp_notification`. Only the two kinds the
//! engine reacts to are decoded field by field; everything else is forwarded
//! as [`Notification::Other`].

use crate::error::{Error, Result};
use crate::sys::ffi::{SCTP_ASSOC_CHANGE, SCTP_PEER_ADDR_CHANGE};
use crate::sys::sockaddr;

use std::net::SocketAddr;

const HEADER_LEN: usize = 8;
const ASSOC_CHANGE_LEN: usize = 20;
const PADDR_ADDRESS_OFFSET: usize = 8;
const PADDR_STATE_OFFSET: usize = 136;
const PADDR_CHANGE_LEN: usize = 148;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssociationChangeState {
    CommUp,
    CommLost,
    Restart,
    ShutdownComplete,
    CantStartAssociation,
    Unknown(u16),
}

impl AssociationChangeState {
    fn from_raw(raw: u16) -> Self {
        match raw {
            0 => Self::CommUp,
            1 => Self::CommLost,
            2 => Self::Restart,
            3 => Self::ShutdownComplete,
            4 => Self::CantStartAssociation,
            other => Self::Unknown(other),
        }
    }
}

/// `SCTP_ASSOC_CHANGE`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AssociationChange {
    pub state: AssociationChangeState,
    pub error: u16,
    pub outbound_streams: u16,
    pub inbound_streams: u16,
    pub assoc_id: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PeerAddressState {
    Available,
    Unreachable,
    Removed,
    Added,
    MadePrimary,
    Confirmed,
    PotentiallyFailed,
    Unknown(i32),
}

impl PeerAddressState {
    fn from_raw(raw: i32) -> Self {
        match raw {
            0 => Self::Available,
            1 => Self::Unreachable,
            2 => Self::Removed,
            3 => Self::Added,
            4 => Self::MadePrimary,
            5 => Self::Confirmed,
            6 => Self::PotentiallyFailed,
            other => Self::Unknown(other),
        }
    }
}

/// `SCTP_PEER_ADDR_CHANGE`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PeerAddressChange {
    /// `None` if the kernel reported an address family this crate does not
    /// decode.
    pub address: Option<SocketAddr>,
    pub state: PeerAddressState,
    pub error: i32,
    pub assoc_id: i32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notification {
    AssociationChange(AssociationChange),
    PeerAddressChange(PeerAddressChange),
    /// Any other notification type, identified by its `sn_type`.
    Other { kind: u16, flags: u16, data: Vec<u8> },
}

fn u16_at(bytes: &[u8], offset: usize) -> u16 {
    u16::from_ne_bytes([bytes[offset], bytes[offset + 1]])
}

fn i32_at(bytes: &[u8], offset: usize) -> i32 {
    i32::from_ne_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

fn truncated(kind: &str, len: usize) -> Error {
    Error::ProtocolViolation(format!("truncated {kind} notification ({len} bytes)"))
}

impl Notification {
    /// Decodes one notification as delivered by `recvmsg`.
    ///
    /// # Returns
    /// The decoded notification, or [`Error::ProtocolViolation`] if `bytes` is
    /// shorter than the structure its type announces.
    ///
    /// # Example
    /// ```ignore
    /// match Notification::parse(&buffer[..received.len])? {
    ///     Notification::PeerAddressChange(change) => refresh(),
    ///     _ => {}
    /// }
    /// ```
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(truncated("sctp", bytes.len()));
        }

        let kind = u16_at(bytes, 0);
        let flags = u16_at(bytes, 2);

        match kind {
            SCTP_ASSOC_CHANGE => {
                if bytes.len() < ASSOC_CHANGE_LEN {
                    return Err(truncated("association change", bytes.len()));
                }

                Ok(Self::AssociationChange(AssociationChange {
                    state: AssociationChangeState::from_raw(u16_at(bytes, 8)),
                    error: u16_at(bytes, 10),
                    outbound_streams: u16_at(bytes, 12),
                    inbound_streams: u16_at(bytes, 14),
                    assoc_id: i32_at(bytes, 16),
                }))
            }
            SCTP_PEER_ADDR_CHANGE => {
                if bytes.len() < PADDR_CHANGE_LEN {
                    return Err(truncated("peer address change", bytes.len()));
                }

                let address = sockaddr::parse(&bytes[PADDR_ADDRESS_OFFSET..PADDR_STATE_OFFSET])
                    .map(|(address, _)| address);

                Ok(Self::PeerAddressChange(PeerAddressChange {
                    address,
                    state: PeerAddressState::from_raw(i32_at(bytes, PADDR_STATE_OFFSET)),
                    error: i32_at(bytes, PADDR_STATE_OFFSET + 4),
                    assoc_id: i32_at(bytes, PADDR_STATE_OFFSET + 8),
                }))
            }
            _ => Ok(Self::Other {
                kind,
                flags,
                data: bytes.to_vec(),
            }),
        }
    }

    /// The raw `sn_type` of this notification.
    pub fn kind(&self) -> u16 {
        match self {
            Self::AssociationChange(_) => SCTP_ASSOC_CHANGE,
            Self::PeerAddressChange(_) => SCTP_PEER_ADDR_CHANGE,
            Self::Other { kind, .. } => *kind,
        }
    }
}
