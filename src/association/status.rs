use std::net::SocketAddr;

/// Reachability of one peer transport address.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PathState {
    Inactive,
    PotentiallyFailed,
    Active,
    Unconfirmed,
    Unknown(i32),
}

impl PathState {
    pub(crate) fn from_raw(raw: i32) -> Self {
        match raw {
            0 => Self::Inactive,
            1 => Self::PotentiallyFailed,
            2 => Self::Active,
            3 => Self::Unconfirmed,
            other => Self::Unknown(other),
        }
    }
}

/// Kernel metrics for one path of a multi-homed association.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PathInfo {
    pub address: SocketAddr,
    pub state: PathState,
    /// Congestion window in bytes.
    pub cwnd: u32,
    /// Smoothed round-trip time in milliseconds.
    pub srtt: u32,
    /// Retransmission timeout in milliseconds.
    pub rto: u32,
    pub mtu: u32,
}

/// SCTP protocol state of an association (`sstat_state`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssociationState {
    Empty,
    Closed,
    CookieWait,
    CookieEchoed,
    Established,
    ShutdownPending,
    ShutdownSent,
    ShutdownReceived,
    ShutdownAckSent,
    Unknown(i32),
}

impl AssociationState {
    pub(crate) fn from_raw(raw: i32) -> Self {
        match raw {
            0 => Self::Empty,
            1 => Self::Closed,
            2 => Self::CookieWait,
            3 => Self::CookieEchoed,
            4 => Self::Established,
            5 => Self::ShutdownPending,
            6 => Self::ShutdownSent,
            7 => Self::ShutdownReceived,
            8 => Self::ShutdownAckSent,
            other => Self::Unknown(other),
        }
    }
}

/// Snapshot returned by [`Association::status`](crate::Association::status).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AssociationStatus {
    pub state: AssociationState,
    pub receive_window: u32,
    pub unacked_data: u16,
    pub pending_data: u16,
    pub incoming_streams: u16,
    pub outgoing_streams: u16,
    pub fragmentation_point: u32,
    /// Primary path, when the kernel reports an address for it.
    pub primary: Option<PathInfo>,
}
