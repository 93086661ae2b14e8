//! Raw SCTP constants and kernel structures.
//!
//! These mirror the Linux `<netinet/sctp.h>` / `<linux/sctp.h>` definitions so
//! the crate can talk to the kernel SCTP stack through plain `libc` calls,
//! without linking against `libsctp`.

use libc::{c_int, sockaddr_storage};

pub(crate) const SOL_SCTP: c_int = libc::IPPROTO_SCTP;

pub(crate) const SCTP_INITMSG: c_int = 2;
pub(crate) const SCTP_NODELAY: c_int = 3;
pub(crate) const SCTP_STATUS: c_int = 14;
pub(crate) const SCTP_GET_PEER_ADDR_INFO: c_int = 15;
pub(crate) const SCTP_DELAYED_ACK_TIME: c_int = 16;
pub(crate) const SCTP_RECVRCVINFO: c_int = 32;
pub(crate) const SCTP_SOCKOPT_BINDX_ADD: c_int = 100;
pub(crate) const SCTP_GET_PEER_ADDRS: c_int = 108;
pub(crate) const SCTP_GET_LOCAL_ADDRS: c_int = 109;
pub(crate) const SCTP_SOCKOPT_CONNECTX: c_int = 110;
pub(crate) const SCTP_EVENT: c_int = 127;

pub(crate) const SCTP_ALL_ASSOC: i32 = 2;

// cmsg types
pub(crate) const SCTP_SNDINFO: c_int = 2;
pub(crate) const SCTP_RCVINFO: c_int = 3;

pub(crate) const MSG_NOTIFICATION: c_int = 0x8000;

pub(crate) const SCTP_ASSOC_CHANGE: u16 = 0x8001;
pub(crate) const SCTP_PEER_ADDR_CHANGE: u16 = 0x8002;
pub(crate) const SCTP_SEND_FAILED: u16 = 0x8003;
pub(crate) const SCTP_REMOTE_ERROR: u16 = 0x8004;
pub(crate) const SCTP_SHUTDOWN_EVENT: u16 = 0x8005;
pub(crate) const SCTP_PARTIAL_DELIVERY_EVENT: u16 = 0x8006;
pub(crate) const SCTP_ADAPTATION_INDICATION: u16 = 0x8007;
pub(crate) const SCTP_AUTHENTICATION_EVENT: u16 = 0x8008;
pub(crate) const SCTP_SENDER_DRY_EVENT: u16 = 0x8009;

/// Upper bound on the number of addresses fetched by one
/// `SCTP_GET_{LOCAL,PEER}_ADDRS` call.
pub(crate) const MAX_ADDRESSES: usize = 128;

#[derive(Debug, Copy, Clone, Default)]
#[repr(C)]
pub(crate) struct SctpSndInfo {
    pub(crate) snd_sid: u16,
    pub(crate) snd_flags: u16,
    pub(crate) snd_ppid: u32,
    pub(crate) snd_context: u32,
    pub(crate) snd_assoc_id: i32,
}

#[derive(Debug, Copy, Clone, Default)]
#[repr(C)]
pub(crate) struct SctpRcvInfo {
    pub(crate) rcv_sid: u16,
    pub(crate) rcv_ssn: u16,
    pub(crate) rcv_flags: u16,
    pub(crate) rcv_ppid: u32,
    pub(crate) rcv_tsn: u32,
    pub(crate) rcv_cumtsn: u32,
    pub(crate) rcv_context: u32,
    pub(crate) rcv_assoc_id: i32,
}

#[derive(Debug, Copy, Clone, Default)]
#[repr(C)]
pub(crate) struct SctpInitMsg {
    pub(crate) sinit_num_ostreams: u16,
    pub(crate) sinit_max_instreams: u16,
    pub(crate) sinit_max_attempts: u16,
    pub(crate) sinit_max_init_timeo: u16,
}

#[derive(Debug, Copy, Clone, Default)]
#[repr(C)]
pub(crate) struct SctpSackInfo {
    pub(crate) sack_assoc_id: i32,
    pub(crate) sack_delay: u32,
    pub(crate) sack_freq: u32,
}

#[derive(Debug, Copy, Clone, Default)]
#[repr(C)]
pub(crate) struct SctpEvent {
    pub(crate) se_assoc_id: i32,
    pub(crate) se_type: u16,
    pub(crate) se_on: u8,
}

/// `struct sctp_paddrinfo` is declared `packed, aligned(4)` by the kernel.
#[derive(Copy, Clone)]
#[repr(C, packed(4))]
pub(crate) struct SctpPaddrInfo {
    pub(crate) spinfo_assoc_id: i32,
    pub(crate) spinfo_address: sockaddr_storage,
    pub(crate) spinfo_state: i32,
    pub(crate) spinfo_cwnd: u32,
    pub(crate) spinfo_srtt: u32,
    pub(crate) spinfo_rto: u32,
    pub(crate) spinfo_mtu: u32,
}

#[derive(Copy, Clone)]
#[repr(C)]
pub(crate) struct SctpStatus {
    pub(crate) sstat_assoc_id: i32,
    pub(crate) sstat_state: i32,
    pub(crate) sstat_rwnd: u32,
    pub(crate) sstat_unackdata: u16,
    pub(crate) sstat_penddata: u16,
    pub(crate) sstat_instrms: u16,
    pub(crate) sstat_outstrms: u16,
    pub(crate) sstat_fragmentation_point: u32,
    pub(crate) sstat_primary: SctpPaddrInfo,
}

