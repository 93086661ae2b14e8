//! Conversions between [`SocketAddr`] and kernel socket address encodings.

use libc::{
    AF_INET, AF_INET6, in_addr, in6_addr, sa_family_t, sockaddr_in, sockaddr_in6,
    sockaddr_storage, socklen_t,
};

use std::mem;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};

const SOCKADDR_IN_LEN: usize = mem::size_of::<sockaddr_in>();
const SOCKADDR_IN6_LEN: usize = mem::size_of::<sockaddr_in6>();

/// Encodes a [`SocketAddr`] into a `sockaddr_storage` and its effective length.
pub(crate) fn to_raw(address: &SocketAddr) -> (sockaddr_storage, socklen_t) {
    let mut storage: sockaddr_storage = unsafe { mem::zeroed() };

    let length = match address {
        SocketAddr::V4(v4) => {
            let raw = sockaddr_in {
                sin_family: AF_INET as sa_family_t,
                sin_port: v4.port().to_be(),
                sin_addr: in_addr {
                    s_addr: u32::from(*v4.ip()).to_be(),
                },
                sin_zero: [0; 8],
            };

            unsafe { (&mut storage as *mut sockaddr_storage as *mut sockaddr_in).write(raw) };
            SOCKADDR_IN_LEN
        }
        SocketAddr::V6(v6) => {
            let raw = sockaddr_in6 {
                sin6_family: AF_INET6 as sa_family_t,
                sin6_port: v6.port().to_be(),
                sin6_flowinfo: v6.flowinfo(),
                sin6_addr: in6_addr {
                    s6_addr: v6.ip().octets(),
                },
                sin6_scope_id: v6.scope_id(),
            };

            unsafe { (&mut storage as *mut sockaddr_storage as *mut sockaddr_in6).write(raw) };
            SOCKADDR_IN6_LEN
        }
    };

    (storage, length as socklen_t)
}

/// Decodes a kernel-filled `sockaddr_storage`.
///
/// Returns `None` for address families other than IPv4 and IPv6.
pub(crate) fn from_raw(storage: &sockaddr_storage) -> Option<SocketAddr> {
    let bytes = unsafe {
        std::slice::from_raw_parts(
            storage as *const sockaddr_storage as *const u8,
            mem::size_of::<sockaddr_storage>(),
        )
    };

    parse(bytes).map(|(address, _)| address)
}

/// Decodes one socket address from the start of `bytes`.
///
/// # Returns
/// The address and the number of bytes its encoding occupies, or `None` when
/// the family is unknown or `bytes` is too short.
pub(crate) fn parse(bytes: &[u8]) -> Option<(SocketAddr, usize)> {
    let family = u16::from_ne_bytes(bytes.get(0..2)?.try_into().ok()?);

    match family as i32 {
        AF_INET => {
            let raw = bytes.get(..SOCKADDR_IN_LEN)?;
            let port = u16::from_be_bytes([raw[2], raw[3]]);
            let ip = Ipv4Addr::new(raw[4], raw[5], raw[6], raw[7]);

            Some((SocketAddr::V4(SocketAddrV4::new(ip, port)), SOCKADDR_IN_LEN))
        }
        AF_INET6 => {
            let raw = bytes.get(..SOCKADDR_IN6_LEN)?;
            let port = u16::from_be_bytes([raw[2], raw[3]]);
            let flowinfo = u32::from_ne_bytes(raw[4..8].try_into().ok()?);
            let octets: [u8; 16] = raw[8..24].try_into().ok()?;
            let scope_id = u32::from_ne_bytes(raw[24..28].try_into().ok()?);

            Some((
                SocketAddr::V6(SocketAddrV6::new(
                    Ipv6Addr::from(octets),
                    port,
                    flowinfo,
                    scope_id,
                )),
                SOCKADDR_IN6_LEN,
            ))
        }
        _ => None,
    }
}

/// Decodes `count` tightly packed addresses, as returned by
/// `SCTP_GET_{LOCAL,PEER}_ADDRS`.
pub(crate) fn parse_packed(bytes: &[u8], count: usize) -> Option<Vec<SocketAddr>> {
    let mut addresses = Vec::with_capacity(count);
    let mut offset = 0;

    for _ in 0..count {
        let (address, length) = parse(bytes.get(offset..)?)?;
        addresses.push(address);
        offset += length;
    }

    Some(addresses)
}

/// Encodes addresses as the packed array `bindx`/`connectx` expect.
pub(crate) fn pack(addresses: &[SocketAddr]) -> Vec<u8> {
    let mut packed = Vec::with_capacity(addresses.len() * SOCKADDR_IN6_LEN);

    for address in addresses {
        let (storage, length) = to_raw(address);
        let bytes = unsafe {
            std::slice::from_raw_parts(
                &storage as *const sockaddr_storage as *const u8,
                length as usize,
            )
        };
        packed.extend_from_slice(bytes);
    }

    packed
}
