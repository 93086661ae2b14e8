use crate::association::status::{AssociationState, AssociationStatus, PathInfo, PathState};
use crate::sys::ffi::{
    MAX_ADDRESSES, MSG_NOTIFICATION, SCTP_ALL_ASSOC, SCTP_DELAYED_ACK_TIME, SCTP_EVENT,
    SCTP_GET_LOCAL_ADDRS, SCTP_GET_PEER_ADDR_INFO, SCTP_GET_PEER_ADDRS, SCTP_INITMSG,
    SCTP_NODELAY, SCTP_RCVINFO, SCTP_RECVRCVINFO, SCTP_SNDINFO, SCTP_SOCKOPT_BINDX_ADD,
    SCTP_SOCKOPT_CONNECTX, SCTP_STATUS, SOL_SCTP, SctpEvent, SctpInitMsg, SctpPaddrInfo,
    SctpRcvInfo, SctpSackInfo, SctpSndInfo, SctpStatus,
};
use crate::sys::sockaddr::{from_raw, pack, parse_packed, to_raw};
use crate::sys::{
    AddressFamily, Errno, EventKind, InitMsg, RcvInfo, Received, SackInfo, SctpSys, SndInfo,
    SysResult,
};

use libc::{
    AF_INET, AF_INET6, EAFNOSUPPORT, EINPROGRESS, EINVAL, IPPROTO_SCTP, MSG_EOR, MSG_NOSIGNAL,
    SHUT_RD, SHUT_RDWR, SHUT_WR, SO_ERROR, SO_LINGER, SOCK_CLOEXEC, SOCK_NONBLOCK, SOCK_STREAM,
    SOL_SOCKET, c_int, c_void, iovec, linger, msghdr, sockaddr, sockaddr_in6, sockaddr_storage,
    socklen_t,
};
use std::mem;
use std::net::{Shutdown, SocketAddr};
use std::os::fd::RawFd;
use std::ptr;
use std::time::Duration;

/// [`SctpSys`] backed by the Linux kernel SCTP stack.
#[derive(Clone, Copy, Debug, Default)]
pub struct LinuxSctp;

impl LinuxSctp {
    pub fn new() -> Self {
        Self
    }
}

fn check(ret: c_int) -> SysResult<c_int> {
    if ret < 0 { Err(Errno::last()) } else { Ok(ret) }
}

/// Caller must ensure `T` is the correct type for `level` and `name`.
unsafe fn setsockopt<T>(fd: RawFd, level: c_int, name: c_int, payload: &T) -> SysResult<()> {
    let ret = unsafe {
        libc::setsockopt(
            fd,
            level,
            name,
            payload as *const T as *const c_void,
            mem::size_of::<T>() as socklen_t,
        )
    };

    check(ret).map(|_| ())
}

/// Caller must ensure `T` is the correct type for `level` and `name`.
///
/// `value` is passed in and filled by the kernel, which lets options such as
/// `SCTP_STATUS` take input fields.
unsafe fn getsockopt<T>(fd: RawFd, level: c_int, name: c_int, value: &mut T) -> SysResult<()> {
    let mut length = mem::size_of::<T>() as socklen_t;
    let ret = unsafe {
        libc::getsockopt(
            fd,
            level,
            name,
            value as *mut T as *mut c_void,
            &mut length,
        )
    };

    check(ret).map(|_| ())
}

fn path_info(raw: &SctpPaddrInfo, fallback: Option<SocketAddr>) -> Option<PathInfo> {
    let storage = raw.spinfo_address;
    let address = from_raw(&storage).or(fallback)?;

    Some(PathInfo {
        address,
        state: PathState::from_raw(raw.spinfo_state),
        cwnd: raw.spinfo_cwnd,
        srtt: raw.spinfo_srtt,
        rto: raw.spinfo_rto,
        mtu: raw.spinfo_mtu,
    })
}

impl LinuxSctp {
    fn name(
        &self,
        fd: RawFd,
        call: unsafe extern "C" fn(c_int, *mut sockaddr, *mut socklen_t) -> c_int,
    ) -> SysResult<SocketAddr> {
        let mut storage: sockaddr_storage = unsafe { mem::zeroed() };
        let mut length = mem::size_of::<sockaddr_storage>() as socklen_t;

        check(unsafe { call(fd, &mut storage as *mut _ as *mut sockaddr, &mut length) })?;

        from_raw(&storage).ok_or(Errno(EAFNOSUPPORT))
    }

    fn addresses(&self, fd: RawFd, option: c_int) -> SysResult<Vec<SocketAddr>> {
        // struct sctp_getaddrs { sctp_assoc_t assoc_id; __u32 addr_num; packed addrs }
        let header = mem::size_of::<i32>() + mem::size_of::<u32>();
        let mut buffer = vec![0u8; header + MAX_ADDRESSES * mem::size_of::<sockaddr_in6>()];
        let mut length = buffer.len() as socklen_t;

        check(unsafe {
            libc::getsockopt(
                fd,
                SOL_SCTP,
                option,
                buffer.as_mut_ptr() as *mut c_void,
                &mut length,
            )
        })?;

        let count = u32::from_ne_bytes([buffer[4], buffer[5], buffer[6], buffer[7]]) as usize;
        let packed = buffer
            .get(header..length as usize)
            .ok_or(Errno(EINVAL))?;

        parse_packed(packed, count).ok_or(Errno(EINVAL))
    }

    fn set_flag(&self, fd: RawFd, level: c_int, name: c_int, on: bool) -> SysResult<()> {
        let value: c_int = on as c_int;
        unsafe { setsockopt(fd, level, name, &value) }
    }
}

impl SctpSys for LinuxSctp {
    fn create_socket(&self, family: AddressFamily) -> SysResult<RawFd> {
        let domain = match family {
            AddressFamily::Ipv4 => AF_INET,
            AddressFamily::Ipv6 => AF_INET6,
        };

        check(unsafe {
            libc::socket(
                domain,
                SOCK_STREAM | SOCK_NONBLOCK | SOCK_CLOEXEC,
                IPPROTO_SCTP,
            )
        })
    }

    fn bindx(&self, fd: RawFd, addresses: &[SocketAddr]) -> SysResult<()> {
        if addresses.is_empty() {
            return Err(Errno(EINVAL));
        }

        let packed = pack(addresses);
        let ret = unsafe {
            libc::setsockopt(
                fd,
                SOL_SCTP,
                SCTP_SOCKOPT_BINDX_ADD,
                packed.as_ptr() as *const c_void,
                packed.len() as socklen_t,
            )
        };

        check(ret).map(|_| ())
    }

    fn connectx(&self, fd: RawFd, addresses: &[SocketAddr]) -> SysResult<()> {
        if addresses.is_empty() {
            return Err(Errno(EINVAL));
        }

        let packed = pack(addresses);
        let ret = unsafe {
            libc::setsockopt(
                fd,
                SOL_SCTP,
                SCTP_SOCKOPT_CONNECTX,
                packed.as_ptr() as *const c_void,
                packed.len() as socklen_t,
            )
        };

        match check(ret) {
            Ok(_) => Ok(()),
            Err(errno) if errno.0 == EINPROGRESS || errno.is_would_block() => Ok(()),
            Err(errno) => Err(errno),
        }
    }

    fn listen(&self, fd: RawFd, backlog: i32) -> SysResult<()> {
        check(unsafe { libc::listen(fd, backlog) }).map(|_| ())
    }

    fn accept(&self, fd: RawFd) -> SysResult<(RawFd, SocketAddr)> {
        let mut storage: sockaddr_storage = unsafe { mem::zeroed() };
        let mut length = mem::size_of::<sockaddr_storage>() as socklen_t;

        let client = check(unsafe {
            libc::accept4(
                fd,
                &mut storage as *mut _ as *mut sockaddr,
                &mut length,
                SOCK_NONBLOCK | SOCK_CLOEXEC,
            )
        })?;

        match from_raw(&storage) {
            Some(address) => Ok((client, address)),
            None => {
                unsafe { libc::close(client) };
                Err(Errno(EAFNOSUPPORT))
            }
        }
    }

    fn recv_message(&self, fd: RawFd, buffer: &mut [u8]) -> SysResult<Received> {
        let mut iov = iovec {
            iov_base: buffer.as_mut_ptr() as *mut c_void,
            iov_len: buffer.len(),
        };
        // u64 storage keeps the control buffer aligned for cmsghdr
        let mut control = [0u64; 16];

        let mut header: msghdr = unsafe { mem::zeroed() };
        header.msg_iov = &mut iov;
        header.msg_iovlen = 1;
        header.msg_control = control.as_mut_ptr() as *mut c_void;
        header.msg_controllen = mem::size_of_val(&control) as _;

        let received = unsafe { libc::recvmsg(fd, &mut header, 0) };
        if received < 0 {
            return Err(Errno::last());
        }

        let mut rcv_info = None;
        let mut cmsg = unsafe { libc::CMSG_FIRSTHDR(&header) };
        while !cmsg.is_null() {
            let (level, kind) = unsafe { ((*cmsg).cmsg_level, (*cmsg).cmsg_type) };

            if level == SOL_SCTP && kind == SCTP_RCVINFO {
                let raw = unsafe {
                    ptr::read_unaligned(libc::CMSG_DATA(cmsg) as *const SctpRcvInfo)
                };

                rcv_info = Some(RcvInfo {
                    stream_id: raw.rcv_sid,
                    ssn: raw.rcv_ssn,
                    flags: raw.rcv_flags,
                    ppid: u32::from_be(raw.rcv_ppid),
                    tsn: raw.rcv_tsn,
                    cumulative_tsn: raw.rcv_cumtsn,
                    context: raw.rcv_context,
                    assoc_id: raw.rcv_assoc_id,
                });
            }

            cmsg = unsafe { libc::CMSG_NXTHDR(&header, cmsg) };
        }

        Ok(Received {
            len: received as usize,
            end_of_record: header.msg_flags & MSG_EOR != 0,
            notification: header.msg_flags & MSG_NOTIFICATION != 0,
            rcv_info,
        })
    }

    fn send_message(&self, fd: RawFd, payload: &[u8], info: &SndInfo) -> SysResult<usize> {
        let mut iov = iovec {
            iov_base: payload.as_ptr() as *mut c_void,
            iov_len: payload.len(),
        };
        let mut control = [0u64; 8];
        let info_len = mem::size_of::<SctpSndInfo>() as u32;

        let mut header: msghdr = unsafe { mem::zeroed() };
        header.msg_iov = &mut iov;
        header.msg_iovlen = 1;
        header.msg_control = control.as_mut_ptr() as *mut c_void;
        header.msg_controllen = unsafe { libc::CMSG_SPACE(info_len) } as _;

        let raw = SctpSndInfo {
            snd_sid: info.stream_id,
            snd_flags: info.flags,
            snd_ppid: info.ppid.to_be(),
            snd_context: info.context,
            snd_assoc_id: 0,
        };

        unsafe {
            let cmsg = libc::CMSG_FIRSTHDR(&header);
            (*cmsg).cmsg_level = SOL_SCTP;
            (*cmsg).cmsg_type = SCTP_SNDINFO;
            (*cmsg).cmsg_len = libc::CMSG_LEN(info_len) as _;
            ptr::write_unaligned(libc::CMSG_DATA(cmsg) as *mut SctpSndInfo, raw);
        }

        let sent = unsafe { libc::sendmsg(fd, &header, MSG_NOSIGNAL) };
        if sent < 0 {
            return Err(Errno::last());
        }

        Ok(sent as usize)
    }

    fn pending_error(&self, fd: RawFd) -> SysResult<Option<Errno>> {
        let mut value: c_int = 0;
        unsafe { getsockopt(fd, SOL_SOCKET, SO_ERROR, &mut value)? };

        Ok((value != 0).then_some(Errno(value)))
    }

    fn local_name(&self, fd: RawFd) -> SysResult<SocketAddr> {
        self.name(fd, libc::getsockname)
    }

    fn peer_name(&self, fd: RawFd) -> SysResult<SocketAddr> {
        self.name(fd, libc::getpeername)
    }

    fn local_addresses(&self, fd: RawFd) -> SysResult<Vec<SocketAddr>> {
        self.addresses(fd, SCTP_GET_LOCAL_ADDRS)
    }

    fn peer_addresses(&self, fd: RawFd) -> SysResult<Vec<SocketAddr>> {
        self.addresses(fd, SCTP_GET_PEER_ADDRS)
    }

    fn peer_path_info(&self, fd: RawFd, address: SocketAddr) -> SysResult<PathInfo> {
        let mut raw: SctpPaddrInfo = unsafe { mem::zeroed() };
        raw.spinfo_address = to_raw(&address).0;

        unsafe { getsockopt(fd, SOL_SCTP, SCTP_GET_PEER_ADDR_INFO, &mut raw)? };

        path_info(&raw, Some(address)).ok_or(Errno(EAFNOSUPPORT))
    }

    fn status(&self, fd: RawFd) -> SysResult<AssociationStatus> {
        let mut raw: SctpStatus = unsafe { mem::zeroed() };
        unsafe { getsockopt(fd, SOL_SCTP, SCTP_STATUS, &mut raw)? };

        Ok(AssociationStatus {
            state: AssociationState::from_raw(raw.sstat_state),
            receive_window: raw.sstat_rwnd,
            unacked_data: raw.sstat_unackdata,
            pending_data: raw.sstat_penddata,
            incoming_streams: raw.sstat_instrms,
            outgoing_streams: raw.sstat_outstrms,
            fragmentation_point: raw.sstat_fragmentation_point,
            primary: path_info(&raw.sstat_primary, None),
        })
    }

    fn set_sack_info(&self, fd: RawFd, sack: SackInfo) -> SysResult<()> {
        let raw = SctpSackInfo {
            sack_assoc_id: SCTP_ALL_ASSOC,
            sack_delay: sack.delay,
            sack_freq: sack.freq,
        };

        unsafe { setsockopt(fd, SOL_SCTP, SCTP_DELAYED_ACK_TIME, &raw) }
    }

    fn set_init_msg(&self, fd: RawFd, init: InitMsg) -> SysResult<()> {
        let raw = SctpInitMsg {
            sinit_num_ostreams: init.outgoing_streams,
            sinit_max_instreams: init.max_incoming_streams,
            sinit_max_attempts: init.max_attempts,
            sinit_max_init_timeo: init.max_init_timeout,
        };

        unsafe { setsockopt(fd, SOL_SCTP, SCTP_INITMSG, &raw) }
    }

    fn set_nodelay(&self, fd: RawFd, nodelay: bool) -> SysResult<()> {
        self.set_flag(fd, SOL_SCTP, SCTP_NODELAY, nodelay)
    }

    fn set_linger(&self, fd: RawFd, duration: Option<Duration>) -> SysResult<()> {
        let raw = linger {
            l_onoff: duration.is_some() as c_int,
            l_linger: duration.map(|d| d.as_secs() as c_int).unwrap_or(0),
        };

        unsafe { setsockopt(fd, SOL_SOCKET, SO_LINGER, &raw) }
    }

    fn subscribe_event(&self, fd: RawFd, event: EventKind, on: bool) -> SysResult<()> {
        let raw = SctpEvent {
            se_assoc_id: 0,
            se_type: event.raw(),
            se_on: on as u8,
        };

        unsafe { setsockopt(fd, SOL_SCTP, SCTP_EVENT, &raw) }
    }

    fn set_recv_rcvinfo(&self, fd: RawFd, on: bool) -> SysResult<()> {
        self.set_flag(fd, SOL_SCTP, SCTP_RECVRCVINFO, on)
    }

    fn shutdown(&self, fd: RawFd, how: Shutdown) -> SysResult<()> {
        let how = match how {
            Shutdown::Read => SHUT_RD,
            Shutdown::Write => SHUT_WR,
            Shutdown::Both => SHUT_RDWR,
        };

        check(unsafe { libc::shutdown(fd, how) }).map(|_| ())
    }

    fn close(&self, fd: RawFd) -> SysResult<()> {
        check(unsafe { libc::close(fd) }).map(|_| ())
    }
}
