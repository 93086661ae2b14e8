#![allow(dead_code)]

use sctp_reactor::sys::{
    AddressFamily, Errno, EventKind, InitMsg, Received, RcvInfo, SackInfo, SctpSys, SndInfo,
    SysResult,
};
use sctp_reactor::{
    AddressSnapshot, Association, AssociationConfig, AssociationHandler, AssociationStatus,
    Error, EventLoop, Message, Notification, PathInfo, PathState,
};

use std::cell::RefCell;
use std::collections::VecDeque;
use std::net::{Shutdown, SocketAddr};
use std::os::fd::RawFd;
use std::rc::Rc;
use std::time::{Duration, Instant};

pub fn local() -> SocketAddr {
    "10.0.0.1:3868".parse().unwrap()
}

pub fn peer() -> SocketAddr {
    "10.0.0.2:3868".parse().unwrap()
}

pub fn second_peer() -> SocketAddr {
    "10.0.1.2:3868".parse().unwrap()
}

pub const SCTP_PEER_ADDR_CHANGE: u16 = 0x8002;

pub fn notification_header(kind: u16, length: u32) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&kind.to_ne_bytes());
    bytes.extend_from_slice(&0u16.to_ne_bytes());
    bytes.extend_from_slice(&length.to_ne_bytes());
    bytes
}

pub fn peer_address_change(address: SocketAddr, state: i32, error: i32) -> Vec<u8> {
    let mut bytes = notification_header(SCTP_PEER_ADDR_CHANGE, 148);

    let mut storage = [0u8; 128];
    if let SocketAddr::V4(v4) = address {
        storage[0..2].copy_from_slice(&(libc::AF_INET as u16).to_ne_bytes());
        storage[2..4].copy_from_slice(&v4.port().to_be_bytes());
        storage[4..8].copy_from_slice(&v4.ip().octets());
    }
    bytes.extend_from_slice(&storage);
    bytes.extend_from_slice(&state.to_ne_bytes());
    bytes.extend_from_slice(&error.to_ne_bytes());
    bytes.extend_from_slice(&7i32.to_ne_bytes());

    bytes
}

/// Scripted kernel.
///
/// Descriptors are eventfds holding a non-zero counter, so epoll always
/// reports them readable and writable; what the engine actually sees is
/// decided by the scripted syscall results.
#[derive(Default)]
pub struct MockState {
    /// Consumed front to back; an empty script means `EAGAIN`.
    pub recv: VecDeque<SysResult<(Vec<u8>, Received)>>,
    /// Consumed front to back; an empty script means the send succeeds.
    pub send: VecDeque<SysResult<()>>,
    pub send_attempts: usize,
    pub sent: Vec<(Vec<u8>, SndInfo)>,
    pub pending_error: Option<Errno>,
    pub local_addresses: Vec<SocketAddr>,
    pub peer_addresses: Vec<SocketAddr>,
    pub fail_peer_addresses: bool,
    pub peer_address_queries: usize,
    pub shutdowns: Vec<RawFd>,
    pub lingered: Vec<RawFd>,
    pub closed: Vec<RawFd>,
    pub close_error: Option<Errno>,
    pub accept: VecDeque<SysResult<(RawFd, SocketAddr)>>,
    pub bound: Vec<Vec<SocketAddr>>,
    pub bind_error: Option<Errno>,
    pub listening: Option<i32>,
}

pub struct MockSys {
    pub state: RefCell<MockState>,
}

impl MockSys {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            state: RefCell::new(MockState {
                local_addresses: vec![local()],
                peer_addresses: vec![peer()],
                ..MockState::default()
            }),
        })
    }

    /// Creates a descriptor epoll can watch.
    pub fn descriptor() -> RawFd {
        let fd = unsafe { libc::eventfd(1, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) };
        assert!(fd >= 0, "eventfd failed");
        fd
    }

    /// Creates the write end of a pipe whose read end is already closed;
    /// epoll reports it with `EPOLLERR` as soon as it is watched.
    pub fn broken_pipe() -> RawFd {
        let mut fds = [0; 2];
        let rc = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_NONBLOCK | libc::O_CLOEXEC) };
        assert_eq!(rc, 0, "pipe2 failed");
        unsafe { libc::close(fds[0]) };
        fds[1]
    }

    pub fn push_data(&self, payload: &[u8], stream_id: u16, ppid: u32) {
        self.state.borrow_mut().recv.push_back(Ok((
            payload.to_vec(),
            Received {
                len: payload.len(),
                end_of_record: true,
                notification: false,
                rcv_info: Some(RcvInfo {
                    stream_id,
                    ppid,
                    ..RcvInfo::default()
                }),
            },
        )));
    }

    pub fn push_notification(&self, bytes: Vec<u8>) {
        let len = bytes.len();
        self.state.borrow_mut().recv.push_back(Ok((
            bytes,
            Received {
                len,
                end_of_record: true,
                notification: true,
                rcv_info: None,
            },
        )));
    }

    pub fn push_received(&self, payload: &[u8], received: Received) {
        self.state
            .borrow_mut()
            .recv
            .push_back(Ok((payload.to_vec(), received)));
    }

    pub fn push_eof(&self) {
        self.state
            .borrow_mut()
            .recv
            .push_back(Ok((Vec::new(), Received::default())));
    }

    pub fn sent_payloads(&self) -> Vec<Vec<u8>> {
        self.state
            .borrow()
            .sent
            .iter()
            .map(|(payload, _)| payload.clone())
            .collect()
    }
}

impl SctpSys for MockSys {
    fn create_socket(&self, _family: AddressFamily) -> SysResult<RawFd> {
        Ok(Self::descriptor())
    }

    fn bindx(&self, _fd: RawFd, addresses: &[SocketAddr]) -> SysResult<()> {
        let mut state = self.state.borrow_mut();
        if let Some(errno) = state.bind_error {
            return Err(errno);
        }
        state.bound.push(addresses.to_vec());
        Ok(())
    }

    fn connectx(&self, _fd: RawFd, _addresses: &[SocketAddr]) -> SysResult<()> {
        Ok(())
    }

    fn listen(&self, _fd: RawFd, backlog: i32) -> SysResult<()> {
        self.state.borrow_mut().listening = Some(backlog);
        Ok(())
    }

    fn accept(&self, _fd: RawFd) -> SysResult<(RawFd, SocketAddr)> {
        self.state
            .borrow_mut()
            .accept
            .pop_front()
            .unwrap_or(Err(Errno(libc::EAGAIN)))
    }

    fn recv_message(&self, _fd: RawFd, buffer: &mut [u8]) -> SysResult<Received> {
        let next = self.state.borrow_mut().recv.pop_front();

        match next {
            Some(Ok((payload, received))) => {
                let len = payload.len().min(buffer.len());
                buffer[..len].copy_from_slice(&payload[..len]);
                Ok(received)
            }
            Some(Err(errno)) => Err(errno),
            None => Err(Errno(libc::EAGAIN)),
        }
    }

    fn send_message(&self, _fd: RawFd, payload: &[u8], info: &SndInfo) -> SysResult<usize> {
        let mut state = self.state.borrow_mut();
        state.send_attempts += 1;

        match state.send.pop_front() {
            Some(Err(errno)) => Err(errno),
            _ => {
                state.sent.push((payload.to_vec(), *info));
                Ok(payload.len())
            }
        }
    }

    fn pending_error(&self, _fd: RawFd) -> SysResult<Option<Errno>> {
        Ok(self.state.borrow().pending_error)
    }

    fn local_name(&self, _fd: RawFd) -> SysResult<SocketAddr> {
        Ok(local())
    }

    fn peer_name(&self, _fd: RawFd) -> SysResult<SocketAddr> {
        Ok(peer())
    }

    fn local_addresses(&self, _fd: RawFd) -> SysResult<Vec<SocketAddr>> {
        Ok(self.state.borrow().local_addresses.clone())
    }

    fn peer_addresses(&self, _fd: RawFd) -> SysResult<Vec<SocketAddr>> {
        let mut state = self.state.borrow_mut();
        state.peer_address_queries += 1;
        if state.fail_peer_addresses {
            return Err(Errno(libc::ENOTCONN));
        }
        Ok(state.peer_addresses.clone())
    }

    fn peer_path_info(&self, _fd: RawFd, address: SocketAddr) -> SysResult<PathInfo> {
        Ok(PathInfo {
            address,
            state: PathState::Active,
            cwnd: 4380,
            srtt: 1,
            rto: 3000,
            mtu: 1500,
        })
    }

    fn status(&self, _fd: RawFd) -> SysResult<AssociationStatus> {
        Err(Errno(libc::ENOTCONN))
    }

    fn set_sack_info(&self, _fd: RawFd, _sack: SackInfo) -> SysResult<()> {
        Ok(())
    }

    fn set_init_msg(&self, _fd: RawFd, _init: InitMsg) -> SysResult<()> {
        Ok(())
    }

    fn set_nodelay(&self, _fd: RawFd, _nodelay: bool) -> SysResult<()> {
        Ok(())
    }

    fn set_linger(&self, fd: RawFd, _linger: Option<Duration>) -> SysResult<()> {
        self.state.borrow_mut().lingered.push(fd);
        Ok(())
    }

    fn subscribe_event(&self, _fd: RawFd, _event: EventKind, _on: bool) -> SysResult<()> {
        Ok(())
    }

    fn set_recv_rcvinfo(&self, _fd: RawFd, _on: bool) -> SysResult<()> {
        Ok(())
    }

    fn shutdown(&self, fd: RawFd, _how: Shutdown) -> SysResult<()> {
        self.state.borrow_mut().shutdowns.push(fd);
        Ok(())
    }

    fn close(&self, fd: RawFd) -> SysResult<()> {
        unsafe { libc::close(fd) };
        let mut state = self.state.borrow_mut();
        state.closed.push(fd);
        match state.close_error {
            Some(errno) => Err(errno),
            None => Ok(()),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Seen {
    Connect,
    Data(Message),
    Notification(u16),
    AddressChange(AddressSnapshot),
    End,
    Error(Error),
    Close,
}

/// Handler that records every event.
pub struct Recorder {
    pub seen: Rc<RefCell<Vec<Seen>>>,
    pub keep_reading: bool,
}

impl Recorder {
    pub fn new(keep_reading: bool) -> (Self, Rc<RefCell<Vec<Seen>>>) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let recorder = Self {
            seen: seen.clone(),
            keep_reading,
        };
        (recorder, seen)
    }
}

impl AssociationHandler for Recorder {
    fn on_connect(&mut self, _association: &Association) {
        self.seen.borrow_mut().push(Seen::Connect);
    }

    fn on_data(&mut self, _association: &Association, message: Message) -> bool {
        self.seen.borrow_mut().push(Seen::Data(message));
        self.keep_reading
    }

    fn on_notification(&mut self, _association: &Association, notification: Notification) {
        self.seen
            .borrow_mut()
            .push(Seen::Notification(notification.kind()));
    }

    fn on_address_change(&mut self, _association: &Association, snapshot: AddressSnapshot) {
        self.seen.borrow_mut().push(Seen::AddressChange(snapshot));
    }

    fn on_end(&mut self, _association: &Association) {
        self.seen.borrow_mut().push(Seen::End);
    }

    fn on_error(&mut self, _association: &Association, error: Error) {
        self.seen.borrow_mut().push(Seen::Error(error));
    }

    fn on_close(&mut self, _association: &Association) {
        self.seen.borrow_mut().push(Seen::Close);
    }
}

/// Config without the background refresh timer.
pub fn quiet_config() -> AssociationConfig {
    AssociationConfig::new().address_refresh_interval(None)
}

/// Creates an association over `sys` on a fresh descriptor.
pub fn associate(
    event_loop: &EventLoop,
    sys: &Rc<MockSys>,
    connected: bool,
    config: AssociationConfig,
) -> Association {
    associate_on(event_loop, sys, MockSys::descriptor(), connected, config)
}

/// Creates an association over `sys` on `fd`.
pub fn associate_on(
    event_loop: &EventLoop,
    sys: &Rc<MockSys>,
    fd: RawFd,
    connected: bool,
    config: AssociationConfig,
) -> Association {
    let sys_object: Rc<dyn SctpSys> = sys.clone();

    Association::from_fd(
        &event_loop.handle(),
        sys_object,
        fd,
        connected,
        Some(peer()),
        config,
    )
    .expect("association")
}

/// `true` while an epoll instance of this process watches `fd`.
pub fn epoll_watches(fd: RawFd) -> bool {
    let needle = fd.to_string();
    let Ok(entries) = std::fs::read_dir("/proc/self/fdinfo") else {
        return false;
    };

    entries.flatten().any(|entry| {
        std::fs::read_to_string(entry.path()).is_ok_and(|info| {
            info.lines().any(|line| {
                let mut fields = line.split_whitespace();
                fields.next() == Some("tfd:") && fields.next() == Some(needle.as_str())
            })
        })
    })
}

/// Turns the loop without blocking until `done` holds.
pub fn drive_until(event_loop: &EventLoop, mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);

    while !done() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        event_loop.run_once().expect("loop turn");
    }
}

/// Turns the loop `turns` times.
pub fn drive(event_loop: &EventLoop, turns: usize) {
    for _ in 0..turns {
        event_loop.run_once().expect("loop turn");
    }
}
