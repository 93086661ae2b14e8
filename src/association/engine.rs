//! Per-association I/O engine.
//!
//! The engine owns the socket and everything that changes when the socket is
//! touched: the pull flag, the write queue, the readiness hints and the
//! lifecycle flags. All socket syscalls for an association happen in
//! [`Inner::step`], which runs from the scheduler, never nested, and performs
//! at most one successful I/O operation before it yields:
//!
//! ```text
//! readiness ──> on_readiness ──> schedule ──> step ──> one syscall
//!     ^                                        │
//!     └──────── set_interest (no progress) ────┤
//!                schedule again (progress) <───┘
//! ```
//!
//! Handler signals and write completions produced inside a step are queued
//! and delivered by [`Inner::dispatch`] once the step has returned, so user
//! code never runs while engine state is borrowed.

use crate::association::notification::Notification;
use crate::association::queue::{Completion, Message, WriteQueue};
use crate::association::tracker::{AddressSnapshot, AddressTracker};
use crate::association::{Association, AssociationHandler, Phase};
use crate::config::AssociationConfig;
use crate::error::{Error, Result};
use crate::reactor::{Interest, Readiness, ReadinessEvent};
use crate::runtime::{Handle, ReentrancyGuard, Scheduled};
use crate::sys::{SctpSys, SndInfo};
use crate::timer::TimerHandle;

use log::{debug, trace, warn};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::net::{Shutdown, SocketAddr};
use std::os::fd::RawFd;
use std::rc::Rc;
use std::time::Duration;

pub(crate) enum Signal {
    Connect,
    Data(Message),
    Notification(Notification),
    AddressChange(AddressSnapshot),
    End,
    Error(Error),
    Close,
}

pub(crate) struct State {
    pub(crate) fd: Option<RawFd>,
    pub(crate) connected: bool,
    pub(crate) local_ended: bool,
    pub(crate) remote_ended: bool,
    pub(crate) end_requested: bool,
    pub(crate) destroyed: bool,
    poll_error: Option<i32>,
    pub(crate) wants_data: bool,
    socket_has_more: bool,
    socket_accepts_more: bool,
    pub(crate) queue: WriteQueue,
    end_callbacks: Vec<Completion>,
    receive_buffer: Vec<u8>,
    readiness: Option<Readiness>,
    scheduled: Option<Scheduled>,
    readiness_callbacks: u32,
    refresh_timer: Option<TimerHandle>,
}

impl State {
    pub(crate) fn phase(&self) -> Phase {
        if self.destroyed {
            Phase::Destroyed
        } else if !self.connected {
            Phase::Connecting
        } else if self.remote_ended {
            Phase::Ended
        } else if self.local_ended {
            Phase::LocallyShutdown
        } else {
            Phase::Established
        }
    }

    fn interest(&self) -> Interest {
        Interest {
            readable: (self.wants_data || self.end_requested) && !self.remote_ended,
            writable: !self.connected || !self.queue.is_empty(),
        }
    }
}

pub(crate) struct Inner {
    pub(crate) handle: Handle,
    pub(crate) sys: Rc<dyn SctpSys>,
    config: AssociationConfig,
    guard: ReentrancyGuard,
    pub(crate) state: RefCell<State>,
    pub(crate) tracker: RefCell<AddressTracker>,
    handler: RefCell<Option<Box<dyn AssociationHandler>>>,
    signals: RefCell<VecDeque<Signal>>,
    completions: RefCell<VecDeque<(Completion, Result<()>)>>,
    dispatching: Cell<bool>,
}

struct Dispatching<'a>(&'a Cell<bool>);

impl Drop for Dispatching<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl Inner {
    /// Wraps `fd` into a running engine.
    ///
    /// # Arguments
    /// * `connected` - `false` for a socket whose connect is still in
    ///   progress; the engine then waits for writability and checks
    ///   `SO_ERROR` before doing any other I/O
    /// * `remote` - The address the peer is initially known by
    ///
    /// # Returns
    /// The engine, or an error if the local address cannot be read. The caller
    /// keeps ownership of `fd` on error.
    pub(crate) fn create(
        handle: &Handle,
        sys: Rc<dyn SctpSys>,
        fd: RawFd,
        connected: bool,
        remote: Option<SocketAddr>,
        config: AssociationConfig,
    ) -> Result<Rc<Self>> {
        let local = sys
            .local_name(fd)
            .map_err(|errno| Error::from_errno("getsockname", errno))?;

        let inner = Rc::new(Self {
            handle: handle.clone(),
            sys,
            guard: ReentrancyGuard::new(),
            state: RefCell::new(State {
                fd: Some(fd),
                connected,
                local_ended: false,
                remote_ended: false,
                end_requested: false,
                destroyed: false,
                poll_error: None,
                wants_data: false,
                socket_has_more: true,
                socket_accepts_more: connected,
                queue: WriteQueue::default(),
                end_callbacks: Vec::new(),
                receive_buffer: vec![0; config.max_message_size.max(1)],
                readiness: None,
                scheduled: None,
                readiness_callbacks: 0,
                refresh_timer: None,
            }),
            tracker: RefCell::new(AddressTracker::new(AddressSnapshot::initial(local, remote))),
            config,
            handler: RefCell::new(None),
            signals: RefCell::new(VecDeque::new()),
            completions: RefCell::new(VecDeque::new()),
            dispatching: Cell::new(false),
        });

        // The subscription keeps the engine alive until destroy closes it.
        let engine = inner.clone();
        let readiness = handle.subscribe(fd, move |event| engine.on_readiness(event));

        {
            let mut state = inner.state.borrow_mut();
            state.readiness = Some(readiness);

            if connected {
                inner.start_refresh_timer(&mut state);
            }
            inner.schedule_step(&mut state);
        }

        debug!("fd {fd}: association created (connected: {connected}, local: {local})");
        Ok(inner)
    }

    fn on_readiness(self: &Rc<Self>, event: ReadinessEvent) {
        let mut state = self.state.borrow_mut();
        if state.destroyed {
            return;
        }

        state.readiness_callbacks += 1;

        if state.readiness_callbacks > 1 {
            // the pending step has not run yet; stop polling until it does
            let fd = state.fd;
            trace!("fd {fd:?}: readiness storm, disarming");
            if let Some(readiness) = state.readiness.as_mut()
                && let Err(errno) = readiness.set_interest(Interest::NONE)
            {
                trace!("fd {fd:?}: disarm failed: {errno}");
            }
            return;
        }

        if event.status != 0 {
            state.poll_error = Some(event.status);
        }
        if event.readable {
            state.socket_has_more = true;
        }
        if event.writable {
            state.socket_accepts_more = true;
        }

        self.schedule_step(&mut state);
    }

    pub(crate) fn schedule_step(self: &Rc<Self>, state: &mut State) {
        if state.destroyed {
            return;
        }

        if state
            .scheduled
            .as_ref()
            .is_some_and(|scheduled| scheduled.is_pending())
        {
            return;
        }

        let engine = self.clone();
        state.scheduled = Some(self.handle.schedule(move || engine.step()));
    }

    /// Runs one engine step, then delivers whatever it produced.
    ///
    /// # Panics
    /// Panics with `"reentrant call detected"` if called while a step is
    /// already running.
    pub(crate) fn step(self: &Rc<Self>) {
        {
            let _entered = self.guard.enter();
            let mut state = self.state.borrow_mut();

            if !state.destroyed {
                state.readiness_callbacks = 0;
                state.scheduled = None;

                let progress = self.advance(&mut state);
                trace!("fd {:?}: step (progress: {progress})", state.fd);

                if !state.destroyed {
                    if progress {
                        self.schedule_step(&mut state);
                    } else {
                        self.update_interest(&mut state);
                    }
                }
            }
        }

        self.dispatch();
    }

    fn advance(self: &Rc<Self>, state: &mut State) -> bool {
        if let Some(status) = state.poll_error.take() {
            self.fail_from_poll(state, status);
            return true;
        }

        if !state.connected {
            return self.try_connect(state);
        }

        if self.try_receive(state) {
            return true;
        }

        if self.try_send(state) {
            return true;
        }

        self.try_finish(state)
    }

    fn fail_from_poll(&self, state: &mut State, status: i32) {
        let Some(fd) = state.fd else {
            return;
        };

        let error = match self.sys.pending_error(fd) {
            Ok(Some(errno)) => Error::from_errno("poll", errno),
            Ok(None) => Error::Os {
                operation: "poll",
                code: status.abs(),
            },
            Err(errno) => Error::from_errno("getsockopt(SO_ERROR)", errno),
        };

        self.destroy_locked(state, Some(error));
    }

    fn try_connect(self: &Rc<Self>, state: &mut State) -> bool {
        if !state.socket_accepts_more {
            return false;
        }

        let Some(fd) = state.fd else {
            return false;
        };

        match self.sys.pending_error(fd) {
            Err(errno) => {
                self.destroy_locked(state, Some(Error::from_errno("getsockopt(SO_ERROR)", errno)));
            }
            Ok(Some(errno)) => {
                self.destroy_locked(state, Some(Error::from_errno("connect", errno)));
            }
            Ok(None) => {
                debug!("fd {fd}: connected");
                state.connected = true;
                state.socket_has_more = true;
                self.emit(Signal::Connect);
                self.start_refresh_timer(state);

                // an accessor may have gathered while connecting; that
                // snapshot has no remote part yet
                if self.tracker.borrow().is_gathered() {
                    self.schedule_refresh();
                }
            }
        }

        true
    }

    fn try_receive(self: &Rc<Self>, state: &mut State) -> bool {
        if !(state.wants_data || state.end_requested)
            || state.remote_ended
            || !state.socket_has_more
        {
            return false;
        }

        let Some(fd) = state.fd else {
            return false;
        };

        let received = match self.sys.recv_message(fd, &mut state.receive_buffer) {
            Ok(received) => received,
            Err(errno) if errno.is_would_block() => {
                state.socket_has_more = false;
                return false;
            }
            Err(errno) => {
                self.destroy_locked(state, Some(Error::from_errno("recvmsg", errno)));
                return true;
            }
        };

        if received.len == 0 {
            self.on_remote_end(state);
            return true;
        }

        if !received.end_of_record {
            let error = Error::ProtocolViolation(format!(
                "message did not fit into the {} byte receive buffer (no MSG_EOR)",
                state.receive_buffer.len()
            ));
            self.destroy_locked(state, Some(error));
            return true;
        }

        let bytes = &state.receive_buffer[..received.len];

        if received.notification {
            match Notification::parse(bytes) {
                Ok(notification) => {
                    trace!("fd {fd}: notification {:#06x}", notification.kind());
                    if matches!(notification, Notification::PeerAddressChange(_)) {
                        self.schedule_refresh();
                    }
                    self.emit(Signal::Notification(notification));
                }
                Err(error) => self.destroy_locked(state, Some(error)),
            }
            return true;
        }

        let Some(info) = received.rcv_info else {
            let error = Error::ProtocolViolation("data message without SCTP_RCVINFO".to_owned());
            self.destroy_locked(state, Some(error));
            return true;
        };

        let message = Message {
            payload: bytes.to_vec(),
            stream_id: info.stream_id,
            ppid: info.ppid,
        };

        // each delivered message consumes the pull request
        state.wants_data = false;
        self.emit(Signal::Data(message));

        true
    }

    fn on_remote_end(&self, state: &mut State) {
        debug!("fd {:?}: remote end", state.fd);
        state.remote_ended = true;
        self.emit(Signal::End);

        if state.local_ended {
            self.destroy_locked(state, None);
            return;
        }

        if !self.config.allow_half_open {
            state.end_requested = true;
        }
    }

    fn try_send(&self, state: &mut State) -> bool {
        if state.queue.is_empty() {
            return false;
        }

        if state.remote_ended {
            if let Some(pending) = state.queue.pop_front() {
                self.complete(pending.completion, Err(Error::BrokenPipe));
            }
            return true;
        }

        if !state.socket_accepts_more {
            return false;
        }

        let Some(fd) = state.fd else {
            return false;
        };

        let result = match state.queue.front() {
            Some(pending) => {
                let info = SndInfo {
                    stream_id: pending.message.stream_id,
                    ppid: pending.message.ppid,
                    ..SndInfo::default()
                };
                self.sys.send_message(fd, &pending.message.payload, &info)
            }
            None => return false,
        };

        match result {
            Ok(_) => {
                if let Some(pending) = state.queue.pop_front() {
                    self.complete(pending.completion, Ok(()));
                }
                true
            }
            Err(errno) if errno.is_would_block() => {
                state.socket_accepts_more = false;
                false
            }
            Err(errno) => {
                self.destroy_locked(state, Some(Error::from_errno("sendmsg", errno)));
                true
            }
        }
    }

    fn try_finish(&self, state: &mut State) -> bool {
        if !state.end_requested
            || state.local_ended
            || !state.connected
            || !state.queue.is_empty()
        {
            return false;
        }

        let Some(fd) = state.fd else {
            return false;
        };

        // the peer already shut down; nothing left to tell it
        if !state.remote_ended
            && let Err(errno) = self.sys.shutdown(fd, Shutdown::Write)
        {
            self.destroy_locked(state, Some(Error::from_errno("shutdown", errno)));
            return true;
        }

        debug!("fd {fd}: local end");
        state.local_ended = true;

        for callback in state.end_callbacks.drain(..) {
            self.complete(callback, Ok(()));
        }

        if state.remote_ended {
            self.destroy_locked(state, None);
        }

        true
    }

    fn update_interest(&self, state: &mut State) {
        let interest = state.interest();

        let result = match state.readiness.as_mut() {
            Some(readiness) => readiness.set_interest(interest),
            None => Ok(()),
        };

        if let Err(errno) = result {
            self.destroy_locked(state, Some(Error::from_errno("epoll_ctl", errno)));
        }
    }

    fn start_refresh_timer(self: &Rc<Self>, state: &mut State) {
        let Some(interval) = self.config.address_refresh_interval else {
            return;
        };

        let engine = self.clone();
        let timer = self
            .handle
            .set_interval(interval, move || engine.refresh_addresses());
        timer.unref();

        state.refresh_timer = Some(timer);
    }

    fn schedule_refresh(self: &Rc<Self>) {
        let engine = self.clone();
        self.handle.schedule(move || engine.refresh_addresses());
    }

    /// Re-gathers the address snapshot and reports a change.
    pub(crate) fn refresh_addresses(self: &Rc<Self>) {
        let (fd, connected) = {
            let state = self.state.borrow();
            match state.fd {
                Some(fd) if !state.destroyed => (fd, state.connected),
                _ => return,
            }
        };

        let changed = self
            .tracker
            .borrow_mut()
            .refresh(self.sys.as_ref(), fd, connected);

        if let Some(snapshot) = changed {
            debug!("fd {fd}: addresses changed");
            self.emit(Signal::AddressChange(snapshot));
            self.dispatch();
        }
    }

    /// Gathers addresses on first use; later calls return the current snapshot.
    pub(crate) fn snapshot(self: &Rc<Self>, method: &'static str) -> Result<AddressSnapshot> {
        let (fd, connected) = {
            let state = self.state.borrow();
            match state.fd {
                Some(fd) if !state.destroyed => (fd, state.connected),
                _ => return Err(Error::Destroyed { method }),
            }
        };

        if !self.tracker.borrow().is_gathered() {
            let changed = self
                .tracker
                .borrow_mut()
                .refresh(self.sys.as_ref(), fd, connected);

            if let Some(snapshot) = changed {
                self.emit(Signal::AddressChange(snapshot));
                let engine = self.clone();
                self.handle.schedule(move || engine.dispatch());
            }
        }

        Ok(self.tracker.borrow().snapshot().clone())
    }

    /// Tears the association down. Idempotent.
    ///
    /// Before a graceful shutdown was performed the socket is closed with a
    /// zero linger so the peer sees an abort. Queued writes and pending end
    /// requests fail in submission order with `error` (or a
    /// [`Error::Destroyed`] when there is none); then `error` and `close` are
    /// signalled.
    pub(crate) fn destroy_locked(&self, state: &mut State, error: Option<Error>) {
        if state.destroyed {
            return;
        }
        state.destroyed = true;

        if let Some(scheduled) = state.scheduled.take() {
            scheduled.cancel();
        }
        if let Some(timer) = state.refresh_timer.take() {
            timer.cancel();
        }
        if let Some(mut readiness) = state.readiness.take() {
            readiness.close();
        }

        if let Some(fd) = state.fd.take() {
            if !state.local_ended
                && let Err(errno) = self.sys.set_linger(fd, Some(Duration::ZERO))
            {
                warn!("fd {fd}: failed to set zero linger before close: {errno}");
            }

            if let Err(errno) = self.sys.close(fd) {
                warn!("fd {fd}: close failed: {errno}");
            }

            match &error {
                Some(error) => debug!("fd {fd}: destroyed: {error}"),
                None => debug!("fd {fd}: destroyed"),
            }
        }

        for pending in state.queue.drain() {
            let failure = error.clone().unwrap_or(Error::Destroyed { method: "write" });
            self.complete(pending.completion, Err(failure));
        }
        for callback in state.end_callbacks.drain(..) {
            let failure = error.clone().unwrap_or(Error::Destroyed { method: "end" });
            self.complete(callback, Err(failure));
        }

        if let Some(error) = error {
            self.emit(Signal::Error(error));
        }
        self.emit(Signal::Close);
    }

    pub(crate) fn push_end_callback(&self, state: &mut State, callback: Completion) {
        if state.local_ended {
            self.complete(callback, Ok(()));
        } else {
            state.end_requested = true;
            state.end_callbacks.push(callback);
        }
    }

    fn emit(&self, signal: Signal) {
        self.signals.borrow_mut().push_back(signal);
    }

    fn complete(&self, callback: Completion, result: Result<()>) {
        self.completions.borrow_mut().push_back((callback, result));
    }

    pub(crate) fn set_handler(self: &Rc<Self>, handler: Box<dyn AssociationHandler>) {
        *self.handler.borrow_mut() = Some(handler);
        self.dispatch();
    }

    /// Delivers queued completions, then queued signals in order.
    ///
    /// Never nests: a call made while delivering returns immediately and the
    /// outer call picks up whatever was queued. Signals stay buffered while no
    /// handler is installed; completions are always delivered.
    pub(crate) fn dispatch(self: &Rc<Self>) {
        if self.dispatching.replace(true) {
            return;
        }
        let _dispatching = Dispatching(&self.dispatching);
        let association = Association::from_inner(self.clone());

        loop {
            let completion = self.completions.borrow_mut().pop_front();
            if let Some((callback, result)) = completion {
                callback(result);
                continue;
            }

            let Some(mut handler) = self.handler.borrow_mut().take() else {
                break;
            };

            let signal = self.signals.borrow_mut().pop_front();
            let Some(signal) = signal else {
                self.restore_handler(handler);
                break;
            };

            let closing = matches!(signal, Signal::Close);
            self.deliver(&association, handler.as_mut(), signal);

            // nothing follows close; dropping the handler breaks cycles
            // through handlers that hold their association
            if !closing {
                self.restore_handler(handler);
            }
        }
    }

    fn restore_handler(&self, handler: Box<dyn AssociationHandler>) {
        let mut slot = self.handler.borrow_mut();
        if slot.is_none() {
            *slot = Some(handler);
        }
    }

    fn deliver(
        self: &Rc<Self>,
        association: &Association,
        handler: &mut dyn AssociationHandler,
        signal: Signal,
    ) {
        match signal {
            Signal::Connect => handler.on_connect(association),
            Signal::Data(message) => {
                if handler.on_data(association, message) {
                    self.request_data();
                }
            }
            Signal::Notification(notification) => {
                handler.on_notification(association, notification)
            }
            Signal::AddressChange(snapshot) => handler.on_address_change(association, snapshot),
            Signal::End => handler.on_end(association),
            Signal::Error(error) => handler.on_error(association, error),
            Signal::Close => handler.on_close(association),
        }
    }

    /// Renews the pull request.
    pub(crate) fn request_data(self: &Rc<Self>) {
        let mut state = self.state.borrow_mut();
        if state.destroyed || state.remote_ended {
            return;
        }

        state.wants_data = true;
        self.schedule_step(&mut state);
    }
}
