//! Callback-driven SCTP associations on a single-threaded epoll event loop.
//!
//! This crate drives one-to-one SCTP sockets (Linux kernel SCTP) without
//! threads or futures: every association is a small state machine stepped by
//! an event loop, and user code reacts through an [`AssociationHandler`].
//! Messages keep their boundaries, carry a stream id and a payload protocol
//! identifier, and both peers may be multi-homed.
//!
//! # Architecture
//!
//! - **EventLoop**: Runs readiness callbacks, deferred tasks and timers until no work is left
//! - **Scheduler**: Budgeted FIFO of deferred tasks, drained several times per turn
//! - **Reactor**: Owns the epoll instance; [`Readiness`](reactor::Readiness) subscriptions arm it
//! - **Timer**: One-shot and interval callbacks that may be unref'd
//! - **Association**: Per-socket engine; one syscall per step, pull-based reads, queued writes
//! - **AddressTracker**: Atomic snapshots of local and remote addresses
//! - **SctpListener** / **connect**: Endpoints producing associations
//! - **SctpSys**: The socket syscall surface, implemented by [`LinuxSctp`](sys::LinuxSctp)
//! - **EventLoopBuilder**: Fluent builder pattern for event loop instantiation

mod builder;
pub mod association;
pub mod config;
pub mod error;
pub mod net;
pub mod reactor;
pub mod runtime;
pub mod sys;
mod timer;

pub use association::{
    AddressSnapshot, Association, AssociationHandler, AssociationState, AssociationStatus,
    Completion, Message, Notification, PathInfo, PathState, Phase,
};
pub use builder::EventLoopBuilder;
pub use config::{AssociationConfig, ConnectOptions, ListenOptions, SocketOptions};
pub use error::{Error, Result};
pub use runtime::{EventLoop, Handle, ReentrancyGuard, Scheduled};
pub use timer::TimerHandle;
