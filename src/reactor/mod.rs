//! Event-driven readiness reactor.
//!
//! This module provides readiness notification on top of epoll. It includes:
//! - [`core`]: the reactor owning the epoll instance and the callback registry
//! - [`event`]: `epoll_event` wrappers
//! - [`readiness`]: the per-descriptor subscription used by associations and
//!   listeners

pub(crate) mod core;
pub(crate) mod event;
pub mod readiness;

pub use readiness::{Interest, Readiness, ReadinessEvent};
