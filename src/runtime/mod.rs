//! Event loop subsystem modules.

pub(crate) mod context;
mod core;
pub mod guard;
pub mod scheduler;

pub use core::{EventLoop, Handle};
pub use guard::ReentrancyGuard;
pub use scheduler::Scheduled;
