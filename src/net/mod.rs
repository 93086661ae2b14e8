//! SCTP endpoints.
//!
//! This module provides the two ways to obtain an [`Association`]:
//! - [`client`]: [`connect`] starts an outgoing, optionally multi-homed association
//! - [`listener`]: [`SctpListener`] accepts incoming associations
//!
//! # Example
//!
//! ```ignore
//! use sctp_reactor::{EventLoop, ListenOptions, net::SctpListener};
//!
//! let event_loop = EventLoop::new()?;
//! let listener = event_loop.enter(|| {
//!     SctpListener::bind(ListenOptions::new("127.0.0.1:3868".parse()?), |accepted| {
//!         if let Ok(association) = accepted {
//!             println!("New association from {:?}", association.remote_primary_address());
//!         }
//!     })
//! })?;
//! event_loop.run()?;
//! ```
//!
//! [`Association`]: crate::Association

pub mod client;
pub mod listener;

pub use client::{connect, connect_with};
pub use listener::SctpListener;
