//! Fluent builder for EventLoop construction.
//!
//! Provides a builder pattern interface for creating and configuring
//! [`EventLoop`] instances.

use crate::error::Result;
use crate::runtime::EventLoop;

/// Default number of scheduled operations run per loop turn.
pub const DEFAULT_MAX_OPERATIONS_PER_TURN: usize = 500;

/// Default capacity of the `epoll_wait` event buffer.
pub const DEFAULT_MAX_EVENTS: usize = 64;

/// Builder for constructing EventLoop instances with fluent API.
///
/// # Example
/// ```ignore
/// let event_loop = EventLoopBuilder::new()
///     .max_operations_per_turn(100)
///     .build()?;
/// ```
pub struct EventLoopBuilder {
    max_operations_per_turn: usize,
    max_events: usize,
}

impl Default for EventLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLoopBuilder {
    /// Creates a new event loop builder with default settings.
    ///
    /// # Example
    /// ```ignore
    /// let builder = EventLoopBuilder::new();
    /// ```
    pub fn new() -> Self {
        Self {
            max_operations_per_turn: DEFAULT_MAX_OPERATIONS_PER_TURN,
            max_events: DEFAULT_MAX_EVENTS,
        }
    }

    /// Caps how many scheduled operations run in one loop turn before the
    /// loop yields to readiness polling and timers. Values below 1 are
    /// treated as 1.
    pub fn max_operations_per_turn(mut self, max: usize) -> Self {
        self.max_operations_per_turn = max;
        self
    }

    /// Sets how many readiness events one `epoll_wait` call may return.
    pub fn max_events(mut self, max: usize) -> Self {
        self.max_events = max;
        self
    }

    /// Builds and returns a configured EventLoop instance.
    ///
    /// # Returns
    /// A newly constructed EventLoop, or an error if the epoll instance could
    /// not be created
    ///
    /// # Example
    /// ```ignore
    /// let event_loop = EventLoopBuilder::new().build()?;
    /// ```
    pub fn build(self) -> Result<EventLoop> {
        EventLoop::with_config(self.max_operations_per_turn, self.max_events)
    }
}
