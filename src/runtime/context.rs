//! Thread-local event loop context.
//!
//! While [`EventLoop::run`](crate::EventLoop::run) (or
//! [`EventLoop::enter`](crate::EventLoop::enter)) executes, the loop's
//! [`Handle`] is stored in thread-local storage. This enables patterns like
//! [`connect`](crate::net::connect) and [`SctpListener::bind`](crate::net::SctpListener::bind)
//! without passing a handle explicitly.

use crate::runtime::Handle;

use std::cell::RefCell;

thread_local! {
    /// Handle of the event loop currently driving this thread.
    ///
    /// Set by [`enter_context`] for the duration of `run`/`enter`.
    pub(crate) static CURRENT_HANDLE: RefCell<Option<Handle>> = const { RefCell::new(None) };
}

/// Installs `handle` as the current context while `function` runs.
///
/// The previous context is restored on exit, so loops may be nested.
///
/// # Arguments
/// - `handle`: The handle to expose through [`current_handle`].
/// - `function`: Closure to execute within this context.
pub(crate) fn enter_context<F, R>(handle: Handle, function: F) -> R
where
    F: FnOnce() -> R,
{
    let previous = CURRENT_HANDLE.with(|current| current.borrow_mut().replace(handle));

    struct Restore(Option<Handle>);

    impl Drop for Restore {
        fn drop(&mut self) {
            let previous = self.0.take();
            CURRENT_HANDLE.with(|current| *current.borrow_mut() = previous);
        }
    }

    let _restore = Restore(previous);
    function()
}

/// Returns the current handle, if any.
pub(crate) fn try_current_handle() -> Option<Handle> {
    CURRENT_HANDLE.with(|current| current.borrow().clone())
}

/// Returns the current handle.
///
/// # Panics
/// Panics if called outside of an event loop context.
pub(crate) fn current_handle() -> Handle {
    try_current_handle().unwrap_or_else(|| {
        panic!(
            "No event loop in current context. Sockets must be created within EventLoop::run or EventLoop::enter"
        )
    })
}
