use std::cell::Cell;

/// Detects an operation re-entering itself on the same thread.
///
/// Entering while already entered is a programming error and panics with
/// `"reentrant call detected"`.
///
/// # Example
/// ```ignore
/// let guard = ReentrancyGuard::new();
/// let _entered = guard.enter();
/// guard.enter(); // panics
/// ```
#[derive(Debug, Default)]
pub struct ReentrancyGuard {
    active: Cell<bool>,
}

/// Leaves the guarded section when dropped.
pub struct Entered<'a> {
    guard: &'a ReentrancyGuard,
}

impl ReentrancyGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&self) -> Entered<'_> {
        if self.active.replace(true) {
            panic!("reentrant call detected");
        }

        Entered { guard: self }
    }

    pub fn is_active(&self) -> bool {
        self.active.get()
    }
}

impl Drop for Entered<'_> {
    fn drop(&mut self) {
        self.guard.active.set(false);
    }
}
