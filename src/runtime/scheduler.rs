//! Budgeted FIFO of deferred work.
//!
//! Tasks run "as soon as possible" on the event loop thread, but the number of
//! tasks executed per loop turn is capped. Once the budget is spent the
//! remaining tasks wait for the next turn, which gives readiness polling and
//! timers a chance to run in between.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TaskState {
    Pending,
    Running,
    Cancelled,
}

struct QueuedTask {
    state: Rc<Cell<TaskState>>,
    run: Box<dyn FnOnce()>,
}

/// Token returned by [`Handle::schedule`](crate::Handle::schedule).
#[derive(Clone, Debug)]
pub struct Scheduled {
    state: Rc<Cell<TaskState>>,
}

impl Scheduled {
    /// `true` until the task starts running or is cancelled.
    pub fn is_pending(&self) -> bool {
        self.state.get() == TaskState::Pending
    }

    /// Prevents the task from running if it has not started yet.
    pub fn cancel(&self) {
        if self.state.get() == TaskState::Pending {
            self.state.set(TaskState::Cancelled);
        }
    }
}

pub(crate) struct Scheduler {
    queue: RefCell<VecDeque<QueuedTask>>,
    budget: usize,
    executed: Cell<usize>,
}

impl Scheduler {
    pub(crate) fn new(budget: usize) -> Self {
        Self {
            queue: RefCell::new(VecDeque::new()),
            budget: budget.max(1),
            executed: Cell::new(0),
        }
    }

    pub(crate) fn schedule(&self, run: Box<dyn FnOnce()>) -> Scheduled {
        let state = Rc::new(Cell::new(TaskState::Pending));

        self.queue.borrow_mut().push_back(QueuedTask {
            state: state.clone(),
            run,
        });

        Scheduled { state }
    }

    /// Starts a new loop turn with a fresh budget.
    pub(crate) fn reset_budget(&self) {
        self.executed.set(0);
    }

    pub(crate) fn budget_exhausted(&self) -> bool {
        self.executed.get() >= self.budget
    }

    /// `true` when at least one non-cancelled task is queued.
    pub(crate) fn has_pending(&self) -> bool {
        self.queue
            .borrow()
            .iter()
            .any(|task| task.state.get() == TaskState::Pending)
    }

    /// Runs queued tasks in order until the queue is empty or the turn's
    /// budget is spent. Tasks scheduled while draining run in the same pass
    /// if budget remains.
    ///
    /// # Returns
    /// The number of tasks executed.
    pub(crate) fn drain(&self) -> usize {
        let mut ran = 0;

        while !self.budget_exhausted() {
            let Some(task) = self.queue.borrow_mut().pop_front() else {
                break;
            };

            if task.state.get() == TaskState::Cancelled {
                continue;
            }

            task.state.set(TaskState::Running);
            self.executed.set(self.executed.get() + 1);
            ran += 1;

            (task.run)();
        }

        // Drop cancelled tasks at the head so they do not keep the loop awake
        let mut queue = self.queue.borrow_mut();
        while queue
            .front()
            .is_some_and(|task| task.state.get() == TaskState::Cancelled)
        {
            queue.pop_front();
        }

        ran
    }
}
