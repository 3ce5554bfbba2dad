//! Cancellation handles for scheduled callbacks.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use tokio::task::AbortHandle;

/// Counter for generating unique task IDs.
static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier of a scheduled callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

#[derive(Debug)]
struct TaskState {
    id: TaskId,
    cancelled: AtomicBool,
    abort: OnceLock<AbortHandle>,
}

/// Handle to a scheduled callback.
///
/// Cloning is cheap and every clone controls the same task. Cancellation
/// is fire-and-forget: once [`cancel`](Self::cancel) returns, the callback
/// will not be *started* again, but an invocation that is already running
/// on another thread finishes normally. Callback bodies that touch shared
/// state must therefore re-check that state instead of trusting that a
/// cancelled timer is a silent one.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    state: Arc<TaskState>,
}

impl TaskHandle {
    /// Creates a handle for a task a [`Scheduler`](crate::Scheduler) is
    /// about to register.
    pub fn new() -> Self {
        Self {
            state: Arc::new(TaskState {
                id: TaskId(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed)),
                cancelled: AtomicBool::new(false),
                abort: OnceLock::new(),
            }),
        }
    }

    /// Links the handle to the runtime task executing the callback, so
    /// cancelling also wakes and drops a sleeping task.
    ///
    /// If the handle was cancelled before the task was attached, the task
    /// is aborted right away.
    pub fn attach(&self, abort: AbortHandle) {
        if self.state.abort.set(abort).is_ok() && self.is_cancelled() {
            if let Some(abort) = self.state.abort.get() {
                abort.abort();
            }
        }
    }

    pub fn id(&self) -> TaskId {
        self.state.id
    }

    /// Prevents any future invocation of the callback. Idempotent.
    pub fn cancel(&self) {
        if !self.state.cancelled.swap(true, Ordering::AcqRel) {
            tracing::trace!(task = %self.state.id, "task cancelled");
        }
        if let Some(abort) = self.state.abort.get() {
            abort.abort();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::Acquire)
    }

    /// Returns `true` if both handles refer to the same task.
    pub fn same_task(&self, other: &TaskHandle) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

impl Default for TaskHandle {
    fn default() -> Self {
        Self::new()
    }
}
