//! The [`Scheduler`] trait and its Tokio-backed implementation.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::{TICK_DURATION, TaskHandle, Ticks};

/// A callback that runs once.
pub type OnceTask = Box<dyn FnOnce() + Send + 'static>;

/// A callback that runs on every period until cancelled.
pub type RepeatingTask = Box<dyn FnMut() + Send + 'static>;

/// Scoped delayed and repeating callbacks, measured in server ticks.
///
/// This is the timer half of the engine boundary. The protection manager
/// never sleeps or spawns on its own; it asks a `Scheduler` and keeps the
/// returned [`TaskHandle`].
///
/// # Trait bounds
///
/// `Send + Sync + 'static` because callbacks scheduled from one thread
/// can themselves schedule or cancel tasks from another.
pub trait Scheduler: Send + Sync + 'static {
    /// Runs `task` once after `delay`.
    fn schedule_once(&self, delay: Ticks, task: OnceTask) -> TaskHandle;

    /// Runs `task` after `delay`, then every `period`, until cancelled.
    ///
    /// A zero `period` is treated as one tick.
    fn schedule_repeating(&self, delay: Ticks, period: Ticks, task: RepeatingTask) -> TaskHandle;

    /// Cancels a task. Equivalent to [`TaskHandle::cancel`].
    fn cancel(&self, handle: &TaskHandle) {
        handle.cancel();
    }
}

impl<S: Scheduler + ?Sized> Scheduler for Arc<S> {
    fn schedule_once(&self, delay: Ticks, task: OnceTask) -> TaskHandle {
        (**self).schedule_once(delay, task)
    }

    fn schedule_repeating(&self, delay: Ticks, period: Ticks, task: RepeatingTask) -> TaskHandle {
        (**self).schedule_repeating(delay, period, task)
    }
}

// ---------------------------------------------------------------------------
// TokioScheduler
// ---------------------------------------------------------------------------

/// Runs callbacks on Tokio tasks.
///
/// Each scheduled callback gets its own task that sleeps until it is due.
/// Cancelling sets the handle's flag (checked right before every
/// invocation) and aborts the task, so a sleeping timer is dropped
/// immediately.
///
/// With `tokio::time::pause()` the whole scheduler runs on virtual time,
/// which is how the tests exercise 20-second timeouts in microseconds.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    runtime: Handle,
    tick: Duration,
}

impl TokioScheduler {
    /// Creates a scheduler on the current Tokio runtime.
    ///
    /// # Panics
    /// Panics when called outside a Tokio runtime. Use
    /// [`try_current`](Self::try_current) or [`with_handle`](Self::with_handle)
    /// where that can happen.
    pub fn new() -> Self {
        Self::with_handle(Handle::current())
    }

    /// Creates a scheduler on the current runtime, if there is one.
    pub fn try_current() -> Option<Self> {
        Handle::try_current().ok().map(Self::with_handle)
    }

    /// Creates a scheduler that spawns onto `runtime`.
    pub fn with_handle(runtime: Handle) -> Self {
        Self {
            runtime,
            tick: TICK_DURATION,
        }
    }

    /// Overrides the wall-clock length of one tick. Zero is ignored.
    pub fn with_tick_duration(mut self, tick: Duration) -> Self {
        if tick.is_zero() {
            tracing::warn!("tick duration of zero ignored");
        } else {
            self.tick = tick;
        }
        self
    }

    /// The wall-clock length of one tick.
    pub fn tick_duration(&self) -> Duration {
        self.tick
    }
}

impl Default for TokioScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_once(&self, delay: Ticks, task: OnceTask) -> TaskHandle {
        let handle = TaskHandle::new();
        let guard = handle.clone();
        let wait = delay.to_duration(self.tick);

        let join = self.runtime.spawn(async move {
            time::sleep(wait).await;
            if guard.is_cancelled() {
                return;
            }
            tracing::trace!(task = %guard.id(), "timer fired");
            task();
        });
        handle.attach(join.abort_handle());

        tracing::trace!(task = %handle.id(), %delay, "timer scheduled");
        handle
    }

    fn schedule_repeating(
        &self,
        delay: Ticks,
        period: Ticks,
        mut task: RepeatingTask,
    ) -> TaskHandle {
        let handle = TaskHandle::new();
        let guard = handle.clone();
        let period = period.max(Ticks::ONE).to_duration(self.tick);
        let start = Instant::now() + delay.to_duration(self.tick);

        let join = self.runtime.spawn(async move {
            let mut interval = time::interval_at(start, period);
            // A stalled server should not fire a burst of catch-up ticks.
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if guard.is_cancelled() {
                    break;
                }
                task();
            }
        });
        handle.attach(join.abort_handle());

        tracing::trace!(task = %handle.id(), %delay, "repeating task scheduled");
        handle
    }
}
