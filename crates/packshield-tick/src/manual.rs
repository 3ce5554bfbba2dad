//! A deterministic, hand-cranked scheduler.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::{OnceTask, RepeatingTask, Scheduler, TaskHandle, Ticks};

enum Callback {
    Once(OnceTask),
    Repeating { period: u64, task: RepeatingTask },
}

struct Entry {
    handle: TaskHandle,
    due: u64,
    /// Insertion order; breaks ties between tasks due on the same tick.
    seq: u64,
    callback: Callback,
}

#[derive(Default)]
struct Inner {
    now: u64,
    next_seq: u64,
    entries: Vec<Entry>,
}

/// A scheduler whose clock only moves when [`advance`](Self::advance) is
/// called.
///
/// Callbacks run on the caller's thread, in due-tick order (FIFO within a
/// tick). The internal lock is released while a callback runs, so
/// callbacks may freely schedule and cancel other tasks, including
/// themselves.
///
/// Used by the protection tests and the join simulation, where exact tick
/// boundaries matter more than real concurrency.
#[derive(Default)]
pub struct ManualScheduler {
    inner: Mutex<Inner>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current tick.
    pub fn now(&self) -> Ticks {
        Ticks(self.lock().now)
    }

    /// Number of tasks that are scheduled and not cancelled.
    pub fn pending(&self) -> usize {
        self.lock()
            .entries
            .iter()
            .filter(|e| !e.handle.is_cancelled())
            .count()
    }

    /// Moves the clock forward by `ticks`, running every callback that
    /// falls due on the way.
    pub fn advance(&self, ticks: Ticks) {
        let target = self.lock().now.saturating_add(ticks.get());

        loop {
            let entry = {
                let mut inner = self.lock();
                inner.entries.retain(|e| !e.handle.is_cancelled());
                let next = inner
                    .entries
                    .iter()
                    .enumerate()
                    .filter(|(_, e)| e.due <= target)
                    .min_by_key(|(_, e)| (e.due, e.seq))
                    .map(|(idx, _)| idx);
                match next {
                    Some(idx) => {
                        let entry = inner.entries.swap_remove(idx);
                        inner.now = entry.due;
                        entry
                    }
                    None => {
                        inner.now = target;
                        return;
                    }
                }
            };

            if entry.handle.is_cancelled() {
                continue;
            }
            match entry.callback {
                Callback::Once(task) => task(),
                Callback::Repeating { period, mut task } => {
                    task();
                    // A repeat that would land past the end of time never fires.
                    let Some(due) = entry.due.checked_add(period) else {
                        continue;
                    };
                    if !entry.handle.is_cancelled() {
                        let mut inner = self.lock();
                        let seq = inner.next_seq;
                        inner.next_seq += 1;
                        inner.entries.push(Entry {
                            handle: entry.handle,
                            due,
                            seq,
                            callback: Callback::Repeating { period, task },
                        });
                    }
                }
            }
        }
    }

    fn push(&self, delay: Ticks, callback: Callback) -> TaskHandle {
        let handle = TaskHandle::new();
        let mut inner = self.lock();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        let due = inner.now.saturating_add(delay.get());
        inner.entries.push(Entry {
            handle: handle.clone(),
            due,
            seq,
            callback,
        });
        handle
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_once(&self, delay: Ticks, task: OnceTask) -> TaskHandle {
        self.push(delay, Callback::Once(task))
    }

    fn schedule_repeating(&self, delay: Ticks, period: Ticks, task: RepeatingTask) -> TaskHandle {
        let period = period.max(Ticks::ONE).get();
        self.push(delay, Callback::Repeating { period, task })
    }
}
