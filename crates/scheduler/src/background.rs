//! Background dispatcher: one FIFO queue drained by one dedicated thread.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, trace, warn};

use splitrt_core::ShutdownPolicy;

use crate::application::AppId;
use crate::error::SchedulerError;
use crate::task::Task;

struct QueueState {
    tasks: VecDeque<Task>,
    done: bool,
}

/// Counters for the background side of an application.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackgroundStats {
    /// Tasks that ran to completion.
    pub executed: u64,
    /// Tasks whose body panicked.
    pub panicked: u64,
    /// Tasks dropped unrun at shutdown.
    pub discarded: u64,
}

pub(crate) struct BackgroundQueue {
    app: AppId,
    state: Mutex<QueueState>,
    condvar: Condvar,
    executed: AtomicU64,
    panicked: AtomicU64,
    discarded: AtomicU64,
}

impl BackgroundQueue {
    pub(crate) fn new(app: AppId) -> Self {
        Self {
            app,
            state: Mutex::new(QueueState {
                tasks: VecDeque::new(),
                done: false,
            }),
            condvar: Condvar::new(),
            executed: AtomicU64::new(0),
            panicked: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
        }
    }

    /// Append a task and wake the worker.
    ///
    /// Rejected once shutdown has been requested, so a draining worker always
    /// reaches an empty queue.
    pub(crate) fn submit(&self, task: Task) -> Result<(), SchedulerError> {
        {
            let mut state = self.state.lock();
            if state.done {
                return Err(SchedulerError::ShuttingDown(self.app));
            }
            state.tasks.push_back(task);
        }
        self.condvar.notify_one();
        Ok(())
    }

    /// Set the shutdown flag and wake the worker once.
    pub(crate) fn request_shutdown(&self) {
        {
            let mut state = self.state.lock();
            state.done = true;
        }
        self.condvar.notify_one();
    }

    pub(crate) fn pending(&self) -> usize {
        self.state.lock().tasks.len()
    }

    pub(crate) fn stats(&self) -> BackgroundStats {
        BackgroundStats {
            executed: self.executed.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }

    /// Drop whatever is still queued. Returns the number of tasks dropped.
    pub(crate) fn discard_remaining(&self) -> usize {
        let dropped = std::mem::take(&mut self.state.lock().tasks);
        let count = dropped.len();
        // Task destructors run outside the lock; they may submit elsewhere.
        drop(dropped);
        if count > 0 {
            self.discarded.fetch_add(count as u64, Ordering::Relaxed);
            warn!(app = %self.app, discarded = count, "discarded queued background tasks at shutdown");
        }
        count
    }

    /// Block until a task is available or the worker should exit.
    fn next(&self, policy: ShutdownPolicy) -> Option<Task> {
        let mut state = self.state.lock();
        loop {
            if state.done && policy == ShutdownPolicy::Discard {
                drop(state);
                self.discard_remaining();
                return None;
            }
            if let Some(task) = state.tasks.pop_front() {
                return Some(task);
            }
            if state.done {
                return None;
            }
            self.condvar.wait(&mut state);
        }
    }

    /// Worker loop. Runs on the dedicated thread for the application's lifetime.
    pub(crate) fn run_worker(&self, policy: ShutdownPolicy) {
        debug!(app = %self.app, %policy, "background worker started");
        while let Some(task) = self.next(policy) {
            trace!(
                app = %self.app,
                affinity = %task.affinity(),
                label = task.label().unwrap_or("-"),
                "running background task"
            );
            match task.run_guarded() {
                Ok(()) => {
                    self.executed.fetch_add(1, Ordering::Relaxed);
                }
                Err(panic) => {
                    self.panicked.fetch_add(1, Ordering::Relaxed);
                    error!(app = %self.app, error = %panic, "background task panicked");
                }
            }
        }
        debug!(app = %self.app, "background worker exiting");
    }
}
