//! Main trampoline: coalesced hand-off of tasks to the single-threaded main
//! context.
//!
//! The trampoline never runs anything itself. On the first submission into an
//! empty queue it posts one [`DrainRequest`] through the embedder's
//! [`MainDispatch`]; the main context later runs that request, which drains
//! the queue to empty. Submissions that arrive while a request is outstanding
//! ride along with it.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, error, trace, warn};

use crate::application::AppId;
use crate::error::SchedulerError;
use crate::task::Task;

/// The embedder's "post a callback to the main context" primitive.
///
/// `post` must not block and must eventually cause [`DrainRequest::run`] to be
/// called on the main context. Latency is unconstrained.
pub trait MainDispatch: Send + Sync {
    fn post(&self, request: DrainRequest);
}

/// A pending "run the main queue" request.
///
/// Holds only a weak reference, so a request that outlives its application is
/// a no-op instead of a dangling call.
pub struct DrainRequest {
    app: AppId,
    target: Weak<MainTrampoline>,
}

impl DrainRequest {
    pub fn app(&self) -> AppId {
        self.app
    }

    /// Drain the owning application's main queue. Call on the main context.
    ///
    /// Returns the number of tasks run.
    pub fn run(self) -> usize {
        match self.target.upgrade() {
            Some(trampoline) => trampoline.drain(),
            None => {
                debug!(app = %self.app, "drain request for destroyed application ignored");
                0
            }
        }
    }
}

impl fmt::Debug for DrainRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DrainRequest").field("app", &self.app).finish()
    }
}

struct MainState {
    tasks: VecDeque<Task>,
    scheduled: bool,
    closed: bool,
}

/// Counters for the main side of an application.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MainStats {
    /// Drain requests posted through [`MainDispatch`].
    pub requests: u64,
    pub executed: u64,
    pub panicked: u64,
    /// Tasks dropped unrun when the application was destroyed.
    pub discarded: u64,
}

pub(crate) struct MainTrampoline {
    app: AppId,
    state: Mutex<MainState>,
    dispatch: Arc<dyn MainDispatch>,
    requests: AtomicU64,
    executed: AtomicU64,
    panicked: AtomicU64,
    discarded: AtomicU64,
}

impl MainTrampoline {
    pub(crate) fn new(app: AppId, dispatch: Arc<dyn MainDispatch>) -> Self {
        Self {
            app,
            state: Mutex::new(MainState {
                tasks: VecDeque::new(),
                scheduled: false,
                closed: false,
            }),
            dispatch,
            requests: AtomicU64::new(0),
            executed: AtomicU64::new(0),
            panicked: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
        }
    }

    /// Queue a task for the main context.
    ///
    /// Posts a drain request only on the transition out of the idle state.
    /// The request is posted after the lock is released.
    pub(crate) fn submit(self: &Arc<Self>, task: Task) -> Result<(), SchedulerError> {
        {
            let mut state = self.state.lock();
            if state.closed {
                return Err(SchedulerError::ShuttingDown(self.app));
            }
            state.tasks.push_back(task);
            if state.scheduled {
                return Ok(());
            }
            state.scheduled = true;
        }

        self.requests.fetch_add(1, Ordering::Relaxed);
        trace!(app = %self.app, "posting main drain request");
        self.dispatch.post(DrainRequest {
            app: self.app,
            target: Arc::downgrade(self),
        });
        Ok(())
    }

    fn pop(&self) -> Option<Task> {
        let mut state = self.state.lock();
        match state.tasks.pop_front() {
            Some(task) => Some(task),
            None => {
                // Any later submission has to post a fresh request.
                state.scheduled = false;
                None
            }
        }
    }

    /// Run queued tasks until the queue is observed empty.
    pub(crate) fn drain(&self) -> usize {
        let mut ran = 0;
        while let Some(task) = self.pop() {
            match task.run_guarded() {
                Ok(()) => {
                    self.executed.fetch_add(1, Ordering::Relaxed);
                }
                Err(panic) => {
                    self.panicked.fetch_add(1, Ordering::Relaxed);
                    error!(app = %self.app, error = %panic, "main task panicked");
                }
            }
            ran += 1;
        }
        ran
    }

    /// Stop accepting work and drop everything queued.
    pub(crate) fn close(&self) -> usize {
        let dropped = {
            let mut state = self.state.lock();
            state.closed = true;
            state.scheduled = false;
            std::mem::take(&mut state.tasks)
        };
        let count = dropped.len();
        drop(dropped);
        if count > 0 {
            self.discarded.fetch_add(count as u64, Ordering::Relaxed);
            warn!(app = %self.app, discarded = count, "discarded queued main tasks at shutdown");
        }
        count
    }

    pub(crate) fn is_scheduled(&self) -> bool {
        self.state.lock().scheduled
    }

    pub(crate) fn pending(&self) -> usize {
        self.state.lock().tasks.len()
    }

    pub(crate) fn stats(&self) -> MainStats {
        MainStats {
            requests: self.requests.load(Ordering::Relaxed),
            executed: self.executed.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }
}
