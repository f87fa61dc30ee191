//! Application lifecycle: owns both queues and the background worker.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle, ThreadId};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use splitrt_core::{SchedulerConfig, ShutdownPolicy};

use crate::background::{BackgroundQueue, BackgroundStats};
use crate::error::SchedulerError;
use crate::task::Task;
use crate::trampoline::{MainDispatch, MainStats, MainTrampoline};

/// Opaque application identifier. Also the handle exchanged at the
/// [`Registry`](crate::Registry) boundary; never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AppId(u64);

impl AppId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl From<u64> for AppId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "app-{}", self.0)
    }
}

/// Snapshot of both sides' counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppStats {
    pub background: BackgroundStats,
    pub main: MainStats,
}

pub(crate) struct Inner {
    id: AppId,
    background: BackgroundQueue,
    main: Arc<MainTrampoline>,
}

impl Inner {
    fn submit_background(&self, task: Task) -> Result<(), SchedulerError> {
        self.background.submit(task)
    }

    fn submit_main(&self, task: Task) -> Result<(), SchedulerError> {
        self.main.submit(task)
    }
}

/// One background worker plus one main-context trampoline.
///
/// Construction starts the worker. [`Application::shutdown`] (also run on
/// drop) stops it and joins exactly once, then closes the main trampoline:
/// queued main tasks are dropped and late drain requests do nothing.
pub struct Application {
    inner: Arc<Inner>,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_thread: ThreadId,
    policy: ShutdownPolicy,
}

impl Application {
    /// Start an application whose main-side requests go through `dispatch`.
    ///
    /// Fails only if the worker thread cannot be spawned.
    pub fn new(
        config: &SchedulerConfig,
        dispatch: Arc<dyn MainDispatch>,
    ) -> Result<Self, SchedulerError> {
        let id = AppId::next();
        let inner = Arc::new(Inner {
            id,
            background: BackgroundQueue::new(id),
            main: Arc::new(MainTrampoline::new(id, dispatch)),
        });

        let policy = config.shutdown_policy;
        let mut builder = thread::Builder::new().name(config.worker_name.clone());
        if let Some(kb) = config.worker_stack_kb {
            builder = builder.stack_size(kb as usize * 1024);
        }
        let worker_inner = Arc::clone(&inner);
        let handle = builder
            .spawn(move || worker_inner.background.run_worker(policy))
            .map_err(SchedulerError::Spawn)?;
        let worker_thread = handle.thread().id();

        info!(app = %id, worker = %config.worker_name, %policy, "application created");
        Ok(Self {
            inner,
            worker: Mutex::new(Some(handle)),
            worker_thread,
            policy,
        })
    }

    pub fn id(&self) -> AppId {
        self.inner.id
    }

    pub fn shutdown_policy(&self) -> ShutdownPolicy {
        self.policy
    }

    pub fn worker_thread_id(&self) -> ThreadId {
        self.worker_thread
    }

    /// True when called from this application's background worker.
    pub fn on_worker(&self) -> bool {
        thread::current().id() == self.worker_thread
    }

    pub fn submit_background(&self, task: Task) -> Result<(), SchedulerError> {
        self.inner.submit_background(task)
    }

    pub fn submit_main(&self, task: Task) -> Result<(), SchedulerError> {
        self.inner.submit_main(task)
    }

    pub fn run_on_background<F>(&self, f: F) -> Result<(), SchedulerError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit_background(Task::new(f))
    }

    pub fn run_on_main<F>(&self, f: F) -> Result<(), SchedulerError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit_main(Task::new(f))
    }

    /// Drain the main queue. Must be called on the main context, in response
    /// to a posted drain request; calling it while idle is a no-op.
    pub fn run_pending_main_tasks(&self) -> usize {
        self.inner.main.drain()
    }

    /// A cloneable submitter that tasks can capture without keeping the
    /// application alive.
    pub fn spawner(&self) -> Spawner {
        Spawner {
            id: self.inner.id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn is_main_scheduled(&self) -> bool {
        self.inner.main.is_scheduled()
    }

    pub fn pending_main(&self) -> usize {
        self.inner.main.pending()
    }

    pub fn pending_background(&self) -> usize {
        self.inner.background.pending()
    }

    pub fn stats(&self) -> AppStats {
        AppStats {
            background: self.inner.background.stats(),
            main: self.inner.main.stats(),
        }
    }

    /// Stop the worker and close the main trampoline.
    ///
    /// Idempotent: the worker is joined exactly once. A concurrent caller
    /// blocks until that join has finished, and every later call returns
    /// `Ok`. Called from the worker itself it cannot join; shutdown is still
    /// requested and [`SchedulerError::SelfJoin`] is returned. The join then
    /// happens on the next call from another thread, or never if the last
    /// owner is dropped on the worker.
    pub fn shutdown(&self) -> Result<(), SchedulerError> {
        let id = self.inner.id;

        if self.on_worker() {
            warn!(app = %id, "shutdown requested from the worker thread; not joining");
            self.inner.background.request_shutdown();
            self.inner.main.close();
            return Err(SchedulerError::SelfJoin(id));
        }

        // Held across the join so concurrent callers wait for it.
        let mut worker = self.worker.lock();
        let Some(handle) = worker.take() else {
            return Ok(());
        };
        debug!(app = %id, policy = %self.policy, "shutting down application");
        self.inner.background.request_shutdown();

        let joined = handle.join();
        self.inner.background.discard_remaining();
        self.inner.main.close();
        drop(worker);

        match joined {
            Ok(()) => {
                let stats = self.stats();
                info!(
                    app = %id,
                    bg_executed = stats.background.executed,
                    bg_discarded = stats.background.discarded,
                    main_executed = stats.main.executed,
                    main_discarded = stats.main.discarded,
                    "application destroyed"
                );
                Ok(())
            }
            Err(_) => Err(SchedulerError::WorkerPanicked(id)),
        }
    }
}

impl Drop for Application {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!(app = %self.inner.id, error = %e, "application shutdown on drop failed");
        }
    }
}

impl fmt::Debug for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Application")
            .field("id", &self.inner.id)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// Weak submission handle for code running inside tasks.
///
/// Once shutdown has been requested, calls fail with
/// [`SchedulerError::ShuttingDown`] for as long as the application's state is
/// still alive: the `Application` has not been dropped yet, or a task on the
/// worker is still running. After that they fail with
/// [`SchedulerError::ApplicationGone`].
#[derive(Clone)]
pub struct Spawner {
    id: AppId,
    inner: Weak<Inner>,
}

impl Spawner {
    pub fn id(&self) -> AppId {
        self.id
    }

    fn upgrade(&self) -> Result<Arc<Inner>, SchedulerError> {
        self.inner.upgrade().ok_or(SchedulerError::ApplicationGone)
    }

    pub fn submit_background(&self, task: Task) -> Result<(), SchedulerError> {
        self.upgrade()?.submit_background(task)
    }

    pub fn submit_main(&self, task: Task) -> Result<(), SchedulerError> {
        self.upgrade()?.submit_main(task)
    }

    pub fn run_on_background<F>(&self, f: F) -> Result<(), SchedulerError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit_background(Task::new(f))
    }

    pub fn run_on_main<F>(&self, f: F) -> Result<(), SchedulerError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit_main(Task::new(f))
    }
}

impl fmt::Debug for Spawner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Spawner").field("id", &self.id).finish()
    }
}
