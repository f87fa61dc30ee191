//! Handle table for embedding boundaries.
//!
//! Callers outside Rust hold an [`AppId`] instead of a pointer. Every
//! operation looks the handle up first, so a stale or forged handle yields
//! [`SchedulerError::UnknownHandle`] rather than undefined behavior.
//!
//! The table lock is held only for the lookup. Tasks may call back into the
//! registry, and [`Registry::destroy`] joins the worker after the entry has
//! already been removed.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use parking_lot::Mutex;
use tracing::debug;

use splitrt_core::SchedulerConfig;

use crate::application::{AppId, Application, Spawner};
use crate::error::SchedulerError;
use crate::task::Task;
use crate::trampoline::MainDispatch;

static GLOBAL: LazyLock<Registry> = LazyLock::new(Registry::new);

#[derive(Default)]
pub struct Registry {
    apps: Mutex<HashMap<AppId, Arc<Application>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry.
    pub fn global() -> &'static Registry {
        &GLOBAL
    }

    /// Start a new application and return its handle.
    pub fn create(
        &self,
        config: &SchedulerConfig,
        dispatch: Arc<dyn MainDispatch>,
    ) -> Result<AppId, SchedulerError> {
        let app = Application::new(config, dispatch)?;
        Ok(self.insert(app))
    }

    /// Take ownership of an already constructed application.
    pub fn insert(&self, app: Application) -> AppId {
        let id = app.id();
        self.apps.lock().insert(id, Arc::new(app));
        debug!(app = %id, "application registered");
        id
    }

    fn get(&self, id: AppId) -> Result<Arc<Application>, SchedulerError> {
        self.apps
            .lock()
            .get(&id)
            .cloned()
            .ok_or(SchedulerError::UnknownHandle(id))
    }

    pub fn submit_background(&self, id: AppId, task: Task) -> Result<(), SchedulerError> {
        self.get(id)?.submit_background(task)
    }

    pub fn submit_main(&self, id: AppId, task: Task) -> Result<(), SchedulerError> {
        self.get(id)?.submit_main(task)
    }

    /// Entry point for the embedder's main loop, once per posted request.
    pub fn run_pending_main_tasks(&self, id: AppId) -> Result<usize, SchedulerError> {
        Ok(self.get(id)?.run_pending_main_tasks())
    }

    pub fn spawner(&self, id: AppId) -> Result<Spawner, SchedulerError> {
        Ok(self.get(id)?.spawner())
    }

    /// Remove the handle and shut the application down.
    ///
    /// The handle is invalid as soon as this returns, even if shutdown
    /// itself reports an error.
    pub fn destroy(&self, id: AppId) -> Result<(), SchedulerError> {
        let app = self
            .apps
            .lock()
            .remove(&id)
            .ok_or(SchedulerError::UnknownHandle(id))?;
        debug!(app = %id, "application unregistered");
        app.shutdown()
    }

    pub fn contains(&self, id: AppId) -> bool {
        self.apps.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.apps.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.lock().is_empty()
    }
}
