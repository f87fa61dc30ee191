use std::time::Duration;

use thiserror::Error;

use crate::application::AppId;

/// Errors surfaced by the scheduler layer.
///
/// Task bodies never produce these; a panicking task is caught, logged and
/// counted by the dispatcher that ran it.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("failed to spawn background worker: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("application {0} is shutting down")]
    ShuttingDown(AppId),

    #[error("application no longer exists")]
    ApplicationGone,

    #[error("unknown application handle {0}")]
    UnknownHandle(AppId),

    #[error("application {0} cannot be joined from its own worker thread")]
    SelfJoin(AppId),

    /// Task panics are caught per task, so this only surfaces if the worker
    /// loop itself panics outside a task body.
    #[error("background worker of application {0} panicked")]
    WorkerPanicked(AppId),

    #[error("main event loop closed")]
    LoopClosed,

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}
