//! Cross-context task scheduling.
//!
//! An [`Application`] owns one dedicated background worker thread and a
//! trampoline onto a single-threaded "main" context that it never creates
//! itself. Work can be submitted to either side from anywhere, including from
//! a task currently running on the other side.

pub mod application;
pub mod background;
pub mod demo;
pub mod error;
pub mod event_loop;
pub mod registry;
pub mod task;
pub mod trampoline;

pub use application::{AppId, AppStats, Application, Spawner};
pub use background::BackgroundStats;
pub use error::SchedulerError;
pub use event_loop::{EventLoop, EventLoopDispatch};
pub use registry::Registry;
pub use splitrt_core::{Affinity, SchedulerConfig, ShutdownPolicy};
pub use task::{Invoke, Task, TaskPanic};
pub use trampoline::{DrainRequest, MainDispatch, MainStats};
