//! Units of work accepted by both dispatchers.

use std::any::Any;
use std::borrow::Cow;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use splitrt_core::Affinity;

/// Boxed task body.
pub type TaskFn = Box<dyn FnOnce() + Send + 'static>;

/// An object that can be run as a task through a shared handle.
///
/// Lets callers submit any number of concrete types behind one
/// `Arc<dyn Invoke>` and have the call resolved dynamically on whichever
/// context the task lands on.
pub trait Invoke: Send + Sync {
    fn invoke(&self);
}

/// A zero-argument, no-result unit of work.
///
/// Consumed when run, so a task can never be invoked twice. The affinity and
/// label are metadata only; neither dispatcher schedules on them.
pub struct Task {
    body: TaskFn,
    affinity: Affinity,
    label: Option<Cow<'static, str>>,
}

impl Task {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::with_affinity(Affinity::Unspecified, f)
    }

    pub fn with_affinity<F>(affinity: Affinity, f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            body: Box::new(f),
            affinity,
            label: None,
        }
    }

    /// Wrap a shared polymorphic object; running the task calls `invoke()`.
    pub fn from_invocable(object: Arc<dyn Invoke>, affinity: Affinity) -> Self {
        Self::with_affinity(affinity, move || object.invoke())
    }

    /// Attach a human-readable label used in logs.
    pub fn labeled(mut self, label: impl Into<Cow<'static, str>>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn affinity(&self) -> Affinity {
        self.affinity
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Run the body on the current thread, letting a panic propagate.
    pub fn run(self) {
        (self.body)()
    }

    /// Run the body, catching a panic and reporting it instead of unwinding.
    pub fn run_guarded(self) -> Result<(), TaskPanic> {
        let Task {
            body,
            affinity,
            label,
        } = self;
        panic::catch_unwind(AssertUnwindSafe(body)).map_err(|payload| TaskPanic {
            affinity,
            label,
            message: panic_message(payload.as_ref()),
        })
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("affinity", &self.affinity)
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// A task body that panicked while being run by a dispatcher.
#[derive(Debug, Clone)]
pub struct TaskPanic {
    pub affinity: Affinity,
    pub label: Option<Cow<'static, str>>,
    pub message: String,
}

impl fmt::Display for TaskPanic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "task {} ({}) panicked: {}",
            self.label.as_deref().unwrap_or("<unlabeled>"),
            self.affinity,
            self.message
        )
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
