//! The stock demo workload.
//!
//! Five entry points exercising the scheduler the way an embedder does:
//! plain closures, free functions, methods on a host object, dynamic dispatch
//! through a shared trait object, and a four-stage ping-pong between the
//! worker and the main context. Each stage writes a marker to a
//! [`MarkerLog`] so callers can check order and which thread ran it.

use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::Mutex;
use tracing::{info, warn};

use splitrt_core::Affinity;

use crate::application::Spawner;
use crate::error::SchedulerError;
use crate::task::{Invoke, Task};

pub const TASK1: &str = "Running Task 1.";
pub const TASK2: &str = "Running task2.";
pub const TASK3: &str = "Running task3.";
pub const TASK4_BASE: &str = "Running task4 - base object.";
pub const TASK4_SUBCLASS: &str = "Running task4 - subclass object.";
pub const TASK5_BG_1: &str = "Running Task 5 in bg thread.";
pub const TASK5_MAIN_1: &str = "Running Task 5 in main 1.";
pub const TASK5_BG_2: &str = "Running Task 5 in bg thread again.";
pub const TASK5_MAIN_2: &str = "Running Task 5 in main thread again.";

/// Markers from the ping-pong, in the order they must appear.
pub const TASK5_SEQUENCE: [&str; 4] = [TASK5_BG_1, TASK5_MAIN_1, TASK5_BG_2, TASK5_MAIN_2];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    pub text: &'static str,
    pub thread: ThreadId,
}

/// Thread-safe, append-only record of demo markers.
#[derive(Debug, Default)]
pub struct MarkerLog {
    entries: Mutex<Vec<Marker>>,
}

impl MarkerLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record(&self, text: &'static str) {
        info!(marker = text, "demo");
        self.entries.lock().push(Marker {
            text,
            thread: thread::current().id(),
        });
    }

    pub fn snapshot(&self) -> Vec<Marker> {
        self.entries.lock().clone()
    }

    pub fn texts(&self) -> Vec<&'static str> {
        self.entries.lock().iter().map(|m| m.text).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn count(&self, text: &str) -> usize {
        self.entries.lock().iter().filter(|m| m.text == text).count()
    }
}

/// Object whose methods are called from background tasks.
pub struct DemoHost {
    log: Arc<MarkerLog>,
}

impl DemoHost {
    pub fn new(log: Arc<MarkerLog>) -> Arc<Self> {
        Arc::new(Self { log })
    }

    pub fn run_task3(&self) {
        self.log.record(TASK3);
    }
}

fn run_task2_free(log: &MarkerLog) {
    log.record(TASK2);
}

/// Base behavior for the dynamic-dispatch demo.
pub struct BaseObject {
    log: Arc<MarkerLog>,
}

impl BaseObject {
    pub fn new(log: Arc<MarkerLog>) -> Self {
        Self { log }
    }
}

impl Invoke for BaseObject {
    fn invoke(&self) {
        self.log.record(TASK4_BASE);
    }
}

/// Overrides the base behavior; only ever reached through `dyn Invoke`.
pub struct SubclassObject {
    log: Arc<MarkerLog>,
}

impl SubclassObject {
    pub fn new(log: Arc<MarkerLog>) -> Self {
        Self { log }
    }
}

impl Invoke for SubclassObject {
    fn invoke(&self) {
        self.log.record(TASK4_SUBCLASS);
    }
}

pub fn run_task1(spawner: &Spawner, log: &Arc<MarkerLog>) -> Result<(), SchedulerError> {
    let log = log.clone();
    spawner.submit_background(
        Task::with_affinity(Affinity::Worker, move || log.record(TASK1)).labeled("task1"),
    )
}

pub fn run_task2(spawner: &Spawner, log: &Arc<MarkerLog>) -> Result<(), SchedulerError> {
    let log = log.clone();
    spawner.submit_background(
        Task::with_affinity(Affinity::Worker, move || run_task2_free(&log)).labeled("task2"),
    )
}

pub fn run_task3(spawner: &Spawner, host: &Arc<DemoHost>) -> Result<(), SchedulerError> {
    let host = host.clone();
    spawner.submit_background(
        Task::with_affinity(Affinity::Worker, move || host.run_task3()).labeled("task3"),
    )
}

pub fn run_task4(spawner: &Spawner, log: &Arc<MarkerLog>) -> Result<(), SchedulerError> {
    let object: Arc<dyn Invoke> = Arc::new(SubclassObject::new(log.clone()));
    spawner.submit_background(Task::from_invocable(object, Affinity::Deferred).labeled("task4"))
}

/// bg → main → bg → main. Each stage schedules the next from inside its own
/// body; a failed hand-off is logged by the stage that attempted it.
pub fn run_task5(spawner: &Spawner, log: &Arc<MarkerLog>) -> Result<(), SchedulerError> {
    let s = spawner.clone();
    let log = log.clone();
    spawner.submit_background(
        Task::with_affinity(Affinity::Deferred, move || {
            log.record(TASK5_BG_1);
            let s2 = s.clone();
            let log = log.clone();
            let main_1 = Task::with_affinity(Affinity::Primary, move || {
                log.record(TASK5_MAIN_1);
                let s3 = s2.clone();
                let log = log.clone();
                let bg_2 = Task::with_affinity(Affinity::Deferred, move || {
                    log.record(TASK5_BG_2);
                    let log = log.clone();
                    let main_2 = Task::with_affinity(Affinity::Primary, move || {
                        log.record(TASK5_MAIN_2);
                    })
                    .labeled("task5/main-2");
                    if let Err(e) = s3.submit_main(main_2) {
                        warn!(error = %e, "task5: hand-off to main failed");
                    }
                })
                .labeled("task5/bg-2");
                if let Err(e) = s2.submit_background(bg_2) {
                    warn!(error = %e, "task5: hand-off to background failed");
                }
            })
            .labeled("task5/main-1");
            if let Err(e) = s.submit_main(main_1) {
                warn!(error = %e, "task5: hand-off to main failed");
            }
        })
        .labeled("task5/bg-1"),
    )
}

/// Number of markers [`run_all`] eventually produces.
pub const RUN_ALL_MARKERS: usize = 4 + TASK5_SEQUENCE.len();

/// Submit all five demo entry points in order.
pub fn run_all(spawner: &Spawner, log: &Arc<MarkerLog>) -> Result<(), SchedulerError> {
    let host = DemoHost::new(log.clone());
    run_task1(spawner, log)?;
    run_task2(spawner, log)?;
    run_task3(spawner, &host)?;
    run_task4(spawner, log)?;
    run_task5(spawner, log)
}
