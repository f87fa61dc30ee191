//! Integration tests for application lifecycle, ordering and coalescing.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use splitrt_scheduler::{
    Application, DrainRequest, MainDispatch, Registry, SchedulerConfig, SchedulerError,
    ShutdownPolicy, Task,
};

const TIMEOUT: Duration = Duration::from_secs(5);

/// Records posted drain requests so a test can act as the main context.
#[derive(Default)]
struct RecordingDispatch {
    posted: Mutex<Vec<DrainRequest>>,
}

impl RecordingDispatch {
    fn take(&self) -> Vec<DrainRequest> {
        std::mem::take(&mut *self.posted.lock())
    }

    fn count(&self) -> usize {
        self.posted.lock().len()
    }
}

impl MainDispatch for RecordingDispatch {
    fn post(&self, request: DrainRequest) {
        self.posted.lock().push(request);
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("splitrt_scheduler=debug")
        .with_test_writer()
        .try_init();
}

fn app_with(policy: ShutdownPolicy) -> (Application, Arc<RecordingDispatch>) {
    init_tracing();
    let dispatch = Arc::new(RecordingDispatch::default());
    let config = SchedulerConfig::default().with_policy(policy);
    let app = Application::new(&config, dispatch.clone()).unwrap();
    (app, dispatch)
}

/// Occupies the worker until the returned sender fires.
struct Gate {
    started: mpsc::Receiver<()>,
    release: mpsc::Sender<()>,
}

impl Gate {
    fn submit(app: &Application) -> Self {
        let (started_tx, started) = mpsc::channel::<()>();
        let (release, release_rx) = mpsc::channel::<()>();
        app.submit_background(
            Task::new(move || {
                let _ = started_tx.send(());
                let _ = release_rx.recv_timeout(TIMEOUT);
            })
            .labeled("gate"),
        )
        .unwrap();
        Self { started, release }
    }

    fn wait_started(&self) {
        self.started.recv_timeout(TIMEOUT).expect("gate should start");
    }

    /// Open the gate shortly after the caller has requested shutdown.
    fn release_later(self) -> thread::JoinHandle<()> {
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            let _ = self.release.send(());
        })
    }
}

#[test]
fn background_runs_in_submission_order() {
    let (app, _dispatch) = app_with(ShutdownPolicy::Drain);
    let seen = Arc::new(Mutex::new(Vec::new()));
    for i in 0..200 {
        let seen = seen.clone();
        app.run_on_background(move || seen.lock().push(i)).unwrap();
    }
    app.shutdown().unwrap();
    assert_eq!(*seen.lock(), (0..200).collect::<Vec<_>>());
    assert_eq!(app.stats().background.executed, 200);
}

#[test]
fn background_runs_off_the_caller_thread() {
    let (app, _dispatch) = app_with(ShutdownPolicy::Drain);
    let (tx, rx) = mpsc::channel();
    app.run_on_background(move || tx.send(thread::current().id()).unwrap())
        .unwrap();
    let ran_on = rx.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(ran_on, app.worker_thread_id());
    assert_ne!(ran_on, thread::current().id());
}

#[test]
fn concurrent_submitters_keep_per_thread_order() {
    let (app, _dispatch) = app_with(ShutdownPolicy::Drain);
    let app = Arc::new(app);
    let seen = Arc::new(Mutex::new(Vec::new()));

    let submitters: Vec<_> = (0..4)
        .map(|t| {
            let app = app.clone();
            let seen = seen.clone();
            thread::spawn(move || {
                for i in 0..100 {
                    let seen = seen.clone();
                    app.run_on_background(move || seen.lock().push((t, i))).unwrap();
                }
            })
        })
        .collect();
    for s in submitters {
        s.join().unwrap();
    }
    app.shutdown().unwrap();

    let seen = seen.lock();
    assert_eq!(seen.len(), 400);
    for t in 0..4 {
        let per_thread: Vec<_> = seen.iter().filter(|(st, _)| *st == t).map(|(_, i)| *i).collect();
        assert_eq!(per_thread, (0..100).collect::<Vec<_>>());
    }
}

#[test]
fn main_submissions_coalesce_into_one_request() {
    let (app, dispatch) = app_with(ShutdownPolicy::Drain);
    let seen = Arc::new(Mutex::new(Vec::new()));
    for i in 0..25 {
        let seen = seen.clone();
        app.run_on_main(move || seen.lock().push(i)).unwrap();
    }
    assert_eq!(dispatch.count(), 1);
    assert!(app.is_main_scheduled());
    assert_eq!(app.pending_main(), 25);

    let requests = dispatch.take();
    let ran: usize = requests.into_iter().map(DrainRequest::run).sum();
    assert_eq!(ran, 25);
    assert_eq!(*seen.lock(), (0..25).collect::<Vec<_>>());
    assert!(!app.is_main_scheduled());
    assert_eq!(app.stats().main.requests, 1);
}

#[test]
fn main_submissions_from_many_threads_coalesce() {
    let (app, dispatch) = app_with(ShutdownPolicy::Drain);
    let app = Arc::new(app);
    let hits = Arc::new(AtomicU32::new(0));

    let submitters: Vec<_> = (0..8)
        .map(|_| {
            let app = app.clone();
            let hits = hits.clone();
            thread::spawn(move || {
                for _ in 0..50 {
                    let hits = hits.clone();
                    app.run_on_main(move || {
                        hits.fetch_add(1, Ordering::SeqCst);
                    })
                    .unwrap();
                }
            })
        })
        .collect();
    for s in submitters {
        s.join().unwrap();
    }

    assert_eq!(dispatch.count(), 1, "no drain ran, so only one request may exist");
    assert_eq!(app.run_pending_main_tasks(), 400);
    assert_eq!(hits.load(Ordering::SeqCst), 400);
}

#[test]
fn new_request_after_queue_observed_empty() {
    let (app, dispatch) = app_with(ShutdownPolicy::Drain);
    app.run_on_main(|| {}).unwrap();
    for request in dispatch.take() {
        request.run();
    }
    app.run_on_main(|| {}).unwrap();
    app.run_on_main(|| {}).unwrap();
    assert_eq!(dispatch.count(), 1);
    assert_eq!(app.stats().main.requests, 2);
}

#[test]
fn idle_run_pending_main_tasks_is_noop() {
    let (app, dispatch) = app_with(ShutdownPolicy::Drain);
    assert_eq!(app.run_pending_main_tasks(), 0);
    assert_eq!(app.run_pending_main_tasks(), 0);
    assert!(!app.is_main_scheduled());
    assert_eq!(dispatch.count(), 0);

    // Still schedules normally afterwards.
    app.run_on_main(|| {}).unwrap();
    assert_eq!(dispatch.count(), 1);
}

#[test]
fn spurious_drain_leaves_later_request_harmless() {
    let (app, dispatch) = app_with(ShutdownPolicy::Drain);
    let hits = Arc::new(AtomicU32::new(0));
    let h = hits.clone();
    app.run_on_main(move || {
        h.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();

    // Embedder drains before the posted request is delivered.
    assert_eq!(app.run_pending_main_tasks(), 1);
    let ran: usize = dispatch.take().into_iter().map(DrainRequest::run).sum();
    assert_eq!(ran, 0);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn each_task_runs_exactly_once() {
    let (app, dispatch) = app_with(ShutdownPolicy::Drain);
    let counters: Vec<Arc<AtomicU32>> = (0..50).map(|_| Arc::new(AtomicU32::new(0))).collect();
    for (i, c) in counters.iter().enumerate() {
        let c = c.clone();
        let task = Task::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        if i % 2 == 0 {
            app.submit_background(task).unwrap();
        } else {
            app.submit_main(task).unwrap();
        }
    }
    for request in dispatch.take() {
        request.run();
    }
    // Extra drains must not re-run anything.
    app.run_pending_main_tasks();
    app.shutdown().unwrap();

    for c in &counters {
        assert_eq!(c.load(Ordering::SeqCst), 1);
    }
}

#[test]
fn reentrant_background_submission() {
    let (app, _dispatch) = app_with(ShutdownPolicy::Drain);
    let spawner = app.spawner();
    let (tx, rx) = mpsc::channel();
    app.run_on_background(move || {
        let tx2 = tx.clone();
        tx.send("outer").unwrap();
        spawner
            .run_on_background(move || tx2.send("inner").unwrap())
            .unwrap();
    })
    .unwrap();
    assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), "outer");
    assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), "inner");
}

#[test]
fn shutdown_drain_runs_everything_queued() {
    let (app, _dispatch) = app_with(ShutdownPolicy::Drain);
    let gate = Gate::submit(&app);
    gate.wait_started();

    let hits = Arc::new(AtomicU32::new(0));
    let k = 20;
    for _ in 0..k {
        let hits = hits.clone();
        app.run_on_background(move || {
            hits.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    }

    let releaser = gate.release_later();
    app.shutdown().unwrap();
    releaser.join().unwrap();

    assert_eq!(hits.load(Ordering::SeqCst), k);
    let stats = app.stats();
    assert_eq!(stats.background.executed, k as u64 + 1);
    assert_eq!(stats.background.discarded, 0);
}

#[test]
fn shutdown_discard_drops_queued_work() {
    let (app, _dispatch) = app_with(ShutdownPolicy::Discard);
    let gate = Gate::submit(&app);
    gate.wait_started();

    let hits = Arc::new(AtomicU32::new(0));
    let k = 20;
    for _ in 0..k {
        let hits = hits.clone();
        app.run_on_background(move || {
            hits.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    }

    let releaser = gate.release_later();
    app.shutdown().unwrap();
    releaser.join().unwrap();

    assert_eq!(hits.load(Ordering::SeqCst), 0);
    let stats = app.stats();
    assert_eq!(stats.background.executed, 1);
    assert_eq!(stats.background.discarded, k as u64);
    assert_eq!(app.pending_background(), 0);
}

#[test]
fn submissions_after_shutdown_are_rejected() {
    let (app, _dispatch) = app_with(ShutdownPolicy::Drain);
    let spawner = app.spawner();
    app.shutdown().unwrap();

    assert!(matches!(
        app.run_on_background(|| {}),
        Err(SchedulerError::ShuttingDown(_))
    ));
    assert!(matches!(
        app.run_on_main(|| {}),
        Err(SchedulerError::ShuttingDown(_))
    ));
    // The spawner still resolves while the application value exists.
    assert!(matches!(
        spawner.run_on_main(|| {}),
        Err(SchedulerError::ShuttingDown(_))
    ));
}

#[test]
fn draining_task_cannot_extend_shutdown() {
    let (app, _dispatch) = app_with(ShutdownPolicy::Drain);
    let spawner = app.spawner();
    let gate = Gate::submit(&app);
    gate.wait_started();

    let (tx, rx) = mpsc::channel();
    app.run_on_background(move || {
        let result = spawner.run_on_background(|| {});
        tx.send(matches!(result, Err(SchedulerError::ShuttingDown(_))))
            .unwrap();
    })
    .unwrap();

    let releaser = gate.release_later();
    app.shutdown().unwrap();
    releaser.join().unwrap();

    assert!(rx.recv_timeout(TIMEOUT).unwrap(), "resubmission during drain must be rejected");
}

#[test]
fn destroy_closes_main_trampoline() {
    let (app, dispatch) = app_with(ShutdownPolicy::Drain);
    let hits = Arc::new(AtomicU32::new(0));
    for _ in 0..3 {
        let hits = hits.clone();
        app.run_on_main(move || {
            hits.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    }
    app.shutdown().unwrap();

    // The outstanding request is delivered late and finds nothing.
    let ran: usize = dispatch.take().into_iter().map(DrainRequest::run).sum();
    assert_eq!(ran, 0);
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert_eq!(app.stats().main.discarded, 3);
    assert!(!app.is_main_scheduled());
}

#[test]
fn drain_request_after_drop_is_noop() {
    let (app, dispatch) = app_with(ShutdownPolicy::Drain);
    app.run_on_main(|| panic!("must not run")).unwrap();
    drop(app);
    let ran: usize = dispatch.take().into_iter().map(DrainRequest::run).sum();
    assert_eq!(ran, 0);
}

#[test]
fn spawner_outliving_application_reports_gone() {
    let (app, _dispatch) = app_with(ShutdownPolicy::Drain);
    let spawner = app.spawner();
    drop(app);
    assert!(matches!(
        spawner.run_on_background(|| {}),
        Err(SchedulerError::ApplicationGone)
    ));
}

#[test]
fn shutdown_is_idempotent() {
    let (app, _dispatch) = app_with(ShutdownPolicy::Drain);
    app.shutdown().unwrap();
    app.shutdown().unwrap();
}

#[test]
fn shutdown_from_worker_is_refused() {
    let (app, _dispatch) = app_with(ShutdownPolicy::Drain);
    let app = Arc::new(app);
    let inside = app.clone();
    let (tx, rx) = mpsc::channel();
    app.run_on_background(move || {
        let result = inside.shutdown();
        tx.send(matches!(result, Err(SchedulerError::SelfJoin(_))))
            .unwrap();
    })
    .unwrap();
    assert!(rx.recv_timeout(TIMEOUT).unwrap());
    // Shutdown was still requested.
    assert!(matches!(
        app.run_on_background(|| {}),
        Err(SchedulerError::ShuttingDown(_))
    ));
    // The refused join is completed from an outside thread.
    app.shutdown().unwrap();
    app.shutdown().unwrap();
}

#[test]
fn concurrent_shutdown_waits_for_the_join() {
    let (app, _dispatch) = app_with(ShutdownPolicy::Drain);
    let app = Arc::new(app);
    let finished = Arc::new(AtomicBool::new(false));
    let (started_tx, started_rx) = mpsc::channel();
    let flag = finished.clone();
    app.run_on_background(move || {
        started_tx.send(()).unwrap();
        thread::sleep(Duration::from_millis(300));
        flag.store(true, Ordering::SeqCst);
    })
    .unwrap();
    started_rx.recv_timeout(TIMEOUT).unwrap();

    let first = app.clone();
    let joiner = thread::spawn(move || first.shutdown());
    thread::sleep(Duration::from_millis(50));

    app.shutdown().unwrap();
    assert!(finished.load(Ordering::SeqCst));
    joiner.join().unwrap().unwrap();
}

#[test]
fn unspawnable_worker_fails_construction() {
    init_tracing();
    let mut config = SchedulerConfig::default();
    config.worker_stack_kb = Some(u32::MAX);

    let dispatch = Arc::new(RecordingDispatch::default());
    assert!(matches!(
        Application::new(&config, dispatch.clone()),
        Err(SchedulerError::Spawn(_))
    ));

    let registry = Registry::new();
    assert!(matches!(
        registry.create(&config, dispatch),
        Err(SchedulerError::Spawn(_))
    ));
    assert!(registry.is_empty());
}

#[test]
fn panicking_tasks_are_contained() {
    let (app, dispatch) = app_with(ShutdownPolicy::Drain);
    let (tx, rx) = mpsc::channel();
    app.run_on_background(|| panic!("background failure")).unwrap();
    let tx_bg = tx.clone();
    app.run_on_background(move || tx_bg.send("bg alive").unwrap())
        .unwrap();
    assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), "bg alive");

    app.run_on_main(|| panic!("main failure")).unwrap();
    app.run_on_main(move || tx.send("main alive").unwrap()).unwrap();
    for request in dispatch.take() {
        request.run();
    }
    assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), "main alive");

    app.shutdown().unwrap();
    let stats = app.stats();
    assert_eq!(stats.background.panicked, 1);
    assert_eq!(stats.main.panicked, 1);
}

#[test]
fn worker_thread_uses_configured_name() {
    let dispatch = Arc::new(RecordingDispatch::default());
    let mut config = SchedulerConfig::default();
    config.worker_name = "renderer-bg".into();
    config.worker_stack_kb = Some(256);
    let app = Application::new(&config, dispatch).unwrap();
    let (tx, rx) = mpsc::channel();
    app.run_on_background(move || {
        tx.send(thread::current().name().map(str::to_owned)).unwrap()
    })
    .unwrap();
    assert_eq!(rx.recv_timeout(TIMEOUT).unwrap().as_deref(), Some("renderer-bg"));
}
