//! A cooperative main context built on a tokio channel.
//!
//! [`EventLoopDispatch`] is the [`MainDispatch`] half: posting is a
//! non-blocking channel send. [`EventLoop`] is owned by whichever thread plays
//! the main context and runs each received [`DrainRequest`] to completion
//! before taking the next one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{trace, warn};

use crate::error::SchedulerError;
use crate::trampoline::{DrainRequest, MainDispatch};

pub struct EventLoopDispatch {
    tx: UnboundedSender<DrainRequest>,
    posted: Arc<AtomicU64>,
}

impl MainDispatch for EventLoopDispatch {
    fn post(&self, request: DrainRequest) {
        let app = request.app();
        if self.tx.send(request).is_err() {
            warn!(%app, "main event loop is gone; drain request dropped");
            return;
        }
        self.posted.fetch_add(1, Ordering::Relaxed);
    }
}

pub struct EventLoop {
    rx: UnboundedReceiver<DrainRequest>,
    posted: Arc<AtomicU64>,
    handled: u64,
    tasks_run: u64,
}

impl EventLoop {
    pub fn new() -> (Arc<EventLoopDispatch>, EventLoop) {
        let (tx, rx) = mpsc::unbounded_channel();
        let posted = Arc::new(AtomicU64::new(0));
        let dispatch = Arc::new(EventLoopDispatch {
            tx,
            posted: posted.clone(),
        });
        let event_loop = EventLoop {
            rx,
            posted,
            handled: 0,
            tasks_run: 0,
        };
        (dispatch, event_loop)
    }

    fn handle(&mut self, request: DrainRequest) -> usize {
        let app = request.app();
        let ran = request.run();
        self.handled += 1;
        self.tasks_run += ran as u64;
        trace!(%app, ran, "drain request handled");
        ran
    }

    /// Wait for the next request and run it. `None` once every dispatch
    /// handle has been dropped.
    pub async fn turn(&mut self) -> Option<usize> {
        let request = self.rx.recv().await?;
        Some(self.handle(request))
    }

    /// Run one request if one is already waiting.
    pub fn try_turn(&mut self) -> Option<usize> {
        let request = self.rx.try_recv().ok()?;
        Some(self.handle(request))
    }

    /// Run every request that is already waiting. Returns tasks run.
    pub fn pump(&mut self) -> usize {
        let mut ran = 0;
        while let Some(n) = self.try_turn() {
            ran += n;
        }
        ran
    }

    /// Keep turning until `done` holds, checking it before each wait.
    pub async fn run_until<F>(&mut self, mut done: F, limit: Duration) -> Result<(), SchedulerError>
    where
        F: FnMut() -> bool,
    {
        let drive = async {
            while !done() {
                if self.turn().await.is_none() {
                    return Err(SchedulerError::LoopClosed);
                }
            }
            Ok(())
        };
        tokio::time::timeout(limit, drive)
            .await
            .map_err(|_| SchedulerError::Timeout(limit))?
    }

    /// Requests successfully posted by the dispatch half.
    pub fn requests_posted(&self) -> u64 {
        self.posted.load(Ordering::Relaxed)
    }

    /// Requests this loop has run.
    pub fn requests_handled(&self) -> u64 {
        self.handled
    }

    pub fn tasks_run(&self) -> u64 {
        self.tasks_run
    }
}
