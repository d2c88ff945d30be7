//! Bounded executor.
//!
//! [`BoundedExecutor::submit`] starts device tasks as semaphore permits free up
//! and streams their outcomes back in completion order. A worker holds its
//! permit until its outcome is on the channel, so at most `concurrency` tasks
//! are ever between start and outcome.
//!
//! Cancellation is cooperative: once [`CancelSignal::cancel`] fires, queued tasks
//! are reported as `Cancelled` without a connection attempt while running tasks
//! finish on their own.

use std::sync::{Arc, Mutex};

use log::{debug, info, warn};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinHandle;

use crate::device::TaskId;
use crate::session::SessionConnector;
use crate::task::{DeviceOutcome, DeviceTask, OutcomeStatus};

/// Run-wide cancellation flag. Clones share the same flag.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Raises the flag. Returns true only for the call that actually raised it;
    /// later calls are no-ops.
    pub fn cancel(&self) -> bool {
        let was_cancelled = self.tx.send_replace(true);
        if !was_cancelled {
            info!("Cancellation requested, no further devices will be started");
        }
        !was_cancelled
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the flag is raised.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so this only returns once the flag is set.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    /// Raises the flag on Ctrl-C. Abort the returned handle to stop listening.
    pub fn cancel_on_ctrl_c(&self) -> JoinHandle<()> {
        let signal = self.clone();
        tokio::spawn(async move {
            loop {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => {
                        if !signal.cancel() {
                            debug!("Ctrl-C received again, cancellation already in progress");
                        }
                    }
                    Err(err) => {
                        warn!("Unable to listen for Ctrl-C: {err}");
                        return;
                    }
                }
            }
        })
    }
}

/// Completion notification, emitted once per finished task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// Outcomes produced so far, including this one.
    pub processed: usize,
    pub total: usize,
    pub task_id: TaskId,
    pub status: OutcomeStatus,
}

/// Shared progress callback.
pub type ProgressCallback = Arc<dyn Fn(Progress) + Send + Sync>;

struct ProgressTracker {
    processed: Mutex<usize>,
    total: usize,
    callback: Option<ProgressCallback>,
}

impl ProgressTracker {
    fn new(total: usize, callback: Option<ProgressCallback>) -> Self {
        Self {
            processed: Mutex::new(0),
            total,
            callback,
        }
    }

    /// The callback runs under the counter lock so notifications arrive in order.
    fn complete(&self, outcome: &DeviceOutcome) {
        let mut processed = self.processed.lock().unwrap_or_else(|e| e.into_inner());
        *processed += 1;
        debug!(
            "{}/{} {} {} {}",
            *processed, self.total, outcome.task_id, outcome.host, outcome.status
        );
        if let Some(callback) = &self.callback {
            callback(Progress {
                processed: *processed,
                total: self.total,
                task_id: outcome.task_id,
                status: outcome.status,
            });
        }
    }
}

/// Outcomes of one submission, in completion order.
#[derive(Debug)]
pub struct OutcomeStream {
    rx: UnboundedReceiver<DeviceOutcome>,
    total: usize,
}

impl OutcomeStream {
    /// Next finished outcome. `None` once every submitted task has reported.
    pub async fn next(&mut self) -> Option<DeviceOutcome> {
        self.rx.recv().await
    }

    /// Number of tasks submitted, which is also the number of outcomes that will arrive.
    pub fn total(&self) -> usize {
        self.total
    }
}

/// Runs device tasks with a concurrency ceiling.
pub struct BoundedExecutor<C: SessionConnector> {
    connector: Arc<C>,
    concurrency: usize,
    progress: Option<ProgressCallback>,
}

impl<C: SessionConnector> BoundedExecutor<C> {
    /// A ceiling of zero is raised to one.
    pub fn new(connector: Arc<C>, concurrency: usize) -> Self {
        Self {
            connector,
            concurrency: concurrency.max(1),
            progress: None,
        }
    }

    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(Progress) + Send + Sync + 'static,
    {
        self.progress = Some(Arc::new(callback));
        self
    }

    pub fn with_progress_callback(mut self, callback: Option<ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Starts the run in the background and returns its outcome stream.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn submit(&self, tasks: Vec<DeviceTask>, cancel: CancelSignal) -> OutcomeStream {
        let total = tasks.len();
        let (tx, rx) = mpsc::unbounded_channel();
        let tracker = Arc::new(ProgressTracker::new(total, self.progress.clone()));

        debug!("submitting {} tasks, concurrency {}", total, self.concurrency);
        tokio::spawn(dispatch_queue(
            tasks,
            Arc::clone(&self.connector),
            Arc::new(Semaphore::new(self.concurrency)),
            tracker,
            tx,
            cancel,
        ));

        OutcomeStream { rx, total }
    }
}

async fn dispatch_queue<C: SessionConnector>(
    tasks: Vec<DeviceTask>,
    connector: Arc<C>,
    semaphore: Arc<Semaphore>,
    tracker: Arc<ProgressTracker>,
    tx: UnboundedSender<DeviceOutcome>,
    cancel: CancelSignal,
) {
    let mut queue = tasks.into_iter();

    while let Some(task) = queue.next() {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
        };

        let permit = match permit {
            Some(permit) if !cancel.is_cancelled() => permit,
            _ => {
                let mut skipped = 0;
                for task in std::iter::once(task).chain(queue.by_ref()) {
                    let outcome = task.not_run("run cancelled before this device started");
                    tracker.complete(&outcome);
                    let _ = tx.send(outcome);
                    skipped += 1;
                }
                info!("{} queued devices cancelled without connecting", skipped);
                break;
            }
        };

        let connector = Arc::clone(&connector);
        let tracker = Arc::clone(&tracker);
        let tx = tx.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let fallback = task.clone();
            let outcome = match tokio::spawn(task.run(connector, cancel)).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    warn!("{} {} task failed: {}", fallback.id, fallback.device.host, err);
                    let reason = if err.is_panic() {
                        "device task panicked"
                    } else {
                        "device task was aborted"
                    };
                    fallback.crashed(reason)
                }
            };
            tracker.complete(&outcome);
            if tx.send(outcome).is_err() {
                debug!("outcome receiver dropped");
            }
            drop(permit);
        });
    }
}
