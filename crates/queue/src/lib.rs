//! `queue` crate — a bounded, cancellable work queue backing a fixed-size
//! pool of tokio workers.
//!
//! Lifecycle (per queue instance): `Idle → Running` on [`TaskQueue::start`],
//! `Running → Idle` on [`TaskQueue::stop`].  Both transitions are
//! idempotent: starting a running queue or stopping an idle one is a no-op.
//!
//! Workers pull tasks until either the channel closes or the queue's
//! cancellation token fires.  A task that has already been handed to a
//! handler is always allowed to finish.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Default channel capacity.
pub const DEFAULT_CAPACITY: usize = 100;
/// Default number of workers.
pub const DEFAULT_WORKERS: usize = 3;

/// Processes one task on behalf of a worker.
#[async_trait]
pub trait TaskHandler<T: Send + 'static>: Send + Sync + 'static {
    async fn handle(&self, worker_id: usize, task: T);
}

struct Running<T> {
    sender: mpsc::Sender<T>,
    workers: Vec<JoinHandle<()>>,
}

struct Lifecycle<T> {
    cancel: CancellationToken,
    running: Option<Running<T>>,
}

/// Bounded FIFO work queue with a worker pool.
pub struct TaskQueue<T> {
    capacity: usize,
    lifecycle: Mutex<Lifecycle<T>>,
}

impl<T: Send + 'static> TaskQueue<T> {
    /// Create an idle queue whose channel holds at most `capacity` tasks.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            lifecycle: Mutex::new(Lifecycle {
                cancel: CancellationToken::new(),
                running: None,
            }),
        }
    }

    /// Spawn `workers` workers feeding tasks into `handler`.
    ///
    /// No-op if the queue is already running.
    pub async fn start<H>(&self, workers: usize, handler: Arc<H>)
    where
        H: TaskHandler<T>,
    {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.running.is_some() {
            debug!("task queue already started");
            return;
        }
        if lifecycle.cancel.is_cancelled() {
            lifecycle.cancel = CancellationToken::new();
        }

        let (sender, receiver) = mpsc::channel(self.capacity);
        let receiver = Arc::new(Mutex::new(receiver));
        let workers = workers.max(1);

        let handles = (0..workers)
            .map(|worker_id| {
                tokio::spawn(worker(
                    worker_id,
                    receiver.clone(),
                    lifecycle.cancel.clone(),
                    handler.clone(),
                ))
            })
            .collect();

        lifecycle.running = Some(Running {
            sender,
            workers: handles,
        });
        info!(workers, capacity = self.capacity, "task queue started");
    }

    /// Push a task, waiting for channel space if the queue is full.
    ///
    /// Returns `false` when the task was dropped because the queue is idle or
    /// its cancellation token has fired.
    pub async fn enqueue(&self, task: T) -> bool {
        let (sender, cancel) = {
            let lifecycle = self.lifecycle.lock().await;
            match &lifecycle.running {
                Some(running) => (running.sender.clone(), lifecycle.cancel.clone()),
                None => {
                    warn!("task queue is not running, dropping task");
                    return false;
                }
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("task queue is cancelled, dropping task");
                false
            }
            sent = sender.send(task) => {
                if sent.is_err() {
                    warn!("task queue is closed, dropping task");
                }
                sent.is_ok()
            }
        }
    }

    /// Cancel the queue, close the channel and wait for every worker to exit.
    ///
    /// No-op if the queue is idle.
    pub async fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        let Some(running) = lifecycle.running.take() else {
            debug!("task queue already stopped");
            return;
        };

        lifecycle.cancel.cancel();
        drop(running.sender);

        for (worker_id, handle) in running.workers.into_iter().enumerate() {
            if let Err(e) = handle.await {
                error!(worker_id, error = %e, "worker terminated abnormally");
            }
        }
        info!("task queue has been stopped");
    }

    /// Token that fires when the current (or next) run of the queue is
    /// stopped.
    pub async fn cancellation_token(&self) -> CancellationToken {
        self.lifecycle.lock().await.cancel.clone()
    }

    pub async fn is_running(&self) -> bool {
        self.lifecycle.lock().await.running.is_some()
    }

    /// Number of live worker handles (0 when idle).
    pub async fn worker_count(&self) -> usize {
        self.lifecycle
            .lock()
            .await
            .running
            .as_ref()
            .map_or(0, |r| r.workers.len())
    }
}

async fn worker<T, H>(
    worker_id: usize,
    receiver: Arc<Mutex<mpsc::Receiver<T>>>,
    cancel: CancellationToken,
    handler: Arc<H>,
) where
    T: Send + 'static,
    H: TaskHandler<T>,
{
    debug!(worker_id, "worker started");
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(worker_id, "worker stopping: cancelled");
                return;
            }
            next = async { receiver.lock().await.recv().await } => next,
        };

        match next {
            Some(task) => handler.handle(worker_id, task).await,
            None => {
                debug!(worker_id, "worker stopping: channel closed");
                return;
            }
        }
    }
}
