//! Flow execution engine.
//!
//! `FlowRunner` is the run controller:
//! 1. Parses and validates the flow document, prunes unconnected nodes,
//!    builds the dependency index and rejects cycles.
//! 2. Starts a fresh `TaskQueue` whose workers dispatch tasks through the
//!    `Dispatcher` and report each outcome as a `Completion`.
//! 3. Seeds the queue with the `Start` node and spawns the coordinator,
//!    which fans out newly unblocked dependents until the run completes,
//!    is stopped or times out.
//!
//! Only one run is active at a time.  Each run gets its own epoch number;
//! a coordinator only ever ends the run it was spawned for.

use std::collections::{HashMap, HashSet};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use nodes::dispatcher::panic_detail;
use nodes::{Dispatcher, NodeError};
use queue::{TaskHandler, TaskQueue, DEFAULT_CAPACITY, DEFAULT_WORKERS};

use crate::dag::{self, DependencyIndex};
use crate::events::{Event, EventSink};
use crate::models::{Flowchart, Node, Task};
use crate::EngineError;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning knobs for the runner.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Worker pool size per run.
    pub workers: usize,
    /// Capacity of the task channel.
    pub queue_capacity: usize,
    /// Wall-clock limit for a run, measured from coordinator start.
    pub run_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_CAPACITY,
            run_timeout: Duration::from_secs(10 * 60),
        }
    }
}

// ---------------------------------------------------------------------------
// Workers
// ---------------------------------------------------------------------------

/// Sent by a worker once it is done with a task.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Completion {
    node_id: String,
    succeeded: bool,
}

/// Worker-side task handling: dispatch, bracket with events, notify the
/// coordinator.
struct TaskRunner {
    dispatcher: Arc<Dispatcher>,
    events: Arc<dyn EventSink>,
    completions: mpsc::UnboundedSender<Completion>,
}

#[async_trait]
impl TaskHandler<Task> for TaskRunner {
    async fn handle(&self, worker_id: usize, task: Task) {
        debug!(worker_id, task_id = %task.id, node_type = %task.node_type, "worker picked up task");
        self.events.emit(Event::TaskStarted {
            task_id: task.id.clone(),
        });

        // Driver calls block for the duration of the physical action.
        let dispatcher = self.dispatcher.clone();
        let Task { id, node_type, config } = task;
        let (task_id, tag) = (id.clone(), node_type.clone());
        let outcome = tokio::task::spawn_blocking(move || dispatcher.dispatch(&task_id, &tag, &config))
            .await
            .unwrap_or_else(|join_err| {
                let detail = if join_err.is_panic() {
                    panic_detail(join_err.into_panic().as_ref())
                } else {
                    join_err.to_string()
                };
                Err(NodeError::TaskPanic { detail })
            });

        let succeeded = outcome.is_ok();
        match outcome {
            Ok(()) => {
                info!(worker_id, task_id = %id, node_type = %node_type, "task succeeded");
                self.events.emit(Event::TaskSuccess {
                    task_id: id.clone(),
                    node_type,
                });
            }
            Err(e) => {
                warn!(worker_id, task_id = %id, error = %e, "task failed");
                self.events.emit(Event::TaskError {
                    task_id: id.clone(),
                    error: e.to_string(),
                });
            }
        }

        self.events.emit(Event::TaskCompleted { task_id: id.clone() });
        if self
            .completions
            .send(Completion {
                node_id: id,
                succeeded,
            })
            .is_err()
        {
            debug!(worker_id, "coordinator gone, completion discarded");
        }
    }
}

// ---------------------------------------------------------------------------
// Run state
// ---------------------------------------------------------------------------

/// Everything one run needs to schedule its nodes.  Owned by the run's
/// coordinator, which is the only writer of `completed`.
#[derive(Debug)]
struct RunEpoch {
    id: u64,
    nodes: HashMap<String, Node>,
    index: DependencyIndex,
    completed: HashSet<String>,
    scheduled: HashSet<String>,
}

impl RunEpoch {
    /// A node may be enqueued once every one of its known predecessors
    /// completed.  Edges from unknown ids are ignored, as in validation.
    fn can_enqueue(&self, node_id: &str) -> bool {
        self.index
            .predecessors_of(node_id)
            .iter()
            .filter(|p| self.nodes.contains_key(p.as_str()))
            .all(|p| self.completed.contains(p))
    }

    /// Record a successful completion and return the tasks it unblocked.
    fn complete(&mut self, node_id: &str) -> Vec<Task> {
        self.completed.insert(node_id.to_owned());

        let mut ready = Vec::new();
        for dependent in self.index.dependents_of(node_id) {
            if self.scheduled.contains(dependent) || !self.can_enqueue(dependent) {
                continue;
            }
            if let Some(node) = self.nodes.get(dependent) {
                self.scheduled.insert(dependent.clone());
                ready.push(Task::from(node));
            }
        }
        ready
    }

    fn is_finished(&self) -> bool {
        self.completed.len() == self.nodes.len()
    }
}

struct ActiveRun {
    epoch: u64,
    queue: Arc<TaskQueue<Task>>,
}

#[derive(Default)]
struct RunState {
    last_epoch: u64,
    active: Option<ActiveRun>,
}

struct Shared {
    state: Mutex<RunState>,
    events: Arc<dyn EventSink>,
}

impl Shared {
    /// End run `epoch` with the terminal `event`.  No-op when that run is
    /// no longer the active one, so each run emits exactly one terminal
    /// event.
    async fn finish(&self, epoch: u64, event: Event) {
        let queue = {
            let mut state = self.state.lock().await;
            match state.active.take() {
                Some(run) if run.epoch == epoch => run.queue,
                other => {
                    state.active = other;
                    return;
                }
            }
        };

        info!(epoch, event = event.name(), "execution finished");
        self.events.emit(event);
        queue.stop().await;
    }
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

/// What woke the coordinator up.
enum Wake {
    Cancelled,
    TimedOut,
    Completion(Option<Completion>),
}

struct Coordinator {
    shared: Arc<Shared>,
    run: RunEpoch,
    queue: Arc<TaskQueue<Task>>,
    completions: mpsc::UnboundedReceiver<Completion>,
    cancel: CancellationToken,
    timeout: Duration,
}

impl Coordinator {
    async fn run(mut self) {
        let epoch = self.run.id;
        let deadline = tokio::time::sleep(self.timeout);
        tokio::pin!(deadline);

        loop {
            let wake = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Wake::Cancelled,
                _ = &mut deadline => Wake::TimedOut,
                completion = self.completions.recv() => Wake::Completion(completion),
            };

            let terminal = match wake {
                Wake::Cancelled => self.stopped(),
                Wake::TimedOut => self.timed_out(),
                Wake::Completion(Some(completion)) => {
                    match self.on_completion(completion, deadline.as_mut()).await {
                        Some(terminal) => terminal,
                        None => continue,
                    }
                }
                Wake::Completion(None) => Event::ExecutionError {
                    error: "completion channel closed".into(),
                },
            };

            self.shared.finish(epoch, terminal).await;
            return;
        }
    }

    fn stopped(&self) -> Event {
        debug!(epoch = self.run.id, "coordinator observed cancellation");
        Event::ExecutionStopped
    }

    fn timed_out(&self) -> Event {
        warn!(epoch = self.run.id, timeout = ?self.timeout, "execution timed out");
        Event::ExecutionTimedOut
    }

    /// Record `completion` and enqueue the dependents it unblocked.
    ///
    /// Returns the terminal event once every node has completed, or as soon
    /// as cancellation or the deadline wins over a blocked enqueue.
    async fn on_completion(&mut self, completion: Completion, mut deadline: Pin<&mut Sleep>) -> Option<Event> {
        if !completion.succeeded {
            // Dependents of a failed node are never unblocked.
            debug!(node_id = %completion.node_id, "branch stalled on failed task");
            return None;
        }

        for task in self.run.complete(&completion.node_id) {
            let task_id = task.id.clone();
            // A full channel with every worker hung must not hide the deadline.
            let sent = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Some(self.stopped()),
                _ = &mut deadline => return Some(self.timed_out()),
                sent = self.queue.enqueue(task) => sent,
            };
            if !sent {
                warn!(%task_id, "dependent was not enqueued");
            }
        }

        debug!(
            completed = self.run.completed.len(),
            total = self.run.nodes.len(),
            "completion recorded"
        );
        self.run.is_finished().then_some(Event::ExecutionCompleted)
    }
}

// ---------------------------------------------------------------------------
// FlowRunner
// ---------------------------------------------------------------------------

/// Runs flowcharts, one at a time.
pub struct FlowRunner {
    dispatcher: Arc<Dispatcher>,
    shared: Arc<Shared>,
    config: EngineConfig,
}

impl FlowRunner {
    pub fn new(dispatcher: Dispatcher, events: Arc<dyn EventSink>, config: EngineConfig) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
            shared: Arc::new(Shared {
                state: Mutex::new(RunState::default()),
                events,
            }),
            config,
        }
    }

    /// Validate `document` and start running it in the background.
    ///
    /// Returns as soon as the `Start` node is enqueued; progress and the
    /// terminal state are reported through events only.
    ///
    /// # Errors
    /// Pre-flight failures only: [`EngineError::AlreadyRunning`], document
    /// or graph errors.  No run is started when an error is returned.
    #[instrument(skip_all, fields(bytes = document.len()))]
    pub async fn start_execution(&self, document: &[u8]) -> Result<(), EngineError> {
        let mut state = self.shared.state.lock().await;
        if state.active.is_some() {
            return Err(EngineError::AlreadyRunning);
        }

        let Plan { nodes, index, start, order } = prepare(document)?;
        info!(nodes = nodes.len(), ?order, "flowchart validated");

        state.last_epoch += 1;
        let epoch = state.last_epoch;
        let mut run = RunEpoch {
            id: epoch,
            nodes,
            index,
            completed: HashSet::new(),
            scheduled: HashSet::new(),
        };

        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let queue = Arc::new(TaskQueue::new(self.config.queue_capacity));
        let runner = Arc::new(TaskRunner {
            dispatcher: self.dispatcher.clone(),
            events: self.shared.events.clone(),
            completions: completions_tx,
        });
        queue.start(self.config.workers, runner).await;
        let cancel = queue.cancellation_token().await;

        state.active = Some(ActiveRun {
            epoch,
            queue: queue.clone(),
        });

        run.scheduled.insert(start.id.clone());
        if !queue.enqueue(Task::from(&start)).await {
            warn!(start = %start.id, "start task was not enqueued");
        }

        let coordinator = Coordinator {
            shared: self.shared.clone(),
            run,
            queue,
            completions: completions_rx,
            cancel,
            timeout: self.config.run_timeout,
        };
        tokio::spawn(coordinator.run());

        info!(epoch, start = %start.id, "execution started");
        Ok(())
    }

    /// Stop the active run, waiting for in-flight tasks to finish.
    ///
    /// No-op when nothing is running.
    #[instrument(skip_all)]
    pub async fn stop_execution(&self) {
        let run = self.shared.state.lock().await.active.take();
        let Some(run) = run else {
            debug!("no execution to stop");
            return;
        };

        run.queue.stop().await;
        info!(epoch = run.epoch, "execution stopped");
        self.shared.events.emit(Event::ExecutionStopped);
    }

    pub async fn is_executing(&self) -> bool {
        self.shared.state.lock().await.active.is_some()
    }
}

/// Parse and check `document` without running it.  Returns the execution
/// order of the connected nodes.
///
/// # Errors
/// The same pre-flight errors as [`FlowRunner::start_execution`], minus
/// `AlreadyRunning`.
pub fn plan(document: &[u8]) -> Result<Vec<String>, EngineError> {
    Ok(prepare(document)?.order)
}

/// A validated, pruned flowchart ready to run.
struct Plan {
    nodes: HashMap<String, Node>,
    index: DependencyIndex,
    start: Node,
    order: Vec<String>,
}

fn prepare(document: &[u8]) -> Result<Plan, EngineError> {
    let flow = Flowchart::parse(document)?;
    dag::validate(&flow)?;
    let nodes = dag::prune(&flow);
    let index = DependencyIndex::build(&flow.edges);
    let start = dag::find_start_node(&flow, &nodes)
        .cloned()
        .ok_or(EngineError::NoStartNode)?;
    let order = dag::topological_order(&flow, &nodes, &index)?;
    Ok(Plan {
        nodes,
        index,
        start,
        order,
    })
}
