//! Progress events and the sinks they are emitted into.
//!
//! Emission is fire-and-forget: the engine never waits for, or learns
//! about, delivery.

use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::info;

/// Everything the engine reports about a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum Event {
    /// A worker picked the task up.
    TaskStarted {
        #[serde(rename = "taskID")]
        task_id: String,
    },
    /// The worker finished with the task, whatever the outcome.
    TaskCompleted {
        #[serde(rename = "taskID")]
        task_id: String,
    },
    TaskSuccess {
        #[serde(rename = "taskID")]
        task_id: String,
        #[serde(rename = "type")]
        node_type: String,
    },
    TaskError {
        #[serde(rename = "taskID")]
        task_id: String,
        error: String,
    },
    ExecutionCompleted,
    ExecutionStopped,
    ExecutionTimedOut,
    ExecutionError {
        error: String,
    },
}

impl Event {
    /// Wire name of the event (`task-started`, `execution-completed`, …).
    pub fn name(&self) -> &'static str {
        match self {
            Self::TaskStarted { .. } => "task-started",
            Self::TaskCompleted { .. } => "task-completed",
            Self::TaskSuccess { .. } => "task-success",
            Self::TaskError { .. } => "task-error",
            Self::ExecutionCompleted => "execution-completed",
            Self::ExecutionStopped => "execution-stopped",
            Self::ExecutionTimedOut => "execution-timed-out",
            Self::ExecutionError { .. } => "execution-error",
        }
    }

    /// Event payload as handed to a presentation layer.
    pub fn payload(&self) -> Value {
        match self {
            Self::TaskStarted { task_id } | Self::TaskCompleted { task_id } => json!(task_id),
            Self::TaskSuccess { task_id, node_type } => json!({ "taskID": task_id, "type": node_type }),
            Self::TaskError { task_id, error } => json!({ "taskID": task_id, "error": error }),
            Self::ExecutionError { error } => json!(error),
            Self::ExecutionCompleted | Self::ExecutionStopped | Self::ExecutionTimedOut => Value::Null,
        }
    }

    /// `true` for the events that end a run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::ExecutionCompleted
                | Self::ExecutionStopped
                | Self::ExecutionTimedOut
                | Self::ExecutionError { .. }
        )
    }
}

/// Receives engine events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);
}

/// Logs every event at `info`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: Event) {
        info!(event = event.name(), payload = %event.payload(), "engine event");
    }
}

/// Forwards every event into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    sender: mpsc::UnboundedSender<Event>,
}

impl ChannelEventSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: Event) {
        // A dropped receiver just means nobody is listening any more.
        let _ = self.sender.send(event);
    }
}
