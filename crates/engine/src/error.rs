//! Engine-level error types.
//!
//! Only pre-flight failures surface here; per-task failures are reported
//! as `task-error` events and never abort a run.

use thiserror::Error;

/// Errors returned by [`FlowRunner::start_execution`](crate::FlowRunner::start_execution).
#[derive(Debug, Error)]
pub enum EngineError {
    /// The flow document is not valid JSON or has the wrong structure.
    #[error("invalid flowchart document: {0}")]
    InvalidDocument(#[from] serde_json::Error),

    /// The flowchart has no nodes at all.
    #[error("flowchart must contain at least one node")]
    EmptyGraph,

    /// No node carries the `Start` type tag.
    #[error("flowchart has no Start node")]
    MissingStartNode,

    /// More than one node carries the `Start` type tag.
    #[error("flowchart has {0} Start nodes, expected exactly one")]
    MultipleStartNodes(usize),

    /// The `Start` node was pruned because no edge touches it.
    #[error("no Start node found among connected nodes")]
    NoStartNode,

    /// Two or more nodes share the same ID.
    #[error("duplicate node ID: '{0}'")]
    DuplicateNodeId(String),

    /// The connected graph contains a cycle.
    #[error("flowchart graph contains a cycle")]
    CycleDetected,

    /// Another execution is still in progress.
    #[error("execution already in progress")]
    AlreadyRunning,
}
