//! The `ExecutableNode` trait: the contract every node must fulfil.

use serde_json::Value;

use crate::{AutomationDriver, NodeError};

/// Per-dispatch context handed to a node.
#[derive(Clone, Copy)]
pub struct ExecutionContext<'a> {
    /// ID of the flowchart node being executed (used for log correlation).
    pub task_id: &'a str,
    /// The pointer/keyboard collaborator.
    pub driver: &'a dyn AutomationDriver,
}

/// The core node trait.
///
/// Implementations validate their configuration payload, then perform their
/// side effects through `ctx.driver`.  They run on a blocking thread and may
/// block for as long as the physical action takes.
pub trait ExecutableNode: Send + Sync {
    fn execute(&self, config: &Value, ctx: &ExecutionContext<'_>) -> Result<(), NodeError>;
}
