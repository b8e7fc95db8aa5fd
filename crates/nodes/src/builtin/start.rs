use serde_json::Value;
use tracing::info;

use crate::{ExecutableNode, ExecutionContext, NodeError};

/// Flow entry marker.  Always succeeds.
#[derive(Debug, Default)]
pub struct StartNode;

impl ExecutableNode for StartNode {
    fn execute(&self, _config: &Value, ctx: &ExecutionContext<'_>) -> Result<(), NodeError> {
        info!(task_id = ctx.task_id, "flow started");
        Ok(())
    }
}
