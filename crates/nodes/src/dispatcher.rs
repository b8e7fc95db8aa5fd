//! Task dispatch: type tag → `ExecutableNode`, with panics contained at the
//! dispatch boundary.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::builtin::{self, tags};
use crate::{AutomationDriver, ExecutableNode, ExecutionContext, NodeError};

/// Maps type tags to `ExecutableNode` implementations.
pub type NodeRegistry = HashMap<String, Arc<dyn ExecutableNode>>;

/// Routes tasks to their node implementation and runs them against a
/// shared automation driver.
#[derive(Clone)]
pub struct Dispatcher {
    registry: NodeRegistry,
    driver: Arc<dyn AutomationDriver>,
}

impl Dispatcher {
    /// A dispatcher with no nodes registered.
    pub fn new(driver: Arc<dyn AutomationDriver>) -> Self {
        Self {
            registry: NodeRegistry::new(),
            driver,
        }
    }

    /// A dispatcher with every built-in node registered under its tag.
    pub fn with_builtins(driver: Arc<dyn AutomationDriver>) -> Self {
        let mut dispatcher = Self::new(driver);
        dispatcher.register(tags::START, builtin::StartNode);
        dispatcher.register(tags::MOVE_MOUSE, builtin::MoveMouseNode);
        dispatcher.register(tags::CLICK, builtin::ClickNode);
        dispatcher.register(tags::TYPE_STRING, builtin::TypeStringNode);
        dispatcher.register(tags::KEY_TAP, builtin::KeyTapNode);
        dispatcher.register(tags::DELAY, builtin::DelayNode);
        dispatcher
    }

    /// Register (or replace) the implementation for `tag`.
    pub fn register(&mut self, tag: impl Into<String>, node: impl ExecutableNode + 'static) {
        self.registry.insert(tag.into(), Arc::new(node));
    }

    pub fn is_registered(&self, tag: &str) -> bool {
        self.registry.contains_key(tag)
    }

    /// Execute one task.  Blocks for as long as the node's physical actions
    /// take.
    ///
    /// # Errors
    /// - [`NodeError::UnknownTaskType`] if nothing is registered for `node_type`.
    /// - [`NodeError::TaskPanic`] if the node panicked.
    /// - Whatever the node itself returned.
    pub fn dispatch(&self, task_id: &str, node_type: &str, config: &Value) -> Result<(), NodeError> {
        let node = self
            .registry
            .get(node_type)
            .ok_or_else(|| NodeError::UnknownTaskType(node_type.to_owned()))?;

        let ctx = ExecutionContext {
            task_id,
            driver: self.driver.as_ref(),
        };

        debug!(task_id, node_type, "dispatching task");
        match panic::catch_unwind(AssertUnwindSafe(|| node.execute(config, &ctx))) {
            Ok(result) => result,
            Err(payload) => {
                let detail = panic_detail(payload.as_ref());
                warn!(task_id, node_type, %detail, "recovered from panic in task");
                Err(NodeError::TaskPanic { detail })
            }
        }
    }
}

/// Best-effort description of a panic payload.
pub fn panic_detail(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}
