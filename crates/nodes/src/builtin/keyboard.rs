//! `TypeString` and `KeyTap` nodes.

use serde_json::Value;
use tracing::debug;

use super::SETTLE;
use crate::config::ConfigReader;
use crate::{ExecutableNode, ExecutionContext, NodeError};

/// Types a literal string.
///
/// Config: `{ "text": string }`.
#[derive(Debug, Default)]
pub struct TypeStringNode;

impl ExecutableNode for TypeStringNode {
    fn execute(&self, config: &Value, ctx: &ExecutionContext<'_>) -> Result<(), NodeError> {
        let text = ConfigReader::new(config)?.str("text")?;
        debug!(task_id = ctx.task_id, chars = text.chars().count(), "typing text");
        ctx.driver.type_text(text)?;
        ctx.driver.sleep(SETTLE);
        Ok(())
    }
}

/// Taps a single key.
///
/// Config: `{ "key": string }`.
#[derive(Debug, Default)]
pub struct KeyTapNode;

impl ExecutableNode for KeyTapNode {
    fn execute(&self, config: &Value, ctx: &ExecutionContext<'_>) -> Result<(), NodeError> {
        let key = ConfigReader::new(config)?.str("key")?;
        debug!(task_id = ctx.task_id, key, "tapping key");
        ctx.driver.tap_key(key)?;
        ctx.driver.sleep(SETTLE);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{Action, RecordingDriver};
    use serde_json::json;

    #[test]
    fn type_string_types_then_settles() {
        let driver = RecordingDriver::new();
        let ctx = ExecutionContext { task_id: "t", driver: &driver };
        TypeStringNode.execute(&json!({ "text": "hello" }), &ctx).unwrap();
        assert_eq!(
            driver.actions(),
            vec![Action::TypeText("hello".into()), Action::Sleep(SETTLE)]
        );
    }

    #[test]
    fn key_tap_without_key_is_invalid_config() {
        let driver = RecordingDriver::new();
        let ctx = ExecutionContext { task_id: "t", driver: &driver };
        let err = KeyTapNode.execute(&json!({}), &ctx).unwrap_err();
        assert!(matches!(err, NodeError::InvalidTaskConfig { ref field, .. } if field == "key"));
        assert!(driver.actions().is_empty());
    }
}
