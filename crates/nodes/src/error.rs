//! Node-level error type.

use thiserror::Error;

use crate::driver::DriverError;

/// Errors returned while dispatching a single task.
///
/// None of these abort a run: the engine reports them as a `task-error`
/// event and the worker moves on to the next task.
#[derive(Debug, Error)]
pub enum NodeError {
    /// A required configuration field is missing or has the wrong shape.
    #[error("invalid task config: field '{field}' {reason}")]
    InvalidTaskConfig { field: String, reason: String },

    /// A `[min, max]` range where `min > max`.
    #[error("invalid range: min {min} is greater than max {max}")]
    InvalidRange { min: f64, max: f64 },

    /// No node implementation is registered for the type tag.
    #[error("unknown task type '{0}'")]
    UnknownTaskType(String),

    /// The node implementation panicked; `detail` is the captured message.
    #[error("task panicked: {detail}")]
    TaskPanic { detail: String },

    /// The automation driver rejected an action.
    #[error("automation driver error: {0}")]
    Driver(#[from] DriverError),
}

impl NodeError {
    pub(crate) fn config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidTaskConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
