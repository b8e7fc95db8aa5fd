//! Test doubles: `RecordingDriver` for the automation collaborator and
//! `MockNode` for `ExecutableNode`.
//!
//! Useful in unit and integration tests where a real input device is either
//! unavailable or irrelevant.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;

use crate::{
    AutomationDriver, DriverError, ExecutableNode, ExecutionContext, MouseButton, NodeError, Point,
    ScrollAxis,
};

// ---------------------------------------------------------------------------
// RecordingDriver
// ---------------------------------------------------------------------------

/// One driver call, in the order it was made.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Move(Point),
    SmoothMove(Point, (f64, f64), u64),
    Press(MouseButton),
    Release(MouseButton),
    Click(MouseButton),
    TypeText(String),
    TapKey(String),
    Scroll(i32, ScrollAxis),
    Sleep(Duration),
}

/// A driver that records every call instead of performing it.  Sleeps are
/// recorded, not slept.
#[derive(Debug, Default)]
pub struct RecordingDriver {
    pointer: Mutex<Point>,
    actions: Mutex<Vec<Action>>,
    fail_smooth: bool,
}

impl RecordingDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with the pointer at `at`.
    pub fn with_pointer(at: Point) -> Self {
        Self {
            pointer: Mutex::new(at),
            ..Self::default()
        }
    }

    /// Make every `move_pointer_smooth` report failure.
    pub fn failing_smooth_moves(mut self) -> Self {
        self.fail_smooth = true;
        self
    }

    /// All calls seen so far.
    pub fn actions(&self) -> Vec<Action> {
        self.actions.lock().unwrap().clone()
    }

    fn record(&self, action: Action) {
        self.actions.lock().unwrap().push(action);
    }
}

impl AutomationDriver for RecordingDriver {
    fn pointer_location(&self) -> Point {
        *self.pointer.lock().unwrap()
    }

    fn move_pointer(&self, to: Point) -> Result<(), DriverError> {
        *self.pointer.lock().unwrap() = to;
        self.record(Action::Move(to));
        Ok(())
    }

    fn move_pointer_smooth(&self, to: Point, jitter: (f64, f64), delay_ms: u64) -> bool {
        self.record(Action::SmoothMove(to, jitter, delay_ms));
        if self.fail_smooth {
            return false;
        }
        *self.pointer.lock().unwrap() = to;
        true
    }

    fn press_button(&self, button: MouseButton) -> Result<(), DriverError> {
        self.record(Action::Press(button));
        Ok(())
    }

    fn release_button(&self, button: MouseButton) -> Result<(), DriverError> {
        self.record(Action::Release(button));
        Ok(())
    }

    fn click(&self, button: MouseButton) -> Result<(), DriverError> {
        self.record(Action::Click(button));
        Ok(())
    }

    fn type_text(&self, text: &str) -> Result<(), DriverError> {
        self.record(Action::TypeText(text.to_owned()));
        Ok(())
    }

    fn tap_key(&self, key: &str) -> Result<(), DriverError> {
        self.record(Action::TapKey(key.to_owned()));
        Ok(())
    }

    fn scroll(&self, amount: i32, axis: ScrollAxis) -> Result<(), DriverError> {
        self.record(Action::Scroll(amount, axis));
        Ok(())
    }

    fn sleep(&self, duration: Duration) {
        self.record(Action::Sleep(duration));
    }
}

// ---------------------------------------------------------------------------
// MockNode
// ---------------------------------------------------------------------------

/// Behaviour injected into `MockNode` at construction time.
#[derive(Debug, Clone)]
pub enum MockBehaviour {
    /// Succeed without touching the driver.
    Succeed,
    /// Fail with `InvalidTaskConfig` naming the given field.
    FailConfig(String),
    /// Panic with the given message.
    Panic(String),
}

/// A mock node that records the id of every task it runs and then behaves
/// as programmed.
#[derive(Debug, Clone)]
pub struct MockNode {
    pub behaviour: MockBehaviour,
    /// Task ids seen by this node (in call order).
    pub calls: Arc<Mutex<Vec<String>>>,
}

impl MockNode {
    pub fn succeeding() -> Self {
        Self::with(MockBehaviour::Succeed)
    }

    pub fn failing_config(field: impl Into<String>) -> Self {
        Self::with(MockBehaviour::FailConfig(field.into()))
    }

    pub fn panicking(msg: impl Into<String>) -> Self {
        Self::with(MockBehaviour::Panic(msg.into()))
    }

    fn with(behaviour: MockBehaviour) -> Self {
        Self {
            behaviour,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Number of times this node has been executed.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Task ids in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl ExecutableNode for MockNode {
    fn execute(&self, _config: &Value, ctx: &ExecutionContext<'_>) -> Result<(), NodeError> {
        self.calls.lock().unwrap().push(ctx.task_id.to_owned());

        match &self.behaviour {
            MockBehaviour::Succeed => Ok(()),
            MockBehaviour::FailConfig(field) => Err(NodeError::InvalidTaskConfig {
                field: field.clone(),
                reason: "is missing".into(),
            }),
            MockBehaviour::Panic(msg) => panic!("{msg}"),
        }
    }
}
