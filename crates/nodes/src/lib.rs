//! `nodes` crate — the task dispatcher and the built-in automation nodes.
//!
//! Every node type, built-in or registered by an embedding application,
//! implements [`ExecutableNode`].  The engine routes a task's type tag through
//! a [`Dispatcher`], which owns the [`NodeRegistry`] and the
//! [`AutomationDriver`] that performs the physical pointer/keyboard actions.

pub mod builtin;
pub mod config;
pub mod dispatcher;
pub mod driver;
pub mod error;
pub mod mock;
pub mod node;

pub use dispatcher::{Dispatcher, NodeRegistry};
pub use driver::{AutomationDriver, DriverError, LoggingDriver, MouseButton, Point, ScrollAxis};
pub use error::NodeError;
pub use node::{ExecutableNode, ExecutionContext};
