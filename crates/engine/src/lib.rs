//! `engine` crate — flowchart model, graph checks, progress events and the
//! execution engine.

pub mod models;
pub mod error;
pub mod dag;
pub mod events;
pub mod executor;

pub use models::{Edge, Flowchart, Metadata, Node, Position, Task};
pub use error::EngineError;
pub use dag::DependencyIndex;
pub use events::{ChannelEventSink, Event, EventSink, TracingEventSink};
pub use executor::{plan, EngineConfig, FlowRunner};

#[cfg(test)]
mod executor_tests;
