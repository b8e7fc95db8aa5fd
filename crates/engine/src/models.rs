//! Core domain models for the flow engine.
//!
//! These types are the source of truth for what a flowchart looks like in
//! memory.  They serialise to/from the flow document
//! `{nodes:[{id,type,data,position}], edges:[{id,source,target}]}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::EngineError;

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// Editor canvas position.  Irrelevant to execution, kept for round trips.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// A single automation step in the flowchart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique identifier within this flowchart (referenced by edges).
    pub id: String,
    /// Type tag routed to a registered `ExecutableNode` (`Start`, `Click`, …).
    #[serde(rename = "type")]
    pub node_type: String,
    /// Configuration payload; its shape depends on `node_type`.
    #[serde(default)]
    pub data: Value,
    #[serde(default, deserialize_with = "null_as_default")]
    pub position: Position,
}

/// Editors write `null` for nodes that were never placed on the canvas.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

impl Node {
    /// Convenience constructor for testing.
    pub fn new(id: impl Into<String>, node_type: impl Into<String>, data: Value) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            data,
            position: Position::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Edge
// ---------------------------------------------------------------------------

/// Directed edge: `target` may only run once `source` has completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    #[serde(default)]
    pub id: String,
    pub source: String,
    pub target: String,
}

impl Edge {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        let source = source.into();
        let target = target.into();
        Self {
            id: format!("{source}->{target}"),
            source,
            target,
        }
    }
}

// ---------------------------------------------------------------------------
// Flowchart
// ---------------------------------------------------------------------------

/// Optional document-level metadata written by the editor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A complete flow document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Flowchart {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl Flowchart {
    pub fn new(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        Self {
            nodes,
            edges,
            metadata: None,
        }
    }

    /// Deserialize a flow document.
    ///
    /// # Errors
    /// [`EngineError::InvalidDocument`] on malformed JSON or structure.
    pub fn parse(bytes: &[u8]) -> Result<Self, EngineError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Pretty-printed JSON document.
    pub fn to_json(&self) -> Result<Vec<u8>, EngineError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Stamp `metadata.modified` (and `created` on first save) with `now`.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        let metadata = self.metadata.get_or_insert_with(Metadata::default);
        metadata.created.get_or_insert(now);
        metadata.modified = Some(now);
    }
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// Runtime projection of a node, enqueued for execution.  Carries no
/// result: outcomes travel through events and completion notifications.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: String,
    pub node_type: String,
    pub config: Value,
}

impl From<&Node> for Task {
    fn from(node: &Node) -> Self {
        Self {
            id: node.id.clone(),
            node_type: node.node_type.clone(),
            config: node.data.clone(),
        }
    }
}
