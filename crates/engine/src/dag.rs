//! Graph checks and the dependency index, run before executing a
//! flowchart.
//!
//! Rules enforced:
//! 1. The flowchart has at least one node and exactly one `Start` node.
//! 2. Node IDs are unique.
//! 3. The connected (pruned) subgraph is acyclic.
//!
//! Edges referencing unknown node IDs are tolerated: they are ignored when
//! pruning and when checking for cycles.

use std::collections::{HashMap, HashSet, VecDeque};

use nodes::builtin::tags;

use crate::models::{Edge, Flowchart, Node};
use crate::EngineError;

/// Validate the document-level invariants.
///
/// # Errors
/// - [`EngineError::EmptyGraph`] if there are no nodes.
/// - [`EngineError::MissingStartNode`] if no node is tagged `Start`.
/// - [`EngineError::MultipleStartNodes`] if more than one node is.
/// - [`EngineError::DuplicateNodeId`] if two nodes share an ID.
pub fn validate(flow: &Flowchart) -> Result<(), EngineError> {
    if flow.nodes.is_empty() {
        return Err(EngineError::EmptyGraph);
    }
    match flow.nodes.iter().filter(|n| n.node_type == tags::START).count() {
        0 => return Err(EngineError::MissingStartNode),
        1 => {}
        n => return Err(EngineError::MultipleStartNodes(n)),
    }

    let mut seen_ids: HashSet<&str> = HashSet::new();
    for node in &flow.nodes {
        if !seen_ids.insert(node.id.as_str()) {
            return Err(EngineError::DuplicateNodeId(node.id.clone()));
        }
    }
    Ok(())
}

/// Keep only the nodes touched by at least one edge (as source or target).
///
/// A node with no edges, including a lone `Start` node, is dropped.
pub fn prune(flow: &Flowchart) -> HashMap<String, Node> {
    let connected: HashSet<&str> = flow
        .edges
        .iter()
        .flat_map(|e| [e.source.as_str(), e.target.as_str()])
        .collect();

    flow.nodes
        .iter()
        .filter(|n| connected.contains(n.id.as_str()))
        .map(|n| (n.id.clone(), n.clone()))
        .collect()
}

/// The `Start` node, if it survived pruning.
pub fn find_start_node<'a>(flow: &Flowchart, pruned: &'a HashMap<String, Node>) -> Option<&'a Node> {
    flow.nodes
        .iter()
        .filter(|n| n.node_type == tags::START)
        .find_map(|n| pruned.get(&n.id))
}

/// Topological order of the pruned nodes (Kahn's algorithm), seeded in
/// document order so the result is deterministic.
///
/// # Errors
/// [`EngineError::CycleDetected`] if the pruned subgraph has a cycle.
pub fn topological_order(
    flow: &Flowchart,
    pruned: &HashMap<String, Node>,
    index: &DependencyIndex,
) -> Result<Vec<String>, EngineError> {
    let mut in_degree: HashMap<&str, usize> = HashMap::with_capacity(pruned.len());
    for id in pruned.keys() {
        let degree = index
            .predecessors_of(id)
            .iter()
            .filter(|p| pruned.contains_key(p.as_str()))
            .count();
        in_degree.insert(id.as_str(), degree);
    }

    let mut queue: VecDeque<&str> = flow
        .nodes
        .iter()
        .map(|n| n.id.as_str())
        .filter(|id| in_degree.get(id) == Some(&0))
        .collect();

    let mut sorted: Vec<String> = Vec::with_capacity(pruned.len());

    while let Some(node_id) = queue.pop_front() {
        sorted.push(node_id.to_owned());

        for neighbour in index.dependents_of(node_id) {
            if let Some(deg) = in_degree.get_mut(neighbour.as_str()) {
                *deg -= 1;
                if *deg == 0 {
                    queue.push_back(neighbour.as_str());
                }
            }
        }
    }

    // If we didn't visit every node the graph contains a cycle.
    if sorted.len() != pruned.len() {
        return Err(EngineError::CycleDetected);
    }

    Ok(sorted)
}

// ---------------------------------------------------------------------------
// DependencyIndex
// ---------------------------------------------------------------------------

/// Forward (`source → targets`) and reverse (`target → sources`) adjacency,
/// built once per run and read-only afterwards.
///
/// Both directions are ordered sets: duplicate edges collapse, insertion
/// order follows the edge list.
#[derive(Debug, Clone, Default)]
pub struct DependencyIndex {
    dependents: HashMap<String, Vec<String>>,
    predecessors: HashMap<String, Vec<String>>,
}

impl DependencyIndex {
    pub fn build(edges: &[Edge]) -> Self {
        let mut index = Self::default();
        for edge in edges {
            push_unique(index.dependents.entry(edge.source.clone()).or_default(), &edge.target);
            push_unique(index.predecessors.entry(edge.target.clone()).or_default(), &edge.source);
        }
        index
    }

    /// Nodes unblocked (in part) by `node_id`; empty when unknown.
    pub fn dependents_of(&self, node_id: &str) -> &[String] {
        self.dependents.get(node_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Nodes that must complete before `node_id` may run; empty when unknown.
    pub fn predecessors_of(&self, node_id: &str) -> &[String] {
        self.predecessors.get(node_id).map(Vec::as_slice).unwrap_or(&[])
    }
}

fn push_unique(ids: &mut Vec<String>, id: &str) {
    if !ids.iter().any(|existing| existing == id) {
        ids.push(id.to_owned());
    }
}
