//! Call edges and graph mutation operations.
//!
//! An edge is a directed `caller -> callee` pair of node keys. Call-site
//! multiplicity is not tracked: the store keeps at most one edge per pair.

use serde::{Deserialize, Serialize};

use crate::node::NodeAttrs;

/// A directed call relationship between two node keys.
///
/// Serialized as a two-element array `["caller", "callee"]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "(String, String)", into = "(String, String)")]
pub struct Edge {
    /// Key of the calling method.
    pub caller: String,
    /// Key of the called method.
    pub callee: String,
}

impl Edge {
    /// Create a new edge.
    pub fn new(caller: impl Into<String>, callee: impl Into<String>) -> Self {
        Self {
            caller: caller.into(),
            callee: callee.into(),
        }
    }
}

impl From<(String, String)> for Edge {
    fn from((caller, callee): (String, String)) -> Self {
        Self { caller, callee }
    }
}

impl From<Edge> for (String, String) {
    fn from(edge: Edge) -> Self {
        (edge.caller, edge.callee)
    }
}

/// An idempotent mutation of the graph store.
///
/// The builder expresses every change as a `GraphOp`; applying the same
/// operation twice leaves the store unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphOp {
    /// Create the node if absent, otherwise fill in missing attributes.
    AddNode {
        /// Node key.
        key: String,
        /// Attributes to merge.
        attrs: NodeAttrs,
    },
    /// Add a `caller -> callee` edge unless it already exists.
    AddEdge(Edge),
}

impl GraphOp {
    /// Create an `AddNode` operation.
    pub fn add_node(key: impl Into<String>, attrs: NodeAttrs) -> Self {
        GraphOp::AddNode {
            key: key.into(),
            attrs,
        }
    }

    /// Create an `AddEdge` operation.
    pub fn add_edge(caller: impl Into<String>, callee: impl Into<String>) -> Self {
        GraphOp::AddEdge(Edge::new(caller, callee))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_serializes_as_pair() {
        let edge = Edge::new("A.foo()", "unknown.bar()");
        let json = serde_json::to_string(&edge).expect("serialize");
        assert_eq!(json, r#"["A.foo()","unknown.bar()"]"#);

        let back: Edge = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, edge);
    }

    #[test]
    fn test_graph_op_factories() {
        let op = GraphOp::add_edge("a", "b");
        assert_eq!(op, GraphOp::AddEdge(Edge::new("a", "b")));

        let op = GraphOp::add_node("k", NodeAttrs::default());
        assert!(matches!(op, GraphOp::AddNode { ref key, .. } if key == "k"));
    }
}
