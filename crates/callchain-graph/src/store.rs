//! In-memory graph storage.
//!
//! Nodes live in an insertion-ordered arena addressed by string key; edges are
//! index pairs deduplicated through a set, with forward and reverse adjacency
//! lists kept in insertion order. All mutation goes through [`GraphStore::apply`].

use std::collections::{HashMap, HashSet};

use crate::edges::{Edge, GraphOp};
use crate::node::{Confidence, Node, NodeAttrs};
use crate::persist::CallChainArtifact;

/// Directed call graph with node attributes and unique edges.
#[derive(Debug, Clone, Default)]
pub struct GraphStore {
    nodes: Vec<Node>,
    index: HashMap<String, usize>,
    edge_set: HashSet<(usize, usize)>,
    successors: Vec<Vec<usize>>,
    predecessors: Vec<Vec<usize>>,
}

impl GraphStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from a persisted artifact.
    ///
    /// Node attributes other than `file_path` are not persisted, so the
    /// rebuilt nodes only carry their bucket as `file_path`.
    pub fn from_artifact(artifact: &CallChainArtifact) -> Self {
        let mut store = Self::new();
        for (file_path, keys) in artifact.nodes_by_file.iter() {
            for key in keys {
                store.add_node(key, NodeAttrs::located(file_path));
            }
        }
        for edge in &artifact.edges {
            store.add_edge(&edge.caller, &edge.callee);
        }
        store
    }

    /// Apply a single mutation. Returns true if the store changed.
    pub fn apply(&mut self, op: GraphOp) -> bool {
        match op {
            GraphOp::AddNode { key, attrs } => self.upsert(key, attrs).1,
            GraphOp::AddEdge(edge) => {
                let (from, _) = self.upsert(edge.caller, NodeAttrs::default());
                let (to, _) = self.upsert(edge.callee, NodeAttrs::default());
                if !self.edge_set.insert((from, to)) {
                    return false;
                }
                self.successors[from].push(to);
                self.predecessors[to].push(from);
                true
            }
        }
    }

    /// Create a node, or merge attributes into an existing one without
    /// overwriting fields that are already set.
    pub fn add_node(&mut self, key: &str, attrs: NodeAttrs) -> bool {
        self.apply(GraphOp::add_node(key, attrs))
    }

    /// Add an edge. Missing endpoints are created without attributes.
    /// Returns false when the edge already existed.
    pub fn add_edge(&mut self, caller: &str, callee: &str) -> bool {
        self.apply(GraphOp::add_edge(caller, callee))
    }

    fn upsert(&mut self, key: String, attrs: NodeAttrs) -> (usize, bool) {
        if let Some(&idx) = self.index.get(&key) {
            let changed = self.nodes[idx].attrs.merge_missing(attrs);
            return (idx, changed);
        }

        let idx = self.nodes.len();
        self.index.insert(key.clone(), idx);
        self.nodes.push(Node::new(key, attrs));
        self.successors.push(Vec::new());
        self.predecessors.push(Vec::new());
        (idx, true)
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of distinct edges.
    pub fn edge_count(&self) -> usize {
        self.edge_set.len()
    }

    /// Returns true if the store holds neither nodes nor edges.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edge_set.is_empty()
    }

    /// Check if a node exists.
    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Get a node by key.
    pub fn node(&self, key: &str) -> Option<&Node> {
        self.index.get(key).map(|&idx| &self.nodes[idx])
    }

    /// All nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    /// All edges, grouped by caller in node insertion order, each group in
    /// the order its edges were added.
    pub fn edges(&self) -> impl Iterator<Item = Edge> + '_ {
        self.successors.iter().enumerate().flat_map(move |(from, tos)| {
            tos.iter()
                .map(move |&to| Edge::new(&self.nodes[from].key, &self.nodes[to].key))
        })
    }

    /// Keys of the nodes calling `key`, in edge insertion order.
    ///
    /// Empty if the node is absent.
    pub fn predecessors(&self, key: &str) -> Vec<&str> {
        self.neighbours(key, &self.predecessors)
    }

    /// Keys of the nodes called by `key`, in edge insertion order.
    ///
    /// Empty if the node is absent.
    pub fn successors(&self, key: &str) -> Vec<&str> {
        self.neighbours(key, &self.successors)
    }

    fn neighbours<'a>(&'a self, key: &str, adjacency: &'a [Vec<usize>]) -> Vec<&'a str> {
        match self.index.get(key) {
            Some(&idx) => adjacency[idx]
                .iter()
                .map(|&n| self.nodes[n].key.as_str())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Successor indices, used by path enumeration.
    pub(crate) fn successor_indices(&self, idx: usize) -> &[usize] {
        &self.successors[idx]
    }

    pub(crate) fn index_of(&self, key: &str) -> Option<usize> {
        self.index.get(key).copied()
    }

    pub(crate) fn key_at(&self, idx: usize) -> &str {
        &self.nodes[idx].key
    }

    /// Get graph statistics.
    pub fn stats(&self) -> GraphStats {
        let mut stats = GraphStats {
            node_count: self.node_count(),
            edge_count: self.edge_count(),
            ..GraphStats::default()
        };
        for node in &self.nodes {
            match node.confidence() {
                Confidence::Exact => stats.declared += 1,
                Confidence::External => stats.external += 1,
                Confidence::Unknown => stats.unknown += 1,
            }
        }
        stats
    }
}

/// Graph statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphStats {
    pub node_count: usize,
    pub edge_count: usize,
    /// Nodes built from declarations.
    pub declared: usize,
    /// Qualified-external guesses.
    pub external: usize,
    /// Unknown-local guesses (and nodes without a file path).
    pub unknown: usize,
}
