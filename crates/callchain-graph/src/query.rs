//! Read-only queries over a call graph.

use serde::Serialize;
use tracing::{debug, warn};

use crate::store::GraphStore;

/// Default bound on chain length, in edges.
pub const DEFAULT_MAX_DEPTH: usize = 10;

/// Chains sampled between the first and last node of a graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainSample {
    pub start: String,
    pub end: String,
    /// Number of chains found before truncation.
    pub total: usize,
    pub chains: Vec<Vec<String>>,
}

/// Path and neighbourhood queries against a [`GraphStore`].
pub struct QueryEngine<'a> {
    store: &'a GraphStore,
}

impl<'a> QueryEngine<'a> {
    pub fn new(store: &'a GraphStore) -> Self {
        Self { store }
    }

    /// All simple paths from `start` to `end` with at most `max_depth` edges.
    ///
    /// Paths are produced depth-first, following successors in edge insertion
    /// order. A missing endpoint or an unreachable target yields an empty list;
    /// `start == end` yields the single one-node path.
    pub fn find_chains(&self, start: &str, end: &str, max_depth: usize) -> Vec<Vec<String>> {
        let (Some(source), Some(target)) = (self.store.index_of(start), self.store.index_of(end))
        else {
            warn!(start, end, "Chain endpoint not in graph");
            return Vec::new();
        };

        if source == target {
            return vec![vec![start.to_string()]];
        }

        let mut chains = Vec::new();
        let mut on_path = vec![false; self.store.node_count()];
        let mut path = vec![source];
        on_path[source] = true;
        let mut stack = vec![self.store.successor_indices(source).iter()];

        while let Some(children) = stack.last_mut() {
            match children.next() {
                Some(&child) if child == target => {
                    if path.len() <= max_depth {
                        let mut chain: Vec<String> =
                            path.iter().map(|&i| self.store.key_at(i).to_string()).collect();
                        chain.push(end.to_string());
                        chains.push(chain);
                    }
                }
                Some(&child) => {
                    if !on_path[child] && path.len() < max_depth {
                        on_path[child] = true;
                        path.push(child);
                        stack.push(self.store.successor_indices(child).iter());
                    }
                }
                None => {
                    stack.pop();
                    if let Some(done) = path.pop() {
                        on_path[done] = false;
                    }
                }
            }
        }

        if chains.is_empty() {
            debug!(start, end, max_depth, "No call chain found");
        }
        chains
    }

    /// Methods calling `key`. Empty if the node is absent.
    pub fn callers(&self, key: &str) -> Vec<&'a str> {
        self.store.predecessors(key)
    }

    /// Methods called by `key`. Empty if the node is absent.
    pub fn callees(&self, key: &str) -> Vec<&'a str> {
        self.store.successors(key)
    }

    /// Chains from the first to the last node in insertion order, keeping at
    /// most `limit` of them. `None` unless the graph has two or more nodes.
    pub fn sample_chains(&self, max_depth: usize, limit: usize) -> Option<ChainSample> {
        if self.store.node_count() < 2 {
            return None;
        }
        let mut nodes = self.store.nodes();
        let start = nodes.next()?.key.clone();
        let end = nodes.last()?.key.clone();

        let mut chains = self.find_chains(&start, &end, max_depth);
        let total = chains.len();
        chains.truncate(limit);

        Some(ChainSample {
            start,
            end,
            total,
            chains,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeAttrs;

    fn chain(keys: &[&str]) -> Vec<String> {
        keys.iter().map(|k| k.to_string()).collect()
    }

    fn diamond() -> GraphStore {
        let mut store = GraphStore::new();
        store.add_edge("a", "b");
        store.add_edge("a", "c");
        store.add_edge("b", "d");
        store.add_edge("c", "d");
        store.add_edge("a", "d");
        store
    }

    #[test]
    fn test_find_chains_in_dfs_order() {
        let store = diamond();
        let engine = QueryEngine::new(&store);

        assert_eq!(
            engine.find_chains("a", "d", 10),
            vec![
                chain(&["a", "b", "d"]),
                chain(&["a", "c", "d"]),
                chain(&["a", "d"]),
            ]
        );
    }

    #[test]
    fn test_find_chains_respects_depth() {
        let store = diamond();
        let engine = QueryEngine::new(&store);

        assert_eq!(engine.find_chains("a", "d", 1), vec![chain(&["a", "d"])]);
        assert!(engine.find_chains("a", "d", 0).is_empty());
    }

    #[test]
    fn test_find_chains_are_simple() {
        let mut store = GraphStore::new();
        store.add_edge("a", "b");
        store.add_edge("b", "a");
        store.add_edge("b", "b");
        store.add_edge("b", "c");
        let engine = QueryEngine::new(&store);

        assert_eq!(engine.find_chains("a", "c", 10), vec![chain(&["a", "b", "c"])]);
    }

    #[test]
    fn test_find_chains_same_endpoint() {
        let store = diamond();
        let engine = QueryEngine::new(&store);
        assert_eq!(engine.find_chains("b", "b", 3), vec![chain(&["b"])]);
    }

    #[test]
    fn test_find_chains_missing_or_unreachable() {
        let store = diamond();
        let engine = QueryEngine::new(&store);

        assert!(engine.find_chains("a", "zzz", 5).is_empty());
        assert!(engine.find_chains("zzz", "a", 5).is_empty());
        assert!(engine.find_chains("d", "a", 5).is_empty());
    }

    #[test]
    fn test_callers_and_callees() {
        let store = diamond();
        let engine = QueryEngine::new(&store);

        assert_eq!(engine.callers("d"), vec!["b", "c", "a"]);
        assert_eq!(engine.callees("a"), vec!["b", "c", "d"]);
        assert!(engine.callers("zzz").is_empty());
        assert!(engine.callees("d").is_empty());
    }

    #[test]
    fn test_sample_chains() {
        let store = diamond();
        let engine = QueryEngine::new(&store);

        let sample = engine.sample_chains(3, 2).expect("non-empty graph");
        assert_eq!(sample.start, "a");
        assert_eq!(sample.end, "d");
        assert_eq!(sample.total, 3);
        assert_eq!(sample.chains.len(), 2);

        let empty = GraphStore::new();
        assert!(QueryEngine::new(&empty).sample_chains(3, 3).is_none());
    }

    #[test]
    fn test_sample_chains_needs_two_methods() {
        let mut store = GraphStore::new();
        store.add_node("A.run()", NodeAttrs::default());
        assert!(QueryEngine::new(&store).sample_chains(3, 3).is_none());

        store.add_node("A.stop()", NodeAttrs::default());
        let sample = QueryEngine::new(&store)
            .sample_chains(3, 3)
            .expect("two methods");
        assert_eq!(sample.start, "A.run()");
        assert_eq!(sample.end, "A.stop()");
        assert_eq!(sample.total, 0);
        assert!(sample.chains.is_empty());
    }
}
