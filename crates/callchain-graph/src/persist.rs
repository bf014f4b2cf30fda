//! Aggregation and persistence of the call graph.
//!
//! The graph is written as a single JSON document: nodes bucketed by the file
//! they were declared in (or their confidence sentinel) and the edge list.
//!
//! ```json
//! {
//!   "nodes_by_file": { "src/A.java": ["A.foo()"], "unknown": ["unknown.bar()"] },
//!   "edges": [["A.foo()", "unknown.bar()"]]
//! }
//! ```
//!
//! Downstream consumers may treat a large artifact as plain text for
//! similarity search instead of parsing it, see [`load_artifact`].

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::edges::Edge;
use crate::store::GraphStore;

/// Size above which an artifact is handed to the similarity-search fallback
/// rather than parsed (500 KiB).
pub const DEFAULT_SIZE_THRESHOLD: u64 = 500 * 1024;

/// Error type for persistence operations.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PersistError>;

/// Node keys grouped by origin file, in first-appearance order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodesByFile {
    buckets: Vec<(String, Vec<String>)>,
    positions: HashMap<String, usize>,
}

impl NodesByFile {
    /// Create an empty grouping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a key to its bucket, creating the bucket on first use.
    pub fn push(&mut self, file_path: &str, key: impl Into<String>) {
        match self.positions.get(file_path) {
            Some(&pos) => self.buckets[pos].1.push(key.into()),
            None => {
                self.positions
                    .insert(file_path.to_string(), self.buckets.len());
                self.buckets.push((file_path.to_string(), vec![key.into()]));
            }
        }
    }

    /// Keys in a bucket, if it exists.
    pub fn get(&self, file_path: &str) -> Option<&[String]> {
        self.positions
            .get(file_path)
            .map(|&pos| self.buckets[pos].1.as_slice())
    }

    /// Iterate over `(file_path, keys)` buckets.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.buckets
            .iter()
            .map(|(path, keys)| (path.as_str(), keys.as_slice()))
    }

    /// Number of buckets.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Returns true if there are no buckets.
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Returns true if at least one bucket holds a key.
    pub fn has_nodes(&self) -> bool {
        self.buckets.iter().any(|(_, keys)| !keys.is_empty())
    }
}

impl Serialize for NodesByFile {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_map(self.buckets.iter().map(|(path, keys)| (path, keys)))
    }
}

impl<'de> Deserialize<'de> for NodesByFile {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct BucketsVisitor;

        impl<'de> Visitor<'de> for BucketsVisitor {
            type Value = NodesByFile;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of file path to node keys")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut map: A,
            ) -> std::result::Result<NodesByFile, A::Error> {
                let mut buckets = NodesByFile::new();
                while let Some((path, keys)) = map.next_entry::<String, Vec<String>>()? {
                    for key in keys {
                        buckets.push(&path, key);
                    }
                }
                Ok(buckets)
            }
        }

        deserializer.deserialize_map(BucketsVisitor)
    }
}

/// The persisted form of a call graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallChainArtifact {
    /// Node keys grouped by declaring file or confidence sentinel.
    pub nodes_by_file: NodesByFile,
    /// All `[caller, callee]` pairs.
    pub edges: Vec<Edge>,
}

impl CallChainArtifact {
    /// Aggregate a store into its persisted form.
    pub fn from_store(store: &GraphStore) -> Self {
        let mut nodes_by_file = NodesByFile::new();
        for node in store.nodes() {
            nodes_by_file.push(node.bucket(), node.key.as_str());
        }

        Self {
            nodes_by_file,
            edges: store.edges().collect(),
        }
    }

    /// Returns true if the artifact carries no node and no edge.
    pub fn is_empty(&self) -> bool {
        !self.nodes_by_file.has_nodes() && self.edges.is_empty()
    }

    /// Total number of node keys across buckets.
    pub fn node_count(&self) -> usize {
        self.nodes_by_file.iter().map(|(_, keys)| keys.len()).sum()
    }
}

/// Result of a persist call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistOutcome {
    /// The artifact was written.
    Written {
        /// Destination path.
        path: PathBuf,
        /// Size of the written document.
        bytes: u64,
    },
    /// Nothing to persist; no file was written.
    Skipped,
}

/// Persist a store to `destination`, overwriting any existing file.
///
/// An empty graph produces no file at all. Missing parent directories are
/// created only when something is written.
pub fn persist(store: &GraphStore, destination: &Path) -> Result<PersistOutcome> {
    if store.node_count() == 0 && store.edge_count() == 0 {
        tracing::info!("No methods or calls found, not writing {}", destination.display());
        return Ok(PersistOutcome::Skipped);
    }

    let artifact = CallChainArtifact::from_store(store);
    write_artifact(&artifact, destination)
}

/// Write an already aggregated artifact, applying the same empty-result guard.
pub fn write_artifact(artifact: &CallChainArtifact, destination: &Path) -> Result<PersistOutcome> {
    if artifact.is_empty() {
        tracing::info!(
            "nodes_by_file and edges are both empty, not writing {}",
            destination.display()
        );
        return Ok(PersistOutcome::Skipped);
    }

    let json = serde_json::to_string_pretty(artifact)?;

    if let Some(parent) = destination.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|source| PersistError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
    }

    std::fs::write(destination, &json).map_err(|source| PersistError::Io {
        path: destination.to_path_buf(),
        source,
    })?;

    tracing::info!(
        "Call chain written to {} ({} nodes, {} edges)",
        destination.display(),
        artifact.node_count(),
        artifact.edges.len()
    );

    Ok(PersistOutcome::Written {
        path: destination.to_path_buf(),
        bytes: json.len() as u64,
    })
}

/// Outcome of loading a persisted artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadedArtifact {
    /// No artifact exists at the path.
    Missing,
    /// The artifact exceeds the size threshold and should be consumed as
    /// plain text by the similarity-search fallback.
    Oversized {
        /// Artifact path.
        path: PathBuf,
        /// Artifact size on disk.
        bytes: u64,
    },
    /// The artifact was parsed.
    Parsed(CallChainArtifact),
}

/// Load an artifact, routing files above `size_threshold` bytes to the
/// fallback instead of parsing them.
pub fn load_artifact(path: &Path, size_threshold: u64) -> Result<LoadedArtifact> {
    let metadata = match std::fs::metadata(path) {
        Ok(m) if m.is_file() => m,
        Ok(_) => return Ok(LoadedArtifact::Missing),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(LoadedArtifact::Missing),
        Err(source) => {
            return Err(PersistError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    if metadata.len() > size_threshold {
        return Ok(LoadedArtifact::Oversized {
            path: path.to_path_buf(),
            bytes: metadata.len(),
        });
    }

    read_artifact(path).map(LoadedArtifact::Parsed)
}

/// Read and parse an artifact regardless of its size.
pub fn read_artifact(path: &Path) -> Result<CallChainArtifact> {
    let content = std::fs::read_to_string(path).map_err(|source| PersistError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&content)?)
}
