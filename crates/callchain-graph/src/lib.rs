//! callchain-graph: Method call-graph infrastructure
//!
//! This crate provides the call-graph functionality for callchain:
//! - Declaration and invocation extraction from Java via tree-sitter
//! - Syntactic name resolution and call-graph building
//! - In-memory graph storage with deduplicated edges
//! - JSON persistence of the aggregated graph
//! - Bounded call-chain and caller/callee queries
//! - Parallel project analysis and file watching

pub mod analyzer;
pub mod builder;
pub mod edges;
pub mod events;
pub mod lang;
pub mod node;
pub mod parser;
pub mod persist;
pub mod query;
pub mod resolver;
pub mod store;
pub mod watcher;

pub use analyzer::{
    AnalysisReport, AnalyzeError, Analyzer, AnalyzerConfig, CancelFlag, FileFailure, SourceFile,
};
pub use builder::{
    BuildError, BuildStats, BuilderConfig, CallGraphBuilder, FileStats, ResolutionMode,
};
pub use edges::{Edge, GraphOp};
pub use events::{DEFAULT_PACKAGE, EventSource, FileEvents, SourceError, SourceEvent};
pub use lang::JavaExtractor;
pub use node::{Confidence, EXTERNAL_FILE, Node, NodeAttrs, UNKNOWN_FILE};
pub use parser::{JAVA_EXTENSION, ParseError, ParsedFile, Parser, is_java_path};
pub use persist::{
    CallChainArtifact, DEFAULT_SIZE_THRESHOLD, LoadedArtifact, NodesByFile, PersistError,
    PersistOutcome, load_artifact, persist, read_artifact, write_artifact,
};
pub use query::{ChainSample, DEFAULT_MAX_DEPTH, QueryEngine};
pub use resolver::{MethodTable, NameResolver, Resolution};
pub use store::{GraphStats, GraphStore};
pub use watcher::{
    ChangeBatch, FileEvent, FileWatcher, WatchError, WatcherConfig, watch_until_cancelled,
};
