//! Call-graph builder.
//!
//! Consumes the event stream of one file at a time and turns it into graph
//! mutations: declarations become nodes, invocations become edges from the
//! current method to whatever the resolver names.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::edges::GraphOp;
use crate::events::{FileEvents, SourceEvent};
use crate::node::{NodeAttrs, declared_key};
use crate::resolver::{MethodTable, NameResolver};
use crate::store::GraphStore;

/// Error type for graph building operations.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Malformed event #{index} in {path}: {reason}")]
    MalformedEvent {
        path: String,
        index: usize,
        reason: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, BuildError>;

/// When unqualified calls are matched against the method table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionMode {
    /// Resolve each call against the declarations seen so far. Calls to
    /// methods declared further down the file become `unknown.*` guesses.
    #[default]
    SinglePass,
    /// Register every declaration of the file before resolving any call.
    TwoPass,
}

impl ResolutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionMode::SinglePass => "single_pass",
            ResolutionMode::TwoPass => "two_pass",
        }
    }
}

/// Builder configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuilderConfig {
    pub mode: ResolutionMode,
}

/// Statistics for a single file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileStats {
    /// New nodes created in the store.
    pub nodes_added: usize,
    /// New edges created in the store.
    pub edges_added: usize,
    pub declarations: usize,
    pub invocations: usize,
    /// Invocations seen before any declaration, which have no caller.
    pub dropped_invocations: usize,
    /// The file declares no class and contributed nothing.
    pub skipped: bool,
}

/// Statistics from a build operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildStats {
    /// Files whose events were applied.
    pub files_processed: usize,
    /// Files without a class, plus files the source could not read.
    pub files_skipped: usize,
    /// Files rejected for malformed events.
    pub files_failed: usize,
    pub nodes_added: usize,
    pub edges_added: usize,
    pub declarations: usize,
    pub invocations: usize,
    pub dropped_invocations: usize,
}

impl BuildStats {
    /// Fold one file's statistics into the run totals.
    pub fn record(&mut self, file: &FileStats) {
        if file.skipped {
            self.files_skipped += 1;
            return;
        }
        self.files_processed += 1;
        self.nodes_added += file.nodes_added;
        self.edges_added += file.edges_added;
        self.declarations += file.declarations;
        self.invocations += file.invocations;
        self.dropped_invocations += file.dropped_invocations;
    }

    /// Merge another BuildStats into this one.
    pub fn merge(&mut self, other: &BuildStats) {
        self.files_processed += other.files_processed;
        self.files_skipped += other.files_skipped;
        self.files_failed += other.files_failed;
        self.nodes_added += other.nodes_added;
        self.edges_added += other.edges_added;
        self.declarations += other.declarations;
        self.invocations += other.invocations;
        self.dropped_invocations += other.dropped_invocations;
    }
}

/// Turns file events into a call graph.
///
/// The method table is scoped to one file: it is built while the file's
/// events are applied and discarded afterwards, so unqualified calls only
/// ever resolve to methods of the file's own class.
pub struct CallGraphBuilder {
    store: GraphStore,
    resolver: NameResolver,
    config: BuilderConfig,
}

impl CallGraphBuilder {
    /// Create a builder writing into `store`.
    pub fn new(store: GraphStore, config: BuilderConfig) -> Self {
        Self {
            store,
            resolver: NameResolver::new(),
            config,
        }
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    /// Apply one file's events to the store.
    ///
    /// The whole event list is validated first; a malformed event rejects the
    /// file without touching the store.
    pub fn process_file(&mut self, file: &FileEvents) -> Result<FileStats> {
        validate(file)?;

        let Some(class_name) = file.qualified_class_name() else {
            debug!(path = %file.path, "No class declaration, skipping");
            return Ok(FileStats {
                skipped: true,
                ..FileStats::default()
            });
        };

        let nodes_before = self.store.node_count();
        let edges_before = self.store.edge_count();
        let mut stats = FileStats::default();
        let mut table = MethodTable::new();

        if self.config.mode == ResolutionMode::TwoPass {
            for event in &file.events {
                if let SourceEvent::MethodDeclared { name, param_types } = event {
                    table.register(name, declared_key(&class_name, name, param_types));
                }
            }
        }

        let mut current: Option<String> = None;
        for event in &file.events {
            match event {
                SourceEvent::MethodDeclared { name, param_types } => {
                    let key = declared_key(&class_name, name, param_types);
                    let attrs =
                        NodeAttrs::declared(&class_name, name, &file.path, param_types.clone());
                    self.store.apply(GraphOp::add_node(&key, attrs));
                    table.register(name, &key);
                    current = Some(key);
                    stats.declarations += 1;
                }
                SourceEvent::MethodInvoked { qualifier, name } => {
                    stats.invocations += 1;
                    let Some(caller) = current.as_deref() else {
                        stats.dropped_invocations += 1;
                        continue;
                    };

                    let resolution = self.resolver.resolve(qualifier.as_deref(), name, &table);
                    if let Some(attrs) = resolution.guess_attrs() {
                        self.store.apply(GraphOp::add_node(resolution.key(), attrs));
                    }
                    self.store.apply(GraphOp::add_edge(caller, resolution.key()));
                }
            }
        }

        stats.nodes_added = self.store.node_count() - nodes_before;
        stats.edges_added = self.store.edge_count() - edges_before;

        debug!(
            path = %file.path,
            class = %class_name,
            nodes = stats.nodes_added,
            edges = stats.edges_added,
            "Applied file"
        );

        Ok(stats)
    }

    /// Get a reference to the underlying store.
    pub fn store(&self) -> &GraphStore {
        &self.store
    }

    /// Consume the builder and return the store.
    pub fn into_store(self) -> GraphStore {
        self.store
    }
}

fn validate(file: &FileEvents) -> Result<()> {
    for (index, event) in file.events.iter().enumerate() {
        if let Some(reason) = event.malformation() {
            return Err(BuildError::MalformedEvent {
                path: file.path.clone(),
                index,
                reason,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edges::Edge;
    use crate::node::{Confidence, EXTERNAL_FILE, UNKNOWN_FILE};

    fn builder(mode: ResolutionMode) -> CallGraphBuilder {
        CallGraphBuilder::new(GraphStore::new(), BuilderConfig { mode })
    }

    fn no_params() -> Vec<String> {
        Vec::new()
    }

    #[test]
    fn test_unresolved_call_becomes_unknown_guess() {
        let mut builder = builder(ResolutionMode::SinglePass);
        let file = FileEvents::new("A.java")
            .with_class("A")
            .with_event(SourceEvent::declared("foo", no_params()))
            .with_event(SourceEvent::invoked("bar"));

        let stats = builder.process_file(&file).unwrap();
        assert_eq!(stats.nodes_added, 2);
        assert_eq!(stats.edges_added, 1);

        let store = builder.store();
        let foo = store.node("A.foo()").unwrap();
        assert_eq!(foo.attrs.class_name.as_deref(), Some("default.A"));
        assert_eq!(foo.attrs.file_path.as_deref(), Some("A.java"));
        assert_eq!(
            store.node("unknown.bar()").unwrap().attrs.file_path.as_deref(),
            Some(UNKNOWN_FILE)
        );
        assert_eq!(
            store.edges().collect::<Vec<_>>(),
            vec![Edge::new("A.foo()", "unknown.bar()")]
        );
    }

    #[test]
    fn test_backward_reference_resolves() {
        let mut builder = builder(ResolutionMode::SinglePass);
        let file = FileEvents::new("A.java")
            .with_class("A")
            .with_event(SourceEvent::declared("bar", no_params()))
            .with_event(SourceEvent::declared("foo", no_params()))
            .with_event(SourceEvent::invoked("bar"));

        builder.process_file(&file).unwrap();
        assert_eq!(builder.store().successors("A.foo()"), vec!["A.bar()"]);
        assert!(!builder.store().contains("unknown.bar()"));
    }

    #[test]
    fn test_qualified_calls_are_external() {
        let mut builder = builder(ResolutionMode::SinglePass);
        let file = FileEvents::new("A.java")
            .with_package("pkg")
            .with_class("A")
            .with_event(SourceEvent::declared("foo", no_params()))
            .with_event(SourceEvent::invoked_on("obj", "baz"))
            .with_event(SourceEvent::invoked_on("this", "foo"));

        builder.process_file(&file).unwrap();
        let store = builder.store();
        assert_eq!(store.successors("A.foo()"), vec!["obj.baz()", "this.foo()"]);
        assert_eq!(
            store.node("obj.baz()").unwrap().attrs.file_path.as_deref(),
            Some(EXTERNAL_FILE)
        );
    }

    #[test]
    fn test_call_resolves_to_latest_overload() {
        let mut builder = builder(ResolutionMode::SinglePass);
        let file = FileEvents::new("A.java")
            .with_class("A")
            .with_event(SourceEvent::declared("run", ["int"]))
            .with_event(SourceEvent::declared("run", ["String"]))
            .with_event(SourceEvent::declared("main", no_params()))
            .with_event(SourceEvent::invoked("run"));

        builder.process_file(&file).unwrap();
        let store = builder.store();
        assert_eq!(store.successors("A.main()"), vec!["A.run(String)"]);
        assert!(store.contains("A.run(int)"));
        assert!(store.predecessors("A.run(int)").is_empty());
    }

    #[test]
    fn test_guessed_node_keeps_sentinel_when_declared_later() {
        let mut builder = builder(ResolutionMode::SinglePass);
        let caller = FileEvents::new("B.java")
            .with_class("B")
            .with_event(SourceEvent::declared("start", no_params()))
            .with_event(SourceEvent::invoked_on("A", "go"));
        let declaring = FileEvents::new("C.java")
            .with_class("A")
            .with_event(SourceEvent::declared("go", no_params()));

        builder.process_file(&caller).unwrap();
        let stats = builder.process_file(&declaring).unwrap();

        // Same key, so the declaration merges into the guessed node
        assert_eq!(stats.nodes_added, 0);
        let node = builder.store().node("A.go()").unwrap();
        assert_eq!(node.attrs.file_path.as_deref(), Some(EXTERNAL_FILE));
        assert_eq!(node.attrs.method_name.as_deref(), Some("go"));
        assert_eq!(node.attrs.class_name.as_deref(), Some("default.A"));
        assert_eq!(node.confidence(), Confidence::External);
        assert_eq!(builder.store().predecessors("A.go()"), vec!["B.start()"]);
    }

    #[test]
    fn test_two_pass_resolves_forward_reference() {
        let mut builder = builder(ResolutionMode::TwoPass);
        let file = FileEvents::new("A.java")
            .with_class("A")
            .with_event(SourceEvent::declared("foo", no_params()))
            .with_event(SourceEvent::invoked("bar"))
            .with_event(SourceEvent::declared("bar", no_params()));

        builder.process_file(&file).unwrap();
        let store = builder.store();
        assert_eq!(store.successors("A.foo()"), vec!["A.bar()"]);
        assert!(!store.contains("unknown.bar()"));

        // The forward-referenced node still gets its declaration attributes
        let bar = store.node("A.bar()").unwrap();
        assert_eq!(bar.attrs.file_path.as_deref(), Some("A.java"));
        assert_eq!(bar.attrs.method_name.as_deref(), Some("bar"));
    }

    #[test]
    fn test_invocation_before_declaration_is_dropped() {
        let mut builder = builder(ResolutionMode::SinglePass);
        let file = FileEvents::new("A.java")
            .with_class("A")
            .with_event(SourceEvent::invoked("early"))
            .with_event(SourceEvent::declared("foo", no_params()));

        let stats = builder.process_file(&file).unwrap();
        assert_eq!(stats.dropped_invocations, 1);
        assert_eq!(builder.store().edge_count(), 0);
        assert!(!builder.store().contains("unknown.early()"));
    }

    #[test]
    fn test_file_without_class_is_skipped() {
        let mut builder = builder(ResolutionMode::SinglePass);
        let file =
            FileEvents::new("Api.java").with_event(SourceEvent::declared("run", no_params()));

        let stats = builder.process_file(&file).unwrap();
        assert!(stats.skipped);
        assert!(builder.store().is_empty());
    }

    #[test]
    fn test_malformed_event_rejects_whole_file() {
        let mut builder = builder(ResolutionMode::SinglePass);
        let file = FileEvents::new("A.java")
            .with_class("A")
            .with_event(SourceEvent::declared("foo", no_params()))
            .with_event(SourceEvent::invoked_on("", "bar"));

        let err = builder.process_file(&file).unwrap_err();
        assert!(matches!(err, BuildError::MalformedEvent { index: 1, .. }));
        assert!(builder.store().is_empty());
    }

    #[test]
    fn test_repeated_file_is_idempotent() {
        let mut builder = builder(ResolutionMode::SinglePass);
        let file = FileEvents::new("A.java")
            .with_class("A")
            .with_event(SourceEvent::declared("foo", ["int"]))
            .with_event(SourceEvent::invoked("foo"))
            .with_event(SourceEvent::invoked("foo"));

        let first = builder.process_file(&file).unwrap();
        assert_eq!(first.edges_added, 1);

        let second = builder.process_file(&file).unwrap();
        assert_eq!(second.nodes_added, 0);
        assert_eq!(second.edges_added, 0);
        assert_eq!(builder.store().successors("A.foo(int)"), vec!["A.foo(int)"]);
    }

    #[test]
    fn test_method_table_does_not_leak_across_files() {
        let mut builder = builder(ResolutionMode::SinglePass);
        let a = FileEvents::new("A.java")
            .with_class("A")
            .with_event(SourceEvent::declared("helper", no_params()));
        let b = FileEvents::new("B.java")
            .with_class("B")
            .with_event(SourceEvent::declared("run", no_params()))
            .with_event(SourceEvent::invoked("helper"));

        builder.process_file(&a).unwrap();
        builder.process_file(&b).unwrap();
        assert_eq!(builder.store().successors("B.run()"), vec!["unknown.helper()"]);
    }

    #[test]
    fn test_builder_stats() {
        let mut stats = BuildStats::default();
        stats.record(&FileStats {
            nodes_added: 5,
            edges_added: 3,
            declarations: 2,
            invocations: 4,
            dropped_invocations: 1,
            skipped: false,
        });
        stats.record(&FileStats {
            skipped: true,
            ..FileStats::default()
        });

        let mut other = BuildStats {
            files_failed: 1,
            ..BuildStats::default()
        };
        other.merge(&stats);

        assert_eq!(other.files_processed, 1);
        assert_eq!(other.files_skipped, 1);
        assert_eq!(other.files_failed, 1);
        assert_eq!(other.nodes_added, 5);
        assert_eq!(other.edges_added, 3);
        assert_eq!(other.dropped_invocations, 1);
    }

    #[test]
    fn test_resolution_mode_serde() {
        let mode: ResolutionMode = serde_json::from_str("\"two_pass\"").unwrap();
        assert_eq!(mode, ResolutionMode::TwoPass);
        assert_eq!(ResolutionMode::default().as_str(), "single_pass");
    }
}
