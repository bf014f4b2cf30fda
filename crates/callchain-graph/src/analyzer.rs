//! Whole-project analysis.
//!
//! Discovers source files under a root, extracts their events on a pool of
//! worker threads and applies the results to a single [`CallGraphBuilder`] in
//! discovery order. Workers own their parser; only owned [`FileEvents`] cross
//! threads, and the calling thread is the only writer to the store.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Instant;

use ignore::WalkBuilder;
use tracing::{debug, info, warn};

use crate::builder::{BuildStats, BuilderConfig, CallGraphBuilder, ResolutionMode};
use crate::events::{EventSource, FileEvents, SourceError};
use crate::lang::JavaExtractor;
use crate::store::GraphStore;

/// Error type for analysis runs.
#[derive(Debug, thiserror::Error)]
pub enum AnalyzeError {
    #[error("Project path does not exist: {0}")]
    MissingRoot(PathBuf),
    #[error("Project path is not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("Analysis cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, AnalyzeError>;

/// What a worker produced for one discovered file.
enum Extraction {
    /// The event source does not handle this kind of file.
    Declined,
    Extracted(std::result::Result<FileEvents, SourceError>),
}

/// Cooperative cancellation shared between the caller and a running analysis.
///
/// Checked once per file; an in-flight file is always finished.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// The underlying flag, for `signal_hook::flag` registration.
    pub fn as_atomic(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.0)
    }
}

/// Analysis configuration.
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    pub mode: ResolutionMode,
    /// Worker threads for extraction; 0 picks the available parallelism.
    pub jobs: usize,
    /// File extensions to analyze, without the dot.
    pub extensions: Vec<String>,
    /// Honour `.gitignore` and friends during discovery.
    pub respect_gitignore: bool,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            mode: ResolutionMode::SinglePass,
            jobs: 0,
            extensions: vec!["java".to_string()],
            respect_gitignore: true,
        }
    }
}

/// A file found during discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub absolute: PathBuf,
    /// Path relative to the project root, `/`-separated.
    pub relative: String,
}

/// A file that did not contribute to the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFailure {
    pub path: String,
    pub reason: String,
}

/// Result of a completed analysis.
#[derive(Debug)]
pub struct AnalysisReport {
    pub store: GraphStore,
    pub stats: BuildStats,
    pub files_discovered: usize,
    /// Unreadable files and files with malformed events.
    pub failures: Vec<FileFailure>,
    pub elapsed_ms: u64,
}

/// Runs discovery, extraction and graph building for a project.
pub struct Analyzer {
    config: AnalyzerConfig,
    cancel: CancelFlag,
}

impl Analyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self {
            config,
            cancel: CancelFlag::new(),
        }
    }

    /// Use an externally owned cancel flag.
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    /// Analyze every Java file under `root`.
    pub fn analyze(&self, root: &Path) -> Result<AnalysisReport> {
        self.analyze_with(root, JavaExtractor::new)
    }

    /// Analyze with a custom event source. `make_source` is called once per
    /// worker thread.
    pub fn analyze_with<S, F>(&self, root: &Path, make_source: F) -> Result<AnalysisReport>
    where
        S: EventSource,
        F: Fn() -> S + Sync,
    {
        let start = Instant::now();
        let files = self.discover(root)?;
        info!(root = %root.display(), files = files.len(), "Discovered source files");

        if self.cancel.is_cancelled() {
            return Err(AnalyzeError::Cancelled);
        }

        let mut builder = CallGraphBuilder::new(
            GraphStore::new(),
            BuilderConfig {
                mode: self.config.mode,
            },
        );
        let mut stats = BuildStats::default();
        let mut failures = Vec::new();

        let jobs = self.worker_count(files.len());
        let next = AtomicUsize::new(0);
        let (tx, rx) = mpsc::channel::<(usize, Extraction)>();

        thread::scope(|scope| {
            for _ in 0..jobs {
                let tx = tx.clone();
                let next = &next;
                let files = &files;
                let cancel = &self.cancel;
                let make_source = &make_source;
                scope.spawn(move || {
                    let mut source = make_source();
                    loop {
                        if cancel.is_cancelled() {
                            break;
                        }
                        let idx = next.fetch_add(1, Ordering::Relaxed);
                        let Some(file) = files.get(idx) else {
                            break;
                        };
                        let result = if source.supports(&file.absolute) {
                            Extraction::Extracted(source.extract(&file.absolute, &file.relative))
                        } else {
                            Extraction::Declined
                        };
                        if tx.send((idx, result)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(tx);

            // Apply in discovery order so node order and attribute merges do
            // not depend on thread scheduling.
            let mut pending = BTreeMap::new();
            let mut next_to_apply = 0;
            for (idx, result) in rx {
                if self.cancel.is_cancelled() {
                    break;
                }
                pending.insert(idx, result);
                while let Some(result) = pending.remove(&next_to_apply) {
                    apply(
                        &mut builder,
                        &files[next_to_apply],
                        result,
                        &mut stats,
                        &mut failures,
                    );
                    next_to_apply += 1;
                }
            }
        });

        if self.cancel.is_cancelled() {
            warn!("Analysis cancelled, discarding partial graph");
            return Err(AnalyzeError::Cancelled);
        }

        let elapsed_ms = start.elapsed().as_millis() as u64;
        let store = builder.into_store();
        info!(
            files = stats.files_processed,
            skipped = stats.files_skipped,
            failed = stats.files_failed,
            nodes = store.node_count(),
            edges = store.edge_count(),
            elapsed_ms,
            "Analysis complete"
        );

        Ok(AnalysisReport {
            store,
            stats,
            files_discovered: files.len(),
            failures,
            elapsed_ms,
        })
    }

    /// Find analyzable files under `root`, sorted by path.
    pub fn discover(&self, root: &Path) -> Result<Vec<SourceFile>> {
        if !root.exists() {
            return Err(AnalyzeError::MissingRoot(root.to_path_buf()));
        }
        if !root.is_dir() {
            return Err(AnalyzeError::NotADirectory(root.to_path_buf()));
        }

        let mut builder = WalkBuilder::new(root);
        builder.git_ignore(self.config.respect_gitignore);
        builder.git_global(self.config.respect_gitignore);
        builder.git_exclude(self.config.respect_gitignore);
        builder.require_git(false);
        builder.follow_links(false);
        // Skip hidden files and directories
        builder.hidden(true);

        let mut files = Vec::new();
        for entry in builder.build() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable directory entry");
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            let path = entry.path();
            if !self.has_wanted_extension(path) {
                continue;
            }
            files.push(SourceFile {
                absolute: path.to_path_buf(),
                relative: relative_path(root, path),
            });
        }

        files.sort_by(|a, b| a.relative.cmp(&b.relative));
        Ok(files)
    }

    fn has_wanted_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| {
                self.config
                    .extensions
                    .iter()
                    .any(|wanted| wanted.eq_ignore_ascii_case(ext))
            })
    }

    fn worker_count(&self, files: usize) -> usize {
        let jobs = if self.config.jobs == 0 {
            thread::available_parallelism().map_or(1, |n| n.get())
        } else {
            self.config.jobs
        };
        jobs.min(files).max(1)
    }
}

fn apply(
    builder: &mut CallGraphBuilder,
    file: &SourceFile,
    result: Extraction,
    stats: &mut BuildStats,
    failures: &mut Vec<FileFailure>,
) {
    let events = match result {
        Extraction::Declined => {
            debug!(path = %file.relative, "No event source for file");
            stats.files_skipped += 1;
            return;
        }
        Extraction::Extracted(Ok(events)) => events,
        Extraction::Extracted(Err(e)) => {
            warn!(path = %file.relative, error = %e, "Skipping file");
            stats.files_skipped += 1;
            failures.push(FileFailure {
                path: file.relative.clone(),
                reason: e.to_string(),
            });
            return;
        }
    };

    match builder.process_file(&events) {
        Ok(file_stats) => stats.record(&file_stats),
        Err(e) => {
            warn!(path = %file.relative, error = %e, "Rejected file");
            stats.files_failed += 1;
            failures.push(FileFailure {
                path: file.relative.clone(),
                reason: e.to_string(),
            });
        }
    }
    debug!(path = %file.relative, "Processed");
}

/// `path` relative to `root`, joined with `/` on every platform.
fn relative_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn write(dir: &Path, relative: &str, content: &str) {
        let path = dir.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_discover_sorted_java_files() {
        let dir = tempdir().unwrap();
        write(dir.path(), "src/b/B.java", "class B {}");
        write(dir.path(), "src/a/A.java", "class A {}");
        write(dir.path(), "README.md", "# readme");
        write(dir.path(), ".hidden/H.java", "class H {}");

        let analyzer = Analyzer::new(AnalyzerConfig::default());
        let files = analyzer.discover(dir.path()).unwrap();
        let relative: Vec<_> = files.iter().map(|f| f.relative.as_str()).collect();
        assert_eq!(relative, vec!["src/a/A.java", "src/b/B.java"]);
    }

    #[test]
    fn test_discover_respects_gitignore() {
        let dir = tempdir().unwrap();
        write(dir.path(), ".gitignore", "generated/\n");
        write(dir.path(), "generated/G.java", "class G {}");
        write(dir.path(), "Main.java", "class Main {}");

        let analyzer = Analyzer::new(AnalyzerConfig::default());
        let files = analyzer.discover(dir.path()).unwrap();
        assert_eq!(files.len(), 1);

        let analyzer = Analyzer::new(AnalyzerConfig {
            respect_gitignore: false,
            ..AnalyzerConfig::default()
        });
        assert_eq!(analyzer.discover(dir.path()).unwrap().len(), 2);
    }

    #[test]
    fn test_missing_root() {
        let dir = tempdir().unwrap();
        let analyzer = Analyzer::new(AnalyzerConfig::default());
        let err = analyzer.analyze(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, AnalyzeError::MissingRoot(_)));

        write(dir.path(), "file.txt", "x");
        let err = analyzer.analyze(&dir.path().join("file.txt")).unwrap_err();
        assert!(matches!(err, AnalyzeError::NotADirectory(_)));
    }

    #[test]
    fn test_cancelled_before_start() {
        let dir = tempdir().unwrap();
        write(dir.path(), "A.java", "class A { void a() {} }");

        let cancel = CancelFlag::new();
        cancel.cancel();
        let analyzer = Analyzer::new(AnalyzerConfig::default()).with_cancel_flag(cancel);

        assert!(matches!(
            analyzer.analyze(dir.path()),
            Err(AnalyzeError::Cancelled)
        ));
    }

    /// Counts extractions but claims no file.
    struct DecliningSource {
        extracted: Arc<AtomicUsize>,
    }

    impl EventSource for DecliningSource {
        fn supports(&self, _path: &Path) -> bool {
            false
        }

        fn extract(
            &mut self,
            _path: &Path,
            relative_path: &str,
        ) -> std::result::Result<FileEvents, SourceError> {
            self.extracted.fetch_add(1, Ordering::SeqCst);
            Ok(FileEvents::new(relative_path)
                .with_class("A")
                .with_event(crate::events::SourceEvent::declared("a", Vec::<String>::new())))
        }
    }

    #[test]
    fn test_declined_files_are_never_extracted() {
        let dir = tempdir().unwrap();
        write(dir.path(), "A.java", "class A { void a() {} }");
        write(dir.path(), "B.java", "class B { void b() {} }");

        let extracted = Arc::new(AtomicUsize::new(0));
        let report = Analyzer::new(AnalyzerConfig {
            jobs: 2,
            ..AnalyzerConfig::default()
        })
        .analyze_with(dir.path(), || DecliningSource {
            extracted: Arc::clone(&extracted),
        })
        .unwrap();

        assert_eq!(extracted.load(Ordering::SeqCst), 0);
        assert_eq!(report.files_discovered, 2);
        assert_eq!(report.stats.files_skipped, 2);
        assert_eq!(report.stats.files_processed, 0);
        assert!(report.failures.is_empty());
        assert_eq!(report.store.node_count(), 0);
    }

    #[test]
    fn test_worker_count() {
        let analyzer = Analyzer::new(AnalyzerConfig {
            jobs: 8,
            ..AnalyzerConfig::default()
        });
        assert_eq!(analyzer.worker_count(3), 3);
        assert_eq!(analyzer.worker_count(0), 1);
        assert!(Analyzer::new(AnalyzerConfig::default()).worker_count(100) >= 1);
    }

    #[test]
    fn test_relative_path() {
        assert_eq!(
            relative_path(Path::new("/p"), Path::new("/p/src/A.java")),
            "src/A.java"
        );
    }
}
