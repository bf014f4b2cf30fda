//! File system watcher for re-running analysis on change.
//!
//! Notifications are debounced, then filtered down to the source files that
//! discovery would also pick up. [`watch_until_cancelled`] folds them into
//! per-path [`ChangeBatch`]es so one burst of saves triggers one re-analysis.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, RecvTimeoutError, channel};
use std::time::Duration;

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{DebouncedEvent, Debouncer, new_debouncer};
use tracing::{debug, warn};

use crate::analyzer::CancelFlag;

/// Ignore file read next to `.gitignore` at the watched root.
pub const IGNORE_FILE: &str = ".callchainignore";

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("Notify error: {0}")]
    Notify(#[from] notify::Error),
    #[error("Ignore rules error: {0}")]
    Ignore(#[from] ignore::Error),
}

pub type Result<T> = std::result::Result<T, WatchError>;

/// One relevant change to a source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEvent {
    /// Created or modified.
    Modified(PathBuf),
    Deleted(PathBuf),
}

impl FileEvent {
    pub fn path(&self) -> &Path {
        match self {
            FileEvent::Modified(p) | FileEvent::Deleted(p) => p,
        }
    }
}

/// Changes gathered between two re-analyses, one entry per path.
///
/// The latest event for a path wins, so a file written then removed
/// within a batch is only reported as deleted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeBatch {
    events: Vec<FileEvent>,
}

impl ChangeBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: FileEvent) {
        match self.events.iter_mut().find(|e| e.path() == event.path()) {
            Some(existing) => *existing = event,
            None => self.events.push(event),
        }
    }

    pub fn modified(&self) -> impl Iterator<Item = &Path> {
        self.events.iter().filter_map(|e| match e {
            FileEvent::Modified(p) => Some(p.as_path()),
            FileEvent::Deleted(_) => None,
        })
    }

    pub fn deleted(&self) -> impl Iterator<Item = &Path> {
        self.events.iter().filter_map(|e| match e {
            FileEvent::Deleted(p) => Some(p.as_path()),
            FileEvent::Modified(_) => None,
        })
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Quiet period before a burst of notifications is delivered.
    pub debounce_duration: Duration,
    /// Extensions of files worth re-analyzing for.
    pub extensions: Vec<String>,
    /// Honour `.gitignore` and `.callchainignore` at the root.
    pub use_gitignore: bool,
    /// Extra gitignore-style patterns, applied even without ignore files.
    pub ignore_patterns: Vec<String>,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce_duration: Duration::from_millis(300),
            extensions: vec!["java".to_string()],
            use_gitignore: true,
            ignore_patterns: ["target", "build", ".git", ".callchain", "*.class"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

enum Poll {
    Event(FileEvent),
    Idle,
    Closed,
}

/// Debounced, filtered watcher over a project root.
pub struct FileWatcher {
    _debouncer: Debouncer<RecommendedWatcher>,
    rx: Receiver<std::result::Result<Vec<DebouncedEvent>, notify::Error>>,
    config: WatcherConfig,
    ignore: Option<Gitignore>,
    root: PathBuf,
    pending: RefCell<VecDeque<FileEvent>>,
}

impl FileWatcher {
    pub fn new(root: &Path) -> Result<Self> {
        Self::with_config(root, WatcherConfig::default())
    }

    pub fn with_config(root: &Path, config: WatcherConfig) -> Result<Self> {
        let (tx, rx) = channel();
        let mut debouncer = new_debouncer(config.debounce_duration, tx)?;
        debouncer.watcher().watch(root, RecursiveMode::Recursive)?;

        let ignore = match Self::ignore_rules(root, &config) {
            Ok(rules) => rules,
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable ignore rules");
                None
            }
        };

        Ok(Self {
            _debouncer: debouncer,
            rx,
            config,
            ignore,
            root: root.to_path_buf(),
            pending: RefCell::new(VecDeque::new()),
        })
    }

    fn ignore_rules(root: &Path, config: &WatcherConfig) -> Result<Option<Gitignore>> {
        let mut builder = GitignoreBuilder::new(root);

        if config.use_gitignore {
            for name in [".gitignore", IGNORE_FILE] {
                let path = root.join(name);
                if path.is_file() {
                    if let Some(e) = builder.add(&path) {
                        return Err(e.into());
                    }
                }
            }
        }
        for pattern in &config.ignore_patterns {
            builder.add_line(None, pattern)?;
        }

        let rules = builder.build()?;
        Ok((!rules.is_empty()).then_some(rules))
    }

    /// Whether a change to `path` can affect the call graph.
    fn is_relevant(&self, path: &Path) -> bool {
        let wanted = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| {
                self.config
                    .extensions
                    .iter()
                    .any(|wanted| wanted.eq_ignore_ascii_case(ext))
            });
        if !wanted {
            return false;
        }

        // The matcher panics on paths outside its root
        match (&self.ignore, path.strip_prefix(&self.root)) {
            (Some(rules), Ok(relative)) => !rules
                .matched_path_or_any_parents(relative, false)
                .is_ignore(),
            _ => true,
        }
    }

    fn accept(&self, events: Vec<DebouncedEvent>) {
        let mut pending = self.pending.borrow_mut();
        for DebouncedEvent { path, .. } in events {
            if !self.is_relevant(&path) {
                continue;
            }
            // The debouncer does not say what happened, only where
            let event = if path.exists() {
                FileEvent::Modified(path)
            } else {
                FileEvent::Deleted(path)
            };
            pending.push_back(event);
        }
    }

    fn poll(&self, timeout: Option<Duration>) -> Poll {
        loop {
            if let Some(event) = self.pending.borrow_mut().pop_front() {
                return Poll::Event(event);
            }

            let received = match timeout {
                Some(timeout) => self.rx.recv_timeout(timeout),
                None => self.rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };
            match received {
                Ok(Ok(events)) => self.accept(events),
                Ok(Err(e)) => warn!(error = %e, "Watch error"),
                Err(RecvTimeoutError::Timeout) => return Poll::Idle,
                Err(RecvTimeoutError::Disconnected) => return Poll::Closed,
            }
        }
    }

    /// Block until the next relevant change. `None` once the watcher stops.
    pub fn next_event(&self) -> Option<FileEvent> {
        match self.poll(None) {
            Poll::Event(event) => Some(event),
            Poll::Idle | Poll::Closed => None,
        }
    }

    pub fn next_event_timeout(&self, timeout: Duration) -> Option<FileEvent> {
        match self.poll(Some(timeout)) {
            Poll::Event(event) => Some(event),
            Poll::Idle | Poll::Closed => None,
        }
    }

    /// Next change that has already arrived, without blocking.
    pub fn try_next_event(&self) -> Option<FileEvent> {
        loop {
            if let Some(event) = self.pending.borrow_mut().pop_front() {
                return Some(event);
            }
            match self.rx.try_recv() {
                Ok(Ok(events)) => self.accept(events),
                Ok(Err(e)) => warn!(error = %e, "Watch error"),
                Err(_) => return None,
            }
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Call `on_change` with each batch of source changes until `cancel` is set
/// or the watcher stops.
///
/// `poll_interval` bounds how long a cancellation can go unnoticed.
pub fn watch_until_cancelled<F>(
    watcher: &FileWatcher,
    cancel: &CancelFlag,
    poll_interval: Duration,
    mut on_change: F,
) where
    F: FnMut(&ChangeBatch),
{
    while !cancel.is_cancelled() {
        match watcher.poll(Some(poll_interval)) {
            Poll::Event(first) => {
                let mut batch = ChangeBatch::new();
                batch.push(first);
                while let Some(event) = watcher.try_next_event() {
                    batch.push(event);
                }
                debug!(
                    changes = batch.len(),
                    deleted = batch.deleted().count(),
                    "Source change batch"
                );
                on_change(&batch);
            }
            Poll::Idle => {}
            Poll::Closed => break,
        }
    }
}
