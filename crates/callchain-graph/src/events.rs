//! Declaration and invocation events produced by a language front-end.
//!
//! A front-end turns one source file into a [`FileEvents`] value: the file's
//! primary type, its package, and the ordered stream of method declarations
//! and invocations found in document order.

use std::path::Path;

use crate::parser::ParseError;

/// Package name used when a file has no package declaration.
pub const DEFAULT_PACKAGE: &str = "default";

/// Error type for event sources.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("Syntax error in {path} at line {line}")]
    Syntax { path: String, line: usize },
}

/// A single event in a file's stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceEvent {
    /// A method declaration.
    MethodDeclared {
        /// Simple method name.
        name: String,
        /// Parameter type names in order.
        param_types: Vec<String>,
    },
    /// A method call expression.
    MethodInvoked {
        /// Receiver text as written (`obj`, `this.repo`), if any.
        qualifier: Option<String>,
        /// Called method name.
        name: String,
    },
}

impl SourceEvent {
    /// Create a declaration event.
    pub fn declared<S: Into<String>>(
        name: impl Into<String>,
        param_types: impl IntoIterator<Item = S>,
    ) -> Self {
        SourceEvent::MethodDeclared {
            name: name.into(),
            param_types: param_types.into_iter().map(Into::into).collect(),
        }
    }

    /// Create an unqualified invocation event.
    pub fn invoked(name: impl Into<String>) -> Self {
        SourceEvent::MethodInvoked {
            qualifier: None,
            name: name.into(),
        }
    }

    /// Create a qualified invocation event.
    pub fn invoked_on(qualifier: impl Into<String>, name: impl Into<String>) -> Self {
        SourceEvent::MethodInvoked {
            qualifier: Some(qualifier.into()),
            name: name.into(),
        }
    }

    /// Returns a description of what is malformed about this event, if anything.
    pub fn malformation(&self) -> Option<&'static str> {
        match self {
            SourceEvent::MethodDeclared { name, param_types } => {
                if name.trim().is_empty() {
                    Some("method declaration without a name")
                } else if param_types.iter().any(|t| t.trim().is_empty()) {
                    Some("method declaration with an empty parameter type")
                } else {
                    None
                }
            }
            SourceEvent::MethodInvoked { qualifier, name } => {
                if name.trim().is_empty() {
                    Some("method invocation without a name")
                } else if qualifier.as_deref().is_some_and(|q| q.trim().is_empty()) {
                    Some("method invocation with an empty qualifier")
                } else {
                    None
                }
            }
        }
    }
}

/// Everything a front-end extracted from one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvents {
    /// Path relative to the project root.
    pub path: String,
    /// Package or namespace, if declared.
    pub package: Option<String>,
    /// Simple name of the file's first top-level class, if any.
    pub class_name: Option<String>,
    /// Events in document order.
    pub events: Vec<SourceEvent>,
}

impl FileEvents {
    /// Create an empty event set for a file.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            package: None,
            class_name: None,
            events: Vec::new(),
        }
    }

    /// Set the package.
    pub fn with_package(mut self, package: impl Into<String>) -> Self {
        self.package = Some(package.into());
        self
    }

    /// Set the primary class.
    pub fn with_class(mut self, class_name: impl Into<String>) -> Self {
        self.class_name = Some(class_name.into());
        self
    }

    /// Append an event.
    pub fn with_event(mut self, event: SourceEvent) -> Self {
        self.events.push(event);
        self
    }

    /// `package.Class`, using the default package when none was declared.
    ///
    /// Returns `None` when the file declares no class.
    pub fn qualified_class_name(&self) -> Option<String> {
        self.class_name.as_ref().map(|class| {
            format!(
                "{}.{}",
                self.package.as_deref().unwrap_or(DEFAULT_PACKAGE),
                class
            )
        })
    }
}

/// A front-end producing events from source files.
///
/// Implementations are not required to be thread-safe; the analyzer creates
/// one per worker thread.
pub trait EventSource {
    /// Returns true if this source understands the file.
    fn supports(&self, path: &Path) -> bool;

    /// Extract events from `path`, recording `relative_path` as the file's
    /// origin.
    fn extract(&mut self, path: &Path, relative_path: &str) -> Result<FileEvents, SourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualified_class_name() {
        let file = FileEvents::new("A.java").with_class("A");
        assert_eq!(file.qualified_class_name().as_deref(), Some("default.A"));

        let file = file.with_package("com.acme");
        assert_eq!(file.qualified_class_name().as_deref(), Some("com.acme.A"));

        assert_eq!(FileEvents::new("B.java").qualified_class_name(), None);
    }

    #[test]
    fn test_malformation() {
        assert!(SourceEvent::declared("run", ["String"]).malformation().is_none());
        assert!(SourceEvent::declared("", Vec::<String>::new()).malformation().is_some());
        assert!(SourceEvent::declared("run", [" "]).malformation().is_some());
        assert!(SourceEvent::invoked("go").malformation().is_none());
        assert!(SourceEvent::invoked_on("", "go").malformation().is_some());
        assert!(SourceEvent::invoked("").malformation().is_some());
    }
}
