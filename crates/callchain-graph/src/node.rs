//! Node identity and attributes for the call graph.
//!
//! Every node is identified by a synthetic string key. Declared methods carry
//! their owning class, simple name, origin file and parameter types; nodes that
//! were only guessed by the resolver carry a sentinel `file_path` instead.

use serde::{Deserialize, Serialize};

/// `file_path` sentinel for call targets named through a qualifier.
pub const EXTERNAL_FILE: &str = "external";

/// `file_path` sentinel for unqualified calls that matched no known method.
pub const UNKNOWN_FILE: &str = "unknown";

/// How reliably a node's identity was determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    /// Built from an actual method declaration.
    Exact,
    /// Guessed from the literal qualifier text of a call.
    External,
    /// Unqualified call with no match in the current class.
    Unknown,
}

impl Confidence {
    /// Classify a `file_path` attribute value.
    ///
    /// A missing path is treated like the `unknown` sentinel, which is also the
    /// bucket such nodes land in when persisted.
    pub fn from_file_path(file_path: Option<&str>) -> Self {
        match file_path {
            Some(EXTERNAL_FILE) => Confidence::External,
            Some(UNKNOWN_FILE) | None => Confidence::Unknown,
            Some(_) => Confidence::Exact,
        }
    }
}

/// Attributes attached to a node.
///
/// All fields are optional: nodes created implicitly by an edge have none,
/// guessed nodes only have `file_path`. Merging fills missing fields and never
/// replaces a value that is already set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAttrs {
    /// Fully qualified owning class (`com.acme.Service`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,

    /// Simple method name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method_name: Option<String>,

    /// Declaring file relative to the project root, or a sentinel.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,

    /// Parameter type names in declaration order.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Vec<String>>,
}

impl NodeAttrs {
    /// Attributes of a method declared in source.
    pub fn declared(
        class_name: impl Into<String>,
        method_name: impl Into<String>,
        file_path: impl Into<String>,
        parameters: Vec<String>,
    ) -> Self {
        Self {
            class_name: Some(class_name.into()),
            method_name: Some(method_name.into()),
            file_path: Some(file_path.into()),
            parameters: Some(parameters),
        }
    }

    /// Minimal attributes carrying only a file path (or sentinel).
    pub fn located(file_path: impl Into<String>) -> Self {
        Self {
            file_path: Some(file_path.into()),
            ..Self::default()
        }
    }

    /// Fill every unset field from `other`. Returns true if anything changed.
    pub fn merge_missing(&mut self, other: NodeAttrs) -> bool {
        fn fill<T>(slot: &mut Option<T>, value: Option<T>) -> bool {
            match (slot.is_none(), value) {
                (true, Some(v)) => {
                    *slot = Some(v);
                    true
                }
                _ => false,
            }
        }

        let mut changed = fill(&mut self.class_name, other.class_name);
        changed |= fill(&mut self.method_name, other.method_name);
        changed |= fill(&mut self.file_path, other.file_path);
        changed |= fill(&mut self.parameters, other.parameters);
        changed
    }

    /// Confidence implied by the `file_path` sentinel.
    pub fn confidence(&self) -> Confidence {
        Confidence::from_file_path(self.file_path.as_deref())
    }
}

/// A node of the call graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Unique key, e.g. `Service.run(String, int)`.
    pub key: String,
    /// Attributes accumulated for this key.
    pub attrs: NodeAttrs,
}

impl Node {
    /// Create a node.
    pub fn new(key: impl Into<String>, attrs: NodeAttrs) -> Self {
        Self {
            key: key.into(),
            attrs,
        }
    }

    /// Bucket this node is aggregated under when persisted.
    pub fn bucket(&self) -> &str {
        self.attrs.file_path.as_deref().unwrap_or(UNKNOWN_FILE)
    }

    /// Confidence of this node's identity.
    pub fn confidence(&self) -> Confidence {
        self.attrs.confidence()
    }
}

/// Key of a declared method: `SimpleClass.method(T1, T2)`.
///
/// `class_name` may be fully qualified; only its last segment is used.
pub fn declared_key(class_name: &str, method_name: &str, param_types: &[String]) -> String {
    format!(
        "{}.{}({})",
        last_segment(class_name),
        method_name,
        param_types.join(", ")
    )
}

/// Key of a call through a qualifier: `LastSegment.method()`.
pub fn external_key(qualifier: &str, method_name: &str) -> String {
    format!("{}.{}()", last_segment(qualifier), method_name)
}

/// Key of an unqualified call that matched nothing: `unknown.method()`.
pub fn unknown_key(method_name: &str) -> String {
    format!("{UNKNOWN_FILE}.{method_name}()")
}

/// Last `.`-separated segment of a dotted name.
pub fn last_segment(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name)
}
