//! Name resolution for method invocations.
//!
//! Resolution is purely syntactic. A qualified call is keyed by the last
//! segment of its qualifier, an unqualified call is looked up in the current
//! class's method table, and anything else becomes an `unknown.*` guess.

use std::collections::HashMap;

use crate::node::{Confidence, EXTERNAL_FILE, NodeAttrs, UNKNOWN_FILE, external_key, unknown_key};

/// Simple method name to the key of its most recent declaration.
///
/// Lives for one class context; later overloads shadow earlier ones.
#[derive(Debug, Clone, Default)]
pub struct MethodTable {
    methods: HashMap<String, String>,
}

impl MethodTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a declaration, replacing any earlier entry for `name`.
    pub fn register(&mut self, name: impl Into<String>, key: impl Into<String>) {
        self.methods.insert(name.into(), key.into());
    }

    /// Key registered for `name`, if any.
    pub fn lookup(&self, name: &str) -> Option<&str> {
        self.methods.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

/// Outcome of resolving one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Matched a method declared in the current class.
    Resolved(String),
    /// Named through a qualifier; the target is keyed by the qualifier's last segment.
    ExternalGuess(String),
    /// Unqualified and not found in the current class.
    UnknownGuess(String),
}

impl Resolution {
    /// Target node key.
    pub fn key(&self) -> &str {
        match self {
            Resolution::Resolved(key)
            | Resolution::ExternalGuess(key)
            | Resolution::UnknownGuess(key) => key,
        }
    }

    pub fn confidence(&self) -> Confidence {
        match self {
            Resolution::Resolved(_) => Confidence::Exact,
            Resolution::ExternalGuess(_) => Confidence::External,
            Resolution::UnknownGuess(_) => Confidence::Unknown,
        }
    }

    /// Attributes a guessed target is created with.
    ///
    /// `None` for resolved targets, whose node already exists.
    pub fn guess_attrs(&self) -> Option<NodeAttrs> {
        match self {
            Resolution::Resolved(_) => None,
            Resolution::ExternalGuess(_) => Some(NodeAttrs::located(EXTERNAL_FILE)),
            Resolution::UnknownGuess(_) => Some(NodeAttrs::located(UNKNOWN_FILE)),
        }
    }
}

/// Maps an invocation to a target node key.
#[derive(Debug, Clone, Copy, Default)]
pub struct NameResolver;

impl NameResolver {
    pub fn new() -> Self {
        Self
    }

    /// Resolve a call. Never fails.
    ///
    /// `this`, `super` and any other qualifier are treated alike: the call
    /// is keyed by the qualifier text, not by the current class.
    pub fn resolve(
        &self,
        qualifier: Option<&str>,
        method_name: &str,
        table: &MethodTable,
    ) -> Resolution {
        if let Some(qualifier) = qualifier {
            return Resolution::ExternalGuess(external_key(qualifier, method_name));
        }

        match table.lookup(method_name) {
            Some(key) => Resolution::Resolved(key.to_string()),
            None => Resolution::UnknownGuess(unknown_key(method_name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> MethodTable {
        let mut table = MethodTable::new();
        table.register("bar", "A.bar()");
        table
    }

    #[test]
    fn test_qualified_call_is_external() {
        let resolver = NameResolver::new();
        let resolution = resolver.resolve(Some("this.repo"), "save", &table());

        assert_eq!(resolution, Resolution::ExternalGuess("repo.save()".into()));
        assert_eq!(resolution.confidence(), Confidence::External);
        assert_eq!(
            resolution.guess_attrs().and_then(|a| a.file_path),
            Some(EXTERNAL_FILE.to_string())
        );
    }

    #[test]
    fn test_qualifier_wins_over_table() {
        // A qualified call never consults the table, even for `this`.
        let resolver = NameResolver::new();
        assert_eq!(
            resolver.resolve(Some("this"), "bar", &table()).key(),
            "this.bar()"
        );
    }

    #[test]
    fn test_unqualified_call_uses_table() {
        let resolver = NameResolver::new();
        let resolution = resolver.resolve(None, "bar", &table());

        assert_eq!(resolution, Resolution::Resolved("A.bar()".into()));
        assert_eq!(resolution.guess_attrs(), None);
    }

    #[test]
    fn test_unmatched_call_is_unknown() {
        let resolver = NameResolver::new();
        let resolution = resolver.resolve(None, "missing", &table());

        assert_eq!(resolution.key(), "unknown.missing()");
        assert_eq!(resolution.confidence(), Confidence::Unknown);
    }

    #[test]
    fn test_later_overload_shadows_earlier() {
        let mut table = MethodTable::new();
        table.register("run", "A.run(int)");
        table.register("run", "A.run(String)");

        assert_eq!(table.len(), 1);
        assert_eq!(table.lookup("run"), Some("A.run(String)"));
    }
}
