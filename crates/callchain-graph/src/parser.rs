//! Tree-sitter parsing of Java sources.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// File extension of Java sources.
pub const JAVA_EXTENSION: &str = "java";

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to load the Java grammar: {0}")]
    Grammar(String),

    #[error("Parser produced no tree")]
    NoTree,
}

/// True when `path` has a `.java` extension (any case).
pub fn is_java_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(JAVA_EXTENSION))
}

/// A Java syntax tree together with the text it was parsed from.
pub struct ParsedFile {
    tree: tree_sitter::Tree,
    source: String,
}

impl ParsedFile {
    pub fn root_node(&self) -> tree_sitter::Node<'_> {
        self.tree.root_node()
    }

    /// Source text covered by `node`.
    pub fn node_text(&self, node: tree_sitter::Node) -> &str {
        node.utf8_text(self.source.as_bytes()).unwrap_or("")
    }

    /// Returns true if tree-sitter had to recover from syntax errors.
    pub fn has_errors(&self) -> bool {
        self.tree.root_node().has_error()
    }

    /// 1-based line of the first error or missing node, in preorder.
    pub fn first_error_line(&self) -> Option<usize> {
        let root = self.tree.root_node();
        if !root.has_error() {
            return None;
        }

        let mut cursor = root.walk();
        loop {
            let node = cursor.node();
            if node.is_error() || node.is_missing() {
                return Some(node.start_position().row + 1);
            }
            // Only descend into subtrees that contain the error
            if node.has_error() && cursor.goto_first_child() {
                continue;
            }
            while !cursor.goto_next_sibling() {
                if !cursor.goto_parent() {
                    return Some(root.start_position().row + 1);
                }
            }
        }
    }
}

/// Java parser. The grammar is loaded on first use.
pub struct Parser {
    inner: tree_sitter::Parser,
    grammar_loaded: bool,
}

impl Parser {
    pub fn new() -> Self {
        Self {
            inner: tree_sitter::Parser::new(),
            grammar_loaded: false,
        }
    }

    /// Read and parse a file from the filesystem.
    pub fn parse_file(&mut self, path: &Path) -> Result<ParsedFile, ParseError> {
        let source = std::fs::read_to_string(path).map_err(|source| ParseError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        self.parse_source(source)
    }

    pub fn parse_source(&mut self, source: impl Into<String>) -> Result<ParsedFile, ParseError> {
        if !self.grammar_loaded {
            self.inner
                .set_language(&tree_sitter_java::LANGUAGE.into())
                .map_err(|e| ParseError::Grammar(e.to_string()))?;
            self.grammar_loaded = true;
        }

        let source = source.into();
        let tree = self.inner.parse(&source, None).ok_or(ParseError::NoTree)?;
        Ok(ParsedFile { tree, source })
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}
