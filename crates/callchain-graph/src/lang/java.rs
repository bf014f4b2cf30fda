//! Java-specific event extraction.
//!
//! Walks a tree-sitter-java syntax tree in document order and reports every
//! method declaration and method invocation it meets, together with the
//! file's package and its first class declaration.

use std::path::Path;

use crate::events::{EventSource, FileEvents, SourceError, SourceEvent};
use crate::parser::{ParsedFile, Parser, is_java_path};

/// Java language extractor.
pub struct JavaExtractor {
    parser: Parser,
}

impl JavaExtractor {
    /// Create an extractor with its own parser.
    pub fn new() -> Self {
        Self {
            parser: Parser::new(),
        }
    }

    /// Extract events from a parsed Java syntax tree.
    ///
    /// Declarations and invocations are reported in preorder, which is the
    /// order they appear in the source. Methods of nested and anonymous
    /// classes are included; they are attributed to the file's first class.
    pub fn extract_events(parsed: &ParsedFile, relative_path: &str) -> FileEvents {
        let mut file = FileEvents::new(relative_path);
        let mut cursor = parsed.root_node().walk();

        'walk: loop {
            let node = cursor.node();
            match node.kind() {
                "package_declaration" if file.package.is_none() => {
                    file.package = package_name(parsed, node);
                }
                "class_declaration" if file.class_name.is_none() => {
                    file.class_name = node
                        .child_by_field_name("name")
                        .map(|n| parsed.node_text(n).to_string());
                }
                "method_declaration" => {
                    if let Some(event) = method_declared(parsed, node) {
                        file.events.push(event);
                    }
                }
                "method_invocation" => {
                    if let Some(event) = method_invoked(parsed, node) {
                        file.events.push(event);
                    }
                }
                _ => {}
            }

            if cursor.goto_first_child() {
                continue;
            }
            while !cursor.goto_next_sibling() {
                if !cursor.goto_parent() {
                    break 'walk;
                }
            }
        }

        file
    }
}

impl Default for JavaExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSource for JavaExtractor {
    fn supports(&self, path: &Path) -> bool {
        is_java_path(path)
    }

    fn extract(&mut self, path: &Path, relative_path: &str) -> Result<FileEvents, SourceError> {
        let parsed = self.parser.parse_file(path)?;
        if let Some(line) = parsed.first_error_line() {
            return Err(SourceError::Syntax {
                path: relative_path.to_string(),
                line,
            });
        }
        Ok(Self::extract_events(&parsed, relative_path))
    }
}

fn package_name(parsed: &ParsedFile, node: tree_sitter::Node) -> Option<String> {
    let mut cursor = node.walk();
    let name = node
        .named_children(&mut cursor)
        .find(|child| matches!(child.kind(), "scoped_identifier" | "identifier"))
        .map(|child| compact(parsed.node_text(child)));
    name
}

fn method_declared(parsed: &ParsedFile, node: tree_sitter::Node) -> Option<SourceEvent> {
    let name = parsed.node_text(node.child_by_field_name("name")?).to_string();

    let mut param_types = Vec::new();
    if let Some(params) = node.child_by_field_name("parameters") {
        let mut cursor = params.walk();
        for param in params.named_children(&mut cursor) {
            let type_node = match param.kind() {
                "formal_parameter" => param.child_by_field_name("type"),
                "spread_parameter" => {
                    let mut inner = param.walk();
                    let found = param
                        .named_children(&mut inner)
                        .find(|c| {
                            !matches!(
                                c.kind(),
                                "modifiers"
                                    | "annotation"
                                    | "marker_annotation"
                                    | "variable_declarator"
                            )
                        });
                    found
                }
                // receiver parameters (`Foo this`) are not real arguments
                _ => None,
            };
            if let Some(type_node) = type_node {
                param_types.push(type_name(parsed, type_node));
            }
        }
    }

    Some(SourceEvent::MethodDeclared { name, param_types })
}

fn method_invoked(parsed: &ParsedFile, node: tree_sitter::Node) -> Option<SourceEvent> {
    let name = parsed.node_text(node.child_by_field_name("name")?).to_string();
    let qualifier = node
        .child_by_field_name("object")
        .and_then(|object| qualifier_text(parsed, object));

    Some(SourceEvent::MethodInvoked { qualifier, name })
}

/// Receiver text usable as a qualifier: plain names, dotted field chains,
/// `this` and `super`. Call results, casts and `new` expressions have no
/// usable name.
fn qualifier_text(parsed: &ParsedFile, object: tree_sitter::Node) -> Option<String> {
    match object.kind() {
        "identifier" | "this" | "super" => Some(compact(parsed.node_text(object))),
        "field_access" | "scoped_identifier" => {
            let text = compact(parsed.node_text(object));
            is_dotted_name(&text).then_some(text)
        }
        _ => None,
    }
}

/// Type name as written, without generic arguments or array dimensions.
fn type_name(parsed: &ParsedFile, node: tree_sitter::Node) -> String {
    match node.kind() {
        "array_type" => match node.child_by_field_name("element") {
            Some(element) => type_name(parsed, element),
            None => strip_type_decorations(parsed.node_text(node)),
        },
        "annotated_type" => {
            let mut cursor = node.walk();
            let inner = node
                .named_children(&mut cursor)
                .filter(|c| !matches!(c.kind(), "annotation" | "marker_annotation"))
                .last();
            match inner {
                Some(inner) => type_name(parsed, inner),
                None => strip_type_decorations(parsed.node_text(node)),
            }
        }
        _ => strip_type_decorations(parsed.node_text(node)),
    }
}

/// Drop generic arguments, array brackets, varargs dots and whitespace.
fn strip_type_decorations(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut depth = 0usize;
    for c in text.chars() {
        match c {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            _ if depth > 0 || c.is_whitespace() => {}
            _ => out.push(c),
        }
    }
    let trimmed = out.trim_end_matches("...").trim_end_matches("[]");
    let mut result = trimmed.to_string();
    while result.ends_with("[]") {
        result.truncate(result.len() - 2);
    }
    result
}

fn compact(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

fn is_dotted_name(text: &str) -> bool {
    !text.is_empty()
        && text.split('.').all(|seg| {
            !seg.is_empty() && seg.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '$')
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(source: &str) -> FileEvents {
        let mut parser = Parser::new();
        let parsed = parser.parse_source(source).unwrap();
        JavaExtractor::extract_events(&parsed, "src/Test.java")
    }

    #[test]
    fn test_package_and_first_class() {
        let file = extract(
            r#"
package com.acme.app;

public class First {
    void a() {}
}

class Second {
    void b() {}
}
"#,
        );

        assert_eq!(file.package.as_deref(), Some("com.acme.app"));
        assert_eq!(file.class_name.as_deref(), Some("First"));
        assert_eq!(file.qualified_class_name().as_deref(), Some("com.acme.app.First"));
        assert_eq!(file.path, "src/Test.java");
        assert_eq!(file.events.len(), 2);
    }

    #[test]
    fn test_interface_only_file_has_no_class() {
        let file = extract("interface Greeter { void greet(); }");
        assert_eq!(file.class_name, None);
        assert_eq!(file.events, vec![SourceEvent::declared("greet", Vec::<String>::new())]);
    }

    #[test]
    fn test_events_in_document_order() {
        let file = extract(
            r#"
class A {
    void foo() {
        bar();
        obj.baz();
        this.qux();
    }

    void bar() {
        helper.repo.save();
    }
}
"#,
        );

        assert_eq!(
            file.events,
            vec![
                SourceEvent::declared("foo", Vec::<String>::new()),
                SourceEvent::invoked("bar"),
                SourceEvent::invoked_on("obj", "baz"),
                SourceEvent::invoked_on("this", "qux"),
                SourceEvent::declared("bar", Vec::<String>::new()),
                SourceEvent::invoked_on("helper.repo", "save"),
            ]
        );
    }

    #[test]
    fn test_parameter_types_are_simplified() {
        let file = extract(
            r#"
class A {
    void run(String name, int count, List<Map<String, Integer>> rows, byte[] data, Object... rest) {}
}
"#,
        );

        assert_eq!(
            file.events,
            vec![SourceEvent::declared(
                "run",
                ["String", "int", "List", "byte", "Object"]
            )]
        );
    }

    #[test]
    fn test_chained_call_receiver_has_no_qualifier() {
        let file = extract(
            r#"
class A {
    void go() {
        builder().build();
        new Thing().start();
    }
}
"#,
        );

        // Inner call comes after the outer one in preorder
        assert_eq!(
            file.events,
            vec![
                SourceEvent::declared("go", Vec::<String>::new()),
                SourceEvent::invoked("build"),
                SourceEvent::invoked("builder"),
                SourceEvent::invoked("start"),
            ]
        );
    }

    #[test]
    fn test_strip_type_decorations() {
        assert_eq!(strip_type_decorations("Map<String, List<Integer>>"), "Map");
        assert_eq!(strip_type_decorations("int[][]"), "int");
        assert_eq!(strip_type_decorations("String..."), "String");
        assert_eq!(strip_type_decorations("java.util.List<T>"), "java.util.List");
    }

    #[test]
    fn test_is_dotted_name() {
        assert!(is_dotted_name("a.b.c"));
        assert!(is_dotted_name("$x_1"));
        assert!(!is_dotted_name("a().b"));
        assert!(!is_dotted_name(""));
        assert!(!is_dotted_name("a..b"));
    }

    #[test]
    fn test_event_source_rejects_syntax_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Broken.java");
        std::fs::write(&path, "public class Broken { void x( { }").unwrap();

        let mut extractor = JavaExtractor::new();
        assert!(extractor.supports(&path));
        assert!(!extractor.supports(Path::new("notes.txt")));

        let err = extractor.extract(&path, "Broken.java").unwrap_err();
        assert!(matches!(
            err,
            SourceError::Syntax { ref path, line: 1 } if path == "Broken.java"
        ));
    }
}
