//! Go syntax extraction with tree-sitter
//!
//! Walks a file's AST and records what the call graph needs: function and
//! method declarations, function literals, call expressions, import specs,
//! and the package clause position. Function literals are named after their
//! creator (`F$1`, `F$1$1`); explicit init functions are numbered `init#N`
//! across the whole package in file order. The name `init` itself is
//! reserved for the implicit package initializer.

use std::collections::HashMap;
use std::path::Path;

use govulnscan_core::Position;
use tree_sitter::{Node, Parser, Tree};

use crate::error::{ReachError, Result};

#[derive(Debug, Clone)]
pub struct FileSyntax {
    pub filename: String,
    pub package_name: String,
    pub package_pos: Position,
    pub imports: Vec<ImportSpec>,
    pub functions: Vec<RawFunc>,
    pub calls: Vec<RawCall>,
}

#[derive(Debug, Clone)]
pub struct ImportSpec {
    pub path: String,
    /// Explicit alias; `.` for dot imports, `_` for blank imports.
    pub alias: Option<String>,
    pub pos: Position,
}

impl ImportSpec {
    /// The name the import is referred to by in this file.
    pub fn effective_name(&self) -> &str {
        match &self.alias {
            Some(alias) => alias,
            None => self.path.rsplit('/').next().unwrap_or(&self.path),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RawFunc {
    pub name: String,
    pub receiver: Option<String>,
    pub pos: Position,
}

#[derive(Debug, Clone)]
pub struct RawCall {
    /// Enclosing function name; `init` when the call appears in a top-level
    /// initializer expression.
    pub caller: String,
    pub caller_receiver: Option<String>,
    pub callee: CalleeRef,
    pub pos: Position,
}

#[derive(Debug, Clone)]
pub enum CalleeRef {
    /// `foo(...)`: unqualified, same package (or a dot import).
    Bare(String),
    /// `x.f(...)`: either a package-qualified call or a method call,
    /// resolved against the file's imports during graph assembly.
    Selector { operand: String, field: String },
    /// A function literal bound where it is created.
    Literal(String),
}

/// Parse one Go file. `init_counter` numbers explicit init functions across
/// the package and must be shared by all files of the package, in order.
pub fn parse_file(path: &Path, init_counter: &mut usize) -> Result<FileSyntax> {
    let source = std::fs::read_to_string(path)?;
    let tree = parse_source(&source).map_err(|message| ReachError::Parse {
        file: path.to_path_buf(),
        message,
    })?;
    extract(path, &source, &tree, init_counter)
}

fn parse_source(source: &str) -> std::result::Result<Tree, String> {
    let mut parser = Parser::new();
    let language: tree_sitter::Language = tree_sitter_go::LANGUAGE.into();
    parser
        .set_language(&language)
        .map_err(|e| format!("failed to set language: {e}"))?;
    parser
        .parse(source, None)
        .ok_or_else(|| "failed to parse".to_string())
}

fn extract(
    path: &Path,
    source: &str,
    tree: &Tree,
    init_counter: &mut usize,
) -> Result<FileSyntax> {
    let filename = path.to_string_lossy().into_owned();
    let mut extractor = Extractor {
        source: source.as_bytes(),
        filename: filename.clone(),
        init_counter,
        context: Vec::new(),
        literal_counters: HashMap::new(),
        syntax: FileSyntax {
            filename,
            package_name: String::new(),
            package_pos: Position {
                filename: path.to_string_lossy().into_owned(),
                offset: 0,
                line: 1,
                column: 1,
            },
            imports: Vec::new(),
            functions: Vec::new(),
            calls: Vec::new(),
        },
    };
    extractor.visit(&tree.root_node());
    Ok(extractor.syntax)
}

struct Frame {
    name: String,
    receiver: Option<String>,
}

struct Extractor<'a> {
    source: &'a [u8],
    filename: String,
    init_counter: &'a mut usize,
    context: Vec<Frame>,
    /// Next literal ordinal per creator name.
    literal_counters: HashMap<String, usize>,
    syntax: FileSyntax,
}

impl Extractor<'_> {
    fn visit(&mut self, node: &Node) {
        match node.kind() {
            "package_clause" => {
                self.syntax.package_pos = self.position(node);
                if let Some(name) = node.named_child(0) {
                    self.syntax.package_name = self.text(&name);
                }
            }
            "import_spec" => {
                self.extract_import(node);
            }
            "function_declaration" => {
                self.extract_function(node);
                return;
            }
            "method_declaration" => {
                self.extract_method(node);
                return;
            }
            "func_literal" => {
                self.extract_literal(node);
                return;
            }
            "call_expression" => {
                self.extract_call(node);
                // Fall through: arguments may contain nested calls and
                // literals.
            }
            _ => {}
        }

        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.visit(&child);
        }
    }

    fn extract_import(&mut self, node: &Node) {
        let Some(path_node) = node.child_by_field_name("path") else {
            return;
        };
        let path = self.text(&path_node).trim_matches('"').to_string();
        let alias = node
            .child_by_field_name("name")
            .map(|name| self.text(&name));
        self.syntax.imports.push(ImportSpec {
            path,
            alias,
            pos: self.position(node),
        });
    }

    fn extract_function(&mut self, node: &Node) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let mut name = self.text(&name_node);
        if name == "init" {
            *self.init_counter += 1;
            name = format!("init#{}", self.init_counter);
        }
        self.declare(node, name, None);
    }

    fn extract_method(&mut self, node: &Node) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let receiver = node
            .child_by_field_name("receiver")
            .and_then(|r| receiver_type(&self.text(&r)));
        self.declare(node, self.text(&name_node), receiver);
    }

    fn declare(&mut self, node: &Node, name: String, receiver: Option<String>) {
        self.syntax.functions.push(RawFunc {
            name: name.clone(),
            receiver: receiver.clone(),
            pos: self.position(node),
        });
        self.context.push(Frame { name, receiver });
        if let Some(body) = node.child_by_field_name("body") {
            self.visit(&body);
        }
        self.context.pop();
    }

    fn extract_literal(&mut self, node: &Node) {
        let (creator, receiver) = match self.context.last() {
            Some(frame) => (frame.name.clone(), frame.receiver.clone()),
            // A literal in a top-level initializer belongs to the implicit
            // package init.
            None => ("init".to_string(), None),
        };
        let ordinal = self.literal_counters.entry(creator.clone()).or_insert(0);
        *ordinal += 1;
        let name = format!("{creator}${ordinal}");

        self.syntax.functions.push(RawFunc {
            name: name.clone(),
            receiver: receiver.clone(),
            pos: self.position(node),
        });
        // Binding a literal is an edge from its creator.
        self.syntax.calls.push(RawCall {
            caller: creator,
            caller_receiver: self.context.last().and_then(|f| f.receiver.clone()),
            callee: CalleeRef::Literal(name.clone()),
            pos: self.position(node),
        });

        self.context.push(Frame { name, receiver });
        if let Some(body) = node.child_by_field_name("body") {
            self.visit(&body);
        }
        self.context.pop();
    }

    fn extract_call(&mut self, node: &Node) {
        let Some(function) = node.child_by_field_name("function") else {
            return;
        };
        // Unwrap generic instantiations: f[T](...)
        let function = if function.kind() == "index_expression" {
            function.child_by_field_name("operand").unwrap_or(function)
        } else {
            function
        };

        let callee = match function.kind() {
            "identifier" => CalleeRef::Bare(self.text(&function)),
            "selector_expression" => {
                let operand = function
                    .child_by_field_name("operand")
                    .map(|n| self.text(&n))
                    .unwrap_or_default();
                let field = function
                    .child_by_field_name("field")
                    .map(|n| self.text(&n))
                    .unwrap_or_default();
                if field.is_empty() {
                    return;
                }
                CalleeRef::Selector { operand, field }
            }
            // Immediately-invoked literals and other call-of-expression
            // forms already have their edges through the creator.
            _ => return,
        };

        let (caller, caller_receiver) = match self.context.last() {
            Some(frame) => (frame.name.clone(), frame.receiver.clone()),
            None => ("init".to_string(), None),
        };
        self.syntax.calls.push(RawCall {
            caller,
            caller_receiver,
            callee,
            pos: self.position(node),
        });
    }

    fn text(&self, node: &Node) -> String {
        node.utf8_text(self.source).unwrap_or("").to_string()
    }

    fn position(&self, node: &Node) -> Position {
        let point = node.start_position();
        Position {
            filename: self.filename.clone(),
            offset: node.start_byte(),
            line: point.row + 1,
            column: point.column + 1,
        }
    }
}

/// Extract the receiver type name from a receiver list like `(b *Buffer)`.
/// Pointer markers are kept; generic parameters are dropped.
fn receiver_type(receiver: &str) -> Option<String> {
    let inner = receiver.trim_start_matches('(').trim_end_matches(')');
    let ty = inner.split_whitespace().last()?;
    let ty = ty.split('[').next().unwrap_or(ty);
    if ty.is_empty() {
        None
    } else {
        Some(ty.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn parse(code: &str) -> FileSyntax {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.go");
        fs::write(&path, code).unwrap();
        let mut init_counter = 0;
        parse_file(&path, &mut init_counter).unwrap()
    }

    #[test]
    fn test_extract_functions_and_calls() {
        let syntax = parse(
            r#"
package main

import (
    "fmt"
    lang "golang.org/x/text/language"
)

func main() {
    helper()
    lang.Parse("en")
}

func helper() {
    fmt.Println("hi")
}
"#,
        );

        assert_eq!(syntax.package_name, "main");
        assert_eq!(syntax.imports.len(), 2);
        assert_eq!(syntax.imports[1].effective_name(), "lang");

        let names: Vec<_> = syntax.functions.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["main", "helper"]);

        assert!(syntax.calls.iter().any(|c| matches!(
            &c.callee,
            CalleeRef::Bare(name) if name == "helper"
        )));
        assert!(syntax.calls.iter().any(|c| matches!(
            &c.callee,
            CalleeRef::Selector { operand, field } if operand == "lang" && field == "Parse"
        )));
    }

    #[test]
    fn test_init_numbering_and_literals() {
        let syntax = parse(
            r#"
package p

func init() {
    go func() {
        work()
    }()
}

func init() {}

func Work() {
    f := func() {}
    f()
}
"#,
        );

        let names: Vec<_> = syntax.functions.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["init#1", "init#1$1", "init#2", "Work", "Work$1"]);

        // The goroutine body's call is attributed to the literal.
        let work_call = syntax
            .calls
            .iter()
            .find(|c| matches!(&c.callee, CalleeRef::Bare(n) if n == "work"))
            .unwrap();
        assert_eq!(work_call.caller, "init#1$1");
    }

    #[test]
    fn test_method_receiver() {
        let syntax = parse(
            r#"
package p

type Buffer struct{}

func (b *Buffer) Write(data []byte) {
    b.grow(len(data))
}
"#,
        );

        let write = &syntax.functions[0];
        assert_eq!(write.name, "Write");
        assert_eq!(write.receiver.as_deref(), Some("*Buffer"));

        let grow = syntax
            .calls
            .iter()
            .find(|c| matches!(&c.callee, CalleeRef::Selector { field, .. } if field == "grow"))
            .unwrap();
        assert_eq!(grow.caller, "Write");
        assert_eq!(grow.caller_receiver.as_deref(), Some("*Buffer"));
    }

    #[test]
    fn test_top_level_call_belongs_to_implicit_init() {
        let syntax = parse(
            r#"
package p

var defaults = load()

func load() map[string]string { return nil }
"#,
        );
        let call = syntax
            .calls
            .iter()
            .find(|c| matches!(&c.callee, CalleeRef::Bare(n) if n == "load"))
            .unwrap();
        assert_eq!(call.caller, "init");
    }

    #[test]
    fn test_package_clause_position() {
        let syntax = parse("package p\n\nfunc F() {}\n");
        assert_eq!(syntax.package_pos.line, 1);
        assert_eq!(syntax.package_pos.column, 1);
    }
}
