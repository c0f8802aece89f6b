//! Go Source Syntax
//!
//! Syntax-only view of a Go file backed by a tree-sitter parse tree. No type
//! resolution happens here: function identities are derived from names and
//! receiver type expressions, and everything else is left as source text.
//!
//! tree-sitter recovers from syntax errors, so a file with a broken function
//! still yields every declaration it can recognise. A file without a package
//! clause is not considered Go at all.

use thiserror::Error;
use tree_sitter::{Node, Parser, Tree};

/// Errors produced while parsing Go source
#[derive(Debug, Error)]
pub enum SyntaxError {
    /// The tree-sitter grammar is incompatible with the runtime
    #[error("Go grammar could not be loaded: {0}")]
    Language(String),

    /// tree-sitter returned no tree
    #[error("parser produced no syntax tree")]
    NoTree,

    /// The text has no package clause
    #[error("no package clause found")]
    NoPackageClause,
}

/// Byte offsets of a function body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodySpan {
    /// Offset of the opening `{`
    pub open: usize,
    /// Offset of the closing `}`
    pub close: usize,
}

/// A function or method declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuncDecl {
    /// Declared name
    pub name: String,
    /// Receiver type (`T`, `*T`) for methods
    pub receiver: Option<String>,
    /// First line of the declaration (1-based)
    pub start_line: usize,
    /// Last line of the declaration (1-based)
    pub end_line: usize,
    /// Body, absent for declarations implemented outside Go
    pub body: Option<BodySpan>,
    /// Leading whitespace of the line the declaration starts on
    pub indent: String,
}

impl FuncDecl {
    /// Receiver type, empty for plain functions
    pub fn receiver_type(&self) -> &str {
        self.receiver.as_deref().unwrap_or("")
    }
}

/// An import spec
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSpec {
    /// Import path without quotes
    pub path: String,
    /// Explicit package name (`.`, `_` or an identifier)
    pub alias: Option<String>,
}

/// A parsed Go source file
pub struct GoFile {
    source: String,
    tree: Tree,
}

impl GoFile {
    /// Parse Go source text
    pub fn parse(source: impl Into<String>) -> Result<Self, SyntaxError> {
        let source = source.into();
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_go::LANGUAGE.into())
            .map_err(|e| SyntaxError::Language(e.to_string()))?;
        let tree = parser.parse(&source, None).ok_or(SyntaxError::NoTree)?;

        let file = Self { source, tree };
        if file.package_clause().is_none() {
            return Err(SyntaxError::NoPackageClause);
        }
        Ok(file)
    }

    /// Original source text
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Whether the parser had to recover from syntax errors
    pub fn has_errors(&self) -> bool {
        self.tree.root_node().has_error()
    }

    /// Line (1-based) of the first syntax error, if any
    pub fn first_error_line(&self) -> Option<usize> {
        fn find(node: Node<'_>) -> Option<usize> {
            if node.is_error() || node.is_missing() {
                return Some(node.start_position().row + 1);
            }
            if !node.has_error() {
                return None;
            }
            let mut cursor = node.walk();
            let children: Vec<_> = node.children(&mut cursor).collect();
            children.into_iter().find_map(find)
        }
        find(self.tree.root_node())
    }

    /// Declared package name
    pub fn package_name(&self) -> Option<&str> {
        let clause = self.package_clause()?;
        let mut cursor = clause.walk();
        let name = clause
            .named_children(&mut cursor)
            .find(|n| n.kind() == "package_identifier")?;
        self.text(name)
    }

    /// Byte offset of the end of the line holding the package clause.
    ///
    /// Comments that start on that line belong to the clause. The offset
    /// sits before the line break, or at the end of the text without one.
    pub fn package_line_end(&self) -> Option<usize> {
        let clause = self.package_clause()?;
        let row = clause.end_position().row;
        let mut end = clause.end_byte();
        let mut next = clause.next_named_sibling();
        while let Some(node) = next {
            if node.kind() != "comment" || node.start_position().row != row {
                break;
            }
            end = node.end_byte();
            next = node.next_named_sibling();
        }
        let rest = &self.source[end..];
        let line = rest.find('\n').unwrap_or(rest.len());
        Some(end + rest[..line].trim_end_matches('\r').len())
    }

    /// All function and method declarations, in source order.
    ///
    /// Declarations inside error-recovery regions are included.
    pub fn functions(&self) -> Vec<FuncDecl> {
        let mut out = Vec::new();
        self.collect_functions(self.tree.root_node(), &mut out);
        out
    }

    /// All import specs, in source order
    pub fn imports(&self) -> Vec<ImportSpec> {
        let root = self.tree.root_node();
        let mut cursor = root.walk();
        let mut specs = Vec::new();
        for decl in root
            .named_children(&mut cursor)
            .filter(|n| n.kind() == "import_declaration")
        {
            let mut decl_cursor = decl.walk();
            for child in decl.named_children(&mut decl_cursor) {
                match child.kind() {
                    "import_spec" => specs.extend(self.import_spec(child)),
                    "import_spec_list" => {
                        let mut list_cursor = child.walk();
                        specs.extend(
                            child
                                .named_children(&mut list_cursor)
                                .filter(|n| n.kind() == "import_spec")
                                .filter_map(|n| self.import_spec(n)),
                        );
                    }
                    _ => {}
                }
            }
        }
        specs
    }

    fn package_clause(&self) -> Option<Node<'_>> {
        let root = self.tree.root_node();
        let mut cursor = root.walk();
        let clause = root
            .named_children(&mut cursor)
            .find(|n| n.kind() == "package_clause");
        clause
    }

    fn collect_functions(&self, node: Node<'_>, out: &mut Vec<FuncDecl>) {
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            match child.kind() {
                "function_declaration" | "method_declaration" => {
                    if let Some(decl) = self.func_decl(child) {
                        out.push(decl);
                    }
                }
                "ERROR" => self.collect_functions(child, out),
                _ => {}
            }
        }
    }

    fn func_decl(&self, node: Node<'_>) -> Option<FuncDecl> {
        let name = self.text(node.child_by_field_name("name")?)?.to_string();

        let receiver = if node.kind() == "method_declaration" {
            let list = node.child_by_field_name("receiver")?;
            let mut cursor = list.walk();
            let param = list
                .named_children(&mut cursor)
                .find(|n| n.kind() == "parameter_declaration")?;
            let ty = param.child_by_field_name("type")?;
            Some(
                self.receiver_type(ty)
                    .unwrap_or_else(|| self.text(ty).unwrap_or_default().to_string()),
            )
        } else {
            None
        };

        let body = node.child_by_field_name("body").map(|block| BodySpan {
            open: block.start_byte(),
            close: block.end_byte().saturating_sub(1),
        });

        Some(FuncDecl {
            name,
            receiver,
            start_line: node.start_position().row + 1,
            end_line: node.end_position().row + 1,
            body,
            indent: self.line_indent(node.start_byte()),
        })
    }

    /// Receiver type name: `T`, `*T`, and generic receivers by base name.
    fn receiver_type(&self, node: Node<'_>) -> Option<String> {
        match node.kind() {
            "type_identifier" => self.text(node).map(str::to_string),
            "pointer_type" => {
                let inner = node.named_child(0)?;
                if inner.kind() == "pointer_type" {
                    return None;
                }
                self.receiver_type(inner).map(|t| format!("*{t}"))
            }
            "generic_type" => self.receiver_type(node.child_by_field_name("type")?),
            "parenthesized_type" => self.receiver_type(node.named_child(0)?),
            _ => None,
        }
    }

    fn import_spec(&self, node: Node<'_>) -> Option<ImportSpec> {
        let path = self.text(node.child_by_field_name("path")?)?;
        let path = path.trim_matches(|c| c == '"' || c == '`').to_string();
        let alias = node
            .child_by_field_name("name")
            .and_then(|n| self.text(n))
            .map(str::to_string);
        Some(ImportSpec { path, alias })
    }

    fn line_indent(&self, offset: usize) -> String {
        let line_start = self.source[..offset].rfind('\n').map_or(0, |i| i + 1);
        self.source[line_start..offset]
            .chars()
            .take_while(|c| *c == ' ' || *c == '\t')
            .collect()
    }

    fn text(&self, node: Node<'_>) -> Option<&str> {
        node.utf8_text(self.source.as_bytes()).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = r#"package codec

import (
	"fmt"
	t "time"
	_ "embed"
)

type Encoder struct{}

type List[T any] struct{ items []T }

func Encode(v int) string {
	return fmt.Sprint(v)
}

func (e Encoder) Reset() {}

func (e *Encoder) Flush() error {
	_ = t.Now()
	return nil
}

func (l *List[T]) Push(v T) {
	l.items = append(l.items, v)
}

func asmAdd(a, b int) int
"#;

    #[test]
    fn parses_package_and_imports() {
        let file = GoFile::parse(SOURCE).unwrap();
        assert_eq!(file.package_name(), Some("codec"));
        assert!(!file.has_errors());
        assert_eq!(file.first_error_line(), None);

        let imports = file.imports();
        assert_eq!(
            imports,
            vec![
                ImportSpec {
                    path: "fmt".into(),
                    alias: None
                },
                ImportSpec {
                    path: "time".into(),
                    alias: Some("t".into())
                },
                ImportSpec {
                    path: "embed".into(),
                    alias: Some("_".into())
                },
            ]
        );
    }

    #[test]
    fn package_line_end_keeps_trailing_comment() {
        let src = "package p // import \"example.com/p\"\n\nfunc F() {}\n";
        let file = GoFile::parse(src).unwrap();
        assert_eq!(file.package_line_end(), Some(src.find('\n').unwrap()));

        let bare = "package p";
        assert_eq!(GoFile::parse(bare).unwrap().package_line_end(), Some(bare.len()));

        let crlf = "package p /* c */\r\n";
        assert_eq!(GoFile::parse(crlf).unwrap().package_line_end(), Some(17));
    }

    #[test]
    fn extracts_functions_and_receivers() {
        let file = GoFile::parse(SOURCE).unwrap();
        let funcs = file.functions();
        let summary: Vec<_> = funcs
            .iter()
            .map(|f| (f.name.as_str(), f.receiver_type()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("Encode", ""),
                ("Reset", "Encoder"),
                ("Flush", "*Encoder"),
                ("Push", "*List"),
                ("asmAdd", ""),
            ]
        );

        let encode = &funcs[0];
        assert_eq!(encode.start_line, 13);
        assert_eq!(encode.end_line, 15);
        let body = encode.body.unwrap();
        assert_eq!(&SOURCE[body.open..=body.open], "{");
        assert_eq!(&SOURCE[body.close..=body.close], "}");

        assert!(funcs[4].body.is_none());
    }

    #[test]
    fn rejects_non_go_text() {
        assert!(matches!(
            GoFile::parse("this is not go"),
            Err(SyntaxError::NoPackageClause)
        ));
    }

    #[test]
    fn recovers_declarations_around_syntax_errors() {
        let src = "package p\n\nfunc A() {}\n}\n\nfunc BenchmarkOk(b *testing.B) {}\n";
        let file = GoFile::parse(src).unwrap();
        assert!(file.has_errors());
        assert!(file.first_error_line().is_some());
        assert!(file.functions().iter().any(|f| f.name == "BenchmarkOk"));
    }
}
