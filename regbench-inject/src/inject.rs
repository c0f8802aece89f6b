//! Regression injection into a single Go function
//!
//! The rewrite is a splice over the original source at parse-tree byte
//! offsets. Only the start of each target body changes and, when needed,
//! the end of the package clause's line. Every other byte of the
//! file is written back as it was read.

use crate::imports::TimeImport;
use crate::revert::{Revert, RevertError};
use regbench_core::{BodySpan, FuncDecl, FunctionId, GoFile, RegressionTarget, SyntaxError};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the injected start-time variable
pub const START_VARIABLE: &str = "_regbenchStart";

/// Why a source file could not be rewritten
#[derive(Debug, Error)]
pub enum RewriteError {
    /// The file is not Go source
    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    /// The file parses only with error recovery
    #[error("syntax error at line {line}")]
    Malformed {
        /// First line containing an error
        line: usize,
    },
}

/// Errors produced by the injector
#[derive(Debug, Error)]
pub enum InjectError {
    /// Reading or writing the target file failed
    #[error("{}: {source}", path.display())]
    Io {
        /// Target file
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The target file could not be parsed
    #[error("cannot parse {}: {source}", path.display())]
    Parse {
        /// Target file
        path: PathBuf,
        /// Parse failure
        #[source]
        source: RewriteError,
    },

    /// Recording the file for later revert failed
    #[error(transparent)]
    Revert(#[from] RevertError),
}

/// What happened to the target function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectOutcome {
    /// The delay was added to the function starting at `line`
    Injected {
        /// First line of the declaration (1-based)
        line: usize,
    },
    /// No declaration in the file matches the target identity
    NotFound,
    /// The function is declared without a Go body
    NoBody,
}

/// Rewritten source and what the rewrite did
#[derive(Debug, Clone)]
pub struct Injection {
    /// File contents after the rewrite
    pub source: String,
    /// Effect on the target
    pub outcome: InjectOutcome,
}

/// Whether a declaration matches a target identity.
///
/// Only name and receiver type are compared; Go has no overloading.
pub fn matches(decl: &FuncDecl, function: &FunctionId) -> bool {
    decl.name == function.name && decl.receiver_type() == function.receiver
}

/// Add a delay proportional to the target's own elapsed time to its body.
///
/// Every matching declaration with a body is rewritten, so all `init`
/// functions of a file are slowed down together. An unmatched target leaves
/// the source unchanged.
///
/// The inserted statements call through the file's `time` qualifier. A
/// parameter or local of the target that shadows that name makes the
/// rewritten file fail to compile.
pub fn inject_source(source: &str, target: &RegressionTarget) -> Result<Injection, RewriteError> {
    let file = GoFile::parse(source)?;
    if let Some(line) = file.first_error_line() {
        return Err(RewriteError::Malformed { line });
    }

    let unchanged = |outcome| Injection {
        source: source.to_string(),
        outcome,
    };

    let decls: Vec<FuncDecl> = file
        .functions()
        .into_iter()
        .filter(|decl| matches(decl, &target.function))
        .collect();
    if decls.is_empty() {
        return Ok(unchanged(InjectOutcome::NotFound));
    }

    let time = TimeImport::resolve(&file);
    let mut edits: Vec<_> = decls
        .iter()
        .filter_map(|decl| {
            let body = decl.body?;
            Some(body_edit(source, decl, body, &time.qualifier, target.violation))
        })
        .collect();
    let Some(line) = decls
        .iter()
        .find(|decl| decl.body.is_some())
        .map(|decl| decl.start_line)
    else {
        return Ok(unchanged(InjectOutcome::NoBody));
    };

    if time.missing {
        let at = file
            .package_line_end()
            .ok_or(SyntaxError::NoPackageClause)?;
        edits.push((at, at, TimeImport::declaration()));
    }

    Ok(Injection {
        source: splice(source, edits),
        outcome: InjectOutcome::Injected { line },
    })
}

/// Edit that opens `body` with the start-time capture and the deferred sleep
fn body_edit(
    source: &str,
    decl: &FuncDecl,
    body: BodySpan,
    q: &str,
    violation: f64,
) -> (usize, usize, String) {
    let body_indent = format!("{}\t", decl.indent);
    let mut statements = format!(
        "\n{body_indent}{START_VARIABLE} := {q}Now()\n\
         {body_indent}defer func() {{ {q}Sleep({q}Duration(float64({q}Since({START_VARIABLE}).Nanoseconds()) * {violation:.6})) }}()"
    );

    // Keep whatever followed the brace on its own line.
    let after_brace = body.open + 1;
    let rest = &source[after_brace..];
    let blank = rest.len() - rest.trim_start_matches([' ', '\t']).len();
    let resume = after_brace + blank;
    match source[resume..].chars().next() {
        None | Some('\n') | Some('\r') => {}
        Some(_) if resume == body.close => {
            statements.push('\n');
            statements.push_str(&decl.indent);
        }
        Some(_) => {
            statements.push('\n');
            statements.push_str(&body_indent);
        }
    }
    (after_brace, resume, statements)
}

/// Replace `start..end` ranges with new text. Ranges must not overlap.
fn splice(source: &str, mut edits: Vec<(usize, usize, String)>) -> String {
    edits.sort_by(|a, b| b.0.cmp(&a.0));
    let mut out = source.to_string();
    for (start, end, text) in edits {
        out.replace_range(start..end, &text);
    }
    out
}

/// Applies regressions to files of a Go project and undoes them
pub struct Injector<R> {
    project: PathBuf,
    reverter: R,
}

impl<R: Revert> Injector<R> {
    /// Create an injector for the project rooted at `project`
    pub fn new(project: impl Into<PathBuf>, reverter: R) -> Self {
        Self {
            project: project.into(),
            reverter,
        }
    }

    /// Project root
    pub fn project(&self) -> &Path {
        &self.project
    }

    /// Revert mechanism
    pub fn reverter(&self) -> &R {
        &self.reverter
    }

    /// Rewrite the file containing `target` so the function is slowed down.
    ///
    /// The file is always written back, even when nothing matched.
    pub fn inject(&mut self, target: &RegressionTarget) -> Result<InjectOutcome, InjectError> {
        let path = target.function.source_path(&self.project);
        let source = std::fs::read_to_string(&path).map_err(|source| InjectError::Io {
            path: path.clone(),
            source,
        })?;

        let injection = inject_source(&source, target).map_err(|source| InjectError::Parse {
            path: path.clone(),
            source,
        })?;

        match injection.outcome {
            InjectOutcome::Injected { line } => tracing::debug!(
                "Injected {:.6}x regression into {} at {}:{}",
                target.violation,
                target,
                path.display(),
                line
            ),
            InjectOutcome::NotFound => {
                tracing::warn!("{} not found in {}; file left unchanged", target, path.display())
            }
            InjectOutcome::NoBody => tracing::warn!(
                "{} has no Go body; file left unchanged",
                target
            ),
        }

        self.reverter.track(&path)?;
        std::fs::write(&path, injection.source).map_err(|source| InjectError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(injection.outcome)
    }

    /// Discard every modification made since the last revert
    pub fn reset(&mut self) -> Result<(), RevertError> {
        self.reverter.revert()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::revert::SnapshotReverter;
    use tempfile::TempDir;

    const DEFER: &str = "defer func() { time.Sleep(time.Duration(float64(time.Since(_regbenchStart).Nanoseconds()) * 1.000000)) }()";

    fn target(name: &str, receiver: &str) -> RegressionTarget {
        RegressionTarget::new(FunctionId::new("/calc", "calc.go", name, receiver), 1.0)
    }

    #[test]
    fn function_with_return() {
        let src = "package calc\n\nfunc Add(a, b int) int {\n\treturn a + b\n}\n";
        let out = inject_source(src, &target("Add", "")).unwrap();
        assert_eq!(out.outcome, InjectOutcome::Injected { line: 3 });
        assert_eq!(
            out.source,
            format!(
                "package calc\n\nimport \"time\"\n\nfunc Add(a, b int) int {{\n\t_regbenchStart := time.Now()\n\t{DEFER}\n\treturn a + b\n}}\n"
            )
        );
    }

    #[test]
    fn empty_void_function() {
        let src = "package calc\n\nimport \"time\"\n\nfunc Tick() {}\n";
        let out = inject_source(src, &target("Tick", "")).unwrap();
        assert_eq!(
            out.source,
            format!(
                "package calc\n\nimport \"time\"\n\nfunc Tick() {{\n\t_regbenchStart := time.Now()\n\t{DEFER}\n}}\n"
            )
        );
    }

    #[test]
    fn single_line_body() {
        let src = "package calc\n\nimport \"time\"\n\nfunc One() int { return 1 }\n";
        let out = inject_source(src, &target("One", "")).unwrap();
        assert_eq!(
            out.source,
            format!(
                "package calc\n\nimport \"time\"\n\nfunc One() int {{\n\t_regbenchStart := time.Now()\n\t{DEFER}\n\treturn 1 }}\n"
            )
        );
    }

    #[test]
    fn matches_receiver_kind() {
        let src = "package calc

import \"time\"

type A struct{}

type B struct{}

func (a A) Run() {}

func (b *B) Run() {}

func Run() {}
";
        let out = inject_source(src, &target("Run", "*B")).unwrap();
        assert_eq!(out.outcome, InjectOutcome::Injected { line: 11 });
        assert!(out.source.contains("func (a A) Run() {}\n"));
        assert!(out.source.contains("func Run() {}\n"));
        assert!(out.source.contains(&format!(
            "func (b *B) Run() {{\n\t_regbenchStart := time.Now()\n\t{DEFER}\n}}\n"
        )));

        let value = inject_source(src, &target("Run", "A")).unwrap();
        assert_eq!(value.outcome, InjectOutcome::Injected { line: 9 });

        let plain = inject_source(src, &target("Run", "")).unwrap();
        assert_eq!(plain.outcome, InjectOutcome::Injected { line: 13 });
    }

    #[test]
    fn every_init_body_is_injected() {
        let src = "package calc\n\nimport \"time\"\n\nfunc init() {\n\tsetup()\n}\n\nfunc helper() {}\n\nfunc init() {\n\twarm()\n}\n";
        let out = inject_source(src, &target("init", "")).unwrap();
        assert_eq!(out.outcome, InjectOutcome::Injected { line: 5 });
        assert_eq!(out.source.matches("_regbenchStart := time.Now()").count(), 2);
        assert_eq!(out.source.matches(DEFER).count(), 2);
        assert!(out.source.contains("func helper() {}\n"));
        assert!(out.source.contains(&format!(
            "func init() {{\n\t_regbenchStart := time.Now()\n\t{DEFER}\n\twarm()\n}}\n"
        )));
    }

    #[test]
    fn import_goes_after_package_line_comment() {
        let src = "package calc // import \"example.com/calc\"\n\nfunc Add() {}\n";
        let out = inject_source(src, &target("Add", "")).unwrap();
        assert!(out.source.starts_with(
            "package calc // import \"example.com/calc\"\n\nimport \"time\"\n\nfunc Add() {\n"
        ));
    }

    #[test]
    fn shadowed_qualifier_is_not_renamed() {
        let src = "package calc\n\nimport \"time\"\n\nfunc Wait(time int) {\n\tuse(time)\n}\n";
        let out = inject_source(src, &target("Wait", "")).unwrap();
        assert_eq!(out.outcome, InjectOutcome::Injected { line: 5 });
        assert!(out.source.contains("\t_regbenchStart := time.Now()\n"));
    }

    #[test]
    fn reuses_import_alias() {
        let src = "package calc\n\nimport (\n\t\"fmt\"\n\tclock \"time\"\n)\n\nfunc Show() {\n\tfmt.Println(clock.Now())\n}\n";
        let out = inject_source(src, &target("Show", "")).unwrap();
        assert!(out.source.starts_with("package calc\n\nimport (\n\t\"fmt\"\n\tclock \"time\"\n)\n"));
        assert!(out.source.contains("\t_regbenchStart := clock.Now()\n"));
        assert!(out.source.contains(
            "defer func() { clock.Sleep(clock.Duration(float64(clock.Since(_regbenchStart).Nanoseconds()) * 1.000000)) }()"
        ));
        assert_eq!(out.source.matches("\"time\"").count(), 1);
    }

    #[test]
    fn dot_import_is_unqualified() {
        let src = "package calc\n\nimport . \"time\"\n\nfunc Wait() {\n\tSleep(1)\n}\n";
        let out = inject_source(src, &target("Wait", "")).unwrap();
        assert!(out.source.contains("\t_regbenchStart := Now()\n"));
        assert!(out.source.contains("Sleep(Duration(float64(Since(_regbenchStart)"));
    }

    #[test]
    fn violation_is_formatted_with_six_decimals() {
        let src = "package calc\n\nfunc Add() {}\n";
        let mut t = target("Add", "");
        t.violation = 0.25;
        let out = inject_source(src, &t).unwrap();
        assert!(out.source.contains(") * 0.250000)) }()"));
    }

    #[test]
    fn nested_function_indentation() {
        let src = "package calc\n\nimport \"time\"\n\n\tfunc Indented() {\n\t\tx()\n\t}\n";
        let out = inject_source(src, &target("Indented", "")).unwrap();
        assert!(out.source.contains("\tfunc Indented() {\n\t\t_regbenchStart := time.Now()\n\t\tdefer"));
    }

    #[test]
    fn absent_target_leaves_source_unchanged() {
        let src = "package calc\n\nfunc Add(a, b int) int {\n\treturn a + b\n}\n";
        let out = inject_source(src, &target("Sub", "")).unwrap();
        assert_eq!(out.outcome, InjectOutcome::NotFound);
        assert_eq!(out.source, src);

        let method = inject_source(src, &target("Add", "*Calc")).unwrap();
        assert_eq!(method.outcome, InjectOutcome::NotFound);
        assert_eq!(method.source, src);
    }

    #[test]
    fn bodyless_declaration_is_left_alone() {
        let src = "package calc\n\nfunc asmAdd(a, b int) int\n";
        let out = inject_source(src, &target("asmAdd", "")).unwrap();
        assert_eq!(out.outcome, InjectOutcome::NoBody);
        assert_eq!(out.source, src);
    }

    #[test]
    fn malformed_file_is_rejected() {
        let src = "package calc\n\nfunc Add( {\n";
        assert!(matches!(
            inject_source(src, &target("Add", "")),
            Err(RewriteError::Malformed { .. })
        ));
        assert!(matches!(
            inject_source("not go", &target("Add", "")),
            Err(RewriteError::Syntax(_))
        ));
    }

    #[test]
    fn unrelated_declarations_are_byte_identical() {
        let src = "package calc

// Doc comment   with odd   spacing.
import \"strings\"

var table = map[string]int{\"a\":1,   \"b\":2}

func Before(s string) string { return strings.ToUpper(s) }

func Target(n int) int {
	total := 0
	for i := 0; i < n; i++ { total += i }
	return total
}

func After() {   }
";
        let out = inject_source(src, &target("Target", "")).unwrap();
        let restored = out
            .source
            .replace(&TimeImport::declaration(), "")
            .replace("\n\t_regbenchStart := time.Now()", "")
            .replace(&format!("\n\t{DEFER}"), "");
        assert_eq!(restored, src);
    }

    #[test]
    fn injector_round_trip_restores_bytes() {
        let dir = TempDir::new().unwrap();
        let pkg = dir.path().join("calc");
        std::fs::create_dir_all(&pkg).unwrap();
        let path = pkg.join("calc.go");
        let original = "package calc\n\nfunc Add(a, b int) int {\n\treturn a + b\n}\n";
        std::fs::write(&path, original).unwrap();

        let mut injector = Injector::new(dir.path(), SnapshotReverter::new());
        let outcome = injector.inject(&target("Add", "")).unwrap();
        assert_eq!(outcome, InjectOutcome::Injected { line: 3 });
        let injected = std::fs::read_to_string(&path).unwrap();
        assert!(injected.contains("_regbenchStart"));

        injector.reset().unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), original);
    }

    #[test]
    fn injector_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let mut injector = Injector::new(dir.path(), SnapshotReverter::new());
        assert!(matches!(
            injector.inject(&target("Add", "")),
            Err(InjectError::Io { .. })
        ));
    }
}
