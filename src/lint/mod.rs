//! Source-position-aware linting for the query DSL.
//!
//! The linter wraps parse + validate and attaches a source position to
//! every problem, which is what editor integrations need. It never stops
//! at the first error.

mod locate;
mod schema;

pub use locate::LineIndex;
pub use schema::{validate_schema, QUERY_SCHEMA};

use crate::dsl::{ErrorCode, Query};
use crate::error::Error;
use serde_json::Value;
use std::fmt;

/// A source span. Lines and columns are 1-based, offsets 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub line: u32,
    pub column: u32,
    pub offset: usize,
    pub end_line: u32,
    pub end_column: u32,
    pub end_offset: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Info,
    Hint,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
            Severity::Hint => "hint",
        })
    }
}

/// One linter finding.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub position: Position,
    pub severity: Severity,
    pub code: String,
    pub path: String,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    // line:col-endcol:path: severity: message
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}-{}:{}: {}: {}",
            self.position.line,
            self.position.column,
            self.position.end_column,
            self.path,
            self.severity,
            self.message
        )
    }
}

/// The result of linting one source document.
#[derive(Debug, Clone)]
pub struct LintResult {
    pub source: String,
    pub diagnostics: Vec<Diagnostic>,
}

impl LintResult {
    pub fn valid(&self) -> bool {
        !self.has_errors()
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// All diagnostics, one per line, in source order.
    pub fn format(&self) -> String {
        self.diagnostics
            .iter()
            .map(Diagnostic::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Lint a DSL document.
pub fn lint(source: &str) -> LintResult {
    parse(source).1
}

/// Parse a DSL document, collecting every diagnostic. The query is
/// returned whenever the source was structurally readable, even if
/// validation found errors.
pub fn parse(source: &str) -> (Option<Query>, LintResult) {
    let index = LineIndex::new(source);
    let mut diagnostics = Vec::new();

    let value: Value = match serde_json::from_str(source) {
        Ok(value) => value,
        Err(err) => {
            // serde_json reports 1-based line/column already.
            let (line, column) = (err.line().max(1) as u32, err.column().max(1) as u32);
            diagnostics.push(Diagnostic {
                position: Position {
                    line,
                    column,
                    end_line: line,
                    end_column: column,
                    ..Position::default()
                },
                severity: Severity::Error,
                code: ErrorCode::JsonSyntax.as_str().to_string(),
                path: String::new(),
                message: err.to_string(),
            });
            return (None, LintResult { source: source.to_string(), diagnostics });
        }
    };

    let query = match Query::from_value(&value, "") {
        Ok(query) => query,
        Err(err) => {
            let (path, message) = match err {
                Error::Parse { path, message } => (path, message),
                other => (String::new(), other.to_string()),
            };
            diagnostics.push(diagnostic(
                source,
                &index,
                ErrorCode::ParseException.as_str(),
                &path,
                message,
            ));
            return (None, LintResult { source: source.to_string(), diagnostics });
        }
    };

    for err in query.validate() {
        diagnostics.push(diagnostic(
            source,
            &index,
            err.code.as_str(),
            &err.path,
            err.message,
        ));
    }

    (
        Some(query),
        LintResult {
            source: source.to_string(),
            diagnostics,
        },
    )
}

/// Parse a document that is expected to be valid.
///
/// # Panics
///
/// Panics with the formatted diagnostics when the source has any error.
/// Intended for fixtures and tooling; use [`parse`] everywhere else.
pub fn must_parse(source: &str) -> Query {
    let (query, result) = parse(source);
    match query {
        Some(query) if !result.has_errors() => query,
        _ => panic!("invalid query source:\n{}", result.format()),
    }
}

fn diagnostic(
    source: &str,
    index: &LineIndex,
    code: &str,
    path: &str,
    message: String,
) -> Diagnostic {
    // For a missing key the path has no anchor in the text; point at the
    // enclosing node instead, then fall back to the document start.
    let span = locate::locate(source, path).or_else(|| {
        let (parent, _) = path.rsplit_once('.')?;
        locate::locate(source, parent)
    });
    let position = match span {
        Some((start, end)) => {
            let (line, column) = index.position(start);
            let (end_line, end_column) = index.position(end);
            Position {
                line,
                column,
                offset: start,
                end_line,
                end_column,
                end_offset: end,
            }
        }
        None => Position {
            line: 1,
            column: 1,
            end_line: 1,
            end_column: 1,
            ..Position::default()
        },
    };

    Diagnostic {
        position,
        severity: Severity::Error,
        code: code.to_string(),
        path: path.to_string(),
        message,
    }
}
