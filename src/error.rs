//! Error types for squill.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Ill-formed expression string (empty input, malformed function call,
    /// or an inner argument that failed to parse).
    #[error("Expression syntax error in '{origin}': {message}")]
    ExpressionSyntax { origin: String, message: String },

    /// A DSL node could not be normalized from its JSON shape.
    #[error("Parse error at {path}: {message}")]
    Parse { path: String, message: String },

    /// The query failed structural validation.
    #[error("Query validation failed: {} error(s)", .0.len())]
    Invalid(Vec<crate::dsl::ValidationError>),

    /// The query could not be compiled to SQL.
    #[error("Compile error: {0}")]
    Compile(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Execution error: {0}")]
    Execution(String),

    /// A JSON column value could not be unmarshalled into a record.
    #[error("Data format error on column '{column}': {message}")]
    DataFormat { column: String, message: String },

    /// An engine name that was never registered.
    #[error("Engine '{0}' not found")]
    EngineNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create an expression syntax error for the given source string.
    pub fn expression(origin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExpressionSyntax {
            origin: origin.into(),
            message: message.into(),
        }
    }

    /// Create a parse error at the given DSL path.
    pub fn parse(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type alias for squill operations.
pub type Result<T> = std::result::Result<T, Error>;
