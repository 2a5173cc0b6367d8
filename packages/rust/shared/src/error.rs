//! Error types for DocFrame.
//!
//! Library crates use [`DocFrameError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all DocFrame operations.
#[derive(Debug, thiserror::Error)]
pub enum DocFrameError {
    /// An index label, column, selector or subindex that does not exist.
    #[error("invalid reference: {message}")]
    InvalidReference { message: String },

    /// Attempted write to a column whose partition does not accept writes.
    #[error("column '{column}' is {kind} and cannot be written")]
    Immutable { column: String, kind: String },

    /// A partition invariant does not hold (non-uniform parameters, a column
    /// claimed by two kinds, ...).
    #[error("consistency violation: {message}")]
    Consistency { message: String },

    /// A structural request that cannot be resolved unambiguously.
    #[error("ambiguous request: {message}")]
    AmbiguousRequest { message: String },

    /// Two explicit identifier mappings collide.
    #[error("mapping conflict: {message}")]
    MappingConflict { message: String },

    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// JSON/TOML decoding or template parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Compute step failure (template rendering, missing target, ...).
    #[error("compute error: {0}")]
    Compute(String),

    /// Failure inside the columnar engine backing set-based operations.
    #[error("table engine error: {0}")]
    Engine(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, DocFrameError>;

impl DocFrameError {
    /// Create an invalid-reference error from any displayable message.
    pub fn invalid_reference(msg: impl Into<String>) -> Self {
        Self::InvalidReference {
            message: msg.into(),
        }
    }

    /// Create an immutability error for `column` held by a partition of `kind`.
    pub fn immutable(column: impl Into<String>, kind: impl std::fmt::Display) -> Self {
        Self::Immutable {
            column: column.into(),
            kind: kind.to_string(),
        }
    }

    /// Create a consistency error from any displayable message.
    pub fn consistency(msg: impl Into<String>) -> Self {
        Self::Consistency {
            message: msg.into(),
        }
    }

    /// Create an ambiguous-request error from any displayable message.
    pub fn ambiguous(msg: impl Into<String>) -> Self {
        Self::AmbiguousRequest {
            message: msg.into(),
        }
    }

    /// Create a mapping-conflict error from any displayable message.
    pub fn mapping_conflict(msg: impl Into<String>) -> Self {
        Self::MappingConflict {
            message: msg.into(),
        }
    }

    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a compute error from any displayable message.
    pub fn compute(msg: impl Into<String>) -> Self {
        Self::Compute(msg.into())
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<polars::error::PolarsError> for DocFrameError {
    fn from(err: polars::error::PolarsError) -> Self {
        Self::Engine(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = DocFrameError::immutable("A", "input");
        assert_eq!(err.to_string(), "column 'A' is input and cannot be written");

        let err = DocFrameError::consistency("parameters column 'E' is not uniform");
        assert!(err.to_string().starts_with("consistency violation"));
        assert!(err.to_string().contains("'E'"));
    }
}
