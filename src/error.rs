//! Error types for the pool, executor, and script runner.
//!
//! All failures surface as [`Error`] variants so callers can branch on the
//! error kind instead of parsing driver messages. Raw `sqlx` errors only
//! appear as `source` causes.

use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The pool is at capacity and no connection became available before the
    /// acquire timeout elapsed.
    #[error("connection pool exhausted: no connection available within {waited_ms}ms")]
    PoolExhausted { waited_ms: u64 },

    /// A fresh connection could not be established within the bounded number
    /// of attempts.
    #[error("could not establish a connection after {attempts} attempt(s)")]
    ConnectionUnavailable {
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    /// A single connection attempt failed.
    #[error("connection attempt failed")]
    Connect {
        #[source]
        source: sqlx::Error,
    },

    /// An operation was attempted after pool teardown began.
    #[error("connection pool is closed")]
    PoolClosed,

    /// A SQL script could not be tokenized (unterminated quote or block
    /// comment, bad DELIMITER directive).
    #[error("malformed SQL script at line {line}: {message}")]
    MalformedScript { line: usize, message: String },

    /// The server rejected a statement.
    #[error("statement execution failed: {statement}")]
    Statement {
        statement: String,
        #[source]
        source: sqlx::Error,
    },

    /// A statement inside a script file failed. `statement_index` is 0-based
    /// and counts emitted statements, not source lines.
    #[error("script {} failed at statement {statement_index}", file.display())]
    Script {
        file: PathBuf,
        statement_index: usize,
        #[source]
        source: Box<Error>,
    },

    /// An operation exceeded its time budget.
    #[error("timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout { operation: String, elapsed_secs: u64 },

    /// A script file could not be read.
    #[error("failed to read script file {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid pool configuration.
    #[error("invalid configuration: {0}")]
    Configuration(String),
}

impl Error {
    /// Create a malformed-script error with its source line number.
    pub fn malformed_script(line: usize, message: impl Into<String>) -> Self {
        Self::MalformedScript {
            line,
            message: message.into(),
        }
    }

    /// Create a statement-failure error. The statement text is truncated so
    /// huge scripts do not bloat error messages.
    pub fn statement(statement: &str, source: sqlx::Error) -> Self {
        Self::Statement {
            statement: truncate(statement, 200),
            source,
        }
    }

    /// Create a script-failure error wrapping the failing statement's error.
    pub fn script(file: impl AsRef<Path>, statement_index: usize, source: Error) -> Self {
        Self::Script {
            file: file.as_ref().to_path_buf(),
            statement_index,
            source: Box::new(source),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, elapsed_secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    /// Create an I/O error for a script file.
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Check if retrying the operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::PoolExhausted { .. }
                | Self::ConnectionUnavailable { .. }
                | Self::Connect { .. }
                | Self::Timeout { .. }
        )
    }
}

/// Result type alias for pool operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Truncate a statement for inclusion in error messages, on a char boundary.
pub(crate) fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max).collect();
    format!("{cut}...")
}
