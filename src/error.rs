//! Error types for the data-access layer.
//!
//! Every failure is returned to the immediate caller. Nothing here retries
//! or swallows errors; `is_retryable` only classifies them so the
//! surrounding application can pick a policy.

use std::time::Duration;
use thiserror::Error;

/// Longest statement text kept in error context.
const MAX_STATEMENT_CONTEXT: usize = 120;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Binding error for parameter '{parameter}': {message}")]
    Binding { parameter: String, message: String },

    #[error("Execution of '{statement}' failed: {message}")]
    Execution {
        statement: String,
        message: String,
        /// e.g., "23505" for unique violation
        sql_state: Option<String>,
        constraint: Option<String>,
    },

    #[error("Cardinality error in '{statement}': expected {expected} row(s), got {actual}")]
    Cardinality {
        statement: String,
        expected: usize,
        actual: String,
    },

    #[error("Mapping error for field '{field}' (column '{column}'): {message}")]
    Mapping {
        field: String,
        column: String,
        message: String,
    },

    #[error("Bulk copy into '{table}' failed: {message}")]
    BulkCopy { table: String, message: String },

    #[error("Timeout: {operation} exceeded {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("Cancelled: {operation}")]
    Cancelled { operation: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a binding error for a named parameter.
    pub fn binding(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Binding {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Create an execution error without server details.
    pub fn execution(statement: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Execution {
            statement: statement.into(),
            message: message.into(),
            sql_state: None,
            constraint: None,
        }
    }

    pub fn cardinality(
        statement: impl Into<String>,
        expected: usize,
        actual: impl Into<String>,
    ) -> Self {
        Self::Cardinality {
            statement: statement.into(),
            expected,
            actual: actual.into(),
        }
    }

    /// Create a mapping error naming the offending field and column.
    pub fn mapping(
        field: impl Into<String>,
        column: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Mapping {
            field: field.into(),
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a whole-batch bulk copy error.
    pub fn bulk_copy(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BulkCopy {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a timeout error for a deadline `timeout` long.
    pub fn timeout(operation: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Attach statement identity to execution and cardinality errors.
    ///
    /// Errors converted from `sqlx::Error` do not know which statement
    /// produced them; call sites fill it in here.
    pub fn with_statement(self, statement: &str) -> Self {
        match self {
            Self::Execution {
                message,
                sql_state,
                constraint,
                ..
            } => Self::Execution {
                statement: statement_context(statement),
                message,
                sql_state,
                constraint,
            },
            Self::Cardinality {
                expected, actual, ..
            } => Self::Cardinality {
                statement: statement_context(statement),
                expected,
                actual,
            },
            other => other,
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Binding { .. } => Some("Add the missing entry to the named parameter set"),
            Self::Cardinality { .. } => {
                Some("Check that the query matches exactly one row or use a multi-row call")
            }
            _ => None,
        }
    }

    /// SQLSTATE reported by the server, if any.
    pub fn sql_state(&self) -> Option<&str> {
        match self {
            Self::Execution { sql_state, .. } => sql_state.as_deref(),
            _ => None,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::Timeout { .. } | Self::Cancelled { .. }
        )
    }

    /// Configuration errors are fatal for the process that hit them.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }
}

/// Shorten a statement for error context.
pub(crate) fn statement_context(statement: &str) -> String {
    let compact = statement.split_whitespace().collect::<Vec<_>>().join(" ");
    if compact.chars().count() <= MAX_STATEMENT_CONTEXT {
        return compact;
    }
    let truncated: String = compact.chars().take(MAX_STATEMENT_CONTEXT).collect();
    format!("{}...", truncated)
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::configuration(msg.to_string()),
            sqlx::Error::Database(db_err) => DbError::Execution {
                statement: String::new(),
                message: db_err.message().to_string(),
                sql_state: db_err.code().map(|c| c.to_string()),
                constraint: db_err.constraint().map(String::from),
            },
            sqlx::Error::RowNotFound => DbError::cardinality("", 1, "0"),
            sqlx::Error::PoolTimedOut => DbError::connection(
                "Timed out acquiring a connection from the pool",
                "Increase acquire_timeout or max_connections, or check server load",
            ),
            sqlx::Error::PoolClosed => {
                DbError::connection("Connection pool is closed", "Reopen the database")
            }
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::TypeNotFound { type_name } => {
                DbError::mapping("", type_name.clone(), format!("Type not found: {}", type_name))
            }
            sqlx::Error::ColumnNotFound(col) => {
                DbError::mapping("", col.clone(), "Column not found in result set")
            }
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => DbError::internal(format!(
                "Column index {} out of bounds (len: {})",
                index, len
            )),
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::mapping("", index, format!("Failed to decode: {}", source))
            }
            sqlx::Error::Decode(source) => DbError::internal(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => DbError::internal("Database worker crashed"),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;
