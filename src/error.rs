//! Error types for the ERP query agent.
//!
//! This module defines all error types using `thiserror` for ergonomic error handling.
//! Variants follow the pipeline stages: tunnel setup, safety gate, execution and
//! schema lookup. Each carries enough context for an operator-readable message.

use thiserror::Error;

/// SQLSTATE raised by PostgreSQL when `statement_timeout` cancels a statement.
pub const SQLSTATE_QUERY_CANCELED: &str = "57014";

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("SSH authentication failed: {message}")]
    Authentication { message: String },

    #[error("Connection failed: {message}")]
    Connectivity { message: String, suggestion: String },

    #[error("Query contains forbidden operation: {keyword}")]
    ForbiddenOperation { keyword: String },

    #[error("Only SELECT queries are allowed")]
    NotReadOnly,

    #[error("Timeout: query exceeded {timeout_secs}s timeout")]
    Timeout { timeout_secs: u64, sql: String },

    #[error("Query execution failed: {message}")]
    Execution {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
        sql: String,
    },

    #[error("Schema has not been discovered yet")]
    SchemaNotDiscovered,

    #[error("SQL generation failed: {message}")]
    Generation { message: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl AgentError {
    /// Create an authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    /// Create a connectivity error with a helpful suggestion.
    pub fn connectivity(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connectivity {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a forbidden operation error for the matched keyword.
    pub fn forbidden(keyword: impl Into<String>) -> Self {
        Self::ForbiddenOperation {
            keyword: keyword.into(),
        }
    }

    /// Create a timeout error for the given statement.
    pub fn timeout(timeout_secs: u64, sql: impl Into<String>) -> Self {
        Self::Timeout {
            timeout_secs,
            sql: sql.into(),
        }
    }

    /// Create an execution error with optional SQL state.
    pub fn execution(
        message: impl Into<String>,
        sql_state: Option<String>,
        sql: impl Into<String>,
    ) -> Self {
        Self::Execution {
            message: message.into(),
            sql_state,
            sql: sql.into(),
        }
    }

    /// Create a generation error.
    pub fn generation(message: impl Into<String>) -> Self {
        Self::Generation {
            message: message.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Classify a sqlx error raised while running `sql`.
    ///
    /// A server-side statement cancellation becomes [`AgentError::Timeout`];
    /// everything else is an [`AgentError::Execution`] carrying the SQL text.
    pub fn from_statement(err: sqlx::Error, sql: &str, timeout_secs: u64) -> Self {
        match err {
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                if code.as_deref() == Some(SQLSTATE_QUERY_CANCELED) {
                    Self::timeout(timeout_secs, sql)
                } else {
                    Self::execution(db_err.message(), code, sql)
                }
            }
            other => Self::execution(other.to_string(), None, sql),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Authentication { .. } => {
                Some("Check the SSH username and that the key is an unencrypted Ed25519 or RSA key")
            }
            Self::Connectivity { suggestion, .. } => Some(suggestion),
            Self::Timeout { .. } => Some("Narrow the question or raise --query-timeout"),
            Self::SchemaNotDiscovered => Some("Run schema discovery before requesting context"),
            _ => None,
        }
    }

    /// The SQL text that triggered this error, for execution-stage failures.
    pub fn sql(&self) -> Option<&str> {
        match self {
            Self::Timeout { sql, .. } | Self::Execution { sql, .. } if !sql.is_empty() => {
                Some(sql.as_str())
            }
            _ => None,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connectivity { .. })
    }
}

/// Convert sqlx errors raised outside statement execution (connect, close).
impl From<sqlx::Error> for AgentError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => AgentError::invalid_input(format!(
                "Invalid database configuration: {}",
                msg
            )),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                AgentError::execution(db_err.message(), code, "")
            }
            sqlx::Error::PoolTimedOut => AgentError::connectivity(
                "Timed out waiting for a database connection",
                "Check that the tunnel is running",
            ),
            sqlx::Error::Io(io_err) => AgentError::connectivity(
                format!("I/O error: {}", io_err),
                "Check that the tunnel is running and the remote database is up",
            ),
            sqlx::Error::Tls(tls_err) => AgentError::connectivity(
                format!("TLS error: {}", tls_err),
                "The tunnel already encrypts traffic; disable TLS for the local hop",
            ),
            sqlx::Error::Protocol(msg) => AgentError::connectivity(
                format!("Protocol error: {}", msg),
                "Check that the remote port is a PostgreSQL server",
            ),
            sqlx::Error::ColumnDecode { index, source } => {
                AgentError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => AgentError::internal(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => AgentError::internal("Database worker crashed"),
            _ => AgentError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Convert SSH transport errors raised while the tunnel is being set up.
impl From<russh::Error> for AgentError {
    fn from(err: russh::Error) -> Self {
        AgentError::connectivity(
            format!("SSH transport error: {}", err),
            "Check the SSH host, port and network reachability",
        )
    }
}

/// Result type alias for agent operations.
pub type AgentResult<T> = Result<T, AgentError>;
