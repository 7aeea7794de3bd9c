//! Error types for sqlbridge.
//!
//! Every fallible operation returns [`DbResult`]. Variants map onto a small,
//! closed set of categories ([`ErrorKind`]) so callers can tell a missing
//! connection from a failed statement without matching on message text.

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Connection not found: {connection_id}")]
    ConnectionNotFound { connection_id: String },

    #[error("Unsupported dialect: {engine}")]
    UnsupportedDialect { engine: String },

    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Database error: {message}")]
    Database {
        message: String,
        /// SQLSTATE for sqlx drivers, server error number for SQL Server
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error(
        "Schema change stopped after {} applied statement(s): {message} (statement: {failed_statement})",
        .applied.len()
    )]
    PartialSchemaMutation {
        applied: Vec<String>,
        failed_statement: String,
        message: String,
    },

    #[error("Schema error: {message} (object: {object})")]
    Schema { message: String, object: String },

    #[error("Timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout {
        operation: String,
        elapsed_secs: u64,
    },

    #[error("Invalid node id '{node_id}': {reason}")]
    InvalidNodeId { node_id: String, reason: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Coarse error category exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    UnsupportedDialect,
    ConnectionFailure,
    QueryFailure,
    PartialSchemaMutationFailure,
    Timeout,
    InvalidInput,
    Internal,
}

impl DbError {
    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a database error with optional SQL state.
    pub fn database(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Database {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    pub fn schema(message: impl Into<String>, object: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
            object: object.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, elapsed_secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    pub fn connection_not_found(connection_id: impl Into<String>) -> Self {
        Self::ConnectionNotFound {
            connection_id: connection_id.into(),
        }
    }

    pub fn unsupported_dialect(engine: impl Into<String>) -> Self {
        Self::UnsupportedDialect {
            engine: engine.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn invalid_node_id(node_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidNodeId {
            node_id: node_id.into(),
            reason: reason.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ConnectionNotFound { .. } => ErrorKind::NotFound,
            Self::UnsupportedDialect { .. } => ErrorKind::UnsupportedDialect,
            Self::Connection { .. } => ErrorKind::ConnectionFailure,
            Self::Database { .. } | Self::Schema { .. } => ErrorKind::QueryFailure,
            Self::PartialSchemaMutation { .. } => ErrorKind::PartialSchemaMutationFailure,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::InvalidNodeId { .. } | Self::InvalidInput { .. } => ErrorKind::InvalidInput,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Database { suggestion, .. } => Some(suggestion),
            Self::PartialSchemaMutation { .. } => {
                Some("Earlier statements were not rolled back; inspect the table before retrying")
            }
            _ => None,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout { .. })
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::connection(
                msg.to_string(),
                "Check the host, port and credentials of the connection",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DbError::database(
                    db_err.message(),
                    code,
                    "Check the SQL syntax and referenced objects",
                )
            }
            sqlx::Error::RowNotFound => DbError::database(
                "No rows returned",
                None,
                "Verify the query conditions match existing data",
            ),
            sqlx::Error::PoolTimedOut => DbError::timeout("connection pool acquire", 30),
            sqlx::Error::PoolClosed => DbError::connection(
                "Connection pool is closed",
                "The connection was updated or removed; retry the operation",
            ),
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
            sqlx::Error::ColumnNotFound(col) => {
                DbError::schema(format!("Column not found: {}", col), col)
            }
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::internal(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => DbError::internal("Database worker crashed"),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

impl From<tiberius::error::Error> for DbError {
    fn from(err: tiberius::error::Error) -> Self {
        use tiberius::error::Error as TdsError;

        match err {
            TdsError::Server(token) => DbError::database(
                token.message(),
                Some(token.code().to_string()),
                "Check the SQL syntax and referenced objects",
            ),
            TdsError::Io { kind, message } => DbError::connection(
                format!("I/O error ({:?}): {}", kind, message),
                "Check network connectivity and database server status",
            ),
            TdsError::Tls(msg) => DbError::connection(
                format!("TLS error: {}", msg),
                "Set trust_cert=true for self-signed certificates or disable encryption",
            ),
            TdsError::Routing { host, port } => DbError::connection(
                format!("Server requested a redirect to {}:{}", host, port),
                "Connect to the redirected host directly",
            ),
            TdsError::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            TdsError::Conversion(msg) => {
                DbError::internal(format!("Failed to convert value: {}", msg))
            }
            other => DbError::database(
                other.to_string(),
                None,
                "Check the SQL syntax and referenced objects",
            ),
        }
    }
}

impl From<bb8_tiberius::Error> for DbError {
    fn from(err: bb8_tiberius::Error) -> Self {
        match err {
            bb8_tiberius::Error::Tiberius(e) => e.into(),
            other => DbError::connection(
                other.to_string(),
                "Check network connectivity and database server status",
            ),
        }
    }
}

impl From<bb8::RunError<bb8_tiberius::Error>> for DbError {
    fn from(err: bb8::RunError<bb8_tiberius::Error>) -> Self {
        match err {
            bb8::RunError::User(e) => e.into(),
            bb8::RunError::TimedOut => DbError::timeout("connection pool acquire", 30),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DbError::connection("Failed to connect", "Check credentials");
        assert!(err.to_string().contains("Connection failed"));
    }

    #[test]
    fn test_error_suggestion() {
        let err = DbError::database(
            "Syntax error",
            Some("42601".to_string()),
            "Check SQL syntax",
        );
        assert_eq!(err.suggestion(), Some("Check SQL syntax"));
    }

    #[test]
    fn test_error_retryable() {
        assert!(DbError::timeout("query", 30).is_retryable());
        assert!(DbError::connection("err", "sugg").is_retryable());
        assert!(!DbError::invalid_input("bad").is_retryable());
        assert!(!DbError::connection_not_found("c1").is_retryable());
    }

    #[test]
    fn test_kind_covers_taxonomy() {
        assert_eq!(
            DbError::connection_not_found("c1").kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            DbError::unsupported_dialect("oracle").kind(),
            ErrorKind::UnsupportedDialect
        );
        assert_eq!(
            DbError::connection("refused", "retry").kind(),
            ErrorKind::ConnectionFailure
        );
        assert_eq!(
            DbError::database("syntax", None, "fix").kind(),
            ErrorKind::QueryFailure
        );
        assert_eq!(
            DbError::invalid_node_id("x", "empty").kind(),
            ErrorKind::InvalidInput
        );
    }

    #[test]
    fn test_partial_mutation_message_counts_applied() {
        let err = DbError::PartialSchemaMutation {
            applied: vec!["ALTER TABLE a".into(), "ALTER TABLE b".into()],
            failed_statement: "ALTER TABLE c".into(),
            message: "column exists".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("2 applied"));
        assert!(msg.contains("ALTER TABLE c"));
        assert_eq!(err.kind(), ErrorKind::PartialSchemaMutationFailure);
        assert!(err.suggestion().is_some());
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::PartialSchemaMutationFailure).unwrap();
        assert_eq!(json, "\"partial_schema_mutation_failure\"");
    }
}
