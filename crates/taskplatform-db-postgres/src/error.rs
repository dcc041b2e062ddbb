//! Error types for the PostgreSQL storage backend.

use sqlx_core::error::{Error as SqlxError, ErrorKind};
use taskplatform_storage::StorageError;

/// PostgreSQL error code for a value too long for its column (22001).
pub const PG_STRING_DATA_RIGHT_TRUNCATION: &str = "22001";

/// PostgreSQL error class for connection exceptions (08xxx).
pub const PG_CONNECTION_EXCEPTION_CLASS: &str = "08";

/// PostgreSQL error code for an administrator-initiated shutdown (57P01).
pub const PG_ADMIN_SHUTDOWN: &str = "57P01";

/// Checks if a sqlx error has a specific PostgreSQL error code.
pub fn has_pg_error_code(err: &SqlxError, code: &str) -> bool {
    if let SqlxError::Database(db_err) = err {
        db_err.code().as_deref() == Some(code)
    } else {
        false
    }
}

/// Returns `true` when the error means the database could not be reached,
/// as opposed to the database rejecting a statement.
pub fn is_connection_error(err: &SqlxError) -> bool {
    match err {
        SqlxError::Io(_)
        | SqlxError::Tls(_)
        | SqlxError::Protocol(_)
        | SqlxError::PoolTimedOut
        | SqlxError::PoolClosed
        | SqlxError::WorkerCrashed => true,
        SqlxError::Database(db_err) => db_err.code().is_some_and(|code| {
            code.starts_with(PG_CONNECTION_EXCEPTION_CLASS) || code == PG_ADMIN_SHUTDOWN
        }),
        _ => false,
    }
}

/// Converts a sqlx error raised while running `operation` into a storage error.
///
/// Connection failures become `Unavailable`, constraint violations become
/// `Validation`, and everything else is `Internal`.
pub fn map_sqlx_error(operation: &str, err: SqlxError) -> StorageError {
    if is_connection_error(&err) {
        return StorageError::unavailable(format!("{operation}: {err}"));
    }

    if let SqlxError::Database(db_err) = &err
        && matches!(db_err.kind(), ErrorKind::CheckViolation | ErrorKind::NotNullViolation)
    {
        return StorageError::validation(db_err.message().to_string());
    }
    if has_pg_error_code(&err, PG_STRING_DATA_RIGHT_TRUNCATION) {
        return StorageError::validation("Value too long");
    }

    StorageError::internal(format!("{operation}: {err}"))
}

/// Errors specific to the PostgreSQL storage backend.
#[derive(Debug, thiserror::Error)]
pub enum PostgresError {
    /// Database connection error.
    #[error("Database connection error: {0}")]
    Connection(#[from] sqlx_core::error::Error),

    /// Migration error (generic string for compatibility with different migration tools).
    #[error("Migration error: {0}")]
    Migration(String),

    /// Pool settings that cannot be honoured.
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl PostgresError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

impl From<PostgresError> for StorageError {
    fn from(err: PostgresError) -> Self {
        match err {
            PostgresError::Connection(e) => map_sqlx_error("connect", e),
            PostgresError::Migration(e) => StorageError::internal(format!("Migration error: {e}")),
            PostgresError::Config { message } => {
                StorageError::internal(format!("Configuration error: {message}"))
            }
        }
    }
}

/// Result type alias for PostgreSQL operations.
pub type Result<T> = std::result::Result<T, PostgresError>;
