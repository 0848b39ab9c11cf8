//! Error types for the projection store

use thiserror::Error;

/// Result type alias for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors raised by the projection store and its migrations
#[derive(Error, Debug)]
pub enum StoreError {
    /// Underlying database errors that are not constraint violations
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Unique, foreign-key, not-null or check constraint violated on insert
    #[error("Constraint violation on {table}: {message}")]
    Constraint { table: String, message: String },

    /// Stored projection schema is newer than this library, or in an inconsistent state
    #[error("Schema version mismatch (stored {stored}, supported {supported}): {detail}")]
    SchemaVersionMismatch { stored: i32, supported: i32, detail: String },

    /// The nfldb schema underneath is not the version this library was written against
    #[error("nfldb schema version {found} is not supported (expected {expected})")]
    UpstreamVersionMismatch { expected: i32, found: i32 },

    /// A value could not be converted to the type of its destination column
    #[error("Invalid value for {column}: {message}")]
    InvalidValue { column: String, message: String },

    /// Operation not allowed in the current transaction state
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

impl StoreError {
    /// Create a new constraint violation error
    pub fn constraint(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Constraint { table: table.into(), message: message.into() }
    }

    /// Create a new invalid value error
    pub fn invalid_value(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue { column: column.into(), message: message.into() }
    }

    /// Create a new invalid operation error
    pub fn invalid_operation(msg: impl Into<String>) -> Self {
        Self::InvalidOperation(msg.into())
    }

    /// Whether this error is a constraint violation reported by the storage layer
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, Self::Constraint { .. })
    }

    /// Translate a sqlx error raised while writing `table`.
    ///
    /// Constraint violations become [`StoreError::Constraint`]; everything else is
    /// passed through untouched.
    pub fn from_write(table: &str, err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            use sqlx::error::ErrorKind;
            match db_err.kind() {
                ErrorKind::UniqueViolation
                | ErrorKind::ForeignKeyViolation
                | ErrorKind::NotNullViolation
                | ErrorKind::CheckViolation => {
                    return Self::constraint(table, db_err.message());
                }
                _ => {}
            }
        }
        Self::Database(err)
    }
}
