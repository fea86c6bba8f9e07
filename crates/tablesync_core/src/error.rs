//! Error types for the tablesync data model.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised while working with records and schemas.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The named table does not exist in the schema.
    #[error("unknown table: {table}")]
    UnknownTable {
        /// Table name that was looked up.
        table: String,
    },

    /// The named column does not exist on the table.
    #[error("unknown column: {table}.{column}")]
    UnknownColumn {
        /// Table the column was looked up on.
        table: String,
        /// Column name that was looked up.
        column: String,
    },

    /// A record is missing part of its primary key.
    #[error("record for table {table} is missing primary key column {column}")]
    MissingPrimaryKey {
        /// Table the record belongs to.
        table: String,
        /// Primary key column that was absent.
        column: String,
    },

    /// A record or change entry is structurally invalid.
    #[error("invalid record: {message}")]
    InvalidRecord {
        /// Description of the problem.
        message: String,
    },
}

impl CoreError {
    /// Creates an unknown-table error.
    pub fn unknown_table(table: impl Into<String>) -> Self {
        Self::UnknownTable {
            table: table.into(),
        }
    }

    /// Creates an unknown-column error.
    pub fn unknown_column(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::UnknownColumn {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Creates a missing-primary-key error.
    pub fn missing_pk(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::MissingPrimaryKey {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Creates an invalid-record error.
    pub fn invalid_record(message: impl Into<String>) -> Self {
        Self::InvalidRecord {
            message: message.into(),
        }
    }
}
