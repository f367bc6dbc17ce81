//! Error types for the persistence engine.

use thiserror::Error;

use crate::connection::DriverError;

/// Persistence errors.
#[derive(Debug, Error)]
pub enum SqlobError {
    /// No type mapping exists for a value kind, SQL type name or type code.
    ///
    /// This is a configuration error: the dialect in use does not cover a
    /// type that a mapped record needs.
    #[error("unsupported type: {0}")]
    UnsupportedType(String),

    /// No registered column factory accepts a persistable field.
    #[error("no column factory accepts field '{field}' of {type_name}")]
    NoApplicableColumnFactory {
        /// The mapped type owning the field.
        type_name: String,
        /// The field name.
        field: String,
    },

    /// A field could not be read or written on an instance.
    #[error("field '{field}' of {type_name} is inaccessible: {reason}")]
    InaccessibleField {
        /// The mapped type owning the field.
        type_name: String,
        /// The field name.
        field: String,
        /// Why access failed.
        reason: String,
    },

    /// A request was built without any records.
    #[error("no records supplied")]
    EmptyRecordSet,

    /// The connection or driver failed while preparing or executing a statement.
    #[error("database error executing `{statement}`: {source}")]
    Database {
        /// The statement being prepared or executed.
        statement: String,
        /// The driver failure.
        #[source]
        source: DriverError,
    },

    /// An operation was attempted on a closed execution context.
    #[error("execution context is closed")]
    ClosedResource,

    /// A stored value could not be converted to the field's type.
    #[error("cannot convert {found} to {expected}")]
    Conversion {
        /// The expected Rust type.
        expected: &'static str,
        /// Description of the value found.
        found: String,
    },

    /// A request named a column the mapped type does not have.
    #[error("unknown column '{column}' for table {table}")]
    UnknownColumn {
        /// The table name.
        table: String,
        /// The unknown column.
        column: String,
    },

    /// A dialect configuration could not be parsed.
    #[error("invalid configuration: {0}")]
    Configuration(#[from] serde_json::Error),
}

impl SqlobError {
    pub(crate) fn database(statement: &str, source: DriverError) -> Self {
        Self::Database {
            statement: statement.to_string(),
            source,
        }
    }
}

/// Result type alias for persistence operations.
pub type Result<T> = std::result::Result<T, SqlobError>;
