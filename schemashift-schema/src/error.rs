//! Error types for schema construction and validation.

// These warnings are false positives - the fields are used by derive macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// Result type for schema operations.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Errors that can occur while building or validating a schema model.
#[derive(Error, Debug, Diagnostic)]
pub enum SchemaError {
    /// The same schema name was declared more than once.
    #[error("schema `{name}` is declared more than once")]
    #[diagnostic(
        code(schemashift::schema::duplicate_schema_name),
        help("every declared schema needs a unique name")
    )]
    DuplicateSchemaName { name: String },

    /// A table was added twice to the same schema.
    #[error("table `{schema}.{table}` is declared more than once")]
    #[diagnostic(code(schemashift::schema::duplicate_table))]
    DuplicateTable { schema: String, table: String },

    /// A constraint or index refers to a column the table does not have.
    #[error("`{object}` on table `{table}` references unknown column `{column}`")]
    #[diagnostic(code(schemashift::schema::unknown_column))]
    UnknownColumn {
        table: String,
        object: String,
        column: String,
    },

    /// Snapshot (de)serialization failed.
    #[error("invalid schema snapshot: {0}")]
    #[diagnostic(code(schemashift::schema::snapshot))]
    Snapshot(#[from] serde_json::Error),

    /// Reading or writing a snapshot failed.
    #[error("failed to access snapshot `{path}`")]
    #[diagnostic(code(schemashift::schema::io_error))]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl SchemaError {
    /// Create a duplicate schema name error.
    pub fn duplicate_schema_name(name: impl Into<String>) -> Self {
        Self::DuplicateSchemaName { name: name.into() }
    }

    /// Create an unknown column error.
    pub fn unknown_column(
        table: impl Into<String>,
        object: impl Into<String>,
        column: impl Into<String>,
    ) -> Self {
        Self::UnknownColumn {
            table: table.into(),
            object: object.into(),
            column: column.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_schema_name_display() {
        let err = SchemaError::duplicate_schema_name("public");
        assert_eq!(err.to_string(), "schema `public` is declared more than once");
    }

    #[test]
    fn test_unknown_column_display() {
        let err = SchemaError::unknown_column("users", "users_email_idx", "mail");
        let msg = err.to_string();
        assert!(msg.contains("users_email_idx"));
        assert!(msg.contains("mail"));
    }
}
