//! Error types for planning and running migrations.

use schemashift_schema::SchemaError;
use thiserror::Error;

use crate::changeset::Phase;

/// Result type alias for migration operations.
pub type MigrateResult<T> = Result<T, MigrationError>;

/// Errors that can occur while planning or running migrations.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// The declared or introspected schema is invalid.
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// The rename decision source gave an answer that does not fit the candidates.
    #[error("Ambiguous rename for '{target}': {reason}")]
    AmbiguousRename {
        /// Table or `table.column` being decided.
        target: String,
        /// What was wrong with the decision.
        reason: String,
    },

    /// The rename decision source cancelled planning.
    #[error("Rename decision for '{0}' was cancelled")]
    RenameCancelled(String),

    /// Warnings were produced while the planner treats them as fatal.
    #[error("Plan contains {} unsafe change(s): {}", .0.len(), .0.join("; "))]
    UnsafeChange(Vec<String>),

    /// A migration does not chain onto the last applied migration of its phase.
    #[error(
        "Dependency chain broken in {phase} phase: '{migration}' depends on {expected}, but the last applied migration is {actual}"
    )]
    DependencyChain {
        /// Phase being run.
        phase: Phase,
        /// Migration that could not be applied.
        migration: String,
        /// What the migration declares as its parent.
        expected: String,
        /// What is actually applied.
        actual: String,
    },

    /// A DDL statement failed.
    #[error(
        "Statement {index} of migration '{migration}' ({phase}) failed: {message}\n  statement: {statement}"
    )]
    StatementExecution {
        /// Migration being run.
        migration: String,
        /// Phase being run.
        phase: Phase,
        /// Zero-based index of the failing statement.
        index: usize,
        /// The failing statement.
        statement: String,
        /// Database error message.
        message: String,
        /// Statements that committed before the failure. Always empty for transactional migrations.
        committed: Vec<String>,
        /// Whether the migration ran inside a transaction.
        transactional: bool,
    },

    /// Another runner holds the phase lock.
    #[error("Migration lock for the {phase} phase is held by another runner")]
    LockContention {
        /// Phase whose lock is held.
        phase: Phase,
    },

    /// File system error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Database operation error.
    #[error("Database error: {0}")]
    Database(String),

    /// Invalid migration file or format.
    #[error("Invalid migration: {0}")]
    InvalidMigration(String),

    /// Migration checksum mismatch.
    #[error("Checksum mismatch for migration '{name}': expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Migration name.
        name: String,
        /// Checksum stored in the file.
        expected: String,
        /// Checksum of the statements.
        actual: String,
    },

    /// Migration not found.
    #[error("Migration '{0}' not found")]
    NotFound(String),

    /// No changes to migrate.
    #[error("No schema changes detected")]
    NoChanges,

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl MigrationError {
    /// Create a database error.
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Create an ambiguous rename error.
    pub fn ambiguous_rename(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::AmbiguousRename {
            target: target.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid migration error.
    pub fn invalid_migration(msg: impl Into<String>) -> Self {
        Self::InvalidMigration(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Check if this is a recoverable error.
    ///
    /// Recoverable errors can be retried without operator intervention.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::LockContention { .. } | Self::NoChanges)
    }

    /// Statements of a non-transactional migration that committed before it failed.
    pub fn committed_statements(&self) -> &[String] {
        match self {
            Self::StatementExecution { committed, .. } => committed,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MigrationError::NotFound("20240101000000_expand".to_string());
        assert!(err.to_string().contains("20240101000000_expand"));
    }

    #[test]
    fn test_checksum_mismatch_display() {
        let err = MigrationError::ChecksumMismatch {
            name: "test".to_string(),
            expected: "abc".to_string(),
            actual: "xyz".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("abc"));
        assert!(msg.contains("xyz"));
    }

    #[test]
    fn test_schema_error_converts() {
        let err: MigrationError = SchemaError::duplicate_schema_name("public").into();
        assert!(matches!(err, MigrationError::Schema(_)));
    }

    #[test]
    fn test_statement_execution_reports_committed() {
        let err = MigrationError::StatementExecution {
            migration: "m1".into(),
            phase: Phase::Alter,
            index: 1,
            statement: "CREATE INDEX CONCURRENTLY ...".into(),
            message: "boom".into(),
            committed: vec!["CREATE INDEX CONCURRENTLY a".into()],
            transactional: false,
        };
        assert_eq!(err.committed_statements().len(), 1);
        assert!(err.to_string().contains("alter"));
    }

    #[test]
    fn test_is_recoverable() {
        assert!(MigrationError::NoChanges.is_recoverable());
        assert!(MigrationError::LockContention { phase: Phase::Expand }.is_recoverable());
        assert!(!MigrationError::database("connection").is_recoverable());
    }
}
