//! Applied-migration bookkeeping and the database contract used by the runner.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::changeset::{DdlOp, Phase};
use crate::config::HISTORY_TABLE_PREFIX;
use crate::error::MigrateResult;

/// A migration applied in one phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRecord {
    /// Migration name.
    pub name: String,
    /// When the migration was applied.
    pub executed_at: DateTime<Utc>,
}

impl MigrationRecord {
    /// Record `name` as applied now.
    pub fn now(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            executed_at: Utc::now(),
        }
    }
}

/// Bookkeeping change committed together with a migration's statements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bookkeeping {
    /// The migration was applied.
    Insert(String),
    /// The migration was rolled back.
    Delete(String),
}

impl Bookkeeping {
    /// Migration the change is about.
    pub fn name(&self) -> &str {
        match self {
            Self::Insert(name) | Self::Delete(name) => name,
        }
    }
}

/// A failed statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementFailure {
    /// Index of the failing statement; `None` when the bookkeeping write failed.
    pub index: Option<usize>,
    /// Database error message.
    pub message: String,
}

impl StatementFailure {
    /// Failure of statement `index`.
    pub fn at(index: usize, message: impl Into<String>) -> Self {
        Self {
            index: Some(index),
            message: message.into(),
        }
    }

    /// Failure outside the migration's statements.
    pub fn bookkeeping(message: impl Into<String>) -> Self {
        Self {
            index: None,
            message: message.into(),
        }
    }
}

/// Database operations the runner needs.
///
/// Implementations keep one bookkeeping table and one lock row per phase.
#[async_trait::async_trait]
pub trait MigrationDatabase: Send + Sync {
    /// Create the bookkeeping table and lock row of `phase` if missing.
    async fn initialize(&self, phase: Phase) -> MigrateResult<()>;

    /// Applied migrations of `phase`, oldest first.
    async fn applied(&self, phase: Phase) -> MigrateResult<Vec<MigrationRecord>>;

    /// Take the lock of `phase`. Returns `false` if another runner holds it.
    async fn try_lock(&self, phase: Phase) -> MigrateResult<bool>;

    /// Release the lock of `phase`.
    async fn release_lock(&self, phase: Phase) -> MigrateResult<()>;

    /// Run `statements` and the bookkeeping change in one transaction.
    ///
    /// On failure nothing is committed.
    async fn run_in_transaction(
        &self,
        phase: Phase,
        statements: &[DdlOp],
        bookkeeping: &Bookkeeping,
    ) -> Result<(), StatementFailure>;

    /// Run a single statement outside any transaction.
    async fn run_statement(&self, statement: &DdlOp) -> Result<(), StatementFailure>;

    /// Apply a bookkeeping change on its own.
    async fn record(&self, phase: Phase, bookkeeping: &Bookkeeping) -> MigrateResult<()>;
}

/// Names of the bookkeeping tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryTables {
    prefix: String,
}

impl Default for HistoryTables {
    fn default() -> Self {
        Self::new(HISTORY_TABLE_PREFIX)
    }
}

impl HistoryTables {
    /// Tables named after `prefix`.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Table holding applied migrations of `phase`.
    pub fn records(&self, phase: Phase) -> String {
        format!("{}_{}", self.prefix, phase)
    }

    /// Table holding the lock row of `phase`.
    pub fn lock(&self, phase: Phase) -> String {
        format!("{}_lock_{}", self.prefix, phase)
    }

    /// PostgreSQL statements creating both tables and the lock row.
    pub fn postgres_init_sql(&self, phase: Phase) -> Vec<String> {
        let records = self.records(phase);
        let lock = self.lock(phase);
        vec![
            format!(
                "CREATE TABLE IF NOT EXISTS \"{}\" (\n    \
                 name VARCHAR(255) PRIMARY KEY,\n    \
                 executed_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT clock_timestamp()\n);",
                records
            ),
            format!(
                "CREATE TABLE IF NOT EXISTS \"{}\" (\n    \
                 id INTEGER PRIMARY KEY,\n    \
                 is_locked BOOLEAN NOT NULL DEFAULT FALSE,\n    \
                 locked_at TIMESTAMP WITH TIME ZONE\n);",
                lock
            ),
            format!(
                "INSERT INTO \"{}\" (id, is_locked) VALUES (1, FALSE) ON CONFLICT (id) DO NOTHING;",
                lock
            ),
        ]
    }
}
