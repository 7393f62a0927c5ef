//! In-memory [`MigrationDatabase`] for tests and dry runs.
//!
//! Statements are not interpreted; they are appended to an execution log.
//! Failures are injected by pattern.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::changeset::{DdlOp, Phase};
use crate::error::MigrateResult;
use crate::history::{Bookkeeping, MigrationDatabase, MigrationRecord, StatementFailure};

#[derive(Debug, Default)]
struct State {
    records: HashMap<Phase, Vec<MigrationRecord>>,
    locks: HashSet<Phase>,
    initialized: HashSet<Phase>,
    executed: Vec<String>,
    fail_on: Vec<String>,
}

impl State {
    fn check(&self, index: usize, statement: &DdlOp) -> Result<(), StatementFailure> {
        match self.fail_on.iter().find(|p| statement.sql.contains(p.as_str())) {
            Some(pattern) => Err(StatementFailure::at(
                index,
                format!("injected failure matching '{}'", pattern),
            )),
            None => Ok(()),
        }
    }

    fn apply(&mut self, phase: Phase, bookkeeping: &Bookkeeping) {
        let records = self.records.entry(phase).or_default();
        match bookkeeping {
            Bookkeeping::Insert(name) => records.push(MigrationRecord::now(name.clone())),
            Bookkeeping::Delete(name) => records.retain(|r| &r.name != name),
        }
    }
}

/// Shared in-memory database. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    state: Arc<Mutex<State>>,
}

impl MemoryDatabase {
    /// Create an empty database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every statement containing `pattern`.
    pub fn fail_on(&self, pattern: impl Into<String>) {
        self.state.lock().fail_on.push(pattern.into());
    }

    /// Stop injecting failures.
    pub fn clear_failures(&self) {
        self.state.lock().fail_on.clear();
    }

    /// Every statement that took effect, in order.
    pub fn executed(&self) -> Vec<String> {
        self.state.lock().executed.clone()
    }

    /// Applied migrations of `phase`.
    pub fn records(&self, phase: Phase) -> Vec<MigrationRecord> {
        self.state
            .lock()
            .records
            .get(&phase)
            .cloned()
            .unwrap_or_default()
    }

    /// Take the lock of `phase` as if another runner held it.
    pub fn hold_lock(&self, phase: Phase) {
        self.state.lock().locks.insert(phase);
    }

    /// Release a lock taken with [`hold_lock`](Self::hold_lock).
    pub fn free_lock(&self, phase: Phase) {
        self.state.lock().locks.remove(&phase);
    }

    /// Whether the lock of `phase` is held.
    pub fn is_locked(&self, phase: Phase) -> bool {
        self.state.lock().locks.contains(&phase)
    }

    /// Whether `phase`'s bookkeeping was initialized.
    pub fn is_initialized(&self, phase: Phase) -> bool {
        self.state.lock().initialized.contains(&phase)
    }
}

#[async_trait::async_trait]
impl MigrationDatabase for MemoryDatabase {
    async fn initialize(&self, phase: Phase) -> MigrateResult<()> {
        let mut state = self.state.lock();
        state.initialized.insert(phase);
        state.records.entry(phase).or_default();
        Ok(())
    }

    async fn applied(&self, phase: Phase) -> MigrateResult<Vec<MigrationRecord>> {
        Ok(self.records(phase))
    }

    async fn try_lock(&self, phase: Phase) -> MigrateResult<bool> {
        Ok(self.state.lock().locks.insert(phase))
    }

    async fn release_lock(&self, phase: Phase) -> MigrateResult<()> {
        self.state.lock().locks.remove(&phase);
        Ok(())
    }

    async fn run_in_transaction(
        &self,
        phase: Phase,
        statements: &[DdlOp],
        bookkeeping: &Bookkeeping,
    ) -> Result<(), StatementFailure> {
        let mut state = self.state.lock();
        for (index, statement) in statements.iter().enumerate() {
            state.check(index, statement)?;
        }
        state
            .executed
            .extend(statements.iter().map(|s| s.sql.clone()));
        state.apply(phase, bookkeeping);
        Ok(())
    }

    async fn run_statement(&self, statement: &DdlOp) -> Result<(), StatementFailure> {
        let mut state = self.state.lock();
        state.check(0, statement)?;
        state.executed.push(statement.sql.clone());
        Ok(())
    }

    async fn record(&self, phase: Phase, bookkeeping: &Bookkeeping) -> MigrateResult<()> {
        self.state.lock().apply(phase, bookkeeping);
        Ok(())
    }
}
