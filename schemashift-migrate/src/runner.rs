//! Applying and rolling back persisted migrations.
//!
//! Per phase, a migration is pending until `up` applies it and applied until
//! `down` rolls it back (newest first). Every run holds the phase lock, and
//! migrations of one phase run strictly one after another in chain order.

use std::collections::HashMap;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::changeset::{DdlOp, Phase};
use crate::config::{LockStrategy, RunnerConfig};
use crate::error::{MigrateResult, MigrationError};
use crate::file::MigrationFileManager;
use crate::history::{Bookkeeping, MigrationDatabase};
use crate::migration::Migration;

/// One line of [`MigrationRunner::status`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    /// Migration name.
    pub name: String,
    /// When it was applied, if it is.
    pub executed_at: Option<DateTime<Utc>>,
    /// Whether a migration file exists for it.
    pub on_disk: bool,
}

impl StatusEntry {
    /// Whether the migration is applied.
    pub fn is_applied(&self) -> bool {
        self.executed_at.is_some()
    }
}

/// Outcome of an `up` or `down` run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Phase that was run.
    pub phase: Phase,
    /// Migrations applied, in order.
    pub applied: Vec<String>,
    /// Migrations rolled back, in order.
    pub rolled_back: Vec<String>,
    /// Wall time in milliseconds.
    pub duration_ms: i64,
    /// Nothing was executed.
    pub dry_run: bool,
}

impl RunReport {
    fn new(phase: Phase, dry_run: bool) -> Self {
        Self {
            phase,
            applied: Vec::new(),
            rolled_back: Vec::new(),
            duration_ms: 0,
            dry_run,
        }
    }

    /// Whether anything was (or would be) applied or rolled back.
    pub fn has_changes(&self) -> bool {
        !self.applied.is_empty() || !self.rolled_back.is_empty()
    }

    /// Get a summary of the run.
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if !self.applied.is_empty() {
            parts.push(format!("{} applied", self.applied.len()));
        }
        if !self.rolled_back.is_empty() {
            parts.push(format!("{} rolled back", self.rolled_back.len()));
        }

        let prefix = if self.dry_run { "[DRY RUN] " } else { "" };
        if parts.is_empty() {
            format!("{}No {} migrations to run", prefix, self.phase)
        } else {
            format!(
                "{}{} ({} phase) in {}ms",
                prefix,
                parts.join(", "),
                self.phase,
                self.duration_ms
            )
        }
    }
}

/// Applies migration files against a [`MigrationDatabase`].
pub struct MigrationRunner<D: MigrationDatabase> {
    config: RunnerConfig,
    database: D,
    files: MigrationFileManager,
}

impl<D: MigrationDatabase> MigrationRunner<D> {
    /// Create a runner reading migrations from `config.migrations_dir`.
    pub fn new(config: RunnerConfig, database: D) -> Self {
        let files = MigrationFileManager::new(&config.migrations_dir);
        Self {
            config,
            database,
            files,
        }
    }

    /// The runner configuration.
    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// The database.
    pub fn database(&self) -> &D {
        &self.database
    }

    /// The migration files.
    pub fn files(&self) -> &MigrationFileManager {
        &self.files
    }

    /// Every known migration of `phase` with its applied time.
    ///
    /// Applied migrations whose file is gone are listed after the files.
    pub async fn status(&self, phase: Phase) -> MigrateResult<Vec<StatusEntry>> {
        let records = self.database.applied(phase).await?;
        let mut applied: HashMap<String, DateTime<Utc>> = records
            .iter()
            .map(|r| (r.name.clone(), r.executed_at))
            .collect();

        let mut entries: Vec<StatusEntry> = self
            .files
            .list(phase)
            .await?
            .into_iter()
            .map(|m| StatusEntry {
                executed_at: applied.remove(&m.name),
                name: m.name,
                on_disk: true,
            })
            .collect();

        entries.extend(
            records
                .into_iter()
                .filter(|r| applied.contains_key(&r.name))
                .map(|r| StatusEntry {
                    name: r.name,
                    executed_at: Some(r.executed_at),
                    on_disk: false,
                }),
        );
        Ok(entries)
    }

    /// Apply pending migrations of `phase`, up to and including `target`.
    pub async fn up(&self, phase: Phase, target: Option<&str>) -> MigrateResult<RunReport> {
        self.locked(phase, self.run_up(phase, target)).await
    }

    /// Roll back the newest applied migration of `phase`, or every applied
    /// migration down to and including `target`.
    pub async fn down(&self, phase: Phase, target: Option<&str>) -> MigrateResult<RunReport> {
        self.locked(phase, self.run_down(phase, target)).await
    }

    async fn locked(
        &self,
        phase: Phase,
        run: impl Future<Output = MigrateResult<RunReport>>,
    ) -> MigrateResult<RunReport> {
        let start = Instant::now();
        if self.config.dry_run {
            let mut report = run.await?;
            report.duration_ms = start.elapsed().as_millis() as i64;
            return Ok(report);
        }

        self.database.initialize(phase).await?;
        self.acquire(phase).await?;
        let result = run.await;

        // The lock is released whatever the outcome.
        if let Err(e) = self.database.release_lock(phase).await {
            warn!(phase = %phase, error = %e, "failed to release migration lock");
            if result.is_ok() {
                return Err(e);
            }
        }

        let mut report = result?;
        report.duration_ms = start.elapsed().as_millis() as i64;
        info!(phase = %phase, "{}", report.summary());
        Ok(report)
    }

    async fn acquire(&self, phase: Phase) -> MigrateResult<()> {
        match self.config.lock_strategy {
            LockStrategy::FailFast => {
                if self.database.try_lock(phase).await? {
                    Ok(())
                } else {
                    Err(MigrationError::LockContention { phase })
                }
            }
            LockStrategy::Wait {
                timeout,
                poll_interval,
            } => {
                let deadline = tokio::time::Instant::now() + timeout;
                loop {
                    if self.database.try_lock(phase).await? {
                        return Ok(());
                    }
                    if tokio::time::Instant::now() >= deadline {
                        return Err(MigrationError::LockContention { phase });
                    }
                    debug!(phase = %phase, "migration lock busy, waiting");
                    tokio::time::sleep(poll_interval).await;
                }
            }
        }
    }

    async fn run_up(&self, phase: Phase, target: Option<&str>) -> MigrateResult<RunReport> {
        let mut report = RunReport::new(phase, self.config.dry_run);
        let applied = self.database.applied(phase).await?;
        let migrations = self.files.list(phase).await?;

        if let Some(target) = target {
            if !migrations.iter().any(|m| m.name == target) {
                return Err(MigrationError::NotFound(target.to_string()));
            }
            if applied.iter().any(|r| r.name == target) {
                return Ok(report);
            }
        }

        let mut last = applied.last().map(|r| r.name.clone());
        for migration in migrations
            .iter()
            .filter(|m| !applied.iter().any(|r| r.name == m.name))
        {
            if migration.depends_on != last {
                return Err(MigrationError::DependencyChain {
                    phase,
                    migration: migration.name.clone(),
                    expected: describe_link(migration.depends_on.as_deref()),
                    actual: describe_link(last.as_deref()),
                });
            }

            if self.config.dry_run {
                info!(phase = %phase, migration = %migration.name, "[DRY RUN] would apply");
            } else {
                info!(phase = %phase, migration = %migration.name, "applying migration");
                self.execute(
                    migration,
                    &migration.up,
                    Bookkeeping::Insert(migration.name.clone()),
                )
                .await?;
            }

            report.applied.push(migration.name.clone());
            last = Some(migration.name.clone());
            if target == Some(migration.name.as_str()) {
                break;
            }
        }

        Ok(report)
    }

    async fn run_down(&self, phase: Phase, target: Option<&str>) -> MigrateResult<RunReport> {
        let mut report = RunReport::new(phase, self.config.dry_run);
        let applied = self.database.applied(phase).await?;

        let count = match target {
            None => applied.len().min(1),
            Some(target) => {
                let pos = applied
                    .iter()
                    .position(|r| r.name == target)
                    .ok_or_else(|| MigrationError::NotFound(target.to_string()))?;
                applied.len() - pos
            }
        };

        let mut migrations: HashMap<String, Migration> = self
            .files
            .list(phase)
            .await?
            .into_iter()
            .map(|m| (m.name.clone(), m))
            .collect();

        for record in applied.iter().rev().take(count) {
            let migration = migrations
                .remove(&record.name)
                .ok_or_else(|| MigrationError::NotFound(record.name.clone()))?;
            if !migration.is_reversible() {
                return Err(MigrationError::invalid_migration(format!(
                    "migration '{}' has no down statements",
                    migration.name
                )));
            }

            if self.config.dry_run {
                info!(phase = %phase, migration = %migration.name, "[DRY RUN] would roll back");
            } else {
                info!(phase = %phase, migration = %migration.name, "rolling back migration");
                self.execute(
                    &migration,
                    &migration.down,
                    Bookkeeping::Delete(migration.name.clone()),
                )
                .await?;
            }
            report.rolled_back.push(migration.name);
        }

        Ok(report)
    }

    /// Run `statements` of `migration` and record the outcome.
    async fn execute(
        &self,
        migration: &Migration,
        statements: &[DdlOp],
        bookkeeping: Bookkeeping,
    ) -> MigrateResult<()> {
        let phase = migration.phase;
        for statement in statements {
            if migration.debug {
                info!(migration = %migration.name, statement = %statement, "executing");
            } else {
                debug!(migration = %migration.name, statement = %statement, "executing");
            }
        }

        if migration.transaction {
            return self
                .database
                .run_in_transaction(phase, statements, &bookkeeping)
                .await
                .map_err(|failure| match failure.index {
                    Some(index) => MigrationError::StatementExecution {
                        migration: migration.name.clone(),
                        phase,
                        index,
                        statement: statements
                            .get(index)
                            .map(|s| s.sql.clone())
                            .unwrap_or_default(),
                        message: failure.message,
                        committed: Vec::new(),
                        transactional: true,
                    },
                    None => MigrationError::database(format!(
                        "recording '{}' failed: {}",
                        bookkeeping.name(),
                        failure.message
                    )),
                });
        }

        for (index, statement) in statements.iter().enumerate() {
            if let Err(failure) = self.database.run_statement(statement).await {
                let committed: Vec<String> =
                    statements[..index].iter().map(|s| s.sql.clone()).collect();
                warn!(
                    migration = %migration.name,
                    committed = committed.len(),
                    "non-transactional migration failed part way; reconcile manually"
                );
                return Err(MigrationError::StatementExecution {
                    migration: migration.name.clone(),
                    phase,
                    index,
                    statement: statement.sql.clone(),
                    message: failure.message,
                    committed,
                    transactional: false,
                });
            }
        }
        self.database.record(phase, &bookkeeping).await
    }
}

fn describe_link(name: Option<&str>) -> String {
    match name {
        Some(name) => format!("'{}'", name),
        None => "nothing".to_string(),
    }
}
