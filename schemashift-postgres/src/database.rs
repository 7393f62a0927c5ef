//! [`MigrationDatabase`] over a deadpool connection pool.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use schemashift_migrate::{
    Bookkeeping, DdlOp, HistoryTables, MigrateResult, MigrationDatabase, MigrationRecord, Phase,
    RunnerConfig, StatementFailure,
};
use tokio_postgres::error::SqlState;
use tracing::{debug, trace};

use crate::config::PgConfig;
use crate::error::{PgError, PgResult};

/// PostgreSQL-backed migration database.
///
/// Bookkeeping lives in `<prefix>_<phase>`; the lock is the single row of
/// `<prefix>_lock_<phase>`, claimed with a conditional `UPDATE` so it
/// survives connection recycling and is visible to every runner.
#[derive(Clone)]
pub struct PgMigrationDatabase {
    pool: Pool,
    tables: HistoryTables,
}

impl PgMigrationDatabase {
    /// Wrap an existing pool.
    pub fn new(pool: Pool, tables: HistoryTables) -> Self {
        Self { pool, tables }
    }

    /// Connect with `config`, naming bookkeeping tables after the runner's prefix.
    pub fn connect(config: &PgConfig, runner: &RunnerConfig) -> PgResult<Self> {
        Ok(Self::new(
            config.build_pool()?,
            HistoryTables::new(runner.history_table_prefix.clone()),
        ))
    }

    /// The bookkeeping table names.
    pub fn tables(&self) -> &HistoryTables {
        &self.tables
    }

    async fn client(&self) -> PgResult<deadpool_postgres::Object> {
        trace!("acquiring connection from pool");
        Ok(self.pool.get().await?)
    }

    async fn applied_records(&self, phase: Phase) -> PgResult<Vec<MigrationRecord>> {
        let client = self.client().await?;
        let rows = match client
            .query(&select_sql(&self.tables.records(phase)), &[])
            .await
        {
            Ok(rows) => rows,
            // Not initialized yet, e.g. during a dry run.
            Err(e) if e.code() == Some(&SqlState::UNDEFINED_TABLE) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        rows.iter()
            .map(|row| -> PgResult<MigrationRecord> {
                Ok(MigrationRecord {
                    name: row.try_get("name")?,
                    executed_at: row.try_get::<_, DateTime<Utc>>("executed_at")?,
                })
            })
            .collect()
    }

    async fn claim_lock(&self, phase: Phase) -> PgResult<bool> {
        let client = self.client().await?;
        let updated = client
            .execute(&try_lock_sql(&self.tables.lock(phase)), &[])
            .await?;
        Ok(updated == 1)
    }

    async fn write_bookkeeping(&self, phase: Phase, bookkeeping: &Bookkeeping) -> PgResult<()> {
        let client = self.client().await?;
        let table = self.tables.records(phase);
        client
            .execute(&bookkeeping_sql(&table, bookkeeping), &[&bookkeeping.name()])
            .await?;
        Ok(())
    }
}

#[async_trait]
impl MigrationDatabase for PgMigrationDatabase {
    async fn initialize(&self, phase: Phase) -> MigrateResult<()> {
        let client = self.client().await?;
        let sql = self.tables.postgres_init_sql(phase).join("\n");
        client.batch_execute(&sql).await.map_err(PgError::from)?;
        debug!(phase = %phase, table = %self.tables.records(phase), "bookkeeping initialized");
        Ok(())
    }

    async fn applied(&self, phase: Phase) -> MigrateResult<Vec<MigrationRecord>> {
        Ok(self.applied_records(phase).await?)
    }

    async fn try_lock(&self, phase: Phase) -> MigrateResult<bool> {
        Ok(self.claim_lock(phase).await?)
    }

    async fn release_lock(&self, phase: Phase) -> MigrateResult<()> {
        let client = self.client().await?;
        client
            .execute(&release_lock_sql(&self.tables.lock(phase)), &[])
            .await
            .map_err(PgError::from)?;
        Ok(())
    }

    async fn run_in_transaction(
        &self,
        phase: Phase,
        statements: &[DdlOp],
        bookkeeping: &Bookkeeping,
    ) -> Result<(), StatementFailure> {
        let mut client = self
            .client()
            .await
            .map_err(|e| StatementFailure::bookkeeping(e.to_string()))?;
        let tx = client
            .transaction()
            .await
            .map_err(|e| StatementFailure::bookkeeping(e.to_string()))?;

        // Dropping `tx` on an early return rolls it back.
        for (index, statement) in statements.iter().enumerate() {
            tx.batch_execute(&statement.sql)
                .await
                .map_err(|e| StatementFailure::at(index, db_message(&e)))?;
        }

        let table = self.tables.records(phase);
        tx.execute(&bookkeeping_sql(&table, bookkeeping), &[&bookkeeping.name()])
            .await
            .map_err(|e| StatementFailure::bookkeeping(db_message(&e)))?;
        tx.commit()
            .await
            .map_err(|e| StatementFailure::bookkeeping(db_message(&e)))
    }

    async fn run_statement(&self, statement: &DdlOp) -> Result<(), StatementFailure> {
        let client = self
            .client()
            .await
            .map_err(|e| StatementFailure::bookkeeping(e.to_string()))?;
        client
            .batch_execute(&statement.sql)
            .await
            .map_err(|e| StatementFailure::at(0, db_message(&e)))
    }

    async fn record(&self, phase: Phase, bookkeeping: &Bookkeeping) -> MigrateResult<()> {
        Ok(self.write_bookkeeping(phase, bookkeeping).await?)
    }
}

/// Server message with SQLSTATE when available.
fn db_message(e: &tokio_postgres::Error) -> String {
    match e.as_db_error() {
        Some(db) => format!("{} (SQLSTATE {})", db.message(), db.code().code()),
        None => e.to_string(),
    }
}

fn select_sql(table: &str) -> String {
    format!(
        "SELECT name, executed_at FROM \"{}\" ORDER BY executed_at, name",
        table
    )
}

fn bookkeeping_sql(table: &str, bookkeeping: &Bookkeeping) -> String {
    match bookkeeping {
        Bookkeeping::Insert(_) => format!("INSERT INTO \"{}\" (name) VALUES ($1)", table),
        Bookkeeping::Delete(_) => format!("DELETE FROM \"{}\" WHERE name = $1", table),
    }
}

fn try_lock_sql(table: &str) -> String {
    format!(
        "UPDATE \"{}\" SET is_locked = TRUE, locked_at = NOW() WHERE id = 1 AND NOT is_locked",
        table
    )
}

fn release_lock_sql(table: &str) -> String {
    format!(
        "UPDATE \"{}\" SET is_locked = FALSE, locked_at = NULL WHERE id = 1",
        table
    )
}
