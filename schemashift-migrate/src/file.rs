//! Migration files.
//!
//! Layout: `<migrations_dir>/<phase>/<name>.toml`, one TOML document per
//! migration. Names are timestamp-prefixed so sorting the file names of a
//! phase yields its application order.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::changeset::Phase;
use crate::error::{MigrateResult, MigrationError};
use crate::migration::{Migration, compute_checksum, migration_name};
use crate::plan::MigrationPlan;

const EXTENSION: &str = "toml";

/// Reads and writes migration files.
#[derive(Debug, Clone)]
pub struct MigrationFileManager {
    migrations_dir: PathBuf,
}

impl MigrationFileManager {
    /// Manage migrations under `migrations_dir`.
    pub fn new(migrations_dir: impl Into<PathBuf>) -> Self {
        Self {
            migrations_dir: migrations_dir.into(),
        }
    }

    /// The migrations directory.
    pub fn migrations_dir(&self) -> &Path {
        &self.migrations_dir
    }

    /// Directory holding the migrations of `phase`.
    pub fn phase_dir(&self, phase: Phase) -> PathBuf {
        self.migrations_dir.join(phase.as_str())
    }

    /// Path of migration `name` in `phase`.
    pub fn path_of(&self, phase: Phase, name: &str) -> PathBuf {
        self.phase_dir(phase).join(format!("{}.{}", name, EXTENSION))
    }

    /// Write a migration, replacing any file with the same name.
    pub async fn write(&self, migration: &Migration) -> MigrateResult<PathBuf> {
        let dir = self.phase_dir(migration.phase);
        tokio::fs::create_dir_all(&dir).await?;

        let content = toml::to_string_pretty(migration).map_err(|e| {
            MigrationError::invalid_migration(format!(
                "cannot serialize '{}': {}",
                migration.name, e
            ))
        })?;

        let path = self.path_of(migration.phase, &migration.name);
        tokio::fs::write(&path, content).await?;
        debug!(path = %path.display(), "migration written");
        Ok(path)
    }

    /// Read migration `name` of `phase`, verifying its checksum.
    pub async fn read(&self, phase: Phase, name: &str) -> MigrateResult<Migration> {
        let path = self.path_of(phase, name);
        if !tokio::fs::try_exists(&path).await? {
            return Err(MigrationError::NotFound(name.to_string()));
        }
        read_file(&path, phase).await
    }

    /// All migrations of `phase`, in application order.
    pub async fn list(&self, phase: Phase) -> MigrateResult<Vec<Migration>> {
        let dir = self.phase_dir(phase);
        if !tokio::fs::try_exists(&dir).await? {
            return Ok(Vec::new());
        }

        let mut paths = Vec::new();
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == EXTENSION) {
                paths.push(path);
            }
        }
        paths.sort();

        let mut migrations = Vec::with_capacity(paths.len());
        for path in paths {
            migrations.push(read_file(&path, phase).await?);
        }
        Ok(migrations)
    }

    /// Name of the newest migration of `phase`.
    pub async fn head(&self, phase: Phase) -> MigrateResult<Option<String>> {
        Ok(self.list(phase).await?.pop().map(|m| m.name))
    }

    /// Current head of every phase that has migrations.
    pub async fn heads(&self) -> MigrateResult<HashMap<Phase, String>> {
        let mut heads = HashMap::new();
        for phase in Phase::ALL {
            if let Some(head) = self.head(phase).await? {
                heads.insert(phase, head);
            }
        }
        Ok(heads)
    }

    /// Write one migration per phase of `plan`, chained onto the current heads.
    pub async fn write_plan(
        &self,
        plan: &MigrationPlan,
        timestamp: DateTime<Utc>,
    ) -> MigrateResult<Vec<Migration>> {
        if plan.is_empty() {
            return Err(MigrationError::NoChanges);
        }

        let heads = self.heads().await?;
        let migrations = plan.to_migrations(timestamp, &heads);
        for migration in &migrations {
            self.check_name_free(migration).await?;
        }
        for migration in &migrations {
            self.write(migration).await?;
            info!(
                phase = %migration.phase,
                migration = %migration.name,
                statements = migration.up.len(),
                "migration created"
            );
        }
        Ok(migrations)
    }

    /// Create an empty hand-written migration at the head of `phase`.
    pub async fn scaffold(
        &self,
        phase: Phase,
        description: &str,
        timestamp: DateTime<Utc>,
    ) -> MigrateResult<Migration> {
        let depends_on = self.head(phase).await?;
        let migration = Migration::scaffold(migration_name(timestamp, description), phase, depends_on)
            .with_description(description);
        self.check_name_free(&migration).await?;
        self.write(&migration).await?;
        info!(phase = %phase, migration = %migration.name, "migration scaffolded");
        Ok(migration)
    }

    async fn check_name_free(&self, migration: &Migration) -> MigrateResult<()> {
        if tokio::fs::try_exists(self.path_of(migration.phase, &migration.name)).await? {
            return Err(MigrationError::invalid_migration(format!(
                "migration '{}' already exists in the {} phase",
                migration.name, migration.phase
            )));
        }
        Ok(())
    }
}

async fn read_file(path: &Path, phase: Phase) -> MigrateResult<Migration> {
    let content = tokio::fs::read_to_string(path).await?;
    let migration: Migration = toml::from_str(&content).map_err(|e| {
        MigrationError::invalid_migration(format!("{}: {}", path.display(), e))
    })?;

    if migration.phase != phase {
        return Err(MigrationError::invalid_migration(format!(
            "{}: declares phase {} but is stored under {}",
            path.display(),
            migration.phase,
            phase
        )));
    }

    let actual = compute_checksum(&migration.up);
    if actual != migration.checksum {
        return Err(MigrationError::ChecksumMismatch {
            name: migration.name,
            expected: migration.checksum,
            actual,
        });
    }
    Ok(migration)
}
