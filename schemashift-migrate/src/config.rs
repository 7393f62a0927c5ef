//! Planner, runner and project configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MigrateResult, MigrationError};
use crate::rename::RenameMap;

/// Default config file name (lives in project root).
pub const CONFIG_FILE_NAME: &str = "schemashift.toml";

/// Default migrations directory.
pub const MIGRATIONS_DIR: &str = "./migrations";

/// Default prefix of the per-phase bookkeeping tables.
pub const HISTORY_TABLE_PREFIX: &str = "_schemashift_migrations";

/// Options for turning a diff into a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerOptions {
    /// Rename indexes, constraints and triggers named `<table>_...` along with their table.
    pub naming_convention: bool,
    /// Log every statement of the generated changesets at info level when run.
    pub debug: bool,
    /// Fail planning when any changeset carries a warning.
    pub warnings_as_errors: bool,
}

impl Default for PlannerOptions {
    fn default() -> Self {
        Self {
            naming_convention: true,
            debug: false,
            warnings_as_errors: false,
        }
    }
}

impl PlannerOptions {
    /// Create default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether dependent objects follow table renames.
    pub fn naming_convention(mut self, enabled: bool) -> Self {
        self.naming_convention = enabled;
        self
    }

    /// Set the verbose execution flag.
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Treat warnings as fatal.
    pub fn warnings_as_errors(mut self, strict: bool) -> Self {
        self.warnings_as_errors = strict;
        self
    }
}

/// What to do when another runner holds the phase lock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LockStrategy {
    /// Fail immediately with a lock contention error.
    #[default]
    FailFast,
    /// Poll until the lock is free or the timeout elapses.
    Wait {
        /// Give up after this long.
        timeout: Duration,
        /// Delay between attempts.
        poll_interval: Duration,
    },
}

/// Configuration for the migration runner.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Root of the migration files.
    pub migrations_dir: PathBuf,
    /// Prefix of the bookkeeping tables (`<prefix>_<phase>`, `<prefix>_lock_<phase>`).
    pub history_table_prefix: String,
    /// Lock contention behaviour.
    pub lock_strategy: LockStrategy,
    /// Validate and report without executing.
    pub dry_run: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            migrations_dir: PathBuf::from(MIGRATIONS_DIR),
            history_table_prefix: HISTORY_TABLE_PREFIX.to_string(),
            lock_strategy: LockStrategy::default(),
            dry_run: false,
        }
    }
}

impl RunnerConfig {
    /// Create a new configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the migrations directory.
    pub fn migrations_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.migrations_dir = dir.into();
        self
    }

    /// Set the bookkeeping table prefix.
    pub fn history_table_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.history_table_prefix = prefix.into();
        self
    }

    /// Set the lock strategy.
    pub fn lock_strategy(mut self, strategy: LockStrategy) -> Self {
        self.lock_strategy = strategy;
        self
    }

    /// Enable dry-run mode.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

/// Contents of `schemashift.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Planner options.
    pub planner: PlannerOptions,
    /// Runner settings.
    pub runner: RunnerSection,
    /// Database connection.
    pub database: DatabaseSection,
    /// Non-interactive rename decisions.
    pub renames: RenameSection,
}

/// `[runner]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerSection {
    /// Directory for migration files.
    pub migrations_dir: String,
    /// Bookkeeping table prefix.
    pub history_table_prefix: String,
    /// Wait this long for the phase lock. Fails fast when unset.
    pub lock_timeout_ms: Option<u64>,
    /// Polling interval while waiting for the lock.
    pub lock_poll_interval_ms: u64,
    /// Validate and report without executing.
    pub dry_run: bool,
}

impl Default for RunnerSection {
    fn default() -> Self {
        Self {
            migrations_dir: MIGRATIONS_DIR.to_string(),
            history_table_prefix: HISTORY_TABLE_PREFIX.to_string(),
            lock_timeout_ms: None,
            lock_poll_interval_ms: 500,
            dry_run: false,
        }
    }
}

/// `[database]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    /// Connection URL.
    pub url: Option<String>,
    /// Maximum pool size.
    pub pool_size: usize,
    /// Per-statement timeout in milliseconds.
    pub statement_timeout_ms: Option<u64>,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            url: None,
            pool_size: 4,
            statement_timeout_ms: None,
        }
    }
}

/// `[renames]` section.
///
/// ```toml
/// [renames]
/// tables = { customers = "clients" }
/// columns = { "users.name" = "full_name" }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenameSection {
    /// Old table name to new table name.
    pub tables: BTreeMap<String, String>,
    /// `table.old_column` to new column name. `table` is the table's new name.
    pub columns: BTreeMap<String, String>,
}

impl ProjectConfig {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> MigrateResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> MigrateResult<Self> {
        toml::from_str(content).map_err(|e| MigrationError::config(e.to_string()))
    }

    /// Save configuration to a file.
    pub fn save(&self, path: &Path) -> MigrateResult<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| MigrationError::config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Runner configuration described by the `[runner]` section.
    pub fn runner_config(&self) -> RunnerConfig {
        let lock_strategy = match self.runner.lock_timeout_ms {
            Some(timeout) => LockStrategy::Wait {
                timeout: Duration::from_millis(timeout),
                poll_interval: Duration::from_millis(self.runner.lock_poll_interval_ms.max(1)),
            },
            None => LockStrategy::FailFast,
        };

        RunnerConfig::new()
            .migrations_dir(&self.runner.migrations_dir)
            .history_table_prefix(&self.runner.history_table_prefix)
            .lock_strategy(lock_strategy)
            .dry_run(self.runner.dry_run)
    }

    /// Rename decider described by the `[renames]` section.
    pub fn rename_map(&self) -> MigrateResult<RenameMap> {
        let mut map = RenameMap::new();
        for (old, new) in &self.renames.tables {
            map = map.table(old, new);
        }
        for (key, new) in &self.renames.columns {
            let Some((table, old)) = key.split_once('.') else {
                return Err(MigrationError::config(format!(
                    "column rename key '{}' must have the form 'table.column'",
                    key
                )));
            };
            map = map.column(table, old, new);
        }
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_planner_defaults() {
        let options = PlannerOptions::default();
        assert!(options.naming_convention);
        assert!(!options.warnings_as_errors);
    }

    #[test]
    fn test_runner_config_builder() {
        let config = RunnerConfig::new()
            .migrations_dir("./db/migrations")
            .history_table_prefix("_history")
            .dry_run(true);

        assert_eq!(config.migrations_dir, PathBuf::from("./db/migrations"));
        assert_eq!(config.history_table_prefix, "_history");
        assert!(config.dry_run);
        assert_eq!(config.lock_strategy, LockStrategy::FailFast);
    }

    #[test]
    fn test_parse_project_config() {
        let config = ProjectConfig::from_toml(
            r#"
            [planner]
            warnings_as_errors = true

            [runner]
            migrations_dir = "db/migrations"
            lock_timeout_ms = 2000
            lock_poll_interval_ms = 100

            [database]
            url = "postgres://localhost/app"

            [renames]
            tables = { customers = "clients" }
            columns = { "users.name" = "full_name" }
            "#,
        )
        .unwrap();

        assert!(config.planner.warnings_as_errors);
        assert!(config.planner.naming_convention);
        assert_eq!(config.database.pool_size, 4);
        assert_eq!(
            config.runner_config().lock_strategy,
            LockStrategy::Wait {
                timeout: Duration::from_millis(2000),
                poll_interval: Duration::from_millis(100),
            }
        );
        assert!(config.rename_map().is_ok());
    }

    #[test]
    fn test_bad_column_rename_key() {
        let config = ProjectConfig::from_toml(
            r#"
            [renames]
            columns = { "name" = "full_name" }
            "#,
        )
        .unwrap();
        assert!(matches!(config.rename_map(), Err(MigrationError::Config(_))));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);

        let mut config = ProjectConfig::default();
        config.database.url = Some("postgres://localhost/app".into());
        config.save(&path).unwrap();

        assert_eq!(ProjectConfig::load(&path).unwrap(), config);
    }
}
