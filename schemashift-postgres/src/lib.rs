//! # schemashift-postgres
//!
//! PostgreSQL implementation of the schemashift [`MigrationDatabase`] contract,
//! using `tokio-postgres` with a `deadpool-postgres` connection pool.
//!
//! ## Example
//!
//! ```rust,no_run
//! use schemashift_migrate::{MigrationRunner, Phase, ProjectConfig};
//! use schemashift_postgres::{PgConfig, PgMigrationDatabase};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let project = ProjectConfig::load("schemashift.toml".as_ref())?;
//! let runner_config = project.runner_config();
//! let database = PgMigrationDatabase::connect(&PgConfig::from_project(&project)?, &runner_config)?;
//!
//! let runner = MigrationRunner::new(runner_config, database);
//! for phase in Phase::DEPLOY_ORDER {
//!     println!("{}", runner.up(phase, None).await?.summary());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! [`MigrationDatabase`]: schemashift_migrate::MigrationDatabase

pub mod config;
pub mod database;
pub mod error;

pub use config::PgConfig;
pub use database::PgMigrationDatabase;
pub use error::{PgError, PgResult};
