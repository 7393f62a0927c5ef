//! # schemashift-migrate
//!
//! Migration planner and runner for schemashift.
//!
//! This crate provides functionality for:
//! - Structural diffing of a declared (local) schema against an introspected (remote) one
//! - Rename resolution through a pluggable [`RenameDecider`]
//! - Per-object changeset generation with risk warnings and deployment phases
//! - Priority ordering that respects foreign-key dependencies
//! - Phase-scoped, chained migration files
//! - A locking [`MigrationRunner`] that applies and rolls back migrations
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────┐   ┌────────────────┐   ┌───────────┐   ┌─────────┐
//! │ local/remote │──▶│ diff     │──▶│ RenameResolver │──▶│ generate  │──▶│ order   │
//! │ SchemaModel  │   └──────────┘   └────────────────┘   └───────────┘   └─────────┘
//! └──────────────┘                                                             │
//!                                                                              ▼
//!                    ┌────────────────┐   ┌─────────────────┐   ┌─────────────────┐
//!                    │ MigrationRunner│◀──│ migration files │◀──│ MigrationPlan   │
//!                    └────────────────┘   └─────────────────┘   └─────────────────┘
//!                            │
//!                            ▼
//!                    ┌────────────────────────────────┐
//!                    │ <prefix>_<phase> + lock row    │
//!                    └────────────────────────────────┘
//! ```
//!
//! Planning is synchronous and side-effect free; only the rename decider is
//! called out to. Execution is the only stage touching a database.
//!
//! ## Example
//!
//! ```rust
//! use schemashift_migrate::{
//!     AlwaysCreate, ChangesetKind, MigrationPlan, Phase, PlannerOptions,
//! };
//! use schemashift_schema::{ColumnInfo, PrimaryKey, SchemaModel, TableInfo};
//!
//! let local = SchemaModel::builder("public")
//!     .table(
//!         TableInfo::new("users")
//!             .column(ColumnInfo::new("id", "serial").not_null())
//!             .column(ColumnInfo::new("email", "text").not_null())
//!             .primary_key(PrimaryKey::new("users_pkey", ["id"])),
//!     )
//!     .build()?;
//! let remote = SchemaModel::new("public");
//!
//! let plan = MigrationPlan::build(&local, &remote, &mut AlwaysCreate, &PlannerOptions::default())?;
//! assert_eq!(plan.changesets[0].kind, ChangesetKind::CreateTable);
//! assert_eq!(plan.changesets[0].phase, Phase::Expand);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Migration Files
//!
//! ```text
//! migrations/
//! ├── expand/
//! │   └── 20240501090000_expand.toml
//! ├── alter/
//! └── contract/
//!     └── 20240501090000_contract.toml
//! ```

pub mod changeset;
pub mod config;
pub mod context;
pub mod diff;
pub mod error;
pub mod file;
pub mod generate;
pub mod history;
pub mod logging;
pub mod memory;
pub mod migration;
pub mod order;
pub mod plan;
pub mod rename;
pub mod runner;

pub use changeset::{Changeset, ChangesetKind, DdlOp, Phase, Warning, priority};
pub use config::{LockStrategy, PlannerOptions, ProjectConfig, RunnerConfig};
pub use context::GeneratorContext;
pub use diff::{ColumnAttr, DiffEntry, DiffKind, DiffTarget, DiffValue, diff};
pub use error::{MigrateResult, MigrationError};
pub use file::MigrationFileManager;
pub use generate::{generate, generate_all};
pub use history::{
    Bookkeeping, HistoryTables, MigrationDatabase, MigrationRecord, StatementFailure,
};
pub use memory::MemoryDatabase;
pub use migration::Migration;
pub use order::order;
pub use plan::MigrationPlan;
pub use rename::{AlwaysCreate, RenameDecider, RenameDecision, RenameMap, RenameResolver};
pub use runner::{MigrationRunner, RunReport, StatusEntry};
