//! # schemashift
//!
//! A schema-diff-driven migration planner for PostgreSQL.
//!
//! schemashift compares the schema you declare with the schema the database
//! actually has and plans the DDL between them:
//! - Structural diff over tables, columns, constraints, indexes, triggers, enums and extensions
//! - Rename detection through a pluggable decision source
//! - Per-change risk warnings and deployment phases (expand, alter, contract, data)
//! - Foreign-key aware ordering
//! - Chained, checksummed migration files and a locking runner
//!
//! ## Quick Start
//!
//! ```rust
//! use schemashift::prelude::*;
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
//! for changeset in &plan.changesets {
//!     println!("[{}] {}", changeset.phase, changeset.describe());
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

/// Schema snapshot model.
pub mod schema {
    pub use schemashift_schema::*;
}

/// Planning and running migrations.
pub mod migrate {
    pub use schemashift_migrate::*;
}

/// PostgreSQL migration database.
#[cfg(feature = "postgres")]
#[cfg_attr(docsrs, doc(cfg(feature = "postgres")))]
pub mod postgres {
    pub use schemashift_postgres::*;
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::migrate::{
        AlwaysCreate, Changeset, ChangesetKind, LockStrategy, MemoryDatabase, MigrationDatabase,
        MigrationFileManager, MigrationPlan, MigrationRunner, Phase, PlannerOptions,
        ProjectConfig, RenameDecider, RenameDecision, RenameMap, RunnerConfig, Warning,
    };
    pub use crate::schema::{
        CheckConstraint, ColumnInfo, EnumInfo, ExtensionInfo, ForeignKey, IdentityKind, IndexDef,
        PrimaryKey, SchemaModel, TableInfo, TriggerDef, UniqueConstraint,
    };
}

// Re-export key types at the crate root
pub use migrate::{MigrationError, MigrationPlan, MigrationRunner};
pub use schema::{SchemaError, SchemaModel};
