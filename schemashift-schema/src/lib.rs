//! # schemashift-schema
//!
//! Schema snapshot model for the schemashift migration planner.
//!
//! This crate provides:
//! - [`SchemaModel`] and its table, column, constraint, index and trigger types
//! - Canonical content hashing so constraints are identified by definition, not name
//! - Foreign-key aware table ordering
//! - A fluent [`SchemaBuilder`] and JSON snapshots
//!
//! ## Example
//!
//! ```rust
//! use schemashift_schema::{ColumnInfo, PrimaryKey, SchemaModel, TableInfo};
//!
//! let schema = SchemaModel::builder("public")
//!     .table(
//!         TableInfo::new("users")
//!             .column(ColumnInfo::new("id", "serial").not_null())
//!             .column(ColumnInfo::new("email", "text").not_null())
//!             .primary_key(PrimaryKey::new("users_pkey", ["id"])),
//!     )
//!     .build()?;
//!
//! assert_eq!(schema.table_priorities, vec!["users"]);
//! # Ok::<(), schemashift_schema::SchemaError>(())
//! ```

pub mod builder;
pub mod canonical;
pub mod constraint;
pub mod error;
pub mod model;
pub mod priority;
pub mod validator;

pub use builder::SchemaBuilder;
pub use canonical::{content_hash, normalize_default, normalize_sql, normalize_type};
pub use constraint::{
    Canonical, CheckConstraint, ConstraintKind, ForeignKey, IndexDef, PrimaryKey,
    ReferentialAction, TriggerDef, TriggerEvent, TriggerTiming, UniqueConstraint,
};
pub use error::{SchemaError, SchemaResult};
pub use model::{
    ColumnInfo, DefaultValue, EnumInfo, ExtensionInfo, IdentityKind, SchemaModel, TableInfo,
};
pub use priority::table_priorities;
pub use validator::{validate_model, validate_schema_names};
