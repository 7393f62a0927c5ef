//! Schema snapshot types.
//!
//! A [`SchemaModel`] is produced twice per planning run: once from the
//! declared schema (local) and once from introspecting the live database
//! (remote). Maps use [`IndexMap`] so iteration order is declaration order,
//! which keeps diff output deterministic.

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::builder::SchemaBuilder;
use crate::canonical::{content_hash, normalize_default, normalize_type};
use crate::constraint::{
    Canonical, CheckConstraint, ForeignKey, IndexDef, PrimaryKey, TriggerDef, UniqueConstraint,
};
use crate::error::{SchemaError, SchemaResult};
use crate::priority::table_priorities;

/// Identity column behaviour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityKind {
    /// Not an identity column.
    #[default]
    None,
    /// `GENERATED ALWAYS AS IDENTITY`.
    Always,
    /// `GENERATED BY DEFAULT AS IDENTITY`.
    ByDefault,
}

impl IdentityKind {
    /// The `GENERATED ...` keyword for this kind, if any.
    pub fn generated_keyword(&self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Always => Some("ALWAYS"),
            Self::ByDefault => Some("BY DEFAULT"),
        }
    }
}

/// A column default together with the hash of its normalized form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultValue {
    /// SQL expression as declared or introspected.
    pub expression: String,
    /// Hash of the normalized expression.
    pub hash: String,
}

impl DefaultValue {
    /// Create a default value from a SQL expression.
    pub fn new(expression: impl Into<String>) -> Self {
        let expression = expression.into();
        let hash = content_hash(&normalize_default(&expression));
        Self { expression, hash }
    }

    /// Whether two defaults are semantically equal.
    pub fn same_as(&self, other: &DefaultValue) -> bool {
        self.hash == other.hash
    }
}

/// Column definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,
    /// Data type (normalized, e.g. `character varying(255)`).
    pub data_type: String,
    /// Whether NULL is allowed.
    pub nullable: bool,
    /// Default expression.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<DefaultValue>,
    /// Identity behaviour.
    #[serde(default)]
    pub identity: IdentityKind,
    /// Whether `data_type` names an enum declared in the same schema.
    #[serde(default)]
    pub is_enum: bool,
}

impl ColumnInfo {
    /// Create a nullable column.
    pub fn new(name: impl Into<String>, data_type: impl AsRef<str>) -> Self {
        Self {
            name: name.into(),
            data_type: normalize_type(data_type.as_ref()),
            nullable: true,
            default: None,
            identity: IdentityKind::None,
            is_enum: false,
        }
    }

    /// Create a column typed by the enum `enum_name`.
    pub fn enumeration(name: impl Into<String>, enum_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: enum_name.into(),
            nullable: true,
            default: None,
            identity: IdentityKind::None,
            is_enum: true,
        }
    }

    /// Disallow NULL.
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Set the default expression.
    pub fn default_value(mut self, expression: impl Into<String>) -> Self {
        self.default = Some(DefaultValue::new(expression));
        self
    }

    /// Make this an identity column.
    pub fn identity(mut self, kind: IdentityKind) -> Self {
        self.identity = kind;
        if kind != IdentityKind::None {
            self.nullable = false;
        }
        self
    }

    /// Data type compared in its normalized form.
    pub fn same_type_as(&self, other: &ColumnInfo) -> bool {
        if self.is_enum || other.is_enum {
            return self.is_enum == other.is_enum && self.data_type == other.data_type;
        }
        normalize_type(&self.data_type) == normalize_type(&other.data_type)
    }

    /// Whether the two defaults are semantically equal.
    pub fn same_default_as(&self, other: &ColumnInfo) -> bool {
        match (&self.default, &other.default) {
            (None, None) => true,
            (Some(a), Some(b)) => a.same_as(b),
            _ => false,
        }
    }
}

/// Enum type definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumInfo {
    /// Type name.
    pub name: String,
    /// Labels, in sort order.
    pub values: Vec<String>,
}

impl EnumInfo {
    /// Create an enum type.
    pub fn new<I, S>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

/// Installed extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionInfo {
    /// Extension name.
    pub name: String,
    /// Pinned version, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl ExtensionInfo {
    /// Create an extension reference without a pinned version.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
        }
    }

    /// Pin a version.
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }
}

/// Table definition.
///
/// Constraint, index and trigger maps are keyed by content hash, see
/// [`crate::canonical`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    /// Table name.
    pub name: String,
    /// Columns in declaration order.
    pub columns: IndexMap<String, ColumnInfo>,
    /// Primary key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<PrimaryKey>,
    /// Unique constraints by hash.
    #[serde(default)]
    pub unique_constraints: IndexMap<String, UniqueConstraint>,
    /// Check constraints by hash.
    #[serde(default)]
    pub check_constraints: IndexMap<String, CheckConstraint>,
    /// Foreign keys by hash.
    #[serde(default)]
    pub foreign_keys: IndexMap<String, ForeignKey>,
    /// Indexes by hash.
    #[serde(default)]
    pub indexes: IndexMap<String, IndexDef>,
    /// Triggers by hash.
    #[serde(default)]
    pub triggers: IndexMap<String, TriggerDef>,
}

impl TableInfo {
    /// Create an empty table.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Add a column.
    pub fn column(mut self, column: ColumnInfo) -> Self {
        self.columns.insert(column.name.clone(), column);
        self
    }

    /// Set the primary key.
    pub fn primary_key(mut self, pk: PrimaryKey) -> Self {
        self.primary_key = Some(pk);
        self
    }

    /// Add a unique constraint.
    pub fn unique(mut self, constraint: UniqueConstraint) -> Self {
        self.unique_constraints
            .insert(constraint.content_hash(), constraint);
        self
    }

    /// Add a check constraint.
    pub fn check(mut self, constraint: CheckConstraint) -> Self {
        self.check_constraints
            .insert(constraint.content_hash(), constraint);
        self
    }

    /// Add a foreign key.
    pub fn foreign_key(mut self, fk: ForeignKey) -> Self {
        self.foreign_keys.insert(fk.content_hash(), fk);
        self
    }

    /// Add an index.
    pub fn index(mut self, index: IndexDef) -> Self {
        self.indexes.insert(index.content_hash(), index);
        self
    }

    /// Add a trigger.
    pub fn trigger(mut self, trigger: TriggerDef) -> Self {
        self.triggers.insert(trigger.content_hash(), trigger);
        self
    }

    /// Primary key keyed by its hash, so it diffs like the other constraint maps.
    pub fn primary_key_map(&self) -> IndexMap<String, PrimaryKey> {
        self.primary_key
            .iter()
            .map(|pk| (pk.content_hash(), pk.clone()))
            .collect()
    }

    /// Tables in `schema` referenced by this table's foreign keys.
    pub fn referenced_tables<'a>(&'a self, schema: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.foreign_keys
            .values()
            .filter(move |fk| fk.references_schema(schema))
            .map(|fk| fk.referenced_table.as_str())
    }

    /// Check that every column referenced by keys and constraints exists.
    pub fn validate_columns(&self) -> SchemaResult<()> {
        let check = |object: &str, columns: &[String]| -> SchemaResult<()> {
            for column in columns {
                if !self.columns.contains_key(column) {
                    return Err(SchemaError::unknown_column(&self.name, object, column));
                }
            }
            Ok(())
        };

        if let Some(pk) = &self.primary_key {
            check(&pk.name, &pk.columns)?;
        }
        for uc in self.unique_constraints.values() {
            check(&uc.name, &uc.columns)?;
        }
        for fk in self.foreign_keys.values() {
            check(&fk.name, &fk.columns)?;
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

/// A complete schema snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaModel {
    /// Database schema name (e.g. `public`).
    pub schema_name: String,
    /// Whether the schema itself exists (remote) or should exist (local).
    #[serde(default = "default_true")]
    pub exists: bool,
    /// Tables by name.
    #[serde(default)]
    pub tables: IndexMap<String, TableInfo>,
    /// Enum types by name.
    #[serde(default)]
    pub enums: IndexMap<String, EnumInfo>,
    /// Extensions by name.
    #[serde(default)]
    pub extensions: IndexMap<String, ExtensionInfo>,
    /// Table names in foreign-key-respecting creation order.
    #[serde(default)]
    pub table_priorities: Vec<String>,
}

impl SchemaModel {
    /// Create an empty, existing schema.
    pub fn new(schema_name: impl Into<String>) -> Self {
        Self {
            schema_name: schema_name.into(),
            exists: true,
            tables: IndexMap::new(),
            enums: IndexMap::new(),
            extensions: IndexMap::new(),
            table_priorities: Vec::new(),
        }
    }

    /// Snapshot of a schema that does not exist in the database.
    pub fn missing(schema_name: impl Into<String>) -> Self {
        Self {
            exists: false,
            ..Self::new(schema_name)
        }
    }

    /// Start building a schema.
    pub fn builder(schema_name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder::new(schema_name)
    }

    /// Get a table by name.
    pub fn table(&self, name: &str) -> Option<&TableInfo> {
        self.tables.get(name)
    }

    /// Compute a fresh foreign-key-respecting table order.
    pub fn compute_table_priorities(&self) -> Vec<String> {
        table_priorities(self)
    }

    /// Recompute and store [`Self::table_priorities`].
    pub fn refresh_priorities(&mut self) {
        self.table_priorities = self.compute_table_priorities();
    }

    /// Position of `table` in the creation order.
    pub fn priority_of(&self, table: &str) -> Option<usize> {
        self.table_priorities.iter().position(|t| t == table)
    }

    /// Columns typed by the enum `enum_name`, as `(table, column)` pairs.
    pub fn enum_columns(&self, enum_name: &str) -> Vec<(&TableInfo, &ColumnInfo)> {
        self.tables
            .values()
            .flat_map(|t| t.columns.values().map(move |c| (t, c)))
            .filter(|(_, c)| c.is_enum && c.data_type == enum_name)
            .collect()
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> SchemaResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> SchemaResult<Self> {
        let mut model: SchemaModel = serde_json::from_str(json)?;
        if model.table_priorities.is_empty() && !model.tables.is_empty() {
            model.refresh_priorities();
        }
        Ok(model)
    }

    /// Load a snapshot file.
    pub fn load(path: impl AsRef<Path>) -> SchemaResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| SchemaError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Write a snapshot file.
    pub fn save(&self, path: impl AsRef<Path>) -> SchemaResult<()> {
        let path = path.as_ref();
        std::fs::write(path, self.to_json()?).map_err(|source| SchemaError::Io {
            path: path.display().to_string(),
            source,
        })
    }
}
