//! Structural diff between two schema snapshots.
//!
//! [`diff`] walks the remote (current) and local (desired) trees in a fixed
//! order and emits one [`DiffEntry`] per difference. Keys present in both
//! trees recurse; keys only in `remote` are `Remove`d; keys only in `local`
//! are `Create`d. Constraint, index and trigger maps are keyed by content
//! hash, so an equal hash with a different name is a `Change` (rename).

use std::fmt;

use indexmap::IndexMap;
use schemashift_schema::{
    Canonical, CheckConstraint, ColumnInfo, ConstraintKind, EnumInfo, ExtensionInfo, ForeignKey,
    IndexDef, PrimaryKey, SchemaModel, TableInfo, TriggerDef, UniqueConstraint,
};

/// Kind of difference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiffKind {
    /// Present only in the local schema.
    Create,
    /// Present only in the remote schema.
    Remove,
    /// Present in both with a different value.
    Change,
}

/// Column attribute compared by the diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnAttr {
    /// Normalized data type, or the enum it names.
    DataType,
    /// `NULL` / `NOT NULL`.
    Nullable,
    /// Default expression, compared by hash.
    Default,
    /// `GENERATED ... AS IDENTITY`.
    Identity,
}

impl fmt::Display for ColumnAttr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::DataType => "dataType",
            Self::Nullable => "nullable",
            Self::Default => "default",
            Self::Identity => "identity",
        })
    }
}

/// What a diff entry is about.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DiffTarget {
    /// The schema itself.
    Schema { schema: String },
    /// An extension.
    Extension { name: String },
    /// An enum type.
    Enum { name: String },
    /// One label of an enum type.
    EnumValue { name: String, value: String },
    /// A table. `Change` means rename.
    Table { table: String },
    /// A column. `Change` means rename.
    Column { table: String, column: String },
    /// One attribute of a column present on both sides.
    ColumnAttr {
        table: String,
        column: String,
        attr: ColumnAttr,
    },
    /// A primary key, unique, check or foreign key constraint.
    Constraint {
        table: String,
        kind: ConstraintKind,
        hash: String,
    },
    /// An index.
    Index { table: String, hash: String },
    /// A trigger.
    Trigger { table: String, hash: String },
}

impl DiffTarget {
    /// Table this entry belongs to, if any.
    pub fn table(&self) -> Option<&str> {
        match self {
            Self::Table { table }
            | Self::Column { table, .. }
            | Self::ColumnAttr { table, .. }
            | Self::Constraint { table, .. }
            | Self::Index { table, .. }
            | Self::Trigger { table, .. } => Some(table),
            _ => None,
        }
    }
}

impl fmt::Display for DiffTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Schema { schema } => write!(f, "schema {}", schema),
            Self::Extension { name } => write!(f, "extension {}", name),
            Self::Enum { name } => write!(f, "enum {}", name),
            Self::EnumValue { name, value } => write!(f, "enum {} value '{}'", name, value),
            Self::Table { table } => write!(f, "table {}", table),
            Self::Column { table, column } => write!(f, "column {}.{}", table, column),
            Self::ColumnAttr {
                table,
                column,
                attr,
            } => write!(f, "column {}.{} {}", table, column, attr),
            Self::Constraint { table, kind, hash } => write!(f, "{} {}#{}", kind, table, hash),
            Self::Index { table, hash } => write!(f, "index {}#{}", table, hash),
            Self::Trigger { table, hash } => write!(f, "trigger {}#{}", table, hash),
        }
    }
}

/// Value carried by a diff entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffValue {
    /// A name or version.
    Name(String),
    Extension(ExtensionInfo),
    Enum(EnumInfo),
    Table(TableInfo),
    Column(ColumnInfo),
    PrimaryKey(PrimaryKey),
    Unique(UniqueConstraint),
    Check(CheckConstraint),
    ForeignKey(ForeignKey),
    Index(IndexDef),
    Trigger(TriggerDef),
}

impl DiffValue {
    /// The carried name, for `Name` values.
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Self::Name(name) => Some(name),
            _ => None,
        }
    }
}

/// One difference between the remote and local schema.
///
/// `value` is the local side (absent for `Remove`), `old_value` the remote
/// side (absent for `Create`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffEntry {
    /// Create, remove or change.
    pub kind: DiffKind,
    /// What differs.
    pub target: DiffTarget,
    /// Local value.
    pub value: Option<DiffValue>,
    /// Remote value.
    pub old_value: Option<DiffValue>,
}

impl DiffEntry {
    /// Entry for an object only in the local schema.
    pub fn create(target: DiffTarget, value: DiffValue) -> Self {
        Self {
            kind: DiffKind::Create,
            target,
            value: Some(value),
            old_value: None,
        }
    }

    /// Entry for an object only in the remote schema.
    pub fn remove(target: DiffTarget, old_value: DiffValue) -> Self {
        Self {
            kind: DiffKind::Remove,
            target,
            value: None,
            old_value: Some(old_value),
        }
    }

    /// Entry for an object present on both sides with different values.
    pub fn change(target: DiffTarget, value: DiffValue, old_value: DiffValue) -> Self {
        Self {
            kind: DiffKind::Change,
            target,
            value: Some(value),
            old_value: Some(old_value),
        }
    }

    /// Whether this is a `kind` entry for exactly `target`.
    pub fn is(&self, kind: DiffKind, target: &DiffTarget) -> bool {
        self.kind == kind && &self.target == target
    }
}

impl fmt::Display for DiffEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            DiffKind::Create => "+",
            DiffKind::Remove => "-",
            DiffKind::Change => "~",
        };
        write!(f, "{} {}", kind, self.target)
    }
}

/// Compute the differences that turn `remote` into `local`.
pub fn diff(remote: &SchemaModel, local: &SchemaModel) -> Vec<DiffEntry> {
    let mut out = Vec::new();

    match (remote.exists, local.exists) {
        (false, true) => out.push(DiffEntry::create(
            DiffTarget::Schema {
                schema: local.schema_name.clone(),
            },
            DiffValue::Name(local.schema_name.clone()),
        )),
        (true, false) => out.push(DiffEntry::remove(
            DiffTarget::Schema {
                schema: remote.schema_name.clone(),
            },
            DiffValue::Name(remote.schema_name.clone()),
        )),
        _ => {}
    }

    diff_extensions(&mut out, &remote.extensions, &local.extensions);
    diff_enums(&mut out, &remote.enums, &local.enums);

    for (name, remote_table) in &remote.tables {
        match local.tables.get(name) {
            Some(local_table) => diff_table(&mut out, name, remote_table, local_table),
            None => out.push(DiffEntry::remove(
                DiffTarget::Table {
                    table: name.clone(),
                },
                DiffValue::Table(remote_table.clone()),
            )),
        }
    }
    for (name, local_table) in &local.tables {
        if !remote.tables.contains_key(name) {
            create_table(&mut out, local_table);
        }
    }

    out
}

/// Entries for a table only in the local schema.
///
/// Columns and constraints are part of the table definition; indexes and
/// triggers get their own entries.
pub(crate) fn create_table(out: &mut Vec<DiffEntry>, table: &TableInfo) {
    out.push(DiffEntry::create(
        DiffTarget::Table {
            table: table.name.clone(),
        },
        DiffValue::Table(table.clone()),
    ));
    for (hash, index) in &table.indexes {
        out.push(DiffEntry::create(
            DiffTarget::Index {
                table: table.name.clone(),
                hash: hash.clone(),
            },
            DiffValue::Index(index.clone()),
        ));
    }
    for (hash, trigger) in &table.triggers {
        out.push(DiffEntry::create(
            DiffTarget::Trigger {
                table: table.name.clone(),
                hash: hash.clone(),
            },
            DiffValue::Trigger(trigger.clone()),
        ));
    }
}

fn diff_extensions(
    out: &mut Vec<DiffEntry>,
    remote: &IndexMap<String, ExtensionInfo>,
    local: &IndexMap<String, ExtensionInfo>,
) {
    for (name, old) in remote {
        match local.get(name) {
            None => out.push(DiffEntry::remove(
                DiffTarget::Extension { name: name.clone() },
                DiffValue::Extension(old.clone()),
            )),
            // An unpinned local extension accepts whatever version is installed.
            Some(new) => {
                if let (Some(v_new), Some(v_old)) = (&new.version, &old.version) {
                    if v_new != v_old {
                        out.push(DiffEntry::change(
                            DiffTarget::Extension { name: name.clone() },
                            DiffValue::Extension(new.clone()),
                            DiffValue::Extension(old.clone()),
                        ));
                    }
                }
            }
        }
    }
    for (name, new) in local {
        if !remote.contains_key(name) {
            out.push(DiffEntry::create(
                DiffTarget::Extension { name: name.clone() },
                DiffValue::Extension(new.clone()),
            ));
        }
    }
}

fn diff_enums(
    out: &mut Vec<DiffEntry>,
    remote: &IndexMap<String, EnumInfo>,
    local: &IndexMap<String, EnumInfo>,
) {
    for (name, old) in remote {
        let Some(new) = local.get(name) else {
            out.push(DiffEntry::remove(
                DiffTarget::Enum { name: name.clone() },
                DiffValue::Enum(old.clone()),
            ));
            continue;
        };

        for value in old.values.iter().filter(|v| !new.values.contains(v)) {
            out.push(DiffEntry::remove(
                DiffTarget::EnumValue {
                    name: name.clone(),
                    value: value.clone(),
                },
                DiffValue::Enum(old.clone()),
            ));
        }
        // Added labels also carry the remote type so the change can be undone.
        for value in new.values.iter().filter(|v| !old.values.contains(v)) {
            out.push(DiffEntry {
                kind: DiffKind::Create,
                target: DiffTarget::EnumValue {
                    name: name.clone(),
                    value: value.clone(),
                },
                value: Some(DiffValue::Enum(new.clone())),
                old_value: Some(DiffValue::Enum(old.clone())),
            });
        }
    }
    for (name, new) in local {
        if !remote.contains_key(name) {
            out.push(DiffEntry::create(
                DiffTarget::Enum { name: name.clone() },
                DiffValue::Enum(new.clone()),
            ));
        }
    }
}

/// Entries for a table present on both sides. `table` is the local name.
pub(crate) fn diff_table(out: &mut Vec<DiffEntry>, table: &str, remote: &TableInfo, local: &TableInfo) {
    for (name, old) in &remote.columns {
        match local.columns.get(name) {
            Some(new) => diff_column(out, table, old, new),
            None => out.push(DiffEntry::remove(
                DiffTarget::Column {
                    table: table.to_string(),
                    column: name.clone(),
                },
                DiffValue::Column(old.clone()),
            )),
        }
    }
    for (name, new) in &local.columns {
        if !remote.columns.contains_key(name) {
            out.push(DiffEntry::create(
                DiffTarget::Column {
                    table: table.to_string(),
                    column: name.clone(),
                },
                DiffValue::Column(new.clone()),
            ));
        }
    }

    let constraint = |kind: ConstraintKind| {
        move |hash: &str| DiffTarget::Constraint {
            table: table.to_string(),
            kind,
            hash: hash.to_string(),
        }
    };

    diff_objects(
        out,
        &remote.primary_key_map(),
        &local.primary_key_map(),
        constraint(ConstraintKind::PrimaryKey),
        DiffValue::PrimaryKey,
    );
    diff_objects(
        out,
        &remote.unique_constraints,
        &local.unique_constraints,
        constraint(ConstraintKind::Unique),
        DiffValue::Unique,
    );
    diff_objects(
        out,
        &remote.check_constraints,
        &local.check_constraints,
        constraint(ConstraintKind::Check),
        DiffValue::Check,
    );
    diff_objects(
        out,
        &remote.foreign_keys,
        &local.foreign_keys,
        constraint(ConstraintKind::ForeignKey),
        DiffValue::ForeignKey,
    );
    diff_objects(
        out,
        &remote.indexes,
        &local.indexes,
        |hash| DiffTarget::Index {
            table: table.to_string(),
            hash: hash.to_string(),
        },
        DiffValue::Index,
    );
    diff_objects(
        out,
        &remote.triggers,
        &local.triggers,
        |hash| DiffTarget::Trigger {
            table: table.to_string(),
            hash: hash.to_string(),
        },
        DiffValue::Trigger,
    );
}

/// Attribute entries for a column present on both sides. `table` is the local name.
pub(crate) fn diff_column(out: &mut Vec<DiffEntry>, table: &str, old: &ColumnInfo, new: &ColumnInfo) {
    let mut attrs = Vec::new();
    if !new.same_type_as(old) {
        attrs.push(ColumnAttr::DataType);
    }
    if new.nullable != old.nullable {
        attrs.push(ColumnAttr::Nullable);
    }
    if !new.same_default_as(old) {
        attrs.push(ColumnAttr::Default);
    }
    if new.identity != old.identity {
        attrs.push(ColumnAttr::Identity);
    }

    for attr in attrs {
        out.push(DiffEntry::change(
            DiffTarget::ColumnAttr {
                table: table.to_string(),
                column: new.name.clone(),
                attr,
            },
            DiffValue::Column(new.clone()),
            DiffValue::Column(old.clone()),
        ));
    }
}

fn diff_objects<T, F, W>(
    out: &mut Vec<DiffEntry>,
    remote: &IndexMap<String, T>,
    local: &IndexMap<String, T>,
    target: F,
    wrap: W,
) where
    T: Canonical + Clone,
    F: Fn(&str) -> DiffTarget,
    W: Fn(T) -> DiffValue,
{
    for (hash, old) in remote {
        match local.get(hash) {
            Some(new) if new.name() != old.name() => out.push(DiffEntry::change(
                target(hash.as_str()),
                wrap(new.clone()),
                wrap(old.clone()),
            )),
            Some(_) => {}
            None => out.push(DiffEntry::remove(target(hash.as_str()), wrap(old.clone()))),
        }
    }
    for (hash, new) in local {
        if !remote.contains_key(hash) {
            out.push(DiffEntry::create(target(hash.as_str()), wrap(new.clone())));
        }
    }
}
