//! Table-level objects: keys, constraints, indexes and triggers.
//!
//! Every definition knows how to render its canonical form (which excludes
//! the object's name) and the content hash derived from it.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::canonical::{content_hash, normalize_sql};

/// Category of a table constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    /// Primary key.
    PrimaryKey,
    /// Unique constraint.
    Unique,
    /// Check constraint.
    Check,
    /// Foreign key.
    ForeignKey,
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::PrimaryKey => "primary key",
            Self::Unique => "unique constraint",
            Self::Check => "check constraint",
            Self::ForeignKey => "foreign key",
        };
        f.write_str(label)
    }
}

/// Primary key definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryKey {
    /// Constraint name.
    pub name: String,
    /// Key columns, in order.
    pub columns: Vec<String>,
}

impl PrimaryKey {
    /// Create a primary key.
    pub fn new<I, S>(name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }
}

/// Unique constraint definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniqueConstraint {
    /// Constraint name.
    pub name: String,
    /// Constrained columns, in order.
    pub columns: Vec<String>,
    /// `NULLS NOT DISTINCT`.
    #[serde(default)]
    pub nulls_not_distinct: bool,
}

impl UniqueConstraint {
    /// Create a unique constraint.
    pub fn new<I, S>(name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            nulls_not_distinct: false,
        }
    }

    /// Treat NULLs as equal values.
    pub fn nulls_not_distinct(mut self) -> Self {
        self.nulls_not_distinct = true;
        self
    }
}

/// Check constraint definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckConstraint {
    /// Constraint name.
    pub name: String,
    /// Boolean SQL expression.
    pub expression: String,
}

impl CheckConstraint {
    /// Create a check constraint.
    pub fn new(name: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expression: expression.into(),
        }
    }
}

/// Referential action for foreign keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferentialAction {
    /// `NO ACTION` (the database default).
    #[default]
    NoAction,
    /// `RESTRICT`.
    Restrict,
    /// `CASCADE`.
    Cascade,
    /// `SET NULL`.
    SetNull,
    /// `SET DEFAULT`.
    SetDefault,
}

impl ReferentialAction {
    /// SQL keyword(s) for this action.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::NoAction => "NO ACTION",
            Self::Restrict => "RESTRICT",
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
        }
    }
}

/// Foreign key definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    /// Constraint name.
    pub name: String,
    /// Referencing columns.
    pub columns: Vec<String>,
    /// Schema of the referenced table, when it differs from the owning schema.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referenced_schema: Option<String>,
    /// Referenced table.
    pub referenced_table: String,
    /// Referenced columns.
    pub referenced_columns: Vec<String>,
    /// `ON DELETE` action.
    #[serde(default)]
    pub on_delete: ReferentialAction,
    /// `ON UPDATE` action.
    #[serde(default)]
    pub on_update: ReferentialAction,
}

impl ForeignKey {
    /// Create a foreign key referencing a table in the same schema.
    pub fn new<I, S, J, T>(
        name: impl Into<String>,
        columns: I,
        referenced_table: impl Into<String>,
        referenced_columns: J,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        J: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            referenced_schema: None,
            referenced_table: referenced_table.into(),
            referenced_columns: referenced_columns.into_iter().map(Into::into).collect(),
            on_delete: ReferentialAction::NoAction,
            on_update: ReferentialAction::NoAction,
        }
    }

    /// Reference a table in another schema.
    pub fn in_schema(mut self, schema: impl Into<String>) -> Self {
        self.referenced_schema = Some(schema.into());
        self
    }

    /// Set the `ON DELETE` action.
    pub fn on_delete(mut self, action: ReferentialAction) -> Self {
        self.on_delete = action;
        self
    }

    /// Set the `ON UPDATE` action.
    pub fn on_update(mut self, action: ReferentialAction) -> Self {
        self.on_update = action;
        self
    }

    /// Whether the referenced table lives in `schema`.
    pub fn references_schema(&self, schema: &str) -> bool {
        self.referenced_schema.as_deref().is_none_or(|s| s == schema)
    }
}

/// Index definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDef {
    /// Index name.
    pub name: String,
    /// Indexed columns or expressions.
    pub columns: Vec<String>,
    /// Unique index.
    #[serde(default)]
    pub unique: bool,
    /// Access method (`btree`, `gin`, `hash`, ...).
    #[serde(default = "default_method")]
    pub method: String,
    /// Partial index predicate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicate: Option<String>,
}

fn default_method() -> String {
    "btree".to_string()
}

impl IndexDef {
    /// Create a btree index.
    pub fn new<I, S>(name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            unique: false,
            method: default_method(),
            predicate: None,
        }
    }

    /// Make the index unique.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Use a specific access method.
    pub fn using(mut self, method: impl Into<String>) -> Self {
        self.method = method.into().to_lowercase();
        self
    }

    /// Restrict the index to rows matching `predicate`.
    pub fn partial(mut self, predicate: impl Into<String>) -> Self {
        self.predicate = Some(predicate.into());
        self
    }
}

/// When a trigger fires relative to the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerTiming {
    /// `BEFORE`.
    Before,
    /// `AFTER`.
    After,
    /// `INSTEAD OF`.
    InsteadOf,
}

impl TriggerTiming {
    /// SQL keyword(s).
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Before => "BEFORE",
            Self::After => "AFTER",
            Self::InsteadOf => "INSTEAD OF",
        }
    }
}

/// Event that fires a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerEvent {
    /// `INSERT`.
    Insert,
    /// `UPDATE`.
    Update,
    /// `DELETE`.
    Delete,
    /// `TRUNCATE`.
    Truncate,
}

impl TriggerEvent {
    /// SQL keyword.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Truncate => "TRUNCATE",
        }
    }
}

/// Trigger definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerDef {
    /// Trigger name.
    pub name: String,
    /// Firing time.
    pub timing: TriggerTiming,
    /// Firing events.
    pub events: Vec<TriggerEvent>,
    /// `FOR EACH ROW` when true, `FOR EACH STATEMENT` otherwise.
    #[serde(default = "default_true")]
    pub for_each_row: bool,
    /// Function call executed by the trigger, e.g. `audit.log_change()`.
    pub function: String,
    /// Optional `WHEN` condition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

fn default_true() -> bool {
    true
}

impl TriggerDef {
    /// Create a row-level trigger.
    pub fn new<I>(
        name: impl Into<String>,
        timing: TriggerTiming,
        events: I,
        function: impl Into<String>,
    ) -> Self
    where
        I: IntoIterator<Item = TriggerEvent>,
    {
        let mut events: Vec<TriggerEvent> = events.into_iter().collect();
        events.sort();
        events.dedup();
        Self {
            name: name.into(),
            timing,
            events,
            for_each_row: true,
            function: function.into(),
            condition: None,
        }
    }

    /// Fire once per statement instead of once per row.
    pub fn for_each_statement(mut self) -> Self {
        self.for_each_row = false;
        self
    }

    /// Only fire when `condition` holds.
    pub fn when(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }
}

/// A hashable table object.
pub trait Canonical {
    /// Name of the object in the database.
    fn name(&self) -> &str;

    /// Canonical, name-independent definition.
    fn canonical(&self) -> String;

    /// Content hash of the canonical definition.
    fn content_hash(&self) -> String {
        content_hash(&self.canonical())
    }
}

fn column_list(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| normalize_sql(c))
        .collect::<Vec<_>>()
        .join(",")
}

impl Canonical for PrimaryKey {
    fn name(&self) -> &str {
        &self.name
    }

    fn canonical(&self) -> String {
        format!("pk({})", column_list(&self.columns))
    }
}

impl Canonical for UniqueConstraint {
    fn name(&self) -> &str {
        &self.name
    }

    fn canonical(&self) -> String {
        format!(
            "unique({}){}",
            column_list(&self.columns),
            if self.nulls_not_distinct { " nnd" } else { "" }
        )
    }
}

impl Canonical for CheckConstraint {
    fn name(&self) -> &str {
        &self.name
    }

    fn canonical(&self) -> String {
        format!("check({})", normalize_sql(&self.expression))
    }
}

impl Canonical for ForeignKey {
    fn name(&self) -> &str {
        &self.name
    }

    fn canonical(&self) -> String {
        format!(
            "fk({})->{}{}({}) d:{} u:{}",
            column_list(&self.columns),
            self.referenced_schema
                .as_deref()
                .map(|s| format!("{}.", s))
                .unwrap_or_default(),
            self.referenced_table,
            column_list(&self.referenced_columns),
            self.on_delete.as_sql(),
            self.on_update.as_sql()
        )
    }
}

impl Canonical for IndexDef {
    fn name(&self) -> &str {
        &self.name
    }

    fn canonical(&self) -> String {
        format!(
            "{}index using {}({}){}",
            if self.unique { "unique " } else { "" },
            self.method.to_lowercase(),
            column_list(&self.columns),
            self.predicate
                .as_deref()
                .map(|p| format!(" where {}", normalize_sql(p)))
                .unwrap_or_default()
        )
    }
}

impl Canonical for TriggerDef {
    fn name(&self) -> &str {
        &self.name
    }

    fn canonical(&self) -> String {
        let events: Vec<&str> = self.events.iter().map(|e| e.as_sql()).collect();
        format!(
            "trigger {} {} {} {}{}",
            self.timing.as_sql(),
            events.join("|"),
            if self.for_each_row { "row" } else { "statement" },
            normalize_sql(&self.function),
            self.condition
                .as_deref()
                .map(|c| format!(" when {}", normalize_sql(c)))
                .unwrap_or_default()
        )
    }
}
