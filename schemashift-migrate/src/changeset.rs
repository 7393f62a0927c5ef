//! Changesets: reversible units of DDL with a priority and a deployment phase.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MigrationError;

/// Deployment-safety phase of a changeset or migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Additive changes that old application code tolerates.
    Expand,
    /// In-place changes to existing objects.
    Alter,
    /// Removals, run once no deployed code depends on the old shape.
    Contract,
    /// Operator-scheduled data migrations.
    Data,
}

impl Phase {
    /// All phases.
    pub const ALL: [Phase; 4] = [Phase::Expand, Phase::Alter, Phase::Contract, Phase::Data];

    /// The order in which a deployment applies phases. `Data` is scheduled by the operator.
    ///
    /// The runner does not enforce this order.
    pub const DEPLOY_ORDER: [Phase; 3] = [Phase::Expand, Phase::Alter, Phase::Contract];

    /// Lowercase name, used for directories and bookkeeping tables.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Expand => "expand",
            Self::Alter => "alter",
            Self::Contract => "contract",
            Self::Data => "data",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "expand" => Ok(Self::Expand),
            "alter" => Ok(Self::Alter),
            "contract" => Ok(Self::Contract),
            "data" => Ok(Self::Data),
            other => Err(MigrationError::invalid_migration(format!(
                "unknown phase '{}'",
                other
            ))),
        }
    }
}

/// Priority tiers.
///
/// Lower runs first. Tier groups are 100 apart and kinds within a group are
/// 10 apart, so every [`ChangesetKind`] has its own priority.
pub mod priority {
    /// `CREATE SCHEMA`.
    pub const CREATE_SCHEMA: u32 = 0;
    /// `CREATE EXTENSION`.
    pub const CREATE_EXTENSION: u32 = 1;
    /// `CREATE TYPE ... AS ENUM`.
    pub const CREATE_ENUM: u32 = 2;
    /// `ALTER TYPE ... ADD VALUE`.
    pub const ADD_ENUM_VALUE: u32 = 3;

    /// Index drop.
    pub const DROP_INDEX: u32 = 100;
    /// Foreign key drop.
    pub const DROP_FOREIGN_KEY: u32 = 110;
    /// Unique constraint drop.
    pub const DROP_UNIQUE: u32 = 120;
    /// Check constraint drop.
    pub const DROP_CHECK: u32 = 130;

    /// Table rename.
    pub const RENAME_TABLE: u32 = 200;
    /// Renames of objects named after a renamed table.
    pub const RENAME_TABLE_DEPENDENTS: u32 = 210;
    /// Column rename.
    pub const RENAME_COLUMN: u32 = 220;

    /// Trigger drop.
    pub const DROP_TRIGGER: u32 = 300;
    /// Primary key drop.
    pub const DROP_PRIMARY_KEY: u32 = 310;
    /// Column drop.
    pub const DROP_COLUMN: u32 = 320;
    /// Table drop.
    pub const DROP_TABLE: u32 = 330;

    /// Table create.
    pub const CREATE_TABLE: u32 = 400;
    /// Column add.
    pub const ADD_COLUMN: u32 = 410;

    /// Column type change.
    pub const ALTER_COLUMN_TYPE: u32 = 510;
    /// Column default change.
    pub const ALTER_COLUMN_DEFAULT: u32 = 520;
    /// Column identity change.
    pub const ALTER_COLUMN_IDENTITY: u32 = 530;
    /// Column nullability change.
    pub const ALTER_COLUMN_NULLABLE: u32 = 540;
    /// Enum value removal (type recreation).
    pub const REMOVE_ENUM_VALUE: u32 = 550;

    /// Primary key create.
    pub const CREATE_PRIMARY_KEY: u32 = 600;
    /// Index create.
    pub const CREATE_INDEX: u32 = 610;
    /// Trigger create.
    pub const CREATE_TRIGGER: u32 = 620;
    /// Unique constraint create.
    pub const CREATE_UNIQUE: u32 = 630;
    /// Foreign key create.
    pub const CREATE_FOREIGN_KEY: u32 = 640;
    /// Check constraint create.
    pub const CREATE_CHECK: u32 = 650;

    /// Index rename.
    pub const RENAME_INDEX: u32 = 700;
    /// Constraint rename.
    pub const RENAME_CONSTRAINT: u32 = 710;
    /// Trigger rename.
    pub const RENAME_TRIGGER: u32 = 720;
    /// `ALTER EXTENSION ... UPDATE`.
    pub const UPDATE_EXTENSION: u32 = 730;

    /// Enum drop.
    pub const DROP_ENUM: u32 = 800;
    /// Extension drop.
    pub const DROP_EXTENSION: u32 = 810;
    /// Schema drop.
    pub const DROP_SCHEMA: u32 = 820;
}

/// What a changeset does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangesetKind {
    /// `CREATE SCHEMA`.
    CreateSchema,
    /// `DROP SCHEMA`.
    DropSchema,
    /// `CREATE EXTENSION`.
    CreateExtension,
    /// `ALTER EXTENSION ... UPDATE TO`.
    UpdateExtension,
    /// `DROP EXTENSION`.
    DropExtension,
    /// `CREATE TYPE ... AS ENUM`.
    CreateEnum,
    /// `ALTER TYPE ... ADD VALUE`.
    AddEnumValue,
    /// Enum recreated without the removed labels.
    RemoveEnumValue,
    /// `DROP TYPE`.
    DropEnum,
    /// New table with its columns and constraints.
    CreateTable,
    /// `DROP TABLE`.
    DropTable,
    /// `ALTER TABLE ... RENAME TO`.
    RenameTable,
    /// Indexes, constraints and triggers following a table rename.
    RenameTableDependents,
    /// `ADD COLUMN`.
    AddColumn,
    /// `DROP COLUMN`.
    DropColumn,
    /// `RENAME COLUMN`.
    RenameColumn,
    /// Column type change.
    AlterColumnType,
    /// Column default set or dropped.
    AlterColumnDefault,
    /// Identity added, changed or dropped.
    AlterColumnIdentity,
    /// `SET NOT NULL` / `DROP NOT NULL`.
    AlterColumnNullable,
    /// Primary key added.
    CreatePrimaryKey,
    /// Primary key dropped.
    DropPrimaryKey,
    /// Unique constraint attached to a prebuilt index.
    CreateUnique,
    /// Unique constraint dropped.
    DropUnique,
    /// Check constraint added.
    CreateCheck,
    /// Check constraint dropped.
    DropCheck,
    /// Foreign key added.
    CreateForeignKey,
    /// Foreign key dropped.
    DropForeignKey,
    /// `RENAME CONSTRAINT`.
    RenameConstraint,
    /// Index created.
    CreateIndex,
    /// Index dropped.
    DropIndex,
    /// `ALTER INDEX ... RENAME TO`.
    RenameIndex,
    /// `CREATE TRIGGER`.
    CreateTrigger,
    /// `DROP TRIGGER`.
    DropTrigger,
    /// `ALTER TRIGGER ... RENAME TO`.
    RenameTrigger,
}

impl ChangesetKind {
    /// Every kind, for exhaustive checks.
    pub const ALL: [ChangesetKind; 35] = [
        Self::CreateSchema,
        Self::DropSchema,
        Self::CreateExtension,
        Self::UpdateExtension,
        Self::DropExtension,
        Self::CreateEnum,
        Self::AddEnumValue,
        Self::RemoveEnumValue,
        Self::DropEnum,
        Self::CreateTable,
        Self::DropTable,
        Self::RenameTable,
        Self::RenameTableDependents,
        Self::AddColumn,
        Self::DropColumn,
        Self::RenameColumn,
        Self::AlterColumnType,
        Self::AlterColumnDefault,
        Self::AlterColumnIdentity,
        Self::AlterColumnNullable,
        Self::CreatePrimaryKey,
        Self::DropPrimaryKey,
        Self::CreateUnique,
        Self::DropUnique,
        Self::CreateCheck,
        Self::DropCheck,
        Self::CreateForeignKey,
        Self::DropForeignKey,
        Self::RenameConstraint,
        Self::CreateIndex,
        Self::DropIndex,
        Self::RenameIndex,
        Self::CreateTrigger,
        Self::DropTrigger,
        Self::RenameTrigger,
    ];

    /// Priority tier of this kind.
    pub fn priority(&self) -> u32 {
        use priority::*;
        match self {
            Self::CreateSchema => CREATE_SCHEMA,
            Self::CreateExtension => CREATE_EXTENSION,
            Self::CreateEnum => CREATE_ENUM,
            Self::AddEnumValue => ADD_ENUM_VALUE,
            Self::DropIndex => DROP_INDEX,
            Self::DropForeignKey => DROP_FOREIGN_KEY,
            Self::DropUnique => DROP_UNIQUE,
            Self::DropCheck => DROP_CHECK,
            Self::RenameTable => RENAME_TABLE,
            Self::RenameTableDependents => RENAME_TABLE_DEPENDENTS,
            Self::RenameColumn => RENAME_COLUMN,
            Self::DropTrigger => DROP_TRIGGER,
            Self::DropPrimaryKey => DROP_PRIMARY_KEY,
            Self::DropColumn => DROP_COLUMN,
            Self::DropTable => DROP_TABLE,
            Self::CreateTable => CREATE_TABLE,
            Self::AddColumn => ADD_COLUMN,
            Self::AlterColumnType => ALTER_COLUMN_TYPE,
            Self::AlterColumnDefault => ALTER_COLUMN_DEFAULT,
            Self::AlterColumnIdentity => ALTER_COLUMN_IDENTITY,
            Self::AlterColumnNullable => ALTER_COLUMN_NULLABLE,
            Self::RemoveEnumValue => REMOVE_ENUM_VALUE,
            Self::CreatePrimaryKey => CREATE_PRIMARY_KEY,
            Self::CreateIndex => CREATE_INDEX,
            Self::CreateTrigger => CREATE_TRIGGER,
            Self::CreateUnique => CREATE_UNIQUE,
            Self::CreateForeignKey => CREATE_FOREIGN_KEY,
            Self::CreateCheck => CREATE_CHECK,
            Self::RenameIndex => RENAME_INDEX,
            Self::RenameConstraint => RENAME_CONSTRAINT,
            Self::RenameTrigger => RENAME_TRIGGER,
            Self::UpdateExtension => UPDATE_EXTENSION,
            Self::DropEnum => DROP_ENUM,
            Self::DropExtension => DROP_EXTENSION,
            Self::DropSchema => DROP_SCHEMA,
        }
    }

    /// camelCase name, as shown in plan summaries.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateSchema => "createSchema",
            Self::DropSchema => "dropSchema",
            Self::CreateExtension => "createExtension",
            Self::UpdateExtension => "updateExtension",
            Self::DropExtension => "dropExtension",
            Self::CreateEnum => "createEnum",
            Self::AddEnumValue => "addEnumValue",
            Self::RemoveEnumValue => "removeEnumValue",
            Self::DropEnum => "dropEnum",
            Self::CreateTable => "createTable",
            Self::DropTable => "dropTable",
            Self::RenameTable => "renameTable",
            Self::RenameTableDependents => "renameTableDependents",
            Self::AddColumn => "addColumn",
            Self::DropColumn => "dropColumn",
            Self::RenameColumn => "renameColumn",
            Self::AlterColumnType => "alterColumnType",
            Self::AlterColumnDefault => "alterColumnDefault",
            Self::AlterColumnIdentity => "alterColumnIdentity",
            Self::AlterColumnNullable => "alterColumnNullable",
            Self::CreatePrimaryKey => "createPrimaryKey",
            Self::DropPrimaryKey => "dropPrimaryKey",
            Self::CreateUnique => "createUnique",
            Self::DropUnique => "dropUnique",
            Self::CreateCheck => "createCheck",
            Self::DropCheck => "dropCheck",
            Self::CreateForeignKey => "createForeignKey",
            Self::DropForeignKey => "dropForeignKey",
            Self::RenameConstraint => "renameConstraint",
            Self::CreateIndex => "createIndex",
            Self::DropIndex => "dropIndex",
            Self::RenameIndex => "renameIndex",
            Self::CreateTrigger => "createTrigger",
            Self::DropTrigger => "dropTrigger",
            Self::RenameTrigger => "renameTrigger",
        }
    }
}

impl fmt::Display for ChangesetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single, fully schema-qualified DDL statement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DdlOp {
    /// Statement text.
    pub sql: String,
}

impl DdlOp {
    /// Wrap a statement.
    pub fn new(sql: impl Into<String>) -> Self {
        Self { sql: sql.into() }
    }
}

impl fmt::Display for DdlOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

impl From<String> for DdlOp {
    fn from(sql: String) -> Self {
        Self { sql }
    }
}

/// Risk annotation attached to a changeset. Never blocks planning by itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Warning {
    /// Data is removed.
    Destructive {
        schema: String,
        table: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        column: Option<String>,
    },
    /// Deployed code using the old name breaks.
    BackwardIncompatible { from: String, to: String },
    /// A NOT NULL column without default is added to a table that may have rows.
    ExistingRowsMayFail { table: String, column: String },
    /// `SET NOT NULL` on a populated column.
    TwoStepNotNull { table: String, column: String },
}

impl Warning {
    /// Human-readable description.
    pub fn message(&self) -> String {
        match self {
            Self::Destructive {
                schema,
                table,
                column: Some(column),
            } => format!(
                "dropping column \"{}\" from \"{}\".\"{}\" permanently deletes its data",
                column, schema, table
            ),
            Self::Destructive {
                schema,
                table,
                column: None,
            } => format!(
                "dropping table \"{}\".\"{}\" permanently deletes its data",
                schema, table
            ),
            Self::BackwardIncompatible { from, to } => format!(
                "renaming \"{}\" to \"{}\" breaks code that still uses the old name",
                from, to
            ),
            Self::ExistingRowsMayFail { table, column } => format!(
                "adding NOT NULL column \"{}\" without a default fails if \"{}\" has rows",
                column, table
            ),
            Self::TwoStepNotNull { table, column } => format!(
                "setting \"{}\".\"{}\" NOT NULL scans the table and fails on existing NULLs; \
                 backfill the column first, then apply the constraint",
                table, column
            ),
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

/// One reversible unit of DDL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Changeset {
    /// Ordering tier, see [`priority`].
    pub priority: u32,
    /// Deployment phase.
    pub phase: Phase,
    /// Schema the changeset applies to.
    pub schema_name: String,
    /// Table the changeset targets, using its name after this plan.
    pub table_name: Option<String>,
    /// Name of the table in the database before this plan, when it differs.
    pub current_table_name: Option<String>,
    /// What the changeset does.
    pub kind: ChangesetKind,
    /// Forward statements.
    pub up: Vec<DdlOp>,
    /// Statements that undo `up`, in execution order.
    pub down: Vec<DdlOp>,
    /// Risk annotations.
    pub warnings: Vec<Warning>,
    /// Whether `up`/`down` may run inside a transaction.
    pub transaction: bool,
    /// Log every statement at info level when executed.
    pub debug: bool,
}

impl Changeset {
    /// Create an empty changeset of `kind` in `phase`.
    pub fn new(kind: ChangesetKind, phase: Phase, schema_name: impl Into<String>) -> Self {
        Self {
            priority: kind.priority(),
            phase,
            schema_name: schema_name.into(),
            table_name: None,
            current_table_name: None,
            kind,
            up: Vec::new(),
            down: Vec::new(),
            warnings: Vec::new(),
            transaction: true,
            debug: false,
        }
    }

    /// Set the target table.
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table_name = Some(table.into());
        self
    }

    /// Set the table's pre-plan name.
    pub fn current_table(mut self, table: impl Into<String>) -> Self {
        self.current_table_name = Some(table.into());
        self
    }

    /// Append a forward statement.
    pub fn up(mut self, sql: impl Into<String>) -> Self {
        self.up.push(DdlOp::new(sql));
        self
    }

    /// Append an undo statement.
    pub fn down(mut self, sql: impl Into<String>) -> Self {
        self.down.push(DdlOp::new(sql));
        self
    }

    /// Attach a warning.
    pub fn warn(mut self, warning: Warning) -> Self {
        self.warnings.push(warning);
        self
    }

    /// Mark as unable to run inside a transaction.
    pub fn non_transactional(mut self) -> Self {
        self.transaction = false;
        self
    }

    /// Set the verbose execution flag.
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// One-line description for summaries.
    pub fn describe(&self) -> String {
        match &self.table_name {
            Some(table) => format!("{} {}.{}", self.kind, self.schema_name, table),
            None => format!("{} {}", self.kind, self.schema_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_priorities_are_unique_per_kind() {
        let mut seen = HashSet::new();
        for kind in ChangesetKind::ALL {
            assert!(
                seen.insert(kind.priority()),
                "{} shares priority {}",
                kind,
                kind.priority()
            );
        }
    }

    #[test]
    fn test_priority_tiers_follow_category_order() {
        use priority::*;
        assert!(CREATE_ENUM < DROP_INDEX);
        assert!(DROP_CHECK < RENAME_TABLE);
        assert!(RENAME_COLUMN < DROP_TRIGGER);
        assert!(DROP_TABLE < CREATE_TABLE);
        assert!(ADD_COLUMN < ALTER_COLUMN_TYPE);
        assert!(ALTER_COLUMN_NULLABLE < CREATE_PRIMARY_KEY);
        assert!(CREATE_CHECK < RENAME_INDEX);
        assert!(UPDATE_EXTENSION < DROP_ENUM);
    }

    #[test]
    fn test_phase_roundtrip_through_str() {
        for phase in Phase::ALL {
            assert_eq!(phase.as_str().parse::<Phase>().unwrap(), phase);
        }
        assert!("later".parse::<Phase>().is_err());
    }

    #[test]
    fn test_changeset_builder() {
        let cs = Changeset::new(ChangesetKind::CreateIndex, Phase::Expand, "public")
            .table("users")
            .up("CREATE INDEX CONCURRENTLY \"users_email_idx\" ON \"public\".\"users\" (\"email\")")
            .down("DROP INDEX CONCURRENTLY \"public\".\"users_email_idx\"")
            .non_transactional();

        assert_eq!(cs.priority, priority::CREATE_INDEX);
        assert!(!cs.transaction);
        assert_eq!(cs.describe(), "createIndex public.users");
    }

    #[test]
    fn test_backward_incompatible_message() {
        let w = Warning::BackwardIncompatible {
            from: "name".into(),
            to: "full_name".into(),
        };
        assert!(w.message().contains("\"name\" to \"full_name\""));
    }
}
