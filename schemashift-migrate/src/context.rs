//! Shared, per-run state handed to every changeset generator.
//!
//! A [`GeneratorContext`] is created for one planning run. Only the rename
//! resolver writes to it; generation and ordering borrow it immutably.

use indexmap::{IndexMap, IndexSet};
use schemashift_schema::{Canonical, SchemaModel, TableInfo};

use crate::changeset::{Phase, priority};
use crate::config::PlannerOptions;
use crate::diff::{DiffEntry, DiffKind, DiffTarget};

/// Kind of object renamed along with its table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DependentKind {
    /// Renamed with `ALTER INDEX`.
    Index,
    /// Renamed with `ALTER TABLE ... RENAME CONSTRAINT`.
    Constraint,
    /// Renamed with `ALTER TRIGGER`.
    Trigger,
}

/// An index, constraint or trigger whose name follows its table's name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependentRename {
    /// Object kind.
    pub kind: DependentKind,
    /// Name under the old table name.
    pub from: String,
    /// Name under the new table name.
    pub to: String,
}

/// Per-run generator state.
#[derive(Debug, Clone)]
pub struct GeneratorContext<'a> {
    /// Desired schema.
    pub local: &'a SchemaModel,
    /// Current schema.
    pub remote: &'a SchemaModel,
    /// Schema being migrated.
    pub schema_name: String,
    /// Tables created by this plan.
    pub added_tables: IndexSet<String>,
    /// Tables dropped by this plan.
    pub dropped_tables: IndexSet<String>,
    /// Renamed tables, new name to old name.
    pub tables_to_rename: IndexMap<String, String>,
    /// Renamed columns per table, new name to old name.
    pub columns_to_rename: IndexMap<String, IndexMap<String, String>>,
    /// Columns added to existing tables.
    pub added_columns: IndexMap<String, IndexSet<String>>,
    /// Columns dropped from existing tables.
    pub dropped_columns: IndexMap<String, IndexSet<String>>,
    /// Existing tables whose columns change in this plan.
    pub altered_tables: IndexSet<String>,
    /// Rename dependents of renamed tables.
    pub naming_convention: bool,
    /// Verbose execution logging.
    pub debug: bool,
    local_order: Vec<String>,
    remote_order: Vec<String>,
    dependent_renames: IndexMap<String, Vec<DependentRename>>,
}

impl<'a> GeneratorContext<'a> {
    /// Create a context for diffing `remote` into `local`.
    pub fn new(local: &'a SchemaModel, remote: &'a SchemaModel, options: &PlannerOptions) -> Self {
        Self {
            local,
            remote,
            schema_name: local.schema_name.clone(),
            added_tables: IndexSet::new(),
            dropped_tables: IndexSet::new(),
            tables_to_rename: IndexMap::new(),
            columns_to_rename: IndexMap::new(),
            added_columns: IndexMap::new(),
            dropped_columns: IndexMap::new(),
            altered_tables: IndexSet::new(),
            naming_convention: options.naming_convention,
            debug: options.debug,
            local_order: local.compute_table_priorities(),
            remote_order: remote.compute_table_priorities(),
            dependent_renames: IndexMap::new(),
        }
    }

    pub(crate) fn record_table_rename(&mut self, new: &str, old: &str) {
        self.tables_to_rename.insert(new.to_string(), old.to_string());
    }

    pub(crate) fn record_column_rename(&mut self, table: &str, new: &str, old: &str) {
        self.columns_to_rename
            .entry(table.to_string())
            .or_default()
            .insert(new.to_string(), old.to_string());
    }

    /// Derive the table and column bookkeeping from the resolved diff.
    pub(crate) fn finalize(&mut self, entries: &[DiffEntry]) {
        for entry in entries {
            match (&entry.kind, &entry.target) {
                (DiffKind::Create, DiffTarget::Table { table }) => {
                    self.added_tables.insert(table.clone());
                }
                (DiffKind::Remove, DiffTarget::Table { table }) => {
                    self.dropped_tables.insert(table.clone());
                }
                (DiffKind::Create, DiffTarget::Column { table, column }) => {
                    self.added_columns
                        .entry(table.clone())
                        .or_default()
                        .insert(column.clone());
                    self.altered_tables.insert(table.clone());
                }
                (DiffKind::Remove, DiffTarget::Column { table, column }) => {
                    self.dropped_columns
                        .entry(table.clone())
                        .or_default()
                        .insert(column.clone());
                    self.altered_tables.insert(table.clone());
                }
                (DiffKind::Change, DiffTarget::Column { table, .. })
                | (_, DiffTarget::ColumnAttr { table, .. }) => {
                    self.altered_tables.insert(table.clone());
                }
                _ => {}
            }
        }

        if self.naming_convention {
            let renames: Vec<(String, String)> = self
                .tables_to_rename
                .iter()
                .map(|(new, old)| (new.clone(), old.clone()))
                .collect();
            for (new, old) in renames {
                let dependents = self.find_dependents(&new, &old);
                if !dependents.is_empty() {
                    self.dependent_renames.insert(new, dependents);
                }
            }
        }
    }

    fn find_dependents(&self, new: &str, old: &str) -> Vec<DependentRename> {
        let (Some(remote), Some(local)) = (self.remote.tables.get(old), self.local.tables.get(new))
        else {
            return Vec::new();
        };

        let old_prefix = format!("{}_", old);
        let new_prefix = format!("{}_", new);
        let mut out = Vec::new();

        let mut collect = |kind: DependentKind, pairs: Vec<(String, String)>| {
            for (from, to) in pairs {
                let Some(suffix) = from.strip_prefix(&old_prefix) else {
                    continue;
                };
                if to == format!("{}{}", new_prefix, suffix) {
                    out.push(DependentRename { kind, from, to });
                }
            }
        };

        collect(
            DependentKind::Index,
            same_hash_names(&remote.indexes, &local.indexes),
        );
        let mut constraints = same_hash_names(&remote.primary_key_map(), &local.primary_key_map());
        constraints.extend(same_hash_names(
            &remote.unique_constraints,
            &local.unique_constraints,
        ));
        constraints.extend(same_hash_names(
            &remote.check_constraints,
            &local.check_constraints,
        ));
        constraints.extend(same_hash_names(&remote.foreign_keys, &local.foreign_keys));
        collect(DependentKind::Constraint, constraints);
        collect(
            DependentKind::Trigger,
            same_hash_names(&remote.triggers, &local.triggers),
        );

        out
    }

    /// Whether `table` is created by this plan.
    pub fn is_added_table(&self, table: &str) -> bool {
        self.added_tables.contains(table)
    }

    /// Whether `table` (new name) is renamed by this plan.
    pub fn is_renamed_table(&self, table: &str) -> bool {
        self.tables_to_rename.contains_key(table)
    }

    /// Whether the columns of `table` change in this plan.
    pub fn is_altered_table(&self, table: &str) -> bool {
        self.altered_tables.contains(table)
    }

    /// Pre-plan name of `table`.
    pub fn old_table_name<'n>(&'n self, table: &'n str) -> &'n str {
        self.tables_to_rename
            .get(table)
            .map(String::as_str)
            .unwrap_or(table)
    }

    /// Pre-plan name of `column` in `table`.
    pub fn old_column_name<'n>(&'n self, table: &str, column: &'n str) -> &'n str {
        self.columns_to_rename
            .get(table)
            .and_then(|columns| columns.get(column))
            .map(String::as_str)
            .unwrap_or(column)
    }

    /// Post-plan name of the table currently called `old`.
    pub fn new_table_name<'n>(&'n self, old: &'n str) -> &'n str {
        self.tables_to_rename
            .iter()
            .find(|(_, o)| o.as_str() == old)
            .map(|(new, _)| new.as_str())
            .unwrap_or(old)
    }

    /// Post-plan name of column `old` in `table` (post-plan table name).
    pub fn new_column_name<'n>(&'n self, table: &str, old: &'n str) -> &'n str {
        self.columns_to_rename
            .get(table)
            .and_then(|columns| columns.iter().find(|(_, o)| o.as_str() == old))
            .map(|(new, _)| new.as_str())
            .unwrap_or(old)
    }

    /// Desired definition of `table`.
    pub fn local_table(&self, table: &str) -> Option<&'a TableInfo> {
        self.local.tables.get(table)
    }

    /// Current definition of `table`, looked up by its pre-plan name.
    pub fn remote_table(&self, table: &str) -> Option<&'a TableInfo> {
        self.remote.tables.get(self.old_table_name(table))
    }

    /// Name `table` has when a changeset of `phase` and `priority` runs.
    ///
    /// Table renames run in the alter phase, so expand changesets and alter
    /// changesets ordered before the rename still see the old name.
    pub fn table_name_at<'n>(&'n self, table: &'n str, phase: Phase, priority: u32) -> &'n str {
        let before_rename = match phase {
            Phase::Expand => true,
            Phase::Alter => priority < priority::RENAME_TABLE,
            Phase::Contract | Phase::Data => false,
        };
        if before_rename {
            self.old_table_name(table)
        } else {
            table
        }
    }

    /// Objects renamed together with `table`.
    pub fn dependent_renames(&self, table: &str) -> &[DependentRename] {
        self.dependent_renames
            .get(table)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Whether renaming `from` on `table` is already part of the table's dependent renames.
    pub fn covered_by_table_rename(&self, table: &str, from: &str) -> bool {
        self.dependent_renames(table).iter().any(|d| d.from == from)
    }

    /// Position of `table` in the local creation order.
    pub fn creation_rank(&self, table: &str) -> usize {
        self.local_order
            .iter()
            .position(|t| t == table)
            .unwrap_or(usize::MAX)
    }

    /// Position of `table` in the remote creation order.
    pub fn remote_rank(&self, table: &str) -> usize {
        self.remote_order
            .iter()
            .position(|t| t == table)
            .unwrap_or(usize::MAX)
    }
}

fn same_hash_names<T: Canonical>(
    remote: &IndexMap<String, T>,
    local: &IndexMap<String, T>,
) -> Vec<(String, String)> {
    remote
        .iter()
        .filter_map(|(hash, old)| {
            local
                .get(hash)
                .map(|new| (old.name().to_string(), new.name().to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemashift_schema::{ColumnInfo, IndexDef, PrimaryKey};

    fn model(table: &str) -> SchemaModel {
        SchemaModel::builder("public")
            .table(
                TableInfo::new(table)
                    .column(ColumnInfo::new("id", "integer").not_null())
                    .column(ColumnInfo::new("email", "text"))
                    .primary_key(PrimaryKey::new(format!("{}_pkey", table), ["id"]))
                    .index(IndexDef::new(format!("{}_email_idx", table), ["email"]))
                    .index(IndexDef::new("lookup_idx", ["id", "email"])),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_table_name_at_phase() {
        let local = model("clients");
        let remote = model("customers");
        let mut ctx = GeneratorContext::new(&local, &remote, &PlannerOptions::default());
        ctx.record_table_rename("clients", "customers");

        assert_eq!(
            ctx.table_name_at("clients", Phase::Expand, priority::CREATE_INDEX),
            "customers"
        );
        assert_eq!(
            ctx.table_name_at("clients", Phase::Alter, priority::DROP_FOREIGN_KEY),
            "customers"
        );
        assert_eq!(
            ctx.table_name_at("clients", Phase::Alter, priority::RENAME_COLUMN),
            "clients"
        );
        assert_eq!(
            ctx.table_name_at("clients", Phase::Contract, priority::DROP_INDEX),
            "clients"
        );
    }

    #[test]
    fn test_dependents_follow_prefix() {
        let local = model("clients");
        let remote = model("customers");
        let mut ctx = GeneratorContext::new(&local, &remote, &PlannerOptions::default());
        ctx.record_table_rename("clients", "customers");
        ctx.finalize(&[]);

        let dependents = ctx.dependent_renames("clients");
        assert_eq!(dependents.len(), 2);
        assert!(ctx.covered_by_table_rename("clients", "customers_email_idx"));
        assert!(ctx.covered_by_table_rename("clients", "customers_pkey"));
        assert!(!ctx.covered_by_table_rename("clients", "lookup_idx"));
    }

    #[test]
    fn test_dependents_disabled_without_naming_convention() {
        let local = model("clients");
        let remote = model("customers");
        let options = PlannerOptions::default().naming_convention(false);
        let mut ctx = GeneratorContext::new(&local, &remote, &options);
        ctx.record_table_rename("clients", "customers");
        ctx.finalize(&[]);

        assert!(ctx.dependent_renames("clients").is_empty());
    }
}
