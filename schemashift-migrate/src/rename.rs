//! Rename resolution.
//!
//! A table or column that disappears while another appears may be a rename
//! rather than a drop plus create. The resolver asks a [`RenameDecider`]
//! about every such pair and rewrites the diff for confirmed renames, before
//! any changeset is generated.

use std::collections::HashMap;

use schemashift_schema::ColumnInfo;
use tracing::{debug, info};

use crate::context::GeneratorContext;
use crate::diff::{self, DiffEntry, DiffKind, DiffTarget, DiffValue};
use crate::error::{MigrateResult, MigrationError};

/// Answer to a rename question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenameDecision {
    /// Treat the added object as new.
    Create,
    /// The added object is the removed object `from` under a new name.
    Rename { from: String },
}

/// Source of rename decisions: an interactive prompt, a config file, a test.
///
/// Returning an error (typically [`MigrationError::RenameCancelled`]) aborts
/// the whole planning run.
pub trait RenameDecider {
    /// Decide whether table `added` is one of the removed `candidates` renamed.
    fn decide_table(
        &mut self,
        schema: &str,
        added: &str,
        candidates: &[String],
    ) -> MigrateResult<RenameDecision>;

    /// Decide whether column `added` of `table` is one of the removed `candidates` renamed.
    fn decide_column(
        &mut self,
        schema: &str,
        table: &str,
        added: &str,
        candidates: &[String],
    ) -> MigrateResult<RenameDecision>;
}

/// Never renames.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysCreate;

impl RenameDecider for AlwaysCreate {
    fn decide_table(&mut self, _: &str, _: &str, _: &[String]) -> MigrateResult<RenameDecision> {
        Ok(RenameDecision::Create)
    }

    fn decide_column(
        &mut self,
        _: &str,
        _: &str,
        _: &str,
        _: &[String],
    ) -> MigrateResult<RenameDecision> {
        Ok(RenameDecision::Create)
    }
}

/// Renames listed up front, e.g. in the `[renames]` config section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenameMap {
    tables: HashMap<String, String>,
    columns: HashMap<(String, String), String>,
}

impl RenameMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare that table `old` was renamed to `new`.
    pub fn table(mut self, old: impl Into<String>, new: impl Into<String>) -> Self {
        self.tables.insert(old.into(), new.into());
        self
    }

    /// Declare that column `old` of `table` (new table name) was renamed to `new`.
    pub fn column(
        mut self,
        table: impl Into<String>,
        old: impl Into<String>,
        new: impl Into<String>,
    ) -> Self {
        self.columns.insert((table.into(), old.into()), new.into());
        self
    }
}

impl RenameDecider for RenameMap {
    fn decide_table(
        &mut self,
        _schema: &str,
        added: &str,
        candidates: &[String],
    ) -> MigrateResult<RenameDecision> {
        Ok(candidates
            .iter()
            .find(|old| self.tables.get(*old).is_some_and(|new| new == added))
            .map(|old| RenameDecision::Rename { from: old.clone() })
            .unwrap_or(RenameDecision::Create))
    }

    fn decide_column(
        &mut self,
        _schema: &str,
        table: &str,
        added: &str,
        candidates: &[String],
    ) -> MigrateResult<RenameDecision> {
        Ok(candidates
            .iter()
            .find(|old| {
                self.columns
                    .get(&(table.to_string(), (*old).clone()))
                    .is_some_and(|new| new == added)
            })
            .map(|old| RenameDecision::Rename { from: old.clone() })
            .unwrap_or(RenameDecision::Create))
    }
}

/// Rewrites a diff according to rename decisions.
pub struct RenameResolver<'d> {
    decider: &'d mut dyn RenameDecider,
}

impl<'d> RenameResolver<'d> {
    /// Create a resolver asking `decider`.
    pub fn new(decider: &'d mut dyn RenameDecider) -> Self {
        Self { decider }
    }

    /// Resolve renames in `entries`, recording them in `ctx`.
    ///
    /// Runs to completion or fails as a whole; nothing is generated from a
    /// partially resolved diff.
    pub fn resolve(
        &mut self,
        entries: Vec<DiffEntry>,
        ctx: &mut GeneratorContext<'_>,
    ) -> MigrateResult<Vec<DiffEntry>> {
        let entries = self.resolve_tables(entries, ctx)?;
        let entries = self.resolve_columns(entries, ctx)?;
        ctx.finalize(&entries);
        Ok(entries)
    }

    fn resolve_tables(
        &mut self,
        mut entries: Vec<DiffEntry>,
        ctx: &mut GeneratorContext<'_>,
    ) -> MigrateResult<Vec<DiffEntry>> {
        let added = table_names(&entries, DiffKind::Create);
        let mut available = table_names(&entries, DiffKind::Remove);

        for table in added {
            if available.is_empty() {
                break;
            }
            let decision = self
                .decider
                .decide_table(&ctx.schema_name, &table, &available)?;
            let RenameDecision::Rename { from } = decision else {
                continue;
            };
            if !available.contains(&from) {
                return Err(MigrationError::ambiguous_rename(
                    &table,
                    format!("'{}' is not a removed table", from),
                ));
            }
            available.retain(|t| t != &from);

            info!(schema = %ctx.schema_name, from = %from, to = %table, "table rename confirmed");
            entries = rename_table(entries, ctx, &from, &table);
            ctx.record_table_rename(&table, &from);
        }

        Ok(entries)
    }

    fn resolve_columns(
        &mut self,
        mut entries: Vec<DiffEntry>,
        ctx: &mut GeneratorContext<'_>,
    ) -> MigrateResult<Vec<DiffEntry>> {
        let mut tables: Vec<String> = Vec::new();
        for entry in &entries {
            if let (DiffKind::Create, DiffTarget::Column { table, .. }) = (entry.kind, &entry.target)
            {
                if !tables.contains(table) {
                    tables.push(table.clone());
                }
            }
        }

        for table in tables {
            let added = columns(&entries, &table, DiffKind::Create);
            let mut available = columns(&entries, &table, DiffKind::Remove);

            for new in added {
                let candidates: Vec<String> = available
                    .iter()
                    .filter(|old| old.same_type_as(&new))
                    .map(|old| old.name.clone())
                    .collect();
                if candidates.is_empty() {
                    continue;
                }

                let decision =
                    self.decider
                        .decide_column(&ctx.schema_name, &table, &new.name, &candidates)?;
                let RenameDecision::Rename { from } = decision else {
                    continue;
                };
                let Some(pos) = available.iter().position(|c| c.name == from) else {
                    return Err(MigrationError::ambiguous_rename(
                        format!("{}.{}", table, new.name),
                        format!("'{}' is not a removed column of the same type", from),
                    ));
                };
                if !candidates.contains(&from) {
                    return Err(MigrationError::ambiguous_rename(
                        format!("{}.{}", table, new.name),
                        format!("'{}' has a different data type", from),
                    ));
                }
                let old = available.remove(pos);

                info!(
                    schema = %ctx.schema_name,
                    table = %table,
                    from = %old.name,
                    to = %new.name,
                    "column rename confirmed"
                );
                entries = rename_column(entries, &table, &old, &new);
                ctx.record_column_rename(&table, &new.name, &old.name);
            }
        }

        Ok(entries)
    }
}

fn table_names(entries: &[DiffEntry], kind: DiffKind) -> Vec<String> {
    entries
        .iter()
        .filter(|e| e.kind == kind)
        .filter_map(|e| match &e.target {
            DiffTarget::Table { table } => Some(table.clone()),
            _ => None,
        })
        .collect()
}

fn columns(entries: &[DiffEntry], table: &str, kind: DiffKind) -> Vec<ColumnInfo> {
    entries
        .iter()
        .filter(|e| e.kind == kind)
        .filter(|e| matches!(&e.target, DiffTarget::Column { table: t, .. } if t == table))
        .filter_map(|e| match e.value.as_ref().or(e.old_value.as_ref()) {
            Some(DiffValue::Column(column)) => Some(column.clone()),
            _ => None,
        })
        .collect()
}

/// Replace the drop of `from` and the create of `to` by a rename plus the
/// differences between the two definitions.
fn rename_table(
    entries: Vec<DiffEntry>,
    ctx: &GeneratorContext<'_>,
    from: &str,
    to: &str,
) -> Vec<DiffEntry> {
    let (Some(old), Some(new)) = (ctx.remote.tables.get(from), ctx.local.tables.get(to)) else {
        return entries;
    };

    let mut out = Vec::with_capacity(entries.len());
    for entry in entries {
        match (&entry.kind, &entry.target) {
            (DiffKind::Remove, DiffTarget::Table { table }) if table == from => {}
            (DiffKind::Create, DiffTarget::Table { table }) if table == to => {
                out.push(DiffEntry::change(
                    DiffTarget::Table {
                        table: to.to_string(),
                    },
                    DiffValue::Name(to.to_string()),
                    DiffValue::Name(from.to_string()),
                ));
                diff::diff_table(&mut out, to, old, new);
            }
            // Index and trigger entries emitted for the created table.
            (DiffKind::Create, target) if target.table() == Some(to) => {}
            _ => out.push(entry),
        }
    }

    debug!(from = %from, to = %to, entries = out.len(), "table rename applied to diff");
    out
}

fn rename_column(
    entries: Vec<DiffEntry>,
    table: &str,
    old: &ColumnInfo,
    new: &ColumnInfo,
) -> Vec<DiffEntry> {
    let is_column = |target: &DiffTarget, name: &str| {
        matches!(target, DiffTarget::Column { table: t, column } if t == table && column == name)
    };

    let mut out = Vec::with_capacity(entries.len());
    for entry in entries {
        if entry.kind == DiffKind::Remove && is_column(&entry.target, &old.name) {
            continue;
        }
        if entry.kind == DiffKind::Create && is_column(&entry.target, &new.name) {
            out.push(DiffEntry::change(
                DiffTarget::Column {
                    table: table.to_string(),
                    column: new.name.clone(),
                },
                DiffValue::Name(new.name.clone()),
                DiffValue::Name(old.name.clone()),
            ));
            diff::diff_column(&mut out, table, old, new);
            continue;
        }
        out.push(entry);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlannerOptions;
    use pretty_assertions::assert_eq;
    use schemashift_schema::{IndexDef, SchemaModel, TableInfo};

    /// Confirms the first candidate, records every question.
    #[derive(Default)]
    struct ConfirmFirst {
        asked: Vec<(String, Vec<String>)>,
    }

    impl RenameDecider for ConfirmFirst {
        fn decide_table(
            &mut self,
            _: &str,
            added: &str,
            candidates: &[String],
        ) -> MigrateResult<RenameDecision> {
            self.asked.push((added.to_string(), candidates.to_vec()));
            Ok(RenameDecision::Rename {
                from: candidates[0].clone(),
            })
        }

        fn decide_column(
            &mut self,
            _: &str,
            _: &str,
            added: &str,
            candidates: &[String],
        ) -> MigrateResult<RenameDecision> {
            self.asked.push((added.to_string(), candidates.to_vec()));
            Ok(RenameDecision::Rename {
                from: candidates[0].clone(),
            })
        }
    }

    struct Cancel;

    impl RenameDecider for Cancel {
        fn decide_table(&mut self, _: &str, added: &str, _: &[String]) -> MigrateResult<RenameDecision> {
            Err(MigrationError::RenameCancelled(added.to_string()))
        }

        fn decide_column(
            &mut self,
            _: &str,
            _: &str,
            added: &str,
            _: &[String],
        ) -> MigrateResult<RenameDecision> {
            Err(MigrationError::RenameCancelled(added.to_string()))
        }
    }

    struct Invalid;

    impl RenameDecider for Invalid {
        fn decide_table(&mut self, _: &str, _: &str, _: &[String]) -> MigrateResult<RenameDecision> {
            Ok(RenameDecision::Rename {
                from: "nope".into(),
            })
        }

        fn decide_column(
            &mut self,
            _: &str,
            _: &str,
            _: &str,
            _: &[String],
        ) -> MigrateResult<RenameDecision> {
            Ok(RenameDecision::Rename {
                from: "nope".into(),
            })
        }
    }

    fn users(columns: &[(&str, &str)]) -> SchemaModel {
        let table = columns
            .iter()
            .fold(TableInfo::new("users").column(ColumnInfo::new("id", "integer").not_null()), |t, (name, ty)| {
                t.column(ColumnInfo::new(*name, *ty))
            });
        SchemaModel::builder("public").table(table).build().unwrap()
    }

    fn resolve_with(
        decider: &mut dyn RenameDecider,
        remote: &SchemaModel,
        local: &SchemaModel,
    ) -> MigrateResult<Vec<DiffEntry>> {
        let options = PlannerOptions::default();
        let mut ctx = GeneratorContext::new(local, remote, &options);
        let entries = diff::diff(remote, local);
        RenameResolver::new(decider).resolve(entries, &mut ctx)
    }

    #[test]
    fn test_confirmed_column_rename_becomes_change() {
        let remote = users(&[("name", "text")]);
        let local = users(&[("full_name", "text")]);

        let entries = resolve_with(&mut ConfirmFirst::default(), &remote, &local).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, DiffKind::Change);
        assert_eq!(entries[0].old_value, Some(DiffValue::Name("name".into())));
    }

    #[test]
    fn test_declined_rename_keeps_drop_and_create() {
        let remote = users(&[("name", "text")]);
        let local = users(&[("full_name", "text")]);

        let entries = resolve_with(&mut AlwaysCreate, &remote, &local).unwrap();
        let kinds: Vec<DiffKind> = entries.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![DiffKind::Remove, DiffKind::Create]);
    }

    #[test]
    fn test_type_mismatch_is_not_offered() {
        let remote = users(&[("name", "text")]);
        let local = users(&[("age", "integer")]);

        let mut decider = ConfirmFirst::default();
        let entries = resolve_with(&mut decider, &remote, &local).unwrap();
        assert!(decider.asked.is_empty());
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn test_matched_column_not_offered_twice() {
        let remote = users(&[("a", "text")]);
        let local = users(&[("b", "text"), ("c", "text")]);

        let mut decider = ConfirmFirst::default();
        let entries = resolve_with(&mut decider, &remote, &local).unwrap();
        assert_eq!(decider.asked.len(), 1);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].kind, DiffKind::Change);
        assert_eq!(entries[1].kind, DiffKind::Create);
    }

    #[test]
    fn test_table_rename_diffs_old_against_new() {
        let remote = SchemaModel::builder("public")
            .table(
                TableInfo::new("customers")
                    .column(ColumnInfo::new("id", "integer"))
                    .index(IndexDef::new("customers_id_idx", ["id"])),
            )
            .build()
            .unwrap();
        let local = SchemaModel::builder("public")
            .table(
                TableInfo::new("clients")
                    .column(ColumnInfo::new("id", "integer"))
                    .column(ColumnInfo::new("email", "text"))
                    .index(IndexDef::new("clients_id_idx", ["id"])),
            )
            .build()
            .unwrap();

        let options = PlannerOptions::default();
        let mut ctx = GeneratorContext::new(&local, &remote, &options);
        let entries = RenameResolver::new(&mut ConfirmFirst::default())
            .resolve(diff::diff(&remote, &local), &mut ctx)
            .unwrap();

        let rendered: Vec<String> = entries.iter().map(|e| e.to_string()).collect();
        assert_eq!(rendered[0], "~ table clients");
        assert_eq!(rendered[1], "+ column clients.email");
        assert!(rendered[2].starts_with("~ index clients#"));
        assert_eq!(ctx.old_table_name("clients"), "customers");
        assert!(ctx.is_altered_table("clients"));
        assert!(ctx.covered_by_table_rename("clients", "customers_id_idx"));
    }

    #[test]
    fn test_cancel_aborts() {
        let remote = users(&[("name", "text")]);
        let local = users(&[("full_name", "text")]);
        assert!(matches!(
            resolve_with(&mut Cancel, &remote, &local),
            Err(MigrationError::RenameCancelled(_))
        ));
    }

    #[test]
    fn test_invalid_choice_is_ambiguous() {
        let remote = users(&[("name", "text")]);
        let local = users(&[("full_name", "text")]);
        assert!(matches!(
            resolve_with(&mut Invalid, &remote, &local),
            Err(MigrationError::AmbiguousRename { .. })
        ));
    }

    #[test]
    fn test_rename_map() {
        let remote = users(&[("name", "text")]);
        let local = users(&[("full_name", "text")]);

        let mut map = RenameMap::new().column("users", "name", "full_name");
        let entries = resolve_with(&mut map, &remote, &local).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, DiffKind::Change);
    }
}
