//! Primary key, unique, check and foreign key constraints on existing tables.
//!
//! New tables carry their constraints inline in `CREATE TABLE`. On existing
//! tables, checks and foreign keys are added `NOT VALID` and validated in a
//! second statement, and unique constraints are attached to an index built
//! concurrently, so no statement holds a long exclusive lock.

use schemashift_schema::{Canonical, ConstraintKind, IndexDef, TableInfo};

use super::{sql, table_changeset};
use crate::changeset::{Changeset, ChangesetKind, Phase, Warning};
use crate::context::GeneratorContext;
use crate::diff::DiffValue;

fn kind_of(value: &DiffValue) -> Option<ConstraintKind> {
    match value {
        DiffValue::PrimaryKey(_) => Some(ConstraintKind::PrimaryKey),
        DiffValue::Unique(_) => Some(ConstraintKind::Unique),
        DiffValue::Check(_) => Some(ConstraintKind::Check),
        DiffValue::ForeignKey(_) => Some(ConstraintKind::ForeignKey),
        _ => None,
    }
}

fn name_of(value: &DiffValue) -> Option<&str> {
    match value {
        DiffValue::PrimaryKey(c) => Some(c.name()),
        DiffValue::Unique(c) => Some(c.name()),
        DiffValue::Check(c) => Some(c.name()),
        DiffValue::ForeignKey(c) => Some(c.name()),
        _ => None,
    }
}

/// Inline `ADD CONSTRAINT` clause.
fn clause(schema: &str, value: &DiffValue) -> Option<String> {
    match value {
        DiffValue::PrimaryKey(pk) => Some(sql::primary_key_clause(pk)),
        DiffValue::Unique(uc) => Some(sql::unique_clause(uc)),
        DiffValue::Check(check) => Some(sql::check_clause(check)),
        DiffValue::ForeignKey(fk) => Some(sql::foreign_key_clause(schema, fk)),
        _ => None,
    }
}

/// Whether `table` declares a constraint of `kind` named `name`.
fn declares(table: Option<&TableInfo>, kind: ConstraintKind, name: &str) -> bool {
    let Some(table) = table else {
        return false;
    };
    match kind {
        // A table has at most one primary key, so any replacement pairs with the drop.
        ConstraintKind::PrimaryKey => table.primary_key.is_some(),
        ConstraintKind::Unique => table.unique_constraints.values().any(|c| c.name == name),
        ConstraintKind::Check => table.check_constraints.values().any(|c| c.name == name),
        ConstraintKind::ForeignKey => table.foreign_keys.values().any(|c| c.name == name),
    }
}

/// Add a constraint to an existing table.
pub(super) fn create(ctx: &GeneratorContext<'_>, table: &str, value: &DiffValue) -> Option<Changeset> {
    let schema = &ctx.schema_name;
    let kind = kind_of(value)?;
    let name = name_of(value)?;
    let phase = if ctx.is_added_table(table) {
        Phase::Expand
    } else {
        Phase::Alter
    };
    let changeset_kind = match kind {
        ConstraintKind::PrimaryKey => ChangesetKind::CreatePrimaryKey,
        ConstraintKind::Unique => ChangesetKind::CreateUnique,
        ConstraintKind::Check => ChangesetKind::CreateCheck,
        ConstraintKind::ForeignKey => ChangesetKind::CreateForeignKey,
    };
    let (cs, current) = table_changeset(ctx, changeset_kind, phase, table);
    let quoted = sql::ident(name);
    let down = sql::drop_constraint(schema, &current, name);

    let cs = match value {
        DiffValue::Unique(uc) => {
            let index = sql::create_index(
                schema,
                &current,
                &IndexDef::new(&uc.name, uc.columns.clone()).unique(),
                true,
            );
            let index = if uc.nulls_not_distinct {
                index.replace(");", ") NULLS NOT DISTINCT;")
            } else {
                index
            };
            cs.up(index)
                .up(sql::alter_table(
                    schema,
                    &current,
                    &format!("ADD CONSTRAINT {} UNIQUE USING INDEX {}", quoted, quoted),
                ))
                .down(down)
                .non_transactional()
        }
        DiffValue::Check(_) | DiffValue::ForeignKey(_) => cs
            .up(sql::alter_table(
                schema,
                &current,
                &format!("ADD {} NOT VALID", clause(schema, value)?),
            ))
            .up(sql::alter_table(
                schema,
                &current,
                &format!("VALIDATE CONSTRAINT {}", quoted),
            ))
            .down(down),
        _ => cs
            .up(sql::alter_table(
                schema,
                &current,
                &format!("ADD {}", clause(schema, value)?),
            ))
            .down(down),
    };
    Some(cs)
}

/// Drop a constraint. Paired with a same-name re-create it runs in the alter phase.
pub(super) fn drop(ctx: &GeneratorContext<'_>, table: &str, value: &DiffValue) -> Option<Changeset> {
    let schema = &ctx.schema_name;
    let kind = kind_of(value)?;
    let name = name_of(value)?;
    let phase = if declares(ctx.local_table(table), kind, name) {
        Phase::Alter
    } else {
        Phase::Contract
    };
    let changeset_kind = match kind {
        ConstraintKind::PrimaryKey => ChangesetKind::DropPrimaryKey,
        ConstraintKind::Unique => ChangesetKind::DropUnique,
        ConstraintKind::Check => ChangesetKind::DropCheck,
        ConstraintKind::ForeignKey => ChangesetKind::DropForeignKey,
    };
    let (cs, current) = table_changeset(ctx, changeset_kind, phase, table);

    Some(
        cs.up(sql::drop_constraint(schema, &current, name)).down(sql::alter_table(
            schema,
            &current,
            &format!("ADD {}", clause(schema, value)?),
        )),
    )
}

/// Rename a constraint whose definition is unchanged.
pub(super) fn rename(
    ctx: &GeneratorContext<'_>,
    table: &str,
    old: &DiffValue,
    new: &DiffValue,
) -> Option<Changeset> {
    let schema = &ctx.schema_name;
    let from = name_of(old)?;
    let to = name_of(new)?;
    if ctx.covered_by_table_rename(table, from) {
        return None;
    }
    let (cs, current) = table_changeset(ctx, ChangesetKind::RenameConstraint, Phase::Alter, table);

    Some(
        cs.up(sql::alter_table(
            schema,
            &current,
            &format!("RENAME CONSTRAINT {} TO {}", sql::ident(from), sql::ident(to)),
        ))
        .down(sql::alter_table(
            schema,
            &current,
            &format!("RENAME CONSTRAINT {} TO {}", sql::ident(to), sql::ident(from)),
        ))
        .warn(Warning::BackwardIncompatible {
            from: from.to_string(),
            to: to.to_string(),
        }),
    )
}
