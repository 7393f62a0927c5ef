//! Index create, drop and rename.

use schemashift_schema::IndexDef;

use super::{sql, table_changeset};
use crate::changeset::{Changeset, ChangesetKind, Phase};
use crate::context::GeneratorContext;

/// Create an index.
///
/// Indexes on tables created in the same plan are built inline. Existing
/// tables get `CREATE INDEX CONCURRENTLY`, which cannot run in a transaction.
pub(super) fn create(ctx: &GeneratorContext<'_>, table: &str, index: &IndexDef) -> Changeset {
    let schema = &ctx.schema_name;

    if ctx.is_added_table(table) {
        let (cs, current) = table_changeset(ctx, ChangesetKind::CreateIndex, Phase::Expand, table);
        return cs
            .up(sql::create_index(schema, &current, index, false))
            .down(sql::drop_index(schema, &index.name, false));
    }

    let replaces_existing = ctx
        .remote_table(table)
        .is_some_and(|t| t.indexes.values().any(|i| i.name == index.name));
    let phase = if ctx.is_altered_table(table) || replaces_existing {
        Phase::Alter
    } else {
        Phase::Expand
    };

    let (cs, current) = table_changeset(ctx, ChangesetKind::CreateIndex, phase, table);
    cs.up(sql::create_index(schema, &current, index, true))
        .down(sql::drop_index(schema, &index.name, true))
        .non_transactional()
}

/// Drop an index. Paired with a same-name re-create it runs in the alter phase.
pub(super) fn drop(ctx: &GeneratorContext<'_>, table: &str, index: &IndexDef) -> Changeset {
    let schema = &ctx.schema_name;
    let recreated = ctx
        .local_table(table)
        .is_some_and(|t| t.indexes.values().any(|i| i.name == index.name));
    let phase = if recreated {
        Phase::Alter
    } else {
        Phase::Contract
    };

    let (cs, current) = table_changeset(ctx, ChangesetKind::DropIndex, phase, table);
    cs.up(sql::drop_index(schema, &index.name, false))
        .down(sql::create_index(schema, &current, index, false))
}

/// Rename an index whose definition is unchanged.
pub(super) fn rename(
    ctx: &GeneratorContext<'_>,
    table: &str,
    old: &IndexDef,
    new: &IndexDef,
) -> Option<Changeset> {
    if ctx.covered_by_table_rename(table, &old.name) {
        return None;
    }
    let schema = &ctx.schema_name;
    let (cs, _) = table_changeset(ctx, ChangesetKind::RenameIndex, Phase::Alter, table);

    Some(
        cs.up(format!(
            "ALTER INDEX {} RENAME TO {};",
            sql::qualified(schema, &old.name),
            sql::ident(&new.name)
        ))
        .down(format!(
            "ALTER INDEX {} RENAME TO {};",
            sql::qualified(schema, &new.name),
            sql::ident(&old.name)
        )),
    )
}
