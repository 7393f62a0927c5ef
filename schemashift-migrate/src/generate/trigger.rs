//! Trigger create, drop and rename.

use schemashift_schema::TriggerDef;

use super::{sql, table_changeset};
use crate::changeset::{Changeset, ChangesetKind, Phase};
use crate::context::GeneratorContext;

pub(super) fn create(ctx: &GeneratorContext<'_>, table: &str, trigger: &TriggerDef) -> Changeset {
    let schema = &ctx.schema_name;
    let phase = if ctx.is_added_table(table) {
        Phase::Expand
    } else {
        Phase::Alter
    };
    let (cs, current) = table_changeset(ctx, ChangesetKind::CreateTrigger, phase, table);
    cs.up(sql::create_trigger(schema, &current, trigger))
        .down(sql::drop_trigger(schema, &current, &trigger.name))
}

pub(super) fn drop(ctx: &GeneratorContext<'_>, table: &str, trigger: &TriggerDef) -> Changeset {
    let schema = &ctx.schema_name;
    let recreated = ctx
        .local_table(table)
        .is_some_and(|t| t.triggers.values().any(|tr| tr.name == trigger.name));
    let phase = if recreated {
        Phase::Alter
    } else {
        Phase::Contract
    };
    let (cs, current) = table_changeset(ctx, ChangesetKind::DropTrigger, phase, table);
    cs.up(sql::drop_trigger(schema, &current, &trigger.name))
        .down(sql::create_trigger(schema, &current, trigger))
}

pub(super) fn rename(
    ctx: &GeneratorContext<'_>,
    table: &str,
    old: &TriggerDef,
    new: &TriggerDef,
) -> Option<Changeset> {
    if ctx.covered_by_table_rename(table, &old.name) {
        return None;
    }
    let schema = &ctx.schema_name;
    let (cs, current) = table_changeset(ctx, ChangesetKind::RenameTrigger, Phase::Alter, table);
    let rename = |from: &str, to: &str| {
        format!(
            "ALTER TRIGGER {} ON {} RENAME TO {};",
            sql::ident(from),
            sql::qualified(schema, &current),
            sql::ident(to)
        )
    };

    Some(
        cs.up(rename(&old.name, &new.name))
            .down(rename(&new.name, &old.name)),
    )
}
