//! Changeset generation.
//!
//! Every [`DiffEntry`] maps to zero or more [`Changeset`]s. Dispatch is a
//! single exhaustive match over the entry's kind and target, so each
//! category is handled by exactly one generator.

mod column;
mod constraint;
mod enums;
mod index;
pub mod sql;
mod table;
mod trigger;

use tracing::trace;

use crate::changeset::{Changeset, ChangesetKind, Phase};
use crate::context::GeneratorContext;
use crate::diff::{DiffEntry, DiffKind, DiffTarget, DiffValue};

/// Changeset on `table`, plus the name the table has when it runs.
fn table_changeset(
    ctx: &GeneratorContext<'_>,
    kind: ChangesetKind,
    phase: Phase,
    table: &str,
) -> (Changeset, String) {
    let current = ctx.table_name_at(table, phase, kind.priority());
    let mut cs = Changeset::new(kind, phase, &ctx.schema_name).table(table);
    if current != table {
        cs = cs.current_table(current);
    }
    (cs, current.to_string())
}

/// Generate the changesets for one diff entry.
pub fn generate(entry: &DiffEntry, ctx: &GeneratorContext<'_>) -> Vec<Changeset> {
    let value = entry.value.as_ref();
    let old = entry.old_value.as_ref();

    let changesets = match (entry.kind, &entry.target, value, old) {
        (DiffKind::Create, DiffTarget::Schema { .. }, _, _) => vec![enums::create_schema(ctx)],
        (DiffKind::Remove, DiffTarget::Schema { .. }, _, _) => vec![enums::drop_schema(ctx)],
        (DiffKind::Change, DiffTarget::Schema { .. }, _, _) => Vec::new(),

        (DiffKind::Create, DiffTarget::Extension { .. }, Some(DiffValue::Extension(ext)), _) => {
            vec![enums::create_extension(ctx, ext)]
        }
        (DiffKind::Remove, DiffTarget::Extension { .. }, _, Some(DiffValue::Extension(ext))) => {
            vec![enums::drop_extension(ctx, ext)]
        }
        (
            DiffKind::Change,
            DiffTarget::Extension { .. },
            Some(DiffValue::Extension(new)),
            Some(DiffValue::Extension(old)),
        ) => enums::update_extension(ctx, new, old).into_iter().collect(),

        (DiffKind::Create, DiffTarget::Enum { .. }, Some(DiffValue::Enum(info)), _) => {
            vec![enums::create_enum(ctx, info)]
        }
        (DiffKind::Remove, DiffTarget::Enum { .. }, _, Some(DiffValue::Enum(info))) => {
            vec![enums::drop_enum(ctx, info)]
        }
        (
            DiffKind::Create,
            DiffTarget::EnumValue { value, .. },
            Some(DiffValue::Enum(new)),
            Some(DiffValue::Enum(old)),
        ) => vec![enums::add_enum_value(ctx, new, old, value)],
        (
            DiffKind::Remove,
            DiffTarget::EnumValue { value, name },
            _,
            Some(DiffValue::Enum(old)),
        ) => enums::remove_enum_value(ctx, name, old, value)
            .into_iter()
            .collect(),

        (DiffKind::Create, DiffTarget::Table { .. }, Some(DiffValue::Table(t)), _) => {
            vec![table::create(ctx, t)]
        }
        (DiffKind::Remove, DiffTarget::Table { .. }, _, Some(DiffValue::Table(t))) => {
            vec![table::drop(ctx, t)]
        }
        (
            DiffKind::Change,
            DiffTarget::Table { table },
            _,
            Some(DiffValue::Name(from)),
        ) => table::rename(ctx, from, table),

        (DiffKind::Create, DiffTarget::Column { table, .. }, Some(DiffValue::Column(c)), _) => {
            vec![column::add(ctx, table, c)]
        }
        (DiffKind::Remove, DiffTarget::Column { table, .. }, _, Some(DiffValue::Column(c))) => {
            vec![column::drop(ctx, table, c)]
        }
        (
            DiffKind::Change,
            DiffTarget::Column { table, column },
            _,
            Some(DiffValue::Name(from)),
        ) => vec![column::rename(ctx, table, from, column)],
        (
            _,
            DiffTarget::ColumnAttr { table, attr, .. },
            Some(DiffValue::Column(new)),
            Some(DiffValue::Column(old)),
        ) => vec![column::alter(ctx, table, *attr, old, new)],

        (DiffKind::Create, DiffTarget::Constraint { table, .. }, Some(v), _) => {
            constraint::create(ctx, table, v).into_iter().collect()
        }
        (DiffKind::Remove, DiffTarget::Constraint { table, .. }, _, Some(v)) => {
            constraint::drop(ctx, table, v).into_iter().collect()
        }
        (DiffKind::Change, DiffTarget::Constraint { table, .. }, Some(new), Some(old)) => {
            constraint::rename(ctx, table, old, new)
                .into_iter()
                .collect()
        }

        (DiffKind::Create, DiffTarget::Index { table, .. }, Some(DiffValue::Index(i)), _) => {
            vec![index::create(ctx, table, i)]
        }
        (DiffKind::Remove, DiffTarget::Index { table, .. }, _, Some(DiffValue::Index(i))) => {
            vec![index::drop(ctx, table, i)]
        }
        (
            DiffKind::Change,
            DiffTarget::Index { table, .. },
            Some(DiffValue::Index(new)),
            Some(DiffValue::Index(old)),
        ) => index::rename(ctx, table, old, new).into_iter().collect(),

        (DiffKind::Create, DiffTarget::Trigger { table, .. }, Some(DiffValue::Trigger(t)), _) => {
            vec![trigger::create(ctx, table, t)]
        }
        (DiffKind::Remove, DiffTarget::Trigger { table, .. }, _, Some(DiffValue::Trigger(t))) => {
            vec![trigger::drop(ctx, table, t)]
        }
        (
            DiffKind::Change,
            DiffTarget::Trigger { table, .. },
            Some(DiffValue::Trigger(new)),
            Some(DiffValue::Trigger(old)),
        ) => trigger::rename(ctx, table, old, new).into_iter().collect(),

        // Entries whose values do not fit their target are never produced by the diff.
        _ => {
            trace!(entry = %entry, "no generator for diff entry");
            Vec::new()
        }
    };

    changesets
        .into_iter()
        .map(|cs| cs.debug(ctx.debug))
        .collect()
}

/// Generate changesets for every entry, in diff order.
pub fn generate_all(entries: &[DiffEntry], ctx: &GeneratorContext<'_>) -> Vec<Changeset> {
    entries
        .iter()
        .flat_map(|entry| generate(entry, ctx))
        .collect()
}
