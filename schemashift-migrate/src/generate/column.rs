//! Column add, drop, rename and attribute changes.

use schemashift_schema::{ColumnInfo, IdentityKind};

use super::{sql, table_changeset};
use crate::changeset::{Changeset, ChangesetKind, Phase, Warning};
use crate::context::GeneratorContext;
use crate::diff::ColumnAttr;

/// Add a column to an existing table.
pub(super) fn add(ctx: &GeneratorContext<'_>, table: &str, column: &ColumnInfo) -> Changeset {
    let schema = &ctx.schema_name;
    let (cs, current) = table_changeset(ctx, ChangesetKind::AddColumn, Phase::Expand, table);
    let mut cs = cs
        .up(sql::alter_table(
            schema,
            &current,
            &format!("ADD COLUMN {}", sql::column_definition(schema, column)),
        ))
        .down(sql::alter_table(
            schema,
            &current,
            &format!("DROP COLUMN {}", sql::ident(&column.name)),
        ));

    if !column.nullable && column.default.is_none() && column.identity == IdentityKind::None {
        cs = cs.warn(Warning::ExistingRowsMayFail {
            table: table.to_string(),
            column: column.name.clone(),
        });
    }
    cs
}

/// Drop a column.
pub(super) fn drop(ctx: &GeneratorContext<'_>, table: &str, column: &ColumnInfo) -> Changeset {
    let schema = &ctx.schema_name;
    let (cs, current) = table_changeset(ctx, ChangesetKind::DropColumn, Phase::Contract, table);
    cs.up(sql::alter_table(
        schema,
        &current,
        &format!("DROP COLUMN {}", sql::ident(&column.name)),
    ))
    .down(sql::alter_table(
        schema,
        &current,
        &format!("ADD COLUMN {}", sql::column_definition(schema, column)),
    ))
    .warn(Warning::Destructive {
        schema: schema.clone(),
        table: table.to_string(),
        column: Some(column.name.clone()),
    })
}

/// Rename a column.
pub(super) fn rename(ctx: &GeneratorContext<'_>, table: &str, from: &str, to: &str) -> Changeset {
    let schema = &ctx.schema_name;
    let (cs, current) = table_changeset(ctx, ChangesetKind::RenameColumn, Phase::Alter, table);
    cs.up(sql::alter_table(
        schema,
        &current,
        &format!("RENAME COLUMN {} TO {}", sql::ident(from), sql::ident(to)),
    ))
    .down(sql::alter_table(
        schema,
        &current,
        &format!("RENAME COLUMN {} TO {}", sql::ident(to), sql::ident(from)),
    ))
    .warn(Warning::BackwardIncompatible {
        from: from.to_string(),
        to: to.to_string(),
    })
}

/// Change one attribute of an existing column.
pub(super) fn alter(
    ctx: &GeneratorContext<'_>,
    table: &str,
    attr: ColumnAttr,
    old: &ColumnInfo,
    new: &ColumnInfo,
) -> Changeset {
    let schema = &ctx.schema_name;
    let kind = match attr {
        ColumnAttr::DataType => ChangesetKind::AlterColumnType,
        ColumnAttr::Nullable => ChangesetKind::AlterColumnNullable,
        ColumnAttr::Default => ChangesetKind::AlterColumnDefault,
        ColumnAttr::Identity => ChangesetKind::AlterColumnIdentity,
    };
    let (cs, current) = table_changeset(ctx, kind, Phase::Alter, table);
    let column = sql::ident(&new.name);
    let alter = |action: String| {
        sql::alter_table(schema, &current, &format!("ALTER COLUMN {} {}", column, action))
    };

    match attr {
        ColumnAttr::DataType => cs
            .up(alter(type_change(schema, new, old.is_enum)))
            .down(alter(type_change(schema, old, new.is_enum))),
        ColumnAttr::Nullable if new.nullable => cs
            .up(alter("DROP NOT NULL".into()))
            .down(alter("SET NOT NULL".into())),
        ColumnAttr::Nullable => cs
            .up(alter("SET NOT NULL".into()))
            .down(alter("DROP NOT NULL".into()))
            .warn(Warning::TwoStepNotNull {
                table: table.to_string(),
                column: new.name.clone(),
            }),
        ColumnAttr::Default => cs
            .up(alter(default_change(new)))
            .down(alter(default_change(old))),
        ColumnAttr::Identity => cs
            .up(alter(identity_change(old.identity, new.identity)))
            .down(alter(identity_change(new.identity, old.identity))),
    }
}

/// `TYPE ... USING ...` towards `target`. Enum casts go through text.
fn type_change(schema: &str, target: &ColumnInfo, from_enum: bool) -> String {
    let ty = sql::column_type(schema, target);
    let column = sql::ident(&target.name);
    if target.is_enum || from_enum {
        format!("TYPE {} USING {}::text::{}", ty, column, ty)
    } else {
        format!("TYPE {} USING {}::{}", ty, column, ty)
    }
}

fn default_change(target: &ColumnInfo) -> String {
    match &target.default {
        Some(default) => format!("SET DEFAULT {}", default.expression),
        None => "DROP DEFAULT".to_string(),
    }
}

fn identity_change(from: IdentityKind, to: IdentityKind) -> String {
    match (from.generated_keyword(), to.generated_keyword()) {
        (None, Some(keyword)) => format!("ADD GENERATED {} AS IDENTITY", keyword),
        (Some(_), Some(keyword)) => format!("SET GENERATED {}", keyword),
        (Some(_), None) | (None, None) => "DROP IDENTITY IF EXISTS".to_string(),
    }
}
