//! Table create, drop and rename.

use schemashift_schema::TableInfo;

use super::sql;
use crate::changeset::{Changeset, ChangesetKind, Phase, Warning};
use crate::context::{DependentKind, GeneratorContext};

/// Create a table with all columns and constraints inline.
pub(super) fn create(ctx: &GeneratorContext<'_>, table: &TableInfo) -> Changeset {
    let schema = &ctx.schema_name;
    Changeset::new(ChangesetKind::CreateTable, Phase::Expand, schema)
        .table(&table.name)
        .up(sql::create_table(schema, table))
        .down(sql::drop_table(schema, &table.name))
}

/// Drop a table. Undo recreates it together with its indexes and triggers.
pub(super) fn drop(ctx: &GeneratorContext<'_>, table: &TableInfo) -> Changeset {
    let schema = &ctx.schema_name;
    let mut cs = Changeset::new(ChangesetKind::DropTable, Phase::Contract, schema)
        .table(&table.name)
        .up(sql::drop_table(schema, &table.name))
        .down(sql::create_table(schema, table))
        .warn(Warning::Destructive {
            schema: schema.clone(),
            table: table.name.clone(),
            column: None,
        });

    for index in table.indexes.values() {
        cs = cs.down(sql::create_index(schema, &table.name, index, false));
    }
    for trigger in table.triggers.values() {
        cs = cs.down(sql::create_trigger(schema, &table.name, trigger));
    }
    cs
}

/// Rename a table, plus a second changeset renaming objects named after it.
pub(super) fn rename(ctx: &GeneratorContext<'_>, from: &str, to: &str) -> Vec<Changeset> {
    let schema = &ctx.schema_name;
    let mut out = vec![
        Changeset::new(ChangesetKind::RenameTable, Phase::Alter, schema)
            .table(to)
            .current_table(from)
            .up(sql::alter_table(
                schema,
                from,
                &format!("RENAME TO {}", sql::ident(to)),
            ))
            .down(sql::alter_table(
                schema,
                to,
                &format!("RENAME TO {}", sql::ident(from)),
            ))
            .warn(Warning::BackwardIncompatible {
                from: from.to_string(),
                to: to.to_string(),
            }),
    ];

    let dependents = ctx.dependent_renames(to);
    if !dependents.is_empty() {
        let mut cs = Changeset::new(ChangesetKind::RenameTableDependents, Phase::Alter, schema)
            .table(to)
            .current_table(from);
        for dependent in dependents {
            cs = cs.up(rename_dependent(schema, to, dependent.kind, &dependent.from, &dependent.to));
        }
        for dependent in dependents.iter().rev() {
            cs = cs.down(rename_dependent(schema, to, dependent.kind, &dependent.to, &dependent.from));
        }
        out.push(cs);
    }

    out
}

fn rename_dependent(schema: &str, table: &str, kind: DependentKind, from: &str, to: &str) -> String {
    match kind {
        DependentKind::Index => format!(
            "ALTER INDEX {} RENAME TO {};",
            sql::qualified(schema, from),
            sql::ident(to)
        ),
        DependentKind::Constraint => sql::alter_table(
            schema,
            table,
            &format!("RENAME CONSTRAINT {} TO {}", sql::ident(from), sql::ident(to)),
        ),
        DependentKind::Trigger => format!(
            "ALTER TRIGGER {} ON {} RENAME TO {};",
            sql::ident(from),
            sql::qualified(schema, table),
            sql::ident(to)
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlannerOptions;
    use pretty_assertions::assert_eq;
    use schemashift_schema::{ColumnInfo, IndexDef, SchemaModel};

    #[test]
    fn test_drop_table_down_restores_indexes() {
        let users = TableInfo::new("users")
            .column(ColumnInfo::new("email", "text"))
            .index(IndexDef::new("users_email_idx", ["email"]));
        let remote = SchemaModel::builder("public").table(users.clone()).build().unwrap();
        let local = SchemaModel::new("public");
        let ctx = GeneratorContext::new(&local, &remote, &PlannerOptions::default());

        let cs = drop(&ctx, &users);
        assert_eq!(cs.phase, Phase::Contract);
        assert_eq!(cs.up[0].sql, "DROP TABLE \"public\".\"users\";");
        assert_eq!(cs.down.len(), 2);
        assert!(cs.down[1].sql.starts_with("CREATE INDEX \"users_email_idx\""));
    }

    #[test]
    fn test_rename_without_dependents() {
        let local = SchemaModel::new("public");
        let remote = SchemaModel::new("public");
        let ctx = GeneratorContext::new(&local, &remote, &PlannerOptions::default());

        let out = rename(&ctx, "customers", "clients");
        assert_eq!(out.len(), 1);
        assert_eq!(
            out[0].up[0].sql,
            "ALTER TABLE \"public\".\"customers\" RENAME TO \"clients\";"
        );
        assert_eq!(
            out[0].down[0].sql,
            "ALTER TABLE \"public\".\"clients\" RENAME TO \"customers\";"
        );
    }
}
