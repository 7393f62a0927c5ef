//! Schemas, extensions and enum types.
//!
//! These run first (priority 0-3) because later changesets may reference
//! them, and their drops run last.

use schemashift_schema::{ColumnInfo, EnumInfo, ExtensionInfo};

use super::sql;
use crate::changeset::{Changeset, ChangesetKind, Phase};
use crate::context::GeneratorContext;

pub(super) fn create_schema(ctx: &GeneratorContext<'_>) -> Changeset {
    let schema = sql::ident(&ctx.schema_name);
    Changeset::new(ChangesetKind::CreateSchema, Phase::Expand, &ctx.schema_name)
        .up(format!("CREATE SCHEMA IF NOT EXISTS {};", schema))
        .down(format!("DROP SCHEMA {};", schema))
}

pub(super) fn drop_schema(ctx: &GeneratorContext<'_>) -> Changeset {
    let schema = sql::ident(&ctx.schema_name);
    Changeset::new(ChangesetKind::DropSchema, Phase::Contract, &ctx.schema_name)
        .up(format!("DROP SCHEMA {};", schema))
        .down(format!("CREATE SCHEMA {};", schema))
}

pub(super) fn create_extension(ctx: &GeneratorContext<'_>, ext: &ExtensionInfo) -> Changeset {
    Changeset::new(ChangesetKind::CreateExtension, Phase::Expand, &ctx.schema_name)
        .up(sql::create_extension(&ctx.schema_name, ext))
        .down(sql::drop_extension(&ext.name))
}

pub(super) fn drop_extension(ctx: &GeneratorContext<'_>, ext: &ExtensionInfo) -> Changeset {
    Changeset::new(ChangesetKind::DropExtension, Phase::Contract, &ctx.schema_name)
        .up(sql::drop_extension(&ext.name))
        .down(sql::create_extension(&ctx.schema_name, ext))
}

/// `ALTER EXTENSION ... UPDATE TO` between two pinned versions.
pub(super) fn update_extension(
    ctx: &GeneratorContext<'_>,
    new: &ExtensionInfo,
    old: &ExtensionInfo,
) -> Option<Changeset> {
    let (to, from) = (new.version.as_deref()?, old.version.as_deref()?);
    let update = |version: &str| {
        format!(
            "ALTER EXTENSION {} UPDATE TO {};",
            sql::ident(&new.name),
            sql::literal(version)
        )
    };
    Some(
        Changeset::new(ChangesetKind::UpdateExtension, Phase::Alter, &ctx.schema_name)
            .up(update(to))
            .down(update(from)),
    )
}

pub(super) fn create_enum(ctx: &GeneratorContext<'_>, info: &EnumInfo) -> Changeset {
    Changeset::new(ChangesetKind::CreateEnum, Phase::Expand, &ctx.schema_name)
        .up(sql::create_enum(&ctx.schema_name, info))
        .down(sql::drop_type(&ctx.schema_name, &info.name))
}

pub(super) fn drop_enum(ctx: &GeneratorContext<'_>, info: &EnumInfo) -> Changeset {
    Changeset::new(ChangesetKind::DropEnum, Phase::Contract, &ctx.schema_name)
        .up(sql::drop_type(&ctx.schema_name, &info.name))
        .down(sql::create_enum(&ctx.schema_name, info))
}

/// Add one label with `ALTER TYPE ... ADD VALUE`.
///
/// Labels cannot be removed in place, so undo recreates the type with the
/// remote labels. `ADD VALUE` is not run inside a transaction because the new
/// label is unusable until the transaction commits.
pub(super) fn add_enum_value(
    ctx: &GeneratorContext<'_>,
    new: &EnumInfo,
    old: &EnumInfo,
    value: &str,
) -> Changeset {
    let schema = &ctx.schema_name;
    let mut up = format!(
        "ALTER TYPE {} ADD VALUE {}",
        sql::qualified(schema, &new.name),
        sql::literal(value)
    );
    if let Some(before) = next_existing(new, old, value) {
        up.push_str(&format!(" BEFORE {}", sql::literal(before)));
    }
    up.push(';');

    // Expand runs before any rename, so the remote names still apply.
    let columns: Vec<(String, ColumnInfo)> = ctx
        .remote
        .enum_columns(&new.name)
        .into_iter()
        .map(|(t, c)| (t.name.clone(), c.clone()))
        .collect();

    let mut cs = Changeset::new(ChangesetKind::AddEnumValue, Phase::Expand, schema)
        .up(up)
        .non_transactional();
    for statement in recreate_enum(schema, &new.name, &old.values, &columns) {
        cs = cs.down(statement);
    }
    cs
}

/// Remove labels by recreating the type and recasting its columns.
///
/// Every removed label of an enum produces a diff entry; the first one
/// carries the whole recreation and the rest generate nothing.
pub(super) fn remove_enum_value(
    ctx: &GeneratorContext<'_>,
    name: &str,
    old: &EnumInfo,
    value: &str,
) -> Option<Changeset> {
    let new = ctx.local.enums.get(name)?;
    let first_removed = old.values.iter().find(|v| !new.values.contains(v))?;
    if first_removed != value {
        return None;
    }

    let schema = &ctx.schema_name;
    let columns = columns_using(ctx, name);
    let before = with_additions(old, new);

    let mut cs = Changeset::new(ChangesetKind::RemoveEnumValue, Phase::Alter, schema);
    for statement in recreate_enum(schema, name, &new.values, &columns) {
        cs = cs.up(statement);
    }
    for statement in recreate_enum(schema, name, &before, &columns) {
        cs = cs.down(statement);
    }
    Some(cs)
}

/// First label after `value` in the local order that already exists remotely.
fn next_existing<'e>(new: &'e EnumInfo, old: &EnumInfo, value: &str) -> Option<&'e str> {
    new.values
        .iter()
        .skip_while(|v| v.as_str() != value)
        .skip(1)
        .find(|v| old.values.contains(v))
        .map(String::as_str)
}

/// Remote labels with the local additions inserted where `ADD VALUE` puts them.
fn with_additions(old: &EnumInfo, new: &EnumInfo) -> Vec<String> {
    let mut values = old.values.clone();
    for value in new.values.iter().filter(|v| !old.values.contains(v)) {
        match next_existing(new, old, value).and_then(|b| values.iter().position(|v| v == b)) {
            Some(pos) => values.insert(pos, value.clone()),
            None => values.push(value.clone()),
        }
    }
    values
}

/// Columns typed by the enum while the alter phase runs, under their post-rename names.
///
/// That is every local column plus remote columns only dropped in the contract
/// phase. A remote column that survives with another type has already been
/// recast by its own type change.
fn columns_using(ctx: &GeneratorContext<'_>, name: &str) -> Vec<(String, ColumnInfo)> {
    let mut columns: Vec<(String, ColumnInfo)> = ctx
        .local
        .enum_columns(name)
        .into_iter()
        .map(|(t, c)| (t.name.clone(), c.clone()))
        .collect();

    for (table, column) in ctx.remote.enum_columns(name) {
        let table_name = ctx.new_table_name(&table.name).to_string();
        let column_name = ctx.new_column_name(&table_name, &column.name).to_string();
        let survives = ctx
            .local_table(&table_name)
            .is_some_and(|t| t.columns.contains_key(&column_name));
        if !survives {
            let mut column = column.clone();
            column.name = column_name;
            columns.push((table_name, column));
        }
    }
    columns
}

/// Statements replacing enum `name` by one with `values`, recasting `columns`.
fn recreate_enum(
    schema: &str,
    name: &str,
    values: &[String],
    columns: &[(String, ColumnInfo)],
) -> Vec<String> {
    let ty = sql::qualified(schema, name);
    let retired = format!("{}__retired", name);
    let mut out = vec![format!(
        "ALTER TYPE {} RENAME TO {};",
        ty,
        sql::ident(&retired)
    )];
    out.push(sql::create_enum(
        schema,
        &EnumInfo::new(name, values.iter().cloned()),
    ));

    for (table, column) in columns {
        let col = sql::ident(&column.name);
        let alter =
            |action: String| sql::alter_table(schema, table, &format!("ALTER COLUMN {} {}", col, action));
        if column.default.is_some() {
            out.push(alter("DROP DEFAULT".into()));
        }
        out.push(alter(format!("TYPE {} USING {}::text::{}", ty, col, ty)));
        if let Some(default) = &column.default {
            out.push(alter(format!("SET DEFAULT {}", default.expression)));
        }
    }

    out.push(sql::drop_type(schema, &retired));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlannerOptions;
    use pretty_assertions::assert_eq;
    use schemashift_schema::{SchemaModel, TableInfo};

    fn model(values: &[&str]) -> SchemaModel {
        SchemaModel::builder("public")
            .enum_type(EnumInfo::new("status", values.iter().copied()))
            .table(
                TableInfo::new("posts")
                    .column(ColumnInfo::enumeration("status", "status").default_value("'draft'")),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_add_value_before_existing_label() {
        let remote = model(&["draft", "archived"]);
        let local = model(&["draft", "published", "archived"]);
        let ctx = GeneratorContext::new(&local, &remote, &PlannerOptions::default());

        let cs = add_enum_value(&ctx, &local.enums["status"], &remote.enums["status"], "published");
        assert_eq!(
            cs.up[0].sql,
            "ALTER TYPE \"public\".\"status\" ADD VALUE 'published' BEFORE 'archived';"
        );
        assert!(!cs.transaction);
        assert!(cs.down[1].sql.contains("ENUM ('draft', 'archived')"));
    }

    #[test]
    fn test_remove_value_recreates_type() {
        let remote = model(&["draft", "archived", "deleted"]);
        let local = model(&["draft"]);
        let ctx = GeneratorContext::new(&local, &remote, &PlannerOptions::default());

        let cs = remove_enum_value(&ctx, "status", &remote.enums["status"], "archived").unwrap();
        assert_eq!(cs.phase, Phase::Alter);
        assert_eq!(
            cs.up.iter().map(|op| op.sql.as_str()).collect::<Vec<_>>(),
            vec![
                "ALTER TYPE \"public\".\"status\" RENAME TO \"status__retired\";",
                "CREATE TYPE \"public\".\"status\" AS ENUM ('draft');",
                "ALTER TABLE \"public\".\"posts\" ALTER COLUMN \"status\" DROP DEFAULT;",
                "ALTER TABLE \"public\".\"posts\" ALTER COLUMN \"status\" TYPE \"public\".\"status\" USING \"status\"::text::\"public\".\"status\";",
                "ALTER TABLE \"public\".\"posts\" ALTER COLUMN \"status\" SET DEFAULT 'draft';",
                "DROP TYPE \"public\".\"status__retired\";",
            ]
        );
        assert!(cs.down[1].sql.contains("('draft', 'archived', 'deleted')"));

        // Only the first removed label generates.
        assert!(remove_enum_value(&ctx, "status", &remote.enums["status"], "deleted").is_none());
    }

    #[test]
    fn test_remove_value_skips_column_leaving_the_enum() {
        let remote = model(&["draft", "archived"]);
        let local = SchemaModel::builder("public")
            .enum_type(EnumInfo::new("status", ["draft"]))
            .table(TableInfo::new("posts").column(ColumnInfo::new("status", "text")))
            .build()
            .unwrap();
        let ctx = GeneratorContext::new(&local, &remote, &PlannerOptions::default());

        let cs = remove_enum_value(&ctx, "status", &remote.enums["status"], "archived").unwrap();
        assert!(cs.up.iter().chain(&cs.down).all(|op| !op.sql.contains("\"posts\"")));
        assert_eq!(cs.up.len(), 3);
    }

    #[test]
    fn test_remove_value_recasts_column_dropped_later() {
        let remote = model(&["draft", "archived"]);
        let local = SchemaModel::builder("public")
            .enum_type(EnumInfo::new("status", ["draft"]))
            .table(TableInfo::new("posts").column(ColumnInfo::new("title", "text")))
            .build()
            .unwrap();
        let ctx = GeneratorContext::new(&local, &remote, &PlannerOptions::default());

        let cs = remove_enum_value(&ctx, "status", &remote.enums["status"], "archived").unwrap();
        assert!(cs.up.iter().any(|op| op.sql.contains(
            "ALTER TABLE \"public\".\"posts\" ALTER COLUMN \"status\" TYPE"
        )));
    }

    #[test]
    fn test_with_additions_matches_add_value_placement() {
        let old = EnumInfo::new("s", ["a", "d"]);
        let new = EnumInfo::new("s", ["a", "b", "c", "d", "e"]);
        assert_eq!(with_additions(&old, &new), vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn test_extension_update_needs_both_versions() {
        let local = SchemaModel::new("public");
        let remote = SchemaModel::new("public");
        let ctx = GeneratorContext::new(&local, &remote, &PlannerOptions::default());

        let new = ExtensionInfo::new("postgis").version("3.4");
        let old = ExtensionInfo::new("postgis").version("3.3");
        let cs = update_extension(&ctx, &new, &old).unwrap();
        assert_eq!(cs.up[0].sql, "ALTER EXTENSION \"postgis\" UPDATE TO '3.4';");
        assert_eq!(cs.down[0].sql, "ALTER EXTENSION \"postgis\" UPDATE TO '3.3';");

        assert!(update_extension(&ctx, &ExtensionInfo::new("postgis"), &old).is_none());
    }
}
