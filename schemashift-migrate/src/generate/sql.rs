//! PostgreSQL statement rendering shared by the generators.
//!
//! Every identifier is quoted and every table, type and index is schema
//! qualified, so statements never depend on `search_path`.

use schemashift_schema::{
    CheckConstraint, ColumnInfo, EnumInfo, ExtensionInfo, ForeignKey, IndexDef, PrimaryKey,
    TableInfo, TriggerDef, UniqueConstraint,
};

/// Quote an identifier.
pub fn ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Schema-qualified, quoted name.
pub fn qualified(schema: &str, name: &str) -> String {
    format!("{}.{}", ident(schema), ident(name))
}

/// Quote a string literal.
pub fn literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn ident_list(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| ident(c))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Index keys are quoted unless they are expressions.
fn index_key_list(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| {
            if c.contains('(') || c.contains(' ') {
                c.clone()
            } else {
                ident(c)
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Column type, qualified when it names an enum.
pub fn column_type(schema: &str, column: &ColumnInfo) -> String {
    if column.is_enum {
        qualified(schema, &column.data_type)
    } else {
        column.data_type.clone()
    }
}

/// Column definition as used in `CREATE TABLE` and `ADD COLUMN`.
pub fn column_definition(schema: &str, column: &ColumnInfo) -> String {
    let mut sql = format!("{} {}", ident(&column.name), column_type(schema, column));
    if let Some(keyword) = column.identity.generated_keyword() {
        sql.push_str(&format!(" GENERATED {} AS IDENTITY", keyword));
    }
    if let Some(default) = &column.default {
        sql.push_str(&format!(" DEFAULT {}", default.expression));
    }
    if !column.nullable {
        sql.push_str(" NOT NULL");
    }
    sql
}

pub fn primary_key_clause(pk: &PrimaryKey) -> String {
    format!(
        "CONSTRAINT {} PRIMARY KEY ({})",
        ident(&pk.name),
        ident_list(&pk.columns)
    )
}

pub fn unique_clause(uc: &UniqueConstraint) -> String {
    format!(
        "CONSTRAINT {} UNIQUE{} ({})",
        ident(&uc.name),
        if uc.nulls_not_distinct {
            " NULLS NOT DISTINCT"
        } else {
            ""
        },
        ident_list(&uc.columns)
    )
}

pub fn check_clause(check: &CheckConstraint) -> String {
    format!("CONSTRAINT {} CHECK ({})", ident(&check.name), check.expression)
}

/// Foreign key clause. References without an explicit schema stay in `schema`.
pub fn foreign_key_clause(schema: &str, fk: &ForeignKey) -> String {
    let referenced_schema = fk.referenced_schema.as_deref().unwrap_or(schema);
    format!(
        "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {} ON UPDATE {}",
        ident(&fk.name),
        ident_list(&fk.columns),
        qualified(referenced_schema, &fk.referenced_table),
        ident_list(&fk.referenced_columns),
        fk.on_delete.as_sql(),
        fk.on_update.as_sql()
    )
}

/// `CREATE TABLE` with columns and every constraint inline.
pub fn create_table(schema: &str, table: &TableInfo) -> String {
    let mut lines: Vec<String> = table
        .columns
        .values()
        .map(|c| column_definition(schema, c))
        .collect();
    if let Some(pk) = &table.primary_key {
        lines.push(primary_key_clause(pk));
    }
    lines.extend(table.unique_constraints.values().map(unique_clause));
    lines.extend(table.check_constraints.values().map(check_clause));
    lines.extend(
        table
            .foreign_keys
            .values()
            .map(|fk| foreign_key_clause(schema, fk)),
    );

    format!(
        "CREATE TABLE {} (\n    {}\n);",
        qualified(schema, &table.name),
        lines.join(",\n    ")
    )
}

pub fn drop_table(schema: &str, table: &str) -> String {
    format!("DROP TABLE {};", qualified(schema, table))
}

pub fn create_index(schema: &str, table: &str, index: &IndexDef, concurrently: bool) -> String {
    let mut sql = format!(
        "CREATE {}INDEX {}{} ON {} USING {} ({})",
        if index.unique { "UNIQUE " } else { "" },
        if concurrently { "CONCURRENTLY " } else { "" },
        ident(&index.name),
        qualified(schema, table),
        index.method,
        index_key_list(&index.columns)
    );
    if let Some(predicate) = &index.predicate {
        sql.push_str(&format!(" WHERE {}", predicate));
    }
    sql.push(';');
    sql
}

pub fn drop_index(schema: &str, name: &str, concurrently: bool) -> String {
    format!(
        "DROP INDEX {}{};",
        if concurrently { "CONCURRENTLY " } else { "" },
        qualified(schema, name)
    )
}

pub fn create_trigger(schema: &str, table: &str, trigger: &TriggerDef) -> String {
    let events: Vec<&str> = trigger.events.iter().map(|e| e.as_sql()).collect();
    let mut sql = format!(
        "CREATE TRIGGER {} {} {} ON {} FOR EACH {}",
        ident(&trigger.name),
        trigger.timing.as_sql(),
        events.join(" OR "),
        qualified(schema, table),
        if trigger.for_each_row { "ROW" } else { "STATEMENT" }
    );
    if let Some(condition) = &trigger.condition {
        sql.push_str(&format!(" WHEN ({})", condition));
    }
    sql.push_str(&format!(" EXECUTE FUNCTION {};", trigger.function));
    sql
}

pub fn drop_trigger(schema: &str, table: &str, name: &str) -> String {
    format!("DROP TRIGGER {} ON {};", ident(name), qualified(schema, table))
}

pub fn alter_table(schema: &str, table: &str, action: &str) -> String {
    format!("ALTER TABLE {} {};", qualified(schema, table), action)
}

pub fn drop_constraint(schema: &str, table: &str, name: &str) -> String {
    alter_table(schema, table, &format!("DROP CONSTRAINT {}", ident(name)))
}

pub fn create_enum(schema: &str, info: &EnumInfo) -> String {
    let values: Vec<String> = info.values.iter().map(|v| literal(v)).collect();
    format!(
        "CREATE TYPE {} AS ENUM ({});",
        qualified(schema, &info.name),
        values.join(", ")
    )
}

pub fn drop_type(schema: &str, name: &str) -> String {
    format!("DROP TYPE {};", qualified(schema, name))
}

pub fn create_extension(schema: &str, ext: &ExtensionInfo) -> String {
    let mut sql = format!(
        "CREATE EXTENSION IF NOT EXISTS {} WITH SCHEMA {}",
        ident(&ext.name),
        ident(schema)
    );
    if let Some(version) = &ext.version {
        sql.push_str(&format!(" VERSION {}", literal(version)));
    }
    sql.push(';');
    sql
}

pub fn drop_extension(name: &str) -> String {
    format!("DROP EXTENSION IF EXISTS {};", ident(name))
}
