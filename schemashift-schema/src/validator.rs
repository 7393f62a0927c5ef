//! Structural validation of schema models.

use std::collections::HashSet;

use tracing::debug;

use crate::error::{SchemaError, SchemaResult};
use crate::model::SchemaModel;

/// Check that every schema in a declaration set has a distinct name.
///
/// Runs before any diff is computed.
pub fn validate_schema_names(models: &[&SchemaModel]) -> SchemaResult<()> {
    let mut seen = HashSet::new();
    for model in models {
        if !seen.insert(model.schema_name.as_str()) {
            return Err(SchemaError::duplicate_schema_name(&model.schema_name));
        }
    }
    Ok(())
}

/// Check that keys and constraints only reference columns their table has.
pub fn validate_model(model: &SchemaModel) -> SchemaResult<()> {
    for table in model.tables.values() {
        table.validate_columns()?;
        for index in table.indexes.values() {
            for column in &index.columns {
                // Expression indexes list expressions, not column names.
                if column.contains('(') {
                    continue;
                }
                if !table.columns.contains_key(column) {
                    return Err(SchemaError::unknown_column(&table.name, &index.name, column));
                }
            }
        }
    }
    debug!(schema = %model.schema_name, tables = model.tables.len(), "schema validated");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::IndexDef;
    use crate::model::{ColumnInfo, TableInfo};

    #[test]
    fn test_distinct_names_pass() {
        let a = SchemaModel::new("public");
        let b = SchemaModel::new("audit");
        assert!(validate_schema_names(&[&a, &b]).is_ok());
    }

    #[test]
    fn test_duplicate_names_fail() {
        let a = SchemaModel::new("public");
        let b = SchemaModel::new("public");
        let err = validate_schema_names(&[&a, &b]).unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateSchemaName { ref name } if name == "public"));
    }

    #[test]
    fn test_index_on_unknown_column() {
        let mut model = SchemaModel::new("public");
        model.tables.insert(
            "users".into(),
            TableInfo::new("users")
                .column(ColumnInfo::new("email", "text"))
                .index(IndexDef::new("users_name_idx", ["name"])),
        );
        assert!(matches!(
            validate_model(&model),
            Err(SchemaError::UnknownColumn { .. })
        ));
    }

    #[test]
    fn test_expression_index_is_skipped() {
        let mut model = SchemaModel::new("public");
        model.tables.insert(
            "users".into(),
            TableInfo::new("users")
                .column(ColumnInfo::new("email", "text"))
                .index(IndexDef::new("users_lower_email_idx", ["lower(email)"])),
        );
        assert!(validate_model(&model).is_ok());
    }
}
