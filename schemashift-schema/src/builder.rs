//! Fluent construction of [`SchemaModel`] values.
//!
//! The declaration layer and tests build their local schema through this
//! builder. `build()` validates the result and computes table priorities.

use crate::error::{SchemaError, SchemaResult};
use crate::model::{EnumInfo, ExtensionInfo, SchemaModel, TableInfo};
use crate::validator::validate_model;

/// Builder for a [`SchemaModel`].
#[derive(Debug, Clone)]
pub struct SchemaBuilder {
    model: SchemaModel,
    duplicates: Vec<String>,
}

impl SchemaBuilder {
    /// Start a schema named `schema_name`.
    pub fn new(schema_name: impl Into<String>) -> Self {
        Self {
            model: SchemaModel::new(schema_name),
            duplicates: Vec::new(),
        }
    }

    /// Mark the schema as absent.
    pub fn missing(mut self) -> Self {
        self.model.exists = false;
        self
    }

    /// Add an extension.
    pub fn extension(mut self, extension: ExtensionInfo) -> Self {
        self.model
            .extensions
            .insert(extension.name.clone(), extension);
        self
    }

    /// Add an enum type.
    pub fn enum_type(mut self, info: EnumInfo) -> Self {
        self.model.enums.insert(info.name.clone(), info);
        self
    }

    /// Add a table.
    pub fn table(mut self, table: TableInfo) -> Self {
        if self.model.tables.contains_key(&table.name) {
            self.duplicates.push(table.name.clone());
        }
        self.model.tables.insert(table.name.clone(), table);
        self
    }

    /// Validate and finish the model.
    pub fn build(self) -> SchemaResult<SchemaModel> {
        let Self {
            mut model,
            duplicates,
        } = self;

        if let Some(table) = duplicates.into_iter().next() {
            return Err(SchemaError::DuplicateTable {
                schema: model.schema_name,
                table,
            });
        }

        validate_model(&model)?;
        model.refresh_priorities();
        Ok(model)
    }
}
