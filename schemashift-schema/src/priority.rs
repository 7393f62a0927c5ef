//! Foreign-key aware table ordering.

use std::collections::VecDeque;

use indexmap::{IndexMap, IndexSet};
use tracing::warn;

use crate::model::SchemaModel;

/// Order tables so every table comes after the tables it references.
///
/// Uses Kahn's algorithm. Ties are broken by declaration order, so the result
/// is deterministic. Self-references and references to tables outside the
/// schema are ignored. Tables caught in a reference cycle cannot be ordered
/// and are appended in declaration order.
pub fn table_priorities(model: &SchemaModel) -> Vec<String> {
    // table -> tables it depends on
    let mut dependencies: IndexMap<&str, IndexSet<&str>> = IndexMap::new();
    for (name, table) in &model.tables {
        let deps = table
            .referenced_tables(&model.schema_name)
            .filter(|referenced| *referenced != name.as_str())
            .filter(|referenced| model.tables.contains_key(*referenced))
            .collect();
        dependencies.insert(name.as_str(), deps);
    }

    let mut in_degree: IndexMap<&str, usize> = dependencies
        .iter()
        .map(|(name, deps)| (*name, deps.len()))
        .collect();

    let mut queue: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(name, _)| *name)
        .collect();

    let mut ordered: Vec<String> = Vec::with_capacity(dependencies.len());
    while let Some(current) = queue.pop_front() {
        ordered.push(current.to_string());

        // Dependents are visited in declaration order.
        for (name, deps) in &dependencies {
            if !deps.contains(current) {
                continue;
            }
            if let Some(degree) = in_degree.get_mut(name) {
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(*name);
                }
            }
        }
    }

    if ordered.len() < dependencies.len() {
        let cyclic: Vec<&str> = dependencies
            .keys()
            .copied()
            .filter(|name| !ordered.iter().any(|o| o.as_str() == *name))
            .collect();
        warn!(
            schema = %model.schema_name,
            tables = ?cyclic,
            "foreign key cycle detected, falling back to declaration order"
        );
        ordered.extend(cyclic.into_iter().map(String::from));
    }

    ordered
}
