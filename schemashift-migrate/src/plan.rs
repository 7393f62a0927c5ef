//! Planning: diff, resolve renames, generate and order.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use schemashift_schema::{SchemaModel, validate_schema_names};
use tracing::{debug, info, warn};

use crate::changeset::{Changeset, Phase, Warning};
use crate::config::PlannerOptions;
use crate::context::GeneratorContext;
use crate::diff::diff;
use crate::error::{MigrateResult, MigrationError};
use crate::generate::generate_all;
use crate::migration::{Migration, migration_name};
use crate::order::order;
use crate::rename::{RenameDecider, RenameResolver};

/// The ordered changesets that turn one remote schema into its local declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationPlan {
    /// Schema the plan applies to.
    pub schema_name: String,
    /// Changesets in execution order.
    pub changesets: Vec<Changeset>,
}

impl MigrationPlan {
    /// Plan the changes from `remote` to `local`.
    ///
    /// The decider is the only external call made; an error from it aborts
    /// planning before any changeset exists.
    pub fn build(
        local: &SchemaModel,
        remote: &SchemaModel,
        decider: &mut dyn RenameDecider,
        options: &PlannerOptions,
    ) -> MigrateResult<Self> {
        if local.schema_name != remote.schema_name {
            return Err(MigrationError::config(format!(
                "cannot plan '{}' against introspected schema '{}'",
                local.schema_name, remote.schema_name
            )));
        }

        let entries = diff(remote, local);
        debug!(schema = %local.schema_name, entries = entries.len(), "schema diff computed");

        let mut ctx = GeneratorContext::new(local, remote, options);
        let entries = RenameResolver::new(decider).resolve(entries, &mut ctx)?;

        // Context is read-only from here on.
        let ctx = ctx;
        let changesets = order(generate_all(&entries, &ctx), &ctx);

        let plan = Self {
            schema_name: local.schema_name.clone(),
            changesets,
        };

        let warnings: Vec<String> = plan.warnings().map(|(_, w)| w.message()).collect();
        for message in &warnings {
            warn!(schema = %plan.schema_name, "{}", message);
        }
        if options.warnings_as_errors && !warnings.is_empty() {
            return Err(MigrationError::UnsafeChange(warnings));
        }

        info!(schema = %plan.schema_name, "{}", plan.summary());
        Ok(plan)
    }

    /// Plan several schemas at once.
    ///
    /// Declared schema names must be unique; this is checked before any diff runs.
    pub fn build_all(
        pairs: &[(&SchemaModel, &SchemaModel)],
        decider: &mut dyn RenameDecider,
        options: &PlannerOptions,
    ) -> MigrateResult<Vec<Self>> {
        let locals: Vec<&SchemaModel> = pairs.iter().map(|(local, _)| *local).collect();
        validate_schema_names(&locals)?;

        pairs
            .iter()
            .map(|(local, remote)| Self::build(local, remote, &mut *decider, options))
            .collect()
    }

    /// Whether there is nothing to do.
    pub fn is_empty(&self) -> bool {
        self.changesets.is_empty()
    }

    /// Number of changesets.
    pub fn len(&self) -> usize {
        self.changesets.len()
    }

    /// Every warning with the changeset it belongs to.
    pub fn warnings(&self) -> impl Iterator<Item = (&Changeset, &Warning)> {
        self.changesets
            .iter()
            .flat_map(|cs| cs.warnings.iter().map(move |w| (cs, w)))
    }

    /// Changesets grouped by phase, in phase order, preserving execution order.
    pub fn by_phase(&self) -> IndexMap<Phase, Vec<&Changeset>> {
        let mut groups: IndexMap<Phase, Vec<&Changeset>> = IndexMap::new();
        for phase in Phase::ALL {
            let changesets: Vec<&Changeset> =
                self.changesets.iter().filter(|cs| cs.phase == phase).collect();
            if !changesets.is_empty() {
                groups.insert(phase, changesets);
            }
        }
        groups
    }

    /// One-line description of the plan.
    pub fn summary(&self) -> String {
        if self.is_empty() {
            return format!("No changes for schema '{}'", self.schema_name);
        }

        let phases: Vec<String> = self
            .by_phase()
            .iter()
            .map(|(phase, changesets)| format!("{} {}", changesets.len(), phase))
            .collect();
        let warnings = self.warnings().count();

        let mut summary = format!(
            "{} changeset(s) for schema '{}' ({})",
            self.len(),
            self.schema_name,
            phases.join(", ")
        );
        if warnings > 0 {
            summary.push_str(&format!(", {} warning(s)", warnings));
        }
        summary
    }

    /// Split into one migration per phase.
    ///
    /// Each migration is named `<timestamp>_<phase>` and chains onto the
    /// current head of its phase in `heads`.
    pub fn to_migrations(
        &self,
        timestamp: DateTime<Utc>,
        heads: &HashMap<Phase, String>,
    ) -> Vec<Migration> {
        self.by_phase()
            .into_iter()
            .map(|(phase, changesets)| {
                Migration::from_changesets(
                    migration_name(timestamp, phase.as_str()),
                    phase,
                    heads.get(&phase).cloned(),
                    &changesets,
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changeset::{ChangesetKind, priority};
    use crate::rename::{AlwaysCreate, RenameMap};
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use schemashift_schema::{ColumnInfo, PrimaryKey, SchemaError, TableInfo};

    fn users(extra: ColumnInfo) -> SchemaModel {
        SchemaModel::builder("public")
            .table(
                TableInfo::new("users")
                    .column(ColumnInfo::new("id", "serial").not_null())
                    .column(extra)
                    .primary_key(PrimaryKey::new("users_pkey", ["id"])),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_create_only_plan() {
        let local = users(ColumnInfo::new("email", "text").not_null());
        let remote = SchemaModel::new("public");
        let plan =
            MigrationPlan::build(&local, &remote, &mut AlwaysCreate, &PlannerOptions::default())
                .unwrap();

        assert_eq!(plan.len(), 1);
        let cs = &plan.changesets[0];
        assert_eq!(cs.kind, ChangesetKind::CreateTable);
        assert_eq!(cs.phase, Phase::Expand);
        assert_eq!(cs.priority, priority::CREATE_TABLE);
    }

    #[test]
    fn test_unchanged_schema_is_empty() {
        let local = users(ColumnInfo::new("email", "text"));
        let plan = MigrationPlan::build(
            &local,
            &local.clone(),
            &mut AlwaysCreate,
            &PlannerOptions::default(),
        )
        .unwrap();

        assert!(plan.is_empty());
        assert_eq!(plan.summary(), "No changes for schema 'public'");
    }

    #[test]
    fn test_warnings_as_errors() {
        let local = users(ColumnInfo::new("full_name", "text"));
        let remote = users(ColumnInfo::new("name", "text"));
        let options = PlannerOptions::default().warnings_as_errors(true);

        let err = MigrationPlan::build(&local, &remote, &mut AlwaysCreate, &options).unwrap_err();
        assert!(matches!(err, MigrationError::UnsafeChange(ref w) if w.len() == 1));
    }

    #[test]
    fn test_rename_map_plan() {
        let local = users(ColumnInfo::new("full_name", "text"));
        let remote = users(ColumnInfo::new("name", "text"));
        let mut renames = RenameMap::new().column("users", "name", "full_name");
        let plan =
            MigrationPlan::build(&local, &remote, &mut renames, &PlannerOptions::default())
                .unwrap();

        assert_eq!(plan.len(), 1);
        assert_eq!(plan.changesets[0].kind, ChangesetKind::RenameColumn);
        assert!(plan.summary().contains("1 alter"));
    }

    #[test]
    fn test_duplicate_schema_names_fail_before_diff() {
        let a = SchemaModel::new("public");
        let b = SchemaModel::new("public");
        let err = MigrationPlan::build_all(
            &[(&a, &a), (&b, &b)],
            &mut AlwaysCreate,
            &PlannerOptions::default(),
        )
        .unwrap_err();

        assert!(matches!(
            err,
            MigrationError::Schema(SchemaError::DuplicateSchemaName { .. })
        ));
    }

    #[test]
    fn test_to_migrations_splits_by_phase() {
        let local = users(ColumnInfo::new("email", "text"));
        let remote = users(ColumnInfo::new("name", "text"));
        let plan =
            MigrationPlan::build(&local, &remote, &mut AlwaysCreate, &PlannerOptions::default())
                .unwrap();

        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let heads = HashMap::from([(Phase::Contract, "20231231000000_contract".to_string())]);
        let migrations = plan.to_migrations(ts, &heads);

        let names: Vec<&str> = migrations.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["20240102030405_expand", "20240102030405_contract"]
        );
        assert_eq!(migrations[0].depends_on, None);
        assert_eq!(
            migrations[1].depends_on.as_deref(),
            Some("20231231000000_contract")
        );
    }
}
