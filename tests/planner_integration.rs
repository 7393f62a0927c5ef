//! End-to-end planning tests: declared and introspected schemas in, ordered
//! changesets out.

use pretty_assertions::assert_eq;
use schemashift::prelude::*;
use schemashift::migrate::{DdlOp, MigrateResult, MigrationError, priority};

/// Confirms every rename candidate offered first.
struct ConfirmFirst;

impl RenameDecider for ConfirmFirst {
    fn decide_table(
        &mut self,
        _schema: &str,
        _added: &str,
        candidates: &[String],
    ) -> MigrateResult<RenameDecision> {
        Ok(RenameDecision::Rename {
            from: candidates[0].clone(),
        })
    }

    fn decide_column(
        &mut self,
        _schema: &str,
        _table: &str,
        _added: &str,
        candidates: &[String],
    ) -> MigrateResult<RenameDecision> {
        Ok(RenameDecision::Rename {
            from: candidates[0].clone(),
        })
    }
}

/// Aborts planning, as an interactive prompt would on Ctrl-C.
struct Cancel;

impl RenameDecider for Cancel {
    fn decide_table(&mut self, _: &str, added: &str, _: &[String]) -> MigrateResult<RenameDecision> {
        Err(MigrationError::RenameCancelled(added.to_string()))
    }

    fn decide_column(
        &mut self,
        _: &str,
        table: &str,
        added: &str,
        _: &[String],
    ) -> MigrateResult<RenameDecision> {
        Err(MigrationError::RenameCancelled(format!("{}.{}", table, added)))
    }
}

fn users_table(second: ColumnInfo) -> TableInfo {
    TableInfo::new("users")
        .column(ColumnInfo::new("id", "serial").not_null())
        .column(second)
        .primary_key(PrimaryKey::new("users_pkey", ["id"]))
}

fn schema(tables: Vec<TableInfo>) -> SchemaModel {
    tables
        .into_iter()
        .fold(SchemaModel::builder("public"), |b, t| b.table(t))
        .build()
        .unwrap()
}

fn shop() -> SchemaModel {
    schema(vec![
        users_table(ColumnInfo::new("email", "text").not_null())
            .index(IndexDef::new("users_email_idx", ["email"]).unique()),
        TableInfo::new("orders")
            .column(ColumnInfo::new("id", "bigserial").not_null())
            .column(ColumnInfo::new("user_id", "integer").not_null())
            .column(ColumnInfo::new("total", "numeric(10,2)").not_null().default_value("0"))
            .primary_key(PrimaryKey::new("orders_pkey", ["id"]))
            .check(CheckConstraint::new("orders_total_check", "total >= 0"))
            .foreign_key(ForeignKey::new("orders_user_id_fkey", ["user_id"], "users", ["id"]))
            .index(IndexDef::new("orders_user_id_idx", ["user_id"])),
    ])
}

fn plan(local: &SchemaModel, remote: &SchemaModel, decider: &mut dyn RenameDecider) -> MigrationPlan {
    MigrationPlan::build(local, remote, decider, &PlannerOptions::default()).unwrap()
}

#[test]
fn test_new_table_is_single_expand_create() {
    let local = schema(vec![users_table(ColumnInfo::new("email", "text").not_null())]);
    let remote = SchemaModel::new("public");

    let plan = plan(&local, &remote, &mut AlwaysCreate);

    assert_eq!(plan.changesets.len(), 1);
    let cs = &plan.changesets[0];
    assert_eq!(cs.kind, ChangesetKind::CreateTable);
    assert_eq!(cs.phase, Phase::Expand);
    assert_eq!(cs.priority, priority::CREATE_TABLE);
    assert_eq!(cs.table_name.as_deref(), Some("users"));
    assert_eq!(
        cs.up[0].sql,
        "CREATE TABLE \"public\".\"users\" (\n    \"id\" serial NOT NULL,\n    \"email\" text NOT NULL,\n    CONSTRAINT \"users_pkey\" PRIMARY KEY (\"id\")\n);"
    );
    assert_eq!(cs.down[0].sql, "DROP TABLE \"public\".\"users\";");
}

#[test]
fn test_dependent_table_dropped_first() {
    let remote = shop();
    let local = SchemaModel::new("public");

    let plan = plan(&local, &remote, &mut AlwaysCreate);
    let drops: Vec<&str> = plan
        .changesets
        .iter()
        .filter(|cs| cs.kind == ChangesetKind::DropTable)
        .filter_map(|cs| cs.table_name.as_deref())
        .collect();

    assert_eq!(drops, vec!["orders", "users"]);
    assert!(plan.changesets.iter().all(|cs| cs.phase == Phase::Contract));
}

#[test]
fn test_referenced_table_created_first() {
    let local = shop();
    let remote = SchemaModel::new("public");

    let plan = plan(&local, &remote, &mut AlwaysCreate);
    let kinds: Vec<(ChangesetKind, Option<&str>)> = plan
        .changesets
        .iter()
        .map(|cs| (cs.kind, cs.table_name.as_deref()))
        .collect();

    assert_eq!(
        kinds,
        vec![
            (ChangesetKind::CreateTable, Some("users")),
            (ChangesetKind::CreateTable, Some("orders")),
            (ChangesetKind::CreateIndex, Some("users")),
            (ChangesetKind::CreateIndex, Some("orders")),
        ]
    );
    // Indexes on new tables are built inline.
    assert!(plan.changesets.iter().all(|cs| cs.transaction));
}

#[test]
fn test_confirmed_column_rename() {
    let remote = schema(vec![users_table(ColumnInfo::new("name", "text"))]);
    let local = schema(vec![users_table(ColumnInfo::new("full_name", "text"))]);

    let plan = plan(&local, &remote, &mut ConfirmFirst);

    assert_eq!(plan.changesets.len(), 1);
    let cs = &plan.changesets[0];
    assert_eq!(cs.kind, ChangesetKind::RenameColumn);
    assert_eq!(cs.phase, Phase::Alter);
    assert_eq!(
        cs.warnings,
        vec![Warning::BackwardIncompatible {
            from: "name".into(),
            to: "full_name".into(),
        }]
    );
    assert_eq!(
        cs.up[0].sql,
        "ALTER TABLE \"public\".\"users\" RENAME COLUMN \"name\" TO \"full_name\";"
    );
}

#[test]
fn test_declined_column_rename() {
    let remote = schema(vec![users_table(ColumnInfo::new("name", "text"))]);
    let local = schema(vec![users_table(ColumnInfo::new("full_name", "text"))]);

    let plan = plan(&local, &remote, &mut AlwaysCreate);
    let kinds: Vec<(ChangesetKind, Phase)> =
        plan.changesets.iter().map(|cs| (cs.kind, cs.phase)).collect();

    assert_eq!(
        kinds,
        vec![
            (ChangesetKind::DropColumn, Phase::Contract),
            (ChangesetKind::AddColumn, Phase::Expand),
        ]
    );
    assert!(matches!(
        plan.changesets[0].warnings[0],
        Warning::Destructive { column: Some(ref c), .. } if c == "name"
    ));
}

#[test]
fn test_rename_map_from_project_config() {
    let config = ProjectConfig::from_toml(
        r#"
        [renames]
        columns = { "users.name" = "full_name" }
        "#,
    )
    .unwrap();
    let mut renames = config.rename_map().unwrap();

    let remote = schema(vec![users_table(ColumnInfo::new("name", "text"))]);
    let local = schema(vec![users_table(ColumnInfo::new("full_name", "text"))]);

    let plan = plan(&local, &remote, &mut renames);
    assert_eq!(plan.changesets.len(), 1);
    assert_eq!(plan.changesets[0].kind, ChangesetKind::RenameColumn);
}

#[test]
fn test_table_rename_renames_dependents() {
    let remote = shop();
    let accounts = TableInfo::new("accounts")
        .column(ColumnInfo::new("id", "serial").not_null())
        .column(ColumnInfo::new("email", "text").not_null())
        .primary_key(PrimaryKey::new("accounts_pkey", ["id"]))
        .index(IndexDef::new("accounts_email_idx", ["email"]).unique());
    let orders = TableInfo::new("orders")
        .column(ColumnInfo::new("id", "bigserial").not_null())
        .column(ColumnInfo::new("user_id", "integer").not_null())
        .column(ColumnInfo::new("total", "numeric(10,2)").not_null().default_value("0"))
        .primary_key(PrimaryKey::new("orders_pkey", ["id"]))
        .check(CheckConstraint::new("orders_total_check", "total >= 0"))
        .foreign_key(ForeignKey::new("orders_user_id_fkey", ["user_id"], "accounts", ["id"]))
        .index(IndexDef::new("orders_user_id_idx", ["user_id"]));
    let local = schema(vec![accounts, orders]);

    let plan = plan(&local, &remote, &mut ConfirmFirst);
    let kinds: Vec<ChangesetKind> = plan.changesets.iter().map(|cs| cs.kind).collect();

    // The FK now points at the renamed table, so its definition hash changes.
    assert_eq!(
        kinds,
        vec![
            ChangesetKind::DropForeignKey,
            ChangesetKind::RenameTable,
            ChangesetKind::RenameTableDependents,
            ChangesetKind::CreateForeignKey,
        ]
    );

    let dependents = &plan.changesets[2];
    assert_eq!(
        dependents.up.iter().map(|op| op.sql.as_str()).collect::<Vec<_>>(),
        vec![
            "ALTER INDEX \"public\".\"users_email_idx\" RENAME TO \"accounts_email_idx\";",
            "ALTER TABLE \"public\".\"accounts\" RENAME CONSTRAINT \"users_pkey\" TO \"accounts_pkey\";",
        ]
    );
}

#[test]
fn test_cancelled_decision_aborts_plan() {
    let remote = schema(vec![users_table(ColumnInfo::new("name", "text"))]);
    let local = schema(vec![users_table(ColumnInfo::new("full_name", "text"))]);

    let err = MigrationPlan::build(&local, &remote, &mut Cancel, &PlannerOptions::default())
        .unwrap_err();
    assert!(matches!(err, MigrationError::RenameCancelled(ref t) if t == "users.full_name"));
}

#[test]
fn test_planning_is_idempotent() {
    let remote = shop();
    let local = schema(vec![
        users_table(ColumnInfo::new("email", "character varying(320)").not_null()),
        TableInfo::new("invoices")
            .column(ColumnInfo::new("id", "bigserial").not_null())
            .primary_key(PrimaryKey::new("invoices_pkey", ["id"])),
    ]);

    let first = plan(&local, &remote, &mut AlwaysCreate);
    let second = plan(&local, &remote, &mut AlwaysCreate);
    assert_eq!(first, second);
    assert!(!first.is_empty());
}

#[test]
fn test_priorities_never_decrease() {
    let remote = shop();
    let local_users = users_table(ColumnInfo::new("email", "text"))
        .column(ColumnInfo::new("created_at", "timestamptz").not_null().default_value("now()"))
        .column(ColumnInfo::new("nickname", "text"));
    let local = schema(vec![
        local_users.index(IndexDef::new("users_created_at_idx", ["created_at"])),
        TableInfo::new("invoices")
            .column(ColumnInfo::new("id", "bigserial").not_null())
            .column(ColumnInfo::new("user_id", "integer").not_null())
            .primary_key(PrimaryKey::new("invoices_pkey", ["id"]))
            .foreign_key(ForeignKey::new("invoices_user_id_fkey", ["user_id"], "users", ["id"])),
    ]);

    let plan = plan(&local, &remote, &mut AlwaysCreate);
    assert!(plan.len() > 5);
    for pair in plan.changesets.windows(2) {
        assert!(
            pair[0].priority <= pair[1].priority,
            "{} ({}) before {} ({})",
            pair[0].describe(),
            pair[0].priority,
            pair[1].describe(),
            pair[1].priority
        );
    }
}

#[test]
fn test_undo_statements_mirror_up() {
    let remote = shop();
    let local = schema(vec![users_table(
        ColumnInfo::new("email", "text").default_value("''"),
    )]);

    let plan = plan(&local, &remote, &mut AlwaysCreate);
    for cs in &plan.changesets {
        assert!(!cs.up.is_empty(), "{} has no statements", cs.describe());
        assert!(!cs.down.is_empty(), "{} cannot be undone", cs.describe());
    }
}

fn single(plan: &MigrationPlan, kind: ChangesetKind) -> &Changeset {
    let matching: Vec<&Changeset> = plan.changesets.iter().filter(|cs| cs.kind == kind).collect();
    assert_eq!(matching.len(), 1, "expected one {:?} in {}", kind, plan.summary());
    matching[0]
}

fn sql(ops: &[DdlOp]) -> Vec<String> {
    ops.iter().map(|op| op.sql.clone()).collect()
}

/// Plans `from -> to` and `to -> from` and checks that each direction's undo
/// is exactly the other direction's forward DDL.
fn assert_mirrors(
    from: &SchemaModel,
    to: &SchemaModel,
    forward_kind: ChangesetKind,
    backward_kind: ChangesetKind,
    decider: &mut dyn RenameDecider,
) {
    let forward = plan(to, from, decider);
    let backward = plan(from, to, decider);
    let forward = single(&forward, forward_kind);
    let backward = single(&backward, backward_kind);

    assert_eq!(sql(&forward.up), sql(&backward.down));
    assert_eq!(sql(&forward.down), sql(&backward.up));
}

fn users_with(column: ColumnInfo) -> SchemaModel {
    schema(vec![users_table(column)])
}

#[test]
fn test_add_and_drop_column_mirror() {
    let before = users_with(ColumnInfo::new("email", "text"));
    let after = schema(vec![
        users_table(ColumnInfo::new("email", "text"))
            .column(ColumnInfo::new("bio", "text").default_value("''")),
    ]);
    assert_mirrors(
        &before,
        &after,
        ChangesetKind::AddColumn,
        ChangesetKind::DropColumn,
        &mut AlwaysCreate,
    );
}

#[test]
fn test_column_attribute_changes_mirror() {
    let plain = users_with(ColumnInfo::new("email", "text"));

    let with_default = users_with(ColumnInfo::new("email", "text").default_value("'nobody'"));
    assert_mirrors(
        &plain,
        &with_default,
        ChangesetKind::AlterColumnDefault,
        ChangesetKind::AlterColumnDefault,
        &mut AlwaysCreate,
    );

    let required = users_with(ColumnInfo::new("email", "text").not_null());
    assert_mirrors(
        &plain,
        &required,
        ChangesetKind::AlterColumnNullable,
        ChangesetKind::AlterColumnNullable,
        &mut AlwaysCreate,
    );

    let counter = users_with(ColumnInfo::new("seq", "integer").not_null());
    let identity = users_with(
        ColumnInfo::new("seq", "integer")
            .not_null()
            .identity(IdentityKind::Always),
    );
    assert_mirrors(
        &counter,
        &identity,
        ChangesetKind::AlterColumnIdentity,
        ChangesetKind::AlterColumnIdentity,
        &mut AlwaysCreate,
    );
}

#[test]
fn test_index_create_and_drop_mirror() {
    let before = users_with(ColumnInfo::new("email", "text"));
    let after = schema(vec![
        users_table(ColumnInfo::new("email", "text"))
            .index(IndexDef::new("users_email_idx", ["email"]).unique()),
    ]);

    let forward = plan(&after, &before, &mut AlwaysCreate);
    let backward = plan(&before, &after, &mut AlwaysCreate);
    let create = single(&forward, ChangesetKind::CreateIndex);
    let drop = single(&backward, ChangesetKind::DropIndex);

    // The create runs concurrently outside a transaction; the drop and its
    // undo stay transactional, so they build and remove the index inline.
    let inline = |ops: &[DdlOp]| -> Vec<String> {
        ops.iter()
            .map(|op| op.sql.replace(" CONCURRENTLY", ""))
            .collect()
    };
    assert!(!create.transaction);
    assert!(drop.transaction);
    assert_eq!(inline(&create.up), sql(&drop.down));
    assert_eq!(inline(&create.down), sql(&drop.up));
}

#[test]
fn test_constraint_rename_mirrors() {
    let table = |check: &str| {
        schema(vec![
            users_table(ColumnInfo::new("email", "text"))
                .check(CheckConstraint::new(check, "length(email) > 3")),
        ])
    };
    assert_mirrors(
        &table("users_email_check"),
        &table("users_email_length"),
        ChangesetKind::RenameConstraint,
        ChangesetKind::RenameConstraint,
        &mut AlwaysCreate,
    );
}

#[test]
fn test_table_rename_with_dependents_mirrors() {
    let named = |name: &str| {
        schema(vec![
            TableInfo::new(name)
                .column(ColumnInfo::new("id", "serial").not_null())
                .column(ColumnInfo::new("email", "text").not_null())
                .primary_key(PrimaryKey::new(format!("{}_pkey", name), ["id"]))
                .index(IndexDef::new(format!("{}_email_idx", name), ["email"]).unique()),
        ])
    };
    let users = named("users");
    let accounts = named("accounts");

    assert_mirrors(
        &users,
        &accounts,
        ChangesetKind::RenameTable,
        ChangesetKind::RenameTable,
        &mut ConfirmFirst,
    );

    let forward = plan(&accounts, &users, &mut ConfirmFirst);
    let backward = plan(&users, &accounts, &mut ConfirmFirst);
    let forward = single(&forward, ChangesetKind::RenameTableDependents);
    let backward = single(&backward, ChangesetKind::RenameTableDependents);

    // Forward undo runs before the table gets its old name back, the
    // backward plan runs after; the renamed objects pair up either way.
    assert_eq!(
        sql(&forward.down),
        vec![
            "ALTER TABLE \"public\".\"accounts\" RENAME CONSTRAINT \"accounts_pkey\" TO \"users_pkey\";",
            "ALTER INDEX \"public\".\"accounts_email_idx\" RENAME TO \"users_email_idx\";",
        ]
    );
    assert_eq!(
        sql(&backward.up),
        vec![
            "ALTER INDEX \"public\".\"accounts_email_idx\" RENAME TO \"users_email_idx\";",
            "ALTER TABLE \"public\".\"users\" RENAME CONSTRAINT \"accounts_pkey\" TO \"users_pkey\";",
        ]
    );
    assert_eq!(
        sql(&backward.down),
        vec![
            "ALTER TABLE \"public\".\"users\" RENAME CONSTRAINT \"users_pkey\" TO \"accounts_pkey\";",
            "ALTER INDEX \"public\".\"users_email_idx\" RENAME TO \"accounts_email_idx\";",
        ]
    );
}

#[test]
fn test_type_change_away_from_enum_survives_value_removal() {
    let remote = SchemaModel::builder("public")
        .enum_type(EnumInfo::new("status", ["draft", "archived"]))
        .table(TableInfo::new("posts").column(ColumnInfo::enumeration("status", "status")))
        .build()
        .unwrap();
    let local = SchemaModel::builder("public")
        .enum_type(EnumInfo::new("status", ["draft"]))
        .table(TableInfo::new("posts").column(ColumnInfo::new("status", "text")))
        .build()
        .unwrap();

    let plan = plan(&local, &remote, &mut AlwaysCreate);
    let kinds: Vec<ChangesetKind> = plan.changesets.iter().map(|cs| cs.kind).collect();
    assert_eq!(
        kinds,
        vec![ChangesetKind::AlterColumnType, ChangesetKind::RemoveEnumValue]
    );

    let last_cast = plan
        .changesets
        .iter()
        .flat_map(|cs| &cs.up)
        .filter(|op| op.sql.contains("ALTER COLUMN \"status\" TYPE"))
        .last()
        .map(|op| op.sql.as_str());
    assert_eq!(
        last_cast,
        Some("ALTER TABLE \"public\".\"posts\" ALTER COLUMN \"status\" TYPE text USING \"status\"::text::text;")
    );
}
