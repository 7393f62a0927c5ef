//! Changeset ordering.
//!
//! The sort key is `(priority, tie)`. Priority tiers never collide across
//! changeset kinds, so the tie-break only ever compares changesets of one
//! kind: table creates follow the local FK order, table drops the reversed
//! remote FK order, and everything else keeps diff order (the sort is stable).

use crate::changeset::{Changeset, ChangesetKind};
use crate::context::GeneratorContext;

/// Order changesets for execution.
pub fn order(mut changesets: Vec<Changeset>, ctx: &GeneratorContext<'_>) -> Vec<Changeset> {
    changesets.sort_by_cached_key(|cs| (cs.priority, tie_break(cs, ctx)));
    changesets
}

fn tie_break(cs: &Changeset, ctx: &GeneratorContext<'_>) -> usize {
    let Some(table) = cs.table_name.as_deref() else {
        return 0;
    };
    match cs.kind {
        ChangesetKind::CreateTable => ctx.creation_rank(table),
        // Dependents first: the table created last is dropped first.
        ChangesetKind::DropTable => usize::MAX - ctx.remote_rank(table),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlannerOptions;
    use crate::diff::diff;
    use crate::generate::generate_all;
    use pretty_assertions::assert_eq;
    use schemashift_schema::{ColumnInfo, ForeignKey, PrimaryKey, SchemaModel, TableInfo};

    fn shop() -> SchemaModel {
        // Declared dependents first so declaration order differs from FK order.
        SchemaModel::builder("public")
            .table(
                TableInfo::new("order_items")
                    .column(ColumnInfo::new("order_id", "bigint").not_null())
                    .foreign_key(ForeignKey::new("order_items_order_fk", ["order_id"], "orders", ["id"])),
            )
            .table(
                TableInfo::new("orders")
                    .column(ColumnInfo::new("id", "bigint").not_null())
                    .column(ColumnInfo::new("user_id", "bigint").not_null())
                    .primary_key(PrimaryKey::new("orders_pkey", ["id"]))
                    .foreign_key(ForeignKey::new("orders_user_fk", ["user_id"], "users", ["id"])),
            )
            .table(
                TableInfo::new("users")
                    .column(ColumnInfo::new("id", "bigint").not_null())
                    .primary_key(PrimaryKey::new("users_pkey", ["id"])),
            )
            .build()
            .unwrap()
    }

    fn tables_of(changesets: &[Changeset], kind: ChangesetKind) -> Vec<&str> {
        changesets
            .iter()
            .filter(|cs| cs.kind == kind)
            .filter_map(|cs| cs.table_name.as_deref())
            .collect()
    }

    #[test]
    fn test_creates_follow_fk_order() {
        let local = shop();
        let remote = SchemaModel::new("public");
        let ctx = GeneratorContext::new(&local, &remote, &PlannerOptions::default());
        let ordered = order(generate_all(&diff(&remote, &local), &ctx), &ctx);

        assert_eq!(
            tables_of(&ordered, ChangesetKind::CreateTable),
            vec!["users", "orders", "order_items"]
        );
    }

    #[test]
    fn test_drops_follow_reverse_fk_order() {
        let local = SchemaModel::new("public");
        let remote = shop();
        let ctx = GeneratorContext::new(&local, &remote, &PlannerOptions::default());
        let ordered = order(generate_all(&diff(&remote, &local), &ctx), &ctx);

        assert_eq!(
            tables_of(&ordered, ChangesetKind::DropTable),
            vec!["order_items", "orders", "users"]
        );
    }

    #[test]
    fn test_priorities_are_monotonic() {
        let local = shop();
        let remote = SchemaModel::new("public");
        let ctx = GeneratorContext::new(&local, &remote, &PlannerOptions::default());
        let ordered = order(generate_all(&diff(&remote, &local), &ctx), &ctx);

        assert!(ordered.windows(2).all(|w| w[0].priority <= w[1].priority));
    }
}
