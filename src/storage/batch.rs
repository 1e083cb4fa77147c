//! Batched conditional updates.
//!
//! One statement applies a distinct value per row:
//!
//! ```text
//! UPDATE posts SET view_count = view_count + CASE id WHEN $1 THEN $2 ... ELSE 0 END
//! WHERE id IN ($3, ...) AND deleted_at IS NULL
//! ```
//!
//! The builders are generic over the sqlx backend so Postgres and SQLite
//! share the exact same SQL shape; only the placeholder syntax differs.
//! Soft-deleted rows are never touched.

use std::collections::BTreeMap;

use sqlx::{Database, Encode, QueryBuilder, Type};

use super::schema::tables;
use crate::entity::LinkStatus;

/// Appends the additive view-count update for `deltas`.
///
/// Callers must not build a statement for an empty map.
pub fn push_view_count_update<'args, DB>(
    qb: &mut QueryBuilder<'args, DB>,
    deltas: &BTreeMap<i64, i64>,
) where
    DB: Database,
    i64: Encode<'args, DB> + Type<DB>,
{
    qb.push(format!(
        "UPDATE {} SET view_count = view_count + CASE id",
        tables::POSTS
    ));
    for (id, delta) in deltas {
        qb.push(" WHEN ").push_bind(*id).push(" THEN ").push_bind(*delta);
    }
    qb.push(" ELSE 0 END");
    push_id_filter(qb, deltas.keys().copied());
}

/// Appends the link status assignment for `updates`.
///
/// Rows outside the map keep their status even if the filter were widened.
pub fn push_link_status_update<'args, DB>(
    qb: &mut QueryBuilder<'args, DB>,
    updates: &BTreeMap<i64, LinkStatus>,
) where
    DB: Database,
    i64: Encode<'args, DB> + Type<DB>,
    i16: Encode<'args, DB> + Type<DB>,
{
    qb.push(format!("UPDATE {} SET status = CASE id", tables::LINKS));
    for (id, status) in updates {
        qb.push(" WHEN ")
            .push_bind(*id)
            .push(" THEN ")
            .push_bind(status.as_i16());
    }
    qb.push(" ELSE status END");
    push_id_filter(qb, updates.keys().copied());
}

fn push_id_filter<'args, DB>(qb: &mut QueryBuilder<'args, DB>, ids: impl Iterator<Item = i64>)
where
    DB: Database,
    i64: Encode<'args, DB> + Type<DB>,
{
    qb.push(" WHERE id IN (");
    {
        let mut separated = qb.separated(", ");
        for id in ids {
            separated.push_bind(id);
        }
        separated.push_unseparated(")");
    }
    qb.push(" AND deleted_at IS NULL");
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::{Postgres, Sqlite};

    #[test]
    fn test_view_count_update_postgres_sql() {
        let deltas = BTreeMap::from([(7, 5), (9, 2)]);
        let mut qb = QueryBuilder::<Postgres>::new("");
        push_view_count_update(&mut qb, &deltas);

        assert_eq!(
            qb.sql(),
            "UPDATE posts SET view_count = view_count + CASE id WHEN $1 THEN $2 WHEN $3 THEN $4 \
             ELSE 0 END WHERE id IN ($5, $6) AND deleted_at IS NULL"
        );
    }

    #[test]
    fn test_link_status_update_sqlite_sql() {
        let updates = BTreeMap::from([(3, LinkStatus::Normal)]);
        let mut qb = QueryBuilder::<Sqlite>::new("");
        push_link_status_update(&mut qb, &updates);

        assert_eq!(
            qb.sql(),
            "UPDATE links SET status = CASE id WHEN ? THEN ? ELSE status END WHERE id IN (?) \
             AND deleted_at IS NULL"
        );
    }
}
