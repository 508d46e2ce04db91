//! Label, param and selector rows and their join tables.
//!
//! All three kinds share one shape: a `(key, value)` table with a UNIQUE
//! constraint and a `(target_id, <kind>_id)` join table. Every function here
//! runs on a caller-provided connection so it composes inside a transaction.

use crate::error::{RegistryError, RegistryResult, is_unique_violation};
use crate::models::TargetPairRow;
use promhub_core::{KeyValue, KvKind};
use sqlx::SqliteConnection;
use std::collections::HashMap;

/// Table names for one pair kind.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PairTable {
    pub table: &'static str,
    pub join: &'static str,
    pub fk: &'static str,
}

impl PairTable {
    pub const ALL: [KvKind; 3] = [KvKind::Label, KvKind::Param, KvKind::Selector];

    pub fn of(kind: KvKind) -> Self {
        match kind {
            KvKind::Label => Self {
                table: "labels",
                join: "target_labels",
                fk: "label_id",
            },
            KvKind::Param => Self {
                table: "params",
                join: "target_params",
                fk: "param_id",
            },
            KvKind::Selector => Self {
                table: "selectors",
                join: "target_selectors",
                fk: "selector_id",
            },
        }
    }
}

pub(crate) async fn find_pair(
    conn: &mut SqliteConnection,
    kind: KvKind,
    pair: &KeyValue,
) -> RegistryResult<Option<i64>> {
    let sql = format!(
        "SELECT id FROM {} WHERE key = ? AND value = ?",
        PairTable::of(kind).table
    );
    let id = sqlx::query_scalar::<_, i64>(&sql)
        .bind(&pair.key)
        .bind(&pair.value)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(id)
}

/// Find-or-create a pair row and return its id.
pub(crate) async fn find_or_create_pair(
    conn: &mut SqliteConnection,
    kind: KvKind,
    pair: &KeyValue,
) -> RegistryResult<i64> {
    pair.validate(kind)?;
    if let Some(id) = find_pair(conn, kind, pair).await? {
        return Ok(id);
    }
    insert_pair(conn, kind, pair).await
}

/// Insert a pair the caller just failed to find.
///
/// A UNIQUE violation means a concurrent writer created the row first; the
/// lookup is retried instead of failing.
async fn insert_pair(
    conn: &mut SqliteConnection,
    kind: KvKind,
    pair: &KeyValue,
) -> RegistryResult<i64> {
    let sql = format!(
        "INSERT INTO {} (key, value) VALUES (?, ?) RETURNING id",
        PairTable::of(kind).table
    );
    let inserted = sqlx::query_scalar::<_, i64>(&sql)
        .bind(&pair.key)
        .bind(&pair.value)
        .fetch_one(&mut *conn)
        .await;

    match inserted {
        Ok(id) => Ok(id),
        Err(e) if is_unique_violation(&e) => {
            tracing::debug!(kind = %kind, pair = %pair, "Pair created concurrently, re-reading");
            find_pair(conn, kind, pair).await?.ok_or_else(|| {
                RegistryError::Internal(format!("{kind} {pair} vanished after unique violation"))
            })
        }
        Err(e) => Err(e.into()),
    }
}

/// Resolve every pair to a row id, creating missing rows.
pub(crate) async fn resolve_pairs(
    conn: &mut SqliteConnection,
    kind: KvKind,
    pairs: &[KeyValue],
) -> RegistryResult<Vec<i64>> {
    let mut ids = Vec::with_capacity(pairs.len());
    for pair in pairs {
        ids.push(find_or_create_pair(conn, kind, pair).await?);
    }
    Ok(ids)
}

/// Associate pair rows with a target. Existing associations are left alone.
pub(crate) async fn attach(
    conn: &mut SqliteConnection,
    kind: KvKind,
    target_id: i64,
    pair_ids: &[i64],
) -> RegistryResult<u64> {
    let table = PairTable::of(kind);
    let sql = format!(
        "INSERT OR IGNORE INTO {} (target_id, {}) VALUES (?, ?)",
        table.join, table.fk
    );
    let mut attached = 0;
    for pair_id in pair_ids {
        attached += sqlx::query(&sql)
            .bind(target_id)
            .bind(*pair_id)
            .execute(&mut *conn)
            .await?
            .rows_affected();
    }
    Ok(attached)
}

/// Load the pairs of the given kind for a set of targets, keyed by target id.
pub(crate) async fn load_pairs(
    conn: &mut SqliteConnection,
    kind: KvKind,
    target_ids: &[i64],
) -> RegistryResult<HashMap<i64, Vec<KeyValue>>> {
    let mut out: HashMap<i64, Vec<KeyValue>> = HashMap::new();
    if target_ids.is_empty() {
        return Ok(out);
    }

    let table = PairTable::of(kind);
    let sql = format!(
        "SELECT j.target_id AS target_id, p.key AS key, p.value AS value \
         FROM {join} j JOIN {table} p ON p.id = j.{fk} \
         WHERE j.target_id IN ({placeholders}) \
         ORDER BY j.target_id, p.key, p.value",
        join = table.join,
        table = table.table,
        fk = table.fk,
        placeholders = placeholders(target_ids.len()),
    );
    let mut query = sqlx::query_as::<_, TargetPairRow>(&sql);
    for id in target_ids {
        query = query.bind(*id);
    }

    for row in query.fetch_all(&mut *conn).await? {
        out.entry(row.target_id)
            .or_default()
            .push(KeyValue::new(row.key, row.value));
    }
    Ok(out)
}

/// Remove every association of the given targets.
pub(crate) async fn detach_all(
    conn: &mut SqliteConnection,
    target_ids: &[i64],
) -> RegistryResult<()> {
    if target_ids.is_empty() {
        return Ok(());
    }
    for kind in PairTable::ALL {
        let sql = format!(
            "DELETE FROM {} WHERE target_id IN ({})",
            PairTable::of(kind).join,
            placeholders(target_ids.len())
        );
        let mut query = sqlx::query(&sql);
        for id in target_ids {
            query = query.bind(*id);
        }
        query.execute(&mut *conn).await?;
    }
    Ok(())
}

/// Delete pair rows no target references any more.
pub(crate) async fn sweep_orphans(conn: &mut SqliteConnection, kind: KvKind) -> RegistryResult<u64> {
    let table = PairTable::of(kind);
    let sql = format!(
        "DELETE FROM {table} WHERE id NOT IN (SELECT {fk} FROM {join})",
        table = table.table,
        fk = table.fk,
        join = table.join,
    );
    let result = sqlx::query(&sql).execute(&mut *conn).await?;
    Ok(result.rows_affected())
}

/// `?, ?, ?` for `n` binds.
pub(crate) fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}
