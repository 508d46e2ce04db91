//! Registry store trait and the SQLite implementation.

use crate::error::{RegistryError, RegistryResult};
use crate::filter::{Bind, Filter};
use crate::models::{TargetRecord, TargetRow};
use crate::repos::{SelectorRepo, TargetRepo};
use crate::tags::load_pairs;
use async_trait::async_trait;
use promhub_core::KvKind;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite, SqliteConnection, Transaction};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Combined registry store trait.
#[async_trait]
pub trait RegistryStore: TargetRepo + SelectorRepo + Send + Sync {
    /// Create tables and indexes if missing.
    async fn migrate(&self) -> RegistryResult<()>;

    /// Check database connectivity.
    async fn health_check(&self) -> RegistryResult<()>;
}

/// SQLite-backed registry store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path` and run migrations.
    ///
    /// `:memory:` opens a private in-memory database on a single pinned
    /// connection.
    pub async fn new(path: impl AsRef<Path>, max_connections: u32) -> RegistryResult<Self> {
        let path = path.as_ref();
        let in_memory = path.as_os_str() == ":memory:";

        let base = if in_memory {
            SqliteConnectOptions::from_str("sqlite::memory:")?
        } else {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| {
                    RegistryError::Config(format!(
                        "cannot create directory {}: {e}",
                        parent.display()
                    ))
                })?;
            }
            SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
                .create_if_missing(true)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        };
        let opts = base
            .foreign_keys(true)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(Duration::from_secs(5));

        let mut pool_opts = SqlitePoolOptions::new().max_connections(max_connections.max(1));
        if in_memory {
            // Each connection would see its own empty database.
            pool_opts = pool_opts
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }
        let pool = pool_opts.connect_with(opts).await?;

        let store = Self { pool };
        store.migrate().await?;
        tracing::debug!(path = %path.display(), "Registry store opened");
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl RegistryStore for SqliteStore {
    async fn migrate(&self) -> RegistryResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> RegistryResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Targets matching `filter`, ordered by id.
pub(crate) async fn select_targets(
    conn: &mut SqliteConnection,
    filter: &Filter,
) -> RegistryResult<Vec<TargetRow>> {
    let (clause, binds) = filter.render();
    let sql = format!("SELECT t.* FROM targets t WHERE {clause} ORDER BY t.id");
    let mut query = sqlx::query_as::<_, TargetRow>(&sql);
    for bind in binds {
        query = match bind {
            Bind::Text(v) => query.bind(v),
            Bind::Int(v) => query.bind(v),
            Bind::Bool(v) => query.bind(v),
        };
    }
    Ok(query.fetch_all(&mut *conn).await?)
}

/// Attach labels, params and selectors to target rows.
pub(crate) async fn load_records(
    conn: &mut SqliteConnection,
    rows: Vec<TargetRow>,
) -> RegistryResult<Vec<TargetRecord>> {
    let ids = rows.iter().map(|t| t.id).collect::<Vec<_>>();
    let mut labels = load_pairs(conn, KvKind::Label, &ids).await?;
    let mut params = load_pairs(conn, KvKind::Param, &ids).await?;
    let mut selectors = load_pairs(conn, KvKind::Selector, &ids).await?;

    Ok(rows
        .into_iter()
        .map(|target| TargetRecord {
            labels: labels.remove(&target.id).unwrap_or_default(),
            params: params.remove(&target.id).unwrap_or_default(),
            selectors: selectors.remove(&target.id).unwrap_or_default(),
            target,
        })
        .collect())
}

// Implement the repository traits for SqliteStore
mod sqlite_impl {
    use super::*;
    use crate::dedup::resolve_target;
    use crate::filter::Column;
    use crate::models::*;
    use crate::tags::{PairTable, detach_all, find_pair, placeholders, resolve_pairs, sweep_orphans};
    use promhub_core::target::{clamp_timeout, normalize_metric_path, split_scheme, validate_address};
    use promhub_core::{Credentials, KeyValue, TargetSpec};
    use time::OffsetDateTime;

    /// Tombstone the given ids. Returns how many rows changed.
    async fn tombstone(conn: &mut SqliteConnection, ids: &[i64]) -> RegistryResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "UPDATE targets SET deleted = 1, updated_at = ? WHERE deleted = 0 AND id IN ({})",
            placeholders(ids.len())
        );
        let mut query = sqlx::query(&sql).bind(OffsetDateTime::now_utc());
        for id in ids {
            query = query.bind(*id);
        }
        Ok(query.execute(&mut *conn).await?.rows_affected())
    }

    impl SqliteStore {
        /// Start a write transaction holding the write lock from the outset.
        ///
        /// A deferred transaction that reads before writing cannot upgrade
        /// its lock once another connection has written, and fails with
        /// "database is locked" instead of waiting out `busy_timeout`.
        async fn begin_write(&self) -> RegistryResult<Transaction<'static, Sqlite>> {
            Ok(self.pool.begin_with("BEGIN IMMEDIATE").await?)
        }

        /// Tombstone every live target matching `filter` in one transaction.
        async fn tombstone_matching(&self, filter: Filter, what: String) -> RegistryResult<u64> {
            let mut tx = self.begin_write().await?;
            let rows = select_targets(&mut tx, &filter.visible(Visibility::LiveOnly)).await?;
            if rows.is_empty() {
                return Err(RegistryError::NotFound(what));
            }
            let ids = rows.iter().map(|t| t.id).collect::<Vec<_>>();
            let deleted = tombstone(&mut tx, &ids).await?;
            tx.commit().await?;

            tracing::info!(deleted = deleted, ids = ?ids, "Targets marked as deleted");
            Ok(deleted)
        }
    }

    #[async_trait]
    impl TargetRepo for SqliteStore {
        async fn register_targets(
            &self,
            selectors: &[KeyValue],
            specs: &[TargetSpec],
        ) -> RegistryResult<Vec<RegisterOutcome>> {
            if selectors.is_empty() {
                return Err(promhub_core::Error::MissingField("selectors").into());
            }

            let mut tx = self.begin_write().await?;
            let selector_ids = resolve_pairs(&mut tx, KvKind::Selector, selectors).await?;

            let mut outcomes = Vec::with_capacity(specs.len());
            for spec in specs {
                let outcome = resolve_target(&mut tx, selectors, &selector_ids, spec).await?;
                match outcome {
                    RegisterOutcome::Created(id) => tracing::info!(
                        target_id = id,
                        address = %spec.address,
                        scheme = %spec.scheme,
                        "Target created"
                    ),
                    RegisterOutcome::Merged(id) => tracing::info!(
                        target_id = id,
                        address = %spec.address,
                        "Target merged into existing registration"
                    ),
                }
                outcomes.push(outcome);
            }

            tx.commit().await?;
            Ok(outcomes)
        }

        async fn get_target(
            &self,
            id: i64,
            visibility: Visibility,
        ) -> RegistryResult<Option<TargetRecord>> {
            let mut conn = self.pool.acquire().await?;
            let filter = Filter::eq_int(Column::Id, id).visible(visibility);
            let rows = select_targets(&mut conn, &filter).await?;
            Ok(load_records(&mut conn, rows).await?.into_iter().next())
        }

        async fn list_by_selector(
            &self,
            selector: &KeyValue,
            visibility: Visibility,
        ) -> RegistryResult<Vec<TargetRecord>> {
            selector.validate(KvKind::Selector)?;
            let mut conn = self.pool.acquire().await?;
            let filter = Filter::HasPair(KvKind::Selector, selector.clone()).visible(visibility);
            let rows = select_targets(&mut conn, &filter).await?;
            load_records(&mut conn, rows).await
        }

        async fn update_target(
            &self,
            id: i64,
            patch: &TargetPatch,
        ) -> RegistryResult<TargetRecord> {
            let mut tx = self.begin_write().await?;
            let filter = Filter::eq_int(Column::Id, id).visible(Visibility::LiveOnly);
            let mut row = select_targets(&mut tx, &filter)
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| RegistryError::NotFound(format!("target {id}")))?;

            if let Some(address) = patch.address.as_deref().map(str::trim).filter(|a| !a.is_empty()) {
                let (scheme, address) = split_scheme(address)?;
                validate_address(address)?;
                if let Some(scheme) = scheme {
                    row.scheme = scheme.as_str().to_string();
                }
                row.address = address.to_string();
            }
            if let Some(path) = patch.metric_path.as_deref().filter(|p| !p.is_empty()) {
                row.metric_path = normalize_metric_path(path);
            }
            if let Some(interval) = positive("scrape_interval", patch.scrape_interval_secs)? {
                row.scrape_interval_secs = interval;
            }
            if let Some(timeout) = positive("scrape_timeout", patch.scrape_timeout_secs)? {
                row.scrape_timeout_secs = timeout;
            }
            row.scrape_timeout_secs = clamp_timeout(row.scrape_interval_secs, row.scrape_timeout_secs);

            // Only one credential is ever stored.
            match Credentials::select(patch.bearer_token.as_deref(), patch.base_auth.as_deref()) {
                Some(Credentials::Bearer(token)) => {
                    row.bearer_token = Some(token);
                    row.base_auth = None;
                }
                Some(Credentials::Basic(base)) => {
                    row.bearer_token = None;
                    row.base_auth = Some(base);
                }
                None => {}
            }

            sqlx::query(
                r#"
                UPDATE targets
                SET scheme = ?, address = ?, metric_path = ?, scrape_interval_secs = ?,
                    scrape_timeout_secs = ?, bearer_token = ?, base_auth = ?, updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(&row.scheme)
            .bind(&row.address)
            .bind(&row.metric_path)
            .bind(row.scrape_interval_secs)
            .bind(row.scrape_timeout_secs)
            .bind(&row.bearer_token)
            .bind(&row.base_auth)
            .bind(OffsetDateTime::now_utc())
            .bind(id)
            .execute(&mut *tx)
            .await?;

            let rows = select_targets(&mut tx, &filter).await?;
            let record = load_records(&mut tx, rows)
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| RegistryError::Internal(format!("target {id} vanished during update")))?;
            tx.commit().await?;

            tracing::info!(target_id = id, "Target updated");
            Ok(record)
        }

        async fn delete_target(&self, id: i64) -> RegistryResult<()> {
            self.tombstone_matching(Filter::eq_int(Column::Id, id), format!("target {id}"))
                .await
                .map(|_| ())
        }

        async fn delete_by_address(&self, address: &str) -> RegistryResult<u64> {
            if address.is_empty() {
                return Err(promhub_core::Error::MissingField("address").into());
            }
            self.tombstone_matching(
                Filter::eq_text(Column::Address, address),
                format!("targets with address '{address}'"),
            )
            .await
        }

        async fn delete_by_label(&self, label: &KeyValue) -> RegistryResult<u64> {
            label.validate(KvKind::Label)?;
            self.tombstone_matching(
                Filter::HasPair(KvKind::Label, label.clone()),
                format!("targets with label {label}"),
            )
            .await
        }

        async fn delete_matching(&self, filter: &DeleteFilter) -> RegistryResult<u64> {
            if filter.is_empty() {
                return Err(
                    promhub_core::Error::MissingField("selectors, labels, address or auth").into(),
                );
            }

            let mut clauses = Vec::new();
            if !filter.selectors.is_empty() {
                clauses.push(Filter::any_pair(KvKind::Selector, &filter.selectors));
            }
            if !filter.labels.is_empty() {
                clauses.push(Filter::any_pair(KvKind::Label, &filter.labels));
            }
            let columns = [
                (Column::Address, &filter.address),
                (Column::BearerToken, &filter.bearer_token),
                (Column::BaseAuth, &filter.base_auth),
            ];
            for (column, value) in columns {
                if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
                    clauses.push(Filter::eq_text(column, value));
                }
            }

            self.tombstone_matching(Filter::AllOf(clauses), "targets matching filter".to_string())
                .await
        }

        async fn sweep_deleted(&self) -> RegistryResult<SweepReport> {
            let mut tx = self.begin_write().await?;
            let ids = select_targets(&mut tx, &Filter::deleted())
                .await?
                .into_iter()
                .map(|t| t.id)
                .collect::<Vec<_>>();
            if ids.is_empty() {
                return Err(RegistryError::NothingToSweep);
            }

            detach_all(&mut tx, &ids).await?;
            let purged = sqlx::query("DELETE FROM targets WHERE deleted = 1")
                .execute(&mut *tx)
                .await?
                .rows_affected();

            let report = SweepReport {
                purged,
                labels: sweep_orphans(&mut tx, KvKind::Label).await?,
                params: sweep_orphans(&mut tx, KvKind::Param).await?,
                selectors: sweep_orphans(&mut tx, KvKind::Selector).await?,
            };
            tx.commit().await?;

            tracing::info!(
                purged = report.purged,
                labels = report.labels,
                params = report.params,
                selectors = report.selectors,
                "Swept deleted targets"
            );
            Ok(report)
        }
    }

    fn positive(field: &str, value: Option<i64>) -> RegistryResult<Option<i64>> {
        match value {
            None | Some(0) => Ok(None),
            Some(v) if v > 0 => Ok(Some(v)),
            Some(v) => Err(promhub_core::Error::InvalidValue(format!(
                "{field} must be positive, got {v}"
            ))
            .into()),
        }
    }

    #[async_trait]
    impl SelectorRepo for SqliteStore {
        async fn list_selectors(&self) -> RegistryResult<Vec<KeyValue>> {
            let rows = sqlx::query_as::<_, PairRow>(
                "SELECT id, key, value FROM selectors ORDER BY key, value",
            )
            .fetch_all(&self.pool)
            .await?;
            Ok(rows
                .into_iter()
                .map(|r| KeyValue::new(r.key, r.value))
                .collect())
        }

        async fn rename_selector(&self, old: &KeyValue, new: &KeyValue) -> RegistryResult<()> {
            old.validate(KvKind::Selector)?;
            new.validate(KvKind::Selector)?;

            let mut tx = self.begin_write().await?;
            let old_id = find_pair(&mut tx, KvKind::Selector, old)
                .await?
                .ok_or_else(|| RegistryError::NotFound(format!("selector {old}")))?;
            if old == new {
                return Ok(());
            }
            if find_pair(&mut tx, KvKind::Selector, new).await?.is_some() {
                return Err(RegistryError::Conflict(format!("selector {new} already exists")));
            }

            let sql = format!(
                "UPDATE {} SET key = ?, value = ? WHERE id = ?",
                PairTable::of(KvKind::Selector).table
            );
            sqlx::query(&sql)
                .bind(&new.key)
                .bind(&new.value)
                .bind(old_id)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;

            tracing::info!(old = %old, new = %new, "Selector renamed");
            Ok(())
        }
    }
}

const SCHEMA_SQL: &str = r#"
-- Targets
CREATE TABLE IF NOT EXISTS targets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    scheme TEXT NOT NULL DEFAULT 'http' CHECK (scheme IN ('http', 'https')),
    address TEXT NOT NULL,
    metric_path TEXT NOT NULL DEFAULT '/metrics',
    scrape_interval_secs INTEGER NOT NULL DEFAULT 30,
    scrape_timeout_secs INTEGER NOT NULL DEFAULT 10,
    bearer_token TEXT,
    base_auth TEXT,
    deleted INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    CHECK (scrape_timeout_secs <= scrape_interval_secs)
);
CREATE INDEX IF NOT EXISTS idx_targets_shape ON targets(address, metric_path, deleted);
CREATE INDEX IF NOT EXISTS idx_targets_deleted ON targets(deleted);

-- Globally de-duplicated pairs
CREATE TABLE IF NOT EXISTS labels (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    UNIQUE(key, value)
);
CREATE TABLE IF NOT EXISTS params (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    UNIQUE(key, value)
);
CREATE TABLE IF NOT EXISTS selectors (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    UNIQUE(key, value)
);

-- Join tables
CREATE TABLE IF NOT EXISTS target_labels (
    target_id INTEGER NOT NULL REFERENCES targets(id) ON DELETE CASCADE,
    label_id INTEGER NOT NULL REFERENCES labels(id) ON DELETE CASCADE,
    PRIMARY KEY (target_id, label_id)
);
CREATE INDEX IF NOT EXISTS idx_target_labels_label ON target_labels(label_id);
CREATE TABLE IF NOT EXISTS target_params (
    target_id INTEGER NOT NULL REFERENCES targets(id) ON DELETE CASCADE,
    param_id INTEGER NOT NULL REFERENCES params(id) ON DELETE CASCADE,
    PRIMARY KEY (target_id, param_id)
);
CREATE INDEX IF NOT EXISTS idx_target_params_param ON target_params(param_id);
CREATE TABLE IF NOT EXISTS target_selectors (
    target_id INTEGER NOT NULL REFERENCES targets(id) ON DELETE CASCADE,
    selector_id INTEGER NOT NULL REFERENCES selectors(id) ON DELETE CASCADE,
    PRIMARY KEY (target_id, selector_id)
);
CREATE INDEX IF NOT EXISTS idx_target_selectors_selector ON target_selectors(selector_id);
"#;
