//! Common test utilities for the registry store.

use promhub_core::{KeyValue, TargetAuth, TargetItem, TargetSpec};
use promhub_registry::SqliteStore;
use sqlx::{Pool, Sqlite};
use std::sync::Arc;
use tempfile::TempDir;

/// A file-backed test store that cleans up on drop.
#[allow(dead_code)]
pub struct TestRegistry {
    pub store: Arc<SqliteStore>,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestRegistry {
    pub async fn new() -> Self {
        Self::with_connections(1).await
    }

    /// Store whose pool may open up to `max_connections` connections.
    pub async fn with_connections(max_connections: u32) -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("registry.db");
        let store = SqliteStore::new(&db_path, max_connections)
            .await
            .expect("Failed to open registry");
        Self {
            store: Arc::new(store),
            _temp_dir: temp_dir,
        }
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        self.store.pool()
    }

    /// Row count of a table.
    pub async fn count(&self, table: &str) -> i64 {
        sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(self.pool())
            .await
            .expect("count query failed")
    }
}

#[allow(dead_code)]
pub fn pair(key: &str, value: &str) -> KeyValue {
    KeyValue::new(key, value)
}

#[allow(dead_code)]
pub fn spec(address: &str) -> TargetSpec {
    TargetSpec::from_item(&TargetItem::new(address)).expect("valid target")
}

/// Spec with labels and params.
#[allow(dead_code)]
pub fn spec_with(address: &str, labels: &[(&str, &str)], params: &[(&str, &str)]) -> TargetSpec {
    let item = TargetItem {
        labels: labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        params: params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        ..TargetItem::new(address)
    };
    TargetSpec::from_item(&item).expect("valid target")
}

#[allow(dead_code)]
pub fn spec_with_bearer(address: &str, token: &str) -> TargetSpec {
    let item = TargetItem {
        auth: Some(TargetAuth {
            bearer_token: Some(token.to_string()),
            base: None,
        }),
        ..TargetItem::new(address)
    };
    TargetSpec::from_item(&item).expect("valid target")
}
