//! Target registry for promhub.
//!
//! This crate owns the persistent data model:
//! - Targets with soft-delete tombstones
//! - Globally de-duplicated labels, params and selectors
//! - Write-time merging of targets that share a fingerprint
//! - Sweeping of tombstoned targets and orphaned pairs

mod dedup;
pub mod error;
pub mod filter;
pub mod models;
pub mod repos;
pub mod store;
mod tags;

pub use error::{RegistryError, RegistryResult};
pub use store::{RegistryStore, SqliteStore};

use promhub_core::config::RegistryConfig;
use std::sync::Arc;

/// Create a registry store from configuration.
pub async fn from_config(config: &RegistryConfig) -> RegistryResult<Arc<dyn RegistryStore>> {
    match config {
        RegistryConfig::Sqlite {
            path,
            max_connections,
        } => {
            let store = SqliteStore::new(path, *max_connections).await?;
            Ok(Arc::new(store) as Arc<dyn RegistryStore>)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repos::SelectorRepo;

    #[tokio::test]
    async fn test_from_config_sqlite() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("nested").join("registry.db");
        let config = RegistryConfig::Sqlite {
            path: db_path.clone(),
            max_connections: 1,
        };

        let store = from_config(&config).await.unwrap();
        store.health_check().await.unwrap();
        assert!(db_path.exists());
    }

    #[tokio::test]
    async fn test_from_config_in_memory() {
        let config = RegistryConfig::Sqlite {
            path: ":memory:".into(),
            max_connections: 8,
        };
        let store = from_config(&config).await.unwrap();
        store.health_check().await.unwrap();
        assert!(store.list_selectors().await.unwrap().is_empty());
    }
}
