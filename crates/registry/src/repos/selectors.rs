//! Selector repository trait.

use crate::error::RegistryResult;
use async_trait::async_trait;
use promhub_core::KeyValue;

/// Repository for selector pairs.
#[async_trait]
pub trait SelectorRepo: Send + Sync {
    /// All selector pairs, ordered by key then value.
    async fn list_selectors(&self) -> RegistryResult<Vec<KeyValue>>;

    /// Rename a selector pair in place, keeping its associations.
    ///
    /// Fails with `NotFound` when `old` does not exist and with `Conflict`
    /// when `new` already exists as a different row.
    async fn rename_selector(&self, old: &KeyValue, new: &KeyValue) -> RegistryResult<()>;
}
