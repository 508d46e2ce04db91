//! Target repository trait.

use crate::error::RegistryResult;
use crate::models::{
    DeleteFilter, RegisterOutcome, SweepReport, TargetPatch, TargetRecord, Visibility,
};
use async_trait::async_trait;
use promhub_core::{KeyValue, TargetSpec};

/// Repository for targets and their associations.
#[async_trait]
pub trait TargetRepo: Send + Sync {
    /// Register targets under a selector scope in one transaction.
    ///
    /// Each spec either creates a new target or merges into an existing one
    /// with the same fingerprint that shares at least one selector. Outcomes
    /// are returned in input order.
    async fn register_targets(
        &self,
        selectors: &[KeyValue],
        specs: &[TargetSpec],
    ) -> RegistryResult<Vec<RegisterOutcome>>;

    async fn get_target(
        &self,
        id: i64,
        visibility: Visibility,
    ) -> RegistryResult<Option<TargetRecord>>;

    /// Targets associated with a selector pair, ordered by id.
    async fn list_by_selector(
        &self,
        selector: &KeyValue,
        visibility: Visibility,
    ) -> RegistryResult<Vec<TargetRecord>>;

    /// Apply a partial update to a live target and return the result.
    async fn update_target(&self, id: i64, patch: &TargetPatch) -> RegistryResult<TargetRecord>;

    /// Tombstone one live target.
    async fn delete_target(&self, id: i64) -> RegistryResult<()>;

    /// Tombstone every live target with this exact address.
    async fn delete_by_address(&self, address: &str) -> RegistryResult<u64>;

    /// Tombstone every live target carrying this label.
    async fn delete_by_label(&self, label: &KeyValue) -> RegistryResult<u64>;

    /// Tombstone every live target matching the filter, atomically.
    async fn delete_matching(&self, filter: &DeleteFilter) -> RegistryResult<u64>;

    /// Permanently remove tombstoned targets and orphaned pairs.
    ///
    /// Fails with `NothingToSweep` when nothing is tombstoned.
    async fn sweep_deleted(&self) -> RegistryResult<SweepReport>;
}
