//! Write-time de-duplication of submitted targets.
//!
//! A submitted target merges into an existing live target when both share at
//! least one selector, agree on address, metric path, interval and timeout,
//! and produce the same fingerprint from their params. Otherwise a new row is
//! inserted. Either way the submitted labels, params and selectors end up
//! attached to the resulting row.

use crate::error::RegistryResult;
use crate::filter::{Column, Filter};
use crate::models::RegisterOutcome;
use crate::store::select_targets;
use crate::tags::{attach, load_pairs, resolve_pairs};
use promhub_core::{Fingerprint, KeyValue, KvKind, TargetSpec};
use sqlx::SqliteConnection;
use time::OffsetDateTime;

/// Resolve one spec inside the caller's transaction.
pub(crate) async fn resolve_target(
    conn: &mut SqliteConnection,
    selectors: &[KeyValue],
    selector_ids: &[i64],
    spec: &TargetSpec,
) -> RegistryResult<RegisterOutcome> {
    let label_ids = resolve_pairs(conn, KvKind::Label, &spec.labels).await?;
    let param_ids = resolve_pairs(conn, KvKind::Param, &spec.params).await?;

    let outcome = match find_match(conn, selectors, spec).await? {
        Some(id) => RegisterOutcome::Merged(id),
        None => RegisterOutcome::Created(insert_target(conn, spec).await?),
    };
    let target_id = outcome.target_id();

    attach(conn, KvKind::Selector, target_id, selector_ids).await?;
    attach(conn, KvKind::Label, target_id, &label_ids).await?;
    attach(conn, KvKind::Param, target_id, &param_ids).await?;

    Ok(outcome)
}

/// Filter for live targets that could be the same scrape as `spec`.
pub(crate) fn candidate_filter(selectors: &[KeyValue], spec: &TargetSpec) -> Filter {
    Filter::AllOf(vec![
        Filter::live(),
        Filter::any_pair(KvKind::Selector, selectors),
        Filter::eq_text(Column::Address, &spec.address),
        Filter::eq_text(Column::MetricPath, &spec.metric_path),
        Filter::eq_int(Column::ScrapeInterval, spec.scrape_interval_secs),
        Filter::eq_int(Column::ScrapeTimeout, spec.scrape_timeout_secs),
    ])
}

/// Lowest-id candidate whose recomputed fingerprint equals the spec's.
async fn find_match(
    conn: &mut SqliteConnection,
    selectors: &[KeyValue],
    spec: &TargetSpec,
) -> RegistryResult<Option<i64>> {
    let candidates = select_targets(conn, &candidate_filter(selectors, spec)).await?;
    if candidates.is_empty() {
        return Ok(None);
    }

    let ids = candidates.iter().map(|t| t.id).collect::<Vec<_>>();
    let params = load_pairs(conn, KvKind::Param, &ids).await?;
    let wanted = spec.fingerprint();

    let matched = candidates.iter().find(|candidate| {
        let pairs = params.get(&candidate.id).map(Vec::as_slice).unwrap_or_default();
        let fingerprint = Fingerprint::compute(
            candidate.scheme(),
            &candidate.address,
            &candidate.metric_path,
            pairs.iter().map(|p| (p.key.as_str(), p.value.as_str())),
        );
        fingerprint == wanted
    });

    if let Some(target) = matched {
        tracing::debug!(
            target_id = target.id,
            fingerprint = %wanted,
            "Submitted target matches existing target"
        );
    }
    Ok(matched.map(|t| t.id))
}

async fn insert_target(conn: &mut SqliteConnection, spec: &TargetSpec) -> RegistryResult<i64> {
    let now = OffsetDateTime::now_utc();
    let id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO targets (
            scheme, address, metric_path, scrape_interval_secs, scrape_timeout_secs,
            bearer_token, base_auth, deleted, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
        RETURNING id
        "#,
    )
    .bind(spec.scheme.as_str())
    .bind(&spec.address)
    .bind(&spec.metric_path)
    .bind(spec.scrape_interval_secs)
    .bind(spec.scrape_timeout_secs)
    .bind(&spec.bearer_token)
    .bind(&spec.base_auth)
    .bind(now)
    .bind(now)
    .fetch_one(&mut *conn)
    .await?;
    Ok(id)
}
