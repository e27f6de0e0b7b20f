// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use crate::Result;
use crate::config::CommitPolicy;
use backon::{ExponentialBuilder, Retryable};
use catalog::{CatalogError, Repository, SnapshotId};
use std::time::Duration;
use vref::VirtualDatasetManifest;

/// Stage `dataset` on `branch` and commit it, opening a fresh session
/// against the current head whenever another writer got there first.
///
/// Only [`CatalogError::ConcurrentModification`] is retried. Each attempt
/// parents its snapshot on the head it observed, so a retried commit
/// never carries a stale parent.
pub async fn commit_with_retry(
    repo: &Repository,
    branch: &str,
    message: &str,
    dataset: &VirtualDatasetManifest,
    policy: &CommitPolicy,
) -> Result<SnapshotId> {
    let backoff = ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(policy.min_delay_ms))
        .with_max_times(policy.max_attempts.saturating_sub(1))
        .with_jitter();

    let attempt = || async {
        let mut session = repo.writable_session(branch).await?;
        session.stage(dataset.clone())?;
        let id = session.commit(message).await?;
        Ok::<SnapshotId, CatalogError>(id)
    };

    let notify = |err: &CatalogError, dur: Duration| {
        let error = err.to_string();
        diagnostics::warn!(
            "retrying commit to {branch} in {delay_ms}ms: {error}",
            branch: branch,
            delay_ms: dur.as_millis() as u64,
            error: error.as_str()
        );
    };

    let id = attempt
        .retry(backoff)
        .sleep(tokio::time::sleep)
        .when(CatalogError::is_concurrent_modification)
        .notify(notify)
        .await?;
    Ok(id)
}
