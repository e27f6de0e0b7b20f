// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Write sessions: stage a dataset against a branch head, then commit it.

use crate::error::{CatalogError, Result};
use crate::repository::Repository;
use crate::snapshot::{BranchRef, SnapshotId};
use std::fmt;
use vref::VirtualDatasetManifest;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Accepting `stage` calls
    Open,
    Committing,
    Committed(SnapshotId),
    /// Commit failed; the branch is unchanged
    Aborted,
}

impl SessionState {
    fn name(&self) -> &'static str {
        match self {
            SessionState::Open => "open",
            SessionState::Committing => "committing",
            SessionState::Committed(_) => "committed",
            SessionState::Aborted => "aborted",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Snapshot-isolated writer for one branch.
///
/// The session remembers the branch head it was opened against. Commit
/// succeeds only if that is still the head; otherwise it fails with
/// [`CatalogError::ConcurrentModification`] and the caller opens a new
/// session against the refreshed head.
pub struct Session {
    repo: Repository,
    branch: String,
    base: BranchRef,
    txn_id: String,
    state: SessionState,
    staged: Option<VirtualDatasetManifest>,
}

impl Session {
    pub(crate) fn new(repo: Repository, branch: String, base: BranchRef) -> Self {
        let txn_id = uuid7::uuid7().to_string();
        let base_id = base.snapshot.short();
        diagnostics::debug!(
            "opened session {txn_id} on {branch} at {base_id}",
            txn_id: txn_id.as_str(),
            branch: branch.as_str(),
            base_id: base_id
        );
        Self {
            repo,
            branch,
            base,
            txn_id,
            state: SessionState::Open,
            staged: None,
        }
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// Head the session was opened against
    pub fn base(&self) -> &BranchRef {
        &self.base
    }

    pub fn txn_id(&self) -> &str {
        &self.txn_id
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn staged(&self) -> Option<&VirtualDatasetManifest> {
        self.staged.as_ref()
    }

    /// Dataset at the base snapshot
    pub async fn base_dataset(&self) -> Result<VirtualDatasetManifest> {
        self.repo.checkout(&self.base.snapshot).await
    }

    /// Replace the staged dataset.
    pub fn stage(&mut self, dataset: VirtualDatasetManifest) -> Result<()> {
        if self.state != SessionState::Open {
            return Err(CatalogError::InvalidSessionState {
                state: self.state.name(),
                operation: "stage",
            });
        }
        self.staged = Some(dataset);
        Ok(())
    }

    /// Record the staged dataset as a new snapshot and advance the branch.
    ///
    /// Either the snapshot becomes the branch head or the branch is left
    /// as it was. Objects written by a failed commit are never referenced.
    pub async fn commit(&mut self, message: &str) -> Result<SnapshotId> {
        if self.state != SessionState::Open {
            return Err(CatalogError::InvalidSessionState {
                state: self.state.name(),
                operation: "commit",
            });
        }
        let dataset = self.staged.take().ok_or(CatalogError::NothingStaged)?;
        self.state = SessionState::Committing;

        let branch = self.branch.as_str();
        let txn_id = self.txn_id.as_str();
        diagnostics::info!("committing {txn_id} to {branch}", txn_id: txn_id, branch: branch);

        match self.write(&dataset, message).await {
            Ok(head) => {
                let id = head.snapshot.short();
                let sequence = head.sequence;
                diagnostics::info!(
                    "committed {id} to {branch} (sequence {sequence})",
                    id: id,
                    branch: self.branch.as_str(),
                    sequence: sequence
                );
                self.state = SessionState::Committed(head.snapshot.clone());
                Ok(head.snapshot)
            }
            Err(e) => {
                let error = e.to_string();
                if e.is_concurrent_modification() {
                    diagnostics::warn!("branch {branch} moved during commit: {error}", branch: self.branch.as_str(), error: error.as_str());
                } else {
                    diagnostics::warn!("aborted commit to {branch}: {error}", branch: self.branch.as_str(), error: error.as_str());
                }
                self.staged = Some(dataset);
                self.state = SessionState::Aborted;
                Err(e)
            }
        }
    }

    async fn write(&self, dataset: &VirtualDatasetManifest, message: &str) -> Result<BranchRef> {
        dataset.validate()?;
        self.repo.registry().check_coverage(dataset)?;

        let snapshot = self
            .repo
            .build_snapshot(
                Some(self.base.snapshot.clone()),
                message,
                self.txn_id.clone(),
                dataset,
            )
            .await?;
        let id = self.repo.write_snapshot(&snapshot).await?;
        self.repo.advance_branch(&self.branch, &self.base, id).await
    }

    /// Give up on the session without committing.
    pub fn abort(mut self) {
        if self.state == SessionState::Open {
            self.state = SessionState::Aborted;
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("branch", &self.branch)
            .field("base", &self.base)
            .field("txn_id", &self.txn_id)
            .field("state", &self.state)
            .field("staged", &self.staged.is_some())
            .finish()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.state == SessionState::Open && self.staged.is_some() {
            diagnostics::warn!(
                "session {txn_id} on {branch} dropped with uncommitted changes",
                txn_id: self.txn_id.as_str(),
                branch: self.branch.as_str()
            );
        }
    }
}
