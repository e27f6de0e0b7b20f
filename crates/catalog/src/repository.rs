// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Versioned catalog repository.
//!
//! Layout under the storage root:
//!
//! ```text
//! config.json                          container registry
//! manifests/<sha256>.parquet           chunk tables
//! snapshots/<sha256>.json              snapshots
//! refs/branch.<name>/<sequence>.json   branch pointer updates
//! ```
//!
//! Snapshots and manifests are immutable and written before any branch
//! pointer names them. A branch advances by creating the next sequence
//! number with put-if-absent, so at most one commit wins per head.

use crate::error::{CatalogError, Result};
use crate::registry::{ContainerRegistry, VirtualChunkContainer};
use crate::schema::{ChunkRow, chunk_rows, decode_rows, encode_rows};
use crate::session::Session;
use crate::snapshot::{BranchRef, Snapshot, SnapshotId, content_hash};
use crate::storage::Storage;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vref::VirtualDatasetManifest;

pub const DEFAULT_BRANCH: &str = "main";
pub const INITIAL_MESSAGE: &str = "Repository initialized";

const CONFIG: &str = "config.json";
const BRANCH_DIR_PREFIX: &str = "branch.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    pub created: DateTime<Utc>,
    pub containers: Vec<VirtualChunkContainer>,
}

#[derive(Debug, Clone)]
pub struct Repository {
    storage: Storage,
    registry: ContainerRegistry,
}

fn ref_dir(branch: &str) -> String {
    format!("refs/{BRANCH_DIR_PREFIX}{branch}")
}

fn ref_path(branch: &str, sequence: u64) -> String {
    format!("{}/{sequence:020}.json", ref_dir(branch))
}

fn snapshot_path(id: &SnapshotId) -> String {
    format!("snapshots/{id}.json")
}

fn manifest_path(id: &str) -> String {
    format!("manifests/{id}.parquet")
}

pub fn validate_branch_name(name: &str) -> Result<()> {
    let ok = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && !name.starts_with('.');
    if ok {
        Ok(())
    } else {
        Err(CatalogError::InvalidBranchName(name.to_string()))
    }
}

impl Repository {
    /// Open the repository at `storage`, creating it (with an initial
    /// empty snapshot on `main`) if nothing is there.
    ///
    /// A non-empty `registry` replaces the stored container configuration.
    pub async fn open_or_create(storage: Storage, registry: ContainerRegistry) -> Result<Self> {
        let location = storage.location().to_string();
        let registry = match storage.get(CONFIG).await? {
            Some(bytes) => {
                let stored: RepositoryConfig = serde_json::from_slice(&bytes)?;
                if registry.is_empty() || registry.containers() == stored.containers.as_slice() {
                    ContainerRegistry::try_from(stored.containers)?
                } else {
                    let config = RepositoryConfig {
                        created: stored.created,
                        containers: registry.containers().to_vec(),
                    };
                    storage
                        .put(CONFIG, Bytes::from(serde_json::to_vec_pretty(&config)?))
                        .await?;
                    let count = registry.containers().len();
                    diagnostics::info!("updated container configuration of {location} ({count} containers)", location: location.as_str(), count: count);
                    registry
                }
            }
            None => {
                let config = RepositoryConfig {
                    created: Utc::now(),
                    containers: registry.containers().to_vec(),
                };
                let created = storage
                    .put_if_absent(CONFIG, Bytes::from(serde_json::to_vec_pretty(&config)?))
                    .await?;
                if created {
                    diagnostics::info!("created repository at {location}", location: location.as_str());
                    registry
                } else {
                    // Lost a creation race; use what the winner wrote.
                    return Self::open(storage).await;
                }
            }
        };

        let repo = Self { storage, registry };
        repo.ensure_initialized().await?;
        Ok(repo)
    }

    /// Open an existing repository.
    pub async fn open(storage: Storage) -> Result<Self> {
        let bytes = storage
            .get(CONFIG)
            .await?
            .ok_or_else(|| CatalogError::RepositoryNotFound(storage.location().to_string()))?;
        let config: RepositoryConfig = serde_json::from_slice(&bytes)?;
        let registry = ContainerRegistry::try_from(config.containers)?;
        let repo = Self { storage, registry };
        repo.ensure_initialized().await?;
        Ok(repo)
    }

    async fn ensure_initialized(&self) -> Result<()> {
        if !self.ref_sequences(DEFAULT_BRANCH).await?.is_empty() {
            return Ok(());
        }
        let snapshot = self
            .build_snapshot(
                None,
                INITIAL_MESSAGE,
                uuid7::uuid7().to_string(),
                &VirtualDatasetManifest::new(),
            )
            .await?;
        let id = self.write_snapshot(&snapshot).await?;
        let head = BranchRef {
            snapshot: id,
            sequence: 0,
        };
        if self
            .storage
            .put_if_absent(
                &ref_path(DEFAULT_BRANCH, 0),
                Bytes::from(serde_json::to_vec(&head)?),
            )
            .await?
        {
            let id = head.snapshot.short();
            diagnostics::debug!("initialized {branch} at {id}", branch: DEFAULT_BRANCH, id: id);
        }
        Ok(())
    }

    pub fn registry(&self) -> &ContainerRegistry {
        &self.registry
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    async fn ref_sequences(&self, branch: &str) -> Result<Vec<u64>> {
        let dir = ref_dir(branch);
        let mut sequences: Vec<u64> = self
            .storage
            .list(&dir)
            .await?
            .into_iter()
            .filter_map(|(rel, _)| {
                rel.strip_prefix(&dir)?
                    .trim_start_matches('/')
                    .strip_suffix(".json")?
                    .parse()
                    .ok()
            })
            .collect();
        sequences.sort_unstable();
        Ok(sequences)
    }

    pub async fn branch_head(&self, branch: &str) -> Result<BranchRef> {
        validate_branch_name(branch)?;
        let sequence = *self
            .ref_sequences(branch)
            .await?
            .last()
            .ok_or_else(|| CatalogError::BranchNotFound(branch.to_string()))?;
        let bytes = self
            .storage
            .get(&ref_path(branch, sequence))
            .await?
            .ok_or_else(|| CatalogError::BranchNotFound(branch.to_string()))?;
        let head: BranchRef = serde_json::from_slice(&bytes)?;
        if head.sequence != sequence {
            return Err(CatalogError::Corrupt {
                what: format!("branch {branch}"),
                detail: format!("ref {sequence} claims sequence {}", head.sequence),
            });
        }
        Ok(head)
    }

    pub async fn list_branches(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .storage
            .list_dirs("refs")
            .await?
            .into_iter()
            .filter_map(|d| d.strip_prefix(BRANCH_DIR_PREFIX).map(str::to_string))
            .collect();
        names.sort();
        Ok(names)
    }

    pub async fn create_branch(&self, name: &str, from: &SnapshotId) -> Result<BranchRef> {
        validate_branch_name(name)?;
        _ = self.load_snapshot(from).await?;
        let head = BranchRef {
            snapshot: from.clone(),
            sequence: 0,
        };
        if !self
            .storage
            .put_if_absent(&ref_path(name, 0), Bytes::from(serde_json::to_vec(&head)?))
            .await?
        {
            return Err(CatalogError::BranchExists(name.to_string()));
        }
        let id = from.short();
        diagnostics::info!("created branch {name} at {id}", name: name, id: id);
        Ok(head)
    }

    pub async fn load_snapshot(&self, id: &SnapshotId) -> Result<Snapshot> {
        let bytes = self
            .storage
            .get(&snapshot_path(id))
            .await?
            .ok_or_else(|| CatalogError::SnapshotNotFound(id.clone()))?;
        let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
        if snapshot.id()? != *id {
            return Err(CatalogError::Corrupt {
                what: format!("snapshot {id}"),
                detail: "content does not match its id".to_string(),
            });
        }
        Ok(snapshot)
    }

    async fn load_rows(&self, manifest_id: &str) -> Result<Vec<ChunkRow>> {
        let bytes = self
            .storage
            .get(&manifest_path(manifest_id))
            .await?
            .ok_or_else(|| CatalogError::Corrupt {
                what: format!("manifest {manifest_id}"),
                detail: "missing".to_string(),
            })?;
        if content_hash(&bytes) != manifest_id {
            return Err(CatalogError::Corrupt {
                what: format!("manifest {manifest_id}"),
                detail: "content does not match its id".to_string(),
            });
        }
        decode_rows(bytes)
    }

    /// The dataset as of any snapshot, head or historical.
    pub async fn checkout(&self, id: &SnapshotId) -> Result<VirtualDatasetManifest> {
        let snapshot = self.load_snapshot(id).await?;
        let rows = self.load_rows(&snapshot.manifest_id).await?;
        snapshot.dataset(&rows)
    }

    /// Snapshots reachable from the branch head, newest first
    pub async fn ancestry(&self, branch: &str) -> Result<Vec<(SnapshotId, Snapshot)>> {
        let mut next = Some(self.branch_head(branch).await?.snapshot);
        let mut out = Vec::new();
        while let Some(id) = next {
            let snapshot = self.load_snapshot(&id).await?;
            next = snapshot.parent.clone();
            out.push((id, snapshot));
        }
        Ok(out)
    }

    pub async fn writable_session(&self, branch: &str) -> Result<Session> {
        let base = self.branch_head(branch).await?;
        Ok(Session::new(self.clone(), branch.to_string(), base))
    }

    pub(crate) async fn build_snapshot(
        &self,
        parent: Option<SnapshotId>,
        message: &str,
        txn_id: String,
        dataset: &VirtualDatasetManifest,
    ) -> Result<Snapshot> {
        let data = encode_rows(&chunk_rows(dataset))?;
        let manifest_id = content_hash(&data);
        _ = self
            .storage
            .put_if_absent(&manifest_path(&manifest_id), Bytes::from(data))
            .await?;
        Ok(Snapshot {
            parent,
            message: message.to_string(),
            timestamp: Utc::now(),
            txn_id,
            manifest_id,
            containers: self.registry.containers().to_vec(),
            attributes: dataset.attributes.clone(),
            variables: dataset
                .variables
                .iter()
                .map(|(name, m)| (name.clone(), m.metadata()))
                .collect(),
            coordinates: dataset.coordinates.clone(),
        })
    }

    pub(crate) async fn write_snapshot(&self, snapshot: &Snapshot) -> Result<SnapshotId> {
        let bytes = snapshot.canonical_bytes()?;
        let id = SnapshotId::of(&bytes);
        _ = self
            .storage
            .put_if_absent(&snapshot_path(&id), Bytes::from(bytes))
            .await?;
        Ok(id)
    }

    /// Point `branch` at `id`, provided its head is still `base`.
    pub(crate) async fn advance_branch(
        &self,
        branch: &str,
        base: &BranchRef,
        id: SnapshotId,
    ) -> Result<BranchRef> {
        let stale = || CatalogError::ConcurrentModification {
            branch: branch.to_string(),
            expected: base.snapshot.to_string(),
        };
        if self.branch_head(branch).await? != *base {
            return Err(stale());
        }
        let next = BranchRef {
            snapshot: id,
            sequence: base.sequence + 1,
        };
        if !self
            .storage
            .put_if_absent(
                &ref_path(branch, next.sequence),
                Bytes::from(serde_json::to_vec(&next)?),
            )
            .await?
        {
            return Err(stale());
        }
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_branch_names() {
        assert!(validate_branch_name("main").is_ok());
        assert!(validate_branch_name("exp-SSP245_v2").is_ok());
        assert!(validate_branch_name("").is_err());
        assert!(validate_branch_name("a/b").is_err());
        assert!(validate_branch_name(".hidden").is_err());
    }

    #[test]
    fn test_ref_paths_sort_by_sequence() {
        assert_eq!(ref_path("main", 7), "refs/branch.main/00000000000000000007.json");
        assert!(ref_path("main", 10) > ref_path("main", 9));
    }

    #[tokio::test]
    async fn test_create_initializes_main() {
        let repo = Repository::open_or_create(Storage::in_memory(), ContainerRegistry::new())
            .await
            .unwrap();
        let head = repo.branch_head(DEFAULT_BRANCH).await.unwrap();
        assert_eq!(head.sequence, 0);
        let history = repo.ancestry(DEFAULT_BRANCH).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].1.message, INITIAL_MESSAGE);
        assert!(repo.checkout(&head.snapshot).await.unwrap().variables.is_empty());
        assert_eq!(repo.list_branches().await.unwrap(), vec!["main"]);
    }

    #[tokio::test]
    async fn test_open_missing() {
        assert!(matches!(
            Repository::open(Storage::in_memory()).await,
            Err(CatalogError::RepositoryNotFound(_))
        ));
    }
}
