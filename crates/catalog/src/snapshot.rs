// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Immutable, content-addressed snapshots and branch pointers

use crate::error::{CatalogError, Result};
use crate::registry::VirtualChunkContainer;
use crate::schema::ChunkRow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use vref::{
    ArrayMetadata, AttributeSet, CoordinateAxis, VirtualArrayManifest, VirtualDatasetManifest,
};

/// Hex SHA-256 of a snapshot's canonical JSON
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotId(String);

impl SnapshotId {
    pub fn of(bytes: &[u8]) -> Self {
        Self(content_hash(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex digits, for display
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for SnapshotId {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self> {
        if s.len() == 64 && s.bytes().all(|b| b.is_ascii_hexdigit()) {
            Ok(Self(s.to_ascii_lowercase()))
        } else {
            Err(CatalogError::Corrupt {
                what: "snapshot id".to_string(),
                detail: s.to_string(),
            })
        }
    }
}

pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Everything a reader needs to rebuild a dataset, except the chunk table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub parent: Option<SnapshotId>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// Session that produced this snapshot (UUID v7)
    pub txn_id: String,
    /// Content hash of the chunk table
    pub manifest_id: String,
    pub containers: Vec<VirtualChunkContainer>,
    pub attributes: AttributeSet,
    pub variables: BTreeMap<String, ArrayMetadata>,
    pub coordinates: BTreeMap<String, CoordinateAxis>,
}

impl Snapshot {
    pub fn canonical_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn id(&self) -> Result<SnapshotId> {
        Ok(SnapshotId::of(&self.canonical_bytes()?))
    }

    /// Reassemble the dataset from this snapshot's chunk table.
    pub fn dataset(&self, rows: &[ChunkRow]) -> Result<VirtualDatasetManifest> {
        let mut variables: BTreeMap<String, VirtualArrayManifest> = BTreeMap::new();
        for (name, metadata) in &self.variables {
            _ = variables.insert(
                name.clone(),
                VirtualArrayManifest::from_metadata(metadata.clone())?,
            );
        }
        for row in rows {
            let manifest = variables
                .get_mut(&row.variable)
                .ok_or_else(|| CatalogError::Corrupt {
                    what: format!("manifest {}", self.manifest_id),
                    detail: format!("chunk for unknown variable {}", row.variable),
                })?;
            match row.to_chunk_ref()? {
                Some(chunk) => manifest.insert(chunk)?,
                None => manifest.mark_absent(row.key.parse()?)?,
            }
        }
        let dataset = VirtualDatasetManifest {
            attributes: self.attributes.clone(),
            variables,
            coordinates: self.coordinates.clone(),
        };
        dataset.validate()?;
        Ok(dataset)
    }
}

/// One update of a branch pointer: `refs/branch.<name>/<sequence>.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchRef {
    pub snapshot: SnapshotId,
    pub sequence: u64,
}
