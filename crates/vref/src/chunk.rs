// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Chunk coordinates and virtual chunk references

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Logical position of a chunk in an array's chunk grid.
///
/// Rendered with the Zarr v3 default key encoding: `c/0/3/1`, or `c`
/// for a zero-dimensional array.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChunkIndex(pub Vec<u64>);

impl ChunkIndex {
    pub fn new(coords: Vec<u64>) -> Self {
        Self(coords)
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// Index with `position` prepended as a new leading coordinate
    pub fn prepend(&self, position: u64) -> Self {
        let mut coords = Vec::with_capacity(self.0.len() + 1);
        coords.push(position);
        coords.extend_from_slice(&self.0);
        Self(coords)
    }

    /// Index with the leading coordinate replaced
    pub fn with_leading(&self, position: u64) -> Self {
        let mut coords = self.0.clone();
        if let Some(first) = coords.first_mut() {
            *first = position;
        }
        Self(coords)
    }

    /// Whether this index is inside a grid of the given shape
    pub fn within(&self, grid: &[u64]) -> bool {
        self.0.len() == grid.len() && self.0.iter().zip(grid).all(|(i, n)| i < n)
    }
}

impl fmt::Display for ChunkIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("c")?;
        for coord in &self.0 {
            write!(f, "/{coord}")?;
        }
        Ok(())
    }
}

impl FromStr for ChunkIndex {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('/');
        if parts.next() != Some("c") {
            return Err(Error::InvalidChunkKey(s.to_string()));
        }
        parts
            .map(|p| p.parse::<u64>())
            .collect::<Result<Vec<_>, _>>()
            .map(ChunkIndex)
            .map_err(|_| Error::InvalidChunkKey(s.to_string()))
    }
}

impl TryFrom<String> for ChunkIndex {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ChunkIndex> for String {
    fn from(value: ChunkIndex) -> Self {
        value.to_string()
    }
}

/// A byte range inside an existing immutable source file standing in
/// for one chunk of array payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRef {
    /// Source file URL
    pub location: String,
    pub offset: u64,
    pub length: u64,
    pub index: ChunkIndex,
    /// Content fingerprint (ETag or checksum) of the source when resolved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

impl ChunkRef {
    /// One past the last referenced byte, clamped to `u64::MAX`
    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.length)
    }

    pub fn byte_range(&self) -> std::ops::Range<u64> {
        self.offset..self.end()
    }
}

/// Number of chunks along each dimension: `ceil(shape / chunk_shape)`
pub fn grid_shape(shape: &[u64], chunk_shape: &[u64]) -> Vec<u64> {
    shape
        .iter()
        .zip(chunk_shape)
        .map(|(&n, &c)| if c == 0 { 0 } else { n.div_ceil(c) })
        .collect()
}

/// Every index of a grid in row-major order
pub fn grid_indices(grid: &[u64]) -> Vec<ChunkIndex> {
    let total: u64 = grid.iter().product();
    let mut out = Vec::with_capacity(total as usize);
    if total == 0 {
        return out;
    }
    let mut current = vec![0u64; grid.len()];
    for _ in 0..total {
        out.push(ChunkIndex(current.clone()));
        for d in (0..grid.len()).rev() {
            current[d] += 1;
            if current[d] < grid[d] {
                break;
            }
            current[d] = 0;
        }
    }
    out
}
