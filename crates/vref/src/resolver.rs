// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Chunk references from header metadata alone.
//!
//! The resolver never reads payload bytes. Every offset it produces is
//! computed from the variable's [`StorageLayout`], and the total extent is
//! checked against the source's declared byte length.

use crate::attrs::AttrScope;
use crate::chunk::{ChunkIndex, ChunkRef, grid_indices};
use crate::coords::CoordinateAxis;
use crate::error::{Error, Result};
use crate::manifest::{ArrayMetadata, VirtualArrayManifest};
use crate::source::{SourceFile, StorageLayout, VariableLayout};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, Default)]
pub struct ChunkRefResolver;

impl ChunkRefResolver {
    pub fn new() -> Self {
        Self
    }

    /// Build the manifest for one variable of one source file.
    pub fn resolve(
        &self,
        source: &SourceFile,
        layout: &VariableLayout,
    ) -> Result<VirtualArrayManifest> {
        let unsupported = |reason: String| Error::UnsupportedLayout {
            source_url: source.url.clone(),
            variable: layout.name.clone(),
            reason,
        };

        let rank = layout.shape.len();
        if layout.dims.len() != rank || layout.chunk_shape.len() != rank {
            return Err(unsupported(format!(
                "rank disagreement: dims {:?}, shape {:?}, chunks {:?}",
                layout.dims, layout.shape, layout.chunk_shape
            )));
        }
        if layout.chunk_shape.contains(&0) {
            return Err(unsupported(format!(
                "zero-sized chunk shape {:?}",
                layout.chunk_shape
            )));
        }

        let truncated = |required: u64| Error::TruncatedSource {
            source_url: source.url.clone(),
            variable: layout.name.clone(),
            required,
            available: source.byte_length,
        };
        let chunk_bytes = layout.chunk_bytes().ok_or_else(|| {
            unsupported(format!(
                "chunk shape {:?} of {} overflows a byte count",
                layout.chunk_shape, layout.dtype
            ))
        })?;
        let grid = crate::chunk::grid_shape(&layout.shape, &layout.chunk_shape);
        if grid.iter().try_fold(1u64, |acc, &n| acc.checked_mul(n)).is_none() {
            return Err(unsupported(format!("chunk grid {grid:?} is too large")));
        }

        let placed = match &layout.storage {
            StorageLayout::Compressed { codec } => {
                return Err(unsupported(format!(
                    "{codec} compressed payload has no header-derivable chunk boundaries"
                )));
            }
            StorageLayout::Contiguous { offset } => {
                require_full_trailing(layout).map_err(unsupported)?;
                if rank > 0 && layout.shape[0] % layout.chunk_shape[0] != 0 {
                    return Err(unsupported(format!(
                        "leading dimension {} is not a multiple of chunk length {}",
                        layout.shape[0], layout.chunk_shape[0]
                    )));
                }
                strided(&grid, *offset, chunk_bytes, chunk_bytes, source.byte_length)
                    .map_err(truncated)?
            }
            StorageLayout::Records {
                offset,
                record_stride,
            } => {
                if rank == 0 || layout.chunk_shape[0] != 1 {
                    return Err(unsupported(
                        "record storage needs one record per chunk along the leading dimension"
                            .to_string(),
                    ));
                }
                require_full_trailing(layout).map_err(unsupported)?;
                if *record_stride < chunk_bytes {
                    return Err(unsupported(format!(
                        "record stride {record_stride} is smaller than a record ({chunk_bytes} bytes)"
                    )));
                }
                strided(&grid, *offset, *record_stride, chunk_bytes, source.byte_length)
                    .map_err(truncated)?
            }
            StorageLayout::Indexed { chunks } => {
                let mut placed = Vec::with_capacity(chunks.len());
                let mut seen = BTreeSet::new();
                let mut required = 0;
                for entry in chunks {
                    if entry.length != chunk_bytes {
                        return Err(unsupported(format!(
                            "chunk {} holds {} bytes, uniform chunks hold {chunk_bytes}",
                            entry.index, entry.length
                        )));
                    }
                    if !entry.index.within(&grid) {
                        return Err(unsupported(format!(
                            "chunk {} lies outside grid {grid:?}",
                            entry.index
                        )));
                    }
                    if !seen.insert(&entry.index) {
                        return Err(unsupported(format!(
                            "chunk {} is listed more than once",
                            entry.index
                        )));
                    }
                    let end = entry
                        .offset
                        .checked_add(entry.length)
                        .ok_or_else(|| truncated(u64::MAX))?;
                    required = required.max(end);
                    placed.push((entry.index.clone(), entry.offset, entry.length));
                }
                if required > source.byte_length {
                    return Err(truncated(required));
                }
                placed
            }
        };

        let mut manifest = VirtualArrayManifest::from_metadata(ArrayMetadata {
            name: layout.name.clone(),
            dtype: layout.dtype,
            dims: layout.dims.clone(),
            shape: layout.shape.clone(),
            chunk_shape: layout.chunk_shape.clone(),
            attributes: layout.attributes.clone().rescoped(AttrScope::Variable),
            coordinates: BTreeMap::new(),
        })?;

        for (index, offset, length) in placed {
            manifest.insert(ChunkRef {
                location: source.url.clone(),
                offset,
                length,
                index,
                fingerprint: source.fingerprint.clone(),
            })?;
        }

        // Header-indexed chunks that were never written read as fill value.
        let present: BTreeSet<ChunkIndex> = manifest.chunks.keys().cloned().collect();
        for index in grid_indices(&manifest.grid_shape()) {
            if !present.contains(&index) {
                manifest.mark_absent(index)?;
            }
        }

        for dim in &layout.dims {
            if let Some(loaded) = source.loaded.get(dim) {
                manifest.set_coordinate(CoordinateAxis::from_loaded(dim.as_str(), &loaded.values)?)?;
            }
        }

        let url = source.url.as_str();
        let variable = layout.name.as_str();
        let count = manifest.chunk_count();
        diagnostics::debug!("resolved {count} chunks of {variable} in {url}", count: count, variable: variable, url: url);

        Ok(manifest)
    }

    /// Resolve every non-loaded variable in the file.
    pub fn resolve_all(&self, source: &SourceFile) -> Result<Vec<VirtualArrayManifest>> {
        source
            .data_variables()
            .map(|layout| self.resolve(source, layout))
            .collect()
    }
}

fn require_full_trailing(layout: &VariableLayout) -> std::result::Result<(), String> {
    if layout.shape.len() > 1 && layout.chunk_shape[1..] != layout.shape[1..] {
        return Err(format!(
            "chunk shape {:?} does not span trailing dimensions of {:?}",
            layout.chunk_shape, layout.shape
        ));
    }
    Ok(())
}

/// Chunks laid end to end along the leading dimension, `stride` bytes
/// apart.
///
/// Fails with the bytes the layout needs when the last chunk ends past
/// `available` or beyond `u64::MAX`.
fn strided(
    grid: &[u64],
    offset: u64,
    stride: u64,
    chunk_bytes: u64,
    available: u64,
) -> std::result::Result<Vec<(ChunkIndex, u64, u64)>, u64> {
    if grid.contains(&0) {
        return Ok(Vec::new());
    }
    let last = grid.first().map_or(0, |n| n - 1);
    let required = last
        .checked_mul(stride)
        .and_then(|v| v.checked_add(offset))
        .and_then(|v| v.checked_add(chunk_bytes))
        .ok_or(u64::MAX)?;
    if required > available {
        return Err(required);
    }
    Ok(grid_indices(grid)
        .into_iter()
        .map(|index| {
            let step = index.0.first().copied().unwrap_or(0);
            (index, offset + step * stride, chunk_bytes)
        })
        .collect())
}
