// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Virtual array and dataset manifests

use crate::attrs::{AttrScope, AttributeSet};
use crate::chunk::{ChunkIndex, ChunkRef, grid_shape};
use crate::coords::CoordinateAxis;
use crate::dtype::DataType;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Everything about a virtual array except its chunk references
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayMetadata {
    pub name: String,
    pub dtype: DataType,
    pub dims: Vec<String>,
    pub shape: Vec<u64>,
    pub chunk_shape: Vec<u64>,
    #[serde(default)]
    pub attributes: AttributeSet,
    #[serde(default)]
    pub coordinates: BTreeMap<String, CoordinateAxis>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualArrayManifest {
    pub name: String,
    pub dtype: DataType,
    pub dims: Vec<String>,
    pub shape: Vec<u64>,
    pub chunk_shape: Vec<u64>,
    pub chunks: BTreeMap<ChunkIndex, ChunkRef>,
    /// Grid positions deliberately left without a reference (read as fill value)
    #[serde(default)]
    pub absent: BTreeSet<ChunkIndex>,
    #[serde(default)]
    pub attributes: AttributeSet,
    /// Materialised coordinates for some of `dims`
    #[serde(default)]
    pub coordinates: BTreeMap<String, CoordinateAxis>,
}

impl VirtualArrayManifest {
    pub fn new(
        name: impl Into<String>,
        dtype: DataType,
        dims: Vec<String>,
        shape: Vec<u64>,
        chunk_shape: Vec<u64>,
    ) -> Result<Self> {
        Self::from_metadata(ArrayMetadata {
            name: name.into(),
            dtype,
            dims,
            shape,
            chunk_shape,
            attributes: AttributeSet::new(AttrScope::Variable),
            coordinates: BTreeMap::new(),
        })
    }

    /// Empty manifest for the given metadata
    pub fn from_metadata(metadata: ArrayMetadata) -> Result<Self> {
        let rank = metadata.shape.len();
        if metadata.dims.len() != rank || metadata.chunk_shape.len() != rank {
            return Err(Error::ShapeMismatch {
                variable: metadata.name,
                detail: format!(
                    "{} dims, shape {:?}, chunk shape {:?}",
                    metadata.dims.len(),
                    metadata.shape,
                    metadata.chunk_shape
                ),
            });
        }
        if metadata.chunk_shape.contains(&0) {
            return Err(Error::ShapeMismatch {
                variable: metadata.name,
                detail: format!("zero-sized chunk shape {:?}", metadata.chunk_shape),
            });
        }
        Ok(Self {
            name: metadata.name,
            dtype: metadata.dtype,
            dims: metadata.dims,
            shape: metadata.shape,
            chunk_shape: metadata.chunk_shape,
            chunks: BTreeMap::new(),
            absent: BTreeSet::new(),
            attributes: metadata.attributes,
            coordinates: metadata.coordinates,
        })
    }

    pub fn metadata(&self) -> ArrayMetadata {
        ArrayMetadata {
            name: self.name.clone(),
            dtype: self.dtype,
            dims: self.dims.clone(),
            shape: self.shape.clone(),
            chunk_shape: self.chunk_shape.clone(),
            attributes: self.attributes.clone(),
            coordinates: self.coordinates.clone(),
        }
    }

    pub fn grid_shape(&self) -> Vec<u64> {
        grid_shape(&self.shape, &self.chunk_shape)
    }

    /// Number of grid positions implied by shape and chunk shape
    pub fn expected_slots(&self) -> usize {
        self.grid_shape().iter().product::<u64>() as usize
    }

    /// Number of chunk references (absent positions excluded)
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    fn claim(&self, index: &ChunkIndex) -> Result<()> {
        if !index.within(&self.grid_shape()) {
            return Err(Error::ChunkOutOfGrid {
                variable: self.name.clone(),
                index: index.clone(),
            });
        }
        if self.chunks.contains_key(index) || self.absent.contains(index) {
            return Err(Error::DuplicateChunk {
                variable: self.name.clone(),
                index: index.clone(),
            });
        }
        Ok(())
    }

    pub fn insert(&mut self, chunk: ChunkRef) -> Result<()> {
        self.claim(&chunk.index)?;
        _ = self.chunks.insert(chunk.index.clone(), chunk);
        Ok(())
    }

    pub fn mark_absent(&mut self, index: ChunkIndex) -> Result<()> {
        self.claim(&index)?;
        _ = self.absent.insert(index);
        Ok(())
    }

    /// Every grid position is covered exactly once.
    pub fn validate(&self) -> Result<()> {
        let grid = self.grid_shape();
        if let Some(index) = self
            .chunks
            .keys()
            .chain(self.absent.iter())
            .find(|idx| !idx.within(&grid))
        {
            return Err(Error::ChunkOutOfGrid {
                variable: self.name.clone(),
                index: index.clone(),
            });
        }
        if let Some(index) = self.chunks.keys().find(|idx| self.absent.contains(*idx)) {
            return Err(Error::DuplicateChunk {
                variable: self.name.clone(),
                index: index.clone(),
            });
        }
        let covered = self.chunks.len() + self.absent.len();
        let expected = self.expected_slots();
        if covered != expected {
            return Err(Error::IncompleteManifest {
                variable: self.name.clone(),
                covered,
                expected,
            });
        }
        for (dim, axis) in &self.coordinates {
            let len = self.dim_length(dim).ok_or_else(|| Error::ShapeMismatch {
                variable: self.name.clone(),
                detail: format!("coordinate {dim} is not one of {:?}", self.dims),
            })?;
            if axis.len() as u64 != len {
                return Err(Error::DimensionConflict {
                    dimension: dim.clone(),
                    first: self.name.clone(),
                    first_len: len,
                    second: format!("coordinate {dim}"),
                    second_len: axis.len() as u64,
                });
            }
        }
        Ok(())
    }

    pub fn dim_length(&self, dim: &str) -> Option<u64> {
        self.dims
            .iter()
            .position(|d| d == dim)
            .map(|i| self.shape[i])
    }

    /// Add a new leading dimension of length one.
    pub fn expand_leading(&self, dim: &str) -> Result<Self> {
        if self.dims.iter().any(|d| d == dim) {
            return Err(Error::ShapeMismatch {
                variable: self.name.clone(),
                detail: format!("dimension {dim} already present in {:?}", self.dims),
            });
        }
        let mut dims = vec![dim.to_string()];
        dims.extend(self.dims.iter().cloned());
        let mut shape = vec![1];
        shape.extend_from_slice(&self.shape);
        let mut chunk_shape = vec![1];
        chunk_shape.extend_from_slice(&self.chunk_shape);

        let chunks = self
            .chunks
            .values()
            .map(|c| {
                let mut c = c.clone();
                c.index = c.index.prepend(0);
                (c.index.clone(), c)
            })
            .collect();
        let absent = self.absent.iter().map(|i| i.prepend(0)).collect();

        Ok(Self {
            name: self.name.clone(),
            dtype: self.dtype,
            dims,
            shape,
            chunk_shape,
            chunks,
            absent,
            attributes: self.attributes.clone(),
            coordinates: self.coordinates.clone(),
        })
    }

    /// Attach a materialised coordinate for one of this array's dimensions.
    pub fn set_coordinate(&mut self, axis: CoordinateAxis) -> Result<()> {
        let len = self.dim_length(&axis.name).ok_or_else(|| Error::ShapeMismatch {
            variable: self.name.clone(),
            detail: format!("coordinate {} is not one of {:?}", axis.name, self.dims),
        })?;
        if axis.len() as u64 != len {
            return Err(Error::DimensionConflict {
                dimension: axis.name.clone(),
                first: self.name.clone(),
                first_len: len,
                second: format!("coordinate {}", axis.name),
                second_len: axis.len() as u64,
            });
        }
        _ = self.coordinates.insert(axis.name.clone(), axis);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VirtualDatasetManifest {
    pub attributes: AttributeSet,
    pub variables: BTreeMap<String, VirtualArrayManifest>,
    pub coordinates: BTreeMap<String, CoordinateAxis>,
}

impl VirtualDatasetManifest {
    pub fn new() -> Self {
        Self {
            attributes: AttributeSet::new(AttrScope::Dataset),
            variables: BTreeMap::new(),
            coordinates: BTreeMap::new(),
        }
    }

    pub fn with_attributes(mut self, attributes: AttributeSet) -> Self {
        self.attributes = attributes.rescoped(AttrScope::Dataset);
        self
    }

    pub fn chunk_refs(&self) -> impl Iterator<Item = &ChunkRef> {
        self.variables.values().flat_map(|v| v.chunks.values())
    }

    pub fn chunk_count(&self) -> usize {
        self.variables.values().map(|v| v.chunk_count()).sum()
    }

    /// Length of every dimension, checked for agreement across variables
    /// and materialised coordinates.
    pub fn dimensions(&self) -> Result<BTreeMap<String, u64>> {
        let mut dims = check_dimensions(self.variables.iter())?;
        for (name, axis) in &self.coordinates {
            match dims.get(name) {
                Some(&len) if len != axis.len() as u64 => {
                    let owner = self
                        .variables
                        .values()
                        .find(|v| v.dims.contains(name))
                        .map(|v| v.name.clone())
                        .unwrap_or_default();
                    return Err(Error::DimensionConflict {
                        dimension: name.clone(),
                        first: owner,
                        first_len: len,
                        second: format!("coordinate {name}"),
                        second_len: axis.len() as u64,
                    });
                }
                Some(_) => {}
                None => {
                    _ = dims.insert(name.clone(), axis.len() as u64);
                }
            }
        }
        Ok(dims)
    }

    /// Check every array manifest and every cross-variable invariant.
    pub fn validate(&self) -> Result<()> {
        for manifest in self.variables.values() {
            manifest.validate()?;
        }
        _ = self.dimensions()?;
        let merged = collect_coordinates(self.variables.values())?;
        for (name, axis) in &merged {
            if let Some(declared) = self.coordinates.get(name) {
                if declared != axis {
                    return Err(Error::CoordinateConflict {
                        coordinate: name.clone(),
                        first: "dataset".to_string(),
                        second: axis_owner(self.variables.values(), name),
                    });
                }
            }
        }
        Ok(())
    }
}

fn axis_owner<'a>(
    manifests: impl Iterator<Item = &'a VirtualArrayManifest>,
    coordinate: &str,
) -> String {
    manifests
        .filter(|m| m.coordinates.contains_key(coordinate))
        .map(|m| m.name.clone())
        .next()
        .unwrap_or_default()
}

/// Shared dimensions must have one length across all variables.
pub(crate) fn check_dimensions<'a>(
    variables: impl Iterator<Item = (&'a String, &'a VirtualArrayManifest)>,
) -> Result<BTreeMap<String, u64>> {
    let mut seen: BTreeMap<String, (String, u64)> = BTreeMap::new();
    for (name, manifest) in variables {
        for (dim, &len) in manifest.dims.iter().zip(&manifest.shape) {
            match seen.get(dim) {
                Some((owner, first_len)) if *first_len != len => {
                    return Err(Error::DimensionConflict {
                        dimension: dim.clone(),
                        first: owner.clone(),
                        first_len: *first_len,
                        second: name.clone(),
                        second_len: len,
                    });
                }
                Some(_) => {}
                None => {
                    _ = seen.insert(dim.clone(), (name.clone(), len));
                }
            }
        }
    }
    Ok(seen.into_iter().map(|(dim, (_, len))| (dim, len)).collect())
}

/// Union of materialised coordinates; the same name must carry the same values.
pub(crate) fn collect_coordinates<'a>(
    manifests: impl Iterator<Item = &'a VirtualArrayManifest>,
) -> Result<BTreeMap<String, CoordinateAxis>> {
    let mut out: BTreeMap<String, (String, CoordinateAxis)> = BTreeMap::new();
    for manifest in manifests {
        for (name, axis) in &manifest.coordinates {
            match out.get(name) {
                Some((owner, existing)) if existing != axis => {
                    return Err(Error::CoordinateConflict {
                        coordinate: name.clone(),
                        first: owner.clone(),
                        second: manifest.name.clone(),
                    });
                }
                Some(_) => {}
                None => {
                    _ = out.insert(name.clone(), (manifest.name.clone(), axis.clone()));
                }
            }
        }
    }
    Ok(out.into_iter().map(|(k, (_, axis))| (k, axis)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::ScalarKind;

    fn chunk(location: &str, offset: u64, index: Vec<u64>) -> ChunkRef {
        ChunkRef {
            location: location.to_string(),
            offset,
            length: 16,
            index: ChunkIndex(index),
            fingerprint: None,
        }
    }

    fn grid_2x2() -> VirtualArrayManifest {
        VirtualArrayManifest::new(
            "SWE",
            DataType::big_endian(ScalarKind::F32),
            vec!["lat".into(), "lon".into()],
            vec![4, 4],
            vec![2, 2],
        )
        .unwrap()
    }

    #[test]
    fn test_duplicate_and_out_of_grid() {
        let mut m = grid_2x2();
        m.insert(chunk("file:///a.nc", 0, vec![0, 0])).unwrap();
        assert!(matches!(
            m.insert(chunk("file:///a.nc", 16, vec![0, 0])),
            Err(Error::DuplicateChunk { .. })
        ));
        assert!(matches!(
            m.mark_absent(ChunkIndex(vec![0, 0])),
            Err(Error::DuplicateChunk { .. })
        ));
        assert!(matches!(
            m.insert(chunk("file:///a.nc", 16, vec![2, 0])),
            Err(Error::ChunkOutOfGrid { .. })
        ));
    }

    #[test]
    fn test_gaps_are_not_tolerated() {
        let mut m = grid_2x2();
        m.insert(chunk("file:///a.nc", 0, vec![0, 0])).unwrap();
        m.insert(chunk("file:///a.nc", 16, vec![0, 1])).unwrap();
        m.insert(chunk("file:///a.nc", 32, vec![1, 0])).unwrap();
        assert!(matches!(
            m.validate(),
            Err(Error::IncompleteManifest { covered: 3, expected: 4, .. })
        ));
        m.mark_absent(ChunkIndex(vec![1, 1])).unwrap();
        m.validate().unwrap();
        assert_eq!(m.chunk_count(), 3);
    }

    #[test]
    fn test_expand_leading() {
        let mut m = grid_2x2();
        m.insert(chunk("file:///a.nc", 0, vec![1, 1])).unwrap();
        let e = m.expand_leading("time").unwrap();
        assert_eq!(e.dims, vec!["time", "lat", "lon"]);
        assert_eq!(e.shape, vec![1, 4, 4]);
        assert_eq!(e.chunk_shape, vec![1, 2, 2]);
        assert!(e.chunks.contains_key(&ChunkIndex(vec![0, 1, 1])));
        assert!(e.expand_leading("time").is_err());
    }

    #[test]
    fn test_coordinate_length_checked() {
        let mut m = grid_2x2();
        let short = CoordinateAxis::from_loaded("lat", &crate::AttrValue::FloatList(vec![1.0])).unwrap();
        assert!(matches!(m.set_coordinate(short), Err(Error::DimensionConflict { .. })));
        let other = CoordinateAxis::from_loaded("depth", &crate::AttrValue::FloatList(vec![1.0])).unwrap();
        assert!(m.set_coordinate(other).is_err());
    }
}
