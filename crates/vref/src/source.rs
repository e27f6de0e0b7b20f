// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Descriptions of discovered source files, as produced by a header
//! decoder. Immutable once read.

use crate::attrs::{AttrValue, AttributeSet};
use crate::chunk::ChunkIndex;
use crate::dtype::DataType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How a variable's bytes are laid out inside its source file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StorageLayout {
    /// Row-major bytes starting at `offset`
    Contiguous { offset: u64 },

    /// One slab per step of the leading dimension, `record_stride` bytes apart
    Records { offset: u64, record_stride: u64 },

    /// Uncompressed chunks listed in the file header
    Indexed { chunks: Vec<IndexedChunk> },

    /// Payload must be decompressed to find chunk boundaries
    Compressed { codec: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedChunk {
    pub index: ChunkIndex,
    pub offset: u64,
    pub length: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableLayout {
    pub name: String,
    pub dtype: DataType,
    pub dims: Vec<String>,
    pub shape: Vec<u64>,
    pub chunk_shape: Vec<u64>,
    pub storage: StorageLayout,
    #[serde(default)]
    pub attributes: AttributeSet,
}

impl VariableLayout {
    /// Bytes in one uncompressed chunk, `None` if that overflows a `u64`
    pub fn chunk_bytes(&self) -> Option<u64> {
        self.chunk_shape
            .iter()
            .try_fold(self.dtype.item_size(), |acc, &n| acc.checked_mul(n))
    }
}

/// Small array read eagerly from the file (coordinate values, the
/// per-file date field)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadedVariable {
    #[serde(default)]
    pub dims: Vec<String>,
    pub values: AttrValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceFile {
    /// URL of the file
    pub url: String,
    pub byte_length: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    #[serde(default)]
    pub attributes: AttributeSet,
    #[serde(default)]
    pub variables: Vec<VariableLayout>,
    #[serde(default)]
    pub loaded: BTreeMap<String, LoadedVariable>,
}

impl SourceFile {
    pub fn variable(&self, name: &str) -> Option<&VariableLayout> {
        self.variables.iter().find(|v| v.name == name)
    }

    /// Layouts that are referenced virtually rather than loaded
    pub fn data_variables(&self) -> impl Iterator<Item = &VariableLayout> {
        self.variables
            .iter()
            .filter(|v| !self.loaded.contains_key(&v.name))
    }
}
