// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Virtual references to chunked array data in immutable source files.
//!
//! Per file, [`ChunkRefResolver`] turns header metadata into a
//! [`VirtualArrayManifest`] and [`CoordinateDeriver`] turns one per-file
//! field into a value along a new leading axis. Across files,
//! [`ManifestMerger`] stacks the per-file manifests (reconciling attributes
//! with an [`AttributeReconciler`]) and assembles the variables into one
//! [`VirtualDatasetManifest`].

pub mod attrs;
pub mod chunk;
pub mod coords;
pub mod deriver;
pub mod dtype;
pub mod error;
mod float;
pub mod manifest;
pub mod merge;
pub mod naming;
pub mod reconcile;
pub mod resolver;
pub mod source;

pub use attrs::{AttrScope, AttrValue, AttributeSet};
pub use chunk::{ChunkIndex, ChunkRef};
pub use coords::{CoordinateAxis, CoordinateValue};
pub use deriver::{CoordinateDeriver, CoordinateRule};
pub use dtype::{ByteOrder, DataType, ScalarKind};
pub use error::{Error, ErrorClass, Result};
pub use manifest::{ArrayMetadata, VirtualArrayManifest, VirtualDatasetManifest};
pub use merge::ManifestMerger;
pub use naming::{CasePolicy, VariableNaming};
pub use reconcile::{AttributeReconciler, Concatenate, ConflictRule, DropKey, PreferFirst, RuleSpec};
pub use resolver::ChunkRefResolver;
pub use source::{IndexedChunk, LoadedVariable, SourceFile, StorageLayout, VariableLayout};
