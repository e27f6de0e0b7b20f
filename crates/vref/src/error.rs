// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Error types for reference assembly

use crate::attrs::AttrValue;
use crate::chunk::ChunkIndex;
use std::collections::BTreeSet;

pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of every failure the pipeline can report.
///
/// Input failures belong to one (file, variable) task and are collected.
/// Consistency failures end the merge step that raised them. Concurrency
/// failures are retried by the caller. Store failures leave the branch
/// untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    Input,
    Consistency,
    Concurrency,
    Store,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Unsupported layout for {variable} in {source_url}: {reason}")]
    UnsupportedLayout {
        source_url: String,
        variable: String,
        reason: String,
    },

    #[error("Truncated source {source_url}: layout of {variable} needs {required} bytes, file has {available}")]
    TruncatedSource {
        source_url: String,
        variable: String,
        required: u64,
        available: u64,
    },

    #[error("Cannot parse coordinate {field} of {source_url} from {raw}: {reason}")]
    CoordinateParseError {
        source_url: String,
        field: String,
        raw: String,
        reason: String,
    },

    #[error("Source {source_url} has no value for field {field}")]
    MissingField { source_url: String, field: String },

    #[error("Attribute set {index} key mismatch. Missing: {missing:?}, Extra: {extra:?}")]
    AttributeKeySetMismatch {
        index: usize,
        missing: BTreeSet<String>,
        extra: BTreeSet<String>,
    },

    #[error("No reconciliation rule for attribute {key} with values {}", format_values(.values))]
    AttributeValueConflict { key: String, values: Vec<AttrValue> },

    #[error("Attribute set {index} has scope {found}, expected {expected}")]
    AttributeScopeMismatch {
        index: usize,
        expected: String,
        found: String,
    },

    #[error("Shape mismatch for {variable}: {detail}")]
    ShapeMismatch { variable: String, detail: String },

    #[error("Dtype mismatch for {variable}: expected {expected}, found {found}")]
    DtypeMismatch {
        variable: String,
        expected: String,
        found: String,
    },

    #[error("Axis {axis} is not strictly increasing at position {position}")]
    AxisNotMonotonic { axis: String, position: usize },

    #[error("Dimension {dimension} has length {first_len} in {first} but {second_len} in {second}")]
    DimensionConflict {
        dimension: String,
        first: String,
        first_len: u64,
        second: String,
        second_len: u64,
    },

    #[error("Coordinate {coordinate} differs between {first} and {second}")]
    CoordinateConflict {
        coordinate: String,
        first: String,
        second: String,
    },

    #[error("Variable declared as {declared} but expected as {expected}")]
    VariableNameMismatch { expected: String, declared: String },

    #[error("Duplicate chunk {index} in {variable}")]
    DuplicateChunk { variable: String, index: ChunkIndex },

    #[error("Chunk {index} lies outside the chunk grid of {variable}")]
    ChunkOutOfGrid { variable: String, index: ChunkIndex },

    #[error("Manifest for {variable} covers {covered} of {expected} chunks")]
    IncompleteManifest {
        variable: String,
        covered: usize,
        expected: usize,
    },

    #[error("Invalid dtype: {0}")]
    InvalidDataType(String),

    #[error("Invalid chunk key: {0}")]
    InvalidChunkKey(String),

    #[error("Coordinate axis {axis} mixes value types")]
    MixedCoordinateTypes { axis: String },

    #[error("Nothing to merge: {0}")]
    EmptyInput(String),

    #[error("Cannot derive a variable name from {locator}: {reason}")]
    InvalidLocator { locator: String, reason: String },
}

impl Error {
    /// Which part of the error taxonomy this failure belongs to
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::UnsupportedLayout { .. }
            | Error::TruncatedSource { .. }
            | Error::CoordinateParseError { .. }
            | Error::MissingField { .. }
            | Error::InvalidDataType(_)
            | Error::InvalidChunkKey(_)
            | Error::InvalidLocator { .. } => ErrorClass::Input,
            _ => ErrorClass::Consistency,
        }
    }
}

fn format_values(values: &[AttrValue]) -> String {
    let parts: Vec<String> = values.iter().map(|v| v.to_string()).collect();
    format!("[{}]", parts.join(", "))
}
