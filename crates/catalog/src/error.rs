// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use crate::snapshot::SnapshotId;
use thiserror::Error;
use vref::ErrorClass;

pub type Result<T> = std::result::Result<T, CatalogError>;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("No virtual chunk container matches {url}")]
    NoContainerForPrefix { url: String },

    #[error("Container prefix {0} is already registered")]
    DuplicateContainer(String),

    #[error("Invalid container prefix {prefix}: {reason}")]
    InvalidContainer { prefix: String, reason: String },

    #[error("No credentials named {0}")]
    CredentialsNotFound(String),

    #[error("Branch {branch} moved from {expected} while the session was open")]
    ConcurrentModification { branch: String, expected: String },

    #[error("Branch not found: {0}")]
    BranchNotFound(String),

    #[error("Branch already exists: {0}")]
    BranchExists(String),

    #[error("Invalid branch name: {0}")]
    InvalidBranchName(String),

    #[error("Snapshot not found: {0}")]
    SnapshotNotFound(SnapshotId),

    #[error("No repository at {0}")]
    RepositoryNotFound(String),

    #[error("Session is {state}, cannot {operation}")]
    InvalidSessionState {
        state: &'static str,
        operation: &'static str,
    },

    #[error("Nothing staged in session")]
    NothingStaged,

    #[error("Source {url} changed: fingerprint {expected}, now {found}")]
    SourceChanged {
        url: String,
        expected: String,
        found: String,
    },

    #[error("Corrupt {what}: {detail}")]
    Corrupt { what: String, detail: String },

    #[error("Invalid storage location {location}: {reason}")]
    InvalidLocation { location: String, reason: String },

    #[error("Manifest error: {0}")]
    Manifest(#[from] vref::Error),

    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Arrow serialization error: {0}")]
    SerdeArrow(#[from] serde_arrow::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CatalogError {
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            CatalogError::ConcurrentModification { .. } => ErrorClass::Concurrency,
            CatalogError::Manifest(e) => e.class(),
            CatalogError::NoContainerForPrefix { .. }
            | CatalogError::NothingStaged
            | CatalogError::InvalidSessionState { .. } => ErrorClass::Consistency,
            CatalogError::DuplicateContainer(_)
            | CatalogError::InvalidContainer { .. }
            | CatalogError::CredentialsNotFound(_)
            | CatalogError::InvalidBranchName(_)
            | CatalogError::InvalidLocation { .. }
            | CatalogError::Url(_) => ErrorClass::Input,
            _ => ErrorClass::Store,
        }
    }

    pub fn is_concurrent_modification(&self) -> bool {
        matches!(self, CatalogError::ConcurrentModification { .. })
    }
}
