// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Versioned catalog of virtual datasets.
//!
//! A [`Repository`] holds immutable snapshots of
//! [`vref::VirtualDatasetManifest`]s on named branches. Writers stage a
//! dataset in a [`Session`] and commit it with optimistic concurrency.
//! A [`ContainerRegistry`] records which store (and which credential
//! strategy) serves every referenced source prefix, and [`ChunkReader`]
//! uses it to fetch referenced bytes later.

pub mod credentials;
pub mod data_taxonomy;
pub mod error;
pub mod reader;
pub mod registry;
pub mod repository;
pub mod schema;
pub mod session;
pub mod snapshot;
pub mod storage;

pub use credentials::{CredentialProvider, Credentials, StaticCredentialProvider};
pub use data_taxonomy::{ApiKey, ApiSecret};
pub use error::{CatalogError, Result};
pub use reader::{ChunkReader, ResolvedChunk, build_store};
pub use registry::{ContainerRegistry, CredentialStrategy, StoreDescriptor, VirtualChunkContainer};
pub use repository::{DEFAULT_BRANCH, INITIAL_MESSAGE, Repository, RepositoryConfig};
pub use session::{Session, SessionState};
pub use snapshot::{BranchRef, Snapshot, SnapshotId};
pub use storage::Storage;
