// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Where a catalog repository keeps its objects

use crate::error::{CatalogError, Result};
use bytes::Bytes;
use futures::TryStreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::{ObjectMeta, ObjectStore, PutMode, PutPayload};
use std::sync::Arc;
use url::Url;

/// An object store plus the prefix a repository lives under
#[derive(Debug, Clone)]
pub struct Storage {
    store: Arc<dyn ObjectStore>,
    root: Path,
    location: String,
}

impl Storage {
    pub fn new(store: Arc<dyn ObjectStore>, root: Path, location: impl Into<String>) -> Self {
        Self {
            store,
            root,
            location: location.into(),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemory::new()), Path::default(), "memory://")
    }

    /// Local directory, created if missing
    pub fn local(dir: impl AsRef<std::path::Path>) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let store = LocalFileSystem::new_with_prefix(dir)?;
        Ok(Self::new(
            Arc::new(store),
            Path::default(),
            dir.display().to_string(),
        ))
    }

    /// `memory://`, `file:///dir`, `s3://bucket/prefix`, or a bare local path.
    ///
    /// S3 credentials and region come from the standard `AWS_*` variables.
    pub fn from_location(location: &str) -> Result<Self> {
        if location == "memory://" {
            return Ok(Self::in_memory());
        }
        let Ok(url) = Url::parse(location) else {
            return Self::local(location);
        };
        match url.scheme() {
            "file" => {
                let path = url.to_file_path().map_err(|()| CatalogError::InvalidLocation {
                    location: location.to_string(),
                    reason: "not a local path".to_string(),
                })?;
                Self::local(path)
            }
            "s3" | "s3a" => {
                let bucket = url.host_str().ok_or_else(|| CatalogError::InvalidLocation {
                    location: location.to_string(),
                    reason: "missing bucket".to_string(),
                })?;
                let store = AmazonS3Builder::from_env()
                    .with_bucket_name(bucket)
                    .build()?;
                let root = Path::from(url.path().trim_matches('/'));
                Ok(Self::new(Arc::new(store), root, location))
            }
            // single-letter schemes are Windows drive letters
            scheme if scheme.len() == 1 => Self::local(location),
            other => Err(CatalogError::InvalidLocation {
                location: location.to_string(),
                reason: format!("unsupported scheme {other}"),
            }),
        }
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn path(&self, relative: &str) -> Path {
        let mut path = self.root.clone();
        for part in relative.split('/').filter(|p| !p.is_empty()) {
            path = path.child(part);
        }
        path
    }

    /// Write unless the object exists. Returns false if it already did.
    pub async fn put_if_absent(&self, relative: &str, data: Bytes) -> Result<bool> {
        let path = self.path(relative);
        match self
            .store
            .put_opts(&path, PutPayload::from(data), PutMode::Create.into())
            .await
        {
            Ok(_) => Ok(true),
            Err(object_store::Error::AlreadyExists { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn put(&self, relative: &str, data: Bytes) -> Result<()> {
        _ = self.store.put(&self.path(relative), PutPayload::from(data)).await?;
        Ok(())
    }

    /// Read a whole object, `None` if it does not exist
    pub async fn get(&self, relative: &str) -> Result<Option<Bytes>> {
        match self.store.get(&self.path(relative)).await {
            Ok(result) => Ok(Some(result.bytes().await?)),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Objects under `relative`, with locations relative to the repository root
    pub async fn list(&self, relative: &str) -> Result<Vec<(String, ObjectMeta)>> {
        let prefix = self.path(relative);
        let metas: Vec<ObjectMeta> = self.store.list(Some(&prefix)).try_collect().await?;
        Ok(metas
            .into_iter()
            .filter_map(|meta| {
                let rel = meta
                    .location
                    .prefix_match(&self.root)?
                    .map(|p| p.as_ref().to_string())
                    .collect::<Vec<_>>()
                    .join("/");
                Some((rel, meta))
            })
            .collect())
    }

    /// Immediate child directories of `relative`
    pub async fn list_dirs(&self, relative: &str) -> Result<Vec<String>> {
        let prefix = self.path(relative);
        let listing = self.store.list_with_delimiter(Some(&prefix)).await?;
        Ok(listing
            .common_prefixes
            .into_iter()
            .filter_map(|p| p.filename().map(str::to_string))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_if_absent() {
        let storage = Storage::in_memory();
        assert!(storage.put_if_absent("refs/a/1.json", Bytes::from("x")).await.unwrap());
        assert!(!storage.put_if_absent("refs/a/1.json", Bytes::from("y")).await.unwrap());
        assert_eq!(
            storage.get("refs/a/1.json").await.unwrap(),
            Some(Bytes::from("x"))
        );
        assert_eq!(storage.get("refs/a/2.json").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_list_relative_to_root() {
        let storage = Storage::new(Arc::new(InMemory::new()), Path::from("repo/one"), "memory://");
        storage.put("refs/branch.main/0.json", Bytes::from("{}")).await.unwrap();
        storage.put("refs/branch.dev/0.json", Bytes::from("{}")).await.unwrap();
        let listed = storage.list("refs/branch.main").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].0, "refs/branch.main/0.json");
        let mut dirs = storage.list_dirs("refs").await.unwrap();
        dirs.sort();
        assert_eq!(dirs, vec!["branch.dev", "branch.main"]);
    }

    #[test]
    fn test_locations() {
        assert!(Storage::from_location("memory://").is_ok());
        assert!(matches!(
            Storage::from_location("gopher://x"),
            Err(CatalogError::InvalidLocation { .. })
        ));
    }
}
