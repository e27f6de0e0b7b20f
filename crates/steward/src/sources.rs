// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Collaborators that find source files and describe their headers

use crate::config::ListingSpec;
use crate::{Result, StewardError};
use async_trait::async_trait;
use catalog::{ContainerRegistry, CredentialProvider};
use futures::TryStreamExt;
use object_store::path::Path;
use object_store::{ObjectStore, ObjectStoreScheme};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use url::Url;
use vref::SourceFile;

/// Supplies the URLs of a run's source files. Completeness of the
/// listing is the lister's concern.
#[async_trait]
pub trait SourceLister: fmt::Debug + Send + Sync {
    async fn list(&self) -> Result<Vec<String>>;
}

/// Decodes the header of one source file
#[async_trait]
pub trait SourceInspector: fmt::Debug + Send + Sync {
    async fn inspect(&self, url: &str) -> Result<SourceFile>;
}

#[derive(Debug, Clone, Default)]
pub struct StaticListing {
    urls: Vec<String>,
}

impl StaticListing {
    pub fn new(urls: Vec<String>) -> Self {
        Self { urls }
    }
}

#[async_trait]
impl SourceLister for StaticListing {
    async fn list(&self) -> Result<Vec<String>> {
        Ok(self.urls.clone())
    }
}

/// Lists objects below a URL prefix, keeping keys with a given suffix
pub struct ObjectStoreListing {
    store: Arc<dyn ObjectStore>,
    /// `scheme://host/` that store paths are relative to
    base: String,
    prefix: Path,
    suffix: String,
}

impl fmt::Debug for ObjectStoreListing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectStoreListing")
            .field("base", &self.base)
            .field("prefix", &self.prefix)
            .field("suffix", &self.suffix)
            .finish()
    }
}

impl ObjectStoreListing {
    /// List `prefix_url` through an already-built store.
    pub fn with_store(store: Arc<dyn ObjectStore>, prefix_url: &str, suffix: &str) -> Result<Self> {
        let url = Url::parse(prefix_url)?;
        let (_, prefix) = ObjectStoreScheme::parse(&url).map_err(object_store::Error::from)?;
        Ok(Self {
            store,
            base: format!("{}://{}/", url.scheme(), url.host_str().unwrap_or_default()),
            prefix,
            suffix: suffix.to_string(),
        })
    }

    /// List `prefix_url` through the container that covers it.
    pub fn for_container(
        registry: &ContainerRegistry,
        credentials: &dyn CredentialProvider,
        prefix_url: &str,
        suffix: &str,
    ) -> Result<Self> {
        let container = registry.resolve(prefix_url)?;
        let resolved = credentials.resolve(&container.credentials)?;
        let store = catalog::build_store(container, &resolved, &Url::parse(prefix_url)?)?;
        Self::with_store(store, prefix_url, suffix)
    }
}

#[async_trait]
impl SourceLister for ObjectStoreListing {
    async fn list(&self) -> Result<Vec<String>> {
        let objects: Vec<_> = self.store.list(Some(&self.prefix)).try_collect().await?;
        let mut urls: Vec<String> = objects
            .into_iter()
            .map(|meta| meta.location.to_string())
            .filter(|key| key.ends_with(&self.suffix))
            .map(|key| format!("{}{key}", self.base))
            .collect();
        urls.sort();
        let count = urls.len();
        let prefix = self.prefix.to_string();
        diagnostics::debug!("listed {count} source(s) under {prefix}", count: count, prefix: prefix.as_str());
        Ok(urls)
    }
}

/// Build the lister a configuration asks for.
pub fn lister_for(
    spec: &ListingSpec,
    registry: &ContainerRegistry,
    credentials: &dyn CredentialProvider,
) -> Result<Arc<dyn SourceLister>> {
    Ok(match spec {
        ListingSpec::Static { urls } => Arc::new(StaticListing::new(urls.clone())),
        ListingSpec::ObjectStore { prefix, suffix } => Arc::new(ObjectStoreListing::for_container(
            registry,
            credentials,
            prefix,
            suffix,
        )?),
    })
}

/// Serves headers decoded ahead of time, keyed by URL
#[derive(Debug, Clone, Default)]
pub struct DescriptorInspector {
    files: BTreeMap<String, SourceFile>,
}

impl DescriptorInspector {
    pub fn new(files: impl IntoIterator<Item = SourceFile>) -> Self {
        Self {
            files: files.into_iter().map(|f| (f.url.clone(), f)).collect(),
        }
    }

    /// Read a JSON array of source descriptions.
    pub fn from_json(data: &[u8]) -> Result<Self> {
        let files: Vec<SourceFile> = serde_json::from_slice(data)?;
        Ok(Self::new(files))
    }

    pub async fn load(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let data = tokio::fs::read(path.as_ref()).await?;
        Self::from_json(&data)
    }

    pub fn urls(&self) -> impl Iterator<Item = &String> {
        self.files.keys()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[async_trait]
impl SourceInspector for DescriptorInspector {
    async fn inspect(&self, url: &str) -> Result<SourceFile> {
        self.files
            .get(url)
            .cloned()
            .ok_or_else(|| StewardError::SourceNotDescribed(url.to_string()))
    }
}
