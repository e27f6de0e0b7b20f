// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Read-back of committed chunk references through their containers

use crate::credentials::{CredentialProvider, Credentials};
use crate::error::{CatalogError, Result};
use crate::registry::{ContainerRegistry, StoreDescriptor, VirtualChunkContainer};
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::path::Path;
use object_store::{ObjectStore, ObjectStoreScheme};
use std::collections::HashMap;
use std::ops::Range;
use std::sync::{Arc, Mutex};
use url::Url;
use vref::ChunkRef;

/// Where a chunk reference points once resolved against a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedChunk {
    pub container: String,
    pub path: Path,
    pub range: Range<u64>,
}

#[derive(Debug)]
pub struct ChunkReader {
    registry: ContainerRegistry,
    credentials: Arc<dyn CredentialProvider>,
    stores: Mutex<HashMap<String, Arc<dyn ObjectStore>>>,
}

impl ChunkReader {
    pub fn new(registry: ContainerRegistry, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self {
            registry,
            credentials,
            stores: Mutex::new(HashMap::new()),
        }
    }

    /// Serve a container from an already-built store instead of its descriptor.
    pub fn with_store(self, url_prefix: &str, store: Arc<dyn ObjectStore>) -> Self {
        if let Ok(mut stores) = self.stores.lock() {
            _ = stores.insert(url_prefix.to_string(), store);
        }
        self
    }

    pub fn locate(&self, chunk: &ChunkRef) -> Result<ResolvedChunk> {
        let container = self.registry.resolve(&chunk.location)?;
        let url = Url::parse(&chunk.location)?;
        let (_, path) = ObjectStoreScheme::parse(&url).map_err(object_store::Error::from)?;
        Ok(ResolvedChunk {
            container: container.url_prefix.clone(),
            path,
            range: chunk.byte_range(),
        })
    }

    fn store_for(&self, container: &VirtualChunkContainer, url: &Url) -> Result<Arc<dyn ObjectStore>> {
        let mut stores = self.stores.lock().map_err(|_| CatalogError::Corrupt {
            what: "store cache".to_string(),
            detail: "poisoned lock".to_string(),
        })?;
        if let Some(store) = stores.get(&container.url_prefix) {
            return Ok(store.clone());
        }
        let credentials = self.credentials.resolve(&container.credentials)?;
        let store = build_store(container, &credentials, url)?;
        _ = stores.insert(container.url_prefix.clone(), store.clone());
        let prefix = container.url_prefix.as_str();
        let strategy = container.credentials.to_string();
        diagnostics::debug!("built store for {prefix} with {strategy} credentials", prefix: prefix, strategy: strategy.as_str());
        Ok(store)
    }

    /// Fetch exactly the referenced bytes.
    pub async fn read(&self, chunk: &ChunkRef) -> Result<Bytes> {
        let container = self.registry.resolve(&chunk.location)?;
        let url = Url::parse(&chunk.location)?;
        let store = self.store_for(container, &url)?;
        let resolved = self.locate(chunk)?;

        if let Some(expected) = &chunk.fingerprint {
            let meta = store.head(&resolved.path).await?;
            if let Some(found) = meta.e_tag {
                if &found != expected {
                    return Err(CatalogError::SourceChanged {
                        url: chunk.location.clone(),
                        expected: expected.clone(),
                        found,
                    });
                }
            }
        }
        Ok(store.get_range(&resolved.path, resolved.range).await?)
    }
}

/// Build an object store for `url` from a container's access descriptor.
pub fn build_store(
    container: &VirtualChunkContainer,
    credentials: &Credentials,
    url: &Url,
) -> Result<Arc<dyn ObjectStore>> {
    match &container.store {
        StoreDescriptor::LocalFileSystem => Ok(Arc::new(LocalFileSystem::new())),
        StoreDescriptor::S3 {
            region,
            endpoint,
            allow_http,
        } => {
            let bucket = url.host_str().ok_or_else(|| CatalogError::InvalidContainer {
                prefix: container.url_prefix.clone(),
                reason: "missing bucket".to_string(),
            })?;
            let mut builder = match credentials {
                Credentials::FromEnvironment => AmazonS3Builder::from_env(),
                _ => AmazonS3Builder::new(),
            }
            .with_bucket_name(bucket)
            .with_allow_http(*allow_http);
            if let Some(region) = region {
                builder = builder.with_region(region);
            }
            if let Some(endpoint) = endpoint {
                builder = builder.with_endpoint(endpoint);
            }
            builder = match credentials {
                Credentials::Anonymous => builder.with_skip_signature(true),
                Credentials::FromEnvironment => builder,
                Credentials::Static {
                    access_key_id,
                    secret_access_key,
                    session_token,
                } => {
                    let b = builder
                        .with_access_key_id(access_key_id.as_declassified())
                        .with_secret_access_key(secret_access_key.as_declassified());
                    match session_token {
                        Some(token) => b.with_token(token.as_declassified()),
                        None => b,
                    }
                }
            };
            Ok(Arc::new(builder.build()?))
        }
    }
}
