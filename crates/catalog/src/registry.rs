// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Virtual chunk containers: which store, and which credential strategy,
//! serve the chunk references under a URL prefix.
//!
//! Only the strategy is recorded. Secrets are resolved at read time by a
//! [`crate::credentials::CredentialProvider`].

use crate::error::{CatalogError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;
use vref::VirtualDatasetManifest;

/// How to reach the store holding the referenced source files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreDescriptor {
    S3 {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        region: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        endpoint: Option<String>,
        #[serde(default)]
        allow_http: bool,
    },
    LocalFileSystem,
}

impl StoreDescriptor {
    pub fn s3(region: &str) -> Self {
        StoreDescriptor::S3 {
            region: Some(region.to_string()),
            endpoint: None,
            allow_http: false,
        }
    }

    fn accepts_scheme(&self, scheme: &str) -> bool {
        match self {
            StoreDescriptor::S3 { .. } => matches!(scheme, "s3" | "s3a"),
            StoreDescriptor::LocalFileSystem => scheme == "file",
        }
    }
}

/// Named credential-resolution strategy
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CredentialStrategy {
    /// Unsigned requests
    #[default]
    Anonymous,

    /// Credentials from the reader's environment
    Environment,

    /// A named credential set supplied by the reader
    Explicit { name: String },
}

impl fmt::Display for CredentialStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialStrategy::Anonymous => f.write_str("anonymous"),
            CredentialStrategy::Environment => f.write_str("environment"),
            CredentialStrategy::Explicit { name } => write!(f, "explicit({name})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualChunkContainer {
    pub url_prefix: String,
    pub store: StoreDescriptor,
    #[serde(default)]
    pub credentials: CredentialStrategy,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRegistry {
    containers: Vec<VirtualChunkContainer>,
}

impl ContainerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        url_prefix: &str,
        store: StoreDescriptor,
        credentials: CredentialStrategy,
    ) -> Result<()> {
        let invalid = |reason: String| CatalogError::InvalidContainer {
            prefix: url_prefix.to_string(),
            reason,
        };
        let url = Url::parse(url_prefix).map_err(|e| invalid(e.to_string()))?;
        if !store.accepts_scheme(url.scheme()) {
            return Err(invalid(format!(
                "scheme {} does not fit store {store:?}",
                url.scheme()
            )));
        }
        if self.containers.iter().any(|c| c.url_prefix == url_prefix) {
            return Err(CatalogError::DuplicateContainer(url_prefix.to_string()));
        }
        self.containers.push(VirtualChunkContainer {
            url_prefix: url_prefix.to_string(),
            store,
            credentials,
        });
        Ok(())
    }

    /// Container with the longest prefix of `url`
    pub fn resolve(&self, url: &str) -> Result<&VirtualChunkContainer> {
        self.containers
            .iter()
            .filter(|c| url.starts_with(&c.url_prefix))
            .max_by_key(|c| c.url_prefix.len())
            .ok_or_else(|| CatalogError::NoContainerForPrefix {
                url: url.to_string(),
            })
    }

    /// Every chunk of the dataset must be readable through some container.
    pub fn check_coverage(&self, dataset: &VirtualDatasetManifest) -> Result<()> {
        for chunk in dataset.chunk_refs() {
            _ = self.resolve(&chunk.location)?;
        }
        Ok(())
    }

    pub fn containers(&self) -> &[VirtualChunkContainer] {
        &self.containers
    }

    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }
}

impl TryFrom<Vec<VirtualChunkContainer>> for ContainerRegistry {
    type Error = CatalogError;

    fn try_from(containers: Vec<VirtualChunkContainer>) -> Result<Self> {
        let mut registry = Self::new();
        for c in containers {
            registry.register(&c.url_prefix, c.store, c.credentials)?;
        }
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_longest_prefix_wins() {
        let mut r = ContainerRegistry::new();
        r.register("s3://nasa-waterinsight/", StoreDescriptor::s3("us-west-2"), CredentialStrategy::Environment)
            .unwrap();
        r.register(
            "s3://nasa-waterinsight/RASI/ROUTING/HISTORICAL/",
            StoreDescriptor::s3("us-west-2"),
            CredentialStrategy::Anonymous,
        )
        .unwrap();

        let c = r
            .resolve("s3://nasa-waterinsight/RASI/ROUTING/HISTORICAL/RZSM/a.nc")
            .unwrap();
        assert_eq!(c.credentials, CredentialStrategy::Anonymous);
        let c = r.resolve("s3://nasa-waterinsight/other/b.nc").unwrap();
        assert_eq!(c.credentials, CredentialStrategy::Environment);
        assert!(matches!(
            r.resolve("s3://elsewhere/c.nc"),
            Err(CatalogError::NoContainerForPrefix { .. })
        ));
    }

    #[test]
    fn test_register_rejects() {
        let mut r = ContainerRegistry::new();
        r.register("file:///data/", StoreDescriptor::LocalFileSystem, CredentialStrategy::Anonymous)
            .unwrap();
        assert!(matches!(
            r.register("file:///data/", StoreDescriptor::LocalFileSystem, CredentialStrategy::Anonymous),
            Err(CatalogError::DuplicateContainer(_))
        ));
        assert!(matches!(
            r.register("s3://bucket/", StoreDescriptor::LocalFileSystem, CredentialStrategy::Anonymous),
            Err(CatalogError::InvalidContainer { .. })
        ));
        assert!(r.register("not a url", StoreDescriptor::s3("x"), CredentialStrategy::Anonymous).is_err());
    }

    #[test]
    fn test_json_shape_holds_no_secrets() {
        let c = VirtualChunkContainer {
            url_prefix: "s3://b/".into(),
            store: StoreDescriptor::s3("us-west-2"),
            credentials: CredentialStrategy::Explicit { name: "ops".into() },
        };
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["store"]["kind"], "s3");
        assert_eq!(json["credentials"]["kind"], "explicit");
        assert_eq!(json["credentials"]["name"], "ops");
    }
}
