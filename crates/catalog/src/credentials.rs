// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Resolution of credential strategies into usable credentials.
//!
//! Key material is held in the classified wrappers of
//! [`crate::data_taxonomy`], so `Debug` output never shows it.

use crate::data_taxonomy::{ApiKey, ApiSecret};
use crate::error::{CatalogError, Result};
use crate::registry::CredentialStrategy;
use std::collections::BTreeMap;
use std::fmt;

/// Credentials ready to configure a store client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    Anonymous,
    /// Let the client read its own environment
    FromEnvironment,
    Static {
        access_key_id: ApiKey<String>,
        secret_access_key: ApiSecret<String>,
        session_token: Option<ApiSecret<String>>,
    },
}

pub trait CredentialProvider: fmt::Debug + Send + Sync {
    fn resolve(&self, strategy: &CredentialStrategy) -> Result<Credentials>;
}

/// Anonymous and environment strategies resolve directly; explicit ones
/// are looked up by name among credentials handed to the provider.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentialProvider {
    named: BTreeMap<String, Credentials>,
}

impl StaticCredentialProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_named(mut self, name: &str, credentials: Credentials) -> Self {
        _ = self.named.insert(name.to_string(), credentials);
        self
    }
}

impl CredentialProvider for StaticCredentialProvider {
    fn resolve(&self, strategy: &CredentialStrategy) -> Result<Credentials> {
        match strategy {
            CredentialStrategy::Anonymous => Ok(Credentials::Anonymous),
            CredentialStrategy::Environment => Ok(Credentials::FromEnvironment),
            CredentialStrategy::Explicit { name } => self
                .named
                .get(name)
                .cloned()
                .ok_or_else(|| CatalogError::CredentialsNotFound(name.clone())),
        }
    }
}
