// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Pipeline configuration, read once from YAML and validated before use.

use crate::{Result, StewardError};
use catalog::{ContainerRegistry, CredentialStrategy, StoreDescriptor};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use vref::{
    AttributeReconciler, CasePolicy, CoordinateDeriver, CoordinateRule, ManifestMerger, RuleSpec,
    VariableNaming,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Repository location: a directory or a `file://`, `memory://` or `s3://` URL
    pub repository: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default = "default_message")]
    pub message: String,
    pub containers: Vec<ContainerSpec>,
    pub coordinate: CoordinateConfig,
    #[serde(default)]
    pub naming: NamingConfig,
    #[serde(default)]
    pub ordering: Ordering,
    #[serde(default)]
    pub attributes: AttributeConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub commit: CommitPolicy,
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,
    #[serde(default)]
    pub sources: Option<SourcesConfig>,
}

fn default_branch() -> String {
    catalog::DEFAULT_BRANCH.to_string()
}

fn default_message() -> String {
    "First Commit".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub prefix: String,
    pub store: StoreDescriptor,
    #[serde(default)]
    pub credentials: CredentialStrategy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinateConfig {
    /// Per-file scalar the coordinate comes from
    pub field: String,
    /// New leading dimension
    pub dimension: String,
    pub rule: CoordinateRule,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NamingConfig {
    #[serde(flatten)]
    pub rule: VariableNaming,
    #[serde(default)]
    pub case: CasePolicy,
}

/// Order of files along the new axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ordering {
    /// Lexical order of source URLs
    #[default]
    ByLocator,
    /// Order of the derived coordinate values
    ByCoordinate,
}

/// Attribute conflict rules. No rules means strict reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AttributeConfig {
    #[serde(default)]
    pub rules: BTreeMap<String, RuleSpec>,
    #[serde(default)]
    pub fallback: Option<RuleSpec>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    pub max_in_flight: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self { max_in_flight: 8 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitPolicy {
    pub max_attempts: usize,
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,
}

fn default_min_delay_ms() -> u64 {
    50
}

impl Default for CommitPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            min_delay_ms: default_min_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcesConfig {
    pub list: ListingSpec,
    /// JSON file of decoded source headers
    #[serde(default)]
    pub descriptors: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ListingSpec {
    Static {
        urls: Vec<String>,
    },
    /// Every object under `prefix` whose key ends with `suffix`
    ObjectStore {
        prefix: String,
        #[serde(default)]
        suffix: String,
    },
}

impl PipelineConfig {
    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: PipelineConfig = serde_yaml_ng::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&text)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |field: &str, reason: &str| {
            Err(StewardError::InvalidConfig {
                field: field.to_string(),
                reason: reason.to_string(),
            })
        };
        if self.repository.trim().is_empty() {
            return invalid("repository", "must not be empty");
        }
        if self.branch.is_empty() {
            return invalid("branch", "must not be empty");
        }
        catalog::repository::validate_branch_name(&self.branch).map_err(|e| {
            StewardError::InvalidConfig {
                field: "branch".to_string(),
                reason: e.to_string(),
            }
        })?;
        if self.containers.is_empty() {
            return invalid("containers", "at least one container is required");
        }
        let mut seen = BTreeSet::new();
        for c in &self.containers {
            if !seen.insert(c.prefix.as_str()) {
                return invalid("containers", &format!("duplicate prefix {}", c.prefix));
            }
        }
        if self.coordinate.field.is_empty() || self.coordinate.dimension.is_empty() {
            return invalid("coordinate", "field and dimension must be set");
        }
        if self.executor.max_in_flight == 0 {
            return invalid("executor.max_in_flight", "must be greater than 0");
        }
        if self.commit.max_attempts == 0 {
            return invalid("commit.max_attempts", "must be greater than 0");
        }
        // Surface bad prefixes and scheme mismatches now rather than at commit.
        _ = self.registry()?;
        Ok(())
    }

    pub fn registry(&self) -> Result<ContainerRegistry> {
        let mut registry = ContainerRegistry::new();
        for c in &self.containers {
            registry
                .register(&c.prefix, c.store.clone(), c.credentials.clone())
                .map_err(|e| StewardError::InvalidConfig {
                    field: "containers".to_string(),
                    reason: e.to_string(),
                })?;
        }
        Ok(registry)
    }

    pub fn deriver(&self) -> CoordinateDeriver {
        CoordinateDeriver::new(
            self.coordinate.field.as_str(),
            self.coordinate.dimension.as_str(),
            self.coordinate.rule.clone(),
        )
    }

    pub fn reconciler(&self) -> AttributeReconciler {
        AttributeReconciler::from_specs(&self.attributes.rules, self.attributes.fallback.as_ref())
    }

    pub fn merger(&self) -> ManifestMerger {
        ManifestMerger::new(self.reconciler(), self.naming.case)
    }
}
