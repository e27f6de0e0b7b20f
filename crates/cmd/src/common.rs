// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use anyhow::{Context, Result, anyhow};
use catalog::{
    ApiKey, ApiSecret, ContainerRegistry, CredentialStrategy, Credentials, Repository, SnapshotId,
    StaticCredentialProvider, Storage,
};

/// Environment variable naming the repository location
pub const REPO_ENV: &str = "REFPOND_REPO";

/// Where the repository lives, from `--repo` or `REFPOND_REPO`
#[derive(Debug, Clone, Default)]
pub struct RepoContext {
    repo: Option<String>,
}

impl RepoContext {
    pub fn new(repo: Option<String>) -> Self {
        Self { repo }
    }

    /// The configured location, or `fallback` when none was given
    pub fn location_or(&self, fallback: &str) -> String {
        self.repo.clone().unwrap_or_else(|| fallback.to_string())
    }

    pub fn location(&self) -> Result<&str> {
        self.repo
            .as_deref()
            .ok_or_else(|| anyhow!("No repository given: pass --repo or set {REPO_ENV}"))
    }

    pub async fn open(&self) -> Result<Repository> {
        let location = self.location()?;
        let storage = Storage::from_location(location)
            .with_context(|| format!("Invalid repository location {location}"))?;
        Repository::open(storage)
            .await
            .with_context(|| format!("Failed to open repository at {location}. Run 'refpond init' first."))
    }
}

/// An explicit snapshot id, or the head of `branch`
pub async fn resolve_snapshot(
    repo: &Repository,
    snapshot: Option<&str>,
    branch: &str,
) -> Result<SnapshotId> {
    match snapshot {
        Some(id) => id
            .parse::<SnapshotId>()
            .with_context(|| format!("Invalid snapshot id {id}")),
        None => Ok(repo.branch_head(branch).await?.snapshot),
    }
}

/// Credentials for every `explicit` strategy in `registry`, read from
/// `REFPOND_<NAME>_ACCESS_KEY_ID`, `REFPOND_<NAME>_SECRET_ACCESS_KEY` and
/// the optional `REFPOND_<NAME>_SESSION_TOKEN`. Names missing from the
/// environment stay unresolved and fail when a container needs them.
pub fn credential_provider(registry: &ContainerRegistry) -> StaticCredentialProvider {
    let mut provider = StaticCredentialProvider::new();
    for container in registry.containers() {
        let CredentialStrategy::Explicit { name } = &container.credentials else {
            continue;
        };
        let var = |suffix: &str| {
            let key = format!("REFPOND_{}_{suffix}", env_name(name));
            std::env::var(key).ok()
        };
        if let (Some(id), Some(secret)) = (var("ACCESS_KEY_ID"), var("SECRET_ACCESS_KEY")) {
            provider = provider.with_named(
                name,
                Credentials::Static {
                    access_key_id: ApiKey::new(id),
                    secret_access_key: ApiSecret::new(secret),
                    session_token: var("SESSION_TOKEN").map(ApiSecret::new),
                },
            );
        }
    }
    provider
}

fn env_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect()
}

pub fn format_timestamp(ts: &chrono::DateTime<chrono::Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}
