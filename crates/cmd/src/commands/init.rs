// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use anyhow::{Context, Result};
use catalog::{Repository, Storage};
use std::path::Path;
use steward::PipelineConfig;

use crate::common::RepoContext;

#[allow(clippy::print_stdout)]
pub async fn init_command(ctx: &RepoContext, config_path: &Path) -> Result<()> {
    print!("{}", init_command_as_string(ctx, config_path).await?);
    Ok(())
}

/// Create the repository named by the configuration (or `--repo`) and
/// record its virtual chunk containers.
pub async fn init_command_as_string(ctx: &RepoContext, config_path: &Path) -> Result<String> {
    let config = PipelineConfig::load(config_path)
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;
    let location = ctx.location_or(&config.repository);

    diagnostics::info!("initializing repository at {location}", location: location.as_str());
    let storage = Storage::from_location(&location)
        .with_context(|| format!("Invalid repository location {location}"))?;
    let repo = Repository::open_or_create(storage, config.registry()?).await?;
    let head = repo.branch_head(&config.branch).await;

    let mut out = format!("Repository at {location}\n");
    for c in repo.registry().containers() {
        out.push_str(&format!("  container {} ({})\n", c.url_prefix, c.credentials));
    }
    match head {
        Ok(head) => out.push_str(&format!("  {} at {}\n", config.branch, head.snapshot.short())),
        Err(_) => out.push_str(&format!("  branch {} not created yet\n", config.branch)),
    }
    Ok(out)
}
