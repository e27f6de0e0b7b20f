// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use anyhow::{Context, Result, anyhow};
use catalog::{Repository, Storage};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use steward::{DescriptorInspector, Pipeline, PipelineConfig, TokioExecutor, lister_for};

use crate::commands::show::format_dataset;
use crate::common::{RepoContext, credential_provider};

#[derive(Debug, Clone, Default)]
pub struct BuildArgs {
    pub config: PathBuf,
    /// Overrides `sources.descriptors` from the configuration
    pub descriptors: Option<PathBuf>,
    pub dry_run: bool,
}

#[allow(clippy::print_stdout)]
pub async fn build_command(ctx: &RepoContext, args: &BuildArgs) -> Result<()> {
    print!("{}", build_command_as_string(ctx, args).await?);
    Ok(())
}

pub async fn build_command_as_string(ctx: &RepoContext, args: &BuildArgs) -> Result<String> {
    let config = PipelineConfig::load(&args.config)
        .with_context(|| format!("Failed to load config {}", args.config.display()))?;
    let sources = config
        .sources
        .as_ref()
        .ok_or_else(|| anyhow!("Config {} has no sources section", args.config.display()))?;
    let descriptors = args
        .descriptors
        .as_deref()
        .or(sources.descriptors.as_deref())
        .ok_or_else(|| anyhow!("No source descriptors: pass --descriptors or set sources.descriptors"))?;
    let descriptors = relative_to(&args.config, descriptors);

    let registry = config.registry()?;
    let credentials = credential_provider(&registry);
    let lister = lister_for(&sources.list, &registry, &credentials)?;
    let inspector = DescriptorInspector::load(&descriptors)
        .await
        .with_context(|| format!("Failed to read descriptors {}", descriptors.display()))?;
    let described = inspector.len();
    diagnostics::debug!("loaded {described} source descriptor(s)", described: described);

    let executor = TokioExecutor::new(config.executor.max_in_flight);
    let pipeline = Pipeline::new(&config, executor, Arc::new(inspector));

    if args.dry_run {
        let urls = lister.list().await?;
        let dataset = pipeline.build(&urls).await?;
        let mut out = format!("Dry run over {} source(s), nothing committed\n", urls.len());
        out.push_str(&format_dataset(&dataset)?);
        return Ok(out);
    }

    let location = ctx.location_or(&config.repository);
    let storage = Storage::from_location(&location)
        .with_context(|| format!("Invalid repository location {location}"))?;
    let repo = Repository::open_or_create(storage, registry).await?;
    let report = pipeline.run(&repo, lister.as_ref()).await?;

    let snapshot = report.snapshot.as_str();
    diagnostics::info!("committed {snapshot} to {location}", snapshot: snapshot, location: location.as_str());

    let mut out = format!(
        "Committed {} on {} from {} source(s), {} chunk reference(s)\n",
        report.snapshot.short(),
        config.branch,
        report.sources,
        report.dataset.chunk_count(),
    );
    out.push_str(&format_dataset(&report.dataset)?);
    Ok(out)
}

/// Relative descriptor paths are taken from the config file's directory.
fn relative_to(config: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match config.parent() {
        Some(dir) => dir.join(path),
        None => path.to_path_buf(),
    }
}
