// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use anyhow::{Context, Result, anyhow};
use catalog::ChunkReader;
use std::sync::Arc;
use vref::ChunkIndex;

use crate::common::{RepoContext, credential_provider, resolve_snapshot};

#[derive(Debug, Clone)]
pub struct LocateArgs {
    pub variable: String,
    /// Chunk key, e.g. `c/3/0/0`
    pub key: String,
    pub snapshot: Option<String>,
    pub branch: String,
    /// Read the referenced bytes and report their length
    pub fetch: bool,
}

#[allow(clippy::print_stdout)]
pub async fn locate_command(ctx: &RepoContext, args: &LocateArgs) -> Result<()> {
    print!("{}", locate_command_as_string(ctx, args).await?);
    Ok(())
}

/// Where one chunk of one variable lives in its source file.
pub async fn locate_command_as_string(ctx: &RepoContext, args: &LocateArgs) -> Result<String> {
    let repo = ctx.open().await?;
    let id = resolve_snapshot(&repo, args.snapshot.as_deref(), &args.branch).await?;
    let dataset = repo.checkout(&id).await?;

    let variable = dataset
        .variables
        .get(&args.variable)
        .ok_or_else(|| anyhow!("No variable {} in snapshot {}", args.variable, id.short()))?;
    let index: ChunkIndex = args
        .key
        .parse()
        .with_context(|| format!("Invalid chunk key {}", args.key))?;

    if variable.absent.contains(&index) {
        return Ok(format!("{} {index}: absent\n", args.variable));
    }
    let chunk = variable
        .chunks
        .get(&index)
        .ok_or_else(|| anyhow!("Chunk {index} is outside {}", args.variable))?;

    let reader = ChunkReader::new(
        repo.registry().clone(),
        Arc::new(credential_provider(repo.registry())),
    );
    let resolved = reader.locate(chunk)?;
    let mut out = format!(
        "{} {index}: {} bytes {}..{} via {}\n",
        args.variable, chunk.location, resolved.range.start, resolved.range.end, resolved.container,
    );
    if let Some(fingerprint) = &chunk.fingerprint {
        out.push_str(&format!("  fingerprint {fingerprint}\n"));
    }
    if args.fetch {
        let bytes = reader.read(chunk).await?;
        out.push_str(&format!("  fetched {} bytes\n", bytes.len()));
    }
    Ok(out)
}
