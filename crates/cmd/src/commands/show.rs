// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use vref::VirtualDatasetManifest;

use crate::common::{RepoContext, format_timestamp, resolve_snapshot};

#[allow(clippy::print_stdout)]
pub async fn show_command(ctx: &RepoContext, snapshot: Option<&str>, branch: &str) -> Result<()> {
    print!("{}", show_command_as_string(ctx, snapshot, branch).await?);
    Ok(())
}

pub async fn show_command_as_string(
    ctx: &RepoContext,
    snapshot: Option<&str>,
    branch: &str,
) -> Result<String> {
    let repo = ctx.open().await?;
    let id = resolve_snapshot(&repo, snapshot, branch).await?;
    let header = repo.load_snapshot(&id).await?;
    let dataset = repo.checkout(&id).await?;

    let mut out = format!("=== Snapshot {id} ===\n");
    out.push_str(&format!(
        "  parent:  {}\n",
        header.parent.as_ref().map_or("(none)", |p| p.as_str())
    ));
    out.push_str(&format!("  message: {}\n", header.message));
    out.push_str(&format!("  time:    {}\n", format_timestamp(&header.timestamp)));
    out.push_str(&format!("  txn:     {}\n", header.txn_id));
    out.push_str(&format_dataset(&dataset)?);
    Ok(out)
}

/// Summary of a dataset: dimensions, coordinates, variables, attributes
pub fn format_dataset(dataset: &VirtualDatasetManifest) -> Result<String> {
    let mut out = String::new();
    let dims = dataset.dimensions()?;
    if !dims.is_empty() {
        let parts: Vec<String> = dims.iter().map(|(d, n)| format!("{d}={n}")).collect();
        out.push_str(&format!("Dimensions: {}\n", parts.join(" ")));
    }

    if !dataset.coordinates.is_empty() {
        out.push_str("Coordinates:\n");
        for (name, axis) in &dataset.coordinates {
            match (axis.values.first(), axis.values.last()) {
                (Some(first), Some(last)) => {
                    out.push_str(&format!("  {name} ({}) {first} .. {last}\n", axis.len()));
                }
                _ => out.push_str(&format!("  {name} (0)\n")),
            }
        }
    }

    out.push_str("Variables:\n");
    if dataset.variables.is_empty() {
        out.push_str("  (none)\n");
    }
    for (name, v) in &dataset.variables {
        out.push_str(&format!(
            "  {name} {} ({}) shape {:?} chunks {:?} refs {}",
            v.dtype,
            v.dims.join(", "),
            v.shape,
            v.chunk_shape,
            v.chunks.len(),
        ));
        if !v.absent.is_empty() {
            out.push_str(&format!(" absent {}", v.absent.len()));
        }
        out.push('\n');
    }

    if !dataset.attributes.is_empty() {
        out.push_str("Attributes:\n");
        for key in dataset.attributes.keys() {
            if let Some(value) = dataset.attributes.get(key) {
                out.push_str(&format!("  {key} = {value}\n"));
            }
        }
    }
    Ok(out)
}
