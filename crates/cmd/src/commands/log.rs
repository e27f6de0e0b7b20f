// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;

use crate::common::{RepoContext, format_timestamp};

#[allow(clippy::print_stdout)]
pub async fn log_command(ctx: &RepoContext, branch: &str) -> Result<()> {
    print!("{}", log_command_as_string(ctx, branch).await?);
    Ok(())
}

/// Snapshots reachable from the head of `branch`, newest first.
pub async fn log_command_as_string(ctx: &RepoContext, branch: &str) -> Result<String> {
    let repo = ctx.open().await?;
    let ancestry = repo.ancestry(branch).await?;

    let mut out = String::new();
    for (id, snapshot) in &ancestry {
        out.push_str(&format!(
            "{}  {}  {} var(s)  {}\n",
            id.short(),
            format_timestamp(&snapshot.timestamp),
            snapshot.variables.len(),
            snapshot.message,
        ));
    }
    Ok(out)
}
