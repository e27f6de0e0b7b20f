// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;

use crate::common::{RepoContext, resolve_snapshot};

#[allow(clippy::print_stdout)]
pub async fn branch_command(ctx: &RepoContext, create: Option<&str>, from: Option<&str>, base: &str) -> Result<()> {
    print!("{}", branch_command_as_string(ctx, create, from, base).await?);
    Ok(())
}

/// List branches, or fork `create` from a snapshot (default: head of `base`).
pub async fn branch_command_as_string(
    ctx: &RepoContext,
    create: Option<&str>,
    from: Option<&str>,
    base: &str,
) -> Result<String> {
    let repo = ctx.open().await?;
    if let Some(name) = create {
        let start = resolve_snapshot(&repo, from, base).await?;
        let head = repo.create_branch(name, &start).await?;
        return Ok(format!("{name} at {}\n", head.snapshot.short()));
    }

    let mut out = String::new();
    for name in repo.list_branches().await? {
        let head = repo.branch_head(&name).await?;
        out.push_str(&format!("{name}\t{}\t#{}\n", head.snapshot.short(), head.sequence));
    }
    Ok(out)
}
