// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use catalog::StoreDescriptor;

use crate::common::RepoContext;

#[allow(clippy::print_stdout)]
pub async fn containers_command(ctx: &RepoContext) -> Result<()> {
    print!("{}", containers_command_as_string(ctx).await?);
    Ok(())
}

pub async fn containers_command_as_string(ctx: &RepoContext) -> Result<String> {
    let repo = ctx.open().await?;
    let mut out = String::new();
    for c in repo.registry().containers() {
        let store = match &c.store {
            StoreDescriptor::LocalFileSystem => "local".to_string(),
            StoreDescriptor::S3 {
                region, endpoint, ..
            } => {
                let mut s = "s3".to_string();
                if let Some(region) = region {
                    s.push_str(&format!(" region={region}"));
                }
                if let Some(endpoint) = endpoint {
                    s.push_str(&format!(" endpoint={endpoint}"));
                }
                s
            }
        };
        out.push_str(&format!("{}\t{store}\t{}\n", c.url_prefix, c.credentials));
    }
    Ok(out)
}
