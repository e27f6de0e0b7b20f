// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use cmd::commands::{
    BuildArgs, LocateArgs, branch_command, build_command, containers_command, init_command,
    locate_command, log_command, show_command,
};
use cmd::common::RepoContext;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "refpond")]
struct Cli {
    /// Repository location: a directory, file://, s3:// or memory://
    #[arg(long, global = true, env = "REFPOND_REPO")]
    repo: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the repository and record its virtual chunk containers
    Init {
        /// Pipeline configuration (YAML)
        config: PathBuf,
    },
    /// Assemble a virtual dataset from source files and commit it
    Build(BuildCommand),
    /// Show the snapshots on a branch, newest first
    Log {
        #[arg(long, default_value = catalog::DEFAULT_BRANCH)]
        branch: String,
    },
    /// Summarize the dataset in a snapshot
    Show {
        /// Snapshot id (default: head of --branch)
        snapshot: Option<String>,
        #[arg(long, default_value = catalog::DEFAULT_BRANCH)]
        branch: String,
    },
    /// List the virtual chunk containers
    Containers,
    /// List branches, or create one
    Branch {
        /// Name of a branch to create
        name: Option<String>,
        /// Snapshot to start the new branch from (default: head of --branch)
        #[arg(long)]
        from: Option<String>,
        #[arg(long, default_value = catalog::DEFAULT_BRANCH)]
        branch: String,
    },
    /// Resolve one chunk of a variable to its source byte range
    Locate(LocateCommand),
}

#[derive(Args)]
struct BuildCommand {
    /// Pipeline configuration (YAML)
    config: PathBuf,
    /// Source descriptor file (JSON), overriding the configuration
    #[arg(long)]
    descriptors: Option<PathBuf>,
    /// Build and summarize without committing
    #[arg(long)]
    dry_run: bool,
}

#[derive(Args)]
struct LocateCommand {
    variable: String,
    /// Chunk key, e.g. c/3/0/0
    key: String,
    #[arg(long)]
    snapshot: Option<String>,
    #[arg(long, default_value = catalog::DEFAULT_BRANCH)]
    branch: String,
    /// Also read the referenced bytes
    #[arg(long)]
    fetch: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    diagnostics::init_diagnostics();

    let cli = Cli::parse();
    let ctx = RepoContext::new(cli.repo);

    match cli.command {
        Commands::Init { config } => init_command(&ctx, &config).await,
        Commands::Build(args) => {
            let args = BuildArgs {
                config: args.config,
                descriptors: args.descriptors,
                dry_run: args.dry_run,
            };
            build_command(&ctx, &args).await
        }
        Commands::Log { branch } => log_command(&ctx, &branch).await,
        Commands::Show { snapshot, branch } => show_command(&ctx, snapshot.as_deref(), &branch).await,
        Commands::Containers => containers_command(&ctx).await,
        Commands::Branch { name, from, branch } => {
            branch_command(&ctx, name.as_deref(), from.as_deref(), &branch).await
        }
        Commands::Locate(args) => {
            let args = LocateArgs {
                variable: args.variable,
                key: args.key,
                snapshot: args.snapshot,
                branch: args.branch,
                fetch: args.fetch,
            };
            locate_command(&ctx, &args).await
        }
    }
}
