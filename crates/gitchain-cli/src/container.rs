//! # Container Subcommand
//!
//! ```bash
//! gitchain container write --id 0711:product:acme:drill --data drill.json -m "import"
//! gitchain container read --id 0711:product:acme:drill --version 2
//! gitchain container history --id 0711:product:acme:drill --limit 10
//! gitchain container diff --id 0711:product:acme:drill --from <commit> --to <commit>
//! gitchain container list --type product --namespace acme
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Subcommand};
use gitchain_core::{ContainerId, ContainerType, ContentDigest, Namespace, NamespaceKey, VersionSpec};
use gitchain_store::VersionStore;
use serde_json::{json, Value};

use crate::{print_json, read_json};

/// Container subcommand arguments.
#[derive(Args, Debug)]
pub struct ContainerArgs {
    #[command(subcommand)]
    pub command: ContainerCommand,
}

/// Available container subcommands.
#[derive(Subcommand, Debug)]
pub enum ContainerCommand {
    /// Commit a new version of a container.
    Write {
        /// Container id, `0711:{type}:{namespace}:{identifier}`.
        #[arg(long, value_parser = ContainerId::parse)]
        id: ContainerId,
        /// JSON payload file (`-` for stdin).
        #[arg(long)]
        data: PathBuf,
        /// Commit message.
        #[arg(short, long, default_value = "update")]
        message: String,
    },
    /// Read a container.
    Read {
        /// Container id.
        #[arg(long, value_parser = ContainerId::parse)]
        id: ContainerId,
        /// Version number; latest if omitted.
        #[arg(long, conflicts_with = "commit")]
        version: Option<u64>,
        /// Read as of this commit instead.
        #[arg(long)]
        commit: Option<ContentDigest>,
    },
    /// Commits that wrote a container, newest first.
    History {
        /// Container id.
        #[arg(long, value_parser = ContainerId::parse)]
        id: ContainerId,
        /// Maximum commits to show.
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Structural diff of a container between two commits.
    Diff {
        /// Container id.
        #[arg(long, value_parser = ContainerId::parse)]
        id: ContainerId,
        /// Older commit.
        #[arg(long)]
        from: ContentDigest,
        /// Newer commit.
        #[arg(long)]
        to: ContentDigest,
    },
    /// Containers present at head of a namespace.
    List {
        /// Container type.
        #[arg(long = "type")]
        container_type: ContainerType,
        /// Namespace name.
        #[arg(long)]
        namespace: Namespace,
    },
}

/// Execute the container subcommand.
pub fn run_container(args: &ContainerArgs, store: &VersionStore) -> Result<u8> {
    match &args.command {
        ContainerCommand::Write { id, data, message } => {
            let payload: Value = read_json(data)?;
            let receipt = store.write(id, &payload, message)?;
            tracing::info!(container = %id, version = receipt.version, commit = %receipt.commit_hash, "container written");
            print_json(&json!({
                "container_id": id,
                "version": receipt.version,
                "commit_hash": receipt.commit_hash,
                "content_hash": receipt.content_hash,
            }))?;
        }
        ContainerCommand::Read { id, version, commit } => match commit {
            Some(commit) => {
                let repo = store.repository(&id.namespace_key());
                let data = repo.read_at_commit(&id.identifier, commit)?;
                let content_hash = repo.content_hash_at(&id.identifier, commit)?;
                print_json(&json!({
                    "container_id": id,
                    "commit_hash": commit,
                    "content_hash": content_hash,
                    "data": data,
                }))?;
            }
            None => {
                let spec = version.map_or(VersionSpec::Latest, VersionSpec::Exact);
                print_json(&store.read_ref(&id.at(spec))?)?;
            }
        },
        ContainerCommand::History { id, limit } => {
            print_json(&store.history(id, *limit)?)?;
        }
        ContainerCommand::Diff { id, from, to } => {
            let repo = store.repository(&id.namespace_key());
            print_json(&repo.diff(&id.identifier, from, to)?)?;
        }
        ContainerCommand::List {
            container_type,
            namespace,
        } => {
            let key = NamespaceKey::new(*container_type, namespace.clone());
            let ids: Vec<String> = store
                .repository(&key)
                .list_containers()?
                .into_iter()
                .map(|identifier| ContainerId::new(*container_type, namespace.clone(), identifier).to_string())
                .collect();
            print_json(&ids)?;
        }
    }
    Ok(0)
}
