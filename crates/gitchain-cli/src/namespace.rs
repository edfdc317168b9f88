//! # Namespace Subcommand
//!
//! ```bash
//! gitchain namespace create --type product --namespace acme
//! gitchain namespace list --type product
//! ```

use anyhow::Result;
use clap::{Args, Subcommand};
use gitchain_core::{ContainerType, Namespace};
use gitchain_store::VersionStore;

use crate::print_json;

/// Namespace subcommand arguments.
#[derive(Args, Debug)]
pub struct NamespaceArgs {
    #[command(subcommand)]
    pub command: NamespaceCommand,
}

/// Available namespace subcommands.
#[derive(Subcommand, Debug)]
pub enum NamespaceCommand {
    /// Create a namespace. Succeeds if it already exists.
    Create {
        /// Container type.
        #[arg(long = "type")]
        container_type: ContainerType,
        /// Namespace name.
        #[arg(long)]
        namespace: Namespace,
    },
    /// List namespaces on disk.
    List {
        /// Only this container type.
        #[arg(long = "type")]
        container_type: Option<ContainerType>,
    },
}

/// Execute the namespace subcommand.
pub fn run_namespace(args: &NamespaceArgs, store: &VersionStore) -> Result<u8> {
    match &args.command {
        NamespaceCommand::Create {
            container_type,
            namespace,
        } => {
            let info = store.create_namespace(*container_type, namespace.clone())?;
            tracing::info!(namespace = %namespace, container_type = %container_type, "namespace ready");
            print_json(&info)?;
        }
        NamespaceCommand::List { container_type } => {
            print_json(&store.list_namespaces(*container_type)?)?;
        }
    }
    Ok(0)
}
