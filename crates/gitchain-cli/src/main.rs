//! # gitchain CLI entry point
//!
//! Parses command-line arguments, initializes tracing, resolves
//! configuration and dispatches to subcommand handlers.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use gitchain_cli::batch::{run_batch, BatchArgs};
use gitchain_cli::certify::{run_certify, CertifyArgs};
use gitchain_cli::config::CliConfig;
use gitchain_cli::container::{run_container, ContainerArgs};
use gitchain_cli::hash::{run_hash, HashArgs};
use gitchain_cli::namespace::{run_namespace, NamespaceArgs};
use gitchain_cli::verify::{run_verify, VerifyArgs};
use gitchain_store::VersionStore;

/// GitChain: versioned containers, certified in Merkle batches on chain.
#[derive(Parser, Debug)]
#[command(name = "gitchain", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    /// Path to a YAML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Root directory of the version store. Overrides config and environment.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write, read and inspect container versions.
    Container(ContainerArgs),

    /// Create and list namespaces.
    Namespace(NamespaceArgs),

    /// Build Merkle batches, proofs and manifests.
    Batch(BatchArgs),

    /// Anchor an item set on a ledger.
    Certify(CertifyArgs),

    /// Check a proof or manifest against a root or an anchored batch.
    Verify(VerifyArgs),

    /// Print the content hash of a JSON payload.
    Hash(HashArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);
    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "gitchain starting");

    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::from(1)
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<u8> {
    if let Commands::Hash(args) = &cli.command {
        return run_hash(args);
    }

    let config = CliConfig::load(cli.config.as_deref(), cli.data_dir.as_ref())?;
    let store = VersionStore::new(config.store.clone());

    match &cli.command {
        Commands::Container(args) => run_container(args, &store),
        Commands::Namespace(args) => run_namespace(args, &store),
        Commands::Batch(args) => run_batch(args, &store, config.anchor.max_batch_size),
        Commands::Certify(args) => run_certify(args, &store, &config),
        Commands::Verify(args) => run_verify(args, &config),
        Commands::Hash(args) => run_hash(args),
    }
}

/// `-v` picks the level; without it `RUST_LOG` applies, defaulting to warn.
fn init_tracing(verbose: u8, json: bool) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitchain_cli::certify::Chain;

    #[test]
    fn cli_parse_global_flags() {
        let cli = Cli::try_parse_from([
            "gitchain",
            "-vv",
            "--log-json",
            "--data-dir",
            "/tmp/repos",
            "namespace",
            "list",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(cli.log_json);
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/repos")));
        assert!(matches!(cli.command, Commands::Namespace(_)));
    }

    #[test]
    fn cli_parse_container_write() {
        let cli = Cli::try_parse_from([
            "gitchain",
            "container",
            "write",
            "--id",
            "0711:product:acme:drill",
            "--data",
            "drill.json",
            "-m",
            "import",
        ])
        .unwrap();
        let Commands::Container(args) = cli.command else {
            panic!("expected container command");
        };
        match args.command {
            gitchain_cli::container::ContainerCommand::Write { id, data, message } => {
                assert_eq!(id.to_string(), "0711:product:acme:drill");
                assert_eq!(data, PathBuf::from("drill.json"));
                assert_eq!(message, "import");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn cli_rejects_invalid_container_id() {
        assert!(Cli::try_parse_from([
            "gitchain", "container", "read", "--id", "0711:widget:acme:x"
        ])
        .is_err());
    }

    #[test]
    fn cli_parse_certify_defaults_to_mock() {
        let cli = Cli::try_parse_from([
            "gitchain",
            "certify",
            "--items",
            "items.json",
            "--metadata-uri",
            "ipfs://m/{index}",
        ])
        .unwrap();
        let Commands::Certify(args) = cli.command else {
            panic!("expected certify command");
        };
        assert_eq!(args.chain, Chain::Mock);
        assert_eq!(args.source.items, Some(PathBuf::from("items.json")));
        assert!(args.journal.is_none());
    }

    #[test]
    fn cli_verify_needs_root_or_batch_id() {
        assert!(Cli::try_parse_from(["gitchain", "verify", "--proof", "p.json"]).is_err());
        assert!(Cli::try_parse_from([
            "gitchain",
            "verify",
            "--root",
            "74f2807c9479b536b207839dd5f3db596f31b938a9a6e29d6badb21c05b62d92",
            "--batch-id",
            "1",
            "--proof",
            "p.json",
        ])
        .is_err());
        assert!(Cli::try_parse_from(["gitchain", "verify", "--batch-id", "1", "--manifest", "m.json"]).is_ok());
    }
}
