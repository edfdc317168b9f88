//! # gitchain-cli: Command-Line Interface for GitChain
//!
//! Provides the `gitchain` binary.
//!
//! ## Subcommands
//!
//! - `gitchain container`: write, read, history, diff, list.
//! - `gitchain namespace`: create and list namespaces.
//! - `gitchain batch build`: Merkle root, proofs and manifest for an item set.
//! - `gitchain certify`: anchor an item set, chunked into batches.
//! - `gitchain verify`: check a proof or a manifest against a root or an
//!   anchored batch id.
//! - `gitchain hash`: content hash of a JSON payload.
//!
//! ## Crate Policy
//!
//! - Handlers delegate to the library crates; no business logic here.
//! - Structured results go to stdout as JSON; diagnostics go to the
//!   tracing subscriber on stderr.
//! - Handlers return the process exit code: 0 for success or verified, 1
//!   for failure or not verified.

pub mod batch;
pub mod certify;
pub mod config;
pub mod container;
pub mod hash;
pub mod namespace;
pub mod verify;

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Read a JSON document from `path`, or from stdin if `path` is `-`.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read stdin")?;
        buf
    } else {
        std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?
    };
    serde_json::from_str(&content).with_context(|| format!("invalid JSON in {}", path.display()))
}

/// Pretty-print `value` as JSON to stdout.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Write `value` as pretty JSON to `path`, creating parent directories.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory: {}", parent.display()))?;
    }
    let json = serde_json::to_vec_pretty(value)?;
    std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))
}

/// Build a runtime for handlers that talk to a ledger.
pub(crate) fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn write_then_read_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.json");
        write_json(&path, &json!({"b": 1, "a": [true]})).unwrap();
        let back: Value = read_json(&path).unwrap();
        assert_eq!(back, json!({"a": [true], "b": 1}));
    }

    #[test]
    fn read_json_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{").unwrap();
        let err = read_json::<Value>(&path).unwrap_err();
        assert!(err.to_string().contains("bad.json"));
    }
}
