//! `gitchain hash`: content hash of a JSON payload, the same value a
//! store write would record.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use gitchain_core::content_hash;
use serde_json::Value;

use crate::read_json;

/// Hash subcommand arguments.
#[derive(Args, Debug)]
pub struct HashArgs {
    /// JSON file to hash (`-` for stdin).
    #[arg(long)]
    pub file: PathBuf,

    /// Print with a `0x` prefix.
    #[arg(long)]
    pub prefixed: bool,
}

/// Execute the hash subcommand.
pub fn run_hash(args: &HashArgs) -> Result<u8> {
    let data: Value = read_json(&args.file)?;
    let digest = content_hash(&data)?;
    if args.prefixed {
        println!("{}", digest.to_prefixed_hex());
    } else {
        println!("{digest}");
    }
    Ok(0)
}
