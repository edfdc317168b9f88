//! CLI handlers driven the way the binary drives them: write containers,
//! build a batch bundle, certify it on the mock ledger, verify proofs.

use std::path::PathBuf;

use gitchain_anchor::AnchorJournal;
use gitchain_cli::batch::{run_batch, BatchArgs, BatchBundle, BatchCommand, ItemSource};
use gitchain_cli::certify::{run_certify, CertifyArgs, Chain};
use gitchain_cli::config::CliConfig;
use gitchain_cli::container::{run_container, ContainerArgs, ContainerCommand};
use gitchain_cli::verify::{run_verify, VerifyArgs};
use gitchain_cli::{read_json, write_json};
use gitchain_core::{ContainerId, ContainerRef};
use gitchain_store::{StoreConfig, VersionStore};
use serde_json::json;

fn write_container(store: &VersionStore, dir: &std::path::Path, id: &str, data: serde_json::Value) {
    let path = dir.join(format!("{}.json", id.replace(':', "_")));
    write_json(&path, &data).unwrap();
    let args = ContainerArgs {
        command: ContainerCommand::Write {
            id: ContainerId::parse(id).unwrap(),
            data: path,
            message: "import".into(),
        },
    };
    assert_eq!(run_container(&args, store).unwrap(), 0);
}

#[test]
fn build_certify_and_verify_from_the_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = VersionStore::new(StoreConfig::with_base_dir(dir.path().join("repos")));
    write_container(&store, dir.path(), "0711:product:acme:drill", json!({"rpm": 1200}));
    write_container(&store, dir.path(), "0711:product:acme:saw", json!({"teeth": 24}));
    write_container(&store, dir.path(), "0711:product:acme:drill", json!({"rpm": 1500}));

    let source = ItemSource {
        items: None,
        containers: vec![
            ContainerRef::parse("0711:product:acme:drill:v1").unwrap(),
            ContainerRef::parse("0711:product:acme:drill").unwrap(),
            ContainerRef::parse("0711:product:acme:saw").unwrap(),
        ],
    };

    let bundle_path = dir.path().join("bundle.json");
    let build = BatchArgs {
        command: BatchCommand::Build {
            source: source.clone(),
            metadata_uri: "mem://acme".into(),
            out: Some(bundle_path.clone()),
        },
    };
    assert_eq!(run_batch(&build, &store, 100).unwrap(), 0);
    let bundle: BatchBundle = read_json(&bundle_path).unwrap();
    assert_eq!(bundle.item_count, 3);
    assert_ne!(bundle.proofs[0].content_hash, bundle.proofs[1].content_hash);

    let journal = dir.path().join("journal.json");
    let certify = CertifyArgs {
        source,
        metadata_uri: "mem://acme".into(),
        chain: Chain::Mock,
        journal: Some(journal.clone()),
        manifest_dir: None,
    };
    let config = CliConfig::default();
    assert_eq!(run_certify(&certify, &store, &config).unwrap(), 0);
    let records = AnchorJournal::load(&journal).unwrap().records;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].merkle_root, bundle.merkle_root);

    // Every bundle entry verifies offline against the anchored root.
    for (i, entry) in bundle.proofs.iter().enumerate() {
        let path = dir.path().join(format!("proof-{i}.json"));
        write_json(&path, entry).unwrap();
        let args = VerifyArgs {
            root: Some(bundle.merkle_root),
            batch_id: None,
            content_hash: None,
            proof: Some(path),
            manifest: None,
            chain: Chain::Mock,
        };
        assert_eq!(run_verify(&args, &config).unwrap(), 0);
    }

    // A proof presented for someone else's content is rejected.
    let path: PathBuf = dir.path().join("proof-0.json");
    let args = VerifyArgs {
        root: Some(bundle.merkle_root),
        batch_id: None,
        content_hash: Some(bundle.proofs[2].content_hash),
        proof: Some(path),
        manifest: None,
        chain: Chain::Mock,
    };
    assert_eq!(run_verify(&args, &config).unwrap(), 1);
}
