//! Properties that span the store and the batch builder.

use gitchain_anchor::{verify, BatchBuilder};
use gitchain_core::{ContainerId, ContentDigest, VersionSpec};
use gitchain_store::{StoreConfig, VersionStore};
use proptest::prelude::*;
use serde_json::{json, Value};

fn payloads() -> impl Strategy<Value = Vec<Value>> {
    prop::collection::vec(
        (any::<i32>(), "[a-z]{0,8}", any::<bool>()).prop_map(|(n, s, b)| json!({ "n": n, "s": s, "b": b })),
        1..12,
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn stored_hashes_prove_into_their_batch(data in payloads(), byte in 0usize..32) {
        let dir = tempfile::tempdir().unwrap();
        let store = VersionStore::new(StoreConfig::with_base_dir(dir.path()));

        let mut builder = BatchBuilder::new(data.len());
        let mut leaves = Vec::new();
        for (i, payload) in data.iter().enumerate() {
            let id = ContainerId::parse(&format!("0711:product:prop:item-{i}")).unwrap();
            let receipt = store.write(&id, payload, "prop").unwrap();
            prop_assert_eq!(&store.read(&id).unwrap(), payload);
            builder.push(id.at(VersionSpec::Exact(receipt.version)), receipt.content_hash);
            leaves.push(receipt.content_hash);
        }
        let batch = builder.build("mem://prop").unwrap();
        let root = batch.merkle_root();

        for (i, proof) in batch.proofs().iter().enumerate() {
            prop_assert!(verify(&root, &leaves[i], proof));

            let mut bytes = *leaves[i].as_bytes();
            bytes[byte] ^= 0x01;
            prop_assert!(!verify(&root, &ContentDigest::from_bytes(bytes), proof));
        }
    }
}
