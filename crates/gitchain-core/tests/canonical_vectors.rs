//! # Content Hash Test Vectors
//!
//! Fixed inputs with their expected RFC 8785 encoding and SHA-256 content
//! hash. Any other implementation that follows JCS + SHA-256 must reproduce
//! these digests bit-for-bit; the expected hex values were computed with
//! `hashlib.sha256(canonical.encode()).hexdigest()`.

use gitchain_core::{content_hash, sha256_digest, sha256_raw, CanonicalBytes, ContentDigest};

/// (JSON input, expected canonical text, expected SHA-256 hex)
const HASH_VECTORS: &[(&str, &str, &str)] = &[
    (
        r#"{"a":1}"#,
        r#"{"a":1}"#,
        "015abd7f5cc57a2dd94b7590f04ad8084273905ee33ec5cebeae62276a97f862",
    ),
    (
        r#"{"a":2}"#,
        r#"{"a":2}"#,
        "7e8059f495589fcd981232cc11d00b00da3802c01d688fa1cf1f6bed6e5bb33c",
    ),
    (
        r#"{"c":"hello","b":2,"a":1}"#,
        r#"{"a":1,"b":2,"c":"hello"}"#,
        "264be526dd59f5bed5c756e96e5a6a08f285ca424658f70b981f2554b4709121",
    ),
    (
        r#"{ "tags": ["tools", "cordless"], "specs": {"weight": "1.8kg", "voltage": 18}, "sku": "DRILL-500" }"#,
        r#"{"sku":"DRILL-500","specs":{"voltage":18,"weight":"1.8kg"},"tags":["tools","cordless"]}"#,
        "801f3f89ccaf41fd4191272c147ab2c8e9321b3aace7d835dd719c0db610d9b5",
    ),
    (
        r#"{}"#,
        r#"{}"#,
        "44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a",
    ),
    (
        r#"[]"#,
        r#"[]"#,
        "4f53cda18c2baa0c0354bb5f9a3ecbe5ed12ab4d8e11ba873c2f11161202b945",
    ),
    (
        r#"null"#,
        r#"null"#,
        "74234e98afe7498fb5daf1f36ac2d78acc339464f950703b8c019892f982b90b",
    ),
];

/// (JSON input, expected canonical text) for number and escape handling.
const ENCODING_VECTORS: &[(&str, &str)] = &[
    (r#"{"n":1.0}"#, r#"{"n":1}"#),
    (r#"{"n":1e2}"#, r#"{"n":100}"#),
    (r#"{"n":-0.5}"#, r#"{"n":-0.5}"#),
    (r#"{"big":999999999999}"#, r#"{"big":999999999999}"#),
    (r#"{"s":"line\nbreak"}"#, r#"{"s":"line\nbreak"}"#),
    (r#"{"s":"é"}"#, "{\"s\":\"\u{00e9}\"}"),
    (r#"{"z":{"b":[{"y":1,"x":2}],"a":null}}"#, r#"{"z":{"a":null,"b":[{"x":2,"y":1}]}}"#),
];

#[test]
fn content_hashes_match_vectors() {
    for (input, expected_canonical, expected_hex) in HASH_VECTORS {
        let value: serde_json::Value = serde_json::from_str(input).unwrap();
        let cb = CanonicalBytes::new(&value).unwrap();
        assert_eq!(
            std::str::from_utf8(cb.as_bytes()).unwrap(),
            *expected_canonical,
            "canonical mismatch for input: {input}"
        );
        assert_eq!(sha256_digest(&cb).to_hex(), *expected_hex, "digest mismatch for input: {input}");
        assert_eq!(content_hash(&value).unwrap().to_hex(), *expected_hex);
    }
}

#[test]
fn number_and_string_encoding_vectors() {
    for (input, expected) in ENCODING_VECTORS {
        let cb = CanonicalBytes::from_json_slice(input.as_bytes()).unwrap();
        assert_eq!(
            std::str::from_utf8(cb.as_bytes()).unwrap(),
            *expected,
            "canonical mismatch for input: {input}"
        );
    }
}

#[test]
fn merkle_pair_vector() {
    // Root of the two-item batch [{"a":1}, {"a":2}]: SHA256(h1 || h2).
    let h1 = ContentDigest::from_hex(HASH_VECTORS[0].2).unwrap();
    let h2 = ContentDigest::from_hex(HASH_VECTORS[1].2).unwrap();
    let mut buf = Vec::with_capacity(64);
    buf.extend_from_slice(h1.as_bytes());
    buf.extend_from_slice(h2.as_bytes());
    assert_eq!(
        sha256_raw(&buf).to_hex(),
        "74f2807c9479b536b207839dd5f3db596f31b938a9a6e29d6badb21c05b62d92"
    );
}
