//! # Certification Contract ABI
//!
//! Hand-rolled Solidity ABI encoding for the two contract functions and the
//! one event the core uses. The contract is fixed; selectors are constants.
//!
//! ```solidity
//! function certify(bytes32 merkleRoot, string metadataUri, uint256 itemCount) returns (uint256 batchId);
//! function getCertification(uint256 batchId) view returns (bytes32, string, uint256, address);
//! event BatchCertified(uint256 indexed batchId, bytes32 merkleRoot, uint256 itemCount,
//!                      string metadataURI, address indexed issuer);
//! ```

use gitchain_core::{ContentDigest, Timestamp};

use crate::error::LedgerError;
use crate::ledger::Certification;

/// `keccak256("certify(bytes32,string,uint256)")[..4]`.
pub const CERTIFY_SELECTOR: [u8; 4] = [0xaf, 0x24, 0x45, 0xde];

/// `keccak256("getCertification(uint256)")[..4]`.
pub const GET_CERTIFICATION_SELECTOR: [u8; 4] = [0xec, 0x98, 0x1e, 0xac];

/// `keccak256("BatchCertified(uint256,bytes32,uint256,string,address)")`.
pub const BATCH_CERTIFIED_TOPIC: &str =
    "0x24c795014802a9e9ab9650836af7ed2a4b3c900b30ef07e74b947f9b0be2dfff";

const WORD: usize = 32;

/// Calldata for `certify(root, metadataUri, itemCount)`.
pub fn encode_certify(merkle_root: &ContentDigest, metadata_uri: &str, item_count: u64) -> Vec<u8> {
    let uri = metadata_uri.as_bytes();
    let padded = uri.len().div_ceil(WORD) * WORD;
    let mut out = Vec::with_capacity(4 + 4 * WORD + padded);
    out.extend_from_slice(&CERTIFY_SELECTOR);
    out.extend_from_slice(merkle_root.as_bytes());
    // Head has three words, so the string payload starts at 0x60.
    out.extend_from_slice(&u64_word(3 * WORD as u64));
    out.extend_from_slice(&u64_word(item_count));
    out.extend_from_slice(&u64_word(uri.len() as u64));
    out.extend_from_slice(uri);
    out.resize(4 + 4 * WORD + padded, 0);
    out
}

/// Calldata for `getCertification(batchId)`.
pub fn encode_get_certification(batch_id: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + WORD);
    out.extend_from_slice(&GET_CERTIFICATION_SELECTOR);
    out.extend_from_slice(&u64_word(batch_id));
    out
}

/// Decode the return data of `getCertification`.
///
/// An all-zero root is how the contract reports an unknown id; that maps
/// to `None`.
pub fn decode_certification(data: &[u8]) -> Result<Option<Certification>, LedgerError> {
    if data.is_empty() {
        return Ok(None);
    }
    let root_word = word(data, 0)?;
    let mut root = [0u8; 32];
    root.copy_from_slice(root_word);
    let merkle_root = ContentDigest::from_bytes(root);
    if merkle_root.is_zero() {
        return Ok(None);
    }

    let offset = usize::try_from(word_to_u64(word(data, 1)?)?)
        .map_err(|_| invalid("string offset out of range"))?;
    let timestamp = word_to_u64(word(data, 2)?)?;
    let issuer_word = word(data, 3)?;
    if issuer_word[..12].iter().any(|b| *b != 0) {
        return Err(invalid("issuer is not a left-padded address"));
    }
    let issuer_address = format!("0x{}", encode_hex(&issuer_word[12..]));

    let len_bytes = data
        .get(offset..offset.saturating_add(WORD))
        .ok_or_else(|| invalid("string length out of bounds"))?;
    let len = usize::try_from(word_to_u64(len_bytes)?)
        .map_err(|_| invalid("string length out of range"))?;
    let start = offset.saturating_add(WORD);
    let bytes = data
        .get(start..start.saturating_add(len))
        .ok_or_else(|| invalid("string data out of bounds"))?;
    let metadata_uri = String::from_utf8(bytes.to_vec())
        .map_err(|_| invalid("metadata uri is not UTF-8"))?;

    let timestamp = i64::try_from(timestamp)
        .ok()
        .and_then(Timestamp::from_unix_seconds)
        .ok_or_else(|| invalid("timestamp out of range"))?;

    Ok(Some(Certification {
        merkle_root,
        metadata_uri,
        timestamp,
        issuer_address,
    }))
}

/// Decode the `uint256` returned by `certify`.
pub fn decode_batch_id(data: &[u8]) -> Result<u64, LedgerError> {
    word_to_u64(word(data, 0)?)
}

/// The `batchId` of a `BatchCertified` log, given its topics.
///
/// Returns `None` when the topics belong to some other event.
pub fn batch_id_from_topics(topics: &[String]) -> Result<Option<u64>, LedgerError> {
    match topics.first() {
        Some(t0) if t0.eq_ignore_ascii_case(BATCH_CERTIFIED_TOPIC) => {}
        _ => return Ok(None),
    }
    let raw = topics
        .get(1)
        .ok_or_else(|| invalid("BatchCertified log without batchId topic"))?;
    let bytes = decode_hex(raw)?;
    word_to_u64(&bytes).map(Some)
}

// ---------------------------------------------------------------------------
// Hex and word helpers
// ---------------------------------------------------------------------------

/// Lowercase hex without prefix.
pub fn encode_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Decode hex with or without a `0x` prefix.
pub fn decode_hex(s: &str) -> Result<Vec<u8>, LedgerError> {
    let s = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    if s.len() % 2 != 0 {
        return Err(invalid(format!("odd-length hex string ({} chars)", s.len())));
    }
    (0..s.len())
        .step_by(2)
        .map(|i| {
            s.get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| invalid(format!("invalid hex at offset {i}")))
        })
        .collect()
}

/// Parse a JSON-RPC quantity such as `"0x1a"`.
pub fn parse_quantity(s: &str) -> Result<u64, LedgerError> {
    let digits = s
        .strip_prefix("0x")
        .ok_or_else(|| invalid(format!("quantity without 0x prefix: {s}")))?;
    if digits.is_empty() {
        return Err(invalid("empty quantity"));
    }
    u64::from_str_radix(digits, 16).map_err(|e| invalid(format!("bad quantity {s}: {e}")))
}

/// Format a JSON-RPC quantity.
pub fn format_quantity(value: u64) -> String {
    format!("{value:#x}")
}

fn u64_word(value: u64) -> [u8; WORD] {
    let mut w = [0u8; WORD];
    w[WORD - 8..].copy_from_slice(&value.to_be_bytes());
    w
}

fn word(data: &[u8], index: usize) -> Result<&[u8], LedgerError> {
    data.get(index * WORD..(index + 1) * WORD)
        .ok_or_else(|| invalid(format!("return data too short for word {index}")))
}

fn word_to_u64(w: &[u8]) -> Result<u64, LedgerError> {
    if w.len() != WORD {
        return Err(invalid(format!("expected 32-byte word, got {}", w.len())));
    }
    if w[..WORD - 8].iter().any(|b| *b != 0) {
        return Err(invalid("uint256 value does not fit in 64 bits"));
    }
    let mut tail = [0u8; 8];
    tail.copy_from_slice(&w[WORD - 8..]);
    Ok(u64::from_be_bytes(tail))
}

fn invalid(msg: impl Into<String>) -> LedgerError {
    LedgerError::InvalidResponse(msg.into())
}
