use serde::Serialize;
use sha2::{Digest, Sha256};

/// Encodes a value as canonical JSON: compact separators, object keys in
/// lexicographic order. Every digest in the system is computed over this
/// encoding, so two nodes holding identical field values always agree on
/// the resulting hash.
///
/// Ordering comes from routing the value through `serde_json::Value`, whose
/// object map is a `BTreeMap` sorted by key.
pub fn canonical_json<T: Serialize>(value: &T) -> Vec<u8> {
    let value = serde_json::to_value(value)
        .expect("ledger records contain no non-string keys or non-finite numbers");
    serde_json::to_vec(&value).expect("serializing a Value cannot fail")
}

/// SHA-256 digest of `bytes` as a lowercase hex string.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Canonical digest of any serializable record.
pub fn digest<T: Serialize>(value: &T) -> String {
    sha256_hex(&canonical_json(value))
}
