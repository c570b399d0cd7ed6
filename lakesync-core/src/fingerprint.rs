//! Content fingerprints over remote change markers.
//!
//! A fingerprint is the lowercase hex SHA-256 of the canonical JSON
//! serialization of a `{table -> last-modified marker}` map. Keys are sorted
//! before hashing, so two probes that observed the same markers produce the
//! same fingerprint regardless of the order the warehouse returned them in.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Stable hash of a probe result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint a probe map. Insertion order never matters.
    pub fn of<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let sorted: BTreeMap<String, String> = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();

        let mut hasher = Sha256::new();
        hasher.update(canonical_json(&sorted).as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Wrap a previously stored hex digest.
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `{"k1":"v1","k2":"v2"}` with keys in map order and JSON string escaping.
fn canonical_json(map: &BTreeMap<String, String>) -> String {
    let body = map
        .iter()
        .map(|(k, v)| {
            format!(
                "{}:{}",
                serde_json::Value::String(k.clone()),
                serde_json::Value::String(v.clone())
            )
        })
        .collect::<Vec<_>>()
        .join(",");
    format!("{{{}}}", body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_hex_sha256() {
        let fp = Fingerprint::of([("DB.PUBLIC.ORDERS", "2024-01-01 00:00:00")]);
        assert_eq!(fp.as_str().len(), 64);
        assert!(fp.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(fp.as_str(), fp.as_str().to_lowercase());
    }

    #[test]
    fn test_fingerprint_of_empty_map_is_hash_of_braces() {
        let fp = Fingerprint::of(Vec::<(String, String)>::new());
        let mut hasher = Sha256::new();
        hasher.update(b"{}");
        assert_eq!(fp.as_str(), hex::encode(hasher.finalize()));
    }

    #[test]
    fn test_canonical_json_matches_serde_json() {
        let mut map = BTreeMap::new();
        map.insert("b\"q".to_string(), "2".to_string());
        map.insert("a".to_string(), "1".to_string());
        let expected = serde_json::to_string(&map).unwrap();
        assert_eq!(canonical_json(&map), expected);
    }

    #[test]
    fn test_order_independence() {
        let a = Fingerprint::of([("ORDERS", "t1"), ("SHIPMENTS", "t2")]);
        let b = Fingerprint::of([("SHIPMENTS", "t2"), ("ORDERS", "t1")]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_marker_change_changes_fingerprint() {
        let a = Fingerprint::of([("ORDERS", "t1")]);
        let b = Fingerprint::of([("ORDERS", "t2")]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_serde_transparent() {
        let fp = Fingerprint::from_hex("abc123");
        assert_eq!(serde_json::to_string(&fp).unwrap(), "\"abc123\"");
    }
}
