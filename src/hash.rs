//! Deterministic content hashing shared by the domain model and the event
//! store.
//!
//! Both the spec's content hash (for intent-drift comparison) and an
//! event's `self_hash`/`prev_hash` chain rely on the same primitive:
//! serialize to JSON, recursively sort object keys so field order never
//! affects the digest, then hash the canonical bytes with SHA-256.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// A SHA-256 digest, hex-encoded on the wire.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    pub fn compute(content: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(content);
        Self(hasher.finalize().into())
    }

    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.to_hex())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for ContentHash {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 64 {
            return Err(format!("invalid hash length: expected 64, got {}", s.len()));
        }
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes).map_err(|e| e.to_string())?;
        Ok(Self(bytes))
    }
}

impl Serialize for ContentHash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Serializes `object` to JSON, canonicalizes key order recursively, and
/// hashes the result. Used for both spec content hashing and event
/// hash-chaining; callers that need to exclude a field (e.g. an event's own
/// `hash`) should serialize a stripped-down view rather than the full type.
pub fn canonical_hash<T: Serialize>(object: &T) -> Result<ContentHash, serde_json::Error> {
    let mut value = serde_json::to_value(object)?;
    canonicalize(&mut value);
    let bytes = serde_json::to_vec(&value)?;
    Ok(ContentHash::compute(&bytes))
}

fn canonicalize(value: &mut Value) {
    match value {
        Value::Array(items) => {
            for item in items.iter_mut() {
                canonicalize(item);
            }
        }
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = std::mem::take(map).into_iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            let mut sorted = serde_json::Map::with_capacity(entries.len());
            for (key, mut value) in entries {
                canonicalize(&mut value);
                sorted.insert(key, value);
            }
            *map = sorted;
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[derive(Serialize)]
    struct MapWrapper {
        map: HashMap<String, String>,
    }

    #[test]
    fn canonical_hash_ignores_key_insertion_order() {
        let mut map_a = HashMap::new();
        map_a.insert("b".to_string(), "2".to_string());
        map_a.insert("a".to_string(), "1".to_string());

        let mut map_b = HashMap::new();
        map_b.insert("a".to_string(), "1".to_string());
        map_b.insert("b".to_string(), "2".to_string());

        let hash_a = canonical_hash(&MapWrapper { map: map_a }).expect("hash");
        let hash_b = canonical_hash(&MapWrapper { map: map_b }).expect("hash");

        assert_eq!(hash_a, hash_b);
        assert_eq!(hash_a.to_hex().len(), 64);
    }

    #[test]
    fn content_hash_round_trips_through_hex() {
        let h = ContentHash::compute(b"hello");
        let parsed: ContentHash = h.to_hex().parse().expect("parse");
        assert_eq!(h, parsed);
    }
}
