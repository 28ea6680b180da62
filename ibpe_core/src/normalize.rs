//! Byte-normalization map applied to corpus text before BPE.
//!
//! Some corpora contain bytes the tokenizer was not trained on (`.`, `/`,
//! `\`, `` ` `` in the reference setup). The map substitutes each of those
//! with a tokenizer-friendly byte before encoding; the inverse is applied to
//! vocabulary payloads so tokens compare against original corpus bytes.

use serde_json::Value;

use crate::error::{Error, Result};

/// An injective single-byte substitution and its inverse.
#[derive(Clone)]
pub struct NormalizeMap {
    forward: [u8; 256],
    inverse: [u8; 256],
    pairs: Vec<(u8, u8)>,
}

impl NormalizeMap {
    /// An empty (identity) map.
    pub fn identity() -> Self {
        let mut forward = [0u8; 256];
        for (i, slot) in forward.iter_mut().enumerate() {
            *slot = i as u8;
        }
        NormalizeMap {
            forward,
            inverse: forward,
            pairs: Vec::new(),
        }
    }

    /// Build from `(from, to)` byte pairs.
    ///
    /// Both sides must be ASCII, so substitution can never split a
    /// multi-byte sequence, and the substitution must be injective: no byte
    /// may be mapped twice, and no two bytes may map to the same target
    /// (the inverse must be a function).
    pub fn new(pairs: impl IntoIterator<Item = (u8, u8)>) -> Result<Self> {
        let mut map = NormalizeMap::identity();
        for (from, to) in pairs {
            if !from.is_ascii() || !to.is_ascii() {
                return Err(Error::NormalizeMap(format!(
                    "mapping {from:#04x} -> {to:#04x} is not ASCII"
                )));
            }
            if map.forward[from as usize] != from {
                return Err(Error::NormalizeMap(format!(
                    "byte {:?} mapped twice",
                    from as char
                )));
            }
            if map.inverse[to as usize] != to {
                return Err(Error::NormalizeMap(format!(
                    "two bytes map to {:?}",
                    to as char
                )));
            }
            map.forward[from as usize] = to;
            map.inverse[to as usize] = from;
            map.pairs.push((from, to));
        }
        Ok(map)
    }

    /// Parse the JSON configuration form: `{"from": "to", ...}` with
    /// single-ASCII-character keys and values.
    pub fn from_json(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| Error::NormalizeMap(format!("not valid JSON: {e}")))?;
        let obj = value
            .as_object()
            .ok_or_else(|| Error::NormalizeMap("expected a JSON object".to_string()))?;

        let mut pairs = Vec::with_capacity(obj.len());
        for (key, val) in obj {
            let to = val
                .as_str()
                .ok_or_else(|| Error::NormalizeMap(format!("value for {key:?} is not a string")))?;
            pairs.push((single_ascii(key)?, single_ascii(to)?));
        }
        NormalizeMap::new(pairs)
    }

    /// Substitute mapped bytes in place over a byte string.
    pub fn apply_bytes(&self, bytes: &[u8]) -> Vec<u8> {
        bytes.iter().map(|&b| self.forward[b as usize]).collect()
    }

    /// Reverse substitution.
    pub fn unapply_bytes(&self, bytes: &[u8]) -> Vec<u8> {
        bytes.iter().map(|&b| self.inverse[b as usize]).collect()
    }

    /// Substitute over a string. Construction enforces ASCII-only pairs, so
    /// substitution never touches multi-byte sequences.
    pub fn apply(&self, s: &str) -> String {
        String::from_utf8(self.apply_bytes(s.as_bytes()))
            .expect("NormalizeMap: ASCII substitutions preserve UTF-8")
    }

    pub fn unapply(&self, s: &str) -> String {
        String::from_utf8(self.unapply_bytes(s.as_bytes()))
            .expect("NormalizeMap: ASCII substitutions preserve UTF-8")
    }

    /// The configured `(from, to)` pairs, in insertion order.
    pub fn pairs(&self) -> &[(u8, u8)] {
        &self.pairs
    }

    pub fn is_identity(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl std::fmt::Debug for NormalizeMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NormalizeMap")
            .field("pairs", &self.pairs)
            .finish()
    }
}

fn single_ascii(s: &str) -> Result<u8> {
    let mut bytes = s.bytes();
    match (bytes.next(), bytes.next()) {
        (Some(b), None) if b.is_ascii() => Ok(b),
        _ => Err(Error::NormalizeMap(format!(
            "{s:?} is not a single ASCII character"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference_map() -> NormalizeMap {
        NormalizeMap::new([(b'.', b'x'), (b'/', b'Z'), (b'\\', b'X'), (b'`', b'C')]).unwrap()
    }

    #[test]
    fn apply_and_unapply_roundtrip() {
        let map = reference_map();
        let normalized = map.apply("ka.nan.ho a/b");
        assert_eq!(normalized, "kaxnanxho aZb");
        assert_eq!(map.unapply(&normalized), "ka.nan.ho a/b");
    }

    #[test]
    fn unmapped_bytes_pass_through() {
        let map = reference_map();
        assert_eq!(map.apply("國家"), "國家");
    }

    #[test]
    fn rejects_duplicate_source() {
        assert!(NormalizeMap::new([(b'.', b'x'), (b'.', b'y')]).is_err());
    }

    #[test]
    fn rejects_duplicate_target() {
        assert!(NormalizeMap::new([(b'.', b'x'), (b'/', b'x')]).is_err());
    }

    #[test]
    fn rejects_non_ascii_pairs() {
        assert!(NormalizeMap::new([(b'.', 0x81)]).is_err());
        assert!(NormalizeMap::new([(0xC3, b'x')]).is_err());
    }

    #[test]
    fn parses_json_config() {
        let map = NormalizeMap::from_json(r#"{".": "x", "/": "Z"}"#).unwrap();
        assert_eq!(map.apply("a.b/c"), "axbZc");
    }

    #[test]
    fn rejects_multichar_json_entries() {
        assert!(NormalizeMap::from_json(r#"{"ab": "x"}"#).is_err());
        assert!(NormalizeMap::from_json(r#"{".": "xy"}"#).is_err());
        assert!(NormalizeMap::from_json(r#"{".": 3}"#).is_err());
        assert!(NormalizeMap::from_json("[]").is_err());
    }

    #[test]
    fn identity_map() {
        let map = NormalizeMap::identity();
        assert!(map.is_identity());
        assert_eq!(map.apply("a.b"), "a.b");
    }
}
