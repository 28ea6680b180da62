//! Byte-level BPE vocabulary decoding.
//!
//! Byte-level BPE tokenizers store vocabulary entries as printable Unicode
//! strings: bytes that are printable map to themselves, every other byte maps
//! to a code point at `0x100 + n` (assigned in byte order). The trie and the
//! search driver need the raw byte payloads, so vocab keys pass through the
//! inverse mapping here.

use std::sync::LazyLock;

use ahash::AHashMap;

fn is_printable(b: u8) -> bool {
    matches!(b, 0x21..=0x7E | 0xA1..=0xAC | 0xAE..=0xFF)
}

static BYTE_TO_CHAR: LazyLock<[char; 256]> = LazyLock::new(|| {
    let mut table = ['\0'; 256];
    let mut n = 0u32;
    for b in 0u32..256 {
        table[b as usize] = if is_printable(b as u8) {
            char::from_u32(b).unwrap()
        } else {
            n += 1;
            char::from_u32(0x100 + n - 1).unwrap()
        };
    }
    table
});

static CHAR_TO_BYTE: LazyLock<AHashMap<char, u8>> = LazyLock::new(|| {
    BYTE_TO_CHAR
        .iter()
        .enumerate()
        .map(|(b, &c)| (c, b as u8))
        .collect()
});

/// The printable stand-in for a raw byte.
pub fn byte_to_char(b: u8) -> char {
    BYTE_TO_CHAR[b as usize]
}

/// Inverse of [`byte_to_char`]. `None` for code points outside the image.
pub fn char_to_byte(c: char) -> Option<u8> {
    CHAR_TO_BYTE.get(&c).copied()
}

/// Decode a vocabulary token string into its raw byte payload.
///
/// Code points outside the byte-level image are passed through as their
/// UTF-8 bytes, matching how byte-level vocabularies degrade on foreign
/// entries (added special tokens are filtered out before this point).
pub fn decode(token: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(token.len());
    for c in token.chars() {
        match char_to_byte(c) {
            Some(b) => out.push(b),
            None => {
                let mut buf = [0u8; 4];
                out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            }
        }
    }
    out
}

/// Encode raw bytes into the printable vocabulary representation.
pub fn encode(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| byte_to_char(b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn printable_bytes_map_to_themselves() {
        assert_eq!(byte_to_char(b'a'), 'a');
        assert_eq!(byte_to_char(b'!'), '!');
        assert_eq!(byte_to_char(0xFF), '\u{FF}');
    }

    #[test]
    fn nonprintable_bytes_shift_into_private_range() {
        // Assigned in byte order: 0x00 is the first non-printable byte.
        assert_eq!(byte_to_char(0x00), '\u{100}');
        assert_eq!(byte_to_char(b' '), '\u{120}');
        assert_eq!(byte_to_char(0x7F), '\u{121}');
        assert_eq!(byte_to_char(0xAD), '\u{143}');
    }

    #[test]
    fn decode_inverts_encode() {
        let bytes: Vec<u8> = (0u32..256).map(|b| b as u8).collect();
        assert_eq!(decode(&encode(&bytes)), bytes);
    }

    #[test]
    fn decode_multibyte_token() {
        // "國" in byte-level representation is its UTF-8 bytes, each mapped.
        let encoded = encode("國".as_bytes());
        assert_eq!(decode(&encoded), "國".as_bytes());
    }
}
