//! Binary format for tokenized corpora.
//!
//! Layout (all little-endian):
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ Header (16 bytes)                           │
//! │  magic: [u8; 4] = "IBPC"                    │
//! │  version: u32 = 1                           │
//! │  sentence_count: u32                        │
//! │  header_crc32: u32                          │
//! ├─────────────────────────────────────────────┤
//! │ Records (sentence_count times)              │
//! │  sent_id: u32                               │
//! │  token_count: u32                           │
//! │  tokens: token_count × u32                  │
//! ├─────────────────────────────────────────────┤
//! │ record_section_crc32: u32                   │
//! └─────────────────────────────────────────────┘
//! ```

use crate::error::{Error, Result};
use crate::sizes::{SentId, TokenId};

/// Magic bytes identifying a tokenized corpus file.
pub const MAGIC: [u8; 4] = *b"IBPC";

/// Current format version.
pub const VERSION: u32 = 1;

/// Header size in bytes (fixed).
pub const HEADER_SIZE: usize = 16;

/// Corpus header parsed from bytes.
#[derive(Debug, Clone)]
pub struct CorpusHeader {
    pub version: u32,
    pub sentence_count: u32,
}

impl CorpusHeader {
    /// Serialize to bytes. CRC32 covers the first 12 bytes.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&MAGIC);
        buf[4..8].copy_from_slice(&self.version.to_le_bytes());
        buf[8..12].copy_from_slice(&self.sentence_count.to_le_bytes());
        let crc = crc32fast::hash(&buf[..12]);
        buf[12..16].copy_from_slice(&crc.to_le_bytes());
        buf
    }

    /// Parse and validate a header.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(Error::CorruptCorpus("file too small for header".to_string()));
        }
        if data[0..4] != MAGIC {
            return Err(Error::CorruptCorpus("invalid magic bytes".to_string()));
        }
        let stored_crc = read_u32(data, 12);
        let computed_crc = crc32fast::hash(&data[..12]);
        if stored_crc != computed_crc {
            return Err(Error::CorruptCorpus(format!(
                "header CRC mismatch (stored={stored_crc:#010x}, computed={computed_crc:#010x})"
            )));
        }
        let version = read_u32(data, 4);
        if version != VERSION {
            return Err(Error::CorruptCorpus(format!(
                "version mismatch: expected {VERSION}, found {version}"
            )));
        }
        Ok(CorpusHeader {
            version,
            sentence_count: read_u32(data, 8),
        })
    }
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

/// Serialize tokenized sentences to the corpus format.
pub fn write_corpus(sentences: &[(SentId, Vec<TokenId>)]) -> Vec<u8> {
    let record_size: usize = sentences.iter().map(|(_, t)| 8 + 4 * t.len()).sum();
    let mut out = Vec::with_capacity(HEADER_SIZE + record_size + 4);

    let header = CorpusHeader {
        version: VERSION,
        sentence_count: sentences.len() as u32,
    };
    out.extend_from_slice(&header.to_bytes());

    let record_start = out.len();
    for (sent_id, tokens) in sentences {
        out.extend_from_slice(&sent_id.to_le_bytes());
        out.extend_from_slice(&(tokens.len() as u32).to_le_bytes());
        for token in tokens {
            out.extend_from_slice(&token.to_le_bytes());
        }
    }
    let crc = crc32fast::hash(&out[record_start..]);
    out.extend_from_slice(&crc.to_le_bytes());

    out
}

/// Stream the records of a corpus file, invoking `visit` per sentence.
///
/// The whole record section is checksummed before any record is surfaced.
pub fn read_corpus<F>(data: &[u8], mut visit: F) -> Result<()>
where
    F: FnMut(SentId, &[TokenId]) -> Result<()>,
{
    let header = CorpusHeader::from_bytes(data)?;

    if data.len() < HEADER_SIZE + 4 {
        return Err(Error::CorruptCorpus(
            "file too small for record section".to_string(),
        ));
    }
    let crc_offset = data.len() - 4;
    let stored_crc = read_u32(data, crc_offset);
    let computed_crc = crc32fast::hash(&data[HEADER_SIZE..crc_offset]);
    if stored_crc != computed_crc {
        return Err(Error::CorruptCorpus(format!(
            "record section CRC mismatch (stored={stored_crc:#010x}, computed={computed_crc:#010x})"
        )));
    }

    let mut offset = HEADER_SIZE;
    let mut tokens: Vec<TokenId> = Vec::new();
    for _ in 0..header.sentence_count {
        if offset + 8 > crc_offset {
            return Err(Error::CorruptCorpus("truncated record header".to_string()));
        }
        let sent_id = read_u32(data, offset);
        let token_count = read_u32(data, offset + 4) as usize;
        offset += 8;

        if offset + 4 * token_count > crc_offset {
            return Err(Error::CorruptCorpus("truncated token list".to_string()));
        }
        tokens.clear();
        tokens.reserve(token_count);
        for i in 0..token_count {
            tokens.push(read_u32(data, offset + 4 * i));
        }
        offset += 4 * token_count;

        visit(sent_id, &tokens)?;
    }

    if offset != crc_offset {
        return Err(Error::CorruptCorpus(
            "trailing bytes after last record".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<(SentId, Vec<TokenId>)> {
        vec![
            (0, vec![5, 9, 1]),
            (1, vec![7, 1]),
            (2, vec![]),
            (7, vec![5, 5, 5, 1]),
        ]
    }

    #[test]
    fn roundtrip() {
        let bytes = write_corpus(&sample());
        let mut seen = Vec::new();
        read_corpus(&bytes, |sid, tokens| {
            seen.push((sid, tokens.to_vec()));
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, sample());
    }

    #[test]
    fn empty_corpus() {
        let bytes = write_corpus(&[]);
        let mut count = 0;
        read_corpus(&bytes, |_, _| {
            count += 1;
            Ok(())
        })
        .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn corrupt_magic_detected() {
        let mut bytes = write_corpus(&sample());
        bytes[0] = b'X';
        assert!(read_corpus(&bytes, |_, _| Ok(())).is_err());
    }

    #[test]
    fn corrupt_record_detected() {
        let mut bytes = write_corpus(&sample());
        let mid = HEADER_SIZE + 3;
        bytes[mid] ^= 0xFF;
        assert!(read_corpus(&bytes, |_, _| Ok(())).is_err());
    }

    #[test]
    fn truncated_file_detected() {
        let bytes = write_corpus(&sample());
        assert!(read_corpus(&bytes[..bytes.len() - 6], |_, _| Ok(())).is_err());
    }

    #[test]
    fn visitor_errors_propagate() {
        let bytes = write_corpus(&sample());
        let result = read_corpus(&bytes, |sid, _| {
            if sid == 1 {
                Err(Error::CorruptCorpus("stop".to_string()))
            } else {
                Ok(())
            }
        });
        assert!(result.is_err());
    }
}
