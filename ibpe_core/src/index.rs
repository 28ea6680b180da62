//! Inverted index construction — token to sorted positions.

use std::fs::File;
use std::path::Path;

use ahash::AHashMap;
use log::info;
use memmap2::Mmap;
use rayon::prelude::*;

use crate::corpus;
use crate::error::{Error, Result};
use crate::sizes::{IndexEntry, SentId, TokenId, MAX_POS, MAX_SENT_ID};

/// Token ID → sorted, duplicate-free list of `(sent_id, pos)` entries.
pub type InvertedIndex = AHashMap<TokenId, Vec<IndexEntry>>;

/// Builder for constructing an inverted index in memory.
///
/// Accumulates tokenized sentences, then sorts every posting list in
/// `finalize`. All lists are immutable afterwards.
#[derive(Debug, Default)]
pub struct IndexBuilder {
    postings: InvertedIndex,
    token_count: u64,
    finalized: bool,
}

impl IndexBuilder {
    pub fn new() -> Self {
        IndexBuilder::default()
    }

    /// Load and index a tokenized corpus file (see [`crate::corpus`] for the
    /// format). The returned builder is already finalized.
    pub fn from_corpus_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            Error::CorruptCorpus(format!("cannot open {}: {e}", path.display()))
        })?;
        // SAFETY: read-only mapping of a file we just opened.
        let mmap = unsafe { Mmap::map(&file)? };

        let mut builder = IndexBuilder::new();
        corpus::read_corpus(&mmap, |sent_id, tokens| builder.add_sentence(sent_id, tokens))?;
        builder.finalize();
        info!(
            "indexed corpus {}: {} tokens over {} vocabulary entries",
            path.display(),
            builder.token_count,
            builder.postings.len()
        );
        Ok(builder)
    }

    /// Record one sentence. Positions are assigned in token order.
    pub fn add_sentence(&mut self, sent_id: SentId, tokens: &[TokenId]) -> Result<()> {
        if sent_id > MAX_SENT_ID {
            return Err(Error::OutOfRange {
                what: "sentence id",
                value: sent_id as u64,
                max: MAX_SENT_ID as u64,
            });
        }
        if tokens.len() as u64 > MAX_POS as u64 + 1 {
            return Err(Error::OutOfRange {
                what: "token position",
                value: tokens.len() as u64 - 1,
                max: MAX_POS as u64,
            });
        }

        for (pos, &token) in tokens.iter().enumerate() {
            self.postings
                .entry(token)
                .or_default()
                .push(IndexEntry::new(sent_id, pos as u32));
        }
        self.token_count += tokens.len() as u64;
        self.finalized = false;
        Ok(())
    }

    /// Sort every posting list by `(sent_id, pos)` and drop duplicates.
    /// Idempotent.
    pub fn finalize(&mut self) {
        if self.finalized {
            return;
        }
        self.postings.par_iter_mut().for_each(|(_, entries)| {
            entries.sort_unstable();
            entries.dedup();
        });
        self.finalized = true;
    }

    /// Read-only view of the posting lists.
    pub fn index(&self) -> &InvertedIndex {
        &self.postings
    }

    /// Consume the builder, yielding the finalized index.
    pub fn into_index(mut self) -> InvertedIndex {
        self.finalize();
        self.postings
    }

    /// Total number of indexed token occurrences.
    pub fn token_count(&self) -> u64 {
        self.token_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn postings_sorted_after_finalize() {
        let mut builder = IndexBuilder::new();
        builder.add_sentence(5, &[10, 20, 10]).unwrap();
        builder.add_sentence(2, &[10]).unwrap();
        builder.finalize();

        let list = &builder.index()[&10];
        assert_eq!(
            list,
            &vec![
                IndexEntry::new(2, 0),
                IndexEntry::new(5, 0),
                IndexEntry::new(5, 2),
            ]
        );
        assert_eq!(builder.index()[&20], vec![IndexEntry::new(5, 1)]);
    }

    #[test]
    fn entry_count_matches_token_count() {
        let mut builder = IndexBuilder::new();
        builder.add_sentence(0, &[1, 2, 3]).unwrap();
        builder.add_sentence(1, &[2, 2, 4, 4]).unwrap();
        builder.finalize();

        let total: usize = builder.index().values().map(Vec::len).sum();
        assert_eq!(total as u64, builder.token_count());
        assert_eq!(total, 7);
    }

    #[test]
    fn finalize_is_idempotent() {
        let mut builder = IndexBuilder::new();
        builder.add_sentence(3, &[7, 8]).unwrap();
        builder.finalize();
        let before = builder.index().clone();
        builder.finalize();
        assert_eq!(builder.index(), &before);
    }

    #[test]
    fn rejects_out_of_range_sent_id() {
        let mut builder = IndexBuilder::new();
        let err = builder.add_sentence(MAX_SENT_ID + 1, &[1]).unwrap_err();
        assert!(matches!(err, Error::OutOfRange { .. }));
    }

    #[test]
    fn rejects_overlong_sentence() {
        let mut builder = IndexBuilder::new();
        let tokens = vec![1u32; MAX_POS as usize + 2];
        let err = builder.add_sentence(0, &tokens).unwrap_err();
        assert!(matches!(err, Error::OutOfRange { .. }));
    }

    #[test]
    fn accepts_max_length_sentence() {
        let mut builder = IndexBuilder::new();
        let tokens = vec![1u32; MAX_POS as usize + 1];
        builder.add_sentence(0, &tokens).unwrap();
        builder.finalize();
        let list = &builder.index()[&1];
        assert_eq!(list.last().map(|e| e.pos()), Some(MAX_POS));
    }

    #[test]
    fn from_corpus_file_roundtrip() {
        let sentences = vec![(0u32, vec![3u32, 4, 1]), (1, vec![4, 1])];
        let bytes = crate::corpus::write_corpus(&sentences);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus.ibpc");
        std::fs::write(&path, bytes).unwrap();

        let builder = IndexBuilder::from_corpus_file(&path).unwrap();
        assert_eq!(builder.token_count(), 5);
        assert_eq!(
            builder.index()[&4],
            vec![IndexEntry::new(0, 1), IndexEntry::new(1, 0)]
        );
    }

    #[test]
    fn missing_corpus_file_fails() {
        assert!(IndexBuilder::from_corpus_file("/nonexistent/corpus.ibpc").is_err());
    }
}
