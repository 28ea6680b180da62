//! Adapter over the external BPE tokenizer.
//!
//! Owns the HuggingFace `tokenizers` handle, applies the byte-normalization
//! map around it, and exposes the decoded vocabulary the trie and search
//! driver consume. Vocabulary payloads are stored with the normalize map
//! *un-applied*, so tokens compare against original corpus bytes rather than
//! the normalized form the BPE model was trained on.

use std::path::Path;

use ahash::AHashMap;
use log::info;

use crate::bytelevel;
use crate::error::{Error, Result};
use crate::normalize::NormalizeMap;
use crate::sizes::TokenId;

/// Reserved token IDs, configured explicitly rather than guessed from the
/// vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecialTokens {
    pub eos: TokenId,
    pub bos: Option<TokenId>,
}

impl Default for SpecialTokens {
    fn default() -> Self {
        SpecialTokens {
            eos: 1,
            bos: Some(0),
        }
    }
}

impl SpecialTokens {
    pub fn contains(&self, token: TokenId) -> bool {
        token == self.eos || self.bos == Some(token)
    }
}

/// Decoded token payloads, indexed by token ID. Special tokens are excluded.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    tokens: AHashMap<TokenId, Vec<u8>>,
    max_token_bytes: usize,
    special: SpecialTokens,
}

impl Vocabulary {
    pub fn from_entries(
        entries: impl IntoIterator<Item = (TokenId, Vec<u8>)>,
        special: SpecialTokens,
    ) -> Self {
        let mut tokens = AHashMap::new();
        let mut max_token_bytes = 0;
        for (tid, bytes) in entries {
            if special.contains(tid) {
                continue;
            }
            max_token_bytes = max_token_bytes.max(bytes.len());
            tokens.insert(tid, bytes);
        }
        Vocabulary {
            tokens,
            max_token_bytes,
            special,
        }
    }

    /// The byte payload of a token, in original-corpus bytes.
    pub fn token_bytes(&self, token: TokenId) -> Option<&[u8]> {
        self.tokens.get(&token).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (TokenId, &[u8])> {
        self.tokens.iter().map(|(&tid, bytes)| (tid, bytes.as_slice()))
    }

    /// Longest token payload in bytes.
    pub fn max_token_bytes(&self) -> usize {
        self.max_token_bytes
    }

    /// Number of non-special vocabulary entries.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn special(&self) -> SpecialTokens {
        self.special
    }
}

/// The external-tokenizer adapter.
#[derive(Debug)]
pub struct Tokenizer {
    inner: tokenizers::Tokenizer,
    vocab: Vocabulary,
    normalize: NormalizeMap,
    vocab_size: usize,
}

impl Tokenizer {
    /// Load a HuggingFace `tokenizer.json` asset.
    ///
    /// The vocabulary is pulled out of `model.vocab`, decoded from the
    /// byte-level representation, and stored with `normalize` un-applied.
    pub fn from_file(
        path: impl AsRef<Path>,
        normalize: NormalizeMap,
        special: SpecialTokens,
    ) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::TokenizerLoad(format!("cannot read {}: {e}", path.display()))
        })?;

        let inner = tokenizers::Tokenizer::from_bytes(raw.as_bytes())
            .map_err(|e| Error::TokenizerLoad(format!("{}: {e}", path.display())))?;

        let json: serde_json::Value = serde_json::from_str(&raw)
            .map_err(|e| Error::TokenizerLoad(format!("{}: {e}", path.display())))?;
        let vocab_obj = json
            .pointer("/model/vocab")
            .and_then(|v| v.as_object())
            .ok_or_else(|| {
                Error::TokenizerLoad(format!("{}: missing model.vocab", path.display()))
            })?;

        let mut entries = Vec::with_capacity(vocab_obj.len());
        for (token_str, id) in vocab_obj {
            let tid = id.as_u64().ok_or_else(|| {
                Error::TokenizerLoad(format!("non-integer id for token {token_str:?}"))
            })? as TokenId;
            let bytes = normalize.unapply_bytes(&bytelevel::decode(token_str));
            entries.push((tid, bytes));
        }
        let vocab = Vocabulary::from_entries(entries, special);
        let vocab_size = inner.get_vocab_size(true);

        info!(
            "loaded tokenizer {}: vocab_size={}, max_token_bytes={}",
            path.display(),
            vocab_size,
            vocab.max_token_bytes()
        );

        Ok(Tokenizer {
            inner,
            vocab,
            normalize,
            vocab_size,
        })
    }

    /// Normalize and BPE-encode a string.
    pub fn tokenize(&self, input: &str) -> Result<Vec<TokenId>> {
        let normalized = self.normalize.apply(input);
        let encoding = self
            .inner
            .encode(normalized, false)
            .map_err(|e| Error::Tokenize(e.to_string()))?;
        Ok(encoding.get_ids().to_vec())
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocab
    }

    /// Full vocabulary size of the underlying model, special tokens included.
    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    pub fn max_token_bytes(&self) -> usize {
        self.vocab.max_token_bytes()
    }

    pub fn normalize_map(&self) -> &NormalizeMap {
        &self.normalize
    }
}
