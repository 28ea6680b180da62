//! Error types for the search engine.

use thiserror::Error;

/// Errors surfaced by index construction, regex compilation, and search.
#[derive(Debug, Error)]
pub enum Error {
    /// The regex failed to parse. `pos` is a byte offset into the pattern.
    #[error("regex parse error at byte {pos}: {message}")]
    Parse { pos: usize, message: String },

    /// The regex parsed but uses a feature matching does not support
    /// (assertions, Unicode property sets).
    #[error("unsupported regex feature: {0}")]
    Unsupported(String),

    /// A sentence ID or token position exceeds the configured bit width.
    #[error("{what} {value} out of range (max {max})")]
    OutOfRange {
        what: &'static str,
        value: u64,
        max: u64,
    },

    /// The external tokenizer asset is missing or malformed.
    #[error("tokenizer load failed: {0}")]
    TokenizerLoad(String),

    /// The BPE encoder rejected an input string.
    #[error("tokenize failed: {0}")]
    Tokenize(String),

    /// The binary corpus file is malformed.
    #[error("corrupt corpus: {0}")]
    CorruptCorpus(String),

    /// The normalize-map configuration is invalid.
    #[error("invalid normalize map: {0}")]
    NormalizeMap(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
