//! C ABI facade over `ibpe_core`.
//!
//! Exposes index-builder, tokenizer, and search handles to embedding hosts
//! (the database extension links against this crate). Every exported
//! function traps panics and internal errors, returning a null/negative
//! sentinel; constructors additionally write a message into the caller's
//! error buffer when one is provided.

use std::ffi::{c_char, c_int, c_void, CStr};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::OnceLock;

use log::error;

use ibpe_core::search::{search_with, SearchConfig};
use ibpe_core::sizes::{IndexEntry, SentId, TokenId};
use ibpe_core::tokenizer::{SpecialTokens, Tokenizer};
use ibpe_core::trie::DfaTrie;
use ibpe_core::{IndexBuilder, NormalizeMap};

/// Index entry as exchanged across the boundary.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct IbpeIndexEntry {
    pub sent_id: c_int,
    pub pos: c_int,
}

/// Posting-list iteration callback: `(user_data, token, entries, count)`.
pub type IbpeIndexIterateFn =
    unsafe extern "C" fn(user_data: *mut c_void, token: c_int, entries: *const IbpeIndexEntry, count: c_int);

/// Posting-list accessor: `(user_data, token, out_buf_or_null, capacity)`,
/// returning the entry count. Called twice per token: once with a null
/// buffer to size, once to fill.
pub type IbpeIndexAccessorFn = unsafe extern "C" fn(
    user_data: *mut c_void,
    token: c_int,
    out: *mut IbpeIndexEntry,
    capacity: c_int,
) -> c_int;

pub struct IbpeIndexBuilder {
    inner: IndexBuilder,
}

pub struct IbpeTokenizer {
    tokenizer: Tokenizer,
    // The trie only depends on the vocabulary; build it on first search.
    trie: OnceLock<DfaTrie>,
}

pub struct IbpeSearchResult {
    sent_ids: Vec<SentId>,
    needs_recheck: bool,
}

fn fill_err(err_buf: *mut c_char, err_len: c_int, message: &str) {
    error!("{message}");
    if err_buf.is_null() || err_len <= 0 {
        return;
    }
    let capacity = err_len as usize - 1;
    let bytes: Vec<u8> = message.bytes().filter(|&b| b != 0).take(capacity).collect();
    // SAFETY: caller guarantees err_buf points to err_len writable bytes.
    unsafe {
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), err_buf.cast::<u8>(), bytes.len());
        *err_buf.add(bytes.len()) = 0;
    }
}

// ---------------------------------------------------------------------------
// Index builder
// ---------------------------------------------------------------------------

#[no_mangle]
pub extern "C" fn ibpe_index_builder_create() -> *mut IbpeIndexBuilder {
    match catch_unwind(|| IbpeIndexBuilder {
        inner: IndexBuilder::new(),
    }) {
        Ok(builder) => Box::into_raw(Box::new(builder)),
        Err(_) => std::ptr::null_mut(),
    }
}

/// # Safety
/// `builder` must come from `ibpe_index_builder_create` and not be used
/// afterwards.
#[no_mangle]
pub unsafe extern "C" fn ibpe_index_builder_destroy(builder: *mut IbpeIndexBuilder) {
    if !builder.is_null() {
        drop(Box::from_raw(builder));
    }
}

/// Returns 0 on success, -1 on error (out-of-range IDs, null arguments).
///
/// # Safety
/// `tokens` must point to `n_tokens` readable ints.
#[no_mangle]
pub unsafe extern "C" fn ibpe_index_builder_add_sentence(
    builder: *mut IbpeIndexBuilder,
    sent_id: c_int,
    tokens: *const c_int,
    n_tokens: c_int,
) -> c_int {
    if builder.is_null() || (tokens.is_null() && n_tokens != 0) || n_tokens < 0 || sent_id < 0 {
        return -1;
    }
    let builder = &mut *builder;
    let result = catch_unwind(AssertUnwindSafe(|| {
        let tokens = std::slice::from_raw_parts(tokens, n_tokens as usize);
        let tokens: Vec<TokenId> = tokens.iter().map(|&t| t as TokenId).collect();
        builder.inner.add_sentence(sent_id as SentId, &tokens)
    }));
    match result {
        Ok(Ok(())) => 0,
        Ok(Err(e)) => {
            error!("add_sentence failed: {e}");
            -1
        }
        Err(_) => -1,
    }
}

/// # Safety
/// `builder` must be a live handle.
#[no_mangle]
pub unsafe extern "C" fn ibpe_index_builder_finalize(builder: *mut IbpeIndexBuilder) -> c_int {
    if builder.is_null() {
        return -1;
    }
    let builder = &mut *builder;
    match catch_unwind(AssertUnwindSafe(|| builder.inner.finalize())) {
        Ok(()) => 0,
        Err(_) => -1,
    }
}

/// Invoke `callback` once per token with its finalized posting list.
///
/// # Safety
/// `builder` must be a live handle; `callback` must tolerate being called
/// with the given `user_data`.
#[no_mangle]
pub unsafe extern "C" fn ibpe_index_builder_iterate(
    builder: *mut IbpeIndexBuilder,
    callback: IbpeIndexIterateFn,
    user_data: *mut c_void,
) -> c_int {
    if builder.is_null() {
        return -1;
    }
    let builder = &*builder;
    let result = catch_unwind(AssertUnwindSafe(|| {
        let mut buf: Vec<IbpeIndexEntry> = Vec::new();
        for (&token, entries) in builder.inner.index() {
            buf.clear();
            buf.extend(entries.iter().map(|e| IbpeIndexEntry {
                sent_id: e.sent_id() as c_int,
                pos: e.pos() as c_int,
            }));
            callback(user_data, token as c_int, buf.as_ptr(), buf.len() as c_int);
        }
    }));
    match result {
        Ok(()) => 0,
        Err(_) => -1,
    }
}

// ---------------------------------------------------------------------------
// Tokenizer
// ---------------------------------------------------------------------------

/// Load a tokenizer asset. `mappings` is an array of `n_mappings` two-byte
/// `[from, to]` pairs for the normalize map (may be null when empty).
///
/// # Safety
/// `path` must be a NUL-terminated string; `mappings` must point to
/// `n_mappings` pairs; `err_buf`, when non-null, must have `err_len`
/// writable bytes.
#[no_mangle]
pub unsafe extern "C" fn ibpe_tokenizer_create(
    path: *const c_char,
    mappings: *const [c_char; 2],
    n_mappings: c_int,
    err_buf: *mut c_char,
    err_len: c_int,
) -> *mut IbpeTokenizer {
    if path.is_null() || (mappings.is_null() && n_mappings != 0) || n_mappings < 0 {
        fill_err(err_buf, err_len, "null argument to ibpe_tokenizer_create");
        return std::ptr::null_mut();
    }
    let result = catch_unwind(AssertUnwindSafe(|| {
        let path = CStr::from_ptr(path).to_string_lossy().into_owned();
        let mappings_slice: &[[c_char; 2]] = if n_mappings == 0 {
            &[]
        } else {
            std::slice::from_raw_parts(mappings, n_mappings as usize)
        };
        let pairs: Vec<(u8, u8)> = mappings_slice
            .iter()
            .map(|pair| (pair[0] as u8, pair[1] as u8))
            .collect();
        let normalize = NormalizeMap::new(pairs)?;
        let tokenizer = Tokenizer::from_file(&path, normalize, SpecialTokens::default())?;
        Ok::<_, ibpe_core::Error>(IbpeTokenizer {
            tokenizer,
            trie: OnceLock::new(),
        })
    }));
    match result {
        Ok(Ok(handle)) => Box::into_raw(Box::new(handle)),
        Ok(Err(e)) => {
            fill_err(err_buf, err_len, &e.to_string());
            std::ptr::null_mut()
        }
        Err(_) => {
            fill_err(err_buf, err_len, "panic in ibpe_tokenizer_create");
            std::ptr::null_mut()
        }
    }
}

/// # Safety
/// `tokenizer` must come from `ibpe_tokenizer_create` and not be used
/// afterwards.
#[no_mangle]
pub unsafe extern "C" fn ibpe_tokenizer_destroy(tokenizer: *mut IbpeTokenizer) {
    if !tokenizer.is_null() {
        drop(Box::from_raw(tokenizer));
    }
}

/// Encode `input`, writing up to `maxlen` IDs into `out`. Returns the total
/// token count (callers size with a null/zero buffer first), -1 on error.
///
/// # Safety
/// `tokenizer` must be live; `input` NUL-terminated; `out` must hold
/// `maxlen` ints when non-null.
#[no_mangle]
pub unsafe extern "C" fn ibpe_tokenizer_tokenize(
    tokenizer: *const IbpeTokenizer,
    input: *const c_char,
    out: *mut c_int,
    maxlen: usize,
) -> c_int {
    if tokenizer.is_null() || input.is_null() {
        return -1;
    }
    let handle = &*tokenizer;
    let result = catch_unwind(AssertUnwindSafe(|| {
        let input = CStr::from_ptr(input).to_string_lossy().into_owned();
        handle.tokenizer.tokenize(&input)
    }));
    match result {
        Ok(Ok(tokens)) => {
            if !out.is_null() {
                for (i, &tid) in tokens.iter().take(maxlen).enumerate() {
                    *out.add(i) = tid as c_int;
                }
            }
            tokens.len() as c_int
        }
        Ok(Err(e)) => {
            error!("tokenize failed: {e}");
            -1
        }
        Err(_) => -1,
    }
}

/// # Safety
/// `tokenizer` must be a live handle.
#[no_mangle]
pub unsafe extern "C" fn ibpe_tokenizer_vocab_size(tokenizer: *const IbpeTokenizer) -> c_int {
    if tokenizer.is_null() {
        return -1;
    }
    (*tokenizer).tokenizer.vocab_size() as c_int
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

/// Fetch one posting list through the host accessor (size call, then fill).
unsafe fn fetch_postings(
    accessor: IbpeIndexAccessorFn,
    user_data: *mut c_void,
    token: TokenId,
) -> Vec<IndexEntry> {
    let count = accessor(user_data, token as c_int, std::ptr::null_mut(), 0);
    if count <= 0 {
        return Vec::new();
    }
    let mut buf = vec![IbpeIndexEntry { sent_id: 0, pos: 0 }; count as usize];
    let filled = accessor(user_data, token as c_int, buf.as_mut_ptr(), count);
    buf.truncate(filled.max(0) as usize);

    let entries: Vec<IndexEntry> = buf
        .iter()
        .map(|e| IndexEntry::new(e.sent_id as SentId, e.pos as u32))
        .collect();
    debug_assert!(entries.windows(2).all(|w| w[0] < w[1]));
    entries
}

/// Run a regex search against host-provided posting lists. Returns a result
/// handle, or null on error.
///
/// # Safety
/// All pointers must be valid; `accessor` is called re-entrantly during the
/// search and must stay valid for its duration.
#[no_mangle]
pub unsafe extern "C" fn ibpe_search(
    tokenizer: *const IbpeTokenizer,
    accessor: IbpeIndexAccessorFn,
    user_data: *mut c_void,
    regex: *const c_char,
    err_buf: *mut c_char,
    err_len: c_int,
) -> *mut IbpeSearchResult {
    if tokenizer.is_null() || regex.is_null() {
        fill_err(err_buf, err_len, "null argument to ibpe_search");
        return std::ptr::null_mut();
    }
    let handle = &*tokenizer;
    let result = catch_unwind(AssertUnwindSafe(|| {
        let regex = CStr::from_ptr(regex).to_string_lossy().into_owned();
        let vocab = handle.tokenizer.vocabulary();
        let trie = handle.trie.get_or_init(|| DfaTrie::new(vocab));
        search_with(
            vocab,
            trie,
            &SearchConfig::default(),
            |token| fetch_postings(accessor, user_data, token),
            &regex,
        )
    }));
    match result {
        Ok(Ok(outcome)) => Box::into_raw(Box::new(IbpeSearchResult {
            sent_ids: outcome.sent_ids,
            needs_recheck: outcome.needs_recheck,
        })),
        Ok(Err(e)) => {
            fill_err(err_buf, err_len, &e.to_string());
            std::ptr::null_mut()
        }
        Err(_) => {
            fill_err(err_buf, err_len, "panic in ibpe_search");
            std::ptr::null_mut()
        }
    }
}

/// # Safety
/// `result` must be a live handle; the pointer is valid until destroy.
#[no_mangle]
pub unsafe extern "C" fn ibpe_search_result_data(result: *const IbpeSearchResult) -> *const u32 {
    if result.is_null() {
        return std::ptr::null();
    }
    (*result).sent_ids.as_ptr()
}

/// # Safety
/// `result` must be a live handle.
#[no_mangle]
pub unsafe extern "C" fn ibpe_search_result_len(result: *const IbpeSearchResult) -> usize {
    if result.is_null() {
        return 0;
    }
    (*result).sent_ids.len()
}

/// # Safety
/// `result` must be a live handle.
#[no_mangle]
pub unsafe extern "C" fn ibpe_search_result_needs_recheck(
    result: *const IbpeSearchResult,
) -> c_int {
    if result.is_null() {
        return 0;
    }
    (*result).needs_recheck as c_int
}

/// # Safety
/// `result` must come from `ibpe_search` and not be used afterwards.
#[no_mangle]
pub unsafe extern "C" fn ibpe_search_result_destroy(result: *mut IbpeSearchResult) {
    if !result.is_null() {
        drop(Box::from_raw(result));
    }
}

// ---------------------------------------------------------------------------
// Configuration helpers
// ---------------------------------------------------------------------------

/// Validate a normalize-map JSON object and write its `[from, to]` pairs
/// into `out` (up to `max` pairs). Returns the pair count, -1 on invalid
/// input.
///
/// # Safety
/// `json` must be NUL-terminated; `out` must hold `max` pairs when non-null.
#[no_mangle]
pub unsafe extern "C" fn ibpe_parse_normalize_mappings(
    json: *const c_char,
    out: *mut [c_char; 2],
    max: c_int,
) -> c_int {
    if json.is_null() || (out.is_null() && max != 0) || max < 0 {
        return -1;
    }
    let result = catch_unwind(AssertUnwindSafe(|| {
        let json = CStr::from_ptr(json).to_string_lossy().into_owned();
        NormalizeMap::from_json(&json)
    }));
    match result {
        Ok(Ok(map)) => {
            let pairs = map.pairs();
            if !out.is_null() {
                for (i, &(from, to)) in pairs.iter().take(max as usize).enumerate() {
                    *out.add(i) = [from as c_char, to as c_char];
                }
            }
            pairs.len() as c_int
        }
        Ok(Err(e)) => {
            error!("invalid normalize mappings: {e}");
            -1
        }
        Err(_) => -1,
    }
}
