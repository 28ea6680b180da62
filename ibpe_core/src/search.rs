//! Search driver: DFA traversal over the token trie with per-state
//! memoization.
//!
//! Candidate lists are enumerated recursively over DFA states. Cycles in the
//! DFA (any unbounded repetition) and oversized intermediate results abort
//! the affected subtree; an aborted subtree degrades to the wildcard
//! candidate ⊤ ("anything may follow here"), over-approximating the result
//! and flagging `needs_recheck` so the caller can verify matches against the
//! raw corpus.

use std::borrow::Cow;

use ahash::{AHashMap, AHashSet};
use log::{debug, trace};

use crate::candidates::{followed_by, sent_ids, union_merge};
use crate::error::Result;
use crate::regex::{self, Dfa, StateId};
use crate::sizes::{IndexEntry, SentId, TokenId};
use crate::tokenizer::Vocabulary;
use crate::trie::{DfaTrie, TokenOutcome};

/// Search-time tunables.
#[derive(Debug, Clone, Copy)]
pub struct SearchConfig {
    /// Abort threshold for the running tally of fetched candidate entries.
    pub candidate_budget: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            candidate_budget: 10_000_000,
        }
    }
}

/// Result of one search call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchOutcome {
    /// Matching sentence IDs, ascending and unique.
    pub sent_ids: Vec<SentId>,
    /// Set when a cycle or the candidate budget degraded some subtree; the
    /// result is then an over-approximation the caller should verify
    /// against the corpus.
    pub needs_recheck: bool,
}

/// Reusable query engine over one vocabulary: owns the per-offset tries.
pub struct Searcher<'a> {
    vocab: &'a Vocabulary,
    trie: DfaTrie,
    config: SearchConfig,
}

impl<'a> Searcher<'a> {
    pub fn new(vocab: &'a Vocabulary) -> Self {
        Searcher::with_config(vocab, SearchConfig::default())
    }

    pub fn with_config(vocab: &'a Vocabulary, config: SearchConfig) -> Self {
        Searcher {
            vocab,
            trie: DfaTrie::new(vocab),
            config,
        }
    }

    /// Run a regex query. `index` maps a token ID to its posting list;
    /// callers may serve it from memory or from external pages.
    pub fn search<F>(&self, index: F, regex: &str) -> Result<SearchOutcome>
    where
        F: Fn(TokenId) -> Vec<IndexEntry>,
    {
        search_with(self.vocab, &self.trie, &self.config, index, regex)
    }
}

/// Trie-independent entry point used by hosts that cache the trie
/// separately from the vocabulary.
pub fn search_with<F>(
    vocab: &Vocabulary,
    trie: &DfaTrie,
    config: &SearchConfig,
    index: F,
    regex: &str,
) -> Result<SearchOutcome>
where
    F: Fn(TokenId) -> Vec<IndexEntry>,
{
    let dfa = regex::compile(regex)?;
    debug!(
        "compiled {regex:?}: {} DFA states, start={}",
        dfa.num_states(),
        dfa.start()
    );

    // Empty-language shortcut: the start state accepting means every
    // sentence matches. EOS terminates every indexed sentence, so its
    // posting list enumerates them all.
    if dfa.is_accept(dfa.start()) {
        let entries = index(vocab.special().eos);
        debug!("start state accepts; matching all {} sentences", entries.len());
        return Ok(SearchOutcome {
            sent_ids: sent_ids(&entries),
            needs_recheck: false,
        });
    }

    let mut ctx = Ctx {
        vocab,
        trie,
        dfa: &dfa,
        index: &index,
        cache: AHashMap::new(),
        budget_left: config.candidate_budget,
        needs_recheck: false,
    };

    let mut cand_lists: Vec<Cow<'_, [IndexEntry]>> = Vec::new();
    for pad in 0..vocab.max_token_bytes() {
        let next_tokens = ctx.trie.next_tokens(ctx.dfa, ctx.dfa.start(), pad);
        trace!("pad={pad}: {} candidate tokens", next_tokens.len());

        for tid in next_tokens {
            let matches = (ctx.index)(tid);
            if matches.is_empty() {
                continue;
            }
            let Some(token) = ctx.vocab.token_bytes(tid) else {
                debug_assert!(false, "trie emitted unknown token {tid}");
                continue;
            };
            if !ctx.spend(matches.len()) {
                // Budget gone: keep the fetched list as an
                // over-approximation and skip the recursion.
                cand_lists.push(Cow::Owned(matches));
                continue;
            }

            match DfaTrie::consume_token(ctx.dfa, ctx.dfa.start(), &token[pad..]) {
                TokenOutcome::Accepted => cand_lists.push(Cow::Owned(matches)),
                TokenOutcome::Rejected => {
                    debug_assert!(false, "trie emitted rejected token {tid}");
                }
                TokenOutcome::State(state) => {
                    let mut visited = AHashSet::new();
                    visited.insert(state);
                    match ctx.generate(state, &mut visited) {
                        // followed_by(matches, ⊤) = matches on an aborted
                        // subtree.
                        None => cand_lists.push(Cow::Owned(matches)),
                        Some(cands) => {
                            cand_lists.push(Cow::Owned(followed_by(matches, &cands)))
                        }
                    }
                }
            }
        }
    }

    let merged = union_merge(&cand_lists);
    debug!(
        "{} candidate entries, needs_recheck={}",
        merged.len(),
        ctx.needs_recheck
    );
    Ok(SearchOutcome {
        sent_ids: sent_ids(&merged),
        needs_recheck: ctx.needs_recheck,
    })
}

struct Ctx<'a, F> {
    vocab: &'a Vocabulary,
    trie: &'a DfaTrie,
    dfa: &'a Dfa,
    index: &'a F,
    /// Per-call memo: `None` marks a subtree aborted by cycle or budget.
    cache: AHashMap<StateId, Option<Vec<IndexEntry>>>,
    budget_left: usize,
    needs_recheck: bool,
}

impl<F> Ctx<'_, F>
where
    F: Fn(TokenId) -> Vec<IndexEntry>,
{
    /// Deduct from the candidate budget. On exhaustion flags the result for
    /// recheck and reports `false`.
    fn spend(&mut self, amount: usize) -> bool {
        if amount > self.budget_left {
            self.budget_left = 0;
            self.needs_recheck = true;
            return false;
        }
        self.budget_left -= amount;
        true
    }

    /// Candidate list for the subtree rooted at `state`: positions where the
    /// remainder of the regex completes. `None` = aborted.
    fn generate(
        &mut self,
        state: StateId,
        visited: &mut AHashSet<StateId>,
    ) -> Option<Vec<IndexEntry>> {
        if let Some(cached) = self.cache.get(&state) {
            return cached.clone();
        }

        let next_tokens = self.trie.next_tokens(self.dfa, state, 0);
        trace!("state {state}: {} candidate tokens", next_tokens.len());

        let mut cand_lists: Vec<Cow<'_, [IndexEntry]>> = Vec::new();
        for tid in next_tokens {
            let matches = (self.index)(tid);
            if matches.is_empty() {
                continue;
            }
            let Some(token) = self.vocab.token_bytes(tid) else {
                debug_assert!(false, "trie emitted unknown token {tid}");
                continue;
            };
            if !self.spend(matches.len()) {
                self.cache.insert(state, None);
                return None;
            }

            match DfaTrie::consume_token(self.dfa, state, token) {
                TokenOutcome::Accepted => cand_lists.push(Cow::Owned(matches)),
                TokenOutcome::Rejected => {
                    debug_assert!(false, "trie emitted rejected token {tid}");
                }
                TokenOutcome::State(next_state) => {
                    if !visited.insert(next_state) {
                        // Cycle: this state's candidates cannot be
                        // enumerated in position space.
                        self.needs_recheck = true;
                        self.cache.insert(state, None);
                        return None;
                    }
                    let child = self.generate(next_state, visited);
                    visited.remove(&next_state);
                    match child {
                        None => {
                            // Aborted child acts as the wildcard ⊤.
                            self.needs_recheck = true;
                            cand_lists.push(Cow::Owned(matches));
                        }
                        Some(cands) => {
                            cand_lists.push(Cow::Owned(followed_by(matches, &cands)))
                        }
                    }
                }
            }
        }

        let result = union_merge(&cand_lists);
        self.cache.insert(state, Some(result.clone()));
        Some(result)
    }
}
