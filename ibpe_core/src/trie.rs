//! Byte tries over the vocabulary, walked in lockstep with the DFA.
//!
//! One trie per prefix offset: `tries[p]` holds the byte suffix starting at
//! byte `p` of every token longer than `p` bytes. The search driver seeds
//! from offsets `0..max_token_bytes` so a regex can match a suffix of the
//! first covered token; recursive steps always use offset 0.

use roaring::RoaringBitmap;

use crate::regex::{Dfa, StateId};
use crate::sizes::TokenId;
use crate::tokenizer::Vocabulary;

/// Outcome of feeding a token's bytes through the DFA.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenOutcome {
    /// Some prefix of the token landed in an accept state.
    Accepted,
    /// A byte had no transition.
    Rejected,
    /// All bytes consumed; the DFA sits in this non-accepting state.
    State(StateId),
}

#[derive(Debug, Default)]
struct TrieNode {
    /// Tokens whose suffix terminates at this node. Distinct tokens can
    /// share a suffix at offsets > 0.
    token_ids: Vec<TokenId>,
    /// Sorted by byte.
    children: Vec<(u8, u32)>,
}

#[derive(Debug)]
struct Trie {
    nodes: Vec<TrieNode>,
}

impl Trie {
    fn new() -> Self {
        Trie {
            nodes: vec![TrieNode::default()],
        }
    }

    fn insert(&mut self, bytes: &[u8], token: TokenId) {
        let mut node = 0u32;
        for &b in bytes {
            node = match self.child(node, b) {
                Some(child) => child,
                None => {
                    let child = self.nodes.len() as u32;
                    self.nodes.push(TrieNode::default());
                    let children = &mut self.nodes[node as usize].children;
                    let idx = children.partition_point(|&(byte, _)| byte < b);
                    children.insert(idx, (b, child));
                    child
                }
            };
        }
        self.nodes[node as usize].token_ids.push(token);
    }

    fn child(&self, node: u32, byte: u8) -> Option<u32> {
        let children = &self.nodes[node as usize].children;
        children
            .binary_search_by_key(&byte, |&(b, _)| b)
            .ok()
            .map(|idx| children[idx].1)
    }

    /// Children whose byte lies in `lo..=hi`.
    fn children_in(&self, node: u32, lo: u8, hi: u8) -> &[(u8, u32)] {
        let children = &self.nodes[node as usize].children;
        let start = children.partition_point(|&(b, _)| b < lo);
        let end = children.partition_point(|&(b, _)| b <= hi);
        &children[start..end]
    }

    fn collect_subtree(&self, node: u32, out: &mut RoaringBitmap) {
        let n = &self.nodes[node as usize];
        for &tid in &n.token_ids {
            out.insert(tid);
        }
        for &(_, child) in &n.children {
            self.collect_subtree(child, out);
        }
    }
}

/// Per-offset vocabulary tries used by the search driver.
#[derive(Debug)]
pub struct DfaTrie {
    tries: Vec<Trie>,
}

impl DfaTrie {
    /// Index every non-special token's suffixes, one trie per starting
    /// offset.
    pub fn new(vocab: &Vocabulary) -> Self {
        let tries = (0..vocab.max_token_bytes())
            .map(|offset| {
                let mut trie = Trie::new();
                for (tid, bytes) in vocab.iter() {
                    if bytes.len() > offset {
                        trie.insert(&bytes[offset..], tid);
                    }
                }
                trie
            })
            .collect();
        DfaTrie { tries }
    }

    /// Token IDs whose byte expansion (starting `prefix_bytes_skipped` bytes
    /// in) keeps the DFA alive from `state`, or reaches an accept state at
    /// some prefix.
    ///
    /// When a transition lands in an accept state the entire subtree below
    /// that child matches, so it is collected wholesale.
    pub fn next_tokens(
        &self,
        dfa: &Dfa,
        state: StateId,
        prefix_bytes_skipped: usize,
    ) -> RoaringBitmap {
        let mut out = RoaringBitmap::new();
        if let Some(trie) = self.tries.get(prefix_bytes_skipped) {
            Self::walk(trie, 0, dfa, state, &mut out);
        }
        out
    }

    fn walk(trie: &Trie, node: u32, dfa: &Dfa, state: StateId, out: &mut RoaringBitmap) {
        for &tid in &trie.nodes[node as usize].token_ids {
            out.insert(tid);
        }
        for edge in dfa.transitions(state) {
            for &(_, child) in trie.children_in(node, edge.lo, edge.hi) {
                if dfa.is_accept(edge.target) {
                    trie.collect_subtree(child, out);
                } else {
                    Self::walk(trie, child, dfa, edge.target, out);
                }
            }
        }
    }

    /// Feed `token` through the DFA from `state`.
    pub fn consume_token(dfa: &Dfa, state: StateId, token: &[u8]) -> TokenOutcome {
        let mut state = state;
        for &b in token {
            match dfa.next_state(state, b) {
                None => return TokenOutcome::Rejected,
                Some(next) => {
                    if dfa.is_accept(next) {
                        return TokenOutcome::Accepted;
                    }
                    state = next;
                }
            }
        }
        TokenOutcome::State(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regex;
    use crate::tokenizer::{SpecialTokens, Vocabulary};

    fn vocab(entries: &[(TokenId, &str)]) -> Vocabulary {
        Vocabulary::from_entries(
            entries
                .iter()
                .map(|&(tid, s)| (tid, s.as_bytes().to_vec())),
            SpecialTokens::default(),
        )
    }

    fn tids(bitmap: &RoaringBitmap) -> Vec<TokenId> {
        bitmap.iter().collect()
    }

    #[test]
    fn next_tokens_filters_by_dfa() {
        let vocab = vocab(&[(2, "ka"), (3, "ke"), (4, "zu"), (5, "k")]);
        let trie = DfaTrie::new(&vocab);
        let dfa = regex::compile("k[ae]x").unwrap();

        // "ka" and "ke" keep the DFA alive; "k" exhausts its bytes alive;
        // "zu" rejects on the first byte.
        assert_eq!(tids(&trie.next_tokens(&dfa, dfa.start(), 0)), vec![2, 3, 5]);
    }

    #[test]
    fn accept_state_collects_whole_subtree() {
        let vocab = vocab(&[(2, "ab"), (3, "abc"), (4, "abzz"), (5, "b")]);
        let trie = DfaTrie::new(&vocab);
        let dfa = regex::compile("ab").unwrap();

        // After "ab" the DFA accepts, so every token extending "ab" matches.
        assert_eq!(tids(&trie.next_tokens(&dfa, dfa.start(), 0)), vec![2, 3, 4]);
    }

    #[test]
    fn prefix_offset_matches_token_suffixes() {
        let vocab = vocab(&[(2, "xka"), (3, "ka"), (4, "a")]);
        let trie = DfaTrie::new(&vocab);
        let dfa = regex::compile("ka").unwrap();

        // Offset 1: only "xka" is long enough and its suffix "ka" accepts.
        assert_eq!(tids(&trie.next_tokens(&dfa, dfa.start(), 1)), vec![2]);
        // Offset 0: "ka" accepts outright.
        assert_eq!(tids(&trie.next_tokens(&dfa, dfa.start(), 0)), vec![3]);
        // Offsets beyond every token length yield nothing.
        assert!(trie.next_tokens(&dfa, dfa.start(), 7).is_empty());
    }

    #[test]
    fn shared_suffixes_keep_all_token_ids() {
        let vocab = vocab(&[(2, "xba"), (3, "yba"), (4, "ba")]);
        let trie = DfaTrie::new(&vocab);
        let dfa = regex::compile("ba").unwrap();

        // At offset 1 both "xba" and "yba" expose the suffix "ba".
        assert_eq!(tids(&trie.next_tokens(&dfa, dfa.start(), 1)), vec![2, 3]);
    }

    #[test]
    fn consume_token_outcomes() {
        let dfa = regex::compile("ka.ke").unwrap();

        assert!(matches!(
            DfaTrie::consume_token(&dfa, dfa.start(), b"ka"),
            TokenOutcome::State(_)
        ));
        assert_eq!(
            DfaTrie::consume_token(&dfa, dfa.start(), b"kq"),
            TokenOutcome::Rejected
        );
        assert_eq!(
            DfaTrie::consume_token(&dfa, dfa.start(), b"kaxke"),
            TokenOutcome::Accepted
        );
        // Accepted fires at the first accepting prefix, extra bytes ignored.
        assert_eq!(
            DfaTrie::consume_token(&dfa, dfa.start(), b"kaxkezzz"),
            TokenOutcome::Accepted
        );
    }

    #[test]
    fn consume_token_agrees_with_next_state() {
        let dfa = regex::compile("a[bc]*d").unwrap();
        let token = b"abcbc";

        let outcome = DfaTrie::consume_token(&dfa, dfa.start(), token);
        let mut state = dfa.start();
        let mut expected = None;
        for &b in token.iter() {
            match dfa.next_state(state, b) {
                None => {
                    expected = Some(TokenOutcome::Rejected);
                    break;
                }
                Some(next) => {
                    if dfa.is_accept(next) {
                        expected = Some(TokenOutcome::Accepted);
                        break;
                    }
                    state = next;
                }
            }
        }
        assert_eq!(outcome, expected.unwrap_or(TokenOutcome::State(state)));
    }

    #[test]
    fn next_tokens_agrees_with_consume_token() {
        let vocab = vocab(&[
            (2, "a"),
            (3, "ab"),
            (4, "abc"),
            (5, "b"),
            (6, "bc"),
            (7, "zzz"),
            (8, "abq"),
        ]);
        let trie = DfaTrie::new(&vocab);
        let dfa = regex::compile("abc*").unwrap();

        let from_walk = trie.next_tokens(&dfa, dfa.start(), 0);
        for (tid, bytes) in vocab.iter() {
            let survives = !matches!(
                DfaTrie::consume_token(&dfa, dfa.start(), bytes),
                TokenOutcome::Rejected
            );
            assert_eq!(
                from_walk.contains(tid),
                survives,
                "token {tid} ({:?})",
                String::from_utf8_lossy(bytes)
            );
        }
    }
}
