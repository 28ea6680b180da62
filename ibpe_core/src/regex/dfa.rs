//! AST → DFA via the McNaughton–Yamada–Thompson followpos construction.
//!
//! Transitions are kept as disjoint byte ranges throughout subset
//! construction: inserting an overlapping range splits the overlap into at
//! most three pieces, so large Unicode classes never explode into per-byte
//! edges. A final pass merges states with identical transition signatures
//! until a fixpoint.

use std::collections::{BTreeMap, BTreeSet};

use ahash::AHashMap;

use crate::error::{Error, Result};
use crate::regex::ast::{AssertionKind, Ast};

pub type StateId = u32;

/// One outgoing DFA edge: bytes in `lo..=hi` go to `target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Transition {
    pub lo: u8,
    pub hi: u8,
    pub target: StateId,
}

/// Deterministic finite automaton over the byte alphabet.
///
/// Per-state transitions are sorted by `lo` and pairwise disjoint.
#[derive(Debug, Clone)]
pub struct Dfa {
    transitions: Vec<Vec<Transition>>,
    start: StateId,
    accept: Vec<bool>,
}

impl Dfa {
    pub fn start(&self) -> StateId {
        self.start
    }

    pub fn num_states(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_accept(&self, state: StateId) -> bool {
        self.accept[state as usize]
    }

    pub fn transitions(&self, state: StateId) -> &[Transition] {
        &self.transitions[state as usize]
    }

    /// Follow one byte. Binary search over the sorted transition ranges.
    pub fn next_state(&self, state: StateId, byte: u8) -> Option<StateId> {
        let edges = &self.transitions[state as usize];
        let idx = edges.partition_point(|t| t.lo <= byte);
        if idx == 0 {
            return None;
        }
        let edge = &edges[idx - 1];
        (byte <= edge.hi).then_some(edge.target)
    }

    /// Whether the byte string is in the DFA's language.
    pub fn match_bytes(&self, bytes: &[u8]) -> bool {
        let mut state = self.start;
        for &b in bytes {
            match self.next_state(state, b) {
                Some(next) => state = next,
                None => return false,
            }
        }
        self.is_accept(state)
    }
}

type PosSet = BTreeSet<u32>;

/// Per-node attributes computed during the marking pass.
struct NodeInfo {
    firstpos: PosSet,
    lastpos: PosSet,
    nullable: bool,
}

/// Marking pass state: leaf positions, their byte ranges, and followpos.
#[derive(Default)]
struct Marker {
    leaf_ranges: Vec<(u8, u8)>,
    followpos: Vec<PosSet>,
}

impl Marker {
    fn leaf(&mut self, lo: u8, hi: u8) -> NodeInfo {
        let pos = self.leaf_ranges.len() as u32;
        self.leaf_ranges.push((lo, hi));
        self.followpos.push(PosSet::new());
        NodeInfo {
            firstpos: PosSet::from([pos]),
            lastpos: PosSet::from([pos]),
            nullable: false,
        }
    }

    fn visit(&mut self, ast: &Ast) -> Result<NodeInfo> {
        match ast {
            Ast::Empty { assertion } => {
                if *assertion != AssertionKind::None {
                    return Err(Error::Unsupported(
                        "assertions (^, $, \\b, \\B) are not supported in matching".to_string(),
                    ));
                }
                Ok(NodeInfo {
                    firstpos: PosSet::new(),
                    lastpos: PosSet::new(),
                    nullable: true,
                })
            }
            Ast::Range { lo, hi } => Ok(self.leaf(*lo, *hi)),
            Ast::Union(args) => {
                let mut info = NodeInfo {
                    firstpos: PosSet::new(),
                    lastpos: PosSet::new(),
                    nullable: false,
                };
                for arg in args {
                    let child = self.visit(arg)?;
                    info.firstpos.extend(&child.firstpos);
                    info.lastpos.extend(&child.lastpos);
                    info.nullable |= child.nullable;
                }
                Ok(info)
            }
            Ast::Concat(args) => {
                let mut iter = args.iter();
                let first = match iter.next() {
                    Some(arg) => self.visit(arg)?,
                    None => {
                        return Ok(NodeInfo {
                            firstpos: PosSet::new(),
                            lastpos: PosSet::new(),
                            nullable: true,
                        })
                    }
                };
                let mut acc = first;
                for arg in iter {
                    let right = self.visit(arg)?;
                    self.chain(&acc, &right);
                    let mut firstpos = acc.firstpos;
                    if acc.nullable {
                        firstpos.extend(&right.firstpos);
                    }
                    let mut lastpos = right.lastpos.clone();
                    if right.nullable {
                        lastpos.extend(&acc.lastpos);
                    }
                    acc = NodeInfo {
                        firstpos,
                        lastpos,
                        nullable: acc.nullable && right.nullable,
                    };
                }
                Ok(acc)
            }
            Ast::Star(arg) => {
                let child = self.visit(arg)?;
                for &p in &child.lastpos {
                    let first = child.firstpos.clone();
                    self.followpos[p as usize].extend(first);
                }
                Ok(NodeInfo {
                    firstpos: child.firstpos,
                    lastpos: child.lastpos,
                    nullable: true,
                })
            }
        }
    }

    /// followpos contribution of a concatenation boundary.
    fn chain(&mut self, left: &NodeInfo, right: &NodeInfo) {
        for &p in &left.lastpos {
            let first = right.firstpos.clone();
            self.followpos[p as usize].extend(first);
        }
    }
}

/// Insert `(lo..=hi) -> targets` into a disjoint range map, splitting any
/// overlap with existing entries into at most three pieces.
fn insert_range(
    map: &mut BTreeMap<u8, (u8, PosSet)>,
    mut lo: u8,
    hi: u8,
    targets: &PosSet,
) {
    while lo <= hi {
        // Smallest existing range overlapping [lo, hi].
        let overlap = map
            .range(..=hi)
            .find(|(_, (existing_hi, _))| *existing_hi >= lo)
            .map(|(&existing_lo, _)| existing_lo);

        let existing_lo = match overlap {
            None => {
                map.insert(lo, (hi, targets.clone()));
                return;
            }
            Some(existing_lo) => existing_lo,
        };
        let (existing_hi, existing_targets) = map.remove(&existing_lo).expect("key just found");

        if lo < existing_lo {
            // Leading part of the new range has no overlap.
            map.insert(lo, (existing_lo - 1, targets.clone()));
            lo = existing_lo;
        }
        if existing_lo < lo {
            // Leading part of the existing range keeps its targets.
            map.insert(existing_lo, (lo - 1, existing_targets.clone()));
        }

        let overlap_hi = existing_hi.min(hi);
        let mut union = existing_targets.clone();
        union.extend(targets);
        map.insert(lo, (overlap_hi, union));

        if existing_hi > overlap_hi {
            // Trailing part of the existing range keeps its targets.
            map.insert(overlap_hi + 1, (existing_hi, existing_targets));
        }

        if overlap_hi == u8::MAX {
            return;
        }
        lo = overlap_hi + 1;
    }
}

/// Compile a normalized byte-level AST into a DFA.
pub fn build(ast: &Ast) -> Result<Dfa> {
    let mut marker = Marker::default();
    let root = marker.visit(ast)?;

    // Augment with the sentinel end marker: its position flags accept states.
    let final_pos = marker.leaf_ranges.len() as u32;
    marker.leaf_ranges.push((0, 0));
    marker.followpos.push(PosSet::new());
    for &p in &root.lastpos {
        marker.followpos[p as usize].insert(final_pos);
    }
    let mut start_set = root.firstpos;
    if root.nullable {
        start_set.insert(final_pos);
    }

    let leaf_ranges = marker.leaf_ranges;
    let followpos = marker.followpos;

    let mut states: Vec<PosSet> = vec![start_set.clone()];
    let mut seen: AHashMap<Vec<u32>, StateId> = AHashMap::new();
    seen.insert(start_set.iter().copied().collect(), 0);

    let mut transitions: Vec<Vec<Transition>> = Vec::new();
    let mut accept = vec![start_set.contains(&final_pos)];

    let mut s = 0usize;
    while s < states.len() {
        let mut outgoing: BTreeMap<u8, (u8, PosSet)> = BTreeMap::new();
        let positions = states[s].clone();
        for &p in &positions {
            if p == final_pos {
                continue;
            }
            let (lo, hi) = leaf_ranges[p as usize];
            insert_range(&mut outgoing, lo, hi, &followpos[p as usize]);
        }

        let mut edges = Vec::with_capacity(outgoing.len());
        for (lo, (hi, target_set)) in outgoing {
            let key: Vec<u32> = target_set.iter().copied().collect();
            let target = match seen.get(&key) {
                Some(&id) => id,
                None => {
                    let id = states.len() as StateId;
                    seen.insert(key, id);
                    accept.push(target_set.contains(&final_pos));
                    states.push(target_set);
                    id
                }
            };
            edges.push(Transition { lo, hi, target });
        }
        transitions.push(edges);
        s += 1;
    }

    debug_assert!(accept.iter().any(|&a| a), "DFA has no accept state");

    Ok(merge_identical_states(Dfa {
        transitions,
        start: 0,
        accept,
    }))
}

/// Iteratively merge states whose `(transitions, accept)` signatures are
/// identical, renumbering targets, until no merge applies. Not
/// Hopcroft-optimal, but removes the duplicates UTF-8 fragment unions
/// create.
fn merge_identical_states(mut dfa: Dfa) -> Dfa {
    loop {
        let mut unique: AHashMap<(Vec<Transition>, bool), StateId> = AHashMap::new();
        let mut old_to_new: Vec<StateId> = Vec::with_capacity(dfa.transitions.len());
        let mut changed = false;

        for (state, edges) in dfa.transitions.iter().enumerate() {
            let mut signature = edges.clone();
            signature.sort_unstable();
            let key = (signature, dfa.accept[state]);
            match unique.get(&key) {
                Some(&existing) => {
                    old_to_new.push(existing);
                    changed = true;
                }
                None => {
                    let id = unique.len() as StateId;
                    unique.insert(key, id);
                    old_to_new.push(id);
                }
            }
        }

        if !changed {
            return dfa;
        }

        let num_states = unique.len();
        let mut transitions: Vec<Vec<Transition>> = vec![Vec::new(); num_states];
        let mut accept = vec![false; num_states];
        let mut filled = vec![false; num_states];

        for (state, edges) in dfa.transitions.iter().enumerate() {
            let new_id = old_to_new[state] as usize;
            accept[new_id] = dfa.accept[state];
            if filled[new_id] {
                continue;
            }
            filled[new_id] = true;
            transitions[new_id] = edges
                .iter()
                .map(|t| Transition {
                    lo: t.lo,
                    hi: t.hi,
                    target: old_to_new[t.target as usize],
                })
                .collect();
        }

        dfa = Dfa {
            transitions,
            start: old_to_new[dfa.start as usize],
            accept,
        };
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::regex::ast::lower;
    use crate::regex::cst;
    use crate::regex::testutil::ast_matches;
    use proptest::prelude::*;

    /// Patterns over a tiny alphabet exercising union/star/concat shapes.
    fn pattern_strategy() -> impl Strategy<Value = String> {
        let leaf = prop_oneof![
            Just("a".to_string()),
            Just("b".to_string()),
            Just("c".to_string()),
            Just("[ab]".to_string()),
        ];
        leaf.prop_recursive(3, 16, 3, |inner| {
            prop_oneof![
                (inner.clone(), inner.clone()).prop_map(|(x, y)| format!("{x}{y}")),
                (inner.clone(), inner.clone()).prop_map(|(x, y)| format!("(?:{x}|{y})")),
                inner.clone().prop_map(|x| format!("(?:{x})*")),
                inner.clone().prop_map(|x| format!("(?:{x})?")),
            ]
        })
    }

    proptest! {
        #[test]
        fn prop_dfa_agrees_with_ast(
            pattern in pattern_strategy(),
            input in proptest::collection::vec(prop_oneof![Just(b'a'), Just(b'b'), Just(b'c')], 0..8),
        ) {
            let ast = lower(&cst::parse(&pattern).unwrap()).unwrap();
            let dfa = build(&ast).unwrap();
            prop_assert_eq!(
                dfa.match_bytes(&input),
                ast_matches(&ast, &input),
                "pattern {} on {:?}", pattern, input
            );
        }
    }
}
