//! Candidate algebra over sorted, duplicate-free index-entry vectors.

use std::borrow::Cow;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::sizes::{IndexEntry, SentId};

/// Entries of `a` immediately followed (same sentence, next position) by an
/// entry of `b`. Output order is induced by `a`, so it stays sorted.
pub fn followed_by(a: Vec<IndexEntry>, b: &[IndexEntry]) -> Vec<IndexEntry> {
    debug_assert!(a.windows(2).all(|w| w[0] < w[1]));
    debug_assert!(b.windows(2).all(|w| w[0] < w[1]));

    let mut out = Vec::new();
    let mut i = 0;
    let mut j = 0;
    while i < a.len() && j < b.len() {
        let x = a[i];
        let y = b[j];
        if x.sent_id() < y.sent_id() {
            i += 1;
        } else if x.sent_id() > y.sent_id() {
            j += 1;
        } else if x.pos() + 1 < y.pos() {
            i += 1;
        } else if x.pos() + 1 == y.pos() {
            out.push(x);
            i += 1;
            j += 1;
        } else {
            j += 1;
        }
    }
    out
}

/// K-way merge of sorted entry lists, dropping duplicates.
///
/// Inputs may be borrowed posting slices or owned intermediate vectors; the
/// output depends only on the multiset of inputs, not their order.
pub fn union_merge(lists: &[Cow<'_, [IndexEntry]>]) -> Vec<IndexEntry> {
    let mut out = Vec::new();

    // (entry, list index, item index), min-first.
    let mut pending: BinaryHeap<Reverse<(IndexEntry, usize, usize)>> =
        BinaryHeap::with_capacity(lists.len());
    for (list_idx, list) in lists.iter().enumerate() {
        if let Some(&first) = list.first() {
            pending.push(Reverse((first, list_idx, 0)));
        }
    }

    while let Some(Reverse((entry, list_idx, item_idx))) = pending.pop() {
        let list = &lists[list_idx];
        if item_idx + 1 < list.len() {
            pending.push(Reverse((list[item_idx + 1], list_idx, item_idx + 1)));
        }
        if out.last() != Some(&entry) {
            out.push(entry);
        }
    }

    debug_assert!(out.windows(2).all(|w| w[0] < w[1]));
    out
}

/// Unique sentence IDs of a sorted entry list, in ascending order.
pub fn sent_ids(entries: &[IndexEntry]) -> Vec<SentId> {
    let mut out = Vec::new();
    for entry in entries {
        if out.last() != Some(&entry.sent_id()) {
            out.push(entry.sent_id());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(pairs: &[(u32, u32)]) -> Vec<IndexEntry> {
        pairs.iter().map(|&(s, p)| IndexEntry::new(s, p)).collect()
    }

    #[test]
    fn followed_by_adjacent_join() {
        let a = entries(&[(2, 3), (2, 4), (2, 5), (5, 1), (6, 1), (6, 2), (7, 1)]);
        let b = entries(&[(2, 1), (2, 3), (2, 4), (5, 2), (6, 3), (7, 0)]);

        let c = followed_by(a, &b);
        assert_eq!(c, entries(&[(2, 3), (5, 1), (6, 2)]));
    }

    #[test]
    fn followed_by_empty_sides() {
        let a = entries(&[(1, 0)]);
        assert!(followed_by(a.clone(), &[]).is_empty());
        assert!(followed_by(Vec::new(), &a).is_empty());
    }

    #[test]
    fn followed_by_no_adjacency() {
        let a = entries(&[(1, 0), (2, 5)]);
        let b = entries(&[(1, 2), (2, 5)]);
        assert!(followed_by(a, &b).is_empty());
    }

    #[test]
    fn union_merge_dedups() {
        let a = entries(&[(1, 0), (2, 0), (3, 0)]);
        let b = entries(&[(2, 0), (3, 0), (4, 0)]);

        let merged = union_merge(&[Cow::Owned(a), Cow::Owned(b)]);
        assert_eq!(merged, entries(&[(1, 0), (2, 0), (3, 0), (4, 0)]));
    }

    #[test]
    fn union_merge_single_list_is_identity() {
        let a = entries(&[(1, 0), (1, 3), (9, 2)]);
        assert_eq!(union_merge(&[Cow::Borrowed(a.as_slice())]), a);
    }

    #[test]
    fn union_merge_empty_inputs() {
        assert!(union_merge(&[]).is_empty());
        assert!(union_merge(&[Cow::Owned(Vec::new()), Cow::Owned(Vec::new())]).is_empty());
    }

    #[test]
    fn union_merge_mixed_ownership() {
        let a = entries(&[(1, 1), (4, 0)]);
        let b = entries(&[(2, 2)]);
        let merged = union_merge(&[Cow::Borrowed(a.as_slice()), Cow::Owned(b)]);
        assert_eq!(merged, entries(&[(1, 1), (2, 2), (4, 0)]));
    }

    #[test]
    fn sent_ids_projects_uniquely() {
        let list = entries(&[(2, 3), (2, 9), (5, 1), (6, 0), (6, 7)]);
        assert_eq!(sent_ids(&list), vec![2, 5, 6]);
        assert!(sent_ids(&[]).is_empty());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn sorted_entries() -> impl Strategy<Value = Vec<IndexEntry>> {
        proptest::collection::btree_set((0u32..50, 0u32..20), 0..40).prop_map(|set| {
            set.into_iter()
                .map(|(s, p)| IndexEntry::new(s, p))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_outputs_sorted_unique(
            a in sorted_entries(),
            b in sorted_entries(),
            c in sorted_entries(),
        ) {
            let joined = followed_by(a.clone(), &b);
            prop_assert!(joined.windows(2).all(|w| w[0] < w[1]));

            let merged = union_merge(&[
                Cow::Borrowed(a.as_slice()),
                Cow::Borrowed(b.as_slice()),
                Cow::Borrowed(c.as_slice()),
            ]);
            prop_assert!(merged.windows(2).all(|w| w[0] < w[1]));

            let ids = sent_ids(&merged);
            prop_assert!(ids.windows(2).all(|w| w[0] < w[1]));
        }

        #[test]
        fn prop_union_merge_order_independent(
            a in sorted_entries(),
            b in sorted_entries(),
            c in sorted_entries(),
        ) {
            let one = union_merge(&[
                Cow::Borrowed(a.as_slice()),
                Cow::Borrowed(b.as_slice()),
                Cow::Borrowed(c.as_slice()),
            ]);
            let two = union_merge(&[
                Cow::Borrowed(c.as_slice()),
                Cow::Borrowed(a.as_slice()),
                Cow::Borrowed(b.as_slice()),
            ]);
            prop_assert_eq!(one, two);
        }

        #[test]
        fn prop_followed_by_distributes_over_union(
            a in sorted_entries(),
            b in sorted_entries(),
            c in sorted_entries(),
        ) {
            let merged = union_merge(&[Cow::Borrowed(b.as_slice()), Cow::Borrowed(c.as_slice())]);
            let left = followed_by(a.clone(), &merged);

            let right = union_merge(&[
                Cow::Owned(followed_by(a.clone(), &b)),
                Cow::Owned(followed_by(a.clone(), &c)),
            ]);
            prop_assert_eq!(left, right);
        }

        #[test]
        fn prop_union_merge_singleton_is_dedup(a in sorted_entries()) {
            prop_assert_eq!(union_merge(&[Cow::Borrowed(a.as_slice())]), a);
        }
    }
}
