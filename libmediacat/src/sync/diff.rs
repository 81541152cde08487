//! Merge-join of two keyed sequences.

use std::cmp::Ordering;

/// Result of [`merge_join`].
#[derive(Debug, PartialEq, Eq)]
pub struct Diff<A, B> {
    /// Keys present only on the left (e.g. found on disk, not yet stored).
    pub only_left: Vec<A>,
    /// Keys present only on the right (e.g. stored, gone from disk).
    pub only_right: Vec<B>,
    pub both: Vec<(A, B)>,
}

impl<A, B> Default for Diff<A, B> {
    fn default() -> Self {
        Self {
            only_left: Vec::new(),
            only_right: Vec::new(),
            both: Vec::new(),
        }
    }
}

/// Sort both sides by key and walk them in lock-step.
///
/// Inputs are expected to be duplicate-free per side. Cost is
/// O(n log n + m log m) for the sorts plus one linear pass.
pub fn merge_join<A, B, K, FA, FB>(
    mut left: Vec<A>,
    mut right: Vec<B>,
    key_left: FA,
    key_right: FB,
) -> Diff<A, B>
where
    K: Ord + ?Sized,
    FA: Fn(&A) -> &K,
    FB: Fn(&B) -> &K,
{
    left.sort_by(|x, y| key_left(x).cmp(key_left(y)));
    right.sort_by(|x, y| key_right(x).cmp(key_right(y)));

    let mut diff = Diff {
        only_left: Vec::new(),
        only_right: Vec::new(),
        both: Vec::with_capacity(left.len().min(right.len())),
    };
    let mut l = left.into_iter().peekable();
    let mut r = right.into_iter().peekable();

    loop {
        let ord = match (l.peek(), r.peek()) {
            (Some(a), Some(b)) => key_left(a).cmp(key_right(b)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => break,
        };
        match ord {
            Ordering::Less => diff.only_left.extend(l.next()),
            Ordering::Greater => diff.only_right.extend(r.next()),
            Ordering::Equal => {
                if let (Some(a), Some(b)) = (l.next(), r.next()) {
                    diff.both.push((a, b));
                }
            }
        }
    }
    diff
}
