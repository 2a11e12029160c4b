//! Sets of token types stored as sorted, disjoint, inclusive intervals.
//!
//! Follow sets and expected-token sets are usually a handful of dense runs of
//! token types, so intervals keep them small and make `contains` a binary
//! search.

use std::fmt;

use crate::token::{TokenType, EOF, EPSILON};
use crate::vocabulary::Vocabulary;

/// An inclusive range of token types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Interval {
    pub a: TokenType,
    pub b: TokenType,
}

impl Interval {
    pub fn new(a: TokenType, b: TokenType) -> Self {
        Interval { a, b }
    }

    pub fn len(&self) -> usize {
        if self.b < self.a {
            0
        } else {
            (self.b - self.a + 1) as usize
        }
    }

    pub fn is_empty(&self) -> bool {
        self.b < self.a
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct IntervalSet {
    intervals: Vec<Interval>,
}

impl IntervalSet {
    pub fn new() -> Self {
        IntervalSet { intervals: Vec::new() }
    }

    pub fn of(token_type: TokenType) -> Self {
        let mut set = IntervalSet::new();
        set.add(token_type);
        set
    }

    pub fn of_range(a: TokenType, b: TokenType) -> Self {
        let mut set = IntervalSet::new();
        set.add_range(a, b);
        set
    }

    pub fn add(&mut self, token_type: TokenType) {
        self.add_range(token_type, token_type);
    }

    /// Insert `[a, b]`, coalescing with overlapping or adjacent intervals.
    pub fn add_range(&mut self, a: TokenType, b: TokenType) {
        if b < a {
            return;
        }
        let mut merged = Interval::new(a, b);
        let mut out = Vec::with_capacity(self.intervals.len() + 1);
        let mut placed = false;
        for iv in self.intervals.drain(..) {
            if iv.b < merged.a.saturating_sub(1) {
                out.push(iv);
            } else if merged.b < iv.a.saturating_sub(1) {
                if !placed {
                    out.push(merged);
                    placed = true;
                }
                out.push(iv);
            } else {
                merged = Interval::new(merged.a.min(iv.a), merged.b.max(iv.b));
            }
        }
        if !placed {
            out.push(merged);
        }
        self.intervals = out;
    }

    pub fn add_all(&mut self, other: &IntervalSet) {
        for iv in &other.intervals {
            self.add_range(iv.a, iv.b);
        }
    }

    /// Union without mutating either operand.
    pub fn or(&self, other: &IntervalSet) -> IntervalSet {
        let mut result = self.clone();
        result.add_all(other);
        result
    }

    pub fn remove(&mut self, token_type: TokenType) {
        let mut out = Vec::with_capacity(self.intervals.len() + 1);
        for iv in self.intervals.drain(..) {
            if token_type < iv.a || token_type > iv.b {
                out.push(iv);
                continue;
            }
            if iv.a < token_type {
                out.push(Interval::new(iv.a, token_type - 1));
            }
            if token_type < iv.b {
                out.push(Interval::new(token_type + 1, iv.b));
            }
        }
        self.intervals = out;
    }

    /// Everything in `[min, max]` that is not in this set.
    pub fn complement(&self, min: TokenType, max: TokenType) -> IntervalSet {
        let mut result = IntervalSet::new();
        let mut next = min;
        for iv in &self.intervals {
            if iv.b < min || iv.a > max {
                continue;
            }
            if iv.a > next {
                result.add_range(next, iv.a - 1);
            }
            next = next.max(iv.b.saturating_add(1));
        }
        if next <= max {
            result.add_range(next, max);
        }
        result
    }

    pub fn contains(&self, token_type: TokenType) -> bool {
        self.intervals
            .binary_search_by(|iv| {
                if iv.b < token_type {
                    std::cmp::Ordering::Less
                } else if iv.a > token_type {
                    std::cmp::Ordering::Greater
                } else {
                    std::cmp::Ordering::Equal
                }
            })
            .is_ok()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Number of token types in the set.
    pub fn len(&self) -> usize {
        self.intervals.iter().map(Interval::len).sum()
    }

    pub fn min_element(&self) -> Option<TokenType> {
        self.intervals.first().map(|iv| iv.a)
    }

    pub fn intervals(&self) -> &[Interval] {
        &self.intervals
    }

    pub fn iter(&self) -> impl Iterator<Item = TokenType> + '_ {
        self.intervals.iter().flat_map(|iv| iv.a..=iv.b)
    }

    /// Render with vocabulary names, e.g. `{ID, INT}` or `']'`.
    pub fn to_string_with(&self, vocabulary: &Vocabulary) -> String {
        if self.intervals.is_empty() {
            return "{}".to_string();
        }
        let names: Vec<String> = self.iter().map(|t| element_name(vocabulary, t)).collect();
        if names.len() > 1 {
            format!("{{{}}}", names.join(", "))
        } else {
            names.join(", ")
        }
    }
}

fn element_name(vocabulary: &Vocabulary, token_type: TokenType) -> String {
    match token_type {
        EOF => "<EOF>".to_string(),
        EPSILON => "<EPSILON>".to_string(),
        t => vocabulary.display_name(t),
    }
}

impl fmt::Display for IntervalSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .intervals
            .iter()
            .map(|iv| {
                if iv.a == iv.b {
                    iv.a.to_string()
                } else {
                    format!("{}..{}", iv.a, iv.b)
                }
            })
            .collect();
        if self.len() > 1 {
            write!(f, "{{{}}}", parts.join(", "))
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}

impl FromIterator<TokenType> for IntervalSet {
    fn from_iter<I: IntoIterator<Item = TokenType>>(iter: I) -> Self {
        let mut set = IntervalSet::new();
        for t in iter {
            set.add(t);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_add_coalesces_adjacent() {
        let mut set = IntervalSet::new();
        set.add(3);
        set.add(5);
        set.add(4);
        assert_eq!(set.intervals(), &[Interval::new(3, 5)]);
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_remove_splits_interval() {
        let mut set = IntervalSet::of_range(1, 5);
        set.remove(3);
        assert_eq!(set.intervals(), &[Interval::new(1, 2), Interval::new(4, 5)]);
        assert!(!set.contains(3));
    }

    #[test]
    fn test_complement() {
        let set: IntervalSet = [2, 3, 7].into_iter().collect();
        let comp = set.complement(1, 8);
        assert_eq!(comp.iter().collect::<Vec<_>>(), vec![1, 4, 5, 6, 8]);
    }

    #[test]
    fn test_eof_and_epsilon_members() {
        let mut set = IntervalSet::of(EPSILON);
        set.add(EOF);
        set.add(4);
        assert!(set.contains(EPSILON));
        assert!(set.contains(EOF));
        set.remove(EPSILON);
        assert_eq!(set.min_element(), Some(EOF));
    }

    #[test]
    fn test_vocabulary_rendering() {
        let vocab = Vocabulary::from_pairs(&[(Some("']'"), None), (None, Some("ID")), (None, Some("INT"))]);
        let set: IntervalSet = [2, 3].into_iter().collect();
        assert_eq!(set.to_string_with(&vocab), "{ID, INT}");
        assert_eq!(IntervalSet::of(1).to_string_with(&vocab), "']'");
        assert_eq!(IntervalSet::of(EOF).to_string_with(&vocab), "<EOF>");
    }

    proptest! {
        #[test]
        fn prop_contains_matches_inserted(values in proptest::collection::vec(-2i32..40, 0..30)) {
            let set: IntervalSet = values.iter().copied().collect();
            for t in -2..40 {
                prop_assert_eq!(set.contains(t), values.contains(&t));
            }
            for pair in set.intervals().windows(2) {
                prop_assert!(pair[0].b + 1 < pair[1].a);
            }
        }
    }
}
