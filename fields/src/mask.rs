//! Field masks: bitsets over the positions of an entity's fields.

use serde::{Deserialize, Serialize};
use std::fmt;

const WORD_BITS: usize = 64;

/// A set of field positions within one entity type.
///
/// Trailing zero words are never stored, so two masks holding the same
/// positions compare equal regardless of how they were built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldMask {
    words: Vec<u64>,
}

impl FieldMask {
    /// An empty mask
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field position
    pub fn insert(&mut self, index: usize) {
        let word = index / WORD_BITS;
        if self.words.len() <= word {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1 << (index % WORD_BITS);
    }

    /// Check whether a field position is in the mask
    pub fn contains(&self, index: usize) -> bool {
        self.words
            .get(index / WORD_BITS)
            .map_or(false, |w| w & (1 << (index % WORD_BITS)) != 0)
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Number of field positions in the mask
    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Add every position of `other` to this mask
    pub fn union_with(&mut self, other: &FieldMask) {
        if self.words.len() < other.words.len() {
            self.words.resize(other.words.len(), 0);
        }
        for (mine, theirs) in self.words.iter_mut().zip(&other.words) {
            *mine |= theirs;
        }
    }

    /// Union of two masks
    pub fn union(&self, other: &FieldMask) -> FieldMask {
        let mut merged = self.clone();
        merged.union_with(other);
        merged
    }

    /// Iterate over the positions in ascending order
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(w, bits)| {
            (0..WORD_BITS)
                .filter(move |&b| bits & (1 << b) != 0)
                .map(move |b| w * WORD_BITS + b)
        })
    }
}

impl FromIterator<usize> for FieldMask {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let mut mask = FieldMask::new();
        for index in iter {
            mask.insert(index);
        }
        mask
    }
}

impl fmt::Display for FieldMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let positions: Vec<String> = self.iter().map(|i| i.to_string()).collect();
        write!(f, "{{{}}}", positions.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_contains() {
        let mut mask = FieldMask::new();
        assert!(mask.is_empty());
        mask.insert(3);
        mask.insert(70);
        assert!(mask.contains(3));
        assert!(mask.contains(70));
        assert!(!mask.contains(4));
        assert!(!mask.contains(500));
        assert_eq!(mask.len(), 2);
    }

    #[test]
    fn test_union() {
        let a: FieldMask = [1, 2].into_iter().collect();
        let b: FieldMask = [2, 65].into_iter().collect();
        let merged = a.union(&b);
        assert_eq!(merged.iter().collect::<Vec<_>>(), vec![1, 2, 65]);
        assert_eq!(merged, b.union(&a));
    }

    #[test]
    fn test_equality_ignores_build_order() {
        let a: FieldMask = [65, 1].into_iter().collect();
        let mut b = FieldMask::new();
        b.union_with(&[1].into_iter().collect());
        b.insert(65);
        assert_eq!(a, b);
    }

    #[test]
    fn test_display() {
        let mask: FieldMask = [0, 2].into_iter().collect();
        assert_eq!(mask.to_string(), "{0,2}");
    }
}
