//! # Relation Sets
//!
//! `RelIds` is the identifier set every other component is built on: a base relation
//! is a singleton set, a join relation is the union of its inputs. Two relations are
//! "the same join relation" exactly when their sets are equal, so `RelIds` doubles as
//! the key of the per-run join relation cache.
//!
//! ## Representation
//!
//! A multi-word bitmap. The word vector is kept canonical (no trailing zero words),
//! which makes the derived `Eq` and `Hash` structural: equal sets always compare and
//! hash identically regardless of how they were produced. Overlap and subset tests are
//! word-wise and short-circuit, since the legality checker runs several of them for
//! every candidate pair.

use serde::{Deserialize, Serialize};
use std::fmt;

const WORD_BITS: usize = 64;

/// An immutable set of base-relation identifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "Vec<usize>", into = "Vec<usize>")]
pub struct RelIds {
    words: Vec<u64>,
}

impl RelIds {
    pub fn empty() -> Self {
        Self { words: Vec::new() }
    }

    pub fn singleton(id: usize) -> Self {
        let mut words = vec![0u64; id / WORD_BITS + 1];
        words[id / WORD_BITS] = 1u64 << (id % WORD_BITS);
        Self { words }
    }

    /// Return a copy of this set with `id` added.
    pub fn with(&self, id: usize) -> Self {
        self.union(&Self::singleton(id))
    }

    pub fn contains(&self, id: usize) -> bool {
        self.words
            .get(id / WORD_BITS)
            .is_some_and(|w| w & (1u64 << (id % WORD_BITS)) != 0)
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn union(&self, other: &Self) -> Self {
        let (long, short) = if self.words.len() >= other.words.len() {
            (self, other)
        } else {
            (other, self)
        };
        let mut words = long.words.clone();
        for (w, o) in words.iter_mut().zip(short.words.iter()) {
            *w |= o;
        }
        Self { words }
    }

    pub fn intersect(&self, other: &Self) -> Self {
        let words = self
            .words
            .iter()
            .zip(other.words.iter())
            .map(|(a, b)| a & b)
            .collect();
        Self::canonical(words)
    }

    pub fn difference(&self, other: &Self) -> Self {
        let words = self
            .words
            .iter()
            .enumerate()
            .map(|(i, a)| a & !other.words.get(i).copied().unwrap_or(0))
            .collect();
        Self::canonical(words)
    }

    /// True if every member of `self` is also a member of `other`.
    /// The empty set is a subset of everything.
    pub fn is_subset_of(&self, other: &Self) -> bool {
        if self.words.len() > other.words.len() {
            return false;
        }
        self.words
            .iter()
            .zip(other.words.iter())
            .all(|(a, b)| a & !b == 0)
    }

    /// True if the sets share at least one member.
    pub fn overlaps(&self, other: &Self) -> bool {
        self.words
            .iter()
            .zip(other.words.iter())
            .any(|(a, b)| a & b != 0)
    }

    /// The only member of a one-element set, or `None` for any other cardinality.
    pub fn singleton_member(&self) -> Option<usize> {
        let mut found = None;
        for (i, w) in self.words.iter().enumerate() {
            if *w == 0 {
                continue;
            }
            if found.is_some() || w.count_ones() != 1 {
                return None;
            }
            found = Some(i * WORD_BITS + w.trailing_zeros() as usize);
        }
        found
    }

    /// Iterate members in ascending order.
    pub fn iter(&self) -> RelIdsIter<'_> {
        RelIdsIter {
            words: &self.words,
            index: 0,
            current: self.words.first().copied().unwrap_or(0),
        }
    }

    fn canonical(mut words: Vec<u64>) -> Self {
        while words.last() == Some(&0) {
            words.pop();
        }
        Self { words }
    }
}

/// Ascending iterator over the members of a `RelIds`.
pub struct RelIdsIter<'a> {
    words: &'a [u64],
    index: usize,
    current: u64,
}

impl Iterator for RelIdsIter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        loop {
            if self.current != 0 {
                let bit = self.current.trailing_zeros() as usize;
                self.current &= self.current - 1;
                return Some(self.index * WORD_BITS + bit);
            }
            self.index += 1;
            self.current = *self.words.get(self.index)?;
        }
    }
}

impl FromIterator<usize> for RelIds {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let mut words: Vec<u64> = Vec::new();
        for id in iter {
            let word = id / WORD_BITS;
            if words.len() <= word {
                words.resize(word + 1, 0);
            }
            words[word] |= 1u64 << (id % WORD_BITS);
        }
        Self::canonical(words)
    }
}

impl From<Vec<usize>> for RelIds {
    fn from(ids: Vec<usize>) -> Self {
        ids.into_iter().collect()
    }
}

impl From<RelIds> for Vec<usize> {
    fn from(set: RelIds) -> Self {
        set.iter().collect()
    }
}

impl fmt::Display for RelIds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, id) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{id}")?;
        }
        write!(f, "}}")
    }
}
