//! Growable bit-vector keyed by capability ordinal.

use std::fmt;

use serde::{Deserialize, Serialize};

const WORD_BITS: usize = u64::BITS as usize;

/// Word-addressed bit storage that grows on demand.
///
/// Bits beyond the current storage read as unset, so two sets holding the
/// same bits compare equal regardless of how many trailing zero words either
/// one carries.
#[derive(Clone, Serialize, Deserialize)]
pub struct BitSet {
    words: Vec<u64>,
}

impl BitSet {
    /// Creates an empty set with one backing word.
    pub fn new() -> Self {
        Self { words: vec![0] }
    }

    #[inline]
    fn locate(index: usize) -> (usize, u64) {
        (index / WORD_BITS, 1u64 << (index % WORD_BITS))
    }

    /// Sets the bit at `index`, growing storage as needed.
    pub fn set_bit(&mut self, index: usize) {
        let (word, mask) = Self::locate(index);
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= mask;
    }

    /// Clears the bit at `index`. Out-of-range indices are ignored.
    pub fn clear_bit(&mut self, index: usize) {
        let (word, mask) = Self::locate(index);
        if let Some(w) = self.words.get_mut(word) {
            *w &= !mask;
        }
    }

    /// Returns whether the bit at `index` is set.
    pub fn is_set(&self, index: usize) -> bool {
        let (word, mask) = Self::locate(index);
        self.words.get(word).is_some_and(|w| w & mask != 0)
    }

    /// Sets every bit of the currently allocated words.
    pub fn set_all(&mut self) {
        self.words.fill(u64::MAX);
    }

    /// Clears every bit and shrinks storage back to one word.
    pub fn clear_all(&mut self) {
        self.words.clear();
        self.words.push(0);
    }

    /// True iff every bit set in `self` is also set in `other`.
    pub fn is_subset_of(&self, other: &BitSet) -> bool {
        let overlap = self.words.len().min(other.words.len());
        let prefix_ok = self.words[..overlap]
            .iter()
            .zip(&other.words[..overlap])
            .all(|(mine, theirs)| mine & theirs == *mine);

        prefix_ok && self.words[overlap..].iter().all(|w| *w == 0)
    }

    /// Number of set bits.
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    /// Iterates over set bit indices in ascending order.
    pub fn set_bits(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(i, &word)| {
            (0..WORD_BITS)
                .filter(move |b| word & (1u64 << b) != 0)
                .map(move |b| i * WORD_BITS + b)
        })
    }

    /// Number of backing words currently allocated.
    pub fn word_len(&self) -> usize {
        self.words.len()
    }

    fn significant_words(&self) -> &[u64] {
        let len = self
            .words
            .iter()
            .rposition(|w| *w != 0)
            .map_or(0, |i| i + 1);
        &self.words[..len]
    }
}

impl Default for BitSet {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for BitSet {
    fn eq(&self, other: &Self) -> bool {
        self.significant_words() == other.significant_words()
    }
}

impl Eq for BitSet {}

impl FromIterator<usize> for BitSet {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let mut set = Self::new();
        for index in iter {
            set.set_bit(index);
        }
        set
    }
}

impl Extend<usize> for BitSet {
    fn extend<I: IntoIterator<Item = usize>>(&mut self, iter: I) {
        for index in iter {
            self.set_bit(index);
        }
    }
}

/// Binary rendering, most significant word first.
impl fmt::Display for BitSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for word in self.words.iter().rev() {
            write!(f, "{word:064b}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for BitSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.set_bits()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::*;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_set_and_clear_grow_storage() {
        let mut set = BitSet::new();
        assert_eq!(set.word_len(), 1);

        set.set_bit(130);
        assert_eq!(set.word_len(), 3);
        assert!(set.is_set(130));
        assert!(!set.is_set(129));

        set.clear_bit(130);
        assert!(!set.is_set(130));

        // Clearing beyond storage is a no-op
        set.clear_bit(10_000);
        assert_eq!(set.word_len(), 3);
        assert!(!set.is_set(10_000));
    }

    #[test]
    fn test_subset_basic() {
        let small: BitSet = [1, 5].into_iter().collect();
        let big: BitSet = [1, 5, 9].into_iter().collect();

        assert!(small.is_subset_of(&big));
        assert!(!big.is_subset_of(&small));
        assert!(BitSet::new().is_subset_of(&small));
    }

    #[test]
    fn test_subset_checks_every_extra_word() {
        // Four words in `a`, one in `b`; only the last extra word is dirty.
        let mut a = BitSet::new();
        a.set_bit(3);
        a.set_bit(3 * 64 + 1);
        let b: BitSet = [3].into_iter().collect();

        assert!(!a.is_subset_of(&b));

        a.clear_bit(3 * 64 + 1);
        assert!(a.is_subset_of(&b));
    }

    #[test]
    fn test_subset_matches_set_inclusion_on_random_pairs() {
        let mut rng = ChaCha8Rng::seed_from_u64(12345);

        for _ in 0..500 {
            let x_bits: Vec<usize> = (0..rng.random_range(0..12))
                .map(|_| rng.random_range(0..300))
                .collect();
            let mut y_bits: Vec<usize> = (0..rng.random_range(0..12))
                .map(|_| rng.random_range(0..300))
                .collect();
            // Bias towards inclusion so both outcomes are exercised
            if rng.random_bool(0.5) {
                y_bits.extend(&x_bits);
            }

            let x: BitSet = x_bits.iter().copied().collect();
            let y: BitSet = y_bits.iter().copied().collect();

            let expected = x_bits.iter().all(|b| y_bits.contains(b));
            assert_eq!(x.is_subset_of(&y), expected, "x={x:?} y={y:?}");
        }
    }

    #[test]
    fn test_equality_ignores_trailing_zero_words() {
        let mut a: BitSet = [2].into_iter().collect();
        a.set_bit(200);
        a.clear_bit(200);
        let b: BitSet = [2].into_iter().collect();

        assert_eq!(a, b);
    }

    #[test]
    fn test_set_bits_ascending() {
        let set: BitSet = [70, 3, 64, 0].into_iter().collect();
        let bits: Vec<usize> = set.set_bits().collect();
        assert_eq!(bits, vec![0, 3, 64, 70]);
        assert_eq!(set.count(), 4);
    }

    #[test]
    fn test_set_all_and_clear_all() {
        let mut set: BitSet = [65].into_iter().collect();
        set.set_all();
        assert_eq!(set.count(), 128);

        set.clear_all();
        assert!(set.is_empty());
        assert_eq!(set.word_len(), 1);
    }

    #[test]
    fn test_display_binary() {
        let set: BitSet = [0, 2].into_iter().collect();
        let rendered = set.to_string();
        assert_eq!(rendered.len(), 64);
        assert!(rendered.ends_with("101"));
    }
}
