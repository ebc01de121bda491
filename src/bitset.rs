use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

use itertools::Itertools;

/// An immutable set of column ordinals, iterated in ascending order.
#[derive(Clone, Debug, Default, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct ImmutableBitSet {
    bits: BTreeSet<usize>,
}

impl ImmutableBitSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn of<I: IntoIterator<Item = usize>>(bits: I) -> Self {
        Self {
            bits: bits.into_iter().collect(),
        }
    }

    /// Bits `[start, end)`.
    pub fn range(start: usize, end: usize) -> Self {
        Self::of(start..end)
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    pub fn cardinality(&self) -> usize {
        self.bits.len()
    }

    pub fn get(&self, bit: usize) -> bool {
        self.bits.contains(&bit)
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.bits.iter().copied()
    }

    /// The `n`-th smallest bit.
    pub fn nth(&self, n: usize) -> Option<usize> {
        self.bits.iter().nth(n).copied()
    }

    /// Position of `bit` among the set bits.
    pub fn index_of(&self, bit: usize) -> Option<usize> {
        self.bits.iter().position(|b| *b == bit)
    }

    pub fn intersects(&self, other: &ImmutableBitSet) -> bool {
        self.bits.intersection(&other.bits).next().is_some()
    }

    pub fn contains(&self, other: &ImmutableBitSet) -> bool {
        other.bits.is_subset(&self.bits)
    }

    pub fn union(&self, other: &ImmutableBitSet) -> ImmutableBitSet {
        Self {
            bits: self.bits.union(&other.bits).copied().collect(),
        }
    }

    pub fn set(&self, bit: usize) -> ImmutableBitSet {
        let mut bits = self.bits.clone();
        bits.insert(bit);
        Self { bits }
    }

    pub fn shift(&self, offset: isize) -> ImmutableBitSet {
        Self::of(self.bits.iter().map(|b| (*b as isize + offset) as usize))
    }
}

impl FromIterator<usize> for ImmutableBitSet {
    fn from_iter<T: IntoIterator<Item = usize>>(iter: T) -> Self {
        Self::of(iter)
    }
}

impl Display for ImmutableBitSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{{}}}", self.bits.iter().join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nth_and_index_of() {
        let bits = ImmutableBitSet::of(vec![5, 1, 3]);
        assert_eq!(Some(3), bits.nth(1));
        assert_eq!(Some(2), bits.index_of(5));
        assert_eq!(None, bits.index_of(2));
        assert_eq!("{1, 3, 5}", bits.to_string());
    }

    #[test]
    fn test_set_ops() {
        let a = ImmutableBitSet::range(0, 3);
        let b = ImmutableBitSet::of(vec![2, 4]);
        assert!(a.intersects(&b));
        assert!(!a.contains(&b));
        assert!(a.union(&b).contains(&b));
        assert_eq!(ImmutableBitSet::of(vec![4, 6]), b.shift(2));
    }
}
