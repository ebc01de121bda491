use std::cmp::Ordering;
use std::fmt::{Display, Formatter};

use itertools::Itertools;
use strum_macros::Display;

use crate::bitset::ImmutableBitSet;
use crate::properties::PhysicalProp;
use crate::rex::Monotonicity;
use crate::value::Row;

/// Direction in which a field is ordered.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Display)]
pub enum Direction {
    #[strum(serialize = "ASC")]
    Ascending,
    #[strum(serialize = "SASC")]
    StrictlyAscending,
    #[strum(serialize = "DESC")]
    Descending,
    #[strum(serialize = "SDESC")]
    StrictlyDescending,
    /// Equal values are adjacent but no order is implied.
    #[strum(serialize = "CLU")]
    Clustered,
}

impl Direction {
    pub fn is_descending(&self) -> bool {
        matches!(self, Direction::Descending | Direction::StrictlyDescending)
    }

    pub fn reverse(&self) -> Direction {
        match self {
            Direction::Ascending => Direction::Descending,
            Direction::StrictlyAscending => Direction::StrictlyDescending,
            Direction::Descending => Direction::Ascending,
            Direction::StrictlyDescending => Direction::StrictlyAscending,
            Direction::Clustered => Direction::Clustered,
        }
    }

    pub fn default_null_direction(&self) -> NullDirection {
        if self.is_descending() {
            NullDirection::First
        } else {
            NullDirection::Last
        }
    }

    pub fn monotonicity(&self) -> Monotonicity {
        match self {
            Direction::Ascending => Monotonicity::Increasing,
            Direction::StrictlyAscending => Monotonicity::StrictlyIncreasing,
            Direction::Descending => Monotonicity::Decreasing,
            Direction::StrictlyDescending => Monotonicity::StrictlyDecreasing,
            Direction::Clustered => Monotonicity::NotMonotonic,
        }
    }

    /// Direction a field sorted by an expression of the given monotonicity is known to have.
    pub fn of_monotonicity(monotonicity: Monotonicity) -> Option<Direction> {
        match monotonicity {
            Monotonicity::StrictlyIncreasing => Some(Direction::StrictlyAscending),
            Monotonicity::Increasing => Some(Direction::Ascending),
            Monotonicity::StrictlyDecreasing => Some(Direction::StrictlyDescending),
            Monotonicity::Decreasing => Some(Direction::Descending),
            Monotonicity::Constant | Monotonicity::NotMonotonic => None,
        }
    }
}

/// Where nulls sort relative to non-null values.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Display)]
pub enum NullDirection {
    #[strum(serialize = "FIRST")]
    First,
    #[strum(serialize = "LAST")]
    Last,
    #[strum(serialize = "UNSPECIFIED")]
    Unspecified,
}

impl NullDirection {
    /// Sign of a null compared against a non-null value in ascending order.
    pub fn null_comparison(&self) -> i32 {
        match self {
            NullDirection::First => -1,
            NullDirection::Last | NullDirection::Unspecified => 1,
        }
    }
}

/// Ordering of one field.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct RelFieldCollation {
    field_index: usize,
    direction: Direction,
    null_direction: NullDirection,
}

impl RelFieldCollation {
    /// Ascending, nulls last.
    pub fn new(field_index: usize) -> Self {
        Self::with_direction(field_index, Direction::Ascending)
    }

    pub fn with_direction(field_index: usize, direction: Direction) -> Self {
        Self::of(field_index, direction, direction.default_null_direction())
    }

    pub fn of(field_index: usize, direction: Direction, null_direction: NullDirection) -> Self {
        Self {
            field_index,
            direction,
            null_direction,
        }
    }

    pub fn field_index(&self) -> usize {
        self.field_index
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn null_direction(&self) -> NullDirection {
        self.null_direction
    }

    pub fn with_field_index(&self, field_index: usize) -> Self {
        Self {
            field_index,
            ..*self
        }
    }

    pub fn shift(&self, offset: isize) -> Self {
        self.with_field_index((self.field_index as isize + offset) as usize)
    }

    /// Compares two rows on this field.
    ///
    /// Descending order swaps the operands and negates the null comparison, so nulls first or
    /// last means the same position in the output either way.
    pub fn compare(&self, a: &Row, b: &Row) -> Ordering {
        let null_comparison = self.null_direction.null_comparison();
        let (x, y) = (a.get(self.field_index), b.get(self.field_index));
        if self.direction.is_descending() {
            y.compare_nulls(x, -null_comparison)
        } else {
            x.compare_nulls(y, null_comparison)
        }
    }
}

impl Display for RelFieldCollation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.direction == Direction::Ascending && self.null_direction == NullDirection::Last {
            return write!(f, "{}", self.field_index);
        }
        write!(f, "{} {}", self.field_index, self.direction)?;
        if self.null_direction != self.direction.default_null_direction() {
            write!(f, " {}", self.null_direction)?;
        }
        Ok(())
    }
}

/// A sort order over the fields of a row. An empty collation means unordered.
#[derive(Clone, Debug, Default, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct RelCollation {
    field_collations: Vec<RelFieldCollation>,
}

impl RelCollation {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn of(field_collations: Vec<RelFieldCollation>) -> Self {
        Self { field_collations }
    }

    /// Ascending order on each of `keys` in turn.
    pub fn of_keys<I: IntoIterator<Item = usize>>(keys: I) -> Self {
        Self::of(keys.into_iter().map(RelFieldCollation::new).collect())
    }

    pub fn field_collations(&self) -> &[RelFieldCollation] {
        &self.field_collations
    }

    pub fn is_empty(&self) -> bool {
        self.field_collations.is_empty()
    }

    pub fn keys(&self) -> Vec<usize> {
        self.field_collations
            .iter()
            .map(RelFieldCollation::field_index)
            .collect()
    }

    pub fn shift(&self, offset: isize) -> Self {
        Self::of(
            self.field_collations
                .iter()
                .map(|fc| fc.shift(offset))
                .collect(),
        )
    }

    /// Whether the leading fields of this collation are exactly `keys`, in any order.
    pub fn contains(&self, keys: &ImmutableBitSet) -> bool {
        let n = keys.cardinality();
        n <= self.field_collations.len()
            && ImmutableBitSet::of(self.keys().into_iter().take(n)) == *keys
    }

    /// Concatenation of this collation followed by `other`.
    pub fn concat(&self, other: &RelCollation) -> Self {
        Self::of(
            self.field_collations
                .iter()
                .chain(other.field_collations.iter())
                .copied()
                .collect(),
        )
    }

    /// Lexicographic comparison of two rows on every field of the collation.
    pub fn compare(&self, a: &Row, b: &Row) -> Ordering {
        self.field_collations
            .iter()
            .map(|fc| fc.compare(a, b))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    }
}

impl PhysicalProp for RelCollation {
    /// A collation satisfies any of its prefixes.
    fn satisfies(&self, other: &Self) -> bool {
        other.field_collations.len() <= self.field_collations.len()
            && self
                .field_collations
                .iter()
                .zip(other.field_collations.iter())
                .all(|(a, b)| a == b)
    }
}

impl Display for RelCollation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.field_collations.iter().join(", "))
    }
}
