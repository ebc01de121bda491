//! Properties of relation operators.
//!
//! Logical properties ([`RowType`]) describe what a relation produces. Physical properties
//! describe how it is produced: its [`Convention`], [`RelCollation`] and [`RelDistribution`],
//! bundled in a [`TraitSet`]. A rel may join a subset only when its trait set satisfies the
//! subset's.

mod distribution;

use std::fmt::Debug;
use std::hash::Hash;

pub use distribution::*;
mod order;
pub use order::*;
mod logical;
pub use logical::*;
mod physical;
pub use physical::*;

/// A physical property with a partial order of strength.
pub trait PhysicalProp: Debug + Hash {
    /// Whether a relation with this property can be used where `other` is required, e.g. a
    /// collation on `[1, 2]` satisfies one on `[1]`.
    fn satisfies(&self, other: &Self) -> bool;
}
