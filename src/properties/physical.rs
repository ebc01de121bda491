use std::fmt::{Display, Formatter};

use strum_macros::Display;

use crate::properties::{PhysicalProp, RelCollation, RelDistribution};

/// Calling convention of a relational expression.
///
/// Logical expressions have convention `None` and cannot be executed; the interpreter runs
/// `Enumerable` expressions.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Display)]
pub enum Convention {
    #[strum(serialize = "NONE")]
    None,
    #[strum(serialize = "ENUMERABLE")]
    Enumerable,
}

impl PhysicalProp for Convention {
    fn satisfies(&self, other: &Self) -> bool {
        self == other
    }
}

/// The physical traits of a relational expression.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct TraitSet {
    convention: Convention,
    collation: RelCollation,
    distribution: RelDistribution,
}

impl TraitSet {
    pub fn new(convention: Convention) -> Self {
        Self {
            convention,
            collation: RelCollation::empty(),
            distribution: RelDistribution::Any,
        }
    }

    pub fn logical() -> Self {
        Self::new(Convention::None)
    }

    pub fn enumerable() -> Self {
        Self::new(Convention::Enumerable)
    }

    pub fn convention(&self) -> Convention {
        self.convention
    }

    pub fn collation(&self) -> &RelCollation {
        &self.collation
    }

    pub fn distribution(&self) -> &RelDistribution {
        &self.distribution
    }

    pub fn with_convention(&self, convention: Convention) -> Self {
        Self {
            convention,
            ..self.clone()
        }
    }

    pub fn with_collation(&self, collation: RelCollation) -> Self {
        Self {
            collation,
            ..self.clone()
        }
    }

    pub fn with_distribution(&self, distribution: RelDistribution) -> Self {
        Self {
            distribution,
            ..self.clone()
        }
    }
}

impl PhysicalProp for TraitSet {
    fn satisfies(&self, other: &Self) -> bool {
        self.convention.satisfies(&other.convention)
            && self.collation.satisfies(&other.collation)
            && self.distribution.satisfies(&other.distribution)
    }
}

/// Rendered as `convention.collation.distribution`, which is how traits appear in digests.
impl Display for TraitSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{}.{}",
            self.convention, self.collation, self.distribution
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trait_set_satisfies() {
        let sorted = TraitSet::enumerable().with_collation(RelCollation::of_keys(vec![0, 1]));
        assert!(sorted.satisfies(&TraitSet::enumerable()));
        assert!(!sorted.satisfies(&TraitSet::logical()));
        assert!(!TraitSet::enumerable().satisfies(&sorted));
        assert_eq!("ENUMERABLE.[0, 1].any", sorted.to_string());
    }
}
