use std::fmt::{Display, Formatter};

use itertools::Itertools;

use crate::properties::PhysicalProp;

/// How rows of a relation are spread across the processes that produce it.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum RelDistribution {
    /// No requirement.
    Any,
    Singleton,
    /// Rows with equal values of the keys are in the same process.
    Hash(Vec<usize>),
    RoundRobin,
    Broadcast,
}

impl Default for RelDistribution {
    fn default() -> Self {
        RelDistribution::Any
    }
}

impl RelDistribution {
    pub fn keys(&self) -> &[usize] {
        match self {
            RelDistribution::Hash(keys) => keys,
            _ => &[],
        }
    }

    pub fn shift(&self, offset: isize) -> Self {
        match self {
            RelDistribution::Hash(keys) => RelDistribution::Hash(
                keys.iter()
                    .map(|k| (*k as isize + offset) as usize)
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

impl PhysicalProp for RelDistribution {
    fn satisfies(&self, other: &Self) -> bool {
        match (self, other) {
            (_, RelDistribution::Any) => true,
            (a, b) => a == b,
        }
    }
}

impl Display for RelDistribution {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RelDistribution::Any => write!(f, "any"),
            RelDistribution::Singleton => write!(f, "single"),
            RelDistribution::Hash(keys) => write!(f, "hash[{}]", keys.iter().join(", ")),
            RelDistribution::RoundRobin => write!(f, "rr"),
            RelDistribution::Broadcast => write!(f, "broadcast"),
        }
    }
}
