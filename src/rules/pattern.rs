use crate::operator::LogicalOperator::*;
use crate::operator::Operator;

pub type PatternPredicate = fn(&Operator) -> bool;

#[derive(Clone, Debug)]
pub enum PatternChildrenPredicate {
    /// Inputs are not checked.
    MatchedRecursive,
    /// One pattern per input.
    Predicate(Vec<Pattern>),
    /// The node has no inputs.
    None,
}

/// Shape of plan a rule applies to.
#[derive(Clone, Debug)]
pub struct Pattern {
    pub predicate: PatternPredicate,
    pub children: PatternChildrenPredicate,
}

impl Pattern {
    pub fn new(predicate: PatternPredicate) -> Self {
        Self {
            predicate,
            children: PatternChildrenPredicate::MatchedRecursive,
        }
    }

    pub fn with_inputs(predicate: PatternPredicate, inputs: Vec<Pattern>) -> Self {
        Self {
            predicate,
            children: PatternChildrenPredicate::Predicate(inputs),
        }
    }

    pub fn leaf(predicate: PatternPredicate) -> Self {
        Self {
            predicate,
            children: PatternChildrenPredicate::None,
        }
    }
}

pub fn any_operator(_: &Operator) -> bool {
    true
}

pub fn is_logical_filter(op: &Operator) -> bool {
    matches!(op, Operator::Logical(LogicalFilter(_)))
}

pub fn is_logical_projection(op: &Operator) -> bool {
    matches!(op, Operator::Logical(LogicalProjection(_)))
}

pub fn is_logical_join(op: &Operator) -> bool {
    matches!(op, Operator::Logical(LogicalJoin(_)))
}
