//! Row expressions: the scalar language used by filters, projections and join conditions.

mod eval;
mod monotonicity;
mod util;

use std::fmt::{Display, Formatter};

use enumset::{enum_set, EnumSet, EnumSetType};
use itertools::Itertools;
use strum_macros::Display;

use crate::properties::RowType;
use crate::types::DataType;
use crate::value::Value;

pub use monotonicity::*;
pub use util::{compose_conjunction, is_identity, split_filters};

/// Scalar operators.
#[derive(Debug, Hash, PartialOrd, Ord, EnumSetType, Display)]
pub enum Op {
    #[strum(serialize = "AND")]
    And,
    #[strum(serialize = "OR")]
    Or,
    #[strum(serialize = "NOT")]
    Not,
    #[strum(serialize = "=")]
    Equals,
    #[strum(serialize = "<>")]
    NotEquals,
    #[strum(serialize = "<")]
    LessThan,
    #[strum(serialize = "<=")]
    LessThanOrEqual,
    #[strum(serialize = ">")]
    GreaterThan,
    #[strum(serialize = ">=")]
    GreaterThanOrEqual,
    #[strum(serialize = "IS NULL")]
    IsNull,
    #[strum(serialize = "IS NOT NULL")]
    IsNotNull,
    #[strum(serialize = "+")]
    Plus,
    #[strum(serialize = "-")]
    Minus,
    #[strum(serialize = "*")]
    Times,
    #[strum(serialize = "/")]
    Divide,
    #[strum(serialize = "-/1")]
    UnaryMinus,
    #[strum(serialize = "FLOOR")]
    Floor,
    #[strum(serialize = "CEIL")]
    Ceil,
    #[strum(serialize = "CAST")]
    Cast,
}

pub const COMPARISON: EnumSet<Op> = enum_set!(
    Op::Equals
        | Op::NotEquals
        | Op::LessThan
        | Op::LessThanOrEqual
        | Op::GreaterThan
        | Op::GreaterThanOrEqual
);

pub const ARITHMETIC: EnumSet<Op> = enum_set!(Op::Plus | Op::Minus | Op::Times | Op::Divide);

const BOOLEAN_RESULT: EnumSet<Op> = enum_set!(
    Op::And
        | Op::Or
        | Op::Not
        | Op::Equals
        | Op::NotEquals
        | Op::LessThan
        | Op::LessThanOrEqual
        | Op::GreaterThan
        | Op::GreaterThanOrEqual
        | Op::IsNull
        | Op::IsNotNull
);

impl Op {
    pub fn is_comparison(&self) -> bool {
        COMPARISON.contains(*self)
    }

    /// The operator `op'` such that `a op b` is equivalent to `b op' a`.
    pub fn reverse(&self) -> Op {
        match self {
            Op::LessThan => Op::GreaterThan,
            Op::LessThanOrEqual => Op::GreaterThanOrEqual,
            Op::GreaterThan => Op::LessThan,
            Op::GreaterThanOrEqual => Op::LessThanOrEqual,
            op => *op,
        }
    }
}

/// Identifies one use of a table in a plan. `entity_number` distinguishes repeated uses of the
/// same table, starting at zero.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct RelTableRef {
    qualified_name: Vec<String>,
    entity_number: usize,
}

impl RelTableRef {
    pub fn new(qualified_name: Vec<String>, entity_number: usize) -> Self {
        Self {
            qualified_name,
            entity_number,
        }
    }

    pub fn qualified_name(&self) -> &[String] {
        &self.qualified_name
    }

    pub fn entity_number(&self) -> usize {
        self.entity_number
    }
}

impl Display for RelTableRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}].#{}",
            self.qualified_name.join(", "),
            self.entity_number
        )
    }
}

#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct RexInputRef {
    index: usize,
    data_type: DataType,
}

impl RexInputRef {
    pub fn new(index: usize, data_type: DataType) -> Self {
        Self { index, data_type }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }
}

#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct RexCall {
    op: Op,
    operands: Vec<RexNode>,
    data_type: DataType,
}

impl RexCall {
    pub fn op(&self) -> Op {
        self.op
    }

    pub fn operands(&self) -> &[RexNode] {
        &self.operands
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn is_operand_literal(&self, idx: usize) -> bool {
        matches!(self.operands.get(idx), Some(RexNode::Literal(_)))
    }
}

/// Reference to a column of a specific table use, produced by expression lineage.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct RexTableInputRef {
    table_ref: RelTableRef,
    index: usize,
    data_type: DataType,
}

impl RexTableInputRef {
    pub fn new(table_ref: RelTableRef, index: usize, data_type: DataType) -> Self {
        Self {
            table_ref,
            index,
            data_type,
        }
    }

    pub fn table_ref(&self) -> &RelTableRef {
        &self.table_ref
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum RexNode {
    InputRef(RexInputRef),
    Literal(Value),
    Call(RexCall),
    TableInputRef(RexTableInputRef),
}

impl RexNode {
    /// Reference to field `index` of `row_type`.
    pub fn input_ref(index: usize, row_type: &RowType) -> RexNode {
        RexNode::InputRef(RexInputRef::new(
            index,
            row_type.fields()[index].data_type(),
        ))
    }

    pub fn literal<V: Into<Value>>(value: V) -> RexNode {
        RexNode::Literal(value.into())
    }

    pub fn bool_literal(value: bool) -> RexNode {
        RexNode::Literal(Value::Boolean(value))
    }

    /// Creates a call, deriving its return type from the operator and the operands.
    pub fn call(op: Op, operands: Vec<RexNode>) -> RexNode {
        let data_type = if BOOLEAN_RESULT.contains(op) {
            DataType::Boolean
        } else if ARITHMETIC.contains(op) {
            operands
                .iter()
                .map(RexNode::data_type)
                .fold(Some(DataType::Null), |acc, t| {
                    acc.and_then(|acc| acc.least_restrictive(&t))
                })
                .unwrap_or(DataType::Double)
        } else {
            operands
                .first()
                .map(RexNode::data_type)
                .unwrap_or(DataType::Null)
        };
        RexNode::Call(RexCall {
            op,
            operands,
            data_type,
        })
    }

    pub fn cast(operand: RexNode, data_type: DataType) -> RexNode {
        RexNode::Call(RexCall {
            op: Op::Cast,
            operands: vec![operand],
            data_type,
        })
    }

    pub fn and(self, other: RexNode) -> RexNode {
        RexNode::call(Op::And, vec![self, other])
    }

    pub fn or(self, other: RexNode) -> RexNode {
        RexNode::call(Op::Or, vec![self, other])
    }

    pub fn eq(self, other: RexNode) -> RexNode {
        RexNode::call(Op::Equals, vec![self, other])
    }

    pub fn lt(self, other: RexNode) -> RexNode {
        RexNode::call(Op::LessThan, vec![self, other])
    }

    pub fn gt(self, other: RexNode) -> RexNode {
        RexNode::call(Op::GreaterThan, vec![self, other])
    }

    pub fn plus(self, other: RexNode) -> RexNode {
        RexNode::call(Op::Plus, vec![self, other])
    }

    pub fn is_not_null(self) -> RexNode {
        RexNode::call(Op::IsNotNull, vec![self])
    }

    pub fn data_type(&self) -> DataType {
        match self {
            RexNode::InputRef(r) => r.data_type,
            RexNode::Literal(v) => v.data_type(),
            RexNode::Call(c) => c.data_type,
            RexNode::TableInputRef(r) => r.data_type,
        }
    }

    pub fn as_input_ref(&self) -> Option<usize> {
        match self {
            RexNode::InputRef(r) => Some(r.index),
            _ => None,
        }
    }

    pub fn as_call(&self) -> Option<&RexCall> {
        match self {
            RexNode::Call(c) => Some(c),
            _ => None,
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, RexNode::Literal(_))
    }

    pub fn is_always_true(&self) -> bool {
        matches!(self, RexNode::Literal(Value::Boolean(true)))
    }

    pub fn is_always_false(&self) -> bool {
        matches!(self, RexNode::Literal(Value::Boolean(false)))
    }

    /// Whether the value does not depend on the input row.
    pub fn is_constant(&self) -> bool {
        match self {
            RexNode::Literal(_) => true,
            RexNode::Call(c) => c.operands.iter().all(RexNode::is_constant),
            _ => false,
        }
    }
}

impl Display for RexNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RexNode::InputRef(r) => write!(f, "${}", r.index),
            RexNode::Literal(v) => write!(f, "{}", v),
            RexNode::Call(c) if c.op == Op::Cast => {
                write!(f, "CAST({}):{}", c.operands.iter().join(", "), c.data_type)
            }
            RexNode::Call(c) => write!(f, "{}({})", c.op, c.operands.iter().join(", ")),
            RexNode::TableInputRef(r) => write!(f, "{}.${}", r.table_ref, r.index),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_types() {
        let int = RexNode::InputRef(RexInputRef::new(0, DataType::Integer));
        let dbl = RexNode::literal(1.5);
        assert_eq!(DataType::Double, int.clone().plus(dbl).data_type());
        assert_eq!(DataType::Boolean, int.clone().eq(RexNode::literal(1)).data_type());
        assert_eq!(
            DataType::Integer,
            RexNode::call(Op::Floor, vec![int]).data_type()
        );
    }

    #[test]
    fn test_display() {
        let e = RexNode::InputRef(RexInputRef::new(1, DataType::Integer))
            .gt(RexNode::literal(10))
            .and(RexNode::literal("x").eq(RexNode::literal("y")));
        assert_eq!("AND(>($1, 10), =('x', 'y'))", e.to_string());
    }

    #[test]
    fn test_comparison_set() {
        assert!(Op::LessThan.is_comparison());
        assert!(!Op::Plus.is_comparison());
        assert_eq!(Op::GreaterThan, Op::LessThan.reverse());
    }
}
