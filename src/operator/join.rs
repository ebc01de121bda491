use strum_macros::Display;

use crate::explain::RelWriter;
use crate::operator::{validate_refs, OperatorTrait};
use crate::properties::RowType;
use crate::rex::{compose_conjunction, RexNode};
use crate::types::TypeFactory;

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Display)]
#[strum(serialize_all = "lowercase")]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
}

impl JoinType {
    /// Whether unmatched left rows are padded with nulls on the right.
    pub fn generates_nulls_on_right(&self) -> bool {
        matches!(self, JoinType::Left | JoinType::Full)
    }

    pub fn generates_nulls_on_left(&self) -> bool {
        matches!(self, JoinType::Right | JoinType::Full)
    }
}

/// Join operator, shared by the logical join and every physical join algorithm.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct Join {
    join_type: JoinType,
    condition: RexNode,
}

impl Join {
    pub fn new(join_type: JoinType, condition: RexNode) -> Self {
        Self {
            join_type,
            condition,
        }
    }

    pub fn join_type(&self) -> JoinType {
        self.join_type
    }

    pub fn condition(&self) -> &RexNode {
        &self.condition
    }

    pub fn join_info(&self, left_count: usize) -> JoinInfo {
        JoinInfo::of(&self.condition, left_count)
    }
}

impl OperatorTrait for Join {
    fn explain_terms(&self, writer: &mut RelWriter) {
        writer
            .item("condition", &self.condition)
            .item("joinType", self.join_type);
    }

    fn derive_row_type(&self, type_factory: &TypeFactory, inputs: &[&RowType]) -> RowType {
        type_factory.join_row_type(
            inputs[0],
            inputs[1],
            self.join_type.generates_nulls_on_left(),
            self.join_type.generates_nulls_on_right(),
        )
    }

    fn validate(&self, inputs: &[&RowType]) -> Result<(), String> {
        let row_type = TypeFactory::new().join_row_type(inputs[0], inputs[1], false, false);
        validate_refs("condition", &self.condition, &row_type)
    }
}

/// A join condition split into equi-join keys and the remaining conjuncts.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct JoinInfo {
    left_keys: Vec<usize>,
    right_keys: Vec<usize>,
    non_equi: Vec<RexNode>,
}

impl JoinInfo {
    /// Right keys are relative to the right input.
    pub fn of(condition: &RexNode, left_count: usize) -> Self {
        let mut info = JoinInfo {
            left_keys: vec![],
            right_keys: vec![],
            non_equi: vec![],
        };
        for conjunct in condition.conjunctions() {
            match conjunct.as_column_equality() {
                Some((a, b)) if a < left_count && b >= left_count => {
                    info.left_keys.push(a);
                    info.right_keys.push(b - left_count);
                }
                Some((a, b)) if b < left_count && a >= left_count => {
                    info.left_keys.push(b);
                    info.right_keys.push(a - left_count);
                }
                _ => info.non_equi.push(conjunct),
            }
        }
        info
    }

    pub fn left_keys(&self) -> &[usize] {
        &self.left_keys
    }

    pub fn right_keys(&self) -> &[usize] {
        &self.right_keys
    }

    pub fn is_equi(&self) -> bool {
        self.non_equi.is_empty()
    }

    /// Conjuncts other than key equalities, `None` if there are none.
    pub fn remaining(&self) -> Option<RexNode> {
        compose_conjunction(self.non_equi.clone(), true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rex::RexInputRef;
    use crate::types::DataType;

    fn col(i: usize) -> RexNode {
        RexNode::InputRef(RexInputRef::new(i, DataType::Integer))
    }

    #[test]
    fn test_join_info_splits_keys() {
        let condition = col(4)
            .eq(col(1))
            .and(col(0).eq(col(3)))
            .and(col(2).gt(RexNode::literal(1)));
        let info = JoinInfo::of(&condition, 3);
        assert_eq!(&[1, 0], info.left_keys());
        assert_eq!(&[1, 0], info.right_keys());
        assert!(!info.is_equi());
        assert_eq!(">($2, 1)", info.remaining().unwrap().to_string());
    }

    #[test]
    fn test_outer_join_nullability() {
        let factory = TypeFactory::new();
        let left = factory.create_struct_type(vec![("a", DataType::Integer, false)]);
        let right = factory.create_struct_type(vec![("b", DataType::Integer, false)]);
        let join = Join::new(JoinType::Left, col(0).eq(col(1)));
        let row_type = join.derive_row_type(&factory, &[&left, &right]);
        assert!(!row_type.fields()[0].nullable());
        assert!(row_type.fields()[1].nullable());
    }
}
