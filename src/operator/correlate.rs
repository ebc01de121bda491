use strum_macros::Display;

use crate::bitset::ImmutableBitSet;
use crate::explain::RelWriter;
use crate::operator::OperatorTrait;
use crate::properties::RowType;
use crate::types::TypeFactory;

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Display)]
#[strum(serialize_all = "lowercase")]
pub enum SemiJoinType {
    Inner,
    Left,
    Semi,
    Anti,
}

impl SemiJoinType {
    /// Whether right fields appear in the output.
    pub fn projects_right(&self) -> bool {
        matches!(self, SemiJoinType::Inner | SemiJoinType::Left)
    }
}

/// Evaluates the right input once per left row, binding the left columns in `required_columns`.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct Correlate {
    correlation_id: usize,
    required_columns: ImmutableBitSet,
    join_type: SemiJoinType,
}

impl Correlate {
    pub fn new(
        correlation_id: usize,
        required_columns: ImmutableBitSet,
        join_type: SemiJoinType,
    ) -> Self {
        Self {
            correlation_id,
            required_columns,
            join_type,
        }
    }

    pub fn correlation_id(&self) -> usize {
        self.correlation_id
    }

    pub fn required_columns(&self) -> &ImmutableBitSet {
        &self.required_columns
    }

    pub fn join_type(&self) -> SemiJoinType {
        self.join_type
    }
}

impl OperatorTrait for Correlate {
    fn explain_terms(&self, writer: &mut RelWriter) {
        writer
            .item("correlation", format!("$cor{}", self.correlation_id))
            .item("joinType", self.join_type)
            .item("requiredColumns", &self.required_columns);
    }

    fn derive_row_type(&self, type_factory: &TypeFactory, inputs: &[&RowType]) -> RowType {
        if self.join_type.projects_right() {
            type_factory.join_row_type(
                inputs[0],
                inputs[1],
                false,
                self.join_type == SemiJoinType::Left,
            )
        } else {
            inputs[0].clone()
        }
    }

    fn validate(&self, inputs: &[&RowType]) -> Result<(), String> {
        match self
            .required_columns
            .iter()
            .find(|c| *c >= inputs[0].field_count())
        {
            Some(c) => Err(format!("required column {} is not a left field", c)),
            None => Ok(()),
        }
    }
}
