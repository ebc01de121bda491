use crate::explain::RelWriter;
use crate::operator::{validate_refs, OperatorTrait};
use crate::properties::RowType;
use crate::rex::RexNode;
use crate::types::{DataType, TypeFactory};

/// Keeps the rows for which `condition` is true.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct Filter {
    condition: RexNode,
}

impl Filter {
    pub fn new(condition: RexNode) -> Self {
        Self { condition }
    }

    pub fn condition(&self) -> &RexNode {
        &self.condition
    }
}

impl OperatorTrait for Filter {
    fn explain_terms(&self, writer: &mut RelWriter) {
        writer.item("condition", &self.condition);
    }

    fn derive_row_type(&self, _type_factory: &TypeFactory, inputs: &[&RowType]) -> RowType {
        inputs[0].clone()
    }

    fn validate(&self, inputs: &[&RowType]) -> Result<(), String> {
        if !matches!(
            self.condition.data_type(),
            DataType::Boolean | DataType::Null
        ) {
            return Err(format!(
                "condition {} has type {}",
                self.condition,
                self.condition.data_type()
            ));
        }
        validate_refs("condition", &self.condition, inputs[0])
    }
}
