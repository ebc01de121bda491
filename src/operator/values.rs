use itertools::Itertools;

use crate::explain::RelWriter;
use crate::operator::OperatorTrait;
use crate::properties::RowType;
use crate::types::TypeFactory;
use crate::value::Value;

/// A relation of literal rows.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct Values {
    row_type: RowType,
    tuples: Vec<Vec<Value>>,
}

impl Values {
    pub fn new(row_type: RowType, tuples: Vec<Vec<Value>>) -> Self {
        Self { row_type, tuples }
    }

    pub fn tuples(&self) -> &[Vec<Value>] {
        &self.tuples
    }
}

impl OperatorTrait for Values {
    fn explain_terms(&self, writer: &mut RelWriter) {
        writer.item("type", format!("[{}]", self.row_type)).item(
            "tuples",
            format!(
                "[{}]",
                self.tuples
                    .iter()
                    .map(|t| format!("[{}]", t.iter().join(", ")))
                    .join(", ")
            ),
        );
    }

    fn derive_row_type(&self, _type_factory: &TypeFactory, _inputs: &[&RowType]) -> RowType {
        self.row_type.clone()
    }

    fn validate(&self, _inputs: &[&RowType]) -> Result<(), String> {
        match self
            .tuples
            .iter()
            .find(|t| t.len() != self.row_type.field_count())
        {
            Some(t) => Err(format!(
                "tuple of {} values in relation of {} fields",
                t.len(),
                self.row_type.field_count()
            )),
            None => Ok(()),
        }
    }
}
