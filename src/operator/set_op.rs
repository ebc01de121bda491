use crate::explain::RelWriter;
use crate::operator::OperatorTrait;
use crate::properties::RowType;
use crate::types::TypeFactory;

/// Attributes of union, intersect and minus.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct SetOp {
    all: bool,
}

impl SetOp {
    pub fn new(all: bool) -> Self {
        Self { all }
    }

    /// Whether duplicates are kept.
    pub fn all(&self) -> bool {
        self.all
    }
}

impl OperatorTrait for SetOp {
    fn explain_terms(&self, writer: &mut RelWriter) {
        writer.item("all", self.all);
    }

    fn derive_row_type(&self, type_factory: &TypeFactory, inputs: &[&RowType]) -> RowType {
        let row_types: Vec<RowType> = inputs.iter().map(|r| (*r).clone()).collect();
        type_factory
            .least_restrictive(&row_types)
            .unwrap_or_else(|| inputs[0].clone())
    }

    fn validate(&self, inputs: &[&RowType]) -> Result<(), String> {
        if inputs.len() < 2 {
            return Err(format!("set operation needs 2 or more inputs, got {}", inputs.len()));
        }
        let row_types: Vec<RowType> = inputs.iter().map(|r| (*r).clone()).collect();
        match TypeFactory::new().least_restrictive(&row_types) {
            Some(_) => Ok(()),
            None => Err("inputs have incompatible row types".to_string()),
        }
    }
}
