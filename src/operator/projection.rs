use itertools::Itertools;

use crate::explain::RelWriter;
use crate::operator::{validate_refs, OperatorTrait};
use crate::properties::{Field, RowType};
use crate::rex::{Op, RexNode};
use crate::types::TypeFactory;

/// Computes one output field per expression.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct Projection {
    exprs: Vec<RexNode>,
    names: Vec<String>,
}

impl Projection {
    /// Fields without a name are called `$f<index>`.
    pub fn new(exprs: Vec<RexNode>, names: Vec<String>) -> Self {
        let names = (0..exprs.len())
            .map(|i| names.get(i).cloned().unwrap_or_else(|| format!("$f{}", i)))
            .collect();
        Self { exprs, names }
    }

    pub fn exprs(&self) -> &[RexNode] {
        &self.exprs
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// For each output field that is a plain input reference, the input field it copies.
    pub fn mapping(&self) -> Vec<Option<usize>> {
        self.exprs.iter().map(RexNode::as_input_ref).collect()
    }
}

fn is_nullable(expr: &RexNode, input: &RowType) -> bool {
    match expr {
        RexNode::InputRef(r) => input.fields()[r.index()].nullable(),
        RexNode::Literal(v) => v.is_null(),
        RexNode::Call(c) if matches!(c.op(), Op::IsNull | Op::IsNotNull) => false,
        RexNode::Call(c) => c.operands().iter().any(|o| is_nullable(o, input)),
        RexNode::TableInputRef(_) => true,
    }
}

impl OperatorTrait for Projection {
    fn explain_terms(&self, writer: &mut RelWriter) {
        writer.item(
            "exprs",
            format!(
                "[{}]",
                self.exprs
                    .iter()
                    .zip(self.names.iter())
                    .map(|(e, n)| format!("{} AS {}", e, n))
                    .join(", ")
            ),
        );
    }

    fn derive_row_type(&self, _type_factory: &TypeFactory, inputs: &[&RowType]) -> RowType {
        RowType::new(
            self.exprs
                .iter()
                .zip(self.names.iter())
                .map(|(e, name)| {
                    let nullable = e
                        .input_refs()
                        .iter()
                        .all(|i| i < inputs[0].field_count())
                        && is_nullable(e, inputs[0]);
                    Field::new(name.clone(), e.data_type(), nullable)
                })
                .collect(),
        )
    }

    fn validate(&self, inputs: &[&RowType]) -> Result<(), String> {
        self.exprs
            .iter()
            .try_for_each(|e| validate_refs("expression", e, inputs[0]))
    }
}
