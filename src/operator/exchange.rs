use crate::explain::RelWriter;
use crate::operator::OperatorTrait;
use crate::properties::{RelCollation, RelDistribution, RowType};
use crate::types::TypeFactory;

/// Redistributes rows without changing them.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct Exchange {
    distribution: RelDistribution,
}

impl Exchange {
    pub fn new(distribution: RelDistribution) -> Self {
        Self { distribution }
    }

    pub fn distribution(&self) -> &RelDistribution {
        &self.distribution
    }
}

fn validate_keys(keys: &[usize], input: &RowType) -> Result<(), String> {
    match keys.iter().find(|k| **k >= input.field_count()) {
        Some(k) => Err(format!("key {} is not an input field", k)),
        None => Ok(()),
    }
}

impl OperatorTrait for Exchange {
    fn explain_terms(&self, writer: &mut RelWriter) {
        writer.item("distribution", &self.distribution);
    }

    fn derive_row_type(&self, _type_factory: &TypeFactory, inputs: &[&RowType]) -> RowType {
        inputs[0].clone()
    }

    fn validate(&self, inputs: &[&RowType]) -> Result<(), String> {
        validate_keys(self.distribution.keys(), inputs[0])
    }
}

/// Redistributes rows and sorts each target's stream by `collation`.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct SortExchange {
    distribution: RelDistribution,
    collation: RelCollation,
}

impl SortExchange {
    pub fn new(distribution: RelDistribution, collation: RelCollation) -> Self {
        Self {
            distribution,
            collation,
        }
    }

    pub fn distribution(&self) -> &RelDistribution {
        &self.distribution
    }

    pub fn collation(&self) -> &RelCollation {
        &self.collation
    }
}

impl OperatorTrait for SortExchange {
    fn explain_terms(&self, writer: &mut RelWriter) {
        writer
            .item("distribution", &self.distribution)
            .item("collation", &self.collation);
    }

    fn derive_row_type(&self, _type_factory: &TypeFactory, inputs: &[&RowType]) -> RowType {
        inputs[0].clone()
    }

    fn validate(&self, inputs: &[&RowType]) -> Result<(), String> {
        validate_keys(self.distribution.keys(), inputs[0])?;
        validate_keys(&self.collation.keys(), inputs[0])
    }
}
