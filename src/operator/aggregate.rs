use std::fmt::{Display, Formatter};

use itertools::Itertools;
use strum_macros::Display;

use crate::bitset::ImmutableBitSet;
use crate::explain::RelWriter;
use crate::operator::OperatorTrait;
use crate::properties::{Field, RowType};
use crate::types::{DataType, TypeFactory};

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum AggFunction {
    Count,
    Sum,
    /// `SUM` that is 0 instead of null when there is nothing to add.
    Sum0,
    Min,
    Max,
}

impl AggFunction {
    /// Function that combines partial results of this function, as when rolling up a
    /// pre-aggregated table to coarser groups.
    pub fn roll_up(&self) -> AggFunction {
        match self {
            AggFunction::Count | AggFunction::Sum0 => AggFunction::Sum0,
            AggFunction::Sum => AggFunction::Sum,
            AggFunction::Min => AggFunction::Min,
            AggFunction::Max => AggFunction::Max,
        }
    }
}

/// One aggregate function applied to input fields. `COUNT` without arguments counts rows.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct AggregateCall {
    function: AggFunction,
    args: Vec<usize>,
    name: String,
}

impl AggregateCall {
    pub fn new<S: Into<String>>(function: AggFunction, args: Vec<usize>, name: S) -> Self {
        Self {
            function,
            args,
            name: name.into(),
        }
    }

    pub fn function(&self) -> AggFunction {
        self.function
    }

    pub fn args(&self) -> &[usize] {
        &self.args
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn with_args(&self, args: Vec<usize>) -> Self {
        Self {
            args,
            ..self.clone()
        }
    }

    fn field(&self, input: &RowType) -> Field {
        match self.function {
            AggFunction::Count => Field::new(self.name.clone(), DataType::BigInt, false),
            function => {
                let data_type = self
                    .args
                    .first()
                    .and_then(|a| input.fields().get(*a))
                    .map(Field::data_type)
                    .unwrap_or(DataType::Null);
                Field::new(self.name.clone(), data_type, function != AggFunction::Sum0)
            }
        }
    }
}

impl Display for AggregateCall {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}({})",
            self.function,
            self.args.iter().map(|a| format!("${}", a)).join(", ")
        )
    }
}

/// Groups input rows by `group_set`, outputting the group fields followed by one field per call.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct Aggregate {
    group_set: ImmutableBitSet,
    agg_calls: Vec<AggregateCall>,
}

impl Aggregate {
    pub fn new(group_set: ImmutableBitSet, agg_calls: Vec<AggregateCall>) -> Self {
        Self {
            group_set,
            agg_calls,
        }
    }

    pub fn group_set(&self) -> &ImmutableBitSet {
        &self.group_set
    }

    pub fn group_count(&self) -> usize {
        self.group_set.cardinality()
    }

    pub fn agg_calls(&self) -> &[AggregateCall] {
        &self.agg_calls
    }
}

impl OperatorTrait for Aggregate {
    fn explain_terms(&self, writer: &mut RelWriter) {
        writer.item("group", &self.group_set);
        for call in &self.agg_calls {
            writer.item(call.name(), call);
        }
    }

    fn derive_row_type(&self, _type_factory: &TypeFactory, inputs: &[&RowType]) -> RowType {
        let input = inputs[0];
        RowType::new(
            self.group_set
                .iter()
                .filter_map(|g| input.fields().get(g).cloned())
                .chain(self.agg_calls.iter().map(|c| c.field(input)))
                .collect(),
        )
    }

    fn validate(&self, inputs: &[&RowType]) -> Result<(), String> {
        let count = inputs[0].field_count();
        if let Some(g) = self.group_set.iter().find(|g| *g >= count) {
            return Err(format!("group column {} is not an input field", g));
        }
        for call in &self.agg_calls {
            if call.args.iter().any(|a| *a >= count) {
                return Err(format!("call {} references a missing input field", call));
            }
            if call.function != AggFunction::Count && call.args.len() != 1 {
                return Err(format!("call {} takes exactly one argument", call));
            }
        }
        Ok(())
    }
}
