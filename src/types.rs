//! Scalar types and the session type factory.

use serde::{Deserialize, Serialize};
use strum_macros::Display;

use crate::properties::{Field, RowType};

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Display, Serialize, Deserialize)]
#[strum(serialize_all = "UPPERCASE")]
pub enum DataType {
    Boolean,
    Integer,
    BigInt,
    Double,
    Varchar,
    /// Type of an untyped null literal.
    Null,
}

impl DataType {
    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Integer | DataType::BigInt | DataType::Double)
    }

    /// Narrowest type both sides can be widened to, if any.
    pub fn least_restrictive(&self, other: &DataType) -> Option<DataType> {
        use DataType::*;
        match (self, other) {
            (a, b) if a == b => Some(*a),
            (Null, t) | (t, Null) => Some(*t),
            (Double, t) | (t, Double) if t.is_numeric() => Some(Double),
            (BigInt, t) | (t, BigInt) if t.is_numeric() => Some(BigInt),
            _ => None,
        }
    }
}

/// Creates row types. One factory is shared by every node in a planning session.
#[derive(Clone, Debug, Default)]
pub struct TypeFactory;

impl TypeFactory {
    pub fn new() -> Self {
        Self
    }

    pub fn create_struct_type<I, S>(&self, fields: I) -> RowType
    where
        I: IntoIterator<Item = (S, DataType, bool)>,
        S: Into<String>,
    {
        RowType::new(
            fields
                .into_iter()
                .map(|(name, data_type, nullable)| Field::new(name, data_type, nullable))
                .collect(),
        )
    }

    /// Concatenates the fields of a join's inputs, making the null generating sides nullable.
    pub fn join_row_type(
        &self,
        left: &RowType,
        right: &RowType,
        left_nullable: bool,
        right_nullable: bool,
    ) -> RowType {
        let fields = left
            .fields()
            .iter()
            .map(|f| f.with_nullable(f.nullable() || left_nullable))
            .chain(
                right
                    .fields()
                    .iter()
                    .map(|f| f.with_nullable(f.nullable() || right_nullable)),
            )
            .collect();
        RowType::new(fields)
    }

    /// Row type of a set operation: field names of the first input, widened types of all inputs.
    pub fn least_restrictive(&self, row_types: &[RowType]) -> Option<RowType> {
        let (first, rest) = row_types.split_first()?;
        let mut fields: Vec<Field> = first.fields().to_vec();
        for row_type in rest {
            if row_type.field_count() != fields.len() {
                return None;
            }
            for (field, other) in fields.iter_mut().zip(row_type.fields()) {
                let data_type = field.data_type().least_restrictive(&other.data_type())?;
                *field = Field::new(
                    field.name(),
                    data_type,
                    field.nullable() || other.nullable(),
                );
            }
        }
        Some(RowType::new(fields))
    }
}
