use std::fmt::{Display, Formatter};
use std::sync::Arc;

use itertools::Itertools;

use crate::types::DataType;

#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct Field {
    name: String,
    data_type: DataType,
    nullable: bool,
}

impl Field {
    pub fn new<S: Into<String>>(name: S, data_type: DataType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn nullable(&self) -> bool {
        self.nullable
    }

    pub fn with_nullable(&self, nullable: bool) -> Self {
        Self {
            nullable,
            ..self.clone()
        }
    }

    pub fn with_name<S: Into<String>>(&self, name: S) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }
}

/// Output schema of a relational expression: an ordered list of named, typed fields.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct RowType {
    fields: Arc<[Field]>,
}

impl RowType {
    pub fn new(fields: Vec<Field>) -> Self {
        Self {
            fields: fields.into(),
        }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(Field::name).collect()
    }

    /// Same arity and field types. Field names and nullability are ignored.
    pub fn is_compatible(&self, other: &RowType) -> bool {
        self.field_count() == other.field_count()
            && self
                .fields
                .iter()
                .zip(other.fields.iter())
                .all(|(a, b)| a.data_type == b.data_type)
    }

    /// Finds a field by name under the given case sensitivity.
    pub fn field_index(&self, name: &str, case_sensitive: bool) -> Option<usize> {
        self.fields.iter().position(|f| {
            if case_sensitive {
                f.name == name
            } else {
                f.name.eq_ignore_ascii_case(name)
            }
        })
    }
}

impl Display for RowType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            self.fields
                .iter()
                .map(|field| format!(
                    "{} {}{}",
                    field.name,
                    field.data_type,
                    if field.nullable { "" } else { " NOT NULL" }
                ))
                .join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compatibility_ignores_names_and_nullability() {
        let a = RowType::new(vec![Field::new("x", DataType::Integer, false)]);
        let b = RowType::new(vec![Field::new("y", DataType::Integer, true)]);
        let c = RowType::new(vec![Field::new("x", DataType::Varchar, false)]);
        assert!(a.is_compatible(&b));
        assert!(!a.is_compatible(&c));
    }

    #[test]
    fn test_field_lookup() {
        let row_type = RowType::new(vec![
            Field::new("empno", DataType::Integer, false),
            Field::new("Name", DataType::Varchar, true),
        ]);
        assert_eq!(Some(1), row_type.field_index("Name", true));
        assert_eq!(None, row_type.field_index("name", true));
        assert_eq!(Some(1), row_type.field_index("name", false));
    }
}
