use std::sync::Arc;

use itertools::Itertools;

use crate::catalog::RelOptTable;
use crate::explain::RelWriter;
use crate::operator::OperatorTrait;
use crate::properties::RowType;
use crate::types::TypeFactory;

#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct TableScan {
    table: Arc<RelOptTable>,
}

impl TableScan {
    pub fn new(table: Arc<RelOptTable>) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &Arc<RelOptTable> {
        &self.table
    }
}

impl OperatorTrait for TableScan {
    fn explain_terms(&self, writer: &mut RelWriter) {
        writer.item(
            "table",
            format!("[{}]", self.table.qualified_name().iter().join(", ")),
        );
    }

    fn derive_row_type(&self, _type_factory: &TypeFactory, _inputs: &[&RowType]) -> RowType {
        self.table.row_type().clone()
    }

    fn validate(&self, _inputs: &[&RowType]) -> Result<(), String> {
        Ok(())
    }
}
