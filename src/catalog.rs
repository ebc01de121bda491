//! Tables known to a planning session.

use std::fmt::{Debug, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use anyhow::bail;

use crate::bitset::ImmutableBitSet;
use crate::error::{OptError, OptResult};
use crate::properties::{RelCollation, RowType};
use crate::value::Row;

/// Source of a table's rows, read only by the interpreter.
pub trait ScannableTable: Send + Sync {
    fn scan(&self) -> OptResult<Vec<Row>>;
}

/// A table whose rows are held in memory.
#[derive(Clone, Debug, Default)]
pub struct MemoryTable {
    rows: Vec<Row>,
}

impl MemoryTable {
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows }
    }
}

impl ScannableTable for MemoryTable {
    fn scan(&self) -> OptResult<Vec<Row>> {
        Ok(self.rows.clone())
    }
}

/// A table as seen by the planner.
///
/// Two tables are equal when their qualified names are.
pub struct RelOptTable {
    qualified_name: Vec<String>,
    row_type: RowType,
    row_count: f64,
    collations: Vec<RelCollation>,
    keys: Vec<ImmutableBitSet>,
    source: Option<Arc<dyn ScannableTable>>,
}

impl RelOptTable {
    pub fn new<S: Into<String>>(qualified_name: Vec<S>, row_type: RowType) -> Self {
        Self {
            qualified_name: qualified_name.into_iter().map(Into::into).collect(),
            row_type,
            row_count: 100.0,
            collations: vec![],
            keys: vec![],
            source: None,
        }
    }

    pub fn with_row_count(mut self, row_count: f64) -> Self {
        self.row_count = row_count;
        self
    }

    pub fn with_collations(mut self, collations: Vec<RelCollation>) -> Self {
        self.collations = collations;
        self
    }

    pub fn with_keys(mut self, keys: Vec<ImmutableBitSet>) -> Self {
        self.keys = keys;
        self
    }

    /// Attaches rows. The row count estimate becomes the number of rows.
    pub fn with_rows(mut self, rows: Vec<Row>) -> Self {
        self.row_count = rows.len() as f64;
        self.source = Some(Arc::new(MemoryTable::new(rows)));
        self
    }

    pub fn with_source(mut self, source: Arc<dyn ScannableTable>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn qualified_name(&self) -> &[String] {
        &self.qualified_name
    }

    pub fn row_type(&self) -> &RowType {
        &self.row_type
    }

    pub fn row_count(&self) -> f64 {
        self.row_count
    }

    pub fn collations(&self) -> &[RelCollation] {
        &self.collations
    }

    pub fn keys(&self) -> &[ImmutableBitSet] {
        &self.keys
    }

    /// Whether some declared key is a subset of `columns`.
    pub fn is_key(&self, columns: &ImmutableBitSet) -> bool {
        self.keys.iter().any(|key| columns.contains(key))
    }

    pub fn scan(&self) -> OptResult<Vec<Row>> {
        match &self.source {
            Some(source) => source.scan(),
            None => bail!(OptError::Unsupported(format!(
                "table {} has no row source",
                self.qualified_name.join(".")
            ))),
        }
    }

    fn matches(&self, names: &[&str], case_sensitive: bool) -> bool {
        self.qualified_name.len() == names.len()
            && self.qualified_name.iter().zip(names).all(|(a, b)| {
                if case_sensitive {
                    a == b
                } else {
                    a.eq_ignore_ascii_case(b)
                }
            })
    }
}

impl PartialEq for RelOptTable {
    fn eq(&self, other: &Self) -> bool {
        self.qualified_name == other.qualified_name
    }
}

impl Eq for RelOptTable {}

impl Hash for RelOptTable {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.qualified_name.hash(state);
    }
}

impl Debug for RelOptTable {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelOptTable")
            .field("qualified_name", &self.qualified_name)
            .field("row_type", &self.row_type)
            .field("row_count", &self.row_count)
            .finish()
    }
}

/// Tables of a session, looked up by qualified name.
#[derive(Debug, Default)]
pub struct Catalog {
    tables: Vec<Arc<RelOptTable>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_table(&mut self, table: RelOptTable) -> Arc<RelOptTable> {
        let table = Arc::new(table);
        self.tables.retain(|t| t.qualified_name != table.qualified_name);
        self.tables.push(table.clone());
        table
    }

    pub fn tables(&self) -> &[Arc<RelOptTable>] {
        &self.tables
    }

    /// Finds a table by qualified name under the given name matching policy.
    pub fn table(&self, names: &[&str], case_sensitive: bool) -> OptResult<Arc<RelOptTable>> {
        match self
            .tables
            .iter()
            .find(|t| t.matches(names, case_sensitive))
        {
            Some(table) => Ok(table.clone()),
            None => bail!(OptError::UnknownTable(names.join("."))),
        }
    }
}
