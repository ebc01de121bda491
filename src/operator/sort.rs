use crate::explain::RelWriter;
use crate::operator::OperatorTrait;
use crate::properties::{RelCollation, RowType};
use crate::types::TypeFactory;

/// Orders rows by `collation`, then skips `offset` rows and returns at most `fetch` rows.
///
/// An empty collation only applies the offset and fetch.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct Sort {
    collation: RelCollation,
    offset: usize,
    fetch: Option<usize>,
}

impl Sort {
    pub fn new(collation: RelCollation) -> Self {
        Self {
            collation,
            offset: 0,
            fetch: None,
        }
    }

    pub fn with_limit(collation: RelCollation, offset: usize, fetch: Option<usize>) -> Self {
        Self {
            collation,
            offset,
            fetch,
        }
    }

    pub fn collation(&self) -> &RelCollation {
        &self.collation
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn fetch(&self) -> Option<usize> {
        self.fetch
    }
}

impl OperatorTrait for Sort {
    fn explain_terms(&self, writer: &mut RelWriter) {
        writer
            .item("collation", &self.collation)
            .item_if("offset", self.offset, self.offset > 0);
        if let Some(fetch) = self.fetch {
            writer.item("fetch", fetch);
        }
    }

    fn derive_row_type(&self, _type_factory: &TypeFactory, inputs: &[&RowType]) -> RowType {
        inputs[0].clone()
    }

    fn validate(&self, inputs: &[&RowType]) -> Result<(), String> {
        match self
            .collation
            .keys()
            .into_iter()
            .find(|k| *k >= inputs[0].field_count())
        {
            Some(k) => Err(format!("sort key {} is not an input field", k)),
            None => Ok(()),
        }
    }
}
