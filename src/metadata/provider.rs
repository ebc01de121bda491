use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::bitset::ImmutableBitSet;
use crate::metadata::{collation, distinct_row_count, lineage, row_count, MdResult, RelMetadataQuery};
use crate::operator::RelKind;
use crate::plan::RelNode;
use crate::properties::RelCollation;
use crate::rex::{RelTableRef, RexNode};

pub type RowCountHandler = fn(&RelNode, &mut RelMetadataQuery<'_>) -> MdResult<f64>;

pub type CollationsHandler = fn(&RelNode, &mut RelMetadataQuery<'_>) -> MdResult<Vec<RelCollation>>;

pub type DistinctRowCountHandler = fn(
    &RelNode,
    &mut RelMetadataQuery<'_>,
    &ImmutableBitSet,
    Option<&RexNode>,
) -> MdResult<Option<f64>>;

pub type ExpressionLineageHandler =
    fn(&RelNode, &mut RelMetadataQuery<'_>, &RexNode) -> MdResult<Option<BTreeSet<RexNode>>>;

pub type TableReferencesHandler =
    fn(&RelNode, &mut RelMetadataQuery<'_>) -> MdResult<Option<BTreeSet<RelTableRef>>>;

/// Handlers of one metadata kind, keyed by node kind.
#[derive(Clone)]
pub struct MetadataHandlers<H> {
    handlers: HashMap<RelKind, H>,
    fallback: H,
}

impl<H: Copy> MetadataHandlers<H> {
    pub fn new(fallback: H) -> Self {
        Self {
            handlers: HashMap::new(),
            fallback,
        }
    }

    /// Registers `handler` for `kind` and every kind below it that has no handler of its own.
    pub fn register(&mut self, kind: RelKind, handler: H) -> &mut Self {
        self.handlers.insert(kind, handler);
        self
    }

    /// Handler of the nearest kind in `kind`'s ancestry, else the catch-all.
    pub fn handler(&self, kind: RelKind) -> H {
        kind.ancestors()
            .find_map(|k| self.handlers.get(&k).copied())
            .unwrap_or(self.fallback)
    }
}

/// Table of metadata handlers used by a cluster.
///
/// Start from [`RelMetadataProvider::builtin`] and register handlers to support new node kinds
/// or override builtin ones.
#[derive(Clone)]
pub struct RelMetadataProvider {
    pub row_count: MetadataHandlers<RowCountHandler>,
    pub collations: MetadataHandlers<CollationsHandler>,
    pub distinct_row_count: MetadataHandlers<DistinctRowCountHandler>,
    pub expression_lineage: MetadataHandlers<ExpressionLineageHandler>,
    pub table_references: MetadataHandlers<TableReferencesHandler>,
}

impl RelMetadataProvider {
    pub fn builtin() -> Self {
        Self {
            row_count: row_count::handlers(),
            collations: collation::handlers(),
            distinct_row_count: distinct_row_count::handlers(),
            expression_lineage: lineage::lineage_handlers(),
            table_references: lineage::table_references_handlers(),
        }
    }
}

lazy_static! {
    pub static ref DEFAULT_METADATA_PROVIDER: Arc<RelMetadataProvider> =
        Arc::new(RelMetadataProvider::builtin());
}
