//! Metadata queries over relational expressions.
//!
//! A [`RelMetadataQuery`] answers questions such as row count or collations of a node by
//! dispatching to a handler registered for the node's kind in a [`RelMetadataProvider`], falling
//! back through the kind's ancestors to a catch-all handler. Results are cached for the lifetime
//! of the query object. A computation that needs its own result before finishing fails with
//! [`CyclicMetadataError`] instead of recursing forever.

mod collation;
mod distinct_row_count;
mod lineage;
mod provider;
mod row_count;
mod util;

use std::collections::{BTreeSet, HashMap};

use enum_as_inner::EnumAsInner;
use thiserror::Error;

use crate::bitset::ImmutableBitSet;
use crate::plan::{RelCluster, RelId};
use crate::properties::RelCollation;
use crate::rex::{RelTableRef, RexNode};

pub use lineage::create_all_possible_expressions;
pub use provider::*;
pub use util::*;

/// A metadata computation reached itself before completing.
///
/// Only code that iterates over alternative representations of one node should catch this, and
/// it should skip the alternative that failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cyclic metadata: {kind} of {rel}")]
pub struct CyclicMetadataError {
    rel: RelId,
    kind: &'static str,
}

impl CyclicMetadataError {
    pub fn rel(&self) -> RelId {
        self.rel
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }
}

pub type MdResult<T> = Result<T, CyclicMetadataError>;

#[derive(Clone, Debug, Hash, Eq, PartialEq)]
enum MetadataKey {
    RowCount(RelId),
    Collations(RelId),
    DistinctRowCount(RelId, ImmutableBitSet, Option<RexNode>),
    ExpressionLineage(RelId, RexNode),
    TableReferences(RelId),
}

impl MetadataKey {
    fn rel(&self) -> RelId {
        match self {
            MetadataKey::RowCount(rel)
            | MetadataKey::Collations(rel)
            | MetadataKey::DistinctRowCount(rel, ..)
            | MetadataKey::ExpressionLineage(rel, _)
            | MetadataKey::TableReferences(rel) => *rel,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            MetadataKey::RowCount(_) => "row count",
            MetadataKey::Collations(_) => "collations",
            MetadataKey::DistinctRowCount(..) => "distinct row count",
            MetadataKey::ExpressionLineage(..) => "expression lineage",
            MetadataKey::TableReferences(_) => "table references",
        }
    }
}

#[derive(Clone, Debug, EnumAsInner)]
enum MetadataValue {
    RowCount(f64),
    Collations(Vec<RelCollation>),
    DistinctRowCount(Option<f64>),
    ExpressionLineage(Option<BTreeSet<RexNode>>),
    TableReferences(Option<BTreeSet<RelTableRef>>),
}

enum CacheEntry {
    InProgress,
    Done(MetadataValue),
}

/// Entry point for metadata questions during one planning pass.
///
/// Not to be shared between passes: cached results are never invalidated.
pub struct RelMetadataQuery<'a> {
    cluster: &'a RelCluster,
    cache: HashMap<MetadataKey, CacheEntry>,
}

impl<'a> RelMetadataQuery<'a> {
    pub fn new(cluster: &'a RelCluster) -> Self {
        Self {
            cluster,
            cache: HashMap::new(),
        }
    }

    pub fn cluster(&self) -> &'a RelCluster {
        self.cluster
    }

    fn memoize<T, C, U>(
        &mut self,
        key: MetadataKey,
        compute: C,
        wrap: fn(T) -> MetadataValue,
        unwrap: U,
    ) -> MdResult<T>
    where
        T: Clone,
        C: FnOnce(&mut Self) -> MdResult<T>,
        U: FnOnce(MetadataValue) -> Option<T>,
    {
        match self.cache.get(&key) {
            Some(CacheEntry::InProgress) => {
                return Err(CyclicMetadataError {
                    rel: key.rel(),
                    kind: key.kind(),
                })
            }
            Some(CacheEntry::Done(value)) => {
                if let Some(value) = unwrap(value.clone()) {
                    return Ok(value);
                }
            }
            None => {}
        }

        self.cache.insert(key.clone(), CacheEntry::InProgress);
        match compute(self) {
            Ok(value) => {
                self.cache
                    .insert(key, CacheEntry::Done(wrap(value.clone())));
                Ok(value)
            }
            Err(e) => {
                self.cache.remove(&key);
                Err(e)
            }
        }
    }

    /// Estimated number of rows produced by `rel`, never negative.
    pub fn row_count(&mut self, rel: RelId) -> MdResult<f64> {
        let cluster = self.cluster;
        let node = cluster.node(rel);
        let handler = cluster.metadata_provider().row_count.handler(node.kind());
        self.memoize(
            MetadataKey::RowCount(rel),
            |mq| handler(node, mq).map(|rows| rows.max(0.0)),
            MetadataValue::RowCount,
            |v| v.into_row_count().ok(),
        )
    }

    /// Sort orders that the output of `rel` is known to follow. Empty if none is known.
    pub fn collations(&mut self, rel: RelId) -> MdResult<Vec<RelCollation>> {
        let cluster = self.cluster;
        let node = cluster.node(rel);
        let handler = cluster.metadata_provider().collations.handler(node.kind());
        self.memoize(
            MetadataKey::Collations(rel),
            |mq| handler(node, mq),
            MetadataValue::Collations,
            |v| v.into_collations().ok(),
        )
    }

    /// Estimated number of distinct values of `group_key` among the rows of `rel` satisfying
    /// `predicate`, `None` if unknown.
    pub fn distinct_row_count(
        &mut self,
        rel: RelId,
        group_key: &ImmutableBitSet,
        predicate: Option<&RexNode>,
    ) -> MdResult<Option<f64>> {
        let cluster = self.cluster;
        let node = cluster.node(rel);
        let handler = cluster
            .metadata_provider()
            .distinct_row_count
            .handler(node.kind());
        self.memoize(
            MetadataKey::DistinctRowCount(rel, group_key.clone(), predicate.cloned()),
            |mq| handler(node, mq, group_key, predicate),
            MetadataValue::DistinctRowCount,
            |v| v.into_distinct_row_count().ok(),
        )
    }

    /// Every expression over table columns that `expr`, an expression over the output of `rel`,
    /// is equivalent to. `None` if the lineage cannot be traced.
    pub fn expression_lineage(
        &mut self,
        rel: RelId,
        expr: &RexNode,
    ) -> MdResult<Option<BTreeSet<RexNode>>> {
        let cluster = self.cluster;
        let node = cluster.node(rel);
        let handler = cluster
            .metadata_provider()
            .expression_lineage
            .handler(node.kind());
        self.memoize(
            MetadataKey::ExpressionLineage(rel, expr.clone()),
            |mq| handler(node, mq, expr),
            MetadataValue::ExpressionLineage,
            |v| v.into_expression_lineage().ok(),
        )
    }

    /// Uses of tables in the tree under `rel`, `None` if unknown.
    pub fn table_references(&mut self, rel: RelId) -> MdResult<Option<BTreeSet<RelTableRef>>> {
        let cluster = self.cluster;
        let node = cluster.node(rel);
        let handler = cluster
            .metadata_provider()
            .table_references
            .handler(node.kind());
        self.memoize(
            MetadataKey::TableReferences(rel),
            |mq| handler(node, mq),
            MetadataValue::TableReferences,
            |v| v.into_table_references().ok(),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::operator::RelKind;
    use crate::plan::RelNode;
    use crate::properties::TraitSet;
    use crate::test_util::{cluster, cluster_with_provider};

    fn self_referencing(node: &RelNode, mq: &mut RelMetadataQuery<'_>) -> MdResult<f64> {
        mq.row_count(node.id())
    }

    #[test]
    fn test_cycle_detected_at_second_entry() {
        let mut provider = RelMetadataProvider::builtin();
        provider
            .row_count
            .register(RelKind::LogicalTableScan, self_referencing);
        let mut cluster = cluster_with_provider(Arc::new(provider));
        let scan = cluster.builder().scan(&["hr", "emps"]).unwrap().build().unwrap();
        let mut mq = cluster.metadata_query();
        let err = mq.row_count(scan).unwrap_err();
        assert_eq!(scan, err.rel());
        assert_eq!("row count", err.kind());
        // the failed entry is not left in progress
        assert_eq!(err, mq.row_count(scan).unwrap_err());
    }

    #[test]
    fn test_results_are_cached() {
        let mut cluster = cluster();
        let scan = cluster.builder().scan(&["hr", "emps"]).unwrap().build().unwrap();
        let mut mq = cluster.metadata_query();
        assert_eq!(5.0, mq.row_count(scan).unwrap());
        assert_eq!(5.0, mq.row_count(scan).unwrap());
        assert!(mq.collations(scan).unwrap().is_empty());
    }

    #[test]
    fn test_subset_swallows_cycle_of_member() {
        let mut cluster = cluster();
        let scan = cluster.builder().scan(&["hr", "emps"]).unwrap().build().unwrap();
        let row_type = cluster.row_type(scan).clone();
        let subset = cluster.create_subset(row_type, TraitSet::logical()).unwrap();
        let filter = cluster
            .builder()
            .push(subset)
            .filter(crate::rex::RexNode::bool_literal(true))
            .unwrap()
            .build()
            .unwrap();
        cluster.add_to_subset(subset, filter).unwrap();
        cluster.add_to_subset(subset, scan).unwrap();
        let mut mq = cluster.metadata_query();
        assert_eq!(5.0, mq.row_count(subset).unwrap());
    }
}
