//! Expression lineage and table references.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use itertools::Itertools;

use crate::bitset::ImmutableBitSet;
use crate::metadata::{
    ExpressionLineageHandler, MdResult, MetadataHandlers, RelMetadataQuery, TableReferencesHandler,
};
use crate::operator::{JoinType, RelKind};
use crate::plan::{RelId, RelNode};
use crate::rex::{RelTableRef, RexNode, RexTableInputRef};

type Lineage = Option<BTreeSet<RexNode>>;

pub(super) fn lineage_handlers() -> MetadataHandlers<ExpressionLineageHandler> {
    let mut handlers = MetadataHandlers::<ExpressionLineageHandler>::new(lineage_catch_all);
    handlers
        .register(RelKind::TableScan, scan_lineage)
        .register(RelKind::Aggregate, aggregate_lineage)
        .register(RelKind::Join, join_lineage)
        .register(RelKind::SemiJoin, lineage_catch_all)
        .register(RelKind::Union, union_lineage)
        .register(RelKind::Project, project_lineage)
        .register(RelKind::Filter, pass_through_lineage)
        .register(RelKind::Sort, pass_through_lineage)
        .register(RelKind::Exchange, pass_through_lineage)
        .register(RelKind::RelSubset, subset_lineage);
    handlers
}

pub(super) fn table_references_handlers() -> MetadataHandlers<TableReferencesHandler> {
    let mut handlers = MetadataHandlers::<TableReferencesHandler>::new(references_catch_all);
    handlers
        .register(RelKind::TableScan, scan_references)
        .register(RelKind::Join, join_references)
        .register(RelKind::Union, union_references)
        .register(RelKind::Aggregate, first_input_references)
        .register(RelKind::Project, first_input_references)
        .register(RelKind::Filter, first_input_references)
        .register(RelKind::Sort, first_input_references)
        .register(RelKind::Exchange, first_input_references)
        .register(RelKind::SemiJoin, first_input_references)
        .register(RelKind::RelSubset, subset_references);
    handlers
}

/// Every expression obtained from `expr` by replacing each input reference with one of its
/// alternatives in `mapping`, split into conjuncts.
///
/// An expression without input references is its only lineage. Returns `None` if some referenced
/// field has no entry in `mapping`.
pub fn create_all_possible_expressions(
    expr: &RexNode,
    mapping: &BTreeMap<usize, BTreeSet<RexNode>>,
) -> Lineage {
    let used = expr.input_refs();
    if used.is_empty() {
        return Some(BTreeSet::from([expr.clone()]));
    }
    let mut choices = Vec::with_capacity(used.cardinality());
    for idx in used.iter() {
        let alternatives = mapping.get(&idx).filter(|a| !a.is_empty())?;
        choices.push(alternatives.iter().map(move |a| (idx, a.clone())).collect_vec());
    }
    let mut result = BTreeSet::new();
    for combination in choices.into_iter().multi_cartesian_product() {
        let replacements: HashMap<usize, RexNode> = combination.into_iter().collect();
        result.extend(expr.replace_input_refs(&replacements).conjunctions());
    }
    Some(result)
}

/// Builds the lineage of `expr` from the lineage `origin` gives for each referenced field.
fn lineage_from_refs<F>(mq: &mut RelMetadataQuery<'_>, expr: &RexNode, mut origin: F) -> MdResult<Lineage>
where
    F: FnMut(&mut RelMetadataQuery<'_>, usize) -> MdResult<Lineage>,
{
    let mut mapping = BTreeMap::new();
    for idx in expr.input_refs().iter() {
        match origin(mq, idx)? {
            Some(exprs) => {
                mapping.insert(idx, exprs);
            }
            None => return Ok(None),
        }
    }
    Ok(create_all_possible_expressions(expr, &mapping))
}

/// Renumbers `refs` to follow the uses of the same tables already in `existing`.
fn shift_table_refs(
    existing: &BTreeSet<RelTableRef>,
    refs: &BTreeSet<RelTableRef>,
) -> HashMap<RelTableRef, RelTableRef> {
    refs.iter()
        .map(|r| {
            let shift = existing
                .iter()
                .filter(|e| e.qualified_name() == r.qualified_name())
                .count();
            let shifted = RelTableRef::new(r.qualified_name().to_vec(), shift + r.entity_number());
            (r.clone(), shifted)
        })
        .collect()
}

fn swap_all(exprs: BTreeSet<RexNode>, mapping: &HashMap<RelTableRef, RelTableRef>) -> BTreeSet<RexNode> {
    exprs
        .iter()
        .map(|e| e.swap_table_references(mapping))
        .collect()
}

fn input_ref(mq: &RelMetadataQuery<'_>, rel: RelId, idx: usize) -> Option<RexNode> {
    let row_type = mq.cluster().row_type(rel);
    (idx < row_type.field_count()).then(|| RexNode::input_ref(idx, row_type))
}

fn lineage_catch_all(_node: &RelNode, _mq: &mut RelMetadataQuery<'_>, _expr: &RexNode) -> MdResult<Lineage> {
    Ok(None)
}

fn scan_lineage(node: &RelNode, mq: &mut RelMetadataQuery<'_>, expr: &RexNode) -> MdResult<Lineage> {
    let table = match node.operator().table_scan() {
        Some(scan) => scan.table().clone(),
        None => return Ok(None),
    };
    let table_ref = RelTableRef::new(table.qualified_name().to_vec(), 0);
    let row_type = mq.cluster().row_type(node.id());
    lineage_from_refs(mq, expr, |_, idx| {
        Ok(row_type.fields().get(idx).map(|field| {
            BTreeSet::from([RexNode::TableInputRef(RexTableInputRef::new(
                table_ref.clone(),
                idx,
                field.data_type(),
            ))])
        }))
    })
}

/// Only group columns can be traced through an aggregate.
fn aggregate_lineage(node: &RelNode, mq: &mut RelMetadataQuery<'_>, expr: &RexNode) -> MdResult<Lineage> {
    let aggregate = match node.operator().aggregate() {
        Some(aggregate) => aggregate,
        None => return Ok(None),
    };
    let group_count = aggregate.group_count();
    if expr.input_refs().iter().any(|idx| idx >= group_count) {
        return Ok(None);
    }
    let input = node.input(0);
    lineage_from_refs(mq, expr, |mq, idx| {
        match aggregate.group_set().nth(idx).and_then(|i| input_ref(mq, input, i)) {
            Some(r) => mq.expression_lineage(input, &r),
            None => Ok(None),
        }
    })
}

/// Lineage through a join. An outer join can only be traced on its preserved side, and a full
/// join not at all. Uses of a table on the right are numbered after its uses on the left.
fn join_lineage(node: &RelNode, mq: &mut RelMetadataQuery<'_>, expr: &RexNode) -> MdResult<Lineage> {
    let join = match node.operator().join() {
        Some(join) => join,
        None => return Ok(None),
    };
    let (left, right) = (node.input(0), node.input(1));
    let left_count = mq.cluster().field_count(left);
    let field_count = mq.cluster().field_count(node.id());
    let used = expr.input_refs();
    let traceable = match join.join_type() {
        JoinType::Inner => true,
        JoinType::Left => !used.intersects(&ImmutableBitSet::range(left_count, field_count)),
        JoinType::Right => !used.intersects(&ImmutableBitSet::range(0, left_count)),
        JoinType::Full => false,
    };
    if !traceable {
        return Ok(None);
    }

    let left_refs = match mq.table_references(left)? {
        Some(refs) => refs,
        None => return Ok(None),
    };
    let right_refs = match mq.table_references(right)? {
        Some(refs) => refs,
        None => return Ok(None),
    };
    let right_mapping = shift_table_refs(&left_refs, &right_refs);

    lineage_from_refs(mq, expr, |mq, idx| {
        if idx < left_count {
            match input_ref(mq, left, idx) {
                Some(r) => mq.expression_lineage(left, &r),
                None => Ok(None),
            }
        } else {
            match input_ref(mq, right, idx - left_count) {
                Some(r) => Ok(mq
                    .expression_lineage(right, &r)?
                    .map(|exprs| swap_all(exprs, &right_mapping))),
                None => Ok(None),
            }
        }
    })
}

/// Each field of a union can come from any branch, so its lineage is the union of the branches'.
fn union_lineage(node: &RelNode, mq: &mut RelMetadataQuery<'_>, expr: &RexNode) -> MdResult<Lineage> {
    let used = expr.input_refs();
    let mut seen_refs = BTreeSet::new();
    let mut mapping: BTreeMap<usize, BTreeSet<RexNode>> = BTreeMap::new();
    for input in node.inputs() {
        let refs = match mq.table_references(*input)? {
            Some(refs) => refs,
            None => return Ok(None),
        };
        let table_mapping = shift_table_refs(&seen_refs, &refs);
        for idx in used.iter() {
            let r = match input_ref(mq, *input, idx) {
                Some(r) => r,
                None => return Ok(None),
            };
            match mq.expression_lineage(*input, &r)? {
                Some(exprs) => mapping
                    .entry(idx)
                    .or_default()
                    .extend(swap_all(exprs, &table_mapping)),
                None => return Ok(None),
            }
        }
        seen_refs.extend(table_mapping.into_values());
    }
    Ok(create_all_possible_expressions(expr, &mapping))
}

fn project_lineage(node: &RelNode, mq: &mut RelMetadataQuery<'_>, expr: &RexNode) -> MdResult<Lineage> {
    let exprs = match node.operator().projection() {
        Some(project) => project.exprs(),
        None => return Ok(None),
    };
    let input = node.input(0);
    lineage_from_refs(mq, expr, |mq, idx| match exprs.get(idx) {
        Some(e) => mq.expression_lineage(input, e),
        None => Ok(None),
    })
}

fn pass_through_lineage(node: &RelNode, mq: &mut RelMetadataQuery<'_>, expr: &RexNode) -> MdResult<Lineage> {
    mq.expression_lineage(node.input(0), expr)
}

fn subset_lineage(node: &RelNode, mq: &mut RelMetadataQuery<'_>, expr: &RexNode) -> MdResult<Lineage> {
    match node.operator().as_subset().and_then(|s| s.best_or_original()) {
        Some(member) => mq.expression_lineage(member, expr),
        None => Ok(None),
    }
}

type References = Option<BTreeSet<RelTableRef>>;

fn references_catch_all(_node: &RelNode, _mq: &mut RelMetadataQuery<'_>) -> MdResult<References> {
    Ok(None)
}

fn scan_references(node: &RelNode, _mq: &mut RelMetadataQuery<'_>) -> MdResult<References> {
    Ok(node.operator().table_scan().map(|scan| {
        BTreeSet::from([RelTableRef::new(scan.table().qualified_name().to_vec(), 0)])
    }))
}

fn first_input_references(node: &RelNode, mq: &mut RelMetadataQuery<'_>) -> MdResult<References> {
    mq.table_references(node.input(0))
}

fn join_references(node: &RelNode, mq: &mut RelMetadataQuery<'_>) -> MdResult<References> {
    union_references(node, mq)
}

/// Table uses of every input, later inputs numbered after earlier uses of the same table.
fn union_references(node: &RelNode, mq: &mut RelMetadataQuery<'_>) -> MdResult<References> {
    let mut result = BTreeSet::new();
    for input in node.inputs() {
        let refs = match mq.table_references(*input)? {
            Some(refs) => refs,
            None => return Ok(None),
        };
        let shifted = shift_table_refs(&result, &refs);
        result.extend(shifted.into_values());
    }
    Ok(Some(result))
}

fn subset_references(node: &RelNode, mq: &mut RelMetadataQuery<'_>) -> MdResult<References> {
    match node.operator().as_subset().and_then(|s| s.best_or_original()) {
        Some(member) => mq.table_references(member),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitset::ImmutableBitSet as Bits;
    use crate::operator::{AggFunction, AggregateCall};
    use crate::rex::{Op, RexInputRef};
    use crate::test_util::cluster;
    use crate::types::DataType;

    fn emps(entity: usize) -> RelTableRef {
        RelTableRef::new(vec!["hr".to_string(), "emps".to_string()], entity)
    }

    fn column(entity: usize, idx: usize) -> RexNode {
        RexNode::TableInputRef(RexTableInputRef::new(emps(entity), idx, DataType::Integer))
    }

    fn col(i: usize) -> RexNode {
        RexNode::InputRef(RexInputRef::new(i, DataType::Integer))
    }

    #[test]
    fn test_create_all_possible_expressions() {
        let mapping = BTreeMap::from([
            (0, BTreeSet::from([column(0, 0), column(1, 0)])),
            (1, BTreeSet::from([column(0, 2), column(1, 2)])),
        ]);
        let expr = col(0).plus(col(1));
        assert_eq!(4, create_all_possible_expressions(&expr, &mapping).unwrap().len());

        let literal = RexNode::literal(3);
        assert_eq!(
            Some(BTreeSet::from([literal.clone()])),
            create_all_possible_expressions(&literal, &mapping)
        );

        let conj = col(0).gt(RexNode::literal(1)).and(col(1).is_not_null());
        let single = BTreeMap::from([
            (0, BTreeSet::from([column(0, 0)])),
            (1, BTreeSet::from([column(0, 2)])),
        ]);
        assert_eq!(2, create_all_possible_expressions(&conj, &single).unwrap().len());
        assert_eq!(None, create_all_possible_expressions(&col(5), &single));
    }

    #[test]
    fn test_scan_lineage() {
        let mut cluster = cluster();
        let scan = cluster.builder().scan(&["hr", "emps"]).unwrap().build().unwrap();
        let mut mq = cluster.metadata_query();
        assert_eq!(
            Some(BTreeSet::from([column(0, 2)])),
            mq.expression_lineage(scan, &col(2)).unwrap()
        );
    }

    fn self_join(
        cluster: &mut crate::plan::RelCluster,
        join_type: JoinType,
    ) -> (RelId, RexNode) {
        let mut builder = cluster.builder();
        builder.scan(&["hr", "emps"]).unwrap();
        builder.scan(&["hr", "emps"]).unwrap();
        let cond = builder.join_field(0, 0).eq(builder.join_field(1, 0));
        let both = builder.join_field(0, 0).plus(builder.join_field(1, 0));
        (builder.join(join_type, cond).unwrap().build().unwrap(), both)
    }

    #[test]
    fn test_self_join_renumbers_right_table() {
        let mut cluster = cluster();
        let (join, both) = self_join(&mut cluster, JoinType::Inner);
        let mut mq = cluster.metadata_query();
        assert_eq!(
            Some(BTreeSet::from([RexNode::call(Op::Plus, vec![column(0, 0), column(1, 0)])])),
            mq.expression_lineage(join, &both).unwrap()
        );
        assert_eq!(
            Some(BTreeSet::from([emps(0), emps(1)])),
            mq.table_references(join).unwrap()
        );
    }

    #[test]
    fn test_outer_join_lineage_only_on_preserved_side() {
        let mut cluster = cluster();
        let (left, _) = self_join(&mut cluster, JoinType::Left);
        let (full, _) = self_join(&mut cluster, JoinType::Full);
        let mut mq = cluster.metadata_query();
        assert!(mq.expression_lineage(left, &col(0)).unwrap().is_some());
        assert_eq!(None, mq.expression_lineage(left, &col(4)).unwrap());
        assert_eq!(None, mq.expression_lineage(full, &col(0)).unwrap());
    }

    #[test]
    fn test_union_collects_every_branch() {
        let mut cluster = cluster();
        let union = cluster
            .builder()
            .scan(&["hr", "emps"])
            .unwrap()
            .scan(&["hr", "emps"])
            .unwrap()
            .union(true, 2)
            .unwrap()
            .build()
            .unwrap();
        let mut mq = cluster.metadata_query();
        assert_eq!(
            Some(BTreeSet::from([column(0, 0), column(1, 0)])),
            mq.expression_lineage(union, &col(0)).unwrap()
        );
    }

    #[test]
    fn test_project_and_aggregate_lineage() {
        let mut cluster = cluster();
        let mut builder = cluster.builder();
        builder.scan(&["hr", "emps"]).unwrap();
        let exprs = vec![builder.field(2), builder.field(0)];
        builder.project(exprs).unwrap();
        let project = builder.peek().unwrap();
        let agg = builder
            .aggregate(
                Bits::of(vec![1]),
                vec![AggregateCall::new(AggFunction::Count, vec![], "c")],
            )
            .unwrap()
            .build()
            .unwrap();
        let mut mq = cluster.metadata_query();
        assert_eq!(
            Some(BTreeSet::from([column(0, 2)])),
            mq.expression_lineage(project, &col(0)).unwrap()
        );
        assert_eq!(
            Some(BTreeSet::from([column(0, 0)])),
            mq.expression_lineage(agg, &col(0)).unwrap()
        );
        assert_eq!(None, mq.expression_lineage(agg, &col(1)).unwrap());
    }
}
