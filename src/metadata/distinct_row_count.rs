use log::trace;

use crate::bitset::ImmutableBitSet;
use crate::metadata::{
    are_columns_unique, card_of_proj_expr, guess_selectivity, num_distinct_vals, split_cols,
    DistinctRowCountHandler, MdResult, MetadataHandlers, RelMetadataQuery,
};
use crate::operator::{Operator, RelKind};
use crate::plan::RelNode;
use crate::rex::{compose_conjunction, split_filters, Op, RexNode};

pub(super) fn handlers() -> MetadataHandlers<DistinctRowCountHandler> {
    let mut handlers = MetadataHandlers::<DistinctRowCountHandler>::new(catch_all);
    handlers
        .register(RelKind::Filter, filter)
        .register(RelKind::Sort, first_input)
        .register(RelKind::Exchange, first_input)
        .register(RelKind::Join, join)
        .register(RelKind::SemiJoin, semi_join)
        .register(RelKind::Aggregate, aggregate)
        .register(RelKind::Project, project)
        .register(RelKind::Union, union)
        .register(RelKind::Values, values)
        .register(RelKind::RelSubset, subset);
    handlers
}

fn is_trivial(group_key: &ImmutableBitSet, predicate: Option<&RexNode>) -> bool {
    group_key.is_empty() && predicate.map_or(true, RexNode::is_always_true)
}

/// Known only when the key is unique, in which case every selected row is distinct.
fn catch_all(
    node: &RelNode,
    mq: &mut RelMetadataQuery<'_>,
    group_key: &ImmutableBitSet,
    predicate: Option<&RexNode>,
) -> MdResult<Option<f64>> {
    if are_columns_unique(mq.cluster(), node.id(), group_key) == Some(true) {
        let rows = mq.row_count(node.id())?;
        return Ok(Some(rows * guess_selectivity(predicate)));
    }
    Ok(None)
}

fn first_input(
    node: &RelNode,
    mq: &mut RelMetadataQuery<'_>,
    group_key: &ImmutableBitSet,
    predicate: Option<&RexNode>,
) -> MdResult<Option<f64>> {
    mq.distinct_row_count(node.input(0), group_key, predicate)
}

fn filter(
    node: &RelNode,
    mq: &mut RelMetadataQuery<'_>,
    group_key: &ImmutableBitSet,
    predicate: Option<&RexNode>,
) -> MdResult<Option<f64>> {
    if is_trivial(group_key, predicate) {
        return Ok(Some(1.0));
    }
    let condition = match node.operator().filter() {
        Some(filter) => filter.condition().clone(),
        None => return catch_all(node, mq, group_key, predicate),
    };
    // Terms repeated in both are kept twice.
    let combined = match predicate {
        Some(p) => RexNode::call(Op::And, vec![p.clone(), condition]),
        None => condition,
    };
    mq.distinct_row_count(node.input(0), group_key, Some(&combined))
}

/// Product of the distinct counts of the key columns on each side, capped by the join's row
/// count.
fn join(
    node: &RelNode,
    mq: &mut RelMetadataQuery<'_>,
    group_key: &ImmutableBitSet,
    predicate: Option<&RexNode>,
) -> MdResult<Option<f64>> {
    if is_trivial(group_key, predicate) {
        return Ok(Some(1.0));
    }
    let cluster = mq.cluster();
    let (left, right) = (node.input(0), node.input(1));
    let left_count = cluster.field_count(left);
    let right_count = cluster.field_count(right);

    let left_bits = ImmutableBitSet::range(0, left_count);
    let right_bits = ImmutableBitSet::range(left_count, left_count + right_count);
    let left_key: ImmutableBitSet = group_key.iter().filter(|b| *b < left_count).collect();
    let right_key: ImmutableBitSet = group_key
        .iter()
        .filter(|b| *b >= left_count)
        .map(|b| b - left_count)
        .collect();

    let (left_preds, rest) = split_filters(&left_bits, predicate);
    let rest = compose_conjunction(rest, true);
    let (right_preds, rest) = split_filters(&right_bits, rest.as_ref());
    let left_pred = compose_conjunction(left_preds, true);
    let right_pred =
        compose_conjunction(right_preds, true).map(|p| p.shift(-(left_count as isize)));
    let rest = compose_conjunction(rest, true);

    let left_distinct = mq.distinct_row_count(left, &left_key, left_pred.as_ref())?;
    let right_distinct = mq.distinct_row_count(right, &right_key, right_pred.as_ref())?;
    match (left_distinct, right_distinct) {
        (Some(l), Some(r)) => {
            let distinct = l * r * guess_selectivity(rest.as_ref());
            Ok(Some(num_distinct_vals(distinct, mq.row_count(node.id())?)))
        }
        _ => Ok(None),
    }
}

fn semi_join(
    node: &RelNode,
    mq: &mut RelMetadataQuery<'_>,
    group_key: &ImmutableBitSet,
    predicate: Option<&RexNode>,
) -> MdResult<Option<f64>> {
    if is_trivial(group_key, predicate) {
        return Ok(Some(1.0));
    }
    let selectivity = guess_selectivity(node.operator().join().map(|j| j.condition()));
    Ok(mq
        .distinct_row_count(node.input(0), group_key, predicate)?
        .map(|d| d * selectivity))
}

/// Predicates on group columns are pushed to the input, the rest applied as a selectivity.
fn aggregate(
    node: &RelNode,
    mq: &mut RelMetadataQuery<'_>,
    group_key: &ImmutableBitSet,
    predicate: Option<&RexNode>,
) -> MdResult<Option<f64>> {
    if is_trivial(group_key, predicate) {
        return Ok(Some(1.0));
    }
    let aggregate = match node.operator().aggregate() {
        Some(aggregate) => aggregate,
        None => return catch_all(node, mq, group_key, predicate),
    };
    let group_set = aggregate.group_set();
    let group_count = aggregate.group_count();

    let (pushable, not_pushable) =
        split_filters(&ImmutableBitSet::range(0, group_count), predicate);
    let child_pred = compose_conjunction(pushable, true)
        .and_then(|p| p.remap_input_refs(|i| group_set.nth(i)));

    let mut child_key = Vec::new();
    for bit in group_key.iter() {
        if bit < group_count {
            child_key.extend(group_set.nth(bit));
        } else if let Some(call) = aggregate.agg_calls().get(bit - group_count) {
            child_key.extend(call.args().iter().copied());
        }
    }

    let distinct =
        mq.distinct_row_count(node.input(0), &ImmutableBitSet::of(child_key), child_pred.as_ref())?;
    Ok(distinct.map(|d| {
        if not_pushable.is_empty() {
            d
        } else {
            d * guess_selectivity(compose_conjunction(not_pushable, true).as_ref())
        }
    }))
}

/// Key columns copied from the input are asked of the input, and each computed column multiplies
/// the result by its estimated cardinality.
fn project(
    node: &RelNode,
    mq: &mut RelMetadataQuery<'_>,
    group_key: &ImmutableBitSet,
    predicate: Option<&RexNode>,
) -> MdResult<Option<f64>> {
    if is_trivial(group_key, predicate) {
        return Ok(Some(1.0));
    }
    let exprs = match node.operator().projection() {
        Some(project) => project.exprs(),
        None => return catch_all(node, mq, group_key, predicate),
    };
    let (base_cols, proj_cols) = split_cols(exprs, group_key);

    let (pushable, not_pushable) =
        split_filters(&ImmutableBitSet::range(0, exprs.len()), predicate);
    let child_pred = compose_conjunction(pushable, true).map(|p| p.push_past_project(exprs));

    let mut distinct = match mq.distinct_row_count(node.input(0), &base_cols, child_pred.as_ref())? {
        Some(d) => d,
        None => return Ok(None),
    };
    if !not_pushable.is_empty() {
        distinct *= guess_selectivity(compose_conjunction(not_pushable, true).as_ref());
    }
    if proj_cols.is_empty() {
        return Ok(Some(distinct));
    }
    for bit in proj_cols.iter() {
        match card_of_proj_expr(mq, node.id(), &exprs[bit])? {
            Some(card) => distinct *= card,
            None => return Ok(None),
        }
    }
    Ok(Some(num_distinct_vals(distinct, mq.row_count(node.id())?)))
}

fn union(
    node: &RelNode,
    mq: &mut RelMetadataQuery<'_>,
    group_key: &ImmutableBitSet,
    predicate: Option<&RexNode>,
) -> MdResult<Option<f64>> {
    let cluster = mq.cluster();
    let mut total = 0.0;
    for input in node.inputs() {
        let retargeted = predicate.map(|p| p.retarget(cluster.row_type(*input)));
        match mq.distinct_row_count(*input, group_key, retargeted.as_ref())? {
            Some(d) => total += d,
            None => return Ok(None),
        }
    }
    Ok(Some(total))
}

fn values(
    node: &RelNode,
    mq: &mut RelMetadataQuery<'_>,
    group_key: &ImmutableBitSet,
    predicate: Option<&RexNode>,
) -> MdResult<Option<f64>> {
    if is_trivial(group_key, predicate) {
        return Ok(Some(1.0));
    }
    let selectivity = guess_selectivity(predicate);
    // half of the rows are assumed duplicates
    let rows = mq.row_count(node.id())? / 2.0;
    Ok(Some(num_distinct_vals(rows, rows * selectivity)))
}

/// The best member's count, else the smallest known count of any member.
fn subset(
    node: &RelNode,
    mq: &mut RelMetadataQuery<'_>,
    group_key: &ImmutableBitSet,
    predicate: Option<&RexNode>,
) -> MdResult<Option<f64>> {
    let subset = match node.operator() {
        Operator::Subset(subset) => subset,
        _ => return Ok(None),
    };
    if let Some(best) = subset.best() {
        return mq.distinct_row_count(best, group_key, predicate);
    }
    let mut min: Option<f64> = None;
    for member in subset.members() {
        match mq.distinct_row_count(*member, group_key, predicate) {
            Ok(Some(d)) => min = Some(min.map_or(d, |m| m.min(d))),
            Ok(None) => {}
            Err(e) => trace!("Skipped member {} of subset {}: {}", member, node.id(), e),
        }
    }
    Ok(min)
}

#[cfg(test)]
mod tests {
    use crate::bitset::ImmutableBitSet as Bits;
    use crate::operator::{AggFunction, AggregateCall, JoinType};
    use crate::rex::{RexInputRef, RexNode};
    use crate::test_util::cluster;
    use crate::types::DataType;
    use crate::value::Value;

    #[test]
    fn test_scan_key_is_distinct() {
        let mut cluster = cluster();
        let scan = cluster.builder().scan(&["hr", "emps"]).unwrap().build().unwrap();
        let mut mq = cluster.metadata_query();
        assert_eq!(Some(5.0), mq.distinct_row_count(scan, &Bits::of(vec![0]), None).unwrap());
        assert_eq!(None, mq.distinct_row_count(scan, &Bits::of(vec![2]), None).unwrap());
    }

    #[test]
    fn test_filter_passes_condition_down() {
        let mut cluster = cluster();
        let mut builder = cluster.builder();
        builder.scan(&["hr", "emps"]).unwrap();
        let cond = builder.field(2).gt(RexNode::literal(10));
        let filter = builder.filter(cond).unwrap().build().unwrap();
        let mut mq = cluster.metadata_query();
        assert_eq!(Some(1.0), mq.distinct_row_count(filter, &Bits::empty(), None).unwrap());
        assert_eq!(Some(2.5), mq.distinct_row_count(filter, &Bits::of(vec![0]), None).unwrap());
    }

    #[test]
    fn test_aggregate_maps_group_columns() {
        let mut cluster = cluster();
        let agg = cluster
            .builder()
            .scan(&["hr", "emps"])
            .unwrap()
            .aggregate(
                Bits::of(vec![0]),
                vec![AggregateCall::new(AggFunction::Sum, vec![3], "total")],
            )
            .unwrap()
            .build()
            .unwrap();
        let on_total = RexNode::InputRef(RexInputRef::new(1, DataType::Integer))
            .gt(RexNode::literal(100));
        let mut mq = cluster.metadata_query();
        assert_eq!(Some(5.0), mq.distinct_row_count(agg, &Bits::of(vec![0]), None).unwrap());
        assert_eq!(
            Some(2.5),
            mq.distinct_row_count(agg, &Bits::of(vec![0]), Some(&on_total)).unwrap()
        );
    }

    #[test]
    fn test_project_with_computed_column_is_capped() {
        let mut cluster = cluster();
        let mut builder = cluster.builder();
        builder.scan(&["hr", "emps"]).unwrap();
        let exprs = vec![builder.field(0), builder.field(0).plus(RexNode::literal(1))];
        let project = builder.project(exprs).unwrap().build().unwrap();
        let mut mq = cluster.metadata_query();
        assert_eq!(Some(5.0), mq.distinct_row_count(project, &Bits::of(vec![0]), None).unwrap());
        let both = mq
            .distinct_row_count(project, &Bits::of(vec![0, 1]), None)
            .unwrap()
            .unwrap();
        assert!(both > 0.0 && both <= 5.0);
    }

    #[test]
    fn test_join_splits_key_between_sides() {
        let mut cluster = cluster();
        let mut builder = cluster.builder();
        builder.scan(&["hr", "emps"]).unwrap();
        builder.scan(&["hr", "depts"]).unwrap();
        let cond = builder.join_field(0, 2).eq(builder.join_field(1, 0));
        let join = builder.join(JoinType::Inner, cond).unwrap().build().unwrap();
        let mut mq = cluster.metadata_query();
        let rows = mq.row_count(join).unwrap();
        let distinct = mq
            .distinct_row_count(join, &Bits::of(vec![0, 4]), None)
            .unwrap()
            .unwrap();
        assert!(distinct > 0.0 && distinct <= rows);
        assert_eq!(None, mq.distinct_row_count(join, &Bits::of(vec![2]), None).unwrap());
    }

    #[test]
    fn test_union_sums_branches() {
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
        assert_eq!(Some(10.0), mq.distinct_row_count(union, &Bits::of(vec![0]), None).unwrap());
    }

    #[test]
    fn test_values_assumes_half_duplicates() {
        let mut cluster = cluster();
        let row_type = cluster
            .type_factory()
            .create_struct_type(vec![("a", DataType::Integer, false)]);
        let tuples = (0..4).map(|i| vec![Value::Integer(i)]).collect();
        let values = cluster.builder().values(row_type, tuples).unwrap().build().unwrap();
        let distinct = cluster
            .metadata_query()
            .distinct_row_count(values, &Bits::of(vec![0]), None)
            .unwrap()
            .unwrap();
        assert!((distinct - 2.0 * (1.0 - (-1.0f64).exp())).abs() < 1e-9);
    }
}
