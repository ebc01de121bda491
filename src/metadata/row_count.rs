use log::trace;

use crate::metadata::{guess_selectivity, MdResult, MetadataHandlers, RelMetadataQuery, RowCountHandler};
use crate::operator::{JoinType, Operator, RelKind, SemiJoinType};
use crate::plan::RelNode;

pub(super) fn handlers() -> MetadataHandlers<RowCountHandler> {
    let mut handlers = MetadataHandlers::<RowCountHandler>::new(catch_all);
    handlers
        .register(RelKind::TableScan, table_scan)
        .register(RelKind::Filter, filter)
        .register(RelKind::Project, single_input)
        .register(RelKind::Exchange, single_input)
        .register(RelKind::Join, join)
        .register(RelKind::SemiJoin, semi_join)
        .register(RelKind::Correlate, correlate)
        .register(RelKind::Aggregate, aggregate)
        .register(RelKind::Sort, sort)
        .register(RelKind::SetOp, set_op)
        .register(RelKind::Values, values)
        .register(RelKind::RelSubset, subset);
    handlers
}

fn catch_all(node: &RelNode, mq: &mut RelMetadataQuery<'_>) -> MdResult<f64> {
    match node.inputs() {
        [input] => mq.row_count(*input),
        _ => Ok(1.0),
    }
}

fn single_input(node: &RelNode, mq: &mut RelMetadataQuery<'_>) -> MdResult<f64> {
    mq.row_count(node.input(0))
}

fn table_scan(node: &RelNode, _mq: &mut RelMetadataQuery<'_>) -> MdResult<f64> {
    Ok(node
        .operator()
        .table_scan()
        .map(|s| s.table().row_count())
        .unwrap_or(1.0))
}

fn filter(node: &RelNode, mq: &mut RelMetadataQuery<'_>) -> MdResult<f64> {
    let input = mq.row_count(node.input(0))?;
    let condition = node.operator().filter().map(|f| f.condition());
    Ok(input * guess_selectivity(condition))
}

fn join(node: &RelNode, mq: &mut RelMetadataQuery<'_>) -> MdResult<f64> {
    let join = match node.operator().join() {
        Some(join) => join,
        None => return catch_all(node, mq),
    };
    let left = mq.row_count(node.input(0))?;
    let right = mq.row_count(node.input(1))?;
    let inner = left * right * guess_selectivity(Some(join.condition()));
    Ok(match join.join_type() {
        JoinType::Inner => inner,
        JoinType::Left => inner.max(left),
        JoinType::Right => inner.max(right),
        JoinType::Full => inner.max(left).max(right),
    })
}

fn semi_join(node: &RelNode, mq: &mut RelMetadataQuery<'_>) -> MdResult<f64> {
    let left = mq.row_count(node.input(0))?;
    let condition = node.operator().join().map(|j| j.condition());
    Ok(left * guess_selectivity(condition))
}

fn correlate(node: &RelNode, mq: &mut RelMetadataQuery<'_>) -> MdResult<f64> {
    let left = mq.row_count(node.input(0))?;
    match node.operator().correlate().map(|c| c.join_type()) {
        Some(SemiJoinType::Inner) | Some(SemiJoinType::Left) => {
            Ok(left * mq.row_count(node.input(1))?)
        }
        _ => Ok(left),
    }
}

fn aggregate(node: &RelNode, mq: &mut RelMetadataQuery<'_>) -> MdResult<f64> {
    let aggregate = match node.operator().aggregate() {
        Some(aggregate) => aggregate,
        None => return catch_all(node, mq),
    };
    if aggregate.group_set().is_empty() {
        return Ok(1.0);
    }
    match mq.distinct_row_count(node.input(0), aggregate.group_set(), None)? {
        Some(distinct) => Ok(distinct),
        None => Ok(mq.row_count(node.input(0))? / 10.0),
    }
}

fn sort(node: &RelNode, mq: &mut RelMetadataQuery<'_>) -> MdResult<f64> {
    let input = mq.row_count(node.input(0))?;
    Ok(match node.operator().sort() {
        Some(sort) => {
            let rows = (input - sort.offset() as f64).max(0.0);
            match sort.fetch() {
                Some(fetch) => rows.min(fetch as f64),
                None => rows,
            }
        }
        None => input,
    })
}

fn set_op(node: &RelNode, mq: &mut RelMetadataQuery<'_>) -> MdResult<f64> {
    let mut counts = Vec::with_capacity(node.inputs().len());
    for input in node.inputs() {
        counts.push(mq.row_count(*input)?);
    }
    let all = node.operator().set_op().map(|s| s.all()).unwrap_or(true);
    let kind = node.kind();
    Ok(if kind.is_a(RelKind::Union) {
        let sum: f64 = counts.iter().sum();
        if all {
            sum
        } else {
            sum * 0.5
        }
    } else if kind.is_a(RelKind::Intersect) {
        counts.iter().copied().fold(f64::INFINITY, f64::min)
    } else {
        counts[0]
    })
}

fn values(node: &RelNode, _mq: &mut RelMetadataQuery<'_>) -> MdResult<f64> {
    Ok(node
        .operator()
        .values()
        .map(|v| v.tuples().len() as f64)
        .unwrap_or(1.0))
}

/// Smallest estimate among the members that can be estimated without a cycle.
fn subset(node: &RelNode, mq: &mut RelMetadataQuery<'_>) -> MdResult<f64> {
    let members = match node.operator() {
        Operator::Subset(subset) => subset.members().to_vec(),
        _ => vec![],
    };
    let mut best: Option<f64> = None;
    for member in members {
        match mq.row_count(member) {
            Ok(rows) => best = Some(best.map_or(rows, |b| b.min(rows))),
            Err(e) => trace!("Skipped member {} of subset {}: {}", member, node.id(), e),
        }
    }
    Ok(best.unwrap_or(mq.cluster().config().subset_row_count_default))
}
