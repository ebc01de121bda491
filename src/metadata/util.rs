//! Estimation helpers shared by metadata handlers.

use crate::bitset::ImmutableBitSet;
use crate::metadata::{MdResult, RelMetadataQuery};
use crate::operator::RelKind;
use crate::plan::{RelCluster, RelId};
use crate::rex::{Op, RexNode};

/// Fraction of rows expected to satisfy `predicate`.
///
/// This is a rough guess from the shape of each conjunct, not derived from data: `IS NOT NULL`
/// keeps 90% of rows, `=` 15%, other comparisons 50% and anything else 25%.
pub fn guess_selectivity(predicate: Option<&RexNode>) -> f64 {
    let predicate = match predicate {
        Some(p) if !p.is_always_true() => p,
        _ => return 1.0,
    };
    predicate
        .conjunctions()
        .iter()
        .map(|conjunct| match conjunct.as_call().map(|c| c.op()) {
            Some(Op::IsNotNull) => 0.9,
            Some(Op::Equals) => 0.15,
            Some(op) if op.is_comparison() => 0.5,
            _ => 0.25,
        })
        .product()
}

/// Expected number of distinct values when drawing `num_selected` values from a domain of
/// `domain_size` values.
pub fn num_distinct_vals(domain_size: f64, num_selected: f64) -> f64 {
    let d_size = cap_infinity(domain_size);
    let num_sel = cap_infinity(num_selected);
    let mut res = if d_size > 0.0 {
        (1.0 - (-num_sel / d_size).exp()) * d_size
    } else {
        0.0
    };
    if res > d_size {
        res = d_size;
    }
    if res > num_sel {
        res = num_sel;
    }
    if res < 0.0 {
        res = 0.0;
    }
    res
}

fn cap_infinity(d: f64) -> f64 {
    if d.is_infinite() {
        f64::MAX
    } else {
        d
    }
}

/// Whether `columns` of `rel` contain a unique key, `None` if unknown.
pub fn are_columns_unique(
    cluster: &RelCluster,
    rel: RelId,
    columns: &ImmutableBitSet,
) -> Option<bool> {
    let node = cluster.node(rel);
    let operator = node.operator();
    let kind = node.kind();
    if let Some(scan) = operator.table_scan() {
        return Some(scan.table().is_key(columns));
    }
    if let Some(aggregate) = operator.aggregate() {
        return Some(columns.contains(&ImmutableBitSet::range(0, aggregate.group_count())));
    }
    if let Some(project) = operator.projection() {
        let mut input_columns = Vec::with_capacity(columns.cardinality());
        for column in columns.iter() {
            if let Some(idx) = project.exprs().get(column).and_then(RexNode::as_input_ref) {
                input_columns.push(idx);
            }
        }
        return match are_columns_unique(cluster, node.input(0), &ImmutableBitSet::of(input_columns)) {
            Some(true) => Some(true),
            _ => None,
        };
    }
    if let Some(subset) = operator.as_subset() {
        return subset
            .best_or_original()
            .and_then(|member| are_columns_unique(cluster, member, columns));
    }
    if kind.is_a(RelKind::Filter) || kind.is_a(RelKind::Sort) || kind.is_a(RelKind::Exchange) {
        return are_columns_unique(cluster, node.input(0), columns);
    }
    None
}

/// Splits the output columns `group_key` of a projection into input columns that are copied
/// as is, and output columns computed by other expressions.
pub fn split_cols(
    project_exprs: &[RexNode],
    group_key: &ImmutableBitSet,
) -> (ImmutableBitSet, ImmutableBitSet) {
    let mut base_cols = Vec::new();
    let mut proj_cols = Vec::new();
    for bit in group_key.iter() {
        match project_exprs.get(bit).and_then(RexNode::as_input_ref) {
            Some(idx) => base_cols.push(idx),
            None => proj_cols.push(bit),
        }
    }
    (ImmutableBitSet::of(base_cols), ImmutableBitSet::of(proj_cols))
}

/// Estimated number of distinct values of `expr`, an expression over the input of the
/// projection `rel`.
pub fn card_of_proj_expr(
    mq: &mut RelMetadataQuery<'_>,
    rel: RelId,
    expr: &RexNode,
) -> MdResult<Option<f64>> {
    let input = mq.cluster().node(rel).input(0);
    let row_count = mq.row_count(rel)?;
    let distinct = match expr {
        RexNode::InputRef(r) => {
            return mq.distinct_row_count(input, &ImmutableBitSet::of(vec![r.index()]), None)
        }
        RexNode::Literal(_) => return Ok(Some(num_distinct_vals(1.0, row_count))),
        RexNode::Call(call) => {
            let operands = call.operands();
            match call.op() {
                Op::UnaryMinus => card_of_proj_expr(mq, rel, &operands[0])?,
                Op::Plus | Op::Minus | Op::Times | Op::Divide => {
                    let left = card_of_proj_expr(mq, rel, &operands[0])?;
                    let right = card_of_proj_expr(mq, rel, &operands[1])?;
                    match (left, right) {
                        (Some(l), Some(r)) if matches!(call.op(), Op::Plus | Op::Minus) => {
                            Some(l.max(r))
                        }
                        (Some(l), Some(r)) => Some(l * r),
                        _ => None,
                    }
                }
                _ if operands.len() == 1 => card_of_proj_expr(mq, rel, &operands[0])?,
                _ => Some(row_count / 10.0),
            }
        }
        RexNode::TableInputRef(_) => None,
    };
    Ok(distinct.map(|d| num_distinct_vals(d, row_count)))
}
