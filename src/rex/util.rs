use std::collections::HashMap;

use crate::bitset::ImmutableBitSet;
use crate::properties::RowType;
use crate::rex::{Op, RelTableRef, RexCall, RexInputRef, RexNode, RexTableInputRef};

impl RexNode {
    /// Rebuilds this expression top-down. Where `f` returns a replacement the subtree is not
    /// visited further.
    pub fn transform<F>(&self, f: &mut F) -> RexNode
    where
        F: FnMut(&RexNode) -> Option<RexNode>,
    {
        if let Some(replaced) = f(self) {
            return replaced;
        }
        match self {
            RexNode::Call(call) => RexNode::Call(RexCall {
                op: call.op,
                operands: call.operands.iter().map(|o| o.transform(f)).collect(),
                data_type: call.data_type,
            }),
            other => other.clone(),
        }
    }

    /// Ordinals of all input fields referenced by this expression.
    pub fn input_refs(&self) -> ImmutableBitSet {
        let mut bits = Vec::new();
        self.collect_input_refs(&mut bits);
        ImmutableBitSet::of(bits)
    }

    fn collect_input_refs(&self, bits: &mut Vec<usize>) {
        match self {
            RexNode::InputRef(r) => bits.push(r.index),
            RexNode::Call(c) => c.operands.iter().for_each(|o| o.collect_input_refs(bits)),
            _ => {}
        }
    }

    /// Splits a predicate into its top-level conjuncts. `TRUE` yields no conjuncts.
    pub fn conjunctions(&self) -> Vec<RexNode> {
        let mut list = Vec::new();
        self.decompose_conjunction(&mut list);
        list
    }

    fn decompose_conjunction(&self, list: &mut Vec<RexNode>) {
        match self {
            RexNode::Call(c) if c.op == Op::And => c
                .operands
                .iter()
                .for_each(|o| o.decompose_conjunction(list)),
            node if node.is_always_true() => {}
            node => list.push(node.clone()),
        }
    }

    /// Adds `offset` to every input reference.
    pub fn shift(&self, offset: isize) -> RexNode {
        self.transform(&mut |node| match node {
            RexNode::InputRef(r) => Some(RexNode::InputRef(RexInputRef::new(
                (r.index as isize + offset) as usize,
                r.data_type,
            ))),
            _ => None,
        })
    }

    /// Replaces input references with the outputs of a projection, so that an expression over a
    /// project's output becomes an expression over the project's input.
    pub fn push_past_project(&self, project_exprs: &[RexNode]) -> RexNode {
        self.transform(&mut |node| match node {
            RexNode::InputRef(r) => Some(project_exprs[r.index].clone()),
            _ => None,
        })
    }

    /// Replaces input references found in `mapping`; others are kept.
    pub fn replace_input_refs(&self, mapping: &HashMap<usize, RexNode>) -> RexNode {
        self.transform(&mut |node| match node {
            RexNode::InputRef(r) => mapping.get(&r.index).cloned(),
            _ => None,
        })
    }

    /// Renumbers input references through `f`, returning `None` if any is unmapped.
    pub fn remap_input_refs<F>(&self, mut f: F) -> Option<RexNode>
    where
        F: FnMut(usize) -> Option<usize>,
    {
        let mut failed = false;
        let node = self.transform(&mut |node| match node {
            RexNode::InputRef(r) => match f(r.index) {
                Some(idx) => Some(RexNode::InputRef(RexInputRef::new(idx, r.data_type))),
                None => {
                    failed = true;
                    Some(node.clone())
                }
            },
            _ => None,
        });
        if failed {
            None
        } else {
            Some(node)
        }
    }

    /// Re-types input references against `row_type`, for use against another input whose fields
    /// line up positionally.
    pub fn retarget(&self, row_type: &RowType) -> RexNode {
        self.transform(&mut |node| match node {
            RexNode::InputRef(r) => Some(RexNode::input_ref(r.index, row_type)),
            _ => None,
        })
    }

    pub fn swap_table_references(&self, mapping: &HashMap<RelTableRef, RelTableRef>) -> RexNode {
        self.transform(&mut |node| match node {
            RexNode::TableInputRef(r) => mapping.get(&r.table_ref).map(|t| {
                RexNode::TableInputRef(RexTableInputRef::new(t.clone(), r.index, r.data_type))
            }),
            _ => None,
        })
    }

    /// Whether this is an `=` between two input references, returning their ordinals.
    pub fn as_column_equality(&self) -> Option<(usize, usize)> {
        match self {
            RexNode::Call(c) if c.op == Op::Equals => {
                match (c.operands[0].as_input_ref(), c.operands[1].as_input_ref()) {
                    (Some(a), Some(b)) => Some((a, b)),
                    _ => None,
                }
            }
            _ => None,
        }
    }
}

/// ANDs `nodes` together after flattening, dropping `TRUE` conjuncts.
///
/// Returns `None` when nothing is left, or `TRUE` if `null_on_empty` is false.
pub fn compose_conjunction<I>(nodes: I, null_on_empty: bool) -> Option<RexNode>
where
    I: IntoIterator<Item = RexNode>,
{
    let mut conjuncts: Vec<RexNode> = nodes
        .into_iter()
        .flat_map(|n| n.conjunctions())
        .collect();
    if conjuncts.iter().any(RexNode::is_always_false) {
        return Some(RexNode::bool_literal(false));
    }
    match conjuncts.len() {
        0 if null_on_empty => None,
        0 => Some(RexNode::bool_literal(true)),
        1 => conjuncts.pop(),
        _ => Some(RexNode::call(Op::And, conjuncts)),
    }
}

/// Whether `exprs` projects exactly the fields of `input` in order.
pub fn is_identity(exprs: &[RexNode], input: &RowType) -> bool {
    exprs.len() == input.field_count()
        && exprs
            .iter()
            .enumerate()
            .all(|(i, e)| e.as_input_ref() == Some(i))
}

/// Splits `predicate` into conjuncts referencing only `columns` and the rest.
pub fn split_filters(
    columns: &ImmutableBitSet,
    predicate: Option<&RexNode>,
) -> (Vec<RexNode>, Vec<RexNode>) {
    let mut pushable = Vec::new();
    let mut not_pushable = Vec::new();
    if let Some(predicate) = predicate {
        for conjunct in predicate.conjunctions() {
            if columns.contains(&conjunct.input_refs()) {
                pushable.push(conjunct);
            } else {
                not_pushable.push(conjunct);
            }
        }
    }
    (pushable, not_pushable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DataType;

    fn col(i: usize) -> RexNode {
        RexNode::InputRef(RexInputRef::new(i, DataType::Integer))
    }

    #[test]
    fn test_conjunctions_flatten() {
        let e = col(0)
            .gt(RexNode::literal(1))
            .and(RexNode::bool_literal(true).and(col(1).lt(RexNode::literal(5))));
        let conjuncts = e.conjunctions();
        assert_eq!(2, conjuncts.len());
        assert_eq!("<($1, 5)", conjuncts[1].to_string());
    }

    #[test]
    fn test_compose_conjunction() {
        assert_eq!(None, compose_conjunction(vec![], true));
        assert!(compose_conjunction(vec![], false).unwrap().is_always_true());
        let single = compose_conjunction(vec![col(0).is_not_null()], true).unwrap();
        assert_eq!("IS NOT NULL($0)", single.to_string());
        let falsy = compose_conjunction(vec![col(0), RexNode::bool_literal(false)], true);
        assert!(falsy.unwrap().is_always_false());
    }

    #[test]
    fn test_push_past_project() {
        let project = vec![col(3), col(1).plus(RexNode::literal(1))];
        let pred = col(1).gt(col(0));
        assert_eq!(">(+($1, 1), $3)", pred.push_past_project(&project).to_string());
    }

    #[test]
    fn test_split_filters() {
        let pred = col(0).gt(RexNode::literal(1)).and(col(2).eq(col(0)));
        let (pushable, rest) = split_filters(&ImmutableBitSet::of(vec![0, 1]), Some(&pred));
        assert_eq!(1, pushable.len());
        assert_eq!(1, rest.len());
    }

    #[test]
    fn test_remap_fails_on_unmapped() {
        let e = col(0).plus(col(2));
        assert!(e.remap_input_refs(|i| if i == 0 { Some(5) } else { None }).is_none());
        let ok = e.remap_input_refs(|i| Some(i + 1)).unwrap();
        assert_eq!("+($1, $3)", ok.to_string());
    }
}
