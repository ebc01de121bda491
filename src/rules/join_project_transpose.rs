use crate::error::OptResult;
use crate::operator::LogicalOperator::{LogicalJoin, LogicalProjection};
use crate::operator::{Join, Operator, Projection};
use crate::plan::{RelCluster, RelId};
use crate::rex::{RexInputRef, RexNode};
use crate::rules::{any_operator, is_logical_join, is_logical_projection, Pattern, Rule, RuleResult};

/// Pulls projects that are inputs of a join above the join.
///
/// The join then reads the projects' inputs directly and a project over the new join computes
/// the old join's fields. A project is only pulled from a side the join does not pad with nulls.
#[derive(Clone, Debug)]
pub struct JoinProjectTransposeRule {
    sides: Sides,
    pattern: Pattern,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Sides {
    Both,
    Left,
    Right,
}

impl JoinProjectTransposeRule {
    /// Matches a join whose inputs are both projects.
    pub fn both() -> Self {
        Self {
            sides: Sides::Both,
            pattern: Pattern::with_inputs(
                is_logical_join,
                vec![
                    Pattern::new(is_logical_projection),
                    Pattern::new(is_logical_projection),
                ],
            ),
        }
    }

    pub fn left() -> Self {
        Self {
            sides: Sides::Left,
            pattern: Pattern::with_inputs(
                is_logical_join,
                vec![Pattern::new(is_logical_projection), Pattern::new(any_operator)],
            ),
        }
    }

    pub fn right() -> Self {
        Self {
            sides: Sides::Right,
            pattern: Pattern::with_inputs(
                is_logical_join,
                vec![Pattern::new(any_operator), Pattern::new(is_logical_projection)],
            ),
        }
    }

    fn pulls_left(&self) -> bool {
        self.sides != Sides::Right
    }

    fn pulls_right(&self) -> bool {
        self.sides != Sides::Left
    }
}

/// Expressions of `side`'s fields over the new join input, placed at `offset` in the new join.
fn side_exprs(
    cluster: &RelCluster,
    side: RelId,
    pull: bool,
    offset: usize,
) -> (RelId, Vec<RexNode>) {
    match cluster.operator(side).projection() {
        Some(projection) if pull => (
            cluster.inputs(side)[0],
            projection
                .exprs()
                .iter()
                .map(|e| e.shift(offset as isize))
                .collect(),
        ),
        _ => (
            side,
            cluster
                .row_type(side)
                .fields()
                .iter()
                .enumerate()
                .map(|(i, f)| RexNode::InputRef(RexInputRef::new(offset + i, f.data_type())))
                .collect(),
        ),
    }
}

impl Rule for JoinProjectTransposeRule {
    fn name(&self) -> &'static str {
        match self.sides {
            Sides::Both => "JoinProjectTransposeRule(both)",
            Sides::Left => "JoinProjectTransposeRule(left)",
            Sides::Right => "JoinProjectTransposeRule(right)",
        }
    }

    fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    fn apply(&self, cluster: &mut RelCluster, rel: RelId, result: &mut RuleResult) -> OptResult<()> {
        let Some(join) = cluster.operator(rel).join().cloned() else {
            return Ok(());
        };
        let (left, right) = (cluster.inputs(rel)[0], cluster.inputs(rel)[1]);
        let pull_left = self.pulls_left()
            && !join.join_type().generates_nulls_on_left()
            && cluster.operator(left).projection().is_some();
        let pull_right = self.pulls_right()
            && !join.join_type().generates_nulls_on_right()
            && cluster.operator(right).projection().is_some();
        if !pull_left && !pull_right {
            return Ok(());
        }

        let (new_left, mut exprs) = side_exprs(cluster, left, pull_left, 0);
        let new_left_count = cluster.field_count(new_left);
        let (new_right, right_exprs) = side_exprs(cluster, right, pull_right, new_left_count);
        exprs.extend(right_exprs);

        let condition = join.condition().push_past_project(&exprs);
        let names = cluster
            .row_type(rel)
            .field_names()
            .into_iter()
            .map(String::from)
            .collect();
        let new_join = cluster.create_default(
            Operator::Logical(LogicalJoin(Join::new(join.join_type(), condition))),
            vec![new_left, new_right],
        )?;
        result.add(cluster.create_default(
            Operator::Logical(LogicalProjection(Projection::new(exprs, names))),
            vec![new_join],
        )?);
        Ok(())
    }
}
