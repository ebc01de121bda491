use crate::error::OptResult;
use crate::operator::LogicalOperator::{LogicalFilter, LogicalJoin};
use crate::operator::{Filter, Join, JoinType, Operator};
use crate::plan::{RelCluster, RelId};
use crate::rex::{compose_conjunction, RexNode};
use crate::rules::{is_logical_filter, is_logical_join, Pattern, Rule, RuleResult};

/// Pushes the conjuncts of a filter above a join into the join.
///
/// A conjunct over one side goes below the join unless that side is null generating. Other
/// conjuncts join the condition of an inner join and stay above any other join.
#[derive(Clone, Debug)]
pub struct FilterIntoJoinRule {
    pattern: Pattern,
}

impl FilterIntoJoinRule {
    pub fn new() -> Self {
        Self {
            pattern: Pattern::with_inputs(is_logical_filter, vec![Pattern::new(is_logical_join)]),
        }
    }
}

impl Default for FilterIntoJoinRule {
    fn default() -> Self {
        Self::new()
    }
}

fn filter_over(cluster: &mut RelCluster, input: RelId, conjuncts: Vec<RexNode>) -> OptResult<RelId> {
    match compose_conjunction(conjuncts, true) {
        Some(condition) => cluster.create_default(
            Operator::Logical(LogicalFilter(Filter::new(condition))),
            vec![input],
        ),
        None => Ok(input),
    }
}

impl Rule for FilterIntoJoinRule {
    fn name(&self) -> &'static str {
        "FilterIntoJoinRule"
    }

    fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    fn apply(&self, cluster: &mut RelCluster, rel: RelId, result: &mut RuleResult) -> OptResult<()> {
        let join_rel = cluster.inputs(rel)[0];
        let (left, right) = (cluster.inputs(join_rel)[0], cluster.inputs(join_rel)[1]);
        let left_count = cluster.field_count(left);
        let (Some(filter), Some(join)) = (
            cluster.operator(rel).filter(),
            cluster.operator(join_rel).join(),
        ) else {
            return Ok(());
        };
        let join_type = join.join_type();
        let join_condition = join.condition().clone();

        let mut left_conjuncts = vec![];
        let mut right_conjuncts = vec![];
        let mut join_conjuncts = vec![];
        let mut above = vec![];
        for conjunct in filter.condition().conjunctions() {
            let refs = conjunct.input_refs();
            if refs.iter().all(|i| i < left_count) && !join_type.generates_nulls_on_left() {
                left_conjuncts.push(conjunct);
            } else if !refs.is_empty()
                && refs.iter().all(|i| i >= left_count)
                && !join_type.generates_nulls_on_right()
            {
                right_conjuncts.push(conjunct.shift(-(left_count as isize)));
            } else if join_type == JoinType::Inner {
                join_conjuncts.push(conjunct);
            } else {
                above.push(conjunct);
            }
        }
        if left_conjuncts.is_empty() && right_conjuncts.is_empty() && join_conjuncts.is_empty() {
            return Ok(());
        }

        let new_left = filter_over(cluster, left, left_conjuncts)?;
        let new_right = filter_over(cluster, right, right_conjuncts)?;
        let condition = compose_conjunction(
            std::iter::once(join_condition).chain(join_conjuncts),
            false,
        )
        .unwrap_or_else(|| RexNode::bool_literal(true));
        let new_join = cluster.create_default(
            Operator::Logical(LogicalJoin(Join::new(join_type, condition))),
            vec![new_left, new_right],
        )?;
        result.add(filter_over(cluster, new_join, above)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::RelKind;
    use crate::test_util::cluster;

    fn filter_over_join(cluster: &mut RelCluster, join_type: JoinType) -> RelId {
        let mut builder = cluster.builder();
        builder.scan(&["hr", "emps"]).unwrap();
        builder.scan(&["hr", "depts"]).unwrap();
        let cond = builder.join_field(0, 2).eq(builder.join_field(1, 0));
        builder.join(join_type, cond).unwrap();
        let cond = builder
            .field(3)
            .gt(RexNode::literal(100))
            .and(builder.field(4).gt(RexNode::literal(1)))
            .and(builder.field(0).eq(builder.field(4)));
        builder.filter(cond).unwrap().build().unwrap()
    }

    fn condition(cluster: &RelCluster, rel: RelId) -> String {
        match cluster.operator(rel).filter() {
            Some(f) => f.condition().to_string(),
            None => cluster.operator(rel).join().unwrap().condition().to_string(),
        }
    }

    #[test]
    fn test_inner_join_takes_everything() {
        let mut cluster = cluster();
        let filter = filter_over_join(&mut cluster, JoinType::Inner);
        let mut result = RuleResult::new();
        FilterIntoJoinRule::new().apply(&mut cluster, filter, &mut result).unwrap();
        let join = result.results().next().unwrap();

        assert_eq!(RelKind::LogicalJoin, cluster.kind(join));
        assert_eq!("AND(=($2, $4), =($0, $4))", condition(&cluster, join));
        let (left, right) = (cluster.inputs(join)[0], cluster.inputs(join)[1]);
        assert_eq!(">($3, 100)", condition(&cluster, left));
        assert_eq!(">($0, 1)", condition(&cluster, right));
    }

    #[test]
    fn test_left_join_keeps_right_side_above() {
        let mut cluster = cluster();
        let filter = filter_over_join(&mut cluster, JoinType::Left);
        let mut result = RuleResult::new();
        FilterIntoJoinRule::new().apply(&mut cluster, filter, &mut result).unwrap();
        let top = result.results().next().unwrap();

        assert_eq!(RelKind::LogicalFilter, cluster.kind(top));
        assert_eq!("AND(>($4, 1), =($0, $4))", condition(&cluster, top));
        let join = cluster.inputs(top)[0];
        assert_eq!("=($2, $4)", condition(&cluster, join));
        assert_eq!(RelKind::LogicalFilter, cluster.kind(cluster.inputs(join)[0]));
        assert_eq!(RelKind::LogicalTableScan, cluster.kind(cluster.inputs(join)[1]));
    }

    #[test]
    fn test_full_join_unchanged() {
        let mut cluster = cluster();
        let filter = filter_over_join(&mut cluster, JoinType::Full);
        let mut result = RuleResult::new();
        FilterIntoJoinRule::new().apply(&mut cluster, filter, &mut result).unwrap();
        assert!(result.is_empty());
    }
}
