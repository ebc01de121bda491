use crate::error::OptResult;
use crate::operator::LogicalOperator::LogicalFilter;
use crate::operator::{Filter, Operator};
use crate::plan::{RelCluster, RelId};
use crate::rex::compose_conjunction;
use crate::rules::{is_logical_filter, Pattern, Rule, RuleResult};

/// Combines two stacked filters into one filter with the conjunction of both conditions.
#[derive(Clone, Debug)]
pub struct FilterMergeRule {
    pattern: Pattern,
}

impl FilterMergeRule {
    pub fn new() -> Self {
        Self {
            pattern: Pattern::with_inputs(is_logical_filter, vec![Pattern::new(is_logical_filter)]),
        }
    }
}

impl Default for FilterMergeRule {
    fn default() -> Self {
        Self::new()
    }
}

impl Rule for FilterMergeRule {
    fn name(&self) -> &'static str {
        "FilterMergeRule"
    }

    fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    fn apply(&self, cluster: &mut RelCluster, rel: RelId, result: &mut RuleResult) -> OptResult<()> {
        let bottom = cluster.inputs(rel)[0];
        let (Some(top_filter), Some(bottom_filter)) =
            (cluster.operator(rel).filter(), cluster.operator(bottom).filter())
        else {
            return Ok(());
        };
        let condition = compose_conjunction(
            vec![
                bottom_filter.condition().clone(),
                top_filter.condition().clone(),
            ],
            false,
        );
        let Some(condition) = condition else {
            return Ok(());
        };
        let input = cluster.inputs(bottom)[0];
        result.add(cluster.create_default(
            Operator::Logical(LogicalFilter(Filter::new(condition))),
            vec![input],
        )?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rex::RexNode;
    use crate::test_util::cluster;

    #[test]
    fn test_merge_conditions_bottom_first() {
        let mut cluster = cluster();
        let mut builder = cluster.builder();
        builder.scan(&["hr", "emps"]).unwrap();
        let cond = builder.field(2).gt(RexNode::literal(10));
        builder.filter(cond).unwrap();
        let cond = builder.field(3).lt(RexNode::literal(100));
        let top = builder.filter(cond).unwrap().build().unwrap();

        let mut result = RuleResult::new();
        FilterMergeRule::new().apply(&mut cluster, top, &mut result).unwrap();
        let merged = result.results().next().unwrap();
        assert_eq!(
            "AND(>($2, 10), <($3, 100))",
            cluster.operator(merged).filter().unwrap().condition().to_string()
        );
    }
}
