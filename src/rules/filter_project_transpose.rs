use crate::error::OptResult;
use crate::operator::LogicalOperator::LogicalFilter;
use crate::operator::{Filter, Operator};
use crate::plan::{RelCluster, RelId};
use crate::rules::{
    is_logical_filter, is_logical_projection, Pattern, Rule, RuleResult,
};

/// Pushes a filter below the project it reads from, rewriting the condition over the project's
/// input.
#[derive(Clone, Debug)]
pub struct FilterProjectTransposeRule {
    pattern: Pattern,
}

impl FilterProjectTransposeRule {
    pub fn new() -> Self {
        Self {
            pattern: Pattern::with_inputs(
                is_logical_filter,
                vec![Pattern::new(is_logical_projection)],
            ),
        }
    }
}

impl Default for FilterProjectTransposeRule {
    fn default() -> Self {
        Self::new()
    }
}

impl Rule for FilterProjectTransposeRule {
    fn name(&self) -> &'static str {
        "FilterProjectTransposeRule"
    }

    fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    fn apply(&self, cluster: &mut RelCluster, rel: RelId, result: &mut RuleResult) -> OptResult<()> {
        let project = cluster.inputs(rel)[0];
        let (Some(filter), Some(projection)) = (
            cluster.operator(rel).filter(),
            cluster.operator(project).projection(),
        ) else {
            return Ok(());
        };
        let condition = filter.condition().push_past_project(projection.exprs());
        let input = cluster.inputs(project)[0];

        let new_filter = cluster.create_default(
            Operator::Logical(LogicalFilter(Filter::new(condition))),
            vec![input],
        )?;
        let traits = cluster.traits(project).clone();
        result.add(cluster.copy(project, &traits, &[new_filter])?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::RelKind;
    use crate::rex::RexNode;
    use crate::test_util::cluster;

    #[test]
    fn test_filter_moves_below_project() {
        let mut cluster = cluster();
        let mut builder = cluster.builder();
        builder.scan(&["hr", "emps"]).unwrap();
        let exprs = vec![builder.field(0), builder.field(3)];
        builder.project(exprs).unwrap();
        let cond = builder.field(1).gt(RexNode::literal(10));
        let filter = builder.filter(cond).unwrap().build().unwrap();

        let mut result = RuleResult::new();
        FilterProjectTransposeRule::new()
            .apply(&mut cluster, filter, &mut result)
            .unwrap();
        let new_rel = result.results().next().unwrap();

        assert_eq!(RelKind::LogicalProject, cluster.kind(new_rel));
        let new_filter = cluster.inputs(new_rel)[0];
        assert_eq!(
            ">($3, 10)",
            cluster.operator(new_filter).filter().unwrap().condition().to_string()
        );
        assert_eq!(RelKind::LogicalTableScan, cluster.kind(cluster.inputs(new_filter)[0]));
        assert!(cluster.row_type(filter).is_compatible(cluster.row_type(new_rel)));
    }
}
