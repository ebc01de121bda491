use crate::error::OptResult;
use crate::operator::LogicalOperator::LogicalProjection;
use crate::operator::{Operator, Projection};
use crate::plan::{RelCluster, RelId};
use crate::rex::RexNode;
use crate::rules::{is_logical_projection, Pattern, Rule, RuleResult};

/// Merges a project into the project below it.
#[derive(Clone, Debug)]
pub struct ProjectMergeRule {
    pattern: Pattern,
}

impl ProjectMergeRule {
    pub fn new() -> Self {
        Self {
            pattern: Pattern::with_inputs(
                is_logical_projection,
                vec![Pattern::new(is_logical_projection)],
            ),
        }
    }
}

impl Default for ProjectMergeRule {
    fn default() -> Self {
        Self::new()
    }
}

impl Rule for ProjectMergeRule {
    fn name(&self) -> &'static str {
        "ProjectMergeRule"
    }

    fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    fn apply(&self, cluster: &mut RelCluster, rel: RelId, result: &mut RuleResult) -> OptResult<()> {
        let bottom = cluster.inputs(rel)[0];
        let (Some(top_project), Some(bottom_project)) = (
            cluster.operator(rel).projection(),
            cluster.operator(bottom).projection(),
        ) else {
            return Ok(());
        };
        let exprs: Vec<RexNode> = top_project
            .exprs()
            .iter()
            .map(|e| e.push_past_project(bottom_project.exprs()))
            .collect();
        let projection = Projection::new(exprs, top_project.names().to_vec());
        let input = cluster.inputs(bottom)[0];

        result.add(cluster.create_default(
            Operator::Logical(LogicalProjection(projection)),
            vec![input],
        )?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use itertools::Itertools;

    use crate::operator::RelKind;
    use crate::test_util::cluster;

    #[test]
    fn test_merge_projects() {
        let mut cluster = cluster();
        let mut builder = cluster.builder();
        builder.scan(&["hr", "emps"]).unwrap();
        let exprs = vec![builder.field(3), builder.field(0)];
        builder.project(exprs).unwrap();
        let exprs = vec![builder.field(1), builder.field(0), builder.field(0)];
        let top = builder.project(exprs).unwrap().build().unwrap();

        let mut result = RuleResult::new();
        ProjectMergeRule::new().apply(&mut cluster, top, &mut result).unwrap();
        let merged = result.results().next().unwrap();

        assert_eq!(RelKind::LogicalTableScan, cluster.kind(cluster.inputs(merged)[0]));
        let projection = cluster.operator(merged).projection().unwrap();
        assert_eq!("$0, $3, $3", projection.exprs().iter().join(", "));
        assert_eq!(vec!["empno", "sal", "sal"], cluster.row_type(merged).field_names());
    }
}
