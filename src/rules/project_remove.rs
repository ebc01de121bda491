use crate::error::OptResult;
use crate::plan::{RelCluster, RelId};
use crate::rex::is_identity;
use crate::rules::{is_logical_projection, Pattern, Rule, RuleResult};

/// Removes a project that returns its input's fields unchanged.
#[derive(Clone, Debug)]
pub struct ProjectRemoveRule {
    pattern: Pattern,
}

impl ProjectRemoveRule {
    pub fn new() -> Self {
        Self {
            pattern: Pattern::new(is_logical_projection),
        }
    }
}

impl Default for ProjectRemoveRule {
    fn default() -> Self {
        Self::new()
    }
}

impl Rule for ProjectRemoveRule {
    fn name(&self) -> &'static str {
        "ProjectRemoveRule"
    }

    fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    fn apply(&self, cluster: &mut RelCluster, rel: RelId, result: &mut RuleResult) -> OptResult<()> {
        let input = cluster.inputs(rel)[0];
        if let Some(projection) = cluster.operator(rel).projection() {
            if is_identity(projection.exprs(), cluster.row_type(input)) {
                result.add(input);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::cluster;

    #[test]
    fn test_remove_identity_only() {
        let mut cluster = cluster();
        let mut builder = cluster.builder();
        builder.scan(&["hr", "emps"]).unwrap();
        let exprs = (0..4).map(|i| builder.field(i)).collect();
        let identity = builder.project(exprs).unwrap().build().unwrap();
        let scan = cluster.inputs(identity)[0];

        let mut result = RuleResult::new();
        ProjectRemoveRule::new()
            .apply(&mut cluster, identity, &mut result)
            .unwrap();
        assert_eq!(vec![scan], result.results().collect::<Vec<_>>());

        let mut builder = cluster.builder();
        builder.push(scan);
        let exprs = vec![builder.field(1), builder.field(0), builder.field(2), builder.field(3)];
        let swapped = builder.project(exprs).unwrap().build().unwrap();
        let mut result = RuleResult::new();
        ProjectRemoveRule::new()
            .apply(&mut cluster, swapped, &mut result)
            .unwrap();
        assert!(result.is_empty());
    }
}
