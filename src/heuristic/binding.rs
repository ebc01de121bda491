use crate::plan::{RelCluster, RelId};
use crate::rules::{Pattern, PatternChildrenPredicate};

/// Checks whether the plan rooted at `rel` has the shape described by `pattern`.
///
/// Subsets never match an operator predicate: rules see registered nodes, and a subset is only
/// an input when a cost based planner put it there.
pub fn matches(cluster: &RelCluster, rel: RelId, pattern: &Pattern) -> bool {
    if !(pattern.predicate)(cluster.operator(rel)) {
        return false;
    }

    match &pattern.children {
        PatternChildrenPredicate::MatchedRecursive => true,
        PatternChildrenPredicate::None => cluster.inputs(rel).is_empty(),
        PatternChildrenPredicate::Predicate(children) => {
            let inputs = cluster.inputs(rel);
            inputs.len() == children.len()
                && inputs
                    .iter()
                    .zip(children.iter())
                    .all(|(input, child)| matches(cluster, *input, child))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::Operator;
    use crate::rex::RexNode;
    use crate::test_util::cluster;

    fn is_filter(op: &Operator) -> bool {
        op.filter().is_some()
    }

    fn is_projection(op: &Operator) -> bool {
        op.projection().is_some()
    }

    fn any(_: &Operator) -> bool {
        true
    }

    #[test]
    fn test_match_filter_over_project() {
        let mut cluster = cluster();
        let mut builder = cluster.builder();
        builder.scan(&["hr", "emps"]).unwrap();
        let exprs = vec![builder.field(0), builder.field(2)];
        builder.project(exprs).unwrap();
        let cond = builder.field(1).gt(RexNode::literal(10));
        let filter = builder.filter(cond).unwrap().build().unwrap();

        let pattern = Pattern {
            predicate: is_filter,
            children: PatternChildrenPredicate::Predicate(vec![Pattern {
                predicate: is_projection,
                children: PatternChildrenPredicate::MatchedRecursive,
            }]),
        };
        assert!(matches(&cluster, filter, &pattern));

        let input = cluster.inputs(filter)[0];
        assert!(!matches(&cluster, input, &pattern));

        let leaf = Pattern {
            predicate: any,
            children: PatternChildrenPredicate::None,
        };
        assert!(!matches(&cluster, filter, &leaf));
        assert!(matches(&cluster, cluster.inputs(input)[0], &leaf));
    }
}
