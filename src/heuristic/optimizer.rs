use std::collections::{HashMap, HashSet};

use anyhow::{bail, ensure};
use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::error::OptResult;
use crate::explain::explain;
use crate::heuristic::binding::matches;
use crate::heuristic::graph::PlanGraph;
use crate::optimizer::Optimizer;
use crate::plan::{on_register, RelCluster, RelId};
use crate::rules::{Rule, RuleImpl, RuleResult};
use crate::shuttle::replace;

/// Match order of plan tree.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchOrder {
    BottomUp,
    TopDown,
}

/// The rules a [`HepPlanner`] runs and how it runs them.
#[derive(Clone, Debug)]
pub struct HepProgram {
    rules: Vec<RuleImpl>,
    match_order: Option<MatchOrder>,
    /// Max number of iteration
    max_iter_times: Option<usize>,
}

impl HepProgram {
    /// A program running `rules` in order, with match order and iteration limit taken from the
    /// session config unless set.
    pub fn new(rules: Vec<RuleImpl>) -> Self {
        Self {
            rules,
            match_order: None,
            max_iter_times: None,
        }
    }

    pub fn with_match_order(mut self, match_order: MatchOrder) -> Self {
        self.match_order = Some(match_order);
        self
    }

    pub fn with_max_iter_times(mut self, max_iter_times: usize) -> Self {
        self.max_iter_times = Some(max_iter_times);
        self
    }

    pub fn rules(&self) -> &[RuleImpl] {
        &self.rules
    }
}

/// Rewrites a plan with a [`HepProgram`] until no rule applies.
pub struct HepPlanner<'a> {
    cluster: &'a mut RelCluster,
    match_order: MatchOrder,
    max_iter_times: usize,
    rules: Vec<RuleImpl>,
    /// Registered node for each digest.
    memo: HashMap<String, RelId>,
    registered: HashSet<RelId>,
    root: Option<RelId>,
}

impl<'a> Optimizer for HepPlanner<'a> {
    fn cluster(&self) -> &RelCluster {
        &*self.cluster
    }

    fn cluster_mut(&mut self) -> &mut RelCluster {
        &mut *self.cluster
    }

    fn ensure_registered(&mut self, id: RelId) -> OptResult<RelId> {
        if self.registered.contains(&id) {
            return Ok(id);
        }
        let new_id = on_register(self, id)?;
        let digest = self.cluster.digest(new_id).to_string();
        let registered = *self.memo.entry(digest).or_insert(new_id);
        if registered != id {
            trace!("Registered {} as {}", id, registered);
        }
        self.registered.insert(registered);
        Ok(registered)
    }

    fn set_root(&mut self, id: RelId) -> OptResult<()> {
        let root = self.ensure_registered(id)?;
        self.root = Some(root);
        Ok(())
    }

    fn find_best_plan(&mut self) -> OptResult<RelId> {
        let mut root = match self.root {
            Some(root) => root,
            None => bail!("heuristic planner has no root"),
        };

        for _times in 0..self.max_iter_times {
            // The plan no longer changes after iteration
            let mut fixed_point = true;
            let node_ids: Vec<RelId> =
                PlanGraph::new(self.cluster, root).nodes_iter(self.match_order).collect();
            for rel in node_ids {
                for rule in &*self.rules.clone() {
                    trace!(
                        "Trying to apply rule {} to expression {}",
                        rule.name(),
                        self.cluster.digest(rel)
                    );
                    if let Some(new_root) = self.apply_rule(rule, rel, root)? {
                        root = new_root;
                        debug!(
                            "Plan after applying rule {} is\n{}",
                            rule.name(),
                            explain(self.cluster, root)
                        );
                        fixed_point = false;
                        break;
                    }
                }

                if !fixed_point {
                    break;
                }
            }

            if fixed_point {
                break;
            }
        }

        self.root = Some(root);
        Ok(root)
    }
}

impl<'a> HepPlanner<'a> {
    pub fn new(cluster: &'a mut RelCluster, program: HepProgram) -> Self {
        let config = cluster.config();
        let match_order = program.match_order.unwrap_or(config.hep_match_order);
        let max_iter_times = program.max_iter_times.unwrap_or(config.hep_max_iter_times);
        Self {
            cluster,
            match_order,
            max_iter_times,
            rules: program.rules,
            memo: HashMap::new(),
            registered: HashSet::new(),
            root: None,
        }
    }

    /// Runs `program` over the plan rooted at `root` and returns the rewritten root.
    pub fn optimize(cluster: &mut RelCluster, program: HepProgram, root: RelId) -> OptResult<RelId> {
        let mut planner = HepPlanner::new(cluster, program);
        planner.set_root(root)?;
        planner.find_best_plan()
    }

    /// Applies `rule` to `rel` of the plan rooted at `root`, returning the new root if the plan
    /// changed.
    fn apply_rule(&mut self, rule: &RuleImpl, rel: RelId, root: RelId) -> OptResult<Option<RelId>> {
        if !matches(self.cluster, rel, rule.pattern()) {
            return Ok(None);
        }

        let mut results = RuleResult::new();
        rule.apply(self.cluster, rel, &mut results)?;
        ensure!(
            results.len() <= 1,
            "Rewrite rule should not return no more than 1 result."
        );

        let next = results.results().next();
        match next {
            Some(new_rel) => {
                let new_rel = self.ensure_registered(new_rel)?;
                if new_rel == rel {
                    // No transformation generated.
                    return Ok(None);
                }
                debug!("Rule {} rewrote {} to {}", rule.name(), rel, new_rel);
                let new_root = replace(self.cluster, root, rel, new_rel)?;
                Ok(Some(self.ensure_registered(new_root)?))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlannerConfig;
    use crate::operator::RelKind;
    use crate::rex::RexNode;
    use crate::rules::{FilterMergeRule, ProjectRemoveRule};
    use crate::test_util::{cluster, cluster_with_config};

    #[test]
    fn test_registration_deduplicates() {
        let mut cluster = cluster();
        let first = cluster.builder().scan(&["hr", "emps"]).unwrap().build().unwrap();
        let second = cluster.builder().scan(&["hr", "emps"]).unwrap().build().unwrap();
        assert_ne!(first, second);

        let mut planner = HepPlanner::new(&mut cluster, HepProgram::new(vec![]));
        let a = planner.ensure_registered(first).unwrap();
        let b = planner.ensure_registered(second).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_fixed_point() {
        let mut cluster = cluster();
        let mut builder = cluster.builder();
        builder.scan(&["hr", "emps"]).unwrap();
        let cond = builder.field(2).gt(RexNode::literal(10));
        builder.filter(cond).unwrap();
        let cond = builder.field(3).lt(RexNode::literal(100));
        builder.filter(cond).unwrap();
        let cond = builder.field(0).is_not_null();
        let root = builder.filter(cond).unwrap().build().unwrap();

        let program = HepProgram::new(vec![FilterMergeRule::new().into()]);
        let new_root = HepPlanner::optimize(&mut cluster, program, root).unwrap();
        assert_eq!(RelKind::LogicalFilter, cluster.kind(new_root));
        assert_eq!(RelKind::LogicalTableScan, cluster.kind(cluster.inputs(new_root)[0]));
        let condition = cluster.operator(new_root).filter().unwrap().condition();
        assert_eq!(3, condition.conjunctions().len());
    }

    #[test]
    fn test_max_iter_times_bounds_rewrites() {
        let config = PlannerConfig::default().with_hep_max_iter_times(1);
        let mut cluster = cluster_with_config(config);
        let mut builder = cluster.builder();
        builder.scan(&["hr", "emps"]).unwrap();
        let cond = builder.field(2).gt(RexNode::literal(10));
        builder.filter(cond).unwrap();
        let cond = builder.field(3).lt(RexNode::literal(100));
        builder.filter(cond).unwrap();
        let cond = builder.field(0).is_not_null();
        let root = builder.filter(cond).unwrap().build().unwrap();

        let program = HepProgram::new(vec![FilterMergeRule::new().into()]);
        let new_root = HepPlanner::optimize(&mut cluster, program, root).unwrap();
        // one merge, so two filters remain
        let input = cluster.inputs(new_root)[0];
        assert_eq!(RelKind::LogicalFilter, cluster.kind(input));
    }

    #[test]
    fn test_no_rule_applies() {
        let mut cluster = cluster();
        let root = cluster.builder().scan(&["hr", "emps"]).unwrap().build().unwrap();
        let program = HepProgram::new(vec![ProjectRemoveRule::new().into()])
            .with_match_order(MatchOrder::BottomUp);
        assert_eq!(root, HepPlanner::optimize(&mut cluster, program, root).unwrap());
    }
}
