//! Rewrite rules of the heuristic planner.
//!
//! A rule declares the shape of plan it rewrites as a [`Pattern`]. The planner only calls
//! [`Rule::apply`] on nodes matching the pattern, and a rule adds at most one equivalent node to
//! its [`RuleResult`], or none if it decides not to fire.

use enum_dispatch::enum_dispatch;

use crate::error::OptResult;
use crate::plan::{RelCluster, RelId};

mod filter_into_join;
mod filter_merge;
mod filter_project_transpose;
mod join_project_transpose;
mod pattern;
mod project_merge;
mod project_remove;

pub use filter_into_join::*;
pub use filter_merge::*;
pub use filter_project_transpose::*;
pub use join_project_transpose::*;
pub use pattern::*;
pub use project_merge::*;
pub use project_remove::*;

#[enum_dispatch]
pub trait Rule {
    fn name(&self) -> &'static str;

    fn pattern(&self) -> &Pattern;

    /// Rewrites the plan rooted at `rel`, which matches [`Rule::pattern`].
    fn apply(&self, cluster: &mut RelCluster, rel: RelId, result: &mut RuleResult) -> OptResult<()>;
}

#[enum_dispatch(Rule)]
#[derive(Clone, Debug)]
pub enum RuleImpl {
    FilterProjectTransposeRule,
    ProjectMergeRule,
    ProjectRemoveRule,
    FilterMergeRule,
    FilterIntoJoinRule,
    JoinProjectTransposeRule,
}

/// Nodes produced by one application of a rule.
#[derive(Debug, Default)]
pub struct RuleResult {
    results: Vec<RelId>,
}

impl RuleResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, rel: RelId) {
        self.results.push(rel);
    }

    pub fn results(&self) -> impl Iterator<Item = RelId> + '_ {
        self.results.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Pushes filters below projects, merges adjacent projects and drops identity projects.
///
/// Queries and materialized views are both normalized with these before they are matched.
pub fn normalize_rules() -> Vec<RuleImpl> {
    vec![
        FilterProjectTransposeRule::new().into(),
        ProjectMergeRule::new().into(),
        ProjectRemoveRule::new().into(),
    ]
}

/// Rules producing the leaf-join form: projects pulled above joins, filters pushed into and
/// below them, so that a join tree reads as joins over scans.
pub fn leaf_join_rules() -> Vec<RuleImpl> {
    vec![
        JoinProjectTransposeRule::both().into(),
        JoinProjectTransposeRule::left().into(),
        JoinProjectTransposeRule::right().into(),
        FilterIntoJoinRule::new().into(),
        ProjectRemoveRule::new().into(),
        ProjectMergeRule::new().into(),
    ]
}
