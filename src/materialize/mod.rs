//! Rewriting queries to read materialized views and lattices.
//!
//! A [`Materialization`] pairs a table holding precomputed rows with the query that computes
//! them. Substitution normalizes both the query and the materialization's query with a small
//! heuristic program, then looks for the latter inside the former with a
//! [`SubstitutionVisitor`]. Every occurrence yields one alternative plan, and alternatives are
//! combined across materializations.
//!
//! Lattices are handled separately: a query joining the tables of a [`Lattice`] can be
//! rewritten to scan its star table, and materializations defined over a star table (tiles)
//! apply to queries after that rewrite.

use std::collections::HashMap;
use std::sync::Arc;

use itertools::Itertools;
use log::debug;
use petgraph::algo::{has_path_connecting, toposort};
use petgraph::graph::{DiGraph, NodeIndex};

use crate::error::OptResult;
use crate::explain::explain;
use crate::heuristic::{HepPlanner, HepProgram};
use crate::optimizer::Optimizer;
use crate::plan::{RelCluster, RelId};
use crate::rules::{leaf_join_rules, normalize_rules};

mod lattice;
pub use lattice::*;
mod substitution;
pub use substitution::*;

/// A table of precomputed rows and the query over other tables that computes them.
///
/// Both plans live in the cluster that queries are planned in.
#[derive(Clone, Debug)]
pub struct Materialization {
    table_rel: RelId,
    query_rel: RelId,
    qualified_table_name: Option<Vec<String>>,
    star: Option<Arc<Lattice>>,
}

impl Materialization {
    pub fn new(table_rel: RelId, query_rel: RelId) -> Self {
        Self {
            table_rel,
            query_rel,
            qualified_table_name: None,
            star: None,
        }
    }

    /// A materialization of an aggregate over `lattice`'s star table.
    pub fn tile(lattice: Arc<Lattice>, table_rel: RelId, query_rel: RelId) -> Self {
        Self {
            star: Some(lattice),
            ..Self::new(table_rel, query_rel)
        }
    }

    /// Name of the table holding the rows. Unnamed materializations are only used when given to
    /// [`substitute`] directly.
    pub fn with_table_name<S: Into<String>>(mut self, name: Vec<S>) -> Self {
        self.qualified_table_name = Some(name.into_iter().map(Into::into).collect());
        self
    }

    pub fn table_rel(&self) -> RelId {
        self.table_rel
    }

    pub fn query_rel(&self) -> RelId {
        self.query_rel
    }

    pub fn qualified_table_name(&self) -> Option<&[String]> {
        self.qualified_table_name.as_deref()
    }

    pub fn star(&self) -> Option<&Arc<Lattice>> {
        self.star.as_ref()
    }
}

/// Materializations that may be used by the query rooted at `rel`, those built on top of other
/// materializations after the ones they read.
///
/// A materialization is applicable if it reads, possibly through other materializations, a table
/// the query reads. Tiles are not considered.
pub fn get_applicable_materializations<'m>(
    cluster: &RelCluster,
    rel: RelId,
    materializations: &'m [Materialization],
) -> Vec<&'m Materialization> {
    let mut graph = DiGraph::<Vec<String>, ()>::new();
    let mut nodes = HashMap::<Vec<String>, NodeIndex>::new();
    let mut by_name = HashMap::<Vec<String>, &Materialization>::new();
    let mut node = |graph: &mut DiGraph<Vec<String>, ()>, name: &[String]| {
        *nodes
            .entry(name.to_vec())
            .or_insert_with(|| graph.add_node(name.to_vec()))
    };

    for materialization in materializations {
        let name = match (&materialization.qualified_table_name, &materialization.star) {
            (Some(name), None) => name,
            _ => continue,
        };
        by_name.insert(name.clone(), materialization);
        let to = node(&mut graph, name);
        for table in cluster.find_tables(materialization.query_rel) {
            let from = node(&mut graph, table.qualified_name());
            graph.update_edge(from, to, ());
        }
    }

    let order = match toposort(&graph, None) {
        Ok(order) => order,
        Err(cycle) => {
            debug!(
                "Materializations read each other through {}, none applies",
                graph[cycle.node_id()].join(".")
            );
            return vec![];
        }
    };
    let query_tables = cluster
        .find_tables(rel)
        .iter()
        .filter_map(|t| {
            graph
                .node_indices()
                .find(|idx| graph[*idx].as_slice() == t.qualified_name())
        })
        .collect_vec();

    order
        .into_iter()
        .filter_map(|idx| {
            let materialization = by_name.get(&graph[idx])?;
            query_tables
                .iter()
                .any(|table| has_path_connecting(&graph, *table, idx, None))
                .then(|| *materialization)
        })
        .collect()
}

/// Every plan obtained by replacing parts of the query rooted at `rel` by applicable
/// materializations, with the materializations each one uses. The query itself is not included.
pub fn use_materialized_views<'m>(
    cluster: &mut RelCluster,
    rel: RelId,
    materializations: &'m [Materialization],
) -> OptResult<Vec<(RelId, Vec<&'m Materialization>)>> {
    if !cluster.config().materializations_enabled {
        return Ok(vec![]);
    }

    let applicable = get_applicable_materializations(cluster, rel, materializations);
    let mut applied: Vec<(RelId, Vec<&Materialization>)> = vec![(rel, vec![])];
    for materialization in applicable {
        let count = applied.len();
        for i in 0..count {
            let current = applied[i].0;
            let substitutes = substitute(cluster, current, materialization)?;
            if !substitutes.is_empty() {
                let mut uses = applied[i].1.clone();
                uses.push(materialization);
                for substitute in substitutes {
                    debug!(
                        "Use materialization {:?}:\n{}",
                        materialization.qualified_table_name(),
                        explain(cluster, substitute)
                    );
                    applied.push((substitute, uses.clone()));
                }
            }
        }
    }

    applied.remove(0);
    Ok(applied)
}

/// Plans for each lattice whose root table the query rooted at `rel` reads, rewritten to read the
/// lattice's star table.
pub fn use_lattices(
    cluster: &mut RelCluster,
    rel: RelId,
    lattices: &[Arc<Lattice>],
) -> OptResult<Vec<(RelId, Arc<Lattice>)>> {
    if !cluster.config().lattices_enabled {
        return Ok(vec![]);
    }

    let query_tables = cluster.find_tables(rel);
    let mut leaf_join_root = None;
    let mut uses = vec![];
    for lattice in lattices {
        if !query_tables.contains(lattice.root_table()) {
            continue;
        }
        let root = match leaf_join_root {
            Some(root) => root,
            None => *leaf_join_root.insert(to_leaf_join_form(cluster, rel)?),
        };
        if let Some(rewritten) = lattice.rewrite(cluster, root)? {
            debug!("Use lattice:\n{}", explain(cluster, rewritten));
            uses.push((rewritten, lattice.clone()));
        }
    }
    Ok(uses)
}

/// Rewrites the query rooted at `root` to read `materialization`, once per place it occurs.
pub fn substitute(
    cluster: &mut RelCluster,
    root: RelId,
    materialization: &Materialization,
) -> OptResult<Vec<RelId>> {
    let mut root = root;
    // A tile is in terms of the star table, so the query has to be first.
    if let Some(lattice) = &materialization.star {
        let leaf_join = to_leaf_join_form(cluster, root)?;
        if let Some(star_root) = lattice.rewrite(cluster, leaf_join)? {
            root = star_root;
        }
    }

    // Push filters to the bottom, and combine projects on top. Both plans go through one
    // planner so that equal subtrees end up as the same node.
    let (target, root) = {
        let mut planner = HepPlanner::new(cluster, HepProgram::new(normalize_rules()));
        planner.set_root(materialization.query_rel)?;
        let target = planner.find_best_plan()?;
        planner.set_root(root)?;
        (target, planner.find_best_plan()?)
    };

    SubstitutionVisitor::new(cluster, target, root).go(materialization.table_rel)
}

/// Joins with filters pushed into them and projections pulled above them, the shape lattices
/// match.
pub fn to_leaf_join_form(cluster: &mut RelCluster, rel: RelId) -> OptResult<RelId> {
    HepPlanner::optimize(cluster, HepProgram::new(leaf_join_rules()), rel)
}
