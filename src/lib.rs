//! ## Background
//!
//! A polystore engine plans one query over several heterogeneous stores. Between validation and
//! execution sits the planner: it holds the query as a graph of relational expressions, asks
//! questions about it (how many rows, in what order, which source columns an output comes
//! from), rewrites it with rules, and substitutes precomputed results where they apply.
//!
//! Rule based optimization is relative simple. We apply a collection of optimization rules to a
//! query plan repeatedly until some condition is met, for example, a fix point (plan no longer
//! changes) or number of times. The optimization rule is substitution rule, e.g. the optimizer
//! substitutes rule generated new plan for original plan, and in general the new plan should be
//! better than original plan.
//!
//! ## Design
//!
//! * [`plan`] The planning session, an arena of immutable nodes addressed by [`plan::RelId`].
//! * [`operator`] Relational operators, logical and enumerable.
//! * [`rex`] Scalar expressions.
//! * [`metadata`] Row counts, collations, distinct row counts and lineage, dispatched per node
//! kind with a memo and a cycle guard.
//! * [`shuttle`] Rebuilding plans bottom up.
//! * [`heuristic`] Heuristic optimizer implementation.
//! * [`rules`] Optimization rule definition and implementation.
//! * [`materialize`] Materialized view and lattice substitution.
//! * [`interpreter`] A pull based row interpreter for finished plans.
//!
//! ## Reference
//!
//! 1. Begoli, E., Camacho-Rodríguez, J., Hyde, J., Mior, M.J. and Lemire, D., 2018. Apache
//! Calcite: A foundational framework for optimized query processing over heterogeneous data
//! sources. In Proceedings of the 2018 International Conference on Management of Data
//! (pp. 221-230).
//! 2. Goldstein, J. and Larson, P.Å., 2001. Optimizing queries using materialized views: a
//! practical, scalable solution. ACM SIGMOD Record, 30(2), pp.331-342.

#[macro_use]
extern crate lazy_static;

pub mod bitset;
pub mod catalog;
pub mod config;
pub mod error;
pub mod explain;
pub mod heuristic;
pub mod interpreter;
pub mod materialize;
pub mod metadata;
pub mod operator;
pub mod optimizer;
pub mod plan;
pub mod properties;
pub mod rex;
pub mod rules;
pub mod shuttle;
pub mod types;
pub mod value;

#[cfg(test)]
mod test_util;
