use anyhow::ensure;
use itertools::Itertools;
use log::debug;

use crate::bitset::ImmutableBitSet;
use crate::error::{OptError, OptResult};
use crate::operator::LogicalOperator::{LogicalAggregate, LogicalFilter, LogicalProjection};
use crate::operator::{Aggregate, AggregateCall, Filter, Operator, Projection};
use crate::plan::{RelCluster, RelId};
use crate::rex::{compose_conjunction, is_identity, RexNode};
use crate::shuttle::replace;

/// Finds the places where a materialized view's query occurs in a query, both already
/// normalized, and rewrites each of them to read the view.
///
/// A query node is equivalent to the view when the target matches it in one of these ways:
/// - it is the target itself;
/// - both filter the same input and the target's conjuncts are among the query's, the rest being
///   applied over the view;
/// - both project the same input, possibly filtered, and every query expression can be computed
///   from the target's outputs;
/// - both aggregate the same input and the query groups by a subset of the target's group keys,
///   rolling its calls up from the target's.
pub struct SubstitutionVisitor<'a> {
    cluster: &'a mut RelCluster,
    target: RelId,
    query: RelId,
}

enum Unified {
    Filter(Vec<RexNode>),
    Project {
        residual: Vec<RexNode>,
        exprs: Vec<RexNode>,
        names: Vec<String>,
    },
    Aggregate(AggregateRollUp),
}

struct AggregateRollUp {
    /// Position in the view of each group key of the query, in query order.
    group_positions: Vec<usize>,
    /// Position in the view of each call of the query.
    call_positions: Vec<usize>,
    calls: Vec<AggregateCall>,
    /// Whether the view has exactly the query's group keys.
    same_groups: bool,
    names: Vec<String>,
}

impl<'a> SubstitutionVisitor<'a> {
    pub fn new(cluster: &'a mut RelCluster, target: RelId, query: RelId) -> Self {
        Self {
            cluster,
            target,
            query,
        }
    }

    /// Returns one rewritten query per occurrence of the target, each reading `replacement`.
    pub fn go(&mut self, replacement: RelId) -> OptResult<Vec<RelId>> {
        let (target_type, replacement_type) = (
            self.cluster.row_type(self.target),
            self.cluster.row_type(replacement),
        );
        ensure!(
            target_type.is_compatible(replacement_type),
            OptError::RowTypeMismatch {
                rel: replacement,
                before: target_type.to_string(),
                after: replacement_type.to_string(),
            }
        );

        let mut results = vec![];
        let rels: Vec<RelId> = self.cluster.bfs_iterator(self.query).collect();
        for rel in rels {
            let unified = self.unify(rel);
            if let Some(unified) = unified {
                let substitute = self.build(unified, replacement)?;
                debug!("Substituted {} by {} in {}", rel, substitute, self.query);
                results.push(replace(self.cluster, self.query, rel, substitute)?);
            }
        }
        Ok(results)
    }

    fn unify(&self, rel: RelId) -> Option<Unified> {
        let cluster = &*self.cluster;
        let target = self.target;
        if rel == target || cluster.operator(target).filter().is_some() {
            if let Some(residual) = self.residual(rel, target) {
                return Some(Unified::Filter(residual));
            }
        }

        let operator = cluster.operator(rel);
        let target_operator = cluster.operator(target);
        if let (Some(project), Some(target_project)) =
            (operator.projection(), target_operator.projection())
        {
            return self.unify_project(rel, project, target_project);
        }
        if let (Some(aggregate), Some(target_aggregate)) =
            (operator.aggregate(), target_operator.aggregate())
        {
            return self.unify_aggregate(rel, aggregate, target_aggregate);
        }
        None
    }

    /// Conjuncts that turn `target` into `rel` when applied over it.
    fn residual(&self, rel: RelId, target: RelId) -> Option<Vec<RexNode>> {
        if rel == target {
            return Some(vec![]);
        }
        let cluster = &*self.cluster;
        let filter = cluster.operator(rel).filter()?;
        let input = cluster.inputs(rel)[0];
        let conjuncts = filter.condition().conjunctions();
        if input == target {
            return Some(conjuncts);
        }

        let target_filter = cluster.operator(target).filter()?;
        if cluster.inputs(target)[0] != input {
            return None;
        }
        let target_conjuncts = target_filter.condition().conjunctions();
        if target_conjuncts.iter().all(|c| conjuncts.contains(c)) {
            Some(
                conjuncts
                    .into_iter()
                    .filter(|c| !target_conjuncts.contains(c))
                    .collect(),
            )
        } else {
            None
        }
    }

    fn unify_project(
        &self,
        rel: RelId,
        project: &Projection,
        target_project: &Projection,
    ) -> Option<Unified> {
        let cluster = &*self.cluster;
        let residual = self.residual(cluster.inputs(rel)[0], cluster.inputs(self.target)[0])?;
        let target_type = cluster.row_type(self.target);

        // Rewrites an expression over the shared input as one over the target's outputs.
        let over_target = |e: &RexNode| -> Option<RexNode> {
            if let Some(j) = target_project.exprs().iter().position(|t| t == e) {
                return Some(RexNode::input_ref(j, target_type));
            }
            e.remap_input_refs(|i| {
                target_project
                    .exprs()
                    .iter()
                    .position(|t| t.as_input_ref() == Some(i))
            })
        };

        let exprs = project
            .exprs()
            .iter()
            .map(over_target)
            .collect::<Option<Vec<_>>>()?;
        let residual = residual
            .iter()
            .map(over_target)
            .collect::<Option<Vec<_>>>()?;
        Some(Unified::Project {
            residual,
            exprs,
            names: project.names().to_vec(),
        })
    }

    fn unify_aggregate(
        &self,
        rel: RelId,
        aggregate: &Aggregate,
        target_aggregate: &Aggregate,
    ) -> Option<Unified> {
        let cluster = &*self.cluster;
        let input = cluster.inputs(rel)[0];
        let target_input = cluster.inputs(self.target)[0];

        // Target input field read by each query input field.
        let input_map: Vec<usize> = if input == target_input {
            (0..cluster.field_count(input)).collect()
        } else {
            let projection = cluster.operator(input).projection()?;
            if cluster.inputs(input)[0] != target_input {
                return None;
            }
            projection
                .mapping()
                .into_iter()
                .collect::<Option<Vec<_>>>()?
        };

        let target_groups = target_aggregate.group_set();
        let group_positions = aggregate
            .group_set()
            .iter()
            .map(|g| target_groups.index_of(input_map[g]))
            .collect::<Option<Vec<_>>>()?;

        let mut call_positions = vec![];
        for call in aggregate.agg_calls() {
            let args = call.args().iter().map(|a| input_map[*a]).collect_vec();
            let k = target_aggregate
                .agg_calls()
                .iter()
                .position(|t| t.function() == call.function() && t.args() == args.as_slice())?;
            call_positions.push(target_aggregate.group_count() + k);
        }

        Some(Unified::Aggregate(AggregateRollUp {
            same_groups: group_positions.len() == target_aggregate.group_count(),
            group_positions,
            call_positions,
            calls: aggregate.agg_calls().to_vec(),
            names: cluster
                .row_type(rel)
                .field_names()
                .into_iter()
                .map(String::from)
                .collect(),
        }))
    }

    fn filter(&mut self, input: RelId, conjuncts: Vec<RexNode>) -> OptResult<RelId> {
        match compose_conjunction(conjuncts, true) {
            Some(condition) => self.cluster.create_default(
                Operator::Logical(LogicalFilter(Filter::new(condition))),
                vec![input],
            ),
            None => Ok(input),
        }
    }

    fn project(&mut self, input: RelId, exprs: Vec<RexNode>, names: Vec<String>) -> OptResult<RelId> {
        if is_identity(&exprs, self.cluster.row_type(input)) {
            return Ok(input);
        }
        self.cluster.create_default(
            Operator::Logical(LogicalProjection(Projection::new(exprs, names))),
            vec![input],
        )
    }

    fn refs(&self, input: RelId, positions: impl IntoIterator<Item = usize>) -> Vec<RexNode> {
        let row_type = self.cluster.row_type(input);
        positions
            .into_iter()
            .map(|p| RexNode::input_ref(p, row_type))
            .collect()
    }

    fn build(&mut self, unified: Unified, replacement: RelId) -> OptResult<RelId> {
        match unified {
            Unified::Filter(residual) => self.filter(replacement, residual),
            Unified::Project {
                residual,
                exprs,
                names,
            } => {
                let input = self.filter(replacement, residual)?;
                self.project(input, exprs, names)
            }
            Unified::Aggregate(roll_up) if roll_up.same_groups => {
                let exprs = self.refs(
                    replacement,
                    roll_up
                        .group_positions
                        .iter()
                        .chain(roll_up.call_positions.iter())
                        .copied(),
                );
                self.project(replacement, exprs, roll_up.names)
            }
            Unified::Aggregate(roll_up) => {
                let calls = roll_up
                    .calls
                    .iter()
                    .zip(roll_up.call_positions.iter())
                    .map(|(call, p)| {
                        AggregateCall::new(call.function().roll_up(), vec![*p], call.name())
                    })
                    .collect();
                let group_set = ImmutableBitSet::of(roll_up.group_positions.iter().copied());
                let aggregate = self.cluster.create_default(
                    Operator::Logical(LogicalAggregate(Aggregate::new(group_set.clone(), calls))),
                    vec![replacement],
                )?;
                // the rolled up aggregate outputs its keys in view order
                let positions = roll_up
                    .group_positions
                    .iter()
                    .filter_map(|p| group_set.index_of(*p))
                    .chain(
                        (0..roll_up.calls.len()).map(|i| group_set.cardinality() + i),
                    )
                    .collect_vec();
                let exprs = self.refs(aggregate, positions);
                self.project(aggregate, exprs, roll_up.names)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::catalog::RelOptTable;
    use crate::interpreter::Interpreter;
    use crate::operator::LogicalOperator::LogicalScan;
    use crate::operator::{AggFunction, RelKind, TableScan};
    use crate::row;
    use crate::test_util::cluster;
    use crate::types::{DataType, TypeFactory};
    use crate::value::Row;

    fn emps(cluster: &mut RelCluster) -> RelId {
        cluster.builder().scan(&["hr", "emps"]).unwrap().build().unwrap()
    }

    fn filter(cluster: &mut RelCluster, input: RelId, conjuncts: Vec<RexNode>) -> RelId {
        let cond = compose_conjunction(conjuncts, false).unwrap();
        cluster.builder().push(input).filter(cond).unwrap().build().unwrap()
    }

    fn col(cluster: &RelCluster, rel: RelId, i: usize) -> RexNode {
        RexNode::input_ref(i, cluster.row_type(rel))
    }

    fn scan_of(cluster: &mut RelCluster, table: RelOptTable) -> RelId {
        let scan = LogicalScan(TableScan::new(Arc::new(table)));
        cluster.create_default(Operator::Logical(scan), vec![]).unwrap()
    }

    /// Scans a table holding the rows `query` evaluates to.
    fn stored(cluster: &mut RelCluster, name: &str, query: RelId) -> RelId {
        let rows = Interpreter::new(cluster, query).run().unwrap();
        let table = RelOptTable::new(vec!["mv", name], cluster.row_type(query).clone());
        scan_of(cluster, table.with_rows(rows))
    }

    fn sorted_rows(cluster: &mut RelCluster, root: RelId) -> Vec<Row> {
        let mut rows = Interpreter::new(cluster, root).run().unwrap();
        rows.sort();
        rows
    }

    fn count(cluster: &mut RelCluster, input: RelId, group_keys: Vec<usize>) -> RelId {
        cluster
            .builder()
            .push(input)
            .aggregate(
                ImmutableBitSet::of(group_keys),
                vec![AggregateCall::new(AggFunction::Count, vec![], "c")],
            )
            .unwrap()
            .build()
            .unwrap()
    }

    #[test]
    fn test_exact_match_replaces_subtree() {
        let mut cluster = cluster();
        let scan = emps(&mut cluster);
        let view = emps(&mut cluster);
        let cond = col(&cluster, scan, 2).gt(RexNode::literal(10));
        let query = filter(&mut cluster, scan, vec![cond]);

        let results = SubstitutionVisitor::new(&mut cluster, scan, query).go(view).unwrap();
        assert_eq!(1, results.len());
        assert_eq!(&[view], cluster.inputs(results[0]));
    }

    #[test]
    fn test_filter_subsumption_keeps_residual() {
        let mut cluster = cluster();
        let scan = emps(&mut cluster);
        let view = emps(&mut cluster);
        let by_dept = col(&cluster, scan, 2).eq(RexNode::literal(10));
        let by_sal = col(&cluster, scan, 3).gt(RexNode::literal(800));
        let target = filter(&mut cluster, scan, vec![by_dept.clone()]);
        let query = filter(&mut cluster, scan, vec![by_dept.clone(), by_sal]);

        let results = SubstitutionVisitor::new(&mut cluster, target, query).go(view).unwrap();
        assert_eq!(1, results.len());
        let root = results[0];
        assert_eq!(
            ">($3, 800)",
            cluster.operator(root).filter().unwrap().condition().to_string()
        );
        assert_eq!(&[view], cluster.inputs(root));

        // a stricter view cannot answer a looser query
        let by_empno = col(&cluster, scan, 0).lt(RexNode::literal(5));
        let strict = filter(&mut cluster, scan, vec![by_dept.clone(), by_empno]);
        let loose = filter(&mut cluster, scan, vec![by_dept]);
        let results = SubstitutionVisitor::new(&mut cluster, strict, loose).go(view).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_project_over_view_columns() {
        let mut cluster = cluster();
        let scan = emps(&mut cluster);
        let exprs = vec![col(&cluster, scan, 0), col(&cluster, scan, 3)];
        let target = cluster
            .builder()
            .push(scan)
            .project(exprs)
            .unwrap()
            .build()
            .unwrap();
        let by_sal = col(&cluster, scan, 3).gt(RexNode::literal(800));
        let filtered = filter(&mut cluster, scan, vec![by_sal]);
        let exprs = vec![col(&cluster, filtered, 3)];
        let query = cluster
            .builder()
            .push(filtered)
            .project(exprs)
            .unwrap()
            .build()
            .unwrap();

        let results = SubstitutionVisitor::new(&mut cluster, target, query).go(target).unwrap();
        assert_eq!(1, results.len());
        let root = results[0];
        assert_eq!(RelKind::LogicalProject, cluster.kind(root));
        assert_eq!(
            "$1",
            cluster.operator(root).projection().unwrap().exprs()[0].to_string()
        );
        let residual = cluster.inputs(root)[0];
        assert_eq!(
            ">($1, 800)",
            cluster.operator(residual).filter().unwrap().condition().to_string()
        );
    }

    #[test]
    fn test_aggregate_roll_up() {
        let mut cluster = cluster();
        let scan = emps(&mut cluster);
        let target = cluster
            .builder()
            .push(scan)
            .aggregate(
                ImmutableBitSet::of(vec![1, 2]),
                vec![AggregateCall::new(AggFunction::Count, vec![], "c")],
            )
            .unwrap()
            .build()
            .unwrap();
        let query = cluster
            .builder()
            .push(scan)
            .aggregate(
                ImmutableBitSet::of(vec![2]),
                vec![AggregateCall::new(AggFunction::Count, vec![], "c")],
            )
            .unwrap()
            .build()
            .unwrap();

        let results = SubstitutionVisitor::new(&mut cluster, target, query).go(target).unwrap();
        assert_eq!(1, results.len());
        let aggregate = cluster.operator(results[0]).aggregate().unwrap();
        assert_eq!(&ImmutableBitSet::of(vec![1]), aggregate.group_set());
        assert_eq!("SUM0($2)", aggregate.agg_calls()[0].to_string());

        // grouping by a key the view does not have
        let query = cluster
            .builder()
            .push(scan)
            .aggregate(ImmutableBitSet::of(vec![0]), vec![])
            .unwrap()
            .build()
            .unwrap();
        let results = SubstitutionVisitor::new(&mut cluster, target, query).go(target).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_rolled_up_rows_match_query() {
        let mut cluster = cluster();
        let scan = emps(&mut cluster);
        let target = count(&mut cluster, scan, vec![1, 2]);
        let query = count(&mut cluster, scan, vec![2]);
        let view = stored(&mut cluster, "by_name_dept", target);

        let results = SubstitutionVisitor::new(&mut cluster, target, query).go(view).unwrap();
        assert_eq!(1, results.len());
        assert!(cluster.descendants(results[0]).contains(&view));
        let expected = sorted_rows(&mut cluster, query);
        assert_eq!(vec![row![10, 3], row![20, 1], row![30, 1]], expected);
        assert_eq!(expected, sorted_rows(&mut cluster, results[0]));
    }

    #[test]
    fn test_global_count_over_empty_view() {
        let mut cluster = cluster();
        let row_type = TypeFactory::new().create_struct_type(vec![
            ("k", DataType::Integer, true),
            ("v", DataType::Integer, true),
        ]);
        let table = RelOptTable::new(vec!["s", "t"], row_type).with_rows(vec![]);
        let scan = scan_of(&mut cluster, table);
        let target = count(&mut cluster, scan, vec![0]);
        let query = count(&mut cluster, scan, vec![]);
        let view = stored(&mut cluster, "by_k", target);

        let results = SubstitutionVisitor::new(&mut cluster, target, query).go(view).unwrap();
        assert_eq!(1, results.len());
        assert_eq!(vec![row![0]], sorted_rows(&mut cluster, query));
        assert_eq!(vec![row![0]], sorted_rows(&mut cluster, results[0]));
    }
}
