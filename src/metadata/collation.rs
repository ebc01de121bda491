use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use itertools::Itertools;
use log::trace;

use crate::bitset::ImmutableBitSet;
use crate::metadata::{CollationsHandler, MdResult, MetadataHandlers, RelMetadataQuery};
use crate::operator::{JoinType, Operator, PhysicalOperator, RelKind};
use crate::plan::RelNode;
use crate::properties::{Direction, NullDirection, RelCollation, RelFieldCollation};
use crate::rex::{CallBinding, RexNode};
use crate::value::Row;

pub(super) fn handlers() -> MetadataHandlers<CollationsHandler> {
    let mut handlers = MetadataHandlers::<CollationsHandler>::new(catch_all);
    handlers
        .register(RelKind::TableScan, table_scan)
        .register(RelKind::Filter, first_input)
        .register(RelKind::LogicalExchange, first_input)
        .register(RelKind::Sort, sort)
        .register(RelKind::SortExchange, sort_exchange)
        .register(RelKind::Project, project)
        .register(RelKind::Values, values)
        .register(RelKind::EnumerableMergeJoin, merge_join)
        .register(RelKind::EnumerableHashJoin, enumerable_join)
        .register(RelKind::EnumerableNestedLoopJoin, enumerable_join)
        .register(RelKind::SemiJoin, first_input)
        .register(RelKind::Correlate, first_input)
        .register(RelKind::RelSubset, subset);
    handlers
}

fn catch_all(_node: &RelNode, _mq: &mut RelMetadataQuery<'_>) -> MdResult<Vec<RelCollation>> {
    Ok(vec![])
}

fn first_input(node: &RelNode, mq: &mut RelMetadataQuery<'_>) -> MdResult<Vec<RelCollation>> {
    mq.collations(node.input(0))
}

fn table_scan(node: &RelNode, _mq: &mut RelMetadataQuery<'_>) -> MdResult<Vec<RelCollation>> {
    Ok(node
        .operator()
        .table_scan()
        .map(|s| s.table().collations().to_vec())
        .unwrap_or_default())
}

fn sort(node: &RelNode, _mq: &mut RelMetadataQuery<'_>) -> MdResult<Vec<RelCollation>> {
    Ok(node
        .operator()
        .sort()
        .map(|s| vec![s.collation().clone()])
        .unwrap_or_default())
}

fn sort_exchange(node: &RelNode, _mq: &mut RelMetadataQuery<'_>) -> MdResult<Vec<RelCollation>> {
    Ok(match node.operator() {
        Operator::Physical(PhysicalOperator::PhysicalSortExchange(e)) => {
            vec![e.collation().clone()]
        }
        _ => vec![],
    })
}

/// Input collations over fields the projection copies, plus one collation over projected calls
/// that are monotonic in the input order.
fn project(node: &RelNode, mq: &mut RelMetadataQuery<'_>) -> MdResult<Vec<RelCollation>> {
    let exprs = match node.operator().projection() {
        Some(project) => project.exprs(),
        None => return Ok(vec![]),
    };
    let input_collations = mq.collations(node.input(0))?;
    if input_collations.is_empty() {
        return Ok(vec![]);
    }

    let mut targets: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    let mut monotonic_targets = BTreeMap::new();
    for (i, expr) in exprs.iter().enumerate() {
        match expr {
            RexNode::InputRef(r) => targets.entry(r.index()).or_default().push(i),
            RexNode::Call(call) => {
                let binding = CallBinding::new(call, &input_collations);
                monotonic_targets.insert(i, binding.monotonicity());
            }
            _ => {}
        }
    }

    let mut collations = BTreeSet::new();
    for collation in &input_collations {
        if collation.is_empty() {
            continue;
        }
        let mapped: Option<Vec<RelFieldCollation>> = collation
            .field_collations()
            .iter()
            .map(|fc| {
                targets
                    .get(&fc.field_index())
                    .and_then(|t| t.first())
                    .map(|target| fc.with_field_index(*target))
            })
            .collect();
        if let Some(field_collations) = mapped {
            collations.insert(RelCollation::of(field_collations));
        }
    }

    let from_calls = monotonic_targets
        .into_iter()
        .filter_map(|(i, m)| Direction::of_monotonicity(m).map(|d| RelFieldCollation::with_direction(i, d)))
        .collect_vec();
    if !from_calls.is_empty() {
        collations.insert(RelCollation::of(from_calls));
    }
    Ok(collations.into_iter().collect())
}

/// Collations a literal relation is known to follow.
///
/// Starting at each column, extends a candidate key with every later column that keeps the data
/// ordered, so at most one collation starts at each column.
fn values(node: &RelNode, mq: &mut RelMetadataQuery<'_>) -> MdResult<Vec<RelCollation>> {
    let tuples = match node.operator().values() {
        Some(values) => values.tuples(),
        None => return Ok(vec![]),
    };
    let field_count = mq.cluster().field_count(node.id());
    let rows = tuples.iter().map(|t| Row::new(t.clone())).collect_vec();

    let mut list = Vec::new();
    'outer: for i in 0..field_count {
        let mut fields: Vec<RelFieldCollation> = Vec::new();
        for j in i..field_count {
            fields.push(RelFieldCollation::new(j));
            if !is_ordered(&rows, &fields) {
                if j == i {
                    continue 'outer;
                }
                fields.pop();
            }
        }
        if !fields.is_empty() {
            list.push(RelCollation::of(fields));
        }
    }
    Ok(list)
}

fn is_ordered(rows: &[Row], fields: &[RelFieldCollation]) -> bool {
    rows.windows(2).all(|w| {
        let ordering = fields
            .iter()
            .map(|fc| fc.compare(&w[0], &w[1]))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or(Ordering::Equal);
        ordering != Ordering::Greater
    })
}

/// Collations of a merge join: the left input's, then the right input's shifted past the left
/// fields.
///
/// # Panics
///
/// If either input is not sorted on its join keys.
fn merge_join(node: &RelNode, mq: &mut RelMetadataQuery<'_>) -> MdResult<Vec<RelCollation>> {
    let join = match node.operator().join() {
        Some(join) => join,
        None => return Ok(vec![]),
    };
    let (left, right) = (node.input(0), node.input(1));
    let left_count = mq.cluster().field_count(left);
    let info = join.join_info(left_count);

    let left_collations = mq.collations(left)?;
    let left_keys = ImmutableBitSet::of(info.left_keys().iter().copied());
    assert!(
        left_collations.iter().any(|c| c.contains(&left_keys)),
        "cannot merge join: left input is not sorted on left keys"
    );
    let right_collations = mq.collations(right)?;
    let right_keys = ImmutableBitSet::of(info.right_keys().iter().copied());
    assert!(
        right_collations.iter().any(|c| c.contains(&right_keys)),
        "cannot merge join: right input is not sorted on right keys"
    );

    let mut collations = left_collations;
    collations.extend(right_collations.iter().map(|c| c.shift(left_count as isize)));
    Ok(collations)
}

/// Hash and nested loop joins emit rows in the order of the left input, but for right and full
/// joins the unmatched right rows come last with nulls on the left.
fn enumerable_join(node: &RelNode, mq: &mut RelMetadataQuery<'_>) -> MdResult<Vec<RelCollation>> {
    let left_collations = mq.collations(node.input(0))?;
    let join_type = node.operator().join().map(|j| j.join_type());
    Ok(match join_type {
        Some(JoinType::Inner) | Some(JoinType::Left) => left_collations,
        Some(JoinType::Right) | Some(JoinType::Full) => {
            let nulls_last = left_collations.iter().all(|c| {
                c.field_collations()
                    .iter()
                    .all(|fc| fc.null_direction() == NullDirection::Last)
            });
            if nulls_last {
                left_collations
            } else {
                vec![]
            }
        }
        None => vec![],
    })
}

/// Collations of the best member if one is chosen, else those required by the subset's traits,
/// else those shared by every member whose collations are known.
fn subset(node: &RelNode, mq: &mut RelMetadataQuery<'_>) -> MdResult<Vec<RelCollation>> {
    let subset = match node.operator().as_subset() {
        Some(subset) => subset,
        None => return Ok(vec![]),
    };
    if let Some(best) = subset.best() {
        return mq.collations(best);
    }
    let required = node.traits().collation();
    if !required.is_empty() {
        return Ok(vec![required.clone()]);
    }

    let mut common: Option<Vec<RelCollation>> = None;
    for member in subset.members() {
        match mq.collations(*member) {
            Ok(collations) => {
                common = Some(match common {
                    None => collations,
                    Some(prev) => prev.into_iter().filter(|c| collations.contains(c)).collect(),
                })
            }
            Err(e) => trace!("Skipped member {} of subset {}: {}", member, node.id(), e),
        }
    }
    Ok(common.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use crate::operator::{Join, JoinType, Operator, PhysicalOperator, TableScan};
    use crate::plan::RelId;
    use crate::properties::{
        Direction, NullDirection, RelCollation, RelFieldCollation, TraitSet,
    };
    use crate::rex::{RexInputRef, RexNode};
    use crate::test_util::cluster;
    use crate::types::DataType;
    use crate::value::Value;

    fn sorted_emps(cluster: &mut crate::plan::RelCluster, collation: RelCollation) -> RelId {
        cluster
            .builder()
            .scan(&["hr", "emps"])
            .unwrap()
            .sort(collation)
            .unwrap()
            .build()
            .unwrap()
    }

    #[test]
    fn test_identity_project_keeps_collations() {
        let mut cluster = cluster();
        let sort = sorted_emps(&mut cluster, RelCollation::of_keys(vec![2, 0]));
        let mut builder = cluster.builder();
        builder.push(sort);
        let exprs = (0..4).map(|i| builder.field(i)).collect();
        let project = builder.project(exprs).unwrap().build().unwrap();
        let mut mq = cluster.metadata_query();
        assert_eq!(mq.collations(sort).unwrap(), mq.collations(project).unwrap());
    }

    #[test]
    fn test_project_drops_unmapped_collation() {
        let mut cluster = cluster();
        let sort = sorted_emps(&mut cluster, RelCollation::of_keys(vec![2, 0]));
        let mut builder = cluster.builder();
        builder.push(sort);
        // deptno survives at position 0 but empno is dropped
        let exprs = vec![builder.field(2), builder.field(3)];
        let dropped = builder.project(exprs).unwrap().build().unwrap();

        let mut builder = cluster.builder();
        builder.push(sort);
        let exprs = vec![builder.field(0), builder.field(2)];
        let swapped = builder.project(exprs).unwrap().build().unwrap();

        let mut mq = cluster.metadata_query();
        assert!(mq.collations(dropped).unwrap().is_empty());
        assert_eq!(
            vec![RelCollation::of_keys(vec![1, 0])],
            mq.collations(swapped).unwrap()
        );
    }

    #[test]
    fn test_project_monotonic_call() {
        let mut cluster = cluster();
        let sort = sorted_emps(&mut cluster, RelCollation::of_keys(vec![0]));
        let mut builder = cluster.builder();
        builder.push(sort);
        let exprs = vec![builder.field(0), builder.field(0).plus(RexNode::literal(1))];
        let project = builder.project(exprs).unwrap().build().unwrap();
        let collations = cluster.metadata_query().collations(project).unwrap();
        assert_eq!(
            vec![
                RelCollation::of_keys(vec![0]),
                RelCollation::of(vec![RelFieldCollation::with_direction(1, Direction::Ascending)]),
            ],
            collations
        );
    }

    #[test]
    fn test_values_greedy_collations() {
        let mut cluster = cluster();
        let row_type = cluster.type_factory().create_struct_type(vec![
            ("a", DataType::Integer, false),
            ("b", DataType::Integer, false),
            ("c", DataType::Integer, false),
        ]);
        let tuples = vec![
            vec![Value::Integer(1), Value::Integer(5), Value::Integer(2)],
            vec![Value::Integer(1), Value::Integer(4), Value::Integer(3)],
        ];
        let values = cluster
            .builder()
            .values(row_type, tuples)
            .unwrap()
            .build()
            .unwrap();
        // b descends so it is skipped after a, and cannot start a collation itself
        assert_eq!(
            vec![RelCollation::of_keys(vec![0, 2]), RelCollation::of_keys(vec![2])],
            cluster.metadata_query().collations(values).unwrap()
        );
    }

    #[test]
    fn test_single_row_values_sorted_on_every_column() {
        let mut cluster = cluster();
        let row_type = cluster
            .type_factory()
            .create_struct_type(vec![("a", DataType::Integer, false), ("b", DataType::Varchar, true)]);
        let values = cluster
            .builder()
            .values(row_type, vec![vec![Value::Integer(1), Value::Null]])
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(
            vec![RelCollation::of_keys(vec![0, 1]), RelCollation::of_keys(vec![1])],
            cluster.metadata_query().collations(values).unwrap()
        );
    }

    fn physical_join(
        cluster: &mut crate::plan::RelCluster,
        make: fn(Join) -> PhysicalOperator,
        join_type: JoinType,
        left_collation: RelCollation,
    ) -> RelId {
        let emps = cluster.catalog().table(&["hr", "emps"], true).unwrap();
        let depts = cluster.catalog().table(&["hr", "depts"], true).unwrap();
        let left = cluster
            .create(
                Operator::Physical(PhysicalOperator::PhysicalTableScan(TableScan::new(emps))),
                TraitSet::enumerable(),
                vec![],
            )
            .unwrap();
        let left = cluster
            .create_default(
                Operator::Physical(PhysicalOperator::PhysicalSort(crate::operator::Sort::new(
                    left_collation,
                ))),
                vec![left],
            )
            .unwrap();
        let right = cluster
            .create(
                Operator::Physical(PhysicalOperator::PhysicalTableScan(TableScan::new(depts))),
                TraitSet::enumerable(),
                vec![],
            )
            .unwrap();
        let right = cluster
            .create_default(
                Operator::Physical(PhysicalOperator::PhysicalSort(crate::operator::Sort::new(
                    RelCollation::of_keys(vec![0]),
                ))),
                vec![right],
            )
            .unwrap();
        let cond = RexNode::InputRef(RexInputRef::new(2, DataType::Integer))
            .eq(RexNode::InputRef(RexInputRef::new(4, DataType::Integer)));
        cluster
            .create_default(
                Operator::Physical(make(Join::new(join_type, cond))),
                vec![left, right],
            )
            .unwrap()
    }

    #[test]
    fn test_merge_join_concatenates_shifted_right() {
        let mut cluster = cluster();
        let join = physical_join(
            &mut cluster,
            PhysicalOperator::PhysicalMergeJoin,
            JoinType::Inner,
            RelCollation::of_keys(vec![2]),
        );
        assert_eq!(
            vec![RelCollation::of_keys(vec![2]), RelCollation::of_keys(vec![4])],
            cluster.metadata_query().collations(join).unwrap()
        );
    }

    #[test]
    #[should_panic(expected = "left input is not sorted")]
    fn test_merge_join_over_unsorted_input_panics() {
        let mut cluster = cluster();
        let join = physical_join(
            &mut cluster,
            PhysicalOperator::PhysicalMergeJoin,
            JoinType::Inner,
            RelCollation::of_keys(vec![0]),
        );
        let _ = cluster.metadata_query().collations(join);
    }

    #[test]
    fn test_hash_join_by_join_type() {
        let mut cluster = cluster();
        let inner = physical_join(
            &mut cluster,
            PhysicalOperator::PhysicalHashJoin,
            JoinType::Inner,
            RelCollation::of_keys(vec![0]),
        );
        let right_last = physical_join(
            &mut cluster,
            PhysicalOperator::PhysicalHashJoin,
            JoinType::Right,
            RelCollation::of_keys(vec![0]),
        );
        let right_first = physical_join(
            &mut cluster,
            PhysicalOperator::PhysicalHashJoin,
            JoinType::Full,
            RelCollation::of(vec![RelFieldCollation::of(0, Direction::Ascending, NullDirection::First)]),
        );
        let mut mq = cluster.metadata_query();
        assert_eq!(vec![RelCollation::of_keys(vec![0])], mq.collations(inner).unwrap());
        assert_eq!(vec![RelCollation::of_keys(vec![0])], mq.collations(right_last).unwrap());
        assert!(mq.collations(right_first).unwrap().is_empty());
    }
}
