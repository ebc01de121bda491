//! A pull based interpreter for finished plans.
//!
//! Every relational expression becomes a [`Node`] that pulls rows from one [`Source`] per input
//! and pushes its output to a [`Sink`], signalling the end of its stream exactly once. Nodes run
//! leaf to root, each after all its inputs, and the rows between them are buffered in memory. A
//! node shared by several parents runs once.
//!
//! Both logical and enumerable operators can be run: physical join algorithms all execute as
//! nested loops, and exchanges as a single stream.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, ensure};
use enum_dispatch::enum_dispatch;
use log::trace;

use crate::error::{OptError, OptResult};
use crate::operator::LogicalOperator::*;
use crate::operator::Operator;
use crate::operator::PhysicalOperator::*;
use crate::plan::{RelCluster, RelId};
use crate::properties::RelCollation;
use crate::shuttle::strip_subsets;
use crate::value::Row;

mod aggregate;
pub use aggregate::*;
mod basic;
pub use basic::*;
mod join;
pub use join::*;
mod set_op;
pub use set_op::*;
mod sort;
pub use sort::*;

/// Input side of a node: the buffered output of one input node.
pub struct Source {
    rows: Arc<Vec<Row>>,
    position: usize,
    cancel: Arc<AtomicBool>,
}

impl Source {
    fn new(rows: Arc<Vec<Row>>, cancel: Arc<AtomicBool>) -> Self {
        Self {
            rows,
            position: 0,
            cancel,
        }
    }

    /// Next row, or `None` at the end of the stream.
    ///
    /// Fails with [`OptError::Interrupted`] once execution is cancelled.
    pub fn receive(&mut self) -> OptResult<Option<Row>> {
        if self.cancel.load(Ordering::Relaxed) {
            bail!(OptError::Interrupted);
        }
        let row = self.rows.get(self.position).cloned();
        if row.is_some() {
            self.position += 1;
        }
        Ok(row)
    }

    /// Every remaining row.
    pub fn receive_all(&mut self) -> OptResult<Vec<Row>> {
        let mut rows = vec![];
        while let Some(row) = self.receive()? {
            rows.push(row);
        }
        Ok(rows)
    }
}

/// Output side of a node.
#[derive(Debug, Default)]
pub struct Sink {
    rows: Vec<Row>,
    ended: bool,
}

impl Sink {
    pub fn send(&mut self, row: Row) -> OptResult<()> {
        ensure!(!self.ended, "row {} sent after end of stream", row);
        self.rows.push(row);
        Ok(())
    }

    pub fn end(&mut self) -> OptResult<()> {
        ensure!(!self.ended, "end of stream signalled twice");
        self.ended = true;
        Ok(())
    }
}

#[enum_dispatch]
pub trait Node {
    /// Pulls from the sources until they are exhausted, sending output rows to `sink`, then ends
    /// the sink.
    fn run(&mut self, sink: &mut Sink) -> OptResult<()>;
}

#[enum_dispatch(Node)]
pub enum NodeImpl {
    ScanNode,
    ValuesNode,
    FilterNode,
    ProjectNode,
    SortNode,
    JoinNode,
    CorrelateNode,
    AggregateNode,
    SetOpNode,
}

/// Executes the plan rooted at `root`.
pub struct Interpreter<'a> {
    cluster: &'a mut RelCluster,
    root: RelId,
    cancel: Arc<AtomicBool>,
}

impl<'a> Interpreter<'a> {
    pub fn new(cluster: &'a mut RelCluster, root: RelId) -> Self {
        Self {
            cluster,
            root,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shares `cancel` with whoever may want to stop execution. Setting it makes the next
    /// `receive()` of any node fail.
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    /// Rows of the root, after replacing subsets by their chosen members.
    pub fn run(&mut self) -> OptResult<Vec<Row>> {
        let root = strip_subsets(self.cluster, self.root)?;
        let mut outputs = HashMap::new();
        let rows = self.execute(root, &mut outputs)?;
        Ok(rows.as_ref().clone())
    }

    fn execute(
        &self,
        rel: RelId,
        outputs: &mut HashMap<RelId, Arc<Vec<Row>>>,
    ) -> OptResult<Arc<Vec<Row>>> {
        if let Some(rows) = outputs.get(&rel) {
            return Ok(rows.clone());
        }

        let mut sources = vec![];
        for input in self.cluster.inputs(rel) {
            let rows = self.execute(*input, outputs)?;
            sources.push(Source::new(rows, self.cancel.clone()));
        }
        let mut node = self.node(rel, sources)?;
        let mut sink = Sink::default();
        node.run(&mut sink)?;
        ensure!(
            sink.ended,
            OptError::InvalidRel(rel, "node finished without ending its output".to_string())
        );

        trace!("Node {} produced {} rows", rel, sink.rows.len());
        let rows = Arc::new(sink.rows);
        outputs.insert(rel, rows.clone());
        Ok(rows)
    }

    fn node(&self, rel: RelId, mut sources: Vec<Source>) -> OptResult<NodeImpl> {
        let cluster = &*self.cluster;
        let field_count = |i: usize| cluster.field_count(cluster.inputs(rel)[i]);
        let mut source = || match sources.pop() {
            Some(source) => Ok(source),
            None => Err(OptError::InvalidRel(rel, "missing input".to_string())),
        };

        let node: NodeImpl = match cluster.operator(rel) {
            Operator::Logical(LogicalScan(scan)) | Operator::Physical(PhysicalTableScan(scan)) => {
                ScanNode::new(scan.table().clone()).into()
            }
            Operator::Logical(LogicalValues(values))
            | Operator::Physical(PhysicalValues(values)) => {
                ValuesNode::new(values.tuples().to_vec()).into()
            }
            Operator::Logical(LogicalFilter(filter))
            | Operator::Physical(PhysicalFilter(filter)) => {
                FilterNode::new(source()?, filter.condition().clone()).into()
            }
            Operator::Logical(LogicalProjection(project))
            | Operator::Physical(PhysicalProjection(project)) => {
                ProjectNode::new(source()?, project.exprs().to_vec()).into()
            }
            Operator::Logical(LogicalSort(sort)) | Operator::Physical(PhysicalSort(sort)) => {
                SortNode::new(source()?, sort.collation().clone(), sort.offset(), sort.fetch())
                    .into()
            }
            Operator::Logical(LogicalExchange(_)) => {
                SortNode::new(source()?, RelCollation::empty(), 0, None).into()
            }
            Operator::Physical(PhysicalSortExchange(exchange)) => {
                SortNode::new(source()?, exchange.collation().clone(), 0, None).into()
            }
            Operator::Logical(LogicalJoin(join))
            | Operator::Physical(PhysicalHashJoin(join))
            | Operator::Physical(PhysicalMergeJoin(join))
            | Operator::Physical(PhysicalNestedLoopJoin(join)) => {
                let right = source()?;
                JoinNode::new(source()?, right, join.clone(), field_count(0), field_count(1))
                    .into()
            }
            Operator::Physical(PhysicalSemiJoin(join)) => {
                let right = source()?;
                JoinNode::semi(source()?, right, join.clone(), field_count(0), field_count(1))
                    .into()
            }
            Operator::Logical(LogicalCorrelate(correlate))
            | Operator::Physical(PhysicalCorrelate(correlate)) => {
                let right = source()?;
                CorrelateNode::new(source()?, right, correlate.join_type(), field_count(1)).into()
            }
            Operator::Logical(LogicalAggregate(aggregate))
            | Operator::Physical(PhysicalHashAggregate(aggregate)) => AggregateNode::new(
                source()?,
                aggregate.group_set().clone(),
                aggregate.agg_calls().to_vec(),
            )
            .into(),
            Operator::Logical(LogicalUnion(set_op)) | Operator::Physical(PhysicalUnion(set_op)) => {
                SetOpNode::new(sources, SetOpKind::Union, set_op.all()).into()
            }
            Operator::Logical(LogicalIntersect(set_op)) => {
                SetOpNode::new(sources, SetOpKind::Intersect, set_op.all()).into()
            }
            Operator::Logical(LogicalMinus(set_op)) => {
                SetOpNode::new(sources, SetOpKind::Minus, set_op.all()).into()
            }
            Operator::Subset(_) => bail!(OptError::Unsupported(format!(
                "subset {} left in plan to execute",
                rel
            ))),
        };
        Ok(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitset::ImmutableBitSet;
    use crate::operator::{AggFunction, AggregateCall, JoinType};
    use crate::properties::TraitSet;
    use crate::rex::RexNode;
    use crate::row;
    use crate::test_util::cluster;

    #[test]
    fn test_filter_project() {
        let mut cluster = cluster();
        let mut builder = cluster.builder();
        builder.scan(&["hr", "emps"]).unwrap();
        let cond = builder.field(2).eq(RexNode::literal(10));
        builder.filter(cond).unwrap();
        let exprs = vec![builder.field(1), builder.field(3).plus(RexNode::literal(1))];
        let root = builder.project(exprs).unwrap().build().unwrap();

        let rows = Interpreter::new(&mut cluster, root).run().unwrap();
        assert_eq!(
            vec![row!["Bill", 1001], row!["Theodore", 1101], row!["Sebastian", 701]],
            rows
        );
    }

    #[test]
    fn test_shared_input_runs_once() {
        let mut cluster = cluster();
        let scan = cluster.builder().scan(&["hr", "depts"]).unwrap().build().unwrap();
        let root = cluster
            .builder()
            .push(scan)
            .push(scan)
            .union(true, 2)
            .unwrap()
            .build()
            .unwrap();
        let rows = Interpreter::new(&mut cluster, root).run().unwrap();
        assert_eq!(6, rows.len());
    }

    #[test]
    fn test_runs_best_member_of_subset() {
        let mut cluster = cluster();
        let scan = cluster.builder().scan(&["hr", "depts"]).unwrap().build().unwrap();
        let mut builder = cluster.builder();
        builder.push(scan);
        let cond = builder.field(0).gt(RexNode::literal(10));
        let filter = builder.filter(cond).unwrap().build().unwrap();

        let row_type = cluster.row_type(scan).clone();
        let subset = cluster.create_subset(row_type, TraitSet::logical()).unwrap();
        cluster.add_to_subset(subset, scan).unwrap();
        cluster.add_to_subset(subset, filter).unwrap();
        cluster.set_best(subset, filter).unwrap();
        let root = cluster
            .builder()
            .push(subset)
            .aggregate(
                ImmutableBitSet::empty(),
                vec![AggregateCall::new(AggFunction::Count, vec![], "c")],
            )
            .unwrap()
            .build()
            .unwrap();

        let rows = Interpreter::new(&mut cluster, root).run().unwrap();
        assert_eq!(vec![row![2]], rows);
    }

    #[test]
    fn test_cancelled_before_run() {
        let mut cluster = cluster();
        let mut builder = cluster.builder();
        builder.scan(&["hr", "emps"]).unwrap();
        builder.scan(&["hr", "depts"]).unwrap();
        let cond = builder.join_field(0, 2).eq(builder.join_field(1, 0));
        let root = builder.join(JoinType::Inner, cond).unwrap().build().unwrap();

        let cancel = Arc::new(AtomicBool::new(false));
        let mut interpreter = Interpreter::new(&mut cluster, root).with_cancel_flag(cancel.clone());
        cancel.store(true, Ordering::Relaxed);
        let err = interpreter.run().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<OptError>(),
            Some(OptError::Interrupted)
        ));
        assert!(interpreter.cancel_flag().load(Ordering::Relaxed));
    }
}
