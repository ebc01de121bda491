use std::sync::Arc;

use crate::catalog::RelOptTable;
use crate::error::OptResult;
use crate::interpreter::{Node, Sink, Source};
use crate::rex::RexNode;
use crate::value::{Row, Value};

/// Reads every row of a table.
pub struct ScanNode {
    table: Arc<RelOptTable>,
}

impl ScanNode {
    pub fn new(table: Arc<RelOptTable>) -> Self {
        Self { table }
    }
}

impl Node for ScanNode {
    fn run(&mut self, sink: &mut Sink) -> OptResult<()> {
        for row in self.table.scan()? {
            sink.send(row)?;
        }
        sink.end()
    }
}

pub struct ValuesNode {
    tuples: Vec<Vec<Value>>,
}

impl ValuesNode {
    pub fn new(tuples: Vec<Vec<Value>>) -> Self {
        Self { tuples }
    }
}

impl Node for ValuesNode {
    fn run(&mut self, sink: &mut Sink) -> OptResult<()> {
        for tuple in &self.tuples {
            sink.send(Row::new(tuple.clone()))?;
        }
        sink.end()
    }
}

/// Forwards rows for which the condition is true. Unknown counts as false.
pub struct FilterNode {
    source: Source,
    condition: RexNode,
}

impl FilterNode {
    pub fn new(source: Source, condition: RexNode) -> Self {
        Self { source, condition }
    }
}

impl Node for FilterNode {
    fn run(&mut self, sink: &mut Sink) -> OptResult<()> {
        while let Some(row) = self.source.receive()? {
            if self.condition.eval_predicate(&row)? {
                sink.send(row)?;
            }
        }
        sink.end()
    }
}

pub struct ProjectNode {
    source: Source,
    exprs: Vec<RexNode>,
}

impl ProjectNode {
    pub fn new(source: Source, exprs: Vec<RexNode>) -> Self {
        Self { source, exprs }
    }
}

impl Node for ProjectNode {
    fn run(&mut self, sink: &mut Sink) -> OptResult<()> {
        while let Some(row) = self.source.receive()? {
            let values = self
                .exprs
                .iter()
                .map(|e| e.eval(&row))
                .collect::<OptResult<Vec<_>>>()?;
            sink.send(Row::new(values))?;
        }
        sink.end()
    }
}
