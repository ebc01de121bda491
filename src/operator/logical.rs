use enum_as_inner::EnumAsInner;

use crate::operator::{
    Aggregate, Correlate, Exchange, Filter, Join, Projection, SetOp, Sort, TableScan, Values,
};

/// Logical relational operator.
#[derive(Clone, Debug, Hash, Eq, PartialEq, EnumAsInner)]
pub enum LogicalOperator {
    LogicalScan(TableScan),
    LogicalFilter(Filter),
    LogicalProjection(Projection),
    LogicalJoin(Join),
    LogicalCorrelate(Correlate),
    LogicalAggregate(Aggregate),
    LogicalSort(Sort),
    LogicalUnion(SetOp),
    LogicalIntersect(SetOp),
    LogicalMinus(SetOp),
    LogicalValues(Values),
    LogicalExchange(Exchange),
}
