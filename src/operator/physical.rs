use enum_as_inner::EnumAsInner;

use crate::operator::{
    Aggregate, Correlate, Filter, Join, Projection, SetOp, Sort, SortExchange, TableScan, Values,
};

/// Physical relational operator of the enumerable convention.
#[derive(Clone, Debug, Hash, Eq, PartialEq, EnumAsInner)]
pub enum PhysicalOperator {
    PhysicalTableScan(TableScan),
    PhysicalFilter(Filter),
    PhysicalProjection(Projection),
    PhysicalHashJoin(Join),
    /// Join of inputs sorted on the equi-join keys.
    PhysicalMergeJoin(Join),
    PhysicalNestedLoopJoin(Join),
    PhysicalCorrelate(Correlate),
    /// Left rows having at least one match on the right.
    PhysicalSemiJoin(Join),
    PhysicalSort(Sort),
    PhysicalHashAggregate(Aggregate),
    PhysicalUnion(SetOp),
    PhysicalValues(Values),
    PhysicalSortExchange(SortExchange),
}
