//! Relational operators.
//!
//! An operator holds the attributes of one node of a plan. Inputs, traits and identity are kept
//! by [`RelNode`](crate::plan::RelNode), so one operator value can be reused over different
//! inputs by copying the node.

mod aggregate;
mod correlate;
mod exchange;
mod filter;
mod join;
mod logical;
mod physical;
mod projection;
mod set_op;
mod sort;
mod subset;
mod table_scan;
mod values;

pub use aggregate::*;
pub use correlate::*;
pub use exchange::*;
pub use filter::*;
pub use join::*;
pub use logical::*;
pub use physical::*;
pub use projection::*;
pub use set_op::*;
pub use sort::*;
pub use subset::*;
pub use table_scan::*;
pub use values::*;

use enum_as_inner::EnumAsInner;
use strum_macros::{Display, IntoStaticStr};

use crate::explain::RelWriter;
use crate::properties::{Convention, RowType, TraitSet};
use crate::types::TypeFactory;

use LogicalOperator::*;
use PhysicalOperator::*;

/// Behavior shared by every operator struct.
pub trait OperatorTrait {
    /// Adds this operator's attributes to `writer`. Inputs are added by the caller.
    fn explain_terms(&self, writer: &mut RelWriter);

    /// Output row type given the row types of the inputs.
    fn derive_row_type(&self, type_factory: &TypeFactory, inputs: &[&RowType]) -> RowType;

    /// Checks the attributes against the inputs, describing the first problem found.
    fn validate(&self, inputs: &[&RowType]) -> Result<(), String>;
}

#[derive(Clone, Debug, Hash, Eq, PartialEq, EnumAsInner)]
pub enum Operator {
    Logical(LogicalOperator),
    Physical(PhysicalOperator),
    Subset(RelSubset),
}

/// Kind of a relational expression.
///
/// Kinds form a hierarchy through [`RelKind::parent`]: concrete kinds such as `LogicalFilter`
/// have an abstract parent such as `Filter`, and every chain ends at `RelNode`. Metadata
/// handlers registered for a kind also serve its descendants.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Display, IntoStaticStr)]
pub enum RelKind {
    RelNode,
    TableScan,
    LogicalTableScan,
    EnumerableTableScan,
    Filter,
    LogicalFilter,
    EnumerableFilter,
    Project,
    LogicalProject,
    EnumerableProject,
    Join,
    LogicalJoin,
    EnumerableHashJoin,
    EnumerableMergeJoin,
    EnumerableNestedLoopJoin,
    SemiJoin,
    EnumerableSemiJoin,
    Correlate,
    LogicalCorrelate,
    EnumerableCorrelate,
    Aggregate,
    LogicalAggregate,
    EnumerableAggregate,
    Sort,
    LogicalSort,
    EnumerableSort,
    SetOp,
    Union,
    LogicalUnion,
    EnumerableUnion,
    Intersect,
    LogicalIntersect,
    Minus,
    LogicalMinus,
    Values,
    LogicalValues,
    EnumerableValues,
    Exchange,
    LogicalExchange,
    SortExchange,
    EnumerableSortExchange,
    RelSubset,
}

impl RelKind {
    pub fn parent(&self) -> Option<RelKind> {
        use RelKind::*;
        Some(match self {
            RelNode => return None,
            TableScan | Filter | Project | Join | Correlate | Aggregate | Sort | SetOp
            | Values | Exchange | RelSubset => RelNode,
            LogicalTableScan | EnumerableTableScan => TableScan,
            LogicalFilter | EnumerableFilter => Filter,
            LogicalProject | EnumerableProject => Project,
            LogicalJoin | EnumerableHashJoin | EnumerableMergeJoin | EnumerableNestedLoopJoin
            | SemiJoin => Join,
            EnumerableSemiJoin => SemiJoin,
            LogicalCorrelate | EnumerableCorrelate => Correlate,
            LogicalAggregate | EnumerableAggregate => Aggregate,
            LogicalSort | EnumerableSort => Sort,
            Union | Intersect | Minus => SetOp,
            LogicalUnion | EnumerableUnion => Union,
            LogicalIntersect => Intersect,
            LogicalMinus => Minus,
            LogicalValues | EnumerableValues => Values,
            LogicalExchange | SortExchange => Exchange,
            EnumerableSortExchange => SortExchange,
        })
    }

    /// This kind followed by its ancestors, ending at `RelNode`.
    pub fn ancestors(&self) -> impl Iterator<Item = RelKind> {
        std::iter::successors(Some(*self), RelKind::parent)
    }

    pub fn is_a(&self, other: RelKind) -> bool {
        self.ancestors().any(|k| k == other)
    }
}

impl Operator {
    pub fn kind(&self) -> RelKind {
        match self {
            Operator::Logical(op) => match op {
                LogicalScan(_) => RelKind::LogicalTableScan,
                LogicalFilter(_) => RelKind::LogicalFilter,
                LogicalProjection(_) => RelKind::LogicalProject,
                LogicalJoin(_) => RelKind::LogicalJoin,
                LogicalCorrelate(_) => RelKind::LogicalCorrelate,
                LogicalAggregate(_) => RelKind::LogicalAggregate,
                LogicalSort(_) => RelKind::LogicalSort,
                LogicalUnion(_) => RelKind::LogicalUnion,
                LogicalIntersect(_) => RelKind::LogicalIntersect,
                LogicalMinus(_) => RelKind::LogicalMinus,
                LogicalValues(_) => RelKind::LogicalValues,
                LogicalExchange(_) => RelKind::LogicalExchange,
            },
            Operator::Physical(op) => match op {
                PhysicalTableScan(_) => RelKind::EnumerableTableScan,
                PhysicalFilter(_) => RelKind::EnumerableFilter,
                PhysicalProjection(_) => RelKind::EnumerableProject,
                PhysicalHashJoin(_) => RelKind::EnumerableHashJoin,
                PhysicalMergeJoin(_) => RelKind::EnumerableMergeJoin,
                PhysicalNestedLoopJoin(_) => RelKind::EnumerableNestedLoopJoin,
                PhysicalCorrelate(_) => RelKind::EnumerableCorrelate,
                PhysicalSemiJoin(_) => RelKind::EnumerableSemiJoin,
                PhysicalSort(_) => RelKind::EnumerableSort,
                PhysicalHashAggregate(_) => RelKind::EnumerableAggregate,
                PhysicalUnion(_) => RelKind::EnumerableUnion,
                PhysicalValues(_) => RelKind::EnumerableValues,
                PhysicalSortExchange(_) => RelKind::EnumerableSortExchange,
            },
            Operator::Subset(_) => RelKind::RelSubset,
        }
    }

    pub fn convention(&self) -> Convention {
        match self {
            Operator::Physical(_) => Convention::Enumerable,
            _ => Convention::None,
        }
    }

    /// Traits of a fresh node with this operator.
    pub fn default_traits(&self) -> TraitSet {
        let traits = TraitSet::new(self.convention());
        if let Some(sort) = self.sort() {
            return traits.with_collation(sort.collation().clone());
        }
        match self {
            Operator::Logical(LogicalExchange(e)) => {
                traits.with_distribution(e.distribution().clone())
            }
            Operator::Physical(PhysicalSortExchange(e)) => traits
                .with_distribution(e.distribution().clone())
                .with_collation(e.collation().clone()),
            _ => traits,
        }
    }

    /// Number of inputs the operator takes, `None` if it takes one or more.
    pub fn input_count(&self) -> Option<usize> {
        match self.kind() {
            k if k.is_a(RelKind::TableScan) || k.is_a(RelKind::Values) => Some(0),
            k if k.is_a(RelKind::RelSubset) => Some(0),
            k if k.is_a(RelKind::Join) || k.is_a(RelKind::Correlate) => Some(2),
            k if k.is_a(RelKind::SetOp) => None,
            _ => Some(1),
        }
    }

    fn as_trait(&self) -> &dyn OperatorTrait {
        match self {
            Operator::Logical(op) => match op {
                LogicalScan(o) => o,
                LogicalFilter(o) => o,
                LogicalProjection(o) => o,
                LogicalJoin(o) => o,
                LogicalCorrelate(o) => o,
                LogicalAggregate(o) => o,
                LogicalSort(o) => o,
                LogicalUnion(o) | LogicalIntersect(o) | LogicalMinus(o) => o,
                LogicalValues(o) => o,
                LogicalExchange(o) => o,
            },
            Operator::Physical(op) => match op {
                PhysicalTableScan(o) => o,
                PhysicalFilter(o) => o,
                PhysicalProjection(o) => o,
                PhysicalHashJoin(o)
                | PhysicalMergeJoin(o)
                | PhysicalNestedLoopJoin(o)
                | PhysicalSemiJoin(o) => o,
                PhysicalCorrelate(o) => o,
                PhysicalSort(o) => o,
                PhysicalHashAggregate(o) => o,
                PhysicalUnion(o) => o,
                PhysicalValues(o) => o,
                PhysicalSortExchange(o) => o,
            },
            Operator::Subset(o) => o,
        }
    }

    pub fn explain_terms(&self, writer: &mut RelWriter) {
        self.as_trait().explain_terms(writer)
    }

    pub fn derive_row_type(&self, type_factory: &TypeFactory, inputs: &[&RowType]) -> RowType {
        match self {
            // A semi join outputs the rows of its left input.
            Operator::Physical(PhysicalSemiJoin(_)) => inputs[0].clone(),
            op => op.as_trait().derive_row_type(type_factory, inputs),
        }
    }

    pub fn validate(&self, inputs: &[&RowType]) -> Result<(), String> {
        self.as_trait().validate(inputs)
    }

    pub fn table_scan(&self) -> Option<&TableScan> {
        match self {
            Operator::Logical(LogicalScan(o)) | Operator::Physical(PhysicalTableScan(o)) => Some(o),
            _ => None,
        }
    }

    pub fn filter(&self) -> Option<&Filter> {
        match self {
            Operator::Logical(LogicalFilter(o)) | Operator::Physical(PhysicalFilter(o)) => Some(o),
            _ => None,
        }
    }

    pub fn projection(&self) -> Option<&Projection> {
        match self {
            Operator::Logical(LogicalProjection(o))
            | Operator::Physical(PhysicalProjection(o)) => Some(o),
            _ => None,
        }
    }

    /// The join attributes of any join kind, semi joins included.
    pub fn join(&self) -> Option<&Join> {
        match self {
            Operator::Logical(LogicalJoin(o))
            | Operator::Physical(PhysicalHashJoin(o))
            | Operator::Physical(PhysicalMergeJoin(o))
            | Operator::Physical(PhysicalNestedLoopJoin(o))
            | Operator::Physical(PhysicalSemiJoin(o)) => Some(o),
            _ => None,
        }
    }

    pub fn correlate(&self) -> Option<&Correlate> {
        match self {
            Operator::Logical(LogicalCorrelate(o)) | Operator::Physical(PhysicalCorrelate(o)) => {
                Some(o)
            }
            _ => None,
        }
    }

    pub fn aggregate(&self) -> Option<&Aggregate> {
        match self {
            Operator::Logical(LogicalAggregate(o))
            | Operator::Physical(PhysicalHashAggregate(o)) => Some(o),
            _ => None,
        }
    }

    pub fn sort(&self) -> Option<&Sort> {
        match self {
            Operator::Logical(LogicalSort(o)) | Operator::Physical(PhysicalSort(o)) => Some(o),
            _ => None,
        }
    }

    pub fn set_op(&self) -> Option<&SetOp> {
        match self {
            Operator::Logical(LogicalUnion(o))
            | Operator::Logical(LogicalIntersect(o))
            | Operator::Logical(LogicalMinus(o))
            | Operator::Physical(PhysicalUnion(o)) => Some(o),
            _ => None,
        }
    }

    pub fn values(&self) -> Option<&Values> {
        match self {
            Operator::Logical(LogicalValues(o)) | Operator::Physical(PhysicalValues(o)) => Some(o),
            _ => None,
        }
    }

    /// Distribution of an exchange of either kind.
    pub fn exchange_distribution(&self) -> Option<&crate::properties::RelDistribution> {
        match self {
            Operator::Logical(LogicalExchange(o)) => Some(o.distribution()),
            Operator::Physical(PhysicalSortExchange(o)) => Some(o.distribution()),
            _ => None,
        }
    }
}

/// Checks that every input reference of `expr` is a field of `row_type`.
pub(crate) fn validate_refs(
    what: &str,
    expr: &crate::rex::RexNode,
    row_type: &RowType,
) -> Result<(), String> {
    match expr.input_refs().iter().find(|i| *i >= row_type.field_count()) {
        Some(i) => Err(format!(
            "{} {} references ${} but input has {} fields",
            what,
            expr,
            i,
            row_type.field_count()
        )),
        None => Ok(()),
    }
}
