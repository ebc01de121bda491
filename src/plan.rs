use std::cell::OnceCell;
use std::collections::HashSet;
use std::mem::swap;
use std::sync::Arc;

use anyhow::{bail, ensure};
use derive_more::{Display, From};
use itertools::Itertools;
use log::trace;
use smallvec::SmallVec;

use crate::bitset::ImmutableBitSet;
use crate::catalog::{Catalog, RelOptTable};
use crate::config::PlannerConfig;
use crate::error::{OptError, OptResult};
use crate::explain::RelWriter;
use crate::metadata::{RelMetadataProvider, RelMetadataQuery, DEFAULT_METADATA_PROVIDER};
use crate::operator::LogicalOperator::*;
use crate::operator::*;
use crate::optimizer::{Optimizer, OptimizerContext};
use crate::properties::{PhysicalProp, RelCollation, RelDistribution, RowType, TraitSet};
use crate::rex::{RexInputRef, RexNode};
use crate::types::TypeFactory;
use crate::value::Value;

/// Identifier of a node in a [`RelCluster`].
///
/// Ids are assigned in creation order and never reused within a cluster.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Display, From)]
pub struct RelId(usize);

impl RelId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// One relational expression.
///
/// A node never changes after creation, except for the members of a subset. Rewrites create new
/// nodes through [`RelCluster::copy`].
#[derive(Debug)]
pub struct RelNode {
    id: RelId,
    operator: Operator,
    traits: TraitSet,
    inputs: SmallVec<[RelId; 2]>,
    digest: String,
    row_type: OnceCell<RowType>,
}

impl RelNode {
    pub fn id(&self) -> RelId {
        self.id
    }

    pub fn operator(&self) -> &Operator {
        &self.operator
    }

    pub fn kind(&self) -> RelKind {
        self.operator.kind()
    }

    pub fn traits(&self) -> &TraitSet {
        &self.traits
    }

    pub fn inputs(&self) -> &[RelId] {
        &self.inputs
    }

    pub fn input(&self, idx: usize) -> RelId {
        self.inputs[idx]
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }
}

/// The planning session: an arena owning every node, plus the services nodes share.
pub struct RelCluster {
    nodes: Vec<RelNode>,
    type_factory: TypeFactory,
    metadata_provider: Arc<RelMetadataProvider>,
    context: OptimizerContext,
    catalog: Arc<Catalog>,
}

/// Breadth first iterator of a single root dag.
struct BfsRelIter<'a> {
    cluster: &'a RelCluster,
    visited: HashSet<RelId>,
    cur_level: Vec<RelId>,
    next_level: Vec<RelId>,
}

impl<'a> Iterator for BfsRelIter<'a> {
    type Item = RelId;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cur_level.is_empty() {
            swap(&mut self.cur_level, &mut self.next_level);
            self.cur_level.reverse();
        }

        if let Some(p) = self.cur_level.pop() {
            for input in self.cluster.inputs(p) {
                if self.visited.insert(*input) {
                    self.next_level.push(*input);
                }
            }

            Some(p)
        } else {
            None
        }
    }
}

impl RelCluster {
    pub fn new(catalog: Arc<Catalog>, config: PlannerConfig) -> Self {
        Self {
            nodes: vec![],
            type_factory: TypeFactory::new(),
            metadata_provider: DEFAULT_METADATA_PROVIDER.clone(),
            context: OptimizerContext::new(config),
            catalog,
        }
    }

    pub fn with_metadata_provider(mut self, provider: Arc<RelMetadataProvider>) -> Self {
        self.metadata_provider = provider;
        self
    }

    pub fn context(&self) -> &OptimizerContext {
        &self.context
    }

    pub fn config(&self) -> &PlannerConfig {
        self.context.config()
    }

    pub fn type_factory(&self) -> &TypeFactory {
        &self.type_factory
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn metadata_provider(&self) -> &RelMetadataProvider {
        &self.metadata_provider
    }

    /// Starts a metadata query. Its cache lives as long as the returned value.
    pub fn metadata_query(&self) -> RelMetadataQuery<'_> {
        RelMetadataQuery::new(self)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: RelId) -> &RelNode {
        &self.nodes[id.0]
    }

    pub fn operator(&self, id: RelId) -> &Operator {
        &self.node(id).operator
    }

    pub fn kind(&self, id: RelId) -> RelKind {
        self.node(id).kind()
    }

    pub fn traits(&self, id: RelId) -> &TraitSet {
        &self.node(id).traits
    }

    pub fn inputs(&self, id: RelId) -> &[RelId] {
        &self.node(id).inputs
    }

    pub fn digest(&self, id: RelId) -> &str {
        &self.node(id).digest
    }

    /// Output row type, derived on first access.
    pub fn row_type(&self, id: RelId) -> &RowType {
        let node = self.node(id);
        node.row_type.get_or_init(|| {
            let inputs: Vec<&RowType> = node.inputs.iter().map(|i| self.row_type(*i)).collect();
            node.operator.derive_row_type(&self.type_factory, &inputs)
        })
    }

    pub fn field_count(&self, id: RelId) -> usize {
        self.row_type(id).field_count()
    }

    /// Digest of a node: kind and traits, then its inputs as `kind#id`, then its attributes.
    fn compute_digest(&self, id: RelId, operator: &Operator, traits: &TraitSet, inputs: &[RelId]) -> String {
        let mut writer = RelWriter::new();
        match inputs {
            [input] => {
                writer.item("input", self.input_digest(*input));
            }
            [left, right] if operator.input_count() == Some(2) => {
                writer
                    .item("left", self.input_digest(*left))
                    .item("right", self.input_digest(*right));
            }
            inputs => {
                for (i, input) in inputs.iter().enumerate() {
                    writer.item(&format!("input#{}", i), self.input_digest(*input));
                }
            }
        }
        if operator.as_subset().is_some() {
            writer.item("id", id);
        } else {
            operator.explain_terms(&mut writer);
        }
        format!("{}.{}({})", operator.kind(), traits, writer.render())
    }

    fn input_digest(&self, input: RelId) -> String {
        format!("{}#{}", self.kind(input), input)
    }

    /// Creates a node. The number of inputs must match the operator.
    pub fn create(
        &mut self,
        operator: Operator,
        traits: TraitSet,
        inputs: Vec<RelId>,
    ) -> OptResult<RelId> {
        let id = RelId(self.nodes.len());
        match operator.input_count() {
            Some(count) => ensure!(
                inputs.len() == count,
                OptError::InvalidRel(
                    id,
                    format!("{} takes {} inputs, got {}", operator.kind(), count, inputs.len())
                )
            ),
            None => ensure!(
                !inputs.is_empty(),
                OptError::InvalidRel(id, format!("{} takes at least one input", operator.kind()))
            ),
        }
        if let Some(input) = inputs.iter().find(|i| i.0 >= self.nodes.len()) {
            bail!(OptError::InvalidRel(id, format!("unknown input {}", input)));
        }
        if operator.as_subset().is_none() {
            ensure!(
                traits.convention() == operator.convention(),
                OptError::InvalidRel(
                    id,
                    format!(
                        "{} cannot have convention {}",
                        operator.kind(),
                        traits.convention()
                    )
                )
            );
        }

        let digest = self.compute_digest(id, &operator, &traits, &inputs);
        trace!("Created {}: {}", id, digest);
        self.nodes.push(RelNode {
            id,
            operator,
            traits,
            inputs: inputs.into_iter().collect(),
            digest,
            row_type: OnceCell::new(),
        });
        Ok(id)
    }

    /// Creates a node with the operator's default traits.
    pub fn create_default(&mut self, operator: Operator, inputs: Vec<RelId>) -> OptResult<RelId> {
        let traits = operator.default_traits();
        self.create(operator, traits, inputs)
    }

    /// Returns a node like `id` with other traits or inputs.
    ///
    /// Returns `id` itself if both are unchanged. A node cannot be copied to another convention,
    /// and a subset cannot be copied at all.
    pub fn copy(&mut self, id: RelId, traits: &TraitSet, inputs: &[RelId]) -> OptResult<RelId> {
        let node = self.node(id);
        if node.traits == *traits && node.inputs.as_slice() == inputs {
            return Ok(id);
        }
        let kind = node.kind();
        if node.operator.as_subset().is_some() || node.traits.convention() != traits.convention()
        {
            bail!(OptError::CopyNotSupported {
                kind: kind.into(),
                traits: node.traits.to_string(),
                desired: traits.to_string(),
            });
        }
        ensure!(
            node.inputs.len() == inputs.len(),
            OptError::InvalidRel(
                id,
                format!("copy with {} inputs, expected {}", inputs.len(), node.inputs.len())
            )
        );
        let operator = node.operator.clone();
        self.create(operator, traits.clone(), inputs.to_vec())
    }

    /// Checks the node's attributes against its inputs.
    pub fn is_valid(&self, id: RelId) -> OptResult<()> {
        let inputs: Vec<&RowType> = self.inputs(id).iter().map(|i| self.row_type(*i)).collect();
        match self.operator(id).validate(&inputs) {
            Ok(()) => Ok(()),
            Err(msg) => bail!(OptError::InvalidRel(id, msg)),
        }
    }

    /// Creates an empty subset of expressions with the given row type and required traits.
    pub fn create_subset(&mut self, row_type: RowType, traits: TraitSet) -> OptResult<RelId> {
        self.create(Operator::Subset(RelSubset::new(row_type)), traits, vec![])
    }

    /// Adds `member` to `subset`. The member must have a compatible row type and satisfy the
    /// subset's traits.
    pub fn add_to_subset(&mut self, subset: RelId, member: RelId) -> OptResult<()> {
        ensure!(
            self.operator(subset).as_subset().is_some(),
            OptError::InvalidRel(subset, "not a subset".to_string())
        );
        let before = self.row_type(subset);
        let after = self.row_type(member);
        ensure!(
            before.is_compatible(after),
            OptError::RowTypeMismatch {
                rel: member,
                before: before.to_string(),
                after: after.to_string(),
            }
        );
        ensure!(
            self.traits(member).satisfies(self.traits(subset)),
            OptError::InvalidRel(
                member,
                format!(
                    "traits {} do not satisfy subset traits {}",
                    self.traits(member),
                    self.traits(subset)
                )
            )
        );
        if let Operator::Subset(s) = &mut self.nodes[subset.0].operator {
            s.add_member(member);
        }
        Ok(())
    }

    pub fn set_best(&mut self, subset: RelId, member: RelId) -> OptResult<()> {
        match &mut self.nodes[subset.0].operator {
            Operator::Subset(s) if s.members().contains(&member) => {
                s.set_best(member);
                Ok(())
            }
            _ => bail!(OptError::InvalidRel(
                subset,
                format!("{} is not a member", member)
            )),
        }
    }

    pub fn bfs_iterator(&self, root: RelId) -> impl Iterator<Item = RelId> + '_ {
        let mut visited = HashSet::new();
        visited.insert(root);

        BfsRelIter {
            cluster: self,
            cur_level: vec![root],
            next_level: vec![],
            visited,
        }
    }

    /// `root` and every node reachable from it through inputs.
    pub fn descendants(&self, root: RelId) -> HashSet<RelId> {
        self.bfs_iterator(root).collect()
    }

    /// Tables scanned under `root`, each once, in breadth first order.
    pub fn find_tables(&self, root: RelId) -> Vec<Arc<RelOptTable>> {
        self.bfs_iterator(root)
            .filter_map(|id| self.operator(id).table_scan().map(|s| s.table().clone()))
            .unique_by(|t| t.qualified_name().to_vec())
            .collect()
    }

    pub fn builder(&mut self) -> RelBuilder<'_> {
        RelBuilder {
            cluster: self,
            stack: vec![],
        }
    }
}

/// Runs when a node is first added to a planner: registers the inputs, copies the node over the
/// registered inputs and validates the result.
///
/// An input whose registered representative has an incompatible row type is a bug in whatever
/// rewrite produced it and fails the planning pass.
pub fn on_register<P: Optimizer + ?Sized>(planner: &mut P, id: RelId) -> OptResult<RelId> {
    let inputs = planner.cluster().inputs(id).to_vec();
    let mut new_inputs = Vec::with_capacity(inputs.len());
    for input in inputs {
        let registered = planner.ensure_registered(input)?;
        if registered != input {
            let cluster = planner.cluster();
            let before = cluster.row_type(input);
            let after = cluster.row_type(registered);
            ensure!(
                before.is_compatible(after),
                OptError::RowTypeMismatch {
                    rel: input,
                    before: before.to_string(),
                    after: after.to_string(),
                }
            );
        }
        new_inputs.push(registered);
    }
    let traits = planner.cluster().traits(id).clone();
    let new_id = planner.cluster_mut().copy(id, &traits, &new_inputs)?;
    planner.cluster().is_valid(new_id)?;
    Ok(new_id)
}

/// Builds logical plans bottom up on a stack.
///
/// Each method pops its inputs and pushes the new node.
pub struct RelBuilder<'a> {
    cluster: &'a mut RelCluster,
    stack: Vec<RelId>,
}

impl<'a> RelBuilder<'a> {
    fn pop(&mut self) -> OptResult<RelId> {
        match self.stack.pop() {
            Some(id) => Ok(id),
            None => bail!("relational builder stack is empty"),
        }
    }

    fn push_new(&mut self, operator: LogicalOperator, inputs: Vec<RelId>) -> OptResult<&mut Self> {
        let id = self
            .cluster
            .create_default(Operator::Logical(operator), inputs)?;
        self.stack.push(id);
        Ok(self)
    }

    pub fn push(&mut self, id: RelId) -> &mut Self {
        self.stack.push(id);
        self
    }

    pub fn peek(&self) -> Option<RelId> {
        self.stack.last().copied()
    }

    /// Reference to field `index` of the top of the stack.
    ///
    /// # Panics
    ///
    /// If the stack is empty.
    pub fn field(&self, index: usize) -> RexNode {
        let top = self.stack[self.stack.len() - 1];
        RexNode::input_ref(index, self.cluster.row_type(top))
    }

    /// Reference to field `index` of the left (`side` 0) or right (`side` 1) input of a join
    /// about to be built from the two topmost nodes, in the numbering of the join's output.
    ///
    /// # Panics
    ///
    /// If the stack holds fewer than two nodes.
    pub fn join_field(&self, side: usize, index: usize) -> RexNode {
        let left = self.stack[self.stack.len() - 2];
        let right = self.stack[self.stack.len() - 1];
        match side {
            0 => RexNode::input_ref(index, self.cluster.row_type(left)),
            _ => RexNode::InputRef(RexInputRef::new(
                self.cluster.field_count(left) + index,
                self.cluster.row_type(right).fields()[index].data_type(),
            )),
        }
    }

    pub fn scan(&mut self, names: &[&str]) -> OptResult<&mut Self> {
        let case_sensitive = self.cluster.config().case_sensitive;
        let table = self.cluster.catalog.table(names, case_sensitive)?;
        self.push_new(LogicalScan(TableScan::new(table)), vec![])
    }

    pub fn values(&mut self, row_type: RowType, tuples: Vec<Vec<Value>>) -> OptResult<&mut Self> {
        self.push_new(LogicalValues(Values::new(row_type, tuples)), vec![])
    }

    pub fn filter(&mut self, condition: RexNode) -> OptResult<&mut Self> {
        let input = self.pop()?;
        self.push_new(LogicalFilter(Filter::new(condition)), vec![input])
    }

    /// Projects `exprs`, naming plain field references after the field they copy.
    pub fn project(&mut self, exprs: Vec<RexNode>) -> OptResult<&mut Self> {
        let top = match self.peek() {
            Some(top) => top,
            None => bail!("relational builder stack is empty"),
        };
        let row_type = self.cluster.row_type(top);
        let names = exprs
            .iter()
            .enumerate()
            .map(|(i, e)| match e.as_input_ref() {
                Some(idx) if idx < row_type.field_count() => {
                    row_type.fields()[idx].name().to_string()
                }
                _ => format!("$f{}", i),
            })
            .collect();
        self.project_named(exprs, names)
    }

    pub fn project_named(&mut self, exprs: Vec<RexNode>, names: Vec<String>) -> OptResult<&mut Self> {
        let input = self.pop()?;
        self.push_new(LogicalProjection(Projection::new(exprs, names)), vec![input])
    }

    /// Joins the two topmost nodes, the topmost being the right input.
    pub fn join(&mut self, join_type: JoinType, condition: RexNode) -> OptResult<&mut Self> {
        let right = self.pop()?;
        let left = self.pop()?;
        self.push_new(LogicalJoin(Join::new(join_type, condition)), vec![left, right])
    }

    pub fn aggregate(
        &mut self,
        group_set: ImmutableBitSet,
        agg_calls: Vec<AggregateCall>,
    ) -> OptResult<&mut Self> {
        let input = self.pop()?;
        self.push_new(LogicalAggregate(Aggregate::new(group_set, agg_calls)), vec![input])
    }

    pub fn sort(&mut self, collation: RelCollation) -> OptResult<&mut Self> {
        self.sort_limit(collation, 0, None)
    }

    pub fn sort_limit(
        &mut self,
        collation: RelCollation,
        offset: usize,
        fetch: Option<usize>,
    ) -> OptResult<&mut Self> {
        let input = self.pop()?;
        self.push_new(
            LogicalSort(Sort::with_limit(collation, offset, fetch)),
            vec![input],
        )
    }

    fn pop_n(&mut self, n: usize) -> OptResult<Vec<RelId>> {
        ensure!(
            self.stack.len() >= n,
            "set operation over {} inputs but stack holds {}",
            n,
            self.stack.len()
        );
        Ok(self.stack.split_off(self.stack.len() - n))
    }

    /// Union of the `n` topmost nodes.
    pub fn union(&mut self, all: bool, n: usize) -> OptResult<&mut Self> {
        let inputs = self.pop_n(n)?;
        self.push_new(LogicalUnion(SetOp::new(all)), inputs)
    }

    pub fn intersect(&mut self, all: bool, n: usize) -> OptResult<&mut Self> {
        let inputs = self.pop_n(n)?;
        self.push_new(LogicalIntersect(SetOp::new(all)), inputs)
    }

    pub fn minus(&mut self, all: bool, n: usize) -> OptResult<&mut Self> {
        let inputs = self.pop_n(n)?;
        self.push_new(LogicalMinus(SetOp::new(all)), inputs)
    }

    pub fn exchange(&mut self, distribution: RelDistribution) -> OptResult<&mut Self> {
        let input = self.pop()?;
        self.push_new(LogicalExchange(Exchange::new(distribution)), vec![input])
    }

    /// Pops the finished plan, validating every node in it.
    pub fn build(&mut self) -> OptResult<RelId> {
        let root = self.pop()?;
        for id in self.cluster.bfs_iterator(root).collect::<Vec<_>>() {
            self.cluster.is_valid(id)?;
        }
        Ok(root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::Convention;
    use crate::test_util::cluster;

    #[test]
    fn test_digest_is_one_level() {
        let mut cluster = cluster();
        let mut builder = cluster.builder();
        builder.scan(&["hr", "emps"]).unwrap();
        let cond = builder.field(2).gt(RexNode::literal(10));
        let filter = builder.filter(cond).unwrap().build().unwrap();
        assert_eq!(
            "LogicalFilter.NONE.[].any(input=LogicalTableScan#0, condition=>($2, 10))",
            cluster.digest(filter)
        );
    }

    #[test]
    fn test_digest_changes_with_traits_and_inputs() {
        let mut cluster = cluster();
        let scan = cluster.builder().scan(&["hr", "emps"]).unwrap().build().unwrap();
        let other = cluster.builder().scan(&["hr", "emps"]).unwrap().build().unwrap();
        let filter = cluster
            .builder()
            .push(scan)
            .filter(RexNode::bool_literal(true))
            .unwrap()
            .build()
            .unwrap();
        let digest = cluster.digest(filter).to_string();
        assert_eq!(digest, cluster.digest(filter));

        let moved = cluster.copy(filter, &TraitSet::logical(), &[other]).unwrap();
        assert_ne!(digest, cluster.digest(moved));

        let sorted = TraitSet::logical().with_collation(RelCollation::of_keys(vec![0]));
        let resorted = cluster.copy(filter, &sorted, &[scan]).unwrap();
        assert_ne!(digest, cluster.digest(resorted));
    }

    #[test]
    fn test_copy_unchanged_returns_same_node() {
        let mut cluster = cluster();
        let scan = cluster.builder().scan(&["hr", "emps"]).unwrap().build().unwrap();
        let count = cluster.len();
        let copied = cluster.copy(scan, &TraitSet::logical(), &[]).unwrap();
        assert_eq!(scan, copied);
        assert_eq!(count, cluster.len());
    }

    #[test]
    fn test_copy_to_other_convention_fails() {
        let mut cluster = cluster();
        let scan = cluster.builder().scan(&["hr", "emps"]).unwrap().build().unwrap();
        let err = cluster
            .copy(scan, &TraitSet::new(Convention::Enumerable), &[])
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<OptError>(),
            Some(OptError::CopyNotSupported { .. })
        ));
    }

    #[test]
    fn test_create_checks_arity() {
        let mut cluster = cluster();
        let scan = cluster.builder().scan(&["hr", "emps"]).unwrap().build().unwrap();
        let join = Operator::Logical(LogicalJoin(Join::new(
            JoinType::Inner,
            RexNode::bool_literal(true),
        )));
        assert!(cluster.create_default(join, vec![scan]).is_err());
    }

    #[test]
    fn test_invalid_filter_rejected() {
        let mut cluster = cluster();
        let mut builder = cluster.builder();
        builder.scan(&["hr", "emps"]).unwrap();
        let err = builder
            .filter(RexNode::literal(1))
            .unwrap()
            .build()
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<OptError>(),
            Some(OptError::InvalidRel(..))
        ));
    }

    #[test]
    fn test_subset_members() {
        let mut cluster = cluster();
        let emps = cluster.builder().scan(&["hr", "emps"]).unwrap().build().unwrap();
        let depts = cluster.builder().scan(&["hr", "depts"]).unwrap().build().unwrap();
        let row_type = cluster.row_type(emps).clone();
        let subset = cluster.create_subset(row_type, TraitSet::logical()).unwrap();
        cluster.add_to_subset(subset, emps).unwrap();
        assert!(cluster.add_to_subset(subset, depts).is_err());
        assert!(cluster.set_best(subset, depts).is_err());
        cluster.set_best(subset, emps).unwrap();
        let s = cluster.operator(subset).as_subset().unwrap();
        assert_eq!(Some(emps), s.best());
        assert!(cluster.digest(subset).contains(&format!("id={}", subset)));
    }

    #[test]
    fn test_bfs_visits_shared_input_once() {
        let mut cluster = cluster();
        let scan = cluster.builder().scan(&["hr", "emps"]).unwrap().build().unwrap();
        let union = cluster
            .builder()
            .push(scan)
            .push(scan)
            .union(true, 2)
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(vec![union, scan], cluster.bfs_iterator(union).collect::<Vec<_>>());
        assert_eq!(1, cluster.find_tables(union).len());
    }

    #[test]
    fn test_case_insensitive_scan() {
        let mut cluster = crate::test_util::cluster_with_config(
            PlannerConfig::default().with_case_sensitive(false),
        );
        assert!(cluster.builder().scan(&["HR", "EMPS"]).is_ok());
        let mut cluster = crate::test_util::cluster();
        assert!(cluster.builder().scan(&["HR", "EMPS"]).is_err());
    }
}
