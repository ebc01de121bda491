use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use anyhow::bail;
use itertools::Itertools;
use log::debug;
use petgraph::algo::is_cyclic_undirected;
use petgraph::graph::UnGraph;

use crate::catalog::{RelOptTable, ScannableTable};
use crate::error::{OptError, OptResult};
use crate::operator::LogicalOperator::{LogicalFilter, LogicalProjection, LogicalScan};
use crate::operator::{Filter, JoinType, Operator, Projection, TableScan};
use crate::plan::{RelCluster, RelId};
use crate::properties::RowType;
use crate::rex::{compose_conjunction, is_identity, RexNode};
use crate::shuttle::replace;
use crate::value::Row;

/// A foreign key path from `source` to `target`, as pairs of (source column, target column).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Step {
    pub source: usize,
    pub target: usize,
    pub keys: Vec<(usize, usize)>,
}

/// One table of a lattice and the columns it occupies in the star table.
#[derive(Clone, Debug)]
pub struct LatticeTable {
    table: Arc<RelOptTable>,
    /// Parent node and the step joining it to this one. `None` for the root.
    parent: Option<(usize, Vec<(usize, usize)>)>,
    start_col: usize,
    end_col: usize,
}

impl LatticeTable {
    pub fn table(&self) -> &Arc<RelOptTable> {
        &self.table
    }

    pub fn parent(&self) -> Option<usize> {
        self.parent.as_ref().map(|(p, _)| *p)
    }

    pub fn start_col(&self) -> usize {
        self.start_col
    }

    pub fn end_col(&self) -> usize {
        self.end_col
    }
}

/// Grows a lattice from its root (fact) table.
pub struct LatticeBuilder {
    tables: Vec<Arc<RelOptTable>>,
    steps: Vec<Step>,
}

impl LatticeBuilder {
    pub fn new(root: Arc<RelOptTable>) -> Self {
        Self {
            tables: vec![root],
            steps: vec![],
        }
    }

    /// Adds `table` and returns its node index. A table already in the lattice keeps its index.
    pub fn add_table(&mut self, table: Arc<RelOptTable>) -> usize {
        match self.tables.iter().position(|t| *t == table) {
            Some(idx) => idx,
            None => {
                self.tables.push(table);
                self.tables.len() - 1
            }
        }
    }

    pub fn add_step(&mut self, source: usize, target: usize, keys: Vec<(usize, usize)>) -> &mut Self {
        self.steps.push(Step {
            source,
            target,
            keys,
        });
        self
    }

    /// Checks that the steps form a tree rooted at the first table and lays its tables out as
    /// one star table named `star_name`, in depth first order.
    pub fn build<S: Into<String>>(&self, star_name: Vec<S>) -> OptResult<Lattice> {
        let n = self.tables.len();
        let mut graph = UnGraph::<usize, ()>::new_undirected();
        let nodes = (0..n).map(|i| graph.add_node(i)).collect_vec();
        let mut parents: Vec<Option<&Step>> = vec![None; n];
        for step in &self.steps {
            if step.source >= n || step.target >= n {
                bail!(invalid(format!(
                    "step {} -> {} refers to unknown table",
                    step.source, step.target
                )));
            }
            if step.target == 0 {
                bail!(invalid("the root table cannot be the target of a step"));
            }
            if parents[step.target].is_some() {
                bail!(invalid(format!(
                    "{} is the target of more than one step",
                    self.name(step.target)
                )));
            }
            let (source_cols, target_cols) = (
                self.tables[step.source].row_type().field_count(),
                self.tables[step.target].row_type().field_count(),
            );
            if step.keys.is_empty() || step.keys.iter().any(|(s, t)| *s >= source_cols || *t >= target_cols)
            {
                bail!(invalid(format!(
                    "bad keys {:?} from {} to {}",
                    step.keys,
                    self.name(step.source),
                    self.name(step.target)
                )));
            }
            parents[step.target] = Some(step);
            graph.add_edge(nodes[step.source], nodes[step.target], ());
        }
        if is_cyclic_undirected(&graph) {
            bail!(invalid("steps form a cycle"));
        }

        // Depth first, children in the order their steps were added.
        let mut order = vec![];
        let mut stack = vec![0];
        while let Some(node) = stack.pop() {
            order.push(node);
            let children = self.steps.iter().filter(|s| s.source == node).map(|s| s.target);
            stack.extend(children.collect_vec().into_iter().rev());
        }
        if order.len() != n {
            let unreachable = (0..n).find(|i| !order.contains(i)).unwrap_or(0);
            bail!(invalid(format!(
                "{} is not reachable from the root",
                self.name(unreachable)
            )));
        }

        let position: HashMap<usize, usize> = order.iter().enumerate().map(|(p, i)| (*i, p)).collect();
        let mut tables = Vec::with_capacity(n);
        let mut start_col = 0;
        for i in &order {
            let table = self.tables[*i].clone();
            let end_col = start_col + table.row_type().field_count();
            let parent = parents[*i].map(|step| (position[&step.source], step.keys.clone()));
            tables.push(LatticeTable {
                table,
                parent,
                start_col,
                end_col,
            });
            start_col = end_col;
        }

        Ok(Lattice::new(tables, star_name))
    }

    fn name(&self, idx: usize) -> String {
        self.tables[idx].qualified_name().join(".")
    }
}

fn invalid<S: Into<String>>(message: S) -> OptError {
    OptError::InvalidLattice(message.into())
}

/// Tables joined along foreign keys from a root fact table, flattened into one wide star table.
///
/// Rows of the star table are the inner join of every table along the steps, so a step must lead
/// to a unique key of its target for the star to have one row per fact row.
pub struct Lattice {
    tables: Vec<LatticeTable>,
    star_table: Arc<RelOptTable>,
}

impl Lattice {
    fn new<S: Into<String>>(tables: Vec<LatticeTable>, star_name: Vec<S>) -> Self {
        let fields = tables
            .iter()
            .flat_map(|t| t.table.row_type().fields().iter().cloned())
            .collect();
        let source = StarSource {
            tables: tables.clone(),
        };
        let star_table = RelOptTable::new(star_name, RowType::new(fields))
            .with_row_count(tables[0].table.row_count())
            .with_source(Arc::new(source));
        Self {
            tables,
            star_table: Arc::new(star_table),
        }
    }

    pub fn root_table(&self) -> &Arc<RelOptTable> {
        &self.tables[0].table
    }

    /// Tables in star column order, root first.
    pub fn tables(&self) -> &[LatticeTable] {
        &self.tables
    }

    pub fn star_table(&self) -> &Arc<RelOptTable> {
        &self.star_table
    }

    pub fn star_scan(&self, cluster: &mut RelCluster) -> OptResult<RelId> {
        cluster.create_default(
            Operator::Logical(LogicalScan(TableScan::new(self.star_table.clone()))),
            vec![],
        )
    }

    /// Replaces the outermost join trees of lattice tables that join the root table to at least
    /// one other table by reads of the star table. Returns `None` if there is no such tree.
    ///
    /// `rel` should be in leaf join form, filters pushed into joins and projections pulled above
    /// them.
    pub fn rewrite(&self, cluster: &mut RelCluster, rel: RelId) -> OptResult<Option<RelId>> {
        let mut root = rel;
        let mut changed = false;
        loop {
            let found = cluster.bfs_iterator(root).find_map(|id| {
                self.match_tree(cluster, id)
                    .filter(|m| m.tables.len() > 1 && m.tables.contains(&0))
                    .map(|m| (id, m))
            });
            match found {
                Some((id, matched)) => {
                    let star = self.star_rel(cluster, id, matched)?;
                    debug!("Rewrote {} to read star table {}", id, star);
                    root = replace(cluster, root, id, star)?;
                    changed = true;
                }
                None => break,
            }
        }
        Ok(changed.then(|| root))
    }

    fn table_index(&self, table: &RelOptTable) -> Option<usize> {
        self.tables.iter().position(|t| *t.table == *table)
    }

    /// Star column of each output field of `rel`, if `rel` joins lattice tables along steps.
    fn match_tree(&self, cluster: &RelCluster, rel: RelId) -> Option<StarMatch> {
        let operator = cluster.operator(rel);
        if let Some(scan) = operator.table_scan() {
            let idx = self.table_index(scan.table())?;
            let table = &self.tables[idx];
            return Some(StarMatch {
                tables: vec![idx],
                columns: (table.start_col..table.end_col).collect(),
                filters: vec![],
            });
        }

        if let Some(filter) = operator.filter() {
            let mut matched = self.match_tree(cluster, cluster.inputs(rel)[0])?;
            let condition = matched.to_star(filter.condition())?;
            matched.filters.extend(condition.conjunctions());
            return Some(matched);
        }

        let join = operator.join()?;
        if join.join_type() != JoinType::Inner {
            return None;
        }
        let inputs = cluster.inputs(rel);
        let left = self.match_tree(cluster, inputs[0])?;
        let right = self.match_tree(cluster, inputs[1])?;
        if left.tables.iter().any(|t| right.tables.contains(t)) {
            return None;
        }

        let mut matched = StarMatch {
            tables: left.tables.iter().chain(right.tables.iter()).copied().collect(),
            columns: left.columns.iter().chain(right.columns.iter()).copied().collect(),
            filters: left.filters.into_iter().chain(right.filters.into_iter()).collect(),
        };
        let mut conjuncts = matched.to_star(join.condition())?.conjunctions();

        // The step joining the two sides must be implied by the condition.
        let step = left
            .tables
            .iter()
            .chain(right.tables.iter())
            .filter_map(|t| self.tables[*t].parent.as_ref().map(|p| (*t, p)))
            .find(|(t, (parent, _))| {
                left.tables.contains(t) != left.tables.contains(parent)
                    && matched.tables.contains(parent)
            })?;
        let (child, (parent, keys)) = step;
        for (parent_col, child_col) in keys {
            let a = self.tables[*parent].start_col + parent_col;
            let b = self.tables[child].start_col + child_col;
            let position = conjuncts.iter().position(|c| {
                matches!(c.as_column_equality(), Some((x, y)) if (x, y) == (a, b) || (x, y) == (b, a))
            })?;
            conjuncts.remove(position);
        }
        matched.filters.extend(conjuncts);
        Some(matched)
    }

    fn star_rel(&self, cluster: &mut RelCluster, rel: RelId, matched: StarMatch) -> OptResult<RelId> {
        let mut input = self.star_scan(cluster)?;
        if let Some(condition) = compose_conjunction(matched.filters, true) {
            input = cluster.create_default(
                Operator::Logical(LogicalFilter(Filter::new(condition))),
                vec![input],
            )?;
        }

        let star_type = cluster.row_type(input);
        let exprs = matched
            .columns
            .iter()
            .map(|c| RexNode::input_ref(*c, star_type))
            .collect_vec();
        if is_identity(&exprs, star_type) {
            return Ok(input);
        }
        let names = cluster
            .row_type(rel)
            .field_names()
            .into_iter()
            .map(String::from)
            .collect();
        cluster.create_default(
            Operator::Logical(LogicalProjection(Projection::new(exprs, names))),
            vec![input],
        )
    }
}

impl Debug for Lattice {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lattice")
            .field("star_table", &self.star_table.qualified_name())
            .field(
                "tables",
                &self
                    .tables
                    .iter()
                    .map(|t| t.table.qualified_name().join("."))
                    .collect_vec(),
            )
            .finish()
    }
}

struct StarMatch {
    tables: Vec<usize>,
    columns: Vec<usize>,
    /// Conjuncts over star columns.
    filters: Vec<RexNode>,
}

impl StarMatch {
    fn to_star(&self, expr: &RexNode) -> Option<RexNode> {
        expr.remap_input_refs(|i| self.columns.get(i).copied())
    }
}

/// Joins the lattice tables along their steps, dropping fact rows without a match.
struct StarSource {
    tables: Vec<LatticeTable>,
}

impl ScannableTable for StarSource {
    fn scan(&self) -> OptResult<Vec<Row>> {
        let mut rows = self.tables[0].table.scan()?;
        for table in &self.tables[1..] {
            let (parent, keys) = match &table.parent {
                Some(parent) => parent,
                None => bail!(invalid("only the root table has no parent")),
            };
            let parent_start = self.tables[*parent].start_col;
            let targets = table.table.scan()?;
            rows = rows
                .into_iter()
                .filter_map(|row| {
                    targets
                        .iter()
                        .find(|target| {
                            keys.iter().all(|(pc, tc)| {
                                let value = row.get(parent_start + pc);
                                !value.is_null() && value == target.get(*tc)
                            })
                        })
                        .map(|target| row.concat(target))
                })
                .collect();
        }
        Ok(rows)
    }
}
