use std::collections::HashMap;

use petgraph::prelude::{NodeIndex, StableGraph};
use petgraph::visit::Bfs;
use petgraph::{Directed, Direction};

use crate::heuristic::MatchOrder;
use crate::plan::{RelCluster, RelId};

type HepGraph = StableGraph<RelId, (), Directed, u32>;
pub type HepNodeId = NodeIndex<u32>;

/// The nodes reachable from one root, with an edge from each node to each of its inputs.
///
/// A plan should be a single root dag, so a node shared by several parents appears once.
pub struct PlanGraph {
    graph: HepGraph,
    root: HepNodeId,
}

impl PlanGraph {
    pub fn new(cluster: &RelCluster, root: RelId) -> Self {
        let mut graph = HepGraph::default();
        let mut node_ids = HashMap::<RelId, HepNodeId>::new();

        let rels: Vec<RelId> = cluster.bfs_iterator(root).collect();
        for rel in &rels {
            node_ids.insert(*rel, graph.add_node(*rel));
        }
        for rel in &rels {
            for input in cluster.inputs(*rel) {
                // every input was reached by the walk above
                if let (Some(from), Some(to)) = (node_ids.get(rel), node_ids.get(input)) {
                    graph.add_edge(*from, *to, ());
                }
            }
        }

        let root = node_ids[&root];
        Self { graph, root }
    }

    pub fn root(&self) -> RelId {
        self.graph[self.root]
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Nodes that take `rel` as an input.
    pub fn parents(&self, rel: RelId) -> Vec<RelId> {
        match self.graph.node_indices().find(|idx| self.graph[*idx] == rel) {
            Some(idx) => self
                .graph
                .neighbors_directed(idx, Direction::Incoming)
                .map(|p| self.graph[p])
                .collect(),
            None => vec![],
        }
    }

    pub fn nodes_iter(&self, match_order: MatchOrder) -> Box<dyn Iterator<Item = RelId>> {
        match match_order {
            MatchOrder::TopDown => Box::new(self.top_down_node_iters()),
            MatchOrder::BottomUp => Box::new(self.bottom_up_node_iters()),
        }
    }

    fn bfs_ids(&self) -> Vec<RelId> {
        let mut ids = Vec::with_capacity(self.graph.node_count());
        let mut bfs = Bfs::new(&self.graph, self.root);
        while let Some(node_id) = bfs.next(&self.graph) {
            ids.push(self.graph[node_id]);
        }
        ids
    }

    /// Return node ids in bottom up order.
    fn bottom_up_node_iters(&self) -> impl Iterator<Item = RelId> {
        self.bfs_ids().into_iter().rev()
    }

    /// Return node ids in top down order.
    fn top_down_node_iters(&self) -> impl Iterator<Item = RelId> {
        self.bfs_ids().into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::JoinType;
    use crate::rex::RexNode;
    use crate::test_util::cluster;

    #[test]
    fn test_orders() {
        let mut cluster = cluster();
        let mut builder = cluster.builder();
        builder.scan(&["hr", "emps"]).unwrap();
        builder.scan(&["hr", "depts"]).unwrap();
        let cond = builder.join_field(0, 2).eq(builder.join_field(1, 0));
        builder.join(JoinType::Inner, cond).unwrap();
        let cond = builder.field(0).gt(RexNode::literal(1));
        let root = builder.filter(cond).unwrap().build().unwrap();

        let graph = PlanGraph::new(&cluster, root);
        assert_eq!(4, graph.node_count());
        assert_eq!(root, graph.root());

        let top_down: Vec<RelId> = graph.nodes_iter(MatchOrder::TopDown).collect();
        assert_eq!(root, top_down[0]);
        let bottom_up: Vec<RelId> = graph.nodes_iter(MatchOrder::BottomUp).collect();
        assert_eq!(Some(&root), bottom_up.last());

        let join = cluster.inputs(root)[0];
        assert_eq!(vec![root], graph.parents(join));
        assert_eq!(vec![join], graph.parents(cluster.inputs(join)[1]));
    }

    #[test]
    fn test_shared_input_appears_once() {
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
        let graph = PlanGraph::new(&cluster, union);
        assert_eq!(2, graph.node_count());
    }
}
