//! Textual rendering of plans.
//!
//! The same [`RelWriter`] terms feed both the one level digest of a node and the recursive plan
//! dumps below.

use std::fmt::Display;

use itertools::Itertools;
use prettytable::{Cell, Row, Table};

use crate::plan::{RelCluster, RelId};

/// Collects `name=value` attribute pairs of one node.
#[derive(Debug, Default)]
pub struct RelWriter {
    terms: Vec<(String, String)>,
}

impl RelWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn item<V: Display>(&mut self, name: &str, value: V) -> &mut Self {
        self.terms.push((name.to_string(), value.to_string()));
        self
    }

    pub fn item_if<V: Display>(&mut self, name: &str, value: V, condition: bool) -> &mut Self {
        if condition {
            self.item(name, value);
        }
        self
    }

    pub fn terms(&self) -> &[(String, String)] {
        &self.terms
    }

    pub fn render(&self) -> String {
        self.terms
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .join(", ")
    }
}

fn explain_node(cluster: &RelCluster, id: RelId) -> String {
    let node = cluster.node(id);
    let mut writer = RelWriter::new();
    node.operator().explain_terms(&mut writer);
    format!("{}({})", node.kind(), writer.render())
}

/// Renders the tree under `root`, one node per line, children indented below their parent.
///
/// Shared inputs are printed under every parent. Subsets are printed as leaves.
pub fn explain(cluster: &RelCluster, root: RelId) -> String {
    let mut lines = Vec::new();
    let mut stack = vec![(root, 0usize)];
    while let Some((id, depth)) = stack.pop() {
        lines.push(format!("{}{}", "  ".repeat(depth), explain_node(cluster, id)));
        for input in cluster.inputs(id).iter().rev() {
            stack.push((*input, depth + 1));
        }
    }
    lines.join("\n")
}

/// Renders the tree under `root` as a table with the estimated row count and the collations of
/// every node.
pub fn explain_with_metadata(cluster: &RelCluster, root: RelId) -> String {
    let mut mq = cluster.metadata_query();
    let mut table = Table::new();
    table.set_titles(Row::new(vec![
        Cell::new("id"),
        Cell::new("operator"),
        Cell::new("rows"),
        Cell::new("collations"),
    ]));

    let mut stack = vec![(root, 0usize)];
    while let Some((id, depth)) = stack.pop() {
        let rows = match mq.row_count(id) {
            Ok(rows) => format!("{:.1}", rows),
            Err(e) => e.to_string(),
        };
        let collations = match mq.collations(id) {
            Ok(collations) => collations.iter().join(", "),
            Err(e) => e.to_string(),
        };
        table.add_row(Row::new(vec![
            Cell::new(&id.to_string()),
            Cell::new(&format!("{}{}", "  ".repeat(depth), explain_node(cluster, id))),
            Cell::new(&rows),
            Cell::new(&collations),
        ]));
        for input in cluster.inputs(id).iter().rev() {
            stack.push((*input, depth + 1));
        }
    }
    table.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rex::RexNode;
    use crate::test_util::cluster;

    #[test]
    fn test_writer_render() {
        let mut writer = RelWriter::new();
        writer
            .item("a", 1)
            .item_if("b", "x", false)
            .item("c", "y");
        assert_eq!("a=1, c=y", writer.render());
        assert_eq!(2, writer.terms().len());
    }

    #[test]
    fn test_explain_tree() {
        let mut cluster = cluster();
        let mut builder = cluster.builder();
        builder.scan(&["hr", "emps"]).unwrap();
        let cond = builder.field(2).gt(RexNode::literal(10));
        let root = builder.filter(cond).unwrap().build().unwrap();
        assert_eq!(
            "LogicalFilter(condition=>($2, 10))\n  LogicalTableScan(table=[hr, emps])",
            explain(&cluster, root)
        );
    }

    #[test]
    fn test_explain_with_metadata() {
        let mut cluster = cluster();
        let root = cluster
            .builder()
            .scan(&["hr", "emps"])
            .unwrap()
            .build()
            .unwrap();
        let text = explain_with_metadata(&cluster, root);
        assert!(text.contains("LogicalTableScan(table=[hr, emps])"));
        assert!(text.contains("5.0"));
    }
}
