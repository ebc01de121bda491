use std::collections::{HashMap, HashSet};

use crate::error::OptResult;
use crate::interpreter::{Node, Sink, Source};
use crate::value::Row;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SetOpKind {
    Union,
    Intersect,
    Minus,
}

/// Union, intersect or minus of any number of inputs.
///
/// With `all` duplicates follow multiset semantics: a row occurring `n` times in the first input
/// and `m` times in another is emitted `min(n, m)` times by intersect and `n - m` times by minus.
/// Rows come out in the order of their first occurrence.
pub struct SetOpNode {
    sources: Vec<Source>,
    kind: SetOpKind,
    all: bool,
}

impl SetOpNode {
    pub fn new(sources: Vec<Source>, kind: SetOpKind, all: bool) -> Self {
        Self { sources, kind, all }
    }

    fn union(&mut self, sink: &mut Sink) -> OptResult<()> {
        let mut seen = HashSet::new();
        for source in &mut self.sources {
            while let Some(row) = source.receive()? {
                if self.all || seen.insert(row.clone()) {
                    sink.send(row)?;
                }
            }
        }
        sink.end()
    }

    fn intersect_or_minus(&mut self, sink: &mut Sink) -> OptResult<()> {
        let mut sources = self.sources.iter_mut();
        let first = match sources.next() {
            Some(source) => source.receive_all()?,
            None => return sink.end(),
        };

        // Remaining multiplicity of each row of the first input.
        let mut counts: HashMap<Row, usize> = HashMap::new();
        for row in &first {
            *counts.entry(row.clone()).or_default() += 1;
        }
        for source in sources {
            let mut other: HashMap<Row, usize> = HashMap::new();
            while let Some(row) = source.receive()? {
                *other.entry(row).or_default() += 1;
            }
            for (row, count) in counts.iter_mut() {
                let matched = other.get(row).copied().unwrap_or(0);
                *count = match self.kind {
                    SetOpKind::Intersect => (*count).min(matched),
                    _ if self.all => count.saturating_sub(matched),
                    _ if matched > 0 => 0,
                    _ => *count,
                };
            }
        }

        for row in first {
            if let Some(count) = counts.get_mut(&row) {
                if *count > 0 {
                    *count = if self.all { *count - 1 } else { 0 };
                    sink.send(row)?;
                }
            }
        }
        sink.end()
    }
}

impl Node for SetOpNode {
    fn run(&mut self, sink: &mut Sink) -> OptResult<()> {
        match self.kind {
            SetOpKind::Union => self.union(sink),
            SetOpKind::Intersect | SetOpKind::Minus => self.intersect_or_minus(sink),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    use super::*;
    use crate::row;

    fn run(inputs: Vec<Vec<Row>>, kind: SetOpKind, all: bool) -> Vec<Row> {
        let cancel = Arc::new(AtomicBool::new(false));
        let sources = inputs
            .into_iter()
            .map(|rows| Source::new(Arc::new(rows), cancel.clone()))
            .collect();
        let mut sink = Sink::default();
        SetOpNode::new(sources, kind, all).run(&mut sink).unwrap();
        assert!(sink.ended);
        sink.rows
    }

    fn inputs() -> Vec<Vec<Row>> {
        vec![
            vec![row![1], row![2], row![2], row![2], row![3]],
            vec![row![2], row![3], row![3], row![4], row![2]],
        ]
    }

    #[test]
    fn test_union() {
        assert_eq!(10, run(inputs(), SetOpKind::Union, true).len());
        assert_eq!(
            vec![row![1], row![2], row![3], row![4]],
            run(inputs(), SetOpKind::Union, false)
        );
    }

    #[test]
    fn test_intersect() {
        assert_eq!(
            vec![row![2], row![2], row![3]],
            run(inputs(), SetOpKind::Intersect, true)
        );
        assert_eq!(
            vec![row![2], row![3]],
            run(inputs(), SetOpKind::Intersect, false)
        );
    }

    #[test]
    fn test_minus() {
        assert_eq!(vec![row![1], row![2]], run(inputs(), SetOpKind::Minus, true));
        assert_eq!(vec![row![1]], run(inputs(), SetOpKind::Minus, false));
    }

    #[test]
    fn test_three_inputs() {
        let mut three = inputs();
        three.push(vec![row![3]]);
        assert_eq!(vec![row![3]], run(three.clone(), SetOpKind::Intersect, false));
        assert_eq!(vec![row![1], row![2]], run(three, SetOpKind::Minus, true));
    }
}
