use crate::error::OptResult;
use crate::interpreter::{Node, Sink, Source};
use crate::properties::RelCollation;

/// Sorts its input by a collation and emits the rows in `[offset, offset + fetch)`.
///
/// Without sort keys rows are only skipped and counted, nothing is buffered.
pub struct SortNode {
    source: Source,
    collation: RelCollation,
    offset: usize,
    fetch: Option<usize>,
}

impl SortNode {
    pub fn new(source: Source, collation: RelCollation, offset: usize, fetch: Option<usize>) -> Self {
        Self {
            source,
            collation,
            offset,
            fetch,
        }
    }

    fn limit(&mut self, sink: &mut Sink) -> OptResult<()> {
        for _ in 0..self.offset {
            if self.source.receive()?.is_none() {
                return sink.end();
            }
        }
        let mut sent = 0;
        while self.fetch.map_or(true, |fetch| sent < fetch) {
            match self.source.receive()? {
                Some(row) => {
                    sink.send(row)?;
                    sent += 1;
                }
                None => break,
            }
        }
        sink.end()
    }
}

impl Node for SortNode {
    fn run(&mut self, sink: &mut Sink) -> OptResult<()> {
        if self.collation.is_empty() {
            return self.limit(sink);
        }

        let mut rows = self.source.receive_all()?;
        rows.sort_by(|a, b| self.collation.compare(a, b));
        let end = match self.fetch {
            Some(fetch) => rows.len().min(self.offset.saturating_add(fetch)),
            None => rows.len(),
        };
        for row in rows.into_iter().take(end).skip(self.offset) {
            sink.send(row)?;
        }
        sink.end()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    use super::*;
    use crate::properties::{Direction, NullDirection, RelFieldCollation};
    use crate::row;
    use crate::value::{Row, Value};

    fn run(rows: Vec<Row>, collation: RelCollation, offset: usize, fetch: Option<usize>) -> Vec<Row> {
        let source = Source::new(Arc::new(rows), Arc::new(AtomicBool::new(false)));
        let mut sink = Sink::default();
        SortNode::new(source, collation, offset, fetch)
            .run(&mut sink)
            .unwrap();
        assert!(sink.ended);
        sink.rows
    }

    fn nullable_ints() -> Vec<Row> {
        vec![row![1], row![Value::Null], row![3]]
    }

    #[test]
    fn test_sort_with_offset_and_fetch() {
        let rows = vec![row![3, "c"], row![1, "a"], row![2, "b"], row![0, "d"]];
        assert_eq!(
            vec![row![1, "a"], row![2, "b"]],
            run(rows.clone(), RelCollation::of_keys(vec![0]), 1, Some(2))
        );
        assert_eq!(
            vec![row![0, "d"], row![1, "a"], row![2, "b"], row![3, "c"]],
            run(rows.clone(), RelCollation::of_keys(vec![0]), 0, None)
        );
        assert!(run(rows, RelCollation::of_keys(vec![0]), 5, Some(2)).is_empty());
    }

    #[test]
    fn test_descending_nulls() {
        let last = RelCollation::of(vec![RelFieldCollation::of(
            0,
            Direction::Descending,
            NullDirection::Last,
        )]);
        assert_eq!(
            vec![row![3], row![1], row![Value::Null]],
            run(nullable_ints(), last, 0, None)
        );

        let first = RelCollation::of(vec![RelFieldCollation::of(
            0,
            Direction::Descending,
            NullDirection::First,
        )]);
        assert_eq!(
            vec![row![Value::Null], row![3], row![1]],
            run(nullable_ints(), first, 0, None)
        );
    }

    #[test]
    fn test_ascending_nulls_first() {
        let first = RelCollation::of(vec![RelFieldCollation::of(
            0,
            Direction::Ascending,
            NullDirection::First,
        )]);
        assert_eq!(
            vec![row![Value::Null], row![1], row![3]],
            run(nullable_ints(), first, 0, None)
        );
    }

    #[test]
    fn test_multiple_keys() {
        let rows = vec![row![1, "b"], row![2, "a"], row![1, "a"]];
        let collation = RelCollation::of(vec![
            RelFieldCollation::new(0),
            RelFieldCollation::with_direction(1, Direction::Descending),
        ]);
        assert_eq!(
            vec![row![1, "b"], row![1, "a"], row![2, "a"]],
            run(rows, collation, 0, None)
        );
    }

    #[test]
    fn test_limit_without_keys_keeps_input_order() {
        let rows = vec![row![3], row![1], row![2], row![0]];
        assert_eq!(
            vec![row![1], row![2]],
            run(rows.clone(), RelCollation::empty(), 1, Some(2))
        );
        assert_eq!(vec![row![2], row![0]], run(rows.clone(), RelCollation::empty(), 2, None));
        assert!(run(rows, RelCollation::empty(), 9, None).is_empty());
    }
}
