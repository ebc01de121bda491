use crate::error::OptResult;
use crate::interpreter::{Node, Sink, Source};
use crate::operator::{Join, SemiJoinType};
use crate::value::Row;

/// Nested loop join of any join type. The right input is buffered.
pub struct JoinNode {
    left: Source,
    right: Source,
    join: Join,
    /// Emit each matching left row once, without right fields.
    semi: bool,
    left_count: usize,
    right_count: usize,
}

impl JoinNode {
    pub fn new(left: Source, right: Source, join: Join, left_count: usize, right_count: usize) -> Self {
        Self {
            left,
            right,
            join,
            semi: false,
            left_count,
            right_count,
        }
    }

    pub fn semi(left: Source, right: Source, join: Join, left_count: usize, right_count: usize) -> Self {
        Self {
            semi: true,
            ..Self::new(left, right, join, left_count, right_count)
        }
    }
}

impl Node for JoinNode {
    fn run(&mut self, sink: &mut Sink) -> OptResult<()> {
        let right_rows = self.right.receive_all()?;
        let join_type = self.join.join_type();
        let mut right_matched = vec![false; right_rows.len()];

        while let Some(left) = self.left.receive()? {
            let mut matched = false;
            for (i, right) in right_rows.iter().enumerate() {
                let row = left.concat(right);
                if !self.join.condition().eval_predicate(&row)? {
                    continue;
                }
                matched = true;
                if self.semi {
                    break;
                }
                right_matched[i] = true;
                sink.send(row)?;
            }

            if self.semi {
                if matched {
                    sink.send(left)?;
                }
            } else if !matched && join_type.generates_nulls_on_right() {
                sink.send(left.concat(&Row::nulls(self.right_count)))?;
            }
        }

        if !self.semi && join_type.generates_nulls_on_left() {
            let nulls = Row::nulls(self.left_count);
            for (right, matched) in right_rows.iter().zip(right_matched) {
                if !matched {
                    sink.send(nulls.concat(right))?;
                }
            }
        }
        sink.end()
    }
}

/// Joins each left row with the rows of the right input.
///
/// Expressions cannot refer to correlation variables, so the right input is the same for every
/// left row and is read once.
pub struct CorrelateNode {
    left: Source,
    right: Source,
    join_type: SemiJoinType,
    right_count: usize,
}

impl CorrelateNode {
    pub fn new(left: Source, right: Source, join_type: SemiJoinType, right_count: usize) -> Self {
        Self {
            left,
            right,
            join_type,
            right_count,
        }
    }
}

impl Node for CorrelateNode {
    fn run(&mut self, sink: &mut Sink) -> OptResult<()> {
        let right_rows = self.right.receive_all()?;
        while let Some(left) = self.left.receive()? {
            match self.join_type {
                SemiJoinType::Inner | SemiJoinType::Left => {
                    for right in &right_rows {
                        sink.send(left.concat(right))?;
                    }
                    if right_rows.is_empty() && self.join_type == SemiJoinType::Left {
                        sink.send(left.concat(&Row::nulls(self.right_count)))?;
                    }
                }
                SemiJoinType::Semi if !right_rows.is_empty() => sink.send(left)?,
                SemiJoinType::Anti if right_rows.is_empty() => sink.send(left)?,
                SemiJoinType::Semi | SemiJoinType::Anti => {}
            }
        }
        sink.end()
    }
}
