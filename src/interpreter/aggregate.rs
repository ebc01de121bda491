use std::collections::BTreeMap;

use anyhow::bail;

use crate::bitset::ImmutableBitSet;
use crate::error::{OptError, OptResult};
use crate::interpreter::{Node, Sink, Source};
use crate::operator::{AggFunction, AggregateCall};
use crate::value::{Row, Value};

/// Groups rows by the group fields, emitting groups in key order.
///
/// Without group fields one row is emitted even for an empty input.
pub struct AggregateNode {
    source: Source,
    group_set: ImmutableBitSet,
    calls: Vec<AggregateCall>,
}

impl AggregateNode {
    pub fn new(source: Source, group_set: ImmutableBitSet, calls: Vec<AggregateCall>) -> Self {
        Self {
            source,
            group_set,
            calls,
        }
    }

    fn accumulators(&self) -> Vec<Accumulator> {
        self.calls.iter().map(Accumulator::new).collect()
    }
}

impl Node for AggregateNode {
    fn run(&mut self, sink: &mut Sink) -> OptResult<()> {
        let mut groups: BTreeMap<Vec<Value>, Vec<Accumulator>> = BTreeMap::new();
        while let Some(row) = self.source.receive()? {
            let key: Vec<Value> = self.group_set.iter().map(|g| row.get(g).clone()).collect();
            let accumulators = groups.entry(key).or_insert_with(|| self.accumulators());
            for (accumulator, call) in accumulators.iter_mut().zip(&self.calls) {
                accumulator.add(call, &row)?;
            }
        }
        if groups.is_empty() && self.group_set.is_empty() {
            groups.insert(vec![], self.accumulators());
        }

        for (key, accumulators) in groups {
            let values = key
                .into_iter()
                .chain(accumulators.into_iter().map(Accumulator::result))
                .collect();
            sink.send(Row::new(values))?;
        }
        sink.end()
    }
}

enum Accumulator {
    Count(i64),
    Sum(Option<Value>),
    Min(Option<Value>),
    Max(Option<Value>),
}

impl Accumulator {
    fn new(call: &AggregateCall) -> Self {
        match call.function() {
            AggFunction::Count => Accumulator::Count(0),
            AggFunction::Sum => Accumulator::Sum(None),
            AggFunction::Sum0 => Accumulator::Sum(Some(Value::Integer(0))),
            AggFunction::Min => Accumulator::Min(None),
            AggFunction::Max => Accumulator::Max(None),
        }
    }

    /// Nulls are ignored, except by `COUNT(*)`.
    fn add(&mut self, call: &AggregateCall, row: &Row) -> OptResult<()> {
        let value = match call.args().first() {
            Some(arg) => row.get(*arg).clone(),
            None => Value::Boolean(true),
        };
        if value.is_null() {
            return Ok(());
        }
        match self {
            Accumulator::Count(n) => *n += 1,
            Accumulator::Sum(sum) => {
                *sum = Some(match sum.take() {
                    Some(acc) => add(&acc, &value)?,
                    None => value,
                })
            }
            Accumulator::Min(min) => {
                if min.as_ref().map_or(true, |m| value < *m) {
                    *min = Some(value);
                }
            }
            Accumulator::Max(max) => {
                if max.as_ref().map_or(true, |m| value > *m) {
                    *max = Some(value);
                }
            }
        }
        Ok(())
    }

    fn result(self) -> Value {
        match self {
            Accumulator::Count(n) => Value::Integer(n),
            Accumulator::Sum(v) | Accumulator::Min(v) | Accumulator::Max(v) => {
                v.unwrap_or(Value::Null)
            }
        }
    }
}

fn add(a: &Value, b: &Value) -> OptResult<Value> {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => match x.checked_add(*y) {
            Some(sum) => Ok(Value::Integer(sum)),
            None => bail!(OptError::Eval(format!("SUM overflows at {} + {}", x, y))),
        },
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => Ok(Value::Double(x + y)),
            _ => bail!(OptError::Eval(format!("cannot SUM {} and {}", a, b))),
        },
    }
}
