use crate::properties::RelCollation;
use crate::rex::{Op, RexCall, RexNode};
use crate::value::Value;

/// How an expression's value moves as the input rows advance in collation order.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum Monotonicity {
    StrictlyIncreasing,
    Increasing,
    StrictlyDecreasing,
    Decreasing,
    Constant,
    NotMonotonic,
}

impl Monotonicity {
    pub fn reverse(self) -> Monotonicity {
        match self {
            Monotonicity::StrictlyIncreasing => Monotonicity::StrictlyDecreasing,
            Monotonicity::Increasing => Monotonicity::Decreasing,
            Monotonicity::StrictlyDecreasing => Monotonicity::StrictlyIncreasing,
            Monotonicity::Decreasing => Monotonicity::Increasing,
            m => m,
        }
    }

    pub fn unstrict(self) -> Monotonicity {
        match self {
            Monotonicity::StrictlyIncreasing => Monotonicity::Increasing,
            Monotonicity::StrictlyDecreasing => Monotonicity::Decreasing,
            m => m,
        }
    }

    pub fn is_increasing(self) -> bool {
        matches!(
            self,
            Monotonicity::StrictlyIncreasing | Monotonicity::Increasing
        )
    }

    pub fn is_decreasing(self) -> bool {
        matches!(
            self,
            Monotonicity::StrictlyDecreasing | Monotonicity::Decreasing
        )
    }
}

/// Monotonicity of a call's operands and result, given the collations of the input it reads.
pub struct CallBinding<'a> {
    call: &'a RexCall,
    input_collations: &'a [RelCollation],
}

impl<'a> CallBinding<'a> {
    pub fn new(call: &'a RexCall, input_collations: &'a [RelCollation]) -> Self {
        Self {
            call,
            input_collations,
        }
    }

    pub fn operand_monotonicity(&self, ordinal: usize) -> Monotonicity {
        match &self.call.operands()[ordinal] {
            RexNode::InputRef(r) => self
                .input_collations
                .iter()
                .flat_map(|c| c.field_collations().iter())
                .find(|fc| fc.field_index() == r.index())
                .map(|fc| fc.direction().monotonicity())
                .unwrap_or(Monotonicity::NotMonotonic),
            RexNode::Literal(_) => Monotonicity::Constant,
            RexNode::Call(call) => CallBinding::new(call, self.input_collations).monotonicity(),
            RexNode::TableInputRef(_) => Monotonicity::NotMonotonic,
        }
    }

    fn literal_sign(&self, ordinal: usize) -> Option<i32> {
        match &self.call.operands()[ordinal] {
            RexNode::Literal(v @ (Value::Integer(_) | Value::Double(_))) => {
                let f = v.as_f64()?;
                Some(if f > 0.0 {
                    1
                } else if f < 0.0 {
                    -1
                } else {
                    0
                })
            }
            _ => None,
        }
    }

    /// Monotonicity of the call's result.
    pub fn monotonicity(&self) -> Monotonicity {
        match self.call.op() {
            Op::Plus => {
                let m0 = self.operand_monotonicity(0);
                let m1 = self.operand_monotonicity(1);
                combine_additive(m0, m1)
            }
            Op::Minus => {
                let m0 = self.operand_monotonicity(0);
                let m1 = self.operand_monotonicity(1).reverse();
                combine_additive(m0, m1)
            }
            Op::Times | Op::Divide => {
                let divide = self.call.op() == Op::Divide;
                let m0 = self.operand_monotonicity(0);
                let m1 = self.operand_monotonicity(1);
                match (m0, m1) {
                    (Monotonicity::Constant, Monotonicity::Constant) => Monotonicity::Constant,
                    (_, Monotonicity::Constant) => match self.literal_sign(1) {
                        Some(1) => m0,
                        Some(-1) => m0.reverse(),
                        Some(_) if !divide => Monotonicity::Constant,
                        _ => Monotonicity::NotMonotonic,
                    },
                    (Monotonicity::Constant, _) if !divide => match self.literal_sign(0) {
                        Some(1) => m1,
                        Some(-1) => m1.reverse(),
                        Some(_) => Monotonicity::Constant,
                        None => Monotonicity::NotMonotonic,
                    },
                    _ => Monotonicity::NotMonotonic,
                }
            }
            Op::UnaryMinus => self.operand_monotonicity(0).reverse(),
            Op::Floor | Op::Ceil => self.operand_monotonicity(0).unstrict(),
            Op::Cast => self.operand_monotonicity(0),
            _ if self.call.operands().iter().all(RexNode::is_constant) => Monotonicity::Constant,
            _ => Monotonicity::NotMonotonic,
        }
    }
}

fn combine_additive(m0: Monotonicity, m1: Monotonicity) -> Monotonicity {
    match (m0, m1) {
        (Monotonicity::Constant, m) | (m, Monotonicity::Constant) => m,
        (a, b) if a.is_increasing() && b.is_increasing() => Monotonicity::Increasing,
        (a, b) if a.is_decreasing() && b.is_decreasing() => Monotonicity::Decreasing,
        _ => Monotonicity::NotMonotonic,
    }
}
