//! Constant-pool values and the checked arithmetic used by constant folding.
//!
//! Folding never encodes an error value: any operation whose result is not
//! representable — division or modulo by zero, integer overflow, a non-finite
//! float — returns `None` and the fold is declined, leaving the instruction
//! stream untouched.

use std::fmt;

use crate::effects::FoldOp;

/// A scalar value stored in a program's constant pool.
///
/// Equality is variant-strict: `Int(2)` and `Float(2.0)` are distinct values
/// and never share a pool slot.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Const {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Const {
    /// Applies a unary operator, returning `None` when the result is not
    /// representable or the operand type does not support the operator.
    #[must_use]
    pub fn apply_unary(op: FoldOp, value: &Self) -> Option<Self> {
        match (op, value) {
            (FoldOp::Pos, Self::Int(a)) => Some(Self::Int(*a)),
            (FoldOp::Pos, Self::Float(a)) => Some(Self::Float(*a)),
            (FoldOp::Neg, Self::Int(a)) => a.checked_neg().map(Self::Int),
            (FoldOp::Neg, Self::Float(a)) => Some(Self::Float(-a)),
            // Two's complement: !a == -a - 1, which cannot overflow.
            (FoldOp::Invert, Self::Int(a)) => Some(Self::Int(!a)),
            _ => None,
        }
    }

    /// Applies a binary operator with the left operand deeper on the stack,
    /// returning `None` when the fold must be declined.
    #[must_use]
    pub fn apply_binary(op: FoldOp, lhs: &Self, rhs: &Self) -> Option<Self> {
        match (lhs, rhs) {
            (Self::Int(a), Self::Int(b)) => int_binary(op, *a, *b),
            (Self::Float(_) | Self::Int(_), Self::Float(_) | Self::Int(_)) => {
                float_binary(op, lhs.as_float()?, rhs.as_float()?)
            }
            (Self::Str(a), Self::Str(b)) if op == FoldOp::Add => {
                let mut joined = String::with_capacity(a.len() + b.len());
                joined.push_str(a);
                joined.push_str(b);
                Some(Self::Str(joined))
            }
            _ => None,
        }
    }

    fn as_float(&self) -> Option<f64> {
        match self {
            Self::Int(a) => Some(*a as f64),
            Self::Float(a) => Some(*a),
            _ => None,
        }
    }
}

fn int_binary(op: FoldOp, a: i64, b: i64) -> Option<Const> {
    let value = match op {
        FoldOp::Add => a.checked_add(b)?,
        FoldOp::Sub => a.checked_sub(b)?,
        FoldOp::Mul => a.checked_mul(b)?,
        FoldOp::Pow => {
            if b < 0 {
                // A negative exponent leaves the integers; fall back to the
                // float result when it is finite.
                return float_binary(FoldOp::Pow, a as f64, b as f64);
            }
            a.checked_pow(u32::try_from(b).ok()?)?
        }
        FoldOp::Mod => floor_mod(a, b)?,
        FoldOp::FloorDiv => floor_div(a, b)?,
        FoldOp::TrueDiv => return float_binary(FoldOp::TrueDiv, a as f64, b as f64),
        FoldOp::Shl => {
            let shift = u32::try_from(b).ok().filter(|s| *s < 64)?;
            i64::try_from(i128::from(a) << shift).ok()?
        }
        FoldOp::Shr => {
            let shift = u32::try_from(b).ok()?;
            if shift >= 64 {
                if a < 0 { -1 } else { 0 }
            } else {
                a >> shift
            }
        }
        FoldOp::BitAnd => a & b,
        FoldOp::BitOr => a | b,
        FoldOp::BitXor => a ^ b,
        FoldOp::Pos | FoldOp::Neg | FoldOp::Invert => return None,
    };
    Some(Const::Int(value))
}

fn float_binary(op: FoldOp, a: f64, b: f64) -> Option<Const> {
    let value = match op {
        FoldOp::Add => a + b,
        FoldOp::Sub => a - b,
        FoldOp::Mul => a * b,
        FoldOp::Pow => a.powf(b),
        FoldOp::Mod => {
            if b == 0.0 {
                return None;
            }
            // Remainder takes the sign of the divisor (floored modulo).
            let r = a % b;
            if r != 0.0 && (r < 0.0) != (b < 0.0) { r + b } else { r }
        }
        FoldOp::FloorDiv => {
            if b == 0.0 {
                return None;
            }
            (a / b).floor()
        }
        FoldOp::TrueDiv => {
            if b == 0.0 {
                return None;
            }
            a / b
        }
        _ => return None,
    };
    value.is_finite().then_some(Const::Float(value))
}

/// Floored division: the quotient rounds toward negative infinity.
fn floor_div(a: i64, b: i64) -> Option<i64> {
    if b == 0 {
        return None;
    }
    let q = a.checked_div(b)?;
    let r = a % b;
    if r != 0 && (r < 0) != (b < 0) { q.checked_sub(1) } else { Some(q) }
}

/// Floored modulo: the remainder takes the sign of the divisor.
fn floor_mod(a: i64, b: i64) -> Option<i64> {
    if b == 0 {
        return None;
    }
    let r = a % b;
    if r != 0 && (r < 0) != (b < 0) { r.checked_add(b) } else { Some(r) }
}

impl fmt::Display for Const {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Bool(true) => write!(f, "True"),
            Self::Bool(false) => write!(f, "False"),
            Self::Int(v) => write!(f, "{v}"),
            // Debug formatting keeps the trailing `.0` on whole floats.
            Self::Float(v) => write!(f, "{v:?}"),
            Self::Str(v) => write!(f, "'{v}'"),
        }
    }
}
