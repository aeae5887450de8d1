//! Reference opcode set.
//!
//! The core algorithms are table-driven and dialect-agnostic; this module
//! supplies one concrete dialect so the assembler, REPL, CLI, and tests have
//! something to run against. Hosts with their own bytecode build their own
//! [`EffectTable`] instead.

use strum::IntoEnumIterator;

use crate::effects::{Effect, EffectTable, FoldOp, OpSpec, Role, StackEffect};

/// Reference dialect opcodes.
///
/// Mnemonics are the snake_case variant names (`load_const`, `jump_if_false`,
/// …). Conditional and unconditional `jump*` operands are absolute positions;
/// `jump_forward` and `for_iter` operands are relative distances from the
/// following instruction.
#[repr(u8)]
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::FromRepr,
    serde::Serialize,
    serde::Deserialize,
)]
#[strum(serialize_all = "snake_case")]
pub enum Op {
    Nop = 0,
    Pop = 1,
    Dup = 2,

    UnaryPos = 10,
    UnaryNeg = 11,
    UnaryInvert = 12,
    UnaryNot = 13,

    BinaryAdd = 20,
    BinarySub = 21,
    BinaryMul = 22,
    BinaryPow = 23,
    BinaryMod = 24,
    BinaryFloorDiv = 25,
    BinaryTrueDiv = 26,
    BinaryLshift = 27,
    BinaryRshift = 28,
    BinaryAnd = 29,
    BinaryOr = 30,
    BinaryXor = 31,

    InplaceAdd = 40,
    InplaceSub = 41,
    InplaceMul = 42,
    InplacePow = 43,
    InplaceMod = 44,
    InplaceFloorDiv = 45,
    InplaceTrueDiv = 46,
    InplaceLshift = 47,
    InplaceRshift = 48,
    InplaceAnd = 49,
    InplaceOr = 50,
    InplaceXor = 51,

    // TODO: give comparisons an Operator role once constant conditions can
    // also rewrite the jump that consumes them.
    CompareEq = 60,
    CompareNe = 61,
    CompareLt = 62,
    CompareLe = 63,
    CompareGt = 64,
    CompareGe = 65,

    GetIter = 70,
    BuildList = 71,
    BuildTuple = 72,
    CallFunction = 73,
    /// Cleanup dispatch whose pops depend on how the block was entered at
    /// runtime; its static effect is undecidable.
    EndFinally = 74,

    ReturnValue = 80,

    JumpForward = 90,
    Jump = 91,
    JumpIfTrue = 92,
    JumpIfFalse = 93,
    ForIter = 94,

    LoadConst = 100,
    LoadLocal = 101,
    StoreLocal = 102,
}

fn build_effect(count: u8) -> StackEffect {
    StackEffect::new(1, count)
}

fn call_effect(argc: u8) -> StackEffect {
    // Callable plus its arguments are consumed; the result is pushed.
    StackEffect::new(1, argc.saturating_add(1))
}

impl Op {
    /// How this opcode's stack effect is determined.
    #[must_use]
    pub fn effect(self) -> Effect {
        match self {
            Self::Nop | Self::JumpForward | Self::Jump => Effect::Fixed(StackEffect::new(0, 0)),
            Self::Pop | Self::ReturnValue | Self::JumpIfTrue | Self::JumpIfFalse => {
                Effect::Fixed(StackEffect::new(0, 1))
            }
            Self::Dup => Effect::Fixed(StackEffect::new(2, 1)),
            Self::UnaryPos | Self::UnaryNeg | Self::UnaryInvert | Self::UnaryNot | Self::GetIter => {
                Effect::Fixed(StackEffect::new(1, 1))
            }
            Self::BinaryAdd
            | Self::BinarySub
            | Self::BinaryMul
            | Self::BinaryPow
            | Self::BinaryMod
            | Self::BinaryFloorDiv
            | Self::BinaryTrueDiv
            | Self::BinaryLshift
            | Self::BinaryRshift
            | Self::BinaryAnd
            | Self::BinaryOr
            | Self::BinaryXor
            | Self::InplaceAdd
            | Self::InplaceSub
            | Self::InplaceMul
            | Self::InplacePow
            | Self::InplaceMod
            | Self::InplaceFloorDiv
            | Self::InplaceTrueDiv
            | Self::InplaceLshift
            | Self::InplaceRshift
            | Self::InplaceAnd
            | Self::InplaceOr
            | Self::InplaceXor
            | Self::CompareEq
            | Self::CompareNe
            | Self::CompareLt
            | Self::CompareLe
            | Self::CompareGt
            | Self::CompareGe => Effect::Fixed(StackEffect::new(1, 2)),
            Self::BuildList | Self::BuildTuple => Effect::Operand(build_effect),
            Self::CallFunction => Effect::Operand(call_effect),
            Self::EndFinally => Effect::Unsupported,
            // Keeps the iterator and pushes the next value on fallthrough.
            Self::ForIter => Effect::Fixed(StackEffect::new(2, 1)),
            Self::LoadConst | Self::LoadLocal => Effect::Fixed(StackEffect::new(1, 0)),
            Self::StoreLocal => Effect::Fixed(StackEffect::new(0, 1)),
        }
    }

    /// Role classification for the table-driven algorithms.
    #[must_use]
    pub fn role(self) -> Role {
        match self {
            Self::LoadConst => Role::LoadConst,
            Self::LoadLocal => Role::LoadLocal,
            Self::StoreLocal => Role::StoreLocal,
            Self::JumpIfTrue => Role::CondJump { jump_if: true },
            Self::JumpIfFalse => Role::CondJump { jump_if: false },
            Self::Jump => Role::Jump,
            Self::JumpForward => Role::JumpForward,
            Self::ForIter => Role::ForIter,
            Self::ReturnValue => Role::Return,
            Self::UnaryPos => Role::Operator { op: FoldOp::Pos, inplace: false },
            Self::UnaryNeg => Role::Operator { op: FoldOp::Neg, inplace: false },
            Self::UnaryInvert => Role::Operator { op: FoldOp::Invert, inplace: false },
            Self::BinaryAdd => Role::Operator { op: FoldOp::Add, inplace: false },
            Self::BinarySub => Role::Operator { op: FoldOp::Sub, inplace: false },
            Self::BinaryMul => Role::Operator { op: FoldOp::Mul, inplace: false },
            Self::BinaryPow => Role::Operator { op: FoldOp::Pow, inplace: false },
            Self::BinaryMod => Role::Operator { op: FoldOp::Mod, inplace: false },
            Self::BinaryFloorDiv => Role::Operator { op: FoldOp::FloorDiv, inplace: false },
            Self::BinaryTrueDiv => Role::Operator { op: FoldOp::TrueDiv, inplace: false },
            Self::BinaryLshift => Role::Operator { op: FoldOp::Shl, inplace: false },
            Self::BinaryRshift => Role::Operator { op: FoldOp::Shr, inplace: false },
            Self::BinaryAnd => Role::Operator { op: FoldOp::BitAnd, inplace: false },
            Self::BinaryOr => Role::Operator { op: FoldOp::BitOr, inplace: false },
            Self::BinaryXor => Role::Operator { op: FoldOp::BitXor, inplace: false },
            Self::InplaceAdd => Role::Operator { op: FoldOp::Add, inplace: true },
            Self::InplaceSub => Role::Operator { op: FoldOp::Sub, inplace: true },
            Self::InplaceMul => Role::Operator { op: FoldOp::Mul, inplace: true },
            Self::InplacePow => Role::Operator { op: FoldOp::Pow, inplace: true },
            Self::InplaceMod => Role::Operator { op: FoldOp::Mod, inplace: true },
            Self::InplaceFloorDiv => Role::Operator { op: FoldOp::FloorDiv, inplace: true },
            Self::InplaceTrueDiv => Role::Operator { op: FoldOp::TrueDiv, inplace: true },
            Self::InplaceLshift => Role::Operator { op: FoldOp::Shl, inplace: true },
            Self::InplaceRshift => Role::Operator { op: FoldOp::Shr, inplace: true },
            Self::InplaceAnd => Role::Operator { op: FoldOp::BitAnd, inplace: true },
            Self::InplaceOr => Role::Operator { op: FoldOp::BitOr, inplace: true },
            Self::InplaceXor => Role::Operator { op: FoldOp::BitXor, inplace: true },
            _ => Role::Other,
        }
    }

    /// Builds the immutable effect table for this dialect.
    ///
    /// Construct once at startup and pass by reference into the walker,
    /// reconstructor, and optimizer.
    #[must_use]
    pub fn table() -> EffectTable {
        EffectTable::from_specs(Self::iter().map(|op| {
            (
                op as u8,
                OpSpec {
                    name: op.to_string(),
                    effect: op.effect(),
                    role: op.role(),
                },
            )
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn test_mnemonic_round_trip() {
        for op in Op::iter() {
            let name = op.to_string();
            assert_eq!(Op::from_str(&name), Ok(op), "mnemonic {name}");
        }
    }

    #[test]
    fn test_from_repr_matches_discriminant() {
        assert_eq!(Op::from_repr(100), Some(Op::LoadConst));
        assert_eq!(Op::from_repr(3), None);
    }

    #[test]
    fn test_table_covers_every_op() {
        let table = Op::table();
        assert_eq!(table.len(), Op::iter().count());
        for op in Op::iter() {
            assert!(table.lookup(op as u8).is_some(), "missing {op}");
        }
        assert_eq!(table.name(Op::JumpIfFalse as u8), Some("jump_if_false"));
    }

    #[test]
    fn test_operand_dependent_effects() {
        let table = Op::table();
        let build = table.lookup(Op::BuildList as u8).unwrap();
        assert_eq!(build.effect.of(4), Some(StackEffect::new(1, 4)));
        let call = table.lookup(Op::CallFunction as u8).unwrap();
        assert_eq!(call.effect.of(2), Some(StackEffect::new(1, 3)));
    }
}
