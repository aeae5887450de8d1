//! The stack-effect table: the one piece of dialect-specific knowledge the
//! host supplies.
//!
//! The table maps each opcode to its [`StackEffect`] (possibly as a function
//! of the operand) and to a [`Role`] classifying how the table-driven
//! algorithms should treat it. The table is immutable once constructed and is
//! passed by reference into the walker, reconstructor, and optimizer — it is
//! never a global.

use indexmap::IndexMap;

/// Number of values an instruction pushes onto and pops from the operand
/// stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackEffect {
    /// Values pushed after the pops.
    pub pushed: u8,
    /// Values consumed from the stack.
    pub popped: u8,
}

impl StackEffect {
    #[must_use]
    pub const fn new(pushed: u8, popped: u8) -> Self {
        Self { pushed, popped }
    }

    /// Net change in stack depth (pushed minus popped).
    #[must_use]
    pub const fn net(self) -> i32 {
        self.pushed as i32 - self.popped as i32
    }
}

/// How an opcode's stack effect is determined.
#[derive(Debug, Clone, Copy)]
pub enum Effect {
    /// The effect is the same for every operand.
    Fixed(StackEffect),
    /// The effect is a function of the operand (e.g. "build N" pops N and
    /// pushes one).
    Operand(fn(u8) -> StackEffect),
    /// The effect cannot be determined without executing the program.
    /// Walking across such an opcode is a hard error.
    Unsupported,
}

impl Effect {
    /// Resolves the effect for a concrete operand; `None` for
    /// [`Effect::Unsupported`].
    #[must_use]
    pub fn of(self, operand: u8) -> Option<StackEffect> {
        match self {
            Self::Fixed(effect) => Some(effect),
            Self::Operand(f) => Some(f(operand)),
            Self::Unsupported => None,
        }
    }
}

/// Operator identity used by constant folding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum FoldOp {
    Pos,
    Neg,
    Invert,
    Add,
    Sub,
    Mul,
    Pow,
    Mod,
    FloorDiv,
    TrueDiv,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
}

impl FoldOp {
    /// Number of stack operands the operator consumes.
    #[must_use]
    pub const fn arity(self) -> u8 {
        match self {
            Self::Pos | Self::Neg | Self::Invert => 1,
            _ => 2,
        }
    }
}

/// Classification of an opcode for the table-driven algorithms.
///
/// Jump operands come in two flavors: absolute (the operand is the target
/// position) and relative (the operand is the distance from the following
/// instruction to the target).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// No special treatment; a straight-line instruction.
    Other,
    /// Pushes the constant-pool entry named by the operand.
    LoadConst,
    /// Pushes the local named by the operand.
    LoadLocal,
    /// Pops into the local named by the operand.
    StoreLocal,
    /// Conditional skip with an absolute target. `jump_if` is the condition
    /// value that takes the jump.
    CondJump {
        /// `true` for "jump if true", `false` for "jump if false".
        jump_if: bool,
    },
    /// Unconditional jump with an absolute target (the backward, loop form).
    Jump,
    /// Unconditional jump with a relative forward distance.
    JumpForward,
    /// Iterator advance: pushes the next value or jumps the relative
    /// distance past the loop body when exhausted.
    ForIter,
    /// Terminal return-like instruction.
    Return,
    /// Foldable arithmetic/unary/bitwise operator.
    Operator {
        /// The operator's identity.
        op: FoldOp,
        /// In-place operators overwrite the left operand's pool slot when
        /// folded; pure operators produce a fresh value.
        inplace: bool,
    },
}

/// A single opcode's entry in the effect table.
#[derive(Debug, Clone)]
pub struct OpSpec {
    /// Mnemonic used by the assembler and in rendered listings.
    pub name: String,
    /// How the stack effect is determined.
    pub effect: Effect,
    /// Role classification.
    pub role: Role,
}

/// Immutable opcode → [`OpSpec`] mapping.
///
/// Iteration follows registration order, so listings and diagnostics derived
/// from the table are deterministic.
#[derive(Debug, Clone, Default)]
pub struct EffectTable {
    specs: IndexMap<u8, OpSpec>,
}

impl EffectTable {
    /// Builds a table from `(opcode, spec)` pairs. A later entry for the
    /// same opcode replaces the earlier one.
    #[must_use]
    pub fn from_specs(specs: impl IntoIterator<Item = (u8, OpSpec)>) -> Self {
        Self {
            specs: specs.into_iter().collect(),
        }
    }

    /// Looks up an opcode's entry; `None` means the opcode is outside the
    /// table's domain.
    #[must_use]
    pub fn lookup(&self, opcode: u8) -> Option<&OpSpec> {
        self.specs.get(&opcode)
    }

    /// Mnemonic for an opcode, if the table knows it.
    #[must_use]
    pub fn name(&self, opcode: u8) -> Option<&str> {
        self.specs.get(&opcode).map(|spec| spec.name.as_str())
    }

    /// Entries in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (u8, &OpSpec)> {
        self.specs.iter().map(|(opcode, spec)| (*opcode, spec))
    }

    /// Number of opcodes in the table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_effect(n: u8) -> StackEffect {
        StackEffect::new(1, n)
    }

    #[test]
    fn test_fixed_effect() {
        let effect = Effect::Fixed(StackEffect::new(1, 2));
        assert_eq!(effect.of(9), Some(StackEffect::new(1, 2)));
    }

    #[test]
    fn test_operand_dependent_effect() {
        let effect = Effect::Operand(build_effect);
        assert_eq!(effect.of(3), Some(StackEffect::new(1, 3)));
        assert_eq!(effect.of(3).map(StackEffect::net), Some(-2));
    }

    #[test]
    fn test_unsupported_effect() {
        assert_eq!(Effect::Unsupported.of(0), None);
    }

    #[test]
    fn test_table_lookup_outside_domain() {
        let table = EffectTable::from_specs([(
            7,
            OpSpec {
                name: "seven".to_owned(),
                effect: Effect::Fixed(StackEffect::new(0, 0)),
                role: Role::Other,
            },
        )]);
        assert!(table.lookup(7).is_some());
        assert!(table.lookup(8).is_none());
        assert_eq!(table.name(7), Some("seven"));
    }
}
