use std::fmt;

/// Fatal error raised by the walker, reconstructor, or optimizer.
///
/// Keeping the variants distinct lets callers tell a model/version mismatch
/// (`UnknownOpcode`) apart from genuinely undecidable input
/// (`UnsupportedEffect`) and from invariant bugs (`CorruptProgram`) without
/// string matching. Every variant carries the offending opcode or position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeError {
    /// The stack-effect table has no entry for this opcode.
    UnknownOpcode {
        /// The opcode with no table entry.
        opcode: u8,
        /// Position of the instruction that was being examined.
        position: usize,
    },
    /// The opcode's stack effect depends on runtime state and cannot be
    /// determined statically.
    UnsupportedEffect {
        /// The opcode whose effect is undecidable.
        opcode: u8,
        /// Position of the instruction the walk stopped on.
        position: usize,
    },
    /// A backward walk ran past the front of the instruction list before
    /// the requested number of values was available.
    MalformedStream {
        /// Index the walk started from.
        position: usize,
        /// Number of values that were still missing.
        wanted: u32,
    },
    /// An index into the constant pool, locals table, or instruction stream
    /// is out of range. This indicates an invariant violation upstream, not
    /// bad user input.
    CorruptProgram {
        /// Human-readable description of the inconsistency.
        detail: String,
    },
}

impl CodeError {
    /// Builds a `CorruptProgram` from anything displayable.
    pub(crate) fn corrupt(detail: impl fmt::Display) -> Self {
        Self::CorruptProgram {
            detail: detail.to_string(),
        }
    }
}

impl fmt::Display for CodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownOpcode { opcode, position } => {
                write!(f, "unknown opcode {opcode} at position {position}")
            }
            Self::UnsupportedEffect { opcode, position } => {
                write!(
                    f,
                    "stack effect of opcode {opcode} at position {position} depends on runtime state"
                )
            }
            Self::MalformedStream { position, wanted } => {
                write!(
                    f,
                    "walk from position {position} ran past the start of the stream with {wanted} value(s) unaccounted for"
                )
            }
            Self::CorruptProgram { detail } => write!(f, "corrupt program: {detail}"),
        }
    }
}

impl std::error::Error for CodeError {}
