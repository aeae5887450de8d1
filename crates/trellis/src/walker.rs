//! Backward stack-depth walk used to delimit sub-expressions.

use crate::{effects::EffectTable, error::CodeError, instr::Instruction};

/// Finds where the sub-expression producing `wanted` stack values begins.
///
/// Scans backward from `start` (exclusive), accumulating each instruction's
/// net stack effect, and returns the index of the first instruction at which
/// the running count reaches or exceeds `wanted` — the first instruction of
/// the sub-expression whose results are on the stack at `start`.
///
/// Never mutates anything. Errors:
/// - [`CodeError::MalformedStream`] if the front of the list is reached
///   before `wanted` values are accounted for;
/// - [`CodeError::UnsupportedEffect`] as soon as the walk would cross an
///   opcode whose effect depends on runtime state;
/// - [`CodeError::UnknownOpcode`] for an opcode outside the table's domain.
pub fn expression_start(
    stream: &[Instruction],
    table: &EffectTable,
    start: usize,
    wanted: u32,
) -> Result<usize, CodeError> {
    if wanted == 0 {
        return Ok(start);
    }

    let mut available: i64 = 0;
    let mut index = start.min(stream.len());
    while index > 0 {
        index -= 1;
        let instr = stream[index];
        let spec = table.lookup(instr.opcode).ok_or(CodeError::UnknownOpcode {
            opcode: instr.opcode,
            position: index,
        })?;
        let effect = spec.effect.of(instr.operand).ok_or(CodeError::UnsupportedEffect {
            opcode: instr.opcode,
            position: index,
        })?;
        available += i64::from(effect.net());
        if available >= i64::from(wanted) {
            return Ok(index);
        }
    }
    Err(CodeError::MalformedStream {
        position: start,
        wanted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dialect::Op,
        instr::{ConstPool, LocalTable, Program},
    };

    fn program(code: &[u8]) -> Program {
        Program::decode(code, ConstPool::default(), LocalTable::default()).unwrap()
    }

    #[test]
    fn test_straight_line_pushes() {
        // Four constant loads push four values; walking back for all four
        // lands on the first instruction of the run.
        let program = program(&[Op::LoadConst as u8, 0, Op::LoadConst as u8, 1, Op::LoadConst as u8, 2, Op::LoadConst as u8, 3]);
        let table = Op::table();
        assert_eq!(expression_start(program.instructions(), &table, 4, 4), Ok(0));
        assert_eq!(expression_start(program.instructions(), &table, 4, 1), Ok(3));
    }

    #[test]
    fn test_walk_crosses_consumers() {
        // load, load, add leaves one value; the expression producing it
        // starts at the first load.
        let program = program(&[
            Op::LoadConst as u8, 0,
            Op::LoadConst as u8, 1,
            Op::BinaryAdd as u8, 0,
        ]);
        let table = Op::table();
        assert_eq!(expression_start(program.instructions(), &table, 3, 1), Ok(0));
    }

    #[test]
    fn test_front_underrun_is_signalled() {
        let program = program(&[Op::LoadConst as u8, 0]);
        let table = Op::table();
        assert_eq!(
            expression_start(program.instructions(), &table, 1, 2),
            Err(CodeError::MalformedStream { position: 1, wanted: 2 })
        );
    }

    #[test]
    fn test_unsupported_opcode_stops_walk() {
        let program = program(&[Op::EndFinally as u8, 0, Op::LoadConst as u8, 0]);
        let table = Op::table();
        assert_eq!(
            expression_start(program.instructions(), &table, 2, 2),
            Err(CodeError::UnsupportedEffect {
                opcode: Op::EndFinally as u8,
                position: 0
            })
        );
    }

    #[test]
    fn test_unknown_opcode_stops_walk() {
        let program = program(&[250, 0, Op::LoadConst as u8, 0]);
        let table = Op::table();
        assert_eq!(
            expression_start(program.instructions(), &table, 2, 2),
            Err(CodeError::UnknownOpcode { opcode: 250, position: 0 })
        );
    }
}
