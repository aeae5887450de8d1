//! Control-flow reconstruction: turning a flat instruction range into a
//! structured tree using only jump operands and stack-depth bookkeeping.
//!
//! The reconstructor walks a single forward cursor over the half-open range
//! `[start, stop)`, accumulating straight-line instructions into a segment.
//! Conditional skips and iterator advances close the segment, split off the
//! condition with the backward walker, and recurse over the taken range. The
//! shape of the resulting node is decided by inspecting the taken range's
//! final instruction:
//!
//! - an unconditional jump back to the condition's start means the range was
//!   a `while` body;
//! - an unconditional forward jump means the range was the first arm of an
//!   if/else, and the skipped-over arm runs from the range's end to the
//!   forward jump's destination;
//! - anything else is a one-armed `if`.
//!
//! This tail inspection is deliberately shallow: a nested conditional whose
//! physically last instruction happens to be a matching jump is classified
//! by that tail alone. See DESIGN.md for the status of this limitation.

use crate::{
    effects::{EffectTable, Role},
    error::CodeError,
    instr::{Instruction, Program},
    structure::{Body, Branch, If, Loop, Node, Segment},
    walker::expression_start,
};

/// Result of reconstructing a range.
///
/// `Partial` is not an error: it reports how far the scan got when the range
/// ended early (a forward jump closing an enclosing arm, or a return that
/// does not exhaust the range), so the caller's own range-closing logic can
/// finish the split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconstruction {
    /// The whole requested range was consumed.
    Complete(Body),
    /// The scan stopped early; `resumed_at` is the first unconsumed position.
    Partial {
        /// Tree for the consumed prefix.
        body: Body,
        /// First position not covered by `body`.
        resumed_at: usize,
    },
}

impl Reconstruction {
    /// The reconstructed tree, complete or not.
    #[must_use]
    pub fn body(&self) -> &Body {
        match self {
            Self::Complete(body) | Self::Partial { body, .. } => body,
        }
    }

    /// Consumes the result, keeping only the tree.
    #[must_use]
    pub fn into_body(self) -> Body {
        match self {
            Self::Complete(body) | Self::Partial { body, .. } => body,
        }
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete(_))
    }
}

/// Reconstructs the whole program.
pub fn reconstruct_program(program: &Program, table: &EffectTable) -> Result<Reconstruction, CodeError> {
    reconstruct(program.instructions(), table, 0, None)
}

/// Reconstructs the half-open range `[start, stop)`; `stop = None` means
/// end of stream.
///
/// Errors are the walker's ([`CodeError::UnsupportedEffect`],
/// [`CodeError::MalformedStream`], [`CodeError::UnknownOpcode`]) plus
/// [`CodeError::CorruptProgram`] for jump targets that leave the requested
/// range. No partial tree is returned on a hard failure.
pub fn reconstruct(
    stream: &[Instruction],
    table: &EffectTable,
    start: usize,
    stop: Option<usize>,
) -> Result<Reconstruction, CodeError> {
    let stop = stop.unwrap_or(stream.len());
    if start > stop || stop > stream.len() {
        return Err(CodeError::corrupt(format!(
            "requested range [{start}, {stop}) exceeds stream of {} instructions",
            stream.len()
        )));
    }

    let mut content: Vec<Node> = Vec::new();
    let mut seg: Vec<Instruction> = Vec::new();
    let mut i = start;

    while i < stop {
        let instr = stream[i];
        let spec = table.lookup(instr.opcode).ok_or(CodeError::UnknownOpcode {
            opcode: instr.opcode,
            position: i,
        })?;

        match spec.role {
            Role::CondJump { jump_if } => {
                let target = usize::from(instr.operand);
                if target <= i || target > stop {
                    return Err(CodeError::corrupt(format!(
                        "conditional jump at {i} targets {target}, outside ({i}, {stop}]"
                    )));
                }
                let cond_start = expression_start(stream, table, i, 1)?;
                let conditional = split_condition(&mut content, &mut seg, i, cond_start)?;

                let inner = reconstruct(stream, table, i + 1, Some(target))?;
                let (taken, reached) = match inner {
                    Reconstruction::Complete(body) => (body, target),
                    Reconstruction::Partial { body, resumed_at } => (body, resumed_at),
                };
                let tail = taken.last_instruction();
                let tail_role = tail.and_then(|t| table.lookup(t.opcode)).map(|s| s.role);

                match (tail, tail_role) {
                    (Some(t), Some(Role::Jump))
                        if usize::from(t.operand) == cond_start && reached == target =>
                    {
                        content.push(Node::While(Loop {
                            conditional,
                            body: taken,
                            omitted: instr,
                        }));
                        i = target;
                    }
                    (Some(t), Some(Role::JumpForward)) => {
                        // The forward jump sits at `reached - 1`, so its
                        // destination is `reached + distance`.
                        let dest = reached + usize::from(t.operand);
                        if dest > stop {
                            return Err(CodeError::corrupt(format!(
                                "forward jump at {} targets {dest}, past {stop}",
                                reached - 1
                            )));
                        }
                        let skipped = reconstruct(stream, table, reached, Some(dest))?;
                        let (skipped_body, skipped_end) = match skipped {
                            Reconstruction::Complete(body) => (body, dest),
                            Reconstruction::Partial { body, resumed_at } => (body, resumed_at),
                        };
                        content.push(if jump_if {
                            Node::Branch(Branch {
                                conditional,
                                true_body: skipped_body,
                                false_body: taken,
                                omitted: instr,
                                true_first: false,
                            })
                        } else {
                            Node::Branch(Branch {
                                conditional,
                                true_body: taken,
                                false_body: skipped_body,
                                omitted: instr,
                                true_first: true,
                            })
                        });
                        if skipped_end < dest {
                            return Ok(Reconstruction::Partial {
                                body: Body { content },
                                resumed_at: skipped_end,
                            });
                        }
                        i = dest;
                    }
                    _ => {
                        content.push(Node::If(If {
                            conditional,
                            exec: taken,
                            omitted: instr,
                            if_true: !jump_if,
                        }));
                        if reached < target {
                            return Ok(Reconstruction::Partial {
                                body: Body { content },
                                resumed_at: reached,
                            });
                        }
                        i = target;
                    }
                }
            }
            Role::ForIter => {
                let target = i + 1 + usize::from(instr.operand);
                if target > stop {
                    return Err(CodeError::corrupt(format!(
                        "iterator advance at {i} exits to {target}, past {stop}"
                    )));
                }
                let cond_start = expression_start(stream, table, i, 1)?;
                let conditional = split_condition(&mut content, &mut seg, i, cond_start)?;

                let inner = reconstruct(stream, table, i + 1, Some(target))?;
                let (body, reached) = match inner {
                    Reconstruction::Complete(body) => (body, target),
                    Reconstruction::Partial { body, resumed_at } => (body, resumed_at),
                };
                content.push(Node::For(Loop {
                    conditional,
                    body,
                    omitted: instr,
                }));
                if reached < target {
                    return Ok(Reconstruction::Partial {
                        body: Body { content },
                        resumed_at: reached,
                    });
                }
                i = target;
            }
            Role::JumpForward => {
                // A bare forward jump ends the current scope: it is the jump
                // that closes an `if` arm before an `else`. The jump itself
                // belongs to this scope's final segment.
                seg.push(instr);
                i += 1;
                close_segment(&mut content, &mut seg);
                let body = Body { content };
                return Ok(if i == stop {
                    Reconstruction::Complete(body)
                } else {
                    Reconstruction::Partial { body, resumed_at: i }
                });
            }
            Role::Return => {
                seg.push(instr);
                i += 1;
                if i < stop {
                    if stop - i == 2 && is_return_epilogue(stream, table, i) {
                        // The source compiler appends a "return nothing"
                        // idiom after an explicit return; fold it into the
                        // final segment instead of reporting a mismatch.
                        seg.push(stream[i]);
                        seg.push(stream[i + 1]);
                        i += 2;
                    } else {
                        close_segment(&mut content, &mut seg);
                        return Ok(Reconstruction::Partial {
                            body: Body { content },
                            resumed_at: i,
                        });
                    }
                }
                close_segment(&mut content, &mut seg);
                return Ok(Reconstruction::Complete(Body { content }));
            }
            _ => {
                seg.push(instr);
                i += 1;
            }
        }
    }

    close_segment(&mut content, &mut seg);
    Ok(Reconstruction::Complete(Body { content }))
}

/// Splits the accumulated segment at the condition's start: everything
/// before it is closed off as a plain segment, the rest becomes the
/// condition.
fn split_condition(
    content: &mut Vec<Node>,
    seg: &mut Vec<Instruction>,
    i: usize,
    cond_start: usize,
) -> Result<Segment, CodeError> {
    let seg_start = i - seg.len();
    if cond_start < seg_start {
        return Err(CodeError::corrupt(format!(
            "condition beginning at {cond_start} crosses the structure boundary at {seg_start}"
        )));
    }
    let instructions = seg.split_off(cond_start - seg_start);
    close_segment(content, seg);
    Ok(Segment { instructions })
}

fn close_segment(content: &mut Vec<Node>, seg: &mut Vec<Instruction>) {
    if !seg.is_empty() {
        content.push(Node::Segment(Segment {
            instructions: std::mem::take(seg),
        }));
    }
}

/// True when the two instructions at `at` are the compiler's trailing
/// "load a constant and return it" idiom.
fn is_return_epilogue(stream: &[Instruction], table: &EffectTable, at: usize) -> bool {
    let load = table.lookup(stream[at].opcode).map(|s| s.role);
    let ret = table.lookup(stream[at + 1].opcode).map(|s| s.role);
    load == Some(Role::LoadConst) && ret == Some(Role::Return)
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
    fn test_empty_range() {
        let program = program(&[]);
        let table = Op::table();
        let result = reconstruct_program(&program, &table).unwrap();
        assert_eq!(result, Reconstruction::Complete(Body::default()));
    }

    #[test]
    fn test_straight_line_is_one_segment() {
        let program = program(&[
            Op::LoadConst as u8, 0,
            Op::LoadConst as u8, 1,
            Op::BinaryAdd as u8, 0,
            Op::ReturnValue as u8, 0,
        ]);
        let table = Op::table();
        let body = reconstruct_program(&program, &table).unwrap().into_body();
        assert_eq!(body.content.len(), 1);
        assert_eq!(body.flatten(), program.instructions());
    }

    #[test]
    fn test_forward_jump_ends_scope_early() {
        let program = program(&[
            Op::LoadConst as u8, 0,
            Op::JumpForward as u8, 1,
            Op::LoadConst as u8, 1,
            Op::ReturnValue as u8, 0,
        ]);
        let table = Op::table();
        let result = reconstruct(program.instructions(), &table, 0, None).unwrap();
        match result {
            Reconstruction::Partial { body, resumed_at } => {
                assert_eq!(resumed_at, 2);
                assert_eq!(body.instruction_count(), 2);
            }
            Reconstruction::Complete(_) => panic!("scope should have ended at the forward jump"),
        }
    }

    #[test]
    fn test_trailing_return_epilogue_is_folded() {
        let program = program(&[
            Op::LoadLocal as u8, 0,
            Op::ReturnValue as u8, 0,
            Op::LoadConst as u8, 0,
            Op::ReturnValue as u8, 0,
        ]);
        let table = Op::table();
        let result = reconstruct_program(&program, &table).unwrap();
        assert!(result.is_complete());
        assert_eq!(result.body().flatten(), program.instructions());
    }

    #[test]
    fn test_return_with_other_trailer_is_partial() {
        let program = program(&[
            Op::ReturnValue as u8, 0,
            Op::Nop as u8, 0,
            Op::Nop as u8, 0,
            Op::Nop as u8, 0,
        ]);
        let table = Op::table();
        match reconstruct_program(&program, &table).unwrap() {
            Reconstruction::Partial { resumed_at, .. } => assert_eq!(resumed_at, 1),
            Reconstruction::Complete(_) => panic!("trailer is not the return epilogue"),
        }
    }

    #[test]
    fn test_out_of_range_jump_is_corrupt() {
        let program = program(&[
            Op::LoadLocal as u8, 0,
            Op::JumpIfFalse as u8, 9,
            Op::ReturnValue as u8, 0,
        ]);
        let table = Op::table();
        assert!(matches!(
            reconstruct_program(&program, &table),
            Err(CodeError::CorruptProgram { .. })
        ));
    }
}
