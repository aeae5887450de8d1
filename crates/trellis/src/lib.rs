#![doc = include_str!("../../../README.md")]

mod asm;
mod dialect;
mod effects;
mod error;
mod instr;
mod optimize;
mod reconstruct;
mod repl;
mod structure;
mod trace;
mod value;
mod walker;

pub use crate::{
    asm::{AsmError, AsmErrorKind, Assembled, assemble, disassemble, disassemble_at},
    dialect::Op,
    effects::{Effect, EffectTable, FoldOp, OpSpec, Role, StackEffect},
    error::CodeError,
    instr::{ConstPool, DecodeError, InstrId, Instruction, LocalTable, Program},
    optimize::{Optimizer, PassSummary, Progress, RewriteKind},
    reconstruct::{Reconstruction, reconstruct, reconstruct_program},
    repl::{BuilderSession, ReplError},
    structure::{Body, Branch, If, Loop, Node, Segment},
    trace::{NoopTracer, PassEvent, PassTracer, RecordingTracer, StderrTracer},
    value::Const,
    walker::expression_start,
};
