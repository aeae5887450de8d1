//! Fixed-point rewriting of the flat instruction stream.
//!
//! Each cycle analyzes the stream from scratch and applies the FIRST
//! applicable rewrite class — single-use substitution, constant folding,
//! dead-local elimination, dead-constant elimination, in that order — then
//! restarts. Classes are never combined within a cycle; the loop ends only
//! when a full cycle performs no rewrite at all.
//!
//! Every rewrite instance is all-or-nothing: it either updates the stream
//! and all side tables consistently or is not applied. Termination is a
//! correctness invariant, not a timer: substitution and folding strictly
//! shrink the stream's operator/store population, and the elimination
//! classes shrink the side tables, so every cycle either makes progress or
//! is the last.

use smallvec::SmallVec;

use crate::{
    effects::{EffectTable, FoldOp, Role},
    error::CodeError,
    instr::{InstrId, Instruction, Program},
    trace::PassTracer,
    value::Const,
    walker::expression_start,
};

/// Which rewrite class a cycle applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriteKind {
    /// Single-use local substitution.
    Substitution,
    /// Constant folding.
    Fold,
    /// Dead-local elimination.
    DeadLocal,
    /// Dead-constant elimination.
    DeadConst,
}

/// Outcome of one full analyze-and-rewrite cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// The cycle applied one rewrite class; analysis must restart.
    Changed(RewriteKind),
    /// A full cycle performed zero rewrites; the stream is stable.
    Fixed,
}

/// Statistics from a completed [`Optimizer::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassSummary {
    /// Number of cycles executed, including the final zero-rewrite cycle.
    pub cycles: u32,
    /// Number of cycles that applied a rewrite class.
    pub rewrites: u32,
}

/// Fixed-point rewriter over a program and its side tables.
///
/// Owns the program exclusively for the duration of the run; the effect
/// table is the immutable dialect configuration.
#[derive(Debug)]
pub struct Optimizer<'p, 't, Tr: PassTracer> {
    program: &'p mut Program,
    table: &'t EffectTable,
    tracer: Tr,
    cycle: u32,
}

/// Per-cycle analysis over the current stream.
#[derive(Debug, Default)]
struct Analysis {
    /// Store instructions per local index.
    stores: Vec<Vec<InstrId>>,
    /// Load instructions per local index.
    loads: Vec<Vec<InstrId>>,
    /// Constant-load instructions per pool slot.
    const_loads: Vec<Vec<InstrId>>,
    /// Operators whose operands were all constant loads at analysis time.
    folds: Vec<FoldCandidate>,
}

#[derive(Debug, Clone, Copy)]
struct FoldCandidate {
    id: InstrId,
    op: FoldOp,
    inplace: bool,
}

impl<'p, 't, Tr: PassTracer> Optimizer<'p, 't, Tr> {
    pub fn new(program: &'p mut Program, table: &'t EffectTable, tracer: Tr) -> Self {
        Self {
            program,
            table,
            tracer,
            cycle: 0,
        }
    }

    /// Runs cycles until one performs zero rewrites.
    pub fn run(mut self) -> Result<PassSummary, CodeError> {
        let mut rewrites = 0;
        loop {
            match self.step()? {
                Progress::Changed(_) => rewrites += 1,
                Progress::Fixed => {
                    return Ok(PassSummary {
                        cycles: self.cycle,
                        rewrites,
                    });
                }
            }
        }
    }

    /// Executes one full cycle: analyze, then apply the first applicable
    /// rewrite class.
    pub fn step(&mut self) -> Result<Progress, CodeError> {
        self.cycle += 1;
        self.tracer.on_cycle(self.cycle);
        let analysis = self.analyze()?;
        if self.apply_substitutions(&analysis)? {
            return Ok(Progress::Changed(RewriteKind::Substitution));
        }
        if self.apply_folds(&analysis)? {
            return Ok(Progress::Changed(RewriteKind::Fold));
        }
        if self.apply_dead_locals(&analysis)? {
            return Ok(Progress::Changed(RewriteKind::DeadLocal));
        }
        if self.apply_dead_consts(&analysis)? {
            return Ok(Progress::Changed(RewriteKind::DeadConst));
        }
        Ok(Progress::Fixed)
    }

    /// Scans the stream, collecting reference lists and fold candidates and
    /// bounds-checking every table index it sees.
    fn analyze(&self) -> Result<Analysis, CodeError> {
        let stream = self.program.instructions();
        let consts_len = self.program.consts().len();
        let locals_len = self.program.locals().len();

        let mut analysis = Analysis {
            stores: vec![Vec::new(); locals_len],
            loads: vec![Vec::new(); locals_len],
            const_loads: vec![Vec::new(); consts_len],
            folds: Vec::new(),
        };
        let mut roles: Vec<Role> = Vec::with_capacity(stream.len());

        for (position, instr) in stream.iter().enumerate() {
            let spec = self.table.lookup(instr.opcode).ok_or(CodeError::UnknownOpcode {
                opcode: instr.opcode,
                position,
            })?;
            let index = usize::from(instr.operand);
            match spec.role {
                Role::LoadConst => {
                    if index >= consts_len {
                        return Err(CodeError::corrupt(format!(
                            "constant load at position {position} references slot {index} of {consts_len}"
                        )));
                    }
                    analysis.const_loads[index].push(instr.id());
                }
                Role::LoadLocal => {
                    if index >= locals_len {
                        return Err(CodeError::corrupt(format!(
                            "local load at position {position} references local {index} of {locals_len}"
                        )));
                    }
                    analysis.loads[index].push(instr.id());
                }
                Role::StoreLocal => {
                    if index >= locals_len {
                        return Err(CodeError::corrupt(format!(
                            "local store at position {position} references local {index} of {locals_len}"
                        )));
                    }
                    analysis.stores[index].push(instr.id());
                }
                Role::Operator { op, inplace } => {
                    let arity = usize::from(op.arity());
                    let all_const = position >= arity
                        && roles[position - arity..position]
                            .iter()
                            .all(|role| *role == Role::LoadConst);
                    // Missing constant operands simply disqualify the
                    // candidate; that is not an error.
                    if all_const
                        && expression_start(stream, self.table, position, u32::from(op.arity()))?
                            == position - arity
                    {
                        analysis.folds.push(FoldCandidate {
                            id: instr.id(),
                            op,
                            inplace,
                        });
                    }
                }
                _ => {}
            }
            roles.push(spec.role);
        }
        Ok(analysis)
    }

    /// Class 1: a local stored exactly once and read at least once, whose
    /// store directly follows a constant load, has every read replaced by
    /// that constant load; the store and its feeding load are deleted.
    fn apply_substitutions(&mut self, analysis: &Analysis) -> Result<bool, CodeError> {
        let mut changed = false;
        for local in 0..analysis.stores.len() {
            let stores = &analysis.stores[local];
            let loads = &analysis.loads[local];
            if stores.len() != 1 || loads.is_empty() {
                continue;
            }
            // Positions shift as instances apply; re-resolve and re-verify
            // adjacency against the current stream.
            let Some(store_pos) = self.program.position_of(stores[0]) else {
                continue;
            };
            if store_pos == 0 {
                continue;
            }
            let feed = self.program.instructions()[store_pos - 1];
            if self.role_of(feed) != Some(Role::LoadConst) {
                continue;
            }

            let index = u8::try_from(local)
                .map_err(|_| CodeError::corrupt(format!("locals table has {} entries", analysis.stores.len())))?;
            let name = self
                .program
                .locals()
                .get(index)
                .unwrap_or_default()
                .to_owned();
            for read in loads {
                self.program.replace(*read, feed.opcode, feed.operand);
            }
            self.program.remove_all(&[stores[0], feed.id()]);
            self.tracer.on_substitute(index, &name, feed.operand, loads.len());
            changed = true;
        }
        Ok(changed)
    }

    /// Class 2: operators whose operands are all immediately-preceding
    /// constant loads are computed at rewrite time. Pure operators reuse or
    /// append a pool slot and become a constant load; in-place operators
    /// overwrite the left operand's slot and disappear. Results that are not
    /// representable decline the fold.
    fn apply_folds(&mut self, analysis: &Analysis) -> Result<bool, CodeError> {
        let mut changed = false;
        for candidate in &analysis.folds {
            let Some(position) = self.program.position_of(candidate.id) else {
                continue;
            };
            let arity = usize::from(candidate.op.arity());
            if position < arity {
                continue;
            }
            let stream = self.program.instructions();
            let operands: SmallVec<[Instruction; 2]> = stream[position - arity..position].iter().copied().collect();
            // An earlier instance in this cycle may have moved the operands
            // away; the candidate then waits for the next analysis.
            if !operands.iter().all(|o| self.role_of(*o) == Some(Role::LoadConst)) {
                continue;
            }
            let op_name = self
                .table
                .name(stream[position].opcode)
                .unwrap_or_default()
                .to_owned();

            let mut values: SmallVec<[Const; 2]> = SmallVec::new();
            for operand in &operands {
                let value = self.program.consts().get(operand.operand).ok_or_else(|| {
                    CodeError::corrupt(format!(
                        "constant load feeding position {position} references slot {} of {}",
                        operand.operand,
                        self.program.consts().len()
                    ))
                })?;
                values.push(value.clone());
            }

            let result = if arity == 1 {
                Const::apply_unary(candidate.op, &values[0])
            } else {
                Const::apply_binary(candidate.op, &values[0], &values[1])
            };
            let Some(value) = result else {
                self.tracer.on_fold_declined(&op_name, position);
                continue;
            };

            if candidate.inplace {
                // The left operand's slot takes the new value; the operator
                // and the remaining operand loads disappear.
                let slot = operands[0].operand;
                self.program.consts_mut().set(slot, value.clone());
                let mut doomed: SmallVec<[InstrId; 2]> = operands[1..].iter().map(Instruction::id).collect();
                doomed.push(candidate.id);
                self.program.remove_all(&doomed);
                self.tracer.on_fold(&op_name, &value, slot);
            } else {
                let slot = match self.program.consts().slot_of(&value) {
                    Some(slot) => slot,
                    None => match self.program.consts_mut().push(value.clone()) {
                        Some(slot) => slot,
                        // A full pool cannot address a new slot; decline.
                        None => {
                            self.tracer.on_fold_declined(&op_name, position);
                            continue;
                        }
                    },
                };
                self.program.replace(candidate.id, operands[0].opcode, slot);
                let doomed: SmallVec<[InstrId; 2]> = operands.iter().map(Instruction::id).collect();
                self.program.remove_all(&doomed);
                self.tracer.on_fold(&op_name, &value, slot);
            }
            changed = true;
        }
        Ok(changed)
    }

    /// Class 3: locals with no remaining references are removed; local
    /// operands above the removed index are decremented to keep the table
    /// contiguous.
    fn apply_dead_locals(&mut self, analysis: &Analysis) -> Result<bool, CodeError> {
        let dead: Vec<u8> = (0..analysis.stores.len())
            .filter(|local| analysis.stores[*local].is_empty() && analysis.loads[*local].is_empty())
            .map(u8::try_from)
            .collect::<Result<_, _>>()
            .map_err(|_| CodeError::corrupt("locals table exceeds operand range"))?;

        for &index in dead.iter().rev() {
            let Some(name) = self.program.locals_mut().remove(index) else {
                continue;
            };
            for instr in self.program.stream_mut() {
                let role = self.table.lookup(instr.opcode).map(|spec| spec.role);
                if matches!(role, Some(Role::LoadLocal | Role::StoreLocal)) && instr.operand > index {
                    instr.operand -= 1;
                }
            }
            self.tracer.on_local_removed(index, &name);
        }
        Ok(!dead.is_empty())
    }

    /// Class 4: pool slots with no constant-load references are removed;
    /// constant operands above the removed slot are decremented.
    fn apply_dead_consts(&mut self, analysis: &Analysis) -> Result<bool, CodeError> {
        let dead: Vec<u8> = (0..analysis.const_loads.len())
            .filter(|slot| analysis.const_loads[*slot].is_empty())
            .map(u8::try_from)
            .collect::<Result<_, _>>()
            .map_err(|_| CodeError::corrupt("constant pool exceeds operand range"))?;

        for &index in dead.iter().rev() {
            let Some(value) = self.program.consts_mut().remove(index) else {
                continue;
            };
            for instr in self.program.stream_mut() {
                let role = self.table.lookup(instr.opcode).map(|spec| spec.role);
                if role == Some(Role::LoadConst) && instr.operand > index {
                    instr.operand -= 1;
                }
            }
            self.tracer.on_const_removed(index, &value);
        }
        Ok(!dead.is_empty())
    }

    fn role_of(&self, instr: Instruction) -> Option<Role> {
        self.table.lookup(instr.opcode).map(|spec| spec.role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dialect::Op,
        instr::{ConstPool, LocalTable},
        trace::NoopTracer,
    };

    fn program(code: &[u8], consts: Vec<Const>, locals: Vec<&str>) -> Program {
        Program::decode(
            code,
            ConstPool::from_vec(consts),
            LocalTable::from_vec(locals.into_iter().map(str::to_owned).collect()),
        )
        .unwrap()
    }

    #[test]
    fn test_pure_fold_reuses_existing_slot() {
        // 2 + 3 where 5 is already pooled: no new slot is appended.
        let mut program = program(
            &[
                Op::LoadConst as u8, 0,
                Op::LoadConst as u8, 1,
                Op::BinaryAdd as u8, 0,
                Op::ReturnValue as u8, 0,
            ],
            vec![Const::Int(2), Const::Int(3), Const::Int(5)],
            vec![],
        );
        let table = Op::table();
        let summary = Optimizer::new(&mut program, &table, NoopTracer).run().unwrap();
        assert!(summary.rewrites > 0);
        assert_eq!(program.consts().values(), &[Const::Int(5)]);
        assert_eq!(
            program.encode(),
            vec![Op::LoadConst as u8, 0, Op::ReturnValue as u8, 0]
        );
    }

    #[test]
    fn test_inplace_fold_updates_left_slot() {
        let mut program = program(
            &[
                Op::LoadConst as u8, 0,
                Op::LoadConst as u8, 1,
                Op::InplaceMul as u8, 0,
                Op::ReturnValue as u8, 0,
            ],
            vec![Const::Int(29), Const::Int(18)],
            vec![],
        );
        let table = Op::table();
        let mut tracer = NoopTracer;
        let mut optimizer = Optimizer::new(&mut program, &table, &mut tracer);
        let progress = optimizer.step().unwrap();
        assert_eq!(progress, Progress::Changed(RewriteKind::Fold));
        // Slot 0 now holds the product and the surviving load reads it.
        assert_eq!(program.consts().get(0), Some(&Const::Int(522)));
        assert_eq!(
            program.encode(),
            vec![Op::LoadConst as u8, 0, Op::ReturnValue as u8, 0]
        );
    }

    #[test]
    fn test_declined_fold_leaves_stream_untouched() {
        let mut program = program(
            &[
                Op::LoadConst as u8, 0,
                Op::LoadConst as u8, 1,
                Op::BinaryTrueDiv as u8, 0,
                Op::ReturnValue as u8, 0,
            ],
            vec![Const::Int(1), Const::Int(0)],
            vec![],
        );
        let before = program.clone();
        let table = Op::table();
        let summary = Optimizer::new(&mut program, &table, NoopTracer).run().unwrap();
        assert_eq!(summary.rewrites, 0);
        assert_eq!(program, before);
    }

    #[test]
    fn test_out_of_range_local_is_corrupt() {
        let mut program = program(&[Op::LoadLocal as u8, 3, Op::ReturnValue as u8, 0], vec![], vec!["a"]);
        let table = Op::table();
        let err = Optimizer::new(&mut program, &table, NoopTracer).run().unwrap_err();
        assert!(matches!(err, CodeError::CorruptProgram { .. }));
    }

    #[test]
    fn test_unknown_opcode_is_fatal() {
        let mut program = program(&[250, 0], vec![], vec![]);
        let table = Op::table();
        let err = Optimizer::new(&mut program, &table, NoopTracer).run().unwrap_err();
        assert_eq!(err, CodeError::UnknownOpcode { opcode: 250, position: 0 });
    }
}
