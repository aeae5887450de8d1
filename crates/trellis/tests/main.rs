use pretty_assertions::assert_eq;
use trellis::{Const, NoopTracer, Op, Optimizer, Progress, assemble};

/// `a = 2; b = 3; c = a + b; return c` collapses to a single constant load
/// and return, with the pool reduced to the sum and the locals gone.
#[test]
fn sum_of_locals_collapses_to_one_constant() {
    let table = Op::table();
    let source = "\
.const 2
.const 3
.local a
.local b
.local c
load_const 0
store_local a
load_const 1
store_local b
load_local a
load_local b
binary_add
store_local c
load_local c
return_value
";
    let mut program = assemble(source, &table).unwrap().program;
    let summary = Optimizer::new(&mut program, &table, NoopTracer).run().unwrap();

    assert_eq!(
        program.encode(),
        vec![Op::LoadConst as u8, 0, Op::ReturnValue as u8, 0]
    );
    assert_eq!(program.consts().values(), &[Const::Int(5)]);
    assert!(program.locals().is_empty());
    assert_eq!(summary.rewrites, 5);
    assert_eq!(summary.cycles, 6);
}

/// Running the loop again on its own output performs zero further rewrites.
#[test]
fn fixed_point_is_idempotent() {
    let table = Op::table();
    let source = "\
.const 2
.const 3
.local a
load_const 0
store_local a
load_const 1
load_local a
binary_mul
return_value
";
    let mut program = assemble(source, &table).unwrap().program;
    Optimizer::new(&mut program, &table, NoopTracer).run().unwrap();

    let settled = program.clone();
    let mut tracer = NoopTracer;
    let mut second = Optimizer::new(&mut program, &table, &mut tracer);
    assert_eq!(second.step().unwrap(), Progress::Fixed);
    assert_eq!(program, settled);
}

/// After dead-local and dead-constant elimination, every remaining operand
/// stays within its table's bounds.
#[test]
fn eliminations_keep_indices_in_bounds() {
    let table = Op::table();
    let source = "\
.const 1
.const 2
.local unused
.local b
load_const 1
store_local b
load_local b
return_value
";
    let mut program = assemble(source, &table).unwrap().program;
    Optimizer::new(&mut program, &table, NoopTracer).run().unwrap();

    for instr in program.instructions() {
        match Op::from_repr(instr.opcode) {
            Some(Op::LoadConst) => {
                assert!(usize::from(instr.operand) < program.consts().len());
            }
            Some(Op::LoadLocal | Op::StoreLocal) => {
                assert!(usize::from(instr.operand) < program.locals().len());
            }
            _ => {}
        }
    }
    assert_eq!(program.consts().values(), &[Const::Int(2)]);
    assert!(program.locals().is_empty());
}
