//! Line-oriented assembler and disassembler for effect-table dialects.
//!
//! Grammar, one item per line:
//!
//! ```text
//! # comment                      (also allowed after an item, " # ...")
//! .const 29                      pool literal: None, True, False, int, float, 'str'
//! .local counter                 declare a local name
//! top:                           label (the next instruction's position)
//! load_local counter             mnemonic + operand
//! jump_if_false done             jump operands may name a label
//! jump top
//! done:
//! return_value
//! ```
//!
//! Label operands resolve according to the opcode's role: absolute position
//! for `CondJump`/`Jump`, relative distance from the following instruction
//! for `JumpForward`/`ForIter`. Local operands may name a declared local;
//! any operand may be a bare integer.

use std::fmt;

use ahash::AHashMap;

use crate::{
    effects::{EffectTable, Role},
    instr::{ConstPool, DecodeError, LocalTable, Program},
    value::Const,
};

/// A successfully assembled program plus its line-to-position map.
#[derive(Debug, Clone)]
pub struct Assembled {
    /// The decoded program.
    pub program: Program,
    /// For each source line (0-based), the position of the instruction it
    /// produced, if any.
    pub source_map: Vec<Option<usize>>,
}

/// Assembly failure, pinned to a 1-based source line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsmError {
    /// 1-based line number.
    pub line: usize,
    /// What went wrong.
    pub kind: AsmErrorKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AsmErrorKind {
    UnknownMnemonic(String),
    UnknownLabel(String),
    UnknownLocal(String),
    DuplicateLabel(String),
    BadLiteral(String),
    BadOperand(String),
    /// A resolved operand does not fit in a byte.
    OperandOutOfRange(String),
    /// A label resolved to a backward target for a forward-only jump.
    BackwardDistance(String),
    TooManyEntries(&'static str),
}

impl fmt::Display for AsmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: ", self.line)?;
        match &self.kind {
            AsmErrorKind::UnknownMnemonic(name) => write!(f, "unknown mnemonic `{name}`"),
            AsmErrorKind::UnknownLabel(name) => write!(f, "unknown label `{name}`"),
            AsmErrorKind::UnknownLocal(name) => write!(f, "unknown local `{name}`"),
            AsmErrorKind::DuplicateLabel(name) => write!(f, "label `{name}` is already defined"),
            AsmErrorKind::BadLiteral(text) => write!(f, "cannot parse constant literal `{text}`"),
            AsmErrorKind::BadOperand(text) => write!(f, "cannot parse operand `{text}`"),
            AsmErrorKind::OperandOutOfRange(value) => {
                write!(f, "operand `{value}` does not fit in a byte")
            }
            AsmErrorKind::BackwardDistance(name) => {
                write!(f, "label `{name}` is behind a forward-only jump")
            }
            AsmErrorKind::TooManyEntries(table) => {
                write!(f, "{table} table is limited to 256 entries")
            }
        }
    }
}

impl std::error::Error for AsmError {}

impl From<DecodeError> for AsmError {
    fn from(error: DecodeError) -> Self {
        // Assembly emits well-formed pairs and capped tables, so a decode
        // failure can only be a capacity overflow.
        let table = match error {
            DecodeError::TableTooLarge { table, .. } => table,
            DecodeError::OddLength { .. } => "instruction",
        };
        Self {
            line: 0,
            kind: AsmErrorKind::TooManyEntries(table),
        }
    }
}

/// One cleaned source line.
enum Item<'a> {
    Blank,
    ConstDirective(&'a str),
    LocalDirective(&'a str),
    Label(&'a str),
    Instruction { mnemonic: &'a str, operand: Option<&'a str> },
}

fn classify(line: &str) -> Item<'_> {
    let line = match line.find(" #") {
        Some(at) => &line[..at],
        None => line,
    };
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Item::Blank;
    }
    if let Some(rest) = line.strip_prefix(".const") {
        return Item::ConstDirective(rest.trim());
    }
    if let Some(rest) = line.strip_prefix(".local") {
        return Item::LocalDirective(rest.trim());
    }
    if let Some(name) = line.strip_suffix(':') {
        return Item::Label(name.trim());
    }
    let mut parts = line.splitn(2, char::is_whitespace);
    let mnemonic = parts.next().unwrap_or_default();
    let operand = parts.next().map(str::trim).filter(|s| !s.is_empty());
    Item::Instruction { mnemonic, operand }
}

fn parse_literal(text: &str) -> Option<Const> {
    match text {
        "None" | "none" => return Some(Const::None),
        "True" | "true" => return Some(Const::Bool(true)),
        "False" | "false" => return Some(Const::Bool(false)),
        _ => {}
    }
    if text.starts_with('\'') && text.ends_with('\'') && text.len() >= 2 {
        return Some(Const::Str(text[1..text.len() - 1].to_owned()));
    }
    if let Ok(value) = text.parse::<i64>() {
        return Some(Const::Int(value));
    }
    text.parse::<f64>().ok().map(Const::Float)
}

/// Assembles source text against an effect table.
pub fn assemble(source: &str, table: &EffectTable) -> Result<Assembled, AsmError> {
    let mnemonics: AHashMap<&str, u8> = table.iter().map(|(opcode, spec)| (spec.name.as_str(), opcode)).collect();

    // First pass: label positions, constant pool, and local declarations.
    let mut labels: AHashMap<&str, usize> = AHashMap::new();
    let mut consts = Vec::new();
    let mut locals = LocalTable::default();
    let mut position = 0usize;
    for (index, line) in source.lines().enumerate() {
        let number = index + 1;
        match classify(line) {
            Item::Blank => {}
            Item::ConstDirective(text) => {
                let value = parse_literal(text).ok_or(AsmError {
                    line: number,
                    kind: AsmErrorKind::BadLiteral(text.to_owned()),
                })?;
                consts.push(value);
            }
            Item::LocalDirective(name) => {
                if locals.index_of(name).is_none() && locals.push(name.to_owned()).is_none() {
                    return Err(AsmError {
                        line: number,
                        kind: AsmErrorKind::TooManyEntries("locals"),
                    });
                }
            }
            Item::Label(name) => {
                if labels.insert(name, position).is_some() {
                    return Err(AsmError {
                        line: number,
                        kind: AsmErrorKind::DuplicateLabel(name.to_owned()),
                    });
                }
            }
            Item::Instruction { .. } => position += 1,
        }
    }

    // Second pass: emit byte pairs, resolving labels and local names.
    let mut code = Vec::with_capacity(position * 2);
    let mut source_map = Vec::new();
    let mut position = 0usize;
    for (index, line) in source.lines().enumerate() {
        let number = index + 1;
        let Item::Instruction { mnemonic, operand } = classify(line) else {
            source_map.push(None);
            continue;
        };
        let opcode = *mnemonics.get(mnemonic).ok_or(AsmError {
            line: number,
            kind: AsmErrorKind::UnknownMnemonic(mnemonic.to_owned()),
        })?;
        let role = table.lookup(opcode).map(|spec| spec.role).unwrap_or(Role::Other);
        let operand = resolve_operand(operand, role, position, &labels, &locals, number)?;
        code.push(opcode);
        code.push(operand);
        source_map.push(Some(position));
        position += 1;
    }

    let program = Program::decode(&code, ConstPool::from_vec(consts), locals)?;
    Ok(Assembled { program, source_map })
}

fn resolve_operand(
    operand: Option<&str>,
    role: Role,
    position: usize,
    labels: &AHashMap<&str, usize>,
    locals: &LocalTable,
    line: usize,
) -> Result<u8, AsmError> {
    let Some(text) = operand else {
        return Ok(0);
    };
    if let Ok(value) = text.parse::<i64>() {
        return u8::try_from(value).map_err(|_| AsmError {
            line,
            kind: AsmErrorKind::OperandOutOfRange(text.to_owned()),
        });
    }
    match role {
        Role::CondJump { .. } | Role::Jump => {
            let target = *labels.get(text).ok_or(AsmError {
                line,
                kind: AsmErrorKind::UnknownLabel(text.to_owned()),
            })?;
            u8::try_from(target).map_err(|_| AsmError {
                line,
                kind: AsmErrorKind::OperandOutOfRange(target.to_string()),
            })
        }
        Role::JumpForward | Role::ForIter => {
            let target = *labels.get(text).ok_or(AsmError {
                line,
                kind: AsmErrorKind::UnknownLabel(text.to_owned()),
            })?;
            let Some(distance) = target.checked_sub(position + 1) else {
                return Err(AsmError {
                    line,
                    kind: AsmErrorKind::BackwardDistance(text.to_owned()),
                });
            };
            u8::try_from(distance).map_err(|_| AsmError {
                line,
                kind: AsmErrorKind::OperandOutOfRange(distance.to_string()),
            })
        }
        Role::LoadLocal | Role::StoreLocal => locals.index_of(text).ok_or(AsmError {
            line,
            kind: AsmErrorKind::UnknownLocal(text.to_owned()),
        }),
        _ => Err(AsmError {
            line,
            kind: AsmErrorKind::BadOperand(text.to_owned()),
        }),
    }
}

/// Renders one instruction as a listing line, with the operand's pool value
/// or local name as a trailing annotation.
#[must_use]
pub fn disassemble_at(program: &Program, table: &EffectTable, position: usize) -> Option<String> {
    let instr = program.instructions().get(position)?;
    let name = match table.name(instr.opcode) {
        Some(name) => name.to_owned(),
        None => format!("op_{}", instr.opcode),
    };
    let mut line = format!("{position:>3}: {name:<16} {}", instr.operand);
    match table.lookup(instr.opcode).map(|spec| spec.role) {
        Some(Role::LoadConst) => {
            if let Some(value) = program.consts().get(instr.operand) {
                line.push_str(&format!(" [{value}]"));
            }
        }
        Some(Role::LoadLocal | Role::StoreLocal) => {
            if let Some(local) = program.locals().get(instr.operand) {
                line.push_str(&format!(" [{local}]"));
            }
        }
        _ => {}
    }
    Some(line)
}

/// Renders the whole program as a listing.
#[must_use]
pub fn disassemble(program: &Program, table: &EffectTable) -> String {
    let mut out = String::new();
    for position in 0..program.len() {
        if let Some(line) = disassemble_at(program, table, position) {
            out.push_str(&line);
            out.push('\n');
        }
    }
    out.trim_end_matches('\n').to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Op;

    #[test]
    fn test_assemble_straight_line() {
        let table = Op::table();
        let assembled = assemble(
            ".const 2\n.local a\nload_const 0\nstore_local a\nreturn_value\n",
            &table,
        )
        .unwrap();
        assert_eq!(
            assembled.program.encode(),
            vec![
                Op::LoadConst as u8, 0,
                Op::StoreLocal as u8, 0,
                Op::ReturnValue as u8, 0,
            ]
        );
        assert_eq!(assembled.program.consts().values(), &[Const::Int(2)]);
        assert_eq!(assembled.program.locals().names(), &["a".to_owned()]);
        assert_eq!(assembled.source_map, vec![None, None, Some(0), Some(1), Some(2)]);
    }

    #[test]
    fn test_labels_resolve_by_role() {
        let table = Op::table();
        let source = "\
.local i
top:
load_local i
jump_if_false done
jump_forward ahead
ahead:
jump top
done:
return_value
";
        let assembled = assemble(source, &table).unwrap();
        let code = assembled.program.encode();
        // jump_if_false -> absolute 4, jump_forward -> distance 0, jump -> absolute 0
        assert_eq!(
            code,
            vec![
                Op::LoadLocal as u8, 0,
                Op::JumpIfFalse as u8, 4,
                Op::JumpForward as u8, 0,
                Op::Jump as u8, 0,
                Op::ReturnValue as u8, 0,
            ]
        );
    }

    #[test]
    fn test_unknown_mnemonic_reports_line() {
        let table = Op::table();
        let err = assemble("nop\nfrobnicate 3\n", &table).unwrap_err();
        assert_eq!(err.line, 2);
        assert_eq!(err.kind, AsmErrorKind::UnknownMnemonic("frobnicate".to_owned()));
    }

    #[test]
    fn test_backward_label_for_forward_jump_rejected() {
        let table = Op::table();
        let err = assemble("top:\nnop\njump_forward top\n", &table).unwrap_err();
        assert_eq!(err.kind, AsmErrorKind::BackwardDistance("top".to_owned()));
    }

    #[test]
    fn test_literals() {
        let table = Op::table();
        let assembled = assemble(
            ".const None\n.const True\n.const -3\n.const 2.5\n.const 'hi'\n",
            &table,
        )
        .unwrap();
        assert_eq!(
            assembled.program.consts().values(),
            &[
                Const::None,
                Const::Bool(true),
                Const::Int(-3),
                Const::Float(2.5),
                Const::Str("hi".to_owned()),
            ]
        );
    }

    #[test]
    fn test_disassemble_annotates_operands() {
        let table = Op::table();
        let assembled = assemble(".const 7\n.local x\nload_const 0\nstore_local x\n", &table).unwrap();
        let listing = disassemble(&assembled.program, &table);
        assert!(listing.contains("load_const"));
        assert!(listing.contains("[7]"));
        assert!(listing.contains("[x]"));
    }

    #[test]
    fn test_comments_and_blanks_ignored() {
        let table = Op::table();
        let assembled = assemble("# header\n\nnop # trailing\n", &table).unwrap();
        assert_eq!(assembled.program.len(), 1);
    }
}
