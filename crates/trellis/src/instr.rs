//! Positioned instructions and the program container.
//!
//! A program is decoded from a flat stream of fixed-width `(opcode, operand)`
//! byte pairs plus its two side tables (constant pool, local names). Each
//! instruction receives a stable [`InstrId`] at decode time; its *position*
//! is its current index in the stream vector. Because mutators preserve
//! order, positions stay contiguous by construction — deleting position `p`
//! implicitly shifts everything after it without rewriting any stored field.

use std::fmt;

use crate::{effects::EffectTable, value::Const};

/// Stable identity of an instruction, assigned once at decode time.
///
/// Ids survive deletions and replacements; use
/// [`Program::position_of`] to find where an instruction currently sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct InstrId(u32);

/// A single `(opcode, operand)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Instruction {
    /// Integer tag identifying the operation.
    pub opcode: u8,
    /// Integer argument; meaning depends on the opcode.
    pub operand: u8,
    id: InstrId,
}

impl Instruction {
    pub(crate) const fn new(opcode: u8, operand: u8, id: InstrId) -> Self {
        Self { opcode, operand, id }
    }

    /// The instruction's stable identity.
    #[must_use]
    pub const fn id(&self) -> InstrId {
        self.id
    }

    /// One-line rendering: decode-time id, raw pair, and the mnemonic when
    /// the table knows the opcode.
    #[must_use]
    pub fn render(&self, table: &EffectTable) -> String {
        match table.name(self.opcode) {
            Some(name) => format!("[{:>3}] {:<3} {:>3} {name}", self.id.0, self.opcode, self.operand),
            None => format!("[{:>3}] {:<3} {:>3}", self.id.0, self.opcode, self.operand),
        }
    }
}

/// Error raised while decoding a raw instruction stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The byte stream does not split into (opcode, operand) pairs.
    OddLength {
        /// Length of the offending stream.
        len: usize,
    },
    /// A side table has more entries than a `u8` operand can reference.
    TableTooLarge {
        /// `"constants"` or `"locals"`.
        table: &'static str,
        /// Number of entries supplied.
        len: usize,
    },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OddLength { len } => {
                write!(f, "instruction stream of {len} bytes does not split into pairs")
            }
            Self::TableTooLarge { table, len } => {
                write!(f, "{table} table has {len} entries; operands address at most 256")
            }
        }
    }
}

impl std::error::Error for DecodeError {}

/// Ordered table of literal values referenced by index from constant loads.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ConstPool(Vec<Const>);

impl ConstPool {
    #[must_use]
    pub fn from_vec(values: Vec<Const>) -> Self {
        Self(values)
    }

    #[must_use]
    pub fn values(&self) -> &[Const] {
        &self.0
    }

    #[must_use]
    pub fn get(&self, index: u8) -> Option<&Const> {
        self.0.get(usize::from(index))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// First slot holding an equal value, for pool reuse.
    #[must_use]
    pub fn slot_of(&self, value: &Const) -> Option<u8> {
        self.0
            .iter()
            .position(|existing| existing == value)
            .and_then(|index| u8::try_from(index).ok())
    }

    /// Appends a value, returning its slot, or `None` when the pool is full
    /// (operands address at most 256 slots).
    pub(crate) fn push(&mut self, value: Const) -> Option<u8> {
        let slot = u8::try_from(self.0.len()).ok()?;
        self.0.push(value);
        Some(slot)
    }

    pub(crate) fn set(&mut self, index: u8, value: Const) -> bool {
        match self.0.get_mut(usize::from(index)) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub(crate) fn remove(&mut self, index: u8) -> Option<Const> {
        let index = usize::from(index);
        (index < self.0.len()).then(|| self.0.remove(index))
    }
}

/// Ordered table of local-variable names referenced by index from local
/// loads and stores.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LocalTable(Vec<String>);

impl LocalTable {
    #[must_use]
    pub fn from_vec(names: Vec<String>) -> Self {
        Self(names)
    }

    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.0
    }

    #[must_use]
    pub fn get(&self, index: u8) -> Option<&str> {
        self.0.get(usize::from(index)).map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<u8> {
        self.0
            .iter()
            .position(|existing| existing == name)
            .and_then(|index| u8::try_from(index).ok())
    }

    pub(crate) fn push(&mut self, name: String) -> Option<u8> {
        let index = u8::try_from(self.0.len()).ok()?;
        self.0.push(name);
        Some(index)
    }

    pub(crate) fn remove(&mut self, index: u8) -> Option<String> {
        let index = usize::from(index);
        (index < self.0.len()).then(|| self.0.remove(index))
    }
}

/// A decoded program: the flat instruction stream plus its side tables.
///
/// The stream, pool, and locals are owned exclusively by whichever
/// transformation is operating on them; nothing here is shared or lazily
/// mutated behind the caller's back.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Program {
    stream: Vec<Instruction>,
    consts: ConstPool,
    locals: LocalTable,
}

impl Program {
    /// Decodes a byte-pair stream, assigning positions and ids 0, 1, 2, … in
    /// stream order.
    pub fn decode(code: &[u8], consts: ConstPool, locals: LocalTable) -> Result<Self, DecodeError> {
        if code.len() % 2 != 0 {
            return Err(DecodeError::OddLength { len: code.len() });
        }
        if consts.len() > 256 {
            return Err(DecodeError::TableTooLarge {
                table: "constants",
                len: consts.len(),
            });
        }
        if locals.len() > 256 {
            return Err(DecodeError::TableTooLarge {
                table: "locals",
                len: locals.len(),
            });
        }
        let stream = code
            .chunks_exact(2)
            .enumerate()
            .map(|(index, pair)| Instruction::new(pair[0], pair[1], InstrId(index as u32)))
            .collect();
        Ok(Self { stream, consts, locals })
    }

    /// Re-emits the `(opcode, operand)` pairs in current position order.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut code = Vec::with_capacity(self.stream.len() * 2);
        for instr in &self.stream {
            code.push(instr.opcode);
            code.push(instr.operand);
        }
        code
    }

    /// The instruction stream; an instruction's position is its index here.
    #[must_use]
    pub fn instructions(&self) -> &[Instruction] {
        &self.stream
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.stream.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stream.is_empty()
    }

    #[must_use]
    pub fn consts(&self) -> &ConstPool {
        &self.consts
    }

    #[must_use]
    pub fn locals(&self) -> &LocalTable {
        &self.locals
    }

    /// Current position of an instruction, by stable id.
    #[must_use]
    pub fn position_of(&self, id: InstrId) -> Option<usize> {
        self.stream.iter().position(|instr| instr.id == id)
    }

    pub(crate) fn consts_mut(&mut self) -> &mut ConstPool {
        &mut self.consts
    }

    pub(crate) fn locals_mut(&mut self) -> &mut LocalTable {
        &mut self.locals
    }

    /// Mutable view of the stream, for operand renumbering.
    pub(crate) fn stream_mut(&mut self) -> &mut [Instruction] {
        &mut self.stream
    }

    /// Rewrites an instruction in place, keeping its id.
    pub(crate) fn replace(&mut self, id: InstrId, opcode: u8, operand: u8) -> bool {
        match self.stream.iter_mut().find(|instr| instr.id == id) {
            Some(instr) => {
                instr.opcode = opcode;
                instr.operand = operand;
                true
            }
            None => false,
        }
    }

    /// Deletes a batch of instructions, preserving the order of the rest.
    pub(crate) fn remove_all(&mut self, ids: &[InstrId]) {
        self.stream.retain(|instr| !ids.contains(&instr.id));
    }

    /// Serializes the whole program (stream plus side tables) to a compact
    /// binary snapshot.
    pub fn snapshot(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    /// Restores a program from [`Program::snapshot`] bytes.
    pub fn from_snapshot(bytes: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(bytes)
    }

    /// Serializes the program to the JSON interchange form.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Parses a program from the JSON interchange form.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(code: &[u8]) -> Program {
        Program::decode(code, ConstPool::default(), LocalTable::default()).unwrap()
    }

    #[test]
    fn test_decode_assigns_contiguous_ids() {
        let program = decode(&[1, 0, 2, 9, 3, 1]);
        let ids: Vec<u32> = program.instructions().iter().map(|i| i.id().0).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert_eq!(program.instructions()[1].operand, 9);
    }

    #[test]
    fn test_decode_rejects_odd_length() {
        let err = Program::decode(&[1, 0, 2], ConstPool::default(), LocalTable::default()).unwrap_err();
        assert_eq!(err, DecodeError::OddLength { len: 3 });
    }

    #[test]
    fn test_encode_round_trip() {
        let code = [1, 0, 2, 9, 3, 1];
        assert_eq!(decode(&code).encode(), code);
    }

    #[test]
    fn test_remove_preserves_order_and_positions() {
        let mut program = decode(&[1, 0, 2, 0, 3, 0, 4, 0]);
        let doomed = program.instructions()[1].id();
        program.remove_all(&[doomed]);

        let opcodes: Vec<u8> = program.instructions().iter().map(|i| i.opcode).collect();
        assert_eq!(opcodes, vec![1, 3, 4]);
        // The instruction that sat at position 2 now sits at position 1.
        assert_eq!(program.position_of(program.instructions()[1].id()), Some(1));
        assert_eq!(program.position_of(doomed), None);
    }

    #[test]
    fn test_replace_keeps_id() {
        let mut program = decode(&[1, 0, 2, 0]);
        let id = program.instructions()[0].id();
        assert!(program.replace(id, 7, 7));
        assert_eq!(program.instructions()[0].opcode, 7);
        assert_eq!(program.instructions()[0].id(), id);
    }

    #[test]
    fn test_const_pool_reuse_lookup() {
        let pool = ConstPool::from_vec(vec![Const::Int(2), Const::Int(3), Const::Int(2)]);
        assert_eq!(pool.slot_of(&Const::Int(2)), Some(0));
        assert_eq!(pool.slot_of(&Const::Float(2.0)), None);
    }
}
