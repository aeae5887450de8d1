//! Line-editing builder sessions for assembling test programs.
//!
//! `BuilderSession` keeps numbered source lines and a cursor so a host (the
//! `trellis-repl` binary, tests) can build assembly programs interactively,
//! check them, inspect their reconstruction, run the optimizer, and save
//! annotated listings that can be loaded back.

use crate::{
    asm::{AsmError, Assembled, assemble, disassemble, disassemble_at},
    effects::EffectTable,
    error::CodeError,
    optimize::Optimizer,
    reconstruct::{Reconstruction, reconstruct_program},
    trace::NoopTracer,
};

/// Error type for builder-session operations, separating failures by
/// pipeline stage.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplError {
    /// Assembly failed before any transformation ran.
    Asm(AsmError),
    /// Reconstruction or optimization failed on assembled code.
    Code(CodeError),
}

impl std::fmt::Display for ReplError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Asm(error) => write!(f, "assembly error: {error}"),
            Self::Code(error) => write!(f, "{error}"),
        }
    }
}

impl std::error::Error for ReplError {}

impl From<AsmError> for ReplError {
    fn from(error: AsmError) -> Self {
        Self::Asm(error)
    }
}

impl From<CodeError> for ReplError {
    fn from(error: CodeError) -> Self {
        Self::Code(error)
    }
}

/// Numbered source lines plus a 1-based cursor.
#[derive(Debug, Clone, Default)]
pub struct BuilderSession {
    lines: Vec<String>,
    cursor: usize,
}

impl BuilderSession {
    #[must_use]
    pub fn new() -> Self {
        Self {
            lines: Vec::new(),
            cursor: 1,
        }
    }

    #[must_use]
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// 1-based line the next typed line lands on.
    #[must_use]
    pub fn cursor(&self) -> usize {
        self.cursor.max(1)
    }

    /// Writes a line at the cursor (padding with blanks if the cursor is
    /// past the end) and advances.
    pub fn type_line(&mut self, text: &str) {
        let cursor = self.cursor();
        while self.lines.len() < cursor {
            self.lines.push(String::new());
        }
        self.lines[cursor - 1] = text.to_owned();
        self.cursor = cursor + 1;
    }

    /// Inserts a blank line before `number` and moves the cursor there.
    /// Returns `false` for line number 0.
    pub fn insert_line(&mut self, number: usize) -> bool {
        if number == 0 {
            return false;
        }
        let at = (number - 1).min(self.lines.len());
        self.lines.insert(at, String::new());
        self.cursor = number;
        true
    }

    /// Removes line `number`, pulling the cursor back if it sat below.
    pub fn remove_line(&mut self, number: usize) -> bool {
        if number == 0 || number > self.lines.len() {
            return false;
        }
        self.lines.remove(number - 1);
        if self.cursor > number {
            self.cursor -= 1;
        }
        true
    }

    /// Moves the cursor to the given 1-based line.
    pub fn move_cursor(&mut self, number: usize) -> bool {
        if number == 0 {
            return false;
        }
        self.cursor = number;
        true
    }

    /// 1-based line just past the last one, for "move to end".
    #[must_use]
    pub fn end_line(&self) -> usize {
        self.lines.len() + 1
    }

    /// Drops all lines and resets the cursor.
    pub fn clear(&mut self) {
        self.lines.clear();
        self.cursor = 1;
    }

    /// The session's source as one text blob.
    #[must_use]
    pub fn source(&self) -> String {
        self.lines.join("\n")
    }

    /// Assembles the current source.
    pub fn assemble(&self, table: &EffectTable) -> Result<Assembled, AsmError> {
        assemble(&self.source(), table)
    }

    /// Quick check: assembles and discards the program.
    pub fn check(&self, table: &EffectTable) -> Result<(), AsmError> {
        self.assemble(table).map(|_| ())
    }

    /// Assembles and renders the reconstructed control-flow tree.
    pub fn structured(&self, table: &EffectTable) -> Result<String, ReplError> {
        let assembled = self.assemble(table)?;
        let result = reconstruct_program(&assembled.program, table)?;
        let mut out = result.body().render(table);
        if let Reconstruction::Partial { resumed_at, .. } = result {
            out.push_str(&format!("\n(scan stopped at position {resumed_at})"));
        }
        Ok(out)
    }

    /// Assembles, optimizes to the fixed point, and renders the final
    /// listing plus a summary line.
    pub fn optimized(&self, table: &EffectTable) -> Result<String, ReplError> {
        let assembled = self.assemble(table)?;
        let mut program = assembled.program;
        let summary = Optimizer::new(&mut program, table, NoopTracer).run()?;
        let mut out = disassemble(&program, table);
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&format!(
            "fixed point after {} cycle(s), {} rewrite(s)",
            summary.cycles, summary.rewrites
        ));
        Ok(out)
    }

    /// Renders the source with each instruction line annotated by its
    /// disassembly, suitable for saving and for [`BuilderSession::load_listing`].
    pub fn save_listing(&self, table: &EffectTable) -> Result<String, AsmError> {
        let assembled = self.assemble(table)?;
        let mut out = String::new();
        for (index, line) in self.lines.iter().enumerate() {
            out.push_str(line);
            if let Some(position) = assembled.source_map.get(index).copied().flatten() {
                if let Some(annotation) = disassemble_at(&assembled.program, table, position) {
                    out.push_str(" # ");
                    out.push_str(&annotation);
                }
            }
            out.push('\n');
        }
        Ok(out)
    }

    /// Replaces the session with a saved listing, stripping ` # ` annotations
    /// and blank lines; the cursor lands past the last line.
    pub fn load_listing(&mut self, text: &str) {
        self.lines = text
            .lines()
            .filter_map(|line| {
                let line = match line.find(" # ") {
                    Some(at) => &line[..at],
                    None => line,
                };
                let line = line.trim_end();
                (!line.is_empty()).then(|| line.to_owned())
            })
            .collect();
        self.cursor = self.lines.len() + 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Op;

    #[test]
    fn test_typing_advances_cursor() {
        let mut session = BuilderSession::new();
        session.type_line("nop");
        session.type_line("return_value");
        assert_eq!(session.lines(), &["nop".to_owned(), "return_value".to_owned()]);
        assert_eq!(session.cursor(), 3);
    }

    #[test]
    fn test_insert_and_remove_adjust_cursor() {
        let mut session = BuilderSession::new();
        session.type_line("a");
        session.type_line("b");
        assert!(session.insert_line(2));
        assert_eq!(session.lines(), &["a".to_owned(), String::new(), "b".to_owned()]);
        assert_eq!(session.cursor(), 2);

        session.move_cursor(3);
        assert!(session.remove_line(1));
        assert_eq!(session.cursor(), 2);
        assert!(!session.remove_line(9));
    }

    #[test]
    fn test_typing_past_end_pads() {
        let mut session = BuilderSession::new();
        session.move_cursor(3);
        session.type_line("nop");
        assert_eq!(session.lines(), &[String::new(), String::new(), "nop".to_owned()]);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let table = Op::table();
        let mut session = BuilderSession::new();
        session.type_line(".const 2");
        session.type_line("load_const 0");
        session.type_line("return_value");

        let listing = session.save_listing(&table).unwrap();
        assert!(listing.contains("load_const 0 # "));

        let mut restored = BuilderSession::new();
        restored.load_listing(&listing);
        assert_eq!(restored.lines(), session.lines());
        assert_eq!(restored.source(), session.source());
    }

    #[test]
    fn test_check_reports_assembly_error() {
        let table = Op::table();
        let mut session = BuilderSession::new();
        session.type_line("bogus");
        assert!(session.check(&table).is_err());
    }
}
