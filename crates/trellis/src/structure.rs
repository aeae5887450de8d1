//! Structured tree nodes produced by control-flow reconstruction.
//!
//! The node set is closed: a [`Body`] nests segments, conditionals, and
//! loops, and nothing else. Reading a tree's instructions in tree order
//! (conditional, omitted jump, then bodies in display order) reproduces the
//! flat range the tree was built from — no instruction is duplicated or
//! dropped.

use crate::{effects::EffectTable, instr::Instruction};

/// A maximal straight-line run of instructions with no internal control
/// transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// The run's instructions in stream order.
    pub instructions: Vec<Instruction>,
}

/// Ordered sequence of structured nodes; the unit of nesting.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Body {
    /// Child nodes in stream order.
    pub content: Vec<Node>,
}

/// A structured node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Segment(Segment),
    If(If),
    Branch(Branch),
    While(Loop),
    For(Loop),
}

/// One-armed conditional: the body runs when the condition matches the
/// polarity, otherwise control skips past it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct If {
    /// Instructions computing the condition.
    pub conditional: Segment,
    /// Body executed when the condition matches `if_true`.
    pub exec: Body,
    /// The conditional-skip instruction lifted out of the stream.
    pub omitted: Instruction,
    /// `true` when the body runs on a true condition.
    pub if_true: bool,
}

/// Two-armed conditional.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Branch {
    /// Instructions computing the condition.
    pub conditional: Segment,
    /// Arm executed on a true condition.
    pub true_body: Body,
    /// Arm executed on a false condition.
    pub false_body: Body,
    /// The conditional-skip instruction lifted out of the stream.
    pub omitted: Instruction,
    /// `true` when the true arm physically precedes the false arm.
    pub true_first: bool,
}

/// Loop node shared by `while` and `for`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Loop {
    /// Condition (or iterable-producing) instructions.
    pub conditional: Segment,
    /// The loop body, including the jump that closes the loop.
    pub body: Body,
    /// The governing conditional-skip or iterator-advance instruction.
    pub omitted: Instruction,
}

impl Segment {
    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    fn render(&self, table: &EffectTable, indent: usize, out: &mut String) {
        if self.instructions.is_empty() {
            push_line(out, indent, "Empty Segment");
            return;
        }
        for instr in &self.instructions {
            push_line(out, indent, &instr.render(table));
        }
    }
}

impl Body {
    /// Number of instructions reachable from this body.
    #[must_use]
    pub fn instruction_count(&self) -> usize {
        self.content.iter().map(Node::instruction_count).sum()
    }

    /// Appends every reachable instruction in tree order.
    pub fn flatten_into(&self, out: &mut Vec<Instruction>) {
        for node in &self.content {
            node.flatten_into(out);
        }
    }

    /// All reachable instructions in tree order.
    #[must_use]
    pub fn flatten(&self) -> Vec<Instruction> {
        let mut out = Vec::with_capacity(self.instruction_count());
        self.flatten_into(&mut out);
        out
    }

    /// The physically last instruction reachable from this body.
    #[must_use]
    pub fn last_instruction(&self) -> Option<Instruction> {
        self.content.iter().rev().find_map(Node::last_instruction)
    }

    /// Canonical indented text form, for verification and debugging — not
    /// for further parsing.
    #[must_use]
    pub fn render(&self, table: &EffectTable) -> String {
        let mut out = String::new();
        self.render_at(table, 0, &mut out);
        out.trim_end_matches('\n').to_owned()
    }

    fn render_at(&self, table: &EffectTable, indent: usize, out: &mut String) {
        if self.content.is_empty() {
            push_line(out, indent, "Empty Body");
            return;
        }
        for node in &self.content {
            node.render_at(table, indent, out);
        }
    }
}

impl Node {
    #[must_use]
    pub fn instruction_count(&self) -> usize {
        match self {
            Self::Segment(seg) => seg.len(),
            Self::If(node) => node.conditional.len() + 1 + node.exec.instruction_count(),
            Self::Branch(node) => {
                node.conditional.len()
                    + 1
                    + node.true_body.instruction_count()
                    + node.false_body.instruction_count()
            }
            Self::While(node) | Self::For(node) => {
                node.conditional.len() + 1 + node.body.instruction_count()
            }
        }
    }

    fn flatten_into(&self, out: &mut Vec<Instruction>) {
        match self {
            Self::Segment(seg) => out.extend_from_slice(&seg.instructions),
            Self::If(node) => {
                out.extend_from_slice(&node.conditional.instructions);
                out.push(node.omitted);
                node.exec.flatten_into(out);
            }
            Self::Branch(node) => {
                out.extend_from_slice(&node.conditional.instructions);
                out.push(node.omitted);
                let (first, second) = if node.true_first {
                    (&node.true_body, &node.false_body)
                } else {
                    (&node.false_body, &node.true_body)
                };
                first.flatten_into(out);
                second.flatten_into(out);
            }
            Self::While(node) | Self::For(node) => {
                out.extend_from_slice(&node.conditional.instructions);
                out.push(node.omitted);
                node.body.flatten_into(out);
            }
        }
    }

    fn last_instruction(&self) -> Option<Instruction> {
        match self {
            Self::Segment(seg) => seg.instructions.last().copied(),
            Self::If(node) => node.exec.last_instruction().or(Some(node.omitted)),
            Self::Branch(node) => {
                let (first, second) = if node.true_first {
                    (&node.true_body, &node.false_body)
                } else {
                    (&node.false_body, &node.true_body)
                };
                second
                    .last_instruction()
                    .or_else(|| first.last_instruction())
                    .or(Some(node.omitted))
            }
            Self::While(node) | Self::For(node) => node.body.last_instruction().or(Some(node.omitted)),
        }
    }

    fn render_at(&self, table: &EffectTable, indent: usize, out: &mut String) {
        match self {
            Self::Segment(seg) => seg.render(table, indent, out),
            Self::If(node) => {
                push_line(out, indent, "Conditional->");
                node.conditional.render(table, indent + 1, out);
                push_line(out, indent + 1, &node.omitted.render(table));
                push_line(out, indent, if node.if_true { "If True->" } else { "If False->" });
                node.exec.render_at(table, indent + 1, out);
            }
            Self::Branch(node) => {
                push_line(out, indent, "Conditional->");
                node.conditional.render(table, indent + 1, out);
                push_line(out, indent + 1, &node.omitted.render(table));
                if node.true_first {
                    push_line(out, indent, "True Branch->");
                    node.true_body.render_at(table, indent + 1, out);
                    push_line(out, indent, "False Branch->");
                    node.false_body.render_at(table, indent + 1, out);
                } else {
                    push_line(out, indent, "False Branch->");
                    node.false_body.render_at(table, indent + 1, out);
                    push_line(out, indent, "True Branch->");
                    node.true_body.render_at(table, indent + 1, out);
                }
            }
            Self::While(node) => {
                push_line(out, indent, "Conditional->");
                node.conditional.render(table, indent + 1, out);
                push_line(out, indent, &format!("While->\t{}", node.omitted.render(table)));
                node.body.render_at(table, indent + 1, out);
            }
            Self::For(node) => {
                push_line(out, indent, "Conditional->");
                node.conditional.render(table, indent + 1, out);
                push_line(out, indent, &format!("Loop->\t{}", node.omitted.render(table)));
                node.body.render_at(table, indent + 1, out);
            }
        }
    }
}

fn push_line(out: &mut String, indent: usize, line: &str) {
    for _ in 0..indent {
        out.push('\t');
    }
    out.push_str(line);
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dialect::Op,
        instr::{ConstPool, LocalTable, Program},
    };

    fn instrs(code: &[u8]) -> Vec<Instruction> {
        Program::decode(code, ConstPool::default(), LocalTable::default())
            .unwrap()
            .instructions()
            .to_vec()
    }

    #[test]
    fn test_empty_body_renders_placeholder() {
        let table = Op::table();
        assert_eq!(Body::default().render(&table), "Empty Body");
    }

    #[test]
    fn test_if_flatten_order() {
        let all = instrs(&[
            Op::LoadLocal as u8, 0,
            Op::JumpIfFalse as u8, 4,
            Op::LoadConst as u8, 0,
            Op::Pop as u8, 0,
        ]);
        let node = Node::If(If {
            conditional: Segment {
                instructions: vec![all[0]],
            },
            exec: Body {
                content: vec![Node::Segment(Segment {
                    instructions: vec![all[2], all[3]],
                })],
            },
            omitted: all[1],
            if_true: true,
        });
        let body = Body { content: vec![node] };
        assert_eq!(body.flatten(), all);
        assert_eq!(body.instruction_count(), 4);
        assert_eq!(body.last_instruction(), Some(all[3]));
    }

    #[test]
    fn test_segment_render_lists_instructions() {
        let table = Op::table();
        let all = instrs(&[Op::LoadConst as u8, 0, Op::ReturnValue as u8, 0]);
        let body = Body {
            content: vec![Node::Segment(Segment { instructions: all })],
        };
        let rendered = body.render(&table);
        assert!(rendered.contains("load_const"));
        assert!(rendered.contains("return_value"));
    }
}
