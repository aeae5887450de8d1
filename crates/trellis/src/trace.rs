//! Optimizer pass tracing.
//!
//! A trait-based observer with zero-cost default: every hook is a no-op, so
//! [`NoopTracer`] compiles away entirely under monomorphization. Concrete
//! implementations collect different kinds of data:
//!
//! | Tracer | Purpose |
//! |--------|---------|
//! | [`NoopTracer`] | Zero-cost no-op (default) |
//! | [`StderrTracer`] | Human-readable rewrite narration to stderr |
//! | [`RecordingTracer`] | Full event capture for tests and post-mortem |

use crate::value::Const;

/// Rewrite event captured by [`RecordingTracer`].
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub enum PassEvent {
    /// A full analyze-and-rewrite cycle began.
    CycleStarted {
        /// 1-based cycle number.
        cycle: u32,
    },
    /// A single-store local's reads were replaced with a constant load.
    Substituted {
        /// Local index at the time of the rewrite.
        local: u8,
        /// The local's name.
        name: String,
        /// Pool slot the reads now load.
        slot: u8,
        /// Number of reads replaced.
        reads: usize,
    },
    /// An operator over constant operands was folded.
    Folded {
        /// Operator mnemonic.
        op: String,
        /// The computed value.
        value: Const,
        /// Pool slot holding the value.
        slot: u8,
    },
    /// A fold was declined because the result is not representable.
    FoldDeclined {
        /// Operator mnemonic.
        op: String,
        /// Position of the operator instruction.
        position: usize,
    },
    /// An unreferenced local was removed.
    LocalRemoved {
        /// Index the local held before removal.
        index: u8,
        /// The local's name.
        name: String,
    },
    /// An unreferenced constant was removed.
    ConstRemoved {
        /// Slot the constant held before removal.
        index: u8,
        /// The removed value.
        value: Const,
    },
}

/// Observer for optimizer rewrites.
///
/// All methods default to no-ops; implementations override only the hooks
/// they care about. The optimizer carries the tracer as a type parameter, so
/// unused hooks cost nothing.
pub trait PassTracer: std::fmt::Debug {
    /// Called at the top of each analyze-and-rewrite cycle.
    fn on_cycle(&mut self, _cycle: u32) {}

    /// Called after a single-use local's reads were replaced.
    fn on_substitute(&mut self, _local: u8, _name: &str, _slot: u8, _reads: usize) {}

    /// Called after an operator was folded into a constant load.
    fn on_fold(&mut self, _op: &str, _value: &Const, _slot: u8) {}

    /// Called when a fold candidate's result is not representable.
    fn on_fold_declined(&mut self, _op: &str, _position: usize) {}

    /// Called after an unreferenced local was removed.
    fn on_local_removed(&mut self, _index: u8, _name: &str) {}

    /// Called after an unreferenced constant was removed.
    fn on_const_removed(&mut self, _index: u8, _value: &Const) {}
}

/// Zero-cost tracer; every hook compiles to nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl PassTracer for NoopTracer {}

/// Narrates each rewrite to stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct StderrTracer;

impl PassTracer for StderrTracer {
    fn on_substitute(&mut self, local: u8, name: &str, slot: u8, reads: usize) {
        eprintln!("local #{local} `{name}` is stored once; {reads} read(s) replaced with constant #{slot}");
    }

    fn on_fold(&mut self, op: &str, value: &Const, slot: u8) {
        eprintln!("{op} has a static result; folded to {value} (constant #{slot})");
    }

    fn on_fold_declined(&mut self, op: &str, position: usize) {
        eprintln!("{op} at position {position} has no representable result; left as-is");
    }

    fn on_local_removed(&mut self, index: u8, name: &str) {
        eprintln!("local #{index} `{name}` is unreferenced; removed");
    }

    fn on_const_removed(&mut self, index: u8, value: &Const) {
        eprintln!("constant #{index} ({value}) is unreferenced; removed");
    }
}

/// Captures every event for inspection after the run.
#[derive(Debug, Clone, Default)]
pub struct RecordingTracer {
    events: Vec<PassEvent>,
}

impl RecordingTracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Events in the order they were emitted.
    #[must_use]
    pub fn events(&self) -> &[PassEvent] {
        &self.events
    }
}

impl PassTracer for RecordingTracer {
    fn on_cycle(&mut self, cycle: u32) {
        self.events.push(PassEvent::CycleStarted { cycle });
    }

    fn on_substitute(&mut self, local: u8, name: &str, slot: u8, reads: usize) {
        self.events.push(PassEvent::Substituted {
            local,
            name: name.to_owned(),
            slot,
            reads,
        });
    }

    fn on_fold(&mut self, op: &str, value: &Const, slot: u8) {
        self.events.push(PassEvent::Folded {
            op: op.to_owned(),
            value: value.clone(),
            slot,
        });
    }

    fn on_fold_declined(&mut self, op: &str, position: usize) {
        self.events.push(PassEvent::FoldDeclined {
            op: op.to_owned(),
            position,
        });
    }

    fn on_local_removed(&mut self, index: u8, name: &str) {
        self.events.push(PassEvent::LocalRemoved {
            index,
            name: name.to_owned(),
        });
    }

    fn on_const_removed(&mut self, index: u8, value: &Const) {
        self.events.push(PassEvent::ConstRemoved {
            index,
            value: value.clone(),
        });
    }
}

/// Forwarding impl so callers can pass `&mut tracer` and keep ownership.
impl<T: PassTracer + ?Sized> PassTracer for &mut T {
    fn on_cycle(&mut self, cycle: u32) {
        (**self).on_cycle(cycle);
    }

    fn on_substitute(&mut self, local: u8, name: &str, slot: u8, reads: usize) {
        (**self).on_substitute(local, name, slot, reads);
    }

    fn on_fold(&mut self, op: &str, value: &Const, slot: u8) {
        (**self).on_fold(op, value, slot);
    }

    fn on_fold_declined(&mut self, op: &str, position: usize) {
        (**self).on_fold_declined(op, position);
    }

    fn on_local_removed(&mut self, index: u8, name: &str) {
        (**self).on_local_removed(index, name);
    }

    fn on_const_removed(&mut self, index: u8, value: &Const) {
        (**self).on_const_removed(index, value);
    }
}
