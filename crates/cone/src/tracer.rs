//! Pass tracing infrastructure.
//!
//! A trait-based hook system for observing the semantic pipeline without
//! wiring a logger through every pass. The default [`NoopTracer`] does
//! nothing; [`StderrTracer`] prints a human-readable account of pass
//! progress; [`RecordingTracer`] captures events for assertions in tests or
//! post-mortem inspection.

use crate::{
    intern::NameId,
    node::{ConvKind, NodeId, Span},
};

/// Which pass an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::IntoStaticStr)]
pub enum PassKind {
    NameResolution,
    TypeCheck,
    Flow,
}

/// One observed pipeline event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    PassBegin(PassKind),
    PassEnd(PassKind),
    /// A name use was bound to its declaration.
    NameResolved { name: NameId, dcl: NodeId },
    /// A coercion inserted an explicit conversion node.
    Coercion { kind: ConvKind, at: Span },
    /// A vtable was synthesized for (trait, struct).
    VtableBuilt { trait_dcl: NodeId, struct_dcl: NodeId, methods: usize },
}

/// Hook points called by the passes. All methods default to no-ops so
/// implementations opt into the events they care about.
pub trait PassTracer {
    fn pass_begin(&mut self, _pass: PassKind) {}
    fn pass_end(&mut self, _pass: PassKind) {}
    fn name_resolved(&mut self, _name: NameId, _dcl: NodeId) {}
    fn coercion(&mut self, _kind: ConvKind, _at: Span) {}
    fn vtable_built(&mut self, _trait_dcl: NodeId, _struct_dcl: NodeId, _methods: usize) {}
}

/// The production default: every hook is a no-op.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl PassTracer for NoopTracer {}

/// Prints a human-readable account of pipeline progress to stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct StderrTracer;

impl PassTracer for StderrTracer {
    fn pass_begin(&mut self, pass: PassKind) {
        eprintln!("== {pass} begin");
    }

    fn pass_end(&mut self, pass: PassKind) {
        eprintln!("== {pass} end");
    }

    fn coercion(&mut self, kind: ConvKind, at: Span) {
        eprintln!("   coerce {kind} at {}..{}", at.start, at.end);
    }

    fn vtable_built(&mut self, trait_dcl: NodeId, struct_dcl: NodeId, methods: usize) {
        eprintln!("   vtable trait#{} struct#{} ({methods} methods)", trait_dcl.index(), struct_dcl.index());
    }
}

/// Records every event for later inspection.
#[derive(Debug, Default)]
pub struct RecordingTracer {
    pub events: Vec<TraceEvent>,
}

impl RecordingTracer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PassTracer for RecordingTracer {
    fn pass_begin(&mut self, pass: PassKind) {
        self.events.push(TraceEvent::PassBegin(pass));
    }

    fn pass_end(&mut self, pass: PassKind) {
        self.events.push(TraceEvent::PassEnd(pass));
    }

    fn name_resolved(&mut self, name: NameId, dcl: NodeId) {
        self.events.push(TraceEvent::NameResolved { name, dcl });
    }

    fn coercion(&mut self, kind: ConvKind, at: Span) {
        self.events.push(TraceEvent::Coercion { kind, at });
    }

    fn vtable_built(&mut self, trait_dcl: NodeId, struct_dcl: NodeId, methods: usize) {
        self.events.push(TraceEvent::VtableBuilt { trait_dcl, struct_dcl, methods });
    }
}
