#![doc = include_str!("../../../README.md")]

mod compile;
mod context;
mod corelib;
mod errors;
mod flow;
mod genclone;
mod intern;
mod itype;
mod nameres;
mod nametbl;
mod node;
mod options;
mod permission;
mod refmatch;
mod tracer;
mod typecheck;
mod typetbl;
mod vtable;

pub use crate::{
    compile::compile,
    context::CompileContext,
    corelib::CoreLib,
    errors::{CompileFailure, Diagnostic, ErrorKind, ErrorSink},
    genclone::instantiate_fn,
    intern::{Interner, NameId},
    itype::{
        SubtypeConstraint, TypeCompare, itype_find_super, itype_get_deref_type_dcl, itype_get_type_dcl, itype_hash,
        itype_is_concrete, itype_is_move, itype_is_run_same, itype_is_same, itype_is_zero_size, itype_matches,
    },
    nameres::name_resolve,
    nametbl::NameTable,
    node::{ConvKind, FlowFlags, Node, NodeArena, NodeFlags, NodeId, NodeKind, RefType, Span},
    options::ConeOptions,
    permission::{PermAttrs, PermKind, perm_borrowable, perm_matches},
    tracer::{NoopTracer, PassKind, PassTracer, RecordingTracer, StderrTracer, TraceEvent},
    typecheck::type_check,
    typetbl::TypeTable,
    vtable::Vtable,
};
