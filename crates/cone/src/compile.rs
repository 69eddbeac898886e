//! The pass pipeline driver.
//!
//! Runs name resolution, then type checking (which embeds the per-function
//! flow pass), then a postcondition sweep over the annotated graph before it
//! is handed to the backend. Passes that depend on earlier soundness are
//! skipped once any error is recorded; no partially-annotated IR ever reaches
//! the backend.

use ahash::AHashSet;

use crate::{
    context::CompileContext,
    errors::CompileFailure,
    nameres::name_resolve,
    node::{NodeId, NodeKind},
    typecheck::type_check,
};

/// Runs the full semantic pipeline over a program.
///
/// On success the IR satisfies the backend contract: every expression typed,
/// every name bound, every control transfer carrying its dealias list, every
/// virtual-reference coercion site backed by a vtable. On failure returns
/// every diagnostic collected.
pub fn compile(ctx: &mut CompileContext, program: NodeId) -> Result<(), CompileFailure> {
    name_resolve(ctx, program);
    if !ctx.errors.has_errors() {
        type_check(ctx, program);
    }
    if !ctx.errors.has_errors() {
        sweep_postconditions(ctx, program);
    }

    if ctx.errors.has_errors() {
        Err(CompileFailure { diagnostics: ctx.errors.diagnostics().to_vec() })
    } else {
        Ok(())
    }
}

/// Verifies the backend-facing invariants on the reachable graph: no
/// ambiguous name uses survive and every expression carries a type. Generic
/// declarations are exempt; they are not checked until instantiated.
fn sweep_postconditions(ctx: &mut CompileContext, program: NodeId) {
    let mut seen = AHashSet::new();
    sweep_node(ctx, &mut seen, program);
}

fn sweep_node(ctx: &mut CompileContext, seen: &mut AHashSet<NodeId>, id: NodeId) {
    if !seen.insert(id) {
        return;
    }
    let kind = ctx.arena[id].kind.clone();
    match &kind {
        NodeKind::NameUse { .. } => {
            ctx.internal_error(id, "unresolved name survived the pipeline");
            return;
        }
        NodeKind::FnDcl { generic: Some(_), .. } => return,
        // The `_` placeholder has no type of its own.
        NodeKind::VarNameUse { name, .. } if *name == ctx.interner.anon() => return,
        _ => {}
    }
    if kind.is_exp() && ctx.arena[id].vtype == NodeId::UNKNOWN {
        ctx.internal_error(id, "expression left untyped by the pipeline");
    }

    match kind {
        NodeKind::Program { modules } => {
            for m in modules {
                sweep_node(ctx, seen, m);
            }
        }
        NodeKind::Module { nodes, .. } => {
            for n in nodes {
                sweep_node(ctx, seen, n);
            }
        }
        NodeKind::Struct { fields, methods, .. } => {
            for f in fields {
                sweep_node(ctx, seen, f);
            }
            for m in methods {
                sweep_node(ctx, seen, m);
            }
        }
        NodeKind::FnDcl { body, .. } => {
            if let Some(body) = body {
                sweep_node(ctx, seen, body);
            }
        }
        NodeKind::VarDcl { value, .. } => {
            if let Some(value) = value {
                sweep_node(ctx, seen, value);
            }
        }
        NodeKind::ConstDcl { value, .. } => sweep_node(ctx, seen, value),
        NodeKind::Block { stmts } => {
            for s in stmts {
                sweep_node(ctx, seen, s);
            }
        }
        NodeKind::Loop { body, .. } => sweep_node(ctx, seen, body),
        NodeKind::Assign { lval, rval } => {
            sweep_node(ctx, seen, lval);
            sweep_node(ctx, seen, rval);
        }
        NodeKind::FnCall { callee, args } => {
            sweep_node(ctx, seen, callee);
            for a in args {
                sweep_node(ctx, seen, a);
            }
        }
        NodeKind::Return { exp, .. } => sweep_node(ctx, seen, exp),
        NodeKind::Break { exp, .. } => {
            if let Some(exp) = exp {
                sweep_node(ctx, seen, exp);
            }
        }
        NodeKind::FldAccess { obj, .. } => sweep_node(ctx, seen, obj),
        NodeKind::Deref { exp } | NodeKind::Convert { exp, .. } => sweep_node(ctx, seen, exp),
        NodeKind::Element { exp, index } => {
            sweep_node(ctx, seen, exp);
            sweep_node(ctx, seen, index);
        }
        NodeKind::Borrow { exp, .. } | NodeKind::Allocate { exp, .. } => sweep_node(ctx, seen, exp),
        NodeKind::VTuple { elems } => {
            for e in elems {
                sweep_node(ctx, seen, e);
            }
        }
        NodeKind::ArrayLit { dimens, elems } => {
            for d in dimens {
                sweep_node(ctx, seen, d);
            }
            for e in elems {
                sweep_node(ctx, seen, e);
            }
        }
        _ => {}
    }
}
