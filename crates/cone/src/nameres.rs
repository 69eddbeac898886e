//! Name resolution.
//!
//! Binds every identifier use to its declaration. The pass walks each module
//! twice: first it pre-hooks all named top-level declarations (and resolves
//! declared variable types and permissions) so forward references work, then
//! it walks every declaration in full. Ambiguous `NameUse` nodes are
//! rewritten in place to `VarNameUse`/`TypeNameUse` with a direct link to the
//! declaration; an unresolved name is an error for that site but does not
//! abort the pass.
//!
//! Hook discipline: every frame pushed here is popped on every exit path,
//! including early error returns, so the table is balanced at pass end.

use crate::{
    context::CompileContext,
    errors::ErrorKind,
    node::{NodeId, NodeKind},
    tracer::PassKind,
};

/// Walk state: the current lexical scope depth. Module level is 0, function
/// bodies start at 1, each nested block adds one.
pub(crate) struct NameResState {
    scope: u16,
}

/// Resolves every name in the program.
pub fn name_resolve(ctx: &mut CompileContext, program: NodeId) {
    ctx.tracer.pass_begin(PassKind::NameResolution);
    let depth = ctx.nametbl.depth();

    let modules = match &ctx.arena[program].kind {
        NodeKind::Program { modules } => modules.clone(),
        NodeKind::Module { .. } => vec![program],
        _ => {
            ctx.internal_error(program, "name resolution expects a program or module");
            ctx.tracer.pass_end(PassKind::NameResolution);
            return;
        }
    };
    let mut state = NameResState { scope: 0 };
    for module in modules {
        resolve_module(ctx, &mut state, module);
    }

    debug_assert_eq!(ctx.nametbl.depth(), depth, "hook stack must balance across name resolution");
    ctx.tracer.pass_end(PassKind::NameResolution);
}

/// True for declaration kinds that bind a module-level name.
fn is_hookable_dcl(kind: &NodeKind) -> bool {
    matches!(
        kind,
        NodeKind::VarDcl { .. }
            | NodeKind::ConstDcl { .. }
            | NodeKind::FnDcl { .. }
            | NodeKind::Struct { .. }
            | NodeKind::Typedef { .. }
            | NodeKind::UintNbr { .. }
            | NodeKind::IntNbr { .. }
            | NodeKind::FloatNbr { .. }
            | NodeKind::Perm { .. }
    )
}

fn hook_module_exports(ctx: &mut CompileContext, module: NodeId) {
    let NodeKind::Module { nodes, .. } = &ctx.arena[module].kind else { return };
    let nodes = nodes.clone();
    for dcl in nodes {
        if is_hookable_dcl(&ctx.arena[dcl].kind)
            && let Some(name) = ctx.arena[dcl].kind.dcl_name()
        {
            ctx.nametbl.hook_node(name, dcl);
        }
    }
}

fn resolve_module(ctx: &mut CompileContext, state: &mut NameResState, module: NodeId) {
    let NodeKind::Module { nodes, .. } = &ctx.arena[module].kind else {
        ctx.internal_error(module, "expected a module node");
        return;
    };
    let nodes = nodes.clone();

    // Frame 1: the core library's exports, auto-imported for every module
    // except core itself, plus folded imports.
    ctx.nametbl.hook_push();
    if module != ctx.core.core_module {
        let exports = ctx.core.exports(&ctx.arena, &mut ctx.interner);
        for (name, dcl) in exports {
            ctx.nametbl.hook_node(name, dcl);
        }
    }
    for &n in &nodes {
        if let NodeKind::Import { module: imported, fold_all } = ctx.arena[n].kind {
            if fold_all {
                hook_module_exports(ctx, imported);
            } else if let Some(name) = ctx.arena[imported].kind.dcl_name() {
                ctx.nametbl.hook_node(name, imported);
            }
        }
    }

    // Frame 2: this module's own declarations, pre-hooked so bodies can refer
    // forward. A name bound twice in this frame is a duplicate.
    ctx.nametbl.hook_push();
    for &dcl in &nodes {
        if is_hookable_dcl(&ctx.arena[dcl].kind)
            && let Some(name) = ctx.arena[dcl].kind.dcl_name()
        {
            if ctx.nametbl.bound_in_current_frame(name) {
                let shown = ctx.interner.name(name).to_owned();
                ctx.error_msg_node(dcl, ErrorKind::DupName, format!("Name `{shown}` is already declared in this module"));
            }
            ctx.nametbl.hook_node(name, dcl);
        }
    }

    // Resolve declared types and permissions before any body, so type-level
    // forward references within the module work.
    for &dcl in &nodes {
        match ctx.arena[dcl].kind {
            NodeKind::VarDcl { perm, .. } => {
                resolve_node(ctx, state, perm);
                let vtype = ctx.arena[dcl].vtype;
                resolve_node(ctx, state, vtype);
            }
            NodeKind::ConstDcl { .. } => {
                let vtype = ctx.arena[dcl].vtype;
                resolve_node(ctx, state, vtype);
            }
            _ => {}
        }
    }

    if !ctx.errors.has_errors() {
        for &n in &nodes {
            resolve_node(ctx, state, n);
        }
    }

    ctx.nametbl.hook_pop();
    ctx.nametbl.hook_pop();
}

/// Rewrites a `NameUse` to its resolved form, based on the declaration kind.
fn resolve_name_use(ctx: &mut CompileContext, id: NodeId) {
    let NodeKind::NameUse { name } = ctx.arena[id].kind else { return };
    // `_` is not a declared name; it resolves to itself as a placeholder.
    if name == ctx.interner.anon() {
        ctx.arena[id].kind = NodeKind::VarNameUse { name, dcl: id };
        return;
    }
    let Some(dcl) = ctx.nametbl.find(name) else {
        let shown = ctx.interner.name(name).to_owned();
        ctx.error_msg_node(id, ErrorKind::UnkName, format!("The name `{shown}` does not refer to a declared name"));
        return;
    };
    let is_type = matches!(
        ctx.arena[dcl].kind,
        NodeKind::Struct { .. }
            | NodeKind::Typedef { .. }
            | NodeKind::UintNbr { .. }
            | NodeKind::IntNbr { .. }
            | NodeKind::FloatNbr { .. }
            | NodeKind::Perm { .. }
            | NodeKind::GenericParam { .. }
            | NodeKind::BorrowRegion
    );
    ctx.arena[id].kind = if is_type {
        NodeKind::TypeNameUse { name, dcl }
    } else {
        NodeKind::VarNameUse { name, dcl }
    };
    ctx.tracer.name_resolved(name, dcl);
}

fn resolve_opt(ctx: &mut CompileContext, state: &mut NameResState, id: Option<NodeId>) {
    if let Some(id) = id {
        resolve_node(ctx, state, id);
    }
}

fn resolve_block(ctx: &mut CompileContext, state: &mut NameResState, stmts: &[NodeId]) {
    ctx.nametbl.hook_push();
    state.scope += 1;
    for &stmt in stmts {
        resolve_node(ctx, state, stmt);
        // A local declaration becomes visible to the statements after it.
        if let NodeKind::VarDcl { name, .. } | NodeKind::ConstDcl { name, .. } = ctx.arena[stmt].kind {
            ctx.nametbl.hook_node(name, stmt);
        }
    }
    state.scope -= 1;
    ctx.nametbl.hook_pop();
}

fn fn_dcl_resolve(ctx: &mut CompileContext, state: &mut NameResState, id: NodeId) {
    let NodeKind::FnDcl { generic, body, .. } = &ctx.arena[id].kind else { return };
    let generic_parms = generic.as_ref().map(|g| g.parms.clone()).unwrap_or_default();
    let body = *body;
    let sig = ctx.arena[id].vtype;

    // Generic parameters shadow outer names across the whole signature+body.
    ctx.nametbl.hook_push();
    for &parm in &generic_parms {
        if let Some(name) = ctx.arena[parm].kind.dcl_name() {
            ctx.nametbl.hook_node(name, parm);
        }
    }
    resolve_node(ctx, state, sig);

    if let Some(body) = body {
        let saved = state.scope;
        state.scope = 1;

        // Parameters resolve like scope-1 locals throughout the body.
        ctx.nametbl.hook_push();
        let parms = match &ctx.arena[sig].kind {
            NodeKind::FnSig { parms, .. } => parms.clone(),
            _ => Vec::new(),
        };
        for parm in parms {
            let name = match &mut ctx.arena[parm].kind {
                NodeKind::VarDcl { name, scope, .. } => {
                    *scope = 1;
                    Some(*name)
                }
                _ => None,
            };
            if let Some(name) = name {
                ctx.nametbl.hook_node(name, parm);
            }
        }
        resolve_node(ctx, state, body);
        ctx.nametbl.hook_pop();

        state.scope = saved;
    }
    ctx.nametbl.hook_pop();
}

/// Resolves one node and its children. Exhaustive over the node sum.
pub(crate) fn resolve_node(ctx: &mut CompileContext, state: &mut NameResState, id: NodeId) {
    match ctx.arena[id].kind.clone() {
        NodeKind::NameUse { .. } => resolve_name_use(ctx, id),

        // Already resolved (idempotent second run) or resolved elsewhere.
        NodeKind::VarNameUse { .. } | NodeKind::TypeNameUse { .. } | NodeKind::FieldNameUse { .. } => {}

        NodeKind::FldAccess { obj, .. } => resolve_node(ctx, state, obj),
        NodeKind::Deref { exp } => resolve_node(ctx, state, exp),
        NodeKind::Element { exp, index } => {
            resolve_node(ctx, state, exp);
            resolve_node(ctx, state, index);
        }
        NodeKind::Borrow { exp, perm } => {
            resolve_node(ctx, state, exp);
            resolve_node(ctx, state, perm);
        }
        NodeKind::Allocate { region, perm, exp } => {
            resolve_node(ctx, state, region);
            resolve_node(ctx, state, perm);
            resolve_node(ctx, state, exp);
        }
        NodeKind::Assign { lval, rval } => {
            resolve_node(ctx, state, lval);
            resolve_node(ctx, state, rval);
        }
        NodeKind::FnCall { callee, args } => {
            // A method-call callee stays a FieldNameUse for the type checker;
            // everything else resolves lexically.
            resolve_node(ctx, state, callee);
            for arg in args {
                resolve_node(ctx, state, arg);
            }
        }
        NodeKind::Convert { exp, .. } => resolve_node(ctx, state, exp),
        NodeKind::Block { stmts } => resolve_block(ctx, state, &stmts),
        NodeKind::Return { exp, .. } => resolve_node(ctx, state, exp),
        NodeKind::Break { life, exp, .. } => {
            resolve_opt(ctx, state, life);
            resolve_opt(ctx, state, exp);
        }
        NodeKind::Continue { life, .. } => resolve_opt(ctx, state, life),
        NodeKind::Loop { body, life, .. } => {
            ctx.nametbl.hook_push();
            if let Some(life) = life
                && let Some(name) = ctx.arena[life].kind.dcl_name()
            {
                ctx.nametbl.hook_node(name, life);
            }
            resolve_node(ctx, state, body);
            ctx.nametbl.hook_pop();
        }
        NodeKind::VTuple { elems } => {
            for elem in elems {
                resolve_node(ctx, state, elem);
            }
        }
        NodeKind::ArrayLit { dimens, elems } => {
            for d in dimens {
                resolve_node(ctx, state, d);
            }
            for e in elems {
                resolve_node(ctx, state, e);
            }
        }

        NodeKind::VarDcl { perm, value, .. } => {
            resolve_node(ctx, state, perm);
            let vtype = ctx.arena[id].vtype;
            resolve_node(ctx, state, vtype);
            resolve_opt(ctx, state, value);
            if let NodeKind::VarDcl { scope, .. } = &mut ctx.arena[id].kind {
                *scope = state.scope;
            }
        }
        NodeKind::ConstDcl { value, .. } => {
            let vtype = ctx.arena[id].vtype;
            resolve_node(ctx, state, vtype);
            resolve_node(ctx, state, value);
        }
        NodeKind::FnDcl { .. } => fn_dcl_resolve(ctx, state, id),
        NodeKind::FieldDcl { .. } => {
            let vtype = ctx.arena[id].vtype;
            resolve_node(ctx, state, vtype);
        }
        NodeKind::Typedef { typeval, .. } => resolve_node(ctx, state, typeval),
        NodeKind::GenericParam { .. } | NodeKind::LifetimeDcl { .. } => {}
        NodeKind::Module { .. } => resolve_module(ctx, state, id),
        NodeKind::Program { modules } => {
            for module in modules {
                resolve_node(ctx, state, module);
            }
        }
        NodeKind::Import { .. } => {}

        NodeKind::Struct { fields, methods, base, .. } => {
            resolve_opt(ctx, state, base);
            for field in fields {
                resolve_node(ctx, state, field);
            }
            for method in methods {
                fn_dcl_resolve(ctx, state, method);
            }
        }
        NodeKind::FnSig { parms, rettype } => {
            for parm in parms {
                resolve_node(ctx, state, parm);
            }
            resolve_node(ctx, state, rettype);
        }
        NodeKind::TTuple { types } => {
            for t in types {
                resolve_node(ctx, state, t);
            }
        }
        NodeKind::ArrayType { elem, .. } => resolve_node(ctx, state, elem),
        NodeKind::Ref(r) | NodeKind::ArrayRef(r) => {
            resolve_node(ctx, state, r.region);
            resolve_node(ctx, state, r.perm);
            resolve_node(ctx, state, r.vtexp);
            // `&expr` parses as a reference whose referent turns out to be a
            // value: it is really a borrow (or an allocation) constructor.
            if !ctx.arena[crate::itype::itype_get_type_dcl(&ctx.arena, r.vtexp)].kind.is_type() {
                let kind = if crate::itype::itype_get_type_dcl(&ctx.arena, r.region) == NodeId::BORROW {
                    NodeKind::Borrow { exp: r.vtexp, perm: r.perm }
                } else {
                    NodeKind::Allocate { region: r.region, perm: r.perm, exp: r.vtexp }
                };
                ctx.arena[id].kind = kind;
            }
        }
        NodeKind::VirtRef(r) => {
            resolve_node(ctx, state, r.region);
            resolve_node(ctx, state, r.perm);
            resolve_node(ctx, state, r.vtexp);
            if !ctx.arena[crate::itype::itype_get_type_dcl(&ctx.arena, r.vtexp)].kind.is_type() {
                ctx.error_msg_node(
                    id,
                    ErrorKind::BadTerm,
                    "May not borrow or allocate a virtual reference. Coerce from a regular ref.",
                );
            }
        }
        NodeKind::ArrayDeref(_) => {}
        NodeKind::Ptr { vtexp } => resolve_node(ctx, state, vtexp),

        // Literals and leaf types resolve to themselves.
        NodeKind::ULit { .. }
        | NodeKind::FLit { .. }
        | NodeKind::StringLit { .. }
        | NodeKind::NilLit
        | NodeKind::UintNbr { .. }
        | NodeKind::IntNbr { .. }
        | NodeKind::FloatNbr { .. }
        | NodeKind::Perm { .. }
        | NodeKind::BorrowRegion
        | NodeKind::Void
        | NodeKind::Unknown => {}
    }
}
