//! Data-flow analysis.
//!
//! Runs per function, immediately after its body type-checks and only while
//! the compilation is error free. Walks statements in order enforcing the
//! permission, initialization, move and borrow-lifetime rules, and populates
//! the `dealias` lists on `return`/`break`/`continue` so the code generator
//! can emit release sequences for owned references whose scope ends at the
//! transfer.
//!
//! Per-variable state lives in transient [`FlowFlags`] on the declaration
//! nodes and is cleared when the function's pass finishes.

use crate::{
    context::CompileContext,
    errors::ErrorKind,
    itype::{itype_get_type_dcl, itype_is_move},
    node::{DealiasList, FlowFlags, NodeId, NodeKind},
    permission::PermAttrs,
    refmatch,
    tracer::PassKind,
    typecheck::{iexp_is_anon, iexp_lval_info},
};

struct LoopFlow {
    loop_id: NodeId,
    /// Scope-frame depth at loop entry; a transfer out of the loop releases
    /// every frame deeper than this.
    depth: usize,
}

pub(crate) struct FlowState {
    /// Per-scope registries of initialized owned-reference variables,
    /// innermost last. Frame 0 is the parameter scope.
    scopes: Vec<Vec<NodeId>>,
    loops: Vec<LoopFlow>,
    /// Every variable whose transient flags were set, for clearing at exit.
    touched: Vec<NodeId>,
}

impl FlowState {
    fn set_flow(&mut self, ctx: &mut CompileContext, var: NodeId, set: FlowFlags, clear: FlowFlags) {
        if let NodeKind::VarDcl { flow, .. } = &mut ctx.arena[var].kind {
            flow.insert(set);
            flow.remove(clear);
        }
        self.touched.push(var);
    }

    fn flow_of(&self, ctx: &CompileContext, var: NodeId) -> FlowFlags {
        match &ctx.arena[var].kind {
            NodeKind::VarDcl { flow, .. } => *flow,
            _ => FlowFlags::NONE,
        }
    }

    /// Registers an initialized variable holding an owned reference in the
    /// current scope frame.
    fn register_owned(&mut self, ctx: &CompileContext, var: NodeId) {
        let vt = itype_get_type_dcl(&ctx.arena, ctx.arena[var].vtype);
        let owned = matches!(ctx.arena[vt].kind, NodeKind::Ref(_) | NodeKind::VirtRef(_) | NodeKind::ArrayRef(_))
            && refmatch::ref_parts(&ctx.arena, vt)
                .is_some_and(|r| itype_get_type_dcl(&ctx.arena, r.region) != NodeId::BORROW);
        if owned && let Some(frame) = self.scopes.last_mut() {
            if !frame.contains(&var) {
                frame.push(var);
            }
        }
    }

    /// Owned-reference variables from every frame deeper than `depth`,
    /// innermost first.
    fn dealias_from(&self, depth: usize) -> DealiasList {
        let mut list = DealiasList::new();
        for frame in self.scopes[depth..].iter().rev() {
            for &var in frame.iter().rev() {
                list.push(var);
            }
        }
        list
    }
}

/// Runs the flow pass over one function's body.
pub(crate) fn fn_flow(ctx: &mut CompileContext, fn_dcl: NodeId) {
    let NodeKind::FnDcl { body: Some(body), .. } = ctx.arena[fn_dcl].kind.clone() else { return };
    ctx.tracer.pass_begin(PassKind::Flow);

    let mut state = FlowState { scopes: vec![Vec::new()], loops: Vec::new(), touched: Vec::new() };

    // Parameters arrive initialized.
    let sig = itype_get_type_dcl(&ctx.arena, ctx.arena[fn_dcl].vtype);
    if let NodeKind::FnSig { parms, .. } = ctx.arena[sig].kind.clone() {
        for parm in parms {
            state.set_flow(ctx, parm, FlowFlags::INITIALIZED, FlowFlags::NONE);
            state.register_owned(ctx, parm);
        }
    }

    block_flow(ctx, &mut state, body);

    // Transient flags never outlive the pass.
    for var in std::mem::take(&mut state.touched) {
        if let NodeKind::VarDcl { flow, .. } = &mut ctx.arena[var].kind {
            *flow = FlowFlags::NONE;
        }
    }
    ctx.tracer.pass_end(PassKind::Flow);
}

fn block_flow(ctx: &mut CompileContext, state: &mut FlowState, block: NodeId) {
    let NodeKind::Block { stmts } = ctx.arena[block].kind.clone() else { return };
    state.scopes.push(Vec::new());
    for stmt in stmts {
        stmt_flow(ctx, state, stmt);
    }
    state.scopes.pop();
}

fn loop_flow(ctx: &mut CompileContext, state: &mut FlowState, id: NodeId) {
    let NodeKind::Loop { body, .. } = ctx.arena[id].kind.clone() else { return };
    state.loops.push(LoopFlow { loop_id: id, depth: state.scopes.len() });
    stmt_flow(ctx, state, body);
    state.loops.pop();
}

fn find_target_loop(ctx: &CompileContext, state: &FlowState, life: Option<NodeId>) -> Option<(NodeId, usize)> {
    let Some(life) = life else {
        return state.loops.last().map(|l| (l.loop_id, l.depth));
    };
    let life_dcl = match &ctx.arena[life].kind {
        NodeKind::VarNameUse { dcl, .. } => *dcl,
        _ => life,
    };
    state
        .loops
        .iter()
        .rev()
        .find(|l| matches!(ctx.arena[l.loop_id].kind, NodeKind::Loop { life: Some(ll), .. } if ll == life_dcl))
        .map(|l| (l.loop_id, l.depth))
}

fn stmt_flow(ctx: &mut CompileContext, state: &mut FlowState, id: NodeId) {
    match &ctx.arena[id].kind {
        NodeKind::VarDcl { .. } => {
            let NodeKind::VarDcl { value, .. } = ctx.arena[id].kind.clone() else { return };
            if let Some(value) = value {
                load_value(ctx, state, value);
                handle_move_or_copy(ctx, state, value);
                state.set_flow(ctx, id, FlowFlags::INITIALIZED, FlowFlags::MOVED);
                state.register_owned(ctx, id);
            }
        }
        NodeKind::Assign { .. } => assign_flow(ctx, state, id),
        NodeKind::Return { .. } => {
            let NodeKind::Return { exp, .. } = ctx.arena[id].kind.clone() else { return };
            load_value(ctx, state, exp);
            // Returning releases every scope of the function.
            let dealias = state.dealias_from(0);
            if let NodeKind::Return { dealias: slot, .. } = &mut ctx.arena[id].kind {
                *slot = dealias;
            }
        }
        NodeKind::Break { .. } => {
            let NodeKind::Break { life, exp, .. } = ctx.arena[id].kind.clone() else { return };
            if let Some(exp) = exp {
                load_value(ctx, state, exp);
            }
            if let Some((_, depth)) = find_target_loop(ctx, state, life) {
                let dealias = state.dealias_from(depth);
                if let NodeKind::Break { dealias: slot, .. } = &mut ctx.arena[id].kind {
                    *slot = dealias;
                }
            }
        }
        NodeKind::Continue { .. } => {
            let NodeKind::Continue { life, .. } = ctx.arena[id].kind.clone() else { return };
            if let Some((_, depth)) = find_target_loop(ctx, state, life) {
                let dealias = state.dealias_from(depth);
                if let NodeKind::Continue { dealias: slot, .. } = &mut ctx.arena[id].kind {
                    *slot = dealias;
                }
            }
        }
        NodeKind::Block { .. } => block_flow(ctx, state, id),
        NodeKind::Loop { .. } => loop_flow(ctx, state, id),
        // Nested declarations have their own flow pass.
        NodeKind::FnDcl { .. } | NodeKind::Struct { .. } | NodeKind::ConstDcl { .. } | NodeKind::Typedef { .. } => {}
        _ => load_value(ctx, state, id),
    }
}

/// Checks a value read: initialized, not moved, recursing into operands.
fn load_value(ctx: &mut CompileContext, state: &mut FlowState, id: NodeId) {
    match ctx.arena[id].kind.clone() {
        NodeKind::VarNameUse { name, dcl } => {
            if name == ctx.interner.anon() {
                return;
            }
            if !matches!(ctx.arena[dcl].kind, NodeKind::VarDcl { .. }) {
                return;
            }
            let flow = state.flow_of(ctx, dcl);
            if flow.contains(FlowFlags::MOVED) {
                let shown = ctx.interner.name(name).to_owned();
                ctx.error_msg_node(id, ErrorKind::Move, format!("Cannot use `{shown}`: its value has been moved"));
            } else if !flow.contains(FlowFlags::INITIALIZED) {
                let shown = ctx.interner.name(name).to_owned();
                ctx.error_msg_node(id, ErrorKind::InvType, format!("Cannot use `{shown}` before it is initialized"));
            }
        }
        NodeKind::FnCall { callee, args } => {
            load_value(ctx, state, callee);
            for arg in args {
                load_value(ctx, state, arg);
                handle_move_or_copy(ctx, state, arg);
            }
        }
        NodeKind::FldAccess { obj, .. } => load_value(ctx, state, obj),
        NodeKind::Deref { exp } => load_value(ctx, state, exp),
        NodeKind::Element { exp, index } => {
            load_value(ctx, state, exp);
            load_value(ctx, state, index);
        }
        NodeKind::Borrow { exp, .. } => load_value(ctx, state, exp),
        NodeKind::Allocate { exp, .. } => load_value(ctx, state, exp),
        NodeKind::Convert { exp, .. } => load_value(ctx, state, exp),
        NodeKind::Assign { .. } => assign_flow(ctx, state, id),
        NodeKind::Block { .. } => block_flow(ctx, state, id),
        NodeKind::Loop { .. } => loop_flow(ctx, state, id),
        NodeKind::VTuple { elems } => {
            for elem in elems {
                load_value(ctx, state, elem);
            }
        }
        NodeKind::ArrayLit { dimens, elems } => {
            for d in dimens {
                load_value(ctx, state, d);
            }
            for e in elems {
                load_value(ctx, state, e);
            }
        }
        _ => {}
    }
}

/// Move-infected values move (their source becomes unusable); everything
/// else aliases by copy.
fn handle_move_or_copy(ctx: &mut CompileContext, state: &mut FlowState, rval: NodeId) {
    let rtype = ctx.arena[rval].vtype;
    if rtype == NodeId::UNKNOWN || !itype_is_move(&ctx.arena, rtype) {
        return;
    }
    if let NodeKind::VarNameUse { name, dcl } = ctx.arena[rval].kind.clone()
        && name != ctx.interner.anon()
        && matches!(ctx.arena[dcl].kind, NodeKind::VarDcl { .. })
    {
        state.set_flow(ctx, dcl, FlowFlags::MOVED, FlowFlags::NONE);
    }
}

/// Mutability, initialization and borrow-lifetime checks for one lval.
/// Returns `true` when the lval is the `_` placeholder.
fn assign_lval_rtype(ctx: &mut CompileContext, state: &mut FlowState, lval: NodeId, rtype: NodeId) -> bool {
    if iexp_is_anon(ctx, lval) {
        return true;
    }

    let Some((var, perm, lvalscope)) = iexp_lval_info(ctx, lval) else {
        return false;
    };

    // Writable permission, or a first assignment that initializes.
    let may_write = crate::itype::perm_attrs_of(&ctx.arena, perm).contains(PermAttrs::MAY_WRITE);
    let is_var_use = matches!(ctx.arena[lval].kind, NodeKind::VarNameUse { .. });
    let initialized = state.flow_of(ctx, var).contains(FlowFlags::INITIALIZED);
    if !may_write && (!is_var_use || initialized) {
        ctx.error_msg_node(lval, ErrorKind::NoMut, "You do not have permission to modify lval");
        return false;
    }

    if is_var_use {
        state.set_flow(ctx, var, FlowFlags::INITIALIZED, FlowFlags::MOVED);
        state.register_owned(ctx, var);
    }

    // A stored borrow may not outlive the place it borrows from.
    let rtype_dcl = itype_get_type_dcl(&ctx.arena, rtype);
    let ltype_dcl = itype_get_type_dcl(&ctx.arena, ctx.arena[lval].vtype);
    let escapes = match (&ctx.arena[rtype_dcl].kind, &ctx.arena[ltype_dcl].kind) {
        (NodeKind::Ref(r_from), NodeKind::Ref(r_l)) => {
            itype_get_type_dcl(&ctx.arena, r_l.region) == NodeId::BORROW && lvalscope < r_from.scope
        }
        _ => false,
    };
    if escapes {
        ctx.error_msg_node(lval, ErrorKind::InvType, "lval outlives the borrowed reference you are storing");
    }
    false
}

fn assign_single_flow(ctx: &mut CompileContext, state: &mut FlowState, lval: NodeId, rval: NodeId) {
    let rtype = ctx.arena[rval].vtype;
    // The placeholder swallows the value; an owned reference assigned to it
    // is released immediately, and a moved source is still consumed.
    assign_lval_rtype(ctx, state, lval, rtype);
    handle_move_or_copy(ctx, state, rval);
}

fn assign_flow(ctx: &mut CompileContext, state: &mut FlowState, id: NodeId) {
    let NodeKind::Assign { lval, rval } = ctx.arena[id].kind.clone() else { return };
    load_value(ctx, state, rval);

    let lval_is_tuple = matches!(ctx.arena[lval].kind, NodeKind::VTuple { .. });
    let rval_is_tuple = matches!(ctx.arena[rval].kind, NodeKind::VTuple { .. });
    match (lval_is_tuple, rval_is_tuple) {
        (true, true) => {
            let (NodeKind::VTuple { elems: lnodes }, NodeKind::VTuple { elems: rnodes }) =
                (ctx.arena[lval].kind.clone(), ctx.arena[rval].kind.clone())
            else {
                return;
            };
            // The type checker rejects unequal tuple sizes before flow runs.
            if lnodes.len() != rnodes.len() {
                return;
            }
            for (&l, &r) in lnodes.iter().zip(&rnodes) {
                assign_single_flow(ctx, state, l, r);
            }
        }
        (true, false) => {
            let NodeKind::VTuple { elems: lnodes } = ctx.arena[lval].kind.clone() else { return };
            let rtype = itype_get_type_dcl(&ctx.arena, ctx.arena[rval].vtype);
            let NodeKind::TTuple { types } = ctx.arena[rtype].kind.clone() else { return };
            for (&l, &rt) in lnodes.iter().zip(&types) {
                assign_lval_rtype(ctx, state, l, rt);
            }
        }
        (false, true) => {
            // Only the placeholder reaches flow with a tuple rval.
        }
        (false, false) => assign_single_flow(ctx, state, lval, rval),
    }
}
