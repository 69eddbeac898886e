//! Type checking and coercion.
//!
//! Computes every expression's value type bottom-up, then applies constraint
//! checks top-down: assignment shape rules, call-site checks with method
//! resolution and parameter defaults, array literal rules, implicit return
//! insertion. Wherever a `ConvSubtype` coercion is accepted for one of the
//! four explicit conversion shapes, the expression is wrapped in a
//! [`NodeKind::Convert`] node so the backend sees conversions uniformly.
//!
//! After a function body checks cleanly, its data-flow pass runs immediately;
//! flow needs the inferred types and is skipped entirely once any error has
//! been recorded.

use crate::{
    context::CompileContext,
    errors::ErrorKind,
    flow,
    itype::{
        SubtypeConstraint, TypeCompare, itype_find_super, itype_get_deref_type_dcl, itype_get_type_dcl,
        itype_is_same, itype_matches,
    },
    node::{ConvKind, NodeFlags, NodeId, NodeKind, RefType},
    refmatch,
    tracer::PassKind,
};

/// Walk state for the type-checking pass.
pub(crate) struct TypeCheckState {
    /// The function whose body is being checked.
    pub(crate) fn_dcl: Option<NodeId>,
    /// The enclosing struct/trait when checking methods.
    pub(crate) type_dcl: Option<NodeId>,
    /// Innermost-last stack of active loops.
    pub(crate) loops: Vec<NodeId>,
}

/// Type checks the whole program.
pub fn type_check(ctx: &mut CompileContext, program: NodeId) {
    ctx.tracer.pass_begin(PassKind::TypeCheck);
    let modules = match &ctx.arena[program].kind {
        NodeKind::Program { modules } => modules.clone(),
        NodeKind::Module { .. } => vec![program],
        _ => {
            ctx.internal_error(program, "type check expects a program or module");
            ctx.tracer.pass_end(PassKind::TypeCheck);
            return;
        }
    };
    let mut state = TypeCheckState { fn_dcl: None, type_dcl: None, loops: Vec::new() };
    for module in modules {
        let NodeKind::Module { nodes, .. } = &ctx.arena[module].kind else { continue };
        for dcl in nodes.clone() {
            tc_node(ctx, &mut state, dcl);
        }
    }
    ctx.tracer.pass_end(PassKind::TypeCheck);
}

// ---- lval helpers (shared with the flow pass) ----

/// Is this expression a legal assignment target?
pub(crate) fn iexp_is_lval(kind: &NodeKind) -> bool {
    matches!(
        kind,
        NodeKind::VarNameUse { .. } | NodeKind::Deref { .. } | NodeKind::Element { .. } | NodeKind::FldAccess { .. }
    )
}

/// True when the lval is the `_` placeholder that swallows any value.
pub(crate) fn iexp_is_anon(ctx: &CompileContext, lval: NodeId) -> bool {
    matches!(ctx.arena[lval].kind, NodeKind::VarNameUse { name, .. } if name == ctx.interner.anon())
}

/// The variable, permission and scope behind an lval expression.
pub(crate) fn iexp_lval_info(ctx: &CompileContext, lval: NodeId) -> Option<(NodeId, NodeId, u16)> {
    match &ctx.arena[lval].kind {
        NodeKind::VarNameUse { dcl, .. } => match &ctx.arena[*dcl].kind {
            NodeKind::VarDcl { perm, scope, .. } => Some((*dcl, *perm, *scope)),
            _ => None,
        },
        NodeKind::Deref { exp } => {
            let (var, _, scope) = iexp_lval_info(ctx, *exp)?;
            let vt = itype_get_type_dcl(&ctx.arena, ctx.arena[*exp].vtype);
            let perm = refmatch::ref_parts(&ctx.arena, vt)?.perm;
            Some((var, perm, scope))
        }
        NodeKind::Element { exp, .. } => iexp_lval_info(ctx, *exp),
        NodeKind::FldAccess { obj, .. } => iexp_lval_info(ctx, *obj),
        _ => None,
    }
}

fn is_ref_kind(kind: &NodeKind) -> bool {
    matches!(kind, NodeKind::Ref(_) | NodeKind::VirtRef(_) | NodeKind::ArrayRef(_))
}

// ---- coercion ----

fn conv_kind_for(to_kind: &NodeKind) -> Option<ConvKind> {
    match to_kind {
        NodeKind::UintNbr { .. } | NodeKind::IntNbr { .. } | NodeKind::FloatNbr { .. } => Some(ConvKind::NumWiden),
        NodeKind::VirtRef(_) => Some(ConvKind::RefToVirt),
        NodeKind::ArrayRef(_) => Some(ConvKind::RefToArrayRef),
        NodeKind::Ptr { .. } => Some(ConvKind::RefToPtr),
        _ => None,
    }
}

/// Coerces `exp` to `to_type`, auto-dereferencing one reference layer when
/// the target is not itself a reference. On success returns the expression to
/// use in place of `exp` (possibly wrapped in a deref and/or a conversion);
/// on failure returns `None` without reporting, so call sites pick the
/// message.
pub(crate) fn coerce(ctx: &mut CompileContext, to_type: NodeId, exp: NodeId) -> Option<NodeId> {
    let mut exp = exp;
    let from_type = ctx.arena[exp].vtype;
    if from_type == NodeId::UNKNOWN {
        return None;
    }

    let to_dcl = itype_get_type_dcl(&ctx.arena, to_type);
    let from_dcl = itype_get_type_dcl(&ctx.arena, from_type);
    if !is_ref_kind(&ctx.arena[to_dcl].kind)
        && !matches!(ctx.arena[to_dcl].kind, NodeKind::Ptr { .. })
        && is_ref_kind(&ctx.arena[from_dcl].kind)
    {
        exp = insert_deref(ctx, exp);
    }

    let from_now = ctx.arena[exp].vtype;
    match itype_matches(ctx, to_type, from_now, SubtypeConstraint::Coerce) {
        TypeCompare::EqMatch => Some(exp),
        TypeCompare::CastSubtype => {
            // Free reinterpretation; the expression simply takes on the
            // target type.
            ctx.arena[exp].vtype = to_type;
            Some(exp)
        }
        TypeCompare::ConvSubtype => {
            let span = ctx.arena[exp].span;
            if let Some(kind) = conv_kind_for(&ctx.arena[to_dcl].kind) {
                let conv = ctx.arena.push_kind(NodeKind::Convert { exp, kind }, span);
                ctx.arena[conv].vtype = to_type;
                ctx.tracer.coercion(kind, span);
                Some(conv)
            } else {
                ctx.arena[exp].vtype = to_type;
                Some(exp)
            }
        }
        TypeCompare::NoMatch => None,
    }
}

/// Wraps an expression of reference type in a dereference node.
fn insert_deref(ctx: &mut CompileContext, exp: NodeId) -> NodeId {
    let vt = itype_get_type_dcl(&ctx.arena, ctx.arena[exp].vtype);
    let Some(r) = refmatch::ref_parts(&ctx.arena, vt) else { return exp };
    let span = ctx.arena[exp].span;
    let deref = ctx.deref(exp, span);
    let vtype = match ctx.arena[vt].kind {
        NodeKind::ArrayRef(_) => ctx.arena.push_kind(NodeKind::ArrayDeref(r), span),
        _ => r.vtexp,
    };
    ctx.arena[deref].vtype = vtype;
    deref
}

// ---- type nodes ----

/// Checks a node expected to be a type and returns its canonical id.
/// Reference types get their defaults filled and are interned.
pub(crate) fn tc_type(ctx: &mut CompileContext, state: &mut TypeCheckState, id: NodeId) -> NodeId {
    match ctx.arena[id].kind.clone() {
        NodeKind::TypeNameUse { .. }
        | NodeKind::UintNbr { .. }
        | NodeKind::IntNbr { .. }
        | NodeKind::FloatNbr { .. }
        | NodeKind::Perm { .. }
        | NodeKind::BorrowRegion
        | NodeKind::Void
        | NodeKind::Unknown => id,
        NodeKind::Typedef { typeval, .. } => {
            let canon = tc_type(ctx, state, typeval);
            if let NodeKind::Typedef { typeval, .. } = &mut ctx.arena[id].kind {
                *typeval = canon;
            }
            id
        }
        NodeKind::Ref(r) | NodeKind::ArrayRef(r) => {
            let vt = tc_type(ctx, state, r.vtexp);
            match &mut ctx.arena[id].kind {
                NodeKind::Ref(slot) | NodeKind::ArrayRef(slot) => slot.vtexp = vt,
                _ => {}
            }
            refmatch::ref_type_check(ctx, id)
        }
        NodeKind::VirtRef(r) => {
            let vt = tc_type(ctx, state, r.vtexp);
            if let NodeKind::VirtRef(slot) = &mut ctx.arena[id].kind {
                slot.vtexp = vt;
            }
            refmatch::refvirt_type_check(ctx, id)
        }
        NodeKind::ArrayDeref(_) => id,
        NodeKind::Ptr { vtexp } => {
            let vt = tc_type(ctx, state, vtexp);
            if let NodeKind::Ptr { vtexp } = &mut ctx.arena[id].kind {
                *vtexp = vt;
            }
            ctx.normalize_type(id)
        }
        NodeKind::ArrayType { elem, .. } => {
            let canon = tc_type(ctx, state, elem);
            if let NodeKind::ArrayType { elem, .. } = &mut ctx.arena[id].kind {
                *elem = canon;
            }
            id
        }
        NodeKind::TTuple { types } => {
            let canon: Vec<NodeId> = types.iter().map(|&t| tc_type(ctx, state, t)).collect();
            if let NodeKind::TTuple { types } = &mut ctx.arena[id].kind {
                *types = canon;
            }
            id
        }
        NodeKind::FnSig { parms, rettype } => {
            for parm in parms {
                tc_node(ctx, state, parm);
            }
            let canon = tc_type(ctx, state, rettype);
            if let NodeKind::FnSig { rettype, .. } = &mut ctx.arena[id].kind {
                *rettype = canon;
            }
            id
        }
        NodeKind::Struct { .. } => id,
        _ => {
            ctx.error_msg_node(id, ErrorKind::NotTyped, "Expected a type.");
            id
        }
    }
}

// ---- expressions ----

/// Type checks an expression, filling in its `vtype`. Returns `false` when
/// the expression could not be typed (an error has been reported).
pub(crate) fn tc_expr(ctx: &mut CompileContext, state: &mut TypeCheckState, id: NodeId) -> bool {
    if ctx.arena[id].vtype != NodeId::UNKNOWN {
        return true;
    }
    match ctx.arena[id].kind.clone() {
        NodeKind::ULit { .. } => {
            ctx.arena[id].vtype = ctx.core.i32_type;
            true
        }
        NodeKind::FLit { .. } => {
            ctx.arena[id].vtype = ctx.core.f32_type;
            true
        }
        NodeKind::StringLit { .. } => {
            // A string literal is a borrowed immutable byte slice.
            let span = ctx.arena[id].span;
            let r = ctx.array_ref_type(NodeId::BORROW, ctx.core.imm_perm, ctx.core.u8_type, span);
            let canon = ctx.normalize_type(r);
            ctx.arena[id].vtype = canon;
            true
        }
        NodeKind::NilLit => {
            ctx.arena[id].vtype = NodeId::VOID;
            true
        }
        NodeKind::VarNameUse { name, dcl } => {
            if name == ctx.interner.anon() {
                return true; // the placeholder has no type of its own
            }
            let vtype = match &ctx.arena[dcl].kind {
                NodeKind::VarDcl { .. } | NodeKind::ConstDcl { .. } | NodeKind::FnDcl { .. } => ctx.arena[dcl].vtype,
                _ => NodeId::UNKNOWN,
            };
            if vtype == NodeId::UNKNOWN {
                ctx.error_msg_node(id, ErrorKind::InvType, "Name's declaration has no usable type");
                return false;
            }
            ctx.arena[id].vtype = vtype;
            true
        }
        NodeKind::NameUse { .. } | NodeKind::TypeNameUse { .. } | NodeKind::FieldNameUse { .. } => {
            ctx.internal_error(id, "unresolved name reached the type checker");
            false
        }
        NodeKind::FldAccess { obj, field } => tc_fld_access(ctx, state, id, obj, field),
        NodeKind::Deref { exp } => {
            if !tc_expr(ctx, state, exp) {
                return false;
            }
            let vt = itype_get_type_dcl(&ctx.arena, ctx.arena[exp].vtype);
            match refmatch::ref_parts(&ctx.arena, vt) {
                Some(r) if matches!(ctx.arena[vt].kind, NodeKind::ArrayRef(_)) => {
                    let span = ctx.arena[id].span;
                    let ad = ctx.arena.push_kind(NodeKind::ArrayDeref(r), span);
                    ctx.arena[id].vtype = ad;
                    true
                }
                Some(r) => {
                    ctx.arena[id].vtype = r.vtexp;
                    true
                }
                None => {
                    ctx.error_msg_node(id, ErrorKind::InvType, "May only dereference a reference");
                    false
                }
            }
        }
        NodeKind::Element { exp, index } => tc_element(ctx, state, id, exp, index),
        NodeKind::Borrow { exp, perm } => tc_borrow(ctx, state, id, exp, perm),
        NodeKind::Allocate { region, perm, exp } => tc_allocate(ctx, state, id, region, perm, exp),
        NodeKind::Assign { .. } => {
            tc_assign(ctx, state, id);
            ctx.arena[id].vtype != NodeId::UNKNOWN
        }
        NodeKind::FnCall { .. } => tc_fncall(ctx, state, id),
        NodeKind::Convert { exp, .. } => tc_expr(ctx, state, exp),
        NodeKind::Block { .. } => {
            tc_block(ctx, state, id);
            true
        }
        NodeKind::Loop { .. } => {
            tc_loop(ctx, state, id);
            true
        }
        NodeKind::VTuple { elems } => {
            let mut ok = true;
            for &elem in &elems {
                ok &= tc_expr(ctx, state, elem);
            }
            if !ok {
                return false;
            }
            let types: Vec<NodeId> = elems.iter().map(|&e| ctx.arena[e].vtype).collect();
            let span = ctx.arena[id].span;
            let tt = ctx.ttuple(types, span);
            ctx.arena[id].vtype = tt;
            true
        }
        NodeKind::ArrayLit { .. } => tc_array_lit(ctx, state, id),
        _ => {
            ctx.internal_error(id, "node is not an expression");
            false
        }
    }
}

fn struct_members(ctx: &CompileContext, dcl: NodeId) -> Option<(Vec<NodeId>, Vec<NodeId>)> {
    match &ctx.arena[dcl].kind {
        NodeKind::Struct { fields, methods, .. } => Some((fields.clone(), methods.clone())),
        _ => None,
    }
}

fn tc_fld_access(ctx: &mut CompileContext, state: &mut TypeCheckState, id: NodeId, obj: NodeId, field: NodeId) -> bool {
    if !tc_expr(ctx, state, obj) {
        return false;
    }
    let NodeKind::FieldNameUse { name, .. } = ctx.arena[field].kind else {
        ctx.internal_error(id, "field access without a field name");
        return false;
    };
    let recv = itype_get_deref_type_dcl(&ctx.arena, ctx.arena[obj].vtype);
    let Some((fields, _)) = struct_members(ctx, recv) else {
        ctx.error_msg_node(id, ErrorKind::InvType, "Cannot access a field of a non-struct value");
        return false;
    };
    let found = fields
        .iter()
        .copied()
        .find(|&f| ctx.arena[f].kind.dcl_name() == Some(name));
    let Some(fdcl) = found else {
        let shown = ctx.interner.name(name).to_owned();
        ctx.error_msg_node(id, ErrorKind::NoMeth, format!("The field `{shown}` is not defined by the object's type."));
        return false;
    };
    let ftype = ctx.arena[fdcl].vtype;
    if let NodeKind::FieldNameUse { dcl, .. } = &mut ctx.arena[field].kind {
        *dcl = Some(fdcl);
    }
    ctx.arena[field].vtype = ftype;
    ctx.arena[id].vtype = ftype;
    true
}

fn tc_element(ctx: &mut CompileContext, state: &mut TypeCheckState, id: NodeId, exp: NodeId, index: NodeId) -> bool {
    if !tc_expr(ctx, state, exp) || !tc_expr(ctx, state, index) {
        return false;
    }
    let usize_type = ctx.core.usize_type;
    if coerce(ctx, usize_type, index).is_none() {
        ctx.error_msg_node(index, ErrorKind::InvType, "Array index must coerce to usize");
        return false;
    }
    let vt = itype_get_type_dcl(&ctx.arena, ctx.arena[exp].vtype);
    let elem = match &ctx.arena[vt].kind {
        NodeKind::ArrayType { elem, .. } => *elem,
        NodeKind::ArrayRef(r) | NodeKind::ArrayDeref(r) => r.vtexp,
        _ => {
            ctx.error_msg_node(id, ErrorKind::InvType, "Only arrays and array references may be indexed");
            return false;
        }
    };
    ctx.arena[id].vtype = elem;
    true
}

fn tc_borrow(ctx: &mut CompileContext, state: &mut TypeCheckState, id: NodeId, exp: NodeId, perm: NodeId) -> bool {
    if !tc_expr(ctx, state, exp) {
        return false;
    }
    if !iexp_is_lval(&ctx.arena[exp].kind) {
        ctx.error_msg_node(id, ErrorKind::NotLval, "& only applies to lvals, such as variables");
        return false;
    }
    let perm = if perm == NodeId::UNKNOWN { ctx.core.const_perm } else { perm };

    // The borrow may not claim rights the place does not grant.
    if let Some((_, place_perm, _)) = iexp_lval_info(ctx, exp) {
        let requested = crate::itype::perm_attrs_of(&ctx.arena, perm);
        let granted = crate::itype::perm_attrs_of(&ctx.arena, place_perm);
        if !crate::permission::perm_borrowable(requested, granted) {
            ctx.error_msg_node(id, ErrorKind::BadPerm, "Reference cannot obtain this permission");
            return false;
        }
    }

    let scope = iexp_lval_info(ctx, exp).map_or(0, |(_, _, scope)| scope);
    let span = ctx.arena[id].span;
    let vtexp = ctx.arena[exp].vtype;
    let reftype = ctx
        .arena
        .push_kind(NodeKind::Ref(RefType { region: NodeId::BORROW, perm, vtexp, scope }), span);
    refmatch::ref_adopt_infections(ctx, reftype);
    ctx.arena[id].vtype = reftype;
    true
}

fn tc_allocate(
    ctx: &mut CompileContext,
    state: &mut TypeCheckState,
    id: NodeId,
    region: NodeId,
    perm: NodeId,
    exp: NodeId,
) -> bool {
    if !tc_expr(ctx, state, exp) {
        return false;
    }
    let region_dcl = itype_get_type_dcl(&ctx.arena, region);
    if !matches!(ctx.arena[region_dcl].kind, NodeKind::Struct { .. }) {
        ctx.error_msg_node(id, ErrorKind::InvType, "Reference's region must be a struct type.");
        return false;
    }
    let perm = if perm == NodeId::UNKNOWN { ctx.core.mut_perm } else { perm };
    let span = ctx.arena[id].span;
    let vtexp = ctx.arena[exp].vtype;
    let reftype = ctx
        .arena
        .push_kind(NodeKind::Ref(RefType { region, perm, vtexp, scope: 0 }), span);
    refmatch::ref_adopt_infections(ctx, reftype);
    let canon = ctx.normalize_type(reftype);
    ctx.arena[id].vtype = canon;
    true
}

// ---- assignment ----

fn replace_assign_rval(ctx: &mut CompileContext, id: NodeId, new_rval: NodeId) {
    if let NodeKind::Assign { rval, .. } = &mut ctx.arena[id].kind {
        *rval = new_rval;
    }
}

fn assign_single_check(ctx: &mut CompileContext, state: &mut TypeCheckState, lval: NodeId, rval: NodeId) -> Option<NodeId> {
    if !tc_expr(ctx, state, rval) {
        return None;
    }
    // The `_` placeholder swallows any value unchecked.
    if iexp_is_anon(ctx, lval) {
        return Some(rval);
    }
    if !iexp_is_lval(&ctx.arena[lval].kind) {
        ctx.error_msg_node(lval, ErrorKind::BadLval, "Expression to left of assignment must be lval");
        return None;
    }
    let lval_type = ctx.arena[lval].vtype;
    match coerce(ctx, lval_type, rval) {
        Some(new_rval) => Some(new_rval),
        None => {
            ctx.error_msg_node(rval, ErrorKind::InvType, "Expression's type does not match lval's type");
            None
        }
    }
}

/// Parallel assignment: both sides are value tuples, matched pairwise and
/// equal in size.
fn assign_para_check(ctx: &mut CompileContext, state: &mut TypeCheckState, lval: NodeId, rval: NodeId) {
    let (NodeKind::VTuple { elems: lnodes }, NodeKind::VTuple { elems: rnodes }) =
        (ctx.arena[lval].kind.clone(), ctx.arena[rval].kind.clone())
    else {
        return;
    };
    if lnodes.len() > rnodes.len() {
        ctx.error_msg_node(rval, ErrorKind::BadTerm, "Not enough tuple values given to lvals");
        return;
    }
    if rnodes.len() > lnodes.len() {
        ctx.error_msg_node(rval, ErrorKind::BadTerm, "Too many tuple values given to lvals");
        return;
    }
    for (i, &l) in lnodes.iter().enumerate() {
        if let Some(new_r) = assign_single_check(ctx, state, l, rnodes[i])
            && let NodeKind::VTuple { elems } = &mut ctx.arena[rval].kind
        {
            elems[i] = new_r;
        }
    }
    let vt = ctx.arena[lval].vtype;
    ctx.arena[rval].vtype = vt;
}

/// One expression returning a tuple, decomposed into multiple lvals.
fn assign_mult_ret_check(ctx: &mut CompileContext, state: &mut TypeCheckState, lval: NodeId, rval: NodeId) {
    if !tc_expr(ctx, state, rval) {
        return;
    }
    let NodeKind::VTuple { elems: lnodes } = ctx.arena[lval].kind.clone() else { return };
    let rtype = itype_get_type_dcl(&ctx.arena, ctx.arena[rval].vtype);
    let NodeKind::TTuple { types: rtypes } = ctx.arena[rtype].kind.clone() else {
        ctx.error_msg_node(rval, ErrorKind::BadTerm, "Not enough values for lvals");
        return;
    };
    if lnodes.len() > rtypes.len() {
        ctx.error_msg_node(rval, ErrorKind::BadTerm, "Not enough tuple values for lvals");
        return;
    }
    for (i, &l) in lnodes.iter().enumerate() {
        if iexp_is_anon(ctx, l) {
            continue;
        }
        if !iexp_is_lval(&ctx.arena[l].kind) {
            ctx.error_msg_node(l, ErrorKind::BadLval, "Expression to left of assignment must be lval");
            continue;
        }
        if !itype_is_same(&ctx.arena, ctx.arena[l].vtype, rtypes[i]) {
            ctx.error_msg_node(l, ErrorKind::InvType, "Return value's type does not match lval's type");
        }
    }
}

pub(crate) fn tc_assign(ctx: &mut CompileContext, state: &mut TypeCheckState, id: NodeId) {
    let NodeKind::Assign { lval, rval } = ctx.arena[id].kind else { return };
    if !iexp_is_anon(ctx, lval) && !tc_expr(ctx, state, lval) {
        return;
    }

    let lval_is_tuple = matches!(ctx.arena[lval].kind, NodeKind::VTuple { .. });
    let rval_is_tuple = matches!(ctx.arena[rval].kind, NodeKind::VTuple { .. });
    match (lval_is_tuple, rval_is_tuple) {
        (true, true) => assign_para_check(ctx, state, lval, rval),
        (true, false) => assign_mult_ret_check(ctx, state, lval, rval),
        (false, true) => {
            // A tuple may only be swallowed whole by the placeholder.
            if iexp_is_anon(ctx, lval) {
                tc_expr(ctx, state, rval);
            } else {
                ctx.error_msg_node(rval, ErrorKind::BadTerm, "Multiple values cannot be assigned to a single lval");
                return;
            }
        }
        (false, false) => {
            if let Some(new_rval) = assign_single_check(ctx, state, lval, rval) {
                replace_assign_rval(ctx, id, new_rval);
            } else {
                return;
            }
        }
    }
    let NodeKind::Assign { rval, .. } = ctx.arena[id].kind else { return };
    let vt = ctx.arena[rval].vtype;
    ctx.arena[id].vtype = vt;
}

// ---- calls ----

fn fn_sig_of(ctx: &CompileContext, callee_type: NodeId) -> Option<NodeId> {
    let mut dcl = itype_get_type_dcl(&ctx.arena, callee_type);
    // Auto-deref the callee until a signature emerges.
    loop {
        match &ctx.arena[dcl].kind {
            NodeKind::FnSig { .. } => return Some(dcl),
            NodeKind::Ref(r) | NodeKind::VirtRef(r) => dcl = itype_get_type_dcl(&ctx.arena, r.vtexp),
            _ => return None,
        }
    }
}

fn tc_fncall(ctx: &mut CompileContext, state: &mut TypeCheckState, id: NodeId) -> bool {
    let NodeKind::FnCall { callee, args } = ctx.arena[id].kind.clone() else { return false };

    // Method call: resolve the name within the receiver's type, then rewrite
    // the callee to a direct use of the found declaration and pass the
    // receiver as the first argument.
    if let NodeKind::FldAccess { obj, field } = ctx.arena[callee].kind {
        if let NodeKind::FieldNameUse { name, .. } = ctx.arena[field].kind {
            if !tc_expr(ctx, state, obj) {
                return false;
            }
            let recv = itype_get_deref_type_dcl(&ctx.arena, ctx.arena[obj].vtype);
            let method = struct_members(ctx, recv).and_then(|(_, methods)| {
                methods.iter().copied().find(|&m| ctx.arena[m].kind.dcl_name() == Some(name))
            });
            let Some(method) = method else {
                let shown = ctx.interner.name(name).to_owned();
                ctx.error_msg_node(id, ErrorKind::NoMeth, format!("The method `{shown}` is not defined by the object's type."));
                return false;
            };
            let sig = ctx.arena[method].vtype;
            ctx.arena[callee].kind = NodeKind::VarNameUse { name, dcl: method };
            ctx.arena[callee].vtype = sig;
            let mut new_args = Vec::with_capacity(args.len() + 1);
            new_args.push(obj);
            new_args.extend(args.iter().copied());
            if let NodeKind::FnCall { args, .. } = &mut ctx.arena[id].kind {
                *args = new_args;
            }
            return tc_call_args(ctx, state, id);
        }
        // A field access that is not a method call: the field holds a
        // function value.
    }

    if !tc_expr(ctx, state, callee) {
        return false;
    }
    tc_call_args(ctx, state, id)
}

fn tc_call_args(ctx: &mut CompileContext, state: &mut TypeCheckState, id: NodeId) -> bool {
    let NodeKind::FnCall { callee, args } = ctx.arena[id].kind.clone() else { return false };

    let Some(sig) = fn_sig_of(ctx, ctx.arena[callee].vtype) else {
        ctx.error_msg_node(callee, ErrorKind::NotFn, "Cannot call a value that is not a function");
        return false;
    };
    let NodeKind::FnSig { parms, rettype } = ctx.arena[sig].kind.clone() else { return false };
    ctx.arena[id].vtype = rettype;

    if args.len() > parms.len() {
        ctx.error_msg_node(id, ErrorKind::ManyArgs, "Too many arguments specified vs. function declaration");
        return false;
    }

    let mut final_args = args.clone();
    for (i, &arg) in args.iter().enumerate() {
        if !tc_expr(ctx, state, arg) {
            continue;
        }
        let ptype = ctx.arena[parms[i]].vtype;
        match coerce(ctx, ptype, arg) {
            Some(new_arg) => final_args[i] = new_arg,
            None => {
                ctx.error_msg_node(arg, ErrorKind::InvType, "Expression's type does not match declared parameter");
            }
        }
    }

    // Too few arguments: fall back on parameter defaults where declared.
    for &parm in parms.iter().skip(args.len()) {
        let default = match &ctx.arena[parm].kind {
            NodeKind::VarDcl { value, .. } => *value,
            _ => continue,
        };
        match default {
            Some(default) => final_args.push(default),
            None => {
                ctx.error_msg_node(id, ErrorKind::FewArgs, "Function call requires more arguments than specified");
                return false;
            }
        }
    }

    if let NodeKind::FnCall { args, .. } = &mut ctx.arena[id].kind {
        *args = final_args;
    }
    true
}

// ---- array literals ----

/// Chases constant declarations to find a literal dimension value.
fn const_dim_value(ctx: &CompileContext, mut dim: NodeId) -> Option<u64> {
    loop {
        match &ctx.arena[dim].kind {
            NodeKind::ULit { val } => return Some(*val),
            NodeKind::VarNameUse { dcl, .. } => match &ctx.arena[*dcl].kind {
                NodeKind::ConstDcl { value, .. } => dim = *value,
                _ => return None,
            },
            _ => return None,
        }
    }
}

fn tc_array_lit(ctx: &mut CompileContext, state: &mut TypeCheckState, id: NodeId) -> bool {
    let NodeKind::ArrayLit { dimens, elems } = ctx.arena[id].kind.clone() else { return false };

    // Fill form: [dimension, fill-value].
    if !dimens.is_empty() {
        if dimens.len() > 1 {
            ctx.error_msg_node(id, ErrorKind::BadArray, "Array literal may only specify one dimension");
            return false;
        }
        let dim = dimens[0];
        if matches!(ctx.arena[dim].kind, NodeKind::ULit { .. }) {
            ctx.arena[dim].vtype = ctx.core.usize_type;
        }
        let usize_type = ctx.core.usize_type;
        if !tc_expr(ctx, state, dim) || coerce(ctx, usize_type, dim).is_none() {
            ctx.error_msg_node(id, ErrorKind::BadArray, "Array literal dimension must coerce to usize");
            return false;
        }
        if const_dim_value(ctx, dim).is_none() {
            ctx.error_msg_node(id, ErrorKind::BadArray, "Array literal dimension value must be a constant");
        }
        if elems.len() != 1 {
            ctx.error_msg_node(id, ErrorKind::BadArray, "Array fill value may only be one value");
            return false;
        }
        let fill = elems[0];
        if !tc_expr(ctx, state, fill) {
            return false;
        }
        let dimsize = const_dim_value(ctx, dim).unwrap_or(0);
        let span = ctx.arena[id].span;
        let elem_type = ctx.arena[fill].vtype;
        let at = ctx.array_type(dimsize, elem_type, span);
        ctx.arena[id].vtype = at;
        return true;
    }

    // List form: every element must share the first element's type.
    if elems.is_empty() {
        ctx.error_msg_node(id, ErrorKind::BadArray, "Array literal list may not be empty");
        return false;
    }
    let mut match_type = NodeId::UNKNOWN;
    for &elem in &elems {
        if !tc_expr(ctx, state, elem) {
            continue;
        }
        let et = ctx.arena[elem].vtype;
        if match_type == NodeId::UNKNOWN {
            match_type = et;
        } else if !itype_is_same(&ctx.arena, et, match_type) {
            ctx.error_msg_node(elem, ErrorKind::BadArray, "Inconsistent type of array literal value");
        }
    }
    let span = ctx.arena[id].span;
    let at = ctx.array_type(elems.len() as u64, match_type, span);
    ctx.arena[id].vtype = at;
    true
}

// ---- blocks, loops, control transfers ----

fn tc_block(ctx: &mut CompileContext, state: &mut TypeCheckState, id: NodeId) {
    let NodeKind::Block { stmts } = ctx.arena[id].kind.clone() else { return };
    for &stmt in &stmts {
        tc_node(ctx, state, stmt);
    }
    // A block's value is its trailing expression's, or void.
    let vtype = stmts
        .last()
        .filter(|&&last| ctx.arena[last].kind.is_exp())
        .map_or(NodeId::VOID, |&last| ctx.arena[last].vtype);
    ctx.arena[id].vtype = vtype;
}

fn tc_loop(ctx: &mut CompileContext, state: &mut TypeCheckState, id: NodeId) {
    let NodeKind::Loop { body, .. } = ctx.arena[id].kind.clone() else { return };
    state.loops.push(id);
    tc_node(ctx, state, body);
    state.loops.pop();

    // The loop's result type is the join of its break values, or void.
    let NodeKind::Loop { breaks, .. } = ctx.arena[id].kind.clone() else { return };
    let mut result = NodeId::UNKNOWN;
    for brk in breaks {
        let NodeKind::Break { exp: Some(exp), .. } = ctx.arena[brk].kind else { continue };
        let bt = ctx.arena[exp].vtype;
        if bt == NodeId::UNKNOWN {
            continue;
        }
        result = if result == NodeId::UNKNOWN {
            bt
        } else {
            match itype_find_super(ctx, result, bt) {
                Some(joined) => joined,
                None => {
                    ctx.error_msg_node(brk, ErrorKind::InvType, "Break value's type does not match the loop's other breaks");
                    result
                }
            }
        };
    }
    ctx.arena[id].vtype = if result == NodeId::UNKNOWN { NodeId::VOID } else { result };
}

/// Finds the loop a break/continue targets: the innermost one, or the one
/// carrying the given lifetime label.
fn find_target_loop(ctx: &CompileContext, state: &TypeCheckState, life: Option<NodeId>) -> Option<NodeId> {
    let Some(life) = life else {
        return state.loops.last().copied();
    };
    let life_dcl = match ctx.arena[life].kind {
        NodeKind::VarNameUse { dcl, .. } => dcl,
        _ => life,
    };
    state
        .loops
        .iter()
        .rev()
        .copied()
        .find(|&l| matches!(ctx.arena[l].kind, NodeKind::Loop { life: Some(ll), .. } if ll == life_dcl))
}

fn tc_break(ctx: &mut CompileContext, state: &mut TypeCheckState, id: NodeId) {
    let NodeKind::Break { life, exp, .. } = ctx.arena[id].kind.clone() else { return };
    if let Some(exp) = exp {
        tc_expr(ctx, state, exp);
    }
    let Some(target) = find_target_loop(ctx, state, life) else {
        ctx.error_msg_node(id, ErrorKind::BadTerm, "break is not inside a loop");
        return;
    };
    if let NodeKind::Loop { breaks, .. } = &mut ctx.arena[target].kind {
        breaks.push(id);
    }
}

fn tc_continue(ctx: &mut CompileContext, state: &mut TypeCheckState, id: NodeId) {
    let NodeKind::Continue { life, .. } = ctx.arena[id].kind.clone() else { return };
    if find_target_loop(ctx, state, life).is_none() {
        ctx.error_msg_node(id, ErrorKind::BadTerm, "continue is not inside a loop");
    }
}

fn tc_return(ctx: &mut CompileContext, state: &mut TypeCheckState, id: NodeId) {
    let NodeKind::Return { exp, .. } = ctx.arena[id].kind.clone() else { return };
    let Some(fn_dcl) = state.fn_dcl else {
        ctx.error_msg_node(id, ErrorKind::BadTerm, "return outside of a function");
        return;
    };
    let sig = itype_get_type_dcl(&ctx.arena, ctx.arena[fn_dcl].vtype);
    let NodeKind::FnSig { rettype, .. } = ctx.arena[sig].kind.clone() else { return };
    if !tc_expr(ctx, state, exp) {
        return;
    }
    if matches!(ctx.arena[rettype].kind, NodeKind::Void) && matches!(ctx.arena[exp].kind, NodeKind::NilLit) {
        return;
    }
    match coerce(ctx, rettype, exp) {
        Some(new_exp) => {
            if let NodeKind::Return { exp, .. } = &mut ctx.arena[id].kind {
                *exp = new_exp;
            }
        }
        None => {
            ctx.error_msg_node(exp, ErrorKind::InvType, "Return expression's type does not match the function's return type");
        }
    }
}

// ---- declarations ----

fn tc_var_dcl(ctx: &mut CompileContext, state: &mut TypeCheckState, id: NodeId) {
    let NodeKind::VarDcl { value, .. } = ctx.arena[id].kind.clone() else { return };
    let declared = ctx.arena[id].vtype;
    let declared = if declared == NodeId::UNKNOWN { NodeId::UNKNOWN } else { tc_type(ctx, state, declared) };
    ctx.arena[id].vtype = declared;

    if let Some(value) = value {
        if !tc_expr(ctx, state, value) {
            return;
        }
        if declared == NodeId::UNKNOWN {
            let vt = ctx.arena[value].vtype;
            ctx.arena[id].vtype = vt;
        } else {
            match coerce(ctx, declared, value) {
                Some(new_value) => {
                    if let NodeKind::VarDcl { value, .. } = &mut ctx.arena[id].kind {
                        *value = Some(new_value);
                    }
                }
                None => {
                    ctx.error_msg_node(value, ErrorKind::InvType, "Initial value's type does not match the declared type");
                }
            }
        }
    } else if declared == NodeId::UNKNOWN {
        ctx.error_msg_node(id, ErrorKind::InvType, "Variable declaration needs a type or an initial value");
    }
}

/// Rewrites a body so its value escapes through explicit returns: a trailing
/// expression becomes `return exp` for non-void functions; void functions get
/// a trailing `return ()` when none is present. Idempotent.
fn fn_implicit_return(ctx: &mut CompileContext, rettype: NodeId, block: NodeId) {
    let NodeKind::Block { stmts } = ctx.arena[block].kind.clone() else { return };
    let span = ctx.arena[block].span;

    if stmts.is_empty() {
        let nil = ctx.nil(span);
        let ret = ctx.ret(nil, span);
        if let NodeKind::Block { stmts } = &mut ctx.arena[block].kind {
            stmts.push(ret);
        }
        return;
    }
    let last = *stmts.last().expect("non-empty");
    let ret_is_void = matches!(ctx.arena[itype_get_type_dcl(&ctx.arena, rettype)].kind, NodeKind::Void);
    if ret_is_void {
        if !matches!(ctx.arena[last].kind, NodeKind::Return { .. }) {
            let nil = ctx.nil(span);
            let ret = ctx.ret(nil, span);
            if let NodeKind::Block { stmts } = &mut ctx.arena[block].kind {
                stmts.push(ret);
            }
        }
    } else if ctx.arena[last].kind.is_exp() {
        let span = ctx.arena[last].span;
        let ret = ctx.ret(last, span);
        if let NodeKind::Block { stmts } = &mut ctx.arena[block].kind {
            *stmts.last_mut().expect("non-empty") = ret;
        }
    } else if !matches!(ctx.arena[last].kind, NodeKind::Return { .. }) {
        ctx.error_msg_node(last, ErrorKind::NoRet, "A return value is expected but this statement cannot give one.");
    }
}

pub(crate) fn fn_dcl_type_check(ctx: &mut CompileContext, state: &mut TypeCheckState, id: NodeId) {
    let NodeKind::FnDcl { body, method, generic, .. } = ctx.arena[id].kind.clone() else { return };
    // Generic functions wait for instantiation.
    if generic.is_some() {
        return;
    }

    let sig = ctx.arena[id].vtype;
    let sig = tc_type(ctx, state, sig);
    ctx.arena[id].vtype = sig;

    let Some(body) = body else { return };

    // Trait default method bodies are checked against the implementing type,
    // not the trait itself.
    if method
        && let Some(type_dcl) = state.type_dcl
        && ctx.arena[type_dcl].flags.contains(NodeFlags::TRAIT_TYPE)
    {
        return;
    }

    // A method's receiver must be, or refer to, its enclosing type.
    if method && let Some(type_dcl) = state.type_dcl {
        let sig_dcl = itype_get_type_dcl(&ctx.arena, sig);
        if let NodeKind::FnSig { parms, .. } = &ctx.arena[sig_dcl].kind {
            let self_ok = parms.first().is_some_and(|&selfparm| {
                itype_get_deref_type_dcl(&ctx.arena, ctx.arena[selfparm].vtype) == type_dcl
            });
            if !self_ok {
                ctx.error_msg_node(id, ErrorKind::InvType, "self parameter for a method must match, or be a reference to, its type");
            }
        }
    }

    let sig_dcl = itype_get_type_dcl(&ctx.arena, sig);
    let NodeKind::FnSig { rettype, .. } = ctx.arena[sig_dcl].kind.clone() else { return };
    fn_implicit_return(ctx, rettype, body);

    let saved = state.fn_dcl.replace(id);
    tc_node(ctx, state, body);
    state.fn_dcl = saved;

    // Flow analysis requires sound types; run it per function, immediately,
    // and only while the compilation is error free.
    if !ctx.errors.has_errors() {
        flow::fn_flow(ctx, id);
    }
}

fn tc_struct(ctx: &mut CompileContext, state: &mut TypeCheckState, id: NodeId) {
    let NodeKind::Struct { fields, methods, .. } = ctx.arena[id].kind.clone() else { return };
    let mut moves = false;
    for &field in &fields {
        let ft = ctx.arena[field].vtype;
        let canon = tc_type(ctx, state, ft);
        ctx.arena[field].vtype = canon;
        moves |= crate::itype::itype_is_move(&ctx.arena, canon);
    }
    // A struct holding a move-only value is itself move-only.
    if moves {
        ctx.arena[id].flags.insert(NodeFlags::MOVE);
    }
    let saved = state.type_dcl.replace(id);
    for method in methods {
        fn_dcl_type_check(ctx, state, method);
    }
    state.type_dcl = saved;
}

/// Type checks one statement or declaration. Exhaustive over the node sum.
pub(crate) fn tc_node(ctx: &mut CompileContext, state: &mut TypeCheckState, id: NodeId) {
    match &ctx.arena[id].kind {
        NodeKind::VarDcl { .. } => tc_var_dcl(ctx, state, id),
        NodeKind::ConstDcl { .. } => {
            let NodeKind::ConstDcl { value, .. } = ctx.arena[id].kind.clone() else { return };
            let declared = ctx.arena[id].vtype;
            if tc_expr(ctx, state, value) && declared != NodeId::UNKNOWN && coerce(ctx, declared, value).is_none() {
                ctx.error_msg_node(value, ErrorKind::InvType, "Constant's value does not match its declared type");
            }
            if declared == NodeId::UNKNOWN {
                let vt = ctx.arena[value].vtype;
                ctx.arena[id].vtype = vt;
            }
        }
        NodeKind::FnDcl { .. } => fn_dcl_type_check(ctx, state, id),
        NodeKind::Struct { .. } => tc_struct(ctx, state, id),
        NodeKind::Typedef { .. } => {
            tc_type(ctx, state, id);
        }
        NodeKind::Import { .. } | NodeKind::GenericParam { .. } | NodeKind::LifetimeDcl { .. } => {}
        NodeKind::Module { .. } => {
            let NodeKind::Module { nodes, .. } = ctx.arena[id].kind.clone() else { return };
            for n in nodes {
                tc_node(ctx, state, n);
            }
        }
        NodeKind::Program { .. } => {
            let NodeKind::Program { modules } = ctx.arena[id].kind.clone() else { return };
            for m in modules {
                tc_node(ctx, state, m);
            }
        }
        NodeKind::FieldDcl { .. } => {
            let ft = ctx.arena[id].vtype;
            let canon = tc_type(ctx, state, ft);
            ctx.arena[id].vtype = canon;
        }
        NodeKind::Return { .. } => tc_return(ctx, state, id),
        NodeKind::Break { .. } => tc_break(ctx, state, id),
        NodeKind::Continue { .. } => tc_continue(ctx, state, id),
        NodeKind::Block { .. } => tc_block(ctx, state, id),
        NodeKind::Assign { .. } => tc_assign(ctx, state, id),
        _ => {
            let is_exp = ctx.arena[id].kind.is_exp();
            let is_type = ctx.arena[id].kind.is_type();
            if is_exp {
                tc_expr(ctx, state, id);
            } else if is_type {
                tc_type(ctx, state, id);
            } else {
                ctx.internal_error(id, "statement kind the type checker cannot handle");
            }
        }
    }
}
