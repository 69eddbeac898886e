//! Generic instantiation by deep clone.
//!
//! A generic function is parsed and name-resolved but never type-checked;
//! each instantiation deep-clones the declaration with generic-parameter uses
//! substituted by the supplied type arguments, then runs the normal checks
//! over the clone. The substitution map doubles as the declaration remap
//! table: cloned declarations register themselves so later cloned uses link
//! to the clone instead of the original.

use ahash::AHashMap;

use crate::{
    context::CompileContext,
    errors::ErrorKind,
    node::{DealiasList, Node, NodeId, NodeKind},
    typecheck::{TypeCheckState, fn_dcl_type_check},
};

pub(crate) struct CloneState {
    /// Old declaration (or generic parameter) to its replacement.
    map: AHashMap<NodeId, NodeId>,
}

/// Instantiates a generic function with the given type arguments, returning
/// the fully checked instance declaration.
pub fn instantiate_fn(ctx: &mut CompileContext, fn_dcl: NodeId, type_args: &[NodeId]) -> Option<NodeId> {
    let NodeKind::FnDcl { generic, .. } = &ctx.arena[fn_dcl].kind else {
        ctx.error_msg_node(fn_dcl, ErrorKind::NotFn, "Only functions may be instantiated");
        return None;
    };
    let Some(generic) = generic else {
        ctx.error_msg_node(fn_dcl, ErrorKind::BadTerm, "Function is not generic and cannot take type arguments");
        return None;
    };
    let parms = generic.parms.clone();
    if type_args.len() > parms.len() {
        ctx.error_msg_node(fn_dcl, ErrorKind::ManyArgs, "Too many type arguments for generic function");
        return None;
    }
    if type_args.len() < parms.len() {
        ctx.error_msg_node(fn_dcl, ErrorKind::FewArgs, "Too few type arguments for generic function");
        return None;
    }

    let mut cstate = CloneState { map: AHashMap::new() };
    for (&parm, &arg) in parms.iter().zip(type_args) {
        cstate.map.insert(parm, arg);
    }
    let inst = clone_node(ctx, &mut cstate, fn_dcl);
    if let NodeKind::FnDcl { generic, .. } = &mut ctx.arena[inst].kind {
        *generic = None;
    }

    let mut state = TypeCheckState { fn_dcl: None, type_dcl: None, loops: Vec::new() };
    fn_dcl_type_check(ctx, &mut state, inst);
    Some(inst)
}

/// Deep-copies a node, remapping declaration links through the clone table.
/// Shared leaf types (builtins, structs, sentinels) are not duplicated.
pub(crate) fn clone_node(ctx: &mut CompileContext, cstate: &mut CloneState, id: NodeId) -> NodeId {
    if let Some(&mapped) = cstate.map.get(&id) {
        return mapped;
    }
    let Node { span, flags, vtype, kind } = ctx.arena[id].clone();

    // Clone the header type first: for declarations this is the declared
    // type, and a function's parameters must register before its body clones.
    let vtype = match kind {
        NodeKind::UintNbr { .. }
        | NodeKind::IntNbr { .. }
        | NodeKind::FloatNbr { .. }
        | NodeKind::Perm { .. }
        | NodeKind::BorrowRegion
        | NodeKind::Void
        | NodeKind::Unknown
        | NodeKind::Struct { .. }
        | NodeKind::Module { .. }
        | NodeKind::Program { .. }
        | NodeKind::Import { .. } => vtype,
        _ => clone_node(ctx, cstate, vtype),
    };

    let kind = match kind {
        // Shared singletons and nominal declarations are never duplicated.
        NodeKind::UintNbr { .. }
        | NodeKind::IntNbr { .. }
        | NodeKind::FloatNbr { .. }
        | NodeKind::Perm { .. }
        | NodeKind::BorrowRegion
        | NodeKind::Void
        | NodeKind::Unknown
        | NodeKind::Struct { .. }
        | NodeKind::Module { .. }
        | NodeKind::Program { .. }
        | NodeKind::Import { .. } => return id,

        NodeKind::ULit { .. } | NodeKind::FLit { .. } | NodeKind::StringLit { .. } | NodeKind::NilLit => kind,
        NodeKind::NameUse { name } => NodeKind::NameUse { name },
        NodeKind::VarNameUse { name, dcl } => NodeKind::VarNameUse { name, dcl: remap(cstate, dcl) },
        NodeKind::TypeNameUse { name, dcl } => NodeKind::TypeNameUse { name, dcl: remap(cstate, dcl) },
        NodeKind::FieldNameUse { name, .. } => NodeKind::FieldNameUse { name, dcl: None },

        NodeKind::FldAccess { obj, field } => NodeKind::FldAccess {
            obj: clone_node(ctx, cstate, obj),
            field: clone_node(ctx, cstate, field),
        },
        NodeKind::Deref { exp } => NodeKind::Deref { exp: clone_node(ctx, cstate, exp) },
        NodeKind::Element { exp, index } => NodeKind::Element {
            exp: clone_node(ctx, cstate, exp),
            index: clone_node(ctx, cstate, index),
        },
        NodeKind::Borrow { exp, perm } => NodeKind::Borrow {
            exp: clone_node(ctx, cstate, exp),
            perm: clone_node(ctx, cstate, perm),
        },
        NodeKind::Allocate { region, perm, exp } => NodeKind::Allocate {
            region: clone_node(ctx, cstate, region),
            perm: clone_node(ctx, cstate, perm),
            exp: clone_node(ctx, cstate, exp),
        },
        NodeKind::Assign { lval, rval } => NodeKind::Assign {
            lval: clone_node(ctx, cstate, lval),
            rval: clone_node(ctx, cstate, rval),
        },
        NodeKind::FnCall { callee, args } => NodeKind::FnCall {
            callee: clone_node(ctx, cstate, callee),
            args: args.into_iter().map(|a| clone_node(ctx, cstate, a)).collect(),
        },
        NodeKind::Convert { exp, kind } => NodeKind::Convert { exp: clone_node(ctx, cstate, exp), kind },
        NodeKind::Block { stmts } => NodeKind::Block {
            stmts: stmts.into_iter().map(|s| clone_node(ctx, cstate, s)).collect(),
        },
        NodeKind::Return { exp, .. } => NodeKind::Return {
            exp: clone_node(ctx, cstate, exp),
            dealias: DealiasList::new(),
        },
        NodeKind::Break { life, exp, .. } => NodeKind::Break {
            life: life.map(|l| clone_node(ctx, cstate, l)),
            exp: exp.map(|e| clone_node(ctx, cstate, e)),
            dealias: DealiasList::new(),
        },
        NodeKind::Continue { life, .. } => NodeKind::Continue {
            life: life.map(|l| clone_node(ctx, cstate, l)),
            dealias: DealiasList::new(),
        },
        NodeKind::Loop { body, life, .. } => {
            let life = life.map(|l| clone_node(ctx, cstate, l));
            NodeKind::Loop { body: clone_node(ctx, cstate, body), life, breaks: Vec::new() }
        }
        NodeKind::VTuple { elems } => NodeKind::VTuple {
            elems: elems.into_iter().map(|e| clone_node(ctx, cstate, e)).collect(),
        },
        NodeKind::ArrayLit { dimens, elems } => NodeKind::ArrayLit {
            dimens: dimens.into_iter().map(|d| clone_node(ctx, cstate, d)).collect(),
            elems: elems.into_iter().map(|e| clone_node(ctx, cstate, e)).collect(),
        },

        NodeKind::VarDcl { name, perm, value, scope, .. } => NodeKind::VarDcl {
            name,
            perm: clone_node(ctx, cstate, perm),
            value: value.map(|v| clone_node(ctx, cstate, v)),
            scope,
            flow: crate::node::FlowFlags::NONE,
        },
        NodeKind::ConstDcl { name, value } => NodeKind::ConstDcl { name, value: clone_node(ctx, cstate, value) },
        NodeKind::FnDcl { name, body, method, .. } => NodeKind::FnDcl {
            name,
            body: body.map(|b| clone_node(ctx, cstate, b)),
            method,
            generic: None,
        },
        NodeKind::FieldDcl { name, perm } => NodeKind::FieldDcl { name, perm: clone_node(ctx, cstate, perm) },
        NodeKind::Typedef { name, typeval } => NodeKind::Typedef { name, typeval: clone_node(ctx, cstate, typeval) },
        NodeKind::GenericParam { name } => NodeKind::GenericParam { name },
        NodeKind::LifetimeDcl { name } => NodeKind::LifetimeDcl { name },

        NodeKind::Ref(r) | NodeKind::VirtRef(r) | NodeKind::ArrayRef(r) | NodeKind::ArrayDeref(r) => {
            let cloned = crate::node::RefType {
                region: clone_node(ctx, cstate, r.region),
                perm: clone_node(ctx, cstate, r.perm),
                vtexp: clone_node(ctx, cstate, r.vtexp),
                scope: r.scope,
            };
            match ctx.arena[id].kind {
                NodeKind::VirtRef(_) => NodeKind::VirtRef(cloned),
                NodeKind::ArrayRef(_) => NodeKind::ArrayRef(cloned),
                NodeKind::ArrayDeref(_) => NodeKind::ArrayDeref(cloned),
                _ => NodeKind::Ref(cloned),
            }
        }
        NodeKind::Ptr { vtexp } => NodeKind::Ptr { vtexp: clone_node(ctx, cstate, vtexp) },
        NodeKind::ArrayType { dim, elem } => NodeKind::ArrayType { dim, elem: clone_node(ctx, cstate, elem) },
        NodeKind::TTuple { types } => NodeKind::TTuple {
            types: types.into_iter().map(|t| clone_node(ctx, cstate, t)).collect(),
        },
        NodeKind::FnSig { parms, rettype } => NodeKind::FnSig {
            parms: parms.into_iter().map(|p| clone_node(ctx, cstate, p)).collect(),
            rettype: clone_node(ctx, cstate, rettype),
        },
    };

    let new_id = ctx.arena.push(Node { span, flags, vtype, kind });

    // Memoize every clone: shared subgraphs stay shared, and later uses of a
    // cloned declaration link to the clone.
    cstate.map.insert(id, new_id);
    new_id
}

fn remap(cstate: &CloneState, dcl: NodeId) -> NodeId {
    cstate.map.get(&dcl).copied().unwrap_or(dcl)
}
