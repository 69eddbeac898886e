//! Reference subtyping: regions, permissions and referent variance.
//!
//! A reference aggregates three orthogonal components — region, permission
//! and referent value type — and each contributes to the subtype decision in
//! its own way. Regions may only widen to the `borrow` sentinel. Permissions
//! decide both their own match and the variance of the referent match: a
//! read-only target is covariant in the referent, a write-only target
//! contravariant, a read-write target invariant.

use crate::{
    context::CompileContext,
    errors::ErrorKind,
    itype::{
        SubtypeConstraint, TypeCompare, itype_get_type_dcl, itype_is_move, itype_is_same, itype_matches,
        perm_attrs_of, perm_is_same, struct_find_super,
    },
    node::{NodeArena, NodeFlags, NodeId, NodeKind, RefType},
    permission::{PermAttrs, perm_matches},
    vtable,
};

/// Copies the region/permission/referent of any reference-kinded node.
pub(crate) fn ref_parts(arena: &NodeArena, id: NodeId) -> Option<RefType> {
    match &arena[id].kind {
        NodeKind::Ref(r) | NodeKind::VirtRef(r) | NodeKind::ArrayRef(r) | NodeKind::ArrayDeref(r) => Some(*r),
        _ => None,
    }
}

/// Will a reference in region `from` coerce to one in region `to`?
///
/// Identical regions match exactly; any owned region may be viewed as a
/// borrow for free; nothing else matches.
pub fn region_matches(arena: &NodeArena, to: NodeId, from: NodeId) -> TypeCompare {
    if itype_is_same(arena, to, from) {
        return TypeCompare::EqMatch;
    }
    if itype_get_type_dcl(arena, to) == NodeId::BORROW {
        return TypeCompare::CastSubtype;
    }
    TypeCompare::NoMatch
}

/// Region and permission matching shared by every reference matcher.
/// Returns the running result (`EqMatch` or `CastSubtype`) or `NoMatch`.
fn region_perm_matches(arena: &NodeArena, to: &RefType, from: &RefType) -> TypeCompare {
    let mut result = region_matches(arena, to.region, from.region);
    if result == TypeCompare::NoMatch {
        return TypeCompare::NoMatch;
    }
    let same = perm_is_same(arena, to.perm, from.perm);
    match perm_matches(perm_attrs_of(arena, to.perm), perm_attrs_of(arena, from.perm), same) {
        TypeCompare::NoMatch => return TypeCompare::NoMatch,
        TypeCompare::CastSubtype => result = TypeCompare::CastSubtype,
        _ => {}
    }
    result
}

/// Will `from` (a plain or array reference) coerce to `to` of the same kind?
pub(crate) fn ref_matches(ctx: &mut CompileContext, to: NodeId, from: NodeId, constraint: SubtypeConstraint) -> TypeCompare {
    let (Some(to_r), Some(from_r)) = (ref_parts(&ctx.arena, to), ref_parts(&ctx.arena, from)) else {
        return TypeCompare::NoMatch;
    };
    let result = region_perm_matches(&ctx.arena, &to_r, &from_r);
    if result == TypeCompare::NoMatch {
        return TypeCompare::NoMatch;
    }

    // Referent variance is driven by the target permission's access rights.
    let access = perm_attrs_of(&ctx.arena, to_r.perm) & (PermAttrs::MAY_READ | PermAttrs::MAY_WRITE);
    let vmatch = if access == PermAttrs::MAY_WRITE {
        itype_matches(ctx, from_r.vtexp, to_r.vtexp, SubtypeConstraint::Regref)
    } else if access.contains(PermAttrs::MAY_READ | PermAttrs::MAY_WRITE) {
        return if itype_is_same(&ctx.arena, to_r.vtexp, from_r.vtexp) { result } else { TypeCompare::NoMatch };
    } else {
        itype_matches(ctx, to_r.vtexp, from_r.vtexp, SubtypeConstraint::Regref)
    };
    match vmatch {
        TypeCompare::EqMatch => result,
        TypeCompare::CastSubtype => TypeCompare::CastSubtype,
        TypeCompare::ConvSubtype => {
            if constraint == SubtypeConstraint::Monomorph {
                TypeCompare::NoMatch
            } else {
                TypeCompare::ConvSubtype
            }
        }
        TypeCompare::NoMatch => TypeCompare::NoMatch,
    }
}

/// Will a plain reference coerce to a virtual reference?
///
/// Always a runtime conversion (the vtable pointer must be attached), so it
/// never applies under monomorphization. Matching a struct against the trait
/// also synthesizes the vtable.
pub(crate) fn refvirt_matches_ref(
    ctx: &mut CompileContext,
    to: NodeId,
    from: NodeId,
    constraint: SubtypeConstraint,
) -> TypeCompare {
    if constraint == SubtypeConstraint::Monomorph {
        return TypeCompare::NoMatch;
    }
    let (Some(to_r), Some(from_r)) = (ref_parts(&ctx.arena, to), ref_parts(&ctx.arena, from)) else {
        return TypeCompare::NoMatch;
    };
    if region_perm_matches(&ctx.arena, &to_r, &from_r) == TypeCompare::NoMatch {
        return TypeCompare::NoMatch;
    }

    // No mutability-driven variance here: a virtual reference never changes
    // the value's underlying type, only the view on it.
    let to_dcl = itype_get_type_dcl(&ctx.arena, to_r.vtexp);
    let from_dcl = itype_get_type_dcl(&ctx.arena, from_r.vtexp);
    if !matches!(ctx.arena[to_dcl].kind, NodeKind::Struct { .. })
        || !matches!(ctx.arena[from_dcl].kind, NodeKind::Struct { .. })
    {
        return TypeCompare::NoMatch;
    }

    // Same value type: legal only for a closed, tagged trait, where the tag
    // selects the vtable at runtime.
    if to_dcl == from_dcl {
        return if ctx.arena[from_dcl].flags.contains(NodeFlags::HAS_TAG_FIELD) {
            TypeCompare::ConvSubtype
        } else {
            TypeCompare::NoMatch
        };
    }

    match vtable::struct_virtref_matches(ctx, to_dcl, from_dcl) {
        TypeCompare::NoMatch => TypeCompare::NoMatch,
        // Creating a virtual reference is always a conversion.
        _ => TypeCompare::ConvSubtype,
    }
}

/// Will one virtual reference coerce to another?
///
/// The referent must be identical; only region and permission may widen.
pub(crate) fn refvirt_matches(
    ctx: &mut CompileContext,
    to: NodeId,
    from: NodeId,
    constraint: SubtypeConstraint,
) -> TypeCompare {
    let (Some(to_r), Some(from_r)) = (ref_parts(&ctx.arena, to), ref_parts(&ctx.arena, from)) else {
        return TypeCompare::NoMatch;
    };
    if !itype_is_same(&ctx.arena, to_r.vtexp, from_r.vtexp) {
        return TypeCompare::NoMatch;
    }
    ref_matches(ctx, to, from, constraint)
}

/// Will a plain reference coerce to an array reference?
///
/// The reference is reinterpreted as a length-1 array, which builds a fat
/// pointer at runtime.
pub(crate) fn arrayref_matches_ref(
    ctx: &mut CompileContext,
    to: NodeId,
    from: NodeId,
    constraint: SubtypeConstraint,
) -> TypeCompare {
    if constraint == SubtypeConstraint::Monomorph {
        return TypeCompare::NoMatch;
    }
    let (Some(to_r), Some(from_r)) = (ref_parts(&ctx.arena, to), ref_parts(&ctx.arena, from)) else {
        return TypeCompare::NoMatch;
    };
    if region_perm_matches(&ctx.arena, &to_r, &from_r) == TypeCompare::NoMatch {
        return TypeCompare::NoMatch;
    }
    if itype_is_same(&ctx.arena, to_r.vtexp, from_r.vtexp) {
        TypeCompare::ConvSubtype
    } else {
        TypeCompare::NoMatch
    }
}

/// Supertype join of two references: regions and permissions must agree
/// exactly, referents must have a struct join.
pub(crate) fn ref_find_super(ctx: &mut CompileContext, a: NodeId, b: NodeId) -> Option<NodeId> {
    let (a_r, b_r) = (ref_parts(&ctx.arena, a)?, ref_parts(&ctx.arena, b)?);
    if itype_get_type_dcl(&ctx.arena, a_r.region) != itype_get_type_dcl(&ctx.arena, b_r.region)
        || !perm_is_same(&ctx.arena, a_r.perm, b_r.perm)
    {
        return None;
    }
    let a_vt = itype_get_type_dcl(&ctx.arena, a_r.vtexp);
    let b_vt = itype_get_type_dcl(&ctx.arena, b_r.vtexp);
    let joined = struct_find_super(&ctx.arena, a_vt, b_vt)?;

    let span = ctx.arena[a].span;
    let is_virt = matches!(ctx.arena[a].kind, NodeKind::VirtRef(_));
    let id = if is_virt {
        ctx.virt_ref_type(a_r.region, a_r.perm, joined, span)
    } else {
        ctx.ref_type(a_r.region, a_r.perm, joined, span)
    };
    ref_adopt_infections(ctx, id);
    Some(id)
}

/// Propagates move/thread infection from a reference's components onto the
/// reference itself. Waits until permission and referent are known.
pub(crate) fn ref_adopt_infections(ctx: &mut CompileContext, id: NodeId) {
    let Some(r) = ref_parts(&ctx.arena, id) else { return };
    if r.perm == NodeId::UNKNOWN || r.vtexp == NodeId::UNKNOWN {
        return;
    }
    let mut flags = ctx.arena[id].flags;
    let perm = perm_attrs_of(&ctx.arena, r.perm);
    if !perm.contains(PermAttrs::MAY_ALIAS) || itype_is_move(&ctx.arena, r.region) {
        flags.insert(NodeFlags::MOVE);
    }
    let vt_flags = crate::itype::itype_flags(&ctx.arena, r.vtexp);
    if !perm.contains(PermAttrs::RACE_SAFE) || vt_flags.contains(NodeFlags::THREAD_BOUND) {
        flags.insert(NodeFlags::THREAD_BOUND);
    }
    ctx.arena[id].flags = flags;
}

/// Fills in a reference type's defaults, validates its region, propagates
/// infections and normalizes it through the type table. Returns the
/// canonical node for the structural type.
pub(crate) fn ref_type_check(ctx: &mut CompileContext, id: NodeId) -> NodeId {
    let Some(r) = ref_parts(&ctx.arena, id) else { return id };

    if r.perm == NodeId::UNKNOWN {
        let vtexp_dcl = itype_get_type_dcl(&ctx.arena, r.vtexp);
        let default = if matches!(ctx.arena[vtexp_dcl].kind, NodeKind::FnSig { .. }) {
            ctx.core.id_perm
        } else if itype_get_type_dcl(&ctx.arena, r.region) == NodeId::BORROW {
            ctx.core.const_perm
        } else {
            ctx.core.mut_perm
        };
        match &mut ctx.arena[id].kind {
            NodeKind::Ref(r) | NodeKind::VirtRef(r) | NodeKind::ArrayRef(r) | NodeKind::ArrayDeref(r) => {
                r.perm = default;
            }
            _ => {}
        }
    }

    let region_dcl = itype_get_type_dcl(&ctx.arena, r.region);
    if region_dcl != NodeId::BORROW && !matches!(ctx.arena[region_dcl].kind, NodeKind::Struct { .. }) {
        ctx.error_msg_node(id, ErrorKind::InvType, "Reference's region must be a struct type.");
    }

    ref_adopt_infections(ctx, id);
    ctx.normalize_type(id)
}

/// Type checks a virtual reference: the referent must be a struct or trait.
/// Vtables themselves are synthesized at coercion sites.
pub(crate) fn refvirt_type_check(ctx: &mut CompileContext, id: NodeId) -> NodeId {
    let Some(r) = ref_parts(&ctx.arena, id) else { return id };

    if r.perm == NodeId::UNKNOWN {
        let default = if itype_get_type_dcl(&ctx.arena, r.region) == NodeId::BORROW {
            ctx.core.const_perm
        } else {
            ctx.core.mut_perm
        };
        if let NodeKind::VirtRef(r) = &mut ctx.arena[id].kind {
            r.perm = default;
        }
    }

    let vtexp_dcl = itype_get_type_dcl(&ctx.arena, r.vtexp);
    if !matches!(ctx.arena[vtexp_dcl].kind, NodeKind::Struct { .. }) {
        ctx.error_msg_node(id, ErrorKind::InvType, "A virtual reference must be to a struct or trait.");
        return id;
    }

    ref_adopt_infections(ctx, id);
    ctx.normalize_type(id)
}
