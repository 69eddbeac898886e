//! Generic type node handling: structural equality, hashing, subtype
//! dispatch and the supertype join.
//!
//! Types are ordinary nodes, so every entry point first strips name-use and
//! typedef indirection down to the declaration node (`itype_get_type_dcl`)
//! and then dispatches on the tag. Two equality relations exist: the static
//! one (`itype_is_same`) and the runtime one (`itype_is_run_same`), which
//! treats all permissions as equal because permissions are erased at runtime.
//! The type table buckets by `itype_hash` and compares with the runtime
//! relation, so the hash must agree with it.

use crate::{
    context::CompileContext,
    node::{NodeArena, NodeFlags, NodeId, NodeKind, RefType},
    permission::PermAttrs,
    refmatch,
};

/// Outcome of a subtype query: how `from` may be used where `to` is expected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, strum::Display)]
pub enum TypeCompare {
    /// The types are identical.
    EqMatch,
    /// Usable as-is; the reinterpretation is free at runtime.
    CastSubtype,
    /// Usable only through a runtime conversion.
    ConvSubtype,
    /// Not usable.
    NoMatch,
}

/// Context of a subtype query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SubtypeConstraint {
    /// Compile-time instantiation: runtime conversions are refused.
    Monomorph,
    /// Variance check on a referent inside a reference.
    Regref,
    /// Ordinary coercion site: every conversion is allowed.
    Coerce,
}

/// Strips `TypeNameUse` and `Typedef` indirection down to the declaration.
pub fn itype_get_type_dcl(arena: &NodeArena, mut node: NodeId) -> NodeId {
    loop {
        match &arena[node].kind {
            NodeKind::TypeNameUse { dcl, .. } => node = *dcl,
            NodeKind::Typedef { typeval, .. } => node = *typeval,
            _ => return node,
        }
    }
}

/// Like [`itype_get_type_dcl`], but also steps through one reference or
/// pointer layer to its referent's declaration.
pub fn itype_get_deref_type_dcl(arena: &NodeArena, node: NodeId) -> NodeId {
    let dcl = itype_get_type_dcl(arena, node);
    match &arena[dcl].kind {
        NodeKind::Ref(r) | NodeKind::VirtRef(r) | NodeKind::ArrayDeref(r) => itype_get_type_dcl(arena, r.vtexp),
        NodeKind::Ptr { vtexp } => itype_get_type_dcl(arena, *vtexp),
        _ => dcl,
    }
}

/// Flags of a type, read through indirection.
pub fn itype_flags(arena: &NodeArena, node: NodeId) -> NodeFlags {
    arena[itype_get_type_dcl(arena, node)].flags
}

/// True if the type moves rather than copies on assignment.
pub fn itype_is_move(arena: &NodeArena, node: NodeId) -> bool {
    itype_flags(arena, node).contains(NodeFlags::MOVE)
}

/// True if the type has a concrete, instantiable value.
pub fn itype_is_concrete(arena: &NodeArena, node: NodeId) -> bool {
    !itype_flags(arena, node).contains(NodeFlags::OPAQUE)
}

/// True if values of the type occupy no storage.
pub fn itype_is_zero_size(arena: &NodeArena, node: NodeId) -> bool {
    itype_flags(arena, node).contains(NodeFlags::ZERO_SIZE)
}

/// Attribute bitset of a permission node (through indirection).
pub(crate) fn perm_attrs_of(arena: &NodeArena, perm: NodeId) -> PermAttrs {
    match &arena[itype_get_type_dcl(arena, perm)].kind {
        NodeKind::Perm { attrs, .. } => *attrs,
        _ => PermAttrs::NONE,
    }
}

/// Permission identity: permissions are a closed set of singletons.
pub(crate) fn perm_is_same(arena: &NodeArena, a: NodeId, b: NodeId) -> bool {
    itype_get_type_dcl(arena, a) == itype_get_type_dcl(arena, b)
}

fn fn_sig_equal(arena: &NodeArena, aparms: &[NodeId], aret: NodeId, bparms: &[NodeId], bret: NodeId) -> bool {
    aparms.len() == bparms.len()
        && itype_is_same(arena, aret, bret)
        && aparms
            .iter()
            .zip(bparms)
            .all(|(&ap, &bp)| itype_is_same(arena, arena[ap].vtype, arena[bp].vtype))
}

fn ref_is_same(arena: &NodeArena, a: &RefType, b: &RefType) -> bool {
    itype_is_same(arena, a.vtexp, b.vtexp)
        && perm_is_same(arena, a.perm, b.perm)
        && itype_is_same(arena, a.region, b.region)
}

fn ref_is_run_same(arena: &NodeArena, a: &RefType, b: &RefType) -> bool {
    itype_is_same(arena, a.vtexp, b.vtexp) && itype_is_run_same(arena, a.region, b.region)
}

/// Nominal or structural type identity.
pub fn itype_is_same(arena: &NodeArena, a: NodeId, b: NodeId) -> bool {
    let a = itype_get_type_dcl(arena, a);
    let b = itype_get_type_dcl(arena, b);
    if a == b {
        return true;
    }
    match (&arena[a].kind, &arena[b].kind) {
        (NodeKind::Ref(ra), NodeKind::Ref(rb))
        | (NodeKind::VirtRef(ra), NodeKind::VirtRef(rb))
        | (NodeKind::ArrayRef(ra), NodeKind::ArrayRef(rb))
        | (NodeKind::ArrayDeref(ra), NodeKind::ArrayDeref(rb)) => ref_is_same(arena, ra, rb),
        (NodeKind::Ptr { vtexp: va }, NodeKind::Ptr { vtexp: vb }) => itype_is_same(arena, *va, *vb),
        (NodeKind::ArrayType { dim: da, elem: ea }, NodeKind::ArrayType { dim: db, elem: eb }) => {
            da == db && itype_is_same(arena, *ea, *eb)
        }
        (NodeKind::TTuple { types: ta }, NodeKind::TTuple { types: tb }) => {
            ta.len() == tb.len() && ta.iter().zip(tb).all(|(&x, &y)| itype_is_same(arena, x, y))
        }
        (
            NodeKind::FnSig { parms: pa, rettype: ra },
            NodeKind::FnSig { parms: pb, rettype: rb },
        ) => fn_sig_equal(arena, pa, *ra, pb, *rb),
        (NodeKind::UintNbr { name: na, bits: ba }, NodeKind::UintNbr { name: nb, bits: bb })
        | (NodeKind::IntNbr { name: na, bits: ba }, NodeKind::IntNbr { name: nb, bits: bb })
        | (NodeKind::FloatNbr { name: na, bits: ba }, NodeKind::FloatNbr { name: nb, bits: bb }) => {
            na == nb && ba == bb
        }
        (NodeKind::Void, NodeKind::Void) => true,
        (NodeKind::Perm { name: na, .. }, NodeKind::Perm { name: nb, .. }) => na == nb,
        _ => false,
    }
}

/// Type identity as observed at runtime: permissions are erased and compare
/// equal. Companion of [`itype_hash`] for type-table indexing.
pub fn itype_is_run_same(arena: &NodeArena, a: NodeId, b: NodeId) -> bool {
    let a = itype_get_type_dcl(arena, a);
    let b = itype_get_type_dcl(arena, b);
    if a == b {
        return true;
    }
    match (&arena[a].kind, &arena[b].kind) {
        (NodeKind::Ref(ra), NodeKind::Ref(rb))
        | (NodeKind::VirtRef(ra), NodeKind::VirtRef(rb))
        | (NodeKind::ArrayRef(ra), NodeKind::ArrayRef(rb))
        | (NodeKind::ArrayDeref(ra), NodeKind::ArrayDeref(rb)) => ref_is_run_same(arena, ra, rb),
        (NodeKind::Perm { .. }, NodeKind::Perm { .. }) => true,
        _ => itype_is_same(arena, a, b),
    }
}

const DJB2_SEED: u64 = 5381;
/// All static permissions hash alike; they are erased at runtime.
const PERM_HASH: u64 = 0x9e37;

fn djb2_mix(hash: u64, val: u64) -> u64 {
    (hash << 5).wrapping_add(hash) ^ val
}

fn ref_hash(arena: &NodeArena, tag: u64, r: &RefType) -> u64 {
    let mut hash = DJB2_SEED + tag;
    hash = djb2_mix(hash, itype_hash(arena, r.region));
    hash = djb2_mix(hash, PERM_HASH);
    // Hash the referent slot, not the node's inferred vtype, so the hash
    // agrees with `itype_is_run_same`.
    djb2_mix(hash, itype_hash(arena, r.vtexp))
}

/// Structural hash for type-table indexing.
///
/// Invariant: `itype_is_run_same(a, b)` implies `itype_hash(a) ==
/// itype_hash(b)`. Nominal types hash by declaration identity; structural
/// types hash by shape.
pub fn itype_hash(arena: &NodeArena, node: NodeId) -> u64 {
    let dcl = itype_get_type_dcl(arena, node);
    match &arena[dcl].kind {
        NodeKind::Ref(r) => ref_hash(arena, 1, r),
        NodeKind::VirtRef(r) => ref_hash(arena, 2, r),
        NodeKind::ArrayRef(r) => ref_hash(arena, 3, r),
        NodeKind::ArrayDeref(r) => ref_hash(arena, 4, r),
        NodeKind::Ptr { vtexp } => djb2_mix(DJB2_SEED + 5, itype_hash(arena, *vtexp)),
        NodeKind::Perm { .. } => PERM_HASH,
        NodeKind::ArrayType { dim, elem } => {
            djb2_mix(djb2_mix(DJB2_SEED + 6, *dim), itype_hash(arena, *elem))
        }
        NodeKind::TTuple { types } => types
            .iter()
            .fold(DJB2_SEED + 7, |hash, &t| djb2_mix(hash, itype_hash(arena, t))),
        NodeKind::FnSig { parms, rettype } => {
            let hash = parms
                .iter()
                .fold(DJB2_SEED + 8, |hash, &p| djb2_mix(hash, itype_hash(arena, arena[p].vtype)));
            djb2_mix(hash, itype_hash(arena, *rettype))
        }
        NodeKind::Void => DJB2_SEED + 9,
        _ => (dcl.index() as u64) | 0x8000_0000_0000_0000,
    }
}

fn nbr_bits(arena: &NodeArena, node: NodeId) -> Option<(u8, u16)> {
    match &arena[node].kind {
        NodeKind::UintNbr { bits, .. } => Some((0, *bits)),
        NodeKind::IntNbr { bits, .. } => Some((1, *bits)),
        NodeKind::FloatNbr { bits, .. } => Some((2, *bits)),
        _ => None,
    }
}

/// Numeric subtype rule: widening within the same signedness family is a
/// conversion; narrowing and cross-family moves are rejected.
fn nbr_matches(arena: &NodeArena, to: NodeId, from: NodeId) -> TypeCompare {
    let (Some((tofam, tobits)), Some((fromfam, frombits))) = (nbr_bits(arena, to), nbr_bits(arena, from)) else {
        return TypeCompare::NoMatch;
    };
    if tofam != fromfam {
        return TypeCompare::NoMatch;
    }
    if tobits >= frombits {
        TypeCompare::ConvSubtype
    } else {
        TypeCompare::NoMatch
    }
}

/// Coarse tag used to dispatch subtype queries without borrowing the arena
/// across the reference matchers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TypTag {
    Nbr,
    Struct,
    Structural,
    Ref,
    VirtRef,
    ArrayRef,
    Ptr,
    Void,
    Other,
}

fn typ_tag(kind: &NodeKind) -> TypTag {
    match kind {
        NodeKind::UintNbr { .. } | NodeKind::IntNbr { .. } | NodeKind::FloatNbr { .. } => TypTag::Nbr,
        NodeKind::Struct { .. } => TypTag::Struct,
        NodeKind::TTuple { .. } | NodeKind::ArrayType { .. } | NodeKind::FnSig { .. } => TypTag::Structural,
        NodeKind::Ref(_) => TypTag::Ref,
        NodeKind::VirtRef(_) => TypTag::VirtRef,
        NodeKind::ArrayRef(_) => TypTag::ArrayRef,
        NodeKind::Ptr { .. } => TypTag::Ptr,
        NodeKind::Void => TypTag::Void,
        _ => TypTag::Other,
    }
}

/// Is `from` equivalent to, or a subtype of, `to` under `constraint`?
pub fn itype_matches(ctx: &mut CompileContext, to: NodeId, from: NodeId, constraint: SubtypeConstraint) -> TypeCompare {
    let to = itype_get_type_dcl(&ctx.arena, to);
    let from = itype_get_type_dcl(&ctx.arena, from);
    if to == from {
        return TypeCompare::EqMatch;
    }
    let totag = typ_tag(&ctx.arena[to].kind);
    let fromtag = typ_tag(&ctx.arena[from].kind);

    match totag {
        TypTag::Nbr => {
            if itype_is_same(&ctx.arena, to, from) {
                TypeCompare::EqMatch
            } else {
                nbr_matches(&ctx.arena, to, from)
            }
        }

        // Bare struct subtyping is invariant; trait widening happens only
        // through the reference matchers, which carry the vtable machinery.
        TypTag::Struct => TypeCompare::NoMatch,

        TypTag::Structural => {
            if itype_is_same(&ctx.arena, to, from) {
                TypeCompare::EqMatch
            } else {
                TypeCompare::NoMatch
            }
        }

        TypTag::Ref if fromtag == TypTag::Ref => refmatch::ref_matches(ctx, to, from, constraint),
        TypTag::Ref => TypeCompare::NoMatch,

        TypTag::VirtRef => match fromtag {
            TypTag::VirtRef => refmatch::refvirt_matches(ctx, to, from, constraint),
            TypTag::Ref => refmatch::refvirt_matches_ref(ctx, to, from, constraint),
            _ => TypeCompare::NoMatch,
        },

        TypTag::ArrayRef => match fromtag {
            TypTag::ArrayRef => refmatch::ref_matches(ctx, to, from, constraint),
            TypTag::Ref => refmatch::arrayref_matches_ref(ctx, to, from, constraint),
            _ => TypeCompare::NoMatch,
        },

        TypTag::Ptr => {
            let NodeKind::Ptr { vtexp: tovt } = ctx.arena[to].kind else { unreachable!() };
            match &ctx.arena[from].kind {
                NodeKind::Ref(r) | NodeKind::ArrayRef(r) => {
                    if itype_is_same(&ctx.arena, r.vtexp, tovt) {
                        TypeCompare::ConvSubtype
                    } else {
                        TypeCompare::NoMatch
                    }
                }
                NodeKind::Ptr { vtexp: fromvt } => {
                    if itype_is_same(&ctx.arena, *fromvt, tovt) {
                        TypeCompare::EqMatch
                    } else {
                        TypeCompare::NoMatch
                    }
                }
                _ => TypeCompare::NoMatch,
            }
        }

        TypTag::Void => {
            if fromtag == TypTag::Void {
                TypeCompare::EqMatch
            } else {
                TypeCompare::NoMatch
            }
        }

        TypTag::Other => {
            if itype_is_same(&ctx.arena, to, from) {
                TypeCompare::EqMatch
            } else {
                TypeCompare::NoMatch
            }
        }
    }
}

fn struct_base(arena: &NodeArena, strct: NodeId) -> Option<NodeId> {
    match &arena[strct].kind {
        NodeKind::Struct { base, .. } => base.map(|b| itype_get_type_dcl(arena, b)),
        _ => None,
    }
}

/// Nearest common trait/base of two struct declarations, if any.
pub(crate) fn struct_find_super(arena: &NodeArena, a: NodeId, b: NodeId) -> Option<NodeId> {
    let mut seen = Vec::new();
    let mut cursor = Some(a);
    while let Some(s) = cursor {
        seen.push(s);
        cursor = struct_base(arena, s);
    }
    let mut cursor = Some(b);
    while let Some(s) = cursor {
        if seen.contains(&s) {
            return Some(s);
        }
        cursor = struct_base(arena, s);
    }
    None
}

/// Join of two types for overload/merge sites (loop phis, conditional arms),
/// or `None` when no common supertype exists.
pub fn itype_find_super(ctx: &mut CompileContext, a: NodeId, b: NodeId) -> Option<NodeId> {
    let adcl = itype_get_type_dcl(&ctx.arena, a);
    let bdcl = itype_get_type_dcl(&ctx.arena, b);
    if itype_is_same(&ctx.arena, adcl, bdcl) {
        return Some(a);
    }
    match (typ_tag(&ctx.arena[adcl].kind), typ_tag(&ctx.arena[bdcl].kind)) {
        (TypTag::Nbr, TypTag::Nbr) => {
            if nbr_matches(&ctx.arena, adcl, bdcl) != TypeCompare::NoMatch {
                Some(a)
            } else if nbr_matches(&ctx.arena, bdcl, adcl) != TypeCompare::NoMatch {
                Some(b)
            } else {
                None
            }
        }
        (TypTag::Struct, TypTag::Struct) => struct_find_super(&ctx.arena, adcl, bdcl),
        (TypTag::Ref, TypTag::Ref) | (TypTag::VirtRef, TypTag::VirtRef) => refmatch::ref_find_super(ctx, adcl, bdcl),
        _ => None,
    }
}

/// Appends the mangled form of a type to `buf`.
///
/// Used to compare method signatures when matching a struct against a trait:
/// two methods implement the same slot when their mangles agree.
pub fn itype_mangle(ctx: &CompileContext, node: NodeId, buf: &mut String) {
    let dcl = itype_get_type_dcl(&ctx.arena, node);
    match &ctx.arena[dcl].kind {
        NodeKind::Ref(r) | NodeKind::VirtRef(r) | NodeKind::ArrayRef(r) => {
            let sigil = match &ctx.arena[dcl].kind {
                NodeKind::VirtRef(_) => '<',
                NodeKind::ArrayRef(_) => '+',
                _ => '&',
            };
            buf.push(sigil);
            if !perm_is_same(&ctx.arena, r.perm, ctx.core.const_perm) {
                let perm_dcl = itype_get_type_dcl(&ctx.arena, r.perm);
                if let NodeKind::Perm { name, .. } = &ctx.arena[perm_dcl].kind {
                    buf.push_str(ctx.interner.name(*name));
                }
                buf.push(' ');
            }
            itype_mangle(ctx, r.vtexp, buf);
        }
        NodeKind::Ptr { vtexp } => {
            buf.push('*');
            itype_mangle(ctx, *vtexp, buf);
        }
        NodeKind::UintNbr { name, .. }
        | NodeKind::IntNbr { name, .. }
        | NodeKind::FloatNbr { name, .. }
        | NodeKind::Struct { name, .. } => buf.push_str(ctx.interner.name(*name)),
        NodeKind::ArrayType { dim, elem } => {
            buf.push('[');
            buf.push_str(&dim.to_string());
            buf.push(' ');
            itype_mangle(ctx, *elem, buf);
            buf.push(']');
        }
        NodeKind::TTuple { types } => {
            buf.push('(');
            for &t in types {
                itype_mangle(ctx, t, buf);
                buf.push(',');
            }
            buf.push(')');
        }
        NodeKind::Void => buf.push('v'),
        _ => buf.push('?'),
    }
}
