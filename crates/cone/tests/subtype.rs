//! Subtype engine, hashing and interning properties.

use cone::{
    CompileContext, ConeOptions, NodeFlags, NodeId, Span, SubtypeConstraint, TypeCompare, itype_hash,
    itype_is_run_same, itype_is_same, itype_matches,
};

const S: Span = Span::NONE;

fn new_ctx() -> CompileContext {
    CompileContext::new(ConeOptions::default())
}

/// `itype_matches(T, T, K) == EqMatch` for every constraint.
#[test]
fn reflexive_match_is_exact() {
    let mut ctx = new_ctx();
    let i32t = ctx.core.i32_type;
    let const_perm = ctx.core.const_perm;
    let reftype = ctx.ref_type(NodeId::BORROW, const_perm, i32t, S);
    let samples = [i32t, ctx.core.f64_type, ctx.core.usize_type, NodeId::VOID, reftype];
    for t in samples {
        for k in [SubtypeConstraint::Monomorph, SubtypeConstraint::Regref, SubtypeConstraint::Coerce] {
            assert_eq!(itype_matches(&mut ctx, t, t, k), TypeCompare::EqMatch, "type {t:?} under {k:?}");
        }
    }
}

#[test]
fn numeric_widening_is_a_conversion() {
    let mut ctx = new_ctx();
    let (u8t, u32t, i32t, i64t, f32t, f64t) = (
        ctx.core.u8_type,
        ctx.core.u32_type,
        ctx.core.i32_type,
        ctx.core.i64_type,
        ctx.core.f32_type,
        ctx.core.f64_type,
    );
    assert_eq!(itype_matches(&mut ctx, u32t, u8t, SubtypeConstraint::Coerce), TypeCompare::ConvSubtype);
    assert_eq!(itype_matches(&mut ctx, i64t, i32t, SubtypeConstraint::Coerce), TypeCompare::ConvSubtype);
    assert_eq!(itype_matches(&mut ctx, f64t, f32t, SubtypeConstraint::Coerce), TypeCompare::ConvSubtype);
    // Narrowing and cross-family moves are rejected.
    assert_eq!(itype_matches(&mut ctx, u8t, u32t, SubtypeConstraint::Coerce), TypeCompare::NoMatch);
    assert_eq!(itype_matches(&mut ctx, u32t, i32t, SubtypeConstraint::Coerce), TypeCompare::NoMatch);
    assert_eq!(itype_matches(&mut ctx, f32t, i32t, SubtypeConstraint::Coerce), TypeCompare::NoMatch);
}

/// Runtime equality implies equal hashes, for nominal and structural types.
#[test]
fn hash_agrees_with_runtime_equality() {
    let mut ctx = new_ctx();
    let i32t = ctx.core.i32_type;
    let const_perm = ctx.core.const_perm;
    let imm_perm = ctx.core.imm_perm;

    let a = ctx.ref_type(NodeId::BORROW, const_perm, i32t, S);
    let b = ctx.ref_type(NodeId::BORROW, const_perm, i32t, S);
    // Same structure, different permission: still run-same (permissions are
    // erased at runtime), so the hashes must agree too.
    let c = ctx.ref_type(NodeId::BORROW, imm_perm, i32t, S);

    for (x, y) in [(a, b), (a, c), (i32t, i32t)] {
        if itype_is_run_same(&ctx.arena, x, y) {
            assert_eq!(itype_hash(&ctx.arena, x), itype_hash(&ctx.arena, y), "{x:?} vs {y:?}");
        }
    }
    assert!(itype_is_run_same(&ctx.arena, a, b));
    assert!(itype_is_run_same(&ctx.arena, a, c));
    assert!(itype_is_same(&ctx.arena, a, b));
    assert!(!itype_is_same(&ctx.arena, a, c));
}

/// Structurally identical references intern to one canonical node.
#[test]
fn structural_references_are_interned() {
    let mut ctx = new_ctx();
    let i32t = ctx.core.i32_type;
    let const_perm = ctx.core.const_perm;
    let a = ctx.ref_type(NodeId::BORROW, const_perm, i32t, S);
    let b = ctx.ref_type(NodeId::BORROW, const_perm, i32t, S);
    let canon_a = ctx.normalize_type(a);
    let canon_b = ctx.normalize_type(b);
    assert_eq!(canon_a, canon_b);

    let u8t = ctx.core.u8_type;
    let other = ctx.ref_type(NodeId::BORROW, const_perm, u8t, S);
    assert_ne!(ctx.normalize_type(other), canon_a);
}

/// Any owned region widens to a borrow for free; borrowed references never
/// widen back to owned ones.
#[test]
fn owned_reference_widens_to_borrow() {
    let mut ctx = new_ctx();
    let i32t = ctx.core.i32_type;
    let const_perm = ctx.core.const_perm;
    let heap = ctx.struct_dcl("Heap", vec![], vec![], NodeFlags::NONE, S);

    let owned = ctx.ref_type(heap, const_perm, i32t, S);
    let borrowed = ctx.ref_type(NodeId::BORROW, const_perm, i32t, S);
    assert_eq!(
        itype_matches(&mut ctx, borrowed, owned, SubtypeConstraint::Coerce),
        TypeCompare::CastSubtype
    );
    assert_eq!(itype_matches(&mut ctx, owned, borrowed, SubtypeConstraint::Coerce), TypeCompare::NoMatch);
}

/// Referent variance follows the target permission: covariant when
/// read-only, invariant when read-write.
#[test]
fn referent_variance_follows_permission() {
    let mut ctx = new_ctx();
    let const_perm = ctx.core.const_perm;
    let mutx_perm = ctx.core.mutx_perm;
    let u8t = ctx.core.u8_type;
    let u32t = ctx.core.u32_type;

    // Read-only target: the referent may widen (a conversion, refused only
    // under monomorphization).
    let to_ro = ctx.ref_type(NodeId::BORROW, const_perm, u32t, S);
    let from_ro = ctx.ref_type(NodeId::BORROW, const_perm, u8t, S);
    assert_eq!(itype_matches(&mut ctx, to_ro, from_ro, SubtypeConstraint::Coerce), TypeCompare::ConvSubtype);
    assert_eq!(itype_matches(&mut ctx, to_ro, from_ro, SubtypeConstraint::Monomorph), TypeCompare::NoMatch);

    // Read-write target: the referent is invariant.
    let to_rw = ctx.ref_type(NodeId::BORROW, mutx_perm, u32t, S);
    let from_rw = ctx.ref_type(NodeId::BORROW, mutx_perm, u8t, S);
    assert_eq!(itype_matches(&mut ctx, to_rw, from_rw, SubtypeConstraint::Coerce), TypeCompare::NoMatch);
    let from_same = ctx.ref_type(NodeId::BORROW, mutx_perm, u32t, S);
    assert_eq!(itype_matches(&mut ctx, to_rw, from_same, SubtypeConstraint::Coerce), TypeCompare::EqMatch);
}

/// A reference reinterprets as a raw pointer (conversion) when the referents
/// agree; the pointer strips region and permission.
#[test]
fn reference_to_pointer_strips_region_and_permission() {
    let mut ctx = new_ctx();
    let i32t = ctx.core.i32_type;
    let const_perm = ctx.core.const_perm;
    let r = ctx.ref_type(NodeId::BORROW, const_perm, i32t, S);
    let p = ctx.ptr_type(i32t, S);
    assert_eq!(itype_matches(&mut ctx, p, r, SubtypeConstraint::Coerce), TypeCompare::ConvSubtype);
    let u8t = ctx.core.u8_type;
    let p8 = ctx.ptr_type(u8t, S);
    assert_eq!(itype_matches(&mut ctx, p8, r, SubtypeConstraint::Coerce), TypeCompare::NoMatch);
}

/// A single-value reference reinterprets as a length-1 array reference.
#[test]
fn reference_to_array_reference_is_a_conversion() {
    let mut ctx = new_ctx();
    let i32t = ctx.core.i32_type;
    let const_perm = ctx.core.const_perm;
    let r = ctx.ref_type(NodeId::BORROW, const_perm, i32t, S);
    let ar = ctx.array_ref_type(NodeId::BORROW, const_perm, i32t, S);
    assert_eq!(itype_matches(&mut ctx, ar, r, SubtypeConstraint::Coerce), TypeCompare::ConvSubtype);
    assert_eq!(itype_matches(&mut ctx, ar, r, SubtypeConstraint::Monomorph), TypeCompare::NoMatch);
}

/// The numeric join picks the wider type; unrelated numerics have no join.
#[test]
fn find_super_joins_numerics() {
    let mut ctx = new_ctx();
    let u8t = ctx.core.u8_type;
    let u32t = ctx.core.u32_type;
    let i32t = ctx.core.i32_type;
    let joined = cone::itype_find_super(&mut ctx, u8t, u32t).unwrap();
    assert!(itype_is_same(&ctx.arena, joined, u32t));
    assert!(cone::itype_find_super(&mut ctx, u8t, i32t).is_none());
}
