//! Structural trait matching and vtable synthesis.
//!
//! When a plain reference coerces to a virtual reference, the referent struct
//! must structurally implement every method of the target trait. The check
//! and the synthesis are one operation: walking the trait's method list in
//! order both verifies the implementations exist (matched by name and by
//! receiver-exempt mangled signature) and produces the ordered dispatch
//! table the backend will emit.

use smallvec::SmallVec;

use crate::{
    context::CompileContext,
    intern::NameId,
    itype::{TypeCompare, itype_get_type_dcl, itype_is_same, itype_mangle},
    node::{NodeFlags, NodeId, NodeKind},
};

/// A synthesized dispatch table: one implementation per trait method, in
/// trait declaration order.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Vtable {
    pub trait_dcl: NodeId,
    pub struct_dcl: NodeId,
    pub impls: SmallVec<[NodeId; 4]>,
}

fn members(ctx: &CompileContext, strct: NodeId) -> Option<(Vec<NodeId>, Vec<NodeId>)> {
    match &ctx.arena[strct].kind {
        NodeKind::Struct { fields, methods, .. } => Some((fields.clone(), methods.clone())),
        _ => None,
    }
}

fn member_name(ctx: &CompileContext, dcl: NodeId) -> Option<NameId> {
    ctx.arena[dcl].kind.dcl_name()
}

/// Receiver-exempt signature mangle of a method: parameter types after
/// `self`, then the return type.
fn method_mangle(ctx: &CompileContext, method: NodeId) -> String {
    let mut buf = String::new();
    let sig = itype_get_type_dcl(&ctx.arena, ctx.arena[method].vtype);
    let NodeKind::FnSig { parms, rettype } = &ctx.arena[sig].kind else {
        return buf;
    };
    buf.push('(');
    for &parm in parms.iter().skip(1) {
        itype_mangle(ctx, ctx.arena[parm].vtype, &mut buf);
        buf.push(',');
    }
    buf.push(')');
    itype_mangle(ctx, *rettype, &mut buf);
    buf
}

/// Verifies that `struct_dcl` structurally implements `trait_dcl` and, on
/// success, records the synthesized vtable in the compilation context.
///
/// Fields are matched by name with identical types; tagged-union traits
/// (`TRAIT_TYPE | SAME_SIZE` with `HAS_TAG_FIELD`) may carry a `tag`
/// discriminator field with no struct counterpart. Methods are matched by
/// name and mangled signature. Any miss fails the whole match and records
/// nothing.
pub(crate) fn struct_virtref_matches(ctx: &mut CompileContext, trait_dcl: NodeId, struct_dcl: NodeId) -> TypeCompare {
    if ctx.vtables.contains_key(&(trait_dcl, struct_dcl)) {
        return TypeCompare::ConvSubtype;
    }

    let trait_flags = ctx.arena[trait_dcl].flags;
    if !trait_flags.contains(NodeFlags::TRAIT_TYPE) {
        return TypeCompare::NoMatch;
    }
    let (Some((tfields, tmethods)), Some((sfields, smethods))) =
        (members(ctx, trait_dcl), members(ctx, struct_dcl))
    else {
        return TypeCompare::NoMatch;
    };

    let tagged_union = trait_flags.contains(NodeFlags::SAME_SIZE | NodeFlags::HAS_TAG_FIELD);
    let tag_name = ctx.interner.get("tag");

    // Every trait field needs a same-named, same-typed struct field.
    for &tfield in &tfields {
        let Some(fname) = member_name(ctx, tfield) else { continue };
        let found = sfields.iter().any(|&sfield| {
            member_name(ctx, sfield) == Some(fname)
                && itype_is_same(&ctx.arena, ctx.arena[sfield].vtype, ctx.arena[tfield].vtype)
        });
        if !found {
            // A closed tagged union provides the discriminator itself.
            if tagged_union && Some(fname) == tag_name {
                continue;
            }
            return TypeCompare::NoMatch;
        }
    }

    // Every trait method needs an implementation with the same name and the
    // same receiver-exempt signature, collected in trait order.
    let mut impls: SmallVec<[NodeId; 4]> = SmallVec::new();
    for &tmethod in &tmethods {
        let Some(mname) = member_name(ctx, tmethod) else {
            return TypeCompare::NoMatch;
        };
        let want = method_mangle(ctx, tmethod);
        let found = smethods
            .iter()
            .copied()
            .find(|&smethod| member_name(ctx, smethod) == Some(mname) && method_mangle(ctx, smethod) == want);
        match found {
            Some(imp) => impls.push(imp),
            None => return TypeCompare::NoMatch,
        }
    }

    let count = impls.len();
    ctx.vtables
        .insert((trait_dcl, struct_dcl), Vtable { trait_dcl, struct_dcl, impls });
    ctx.tracer.vtable_built(trait_dcl, struct_dcl, count);
    TypeCompare::ConvSubtype
}
