//! The built-in core library.
//!
//! Installs the sentinel types, the primitive numeric types and the built-in
//! permissions into a fresh arena, packaged as a `core` module whose exports
//! are auto-hooked into scope for every other module. `usize`/`isize` widths
//! come from [`ConeOptions::ptr_size`].

use crate::{
    intern::Interner,
    node::{Node, NodeArena, NodeFlags, NodeId, NodeKind, Span},
    options::ConeOptions,
    permission::PermKind,
};

/// Ids of everything the core library pre-defines.
///
/// Kept on the compilation context so passes can refer to built-ins without
/// name lookups.
#[derive(Debug, Clone)]
pub struct CoreLib {
    pub core_module: NodeId,

    pub mut_perm: NodeId,
    pub mmut_perm: NodeId,
    pub imm_perm: NodeId,
    pub const_perm: NodeId,
    pub constx_perm: NodeId,
    pub mutx_perm: NodeId,
    pub id_perm: NodeId,

    pub bool_type: NodeId,
    pub i8_type: NodeId,
    pub i16_type: NodeId,
    pub i32_type: NodeId,
    pub i64_type: NodeId,
    pub isize_type: NodeId,
    pub u8_type: NodeId,
    pub u16_type: NodeId,
    pub u32_type: NodeId,
    pub u64_type: NodeId,
    pub usize_type: NodeId,
    pub f32_type: NodeId,
    pub f64_type: NodeId,
}

impl CoreLib {
    /// Populates `arena` with the sentinels and core declarations.
    ///
    /// Must run on an empty arena: the sentinel ids ([`NodeId::UNKNOWN`],
    /// [`NodeId::VOID`], [`NodeId::BORROW`]) are fixed by allocation order.
    pub fn install(arena: &mut NodeArena, interner: &mut Interner, options: &ConeOptions) -> Self {
        assert!(arena.is_empty(), "core library must be installed first");

        let unknown = arena.push_kind(NodeKind::Unknown, Span::NONE);
        debug_assert_eq!(unknown, NodeId::UNKNOWN);
        let void = arena.push(Node {
            span: Span::NONE,
            flags: NodeFlags::ZERO_SIZE,
            vtype: NodeId::UNKNOWN,
            kind: NodeKind::Void,
        });
        debug_assert_eq!(void, NodeId::VOID);
        let borrow = arena.push_kind(NodeKind::BorrowRegion, Span::NONE);
        debug_assert_eq!(borrow, NodeId::BORROW);

        let perm = |arena: &mut NodeArena, interner: &mut Interner, kind: PermKind| {
            let name = interner.intern(kind.into());
            arena.push_kind(NodeKind::Perm { name, attrs: kind.attrs() }, Span::NONE)
        };
        let mut_perm = perm(arena, interner, PermKind::Mut);
        let mmut_perm = perm(arena, interner, PermKind::Mmut);
        let imm_perm = perm(arena, interner, PermKind::Imm);
        let const_perm = perm(arena, interner, PermKind::Const);
        let constx_perm = perm(arena, interner, PermKind::Constx);
        let mutx_perm = perm(arena, interner, PermKind::Mutx);
        let id_perm = perm(arena, interner, PermKind::Id);

        let int = |arena: &mut NodeArena, interner: &mut Interner, name: &str, bits: u16, signed: bool| {
            let name = interner.intern(name);
            let kind = if signed { NodeKind::IntNbr { name, bits } } else { NodeKind::UintNbr { name, bits } };
            arena.push_kind(kind, Span::NONE)
        };
        let bool_type = int(arena, interner, "Bool", 1, false);
        let i8_type = int(arena, interner, "i8", 8, true);
        let i16_type = int(arena, interner, "i16", 16, true);
        let i32_type = int(arena, interner, "i32", 32, true);
        let i64_type = int(arena, interner, "i64", 64, true);
        let isize_type = int(arena, interner, "isize", options.ptr_size, true);
        let u8_type = int(arena, interner, "u8", 8, false);
        let u16_type = int(arena, interner, "u16", 16, false);
        let u32_type = int(arena, interner, "u32", 32, false);
        let u64_type = int(arena, interner, "u64", 64, false);
        let usize_type = int(arena, interner, "usize", options.ptr_size, false);

        let f32_name = interner.intern("f32");
        let f32_type = arena.push_kind(NodeKind::FloatNbr { name: f32_name, bits: 32 }, Span::NONE);
        let f64_name = interner.intern("f64");
        let f64_type = arena.push_kind(NodeKind::FloatNbr { name: f64_name, bits: 64 }, Span::NONE);

        let nodes = vec![
            mut_perm, mmut_perm, imm_perm, const_perm, constx_perm, mutx_perm, id_perm, bool_type, i8_type,
            i16_type, i32_type, i64_type, isize_type, u8_type, u16_type, u32_type, u64_type, usize_type, f32_type,
            f64_type,
        ];
        let core_name = interner.intern("core");
        let core_module = arena.push_kind(NodeKind::Module { name: Some(core_name), nodes }, Span::NONE);

        Self {
            core_module,
            mut_perm,
            mmut_perm,
            imm_perm,
            const_perm,
            constx_perm,
            mutx_perm,
            id_perm,
            bool_type,
            i8_type,
            i16_type,
            i32_type,
            i64_type,
            isize_type,
            u8_type,
            u16_type,
            u32_type,
            u64_type,
            usize_type,
            f32_type,
            f64_type,
        }
    }

    /// Every named core export paired with the name it is hooked under,
    /// including the `ro` and `opaq` permission aliases.
    pub fn exports(&self, arena: &NodeArena, interner: &mut Interner) -> Vec<(crate::intern::NameId, NodeId)> {
        let mut out = Vec::with_capacity(24);
        let NodeKind::Module { nodes, .. } = &arena[self.core_module].kind else {
            unreachable!("core module is always a module node");
        };
        for &dcl in nodes {
            let name = arena[dcl].kind.dcl_name().expect("core exports are all named");
            out.push((name, dcl));
        }
        out.push((interner.intern("ro"), self.const_perm));
        out.push((interner.intern("opaq"), self.id_perm));
        out
    }
}
