//! The IR node model shared by every pass.
//!
//! All IR entities — expressions, declarations and types — are [`Node`]s living
//! in one append-only [`NodeArena`], linked by [`NodeId`] indices. Cycles
//! (a name use pointing at its declaration, a method pointing back at its
//! enclosing struct) are expressed through ids, so the arena owns everything
//! and nothing is ever freed before the end of a compilation.
//!
//! Each node carries a common header (source span, flag bitset, inferred value
//! type) next to its [`NodeKind`] payload. Passes annotate nodes in place: name
//! resolution rewrites [`NodeKind::NameUse`] into its resolved forms, type
//! checking fills in `vtype` and inserts [`NodeKind::Convert`] wrappers, flow
//! analysis populates dealias lists.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::{intern::NameId, permission::PermAttrs};

/// Index of a node in the [`NodeArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(u32);

impl NodeId {
    /// The `Unknown` type sentinel, allocated first in every arena.
    pub const UNKNOWN: Self = Self(0);
    /// The `Void` type sentinel.
    pub const VOID: Self = Self(1);
    /// The `borrow` region sentinel: marks a reference as borrowed rather
    /// than owned by an allocator region.
    pub const BORROW: Self = Self(2);

    pub(crate) fn new(index: usize) -> Self {
        Self(u32::try_from(index).expect("node arena overflow"))
    }

    /// Returns the raw index value.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Half-open byte range into the source file a node was parsed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    /// Span for synthesized nodes with no source counterpart.
    pub const NONE: Self = Self { start: 0, end: 0 };

    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }
}

/// Per-node flag bitset.
///
/// Type-level flags (`OPAQUE`, `ZERO_SIZE`, `MOVE`, ...) live on type nodes and
/// type declarations; they are consulted through the `itype` helpers so that
/// name-use indirection is stripped first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeFlags(u16);

impl NodeFlags {
    pub const NONE: Self = Self(0);
    /// Type has no concrete, instantiable value (traits, opaque structs).
    pub const OPAQUE: Self = Self(1 << 0);
    /// Type occupies no storage (void, empty struct).
    pub const ZERO_SIZE: Self = Self(1 << 1);
    /// Values of this type move rather than copy on assignment.
    pub const MOVE: Self = Self(1 << 2);
    /// Values may not cross thread boundaries.
    pub const THREAD_BOUND: Self = Self(1 << 3);
    /// Struct is a trait (no instantiation, method contract only).
    pub const TRAIT_TYPE: Self = Self(1 << 4);
    /// All variants of this trait occupy the same size (closed tagged union).
    pub const SAME_SIZE: Self = Self(1 << 5);
    /// Struct/trait carries a discriminator field for runtime dispatch.
    pub const HAS_TAG_FIELD: Self = Self(1 << 6);

    #[inline]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    #[inline]
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }
}

impl std::ops::BitOr for NodeFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Transient per-variable flags maintained by the flow pass and cleared when
/// the pass finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FlowFlags(u8);

impl FlowFlags {
    pub const NONE: Self = Self(0);
    /// Variable currently holds a valid value.
    pub const INITIALIZED: Self = Self(1 << 0);
    /// Variable's value has been moved out and may not be read.
    pub const MOVED: Self = Self(1 << 1);

    #[inline]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    #[inline]
    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

/// Runtime conversion performed by a [`NodeKind::Convert`] node.
///
/// Every accepted `ConvSubtype` coercion is made explicit in the IR so the
/// backend receives a uniform input instead of re-deriving conversions from
/// mismatched vtypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::IntoStaticStr)]
pub enum ConvKind {
    /// Numeric widening within the same signedness family.
    NumWiden,
    /// Plain reference reinterpreted as a fat virtual reference (vtable attach).
    RefToVirt,
    /// Reference stripped of region and permission into a raw pointer.
    RefToPtr,
    /// Single-value reference reinterpreted as a length-1 array reference.
    RefToArrayRef,
}

/// Region, permission and referent of a reference type.
///
/// Shared by the three reference kinds (`Ref`, `VirtRef`, `ArrayRef`) and
/// their deref forms. `scope` is non-zero only on borrowed references, where it
/// records the lexical scope the borrow was taken from; interning ignores it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefType {
    /// The allocator region (a struct type) or [`NodeId::BORROW`].
    pub region: NodeId,
    /// Permission declaration node.
    pub perm: NodeId,
    /// Referent value type.
    pub vtexp: NodeId,
    /// Lexical scope of the borrowed place; 0 when owned or not yet known.
    pub scope: u16,
}

/// Generic declaration info: the parameter list a generic function was
/// declared with. Present until instantiation; instances have it cleared.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenericInfo {
    pub parms: Vec<NodeId>,
}

/// List type used for dealias bookkeeping on control-transfer nodes.
pub type DealiasList = SmallVec<[NodeId; 4]>;

/// The payload of a node: one tagged sum over every IR entity kind.
///
/// Passes dispatch over this enum with exhaustive matches; there is no virtual
/// hierarchy. Adding a variant is intentionally loud — every pass has to say
/// what it does with it.
#[derive(Debug, Clone, Serialize, Deserialize, strum::IntoStaticStr)]
pub enum NodeKind {
    // ---- expressions ----
    /// Unsigned integer literal.
    ULit { val: u64 },
    /// Floating point literal.
    FLit { val: f64 },
    /// String literal.
    StringLit { val: String },
    /// The nil/void value (implicit returns, valueless breaks).
    NilLit,
    /// An identifier not yet bound to a declaration. None survive a
    /// successful name-resolution pass.
    NameUse { name: NameId },
    /// Identifier resolved to a variable, constant or function declaration.
    VarNameUse { name: NameId, dcl: NodeId },
    /// Identifier resolved to a type declaration.
    TypeNameUse { name: NameId, dcl: NodeId },
    /// Field or method name; resolved against the receiver's type during type
    /// checking rather than lexically.
    FieldNameUse { name: NameId, dcl: Option<NodeId> },
    /// `obj.field` access.
    FldAccess { obj: NodeId, field: NodeId },
    /// `*exp` dereference.
    Deref { exp: NodeId },
    /// `exp[index]` element access.
    Element { exp: NodeId, index: NodeId },
    /// `&perm exp` borrow of a place.
    Borrow { exp: NodeId, perm: NodeId },
    /// `&region perm exp` allocation of an owned reference.
    Allocate { region: NodeId, perm: NodeId, exp: NodeId },
    /// `lval = rval` (either side may be a value tuple).
    Assign { lval: NodeId, rval: NodeId },
    /// Function or method call. After type checking the callee is a direct
    /// `VarNameUse` of the resolved function declaration.
    FnCall { callee: NodeId, args: Vec<NodeId> },
    /// Explicit runtime conversion inserted by coercion.
    Convert { exp: NodeId, kind: ConvKind },
    /// Statement block; produces its trailing expression's value, or void.
    Block { stmts: Vec<NodeId> },
    /// Function return. `dealias` is filled by the flow pass.
    Return { exp: NodeId, dealias: DealiasList },
    /// Loop break with optional lifetime label and optional value.
    Break { life: Option<NodeId>, exp: Option<NodeId>, dealias: DealiasList },
    /// Loop continue with optional lifetime label.
    Continue { life: Option<NodeId>, dealias: DealiasList },
    /// Infinite loop; `breaks` collects its break nodes as phi inputs.
    Loop { body: NodeId, life: Option<NodeId>, breaks: Vec<NodeId> },
    /// Value tuple `(a, b, c)`.
    VTuple { elems: Vec<NodeId> },
    /// Array literal: fill form `[dim, val]` or list form `[v1, ..., vn]`.
    ArrayLit { dimens: Vec<NodeId>, elems: Vec<NodeId> },

    // ---- declarations ----
    /// Variable declaration. The header `vtype` is the declared type;
    /// `flow` is transient flow-pass state.
    VarDcl { name: NameId, perm: NodeId, value: Option<NodeId>, scope: u16, flow: FlowFlags },
    /// Named compile-time constant.
    ConstDcl { name: NameId, value: NodeId },
    /// Function or method declaration. The header `vtype` is its signature.
    FnDcl { name: NameId, body: Option<NodeId>, method: bool, generic: Option<GenericInfo> },
    /// Struct/trait field declaration. The header `vtype` is the field type.
    FieldDcl { name: NameId, perm: NodeId },
    /// Type alias.
    Typedef { name: NameId, typeval: NodeId },
    /// Generic parameter declaration; substituted away at instantiation.
    GenericParam { name: NameId },
    /// Loop lifetime label declaration.
    LifetimeDcl { name: NameId },
    /// A module: an ordered list of top-level declarations.
    Module { name: Option<NameId>, nodes: Vec<NodeId> },
    /// The whole program: an ordered list of modules, entry module first.
    Program { modules: Vec<NodeId> },
    /// Module import; `fold_all` splices the imported module's exports into
    /// the importing scope.
    Import { module: NodeId, fold_all: bool },

    // ---- types ----
    /// Unsigned integer type.
    UintNbr { name: NameId, bits: u16 },
    /// Signed integer type.
    IntNbr { name: NameId, bits: u16 },
    /// Floating point type.
    FloatNbr { name: NameId, bits: u16 },
    /// Nominal struct type; doubles as a trait when flagged `TRAIT_TYPE`.
    Struct { name: NameId, fields: Vec<NodeId>, methods: Vec<NodeId>, base: Option<NodeId> },
    /// Function signature: parameter declarations plus return type.
    FnSig { parms: Vec<NodeId>, rettype: NodeId },
    /// Type tuple (the type of a value tuple / multiple return).
    TTuple { types: Vec<NodeId> },
    /// Fixed-size array type.
    ArrayType { dim: u64, elem: NodeId },
    /// Plain reference.
    Ref(RefType),
    /// Fat reference carrying a vtable pointer; referent is a trait or a
    /// tagged struct.
    VirtRef(RefType),
    /// Fat reference carrying a length.
    ArrayRef(RefType),
    /// The type of a dereferenced array reference.
    ArrayDeref(RefType),
    /// Raw pointer; no region, no permission.
    Ptr { vtexp: NodeId },
    /// Built-in permission declaration.
    Perm { name: NameId, attrs: PermAttrs },
    /// The `borrow` region sentinel type.
    BorrowRegion,
    /// The void type.
    Void,
    /// The not-yet-inferred type sentinel.
    Unknown,
}

impl NodeKind {
    /// True for nodes that produce a value and therefore carry a meaningful
    /// header `vtype`.
    pub fn is_exp(&self) -> bool {
        matches!(
            self,
            Self::ULit { .. }
                | Self::FLit { .. }
                | Self::StringLit { .. }
                | Self::NilLit
                | Self::VarNameUse { .. }
                | Self::FldAccess { .. }
                | Self::Deref { .. }
                | Self::Element { .. }
                | Self::Borrow { .. }
                | Self::Allocate { .. }
                | Self::Assign { .. }
                | Self::FnCall { .. }
                | Self::Convert { .. }
                | Self::Block { .. }
                | Self::Loop { .. }
                | Self::VTuple { .. }
                | Self::ArrayLit { .. }
        )
    }

    /// True for type nodes (including the sentinels).
    pub fn is_type(&self) -> bool {
        matches!(
            self,
            Self::UintNbr { .. }
                | Self::IntNbr { .. }
                | Self::FloatNbr { .. }
                | Self::Struct { .. }
                | Self::FnSig { .. }
                | Self::TTuple { .. }
                | Self::ArrayType { .. }
                | Self::Ref(_)
                | Self::VirtRef(_)
                | Self::ArrayRef(_)
                | Self::ArrayDeref(_)
                | Self::Ptr { .. }
                | Self::Perm { .. }
                | Self::BorrowRegion
                | Self::Void
                | Self::Unknown
                | Self::TypeNameUse { .. }
                | Self::Typedef { .. }
                | Self::GenericParam { .. }
        )
    }

    /// The declared name, for declaration kinds that have one.
    pub fn dcl_name(&self) -> Option<NameId> {
        match self {
            Self::VarDcl { name, .. }
            | Self::ConstDcl { name, .. }
            | Self::FnDcl { name, .. }
            | Self::FieldDcl { name, .. }
            | Self::Typedef { name, .. }
            | Self::GenericParam { name }
            | Self::LifetimeDcl { name }
            | Self::Struct { name, .. }
            | Self::UintNbr { name, .. }
            | Self::IntNbr { name, .. }
            | Self::FloatNbr { name, .. }
            | Self::Perm { name, .. } => Some(*name),
            Self::Module { name, .. } => *name,
            _ => None,
        }
    }
}

/// One IR node: common header plus kind payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub span: Span,
    pub flags: NodeFlags,
    /// Inferred value type of an expression node, or the declared type of a
    /// declaration node. [`NodeId::UNKNOWN`] until inference reaches it.
    pub vtype: NodeId,
    pub kind: NodeKind,
}

/// Append-only arena owning every node of a compilation.
///
/// Nodes are addressed by [`NodeId`] and never deallocated; passes mutate them
/// in place through the index operators.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct NodeArena {
    nodes: Vec<Node>,
}

impl NodeArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a node, returning its id.
    pub fn push(&mut self, node: Node) -> NodeId {
        let id = NodeId::new(self.nodes.len());
        self.nodes.push(node);
        id
    }

    /// Appends a node with the given kind, no flags and an unknown vtype.
    pub fn push_kind(&mut self, kind: NodeKind, span: Span) -> NodeId {
        self.push(Node { span, flags: NodeFlags::NONE, vtype: NodeId::UNKNOWN, kind })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The static name of a node's kind, for internal diagnostics.
    pub fn tag_name(&self, id: NodeId) -> &'static str {
        (&self[id].kind).into()
    }
}

impl std::ops::Index<NodeId> for NodeArena {
    type Output = Node;

    fn index(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }
}

impl std::ops::IndexMut<NodeId> for NodeArena {
    fn index_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arena_ids_are_stable() {
        let mut arena = NodeArena::new();
        let a = arena.push_kind(NodeKind::ULit { val: 1 }, Span::NONE);
        let b = arena.push_kind(NodeKind::ULit { val: 2 }, Span::NONE);
        assert_ne!(a, b);
        match (&arena[a].kind, &arena[b].kind) {
            (NodeKind::ULit { val: va }, NodeKind::ULit { val: vb }) => {
                assert_eq!((*va, *vb), (1, 2));
            }
            _ => panic!("unexpected kinds"),
        }
    }

    #[test]
    fn flags_compose() {
        let mut flags = NodeFlags::TRAIT_TYPE | NodeFlags::SAME_SIZE;
        assert!(flags.contains(NodeFlags::TRAIT_TYPE));
        assert!(!flags.contains(NodeFlags::HAS_TAG_FIELD));
        flags.insert(NodeFlags::HAS_TAG_FIELD);
        assert!(flags.contains(NodeFlags::TRAIT_TYPE | NodeFlags::HAS_TAG_FIELD));
    }

    #[test]
    fn flow_flags_clear_individually() {
        let mut flow = FlowFlags::NONE;
        flow.insert(FlowFlags::INITIALIZED);
        flow.insert(FlowFlags::MOVED);
        flow.remove(FlowFlags::MOVED);
        assert!(flow.contains(FlowFlags::INITIALIZED));
        assert!(!flow.contains(FlowFlags::MOVED));
    }
}
