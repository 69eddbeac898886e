//! The compilation context.
//!
//! All process-scoped state of the original design — node arena, name
//! interner, name table, type table, vtable registry, error counter — is
//! packed into one [`CompileContext`] passed through every pass, so a single
//! process can compile multiple programs without global state.
//!
//! The context also carries the node construction helpers used by the upstream
//! parser (and by tests) to build a program graph.

use ahash::AHashMap;

use crate::{
    corelib::CoreLib,
    errors::ErrorSink,
    intern::{Interner, NameId},
    node::{DealiasList, NodeArena, NodeFlags, NodeId, NodeKind, RefType, Span},
    options::ConeOptions,
    tracer::{NoopTracer, PassTracer},
    typetbl::TypeTable,
    vtable::Vtable,
};

/// Shared state of one compilation, threaded through every pass.
pub struct CompileContext {
    pub arena: NodeArena,
    pub interner: Interner,
    pub nametbl: crate::nametbl::NameTable,
    pub typetbl: TypeTable,
    /// Synthesized dispatch tables, keyed by (trait declaration, struct
    /// declaration).
    pub vtables: AHashMap<(NodeId, NodeId), Vtable>,
    pub errors: ErrorSink,
    pub options: ConeOptions,
    pub core: CoreLib,
    pub tracer: Box<dyn PassTracer>,
}

impl CompileContext {
    /// Creates a context with the core library installed.
    pub fn new(options: ConeOptions) -> Self {
        let mut arena = NodeArena::new();
        let mut interner = Interner::new();
        let core = CoreLib::install(&mut arena, &mut interner, &options);
        Self {
            arena,
            interner,
            nametbl: crate::nametbl::NameTable::new(),
            typetbl: TypeTable::new(),
            vtables: AHashMap::new(),
            errors: ErrorSink::new(),
            options,
            core,
            tracer: Box::new(NoopTracer),
        }
    }

    /// Replaces the pass tracer.
    pub fn with_tracer(mut self, tracer: Box<dyn PassTracer>) -> Self {
        self.tracer = tracer;
        self
    }

    pub fn intern(&mut self, name: &str) -> NameId {
        self.interner.intern(name)
    }

    /// The inferred value type of a node.
    pub fn vtype_of(&self, id: NodeId) -> NodeId {
        self.arena[id].vtype
    }

    /// The synthesized vtable for a (trait, struct) pair, if one was built.
    pub fn vtable_for(&self, trait_dcl: NodeId, struct_dcl: NodeId) -> Option<&Vtable> {
        self.vtables.get(&(trait_dcl, struct_dcl))
    }

    /// Interns a structural type, returning its canonical node.
    pub fn normalize_type(&mut self, id: NodeId) -> NodeId {
        self.typetbl.find_or_insert(&self.arena, id)
    }

    fn push(&mut self, kind: NodeKind, span: Span) -> NodeId {
        self.arena.push_kind(kind, span)
    }

    // ---- expression builders ----

    pub fn ulit(&mut self, val: u64, span: Span) -> NodeId {
        self.push(NodeKind::ULit { val }, span)
    }

    /// An integer literal with an explicit type suffix.
    pub fn ulit_typed(&mut self, val: u64, vtype: NodeId, span: Span) -> NodeId {
        let id = self.push(NodeKind::ULit { val }, span);
        self.arena[id].vtype = vtype;
        id
    }

    pub fn flit(&mut self, val: f64, span: Span) -> NodeId {
        self.push(NodeKind::FLit { val }, span)
    }

    /// A float literal with an explicit type suffix.
    pub fn flit_typed(&mut self, val: f64, vtype: NodeId, span: Span) -> NodeId {
        let id = self.push(NodeKind::FLit { val }, span);
        self.arena[id].vtype = vtype;
        id
    }

    pub fn strlit(&mut self, val: &str, span: Span) -> NodeId {
        self.push(NodeKind::StringLit { val: val.to_owned() }, span)
    }

    pub fn nil(&mut self, span: Span) -> NodeId {
        self.push(NodeKind::NilLit, span)
    }

    /// An unresolved identifier use.
    pub fn name_use(&mut self, name: &str, span: Span) -> NodeId {
        let name = self.intern(name);
        self.push(NodeKind::NameUse { name }, span)
    }

    /// A field or method name, resolved later against its receiver's type.
    pub fn field_name(&mut self, name: &str, span: Span) -> NodeId {
        let name = self.intern(name);
        self.push(NodeKind::FieldNameUse { name, dcl: None }, span)
    }

    pub fn fld_access(&mut self, obj: NodeId, field: NodeId, span: Span) -> NodeId {
        self.push(NodeKind::FldAccess { obj, field }, span)
    }

    pub fn deref(&mut self, exp: NodeId, span: Span) -> NodeId {
        self.push(NodeKind::Deref { exp }, span)
    }

    pub fn element(&mut self, exp: NodeId, index: NodeId, span: Span) -> NodeId {
        self.push(NodeKind::Element { exp, index }, span)
    }

    pub fn borrow(&mut self, exp: NodeId, perm: NodeId, span: Span) -> NodeId {
        self.push(NodeKind::Borrow { exp, perm }, span)
    }

    pub fn allocate(&mut self, region: NodeId, perm: NodeId, exp: NodeId, span: Span) -> NodeId {
        self.push(NodeKind::Allocate { region, perm, exp }, span)
    }

    pub fn assign(&mut self, lval: NodeId, rval: NodeId, span: Span) -> NodeId {
        self.push(NodeKind::Assign { lval, rval }, span)
    }

    pub fn fncall(&mut self, callee: NodeId, args: Vec<NodeId>, span: Span) -> NodeId {
        self.push(NodeKind::FnCall { callee, args }, span)
    }

    pub fn block(&mut self, stmts: Vec<NodeId>, span: Span) -> NodeId {
        self.push(NodeKind::Block { stmts }, span)
    }

    pub fn ret(&mut self, exp: NodeId, span: Span) -> NodeId {
        self.push(NodeKind::Return { exp, dealias: DealiasList::new() }, span)
    }

    pub fn brk(&mut self, life: Option<NodeId>, exp: Option<NodeId>, span: Span) -> NodeId {
        self.push(NodeKind::Break { life, exp, dealias: DealiasList::new() }, span)
    }

    pub fn cont(&mut self, life: Option<NodeId>, span: Span) -> NodeId {
        self.push(NodeKind::Continue { life, dealias: DealiasList::new() }, span)
    }

    pub fn loop_(&mut self, body: NodeId, life: Option<NodeId>, span: Span) -> NodeId {
        self.push(NodeKind::Loop { body, life, breaks: Vec::new() }, span)
    }

    pub fn vtuple(&mut self, elems: Vec<NodeId>, span: Span) -> NodeId {
        self.push(NodeKind::VTuple { elems }, span)
    }

    /// Array literal fill form `[dim, val]`.
    pub fn array_lit_fill(&mut self, dim: NodeId, val: NodeId, span: Span) -> NodeId {
        self.push(NodeKind::ArrayLit { dimens: vec![dim], elems: vec![val] }, span)
    }

    /// Array literal list form `[v1, ..., vn]`.
    pub fn array_lit_list(&mut self, elems: Vec<NodeId>, span: Span) -> NodeId {
        self.push(NodeKind::ArrayLit { dimens: Vec::new(), elems }, span)
    }

    // ---- declaration builders ----

    /// A variable declaration with a declared type. Pass
    /// [`NodeId::UNKNOWN`] as `vtype` to infer from the initializer.
    pub fn var_dcl(&mut self, name: &str, perm: NodeId, vtype: NodeId, value: Option<NodeId>, span: Span) -> NodeId {
        let name = self.intern(name);
        let id = self.push(
            NodeKind::VarDcl { name, perm, value, scope: 0, flow: crate::node::FlowFlags::NONE },
            span,
        );
        self.arena[id].vtype = vtype;
        id
    }

    pub fn const_dcl(&mut self, name: &str, vtype: NodeId, value: NodeId, span: Span) -> NodeId {
        let name = self.intern(name);
        let id = self.push(NodeKind::ConstDcl { name, value }, span);
        self.arena[id].vtype = vtype;
        id
    }

    /// A function declaration; `sig` must be a [`NodeKind::FnSig`] node.
    pub fn fn_dcl(&mut self, name: &str, sig: NodeId, body: Option<NodeId>, span: Span) -> NodeId {
        let name = self.intern(name);
        let id = self.push(NodeKind::FnDcl { name, body, method: false, generic: None }, span);
        self.arena[id].vtype = sig;
        id
    }

    /// A method declaration (attached to a struct via `struct_dcl`).
    pub fn method_dcl(&mut self, name: &str, sig: NodeId, body: Option<NodeId>, span: Span) -> NodeId {
        let id = self.fn_dcl(name, sig, body, span);
        let NodeKind::FnDcl { method, .. } = &mut self.arena[id].kind else { unreachable!() };
        *method = true;
        id
    }

    pub fn field_dcl(&mut self, name: &str, vtype: NodeId, span: Span) -> NodeId {
        let name = self.intern(name);
        let perm = self.core.mut_perm;
        let id = self.push(NodeKind::FieldDcl { name, perm }, span);
        self.arena[id].vtype = vtype;
        id
    }

    pub fn typedef(&mut self, name: &str, typeval: NodeId, span: Span) -> NodeId {
        let name = self.intern(name);
        self.push(NodeKind::Typedef { name, typeval }, span)
    }

    pub fn generic_param(&mut self, name: &str, span: Span) -> NodeId {
        let name = self.intern(name);
        self.push(NodeKind::GenericParam { name }, span)
    }

    /// Marks a function declaration as generic over `parms`
    /// ([`NodeKind::GenericParam`] declarations). Generic functions are not
    /// type checked until instantiated.
    pub fn set_generic(&mut self, fn_dcl: NodeId, parms: Vec<NodeId>) {
        if let NodeKind::FnDcl { generic, .. } = &mut self.arena[fn_dcl].kind {
            *generic = Some(crate::node::GenericInfo { parms });
        }
    }

    pub fn lifetime_dcl(&mut self, name: &str, span: Span) -> NodeId {
        let name = self.intern(name);
        self.push(NodeKind::LifetimeDcl { name }, span)
    }

    pub fn module(&mut self, name: Option<&str>, nodes: Vec<NodeId>, span: Span) -> NodeId {
        let name = name.map(|n| self.intern(n));
        self.push(NodeKind::Module { name, nodes }, span)
    }

    pub fn program(&mut self, modules: Vec<NodeId>, span: Span) -> NodeId {
        self.push(NodeKind::Program { modules }, span)
    }

    pub fn import(&mut self, module: NodeId, fold_all: bool, span: Span) -> NodeId {
        self.push(NodeKind::Import { module, fold_all }, span)
    }

    // ---- type builders ----

    pub fn fn_sig(&mut self, parms: Vec<NodeId>, rettype: NodeId, span: Span) -> NodeId {
        self.push(NodeKind::FnSig { parms, rettype }, span)
    }

    /// A function parameter: a variable declaration scoped to the function.
    pub fn parm_dcl(&mut self, name: &str, perm: NodeId, vtype: NodeId, default: Option<NodeId>, span: Span) -> NodeId {
        self.var_dcl(name, perm, vtype, default, span)
    }

    pub fn struct_dcl(
        &mut self,
        name: &str,
        fields: Vec<NodeId>,
        methods: Vec<NodeId>,
        flags: NodeFlags,
        span: Span,
    ) -> NodeId {
        let name = self.intern(name);
        let id = self.push(NodeKind::Struct { name, fields, methods, base: None }, span);
        self.arena[id].flags = flags;
        id
    }

    /// Declares `strct` as implementing/extending `base` (a trait).
    pub fn set_struct_base(&mut self, strct: NodeId, base: NodeId) {
        let NodeKind::Struct { base: slot, .. } = &mut self.arena[strct].kind else {
            panic!("set_struct_base on a non-struct node");
        };
        *slot = Some(base);
    }

    pub fn ref_type(&mut self, region: NodeId, perm: NodeId, vtexp: NodeId, span: Span) -> NodeId {
        self.push(NodeKind::Ref(RefType { region, perm, vtexp, scope: 0 }), span)
    }

    pub fn virt_ref_type(&mut self, region: NodeId, perm: NodeId, vtexp: NodeId, span: Span) -> NodeId {
        self.push(NodeKind::VirtRef(RefType { region, perm, vtexp, scope: 0 }), span)
    }

    pub fn array_ref_type(&mut self, region: NodeId, perm: NodeId, vtexp: NodeId, span: Span) -> NodeId {
        self.push(NodeKind::ArrayRef(RefType { region, perm, vtexp, scope: 0 }), span)
    }

    pub fn ptr_type(&mut self, vtexp: NodeId, span: Span) -> NodeId {
        self.push(NodeKind::Ptr { vtexp }, span)
    }

    pub fn array_type(&mut self, dim: u64, elem: NodeId, span: Span) -> NodeId {
        self.push(NodeKind::ArrayType { dim, elem }, span)
    }

    pub fn ttuple(&mut self, types: Vec<NodeId>, span: Span) -> NodeId {
        self.push(NodeKind::TTuple { types }, span)
    }

    // ---- internal reporting ----

    pub(crate) fn error_msg_node(&mut self, node: NodeId, kind: crate::errors::ErrorKind, msg: impl Into<String>) {
        let span = self.arena[node].span;
        self.errors.error(span, kind, msg);
    }

    pub(crate) fn internal_error(&mut self, node: NodeId, msg: impl Into<String>) {
        let span = self.arena[node].span;
        let tag: &'static str = self.arena.tag_name(node);
        let msg = format!("{} (node kind {tag})", msg.into());
        self.errors.error(span, crate::errors::ErrorKind::Internal, msg);
    }
}

impl std::fmt::Debug for CompileContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompileContext")
            .field("nodes", &self.arena.len())
            .field("errors", &self.errors.count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_installs_core_sentinels() {
        let ctx = CompileContext::new(ConeOptions::default());
        assert!(matches!(ctx.arena[NodeId::UNKNOWN].kind, NodeKind::Unknown));
        assert!(matches!(ctx.arena[NodeId::VOID].kind, NodeKind::Void));
        assert!(matches!(ctx.arena[NodeId::BORROW].kind, NodeKind::BorrowRegion));
    }

    #[test]
    fn usize_width_follows_options() {
        let ctx = CompileContext::new(ConeOptions { ptr_size: 32, ..ConeOptions::default() });
        match ctx.arena[ctx.core.usize_type].kind {
            NodeKind::UintNbr { bits, .. } => assert_eq!(bits, 32),
            _ => panic!("usize is not a uint type"),
        }
    }
}
