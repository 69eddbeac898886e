//! End-to-end pipeline scenarios: programs built through the public
//! construction API, run through `compile`, checked for the types, rewrites
//! and diagnostics the passes are supposed to produce.

use cone::{CompileContext, ConeOptions, ErrorKind, NodeFlags, NodeId, NodeKind, Span, compile};

const S: Span = Span::NONE;

fn new_ctx() -> CompileContext {
    CompileContext::new(ConeOptions::default())
}

fn one_fn_program(ctx: &mut CompileContext, f: NodeId) -> NodeId {
    let module = ctx.module(Some("main"), vec![f], S);
    ctx.program(vec![module], S)
}

/// `fn f() { mut x = 0; x = 1 }` checks cleanly: x is mutable, both literals
/// type as i32 and the assignment coerces exactly.
#[test]
fn simple_assignment_checks() {
    let mut ctx = new_ctx();
    let mut_perm = ctx.core.mut_perm;
    let zero = ctx.ulit(0, S);
    let x = ctx.var_dcl("x", mut_perm, NodeId::UNKNOWN, Some(zero), S);
    let x_use = ctx.name_use("x", S);
    let one = ctx.ulit(1, S);
    let assign = ctx.assign(x_use, one, S);
    let body = ctx.block(vec![x, assign], S);
    let sig = ctx.fn_sig(vec![], NodeId::VOID, S);
    let f = ctx.fn_dcl("f", sig, Some(body), S);
    let program = one_fn_program(&mut ctx, f);

    compile(&mut ctx, program).unwrap();

    assert_eq!(ctx.vtype_of(x), ctx.core.i32_type);
    assert_eq!(ctx.vtype_of(x_use), ctx.core.i32_type);
    assert_eq!(ctx.vtype_of(assign), ctx.core.i32_type);
    // Flow flags are transient and must be cleared once the pass is done.
    match &ctx.arena[x].kind {
        NodeKind::VarDcl { flow, .. } => assert_eq!(*flow, cone::FlowFlags::NONE),
        _ => panic!("x is not a var decl"),
    }
}

/// Owned references move: assigning one to `_` consumes it, and a later use
/// of the source reports a move error.
#[test]
fn move_into_placeholder_consumes_source() {
    let mut ctx = new_ctx();
    let mut_perm = ctx.core.mut_perm;
    let point = ctx.struct_dcl("Point", vec![], vec![], NodeFlags::NONE, S);
    let heap = ctx.struct_dcl("Heap", vec![], vec![], NodeFlags::NONE, S);

    // fn f(r &Heap mut Point) { _ = r; mut x &Heap mut Point; x = r }
    let heap_use = ctx.name_use("Heap", S);
    let point_use = ctx.name_use("Point", S);
    let r_type = ctx.ref_type(heap_use, mut_perm, point_use, S);
    let r = ctx.parm_dcl("r", mut_perm, r_type, None, S);

    let anon = ctx.name_use("_", S);
    let r_use1 = ctx.name_use("r", S);
    let swallow = ctx.assign(anon, r_use1, S);

    let heap_use2 = ctx.name_use("Heap", S);
    let point_use2 = ctx.name_use("Point", S);
    let x_type = ctx.ref_type(heap_use2, mut_perm, point_use2, S);
    let x = ctx.var_dcl("x", mut_perm, x_type, None, S);
    let x_use = ctx.name_use("x", S);
    let r_use2 = ctx.name_use("r", S);
    let reuse = ctx.assign(x_use, r_use2, S);

    let body = ctx.block(vec![swallow, x, reuse], S);
    let sig = ctx.fn_sig(vec![r], NodeId::VOID, S);
    let f = ctx.fn_dcl("f", sig, Some(body), S);
    let module = ctx.module(Some("main"), vec![point, heap, f], S);
    let program = ctx.program(vec![module], S);

    let failure = compile(&mut ctx, program).unwrap_err();
    assert!(
        failure.diagnostics.iter().any(|d| d.kind == ErrorKind::Move),
        "expected a move diagnostic, got: {failure}"
    );
}

/// A borrow taken in an inner block may not be stored into an lval that
/// outlives it.
#[test]
fn escaping_borrow_is_rejected() {
    let mut ctx = new_ctx();
    let mut_perm = ctx.core.mut_perm;
    let imm_perm = ctx.core.imm_perm;
    let const_perm = ctx.core.const_perm;
    let i32t = ctx.core.i32_type;

    // fn f() { mut outer &i32; { imm inner = 42; outer = &inner } }
    let outer_type = ctx.ref_type(NodeId::BORROW, const_perm, i32t, S);
    let outer = ctx.var_dcl("outer", mut_perm, outer_type, None, S);

    let forty_two = ctx.ulit(42, S);
    let inner = ctx.var_dcl("inner", imm_perm, NodeId::UNKNOWN, Some(forty_two), S);
    let inner_use = ctx.name_use("inner", S);
    let borrow = ctx.borrow(inner_use, NodeId::UNKNOWN, S);
    let outer_use = ctx.name_use("outer", S);
    let escape = ctx.assign(outer_use, borrow, S);
    let inner_block = ctx.block(vec![inner, escape], S);

    let body = ctx.block(vec![outer, inner_block], S);
    let sig = ctx.fn_sig(vec![], NodeId::VOID, S);
    let f = ctx.fn_dcl("f", sig, Some(body), S);
    let program = one_fn_program(&mut ctx, f);

    let failure = compile(&mut ctx, program).unwrap_err();
    assert!(
        failure
            .diagnostics
            .iter()
            .any(|d| d.kind == ErrorKind::InvType && d.msg.contains("outlives")),
        "expected a borrow-escape diagnostic, got: {failure}"
    );
}

/// A method call through a reference receiver auto-derefs for lookup and is
/// rewritten to a direct call on the resolved declaration.
#[test]
fn method_call_via_auto_deref() {
    let mut ctx = new_ctx();
    let mut_perm = ctx.core.mut_perm;
    let imm_perm = ctx.core.imm_perm;
    let const_perm = ctx.core.const_perm;
    let i32t = ctx.core.i32_type;

    // struct Person { age i32; fn greet(self &Person) {} }
    let age = ctx.field_dcl("age", i32t, S);
    let person_use_self = ctx.name_use("Person", S);
    let self_type = ctx.ref_type(NodeId::BORROW, const_perm, person_use_self, S);
    let self_parm = ctx.parm_dcl("self", mut_perm, self_type, None, S);
    let greet_body = ctx.block(vec![], S);
    let greet_sig = ctx.fn_sig(vec![self_parm], NodeId::VOID, S);
    let greet = ctx.method_dcl("greet", greet_sig, Some(greet_body), S);
    let person = ctx.struct_dcl("Person", vec![age], vec![greet], NodeFlags::NONE, S);

    // fn visit(someone Person) { imm p = &someone; p.greet() }
    let person_use = ctx.name_use("Person", S);
    let someone = ctx.parm_dcl("someone", mut_perm, person_use, None, S);
    let someone_use = ctx.name_use("someone", S);
    let borrow = ctx.borrow(someone_use, NodeId::UNKNOWN, S);
    let p = ctx.var_dcl("p", imm_perm, NodeId::UNKNOWN, Some(borrow), S);
    let p_use = ctx.name_use("p", S);
    let greet_name = ctx.field_name("greet", S);
    let callee = ctx.fld_access(p_use, greet_name, S);
    let call = ctx.fncall(callee, vec![], S);
    let body = ctx.block(vec![p, call], S);
    let sig = ctx.fn_sig(vec![someone], NodeId::VOID, S);
    let visit = ctx.fn_dcl("visit", sig, Some(body), S);

    let module = ctx.module(Some("main"), vec![person, visit], S);
    let program = ctx.program(vec![module], S);
    compile(&mut ctx, program).unwrap();

    // The callee was rewritten to the resolved method and the receiver was
    // passed as the first argument.
    match &ctx.arena[callee].kind {
        NodeKind::VarNameUse { dcl, .. } => assert_eq!(*dcl, greet),
        other => panic!("callee was not rewritten to a direct use: {other:?}"),
    }
    match &ctx.arena[call].kind {
        NodeKind::FnCall { args, .. } => assert_eq!(args.first(), Some(&p_use)),
        _ => panic!("call node lost its shape"),
    }
    assert_eq!(ctx.vtype_of(call), NodeId::VOID);
}

/// Coercing `&Circle` to `&Shape` (virtual) structurally matches the struct
/// against the trait and attaches a one-entry vtable.
#[test]
fn virtual_reference_coercion_builds_vtable() {
    let mut ctx = new_ctx();
    let mut_perm = ctx.core.mut_perm;
    let imm_perm = ctx.core.imm_perm;
    let const_perm = ctx.core.const_perm;
    let f64t = ctx.core.f64_type;

    // trait Shape { fn area(self &Shape) f64 }
    let shape_use_self = ctx.name_use("Shape", S);
    let shape_self_type = ctx.ref_type(NodeId::BORROW, const_perm, shape_use_self, S);
    let shape_self = ctx.parm_dcl("self", mut_perm, shape_self_type, None, S);
    let area_sig = ctx.fn_sig(vec![shape_self], f64t, S);
    let area_dcl = ctx.method_dcl("area", area_sig, None, S);
    let shape = ctx.struct_dcl(
        "Shape",
        vec![],
        vec![area_dcl],
        NodeFlags::TRAIT_TYPE | NodeFlags::HAS_TAG_FIELD,
        S,
    );

    // struct Circle { fn area(self &Circle) f64 { 3.14 } }
    let circle_use_self = ctx.name_use("Circle", S);
    let circle_self_type = ctx.ref_type(NodeId::BORROW, const_perm, circle_use_self, S);
    let circle_self = ctx.parm_dcl("self", mut_perm, circle_self_type, None, S);
    let pi = ctx.flit_typed(3.14, f64t, S);
    let circle_area_body = ctx.block(vec![pi], S);
    let circle_area_sig = ctx.fn_sig(vec![circle_self], f64t, S);
    let circle_area = ctx.method_dcl("area", circle_area_sig, Some(circle_area_body), S);
    let circle = ctx.struct_dcl("Circle", vec![], vec![circle_area], NodeFlags::NONE, S);

    // fn draw(c Circle) { imm s &Shape = &c }
    let circle_use = ctx.name_use("Circle", S);
    let c = ctx.parm_dcl("c", mut_perm, circle_use, None, S);
    let shape_use = ctx.name_use("Shape", S);
    let s_type = ctx.virt_ref_type(NodeId::BORROW, const_perm, shape_use, S);
    let c_use = ctx.name_use("c", S);
    let borrow = ctx.borrow(c_use, NodeId::UNKNOWN, S);
    let s = ctx.var_dcl("s", imm_perm, s_type, Some(borrow), S);
    let body = ctx.block(vec![s], S);
    let sig = ctx.fn_sig(vec![c], NodeId::VOID, S);
    let draw = ctx.fn_dcl("draw", sig, Some(body), S);

    let module = ctx.module(Some("main"), vec![shape, circle, draw], S);
    let program = ctx.program(vec![module], S);
    compile(&mut ctx, program).unwrap();

    let vtable = ctx.vtable_for(shape, circle).expect("vtable was not synthesized");
    assert_eq!(vtable.impls.as_slice(), &[circle_area]);

    // The initializer was wrapped in an explicit ref-to-virtual conversion.
    match &ctx.arena[s].kind {
        NodeKind::VarDcl { value: Some(v), .. } => {
            assert!(
                matches!(ctx.arena[*v].kind, NodeKind::Convert { kind: cone::ConvKind::RefToVirt, .. }),
                "initializer was not wrapped in a conversion"
            );
        }
        _ => panic!("s lost its initializer"),
    }
}

/// Array literal forms: `[4, 0u32]` fills, a typed dimension coerces to
/// usize, and more than one fill value is malformed.
#[test]
fn array_literal_fill_forms() {
    let mut ctx = new_ctx();
    let u32t = ctx.core.u32_type;

    let dim = ctx.ulit(4, S);
    let fill = ctx.ulit_typed(0, u32t, S);
    let lit = ctx.array_lit_fill(dim, fill, S);
    let body = ctx.block(vec![lit], S);
    let sig = ctx.fn_sig(vec![], NodeId::VOID, S);
    let f = ctx.fn_dcl("f", sig, Some(body), S);
    let program = one_fn_program(&mut ctx, f);
    compile(&mut ctx, program).unwrap();

    match &ctx.arena[ctx.vtype_of(lit)].kind {
        NodeKind::ArrayType { dim, elem } => {
            assert_eq!(*dim, 4);
            assert_eq!(*elem, u32t);
        }
        other => panic!("array literal got type {other:?}"),
    }
    assert_eq!(ctx.vtype_of(dim), ctx.core.usize_type);
}

#[test]
fn array_literal_typed_dimension_coerces() {
    let mut ctx = new_ctx();
    let u32t = ctx.core.u32_type;

    let dim = ctx.ulit_typed(4, u32t, S);
    let fill = ctx.ulit(0, S);
    let lit = ctx.array_lit_fill(dim, fill, S);
    let body = ctx.block(vec![lit], S);
    let sig = ctx.fn_sig(vec![], NodeId::VOID, S);
    let f = ctx.fn_dcl("f", sig, Some(body), S);
    let program = one_fn_program(&mut ctx, f);
    compile(&mut ctx, program).unwrap();

    match &ctx.arena[ctx.vtype_of(lit)].kind {
        NodeKind::ArrayType { dim, .. } => assert_eq!(*dim, 4),
        other => panic!("array literal got type {other:?}"),
    }
}

#[test]
fn array_literal_rejects_multiple_fill_values() {
    let mut ctx = new_ctx();
    let u32t = ctx.core.u32_type;

    let dim = ctx.ulit(4, S);
    let v1 = ctx.ulit_typed(0, u32t, S);
    let v2 = ctx.ulit_typed(1, u32t, S);
    let lit = ctx.arena.push_kind(NodeKind::ArrayLit { dimens: vec![dim], elems: vec![v1, v2] }, S);
    let body = ctx.block(vec![lit], S);
    let sig = ctx.fn_sig(vec![], NodeId::VOID, S);
    let f = ctx.fn_dcl("f", sig, Some(body), S);
    let program = one_fn_program(&mut ctx, f);

    let failure = compile(&mut ctx, program).unwrap_err();
    assert!(failure.diagnostics.iter().any(|d| d.kind == ErrorKind::BadArray));
}

/// Parallel assignment requires equal tuple sizes on both sides; excess
/// rvalues are rejected rather than silently dropped.
#[test]
fn parallel_assignment_rejects_excess_rvals() {
    let mut ctx = new_ctx();
    let mut_perm = ctx.core.mut_perm;
    let zero = ctx.ulit(0, S);
    let a = ctx.var_dcl("a", mut_perm, NodeId::UNKNOWN, Some(zero), S);
    let one = ctx.ulit(1, S);
    let b = ctx.var_dcl("b", mut_perm, NodeId::UNKNOWN, Some(one), S);

    // a, b = 1, 2, 3
    let a_use = ctx.name_use("a", S);
    let b_use = ctx.name_use("b", S);
    let lvals = ctx.vtuple(vec![a_use, b_use], S);
    let r1 = ctx.ulit(1, S);
    let r2 = ctx.ulit(2, S);
    let r3 = ctx.ulit(3, S);
    let rvals = ctx.vtuple(vec![r1, r2, r3], S);
    let assign = ctx.assign(lvals, rvals, S);

    let body = ctx.block(vec![a, b, assign], S);
    let sig = ctx.fn_sig(vec![], NodeId::VOID, S);
    let f = ctx.fn_dcl("f", sig, Some(body), S);
    let program = one_fn_program(&mut ctx, f);

    let failure = compile(&mut ctx, program).unwrap_err();
    assert!(
        failure
            .diagnostics
            .iter()
            .any(|d| d.kind == ErrorKind::BadTerm && d.msg.contains("Too many tuple values")),
        "expected an excess-rvalue diagnostic, got: {failure}"
    );
}

/// Writing through an immutable binding after initialization is refused.
#[test]
fn immutable_rebinding_is_refused() {
    let mut ctx = new_ctx();
    let imm_perm = ctx.core.imm_perm;
    let zero = ctx.ulit(0, S);
    let x = ctx.var_dcl("x", imm_perm, NodeId::UNKNOWN, Some(zero), S);
    let x_use = ctx.name_use("x", S);
    let one = ctx.ulit(1, S);
    let assign = ctx.assign(x_use, one, S);
    let body = ctx.block(vec![x, assign], S);
    let sig = ctx.fn_sig(vec![], NodeId::VOID, S);
    let f = ctx.fn_dcl("f", sig, Some(body), S);
    let program = one_fn_program(&mut ctx, f);

    let failure = compile(&mut ctx, program).unwrap_err();
    assert!(failure.diagnostics.iter().any(|d| d.kind == ErrorKind::NoMut));
}

/// A borrow may not claim write access from a read-only place.
#[test]
fn borrow_cannot_gain_write_permission() {
    let mut ctx = new_ctx();
    let imm_perm = ctx.core.imm_perm;
    let mut_perm = ctx.core.mut_perm;
    let zero = ctx.ulit(0, S);
    let x = ctx.var_dcl("x", imm_perm, NodeId::UNKNOWN, Some(zero), S);
    let x_use = ctx.name_use("x", S);
    let borrow = ctx.borrow(x_use, mut_perm, S);
    let body = ctx.block(vec![x, borrow], S);
    let sig = ctx.fn_sig(vec![], NodeId::VOID, S);
    let f = ctx.fn_dcl("f", sig, Some(body), S);
    let program = one_fn_program(&mut ctx, f);

    let failure = compile(&mut ctx, program).unwrap_err();
    assert!(failure.diagnostics.iter().any(|d| d.kind == ErrorKind::BadPerm));
}

/// An unresolved name is an error for that site, and keeps the name table
/// balanced.
#[test]
fn undefined_name_reports_and_balances() {
    let mut ctx = new_ctx();
    let ghost = ctx.name_use("ghost", S);
    let body = ctx.block(vec![ghost], S);
    let sig = ctx.fn_sig(vec![], NodeId::VOID, S);
    let f = ctx.fn_dcl("f", sig, Some(body), S);
    let program = one_fn_program(&mut ctx, f);

    let failure = compile(&mut ctx, program).unwrap_err();
    assert!(failure.diagnostics.iter().any(|d| d.kind == ErrorKind::UnkName));
    assert_eq!(ctx.nametbl.depth(), 0);
}

/// Calls fall back on declared parameter defaults; missing defaults are an
/// arity error, as are surplus arguments.
#[test]
fn call_arity_and_defaults() {
    let mut ctx = new_ctx();
    let mut_perm = ctx.core.mut_perm;
    let i32t = ctx.core.i32_type;

    let default = ctx.ulit_typed(7, i32t, S);
    let n = ctx.parm_dcl("n", mut_perm, i32t, Some(default), S);
    let ret = ctx.name_use("n", S);
    let body = ctx.block(vec![ret], S);
    let sig = ctx.fn_sig(vec![n], i32t, S);
    let callee_fn = ctx.fn_dcl("ident", sig, Some(body), S);

    let ident_use = ctx.name_use("ident", S);
    let call = ctx.fncall(ident_use, vec![], S);
    let main_body = ctx.block(vec![call], S);
    let main_sig = ctx.fn_sig(vec![], NodeId::VOID, S);
    let main_fn = ctx.fn_dcl("main", main_sig, Some(main_body), S);

    let module = ctx.module(Some("main"), vec![callee_fn, main_fn], S);
    let program = ctx.program(vec![module], S);
    compile(&mut ctx, program).unwrap();

    match &ctx.arena[call].kind {
        NodeKind::FnCall { args, .. } => assert_eq!(args.as_slice(), &[default]),
        _ => panic!("call lost its shape"),
    }
    assert_eq!(ctx.vtype_of(call), i32t);
}

#[test]
fn too_many_arguments_is_fatal() {
    let mut ctx = new_ctx();
    let i32t = ctx.core.i32_type;

    let sig = ctx.fn_sig(vec![], NodeId::VOID, S);
    let empty_body = ctx.block(vec![], S);
    let callee_fn = ctx.fn_dcl("nop", sig, Some(empty_body), S);

    let nop_use = ctx.name_use("nop", S);
    let arg = ctx.ulit_typed(1, i32t, S);
    let call = ctx.fncall(nop_use, vec![arg], S);
    let main_body = ctx.block(vec![call], S);
    let main_sig = ctx.fn_sig(vec![], NodeId::VOID, S);
    let main_fn = ctx.fn_dcl("main", main_sig, Some(main_body), S);

    let module = ctx.module(Some("main"), vec![callee_fn, main_fn], S);
    let program = ctx.program(vec![module], S);
    let failure = compile(&mut ctx, program).unwrap_err();
    assert!(failure.diagnostics.iter().any(|d| d.kind == ErrorKind::ManyArgs));
}

/// A value-producing loop joins its break values; the loop types as the join
/// and the breaks carry dealias lists after flow.
#[test]
fn loop_break_value_types_the_loop() {
    let mut ctx = new_ctx();
    let mut_perm = ctx.core.mut_perm;
    let i32t = ctx.core.i32_type;

    // fn f() i32 { mut x = loop { break 5 }; x }
    let five = ctx.ulit(5, S);
    let brk = ctx.brk(None, Some(five), S);
    let loop_body = ctx.block(vec![brk], S);
    let the_loop = ctx.loop_(loop_body, None, S);
    let x = ctx.var_dcl("x", mut_perm, NodeId::UNKNOWN, Some(the_loop), S);
    let x_use = ctx.name_use("x", S);
    let body = ctx.block(vec![x, x_use], S);
    let sig = ctx.fn_sig(vec![], i32t, S);
    let f = ctx.fn_dcl("f", sig, Some(body), S);
    let program = one_fn_program(&mut ctx, f);
    compile(&mut ctx, program).unwrap();

    assert_eq!(ctx.vtype_of(the_loop), ctx.vtype_of(five));
    match &ctx.arena[the_loop].kind {
        NodeKind::Loop { breaks, .. } => assert_eq!(breaks.as_slice(), &[brk]),
        _ => panic!("loop lost its shape"),
    }
}

/// Implicit-return insertion happens once: re-running the type checker over
/// an already-checked function changes nothing.
#[test]
fn implicit_return_is_idempotent() {
    let mut ctx = new_ctx();
    let mut_perm = ctx.core.mut_perm;
    let zero = ctx.ulit(0, S);
    let x = ctx.var_dcl("x", mut_perm, NodeId::UNKNOWN, Some(zero), S);
    let body = ctx.block(vec![x], S);
    let sig = ctx.fn_sig(vec![], NodeId::VOID, S);
    let f = ctx.fn_dcl("f", sig, Some(body), S);
    let program = one_fn_program(&mut ctx, f);

    cone::name_resolve(&mut ctx, program);
    cone::type_check(&mut ctx, program);
    let NodeKind::Block { stmts } = ctx.arena[body].kind.clone() else { panic!() };
    let first = stmts.clone();
    assert!(matches!(ctx.arena[*stmts.last().unwrap()].kind, NodeKind::Return { .. }));

    cone::type_check(&mut ctx, program);
    let NodeKind::Block { stmts } = ctx.arena[body].kind.clone() else { panic!() };
    assert_eq!(stmts, first);
    assert!(!ctx.errors.has_errors());
}

/// Running name resolution twice yields the same bindings and no errors.
#[test]
fn name_resolution_is_idempotent() {
    let mut ctx = new_ctx();
    let mut_perm = ctx.core.mut_perm;
    let zero = ctx.ulit(0, S);
    let x = ctx.var_dcl("x", mut_perm, NodeId::UNKNOWN, Some(zero), S);
    let x_use = ctx.name_use("x", S);
    let one = ctx.ulit(1, S);
    let assign = ctx.assign(x_use, one, S);
    let body = ctx.block(vec![x, assign], S);
    let sig = ctx.fn_sig(vec![], NodeId::VOID, S);
    let f = ctx.fn_dcl("f", sig, Some(body), S);
    let program = one_fn_program(&mut ctx, f);

    cone::name_resolve(&mut ctx, program);
    assert!(!ctx.errors.has_errors());
    let first = match &ctx.arena[x_use].kind {
        NodeKind::VarNameUse { dcl, .. } => *dcl,
        other => panic!("x did not resolve: {other:?}"),
    };

    cone::name_resolve(&mut ctx, program);
    assert!(!ctx.errors.has_errors());
    match &ctx.arena[x_use].kind {
        NodeKind::VarNameUse { dcl, .. } => assert_eq!(*dcl, first),
        other => panic!("x lost its binding: {other:?}"),
    }
}
