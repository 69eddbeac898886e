//! Generic declaration handling: skipped until instantiation, then cloned,
//! substituted and run through the normal passes.

use cone::{CompileContext, ConeOptions, NodeId, NodeKind, Span, compile, instantiate_fn, itype_get_type_dcl};

const S: Span = Span::NONE;

/// Builds `fn id[T](v T) T { v }` inside a module and returns (program, fn).
fn generic_identity(ctx: &mut CompileContext) -> (NodeId, NodeId) {
    let mut_perm = ctx.core.mut_perm;
    let t_param = ctx.generic_param("T", S);
    let t_use_parm = ctx.name_use("T", S);
    let v = ctx.parm_dcl("v", mut_perm, t_use_parm, None, S);
    let t_use_ret = ctx.name_use("T", S);
    let v_use = ctx.name_use("v", S);
    let body = ctx.block(vec![v_use], S);
    let sig = ctx.fn_sig(vec![v], t_use_ret, S);
    let f = ctx.fn_dcl("id", sig, Some(body), S);
    ctx.set_generic(f, vec![t_param]);
    let module = ctx.module(Some("main"), vec![f], S);
    let program = ctx.program(vec![module], S);
    (program, f)
}

/// A generic function passes the pipeline unchecked: no vtype is inferred in
/// its body until an instantiation asks for one.
#[test]
fn generic_function_is_skipped_until_instantiated() {
    let mut ctx = CompileContext::new(ConeOptions::default());
    let (program, f) = generic_identity(&mut ctx);
    compile(&mut ctx, program).unwrap();

    let NodeKind::FnDcl { body: Some(body), generic, .. } = ctx.arena[f].kind.clone() else {
        panic!("fn lost its shape");
    };
    assert!(generic.is_some(), "generic info must survive the pipeline");
    // The body was resolved but not checked: its trailing expression is
    // still untyped and was not rewritten into a return.
    let NodeKind::Block { stmts } = ctx.arena[body].kind.clone() else { panic!() };
    assert!(matches!(ctx.arena[stmts[0]].kind, NodeKind::VarNameUse { .. }));
    assert_eq!(ctx.vtype_of(stmts[0]), NodeId::UNKNOWN);
}

/// Instantiation deep-clones, substitutes the type argument and runs the
/// normal checks on the clone, leaving the original untouched.
#[test]
fn instantiation_substitutes_and_checks() {
    let mut ctx = CompileContext::new(ConeOptions::default());
    let (program, f) = generic_identity(&mut ctx);
    compile(&mut ctx, program).unwrap();

    let i32t = ctx.core.i32_type;
    let inst = instantiate_fn(&mut ctx, f, &[i32t]).expect("instantiation failed");
    assert!(!ctx.errors.has_errors(), "instance must check cleanly: {:?}", ctx.errors.diagnostics());
    assert_ne!(inst, f);

    // The instance's signature resolves to the concrete argument type.
    let sig = itype_get_type_dcl(&ctx.arena, ctx.arena[inst].vtype);
    let NodeKind::FnSig { parms, rettype } = ctx.arena[sig].kind.clone() else { panic!() };
    assert_eq!(itype_get_type_dcl(&ctx.arena, rettype), i32t);
    assert_eq!(itype_get_type_dcl(&ctx.arena, ctx.arena[parms[0]].vtype), i32t);

    // The instance body was checked: implicit return inserted, value typed.
    let NodeKind::FnDcl { body: Some(body), generic, .. } = ctx.arena[inst].kind.clone() else { panic!() };
    assert!(generic.is_none());
    let NodeKind::Block { stmts } = ctx.arena[body].kind.clone() else { panic!() };
    let NodeKind::Return { exp, .. } = ctx.arena[*stmts.last().unwrap()].kind.clone() else {
        panic!("implicit return was not inserted");
    };
    assert_eq!(itype_get_type_dcl(&ctx.arena, ctx.vtype_of(exp)), i32t);

    // The original generic declaration stays unchecked.
    let NodeKind::FnDcl { generic, .. } = ctx.arena[f].kind.clone() else { panic!() };
    assert!(generic.is_some());
}

/// Arity of type arguments is enforced.
#[test]
fn instantiation_arity_is_checked() {
    let mut ctx = CompileContext::new(ConeOptions::default());
    let (program, f) = generic_identity(&mut ctx);
    compile(&mut ctx, program).unwrap();

    let i32t = ctx.core.i32_type;
    let u8t = ctx.core.u8_type;
    assert!(instantiate_fn(&mut ctx, f, &[i32t, u8t]).is_none());
    assert!(instantiate_fn(&mut ctx, f, &[]).is_none());
    assert!(ctx.errors.has_errors());
}
