//! End-to-end pipeline tests.
//!
//! These exercise the complete mid-end through the public API:
//! 1. Build a function the way a lifter would (blocks + lifted statements)
//! 2. Run the pipeline (SSA waves, propagation, pruning, recovery)
//! 3. Verify the printer-ready result: folded constants, surviving phis,
//!    extracted calls, eliminated save/restore pairs, recovered structure

use pseudoscope::{
    cflow::Scope,
    frontend::ArchProfile,
    ir::{BasicBlock, BinaryOp, CmpOp, ExprId, ExprKind, Function, Statement},
    simplify::Simplifier,
    ssa::{relax_phis, NameClass, SsaBuilder, SsaContext},
    Config, Pipeline,
};

fn x64() -> &'static ArchProfile {
    ArchProfile::lookup("x64").expect("x64 profile")
}

/// Appends a block with the given successors; blocks without successors are
/// marked as exits.
fn add_block(func: &mut Function, addr: u64, jump: Option<u64>, fail: Option<u64>) -> usize {
    let mut block = BasicBlock::new(addr);
    block.set_jump(jump);
    block.set_fail(fail);
    if jump.is_none() && fail.is_none() {
        block.set_exit(true);
    }
    func.add_block(block)
}

/// Appends `reg = value` to a block.
fn assign_const(func: &mut Function, block: usize, addr: u64, reg: &str, value: i64) {
    let dst = func.arena_mut().reg(reg, 32);
    let val = func.arena_mut().val_signed(value, 32);
    let assign = func.arena_mut().assign(dst, val);
    func.block_mut(block)
        .unwrap()
        .container_mut()
        .push(Statement::expr(addr, assign));
}

/// Appends `dst = a + b` to a block.
fn assign_add(func: &mut Function, block: usize, addr: u64, dst: &str, a: &str, b: &str) {
    let left = func.arena_mut().reg(a, 32);
    let right = func.arena_mut().reg(b, 32);
    let sum = func.arena_mut().binary(BinaryOp::Add, left, right, 32);
    let dest = func.arena_mut().reg(dst, 32);
    let assign = func.arena_mut().assign(dest, sum);
    func.block_mut(block)
        .unwrap()
        .container_mut()
        .push(Statement::expr(addr, assign));
}

/// Appends `return reg` to a block.
fn ret_reg(func: &mut Function, block: usize, addr: u64, reg: &str) {
    let value = func.arena_mut().reg(reg, 32);
    func.block_mut(block)
        .unwrap()
        .container_mut()
        .push(Statement::ret(addr, Some(value)));
}

/// Renders every statement of a block.
fn rendered(func: &Function, block: usize) -> Vec<String> {
    func.block(block)
        .unwrap()
        .container()
        .stmts()
        .iter()
        .map(|s| s.render(func.arena()))
        .collect()
}

/// Counts the live phi nodes in the whole function.
fn live_phi_count(func: &Function) -> usize {
    func.arena()
        .live_ids()
        .filter(|&id| matches!(func.arena().kind(id), Some(ExprKind::Phi)))
        .count()
}

// ============================================================
// Scenario 1: straight-line arithmetic folds to a constant
// ============================================================

#[test]
fn test_straight_line_arithmetic_folds_to_constant() {
    // a = 2; b = 3; c = a + b; return c
    let mut func = Function::new(0x1000, "arith");
    let b0 = add_block(&mut func, 0x1000, None, None);
    assign_const(&mut func, b0, 0x1000, "a", 2);
    assign_const(&mut func, b0, 0x1004, "b", 3);
    assign_add(&mut func, b0, 0x1008, "c", "a", "b");
    ret_reg(&mut func, b0, 0x100c, "c");

    let pipeline = Pipeline::new(Config::default());
    pipeline.run(&mut func, x64()).expect("pipeline");

    // Everything propagated and folded: one statement, `return 5`
    assert_eq!(rendered(&func, 0), vec!["return 5".to_string()]);
    assert!(func.uninit().is_empty());
}

// ============================================================
// Scenario 2: diamond merge produces a surviving phi
// ============================================================

/// Builds `A -> {B, C} -> D` with `x = 1` in B, `x = 2` in C, `return x`
/// in D.
fn diamond_function() -> Function {
    let mut func = Function::new(0x2000, "diamond");
    add_block(&mut func, 0x2000, Some(0x2010), Some(0x2020));
    add_block(&mut func, 0x2010, Some(0x2030), None);
    add_block(&mut func, 0x2020, Some(0x2030), None);
    add_block(&mut func, 0x2030, None, None);
    assign_const(&mut func, 1, 0x2010, "x", 1);
    assign_const(&mut func, 2, 0x2020, "x", 2);
    ret_reg(&mut func, 3, 0x2030, "x");
    func
}

#[test]
fn test_diamond_phi_after_ssa_and_relaxation() {
    let mut func = diamond_function();
    let mut ctx = SsaContext::new();
    SsaBuilder::run(&mut func, &mut ctx, NameClass::Registers).expect("ssa");
    relax_phis(&mut func, &mut ctx);

    // D contains x_3 = Phi(x_1, x_2); return x_3
    assert_eq!(
        rendered(&func, 3),
        vec!["x_3 = Phi(x_1, x_2)".to_string(), "return x_3".to_string()]
    );

    // Subscripts stripped, the phi survives for the printer
    func.transform_out();
    assert_eq!(
        rendered(&func, 3),
        vec!["x = Phi(x, x)".to_string(), "return x".to_string()]
    );
    let no_idx = func
        .arena()
        .live_ids()
        .all(|id| func.arena().get(id).unwrap().idx().is_none());
    assert!(no_idx, "transform_out must erase every subscript");
}

#[test]
fn test_diamond_phi_survives_full_pipeline() {
    let mut func = diamond_function();
    let pipeline = Pipeline::new(Config::default());
    let output = pipeline.run(&mut func, x64()).expect("pipeline");

    // The merge keeps its phi (constants may propagate into the arguments)
    assert!(live_phi_count(&func) >= 1);

    // And the diamond is recognized as an if/else region
    let diamond = output.scopes.iter().any(|s| {
        matches!(
            s,
            Scope::Conditional {
                cond: 0,
                join: Some(3),
                ..
            }
        )
    });
    assert!(diamond, "expected a conditional scope: {:?}", output.scopes);
}

// ============================================================
// Scenario 3: loop counter keeps its header phi
// ============================================================

#[test]
fn test_loop_counter_phi_is_not_eliminated() {
    // 0: i = 0
    // 1 (header): if (i < 10) -> 2 else -> 3
    // 2: i = i + 1; -> 1
    // 3: return i
    let mut func = Function::new(0x3000, "counter");
    add_block(&mut func, 0x3000, Some(0x3010), None);
    add_block(&mut func, 0x3010, Some(0x3020), Some(0x3030));
    add_block(&mut func, 0x3020, Some(0x3010), None);
    add_block(&mut func, 0x3030, None, None);

    assign_const(&mut func, 0, 0x3000, "i", 0);

    let i_use = func.arena_mut().reg("i", 32);
    let ten = func.arena_mut().val(10, 32);
    let cond = func.arena_mut().cmp(CmpOp::Lt, i_use, ten, 1);
    func.block_mut(1)
        .unwrap()
        .container_mut()
        .push(Statement::branch(0x3010, cond));

    let i_old = func.arena_mut().reg("i", 32);
    let one = func.arena_mut().val(1, 32);
    let inc = func.arena_mut().binary(BinaryOp::Add, i_old, one, 32);
    let i_new = func.arena_mut().reg("i", 32);
    let assign = func.arena_mut().assign(i_new, inc);
    func.block_mut(2)
        .unwrap()
        .container_mut()
        .push(Statement::expr(0x3020, assign));

    ret_reg(&mut func, 3, 0x3030, "i");

    let pipeline = Pipeline::new(Config::default());
    let output = pipeline.run(&mut func, x64()).expect("pipeline");

    // Propagating the initial value must not eliminate the loop phi
    assert!(live_phi_count(&func) >= 1);

    // The loop is recovered with header block 1
    let has_loop = output
        .scopes
        .iter()
        .any(|s| matches!(s, Scope::Loop { header: 1, .. }));
    assert!(has_loop, "expected a loop scope: {:?}", output.scopes);
}

// ============================================================
// Scenario 4: dead store after call keeps the call's side effects
// ============================================================

#[test]
fn test_dead_call_result_is_extracted() {
    // eax = call(f); eax = 5; return eax
    let mut func = Function::new(0x4000, "deadcall");
    let b0 = add_block(&mut func, 0x4000, None, None);

    let callee = func.arena_mut().var("f", 64);
    let call = func.arena_mut().call(callee, &[], 32);
    let dst = func.arena_mut().reg("eax", 32);
    let assign = func.arena_mut().assign(dst, call);
    func.block_mut(b0)
        .unwrap()
        .container_mut()
        .push(Statement::expr(0x4000, assign));

    assign_const(&mut func, b0, 0x4004, "eax", 5);
    ret_reg(&mut func, b0, 0x4008, "eax");

    let pipeline = Pipeline::new(Config::default());
    pipeline.run(&mut func, x64()).expect("pipeline");

    // The call survives as a standalone statement; the overwritten result
    // and the second assignment are gone
    assert_eq!(
        rendered(&func, 0),
        vec!["f()".to_string(), "return 5".to_string()]
    );
}

// ============================================================
// Scenario 5: preserved callee-saved pair disappears
// ============================================================

#[test]
fn test_preserved_callee_saved_pair_is_eliminated() {
    // *(rsp - 8) = rbx   (prologue save)
    // rbx = 1            (body clobber)
    // eax = rbx
    // rbx = *(rsp - 8)   (epilogue restore)
    // return eax
    //
    // The clobbered value flows to the return; the save/restore pair must
    // vanish entirely.
    let mut func = Function::new(0x5000, "preserved");
    let b0 = add_block(&mut func, 0x5000, None, None);

    let rsp1 = func.arena_mut().reg("rsp", 64);
    let eight1 = func.arena_mut().val(8, 64);
    let addr1 = func.arena_mut().binary(BinaryOp::Sub, rsp1, eight1, 64);
    let store = func.arena_mut().deref(addr1, 64);
    let rbx_in = func.arena_mut().reg("rbx", 64);
    let save = func.arena_mut().assign(store, rbx_in);
    func.block_mut(b0)
        .unwrap()
        .container_mut()
        .push(Statement::expr(0x5000, save));

    assign_const(&mut func, b0, 0x5004, "rbx", 1);
    let rbx_body = func.arena_mut().reg("rbx", 64);
    let eax = func.arena_mut().reg("eax", 64);
    let body = func.arena_mut().assign(eax, rbx_body);
    func.block_mut(b0)
        .unwrap()
        .container_mut()
        .push(Statement::expr(0x5008, body));

    let rsp2 = func.arena_mut().reg("rsp", 64);
    let eight2 = func.arena_mut().val(8, 64);
    let addr2 = func.arena_mut().binary(BinaryOp::Sub, rsp2, eight2, 64);
    let load = func.arena_mut().deref(addr2, 64);
    let rbx_out = func.arena_mut().reg("rbx", 64);
    let restore = func.arena_mut().assign(rbx_out, load);
    func.block_mut(b0)
        .unwrap()
        .container_mut()
        .push(Statement::expr(0x500c, restore));

    ret_reg(&mut func, b0, 0x5010, "eax");

    let pipeline = Pipeline::new(Config::default());
    let output = pipeline.run(&mut func, x64()).expect("pipeline");

    // The pair was detected...
    assert_eq!(output.ctx.preserved().len(), 1);
    assert_eq!(output.ctx.preserved()[0].name, "rbx");

    // ...and neither the save nor the restore is left in the IR
    let lines = rendered(&func, 0);
    assert!(
        lines.iter().all(|l| !l.contains("rsp")),
        "save/restore should be gone: {lines:?}"
    );
    assert_eq!(lines, vec!["return 1".to_string()]);
}

// ============================================================
// Scenario 6: relational convergence
// ============================================================

#[test]
fn test_relational_convergence_in_branch_condition() {
    // if ((x < y) || (x == y)) ...  =>  if (x <= y) ...
    let mut func = Function::new(0x6000, "converge");
    add_block(&mut func, 0x6000, Some(0x6010), Some(0x6020));
    add_block(&mut func, 0x6010, None, None);
    add_block(&mut func, 0x6020, None, None);

    let x1 = func.arena_mut().reg("x", 32);
    let y1 = func.arena_mut().reg("y", 32);
    let lt = func.arena_mut().cmp(CmpOp::Lt, x1, y1, 1);
    let x2 = func.arena_mut().reg("x", 32);
    let y2 = func.arena_mut().reg("y", 32);
    let eq = func.arena_mut().cmp(CmpOp::Eq, x2, y2, 1);
    let or = func.arena_mut().binary(BinaryOp::BoolOr, lt, eq, 1);
    func.block_mut(0)
        .unwrap()
        .container_mut()
        .push(Statement::branch(0x6000, or));
    ret_reg(&mut func, 1, 0x6010, "x");
    ret_reg(&mut func, 2, 0x6020, "y");

    let pipeline = Pipeline::new(Config::default());
    pipeline.run(&mut func, x64()).expect("pipeline");

    assert_eq!(rendered(&func, 0), vec!["if (x <= y)".to_string()]);
}

#[test]
fn test_convergence_disabled_keeps_disjunction() {
    let mut arena = pseudoscope::ir::ExprArena::new();
    let x1 = arena.reg("x", 32);
    let y1 = arena.reg("y", 32);
    let lt = arena.cmp(CmpOp::Lt, x1, y1, 1);
    let x2 = arena.reg("x", 32);
    let y2 = arena.reg("y", 32);
    let eq = arena.cmp(CmpOp::Eq, x2, y2, 1);
    let or = arena.binary(BinaryOp::BoolOr, lt, eq, 1);

    let result = Simplifier::new(&mut arena, false).reduce_expr(or);
    assert_eq!(arena.render(result), "((x < y) || (x == y))");
}

// ============================================================
// Cross-cutting properties
// ============================================================

#[test]
fn test_transform_out_leaves_no_subscripts() {
    let mut func = diamond_function();
    let pipeline = Pipeline::new(Config::default());
    pipeline.run(&mut func, x64()).expect("pipeline");

    for id in func.arena().live_ids().collect::<Vec<ExprId>>() {
        assert_eq!(
            func.arena().get(id).unwrap().idx(),
            None,
            "expression {id} kept a subscript past transform_out"
        );
    }
}

#[test]
fn test_simplification_is_idempotent() {
    let mut arena = pseudoscope::ir::ExprArena::new();
    let x = arena.reg("x", 32);
    let y = arena.reg("y", 32);
    let sub = arena.binary(BinaryOp::Sub, x, y, 32);
    let zero = arena.val(0, 32);
    let eq = arena.cmp(CmpOp::Eq, sub, zero, 1);
    let not = arena.unary(pseudoscope::ir::UnaryOp::BoolNot, eq, 1);

    let once = Simplifier::new(&mut arena, true).reduce_expr(not);
    let first = arena.render(once);
    let twice = Simplifier::new(&mut arena, true).reduce_expr(once);
    assert_eq!(once, twice);
    assert_eq!(first, arena.render(twice));
    // !(x - y == 0) -> !(x == y) -> x != y
    assert_eq!(first, "(x != y)");
}

#[test]
fn test_unreachable_blocks_are_dropped() {
    let mut func = Function::new(0x7000, "orphan");
    add_block(&mut func, 0x7000, None, None);
    // Never referenced by any edge
    add_block(&mut func, 0x7100, None, None);
    assign_const(&mut func, 0, 0x7000, "eax", 1);
    ret_reg(&mut func, 0, 0x7004, "eax");
    assign_const(&mut func, 1, 0x7100, "ebx", 2);

    let pipeline = Pipeline::new(Config::default());
    pipeline.run(&mut func, x64()).expect("pipeline");

    assert_eq!(func.blocks().len(), 1);
    assert_eq!(func.block(0).unwrap().addr(), 0x7000);
}

#[test]
fn test_fallthrough_blocks_merge_for_printing() {
    // 0 -> 1 -> 2, single edges everywhere: one printable block
    let mut func = Function::new(0x8000, "chain");
    add_block(&mut func, 0x8000, Some(0x8010), None);
    add_block(&mut func, 0x8010, Some(0x8020), None);
    add_block(&mut func, 0x8020, None, None);
    assign_const(&mut func, 0, 0x8000, "a", 1);
    assign_const(&mut func, 1, 0x8010, "b", 2);
    assign_add(&mut func, 2, 0x8020, "c", "a", "b");
    ret_reg(&mut func, 2, 0x8024, "c");

    let pipeline = Pipeline::new(Config::default());
    pipeline.run(&mut func, x64()).expect("pipeline");

    assert_eq!(func.blocks().len(), 1);
    assert_eq!(rendered(&func, 0), vec!["return 3".to_string()]);
}
