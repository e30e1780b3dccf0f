//! IR-level assertions: the emitted module is rendered to text and checked
//! for the structural properties the language guarantees, most notably
//! defer ordering, loop-local defer unpacking, short-circuit control flow
//! and the switch lowering.

use inkwell::context::Context;
use takc::checker;
use takc::codegen;
use takc::error::ErrorSink;
use takc::lexer::Lexer;
use takc::parser::{parse_file, Parser};
use takc::postparse;

fn compile_to_ir(source: &str) -> String {
    let mut parser = Parser::new();
    let mut lxr = Lexer::new(source, "test.tak", false);

    let parsed = parse_file(&mut parser, &mut lxr);
    assert!(
        parsed && !lxr.errs.failed(),
        "parse failed: {:?}",
        lxr.errs.diagnostics()
    );

    let mut post_errs = ErrorSink::new(false);
    assert!(
        postparse::permute_generic_structures(&mut parser, &mut post_errs),
        "postparse failed: {:?}",
        post_errs.diagnostics()
    );

    let check_errs = checker::check(&mut parser, false);
    assert!(
        !check_errs.failed(),
        "check failed: {:?}",
        check_errs.diagnostics()
    );

    let context = Context::create();
    let module = codegen::generate_module(
        &context,
        "test",
        &parser.tbl,
        &parser.ast,
        &parser.toplevel_decls,
    );

    module.print_to_string().to_string()
}

/// The body of one function in the rendered module.
fn function_body<'a>(ir: &'a str, name: &str) -> &'a str {
    let needle = format!("@{}(", name);
    let start = ir
        .match_indices("define")
        .map(|(idx, _)| idx)
        .find(|&idx| ir[idx..].lines().next().unwrap_or("").contains(&needle))
        .unwrap_or_else(|| panic!("function {} not found in IR:\n{}", name, ir));

    let rest = &ir[start..];
    let end = rest.find("\n}").map(|idx| idx + 2).unwrap_or(rest.len());
    &rest[..end]
}

#[test]
fn defers_unpack_in_reverse_order_before_ret() {
    let ir = compile_to_ir(
        "a :: proc() -> void { ret; }\n\
         b :: proc() -> void { ret; }\n\
         c :: proc() -> void { ret; }\n\
         main :: proc() -> void { defer a(); defer b(); defer c(); ret; }\n",
    );

    let body = function_body(&ir, "main");
    let pos_a = body.find("call void @a()").expect("a is called");
    let pos_b = body.find("call void @b()").expect("b is called");
    let pos_c = body.find("call void @c()").expect("c is called");
    let pos_ret = body.rfind("ret void").expect("main returns");

    assert!(pos_c < pos_b && pos_b < pos_a, "defers must replay in reverse");
    assert!(pos_a < pos_ret, "defers run before the return");
}

#[test]
fn loop_local_defer_runs_once_on_brk() {
    let ir = compile_to_ir(
        "cleanup :: proc() -> void { ret; }\n\
         main :: proc() -> void { for ;; { defer cleanup(); brk; } ret; }\n",
    );

    let body = function_body(&ir, "main");
    let count = body.matches("call void @cleanup()").count();
    assert_eq!(count, 1, "cleanup must be emitted exactly once:\n{}", body);

    let call_pos = body.find("call void @cleanup()").unwrap();
    let branch_pos = body[call_pos..]
        .find("br label %for.merge")
        .expect("brk branches to the loop merge block");
    assert!(branch_pos > 0);
}

#[test]
fn outer_defers_stay_out_of_loops() {
    let ir = compile_to_ir(
        "outer :: proc() -> void { ret; }\n\
         inner :: proc() -> void { ret; }\n\
         main :: proc() -> void {\n\
             defer outer();\n\
             for ;; { defer inner(); brk; }\n\
             ret;\n\
         }\n",
    );

    let body = function_body(&ir, "main");

    // The outer defer replays once (at ret), not inside the loop.
    assert_eq!(body.matches("call void @outer()").count(), 1);
    assert_eq!(body.matches("call void @inner()").count(), 1);

    let inner_pos = body.find("call void @inner()").unwrap();
    let outer_pos = body.find("call void @outer()").unwrap();
    assert!(inner_pos < outer_pos, "loop defer unpacks before function exit");
}

#[test]
fn conditional_and_short_circuits() {
    let ir = compile_to_ir(
        "f :: proc() -> bool { ret true; }\n\
         main :: proc(a: bool) -> bool { ret a && f(); }\n",
    );

    let body = function_body(&ir, "main");
    assert!(body.contains("and.rhs"), "short-circuit RHS block exists");
    assert!(body.contains("and.merge"));
    assert!(body.contains("phi i1"));

    // The call to f lives in the RHS block, behind the conditional branch.
    let rhs_label = body.find("and.rhs:").expect("RHS block label");
    let call_pos = body.find("call i1 @f()").expect("f is called");
    assert!(call_pos > rhs_label, "f must only evaluate on the RHS path");
}

#[test]
fn conditional_or_merges_with_phi() {
    let ir = compile_to_ir(
        "main :: proc(a: bool, b: bool) -> bool { ret a || b; }\n",
    );

    let body = function_body(&ir, "main");
    assert!(body.contains("or.rhs"));
    assert!(body.contains("phi i1"));
}

#[test]
fn switch_lowers_to_switch_instruction() {
    let ir = compile_to_ir(
        "main :: proc(x: i32) -> i32 {\n\
             switch x {\n\
                 case 1 { ret 10; }\n\
                 fallthrough 2 { }\n\
                 case 3 { ret 30; }\n\
                 default { ret 0; }\n\
             }\n\
             ret 1;\n\
         }\n",
    );

    let body = function_body(&ir, "main");
    assert!(body.contains("switch i32"), "switch instruction:\n{}", body);
    assert!(body.contains("switch.default"));
    assert!(body.contains("switch.case0"));

    // The fallthrough case branches into the following case block.
    let case1 = body.find("switch.case1:").expect("fallthrough case block");
    let branch = body[case1..]
        .find("br label %switch.case2")
        .expect("fallthrough branches to the next case");
    assert!(branch > 0);
}

#[test]
fn struct_layout_and_member_access() {
    let ir = compile_to_ir(
        "struct Point { x: i32, y: i32 }\n\
         origin : Point;\n\
         main :: proc() -> i32 { p : Point = { 1, 2 }; ret p.x; }\n",
    );

    assert!(ir.contains("%Point = type { i32, i32 }"));
    assert!(ir.contains("@origin = internal global %Point zeroinitializer"));

    let body = function_body(&ir, "main");
    assert!(body.contains("getelementptr"));
}

#[test]
fn generic_instantiation_gets_its_own_layout() {
    let ir = compile_to_ir(
        "struct Pair[T, U] { a: T, b: U }\n\
         main :: proc() -> i32 { x : Pair[i32, bool]; ret x.a; }\n",
    );

    assert!(
        ir.contains("%\"Pair[i32,bool]\" = type { i32, i1 }"),
        "mangled struct layout missing:\n{}",
        ir
    );
}

#[test]
fn string_literals_are_private_constants() {
    let ir = compile_to_ir("main :: proc() -> i8^ { ret \"hi\"; }\n");
    assert!(ir.contains("private"));
    assert!(ir.contains("c\"hi\\00\""));
}

#[test]
fn sizeof_folds_to_a_constant() {
    let ir = compile_to_ir("main :: proc() -> i32 { ret sizeof i64; }\n");
    let body = function_body(&ir, "main");
    assert!(body.contains("ret i32 8"), "sizeof i64 is 8 bytes:\n{}", body);
}

#[test]
fn while_loop_has_condition_body_merge_blocks() {
    let ir = compile_to_ir(
        "main :: proc() -> i32 { i : i32 = 0; while i < 10 { ++i; } ret i; }\n",
    );

    let body = function_body(&ir, "main");
    assert!(body.contains("while.condition"));
    assert!(body.contains("while.body"));
    assert!(body.contains("while.merge"));
}

#[test]
fn global_array_initializer_is_constant() {
    let ir = compile_to_ir("table : i32[3] = { 1, 2, 3 };\n");
    assert!(
        ir.contains("[3 x i32] [i32 1, i32 2, i32 3]"),
        "constant array initializer missing:\n{}",
        ir
    );
}

#[test]
fn variadic_foreign_proc_declares_with_ellipsis() {
    let ir = compile_to_ir(
        "@extern \"C\" printf :: proc(fmt: i8^, ...) -> i32;\n\
         main :: proc() -> i32 { ret printf(\"x\"); }\n",
    );

    assert!(ir.contains("declare i32 @printf(ptr, ...)"));
}

#[test]
fn enum_members_become_constant_globals() {
    let ir = compile_to_ir(
        "enum Color, u32 { RED = 1, GREEN, BLUE }\n\
         main :: proc() -> u32 { ret Color\\GREEN; }\n",
    );

    assert!(ir.contains("@\"Color\\\\GREEN\"") || ir.contains("@\"Color\\5CGREEN\""));
}

#[test]
fn pointer_arithmetic_uses_gep() {
    let ir = compile_to_ir("main :: proc(p: i32^) -> i32^ { ret p + 2; }\n");
    let body = function_body(&ir, "main");
    assert!(body.contains("getelementptr i32"));
}

#[test]
fn implicit_widening_uses_extension() {
    let ir = compile_to_ir(
        "main :: proc() -> i64 { x : i8 = 5; y : i64 = 0; y = x; ret y; }\n",
    );

    let body = function_body(&ir, "main");
    assert!(body.contains("sext i8"), "signed extension expected:\n{}", body);
}
