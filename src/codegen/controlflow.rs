//! Control-flow lowering: branch diamonds, loop block quads, the switch
//! instruction with explicit fallthrough, and the defer stack. Deferred
//! calls replay in reverse registration order; `ret` unpacks every frame,
//! `brk`/`cont` unpack up to the innermost loop-base frame.

use super::expressions::{generate_to_i1, maybe_adjust_node};
use super::{generate, generate_type, CodegenContext, DeferMode, LoopContext, WrappedValue};
use crate::ast::{AstKind, NodeId};

/// Replays deferred statements. REGULAR covers the top frame only;
/// UNTIL_LOOP_BASE every frame down to and including the nearest loop
/// base; ALL the whole procedure.
pub fn unpack_defers(ctx: &mut CodegenContext<'_, '_>, mode: DeferMode) {
    let mut frames: Vec<Vec<NodeId>> = Vec::new();

    for frame in ctx.deferred_stmts.iter().rev() {
        frames.push(frame.stmts.clone());
        if mode == DeferMode::Regular {
            break;
        }
        if mode == DeferMode::UntilLoopBase && frame.loop_base {
            break;
        }
    }

    for frame in frames {
        for stmt in frame.iter().rev() {
            emit_deferred(*stmt, ctx);
        }
    }
}

/// Emits one saved defer node. `defer_if` re-evaluates its condition at
/// the unpack site and guards the call with a branch.
fn emit_deferred(node: NodeId, ctx: &mut CodegenContext<'_, '_>) {
    match ctx.ast.kind(node) {
        AstKind::Defer { call } => {
            let call = *call;
            generate(call, ctx);
            ctx.delete_casting_context();
        }
        AstKind::DeferIf { condition, call } => {
            let (condition, call) = (*condition, *call);

            let cond = maybe_adjust_node(condition, ctx);
            ctx.delete_casting_context();
            let cond_i1 = generate_to_i1(&cond, ctx);

            let then_blk = ctx.append_block("deferif.then");
            let cont_blk = ctx.append_block("deferif.cont");

            ctx.builder
                .build_conditional_branch(cond_i1, then_blk, cont_blk)
                .unwrap();

            ctx.builder.position_at_end(then_blk);
            generate(call, ctx);
            ctx.delete_casting_context();
            ctx.builder.build_unconditional_branch(cont_blk).unwrap();

            ctx.builder.position_at_end(cont_blk);
        }
        other => panic!("emit_deferred: {:?} is not a defer node", other),
    }
}

/// `defer` and `defer_if` emit nothing at their source position; the node
/// is saved on the top frame.
pub fn generate_defer<'ctx>(
    node: NodeId,
    ctx: &mut CodegenContext<'ctx, '_>,
) -> WrappedValue<'ctx> {
    assert!(ctx.inside_procedure());
    ctx.push_deferred_stmt(node);
    WrappedValue::empty()
}

pub fn generate_branch<'ctx>(
    node: NodeId,
    ctx: &mut CodegenContext<'ctx, '_>,
) -> WrappedValue<'ctx> {
    assert!(!ctx.casting_context_exists());
    assert!(ctx.inside_procedure());

    let (if_stmt, else_stmt) = match ctx.ast.kind(node) {
        AstKind::Branch { if_stmt, else_stmt } => (*if_stmt, *else_stmt),
        _ => unreachable!(),
    };

    let (condition, if_body) = match ctx.ast.kind(if_stmt) {
        AstKind::If { condition, body } => (*condition, body.clone()),
        _ => unreachable!(),
    };

    let cond = maybe_adjust_node(condition, ctx);
    ctx.delete_casting_context();
    let cond_i1 = generate_to_i1(&cond, ctx);

    let if_blk = ctx.append_block("branch.if");
    let else_blk = else_stmt.map(|_| ctx.append_block("branch.else"));
    let merge_blk = ctx.append_block("branch.merge");

    ctx.builder
        .build_conditional_branch(cond_i1, if_blk, else_blk.unwrap_or(merge_blk))
        .unwrap();

    ctx.push_defers(false);
    ctx.builder.position_at_end(if_blk);
    for child in &if_body {
        if ctx.ast.kind(*child).needs_generating() {
            generate(*child, ctx);
        }
        ctx.delete_casting_context();
    }

    if !ctx.curr_block_has_terminator() {
        unpack_defers(ctx, DeferMode::Regular);
        ctx.builder.build_unconditional_branch(merge_blk).unwrap();
    }
    ctx.pop_defers();

    if let (Some(else_stmt), Some(else_blk)) = (else_stmt, else_blk) {
        let else_body = match ctx.ast.kind(else_stmt) {
            AstKind::Else { body } => body.clone(),
            _ => unreachable!(),
        };

        ctx.push_defers(false);
        ctx.builder.position_at_end(else_blk);
        for child in &else_body {
            if ctx.ast.kind(*child).needs_generating() {
                generate(*child, ctx);
            }
            ctx.delete_casting_context();
        }

        if !ctx.curr_block_has_terminator() {
            unpack_defers(ctx, DeferMode::Regular);
            ctx.builder.build_unconditional_branch(merge_blk).unwrap();
        }
        ctx.pop_defers();
    }

    ctx.builder.position_at_end(merge_blk);
    WrappedValue::empty()
}

pub fn generate_blk<'ctx>(node: NodeId, ctx: &mut CodegenContext<'ctx, '_>) -> WrappedValue<'ctx> {
    assert!(ctx.inside_procedure());

    let children = match ctx.ast.kind(node) {
        AstKind::Block { children } => children.clone(),
        _ => unreachable!(),
    };

    ctx.push_defers(false);
    for child in &children {
        if ctx.ast.kind(*child).needs_generating() {
            generate(*child, ctx);
        }
        ctx.delete_casting_context();
    }

    if !ctx.curr_block_has_terminator() {
        unpack_defers(ctx, DeferMode::Regular);
    }

    ctx.pop_defers();
    WrappedValue::empty()
}

/// Switch lowering: one block per case, an LLVM `switch` to the default
/// block, per-case defer frames, and an explicit branch into the next case
/// block when a case is marked fallthrough.
pub fn generate_switch<'ctx>(
    node: NodeId,
    ctx: &mut CodegenContext<'ctx, '_>,
) -> WrappedValue<'ctx> {
    assert!(!ctx.casting_context_exists());
    assert!(ctx.inside_procedure());

    let (target, cases, default) = match ctx.ast.kind(node) {
        AstKind::Switch {
            target,
            cases,
            default,
        } => (*target, cases.clone(), *default),
        _ => unreachable!(),
    };

    let wrapped = maybe_adjust_node(target, ctx);
    ctx.delete_casting_context();

    let merge_blk = ctx.append_block("switch.merge");
    let default_blk = ctx.append_block("switch.default");
    let case_blks: Vec<_> = (0..cases.len())
        .map(|index| ctx.append_block(&format!("switch.case{}", index)))
        .collect();

    // Case values are constants of the target's type.
    let mut jump_table = Vec::with_capacity(cases.len());
    for (index, case) in cases.iter().enumerate() {
        let value = match ctx.ast.kind(*case) {
            AstKind::Case { value, .. } => *value,
            _ => unreachable!(),
        };

        if wrapped.ty.is_primitive() {
            ctx.set_casting_context(generate_type(ctx, &wrapped.ty), wrapped.ty.clone());
        }

        let case_val = maybe_adjust_node(value, ctx).expect_value().into_int_value();
        ctx.delete_casting_context();
        jump_table.push((case_val, case_blks[index]));
    }

    ctx.builder
        .build_switch(
            wrapped.expect_value().into_int_value(),
            default_blk,
            &jump_table,
        )
        .unwrap();

    for (index, case) in cases.iter().enumerate() {
        let (fallthrough, body) = match ctx.ast.kind(*case) {
            AstKind::Case {
                fallthrough, body, ..
            } => (*fallthrough, body.clone()),
            _ => unreachable!(),
        };

        ctx.push_defers(false);
        ctx.builder.position_at_end(case_blks[index]);
        for child in &body {
            if ctx.ast.kind(*child).needs_generating() {
                generate(*child, ctx);
            }
            ctx.delete_casting_context();
        }

        if !ctx.curr_block_has_terminator() {
            unpack_defers(ctx, DeferMode::Regular);
            let next = if fallthrough {
                *case_blks.get(index + 1).unwrap_or(&default_blk)
            } else {
                merge_blk
            };
            ctx.builder.build_unconditional_branch(next).unwrap();
        }
        ctx.pop_defers();
    }

    let default_body = match ctx.ast.kind(default) {
        AstKind::Default { body } => body.clone(),
        _ => unreachable!(),
    };

    ctx.push_defers(false);
    ctx.builder.position_at_end(default_blk);
    for child in &default_body {
        if ctx.ast.kind(*child).needs_generating() {
            generate(*child, ctx);
        }
        ctx.delete_casting_context();
    }

    if !ctx.curr_block_has_terminator() {
        unpack_defers(ctx, DeferMode::Regular);
        ctx.builder.build_unconditional_branch(merge_blk).unwrap();
    }
    ctx.pop_defers();

    ctx.builder.position_at_end(merge_blk);
    WrappedValue::empty()
}

pub fn generate_for<'ctx>(node: NodeId, ctx: &mut CodegenContext<'ctx, '_>) -> WrappedValue<'ctx> {
    assert!(!ctx.casting_context_exists());
    assert!(ctx.inside_procedure());

    let (init, condition, update, body) = match ctx.ast.kind(node) {
        AstKind::For {
            init,
            condition,
            update,
            body,
        } => (*init, *condition, *update, body.clone()),
        _ => unreachable!(),
    };

    if let Some(init) = init {
        generate(init, ctx);
        ctx.delete_casting_context();
    }

    let merge_blk = ctx.append_block("for.merge");
    let cond_blk = ctx.append_block("for.condition");
    let after_blk = ctx.append_block("for.after");
    let body_blk = ctx.append_block("for.body");
    let old_loop = ctx.leave_curr_loop();

    ctx.enter_loop(Some(LoopContext {
        after: after_blk,
        merge: merge_blk,
    }));
    ctx.push_defers(true);
    ctx.builder.build_unconditional_branch(cond_blk).unwrap();
    ctx.builder.position_at_end(cond_blk);

    match condition {
        Some(condition) => {
            let cond = maybe_adjust_node(condition, ctx);
            ctx.delete_casting_context();
            let cond_i1 = generate_to_i1(&cond, ctx);
            ctx.builder
                .build_conditional_branch(cond_i1, body_blk, merge_blk)
                .unwrap();
        }
        None => {
            ctx.builder.build_unconditional_branch(body_blk).unwrap();
        }
    }

    // The update clause runs in its own block and falls back to the
    // condition; `cont` targets it.
    ctx.builder.position_at_end(after_blk);
    if let Some(update) = update {
        generate(update, ctx);
        ctx.delete_casting_context();
    }
    ctx.builder.build_unconditional_branch(cond_blk).unwrap();

    ctx.builder.position_at_end(body_blk);
    for child in &body {
        if ctx.ast.kind(*child).needs_generating() {
            generate(*child, ctx);
        }
        ctx.delete_casting_context();
    }

    if !ctx.curr_block_has_terminator() {
        unpack_defers(ctx, DeferMode::Regular);
        ctx.builder.build_unconditional_branch(after_blk).unwrap();
    }

    ctx.pop_defers();
    ctx.builder.position_at_end(merge_blk);
    ctx.enter_loop(old_loop);
    WrappedValue::empty()
}

pub fn generate_while<'ctx>(
    node: NodeId,
    ctx: &mut CodegenContext<'ctx, '_>,
) -> WrappedValue<'ctx> {
    assert!(!ctx.casting_context_exists());
    assert!(ctx.inside_procedure());

    let (condition, body) = match ctx.ast.kind(node) {
        AstKind::While { condition, body } => (*condition, body.clone()),
        _ => unreachable!(),
    };

    let merge_blk = ctx.append_block("while.merge");
    let cond_blk = ctx.append_block("while.condition");
    let body_blk = ctx.append_block("while.body");
    let old_loop = ctx.leave_curr_loop();

    ctx.builder.build_unconditional_branch(cond_blk).unwrap();
    ctx.builder.position_at_end(cond_blk);

    let cond = maybe_adjust_node(condition, ctx);
    ctx.delete_casting_context();
    let cond_i1 = generate_to_i1(&cond, ctx);
    ctx.builder
        .build_conditional_branch(cond_i1, body_blk, merge_blk)
        .unwrap();

    ctx.builder.position_at_end(body_blk);
    ctx.enter_loop(Some(LoopContext {
        after: cond_blk,
        merge: merge_blk,
    }));
    ctx.push_defers(true);

    for child in &body {
        if ctx.ast.kind(*child).needs_generating() {
            generate(*child, ctx);
        }
        ctx.delete_casting_context();
    }

    if !ctx.curr_block_has_terminator() {
        unpack_defers(ctx, DeferMode::Regular);
        ctx.builder.build_unconditional_branch(cond_blk).unwrap();
    }

    ctx.pop_defers();
    ctx.enter_loop(old_loop);
    ctx.builder.position_at_end(merge_blk);
    WrappedValue::empty()
}

pub fn generate_dowhile<'ctx>(
    node: NodeId,
    ctx: &mut CodegenContext<'ctx, '_>,
) -> WrappedValue<'ctx> {
    assert!(!ctx.casting_context_exists());
    assert!(ctx.inside_procedure());

    let (condition, body) = match ctx.ast.kind(node) {
        AstKind::DoWhile { condition, body } => (*condition, body.clone()),
        _ => unreachable!(),
    };

    let merge_blk = ctx.append_block("dowhile.merge");
    let cond_blk = ctx.append_block("dowhile.condition");
    let body_blk = ctx.append_block("dowhile.body");
    let old_loop = ctx.leave_curr_loop();

    ctx.enter_loop(Some(LoopContext {
        after: cond_blk,
        merge: merge_blk,
    }));
    ctx.push_defers(true);
    ctx.builder.build_unconditional_branch(body_blk).unwrap();
    ctx.builder.position_at_end(body_blk);

    for child in &body {
        if ctx.ast.kind(*child).needs_generating() {
            generate(*child, ctx);
        }
        ctx.delete_casting_context();
    }

    if !ctx.curr_block_has_terminator() {
        unpack_defers(ctx, DeferMode::Regular);
        ctx.builder.build_unconditional_branch(cond_blk).unwrap();
    }
    ctx.pop_defers();

    ctx.builder.position_at_end(cond_blk);
    let cond = maybe_adjust_node(condition, ctx);
    ctx.delete_casting_context();
    let cond_i1 = generate_to_i1(&cond, ctx);
    ctx.builder
        .build_conditional_branch(cond_i1, body_blk, merge_blk)
        .unwrap();

    ctx.builder.position_at_end(merge_blk);
    ctx.enter_loop(old_loop);
    WrappedValue::empty()
}

/// `ret` unpacks every defer frame in the procedure before returning.
pub fn generate_ret<'ctx>(node: NodeId, ctx: &mut CodegenContext<'ctx, '_>) -> WrappedValue<'ctx> {
    assert!(!ctx.casting_context_exists());
    assert!(ctx.inside_procedure());

    let value = match ctx.ast.kind(node) {
        AstKind::Ret { value } => *value,
        _ => unreachable!(),
    };

    unpack_defers(ctx, DeferMode::All);

    let return_type = ctx
        .tbl
        .lookup_symbol(ctx.proc().sym_index)
        .expect("current procedure has a symbol")
        .ty
        .return_type
        .clone();

    let return_type = match return_type {
        Some(return_type) => return_type,
        None => {
            ctx.builder.build_return(None).unwrap();
            return WrappedValue::empty();
        }
    };

    if return_type.is_primitive() {
        ctx.set_casting_context(generate_type(ctx, &return_type), (*return_type).clone());
    }

    let value = value.expect("checker validated the return shape");
    let adjusted = maybe_adjust_node(value, ctx);
    ctx.delete_casting_context();

    ctx.builder
        .build_return(Some(&adjusted.expect_value()))
        .unwrap();
    WrappedValue::empty()
}

/// `brk` unpacks defers up to (and including) the loop-base frame, then
/// branches to the loop's merge block.
pub fn generate_brk<'ctx>(ctx: &mut CodegenContext<'ctx, '_>) -> WrappedValue<'ctx> {
    assert!(ctx.inside_procedure());
    assert!(ctx.inside_loop());
    assert!(!ctx.deferred_stmts.is_empty());

    unpack_defers(ctx, DeferMode::UntilLoopBase);
    let merge = ctx.curr_loop.expect("inside a loop").merge;
    ctx.builder.build_unconditional_branch(merge).unwrap();
    WrappedValue::empty()
}

/// `cont` unpacks like `brk` but branches to the loop's after block.
pub fn generate_cont<'ctx>(ctx: &mut CodegenContext<'ctx, '_>) -> WrappedValue<'ctx> {
    assert!(ctx.inside_procedure());
    assert!(ctx.inside_loop());
    assert!(!ctx.deferred_stmts.is_empty());

    unpack_defers(ctx, DeferMode::UntilLoopBase);
    let after = ctx.curr_loop.expect("inside a loop").after;
    ctx.builder.build_unconditional_branch(after).unwrap();
    WrappedValue::empty()
}
