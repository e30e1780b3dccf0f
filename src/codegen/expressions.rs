//! Expression lowering: identifiers, literals, the full operator suite
//! (with pointer GEP arithmetic and short-circuit logic), calls, casts,
//! subscripts, member accesses and sizeof.

use super::{generate, generate_proc_signature, generate_type, CodegenContext, WrappedValue};
use crate::ast::{AstKind, NodeId, SizeofTarget};
use crate::entity::EntityFlags;
use crate::token::TokenType;
use crate::types::{TypeData, TypeFlags, TypeKind};
use inkwell::module::Linkage;
use inkwell::values::{BasicMetadataValueEnum, BasicValueEnum, IntValue};
use inkwell::{FloatPredicate, IntPredicate};

/// Loads loadable values and applies the casting-context coercion: FP
/// extension, integer extension/truncation by source signedness, and
/// int-to-float conversions.
pub fn maybe_adjust<'ctx>(
    mut wrapped: WrappedValue<'ctx>,
    ctx: &mut CodegenContext<'ctx, '_>,
) -> WrappedValue<'ctx> {
    assert!(wrapped.value.is_some());
    assert!(ctx.inside_procedure());

    if wrapped.ty.flags.contains(TypeFlags::ARRAY) {
        return wrapped;
    }

    if wrapped.loadable {
        let pointee = generate_type(ctx, &wrapped.ty);
        wrapped.value = Some(
            ctx.builder
                .build_load(pointee, wrapped.expect_pointer(), "load")
                .unwrap(),
        );
        wrapped.loadable = false;
    }

    let cast_ctx = match &ctx.casting_context {
        Some(cast_ctx) if wrapped.ty.is_primitive() => cast_ctx.clone(),
        _ => return wrapped,
    };

    let val = wrapped.expect_value();
    if val.get_type() == cast_ctx.llvm_t {
        return wrapped;
    }

    let adjusted: BasicValueEnum<'ctx> = if cast_ctx.tak_t.is_floating_point() {
        let target = cast_ctx.llvm_t.into_float_type();
        if wrapped.ty.is_floating_point() {
            ctx.builder
                .build_float_ext(val.into_float_value(), target, "fpext")
                .unwrap()
                .into()
        } else if wrapped.ty.is_signed_primitive() {
            ctx.builder
                .build_signed_int_to_float(val.into_int_value(), target, "sitofp")
                .unwrap()
                .into()
        } else {
            ctx.builder
                .build_unsigned_int_to_float(val.into_int_value(), target, "uitofp")
                .unwrap()
                .into()
        }
    } else if cast_ctx.tak_t.is_integer() {
        let target = cast_ctx.llvm_t.into_int_type();
        ctx.builder
            .build_int_cast_sign_flag(
                val.into_int_value(),
                target,
                wrapped.ty.is_signed_primitive(),
                "intcast",
            )
            .unwrap()
            .into()
    } else {
        panic!("maybe_adjust: unsupported implicit coercion target");
    };

    WrappedValue::create(adjusted, cast_ctx.tak_t, false)
}

pub fn maybe_adjust_node<'ctx>(
    node: NodeId,
    ctx: &mut CodegenContext<'ctx, '_>,
) -> WrappedValue<'ctx> {
    let generated = generate(node, ctx);
    maybe_adjust(generated, ctx)
}

pub fn generate_identifier<'ctx>(
    node: NodeId,
    ctx: &mut CodegenContext<'ctx, '_>,
) -> WrappedValue<'ctx> {
    assert!(ctx.inside_procedure());

    let sym_index = ctx.ast.identifier_symbol(node);
    let sym = ctx
        .tbl
        .lookup_symbol(sym_index)
        .expect("identifier symbol exists");

    let val = if sym.ty.kind == TypeKind::Procedure && !sym.ty.flags.contains(TypeFlags::POINTER) {
        let func = ctx
            .module
            .get_function(&sym.name)
            .expect("procedure was declared in the prologue");
        WrappedValue::create(
            func.as_global_value().as_pointer_value().into(),
            sym.ty.clone(),
            false,
        )
    } else if sym.flags.contains(EntityFlags::GLOBAL) {
        let global = ctx
            .module
            .get_global(&sym.name)
            .expect("global was declared in the prologue");
        WrappedValue::create(global.as_pointer_value().into(), sym.ty.clone(), true)
    } else {
        ctx.get_local(&sym_index.to_string())
    };

    if !ctx.casting_context_exists() && val.ty.is_primitive() {
        ctx.set_casting_context(generate_type(ctx, &val.ty), val.ty.clone());
    }

    val
}

/// Lowers a literal. Numeric literals consult the casting context,
/// defaulting to i64 / f64 when none is set; strings become private global
/// constants whose address is the value.
pub fn generate_singleton_literal<'ctx>(
    node: NodeId,
    ctx: &mut CodegenContext<'ctx, '_>,
) -> WrappedValue<'ctx> {
    let (literal_type, value) = match ctx.ast.kind(node) {
        AstKind::SingletonLiteral {
            literal_type,
            value,
        } => (*literal_type, value.clone()),
        _ => unreachable!(),
    };

    if literal_type == TokenType::StringLiteral {
        let str_val = ctx.context.const_string(value.as_bytes(), true);
        let global = ctx.module.add_global(str_val.get_type(), None, ".str");
        global.set_linkage(Linkage::Private);
        global.set_constant(true);
        global.set_initializer(&str_val);

        return WrappedValue::create(
            global.as_pointer_value().into(),
            TypeData::const_string(),
            false,
        );
    }

    if literal_type == TokenType::KwNullptr {
        return WrappedValue::create(
            ctx.ptr_t().const_null().into(),
            TypeData::const_voidptr(),
            false,
        );
    }

    if literal_type == TokenType::FloatLiteral {
        let lit_val = value
            .parse::<f64>()
            .expect("float literal was validated at parse time");

        if !ctx.casting_context_exists() {
            ctx.set_casting_context(ctx.context.f64_type().into(), TypeData::const_f64());
        }

        let cast_ctx = ctx.casting_context.clone().expect("context was just set");
        assert!(cast_ctx.llvm_t.is_float_type());

        return WrappedValue::create(
            cast_ctx
                .llvm_t
                .into_float_type()
                .const_float(lit_val)
                .into(),
            cast_ctx.tak_t,
            false,
        );
    }

    // Integers, characters and booleans.
    let lit_val: u64 = match literal_type {
        TokenType::CharacterLiteral => u64::from(value.bytes().next().unwrap_or(0)),
        TokenType::BooleanLiteral => u64::from(value == "true"),
        TokenType::IntegerLiteral => value
            .parse::<u64>()
            .expect("integer literal was validated at parse time"),
        _ => panic!("generate_singleton_literal: unexpected literal type"),
    };

    if !ctx.casting_context_exists() {
        ctx.set_casting_context(ctx.context.i64_type().into(), TypeData::const_u64());
    }

    let cast_ctx = ctx.casting_context.clone().expect("context was just set");
    let constant: BasicValueEnum<'ctx> = if cast_ctx.llvm_t.is_float_type() {
        cast_ctx
            .llvm_t
            .into_float_type()
            .const_float(lit_val as f64)
            .into()
    } else {
        cast_ctx
            .llvm_t
            .into_int_type()
            .const_int(lit_val, false)
            .into()
    };

    WrappedValue::create(constant, cast_ctx.tak_t, false)
}

// -- unary operators ----------------------------------------------------------

fn generate_address_of<'ctx>(
    operand: NodeId,
    ctx: &mut CodegenContext<'ctx, '_>,
) -> WrappedValue<'ctx> {
    let mut generated = generate(operand, ctx);
    assert!(generated.expect_value().is_pointer_value());

    generated.ty = generated
        .ty
        .get_pointer_to()
        .expect("checker validated the operand is addressable");
    generated.loadable = false;
    generated
}

fn generate_dereference<'ctx>(
    operand: NodeId,
    ctx: &mut CodegenContext<'ctx, '_>,
) -> WrappedValue<'ctx> {
    let mut generated = maybe_adjust_node(operand, ctx);
    let contained = generated
        .ty
        .get_contained()
        .expect("checker validated the operand dereferences");

    if generated.ty.flags.contains(TypeFlags::ARRAY) {
        let zero = ctx.context.i32_type().const_zero();
        let gep = unsafe {
            ctx.builder
                .build_gep(
                    generate_type(ctx, &generated.ty),
                    generated.expect_pointer(),
                    &[zero, zero],
                    "arraydecay",
                )
                .unwrap()
        };

        return WrappedValue::create(gep.into(), contained, true);
    }

    generated.loadable = true;
    generated.ty = contained;
    generated
}

fn generate_conditional_not<'ctx>(
    operand: NodeId,
    ctx: &mut CodegenContext<'ctx, '_>,
) -> WrappedValue<'ctx> {
    let generated = maybe_adjust_node(operand, ctx);
    let val = generated.expect_value();

    let cmp: IntValue<'ctx> = if val.is_float_value() {
        ctx.builder
            .build_float_compare(
                FloatPredicate::OEQ,
                val.into_float_value(),
                val.get_type().into_float_type().const_zero(),
                "not",
            )
            .unwrap()
    } else if val.is_pointer_value() {
        ctx.builder
            .build_is_null(val.into_pointer_value(), "not")
            .unwrap()
    } else {
        ctx.builder
            .build_int_compare(
                IntPredicate::EQ,
                val.into_int_value(),
                val.get_type().into_int_type().const_zero(),
                "not",
            )
            .unwrap()
    };

    WrappedValue::create(cmp.into(), TypeData::const_bool(), false)
}

fn generate_bitwise_not<'ctx>(
    operand: NodeId,
    ctx: &mut CodegenContext<'ctx, '_>,
) -> WrappedValue<'ctx> {
    let mut generated = maybe_adjust_node(operand, ctx);
    generated.value = Some(
        ctx.builder
            .build_not(generated.expect_value().into_int_value(), "bwnot")
            .unwrap()
            .into(),
    );
    generated.loadable = false;
    generated
}

fn generate_unary_minus<'ctx>(
    operand: NodeId,
    ctx: &mut CodegenContext<'ctx, '_>,
) -> WrappedValue<'ctx> {
    let mut generated = maybe_adjust_node(operand, ctx);

    generated.value = Some(if generated.ty.is_floating_point() {
        ctx.builder
            .build_float_neg(generated.expect_value().into_float_value(), "fneg")
            .unwrap()
            .into()
    } else {
        ctx.builder
            .build_int_neg(generated.expect_value().into_int_value(), "neg")
            .unwrap()
            .into()
    });

    generated.loadable = false;
    generated.ty.flip_sign();
    generated
}

fn generate_stepped<'ctx>(
    operand: NodeId,
    decrement: bool,
    ctx: &mut CodegenContext<'ctx, '_>,
) -> WrappedValue<'ctx> {
    let gen = generate(operand, ctx);
    assert!(gen.loadable);

    let pointee = generate_type(ctx, &gen.ty);
    let load = ctx
        .builder
        .build_load(pointee, gen.expect_pointer(), "load")
        .unwrap();

    let stepped: BasicValueEnum<'ctx> = if gen.ty.flags.contains(TypeFlags::POINTER) {
        let contained = gen
            .ty
            .get_contained()
            .expect("checker validated pointer arithmetic");
        let step = ctx
            .context
            .i64_type()
            .const_int(if decrement { u64::MAX } else { 1 }, true);

        unsafe {
            ctx.builder
                .build_gep(
                    generate_type(ctx, &contained),
                    load.into_pointer_value(),
                    &[step],
                    "ptrstep",
                )
                .unwrap()
                .into()
        }
    } else if gen.ty.is_floating_point() {
        let one = pointee.into_float_type().const_float(1.0);
        if decrement {
            ctx.builder
                .build_float_sub(load.into_float_value(), one, "fdec")
                .unwrap()
                .into()
        } else {
            ctx.builder
                .build_float_add(load.into_float_value(), one, "finc")
                .unwrap()
                .into()
        }
    } else {
        let one = pointee.into_int_type().const_int(1, false);
        if decrement {
            ctx.builder
                .build_int_sub(load.into_int_value(), one, "dec")
                .unwrap()
                .into()
        } else {
            ctx.builder
                .build_int_add(load.into_int_value(), one, "inc")
                .unwrap()
                .into()
        }
    };

    ctx.builder
        .build_store(gen.expect_pointer(), stepped)
        .unwrap();
    gen
}

pub fn generate_unaryexpr<'ctx>(
    node: NodeId,
    ctx: &mut CodegenContext<'ctx, '_>,
) -> WrappedValue<'ctx> {
    assert!(ctx.inside_procedure());

    let (op, operand) = match ctx.ast.kind(node) {
        AstKind::Unaryexpr { op, operand } => (*op, *operand),
        _ => unreachable!(),
    };

    match op {
        TokenType::BitwiseAnd => generate_address_of(operand, ctx),
        TokenType::XorOrPtr => generate_dereference(operand, ctx),
        TokenType::BitwiseNot => generate_bitwise_not(operand, ctx),
        TokenType::ConditionalNot => generate_conditional_not(operand, ctx),
        TokenType::Sub => generate_unary_minus(operand, ctx),
        TokenType::Increment => generate_stepped(operand, false, ctx),
        TokenType::Decrement => generate_stepped(operand, true, ctx),
        TokenType::Plus => maybe_adjust_node(operand, ctx),
        _ => panic!("generate_unaryexpr: invalid unary operator {:?}", op),
    }
}

// -- binary operators ---------------------------------------------------------

/// Emits the right operand; pointer arithmetic primes an i64 casting
/// context for the integral side.
fn generate_arith_rhs<'ctx>(
    right: NodeId,
    lhs_is_pointer: bool,
    ctx: &mut CodegenContext<'ctx, '_>,
) -> WrappedValue<'ctx> {
    if lhs_is_pointer {
        let saved = ctx.swap_casting_context(ctx.context.i64_type().into(), TypeData::const_u64());
        let adjusted = maybe_adjust_node(right, ctx);
        ctx.casting_context = saved;
        adjusted
    } else {
        maybe_adjust_node(right, ctx)
    }
}

/// The shared arithmetic core: pointer GEP for `+`/`-`, float ops, and
/// signedness-aware integer division and remainder.
fn arith_value<'ctx>(
    op: TokenType,
    ty: &TypeData,
    lhs: BasicValueEnum<'ctx>,
    rhs: BasicValueEnum<'ctx>,
    ctx: &mut CodegenContext<'ctx, '_>,
) -> BasicValueEnum<'ctx> {
    if ty.flags.contains(TypeFlags::POINTER) {
        let contained = ty
            .get_contained()
            .expect("checker validated pointer arithmetic");
        let pointee = generate_type(ctx, &contained);

        let offset = match op {
            TokenType::Plus => rhs.into_int_value(),
            TokenType::Sub => ctx
                .builder
                .build_int_neg(rhs.into_int_value(), "neg")
                .unwrap(),
            _ => panic!("arith_value: operator {:?} is invalid on pointers", op),
        };

        return unsafe {
            ctx.builder
                .build_gep(pointee, lhs.into_pointer_value(), &[offset], "ptrarith")
                .unwrap()
                .into()
        };
    }

    if ty.is_floating_point() {
        let (l, r) = (lhs.into_float_value(), rhs.into_float_value());
        return match op {
            TokenType::Plus => ctx.builder.build_float_add(l, r, "fadd").unwrap().into(),
            TokenType::Sub => ctx.builder.build_float_sub(l, r, "fsub").unwrap().into(),
            TokenType::Mul => ctx.builder.build_float_mul(l, r, "fmul").unwrap().into(),
            TokenType::Div => ctx.builder.build_float_div(l, r, "fdiv").unwrap().into(),
            TokenType::Mod => ctx.builder.build_float_rem(l, r, "frem").unwrap().into(),
            _ => panic!("arith_value: {:?} is not arithmetic", op),
        };
    }

    let (l, r) = (lhs.into_int_value(), rhs.into_int_value());
    let signed = ty.is_signed_primitive();

    match op {
        TokenType::Plus => ctx.builder.build_int_add(l, r, "add").unwrap().into(),
        TokenType::Sub => ctx.builder.build_int_sub(l, r, "sub").unwrap().into(),
        TokenType::Mul => ctx.builder.build_int_mul(l, r, "mul").unwrap().into(),
        TokenType::Div => {
            if signed {
                ctx.builder.build_int_signed_div(l, r, "sdiv").unwrap().into()
            } else {
                ctx.builder
                    .build_int_unsigned_div(l, r, "udiv")
                    .unwrap()
                    .into()
            }
        }
        TokenType::Mod => {
            if signed {
                ctx.builder.build_int_signed_rem(l, r, "srem").unwrap().into()
            } else {
                ctx.builder
                    .build_int_unsigned_rem(l, r, "urem")
                    .unwrap()
                    .into()
            }
        }
        _ => panic!("arith_value: {:?} is not arithmetic", op),
    }
}

fn generate_arith<'ctx>(
    op: TokenType,
    left: NodeId,
    right: NodeId,
    ctx: &mut CodegenContext<'ctx, '_>,
) -> WrappedValue<'ctx> {
    let og_ctx = ctx.delete_casting_context();
    let mut lhs = maybe_adjust_node(left, ctx);
    let rhs = generate_arith_rhs(right, lhs.ty.flags.contains(TypeFlags::POINTER), ctx);

    let ty = lhs.ty.clone();
    lhs.value = Some(arith_value(
        op,
        &ty,
        lhs.expect_value(),
        rhs.expect_value(),
        ctx,
    ));

    ctx.casting_context = og_ctx;
    lhs
}

fn compound_base(op: TokenType) -> TokenType {
    match op {
        TokenType::PlusEq => TokenType::Plus,
        TokenType::SubEq => TokenType::Sub,
        TokenType::MulEq => TokenType::Mul,
        TokenType::DivEq => TokenType::Div,
        TokenType::ModEq => TokenType::Mod,
        TokenType::BitwiseAndEq => TokenType::BitwiseAnd,
        TokenType::BitwiseOrEq => TokenType::BitwiseOr,
        TokenType::BitwiseXorEq => TokenType::XorOrPtr,
        TokenType::LshiftEq => TokenType::Lshift,
        TokenType::RshiftEq => TokenType::Rshift,
        _ => panic!("compound_base: {:?} is not a compound assignment", op),
    }
}

fn generate_arith_assign<'ctx>(
    op: TokenType,
    left: NodeId,
    right: NodeId,
    ctx: &mut CodegenContext<'ctx, '_>,
) -> WrappedValue<'ctx> {
    let og_ctx = ctx.delete_casting_context();
    let lhs = generate(left, ctx);
    let rhs = generate_arith_rhs(right, lhs.ty.flags.contains(TypeFlags::POINTER), ctx);

    assert!(lhs.loadable);
    let pointee = generate_type(ctx, &lhs.ty);
    let load = ctx
        .builder
        .build_load(pointee, lhs.expect_pointer(), "load")
        .unwrap();

    let ty = lhs.ty.clone();
    let result = arith_value(compound_base(op), &ty, load, rhs.expect_value(), ctx);
    ctx.builder
        .build_store(lhs.expect_pointer(), result)
        .unwrap();

    ctx.casting_context = og_ctx;
    lhs
}

fn bitwise_value<'ctx>(
    op: TokenType,
    ty: &TypeData,
    lhs: BasicValueEnum<'ctx>,
    rhs: BasicValueEnum<'ctx>,
    ctx: &mut CodegenContext<'ctx, '_>,
) -> BasicValueEnum<'ctx> {
    assert!(ty.is_integer());
    let (l, r) = (lhs.into_int_value(), rhs.into_int_value());

    match op {
        TokenType::BitwiseAnd => ctx.builder.build_and(l, r, "and").unwrap().into(),
        TokenType::BitwiseOr => ctx.builder.build_or(l, r, "or").unwrap().into(),
        TokenType::XorOrPtr => ctx.builder.build_xor(l, r, "xor").unwrap().into(),
        TokenType::Lshift => ctx.builder.build_left_shift(l, r, "shl").unwrap().into(),
        TokenType::Rshift => ctx
            .builder
            .build_right_shift(l, r, ty.is_signed_primitive(), "shr")
            .unwrap()
            .into(),
        _ => panic!("bitwise_value: {:?} is not bitwise", op),
    }
}

fn generate_bitwise<'ctx>(
    op: TokenType,
    left: NodeId,
    right: NodeId,
    ctx: &mut CodegenContext<'ctx, '_>,
) -> WrappedValue<'ctx> {
    let og_ctx = ctx.delete_casting_context();
    let mut lhs = maybe_adjust_node(left, ctx);
    let rhs = maybe_adjust_node(right, ctx);

    let ty = lhs.ty.clone();
    lhs.value = Some(bitwise_value(
        op,
        &ty,
        lhs.expect_value(),
        rhs.expect_value(),
        ctx,
    ));

    ctx.casting_context = og_ctx;
    lhs
}

fn generate_bitwise_assign<'ctx>(
    op: TokenType,
    left: NodeId,
    right: NodeId,
    ctx: &mut CodegenContext<'ctx, '_>,
) -> WrappedValue<'ctx> {
    let og_ctx = ctx.delete_casting_context();
    let lhs = generate(left, ctx);
    let rhs = maybe_adjust_node(right, ctx);

    assert!(lhs.loadable);
    let pointee = generate_type(ctx, &lhs.ty);
    let load = ctx
        .builder
        .build_load(pointee, lhs.expect_pointer(), "load")
        .unwrap();

    let ty = lhs.ty.clone();
    let result = bitwise_value(compound_base(op), &ty, load, rhs.expect_value(), ctx);
    ctx.builder
        .build_store(lhs.expect_pointer(), result)
        .unwrap();

    ctx.casting_context = og_ctx;
    lhs
}

/// Integer comparison predicates follow the signedness of the left-hand
/// type; pointers compare unsigned.
fn comparison_predicates(op: TokenType, signed: bool) -> (IntPredicate, FloatPredicate) {
    match op {
        TokenType::CompEquals => (IntPredicate::EQ, FloatPredicate::OEQ),
        TokenType::CompNotEquals => (IntPredicate::NE, FloatPredicate::ONE),
        TokenType::CompLt => (
            if signed { IntPredicate::SLT } else { IntPredicate::ULT },
            FloatPredicate::OLT,
        ),
        TokenType::CompLte => (
            if signed { IntPredicate::SLE } else { IntPredicate::ULE },
            FloatPredicate::OLE,
        ),
        TokenType::CompGt => (
            if signed { IntPredicate::SGT } else { IntPredicate::UGT },
            FloatPredicate::OGT,
        ),
        TokenType::CompGte => (
            if signed { IntPredicate::SGE } else { IntPredicate::UGE },
            FloatPredicate::OGE,
        ),
        _ => panic!("comparison_predicates: {:?} is not a comparison", op),
    }
}

fn generate_comparison<'ctx>(
    op: TokenType,
    left: NodeId,
    right: NodeId,
    ctx: &mut CodegenContext<'ctx, '_>,
) -> WrappedValue<'ctx> {
    let saved = ctx.delete_casting_context();
    let lhs = maybe_adjust_node(left, ctx);
    let rhs = maybe_adjust_node(right, ctx);

    let signed = lhs.ty.is_signed_primitive() && !lhs.ty.flags.contains(TypeFlags::POINTER);
    let (int_pred, float_pred) = comparison_predicates(op, signed);

    let lhs_val = lhs.expect_value();
    let rhs_val = rhs.expect_value();

    let cmp: IntValue<'ctx> = if lhs.ty.is_floating_point() {
        ctx.builder
            .build_float_compare(
                float_pred,
                lhs_val.into_float_value(),
                rhs_val.into_float_value(),
                "fcmp",
            )
            .unwrap()
    } else if lhs_val.is_pointer_value() {
        ctx.builder
            .build_int_compare(
                int_pred,
                lhs_val.into_pointer_value(),
                rhs_val.into_pointer_value(),
                "pcmp",
            )
            .unwrap()
    } else {
        ctx.builder
            .build_int_compare(
                int_pred,
                lhs_val.into_int_value(),
                rhs_val.into_int_value(),
                "icmp",
            )
            .unwrap()
    };

    ctx.casting_context = saved;
    WrappedValue::create(cmp.into(), TypeData::const_bool(), false)
}

/// Compares against zero/null to produce an i1 for branch conditions and
/// short-circuit operands.
pub fn generate_to_i1<'ctx>(
    wrapped: &WrappedValue<'ctx>,
    ctx: &mut CodegenContext<'ctx, '_>,
) -> IntValue<'ctx> {
    assert!(ctx.inside_procedure());
    let val = wrapped.expect_value();

    if wrapped.ty.is_boolean() {
        return val.into_int_value();
    }

    if wrapped.ty.flags.contains(TypeFlags::POINTER) {
        return ctx
            .builder
            .build_is_not_null(val.into_pointer_value(), "tobool")
            .unwrap();
    }

    if wrapped.ty.is_floating_point() {
        return ctx
            .builder
            .build_float_compare(
                FloatPredicate::ONE,
                val.into_float_value(),
                val.get_type().into_float_type().const_zero(),
                "tobool",
            )
            .unwrap();
    }

    ctx.builder
        .build_int_compare(
            IntPredicate::NE,
            val.into_int_value(),
            val.get_type().into_int_type().const_zero(),
            "tobool",
        )
        .unwrap()
}

/// `a && b`: a diamond whose PHI merges the short-circuited false with the
/// evaluated right side. The right block never runs when `a` is false.
fn generate_conditional_and<'ctx>(
    left: NodeId,
    right: NodeId,
    ctx: &mut CodegenContext<'ctx, '_>,
) -> WrappedValue<'ctx> {
    let saved = ctx.delete_casting_context();
    let lhs = maybe_adjust_node(left, ctx);

    let then_blk = ctx.append_block("and.rhs");
    let merge_blk = ctx.append_block("and.merge");
    let lhs_blk = ctx.builder.get_insert_block().expect("builder is placed");

    let lhs_i1 = generate_to_i1(&lhs, ctx);
    ctx.builder
        .build_conditional_branch(lhs_i1, then_blk, merge_blk)
        .unwrap();

    ctx.builder.position_at_end(then_blk);
    let rhs = maybe_adjust_node(right, ctx);
    let rhs_i1 = generate_to_i1(&rhs, ctx);
    let rhs_blk = ctx.builder.get_insert_block().expect("builder is placed");
    ctx.builder.build_unconditional_branch(merge_blk).unwrap();

    ctx.builder.position_at_end(merge_blk);
    let phi = ctx
        .builder
        .build_phi(ctx.context.bool_type(), "and.result")
        .unwrap();

    let const_false = ctx.context.bool_type().const_zero();
    phi.add_incoming(&[(&const_false, lhs_blk), (&rhs_i1, rhs_blk)]);

    ctx.casting_context = saved;
    WrappedValue::create(phi.as_basic_value(), TypeData::const_bool(), false)
}

fn generate_conditional_or<'ctx>(
    left: NodeId,
    right: NodeId,
    ctx: &mut CodegenContext<'ctx, '_>,
) -> WrappedValue<'ctx> {
    let saved = ctx.delete_casting_context();
    let lhs = maybe_adjust_node(left, ctx);
    let lhs_i1 = generate_to_i1(&lhs, ctx);

    let then_blk = ctx.append_block("or.rhs");
    let merge_blk = ctx.append_block("or.merge");
    let lhs_blk = ctx.builder.get_insert_block().expect("builder is placed");

    ctx.delete_casting_context();
    ctx.builder
        .build_conditional_branch(lhs_i1, merge_blk, then_blk)
        .unwrap();

    ctx.builder.position_at_end(then_blk);
    let rhs = maybe_adjust_node(right, ctx);
    let rhs_i1 = generate_to_i1(&rhs, ctx);
    let rhs_blk = ctx.builder.get_insert_block().expect("builder is placed");
    ctx.builder.build_unconditional_branch(merge_blk).unwrap();

    ctx.builder.position_at_end(merge_blk);
    let phi = ctx
        .builder
        .build_phi(ctx.context.bool_type(), "or.result")
        .unwrap();
    phi.add_incoming(&[(&lhs_i1, lhs_blk), (&rhs_i1, rhs_blk)]);

    ctx.casting_context = saved;
    WrappedValue::create(phi.as_basic_value(), TypeData::const_bool(), false)
}

/// `lhs = { ... }` for struct values: a GEP walk over the layout.
fn generate_assign_bracedexpr<'ctx>(
    left: NodeId,
    right: NodeId,
    ctx: &mut CodegenContext<'ctx, '_>,
) -> WrappedValue<'ctx> {
    let lhs = generate(left, ctx);
    assert!(lhs.ty.kind == TypeKind::Struct);
    assert!(!lhs.ty.flags.contains(TypeFlags::POINTER));

    let struct_name = lhs
        .ty
        .struct_name()
        .expect("struct type has a name")
        .to_string();
    let utype = ctx
        .tbl
        .lookup_type(&struct_name)
        .expect("checker resolved the struct")
        .clone();

    let llvm_t = generate_type(ctx, &lhs.ty);
    let mut gep_indices = vec![ctx.context.i32_type().const_zero()];

    super::declarations::generate_local_struct_init(
        lhs.expect_pointer(),
        llvm_t,
        &utype,
        right,
        &mut gep_indices,
        ctx,
    );

    lhs
}

fn generate_assign<'ctx>(
    left: NodeId,
    right: NodeId,
    ctx: &mut CodegenContext<'ctx, '_>,
) -> WrappedValue<'ctx> {
    if matches!(ctx.ast.kind(right), AstKind::BracedExpr { .. }) {
        return generate_assign_bracedexpr(left, right, ctx);
    }

    let og_ctx = ctx.delete_casting_context();
    let lhs = generate(left, ctx);
    let rhs = maybe_adjust_node(right, ctx);

    assert!(lhs.loadable);
    ctx.builder
        .build_store(lhs.expect_pointer(), rhs.expect_value())
        .unwrap();

    ctx.casting_context = og_ctx;
    lhs
}

pub fn generate_binexpr<'ctx>(
    node: NodeId,
    ctx: &mut CodegenContext<'ctx, '_>,
) -> WrappedValue<'ctx> {
    assert!(ctx.inside_procedure());

    let (op, left, right) = match ctx.ast.kind(node) {
        AstKind::Binexpr { op, left, right } => (*op, *left, *right),
        _ => unreachable!(),
    };

    use TokenType::*;
    match op {
        ValueAssignment => generate_assign(left, right, ctx),
        Plus | Sub | Mul | Div | Mod => generate_arith(op, left, right, ctx),
        PlusEq | SubEq | MulEq | DivEq | ModEq => generate_arith_assign(op, left, right, ctx),
        BitwiseAnd | BitwiseOr | XorOrPtr | Lshift | Rshift => {
            generate_bitwise(op, left, right, ctx)
        }
        BitwiseAndEq | BitwiseOrEq | BitwiseXorEq | LshiftEq | RshiftEq => {
            generate_bitwise_assign(op, left, right, ctx)
        }
        CompEquals | CompNotEquals | CompLt | CompLte | CompGt | CompGte => {
            generate_comparison(op, left, right, ctx)
        }
        ConditionalAnd => generate_conditional_and(left, right, ctx),
        ConditionalOr => generate_conditional_or(left, right, ctx),
        _ => panic!("generate_binexpr: invalid operator {:?}", op),
    }
}

// -- calls, casts, sizeof, subscripts, member access --------------------------

pub fn generate_call<'ctx>(
    node: NodeId,
    ctx: &mut CodegenContext<'ctx, '_>,
) -> WrappedValue<'ctx> {
    assert!(ctx.inside_procedure());

    let (target, arguments) = match ctx.ast.kind(node) {
        AstKind::Call { target, arguments } => (*target, arguments.clone()),
        _ => unreachable!(),
    };

    let saved = ctx.delete_casting_context();
    let callee = maybe_adjust_node(target, ctx);

    let mut callee_t = callee.ty.clone();
    if callee_t.flags.contains(TypeFlags::POINTER) {
        assert!(callee_t.pointer_depth == 1);
        callee_t.pointer_depth = 0;
        callee_t.flags.remove(TypeFlags::POINTER);
    }

    let fn_type = generate_proc_signature(ctx, &callee_t);
    let takes = callee_t.parameters.as_ref().map(Vec::len).unwrap_or(0);

    let mut args: Vec<BasicMetadataValueEnum<'ctx>> = Vec::with_capacity(arguments.len());
    for (index, arg) in arguments.iter().enumerate() {
        if index < takes {
            let param = callee_t.parameters.as_ref().expect("takes > 0")[index].clone();
            if param.is_primitive() {
                let llvm_t = generate_type(ctx, &param);
                ctx.set_casting_context(llvm_t, param);
            }
        }

        args.push(maybe_adjust_node(*arg, ctx).expect_value().into());
        ctx.delete_casting_context();
    }

    ctx.casting_context = saved;
    let call = ctx
        .builder
        .build_indirect_call(fn_type, callee.expect_pointer(), &args, "call")
        .unwrap();

    let return_type = match &callee_t.return_type {
        Some(return_type) => (**return_type).clone(),
        None => return WrappedValue::empty(),
    };

    // Returning calls get a reusable entry-block alloca per callee.
    let alloc_name = match ctx.ast.kind(target) {
        AstKind::Identifier { symbol_index } => {
            let sym = ctx
                .tbl
                .lookup_symbol(*symbol_index)
                .expect("call target symbol exists");
            if sym.ty.kind == TypeKind::Procedure && !sym.ty.flags.contains(TypeFlags::POINTER) {
                Some(format!("{}.returnalloc", sym.name))
            } else {
                None
            }
        }
        _ => None,
    };

    let key = alloc_name.as_deref().unwrap_or("returnalloc");
    let alloc = if alloc_name.is_some() && ctx.local_exists(key) {
        ctx.get_local(key).expect_pointer()
    } else {
        let ret_ll_t = generate_type(ctx, &return_type);
        ctx.create_entry_alloca(ret_ll_t, key)
    };

    let result = call
        .try_as_basic_value()
        .left()
        .expect("non-void call produces a value");
    ctx.builder.build_store(alloc, result).unwrap();

    let wrapped = WrappedValue::create(alloc.into(), return_type, true);
    if let Some(name) = alloc_name {
        if !ctx.local_exists(&name) {
            ctx.set_local(name, wrapped.clone());
        }
    }

    wrapped
}

/// Explicit cast lowering: disjoint conversion families, with pointer
/// bit-identity under opaque pointers.
pub fn generate_cast<'ctx>(
    node: NodeId,
    ctx: &mut CodegenContext<'ctx, '_>,
) -> WrappedValue<'ctx> {
    assert!(ctx.inside_procedure());

    let (target, cast_ty) = match ctx.ast.kind(node) {
        AstKind::Cast { target, ty } => (*target, ty.clone()),
        _ => unreachable!(),
    };

    let og_ctx = ctx.delete_casting_context();
    let wrapped = maybe_adjust_node(target, ctx);
    let val = wrapped.expect_value();

    let castval: BasicValueEnum<'ctx> = if cast_ty.is_floating_point() {
        let cast_t = generate_type(ctx, &cast_ty).into_float_type();

        if wrapped.ty.is_integer() {
            if wrapped.ty.is_signed_primitive() {
                ctx.builder
                    .build_signed_int_to_float(val.into_int_value(), cast_t, "sitofp")
                    .unwrap()
                    .into()
            } else {
                ctx.builder
                    .build_unsigned_int_to_float(val.into_int_value(), cast_t, "uitofp")
                    .unwrap()
                    .into()
            }
        } else if wrapped.ty.is_f32() && cast_ty.is_f64() {
            ctx.builder
                .build_float_ext(val.into_float_value(), cast_t, "fpext")
                .unwrap()
                .into()
        } else if wrapped.ty.is_f64() && cast_ty.is_f32() {
            ctx.builder
                .build_float_trunc(val.into_float_value(), cast_t, "fptrunc")
                .unwrap()
                .into()
        } else {
            val
        }
    } else if cast_ty.is_integer() {
        let cast_t = generate_type(ctx, &cast_ty).into_int_type();

        if wrapped.ty.is_floating_point() {
            if cast_ty.is_signed_primitive() {
                ctx.builder
                    .build_float_to_signed_int(val.into_float_value(), cast_t, "fptosi")
                    .unwrap()
                    .into()
            } else {
                ctx.builder
                    .build_float_to_unsigned_int(val.into_float_value(), cast_t, "fptoui")
                    .unwrap()
                    .into()
            }
        } else if wrapped.ty.is_integer() {
            ctx.builder
                .build_int_cast_sign_flag(
                    val.into_int_value(),
                    cast_t,
                    wrapped.ty.is_signed_primitive(),
                    "intcast",
                )
                .unwrap()
                .into()
        } else if wrapped.ty.flags.contains(TypeFlags::POINTER) {
            ctx.builder
                .build_ptr_to_int(val.into_pointer_value(), cast_t, "ptrtoint")
                .unwrap()
                .into()
        } else {
            panic!("generate_cast: invalid integer cast source");
        }
    } else if cast_ty.flags.contains(TypeFlags::POINTER) {
        if wrapped.ty.is_integer() {
            ctx.builder
                .build_int_to_ptr(val.into_int_value(), ctx.ptr_t(), "inttoptr")
                .unwrap()
                .into()
        } else if wrapped.ty.flags.contains(TypeFlags::POINTER) {
            // Opaque pointers are bit-identical.
            val
        } else {
            panic!("generate_cast: invalid pointer cast source");
        }
    } else {
        panic!("generate_cast: invalid cast target");
    };

    ctx.casting_context = og_ctx;
    WrappedValue::create(castval, cast_ty, false)
}

pub fn generate_sizeof<'ctx>(
    node: NodeId,
    ctx: &mut CodegenContext<'ctx, '_>,
) -> WrappedValue<'ctx> {
    let target = match ctx.ast.kind(node) {
        AstKind::Sizeof { target } => target.clone(),
        _ => unreachable!(),
    };

    let ty = match target {
        SizeofTarget::Type(ty) => ty,
        SizeofTarget::Expr(expr) => maybe_adjust_node(expr, ctx).ty,
    };

    assert!(!(ty.kind == TypeKind::Procedure && ty.pointer_depth == 0));

    let llvm_t = generate_type(ctx, &ty);
    let size = ctx
        .target_machine
        .get_target_data()
        .get_abi_size(&llvm_t);

    WrappedValue::create(
        ctx.context.i32_type().const_int(size, false).into(),
        TypeData::const_i32(),
        false,
    )
}

pub fn generate_subscript<'ctx>(
    node: NodeId,
    ctx: &mut CodegenContext<'ctx, '_>,
) -> WrappedValue<'ctx> {
    assert!(ctx.inside_procedure());

    let (operand, value) = match ctx.ast.kind(node) {
        AstKind::Subscript { operand, value } => (*operand, *value),
        _ => unreachable!(),
    };

    let og_ctx = ctx.delete_casting_context();
    let target = maybe_adjust_node(operand, ctx);

    ctx.casting_context = Some(super::CastingContext {
        llvm_t: ctx.context.i32_type().into(),
        tak_t: TypeData::const_i32(),
    });
    let index = maybe_adjust_node(value, ctx);

    let contained = target
        .ty
        .get_contained()
        .expect("checker validated the subscript");

    let gep = if target.ty.flags.contains(TypeFlags::ARRAY) {
        let zero = ctx.context.i32_type().const_zero();
        unsafe {
            ctx.builder
                .build_gep(
                    generate_type(ctx, &target.ty),
                    target.expect_pointer(),
                    &[zero, index.expect_value().into_int_value()],
                    "subscript",
                )
                .unwrap()
        }
    } else {
        assert!(target.ty.flags.contains(TypeFlags::POINTER));
        unsafe {
            ctx.builder
                .build_gep(
                    generate_type(ctx, &contained),
                    target.expect_pointer(),
                    &[index.expect_value().into_int_value()],
                    "subscript",
                )
                .unwrap()
        }
    };

    if og_ctx.is_some() {
        ctx.casting_context = og_ctx;
    } else {
        ctx.casting_context = None;
        if contained.is_primitive() {
            ctx.set_casting_context(generate_type(ctx, &contained), contained.clone());
        }
    }

    WrappedValue::create(gep.into(), contained, true)
}

/// Walks a `.a.b.c` path, accumulating GEP indices and restarting through
/// loaded pointers at each pointer-typed member boundary.
pub fn generate_member_access<'ctx>(
    node: NodeId,
    ctx: &mut CodegenContext<'ctx, '_>,
) -> WrappedValue<'ctx> {
    assert!(ctx.inside_procedure());

    let (target_node, path) = match ctx.ast.kind(node) {
        AstKind::MemberAccess { target, path } => (*target, path.clone()),
        _ => unreachable!(),
    };

    let saved = ctx.delete_casting_context();
    let target = generate(target_node, ctx);
    let contained = target.ty.get_contained();
    ctx.casting_context = saved;

    let chunks: Vec<&str> = path.split('.').filter(|c| !c.is_empty()).collect();
    let zero = ctx.context.i32_type().const_zero();

    let mut ptr = if target.ty.flags.contains(TypeFlags::POINTER) {
        ctx.builder
            .build_load(ctx.ptr_t(), target.expect_pointer(), "load")
            .unwrap()
            .into_pointer_value()
    } else {
        target.expect_pointer()
    };

    let mut struct_ty = if target.ty.flags.contains(TypeFlags::POINTER) {
        generate_type(ctx, contained.as_ref().expect("pointer target dereferences"))
    } else {
        generate_type(ctx, &target.ty)
    };

    let mut utype = ctx
        .tbl
        .lookup_type(target.ty.struct_name().expect("struct target has a name"))
        .expect("checker resolved the struct")
        .clone();

    let mut indices: Vec<IntValue<'ctx>> = vec![zero];

    for (chunk_index, chunk) in chunks.iter().enumerate() {
        let pos = utype
            .members
            .iter()
            .position(|m| m.name == *chunk)
            .expect("checker validated the member path");

        indices.push(ctx.context.i32_type().const_int(pos as u64, false));
        let member_t = utype.members[pos].ty.clone();

        if chunk_index + 1 >= chunks.len() {
            if !ctx.casting_context_exists() && member_t.is_primitive() {
                ctx.set_casting_context(generate_type(ctx, &member_t), member_t.clone());
            }

            let gep = unsafe {
                ctx.builder
                    .build_gep(struct_ty, ptr, &indices, "member")
                    .unwrap()
            };
            return WrappedValue::create(gep.into(), member_t, true);
        }

        if member_t.flags.contains(TypeFlags::POINTER) {
            let gep = unsafe {
                ctx.builder
                    .build_gep(struct_ty, ptr, &indices, "member")
                    .unwrap()
            };

            ptr = ctx
                .builder
                .build_load(ctx.ptr_t(), gep, "load")
                .unwrap()
                .into_pointer_value();

            let inner = member_t
                .get_contained()
                .expect("pointer member dereferences");
            struct_ty = generate_type(ctx, &inner);
            indices = vec![zero];
        }

        let next_name = member_t
            .struct_name()
            .expect("intermediate members are structs");
        utype = ctx
            .tbl
            .lookup_type(next_name)
            .expect("checker resolved nested struct")
            .clone();
    }

    unreachable!("member path is never empty");
}
