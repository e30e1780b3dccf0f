//! Procedure bodies and variable declarations: parameter allocas, local
//! aggregate initialization via GEP walks, and global initializers.

use super::constants::{generate_constant_array, generate_constant_struct};
use super::expressions::{generate_singleton_literal, maybe_adjust_node};
use super::{generate, generate_type, CodegenContext, WrappedValue};
use crate::ast::{AstKind, NodeId};
use crate::entity::{EntityFlags, UserType};
use crate::types::{TypeFlags, TypeKind};
use inkwell::types::BasicTypeEnum;
use inkwell::values::{IntValue, PointerValue};

pub fn generate_procdecl<'ctx>(
    node: NodeId,
    ctx: &mut CodegenContext<'ctx, '_>,
) -> WrappedValue<'ctx> {
    let (identifier, parameters, children) = match ctx.ast.kind(node) {
        AstKind::Procdecl {
            identifier,
            parameters,
            children,
        } => (*identifier, parameters.clone(), children.clone()),
        _ => unreachable!(),
    };

    let sym_index = ctx.ast.identifier_symbol(identifier);
    let sym = ctx
        .tbl
        .lookup_symbol(sym_index)
        .expect("procdecl symbol exists")
        .clone();

    if sym.flags.contains(EntityFlags::FOREIGN)
        || sym.flags.contains(EntityFlags::FOREIGN_C)
        || sym.flags.contains(EntityFlags::GENERIC_BASE)
    {
        return WrappedValue::empty();
    }

    let func = ctx
        .module
        .get_function(&sym.name)
        .expect("prototype was emitted in the prologue");
    let entry = ctx.context.append_basic_block(func, "entry");

    assert!(parameters.len() as u32 == func.count_params());

    ctx.builder.position_at_end(entry);
    ctx.enter_proc(func, sym_index);
    ctx.push_defers(false);

    // Parameters land in named entry allocas, registered by symbol index.
    for (index, param) in parameters.iter().enumerate() {
        let param_ident = match ctx.ast.kind(*param) {
            AstKind::Vardecl { identifier, .. } => *identifier,
            _ => unreachable!("parameters are vardecls"),
        };

        let arg_sym_index = ctx.ast.identifier_symbol(param_ident);
        let arg_sym = ctx
            .tbl
            .lookup_symbol(arg_sym_index)
            .expect("parameter symbol exists");

        let ty = arg_sym.ty.clone();
        let llvm_t = generate_type(ctx, &ty);
        let alloc = ctx
            .builder
            .build_alloca(llvm_t, &arg_sym.name)
            .unwrap();

        ctx.builder
            .build_store(alloc, func.get_nth_param(index as u32).expect("arity matches"))
            .unwrap();

        ctx.set_local(
            arg_sym_index.to_string(),
            WrappedValue::create(alloc.into(), ty, true),
        );
    }

    for child in &children {
        if ctx.ast.kind(*child).needs_generating() {
            generate(*child, ctx);
        }
        ctx.delete_casting_context();
    }

    // Default return when the user did not return themselves.
    if !ctx.curr_block_has_terminator() {
        super::controlflow::unpack_defers(ctx, super::DeferMode::Regular);

        match &sym.ty.return_type {
            None => {
                ctx.builder.build_return(None).unwrap();
            }
            Some(ret) if ret.is_aggregate() => {
                let zero = generate_type(ctx, ret).const_zero();
                ctx.builder.build_return(Some(&zero)).unwrap();
            }
            Some(ret) if ret.flags.contains(TypeFlags::POINTER) => {
                let null = ctx.ptr_t().const_null();
                ctx.builder.build_return(Some(&null)).unwrap();
            }
            Some(ret) => {
                let zero = generate_type(ctx, ret).const_zero();
                ctx.builder.build_return(Some(&zero)).unwrap();
            }
        }
    }

    if !func.verify(true) {
        panic!("LLVM failed to verify function \"{}\"", sym.name);
    }

    ctx.leave_curr_proc();
    ctx.pop_defers();
    WrappedValue::empty()
}

// -- global variables ---------------------------------------------------------

fn generate_vardecl_global<'ctx>(
    node: NodeId,
    ctx: &mut CodegenContext<'ctx, '_>,
) -> WrappedValue<'ctx> {
    let (identifier, init_value) = match ctx.ast.kind(node) {
        AstKind::Vardecl {
            identifier,
            init_value,
        } => (*identifier, *init_value),
        _ => unreachable!(),
    };

    let sym_index = ctx.ast.identifier_symbol(identifier);
    let sym = ctx
        .tbl
        .lookup_symbol(sym_index)
        .expect("global symbol exists")
        .clone();

    let global = ctx
        .module
        .get_global(&sym.name)
        .expect("global was declared in the prologue");
    let wrapped = WrappedValue::create(global.as_pointer_value().into(), sym.ty.clone(), true);

    let init_value = match init_value {
        Some(init_value) => init_value,
        None => {
            if !sym.flags.contains(EntityFlags::FOREIGN)
                && !sym.flags.contains(EntityFlags::FOREIGN_C)
            {
                let llvm_t = generate_type(ctx, &sym.ty);
                global.set_initializer(&llvm_t.const_zero());
            }
            return wrapped;
        }
    };

    if sym.ty.flags.contains(TypeFlags::ARRAY) {
        let contained = sym
            .ty
            .get_lowest_array_type()
            .expect("array type has an element type");

        if !contained.flags.contains(TypeFlags::POINTER) {
            ctx.set_casting_context(generate_type(ctx, &contained), contained.clone());
        }

        let llvm_t = generate_type(ctx, &sym.ty).into_array_type();
        let initializer = generate_constant_array(init_value, llvm_t, ctx);
        global.set_initializer(&initializer);
        ctx.delete_casting_context();
        return wrapped;
    }

    if sym.ty.kind == TypeKind::Struct && !sym.ty.flags.contains(TypeFlags::POINTER) {
        let utype = ctx
            .tbl
            .lookup_type(sym.ty.struct_name().expect("struct type has a name"))
            .expect("checker resolved the struct")
            .clone();

        let llvm_t = generate_type(ctx, &sym.ty).into_struct_type();
        let initializer = generate_constant_struct(init_value, &utype, llvm_t, ctx);
        global.set_initializer(&initializer);
        return wrapped;
    }

    // Primitive or pointer global.
    if !sym.ty.flags.contains(TypeFlags::POINTER) {
        ctx.set_casting_context(generate_type(ctx, &sym.ty), sym.ty.clone());
    }

    let initializer = generate_singleton_literal(init_value, ctx);
    ctx.delete_casting_context();

    global.set_initializer(&initializer.expect_value());
    wrapped
}

// -- local aggregate initialization -------------------------------------------

/// Walks a braced struct initializer, emitting GEPs and stores per field
/// and recursing into nested arrays and structs.
pub fn generate_local_struct_init<'ctx>(
    ptr: PointerValue<'ctx>,
    llvm_t: BasicTypeEnum<'ctx>,
    utype: &UserType,
    bracedexpr: NodeId,
    gep_indices: &mut Vec<IntValue<'ctx>>,
    ctx: &mut CodegenContext<'ctx, '_>,
) {
    assert!(ctx.inside_procedure());
    assert!(!gep_indices.is_empty());

    let members = match ctx.ast.kind(bracedexpr) {
        AstKind::BracedExpr { members } => members.clone(),
        _ => unreachable!("checker validated the initializer"),
    };
    assert!(members.len() == utype.members.len());

    for (index, element) in members.iter().copied().enumerate() {
        gep_indices.push(ctx.context.i32_type().const_int(index as u64, false));
        let member_t = utype.members[index].ty.clone();

        if matches!(ctx.ast.kind(element), AstKind::BracedExpr { .. }) {
            if member_t.flags.contains(TypeFlags::ARRAY) {
                let lowest = member_t
                    .get_lowest_array_type()
                    .expect("array member has an element type");

                if lowest.is_primitive() {
                    ctx.set_casting_context(generate_type(ctx, &lowest), lowest);
                }

                generate_local_array_init(ptr, llvm_t, element, gep_indices, ctx);
            } else if member_t.kind == TypeKind::Struct {
                let nested = ctx
                    .tbl
                    .lookup_type(member_t.struct_name().expect("struct member has a name"))
                    .expect("checker resolved nested struct")
                    .clone();

                generate_local_struct_init(ptr, llvm_t, &nested, element, gep_indices, ctx);
            } else {
                panic!("generate_local_struct_init: invalid braced member");
            }
        } else {
            if member_t.is_primitive() {
                ctx.set_casting_context(generate_type(ctx, &member_t), member_t.clone());
            }

            let value = maybe_adjust_node(element, ctx);
            let calculated = unsafe {
                ctx.builder
                    .build_gep(llvm_t, ptr, gep_indices, "fieldinit")
                    .unwrap()
            };

            ctx.builder
                .build_store(calculated, value.expect_value())
                .unwrap();
        }

        ctx.delete_casting_context();
        gep_indices.pop();
    }
}

/// Walks a braced array initializer with a GEP index stack (first index
/// always zero), storing each leaf element.
pub fn generate_local_array_init<'ctx>(
    ptr: PointerValue<'ctx>,
    llvm_t: BasicTypeEnum<'ctx>,
    bracedexpr: NodeId,
    gep_indices: &mut Vec<IntValue<'ctx>>,
    ctx: &mut CodegenContext<'ctx, '_>,
) {
    assert!(ctx.inside_procedure());
    assert!(!gep_indices.is_empty());

    let members = match ctx.ast.kind(bracedexpr) {
        AstKind::BracedExpr { members } => members.clone(),
        _ => unreachable!("checker validated the initializer"),
    };

    for (index, element) in members.iter().copied().enumerate() {
        gep_indices.push(ctx.context.i32_type().const_int(index as u64, false));

        if matches!(ctx.ast.kind(element), AstKind::BracedExpr { .. }) {
            generate_local_array_init(ptr, llvm_t, element, gep_indices, ctx);
            gep_indices.pop();
            continue;
        }

        let value = maybe_adjust_node(element, ctx);
        let calculated = unsafe {
            ctx.builder
                .build_gep(llvm_t, ptr, gep_indices, "eleminit")
                .unwrap()
        };

        ctx.builder
            .build_store(calculated, value.expect_value())
            .unwrap();
        gep_indices.pop();
    }
}

fn generate_vardecl_local<'ctx>(
    node: NodeId,
    ctx: &mut CodegenContext<'ctx, '_>,
) -> WrappedValue<'ctx> {
    assert!(ctx.inside_procedure());

    let (identifier, init_value) = match ctx.ast.kind(node) {
        AstKind::Vardecl {
            identifier,
            init_value,
        } => (*identifier, *init_value),
        _ => unreachable!(),
    };

    let sym_index = ctx.ast.identifier_symbol(identifier);
    let sym = ctx
        .tbl
        .lookup_symbol(sym_index)
        .expect("local symbol exists")
        .clone();

    let llvm_t = generate_type(ctx, &sym.ty);
    let alloc = ctx.create_entry_alloca(llvm_t, &sym.name);
    let wrapped = WrappedValue::create(alloc.into(), sym.ty.clone(), true);

    ctx.set_local(sym_index.to_string(), wrapped.clone());

    let init_value = match init_value {
        Some(init_value) => init_value,
        None => {
            // Zero-initialize: aggregates and scalars alike, null for
            // pointers.
            let zero: inkwell::values::BasicValueEnum = if sym.ty.is_non_aggregate_pointer() {
                ctx.ptr_t().const_null().into()
            } else {
                llvm_t.const_zero()
            };

            ctx.builder.build_store(alloc, zero).unwrap();
            return wrapped;
        }
    };

    if sym.ty.flags.contains(TypeFlags::ARRAY) {
        let lowest = sym
            .ty
            .get_lowest_array_type()
            .expect("array type has an element type");

        if lowest.is_primitive() {
            ctx.set_casting_context(generate_type(ctx, &lowest), lowest);
        }

        let mut gep_indices = vec![ctx.context.i32_type().const_zero()];
        generate_local_array_init(alloc, llvm_t, init_value, &mut gep_indices, ctx);
    } else if sym.ty.kind == TypeKind::Struct
        && !sym.ty.flags.contains(TypeFlags::POINTER)
        && matches!(ctx.ast.kind(init_value), AstKind::BracedExpr { .. })
    {
        let utype = ctx
            .tbl
            .lookup_type(sym.ty.struct_name().expect("struct type has a name"))
            .expect("checker resolved the struct")
            .clone();

        let mut gep_indices = vec![ctx.context.i32_type().const_zero()];
        generate_local_struct_init(alloc, llvm_t, &utype, init_value, &mut gep_indices, ctx);
    } else {
        if sym.ty.is_primitive() {
            ctx.set_casting_context(llvm_t, sym.ty.clone());
        }

        let init = maybe_adjust_node(init_value, ctx);
        ctx.builder
            .build_store(alloc, init.expect_value())
            .unwrap();
    }

    ctx.delete_casting_context();
    wrapped
}

pub fn generate_vardecl<'ctx>(
    node: NodeId,
    ctx: &mut CodegenContext<'ctx, '_>,
) -> WrappedValue<'ctx> {
    let identifier = match ctx.ast.kind(node) {
        AstKind::Vardecl { identifier, .. } => *identifier,
        _ => unreachable!(),
    };

    let sym_index = ctx.ast.identifier_symbol(identifier);
    let is_global = ctx
        .tbl
        .lookup_symbol(sym_index)
        .expect("vardecl symbol exists")
        .flags
        .contains(EntityFlags::GLOBAL);

    if is_global {
        generate_vardecl_global(node, ctx)
    } else {
        generate_vardecl_local(node, ctx)
    }
}
