//! Constant initializers for globals: recursive lowering of braced
//! expressions into LLVM constant arrays and structs. Only literals reach
//! this point; the checker enforces that for global initializers.

use super::expressions::generate_singleton_literal;
use super::{generate_type, CodegenContext};
use crate::ast::{AstKind, NodeId};
use crate::entity::UserType;
use crate::types::{TypeFlags, TypeKind};
use inkwell::types::{ArrayType, BasicTypeEnum, StructType};
use inkwell::values::{ArrayValue, BasicValueEnum, StructValue};

/// Builds a constant array from element constants, dispatching on the
/// element type.
fn const_array<'ctx>(
    elem_t: BasicTypeEnum<'ctx>,
    values: &[BasicValueEnum<'ctx>],
) -> ArrayValue<'ctx> {
    match elem_t {
        BasicTypeEnum::IntType(t) => {
            let elems: Vec<_> = values.iter().map(|v| v.into_int_value()).collect();
            t.const_array(&elems)
        }
        BasicTypeEnum::FloatType(t) => {
            let elems: Vec<_> = values.iter().map(|v| v.into_float_value()).collect();
            t.const_array(&elems)
        }
        BasicTypeEnum::PointerType(t) => {
            let elems: Vec<_> = values.iter().map(|v| v.into_pointer_value()).collect();
            t.const_array(&elems)
        }
        BasicTypeEnum::StructType(t) => {
            let elems: Vec<_> = values.iter().map(|v| v.into_struct_value()).collect();
            t.const_array(&elems)
        }
        BasicTypeEnum::ArrayType(t) => {
            let elems: Vec<_> = values.iter().map(|v| v.into_array_value()).collect();
            t.const_array(&elems)
        }
        _ => panic!("const_array: vector element types are not produced"),
    }
}

pub fn generate_constant_array<'ctx>(
    node: NodeId,
    llvm_t: ArrayType<'ctx>,
    ctx: &mut CodegenContext<'ctx, '_>,
) -> ArrayValue<'ctx> {
    let members = match ctx.ast.kind(node) {
        AstKind::BracedExpr { members } => members.clone(),
        _ => panic!("generate_constant_array: expected braced expression"),
    };

    let elem_t = llvm_t.get_element_type();
    let mut constants: Vec<BasicValueEnum<'ctx>> = Vec::with_capacity(members.len());

    for member in members {
        match ctx.ast.kind(member) {
            AstKind::BracedExpr { .. } => {
                let nested_t = elem_t.into_array_type();
                constants.push(generate_constant_array(member, nested_t, ctx).into());
            }
            AstKind::SingletonLiteral { .. } => {
                let lit = generate_singleton_literal(member, ctx);
                constants.push(lit.expect_value());
            }
            _ => panic!("generate_constant_array: invalid member constant"),
        }
    }

    const_array(elem_t, &constants)
}

pub fn generate_constant_struct<'ctx>(
    node: NodeId,
    utype: &UserType,
    llvm_t: StructType<'ctx>,
    ctx: &mut CodegenContext<'ctx, '_>,
) -> StructValue<'ctx> {
    let members = match ctx.ast.kind(node) {
        AstKind::BracedExpr { members } => members.clone(),
        _ => panic!("generate_constant_struct: expected braced expression"),
    };
    assert!(utype.members.len() == members.len());

    let mut constants: Vec<BasicValueEnum<'ctx>> = Vec::with_capacity(members.len());

    for (index, element) in members.iter().copied().enumerate() {
        let member_t = utype.members[index].ty.clone();

        if member_t.flags.contains(TypeFlags::ARRAY) {
            let contained = member_t
                .get_lowest_array_type()
                .expect("array member has an element type");
            let array_t = generate_type(ctx, &member_t).into_array_type();

            ctx.set_casting_context(generate_type(ctx, &contained), contained);
            constants.push(generate_constant_array(element, array_t, ctx).into());
        } else if member_t.flags.contains(TypeFlags::POINTER)
            || member_t.kind == TypeKind::Primitive
        {
            if !member_t.flags.contains(TypeFlags::POINTER) {
                ctx.set_casting_context(generate_type(ctx, &member_t), member_t.clone());
            }

            let initializer = generate_singleton_literal(element, ctx);
            constants.push(initializer.expect_value());
        } else {
            // A nested struct value.
            let nested_utype = ctx
                .tbl
                .lookup_type(member_t.struct_name().expect("struct member has a name"))
                .expect("checker resolved nested struct")
                .clone();

            let nested_t = generate_type(ctx, &member_t).into_struct_type();
            constants.push(generate_constant_struct(element, &nested_utype, nested_t, ctx).into());
        }

        ctx.delete_casting_context();
    }

    llvm_t.const_named_struct(&constants)
}
