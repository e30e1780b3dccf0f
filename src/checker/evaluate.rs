//! Per-node evaluation rules: inference for declared-without-type symbols,
//! operator legality, coercion checks, call validation, control-flow
//! context checks and return-type matching.

use super::convert::{
    assign_bracedexpr_to_struct, convert_float_lit_to_type, convert_int_lit_to_type,
    get_bracedexpr_as_array_t, get_struct_member_type_data,
};
use super::CheckerContext;
use crate::ast::{AstKind, NodeId, SizeofTarget};
use crate::entity::EntityFlags;
use crate::token::TokenType;
use crate::types::{Primitive, TypeData, TypeFlags, TypeKind};

fn evaluate_children(children: &[NodeId], ctx: &mut CheckerContext) -> Option<TypeData> {
    for child in children {
        if ctx.ast.kind(*child).needs_evaluating() {
            evaluate(*child, ctx);
        }
    }

    None
}

fn evaluate_procdecl(node: NodeId, ctx: &mut CheckerContext) -> Option<TypeData> {
    let (identifier, children) = match ctx.ast.kind(node) {
        AstKind::Procdecl {
            identifier,
            children,
            ..
        } => (*identifier, children.clone()),
        _ => unreachable!(),
    };

    let sym_index = ctx.ast.identifier_symbol(identifier);
    let flags = ctx
        .tbl
        .lookup_symbol(sym_index)
        .expect("procdecl symbol exists")
        .flags;

    let is_foreign = flags.contains(EntityFlags::FOREIGN) || flags.contains(EntityFlags::FOREIGN_C);
    let is_intern = flags.contains(EntityFlags::INTERNAL);

    if is_foreign && is_intern {
        ctx.raise_error(
            "Cannot create a procedure that is marked as both extern and intern.",
            node,
        );
    }

    if flags.contains(EntityFlags::FOREIGN) && !children.is_empty() {
        ctx.raise_error(
            "Procedures marked as foreign should not have bodies defined here.",
            node,
        );
    }

    if flags.contains(EntityFlags::FOREIGN_C) && flags.contains(EntityFlags::FOREIGN) {
        ctx.raise_warning(
            "Both extern \"C\" and regular extern specified, assuming \"C\".",
            node,
        );
        ctx.tbl
            .lookup_symbol_mut(sym_index)
            .expect("procdecl symbol exists")
            .flags
            .remove(EntityFlags::FOREIGN);
    }

    evaluate_children(&children, ctx)
}

fn binexpr_ptr_arith_chk(left: &TypeData, right: &TypeData, op: TokenType) -> bool {
    let left_is_thin_voidptr =
        matches!(left.primitive(), Some(Primitive::Void)) && left.pointer_depth < 2;

    let is_valid_ptr = left.flags.contains(TypeFlags::POINTER)
        && !left.flags.contains(TypeFlags::ARRAY)
        && !left_is_thin_voidptr;

    let is_valid_operand = !right.flags.contains(TypeFlags::POINTER)
        && !right.flags.contains(TypeFlags::ARRAY)
        && matches!(right.primitive(), Some(p) if p.is_integral());

    is_valid_ptr && is_valid_operand && op.is_valid_ptr_arith_op()
}

fn evaluate_binexpr(node: NodeId, ctx: &mut CheckerContext) -> Option<TypeData> {
    let (op, left, right) = match ctx.ast.kind(node) {
        AstKind::Binexpr { op, left, right } => (*op, *left, *right),
        _ => unreachable!(),
    };

    let left_t = evaluate(left, ctx);
    let right_t = evaluate(right, ctx);

    // Struct-literal assignment: `s = { ... }` delegates to the struct
    // matching routine.
    if let Some(lt) = &left_t {
        if lt.kind == TypeKind::Struct
            && matches!(ctx.ast.kind(right), AstKind::BracedExpr { .. })
            && op == TokenType::ValueAssignment
            && !lt.flags.contains(TypeFlags::POINTER)
            && TypeData::can_operator_be_applied_to(TokenType::ValueAssignment, lt)
        {
            let lt = lt.clone();
            assign_bracedexpr_to_struct(&lt, right, ctx, false);
            return Some(lt.to_rvalue());
        }
    }

    let (mut left_t, right_t) = match (left_t, right_t) {
        (Some(l), Some(r)) => (l, r),
        _ => {
            ctx.raise_error("Unable to deduce type of one or more operands.", node);
            return None;
        }
    };

    let op_str = op.show();

    if matches!(op, TokenType::ConditionalAnd | TokenType::ConditionalOr) {
        if !TypeData::can_operator_be_applied_to(op, &left_t) {
            ctx.raise_error(
                format!(
                    "Logical operator '{}' cannot be applied to lefthand type {}.",
                    op_str, left_t
                ),
                node,
            );
        }
        if !TypeData::can_operator_be_applied_to(op, &right_t) {
            ctx.raise_error(
                format!(
                    "Logical operator '{}' cannot be applied to righthand type {}.",
                    op_str, right_t
                ),
                node,
            );
        }
    } else {
        if !TypeData::can_operator_be_applied_to(op, &left_t) {
            ctx.raise_error(
                format!(
                    "Operator '{}' cannot be applied to lefthand type {}.",
                    op_str, left_t
                ),
                node,
            );
        }
        if !binexpr_ptr_arith_chk(&left_t, &right_t, op)
            && !TypeData::is_coercion_permissible(&mut left_t, &right_t)
        {
            ctx.raise_error(
                format!(
                    "Cannot coerce type of righthand expression ({}) to {}.",
                    right_t, left_t
                ),
                node,
            );
        }
    }

    if op.is_logical_op() {
        return Some(TypeData::const_bool());
    }

    Some(left_t.to_rvalue())
}

fn evaluate_unaryexpr(node: NodeId, ctx: &mut CheckerContext) -> Option<TypeData> {
    let (op, operand) = match ctx.ast.kind(node) {
        AstKind::Unaryexpr { op, operand } => (*op, *operand),
        _ => unreachable!(),
    };

    let mut operand_t = evaluate(operand, ctx)?;
    let op_str = op.show();

    match op {
        TokenType::Sub | TokenType::Plus => {
            if !operand_t.is_primitive() {
                ctx.raise_error(
                    format!("Cannot apply unary operator {} to type {}.", op_str, operand_t),
                    node,
                );
                return None;
            }

            if op == TokenType::Sub && !operand_t.flip_sign() {
                ctx.raise_error(
                    format!("Cannot apply unary minus to type {}.", operand_t),
                    node,
                );
                return None;
            }

            Some(operand_t.to_rvalue())
        }
        TokenType::BitwiseNot => {
            if !operand_t.is_bwop_eligible() {
                ctx.raise_error(
                    format!("Cannot apply bitwise operator ~ to type {}.", operand_t),
                    node,
                );
                return None;
            }

            Some(operand_t.to_rvalue())
        }
        TokenType::Increment | TokenType::Decrement => {
            if !TypeData::can_operator_be_applied_to(op, &operand_t) {
                ctx.raise_error(
                    format!("Cannot apply operator {} to type {}.", op_str, operand_t),
                    node,
                );
                return None;
            }

            Some(operand_t.to_rvalue())
        }
        TokenType::ConditionalNot => {
            if !operand_t.is_lop_eligible() {
                ctx.raise_error(
                    format!("Cannot apply logical operator ! to type {}.", operand_t),
                    node,
                );
                return None;
            }

            Some(TypeData::const_bool())
        }
        TokenType::XorOrPtr => match operand_t.get_contained() {
            Some(contained) => Some(contained),
            None => {
                ctx.raise_error(format!("Cannot dereference type {}.", operand_t), node);
                None
            }
        },
        TokenType::BitwiseAnd => match operand_t.get_pointer_to() {
            Some(addressed) => Some(addressed),
            None => {
                ctx.raise_error(
                    format!("Cannot get the address of type {}.", operand_t),
                    node,
                );
                None
            }
        },
        _ => panic!("evaluate_unaryexpr: no suitable operator found"),
    }
}

fn evaluate_identifier(node: NodeId, ctx: &mut CheckerContext) -> Option<TypeData> {
    let sym_index = ctx.ast.identifier_symbol(node);
    let sym = ctx
        .tbl
        .lookup_symbol(sym_index)
        .expect("identifier symbol exists");

    if sym.flags.contains(EntityFlags::GENERIC_BASE) {
        let msg = "Cannot access a generic procedure without type arguments.".to_string();
        ctx.raise_error(msg, node);
        return None;
    }

    if sym.ty.flags.contains(TypeFlags::INFERRED) || sym.flags.contains(EntityFlags::PLACEHOLDER) {
        let msg = format!("Referencing uninitialized or invalid symbol \"{}\".", sym.name);
        ctx.raise_error(msg, node);
        return None;
    }

    Some(sym.ty.clone())
}

fn evaluate_singleton_literal(node: NodeId, ctx: &mut CheckerContext) -> Option<TypeData> {
    let (literal_type, value) = match ctx.ast.kind(node) {
        AstKind::SingletonLiteral {
            literal_type,
            value,
        } => (*literal_type, value.clone()),
        _ => unreachable!(),
    };

    let mut data = match literal_type {
        TokenType::StringLiteral => TypeData::const_string(),
        TokenType::KwNullptr => TypeData::const_voidptr(),
        TokenType::FloatLiteral => convert_float_lit_to_type(&value),
        TokenType::IntegerLiteral => convert_int_lit_to_type(&value),
        TokenType::CharacterLiteral => TypeData::const_char(),
        TokenType::BooleanLiteral => TypeData::const_bool(),
        _ => panic!("evaluate_singleton_literal: unexpected literal type"),
    };

    data.flags
        .insert(TypeFlags::CONSTANT | TypeFlags::RVALUE | TypeFlags::NON_CONCRETE);
    data.kind = TypeKind::Primitive;
    Some(data)
}

fn evaluate_arraydecl(
    sym_index: u32,
    init_value: NodeId,
    node: NodeId,
    ctx: &mut CheckerContext,
) -> Option<TypeData> {
    if !matches!(ctx.ast.kind(init_value), AstKind::BracedExpr { .. }) {
        ctx.raise_error("Expected braced initializer.", node);
        return None;
    }

    let (sym_ty, only_literals) = {
        let sym = ctx.tbl.lookup_symbol(sym_index).expect("symbol exists");
        (sym.ty.clone(), sym.flags.contains(EntityFlags::GLOBAL))
    };

    let array_t = match get_bracedexpr_as_array_t(init_value, ctx, only_literals) {
        Some(array_t) => array_t,
        None => {
            ctx.raise_error("Could not deduce type of righthand expression.", node);
            return None;
        }
    };

    if !TypeData::are_arrays_equivalent(&sym_ty, &array_t) {
        ctx.raise_error(
            format!("Array of type {} is not equivalent to {}.", array_t, sym_ty),
            init_value,
        );
        return None;
    }

    // Copy inferred dimension sizes back into the symbol.
    let sym = ctx.tbl.lookup_symbol_mut(sym_index).expect("symbol exists");
    assert!(array_t.array_lengths.len() == sym.ty.array_lengths.len());
    sym.ty.array_lengths.copy_from_slice(&array_t.array_lengths);

    Some(sym.ty.clone())
}

fn evaluate_inferred_decl(
    sym_index: u32,
    init_value: NodeId,
    node: NodeId,
    ctx: &mut CheckerContext,
) -> Option<TypeData> {
    let only_literals = ctx
        .tbl
        .lookup_symbol(sym_index)
        .expect("symbol exists")
        .flags
        .contains(EntityFlags::GLOBAL);

    let init_is_braced = matches!(ctx.ast.kind(init_value), AstKind::BracedExpr { .. });
    let init_is_literal = matches!(ctx.ast.kind(init_value), AstKind::SingletonLiteral { .. });

    let assigned_t = if init_is_braced {
        get_bracedexpr_as_array_t(init_value, ctx, only_literals)
    } else {
        evaluate(init_value, ctx)
    };

    let mut assigned_t = match assigned_t {
        Some(assigned_t) => assigned_t,
        None => {
            let name = ctx.tbl.lookup_symbol(sym_index).expect("symbol exists").name.clone();
            ctx.raise_error(
                format!("Expression assigned to \"{}\" does not have a type.", name),
                node,
            );
            return None;
        }
    };

    if only_literals && !assigned_t.flags.contains(TypeFlags::ARRAY) && !init_is_literal {
        ctx.raise_error("Only literals are permitted in this context.", init_value);
        return None;
    }

    if assigned_t.is_invalid_in_inferred_context()
        || (assigned_t.flags.contains(TypeFlags::ARRAY) && !init_is_braced)
    {
        ctx.raise_error(
            format!("Cannot assign type {} in an inferred context.", assigned_t),
            init_value,
        );
        return None;
    }

    // Promote non-concrete literals: integers to i32 when they fit, floats
    // to f64.
    if let Some(prim) = assigned_t.primitive() {
        if assigned_t.flags.contains(TypeFlags::NON_CONCRETE)
            && !assigned_t.flags.contains(TypeFlags::POINTER)
            && (prim.is_integral() || prim.is_float())
        {
            if prim.is_float() {
                assigned_t.name = crate::types::TypeName::Primitive(Primitive::F64);
            } else if prim.size_bytes() <= Primitive::I32.size_bytes() {
                assigned_t.name = crate::types::TypeName::Primitive(Primitive::I32);
            }
        }
    }

    // Constness comes from the declaration, not the initializer. The
    // deduced type replaces the placeholder wholesale.
    assigned_t
        .flags
        .remove(TypeFlags::CONSTANT | TypeFlags::NON_CONCRETE | TypeFlags::RVALUE);

    let sym = ctx.tbl.lookup_symbol_mut(sym_index).expect("symbol exists");
    sym.ty.flags.remove(TypeFlags::INFERRED);

    let kept = sym.ty.flags;
    sym.ty = assigned_t;
    sym.ty.flags.insert(kept);
    sym.ty.sym_ref = sym_index;

    Some(sym.ty.clone())
}

fn evaluate_vardecl(node: NodeId, ctx: &mut CheckerContext) -> Option<TypeData> {
    let (identifier, init_value) = match ctx.ast.kind(node) {
        AstKind::Vardecl {
            identifier,
            init_value,
        } => (*identifier, *init_value),
        _ => unreachable!(),
    };

    let sym_index = ctx.ast.identifier_symbol(identifier);
    let (sym_ty, sym_flags) = {
        let sym = ctx.tbl.lookup_symbol(sym_index).expect("symbol exists");
        (sym.ty.clone(), sym.flags)
    };

    if sym_flags.contains(EntityFlags::INTERNAL) && sym_flags.contains(EntityFlags::FOREIGN) {
        ctx.raise_error("Variable is marked both as foreign and internal.", node);
    }
    if sym_flags.contains(EntityFlags::FOREIGN) && init_value.is_some() {
        ctx.raise_error("Declarations of foreign variables cannot be initialized.", node);
    }

    let init_value = match init_value {
        Some(init_value) => init_value,
        None => {
            assert!(!sym_ty.flags.contains(TypeFlags::INFERRED));
            if sym_ty.flags.contains(TypeFlags::ARRAY) && sym_ty.array_has_inferred_sizes() {
                ctx.raise_error(
                    "Arrays with inferred sizes (e.g. '[]') must be assigned when created.",
                    node,
                );
                return None;
            }

            return Some(sym_ty);
        }
    };

    if sym_ty.flags.contains(TypeFlags::INFERRED) {
        return evaluate_inferred_decl(sym_index, init_value, node, ctx);
    }
    if sym_ty.flags.contains(TypeFlags::ARRAY) {
        return evaluate_arraydecl(sym_index, init_value, node, ctx);
    }
    if matches!(ctx.ast.kind(init_value), AstKind::BracedExpr { .. })
        && sym_ty.kind == TypeKind::Struct
        && !sym_ty.flags.contains(TypeFlags::POINTER)
    {
        assign_bracedexpr_to_struct(
            &sym_ty,
            init_value,
            ctx,
            sym_flags.contains(EntityFlags::GLOBAL),
        );
        return Some(sym_ty);
    }

    let init_t = match evaluate(init_value, ctx) {
        Some(init_t) => init_t,
        None => {
            ctx.raise_error("Righthand expression does not have a type.", node);
            return None;
        }
    };

    if sym_flags.contains(EntityFlags::GLOBAL)
        && !matches!(ctx.ast.kind(init_value), AstKind::SingletonLiteral { .. })
    {
        ctx.raise_error("Globals must be initialized using literals.", node);
    }

    let mut declared = sym_ty.clone();
    if !TypeData::is_coercion_permissible(&mut declared, &init_t) {
        let name = ctx.tbl.lookup_symbol(sym_index).expect("symbol exists").name.clone();
        ctx.raise_error(
            format!(
                "Cannot assign variable \"{}\" of type {} to {}.",
                name, sym_ty, init_t
            ),
            node,
        );
        return None;
    }

    Some(sym_ty)
}

fn evaluate_cast(node: NodeId, ctx: &mut CheckerContext) -> Option<TypeData> {
    let (target, cast_t) = match ctx.ast.kind(node) {
        AstKind::Cast { target, ty } => (*target, ty.clone()),
        _ => unreachable!(),
    };

    let target_t = evaluate(target, ctx)?;

    if !TypeData::is_cast_permissible(&target_t, &cast_t) {
        ctx.raise_error(
            format!("Cannot cast type {} to {}.", target_t, cast_t),
            node,
        );
        return None;
    }

    Some(cast_t)
}

fn get_call_return_type(called: &TypeData) -> Option<TypeData> {
    let ret = called.return_type.as_ref()?;
    if !ret.is_returntype_lvalue_eligible() {
        return Some(ret.to_rvalue());
    }

    Some((**ret).clone())
}

fn is_invalid_as_procarg(ty: &TypeData) -> bool {
    ty.flags.contains(TypeFlags::ARRAY)
        || (ty.kind == TypeKind::Procedure && !ty.flags.contains(TypeFlags::POINTER))
}

fn evaluate_call_arguments(
    arguments: &[NodeId],
    params: Option<&Vec<TypeData>>,
    ctx: &mut CheckerContext,
) {
    for (index, arg) in arguments.iter().enumerate() {
        let arg_t = match evaluate(*arg, ctx) {
            Some(arg_t) => arg_t,
            None => {
                ctx.raise_error(
                    format!("Cannot deduce type of argument {} in this call.", index + 1),
                    *arg,
                );
                continue;
            }
        };

        if is_invalid_as_procarg(&arg_t) {
            ctx.raise_error(
                format!("Type {} cannot be used as a procedure argument.", arg_t),
                *arg,
            );
            continue;
        }

        if let Some(params) = params {
            if index < params.len() {
                let mut param_t = params[index].clone();
                if !TypeData::is_coercion_permissible(&mut param_t, &arg_t) {
                    ctx.raise_error(
                        format!(
                            "Cannot convert argument {} of type {} to expected parameter type {}.",
                            index + 1,
                            arg_t,
                            params[index]
                        ),
                        *arg,
                    );
                }
            }
        }
    }
}

fn evaluate_call(node: NodeId, ctx: &mut CheckerContext) -> Option<TypeData> {
    let (target, arguments) = match ctx.ast.kind(node) {
        AstKind::Call { target, arguments } => (*target, arguments.clone()),
        _ => unreachable!(),
    };

    let target_t = match evaluate(target, ctx) {
        Some(target_t) => target_t,
        None => {
            ctx.raise_error("Unable to deduce type of call target.", node);
            return None;
        }
    };

    if target_t.kind != TypeKind::Procedure || target_t.pointer_depth > 1 {
        ctx.raise_error("Attempt to call non-callable type.", node);
        return None;
    }

    let receives = target_t.parameters.as_ref().map(Vec::len).unwrap_or(0);
    let called_with = arguments.len();

    if target_t.flags.contains(TypeFlags::PROC_VARARGS) {
        if receives > called_with {
            ctx.raise_error(
                format!("Invalid number of arguments passed (requires at least {}).", receives),
                node,
            );
            return get_call_return_type(&target_t);
        }

        evaluate_call_arguments(&arguments, target_t.parameters.as_ref(), ctx);
        return get_call_return_type(&target_t);
    }

    if called_with != receives {
        ctx.raise_error(
            format!(
                "Attempting to call procedure of type {} with {} arguments, but it takes {}.",
                target_t, called_with, receives
            ),
            node,
        );
        return get_call_return_type(&target_t);
    }

    if called_with == 0 {
        return get_call_return_type(&target_t);
    }

    evaluate_call_arguments(&arguments, target_t.parameters.as_ref(), ctx);
    get_call_return_type(&target_t)
}

fn evaluate_ret(node: NodeId, ctx: &mut CheckerContext) -> Option<TypeData> {
    let value = match ctx.ast.kind(node) {
        AstKind::Ret { value } => *value,
        _ => unreachable!(),
    };

    // Locate the enclosing procedure.
    let mut walker = node;
    let proc_identifier = loop {
        walker = match ctx.ast.parent(walker) {
            Some(parent) => parent,
            None => {
                ctx.raise_error("Return statement outside of a procedure.", node);
                return None;
            }
        };

        if let AstKind::Procdecl { identifier, .. } = ctx.ast.kind(walker) {
            break *identifier;
        }
    };

    let sym_index = ctx.ast.identifier_symbol(proc_identifier);
    let (return_type, proc_name) = {
        let sym = ctx.tbl.lookup_symbol(sym_index).expect("proc symbol exists");
        (sym.ty.return_type.clone(), sym.name.clone())
    };

    match (value, return_type) {
        (None, None) => None,
        (Some(value), Some(return_type)) => {
            let ret_t = match evaluate(value, ctx) {
                Some(ret_t) => ret_t,
                None => {
                    ctx.raise_error("Could not deduce type of righthand expression.", node);
                    return None;
                }
            };

            let mut declared = (*return_type).clone();
            if !TypeData::is_coercion_permissible(&mut declared, &ret_t) {
                ctx.raise_error(
                    format!(
                        "Cannot coerce type {} to procedure return type {} (compiling procedure \"{}\").",
                        ret_t, return_type, proc_name
                    ),
                    node,
                );
            }

            Some(ret_t)
        }
        _ => {
            ctx.raise_error(
                format!(
                    "Invalid return statement: does not match return type for procedure \"{}\".",
                    proc_name
                ),
                node,
            );
            None
        }
    }
}

fn evaluate_member_access(node: NodeId, ctx: &mut CheckerContext) -> Option<TypeData> {
    let (target, path) = match ctx.ast.kind(node) {
        AstKind::MemberAccess { target, path } => (*target, path.clone()),
        _ => unreachable!(),
    };

    let target_t = match evaluate(target, ctx) {
        Some(target_t) => target_t,
        None => {
            ctx.raise_error("Attempting to access non-existent type as a struct.", node);
            return None;
        }
    };

    if target_t.kind != TypeKind::Struct
        || target_t.flags.contains(TypeFlags::ARRAY)
        || target_t.pointer_depth > 1
    {
        ctx.raise_error(
            format!("Cannot perform member access on type {}.", target_t),
            node,
        );
        return None;
    }

    let base_name = target_t.struct_name().expect("struct type has a name");
    match get_struct_member_type_data(&path, base_name, ctx.tbl) {
        Some(mut member_t) => {
            if target_t.flags.contains(TypeFlags::CONSTANT) {
                member_t.flags.insert(TypeFlags::CONSTANT);
            }
            Some(member_t)
        }
        None => {
            ctx.raise_error(
                format!("Cannot access \"{}\" within type \"{}\".", path, target_t),
                node,
            );
            None
        }
    }
}

fn evaluate_subscript(node: NodeId, ctx: &mut CheckerContext) -> Option<TypeData> {
    let (operand, value) = match ctx.ast.kind(node) {
        AstKind::Subscript { operand, value } => (*operand, *value),
        _ => unreachable!(),
    };

    let value_t = evaluate(value, ctx);
    let operand_t = evaluate(operand, ctx);

    if value_t.is_none() {
        ctx.raise_error("Value within subscript operator does not evaluate to a type.", value);
    }
    if operand_t.is_none() {
        ctx.raise_error("Subscript operand does not evaluate to a type.", operand);
    }

    let (value_t, operand_t) = (value_t?, operand_t?);

    if !value_t.is_bwop_eligible() {
        ctx.raise_error(
            format!("Type {} cannot be used as a subscript value.", value_t),
            value,
        );
    }

    match operand_t.get_contained() {
        Some(contained) => Some(contained),
        None => {
            ctx.raise_error(
                format!("Type {} cannot be subscripted into.", operand_t),
                operand,
            );
            None
        }
    }
}

fn check_logical_condition(condition: NodeId, what: &str, ctx: &mut CheckerContext) {
    match evaluate(condition, ctx) {
        Some(condition_t) => {
            if !condition_t.is_lop_eligible() {
                ctx.raise_error(
                    format!("Type {} cannot be used as a {}.", condition_t, what),
                    condition,
                );
            }
        }
        None => {
            ctx.raise_error(
                format!("Expression used as a {} does not produce a type.", what),
                condition,
            );
        }
    }
}

fn evaluate_branch(node: NodeId, ctx: &mut CheckerContext) -> Option<TypeData> {
    let (if_stmt, else_stmt) = match ctx.ast.kind(node) {
        AstKind::Branch { if_stmt, else_stmt } => (*if_stmt, *else_stmt),
        _ => unreachable!(),
    };

    let (condition, body) = match ctx.ast.kind(if_stmt) {
        AstKind::If { condition, body } => (*condition, body.clone()),
        _ => unreachable!(),
    };

    check_logical_condition(condition, "logical expression", ctx);
    evaluate_children(&body, ctx);

    if let Some(else_stmt) = else_stmt {
        let body = match ctx.ast.kind(else_stmt) {
            AstKind::Else { body } => body.clone(),
            _ => unreachable!(),
        };
        evaluate_children(&body, ctx);
    }

    None
}

fn evaluate_for(node: NodeId, ctx: &mut CheckerContext) -> Option<TypeData> {
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
        if evaluate(init, ctx).is_none() {
            ctx.raise_error("For-loop initialization clause does not produce a type.", init);
        }
    }

    if let Some(condition) = condition {
        check_logical_condition(condition, "for-loop condition", ctx);
    }

    if let Some(update) = update {
        evaluate(update, ctx);
    }

    evaluate_children(&body, ctx)
}

fn evaluate_switch(node: NodeId, ctx: &mut CheckerContext) -> Option<TypeData> {
    let (target, cases, default) = match ctx.ast.kind(node) {
        AstKind::Switch {
            target,
            cases,
            default,
        } => (*target, cases.clone(), *default),
        _ => unreachable!(),
    };

    let target_t = match evaluate(target, ctx) {
        Some(target_t) => target_t,
        None => {
            ctx.raise_error("Switch target does not produce a type.", target);
            return None;
        }
    };

    if !target_t.is_bwop_eligible() {
        ctx.raise_error(
            format!("Type {} cannot be used as a switch target.", target_t),
            target,
        );
        return None;
    }

    for case in cases {
        let (value, body) = match ctx.ast.kind(case) {
            AstKind::Case { value, body, .. } => (*value, body.clone()),
            _ => unreachable!(),
        };

        match evaluate(value, ctx) {
            Some(case_t) => {
                let mut target_clone = target_t.clone();
                if !TypeData::is_coercion_permissible(&mut target_clone, &case_t) {
                    ctx.raise_error(
                        format!(
                            "Cannot coerce type of case value ({}) to {}.",
                            case_t, target_t
                        ),
                        case,
                    );
                }
            }
            None => ctx.raise_error("Case value does not produce a type.", case),
        }

        evaluate_children(&body, ctx);
    }

    let body = match ctx.ast.kind(default) {
        AstKind::Default { body } => body.clone(),
        _ => unreachable!(),
    };
    evaluate_children(&body, ctx);

    None
}

fn evaluate_while(node: NodeId, ctx: &mut CheckerContext) -> Option<TypeData> {
    let (condition, body) = match ctx.ast.kind(node) {
        AstKind::While { condition, body } | AstKind::DoWhile { condition, body } => {
            (*condition, body.clone())
        }
        _ => unreachable!(),
    };

    check_logical_condition(condition, "condition for a while-loop", ctx);
    evaluate_children(&body, ctx)
}

fn evaluate_brk_or_cont(node: NodeId, ctx: &mut CheckerContext) -> Option<TypeData> {
    let mut walker = node;
    loop {
        walker = match ctx.ast.parent(walker) {
            Some(parent) => parent,
            None => {
                ctx.raise_error("This statement must be within a loop.", node);
                return None;
            }
        };

        if matches!(
            ctx.ast.kind(walker),
            AstKind::For { .. } | AstKind::While { .. } | AstKind::DoWhile { .. }
        ) {
            return None;
        }
    }
}

fn evaluate_defer(node: NodeId, ctx: &mut CheckerContext) -> Option<TypeData> {
    let call = match ctx.ast.kind(node) {
        AstKind::Defer { call } => *call,
        _ => unreachable!(),
    };

    // Just typecheck the wrapped call node.
    evaluate(call, ctx)
}

fn evaluate_defer_if(node: NodeId, ctx: &mut CheckerContext) -> Option<TypeData> {
    let (condition, call) = match ctx.ast.kind(node) {
        AstKind::DeferIf { condition, call } => (*condition, *call),
        _ => unreachable!(),
    };

    let condition_t = evaluate(condition, ctx);
    let call_t = evaluate(call, ctx);

    match condition_t {
        Some(condition_t) => {
            if !condition_t.is_lop_eligible() {
                ctx.raise_error(
                    format!("Type {} cannot be used as a logical expression.", condition_t),
                    condition,
                );
            }
        }
        None => {
            ctx.raise_error("defer_if condition does not produce a type.", condition);
            return None;
        }
    }

    call_t
}

fn evaluate_sizeof(node: NodeId, ctx: &mut CheckerContext) -> Option<TypeData> {
    let target = match ctx.ast.kind(node) {
        AstKind::Sizeof { target } => target.clone(),
        _ => unreachable!(),
    };

    if let SizeofTarget::Expr(expr) = target {
        let eval = match evaluate(expr, ctx) {
            Some(eval) => eval,
            None => {
                ctx.raise_error("Expression does not evaluate to a type.", expr);
                return None;
            }
        };

        if eval.kind == TypeKind::Procedure && !eval.flags.contains(TypeFlags::POINTER) {
            ctx.raise_error(format!("Cannot get the size of type {}.", eval), expr);
            return None;
        }
    }

    Some(TypeData::const_i32())
}

/// The post-order dispatcher. Statements return `None`; expression nodes
/// return their computed type.
pub fn evaluate(node: NodeId, ctx: &mut CheckerContext) -> Option<TypeData> {
    match ctx.ast.kind(node) {
        AstKind::NamespaceDecl { children, .. } => {
            let children = children.clone();
            evaluate_children(&children, ctx)
        }
        AstKind::Block { children } => {
            let children = children.clone();
            evaluate_children(&children, ctx)
        }
        AstKind::EnumDef { namespace, .. } => evaluate(*namespace, ctx),
        AstKind::Procdecl { .. } => evaluate_procdecl(node, ctx),
        AstKind::Vardecl { .. } => evaluate_vardecl(node, ctx),
        AstKind::Binexpr { .. } => evaluate_binexpr(node, ctx),
        AstKind::Unaryexpr { .. } => evaluate_unaryexpr(node, ctx),
        AstKind::SingletonLiteral { .. } => evaluate_singleton_literal(node, ctx),
        AstKind::Identifier { .. } => evaluate_identifier(node, ctx),
        AstKind::Cast { .. } => evaluate_cast(node, ctx),
        AstKind::Branch { .. } => evaluate_branch(node, ctx),
        AstKind::For { .. } => evaluate_for(node, ctx),
        AstKind::Switch { .. } => evaluate_switch(node, ctx),
        AstKind::Call { .. } => evaluate_call(node, ctx),
        AstKind::Ret { .. } => evaluate_ret(node, ctx),
        AstKind::Defer { .. } => evaluate_defer(node, ctx),
        AstKind::DeferIf { .. } => evaluate_defer_if(node, ctx),
        AstKind::Sizeof { .. } => evaluate_sizeof(node, ctx),
        AstKind::Subscript { .. } => evaluate_subscript(node, ctx),
        AstKind::MemberAccess { .. } => evaluate_member_access(node, ctx),
        AstKind::While { .. } | AstKind::DoWhile { .. } => evaluate_while(node, ctx),
        AstKind::Brk | AstKind::Cont => evaluate_brk_or_cont(node, ctx),
        AstKind::BracedExpr { .. } => None,
        other => panic!("evaluate: non-evaluateable node {:?}", other),
    }
}

#[cfg(test)]
mod tests {
    use crate::checker::tests::{check_fails, check_ok};
    use crate::types::{Primitive, TypeFlags};

    #[test]
    fn integer_inference_promotes_to_i32() {
        let parser = check_ok("x := 300;");
        let index = parser.tbl.lookup_scoped_symbol("x");
        let sym = parser.tbl.lookup_symbol(index).unwrap();

        assert_eq!(sym.ty.primitive(), Some(Primitive::I32));
        assert!(!sym.ty.flags.contains(TypeFlags::INFERRED));
        assert!(!sym.ty.flags.contains(TypeFlags::NON_CONCRETE));
    }

    #[test]
    fn float_inference_promotes_to_f64() {
        let parser = check_ok("x := 1.5;");
        let index = parser.tbl.lookup_scoped_symbol("x");
        let sym = parser.tbl.lookup_symbol(index).unwrap();
        assert_eq!(sym.ty.primitive(), Some(Primitive::F64));
    }

    #[test]
    fn const_inference_keeps_constness() {
        let parser = check_ok("x ::= 5;");
        let index = parser.tbl.lookup_scoped_symbol("x");
        let sym = parser.tbl.lookup_symbol(index).unwrap();
        assert!(sym.ty.flags.contains(TypeFlags::CONSTANT));
        assert_eq!(sym.ty.primitive(), Some(Primitive::I32));
    }

    #[test]
    fn array_shape_inference_single_dimension() {
        let parser = check_ok("a : i32[] = { 1, 2, 3 };");
        let index = parser.tbl.lookup_scoped_symbol("a");
        let sym = parser.tbl.lookup_symbol(index).unwrap();
        assert_eq!(sym.ty.array_lengths, vec![3]);
        assert_eq!(sym.ty.primitive(), Some(Primitive::I32));
    }

    #[test]
    fn array_shape_inference_matrix() {
        let parser = check_ok("a : i32[][2] = { {1, 2}, {3, 4}, {5, 6} };");
        let index = parser.tbl.lookup_scoped_symbol("a");
        let sym = parser.tbl.lookup_symbol(index).unwrap();
        assert_eq!(sym.ty.array_lengths, vec![3, 2]);
    }

    #[test]
    fn array_shape_mismatch_is_rejected() {
        check_fails("a : i32[2] = { 1, 2, 3 };");
    }

    #[test]
    fn pointer_arithmetic_is_legal() {
        let parser = check_ok("main :: proc(p: i32^) -> void { q := p + 2; }");
        let sym = parser
            .tbl
            .symbols
            .values()
            .find(|s| s.name == "q")
            .unwrap();

        assert_eq!(sym.ty.primitive(), Some(Primitive::I32));
        assert_eq!(sym.ty.pointer_depth, 1);
    }

    #[test]
    fn void_pointer_arithmetic_is_rejected() {
        let errs = check_fails("main :: proc(p: void^) -> void { q := p + 2; }");
        let found = errs
            .diagnostics()
            .iter()
            .any(|d| d.message.contains("cannot be applied to lefthand type void^"));
        assert!(found);
    }

    #[test]
    fn narrowing_assignment_is_rejected() {
        check_fails("main :: proc() -> void { x : i8 = 0; y : i32 = 0; x = y; }");
    }

    #[test]
    fn widening_assignment_is_permitted() {
        check_ok("main :: proc() -> void { x : i32 = 0; y : i8 = 0; x = y; }");
    }

    #[test]
    fn assignment_to_constant_is_rejected() {
        check_fails("main :: proc() -> void { x :: i32 = 5; x = 6; }");
    }

    #[test]
    fn call_arity_mismatch_is_rejected() {
        check_fails(
            "add :: proc(a: i32, b: i32) -> i32 { ret a + b; }\n\
             main :: proc() -> void { add(1); }",
        );
    }

    #[test]
    fn variadic_call_requires_fixed_arity() {
        check_fails(
            "printf :: proc(fmt: i8^, ...) -> i32;\n\
             main :: proc() -> void { printf(); }",
        );
        check_ok(
            "printf :: proc(fmt: i8^, ...) -> i32;\n\
             main :: proc() -> void { printf(\"%d\", 1, 2); }",
        );
    }

    #[test]
    fn calling_non_procedure_is_rejected() {
        check_fails("main :: proc() -> void { x : i32 = 0; x(); }");
    }

    #[test]
    fn return_value_mismatch_is_rejected() {
        check_fails("f :: proc() -> void { ret 5; }");
        check_fails("g :: proc() -> i32 { ret; }");
    }

    #[test]
    fn return_value_coerces() {
        check_ok("f :: proc() -> i32 { x : i8 = 1; ret x; }");
    }

    #[test]
    fn brk_outside_loop_is_rejected() {
        let errs = check_fails("main :: proc() -> void { brk; }");
        let found = errs
            .diagnostics()
            .iter()
            .any(|d| d.message.contains("must be within a loop"));
        assert!(found);
    }

    #[test]
    fn brk_inside_loop_is_accepted() {
        check_ok("main :: proc() -> void { while true { brk; } }");
    }

    #[test]
    fn member_access_resolves_nested_path() {
        check_ok(
            "struct Inner { value: i32 }\n\
             struct Outer { inner: Inner }\n\
             main :: proc() -> void { o : Outer; x := o.inner.value; }",
        );
    }

    #[test]
    fn unknown_member_is_rejected() {
        check_fails(
            "struct Point { x: i32 }\n\
             main :: proc() -> void { p : Point; y := p.y; }",
        );
    }

    #[test]
    fn member_access_through_double_pointer_is_rejected() {
        check_fails(
            "struct Point { x: i32 }\n\
             main :: proc(p: Point^^) -> void { x := p.x; }",
        );
    }

    #[test]
    fn struct_literal_arity_mismatch_is_rejected() {
        check_fails(
            "struct Point { x: i32, y: i32 }\n\
             main :: proc() -> void { p : Point = { 1 }; }",
        );
    }

    #[test]
    fn struct_literal_assignment_checks_members() {
        check_ok(
            "struct Point { x: i32, y: i32 }\n\
             main :: proc() -> void { p : Point = { 1, 2 }; p = { 3, 4 }; }",
        );
    }

    #[test]
    fn global_initializer_must_be_literal() {
        check_fails(
            "f :: proc() -> i32 { ret 1; }\n\
             x : i32 = f();",
        );
    }

    #[test]
    fn switch_case_type_must_coerce() {
        check_fails(
            "main :: proc() -> void { x : u8 = 0; switch x { case 500 {} default {} } }",
        );
    }

    #[test]
    fn switch_on_float_is_rejected() {
        check_fails(
            "main :: proc() -> void { x : f32 = 0.0; switch x { case 1 {} default {} } }",
        );
    }

    #[test]
    fn logical_condition_required_for_while() {
        check_fails(
            "struct S { x: i32 }\n\
             main :: proc() -> void { s : S; while s { brk; } }",
        );
    }

    #[test]
    fn deref_of_non_pointer_is_rejected() {
        check_fails("main :: proc() -> void { x : i32 = 0; y := ^x; }");
    }

    #[test]
    fn address_of_rvalue_is_rejected() {
        check_fails("main :: proc() -> void { p := &5; }");
    }

    #[test]
    fn generic_base_reference_without_args_is_rejected() {
        check_fails(
            "id :: proc[T](x: T) -> T { ret x; }\n\
             main :: proc() -> void { id(5); }",
        );
    }

    #[test]
    fn cast_pointer_to_u64_is_permitted() {
        check_ok("main :: proc(p: i32^) -> void { x := cast(p, u64); }");
    }

    #[test]
    fn cast_pointer_to_i32_is_rejected() {
        check_fails("main :: proc(p: i32^) -> void { x := cast(p, i32); }");
    }

    #[test]
    fn sizeof_yields_const_i32() {
        let parser = check_ok("main :: proc() -> void { s := sizeof i32; }");
        assert!(parser.toplevel_decls.len() == 1);
    }

    #[test]
    fn defer_requires_checkable_call() {
        check_ok(
            "cleanup :: proc() -> void { ret; }\n\
             main :: proc() -> void { defer cleanup(); }",
        );
        check_fails(
            "cleanup :: proc(x: i32) -> void { ret; }\n\
             main :: proc() -> void { defer cleanup(); }",
        );
    }
}
