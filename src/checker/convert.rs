//! Literal-to-type conversion and the braced-expression rules: deducing an
//! array type from a braced initializer and matching a braced expression
//! against a struct layout.

use super::{evaluate, CheckerContext};
use crate::ast::{AstKind, NodeId};
use crate::entity::EntityTable;
use crate::types::{Primitive, TypeData, TypeFlags, TypeKind, TypeName};

/// Integer literals take the smallest unsigned primitive that fits; the
/// non-concrete flag lets coercion widen and re-sign them later.
pub fn convert_int_lit_to_type(value: &str) -> TypeData {
    let actual = value
        .parse::<u64>()
        .expect("integer literal was validated at parse time");

    let prim = if actual <= u64::from(u8::MAX) {
        Primitive::U8
    } else if actual <= u64::from(u16::MAX) {
        Primitive::U16
    } else if actual <= u64::from(u32::MAX) {
        Primitive::U32
    } else {
        Primitive::U64
    };

    TypeData {
        kind: TypeKind::Primitive,
        name: TypeName::Primitive(prim),
        flags: TypeFlags::CONSTANT | TypeFlags::NON_CONCRETE | TypeFlags::RVALUE,
        ..Default::default()
    }
}

pub fn convert_float_lit_to_type(value: &str) -> TypeData {
    let actual = value
        .parse::<f64>()
        .expect("float literal was validated at parse time");

    let prim = if actual >= f64::from(f32::MIN) && actual <= f64::from(f32::MAX) {
        Primitive::F32
    } else {
        Primitive::F64
    };

    TypeData {
        kind: TypeKind::Primitive,
        name: TypeName::Primitive(prim),
        flags: TypeFlags::CONSTANT | TypeFlags::NON_CONCRETE | TypeFlags::RVALUE,
        ..Default::default()
    }
}

/// Deduces an array type from a braced initializer: the first element pins
/// the contained type, every further element must coerce to it, and nested
/// braces recurse into inner dimensions. With `only_literals` set (global
/// initializers) non-literal elements are rejected.
pub fn get_bracedexpr_as_array_t(
    node: NodeId,
    ctx: &mut CheckerContext,
    only_literals: bool,
) -> Option<TypeData> {
    let members = match ctx.ast.kind(node) {
        AstKind::BracedExpr { members } => members.clone(),
        _ => return None,
    };

    if members.is_empty() {
        return None;
    }

    let first = members[0];
    let mut contained_t = if matches!(ctx.ast.kind(first), AstKind::BracedExpr { .. }) {
        get_bracedexpr_as_array_t(first, ctx, only_literals)?
    } else {
        evaluate(first, ctx)?
    };

    if contained_t.is_invalid_in_inferred_context() {
        return None;
    }

    let first_is_literal = matches!(ctx.ast.kind(first), AstKind::SingletonLiteral { .. });
    let first_is_braced = matches!(ctx.ast.kind(first), AstKind::BracedExpr { .. });

    if only_literals && !contained_t.flags.contains(TypeFlags::ARRAY) && !first_is_literal {
        ctx.raise_error("Only literals are permitted in this context.", first);
        return None;
    }

    if contained_t.flags.contains(TypeFlags::ARRAY) && !first_is_braced {
        ctx.raise_error("Array type is invalid in this context.", first);
        return None;
    }

    for member in members.iter().skip(1).copied() {
        if matches!(ctx.ast.kind(member), AstKind::BracedExpr { .. }) {
            let subarray_t = get_bracedexpr_as_array_t(member, ctx, only_literals)?;

            if !contained_t.flags.contains(TypeFlags::ARRAY)
                || !TypeData::are_arrays_equivalent(&contained_t, &subarray_t)
            {
                return None;
            }
        } else {
            let element_t = evaluate(member, ctx)?;
            if !TypeData::is_coercion_permissible(&mut contained_t, &element_t) {
                return None;
            }

            if element_t.flags.contains(TypeFlags::ARRAY) {
                ctx.raise_error("Array type is invalid in this context.", member);
                return None;
            }

            if only_literals && !matches!(ctx.ast.kind(member), AstKind::SingletonLiteral { .. }) {
                ctx.raise_error("Only literals are permitted in this context.", member);
                return None;
            }
        }
    }

    contained_t.flags.insert(TypeFlags::ARRAY);
    contained_t.array_lengths.insert(0, members.len() as u32);
    Some(contained_t)
}

/// Walks a dotted member path through the user-type registry, following
/// nested struct members (value or single pointer).
pub fn get_struct_member_type_data(
    member_path: &str,
    base_type_name: &str,
    tbl: &EntityTable,
) -> Option<TypeData> {
    let chunks: Vec<&str> = member_path
        .split('.')
        .filter(|chunk| !chunk.is_empty())
        .collect();

    if chunks.is_empty() {
        return None;
    }

    let mut utype = tbl.lookup_type(base_type_name)?;

    for (index, chunk) in chunks.iter().enumerate() {
        let member = utype.members.iter().find(|m| m.name == *chunk)?;

        if index + 1 >= chunks.len() {
            return Some(member.ty.clone());
        }

        let nested_name = member.ty.struct_name()?;
        if !member.ty.array_lengths.is_empty() || member.ty.pointer_depth >= 2 {
            return None;
        }

        utype = tbl.lookup_type(nested_name)?;
    }

    None
}

/// Matches a braced expression positionally against a struct layout,
/// recursing into nested arrays and structs and coercing each element to
/// the declared member type. Errors accumulate per element.
pub fn assign_bracedexpr_to_struct(
    ty: &TypeData,
    expr: NodeId,
    ctx: &mut CheckerContext,
    only_literals: bool,
) {
    assert!(ty.kind == TypeKind::Struct);

    if ty.flags.contains(TypeFlags::RVALUE) {
        ctx.raise_error(
            format!("Cannot assign this braced expression to lefthand type {}.", ty),
            expr,
        );
        return;
    }

    let name = ty.struct_name().expect("struct type has a name").to_string();
    let members = match ctx.tbl.lookup_type(&name) {
        Some(utype) => utype.members.clone(),
        None => {
            ctx.raise_error(format!("Unknown struct type \"{}\".", name), expr);
            return;
        }
    };

    let elements = match ctx.ast.kind(expr) {
        AstKind::BracedExpr { members } => members.clone(),
        _ => {
            ctx.raise_error("Expected braced initializer.", expr);
            return;
        }
    };

    if members.len() != elements.len() {
        ctx.raise_error(
            format!(
                "Number of elements within braced expression ({}) does not match the struct type {} ({} members).",
                elements.len(),
                ty,
                members.len()
            ),
            expr,
        );
        return;
    }

    for (index, (member, element)) in members.iter().zip(elements.iter().copied()).enumerate() {
        if member.ty.flags.contains(TypeFlags::ARRAY) {
            if !matches!(ctx.ast.kind(element), AstKind::BracedExpr { .. }) {
                ctx.raise_error(
                    format!("Element {} in braced expression is invalid.", index + 1),
                    expr,
                );
                continue;
            }

            let array_t = match get_bracedexpr_as_array_t(element, ctx, only_literals) {
                Some(array_t) => array_t,
                None => {
                    ctx.raise_error(
                        format!("Element {} in braced expression is invalid.", index + 1),
                        expr,
                    );
                    continue;
                }
            };

            if !TypeData::are_arrays_equivalent(&member.ty, &array_t) {
                ctx.raise_error(
                    format!(
                        "Element {} in braced expression: array of type {} is not equivalent to {}.",
                        index + 1,
                        array_t,
                        member.ty
                    ),
                    expr,
                );
            }
            continue;
        }

        if member.ty.kind == TypeKind::Struct
            && !member.ty.flags.contains(TypeFlags::POINTER)
            && matches!(ctx.ast.kind(element), AstKind::BracedExpr { .. })
        {
            assign_bracedexpr_to_struct(&member.ty, element, ctx, only_literals);
            continue;
        }

        let element_t = match evaluate(element, ctx) {
            Some(element_t) => element_t,
            None => {
                ctx.raise_error(
                    format!(
                        "Could not deduce type of element {} in braced expression.",
                        index + 1
                    ),
                    expr,
                );
                continue;
            }
        };

        if only_literals && !matches!(ctx.ast.kind(element), AstKind::SingletonLiteral { .. }) {
            ctx.raise_error("Only literals are permitted in this context.", element);
            continue;
        }

        let mut member_t = member.ty.clone();
        if !TypeData::is_coercion_permissible(&mut member_t, &element_t) {
            ctx.raise_error(
                format!(
                    "Cannot coerce element {} of braced expression to type {} ({} was given).",
                    index + 1,
                    member.ty,
                    element_t
                ),
                element,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_int_literal_is_nonconcrete_u8() {
        let t = convert_int_lit_to_type("42");
        assert_eq!(t.primitive(), Some(Primitive::U8));
        assert!(t.flags.contains(TypeFlags::NON_CONCRETE));
        assert!(t.flags.contains(TypeFlags::RVALUE));
    }

    #[test]
    fn int_literal_widths() {
        assert_eq!(convert_int_lit_to_type("300").primitive(), Some(Primitive::U16));
        assert_eq!(
            convert_int_lit_to_type("70000").primitive(),
            Some(Primitive::U32)
        );
        assert_eq!(
            convert_int_lit_to_type("5000000000").primitive(),
            Some(Primitive::U64)
        );
    }

    #[test]
    fn float_literal_prefers_f32() {
        assert_eq!(convert_float_lit_to_type("3.25").primitive(), Some(Primitive::F32));
    }
}
