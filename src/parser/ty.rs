//! Type parsing: primitives, user types (with generic argument lists),
//! procedure signatures, pointer and array postfixes.

use super::{get_namespaced_identifier, Parser};
use crate::lexer::Lexer;
use crate::token::{TokenKind, TokenType};
use crate::types::{token_to_primitive, TypeData, TypeFlags, TypeKind, TypeName};

/// Parses one or more `[N]` / `[]` array postfixes, outermost first. A zero
/// entry means the size is inferred from the initializer.
pub fn parse_array_lengths(lxr: &mut Lexer) -> Option<Vec<u32>> {
    assert!(lxr.current().ty == TokenType::LSquare);
    let mut lengths = Vec::new();

    while lxr.current().ty == TokenType::LSquare {
        lxr.advance(1);

        let mut len: u32 = 0;
        if lxr.current().ty == TokenType::IntegerLiteral {
            len = match lxr.current().value.parse::<u32>() {
                Ok(parsed) => parsed,
                Err(_) => {
                    lxr.raise_error("Array size is too large.");
                    return None;
                }
            };

            if len == 0 {
                lxr.raise_error("Array length cannot be 0.");
                return None;
            }

            lxr.advance(1);
        }

        if lxr.current().ty != TokenType::RSquare {
            lxr.raise_error("Expected closing square bracket.");
            return None;
        }

        lengths.push(len);
        lxr.advance(1);
    }

    Some(lengths)
}

/// A `[` right after a user-type name opens a generic argument list unless
/// it is immediately an array postfix (`[3]` or `[]`).
fn starts_generic_args(lxr: &mut Lexer) -> bool {
    lxr.current().ty == TokenType::LSquare
        && !matches!(
            lxr.peek(1).ty,
            TokenType::IntegerLiteral | TokenType::RSquare
        )
}

fn parse_generic_args(parser: &mut Parser, lxr: &mut Lexer) -> Option<Vec<TypeData>> {
    assert!(lxr.current().ty == TokenType::LSquare);
    lxr.advance(1);

    let mut args = Vec::new();
    while lxr.current().ty != TokenType::RSquare {
        if lxr.current().kind != TokenKind::TypeIdent && !lxr.current().ty.is_ident_start() {
            lxr.raise_error("Expected type identifier as a generic argument.");
            return None;
        }

        args.push(parse_type(parser, lxr)?);
        if lxr.current().ty == TokenType::Comma {
            lxr.advance(1);
        }
    }

    if args.is_empty() {
        lxr.raise_error("Generic argument list cannot be empty.");
        return None;
    }

    lxr.advance(1);
    Some(args)
}

/// Parses a full type: base name (primitive, user type, alias, generic
/// parameter, or `proc`), generic arguments, pointer postfix `^`, array
/// postfix `[N]...`, and for procedures the parameter/return signature.
pub fn parse_type(parser: &mut Parser, lxr: &mut Lexer) -> Option<TypeData> {
    assert!(lxr.current().kind == TokenKind::TypeIdent || lxr.current().ty.is_ident_start());
    let mut data = TypeData::default();

    if lxr.current().ty == TokenType::KwProc {
        data.kind = TypeKind::Procedure;
        data.name = TypeName::Procedure;
    } else if lxr.current().ty.is_ident_start() {
        let name = get_namespaced_identifier(lxr)?;

        if parser.active_generic_params.contains(&name) {
            // A generic parameter reference; the post-parser substitutes it.
            data.kind = TypeKind::Struct;
            data.name = TypeName::Struct(name);
        } else {
            let canonical = parser.tbl.get_canonical_type_name(&name);
            if parser.tbl.type_alias_exists(&canonical) {
                data = parser
                    .tbl
                    .lookup_type_alias(&canonical)
                    .expect("alias existence just checked");
            } else if !parser.tbl.type_exists(&canonical) {
                lxr.raise_error("Invalid type specifier.");
                return None;
            } else {
                data.kind = TypeKind::Struct;
                data.name = TypeName::Struct(canonical);
            }
        }
    } else {
        if lxr.current().ty == TokenType::KwVoid && lxr.peek(1).ty != TokenType::XorOrPtr {
            lxr.raise_error("Use of \"void\" as a non-pointer type.");
            return None;
        }

        let prim = match token_to_primitive(lxr.current().ty) {
            Some(prim) => prim,
            None => {
                lxr.raise_error("Invalid type specifier.");
                return None;
            }
        };

        data.name = TypeName::Primitive(prim);
        data.kind = TypeKind::Primitive;
    }

    lxr.advance(1);

    if data.kind == TypeKind::Struct && starts_generic_args(lxr) {
        data.parameters = Some(parse_generic_args(parser, lxr)?);
    }

    if lxr.current().ty == TokenType::XorOrPtr {
        data.flags.insert(TypeFlags::POINTER);
        while lxr.current().ty == TokenType::XorOrPtr {
            data.pointer_depth += 1;
            lxr.advance(1);
        }
    }

    if lxr.current().ty == TokenType::LSquare {
        data.flags.insert(TypeFlags::ARRAY);
        data.array_lengths = parse_array_lengths(lxr)?;
    }

    if data.kind != TypeKind::Procedure {
        return Some(data);
    }

    // Procedure signature: parameter type list and return type.
    if lxr.current().ty != TokenType::LParen {
        lxr.raise_error("Expected beginning of parameter type list.");
        return None;
    }

    lxr.advance(1);
    let mut params = Vec::new();

    while lxr.current().ty != TokenType::RParen {
        if lxr.current().ty == TokenType::ThreeDots {
            data.flags.insert(TypeFlags::PROC_VARARGS);
            lxr.advance(1);
            if lxr.current().ty != TokenType::RParen {
                lxr.raise_error("Variadic marker must be the last parameter.");
                return None;
            }
            break;
        }

        if lxr.current().kind != TokenKind::TypeIdent && !lxr.current().ty.is_ident_start() {
            lxr.raise_error("Expected type identifier.");
            return None;
        }

        let mut param = parse_type(parser, lxr)?;
        param.flags.insert(TypeFlags::PROCARG);
        params.push(param);

        if lxr.current().ty == TokenType::Comma {
            lxr.advance(1);
        }
    }

    if !params.is_empty() {
        data.parameters = Some(params);
    }

    if lxr.peek(1).ty != TokenType::Arrow
        || (lxr.peek(2).kind != TokenKind::TypeIdent && !lxr.peek(2).ty.is_ident_start())
    {
        lxr.raise_error("Expected procedure return type after parameter list. Example: -> i32");
        return None;
    }

    lxr.advance(2);
    if lxr.current().ty == TokenType::KwVoid && lxr.peek(1).ty != TokenType::XorOrPtr {
        lxr.advance(1);
        return Some(data);
    }

    data.return_type = Some(Box::new(parse_type(parser, lxr)?));
    Some(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Primitive;

    fn type_of(source: &str) -> Option<TypeData> {
        let mut parser = Parser::new();
        let mut lxr = Lexer::new(source, "test.tak", false);
        parse_type(&mut parser, &mut lxr)
    }

    #[test]
    fn plain_primitive() {
        let t = type_of("i32").unwrap();
        assert_eq!(t.kind, TypeKind::Primitive);
        assert_eq!(t.primitive(), Some(Primitive::I32));
        assert_eq!(t.pointer_depth, 0);
    }

    #[test]
    fn pointer_depth_accumulates() {
        let t = type_of("u8^^").unwrap();
        assert_eq!(t.pointer_depth, 2);
        assert!(t.flags.contains(TypeFlags::POINTER));
    }

    #[test]
    fn naked_void_is_rejected() {
        assert!(type_of("void").is_none());
        let t = type_of("void^").unwrap();
        assert_eq!(t.primitive(), Some(Primitive::Void));
        assert_eq!(t.pointer_depth, 1);
    }

    #[test]
    fn multidim_array_postfix() {
        let t = type_of("i32[3][2]").unwrap();
        assert!(t.flags.contains(TypeFlags::ARRAY));
        assert_eq!(t.array_lengths, vec![3, 2]);
    }

    #[test]
    fn inferred_array_dimension() {
        let t = type_of("i32[]").unwrap();
        assert_eq!(t.array_lengths, vec![0]);
        assert!(t.array_has_inferred_sizes());
    }

    #[test]
    fn zero_array_length_is_rejected() {
        assert!(type_of("i32[0]").is_none());
    }

    #[test]
    fn proc_signature_with_return() {
        let t = type_of("proc^(i32, u8^) -> bool").unwrap();
        assert_eq!(t.kind, TypeKind::Procedure);
        assert_eq!(t.pointer_depth, 1);

        let params = t.parameters.as_ref().unwrap();
        assert_eq!(params.len(), 2);
        assert!(params[0].flags.contains(TypeFlags::PROCARG));
        assert_eq!(t.return_type.unwrap().primitive(), Some(Primitive::Bool));
    }

    #[test]
    fn proc_void_return_is_absent() {
        let t = type_of("proc^() -> void").unwrap();
        assert!(t.return_type.is_none());
    }

    #[test]
    fn variadic_proc_type() {
        let t = type_of("proc^(i8^, ...) -> i32").unwrap();
        assert!(t.flags.contains(TypeFlags::PROC_VARARGS));
        assert_eq!(t.parameters.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn unknown_user_type_is_rejected() {
        assert!(type_of("Widget").is_none());
    }

    #[test]
    fn generic_params_resolve_while_active() {
        let mut parser = Parser::new();
        parser.active_generic_params.push("T".to_string());

        let mut lxr = Lexer::new("T^", "test.tak", false);
        let t = parse_type(&mut parser, &mut lxr).unwrap();
        assert_eq!(t.kind, TypeKind::Struct);
        assert_eq!(t.struct_name(), Some("T"));
        assert_eq!(t.pointer_depth, 1);
    }

    #[test]
    fn generic_argument_list_attaches_parameters() {
        let mut parser = Parser::new();
        parser
            .tbl
            .create_type("Pair", Vec::new(), "test.tak", 0, 1);

        let mut lxr = Lexer::new("Pair[i32, bool]", "test.tak", false);
        let t = parse_type(&mut parser, &mut lxr).unwrap();
        assert_eq!(t.struct_name(), Some("Pair"));

        let args = t.parameters.as_ref().unwrap();
        assert_eq!(args.len(), 2);
        assert_eq!(args[0].primitive(), Some(Primitive::I32));
        assert_eq!(args[1].primitive(), Some(Primitive::Bool));
    }

    #[test]
    fn array_postfix_on_user_type_is_not_generic() {
        let mut parser = Parser::new();
        parser
            .tbl
            .create_type("Vec3", Vec::new(), "test.tak", 0, 1);

        let mut lxr = Lexer::new("Vec3[4]", "test.tak", false);
        let t = parse_type(&mut parser, &mut lxr).unwrap();
        assert!(t.parameters.is_none());
        assert_eq!(t.array_lengths, vec![4]);
    }

    #[test]
    fn alias_expands_transparently() {
        let mut parser = Parser::new();
        let mut alias_target = TypeData {
            kind: TypeKind::Primitive,
            name: TypeName::Primitive(Primitive::U64),
            ..Default::default()
        };
        alias_target.flags.insert(TypeFlags::CONSTANT);
        parser.tbl.create_type_alias("Handle", alias_target);

        let mut lxr = Lexer::new("Handle^", "test.tak", false);
        let t = parse_type(&mut parser, &mut lxr).unwrap();
        assert_eq!(t.primitive(), Some(Primitive::U64));
        assert_eq!(t.pointer_depth, 1);
        assert!(t.flags.contains(TypeFlags::CONSTANT));
    }
}
