//! Expression parsing: literals, parenthesized expressions, casts, sizeof,
//! braced initializers, unary and binary operators, calls, subscripts and
//! member accesses.

use super::{parse, ty::parse_type, Parser};
use crate::ast::{AstKind, NodeId, SizeofTarget};
use crate::lexer::{unquote_string, Lexer};
use crate::token::{TokenKind, TokenType};

pub fn parse_parenthesized_expression(parser: &mut Parser, lxr: &mut Lexer) -> Option<NodeId> {
    assert!(lxr.current().ty == TokenType::LParen);

    parser.inside_parens += 1;
    lxr.advance(1);

    let pos = lxr.current().pos;
    let line = lxr.current().line;
    let expr = parse(parser, lxr, true, false)?;

    if !parser.ast.kind(expr).is_valid_subexpression() {
        lxr.raise_error_at("This expression cannot be used within parentheses.", pos, line);
        return None;
    }

    Some(expr)
}

/// `cast(expr, Type)`.
pub fn parse_cast(parser: &mut Parser, lxr: &mut Lexer) -> Option<NodeId> {
    assert!(lxr.current().ty == TokenType::KwCast);
    let pos = lxr.current().pos;
    let line = lxr.current().line;
    let file = lxr.file.clone();

    if lxr.peek(1).ty != TokenType::LParen {
        lxr.raise_error("Expected '('.");
        return None;
    }

    lxr.advance(2);
    let target_pos = lxr.current().pos;
    let target_line = lxr.current().line;
    let target = parse(parser, lxr, true, false)?;

    if !parser.ast.kind(target).is_valid_subexpression() {
        lxr.raise_error_at("Invalid expression used as cast target.", target_pos, target_line);
        return None;
    }

    if !matches!(lxr.current().ty, TokenType::Comma | TokenType::Semicolon) {
        lxr.raise_error("Expected ',' or ';'.");
        return None;
    }

    lxr.advance(1);
    if !lxr.current().ty.is_ident_start() && lxr.current().kind != TokenKind::TypeIdent {
        lxr.raise_error("Expected type identifier.");
        return None;
    }

    let ty = parse_type(parser, lxr)?;
    if lxr.current().ty != TokenType::RParen {
        lxr.raise_error("Expected ')'.");
        return None;
    }

    lxr.advance(1);
    let node = parser.ast.alloc(AstKind::Cast { target, ty }, pos, line, &file);
    parser.ast.set_parent(target, node);
    parser.extra_generic_nodes.push(node);
    Some(node)
}

pub fn parse_singleton_literal(parser: &mut Parser, lxr: &mut Lexer) -> Option<NodeId> {
    assert!(lxr.current().kind == TokenKind::Literal);

    let tok = lxr.current();
    let file = lxr.file.clone();
    let mut literal_type = tok.ty;

    // Strings and characters resolve their escapes here; quotes are
    // dropped so downstream passes see the payload only.
    let mut value = match literal_type {
        TokenType::StringLiteral | TokenType::CharacterLiteral => {
            match unquote_string(tok.value) {
                Some(payload) => payload,
                None => {
                    lxr.raise_error("Literal contains one or more invalid escaped characters.");
                    return None;
                }
            }
        }
        _ => tok.value.to_string(),
    };

    // Hex literals become base-10 integers; numeric literals get a bounds
    // check up front.
    match literal_type {
        TokenType::HexLiteral => {
            let digits = value.trim_start_matches("0x").trim_start_matches("0X");
            match i64::from_str_radix(digits, 16) {
                Ok(converted) => {
                    value = converted.to_string();
                    literal_type = TokenType::IntegerLiteral;
                }
                Err(_) => {
                    lxr.raise_error("Literal value is too large.");
                    return None;
                }
            }
        }
        TokenType::IntegerLiteral => {
            if value.parse::<i64>().is_err() {
                lxr.raise_error("Literal value is too large.");
                return None;
            }
        }
        TokenType::FloatLiteral => {
            if value.parse::<f64>().is_err() {
                lxr.raise_error("Invalid literal.");
                return None;
            }
        }
        _ => {}
    }

    lxr.advance(1);
    let node = parser.ast.alloc(
        AstKind::SingletonLiteral {
            literal_type,
            value,
        },
        tok.pos,
        tok.line,
        &file,
    );

    Some(node)
}

pub fn parse_nullptr(parser: &mut Parser, lxr: &mut Lexer) -> Option<NodeId> {
    assert!(lxr.current().ty == TokenType::KwNullptr);
    let tok = lxr.current();
    let file = lxr.file.clone();

    lxr.advance(1);
    let node = parser.ast.alloc(
        AstKind::SingletonLiteral {
            literal_type: TokenType::KwNullptr,
            value: "nullptr".to_string(),
        },
        tok.pos,
        tok.line,
        &file,
    );

    Some(node)
}

/// `.a.b.c` after a struct-typed expression; the path is validated by the
/// checker against the user-type registry.
pub fn parse_member_access(target: NodeId, parser: &mut Parser, lxr: &mut Lexer) -> Option<NodeId> {
    assert!(lxr.current().ty == TokenType::Dot);

    let pos = lxr.current().pos;
    let line = lxr.current().line;
    let file = lxr.file.clone();
    let mut path = String::new();

    while lxr.current().ty == TokenType::Dot && lxr.peek(1).ty == TokenType::Identifier {
        path.push('.');
        path.push_str(lxr.peek(1).value);
        lxr.advance(2);
    }

    if path.is_empty() {
        lxr.raise_error_at("Expected member access identifier after '.'", pos, line);
        return None;
    }

    let node = parser
        .ast
        .alloc(AstKind::MemberAccess { target, path }, pos, line, &file);
    parser.ast.set_parent(target, node);
    Some(node)
}

/// `sizeof Type` or `sizeof expr`. The type form requires lookahead: the
/// identifier chain is scanned, the stream restored, and only then parsed
/// as a type when the name resolves to one.
pub fn parse_sizeof(parser: &mut Parser, lxr: &mut Lexer) -> Option<NodeId> {
    assert!(lxr.current().ty == TokenType::KwSizeof);
    let pos = lxr.current().pos;
    let line = lxr.current().line;
    let file = lxr.file.clone();

    lxr.advance(1);

    if lxr.current().ty.is_ident_start() {
        let saved = lxr.save_state();
        let name_if_type = match super::get_namespaced_identifier(lxr) {
            Some(name) => parser.tbl.get_canonical_type_name(&name),
            None => return None,
        };
        lxr.restore_state(saved);

        if parser.tbl.type_exists(&name_if_type) || parser.tbl.type_alias_exists(&name_if_type) {
            let ty = parse_type(parser, lxr)?;
            let node = parser.ast.alloc(
                AstKind::Sizeof {
                    target: SizeofTarget::Type(ty),
                },
                pos,
                line,
                &file,
            );

            parser.extra_generic_nodes.push(node);
            return Some(node);
        }
    }

    if lxr.current().kind == TokenKind::TypeIdent {
        let ty = parse_type(parser, lxr)?;
        let node = parser.ast.alloc(
            AstKind::Sizeof {
                target: SizeofTarget::Type(ty),
            },
            pos,
            line,
            &file,
        );

        parser.extra_generic_nodes.push(node);
        return Some(node);
    }

    let target_pos = lxr.current().pos;
    let target_line = lxr.current().line;
    let target = parse(parser, lxr, true, false)?;

    if !parser.ast.kind(target).is_valid_subexpression() {
        lxr.raise_error_at(
            "Invalid subexpression used within sizeof operator.",
            target_pos,
            target_line,
        );
        return None;
    }

    let node = parser.ast.alloc(
        AstKind::Sizeof {
            target: SizeofTarget::Expr(target),
        },
        pos,
        line,
        &file,
    );

    parser.ast.set_parent(target, node);
    Some(node)
}

pub fn parse_braced_expression(parser: &mut Parser, lxr: &mut Lexer) -> Option<NodeId> {
    assert!(lxr.current().ty == TokenType::LBrace);
    let pos = lxr.current().pos;
    let line = lxr.current().line;
    let file = lxr.file.clone();

    lxr.advance(1);
    let mut members = Vec::new();

    while lxr.current().ty != TokenType::RBrace {
        let member_pos = lxr.current().pos;
        let member_line = lxr.current().line;

        let member = parse(parser, lxr, true, false)?;
        if !parser.ast.kind(member).is_valid_subexpression() {
            lxr.raise_error_at(
                "Invalid subexpression within braced expression.",
                member_pos,
                member_line,
            );
            return None;
        }

        members.push(member);
        if lxr.current().ty == TokenType::Comma {
            lxr.advance(1);
        }
    }

    lxr.advance(1);
    let node = parser
        .ast
        .alloc(AstKind::BracedExpr { members: members.clone() }, pos, line, &file);

    for member in members {
        parser.ast.set_parent(member, node);
    }

    Some(node)
}

pub fn parse_unary_expression(parser: &mut Parser, lxr: &mut Lexer) -> Option<NodeId> {
    assert!(lxr.current().is_valid_unary_operator());

    let op = lxr.current().ty;
    let pos = lxr.current().pos;
    let line = lxr.current().line;
    let file = lxr.file.clone();

    lxr.advance(1);
    let operand = parse(parser, lxr, true, true)?;

    if !parser.ast.kind(operand).is_valid_subexpression() {
        lxr.raise_error_at("Unexpected expression following unary operator.", pos, line);
        return None;
    }

    let node = parser
        .ast
        .alloc(AstKind::Unaryexpr { op, operand }, pos, line, &file);
    parser.ast.set_parent(operand, node);
    Some(node)
}

/// `target(args...)`. Arguments drive the parenthesized-expression counter:
/// the argument that meets the closing `)` consumes it and decrements.
pub fn parse_call(target: NodeId, parser: &mut Parser, lxr: &mut Lexer) -> Option<NodeId> {
    assert!(lxr.current().ty == TokenType::LParen);

    let pos = lxr.current().pos;
    let line = lxr.current().line;
    let file = lxr.file.clone();
    let mut arguments = Vec::new();

    lxr.advance(1);
    if lxr.current().ty == TokenType::RParen {
        lxr.advance(1);
        let node = parser
            .ast
            .alloc(AstKind::Call { target, arguments }, pos, line, &file);
        parser.ast.set_parent(target, node);
        return Some(node);
    }

    let old_paren_index = parser.inside_parens;
    parser.inside_parens += 1;

    while old_paren_index < parser.inside_parens {
        let arg_pos = lxr.current().pos;
        let arg_line = lxr.current().line;

        let arg = parse(parser, lxr, true, false)?;
        if !parser.ast.kind(arg).is_valid_subexpression() {
            lxr.raise_error_at("Invalid subexpression within call.", arg_pos, arg_line);
            return None;
        }

        arguments.push(arg);

        if old_paren_index >= parser.inside_parens {
            break;
        }

        if matches!(lxr.current().ty, TokenType::Comma | TokenType::Semicolon) {
            lxr.advance(1);
            if lxr.current().ty == TokenType::RParen {
                parser.inside_parens -= 1;
                lxr.advance(1);
            }
        }
    }

    let node = parser
        .ast
        .alloc(AstKind::Call { target, arguments: arguments.clone() }, pos, line, &file);
    parser.ast.set_parent(target, node);
    for arg in arguments {
        parser.ast.set_parent(arg, node);
    }

    Some(node)
}

/// Precedence-climbing continuation. The right operand absorbs following
/// operators while they bind tighter, and equal-precedence assignment
/// operators nest rightward.
pub fn parse_binary_expression(
    left: NodeId,
    parser: &mut Parser,
    lxr: &mut Lexer,
) -> Option<NodeId> {
    assert!(lxr.current().kind == TokenKind::BinaryOp);

    let op = lxr.current().ty;
    let pos = lxr.current().pos;
    let line = lxr.current().line;
    let file = lxr.file.clone();

    lxr.advance(1);
    let mut right = parse(parser, lxr, true, true)?;

    if !parser.ast.kind(right).is_valid_subexpression() {
        lxr.raise_error_at("Unexpected expression following binary operator.", pos, line);
        return None;
    }

    while lxr.current().kind == TokenKind::BinaryOp {
        let next = lxr.current().ty;
        let tighter = next.precedence() > op.precedence();
        let right_assoc = next.precedence() == 0 && op.precedence() == 0;

        if !tighter && !right_assoc {
            break;
        }

        right = parse_binary_expression(right, parser, lxr)?;
    }

    let node = parser
        .ast
        .alloc(AstKind::Binexpr { op, left, right }, pos, line, &file);
    parser.ast.set_parent(left, node);
    parser.ast.set_parent(right, node);
    Some(node)
}

pub fn parse_subscript(operand: NodeId, parser: &mut Parser, lxr: &mut Lexer) -> Option<NodeId> {
    assert!(lxr.current().ty == TokenType::LSquare);
    lxr.advance(1);

    let pos = lxr.current().pos;
    let line = lxr.current().line;
    let file = lxr.file.clone();
    let value = parse(parser, lxr, true, false)?;

    if !parser.ast.kind(value).is_valid_subexpression()
        || lxr.current().ty != TokenType::RSquare
    {
        lxr.raise_error_at("Invalid expression within subscript operator.", pos, line);
        return None;
    }

    lxr.advance(1);
    let node = parser
        .ast
        .alloc(AstKind::Subscript { operand, value }, pos, line, &file);
    parser.ast.set_parent(operand, node);
    parser.ast.set_parent(value, node);
    Some(node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_ok;
    use crate::token::TokenType;

    fn body_of_main(parser: &Parser) -> Vec<NodeId> {
        let mut body = None;
        for decl in &parser.toplevel_decls {
            if let AstKind::Procdecl { children, .. } = parser.ast.kind(*decl) {
                body = Some(children.clone());
            }
        }
        body.expect("no procedure in source")
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        let parser = parse_ok(
            "main :: proc() -> void { x : i32 = 0; x = 1 + 2 * 3; }",
        );
        let stmts = body_of_main(&parser);

        // x = (1 + (2 * 3))
        let assign = stmts[1];
        let AstKind::Binexpr { op, right, .. } = parser.ast.kind(assign) else {
            panic!("expected assignment");
        };
        assert_eq!(*op, TokenType::ValueAssignment);

        let AstKind::Binexpr { op, right, .. } = parser.ast.kind(*right) else {
            panic!("expected addition");
        };
        assert_eq!(*op, TokenType::Plus);

        let AstKind::Binexpr { op, .. } = parser.ast.kind(*right) else {
            panic!("expected multiplication on the right");
        };
        assert_eq!(*op, TokenType::Mul);
    }

    #[test]
    fn equal_precedence_nests_leftward() {
        let parser = parse_ok("main :: proc() -> void { x : i32 = 0; x = 1 - 2 - 3; }");
        let stmts = body_of_main(&parser);

        let AstKind::Binexpr { right, .. } = parser.ast.kind(stmts[1]) else {
            panic!("expected assignment");
        };

        // ((1 - 2) - 3)
        let AstKind::Binexpr { op, left, .. } = parser.ast.kind(*right) else {
            panic!("expected subtraction");
        };
        assert_eq!(*op, TokenType::Sub);
        assert!(matches!(
            parser.ast.kind(*left),
            AstKind::Binexpr {
                op: TokenType::Sub,
                ..
            }
        ));
    }

    #[test]
    fn unary_address_binds_single_operand() {
        let parser = parse_ok(
            "main :: proc() -> void { x : i32 = 0; p : i32^ = &x + 1; }",
        );
        let stmts = body_of_main(&parser);

        let AstKind::Vardecl { init_value, .. } = parser.ast.kind(stmts[1]) else {
            panic!("expected vardecl");
        };

        // (&x) + 1, not &(x + 1)
        let AstKind::Binexpr { op, left, .. } = parser.ast.kind(init_value.unwrap()) else {
            panic!("expected binary expression");
        };
        assert_eq!(*op, TokenType::Plus);
        assert!(matches!(
            parser.ast.kind(*left),
            AstKind::Unaryexpr {
                op: TokenType::BitwiseAnd,
                ..
            }
        ));
    }

    #[test]
    fn parenthesized_group_overrides_precedence() {
        let parser = parse_ok("main :: proc() -> void { x : i32 = 0; x = (1 + 2) * 3; }");
        let stmts = body_of_main(&parser);

        let AstKind::Binexpr { right, .. } = parser.ast.kind(stmts[1]) else {
            panic!("expected assignment");
        };
        let AstKind::Binexpr { op, left, .. } = parser.ast.kind(*right) else {
            panic!("expected multiplication");
        };
        assert_eq!(*op, TokenType::Mul);
        assert!(matches!(
            parser.ast.kind(*left),
            AstKind::Binexpr {
                op: TokenType::Plus,
                ..
            }
        ));
    }

    #[test]
    fn call_postfix_chains_with_member_access() {
        let parser = parse_ok(
            "struct Pos { x: i32, y: i32 }\n\
             origin :: proc() -> Pos { p : Pos; ret p; }\n\
             main :: proc() -> void { v : i32 = origin().x; }",
        );

        let stmts = body_of_main(&parser);
        assert!(!stmts.is_empty());
    }

    #[test]
    fn hex_literal_becomes_decimal() {
        let parser = parse_ok("main :: proc() -> void { x : i32 = 0xFF; }");
        let stmts = body_of_main(&parser);

        let AstKind::Vardecl { init_value, .. } = parser.ast.kind(stmts[0]) else {
            panic!("expected vardecl");
        };
        let AstKind::SingletonLiteral { literal_type, value } =
            parser.ast.kind(init_value.unwrap())
        else {
            panic!("expected literal");
        };
        assert_eq!(*literal_type, TokenType::IntegerLiteral);
        assert_eq!(value, "255");
    }

    #[test]
    fn string_literal_payload_is_unquoted() {
        let parser = parse_ok("main :: proc() -> void { s : i8^ = \"hi\\n\"; }");
        let stmts = body_of_main(&parser);

        let AstKind::Vardecl { init_value, .. } = parser.ast.kind(stmts[0]) else {
            panic!("expected vardecl");
        };
        let AstKind::SingletonLiteral { value, .. } = parser.ast.kind(init_value.unwrap()) else {
            panic!("expected literal");
        };
        assert_eq!(value, "hi\n");
    }
}
