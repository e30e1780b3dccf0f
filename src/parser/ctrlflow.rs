//! Control-flow parsing: branches, loops, switch/case, returns, break and
//! continue, defer statements and plain scope blocks. Every function keeps
//! the scope stack balanced on all paths.

use super::{parse, Parser};
use crate::ast::{AstKind, NodeId};
use crate::lexer::Lexer;
use crate::token::TokenType;

pub fn parse_cont(parser: &mut Parser, lxr: &mut Lexer) -> Option<NodeId> {
    assert!(lxr.current().ty == TokenType::KwCont);
    let tok = lxr.current();
    let file = lxr.file.clone();
    lxr.advance(1);
    Some(parser.ast.alloc(AstKind::Cont, tok.pos, tok.line, &file))
}

pub fn parse_brk(parser: &mut Parser, lxr: &mut Lexer) -> Option<NodeId> {
    assert!(lxr.current().ty == TokenType::KwBrk);
    let tok = lxr.current();
    let file = lxr.file.clone();
    lxr.advance(1);
    Some(parser.ast.alloc(AstKind::Brk, tok.pos, tok.line, &file))
}

/// Parses a `{ ... }` body, or a single statement when no brace follows.
fn parse_body(parser: &mut Parser, lxr: &mut Lexer) -> Option<Vec<NodeId>> {
    let mut body = Vec::new();

    if lxr.current().ty == TokenType::LBrace {
        lxr.advance(1);
        while lxr.current().ty != TokenType::RBrace {
            body.push(parse(parser, lxr, false, false)?);
        }
        lxr.advance(1);
    } else {
        body.push(parse(parser, lxr, false, false)?);
    }

    Some(body)
}

pub fn parse_branch(parser: &mut Parser, lxr: &mut Lexer) -> Option<NodeId> {
    assert!(lxr.current().ty == TokenType::KwIf);

    let pos = lxr.current().pos;
    let line = lxr.current().line;
    let file = lxr.file.clone();

    parser.tbl.push_scope();
    lxr.advance(1);

    let cond_pos = lxr.current().pos;
    let cond_line = lxr.current().line;

    let branch_result = (|| {
        let condition = parse(parser, lxr, true, false)?;
        if !parser.ast.kind(condition).is_valid_subexpression()
            && !matches!(parser.ast.kind(condition), AstKind::Vardecl { .. })
        {
            lxr.raise_error_at(
                "Expression cannot be used within if statement condition.",
                cond_pos,
                cond_line,
            );
            return None;
        }

        let body = parse_body(parser, lxr)?;
        Some((condition, body))
    })();

    parser.tbl.pop_scope();
    let (condition, body) = branch_result?;

    let if_stmt = parser
        .ast
        .alloc(AstKind::If { condition, body: body.clone() }, cond_pos, cond_line, &file);
    parser.ast.set_parent(condition, if_stmt);
    for child in &body {
        parser.ast.set_parent(*child, if_stmt);
    }

    let mut else_stmt = None;
    if lxr.current().ty == TokenType::KwElse {
        let else_pos = lxr.current().pos;
        let else_line = lxr.current().line;

        lxr.advance(1);
        parser.tbl.push_scope();
        let body = parse_body(parser, lxr);
        parser.tbl.pop_scope();
        let body = body?;

        let stmt = parser
            .ast
            .alloc(AstKind::Else { body: body.clone() }, else_pos, else_line, &file);
        for child in &body {
            parser.ast.set_parent(*child, stmt);
        }

        else_stmt = Some(stmt);
    }

    let node = parser
        .ast
        .alloc(AstKind::Branch { if_stmt, else_stmt }, pos, line, &file);
    parser.ast.set_parent(if_stmt, node);
    if let Some(else_stmt) = else_stmt {
        parser.ast.set_parent(else_stmt, node);
    }

    Some(node)
}

pub fn parse_case(parser: &mut Parser, lxr: &mut Lexer) -> Option<NodeId> {
    assert!(matches!(
        lxr.current().ty,
        TokenType::KwCase | TokenType::KwFallthrough
    ));

    let pos = lxr.current().pos;
    let line = lxr.current().line;
    let file = lxr.file.clone();
    let fallthrough = lxr.current().ty == TokenType::KwFallthrough;

    parser.tbl.push_scope();
    lxr.advance(1);

    let result = (|| {
        let value = parse(parser, lxr, true, false)?;
        let valid = match parser.ast.kind(value) {
            AstKind::SingletonLiteral { literal_type, .. } => !matches!(
                literal_type,
                TokenType::StringLiteral | TokenType::FloatLiteral | TokenType::KwNullptr
            ),
            _ => false,
        };

        if !valid {
            lxr.raise_error_at("Invalid case value.", pos, line);
            return None;
        }

        if matches!(lxr.current().ty, TokenType::Semicolon | TokenType::Comma) {
            lxr.advance(1);
            return Some((value, Vec::new()));
        }

        if lxr.current().ty != TokenType::LBrace {
            lxr.raise_error("Expected '{' (beginning of case body).");
            return None;
        }

        lxr.advance(1);
        let mut body = Vec::new();
        while lxr.current().ty != TokenType::RBrace {
            body.push(parse(parser, lxr, false, false)?);
        }

        lxr.advance(1);
        Some((value, body))
    })();

    parser.tbl.pop_scope();
    let (value, body) = result?;

    let node = parser.ast.alloc(
        AstKind::Case {
            value,
            fallthrough,
            body: body.clone(),
        },
        pos,
        line,
        &file,
    );

    parser.ast.set_parent(value, node);
    for child in &body {
        parser.ast.set_parent(*child, node);
    }

    Some(node)
}

pub fn parse_default(parser: &mut Parser, lxr: &mut Lexer) -> Option<NodeId> {
    assert!(lxr.current().ty == TokenType::KwDefault);

    let pos = lxr.current().pos;
    let line = lxr.current().line;
    let file = lxr.file.clone();

    parser.tbl.push_scope();
    lxr.advance(1);

    let result = (|| {
        if matches!(lxr.current().ty, TokenType::Semicolon | TokenType::Comma) {
            lxr.advance(1);
            return Some(Vec::new());
        }

        if lxr.current().ty != TokenType::LBrace {
            lxr.raise_error("Expected '{' after \"default\" (case body is missing).");
            return None;
        }

        lxr.advance(1);
        let mut body = Vec::new();
        while lxr.current().ty != TokenType::RBrace {
            body.push(parse(parser, lxr, false, false)?);
        }

        lxr.advance(1);
        Some(body)
    })();

    parser.tbl.pop_scope();
    let body = result?;

    let node = parser
        .ast
        .alloc(AstKind::Default { body: body.clone() }, pos, line, &file);
    for child in &body {
        parser.ast.set_parent(*child, node);
    }

    Some(node)
}

pub fn parse_switch(parser: &mut Parser, lxr: &mut Lexer) -> Option<NodeId> {
    assert!(lxr.current().ty == TokenType::KwSwitch);
    lxr.advance(1);

    let pos = lxr.current().pos;
    let line = lxr.current().line;
    let file = lxr.file.clone();

    let target = parse(parser, lxr, true, false)?;
    if !parser.ast.kind(target).is_valid_subexpression() {
        lxr.raise_error_at("Invalid subexpression being used as a switch target.", pos, line);
        return None;
    }

    if lxr.current().ty != TokenType::LBrace {
        lxr.raise_error("Expected beginning of switch body.");
        return None;
    }

    lxr.advance(1);
    let mut cases: Vec<NodeId> = Vec::new();
    let mut default = None;

    while lxr.current().ty != TokenType::RBrace {
        match lxr.current().ty {
            TokenType::KwCase | TokenType::KwFallthrough => {
                if default.is_some() {
                    lxr.raise_error("Case definition after \"default\".");
                    return None;
                }

                let case_pos = lxr.current().pos;
                let case_line = lxr.current().line;
                let new_case = parse_case(parser, lxr)?;

                let (new_ty, new_value) = case_literal(parser, new_case);
                for existing in &cases {
                    let (ty, value) = case_literal(parser, *existing);
                    if ty == new_ty && value == new_value {
                        lxr.raise_error_at(
                            "Case pertains to the same value as a previous one.",
                            case_pos,
                            case_line,
                        );
                        return None;
                    }
                }

                cases.push(new_case);
            }
            TokenType::KwDefault => {
                if default.is_some() {
                    lxr.raise_error("Multiple definitions of default case.");
                    return None;
                }

                default = Some(parse_default(parser, lxr)?);
            }
            _ => {
                lxr.raise_error("Unexpected token in switch body.");
                return None;
            }
        }
    }

    let default = match default {
        Some(default) => default,
        None => {
            lxr.raise_error(
                "Unexpected end of switch body: all switches must contain a default case.",
            );
            return None;
        }
    };

    lxr.advance(1);
    let node = parser.ast.alloc(
        AstKind::Switch {
            target,
            cases: cases.clone(),
            default,
        },
        pos,
        line,
        &file,
    );

    parser.ast.set_parent(target, node);
    parser.ast.set_parent(default, node);
    for case in &cases {
        parser.ast.set_parent(*case, node);
    }

    Some(node)
}

fn case_literal(parser: &Parser, case: NodeId) -> (TokenType, String) {
    let value = match parser.ast.kind(case) {
        AstKind::Case { value, .. } => *value,
        _ => unreachable!("switch stores case nodes"),
    };

    match parser.ast.kind(value) {
        AstKind::SingletonLiteral {
            literal_type,
            value,
        } => (*literal_type, value.clone()),
        _ => unreachable!("case values are literals"),
    }
}

pub fn parse_ret(parser: &mut Parser, lxr: &mut Lexer) -> Option<NodeId> {
    assert!(lxr.current().ty == TokenType::KwRet);

    let pos = lxr.current().pos;
    let line = lxr.current().line;
    let file = lxr.file.clone();

    lxr.advance(1);
    if matches!(lxr.current().ty, TokenType::Semicolon | TokenType::Comma) {
        return Some(parser.ast.alloc(AstKind::Ret { value: None }, pos, line, &file));
    }

    let value = parse(parser, lxr, true, false)?;
    if !parser.ast.kind(value).is_valid_subexpression() {
        lxr.raise_error("Invalid expression after return statement.");
        return None;
    }

    let node = parser
        .ast
        .alloc(AstKind::Ret { value: Some(value) }, pos, line, &file);
    parser.ast.set_parent(value, node);
    Some(node)
}

pub fn parse_while(parser: &mut Parser, lxr: &mut Lexer) -> Option<NodeId> {
    assert!(lxr.current().ty == TokenType::KwWhile);

    lxr.advance(1);
    parser.tbl.push_scope();

    let pos = lxr.current().pos;
    let line = lxr.current().line;
    let file = lxr.file.clone();

    let result = (|| {
        let condition = parse(parser, lxr, true, false)?;
        if !parser.ast.kind(condition).is_valid_subexpression() {
            lxr.raise_error_at("Invalid \"while\" condition.", pos, line);
            return None;
        }

        if lxr.current().ty != TokenType::LBrace {
            lxr.raise_error("Expected '{' (start of loop body).");
            return None;
        }

        lxr.advance(1);
        let mut body = Vec::new();
        while lxr.current().ty != TokenType::RBrace {
            body.push(parse(parser, lxr, false, false)?);
        }

        lxr.advance(1);
        Some((condition, body))
    })();

    parser.tbl.pop_scope();
    let (condition, body) = result?;

    let node = parser.ast.alloc(
        AstKind::While {
            condition,
            body: body.clone(),
        },
        pos,
        line,
        &file,
    );

    parser.ast.set_parent(condition, node);
    for child in &body {
        parser.ast.set_parent(*child, node);
    }

    Some(node)
}

pub fn parse_dowhile(parser: &mut Parser, lxr: &mut Lexer) -> Option<NodeId> {
    assert!(lxr.current().ty == TokenType::KwDo);

    let pos = lxr.current().pos;
    let line = lxr.current().line;
    let file = lxr.file.clone();

    if lxr.peek(1).ty != TokenType::LBrace {
        lxr.raise_error("Expected '{' after \"do\" (start of do-while body).");
        return None;
    }

    lxr.advance(2);
    parser.tbl.push_scope();

    let result = (|| {
        let mut body = Vec::new();
        while lxr.current().ty != TokenType::RBrace {
            body.push(parse(parser, lxr, false, false)?);
        }

        if lxr.peek(1).ty != TokenType::KwWhile {
            lxr.raise_error("Expected \"while\" keyword after \"do\" block.");
            return None;
        }

        lxr.advance(2);
        let cond_pos = lxr.current().pos;
        let cond_line = lxr.current().line;
        let condition = parse(parser, lxr, true, false)?;

        if !parser.ast.kind(condition).is_valid_subexpression() {
            lxr.raise_error_at("Invalid expression used as while condition.", cond_pos, cond_line);
            return None;
        }

        Some((condition, body))
    })();

    parser.tbl.pop_scope();
    let (condition, body) = result?;

    let node = parser.ast.alloc(
        AstKind::DoWhile {
            condition,
            body: body.clone(),
        },
        pos,
        line,
        &file,
    );

    parser.ast.set_parent(condition, node);
    for child in &body {
        parser.ast.set_parent(*child, node);
    }

    Some(node)
}

pub fn parse_for(parser: &mut Parser, lxr: &mut Lexer) -> Option<NodeId> {
    assert!(lxr.current().ty == TokenType::KwFor);

    lxr.advance(1);
    parser.tbl.push_scope();

    let pos = lxr.current().pos;
    let line = lxr.current().line;
    let file = lxr.file.clone();

    let result = (|| {
        let mut init = None;
        let mut condition = None;
        let mut update = None;

        // Initialization clause.
        if matches!(lxr.current().ty, TokenType::Semicolon | TokenType::Comma) {
            lxr.advance(1);
        } else {
            let clause_pos = lxr.current().pos;
            let clause_line = lxr.current().line;
            let clause = parse(parser, lxr, true, false)?;

            if !parser.ast.kind(clause).is_valid_subexpression()
                && !matches!(parser.ast.kind(clause), AstKind::Vardecl { .. })
            {
                lxr.raise_error_at(
                    "Invalid subexpression used as part of for-loop initialization.",
                    clause_pos,
                    clause_line,
                );
                return None;
            }

            if !matches!(lxr.current().ty, TokenType::Semicolon | TokenType::Comma) {
                lxr.raise_error("Expected ';' or ','.");
                return None;
            }

            lxr.advance(1);
            init = Some(clause);
        }

        // Condition clause.
        if matches!(lxr.current().ty, TokenType::Semicolon | TokenType::Comma) {
            lxr.advance(1);
        } else {
            let clause_pos = lxr.current().pos;
            let clause_line = lxr.current().line;
            let clause = parse(parser, lxr, true, false)?;

            if !parser.ast.kind(clause).is_valid_subexpression() {
                lxr.raise_error_at(
                    "Invalid subexpression used as part of for-loop condition.",
                    clause_pos,
                    clause_line,
                );
                return None;
            }

            if !matches!(lxr.current().ty, TokenType::Semicolon | TokenType::Comma) {
                lxr.raise_error("Expected ';' or ','.");
                return None;
            }

            lxr.advance(1);
            condition = Some(clause);
        }

        // Update clause.
        if lxr.current().ty != TokenType::LBrace {
            let clause_pos = lxr.current().pos;
            let clause_line = lxr.current().line;
            let clause = parse(parser, lxr, true, false)?;

            if !parser.ast.kind(clause).is_valid_subexpression() {
                lxr.raise_error_at(
                    "Invalid subexpression used as part of for-loop update.",
                    clause_pos,
                    clause_line,
                );
                return None;
            }

            if lxr.current().ty != TokenType::LBrace {
                lxr.raise_error("Expected '{' (start of loop body).");
                return None;
            }

            update = Some(clause);
        }

        lxr.advance(1);
        let mut body = Vec::new();
        while lxr.current().ty != TokenType::RBrace {
            body.push(parse(parser, lxr, false, false)?);
        }

        lxr.advance(1);
        Some((init, condition, update, body))
    })();

    parser.tbl.pop_scope();
    let (init, condition, update, body) = result?;

    let node = parser.ast.alloc(
        AstKind::For {
            init,
            condition,
            update,
            body: body.clone(),
        },
        pos,
        line,
        &file,
    );

    for clause in [init, condition, update].into_iter().flatten() {
        parser.ast.set_parent(clause, node);
    }
    for child in &body {
        parser.ast.set_parent(*child, node);
    }

    Some(node)
}

/// `block { ... }`: a plain nested scope.
pub fn parse_block(parser: &mut Parser, lxr: &mut Lexer) -> Option<NodeId> {
    assert!(lxr.current().ty == TokenType::KwBlk);

    let pos = lxr.current().pos;
    let line = lxr.current().line;
    let file = lxr.file.clone();

    if lxr.peek(1).ty != TokenType::LBrace {
        lxr.raise_error("Expected '{' after \"block\" keyword (start of scope block).");
        return None;
    }

    parser.tbl.push_scope();
    lxr.advance(2);

    let result = (|| {
        let mut children = Vec::new();
        while lxr.current().ty != TokenType::RBrace {
            children.push(parse(parser, lxr, false, false)?);
        }

        lxr.advance(1);
        Some(children)
    })();

    parser.tbl.pop_scope();
    let children = result?;

    let node = parser
        .ast
        .alloc(AstKind::Block { children: children.clone() }, pos, line, &file);
    for child in &children {
        parser.ast.set_parent(*child, node);
    }

    Some(node)
}

pub fn parse_defer(parser: &mut Parser, lxr: &mut Lexer) -> Option<NodeId> {
    assert!(lxr.current().ty == TokenType::KwDefer);

    let pos = lxr.current().pos;
    let line = lxr.current().line;
    let file = lxr.file.clone();

    lxr.advance(1);
    let call = parse(parser, lxr, true, false)?;

    if !matches!(parser.ast.kind(call), AstKind::Call { .. }) {
        lxr.raise_error_at(
            "Expression following \"defer\" statement must be a procedure call.",
            pos,
            line,
        );
        return None;
    }

    let node = parser.ast.alloc(AstKind::Defer { call }, pos, line, &file);
    parser.ast.set_parent(call, node);
    Some(node)
}

pub fn parse_defer_if(parser: &mut Parser, lxr: &mut Lexer) -> Option<NodeId> {
    assert!(lxr.current().ty == TokenType::KwDeferIf);
    lxr.advance(1);

    let pos = lxr.current().pos;
    let line = lxr.current().line;
    let file = lxr.file.clone();

    let condition = parse(parser, lxr, true, false)?;
    if !parser.ast.kind(condition).is_valid_subexpression() {
        lxr.raise_error_at("Invalid subexpression used as defer_if condition.", pos, line);
        return None;
    }

    if !matches!(lxr.current().ty, TokenType::Comma | TokenType::Semicolon) {
        lxr.raise_error("Expected end of expression.");
        return None;
    }

    lxr.advance(1);
    let call = parse(parser, lxr, true, false)?;

    if !matches!(parser.ast.kind(call), AstKind::Call { .. }) {
        lxr.raise_error_at(
            "defer_if statement does not have a valid procedure call following its condition.",
            pos,
            line,
        );
        return None;
    }

    let node = parser
        .ast
        .alloc(AstKind::DeferIf { condition, call }, pos, line, &file);
    parser.ast.set_parent(condition, node);
    parser.ast.set_parent(call, node);
    Some(node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse_ok, parse_source};

    #[test]
    fn branch_with_else() {
        let parser = parse_ok(
            "main :: proc(x: i32) -> i32 { if x > 0 { ret 1; } else { ret 2; } }",
        );
        assert_eq!(parser.tbl.scope_depth(), 1);
    }

    #[test]
    fn braceless_single_statement_arm() {
        let parser = parse_ok("main :: proc(x: i32) -> i32 { if x > 0 ret 1; ret 2; }");
        assert_eq!(parser.tbl.scope_depth(), 1);
    }

    #[test]
    fn for_loop_clauses_may_be_elided() {
        parse_ok("main :: proc() -> void { for ;; { brk; } }");
        parse_ok("main :: proc() -> void { for i := 0; i < 3; ++i { cont; } }");
    }

    #[test]
    fn switch_requires_default() {
        let (_, errs) = parse_source(
            "main :: proc(x: i32) -> void { switch x { case 1 {} } }",
        );
        assert!(errs.failed());
    }

    #[test]
    fn switch_duplicate_case_is_rejected() {
        let (_, errs) = parse_source(
            "main :: proc(x: i32) -> void { switch x { case 1 {} case 1 {} default {} } }",
        );
        assert!(errs.failed());
        let duplicate = errs
            .diagnostics()
            .iter()
            .any(|d| d.message.contains("same value as a previous one"));
        assert!(duplicate);
    }

    #[test]
    fn switch_case_after_default_is_rejected() {
        let (_, errs) = parse_source(
            "main :: proc(x: i32) -> void { switch x { default {} case 1 {} } }",
        );
        assert!(errs.failed());
    }

    #[test]
    fn fallthrough_case_is_marked() {
        let parser = parse_ok(
            "main :: proc(x: i32) -> void { switch x { fallthrough 1 {} case 2 {} default {} } }",
        );

        let mut found = false;
        for decl in &parser.toplevel_decls {
            if let AstKind::Procdecl { children, .. } = parser.ast.kind(*decl) {
                if let AstKind::Switch { cases, .. } = parser.ast.kind(children[0]) {
                    if let AstKind::Case { fallthrough, .. } = parser.ast.kind(cases[0]) {
                        found = *fallthrough;
                    }
                }
            }
        }
        assert!(found);
    }

    #[test]
    fn defer_requires_a_call() {
        let (_, errs) = parse_source("main :: proc() -> void { defer 5; }");
        assert!(errs.failed());
    }

    #[test]
    fn defer_if_carries_condition_and_call() {
        let parser = parse_ok(
            "cleanup :: proc() -> void { ret; }\n\
             main :: proc(x: i32) -> void { defer_if x > 0, cleanup(); }",
        );
        assert_eq!(parser.tbl.scope_depth(), 1);
    }

    #[test]
    fn dowhile_condition_follows_body() {
        parse_ok("main :: proc() -> void { i : i32 = 0; do { ++i; } while i < 10; }");
    }

    #[test]
    fn block_introduces_scope() {
        let parser = parse_ok(
            "main :: proc() -> void { x : i32 = 1; block { x : i32 = 2; } }",
        );
        assert_eq!(parser.tbl.scope_depth(), 1);
    }
}
