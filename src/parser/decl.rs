//! Declaration parsing: `name : T`, `name :: T`, inferred `name := e`,
//! procedure declarations (with generic headers), procedure pointers,
//! user-type declarations and procedure parameters.

use super::{parse, ty::parse_type, Parser};
use crate::ast::{AstKind, NodeId};
use crate::entity::{EntityFlags, INVALID_SYMBOL_INDEX};
use crate::lexer::Lexer;
use crate::token::{TokenKind, TokenType};
use crate::types::{TypeData, TypeFlags, TypeKind, TypeName};

/// Creates the declared symbol, or repurposes an existing placeholder left
/// behind by a forward reference.
#[allow(clippy::too_many_arguments)]
fn resolve_decl_symbol(
    parser: &mut Parser,
    replace: u32,
    name: &str,
    file: &str,
    pos: usize,
    line: u32,
    kind: TypeKind,
    type_flags: TypeFlags,
    sym_flags: EntityFlags,
) -> u32 {
    if replace != INVALID_SYMBOL_INDEX {
        let sym = parser
            .tbl
            .lookup_symbol_mut(replace)
            .expect("placeholder index is valid");

        sym.ty.kind = kind;
        sym.ty.flags = type_flags;
        sym.flags = sym_flags;
        sym.file = file.to_string();
        sym.pos = pos;
        sym.line = line;
        return replace;
    }

    let mut ty = TypeData {
        flags: type_flags,
        ..Default::default()
    };
    ty.kind = kind;

    parser
        .tbl
        .create_symbol(name, file, pos, line, kind, sym_flags, Some(ty))
}

/// Entry point for `identifier :` / `identifier ::` forms.
pub fn parse_decl(parser: &mut Parser, lxr: &mut Lexer) -> Option<NodeId> {
    assert!(lxr.current().ty == TokenType::Identifier);

    let raw_name = lxr.current().value.to_string();
    let name = parser.tbl.qualified_name(&raw_name);
    let pos = lxr.current().pos;
    let line = lxr.current().line;
    let file = lxr.file.clone();

    let mut type_flags = TypeFlags::empty();
    let mut sym_flags = EntityFlags::empty();
    let mut replace = INVALID_SYMBOL_INDEX;

    if parser.tbl.namespace_exists(&raw_name) {
        lxr.raise_error("Declaration has the same name as a namespace.");
        return None;
    }

    lxr.advance(1);
    if lxr.current().ty == TokenType::ConstTypeAssignment {
        type_flags.insert(TypeFlags::CONSTANT);
    } else if lxr.current().ty != TokenType::TypeAssignment {
        lxr.raise_error("Expected type assignment.");
        return None;
    }

    if parser.tbl.at_global_scope() {
        sym_flags.insert(EntityFlags::GLOBAL);
    }

    if parser.tbl.scoped_symbol_exists_at_current_scope(&name) {
        let index = parser.tbl.lookup_scoped_symbol(&name);
        let sym = parser
            .tbl
            .lookup_symbol(index)
            .expect("scoped index is valid");

        if sym.flags.contains(EntityFlags::PLACEHOLDER) {
            replace = index;
        } else {
            lxr.raise_error_at("Redeclaration: symbol already exists at this scope.", pos, line);
            return None;
        }
    }

    lxr.advance(1);

    // `name := e` / `name ::= e`: inference.
    if lxr.current().ty == TokenType::ValueAssignment {
        let index = resolve_decl_symbol(
            parser,
            replace,
            &name,
            &file,
            pos,
            line,
            TypeKind::None,
            type_flags | TypeFlags::INFERRED | TypeFlags::UNINITIALIZED,
            sym_flags,
        );

        return parse_inferred_decl(index, parser, lxr);
    }

    if lxr.current().kind != TokenKind::TypeIdent && !lxr.current().ty.is_ident_start() {
        lxr.raise_error("Expected type identifier here.");
        return None;
    }

    // Procedure (declaration or pointer).
    if lxr.current().ty == TokenType::KwProc {
        let index = resolve_decl_symbol(
            parser,
            replace,
            &name,
            &file,
            pos,
            line,
            TypeKind::Procedure,
            type_flags,
            sym_flags,
        );

        if lxr.peek(1).ty == TokenType::XorOrPtr {
            let sym = parser.tbl.lookup_symbol_mut(index).expect("index is valid");
            sym.ty.flags.insert(TypeFlags::POINTER | TypeFlags::UNINITIALIZED);
            return parse_proc_ptr(index, parser, lxr);
        }

        return parse_procdecl(index, parser, lxr);
    }

    // User type (struct or alias).
    if lxr.current().ty.is_ident_start() {
        let index = resolve_decl_symbol(
            parser,
            replace,
            &name,
            &file,
            pos,
            line,
            TypeKind::None,
            type_flags | TypeFlags::UNINITIALIZED,
            sym_flags,
        );

        return parse_usertype_decl(index, parser, lxr);
    }

    // Primitive variable.
    let index = resolve_decl_symbol(
        parser,
        replace,
        &name,
        &file,
        pos,
        line,
        TypeKind::Primitive,
        type_flags | TypeFlags::UNINITIALIZED,
        sym_flags,
    );

    parse_vardecl(index, parser, lxr)
}

fn make_vardecl_node(parser: &mut Parser, sym_index: u32, lxr: &Lexer) -> (NodeId, NodeId) {
    let pos = lxr.current().pos;
    let line = lxr.current().line;
    let file = lxr.file.clone();

    let identifier = parser.ast.alloc(
        AstKind::Identifier {
            symbol_index: sym_index,
        },
        pos,
        line,
        &file,
    );

    let node = parser.ast.alloc(
        AstKind::Vardecl {
            identifier,
            init_value: None,
        },
        pos,
        line,
        &file,
    );

    parser.ast.set_parent(identifier, node);
    (node, identifier)
}

fn attach_initializer(
    parser: &mut Parser,
    lxr: &mut Lexer,
    node: NodeId,
    sym_index: u32,
) -> Option<NodeId> {
    if lxr.current().ty == TokenType::ValueAssignment {
        let pos = lxr.current().pos;
        let line = lxr.current().line;

        lxr.advance(1);
        let init = parse(parser, lxr, true, false)?;
        if !parser.ast.kind(init).is_valid_subexpression() {
            lxr.raise_error_at("Invalid expression being assigned to variable.", pos, line);
            return None;
        }

        parser.ast.set_parent(init, node);
        if let AstKind::Vardecl { init_value, .. } = parser.ast.kind_mut(node) {
            *init_value = Some(init);
        }

        return Some(node);
    }

    let sym = parser
        .tbl
        .lookup_symbol_mut(sym_index)
        .expect("declared symbol exists");

    if sym.flags.contains(EntityFlags::GLOBAL) {
        sym.ty.flags.remove(TypeFlags::UNINITIALIZED);
    }

    sym.ty.flags.insert(TypeFlags::DEFAULT_INIT);
    Some(node)
}

pub fn parse_vardecl(sym_index: u32, parser: &mut Parser, lxr: &mut Lexer) -> Option<NodeId> {
    assert!(lxr.current().kind == TokenKind::TypeIdent);

    let ty = parse_type(parser, lxr)?;
    overwrite_symbol_type(parser, sym_index, ty);

    let (node, _) = make_vardecl_node(parser, sym_index, lxr);
    attach_initializer(parser, lxr, node, sym_index)
}

pub fn parse_usertype_decl(sym_index: u32, parser: &mut Parser, lxr: &mut Lexer) -> Option<NodeId> {
    assert!(lxr.current().ty.is_ident_start());

    let ty = parse_type(parser, lxr)?;
    overwrite_symbol_type(parser, sym_index, ty);

    let (node, _) = make_vardecl_node(parser, sym_index, lxr);
    attach_initializer(parser, lxr, node, sym_index)
}

/// `name : proc^(...) -> T [= expr];`
pub fn parse_proc_ptr(sym_index: u32, parser: &mut Parser, lxr: &mut Lexer) -> Option<NodeId> {
    assert!(lxr.current().ty == TokenType::KwProc);
    assert!(lxr.peek(1).ty == TokenType::XorOrPtr);

    let ty = parse_type(parser, lxr)?;
    overwrite_symbol_type(parser, sym_index, ty);

    let (node, _) = make_vardecl_node(parser, sym_index, lxr);
    attach_initializer(parser, lxr, node, sym_index)
}

/// Replaces the symbol's provisional type with the parsed one, preserving
/// the flags established by the declaration head (const, uninit).
fn overwrite_symbol_type(parser: &mut Parser, sym_index: u32, ty: TypeData) {
    let sym = parser
        .tbl
        .lookup_symbol_mut(sym_index)
        .expect("declared symbol exists");

    let kept = sym.ty.flags;
    sym.ty = ty;
    sym.ty.flags.insert(kept);
    sym.ty.sym_ref = sym_index;
}

pub fn parse_inferred_decl(sym_index: u32, parser: &mut Parser, lxr: &mut Lexer) -> Option<NodeId> {
    assert!(lxr.current().ty == TokenType::ValueAssignment);

    let pos = lxr.current().pos;
    let line = lxr.current().line;
    let (node, _) = make_vardecl_node(parser, sym_index, lxr);

    lxr.advance(1);
    let init = parse(parser, lxr, true, false)?;

    if !parser.ast.kind(init).is_valid_subexpression() {
        let sym_name = parser
            .tbl
            .lookup_symbol(sym_index)
            .map(|s| s.name.clone())
            .unwrap_or_default();
        lxr.raise_error_at(
            format!(
                "Invalid subexpression being assigned to variable \"{}\".",
                sym_name
            ),
            pos,
            line,
        );
        return None;
    }

    parser.ast.set_parent(init, node);
    if let AstKind::Vardecl { init_value, .. } = parser.ast.kind_mut(node) {
        *init_value = Some(init);
    }

    let sym = parser
        .tbl
        .lookup_symbol_mut(sym_index)
        .expect("declared symbol exists");
    sym.ty.name = TypeName::None;

    Some(node)
}

/// One procedure parameter: `name : T` / `name :: T`. Naked procedures and
/// static arrays are rejected (both pass as pointers instead).
pub fn parse_parameterized_vardecl(parser: &mut Parser, lxr: &mut Lexer) -> Option<NodeId> {
    assert!(lxr.current().ty == TokenType::Identifier);

    let raw_name = lxr.current().value.to_string();
    let name = parser.tbl.qualified_name(&raw_name);
    let pos = lxr.current().pos;
    let line = lxr.current().line;
    let file = lxr.file.clone();
    let mut type_flags = TypeFlags::PROCARG;

    if parser.tbl.namespace_exists(&raw_name) {
        lxr.raise_error("Parameter has the same name as a namespace it is declared in.");
        return None;
    }

    if parser.tbl.scoped_symbol_exists_at_current_scope(&name) {
        lxr.raise_error("Symbol already exists within this scope.");
        return None;
    }

    lxr.advance(1);
    if lxr.current().ty == TokenType::ConstTypeAssignment {
        type_flags.insert(TypeFlags::CONSTANT);
    } else if lxr.current().ty != TokenType::TypeAssignment {
        lxr.raise_error("Expected type assignment.");
        return None;
    }

    lxr.advance(1);
    if lxr.current().kind != TokenKind::TypeIdent && !lxr.current().ty.is_ident_start() {
        lxr.raise_error("Expected type identifier.");
        return None;
    }

    let mut ty = parse_type(parser, lxr)?;

    if ty.kind == TypeKind::Procedure && ty.pointer_depth < 1 {
        lxr.raise_error("Procedures cannot be procedure parameters. Pass a pointer instead.");
        return None;
    }

    if !ty.array_lengths.is_empty() {
        lxr.raise_error("Arrays cannot be procedure parameters. Pass an array as a pointer instead.");
        return None;
    }

    ty.flags.insert(type_flags);
    let kind = ty.kind;
    let sym_index = parser.tbl.create_symbol(
        name,
        &file,
        pos,
        line,
        kind,
        EntityFlags::empty(),
        Some(ty),
    );

    let (node, _) = make_vardecl_node(parser, sym_index, lxr);
    Some(node)
}

/// Collects the `[T, U, ...]` generic names, then skips the parameter list
/// and body verbatim by counting parentheses and braces.
fn generic_procdecl_skip_all(sym_index: u32, parser: &mut Parser, lxr: &mut Lexer) -> bool {
    assert!(lxr.current().ty == TokenType::LSquare);
    lxr.advance(1);

    let mut names = Vec::new();
    while lxr.current().ty != TokenType::RSquare {
        if lxr.current().ty != TokenType::Identifier {
            lxr.raise_error("Expected generic identifier.");
            return false;
        }

        names.push(lxr.current().value.to_string());
        lxr.advance(1);
        if matches!(lxr.current().ty, TokenType::Semicolon | TokenType::Comma) {
            lxr.advance(1);
        }
    }

    let sym = parser
        .tbl
        .lookup_symbol_mut(sym_index)
        .expect("declared symbol exists");
    sym.generic_type_names = names;

    lxr.advance(1);
    if lxr.current().ty != TokenType::LParen {
        lxr.raise_error("Expected '('.");
        return false;
    }

    let pos = lxr.current().pos;
    let line = lxr.current().line;

    let old_paren_index = parser.inside_parens;
    parser.inside_parens += 1;
    while old_paren_index < parser.inside_parens {
        lxr.advance(1);
        match lxr.current().ty {
            TokenType::LParen => parser.inside_parens += 1,
            TokenType::RParen => parser.inside_parens -= 1,
            TokenType::EndOfFile => {
                lxr.raise_error_at("Malformed generic procedure declaration.", pos, line);
                return false;
            }
            _ => {}
        }
    }

    lxr.advance(1);
    while lxr.current().ty != TokenType::LBrace {
        if lxr.current().ty == TokenType::EndOfFile {
            lxr.raise_error_at("Malformed generic procedure declaration.", pos, line);
            return false;
        }
        lxr.advance(1);
    }

    let mut braces = 1u32;
    while braces > 0 {
        lxr.advance(1);
        match lxr.current().ty {
            TokenType::LBrace => braces += 1,
            TokenType::RBrace => braces -= 1,
            TokenType::EndOfFile => {
                lxr.raise_error_at("Malformed generic procedure declaration.", pos, line);
                return false;
            }
            _ => {}
        }
    }

    lxr.advance(1);
    true
}

fn parse_proc_signature_and_body(
    sym_index: u32,
    parser: &mut Parser,
    lxr: &mut Lexer,
) -> Option<(Vec<NodeId>, Vec<NodeId>)> {
    assert!(lxr.current().ty == TokenType::LParen);

    let mut parameters = Vec::new();
    lxr.advance(1);
    while lxr.current().ty != TokenType::RParen {
        if lxr.current().ty == TokenType::ThreeDots {
            let sym = parser
                .tbl
                .lookup_symbol_mut(sym_index)
                .expect("declared symbol exists");
            sym.ty.flags.insert(TypeFlags::PROC_VARARGS);

            lxr.advance(1);
            if lxr.current().ty != TokenType::RParen {
                lxr.raise_error("Variadic marker must be the last parameter.");
                return None;
            }
            break;
        }

        if lxr.current().ty != TokenType::Identifier {
            lxr.raise_error("Expected procedure parameter.");
            return None;
        }

        let param = parse_parameterized_vardecl(parser, lxr)?;
        parameters.push(param);

        if lxr.current().ty == TokenType::Comma {
            lxr.advance(1);
        }
    }

    // Return type. Absent arrow means void.
    lxr.advance(1);
    if lxr.current().ty == TokenType::Arrow
        && (lxr.peek(1).kind == TokenKind::TypeIdent || lxr.peek(1).ty.is_ident_start())
    {
        lxr.advance(1);
        if lxr.current().ty == TokenType::KwVoid && lxr.peek(1).ty != TokenType::XorOrPtr {
            lxr.advance(1);
        } else {
            let ret = parse_type(parser, lxr)?;
            if ret.flags.contains(TypeFlags::ARRAY) {
                lxr.raise_error("Return type cannot be a static array.");
                return None;
            }

            let sym = parser
                .tbl
                .lookup_symbol_mut(sym_index)
                .expect("declared symbol exists");
            sym.ty.return_type = Some(Box::new(ret));
        }
    }

    // Record parameter types in the procedure's own type.
    let mut param_types = Vec::new();
    for param in &parameters {
        let ident = match parser.ast.kind(*param) {
            AstKind::Vardecl { identifier, .. } => *identifier,
            _ => unreachable!("parameters are vardecls"),
        };

        let param_sym_index = parser.ast.identifier_symbol(ident);
        let param_ty = parser
            .tbl
            .lookup_symbol(param_sym_index)
            .expect("parameter symbol exists")
            .ty
            .clone();
        param_types.push(param_ty);
    }

    if !param_types.is_empty() {
        let sym = parser
            .tbl
            .lookup_symbol_mut(sym_index)
            .expect("declared symbol exists");
        sym.ty.parameters = Some(param_types);
    }

    // A decl terminated without a body is a foreign import.
    if matches!(lxr.current().ty, TokenType::Semicolon | TokenType::Comma) {
        let sym = parser
            .tbl
            .lookup_symbol_mut(sym_index)
            .expect("declared symbol exists");
        sym.flags.insert(EntityFlags::FOREIGN);

        lxr.advance(1);
        return Some((parameters, Vec::new()));
    }

    if lxr.current().ty != TokenType::LBrace {
        lxr.raise_error("Expected start of procedure body here.");
        return None;
    }

    lxr.advance(1);
    let mut children = Vec::new();
    while lxr.current().ty != TokenType::RBrace {
        let expr = parse(parser, lxr, false, false)?;
        children.push(expr);
    }

    lxr.advance(1);
    Some((parameters, children))
}

pub fn parse_procdecl(sym_index: u32, parser: &mut Parser, lxr: &mut Lexer) -> Option<NodeId> {
    assert!(lxr.current().ty == TokenType::KwProc);

    let pos = lxr.current().pos;
    let line = lxr.current().line;
    let file = lxr.file.clone();

    {
        let sym = parser.tbl.lookup_symbol(sym_index).expect("index is valid");
        if !sym.flags.contains(EntityFlags::GLOBAL) {
            lxr.raise_error("Declaration of procedure at non-global scope.");
            return None;
        }
        if !sym.ty.flags.contains(TypeFlags::CONSTANT) {
            lxr.raise_error(
                "Procedures must be declared as constant. This one was declared using ':'.",
            );
            return None;
        }
    }

    parser.tbl.push_scope();

    let identifier = parser.ast.alloc(
        AstKind::Identifier {
            symbol_index: sym_index,
        },
        pos,
        line,
        &file,
    );

    lxr.advance(1);

    // Generic header: record names and skip the body verbatim.
    if lxr.current().ty == TokenType::LSquare {
        let sym = parser
            .tbl
            .lookup_symbol_mut(sym_index)
            .expect("index is valid");
        sym.flags.insert(EntityFlags::GENERIC_BASE);

        let skipped = generic_procdecl_skip_all(sym_index, parser, lxr);
        parser.tbl.pop_scope();

        if !skipped {
            return None;
        }

        let node = parser.ast.alloc(
            AstKind::Procdecl {
                identifier,
                parameters: Vec::new(),
                children: Vec::new(),
            },
            pos,
            line,
            &file,
        );
        parser.ast.set_parent(identifier, node);
        return Some(node);
    }

    if lxr.current().ty != TokenType::LParen {
        lxr.raise_error("Expected parameter list here.");
        parser.tbl.pop_scope();
        return None;
    }

    let parsed = parse_proc_signature_and_body(sym_index, parser, lxr);
    parser.tbl.pop_scope();
    let (parameters, children) = parsed?;

    let node = parser.ast.alloc(
        AstKind::Procdecl {
            identifier,
            parameters: parameters.clone(),
            children: children.clone(),
        },
        pos,
        line,
        &file,
    );

    parser.ast.set_parent(identifier, node);
    for child in parameters.iter().chain(children.iter()) {
        parser.ast.set_parent(*child, node);
    }

    Some(node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse_ok, parse_source};

    fn symbol_of<'p>(parser: &'p Parser, name: &str) -> &'p crate::entity::Symbol {
        let index = parser.tbl.lookup_scoped_symbol(name);
        parser.tbl.lookup_symbol(index).expect("symbol exists")
    }

    #[test]
    fn proc_records_parameter_types() {
        let parser = parse_ok("add :: proc(a: i32, b: i32) -> i32 { ret a + b; }");
        let sym = symbol_of(&parser, "add");

        assert_eq!(sym.ty.kind, TypeKind::Procedure);
        let params = sym.ty.parameters.as_ref().unwrap();
        assert_eq!(params.len(), 2);
        assert!(params[0].flags.contains(TypeFlags::PROCARG));
        assert!(sym.ty.return_type.is_some());
    }

    #[test]
    fn proc_must_be_constant() {
        let (_, errs) = parse_source("bad : proc() -> void { ret; }");
        assert!(errs.failed());
    }

    #[test]
    fn bodyless_proc_is_foreign() {
        let parser = parse_ok("puts :: proc(s: i8^) -> i32;");
        let sym = symbol_of(&parser, "puts");
        assert!(sym.flags.contains(EntityFlags::FOREIGN));
    }

    #[test]
    fn variadic_signature_sets_flag() {
        let parser = parse_ok("printf :: proc(fmt: i8^, ...) -> i32;");
        let sym = symbol_of(&parser, "printf");
        assert!(sym.ty.flags.contains(TypeFlags::PROC_VARARGS));
        assert_eq!(sym.ty.parameters.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn array_parameter_is_rejected() {
        let (_, errs) = parse_source("f :: proc(a: i32[3]) -> void { ret; }");
        assert!(errs.failed());
    }

    #[test]
    fn naked_proc_parameter_is_rejected() {
        let (_, errs) = parse_source("f :: proc(cb: proc() -> void) -> void { ret; }");
        assert!(errs.failed());
    }

    #[test]
    fn generic_proc_body_is_skipped() {
        let parser = parse_ok(
            "swap :: proc[T](a: T^, b: T^) -> void { tmp := ^a; ^a = ^b; ^b = tmp; }",
        );
        let sym = symbol_of(&parser, "swap");
        assert!(sym.flags.contains(EntityFlags::GENERIC_BASE));
        assert_eq!(sym.generic_type_names, vec!["T".to_string()]);
    }

    #[test]
    fn duplicate_declaration_is_rejected() {
        let (_, errs) = parse_source("x : i32 = 1;\nx : i32 = 2;");
        assert!(errs.failed());
    }

    #[test]
    fn proc_pointer_declaration() {
        let parser = parse_ok("handler : proc^(i32) -> void;");
        let sym = symbol_of(&parser, "handler");
        assert_eq!(sym.ty.kind, TypeKind::Procedure);
        assert_eq!(sym.ty.pointer_depth, 1);
        assert!(sym.ty.flags.contains(TypeFlags::POINTER));
    }

    #[test]
    fn uninitialized_global_is_default_init() {
        let parser = parse_ok("count : u64;");
        let sym = symbol_of(&parser, "count");
        assert!(sym.ty.flags.contains(TypeFlags::DEFAULT_INIT));
        assert!(!sym.ty.flags.contains(TypeFlags::UNINITIALIZED));
    }
}
