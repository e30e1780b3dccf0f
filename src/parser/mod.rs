//! Recursive-descent parser. The central [`parse`] dispatcher hands off to
//! the focused submodules and owns the expression continuation protocol:
//! postfix chaining (`(...)`, `[...]`, `.name`), precedence-climbing binary
//! continuation, the parenthesized-expression counter, and statement
//! terminators.

pub mod ctrlflow;
pub mod decl;
pub mod def;
pub mod directive;
pub mod expr;
pub mod ty;

use crate::ast::{Ast, AstKind, NodeId};
use crate::entity::{EntityTable, INVALID_SYMBOL_INDEX};
use crate::lexer::Lexer;
use crate::token::{TokenKind, TokenType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncludeState {
    Pending,
    Done,
}

#[derive(Debug, Clone)]
pub struct IncludedFile {
    pub path: String,
    pub state: IncludeState,
}

/// Parser state shared across every source file of a compilation.
pub struct Parser {
    pub tbl: EntityTable,
    pub ast: Ast,
    pub toplevel_decls: Vec<NodeId>,
    pub inside_parens: u16,
    pub included_files: Vec<IncludedFile>,
    /// Cast and sizeof nodes whose embedded types the post-parser must
    /// revisit for generic instantiation.
    pub extra_generic_nodes: Vec<NodeId>,
    /// Generic parameter names in effect while a generic struct definition
    /// is being parsed.
    pub active_generic_params: Vec<String>,
}

impl Parser {
    pub fn new() -> Self {
        Self {
            tbl: EntityTable::new(),
            ast: Ast::new(),
            toplevel_decls: Vec::new(),
            inside_parens: 0,
            included_files: Vec::new(),
            extra_generic_nodes: Vec::new(),
            active_generic_params: Vec::new(),
        }
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

/// Parses every top-level form of one source file into the shared tables.
/// Returns false when a hard syntax error stopped the file early.
pub fn parse_file(parser: &mut Parser, lxr: &mut Lexer) -> bool {
    while lxr.current().ty != TokenType::EndOfFile {
        let pos = lxr.current().pos;
        let line = lxr.current().line;

        let node = match parse(parser, lxr, false, false) {
            Some(node) => node,
            None => return false,
        };

        if !parser.ast.kind(node).is_valid_at_toplevel() {
            lxr.raise_error_at("Expression is invalid at file scope.", pos, line);
            return false;
        }

        parser.toplevel_decls.push(node);
    }

    true
}

/// The expression/statement workhorse. `subexpression` suppresses the
/// terminator requirement; `parse_single` suppresses binary continuations
/// so that unary operators bind only their immediate operand.
pub fn parse(
    parser: &mut Parser,
    lxr: &mut Lexer,
    subexpression: bool,
    parse_single: bool,
) -> Option<NodeId> {
    let mut expr = parse_primary(parser, lxr)?;

    if parser.ast.kind(expr).never_needs_terminator() {
        return Some(expr);
    }

    if parser.ast.kind(expr).is_valid_subexpression() {
        expr = parse_postfix(parser, lxr, expr)?;

        while !parse_single
            && lxr.current().kind == TokenKind::BinaryOp
            && parser.ast.kind(expr).is_valid_subexpression()
        {
            expr = expr::parse_binary_expression(expr, parser, lxr)?;
        }
    }

    // Leaving a parenthesized expression or call argument list.
    if lxr.current().ty == TokenType::RParen {
        if parser.inside_parens == 0 {
            lxr.raise_error("Unexpected token.");
            return None;
        }

        parser.inside_parens -= 1;
        lxr.advance(1);
        return Some(expr);
    }

    if subexpression {
        return Some(expr);
    }

    if matches!(lxr.current().ty, TokenType::Semicolon | TokenType::Comma) {
        if parser.inside_parens != 0 {
            lxr.raise_error("Unexpected token inside of parenthesized expression.");
            return None;
        }

        lxr.advance(1);
        return Some(expr);
    }

    lxr.raise_error("Unexpected token following expression.");
    None
}

fn parse_primary(parser: &mut Parser, lxr: &mut Lexer) -> Option<NodeId> {
    let curr = lxr.current();

    match curr.ty {
        TokenType::EndOfFile => {
            lxr.raise_error("Unexpected end of file.");
            None
        }
        TokenType::Identifier | TokenType::NamespaceAccess => parse_identifier(parser, lxr),
        TokenType::LParen => expr::parse_parenthesized_expression(parser, lxr),
        TokenType::LBrace => expr::parse_braced_expression(parser, lxr),
        TokenType::At => directive::parse_compiler_directive(parser, lxr),
        _ if curr.kind == TokenKind::Literal => expr::parse_singleton_literal(parser, lxr),
        _ if curr.kind == TokenKind::Keyword => parse_keyword(parser, lxr),
        _ if curr.is_valid_unary_operator() => expr::parse_unary_expression(parser, lxr),
        _ => {
            lxr.raise_error("Invalid token at the beginning of an expression.");
            None
        }
    }
}

/// Postfix continuations bind tightest: calls, subscripts and member
/// accesses chain freely after a primary.
fn parse_postfix(parser: &mut Parser, lxr: &mut Lexer, mut expr: NodeId) -> Option<NodeId> {
    loop {
        match lxr.current().ty {
            TokenType::LParen => expr = expr::parse_call(expr, parser, lxr)?,
            TokenType::Dot => expr = expr::parse_member_access(expr, parser, lxr)?,
            TokenType::LSquare => expr = expr::parse_subscript(expr, parser, lxr)?,
            _ => return Some(expr),
        }
    }
}

pub fn parse_keyword(parser: &mut Parser, lxr: &mut Lexer) -> Option<NodeId> {
    match lxr.current().ty {
        TokenType::KwRet => ctrlflow::parse_ret(parser, lxr),
        TokenType::KwIf => ctrlflow::parse_branch(parser, lxr),
        TokenType::KwSwitch => ctrlflow::parse_switch(parser, lxr),
        TokenType::KwWhile => ctrlflow::parse_while(parser, lxr),
        TokenType::KwDo => ctrlflow::parse_dowhile(parser, lxr),
        TokenType::KwFor => ctrlflow::parse_for(parser, lxr),
        TokenType::KwBrk => ctrlflow::parse_brk(parser, lxr),
        TokenType::KwCont => ctrlflow::parse_cont(parser, lxr),
        TokenType::KwBlk => ctrlflow::parse_block(parser, lxr),
        TokenType::KwDefer => ctrlflow::parse_defer(parser, lxr),
        TokenType::KwDeferIf => ctrlflow::parse_defer_if(parser, lxr),
        TokenType::KwStruct => def::parse_structdef(parser, lxr),
        TokenType::KwEnum => def::parse_enumdef(parser, lxr),
        TokenType::KwNamespace => def::parse_namespace(parser, lxr),
        TokenType::KwCast => expr::parse_cast(parser, lxr),
        TokenType::KwSizeof => expr::parse_sizeof(parser, lxr),
        TokenType::KwNullptr => expr::parse_nullptr(parser, lxr),
        _ => {
            lxr.raise_error("This keyword is not allowed here.");
            None
        }
    }
}

/// Reads `[\]ident(\ident)*` and returns the joined name. A leading `\`
/// marks the name as absolute (resolved from the root namespace).
pub fn get_namespaced_identifier(lxr: &mut Lexer) -> Option<String> {
    let mut full_name = String::new();

    if lxr.current().ty == TokenType::NamespaceAccess {
        full_name.push('\\');
        lxr.advance(1);
        if lxr.current().ty != TokenType::Identifier {
            lxr.raise_error("Expected identifier after '\\'.");
            return None;
        }
    }

    assert!(lxr.current().ty == TokenType::Identifier);
    full_name.push_str(lxr.current().value);

    while lxr.peek(1).ty == TokenType::NamespaceAccess {
        lxr.advance(2);
        if lxr.current().ty != TokenType::Identifier {
            lxr.raise_error("Expected namespace identifier.");
            return None;
        }

        full_name.push('\\');
        full_name.push_str(lxr.current().value);
    }

    Some(full_name)
}

/// An identifier at expression position: either the start of a declaration
/// (`name :` / `name ::`) or a reference to an existing symbol. Unknown
/// namespace-qualified references create a global placeholder symbol that a
/// later declaration overwrites.
pub fn parse_identifier(parser: &mut Parser, lxr: &mut Lexer) -> Option<NodeId> {
    if lxr.current().ty == TokenType::Identifier
        && matches!(
            lxr.peek(1).ty,
            TokenType::TypeAssignment | TokenType::ConstTypeAssignment
        )
    {
        return decl::parse_decl(parser, lxr);
    }

    let pos = lxr.current().pos;
    let line = lxr.current().line;
    let name = get_namespaced_identifier(lxr)?;
    let file = lxr.file.clone();

    let canonical = parser.tbl.get_canonical_sym_name(&name);
    let mut sym_index = parser.tbl.lookup_scoped_symbol(&canonical);

    if sym_index == INVALID_SYMBOL_INDEX {
        let bare = name.trim_start_matches('\\');
        if bare.contains('\\') {
            // Forward reference to a namespaced symbol. The declaration that
            // replaces the placeholder is checked for existence later.
            sym_index = create_placeholder(parser, bare, &file, pos, line);
        } else {
            lxr.raise_error_at(
                format!("Symbol \"{}\" does not exist in this scope.", name),
                pos,
                line,
            );
            return None;
        }
    }

    lxr.advance(1);
    let node = parser.ast.alloc(
        AstKind::Identifier {
            symbol_index: sym_index,
        },
        pos,
        line,
        &file,
    );

    Some(node)
}

fn create_placeholder(parser: &mut Parser, name: &str, file: &str, pos: usize, line: u32) -> u32 {
    // Placeholders live in the global scope so that the eventual global
    // declaration finds and overwrites them.
    parser.tbl.create_global_placeholder(name, file, pos, line)
}

/// Test support: parses a string through the full parser and returns the
/// parser state plus any diagnostics.
#[cfg(test)]
pub fn parse_source(source: &str) -> (Parser, crate::error::ErrorSink) {
    let mut parser = Parser::new();
    let mut lxr = Lexer::new(source, "test.tak", false);
    parse_file(&mut parser, &mut lxr);
    (parser, std::mem::take(&mut lxr.errs))
}

#[cfg(test)]
pub fn parse_ok(source: &str) -> Parser {
    let (parser, errs) = parse_source(source);
    assert!(!errs.failed(), "unexpected diagnostics: {:?}", errs);
    parser
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::AstKind;
    use crate::entity::EntityFlags;
    use crate::types::TypeFlags;

    #[test]
    fn toplevel_vardecl() {
        let parser = parse_ok("x : i32 = 5;");
        assert_eq!(parser.toplevel_decls.len(), 1);
        assert!(matches!(
            parser.ast.kind(parser.toplevel_decls[0]),
            AstKind::Vardecl { .. }
        ));

        let index = parser.tbl.lookup_scoped_symbol("x");
        let sym = parser.tbl.lookup_symbol(index).unwrap();
        assert!(sym.flags.contains(EntityFlags::GLOBAL));
    }

    #[test]
    fn inferred_decl_sets_flags() {
        let parser = parse_ok("x := 300;");
        let index = parser.tbl.lookup_scoped_symbol("x");
        let sym = parser.tbl.lookup_symbol(index).unwrap();
        assert!(sym.ty.flags.contains(TypeFlags::INFERRED));
    }

    #[test]
    fn const_inferred_decl_is_constant() {
        let parser = parse_ok("x ::= 300;");
        let index = parser.tbl.lookup_scoped_symbol("x");
        let sym = parser.tbl.lookup_symbol(index).unwrap();
        assert!(sym.ty.flags.contains(TypeFlags::CONSTANT));
        assert!(sym.ty.flags.contains(TypeFlags::INFERRED));
    }

    #[test]
    fn unknown_identifier_is_an_error() {
        let (_, errs) = parse_source("main :: proc() -> void { y = 1; }");
        assert!(errs.failed());
    }

    #[test]
    fn scope_depth_is_balanced_after_procdecl() {
        let parser = parse_ok("main :: proc() -> i32 { x : i32 = 0; ret x; }");
        assert_eq!(parser.tbl.scope_depth(), 1);
    }

    #[test]
    fn namespaced_forward_reference_creates_placeholder() {
        let parser = parse_ok(
            "main :: proc() -> void { util\\helper(); }\n\
             namespace util { helper :: proc() -> void { ret; } }",
        );

        let index = parser.tbl.lookup_scoped_symbol("util\\helper");
        let sym = parser.tbl.lookup_symbol(index).unwrap();
        assert!(!sym.flags.contains(EntityFlags::PLACEHOLDER));
    }

    #[test]
    fn symbol_indices_are_dense_across_nodes() {
        let parser = parse_ok("a : i32 = 1;\nb : i32 = 2;\nmain :: proc() -> void { ret; }");
        let max = parser.tbl.max_symbol_index();
        for index in 1..=max {
            assert!(parser.tbl.lookup_symbol(index).is_some());
        }
    }
}
