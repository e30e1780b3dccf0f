//! Compiler directives: `@alias`, `@include`, `@intern`, `@extern ["C"]`.

use super::{parse, ty::parse_type, IncludeState, IncludedFile, Parser};
use crate::ast::{AstKind, NodeId};
use crate::entity::EntityFlags;
use crate::lexer::Lexer;
use crate::token::{TokenKind, TokenType};
use std::path::{Path, PathBuf};

pub fn parse_compiler_directive(parser: &mut Parser, lxr: &mut Lexer) -> Option<NodeId> {
    assert!(lxr.current().ty == TokenType::At);

    lxr.advance(1);
    if lxr.current().ty != TokenType::Identifier {
        lxr.raise_error("Expected directive name.");
        return None;
    }

    match lxr.current().value {
        "alias" => parse_type_alias(parser, lxr),
        "include" => parse_include(parser, lxr),
        "intern" => parse_visibility_intern(parser, lxr),
        "extern" => parse_visibility_extern(parser, lxr),
        _ => {
            lxr.raise_error("Invalid compiler directive.");
            None
        }
    }
}

/// `@alias Name = Type;`
pub fn parse_type_alias(parser: &mut Parser, lxr: &mut Lexer) -> Option<NodeId> {
    assert!(lxr.current().value == "alias");

    if !parser.tbl.at_global_scope() {
        lxr.raise_error("Type alias definition at non-global scope.");
        return None;
    }

    let pos = lxr.current().pos;
    let line = lxr.current().line;
    let file = lxr.file.clone();

    lxr.advance(1);
    if lxr.current().ty != TokenType::Identifier {
        lxr.raise_error("Expected alias name.");
        return None;
    }

    let name = parser.tbl.qualified_name(lxr.current().value);
    if parser.tbl.type_alias_exists(&name) || parser.tbl.type_exists(&name) {
        lxr.raise_error("Type or type alias with the same name already exists within this namespace.");
        return None;
    }

    if lxr.peek(1).ty != TokenType::ValueAssignment {
        lxr.raise_error("Expected '=' after type alias name.");
        return None;
    }

    lxr.advance(2);
    if !lxr.current().ty.is_ident_start() && lxr.current().kind != TokenKind::TypeIdent {
        lxr.raise_error("Expected type identifier.");
        return None;
    }

    let ty = parse_type(parser, lxr)?;
    parser.tbl.create_type_alias(&name, ty);

    Some(
        parser
            .ast
            .alloc(AstKind::TypeAlias { name }, pos, line, &file),
    )
}

/// `@include "path";` — the path resolves as absolute first, then relative
/// to the including file. Cycles are broken by the included-files registry.
pub fn parse_include(parser: &mut Parser, lxr: &mut Lexer) -> Option<NodeId> {
    assert!(lxr.current().value == "include");

    if !parser.tbl.at_global_scope() {
        lxr.raise_error("Include statement at non-global scope.");
        return None;
    }

    let pos = lxr.current().pos;
    let line = lxr.current().line;
    let file = lxr.file.clone();

    lxr.advance(1);
    if lxr.current().ty != TokenType::StringLiteral {
        lxr.raise_error("Expected string literal file path (e.g. \"path/to/file\").");
        return None;
    }

    let raw = lxr.current().value;
    assert!(raw.len() >= 2);
    let path_str = &raw[1..raw.len() - 1];

    if path_str.is_empty() {
        lxr.raise_error("No file path provided.");
        return None;
    }

    let as_abs = PathBuf::from(path_str);
    let as_rel = Path::new(&file)
        .parent()
        .map(|parent| parent.join(path_str))
        .unwrap_or_else(|| PathBuf::from(path_str));

    let resolved = if as_abs.is_absolute() && as_abs.is_file() {
        as_abs
    } else if as_rel.is_file() {
        match as_rel.canonicalize() {
            Ok(canonical) => canonical,
            Err(err) => {
                lxr.raise_error(format!(
                    "Encountered native filesystem error attempting to parse this include path: {}",
                    err
                ));
                return None;
            }
        }
    } else {
        lxr.raise_error(format!(
            "Could not include \"{}\": file does not exist.",
            path_str
        ));
        return None;
    };

    let resolved_str = resolved.to_string_lossy().to_string();
    let already_known = parser
        .included_files
        .iter()
        .any(|included| included.path == resolved_str);

    lxr.advance(1);
    let node = parser.ast.alloc(
        AstKind::IncludeStmt {
            path: resolved_str.clone(),
        },
        pos,
        line,
        &file,
    );

    if already_known {
        // Already parsed, or currently being parsed further up the include
        // chain; either way the cycle stops here.
        return Some(node);
    }

    parser.included_files.push(IncludedFile {
        path: resolved_str.clone(),
        state: IncludeState::Pending,
    });

    // Includes parse eagerly, so the included file's declarations precede
    // everything after the directive.
    let source = match std::fs::read_to_string(&resolved) {
        Ok(source) => source,
        Err(err) => {
            lxr.raise_error_at(
                format!("Could not read included file \"{}\": {}", resolved_str, err),
                pos,
                line,
            );
            return None;
        }
    };

    let mut inner = Lexer::new(&source, resolved_str.clone(), lxr.errs.warn_is_err());
    let parsed = super::parse_file(parser, &mut inner);
    lxr.errs.extend(std::mem::take(&mut inner.errs));

    if let Some(entry) = parser
        .included_files
        .iter_mut()
        .find(|included| included.path == resolved_str)
    {
        entry.state = IncludeState::Done;
    }

    if !parsed {
        return None;
    }

    Some(node)
}

fn wrapped_decl_symbol(parser: &Parser, node: NodeId) -> Option<u32> {
    match parser.ast.kind(node) {
        AstKind::Vardecl { identifier, .. } | AstKind::Procdecl { identifier, .. } => {
            Some(parser.ast.identifier_symbol(*identifier))
        }
        _ => None,
    }
}

/// `@extern ["C"] decl` marks the wrapped declaration as a foreign import.
pub fn parse_visibility_extern(parser: &mut Parser, lxr: &mut Lexer) -> Option<NodeId> {
    assert!(lxr.current().value == "extern");

    let pos = lxr.current().pos;
    let line = lxr.current().line;

    let flag = if lxr.peek(1).ty == TokenType::StringLiteral {
        if lxr.peek(1).value != "\"C\"" {
            lxr.raise_error("Invalid string literal after \"extern\" directive.");
            return None;
        }

        lxr.advance(1);
        EntityFlags::FOREIGN_C
    } else {
        EntityFlags::FOREIGN
    };

    lxr.advance(1);
    if flag == EntityFlags::FOREIGN_C && !parser.tbl.namespace_stack.is_empty() {
        lxr.raise_error_at("Cannot use extern \"C\" inside of a namespace.", pos, line);
        return None;
    }

    if !parser.tbl.at_global_scope() {
        lxr.raise_error_at("Cannot use \"extern\" directive at non-global scope.", pos, line);
        return None;
    }

    let node = parse(parser, lxr, true, false)?;
    let sym_index = match wrapped_decl_symbol(parser, node) {
        Some(index) => index,
        None => {
            lxr.raise_error_at(
                "Expected next expression to be a variable or procedure declaration.",
                pos,
                line,
            );
            return None;
        }
    };

    let sym = parser
        .tbl
        .lookup_symbol_mut(sym_index)
        .expect("wrapped declaration has a symbol");

    if !sym.generic_type_names.is_empty() {
        lxr.raise_error_at(
            "Cannot apply \"extern\" directive to a symbol with generic parameters.",
            pos,
            line,
        );
        return None;
    }

    if flag == EntityFlags::FOREIGN_C {
        sym.flags.remove(EntityFlags::FOREIGN);
    }

    sym.flags.insert(flag);
    Some(node)
}

/// `@intern decl` marks the wrapped declaration internal-linkage.
pub fn parse_visibility_intern(parser: &mut Parser, lxr: &mut Lexer) -> Option<NodeId> {
    assert!(lxr.current().value == "intern");

    let pos = lxr.current().pos;
    let line = lxr.current().line;

    lxr.advance(1);
    if !parser.tbl.at_global_scope() {
        lxr.raise_error_at("Cannot use \"intern\" directive at non-global scope.", pos, line);
        return None;
    }

    let node = parse(parser, lxr, true, false)?;
    let sym_index = match wrapped_decl_symbol(parser, node) {
        Some(index) => index,
        None => {
            lxr.raise_error_at(
                "Expected next expression to be a variable or procedure declaration.",
                pos,
                line,
            );
            return None;
        }
    };

    let generic = {
        let sym = parser
            .tbl
            .lookup_symbol(sym_index)
            .expect("wrapped declaration has a symbol");
        !sym.generic_type_names.is_empty()
    };

    if generic {
        lxr.raise_warning_at(
            "Redundant \"intern\" directive, generic symbols are implied to be internal.",
            pos,
            line,
        );
    }

    let sym = parser
        .tbl
        .lookup_symbol_mut(sym_index)
        .expect("wrapped declaration has a symbol");
    sym.flags.insert(EntityFlags::INTERNAL);

    Some(node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse_ok, parse_source};
    use crate::types::Primitive;

    #[test]
    fn alias_directive_registers_alias() {
        let parser = parse_ok("@alias Handle = u64;\nh : Handle = 0;");
        let alias = parser.tbl.lookup_type_alias("Handle").unwrap();
        assert_eq!(alias.primitive(), Some(Primitive::U64));
    }

    #[test]
    fn alias_conflict_is_rejected() {
        let (_, errs) = parse_source("struct Foo { x: i32 }\n@alias Foo = i32;");
        assert!(errs.failed());
    }

    #[test]
    fn extern_marks_symbol_foreign() {
        let parser = parse_ok("@extern write :: proc(fd: i32, buf: void^, len: u64) -> i64;");
        let index = parser.tbl.lookup_scoped_symbol("write");
        let sym = parser.tbl.lookup_symbol(index).unwrap();
        assert!(sym.flags.contains(EntityFlags::FOREIGN));
    }

    #[test]
    fn extern_c_marks_symbol_foreign_c() {
        let parser = parse_ok("@extern \"C\" malloc :: proc(size: u64) -> void^;");
        let index = parser.tbl.lookup_scoped_symbol("malloc");
        let sym = parser.tbl.lookup_symbol(index).unwrap();
        assert!(sym.flags.contains(EntityFlags::FOREIGN_C));
        assert!(!sym.flags.contains(EntityFlags::FOREIGN));
    }

    #[test]
    fn extern_c_inside_namespace_is_rejected() {
        let (_, errs) =
            parse_source("namespace sys { @extern \"C\" getpid :: proc() -> i32; }");
        assert!(errs.failed());
    }

    #[test]
    fn intern_marks_symbol_internal() {
        let parser = parse_ok("@intern helper :: proc() -> void { ret; }");
        let index = parser.tbl.lookup_scoped_symbol("helper");
        let sym = parser.tbl.lookup_symbol(index).unwrap();
        assert!(sym.flags.contains(EntityFlags::INTERNAL));
    }

    #[test]
    fn missing_include_file_is_an_error() {
        let (_, errs) = parse_source("@include \"does/not/exist.tak\";");
        assert!(errs.failed());
    }
}
