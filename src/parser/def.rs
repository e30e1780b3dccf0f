//! Definitions of composites: struct definitions (including generic
//! templates), enum definitions (desugared to a namespace of constants plus
//! a type alias), and namespace blocks.

use super::{parse, ty::parse_type, Parser};
use crate::ast::{AstKind, NodeId};
use crate::entity::{EntityFlags, MemberData};
use crate::lexer::Lexer;
use crate::token::{TokenKind, TokenType};
use crate::types::{TypeData, TypeFlags, TypeKind};

pub fn parse_structdef(parser: &mut Parser, lxr: &mut Lexer) -> Option<NodeId> {
    assert!(lxr.current().ty == TokenType::KwStruct);

    if !parser.tbl.at_global_scope() {
        lxr.raise_error("Struct definition at non-global scope.");
        return None;
    }

    let pos = lxr.current().pos;
    let line = lxr.current().line;
    let file = lxr.file.clone();

    lxr.advance(1);
    if lxr.current().ty != TokenType::Identifier {
        lxr.raise_error("Expected struct name.");
        return None;
    }

    let raw_name = lxr.current().value.to_string();
    let type_name = parser.tbl.qualified_name(&raw_name);

    if parser.tbl.type_exists(&type_name) || parser.tbl.type_alias_exists(&type_name) {
        lxr.raise_error("Naming conflict: type or type alias has already been defined elsewhere.");
        return None;
    }

    // Optional generic header.
    let mut generic_names = Vec::new();
    lxr.advance(1);
    if lxr.current().ty == TokenType::LSquare {
        lxr.advance(1);
        while lxr.current().ty != TokenType::RSquare {
            if lxr.current().ty != TokenType::Identifier {
                lxr.raise_error("Expected generic identifier.");
                return None;
            }

            generic_names.push(lxr.current().value.to_string());
            lxr.advance(1);
            if matches!(lxr.current().ty, TokenType::Comma | TokenType::Semicolon) {
                lxr.advance(1);
            }
        }

        if generic_names.is_empty() {
            lxr.raise_error("Generic parameter list cannot be empty.");
            return None;
        }

        lxr.advance(1);
    }

    if lxr.current().ty != TokenType::LBrace {
        lxr.raise_error("Expected '{' (start of struct body).");
        return None;
    }

    parser.active_generic_params = generic_names.clone();
    let members = parse_struct_members(parser, lxr, &raw_name);
    parser.active_generic_params.clear();
    let members = members?;

    if !parser
        .tbl
        .create_type(&type_name, members, &file, pos, line)
    {
        lxr.raise_error("Naming conflict: type has already been defined elsewhere.");
        return None;
    }

    if !generic_names.is_empty() {
        parser
            .tbl
            .lookup_type_mut(&type_name)
            .expect("type was just created")
            .generic_type_names = generic_names;
    }

    Some(
        parser
            .ast
            .alloc(AstKind::StructDef { name: type_name }, pos, line, &file),
    )
}

fn parse_struct_members(
    parser: &mut Parser,
    lxr: &mut Lexer,
    struct_raw_name: &str,
) -> Option<Vec<MemberData>> {
    assert!(lxr.current().ty == TokenType::LBrace);
    lxr.advance(1);

    let mut members: Vec<MemberData> = Vec::new();
    while lxr.current().ty != TokenType::RBrace {
        if lxr.current().ty != TokenType::Identifier {
            lxr.raise_error("Expected identifier.");
            return None;
        }

        let member_name = lxr.current().value.to_string();
        let member_pos = lxr.current().pos;
        let member_line = lxr.current().line;

        if members.iter().any(|m| m.name == member_name) {
            lxr.raise_error("Duplicate struct member.");
            return None;
        }

        lxr.advance(1);
        let is_const = match lxr.current().ty {
            TokenType::ConstTypeAssignment => true,
            TokenType::TypeAssignment => false,
            _ => {
                lxr.raise_error("Expected type assignment.");
                return None;
            }
        };

        lxr.advance(1);
        if lxr.current().kind != TokenKind::TypeIdent && !lxr.current().ty.is_ident_start() {
            lxr.raise_error("Expected type identifier.");
            return None;
        }

        if lxr.current().ty == TokenType::Identifier && lxr.current().value == struct_raw_name {
            lxr.raise_error("A struct cannot contain itself.");
            return None;
        }

        let mut ty = parse_type(parser, lxr)?;
        if ty.kind == TypeKind::Procedure && ty.pointer_depth < 1 {
            lxr.raise_error_at(
                "Procedures cannot be used as struct members.",
                member_pos,
                member_line,
            );
            return None;
        }

        ty.flags.insert(TypeFlags::DEFAULT_INIT);
        if is_const {
            ty.flags.insert(TypeFlags::CONSTANT);
        }

        members.push(MemberData {
            name: member_name,
            ty,
        });

        if matches!(lxr.current().ty, TokenType::Comma | TokenType::Semicolon) {
            lxr.advance(1);
        }
    }

    lxr.advance(1);
    Some(members)
}

fn type_is_valid_as_enumeration(ty: &TypeData) -> bool {
    matches!(ty.primitive(), Some(p) if p.is_integral())
        && ty.array_lengths.is_empty()
        && ty.pointer_depth == 0
        && ty.kind == TypeKind::Primitive
}

/// `enum Name, T { A = 1, B, C }` desugars to a namespace of constants plus
/// a type alias `Name = T`. Member values auto-increment from the previous
/// explicit value (starting at zero).
pub fn parse_enumdef(parser: &mut Parser, lxr: &mut Lexer) -> Option<NodeId> {
    assert!(lxr.current().ty == TokenType::KwEnum);

    if !parser.tbl.at_global_scope() {
        lxr.raise_error("Enum definition at non-global scope.");
        return None;
    }

    let pos = lxr.current().pos;
    let line = lxr.current().line;
    let file = lxr.file.clone();

    lxr.advance(1);
    if lxr.current().ty != TokenType::Identifier {
        lxr.raise_error("Expected enum name.");
        return None;
    }

    let raw_name = lxr.current().value.to_string();
    let alias_name = parser.tbl.qualified_name(&raw_name);

    if parser.tbl.namespace_exists(&raw_name)
        || parser.tbl.type_alias_exists(&alias_name)
        || parser.tbl.type_exists(&alias_name)
    {
        lxr.raise_error(
            "Naming conflict: a namespace, type alias, or struct has the same name as this enum.",
        );
        return None;
    }

    if !matches!(lxr.peek(1).ty, TokenType::Comma | TokenType::Semicolon) {
        lxr.raise_error("Unexpected token after enum name.");
        return None;
    }

    parser.tbl.enter_namespace(&raw_name);
    let full_path = parser.tbl.namespace_as_string();

    let result = parse_enum_contents(parser, lxr, &alias_name, &file);
    parser.tbl.leave_namespace();
    let children = result?;

    let namespace = parser.ast.alloc(
        AstKind::NamespaceDecl {
            full_path,
            children: children.clone(),
        },
        pos,
        line,
        &file,
    );

    for child in &children {
        parser.ast.set_parent(*child, namespace);
    }

    let node = parser.ast.alloc(
        AstKind::EnumDef {
            namespace,
            alias_name,
        },
        pos,
        line,
        &file,
    );

    parser.ast.set_parent(namespace, node);
    Some(node)
}

fn parse_enum_contents(
    parser: &mut Parser,
    lxr: &mut Lexer,
    alias_name: &str,
    file: &str,
) -> Option<Vec<NodeId>> {
    lxr.advance(2);
    if lxr.current().ty != TokenType::Identifier && lxr.current().kind != TokenKind::TypeIdent {
        lxr.raise_error("Expected enum type identifier.");
        return None;
    }

    let ty_pos = lxr.current().pos;
    let ty_line = lxr.current().line;
    let base_ty = parse_type(parser, lxr)?;

    if !type_is_valid_as_enumeration(&base_ty) {
        lxr.raise_error_at("Specified type is not valid for an enum.", ty_pos, ty_line);
        return None;
    }

    parser.tbl.create_type_alias(alias_name, base_ty.clone());

    if lxr.current().ty != TokenType::LBrace {
        lxr.raise_error("Expected '{'.");
        return None;
    }

    lxr.advance(1);
    let mut children = Vec::new();
    let mut next_value: i64 = 0;

    while lxr.current().ty != TokenType::RBrace {
        if lxr.current().ty != TokenType::Identifier {
            lxr.raise_error("Expected identifier.");
            return None;
        }

        let member_raw = lxr.current().value.to_string();
        let member_name = parser.tbl.qualified_name(&member_raw);
        let member_pos = lxr.current().pos;
        let member_line = lxr.current().line;

        if parser.tbl.scoped_symbol_exists_at_current_scope(&member_name) {
            lxr.raise_error("Redeclaration of enum member.");
            return None;
        }

        if parser.tbl.namespace_exists(&member_raw) {
            lxr.raise_error("Enum member has the same name as a namespace it is declared in.");
            return None;
        }

        lxr.advance(1);
        if lxr.current().ty == TokenType::ValueAssignment {
            lxr.advance(1);
            if lxr.current().ty != TokenType::IntegerLiteral {
                lxr.raise_error("Enum member value must be an integer literal.");
                return None;
            }

            next_value = match lxr.current().value.parse::<i64>() {
                Ok(parsed) => parsed,
                Err(_) => {
                    lxr.raise_error("Literal value is too large.");
                    return None;
                }
            };

            lxr.advance(1);
        }

        let mut member_ty = base_ty.clone();
        member_ty.flags.insert(TypeFlags::CONSTANT);

        let kind = member_ty.kind;
        let sym_index = parser.tbl.create_symbol(
            &member_name,
            file,
            member_pos,
            member_line,
            kind,
            EntityFlags::GLOBAL,
            Some(member_ty),
        );

        let literal = parser.ast.alloc(
            AstKind::SingletonLiteral {
                literal_type: TokenType::IntegerLiteral,
                value: next_value.to_string(),
            },
            member_pos,
            member_line,
            file,
        );

        let identifier = parser.ast.alloc(
            AstKind::Identifier {
                symbol_index: sym_index,
            },
            member_pos,
            member_line,
            file,
        );

        let decl = parser.ast.alloc(
            AstKind::Vardecl {
                identifier,
                init_value: Some(literal),
            },
            member_pos,
            member_line,
            file,
        );

        parser.ast.set_parent(identifier, decl);
        parser.ast.set_parent(literal, decl);
        children.push(decl);

        next_value += 1;
        if matches!(lxr.current().ty, TokenType::Comma | TokenType::Semicolon) {
            lxr.advance(1);
        }
    }

    lxr.advance(1);
    Some(children)
}

pub fn parse_namespace(parser: &mut Parser, lxr: &mut Lexer) -> Option<NodeId> {
    assert!(lxr.current().ty == TokenType::KwNamespace);
    lxr.advance(1);

    if !parser.tbl.at_global_scope() {
        lxr.raise_error("Namespace declaration at non-global scope.");
        return None;
    }

    if lxr.current().ty != TokenType::Identifier {
        lxr.raise_error("Expected namespace identifier.");
        return None;
    }

    let pos = lxr.current().pos;
    let line = lxr.current().line;
    let file = lxr.file.clone();
    let name = lxr.current().value.to_string();

    if !parser.tbl.enter_namespace(&name) {
        lxr.raise_error("Nested namespace has the same name as a parent.");
        return None;
    }

    let full_path = parser.tbl.namespace_as_string();

    if lxr.peek(1).ty != TokenType::LBrace {
        lxr.raise_error("Expected '{' (beginning of namespace block).");
        parser.tbl.leave_namespace();
        return None;
    }

    lxr.advance(2);
    let result = (|| {
        let mut children = Vec::new();
        while lxr.current().ty != TokenType::RBrace {
            let child_pos = lxr.current().pos;
            let child_line = lxr.current().line;

            let child = parse(parser, lxr, false, false)?;
            if !parser.ast.kind(child).is_valid_at_toplevel() {
                lxr.raise_error_at(
                    "Expression is invalid as a toplevel statement.",
                    child_pos,
                    child_line,
                );
                return None;
            }

            children.push(child);
        }

        lxr.advance(1);
        Some(children)
    })();

    parser.tbl.leave_namespace();
    let children = result?;

    let node = parser.ast.alloc(
        AstKind::NamespaceDecl {
            full_path,
            children: children.clone(),
        },
        pos,
        line,
        &file,
    );

    for child in &children {
        parser.ast.set_parent(*child, node);
    }

    Some(node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse_ok, parse_source};
    use crate::types::Primitive;

    #[test]
    fn struct_members_are_registered() {
        let parser = parse_ok("struct Point { x: i32, y: i32 }");
        let utype = parser.tbl.lookup_type("Point").unwrap();

        assert_eq!(utype.members.len(), 2);
        assert_eq!(utype.members[0].name, "x");
        assert_eq!(utype.members[0].ty.primitive(), Some(Primitive::I32));
        assert!(utype.members[0].ty.flags.contains(TypeFlags::DEFAULT_INIT));
    }

    #[test]
    fn const_member_keeps_const_flag() {
        let parser = parse_ok("struct Config { id :: u64 }");
        let utype = parser.tbl.lookup_type("Config").unwrap();
        assert!(utype.members[0].ty.flags.contains(TypeFlags::CONSTANT));
    }

    #[test]
    fn struct_cannot_contain_itself() {
        let (_, errs) = parse_source("struct Node { next: Node }");
        assert!(errs.failed());
    }

    #[test]
    fn generic_struct_records_parameter_names() {
        let parser = parse_ok("struct Pair[T, U] { a: T, b: U }");
        let utype = parser.tbl.lookup_type("Pair").unwrap();

        assert_eq!(utype.generic_type_names, vec!["T".to_string(), "U".to_string()]);
        assert_eq!(utype.members[0].ty.struct_name(), Some("T"));
        assert_eq!(utype.members[1].ty.struct_name(), Some("U"));
    }

    #[test]
    fn namespaced_struct_name_is_qualified() {
        let parser = parse_ok("namespace gfx { struct Color { r: u8, g: u8, b: u8 } }");
        assert!(parser.tbl.type_exists("gfx\\Color"));
        assert!(!parser.tbl.type_exists("Color"));
    }

    #[test]
    fn enum_desugars_to_constants_and_alias() {
        let parser = parse_ok("enum Color, u32 { RED = 1, GREEN, BLUE }");

        let alias = parser.tbl.lookup_type_alias("Color").unwrap();
        assert_eq!(alias.primitive(), Some(Primitive::U32));

        for name in ["Color\\RED", "Color\\GREEN", "Color\\BLUE"] {
            let index = parser.tbl.lookup_scoped_symbol(name);
            let sym = parser.tbl.lookup_symbol(index).unwrap();
            assert!(sym.ty.flags.contains(TypeFlags::CONSTANT));
            assert!(sym.flags.contains(EntityFlags::GLOBAL));
        }
    }

    #[test]
    fn enum_values_auto_increment() {
        let parser = parse_ok("enum Flag, u8 { A, B, C = 10, D }");

        let values: Vec<String> = parser
            .toplevel_decls
            .iter()
            .filter_map(|decl| match parser.ast.kind(*decl) {
                AstKind::EnumDef { namespace, .. } => Some(*namespace),
                _ => None,
            })
            .flat_map(|ns| match parser.ast.kind(ns) {
                AstKind::NamespaceDecl { children, .. } => children.clone(),
                _ => Vec::new(),
            })
            .filter_map(|decl| match parser.ast.kind(decl) {
                AstKind::Vardecl { init_value, .. } => init_value.as_ref().copied(),
                _ => None,
            })
            .filter_map(|lit| match parser.ast.kind(lit) {
                AstKind::SingletonLiteral { value, .. } => Some(value.clone()),
                _ => None,
            })
            .collect();

        assert_eq!(values, vec!["0", "1", "10", "11"]);
    }

    #[test]
    fn enum_with_float_base_is_rejected() {
        let (_, errs) = parse_source("enum Bad, f32 { A }");
        assert!(errs.failed());
    }

    #[test]
    fn namespace_contents_are_qualified() {
        let parser = parse_ok("namespace math { PI : f64 = 3.14159; }");
        let index = parser.tbl.lookup_scoped_symbol("math\\PI");
        assert_ne!(index, 0);
    }

    #[test]
    fn nested_namespace_shadowing_is_rejected() {
        let (_, errs) = parse_source("namespace a { namespace a { } }");
        assert!(errs.failed());
    }
}
