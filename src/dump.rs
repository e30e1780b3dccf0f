//! Diagnostic dumps behind `--dump-ast`, `--dump-symbols` and
//! `--dump-types`. Output is plain indented text; none of this affects
//! compilation semantics.

use crate::ast::{AstKind, NodeId, SizeofTarget};
use crate::entity::{EntityFlags, EntityTable};
use crate::parser::Parser;
use crate::types::TypeFlags;

fn entity_flags_string(flags: EntityFlags) -> String {
    let mut parts = Vec::new();
    if flags.contains(EntityFlags::GLOBAL) {
        parts.push("GLOBAL");
    }
    if flags.contains(EntityFlags::FOREIGN) {
        parts.push("FOREIGN");
    }
    if flags.contains(EntityFlags::FOREIGN_C) {
        parts.push("FOREIGN_C");
    }
    if flags.contains(EntityFlags::INTERNAL) {
        parts.push("INTERNAL");
    }
    if flags.contains(EntityFlags::PLACEHOLDER) {
        parts.push("PLACEHOLDER");
    }
    if flags.contains(EntityFlags::GENERIC_BASE) {
        parts.push("GENERIC_BASE");
    }

    if parts.is_empty() {
        "None".to_string()
    } else {
        parts.join(" | ")
    }
}

fn type_flags_string(flags: TypeFlags) -> String {
    let mut parts = Vec::new();
    if flags.contains(TypeFlags::CONSTANT) {
        parts.push("CONSTANT");
    }
    if flags.contains(TypeFlags::POINTER) {
        parts.push("POINTER");
    }
    if flags.contains(TypeFlags::ARRAY) {
        parts.push("ARRAY");
    }
    if flags.contains(TypeFlags::PROCARG) {
        parts.push("PROCARG");
    }
    if flags.contains(TypeFlags::DEFAULT_INIT) {
        parts.push("DEFAULT_INIT");
    }
    if flags.contains(TypeFlags::INFERRED) {
        parts.push("INFERRED");
    }
    if flags.contains(TypeFlags::NON_CONCRETE) {
        parts.push("NON_CONCRETE");
    }
    if flags.contains(TypeFlags::PROC_VARARGS) {
        parts.push("VARIADIC");
    }

    if parts.is_empty() {
        "None".to_string()
    } else {
        parts.join(" | ")
    }
}

pub fn dump_symbols(tbl: &EntityTable) {
    let mut indices: Vec<u32> = tbl.symbols.keys().copied().collect();
    indices.sort_unstable();

    println!("~~ SYMBOL TABLE ~~");
    for index in indices {
        let sym = &tbl.symbols[&index];
        println!("#{} \"{}\"", sym.index, sym.name);
        println!("  - Declared: {}:{}", sym.file, sym.line);
        println!("  - Flags:    {}", entity_flags_string(sym.flags));
        println!("  - Type:     {}", sym.ty);
        println!("  - T-Flags:  {}", type_flags_string(sym.ty.flags));
        if !sym.generic_type_names.is_empty() {
            println!("  - Generics: [{}]", sym.generic_type_names.join(", "));
        }
    }
    println!();
}

pub fn dump_types(tbl: &EntityTable) {
    let mut names: Vec<&String> = tbl.types.keys().collect();
    names.sort();

    println!("~~ USER TYPES ~~");
    for name in names {
        let utype = &tbl.types[name];
        if utype.generic_type_names.is_empty() {
            println!("{}", utype.name);
        } else {
            println!("{} [{}]", utype.name, utype.generic_type_names.join(", "));
        }

        for member in &utype.members {
            println!("  .{}: {}", member.name, member.ty);
        }
    }
    println!();
}

pub fn dump_ast(parser: &Parser) {
    println!("~~ ABSTRACT SYNTAX TREE ~~");
    for node in &parser.toplevel_decls {
        dump_node(parser, *node, 0);
    }
    println!();
}

fn pad(depth: usize) -> String {
    "  ".repeat(depth)
}

fn dump_node(parser: &Parser, node: NodeId, depth: usize) {
    let prefix = pad(depth);

    match parser.ast.kind(node) {
        AstKind::NamespaceDecl {
            full_path,
            children,
        } => {
            println!("{}Namespace {}", prefix, full_path);
            for child in children {
                dump_node(parser, *child, depth + 1);
            }
        }
        AstKind::Block { children } => {
            println!("{}Block", prefix);
            for child in children {
                dump_node(parser, *child, depth + 1);
            }
        }
        AstKind::Procdecl {
            identifier,
            parameters,
            children,
        } => {
            let sym_index = parser.ast.identifier_symbol(*identifier);
            let name = parser
                .tbl
                .lookup_symbol(sym_index)
                .map(|s| s.name.clone())
                .unwrap_or_default();

            println!("{}Procdecl \"{}\"", prefix, name);
            for param in parameters {
                dump_node(parser, *param, depth + 1);
            }
            for child in children {
                dump_node(parser, *child, depth + 1);
            }
        }
        AstKind::Vardecl {
            identifier,
            init_value,
        } => {
            let sym_index = parser.ast.identifier_symbol(*identifier);
            let (name, ty) = parser
                .tbl
                .lookup_symbol(sym_index)
                .map(|s| (s.name.clone(), s.ty.to_string()))
                .unwrap_or_default();

            println!("{}Vardecl \"{}\" : {}", prefix, name, ty);
            if let Some(init) = init_value {
                dump_node(parser, *init, depth + 1);
            }
        }
        AstKind::TypeAlias { name } => println!("{}TypeAlias \"{}\"", prefix, name),
        AstKind::StructDef { name } => println!("{}StructDef \"{}\"", prefix, name),
        AstKind::EnumDef { namespace, .. } => {
            println!("{}EnumDef", prefix);
            dump_node(parser, *namespace, depth + 1);
        }
        AstKind::IncludeStmt { path } => println!("{}Include \"{}\"", prefix, path),
        AstKind::Branch { if_stmt, else_stmt } => {
            println!("{}Branch", prefix);
            dump_node(parser, *if_stmt, depth + 1);
            if let Some(else_stmt) = else_stmt {
                dump_node(parser, *else_stmt, depth + 1);
            }
        }
        AstKind::If { condition, body } => {
            println!("{}If", prefix);
            dump_node(parser, *condition, depth + 1);
            for child in body {
                dump_node(parser, *child, depth + 1);
            }
        }
        AstKind::Else { body } => {
            println!("{}Else", prefix);
            for child in body {
                dump_node(parser, *child, depth + 1);
            }
        }
        AstKind::For {
            init,
            condition,
            update,
            body,
        } => {
            println!("{}For", prefix);
            for clause in [init, condition, update].into_iter().flatten() {
                dump_node(parser, *clause, depth + 1);
            }
            for child in body {
                dump_node(parser, *child, depth + 1);
            }
        }
        AstKind::While { condition, body } => {
            println!("{}While", prefix);
            dump_node(parser, *condition, depth + 1);
            for child in body {
                dump_node(parser, *child, depth + 1);
            }
        }
        AstKind::DoWhile { condition, body } => {
            println!("{}DoWhile", prefix);
            for child in body {
                dump_node(parser, *child, depth + 1);
            }
            dump_node(parser, *condition, depth + 1);
        }
        AstKind::Switch {
            target,
            cases,
            default,
        } => {
            println!("{}Switch", prefix);
            dump_node(parser, *target, depth + 1);
            for case in cases {
                dump_node(parser, *case, depth + 1);
            }
            dump_node(parser, *default, depth + 1);
        }
        AstKind::Case {
            value,
            fallthrough,
            body,
        } => {
            println!(
                "{}Case{}",
                prefix,
                if *fallthrough { " (fallthrough)" } else { "" }
            );
            dump_node(parser, *value, depth + 1);
            for child in body {
                dump_node(parser, *child, depth + 1);
            }
        }
        AstKind::Default { body } => {
            println!("{}Default", prefix);
            for child in body {
                dump_node(parser, *child, depth + 1);
            }
        }
        AstKind::Ret { value } => {
            println!("{}Ret", prefix);
            if let Some(value) = value {
                dump_node(parser, *value, depth + 1);
            }
        }
        AstKind::Brk => println!("{}Brk", prefix),
        AstKind::Cont => println!("{}Cont", prefix),
        AstKind::Defer { call } => {
            println!("{}Defer", prefix);
            dump_node(parser, *call, depth + 1);
        }
        AstKind::DeferIf { condition, call } => {
            println!("{}DeferIf", prefix);
            dump_node(parser, *condition, depth + 1);
            dump_node(parser, *call, depth + 1);
        }
        AstKind::Call { target, arguments } => {
            println!("{}Call", prefix);
            dump_node(parser, *target, depth + 1);
            for arg in arguments {
                dump_node(parser, *arg, depth + 1);
            }
        }
        AstKind::Binexpr { op, left, right } => {
            println!("{}Binexpr '{}'", prefix, op.show());
            dump_node(parser, *left, depth + 1);
            dump_node(parser, *right, depth + 1);
        }
        AstKind::Unaryexpr { op, operand } => {
            println!("{}Unaryexpr '{}'", prefix, op.show());
            dump_node(parser, *operand, depth + 1);
        }
        AstKind::Subscript { operand, value } => {
            println!("{}Subscript", prefix);
            dump_node(parser, *operand, depth + 1);
            dump_node(parser, *value, depth + 1);
        }
        AstKind::MemberAccess { target, path } => {
            println!("{}MemberAccess \"{}\"", prefix, path);
            dump_node(parser, *target, depth + 1);
        }
        AstKind::Cast { target, ty } => {
            println!("{}Cast -> {}", prefix, ty);
            dump_node(parser, *target, depth + 1);
        }
        AstKind::Sizeof { target } => match target {
            SizeofTarget::Type(ty) => println!("{}Sizeof {}", prefix, ty),
            SizeofTarget::Expr(expr) => {
                println!("{}Sizeof", prefix);
                dump_node(parser, *expr, depth + 1);
            }
        },
        AstKind::Identifier { symbol_index } => {
            let name = parser
                .tbl
                .lookup_symbol(*symbol_index)
                .map(|s| s.name.clone())
                .unwrap_or_default();
            println!("{}Identifier \"{}\" (#{})", prefix, name, symbol_index);
        }
        AstKind::SingletonLiteral {
            literal_type,
            value,
        } => {
            println!("{}Literal {:?} \"{}\"", prefix, literal_type, value);
        }
        AstKind::BracedExpr { members } => {
            println!("{}BracedExpr", prefix);
            for member in members {
                dump_node(parser, *member, depth + 1);
            }
        }
    }
}
