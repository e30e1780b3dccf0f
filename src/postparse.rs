//! Post-parse pass: monomorphization of generic struct instantiations.
//!
//! Pass A walks symbols whose types are procedures or structs; pass B walks
//! the non-generic user types and the recorded cast/sizeof nodes. Wherever a
//! struct `TypeData` carries generic arguments, the instantiation is looked
//! up by mangled name or created by substituting the template's parameter
//! names, and the reference is rewritten in place. Iteration continues to a
//! fixed point; every processed entry is marked so the pass terminates.

use crate::ast::{AstKind, SizeofTarget};
use crate::entity::{EntityFlags, EntityTable, MemberData, UserType};
use crate::error::ErrorSink;
use crate::parser::Parser;
use crate::types::{TypeData, TypeFlags, TypeKind, TypeName};
use std::collections::HashMap;

#[derive(Clone)]
struct Location {
    file: String,
    pos: usize,
    line: u32,
}

fn permute_procptr_member(
    member: &mut TypeData,
    gen_map: &HashMap<String, TypeData>,
    tbl: &mut EntityTable,
    errs: &mut ErrorSink,
    loc: &Location,
) -> bool {
    assert!(member.kind == TypeKind::Procedure);

    if let Some(params) = member.parameters.take() {
        let mut new_params = Vec::with_capacity(params.len());
        for param in params {
            if param.kind == TypeKind::Primitive {
                new_params.push(param);
                continue;
            }

            match permute_member(gen_map, &param, tbl, errs, loc) {
                Some(permuted) => new_params.push(permuted),
                None => return false,
            }
        }

        member.parameters = Some(new_params);
    }

    if let Some(ret) = member.return_type.take() {
        if ret.kind == TypeKind::Primitive {
            member.return_type = Some(ret);
        } else {
            match permute_member(gen_map, &ret, tbl, errs, loc) {
                Some(permuted) => member.return_type = Some(Box::new(permuted)),
                None => return false,
            }
        }
    }

    true
}

fn permute_struct_member(
    member: &mut TypeData,
    gen_map: &HashMap<String, TypeData>,
    tbl: &mut EntityTable,
    errs: &mut ErrorSink,
    loc: &Location,
) -> bool {
    assert!(member.kind == TypeKind::Struct);

    let struct_name = member
        .struct_name()
        .expect("struct member has a name")
        .to_string();

    let old_t = match tbl.lookup_type(&struct_name) {
        Some(old_t) => old_t.clone(),
        None => {
            errs.raise_error(
                format!("Unknown type \"{}\" in generic substitution.", struct_name),
                &loc.file,
                loc.pos,
                loc.line,
            );
            return false;
        }
    };

    let used = member.parameters.as_ref().map(Vec::len).unwrap_or(0);
    let receives = old_t.generic_type_names.len();

    if used == 0 && receives == 0 {
        member.parameters = None;
        return true;
    }
    if used != receives {
        member.parameters = None;
        return false;
    }

    let params = member.parameters.take().expect("arity was checked");
    let mut new_params = Vec::with_capacity(params.len());
    for param in params {
        if param.kind == TypeKind::Primitive {
            new_params.push(param);
            continue;
        }

        match permute_member(gen_map, &param, tbl, errs, loc) {
            Some(permuted) => new_params.push(permuted),
            None => return false,
        }
    }

    member.parameters = Some(new_params);
    let mangled = member.mangled_name();

    if tbl.type_exists(&mangled) {
        member.parameters = None;
        member.name = TypeName::Struct(mangled);
        return true;
    }

    let created = create_permutation(&mangled, member, &old_t, tbl, errs, loc);
    member.parameters = None;
    created
}

/// Substitutes one template member against the generic argument map.
fn permute_member(
    gen_map: &HashMap<String, TypeData>,
    old_member: &TypeData,
    tbl: &mut EntityTable,
    errs: &mut ErrorSink,
    loc: &Location,
) -> Option<TypeData> {
    let mut new_member = TypeData {
        array_lengths: old_member.array_lengths.clone(),
        pointer_depth: old_member.pointer_depth,
        flags: old_member.flags,
        parameters: old_member.parameters.clone(),
        ..Default::default()
    };

    let substituted = old_member
        .struct_name()
        .and_then(|name| gen_map.get(name));

    if let Some(gen_t) = substituted {
        // Postfix merging: the argument may not stack pointers, arrays or
        // generic arguments onto a member that already has them.
        if (old_member.parameters.is_some() && gen_t.parameters.is_some())
            || (old_member.pointer_depth != 0 && gen_t.pointer_depth != 0)
            || (!old_member.array_lengths.is_empty() && !gen_t.array_lengths.is_empty())
        {
            errs.raise_error(
                format!(
                    "Substitution failure: cannot substitute a member of type {} with {}",
                    old_member, gen_t
                ),
                &loc.file,
                loc.pos,
                loc.line,
            );
            return None;
        }

        if gen_t.pointer_depth > 0 {
            new_member.pointer_depth = gen_t.pointer_depth;
        }
        if !gen_t.array_lengths.is_empty() {
            new_member.array_lengths = gen_t.array_lengths.clone();
        }
        if gen_t.parameters.is_some() {
            new_member.parameters = gen_t.parameters.clone();
        }

        new_member.name = gen_t.name.clone();
        new_member.kind = gen_t.kind;
    } else {
        new_member.name = old_member.name.clone();
        new_member.kind = old_member.kind;
        new_member.return_type = old_member.return_type.clone();
    }

    if !new_member.array_lengths.is_empty() {
        new_member.flags.insert(TypeFlags::ARRAY);
    }
    if new_member.pointer_depth > 0 {
        new_member.flags.insert(TypeFlags::POINTER);
    }

    match new_member.kind {
        TypeKind::Primitive => {
            if new_member.parameters.is_some() {
                errs.raise_error(
                    "Substitution failure: primitive type cannot take generic arguments.",
                    &loc.file,
                    loc.pos,
                    loc.line,
                );
                return None;
            }
            Some(new_member)
        }
        TypeKind::Procedure => {
            if permute_procptr_member(&mut new_member, gen_map, tbl, errs, loc) {
                Some(new_member)
            } else {
                None
            }
        }
        TypeKind::Struct => {
            if permute_struct_member(&mut new_member, gen_map, tbl, errs, loc) {
                Some(new_member)
            } else {
                None
            }
        }
        TypeKind::None => Some(new_member),
    }
}

/// Instantiates a template under its mangled name, substituting every
/// member against the argument list.
fn create_permutation(
    name: &str,
    to_conv: &mut TypeData,
    old_t: &UserType,
    tbl: &mut EntityTable,
    errs: &mut ErrorSink,
    loc: &Location,
) -> bool {
    assert!(to_conv.kind == TypeKind::Struct);
    let args = to_conv.parameters.as_ref().expect("arity was checked");
    assert!(args.len() == old_t.generic_type_names.len());

    let created = tbl.create_type(name, Vec::new(), &old_t.file, old_t.pos, old_t.line);
    assert!(created, "mangled name \"{}\" was free", name);

    let mut gen_map = HashMap::new();
    for (generic_name, arg) in old_t.generic_type_names.iter().zip(args.iter()) {
        gen_map.insert(generic_name.clone(), arg.clone());
    }

    let mut new_members = Vec::with_capacity(old_t.members.len());
    for member in &old_t.members {
        match permute_member(&gen_map, &member.ty, tbl, errs, loc) {
            Some(permuted) => new_members.push(MemberData {
                name: member.name.clone(),
                ty: permuted,
            }),
            None => return false,
        }
    }

    tbl.lookup_type_mut(name)
        .expect("type was just created")
        .members = new_members;

    to_conv.name = TypeName::Struct(name.to_string());
    true
}

/// Resolves one struct reference: arity-checks its generic arguments and
/// rewrites the name to the mangled instantiation.
fn inspect_struct_t(ty: &mut TypeData, tbl: &mut EntityTable, errs: &mut ErrorSink, loc: &Location) {
    assert!(ty.kind == TypeKind::Struct);

    let type_name = ty
        .struct_name()
        .expect("struct type has a name")
        .to_string();

    let utype = match tbl.lookup_type(&type_name) {
        Some(utype) => utype.clone(),
        None => {
            errs.raise_error(
                format!("Unknown type \"{}\".", type_name),
                &loc.file,
                loc.pos,
                loc.line,
            );
            ty.parameters = None;
            return;
        }
    };

    let receives = utype.generic_type_names.len();
    let used = ty.parameters.as_ref().map(Vec::len).unwrap_or(0);

    if receives == 0 && used == 0 {
        return;
    }

    if receives != used {
        errs.raise_error(
            format!(
                "Cannot instantiate type {} with {} generic parameters (takes {}).",
                type_name, used, receives
            ),
            &loc.file,
            loc.pos,
            loc.line,
        );
        ty.parameters = None;
        return;
    }

    let mangled = ty.mangled_name();
    if tbl.type_exists(&mangled) {
        ty.name = TypeName::Struct(mangled);
        ty.parameters = None;
        return;
    }

    if !create_permutation(&mangled, ty, &utype, tbl, errs, loc) {
        errs.raise_error(
            format!(
                "Cannot instantiate type {} with these generic parameters.",
                type_name
            ),
            &loc.file,
            loc.pos,
            loc.line,
        );
    }

    ty.parameters = None;
}

fn inspect_proc_t(ty: &mut TypeData, tbl: &mut EntityTable, errs: &mut ErrorSink, loc: &Location) {
    assert!(ty.kind == TypeKind::Procedure);

    if let Some(params) = ty.parameters.as_mut() {
        for param in params.iter_mut() {
            match param.kind {
                TypeKind::Struct => inspect_struct_t(param, tbl, errs, loc),
                TypeKind::Procedure => inspect_proc_t(param, tbl, errs, loc),
                _ => {}
            }
        }
    }

    if let Some(ret) = ty.return_type.as_mut() {
        match ret.kind {
            TypeKind::Struct => inspect_struct_t(ret, tbl, errs, loc),
            TypeKind::Procedure => inspect_proc_t(ret, tbl, errs, loc),
            _ => {}
        }
    }
}

/// Runs both passes to a fixed point. Returns false when any diagnostic
/// with error severity was raised.
pub fn permute_generic_structures(parser: &mut Parser, errs: &mut ErrorSink) -> bool {
    let before = errs.error_count();

    // Pass A: symbols.
    loop {
        let next = parser.tbl.symbols.iter().find_map(|(index, sym)| {
            let eligible = !sym.flags.contains(EntityFlags::POSTPARSE_DONE)
                && matches!(sym.ty.kind, TypeKind::Procedure | TypeKind::Struct);
            eligible.then_some(*index)
        });

        let Some(index) = next else { break };

        let (mut ty, loc) = {
            let sym = parser
                .tbl
                .lookup_symbol_mut(index)
                .expect("index from iteration");
            sym.flags.insert(EntityFlags::POSTPARSE_DONE);
            (
                sym.ty.clone(),
                Location {
                    file: sym.file.clone(),
                    pos: sym.pos,
                    line: sym.line,
                },
            )
        };

        match ty.kind {
            TypeKind::Struct => inspect_struct_t(&mut ty, &mut parser.tbl, errs, &loc),
            TypeKind::Procedure => inspect_proc_t(&mut ty, &mut parser.tbl, errs, &loc),
            _ => {}
        }

        parser
            .tbl
            .lookup_symbol_mut(index)
            .expect("index from iteration")
            .ty = ty;
    }

    // Pass B: user-defined types (templates themselves are skipped).
    loop {
        let next = parser.tbl.types.iter().find_map(|(name, utype)| {
            let eligible = !utype.postparse_done && utype.generic_type_names.is_empty();
            eligible.then(|| name.clone())
        });

        let Some(name) = next else { break };

        let (mut members, loc) = {
            let utype = parser
                .tbl
                .lookup_type_mut(&name)
                .expect("name from iteration");
            utype.postparse_done = true;
            (
                utype.members.clone(),
                Location {
                    file: utype.file.clone(),
                    pos: utype.pos,
                    line: utype.line,
                },
            )
        };

        for member in members.iter_mut() {
            match member.ty.kind {
                TypeKind::Struct => inspect_struct_t(&mut member.ty, &mut parser.tbl, errs, &loc),
                TypeKind::Procedure => inspect_proc_t(&mut member.ty, &mut parser.tbl, errs, &loc),
                _ => {}
            }
        }

        parser
            .tbl
            .lookup_type_mut(&name)
            .expect("name from iteration")
            .members = members;
    }

    // AST nodes that embed a TypeData: cast targets and sizeof-of-type.
    let extra = parser.extra_generic_nodes.clone();
    for node in extra {
        let loc = Location {
            file: parser.ast[node].file.clone(),
            pos: parser.ast[node].pos,
            line: parser.ast[node].line,
        };

        let mut ty = match parser.ast.kind(node) {
            AstKind::Cast { ty, .. } => ty.clone(),
            AstKind::Sizeof {
                target: SizeofTarget::Type(ty),
            } => ty.clone(),
            _ => continue,
        };

        match ty.kind {
            TypeKind::Struct => inspect_struct_t(&mut ty, &mut parser.tbl, errs, &loc),
            TypeKind::Procedure => inspect_proc_t(&mut ty, &mut parser.tbl, errs, &loc),
            _ => {}
        }

        match parser.ast.kind_mut(node) {
            AstKind::Cast { ty: slot, .. } => *slot = ty,
            AstKind::Sizeof {
                target: SizeofTarget::Type(slot),
            } => *slot = ty,
            _ => {}
        }
    }

    errs.error_count() == before
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_source;
    use crate::types::Primitive;

    fn postparse_ok(source: &str) -> Parser {
        let (mut parser, parse_errs) = parse_source(source);
        assert!(!parse_errs.failed(), "parse failed: {:?}", parse_errs);

        let mut errs = ErrorSink::new(false);
        let ok = permute_generic_structures(&mut parser, &mut errs);
        assert!(ok, "postparse failed: {:?}", errs);
        parser
    }

    #[test]
    fn pair_instantiation_creates_mangled_type() {
        let parser = postparse_ok(
            "struct Pair[T, U] { a: T, b: U }\n\
             x : Pair[i32, bool];",
        );

        let utype = parser.tbl.lookup_type("Pair[i32,bool]").unwrap();
        assert_eq!(utype.members.len(), 2);
        assert_eq!(utype.members[0].ty.primitive(), Some(Primitive::I32));
        assert_eq!(utype.members[1].ty.primitive(), Some(Primitive::Bool));

        let index = parser.tbl.lookup_scoped_symbol("x");
        let sym = parser.tbl.lookup_symbol(index).unwrap();
        assert_eq!(sym.ty.struct_name(), Some("Pair[i32,bool]"));
        assert!(sym.ty.parameters.is_none());
    }

    #[test]
    fn identical_instantiations_are_shared() {
        let parser = postparse_ok(
            "struct Box[T] { value: T }\n\
             a : Box[u8];\n\
             b : Box[u8];",
        );

        let count = parser
            .tbl
            .types
            .keys()
            .filter(|name| name.starts_with("Box["))
            .count();
        assert_eq!(count, 1);
    }

    #[test]
    fn nested_generic_instantiation() {
        let parser = postparse_ok(
            "struct Box[T] { value: T }\n\
             struct Pair[T, U] { a: T, b: U }\n\
             x : Pair[Box[i32], u8];",
        );

        assert!(parser.tbl.type_exists("Box[i32]"));
        let outer = parser.tbl.lookup_type("Pair[Box[i32],u8]").unwrap();
        assert_eq!(outer.members[0].ty.struct_name(), Some("Box[i32]"));
        assert!(outer.members[0].ty.parameters.is_none());
    }

    #[test]
    fn pointer_argument_substitutes_depth() {
        let parser = postparse_ok(
            "struct Holder[T] { item: T }\n\
             p : Holder[i32^];",
        );

        // Mangled names exclude postfixes; the member keeps the pointer.
        let utype = parser.tbl.lookup_type("Holder[i32]").unwrap();
        assert_eq!(utype.members[0].ty.pointer_depth, 1);
        assert!(utype.members[0].ty.flags.contains(TypeFlags::POINTER));
    }

    #[test]
    fn generic_arity_mismatch_is_an_error() {
        let (mut parser, parse_errs) = parse_source(
            "struct Pair[T, U] { a: T, b: U }\n\
             x : Pair[i32];",
        );
        assert!(!parse_errs.failed());

        let mut errs = ErrorSink::new(false);
        let ok = permute_generic_structures(&mut parser, &mut errs);
        assert!(!ok);
        assert!(errs.failed());
    }

    #[test]
    fn pointer_onto_pointer_substitution_fails() {
        let (mut parser, parse_errs) = parse_source(
            "struct Holder[T] { item: T^ }\n\
             p : Holder[i32^];",
        );
        assert!(!parse_errs.failed());

        let mut errs = ErrorSink::new(false);
        let ok = permute_generic_structures(&mut parser, &mut errs);
        assert!(!ok);
    }

    #[test]
    fn no_struct_parameters_remain_after_fixed_point() {
        let parser = postparse_ok(
            "struct Box[T] { value: T }\n\
             struct Wrap[T] { inner: Box[T] }\n\
             w : Wrap[i64];",
        );

        fn assert_resolved(ty: &TypeData) {
            if ty.kind == TypeKind::Struct {
                assert!(ty.parameters.is_none(), "unresolved params on {}", ty);
            }
            if let Some(params) = &ty.parameters {
                for param in params {
                    assert_resolved(param);
                }
            }
            if let Some(ret) = &ty.return_type {
                assert_resolved(ret);
            }
        }

        for sym in parser.tbl.symbols.values() {
            assert_resolved(&sym.ty);
        }
        for utype in parser.tbl.types.values() {
            if !utype.generic_type_names.is_empty() {
                continue;
            }
            for member in &utype.members {
                assert_resolved(&member.ty);
            }
        }
    }

    #[test]
    fn generic_member_inside_template_resolves_on_instantiation() {
        let parser = postparse_ok(
            "struct Box[T] { value: T }\n\
             struct Wrap[T] { inner: Box[T] }\n\
             w : Wrap[i64];",
        );

        let wrap = parser.tbl.lookup_type("Wrap[i64]").unwrap();
        assert_eq!(wrap.members[0].ty.struct_name(), Some("Box[i64]"));
        assert!(parser.tbl.type_exists("Box[i64]"));
    }
}
