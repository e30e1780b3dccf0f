//! The entity table: scoped symbols, user-defined types, type aliases and
//! the namespace stack. Everything downstream of the parser refers to
//! symbols by their 32-bit index and to types by canonical name.

use crate::types::{TypeData, TypeKind};
use bitflags::bitflags;
use std::collections::{HashMap, HashSet};

pub const INVALID_SYMBOL_INDEX: u32 = 0;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct EntityFlags: u32 {
        const GLOBAL         = 1;
        const FOREIGN        = 1 << 1;
        const FOREIGN_C      = 1 << 2;
        const INTERNAL       = 1 << 3;
        const PLACEHOLDER    = 1 << 4;
        const GENERIC_BASE   = 1 << 5;
        const POSTPARSE_DONE = 1 << 6;
    }
}

/// A declared entity. The index is the sole stable handle: AST identifier
/// nodes store it, the code generator keys locals on it.
#[derive(Debug, Clone)]
pub struct Symbol {
    pub index: u32,
    pub name: String,
    pub file: String,
    pub pos: usize,
    pub line: u32,
    pub ty: TypeData,
    pub flags: EntityFlags,
    pub generic_type_names: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct MemberData {
    pub name: String,
    pub ty: TypeData,
}

/// A struct definition. Generic templates carry their parameter names and
/// are never lowered; monomorphized instances are separate entries keyed by
/// mangled name.
#[derive(Debug, Clone)]
pub struct UserType {
    pub name: String,
    pub members: Vec<MemberData>,
    pub generic_type_names: Vec<String>,
    pub postparse_done: bool,
    pub file: String,
    pub pos: usize,
    pub line: u32,
}

#[derive(Debug, Default)]
pub struct EntityTable {
    pub symbols: HashMap<u32, Symbol>,
    pub types: HashMap<String, UserType>,
    pub type_aliases: HashMap<String, TypeData>,
    pub scope_stack: Vec<HashMap<String, u32>>,
    pub namespace_stack: Vec<String>,
    known_namespaces: HashSet<String>,
    next_index: u32,
}

impl EntityTable {
    pub fn new() -> Self {
        Self {
            scope_stack: vec![HashMap::new()],
            next_index: 1,
            ..Default::default()
        }
    }

    // -- scopes ---------------------------------------------------------------

    pub fn push_scope(&mut self) {
        self.scope_stack.push(HashMap::new());
    }

    pub fn pop_scope(&mut self) {
        assert!(self.scope_stack.len() > 1, "cannot pop the global scope");
        self.scope_stack.pop();
    }

    pub fn scope_depth(&self) -> usize {
        self.scope_stack.len()
    }

    pub fn at_global_scope(&self) -> bool {
        self.scope_stack.len() <= 1
    }

    pub fn scoped_symbol_exists(&self, name: &str) -> bool {
        self.scope_stack
            .iter()
            .rev()
            .any(|scope| scope.contains_key(name))
    }

    pub fn scoped_symbol_exists_at_current_scope(&self, name: &str) -> bool {
        self.scope_stack
            .last()
            .map(|scope| scope.contains_key(name))
            .unwrap_or(false)
    }

    /// Innermost-out lookup. Returns [`INVALID_SYMBOL_INDEX`] when absent.
    pub fn lookup_scoped_symbol(&self, name: &str) -> u32 {
        for scope in self.scope_stack.iter().rev() {
            if let Some(&index) = scope.get(name) {
                return index;
            }
        }

        INVALID_SYMBOL_INDEX
    }

    // -- symbols --------------------------------------------------------------

    pub fn lookup_symbol(&self, index: u32) -> Option<&Symbol> {
        self.symbols.get(&index)
    }

    pub fn lookup_symbol_mut(&mut self, index: u32) -> Option<&mut Symbol> {
        self.symbols.get_mut(&index)
    }

    /// Installs a symbol under the innermost scope. `name` must already be
    /// canonical (namespace-qualified) and absent from the current scope.
    pub fn create_symbol(
        &mut self,
        name: impl Into<String>,
        file: impl Into<String>,
        pos: usize,
        line: u32,
        kind: TypeKind,
        flags: EntityFlags,
        ty: Option<TypeData>,
    ) -> u32 {
        let name = name.into();
        assert!(
            !self.scoped_symbol_exists_at_current_scope(&name),
            "create_symbol: \"{}\" already exists at this scope",
            name
        );

        let index = self.next_index;
        self.next_index += 1;

        let mut ty = ty.unwrap_or_default();
        ty.kind = kind;
        ty.sym_ref = index;

        self.symbols.insert(
            index,
            Symbol {
                index,
                name: name.clone(),
                file: file.into(),
                pos,
                line,
                ty,
                flags,
                generic_type_names: Vec::new(),
            },
        );

        self.scope_stack
            .last_mut()
            .expect("scope stack is never empty")
            .insert(name, index);

        index
    }

    /// Installs a placeholder in the global scope for a forward reference
    /// to a namespaced symbol. The eventual declaration overwrites it.
    pub fn create_global_placeholder(
        &mut self,
        name: impl Into<String>,
        file: impl Into<String>,
        pos: usize,
        line: u32,
    ) -> u32 {
        let name = name.into();
        assert!(!self.scope_stack[0].contains_key(&name));

        let index = self.next_index;
        self.next_index += 1;

        self.symbols.insert(
            index,
            Symbol {
                index,
                name: name.clone(),
                file: file.into(),
                pos,
                line,
                ty: TypeData::default(),
                flags: EntityFlags::GLOBAL | EntityFlags::PLACEHOLDER,
                generic_type_names: Vec::new(),
            },
        );

        self.scope_stack[0].insert(name, index);
        index
    }

    pub fn max_symbol_index(&self) -> u32 {
        self.next_index - 1
    }

    // -- user types and aliases -----------------------------------------------

    pub fn create_type(
        &mut self,
        name: impl Into<String>,
        members: Vec<MemberData>,
        file: impl Into<String>,
        pos: usize,
        line: u32,
    ) -> bool {
        let name = name.into();
        if self.types.contains_key(&name) {
            return false;
        }

        self.types.insert(
            name.clone(),
            UserType {
                name,
                members,
                generic_type_names: Vec::new(),
                postparse_done: false,
                file: file.into(),
                pos,
                line,
            },
        );

        true
    }

    pub fn type_exists(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn lookup_type(&self, name: &str) -> Option<&UserType> {
        self.types.get(name)
    }

    pub fn lookup_type_mut(&mut self, name: &str) -> Option<&mut UserType> {
        self.types.get_mut(name)
    }

    pub fn create_type_alias(&mut self, name: impl Into<String>, ty: TypeData) -> bool {
        let name = name.into();
        if self.type_aliases.contains_key(&name) {
            return false;
        }

        self.type_aliases.insert(name, ty);
        true
    }

    pub fn type_alias_exists(&self, name: &str) -> bool {
        self.type_aliases.contains_key(name)
    }

    pub fn lookup_type_alias(&self, name: &str) -> Option<TypeData> {
        self.type_aliases.get(name).cloned()
    }

    // -- namespaces -----------------------------------------------------------

    /// Enters a namespace component. Re-entering a component that is already
    /// on the stack is rejected to prevent nested shadowing.
    pub fn enter_namespace(&mut self, name: impl Into<String>) -> bool {
        let name = name.into();
        if self.namespace_stack.contains(&name) {
            return false;
        }

        self.namespace_stack.push(name);
        self.known_namespaces
            .insert(self.namespace_stack.join("\\"));
        true
    }

    pub fn leave_namespace(&mut self) {
        self.namespace_stack.pop();
    }

    /// True when a namespace with this full path, or with this name as a
    /// component of any registered path, exists.
    pub fn namespace_exists(&self, name: &str) -> bool {
        self.known_namespaces.contains(name)
            || self
                .known_namespaces
                .iter()
                .any(|path| path.split('\\').any(|component| component == name))
    }

    /// The current namespace prefix including a trailing separator, or an
    /// empty string at the root.
    pub fn namespace_as_string(&self) -> String {
        if self.namespace_stack.is_empty() {
            String::new()
        } else {
            format!("{}\\", self.namespace_stack.join("\\"))
        }
    }

    /// Qualifies `name` under the current namespace unless it is absolute.
    pub fn qualified_name(&self, name: &str) -> String {
        if let Some(absolute) = name.strip_prefix('\\') {
            absolute.to_string()
        } else {
            format!("{}{}", self.namespace_as_string(), name)
        }
    }

    /// Resolution for symbol references: try the name under each
    /// progressively shorter namespace prefix, then the name as given.
    /// Returns the first that exists in any scope, else the input.
    pub fn get_canonical_sym_name(&self, name: &str) -> String {
        if let Some(absolute) = name.strip_prefix('\\') {
            return absolute.to_string();
        }

        for depth in (1..=self.namespace_stack.len()).rev() {
            let candidate = format!("{}\\{}", self.namespace_stack[..depth].join("\\"), name);
            if self.scoped_symbol_exists(&candidate) {
                return candidate;
            }
        }

        name.to_string()
    }

    /// Same resolution against the user-type and alias registries.
    pub fn get_canonical_type_name(&self, name: &str) -> String {
        if let Some(absolute) = name.strip_prefix('\\') {
            return absolute.to_string();
        }

        for depth in (1..=self.namespace_stack.len()).rev() {
            let candidate = format!("{}\\{}", self.namespace_stack[..depth].join("\\"), name);
            if self.type_exists(&candidate) || self.type_alias_exists(&candidate) {
                return candidate;
            }
        }

        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Primitive, TypeName};

    fn i32_type() -> TypeData {
        TypeData {
            kind: TypeKind::Primitive,
            name: TypeName::Primitive(Primitive::I32),
            ..Default::default()
        }
    }

    #[test]
    fn symbol_indices_are_dense_and_unique() {
        let mut tbl = EntityTable::new();
        let a = tbl.create_symbol(
            "a",
            "t.tak",
            0,
            1,
            TypeKind::Primitive,
            EntityFlags::GLOBAL,
            Some(i32_type()),
        );
        let b = tbl.create_symbol(
            "b",
            "t.tak",
            5,
            1,
            TypeKind::Primitive,
            EntityFlags::GLOBAL,
            Some(i32_type()),
        );

        assert_eq!(a, 1);
        assert_eq!(b, 2);
        assert_eq!(tbl.max_symbol_index(), 2);
        assert_eq!(tbl.lookup_symbol(a).unwrap().name, "a");
        assert_eq!(tbl.lookup_symbol(b).unwrap().name, "b");
    }

    #[test]
    fn inner_scopes_shadow_and_pop() {
        let mut tbl = EntityTable::new();
        let outer = tbl.create_symbol(
            "x",
            "t.tak",
            0,
            1,
            TypeKind::Primitive,
            EntityFlags::GLOBAL,
            Some(i32_type()),
        );

        tbl.push_scope();
        assert!(!tbl.scoped_symbol_exists_at_current_scope("x"));
        assert!(tbl.scoped_symbol_exists("x"));

        let inner = tbl.create_symbol(
            "x",
            "t.tak",
            10,
            2,
            TypeKind::Primitive,
            EntityFlags::empty(),
            Some(i32_type()),
        );
        assert_eq!(tbl.lookup_scoped_symbol("x"), inner);

        tbl.pop_scope();
        assert_eq!(tbl.lookup_scoped_symbol("x"), outer);
    }

    #[test]
    fn namespaces_qualify_names() {
        let mut tbl = EntityTable::new();
        assert!(tbl.enter_namespace("core"));
        assert!(tbl.enter_namespace("io"));
        assert_eq!(tbl.namespace_as_string(), "core\\io\\");
        assert_eq!(tbl.qualified_name("write"), "core\\io\\write");
        assert_eq!(tbl.qualified_name("\\main"), "main");

        tbl.leave_namespace();
        assert_eq!(tbl.namespace_as_string(), "core\\");
    }

    #[test]
    fn reentering_a_namespace_component_is_rejected() {
        let mut tbl = EntityTable::new();
        assert!(tbl.enter_namespace("core"));
        assert!(!tbl.enter_namespace("core"));
        assert!(tbl.enter_namespace("inner"));
        assert!(!tbl.enter_namespace("core"));
    }

    #[test]
    fn canonical_resolution_prefers_deepest_prefix() {
        let mut tbl = EntityTable::new();
        tbl.enter_namespace("a");
        tbl.create_symbol(
            "a\\x",
            "t.tak",
            0,
            1,
            TypeKind::Primitive,
            EntityFlags::GLOBAL,
            Some(i32_type()),
        );

        tbl.enter_namespace("b");
        tbl.create_symbol(
            "a\\b\\x",
            "t.tak",
            10,
            2,
            TypeKind::Primitive,
            EntityFlags::GLOBAL,
            Some(i32_type()),
        );

        assert_eq!(tbl.get_canonical_sym_name("x"), "a\\b\\x");
        tbl.leave_namespace();
        assert_eq!(tbl.get_canonical_sym_name("x"), "a\\x");
        tbl.leave_namespace();
        assert_eq!(tbl.get_canonical_sym_name("x"), "x");
    }

    #[test]
    fn canonical_type_resolution_covers_aliases() {
        let mut tbl = EntityTable::new();
        tbl.enter_namespace("gfx");
        tbl.create_type_alias("gfx\\Handle", i32_type());
        assert_eq!(tbl.get_canonical_type_name("Handle"), "gfx\\Handle");
        assert!(tbl.lookup_type_alias("gfx\\Handle").is_some());
    }

    #[test]
    fn duplicate_type_is_rejected() {
        let mut tbl = EntityTable::new();
        assert!(tbl.create_type("Foo", Vec::new(), "t.tak", 0, 1));
        assert!(!tbl.create_type("Foo", Vec::new(), "t.tak", 5, 2));
    }

    #[test]
    fn namespace_component_lookup() {
        let mut tbl = EntityTable::new();
        tbl.enter_namespace("outer");
        tbl.enter_namespace("inner");
        tbl.leave_namespace();
        tbl.leave_namespace();

        assert!(tbl.namespace_exists("outer"));
        assert!(tbl.namespace_exists("inner"));
        assert!(tbl.namespace_exists("outer\\inner"));
        assert!(!tbl.namespace_exists("elsewhere"));
    }
}
