//! The `TypeData` value type and its predicates: structural identity,
//! cast and coercion permissibility, operator legality, and the
//! pointer/array containment helpers used across the checker and the
//! code generator.

use crate::token::TokenType;
use bitflags::bitflags;
use std::fmt;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TypeFlags: u64 {
        const CONSTANT      = 1;
        const POINTER       = 1 << 1;
        const ARRAY         = 1 << 2;
        const PROCARG       = 1 << 3;
        const DEFAULT_INIT  = 1 << 4;
        const INFERRED      = 1 << 5;
        const NON_CONCRETE  = 1 << 6;
        const RVALUE        = 1 << 7;
        const PROC_VARARGS  = 1 << 8;
        const UNINITIALIZED = 1 << 9;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TypeKind {
    #[default]
    None,
    Primitive,
    Procedure,
    Struct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
    Bool,
    Void,
}

impl Primitive {
    pub fn size_bytes(self) -> u16 {
        match self {
            Primitive::Bool | Primitive::U8 | Primitive::I8 => 1,
            Primitive::U16 | Primitive::I16 => 2,
            Primitive::U32 | Primitive::I32 | Primitive::F32 => 4,
            Primitive::U64 | Primitive::I64 | Primitive::F64 => 8,
            Primitive::Void => panic!("size_bytes: void has no size"),
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, Primitive::F32 | Primitive::F64)
    }

    pub fn is_integral(self) -> bool {
        matches!(
            self,
            Primitive::U8
                | Primitive::I8
                | Primitive::U16
                | Primitive::I16
                | Primitive::U32
                | Primitive::I32
                | Primitive::U64
                | Primitive::I64
        )
    }

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            Primitive::I8
                | Primitive::I16
                | Primitive::I32
                | Primitive::I64
                | Primitive::F32
                | Primitive::F64
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Primitive::U8 => "u8",
            Primitive::I8 => "i8",
            Primitive::U16 => "u16",
            Primitive::I16 => "i16",
            Primitive::U32 => "u32",
            Primitive::I32 => "i32",
            Primitive::U64 => "u64",
            Primitive::I64 => "i64",
            Primitive::F32 => "f32",
            Primitive::F64 => "f64",
            Primitive::Bool => "bool",
            Primitive::Void => "void",
        }
    }

    /// The signed counterpart of an unsigned integer and vice versa.
    /// Booleans and void have none; floats are their own counterpart.
    fn flipped(self) -> Option<Primitive> {
        let flipped = match self {
            Primitive::U8 => Primitive::I8,
            Primitive::I8 => Primitive::U8,
            Primitive::U16 => Primitive::I16,
            Primitive::I16 => Primitive::U16,
            Primitive::U32 => Primitive::I32,
            Primitive::I32 => Primitive::U32,
            Primitive::U64 => Primitive::I64,
            Primitive::I64 => Primitive::U64,
            Primitive::F32 => Primitive::F32,
            Primitive::F64 => Primitive::F64,
            Primitive::Bool | Primitive::Void => return None,
        };

        Some(flipped)
    }
}

pub fn token_to_primitive(ty: TokenType) -> Option<Primitive> {
    let prim = match ty {
        TokenType::KwU8 => Primitive::U8,
        TokenType::KwI8 => Primitive::I8,
        TokenType::KwU16 => Primitive::U16,
        TokenType::KwI16 => Primitive::I16,
        TokenType::KwU32 => Primitive::U32,
        TokenType::KwI32 => Primitive::I32,
        TokenType::KwU64 => Primitive::U64,
        TokenType::KwI64 => Primitive::I64,
        TokenType::KwF32 => Primitive::F32,
        TokenType::KwF64 => Primitive::F64,
        TokenType::KwBool => Primitive::Bool,
        TokenType::KwVoid => Primitive::Void,
        _ => return None,
    };

    Some(prim)
}

/// The name of the type itself (not of whatever is using it). Procedures
/// have no name of their own.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TypeName {
    #[default]
    None,
    Primitive(Primitive),
    Struct(String),
    Procedure,
}

/// A fully structural type: kind, name, pointer depth, array shape, flags,
/// and (for procedures and generic struct references) parameters plus a
/// return type. Plain value semantics; the post-parser revisits every
/// embedding site when it rewrites struct names in place.
#[derive(Debug, Clone, Default)]
pub struct TypeData {
    pub sym_ref: u32,
    pub kind: TypeKind,
    pub pointer_depth: u16,
    pub flags: TypeFlags,
    pub array_lengths: Vec<u32>,
    pub parameters: Option<Vec<TypeData>>,
    pub return_type: Option<Box<TypeData>>,
    pub name: TypeName,
}

impl PartialEq for TypeData {
    fn eq(&self, other: &Self) -> bool {
        TypeData::identical(self, other)
    }
}

impl TypeData {
    pub fn primitive(&self) -> Option<Primitive> {
        match self.name {
            TypeName::Primitive(p) => Some(p),
            _ => None,
        }
    }

    pub fn struct_name(&self) -> Option<&str> {
        match &self.name {
            TypeName::Struct(name) => Some(name),
            _ => None,
        }
    }

    // -- well-known constants -------------------------------------------------

    pub fn const_bool() -> Self {
        Self {
            kind: TypeKind::Primitive,
            name: TypeName::Primitive(Primitive::Bool),
            flags: TypeFlags::CONSTANT | TypeFlags::RVALUE,
            ..Default::default()
        }
    }

    pub fn const_i32() -> Self {
        Self {
            kind: TypeKind::Primitive,
            name: TypeName::Primitive(Primitive::I32),
            flags: TypeFlags::CONSTANT | TypeFlags::RVALUE,
            ..Default::default()
        }
    }

    pub fn const_u64() -> Self {
        Self {
            kind: TypeKind::Primitive,
            name: TypeName::Primitive(Primitive::U64),
            flags: TypeFlags::CONSTANT | TypeFlags::RVALUE,
            ..Default::default()
        }
    }

    pub fn const_f64() -> Self {
        Self {
            kind: TypeKind::Primitive,
            name: TypeName::Primitive(Primitive::F64),
            flags: TypeFlags::CONSTANT | TypeFlags::RVALUE,
            ..Default::default()
        }
    }

    pub fn const_char() -> Self {
        Self {
            kind: TypeKind::Primitive,
            name: TypeName::Primitive(Primitive::I8),
            flags: TypeFlags::CONSTANT | TypeFlags::RVALUE,
            ..Default::default()
        }
    }

    pub fn const_voidptr() -> Self {
        Self {
            kind: TypeKind::Primitive,
            name: TypeName::Primitive(Primitive::Void),
            pointer_depth: 1,
            flags: TypeFlags::POINTER,
            ..Default::default()
        }
    }

    /// String literals are `i8^`.
    pub fn const_string() -> Self {
        Self {
            kind: TypeKind::Primitive,
            name: TypeName::Primitive(Primitive::I8),
            pointer_depth: 1,
            flags: TypeFlags::POINTER,
            ..Default::default()
        }
    }

    // -- shape predicates -----------------------------------------------------

    /// A scalar primitive value: named primitive, non-void, not behind a
    /// pointer or array.
    pub fn is_primitive(&self) -> bool {
        matches!(self.primitive(), Some(p) if p != Primitive::Void)
            && !self.flags.contains(TypeFlags::POINTER)
            && !self.flags.contains(TypeFlags::ARRAY)
    }

    pub fn is_floating_point(&self) -> bool {
        matches!(self.primitive(), Some(p) if p.is_float())
            && !self.flags.contains(TypeFlags::POINTER)
            && !self.flags.contains(TypeFlags::ARRAY)
    }

    pub fn is_signed_primitive(&self) -> bool {
        matches!(self.primitive(), Some(p) if p.is_signed())
            && !self.flags.contains(TypeFlags::POINTER)
            && !self.flags.contains(TypeFlags::ARRAY)
    }

    pub fn is_unsigned_primitive(&self) -> bool {
        matches!(self.primitive(), Some(p) if !p.is_signed())
            && !self.flags.contains(TypeFlags::POINTER)
            && !self.flags.contains(TypeFlags::ARRAY)
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self.primitive(), Some(Primitive::Bool))
            && !self.flags.contains(TypeFlags::POINTER)
            && !self.flags.contains(TypeFlags::ARRAY)
    }

    pub fn is_integer(&self) -> bool {
        matches!(self.primitive(), Some(p) if p != Primitive::Void && !p.is_float())
            && !self.flags.contains(TypeFlags::POINTER)
            && !self.flags.contains(TypeFlags::ARRAY)
    }

    pub fn is_f32(&self) -> bool {
        matches!(self.primitive(), Some(Primitive::F32))
            && !self.flags.contains(TypeFlags::POINTER)
            && !self.flags.contains(TypeFlags::ARRAY)
    }

    pub fn is_f64(&self) -> bool {
        matches!(self.primitive(), Some(Primitive::F64))
            && !self.flags.contains(TypeFlags::POINTER)
            && !self.flags.contains(TypeFlags::ARRAY)
    }

    pub fn is_struct_value_type(&self) -> bool {
        self.kind == TypeKind::Struct
            && !self.flags.contains(TypeFlags::POINTER)
            && !self.flags.contains(TypeFlags::ARRAY)
    }

    pub fn is_aggregate(&self) -> bool {
        self.flags.contains(TypeFlags::ARRAY)
            || (self.kind == TypeKind::Struct && !self.flags.contains(TypeFlags::POINTER))
    }

    pub fn is_non_aggregate_pointer(&self) -> bool {
        self.flags.contains(TypeFlags::POINTER) && !self.flags.contains(TypeFlags::ARRAY)
    }

    // -- identity -------------------------------------------------------------

    /// Structural identity: same kind, pointer depth, array shape, name
    /// discriminant and payload, pairwise-identical parameters, identical
    /// return type (both absent counts as identical).
    pub fn identical(first: &TypeData, second: &TypeData) -> bool {
        if first.kind != second.kind
            || first.pointer_depth != second.pointer_depth
            || first.array_lengths != second.array_lengths
        {
            return false;
        }

        match (&first.name, &second.name) {
            (TypeName::Primitive(a), TypeName::Primitive(b)) => return a == b,
            (TypeName::Struct(a), TypeName::Struct(b)) => return a == b,
            (TypeName::Procedure, TypeName::Procedure) | (TypeName::None, TypeName::None) => {}
            _ => return false,
        }

        match (&first.parameters, &second.parameters) {
            (Some(a), Some(b)) => {
                if a.len() != b.len() {
                    return false;
                }
                for (x, y) in a.iter().zip(b.iter()) {
                    if !Self::identical(x, y) {
                        return false;
                    }
                }
            }
            (None, None) => {}
            _ => return false,
        }

        match (&first.return_type, &second.return_type) {
            (Some(a), Some(b)) => Self::identical(a, b),
            (None, None) => true,
            _ => false,
        }
    }

    // -- casts and coercions --------------------------------------------------

    /// Not an array; procedures and structs only behind a pointer.
    pub fn is_cast_eligible(&self) -> bool {
        if !self.array_lengths.is_empty() {
            return false;
        }
        if self.kind == TypeKind::Procedure || self.kind == TypeKind::Struct {
            return self.pointer_depth > 0;
        }

        true
    }

    /// Explicit cast permissibility: identical, or both cast-eligible with
    /// pointer-count compatibility (ptr<->ptr always; ptr<->scalar only via
    /// u64).
    pub fn is_cast_permissible(from: &TypeData, to: &TypeData) -> bool {
        if Self::identical(from, to) {
            return true;
        }

        if !from.is_cast_eligible() || !to.is_cast_eligible() {
            return false;
        }

        let from_ptr = from.flags.contains(TypeFlags::POINTER);
        let to_ptr = to.flags.contains(TypeFlags::POINTER);

        match (from_ptr, to_ptr) {
            (true, true) | (false, false) => true,
            (true, false) => matches!(to.primitive(), Some(Primitive::U64)),
            (false, true) => matches!(from.primitive(), Some(Primitive::U64)),
        }
    }

    /// Implicit coercion of `right` into `left`. May rewrite `left` when it
    /// is a non-concrete literal type (sign and width promotion).
    pub fn is_coercion_permissible(left: &mut TypeData, right: &TypeData) -> bool {
        if Self::identical(left, right) {
            return true;
        }

        if !left.is_cast_eligible() || !right.is_cast_eligible() {
            return false;
        }

        let left_ptr = left.flags.contains(TypeFlags::POINTER);
        let right_ptr = right.flags.contains(TypeFlags::POINTER);

        if left_ptr && right_ptr {
            let left_is_voidptr =
                matches!(left.primitive(), Some(Primitive::Void)) && left.pointer_depth == 1;
            return left_is_voidptr || right.flags.contains(TypeFlags::NON_CONCRETE);
        }
        if left_ptr || right_ptr {
            return false;
        }

        let (left_p, right_p) = match (left.primitive(), right.primitive()) {
            (Some(l), Some(r)) => (l, r),
            _ => return false,
        };

        if right_p.is_float() && !left_p.is_float() {
            return false;
        }

        if left.flags.contains(TypeFlags::NON_CONCRETE) && !left_p.is_float() {
            return Self::promote_non_concrete(left, right);
        }

        right_p.size_bytes() <= left_p.size_bytes()
    }

    /// Non-concrete promotion: adopt the wider side; if either side is
    /// signed, the result's unsigned primitive becomes its signed
    /// counterpart.
    pub fn promote_non_concrete(left: &mut TypeData, right: &TypeData) -> bool {
        let left_p = left.primitive().expect("non-concrete side is primitive");
        let right_p = right.primitive().expect("concrete side is primitive");
        let is_signed = left_p.is_signed() || right_p.is_signed();

        if right_p.size_bytes() > left_p.size_bytes() {
            *left = right.clone();
        }

        if is_signed {
            if let Some(p) = left.primitive() {
                if !p.is_signed() {
                    if let Some(flipped) = p.flipped() {
                        left.name = TypeName::Primitive(flipped);
                    }
                }
            }
        }

        true
    }

    /// Array-shape equivalence: same dimension count, matching sizes where
    /// the declared side pins them (0 = inferred), coercible element types.
    pub fn are_arrays_equivalent(first: &TypeData, second: &TypeData) -> bool {
        assert!(first.flags.contains(TypeFlags::ARRAY));
        assert!(second.flags.contains(TypeFlags::ARRAY));

        if first.array_lengths.len() != second.array_lengths.len() {
            return false;
        }

        for (a, b) in first.array_lengths.iter().zip(second.array_lengths.iter()) {
            if *a != 0 && a != b {
                return false;
            }
        }

        let mut first_contained = first.clone();
        let mut second_contained = second.clone();
        first_contained.array_lengths.clear();
        second_contained.array_lengths.clear();
        first_contained.flags.remove(TypeFlags::ARRAY);
        second_contained.flags.remove(TypeFlags::ARRAY);

        Self::is_coercion_permissible(&mut first_contained, &second_contained)
    }

    // -- operator legality ----------------------------------------------------

    pub fn is_arithmetic_eligible(&self, op: TokenType) -> bool {
        assert!(op.is_arithmetic_op());

        if (self.kind == TypeKind::Procedure && self.pointer_depth < 2)
            || !self.array_lengths.is_empty()
        {
            return false;
        }

        if matches!(self.primitive(), Some(Primitive::Void)) && self.pointer_depth < 2 {
            return false;
        }

        if self.flags.contains(TypeFlags::POINTER) {
            return op.is_valid_ptr_arith_op();
        }

        let prim = match self.primitive() {
            Some(p) => p,
            None => return false,
        };

        if prim.is_float() {
            return op != TokenType::Mod && op != TokenType::ModEq;
        }

        true
    }

    /// Bitwise eligibility: integral, non-float, non-pointer, non-array.
    pub fn is_bwop_eligible(&self) -> bool {
        let prim = match self.primitive() {
            Some(p) => p,
            None => return false,
        };

        self.pointer_depth == 0
            && self.kind == TypeKind::Primitive
            && self.array_lengths.is_empty()
            && prim != Primitive::Void
            && !prim.is_float()
    }

    /// Logical eligibility: primitives and pointers, never arrays.
    pub fn is_lop_eligible(&self) -> bool {
        (self.flags.contains(TypeFlags::POINTER) || self.kind == TypeKind::Primitive)
            && self.array_lengths.is_empty()
    }

    pub fn can_operator_be_applied_to(op: TokenType, ty: &TypeData) -> bool {
        if ty.flags.contains(TypeFlags::ARRAY) {
            return false;
        }

        let assignable =
            !ty.flags.contains(TypeFlags::CONSTANT) && !ty.flags.contains(TypeFlags::RVALUE);

        if op == TokenType::ValueAssignment {
            return assignable;
        }
        if op.is_arith_assign_op() {
            return ty.is_arithmetic_eligible(op) && assignable;
        }
        if op.is_arithmetic_op() {
            return ty.is_arithmetic_eligible(op);
        }
        if op.is_bw_assign_op() {
            return ty.is_bwop_eligible() && assignable;
        }
        if op.is_bitwise_op() {
            return ty.is_bwop_eligible();
        }
        if op.is_logical_op() {
            return ty.is_lop_eligible();
        }

        panic!("can_operator_be_applied_to: {:?} is not an operator", op);
    }

    // -- containment ----------------------------------------------------------

    /// Strips one array dimension (the outermost, at the front of the
    /// outer-to-inner shape) or one pointer level. Fails on
    /// non-dereferenceable types (naked procedures, `void`).
    pub fn get_contained(&self) -> Option<TypeData> {
        let mut deref = self.clone();

        if deref.flags.contains(TypeFlags::ARRAY) {
            assert!(!deref.array_lengths.is_empty());
            deref.array_lengths.remove(0);
            if deref.array_lengths.is_empty() {
                deref.flags.remove(TypeFlags::ARRAY);
            }
        } else if deref.flags.contains(TypeFlags::POINTER) {
            assert!(deref.pointer_depth > 0);
            deref.pointer_depth -= 1;
            if deref.pointer_depth == 0 {
                deref.flags.remove(TypeFlags::POINTER);
            }
        } else {
            return None;
        }

        if deref.kind == TypeKind::Procedure && !deref.flags.contains(TypeFlags::POINTER) {
            return None;
        }
        if matches!(deref.primitive(), Some(Primitive::Void))
            && !deref.flags.contains(TypeFlags::POINTER)
        {
            return None;
        }

        deref.flags.remove(TypeFlags::RVALUE);
        Some(deref)
    }

    /// Adds one pointer level; the result is an rvalue. Fails on arrays and
    /// rvalues.
    pub fn get_pointer_to(&self) -> Option<TypeData> {
        if self.flags.contains(TypeFlags::ARRAY) || self.flags.contains(TypeFlags::RVALUE) {
            return None;
        }

        let mut addressed = self.clone();
        addressed.pointer_depth += 1;
        addressed.flags.insert(TypeFlags::POINTER | TypeFlags::RVALUE);
        Some(addressed)
    }

    /// The element type at the bottom of every array dimension.
    pub fn get_lowest_array_type(&self) -> Option<TypeData> {
        if !self.flags.contains(TypeFlags::ARRAY) {
            return None;
        }

        let mut lowest = self.clone();
        lowest.array_lengths.clear();
        lowest.flags.remove(TypeFlags::ARRAY);
        Some(lowest)
    }

    /// Toggles signed <-> unsigned on an integral primitive. Floats pass
    /// through unchanged; `bool` and `void` fail.
    pub fn flip_sign(&mut self) -> bool {
        let prim = match self.primitive() {
            Some(p) => p,
            None => return false,
        };

        match prim.flipped() {
            Some(flipped) => {
                self.name = TypeName::Primitive(flipped);
                true
            }
            None => false,
        }
    }

    pub fn array_has_inferred_sizes(&self) -> bool {
        self.array_lengths.iter().any(|len| *len == 0)
    }

    /// Naked procedures and still-inferred types cannot seed inference.
    pub fn is_invalid_in_inferred_context(&self) -> bool {
        (self.kind == TypeKind::Procedure && !self.flags.contains(TypeFlags::POINTER))
            || self.flags.contains(TypeFlags::INFERRED)
    }

    pub fn is_reassignable(&self) -> bool {
        self.array_lengths.is_empty()
            && !(self.kind == TypeKind::Procedure && self.pointer_depth < 1)
            && !self.flags.contains(TypeFlags::CONSTANT)
    }

    /// Struct value returns keep lvalue-ness; everything else demotes to an
    /// rvalue at call sites.
    pub fn is_returntype_lvalue_eligible(&self) -> bool {
        self.kind == TypeKind::Struct
            && !self.flags.contains(TypeFlags::POINTER)
            && !self.flags.contains(TypeFlags::ARRAY)
    }

    pub fn to_rvalue(&self) -> TypeData {
        let mut rval = self.clone();
        rval.flags.insert(TypeFlags::RVALUE);
        rval
    }

    pub fn to_lvalue(&self) -> TypeData {
        let mut lval = self.clone();
        lval.flags.remove(TypeFlags::RVALUE);
        lval
    }

    // -- display --------------------------------------------------------------

    /// Renders the type. With qualifiers and postfixes disabled this doubles
    /// as the mangled name of a generic struct instantiation:
    /// `Name[arg1,arg2]`.
    pub fn to_string_opts(&self, include_qualifiers: bool, include_postfixes: bool) -> String {
        let mut buffer = String::new();
        let mut is_proc = false;
        let mut is_struct = false;

        if include_qualifiers {
            if self.flags.contains(TypeFlags::INFERRED) {
                return "Invalid Type".to_string();
            }
            if self.flags.contains(TypeFlags::CONSTANT) {
                buffer.push_str("const ");
            }
            if self.flags.contains(TypeFlags::RVALUE) {
                buffer.push_str("rvalue ");
            }
        }

        match &self.name {
            TypeName::Primitive(p) => buffer.push_str(p.as_str()),
            TypeName::Struct(name) => {
                buffer.push_str(name);
                is_struct = true;
            }
            TypeName::Procedure | TypeName::None => {
                buffer.push_str("proc");
                is_proc = true;
            }
        }

        if is_struct {
            if let Some(params) = &self.parameters {
                buffer.push('[');
                for param in params {
                    buffer.push_str(&param.to_string_opts(false, false));
                    buffer.push(',');
                }
                if buffer.ends_with(',') {
                    buffer.pop();
                }
                buffer.push(']');
            }
        }

        if include_postfixes {
            for _ in 0..self.pointer_depth {
                buffer.push('^');
            }
            if self.flags.contains(TypeFlags::ARRAY) {
                for len in &self.array_lengths {
                    if *len == 0 {
                        buffer.push_str("[]");
                    } else {
                        buffer.push_str(&format!("[{}]", len));
                    }
                }
            }
        }

        if is_proc {
            buffer.push('(');
            if let Some(params) = &self.parameters {
                for param in params {
                    buffer.push_str(&param.to_string_opts(true, true));
                    buffer.push(',');
                }
            }
            if self.flags.contains(TypeFlags::PROC_VARARGS) {
                buffer.push_str("...");
            }
            if buffer.ends_with(',') {
                buffer.pop();
            }
            buffer.push_str(") -> ");
            match &self.return_type {
                Some(ret) => buffer.push_str(&ret.to_string_opts(true, true)),
                None => buffer.push_str("void"),
            }
        }

        buffer
    }

    /// The key a generic struct instantiation is registered under.
    pub fn mangled_name(&self) -> String {
        self.to_string_opts(false, false)
    }
}

impl fmt::Display for TypeData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_opts(true, true))
    }
}

/// Shorthand constructors used throughout the tests.
#[cfg(test)]
pub mod build {
    use super::*;

    pub fn prim(p: Primitive) -> TypeData {
        TypeData {
            kind: TypeKind::Primitive,
            name: TypeName::Primitive(p),
            ..Default::default()
        }
    }

    pub fn ptr(p: Primitive, depth: u16) -> TypeData {
        TypeData {
            kind: TypeKind::Primitive,
            name: TypeName::Primitive(p),
            pointer_depth: depth,
            flags: TypeFlags::POINTER,
            ..Default::default()
        }
    }

    pub fn array(p: Primitive, lens: &[u32]) -> TypeData {
        TypeData {
            kind: TypeKind::Primitive,
            name: TypeName::Primitive(p),
            array_lengths: lens.to_vec(),
            flags: TypeFlags::ARRAY,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::build::*;
    use super::*;

    #[test]
    fn identity_is_reflexive_symmetric() {
        let a = prim(Primitive::I32);
        let b = prim(Primitive::I32);
        let c = prim(Primitive::U32);

        assert!(TypeData::identical(&a, &a));
        assert!(TypeData::identical(&a, &b));
        assert!(TypeData::identical(&b, &a));
        assert!(!TypeData::identical(&a, &c));
    }

    #[test]
    fn identity_is_transitive_over_procs() {
        let make = || TypeData {
            kind: TypeKind::Procedure,
            name: TypeName::Procedure,
            parameters: Some(vec![prim(Primitive::I32), ptr(Primitive::U8, 1)]),
            return_type: Some(Box::new(prim(Primitive::Bool))),
            ..Default::default()
        };

        let (a, b, c) = (make(), make(), make());
        assert!(TypeData::identical(&a, &b));
        assert!(TypeData::identical(&b, &c));
        assert!(TypeData::identical(&a, &c));
    }

    #[test]
    fn identity_respects_array_shape() {
        assert!(!TypeData::identical(
            &array(Primitive::I32, &[3]),
            &array(Primitive::I32, &[4])
        ));
        assert!(!TypeData::identical(
            &array(Primitive::I32, &[3]),
            &array(Primitive::I32, &[3, 2])
        ));
    }

    #[test]
    fn coercion_is_not_symmetric() {
        let mut i32_t = prim(Primitive::I32);
        let i8_t = prim(Primitive::I8);
        assert!(TypeData::is_coercion_permissible(&mut i32_t, &i8_t));

        let mut i8_t = prim(Primitive::I8);
        let i32_t = prim(Primitive::I32);
        assert!(!TypeData::is_coercion_permissible(&mut i8_t, &i32_t));
    }

    #[test]
    fn float_never_coerces_into_integer() {
        let mut i64_t = prim(Primitive::I64);
        let f32_t = prim(Primitive::F32);
        assert!(!TypeData::is_coercion_permissible(&mut i64_t, &f32_t));
    }

    #[test]
    fn voidptr_accepts_any_pointer() {
        let mut voidp = TypeData {
            kind: TypeKind::Primitive,
            ..ptr(Primitive::Void, 1)
        };
        let i32p = ptr(Primitive::I32, 1);
        assert!(TypeData::is_coercion_permissible(&mut voidp, &i32p));

        let mut i32p = ptr(Primitive::I32, 1);
        let u8p = ptr(Primitive::U8, 1);
        assert!(!TypeData::is_coercion_permissible(&mut i32p, &u8p));
    }

    #[test]
    fn non_concrete_promotes_to_signed() {
        let mut lit = prim(Primitive::U8);
        lit.flags.insert(TypeFlags::NON_CONCRETE);

        let i32_t = prim(Primitive::I32);
        assert!(TypeData::is_coercion_permissible(&mut lit, &i32_t));
        assert_eq!(lit.primitive(), Some(Primitive::I32));
    }

    #[test]
    fn pointer_to_u64_casts_both_ways() {
        let p = ptr(Primitive::I32, 1);
        let u64_t = prim(Primitive::U64);
        let i64_t = prim(Primitive::I64);

        assert!(TypeData::is_cast_permissible(&p, &u64_t));
        assert!(TypeData::is_cast_permissible(&u64_t, &p));
        assert!(!TypeData::is_cast_permissible(&p, &i64_t));
    }

    #[test]
    fn arrays_are_never_castable() {
        let arr = array(Primitive::I32, &[4]);
        assert!(!TypeData::is_cast_permissible(&arr, &prim(Primitive::U64)));
    }

    #[test]
    fn struct_casts_require_pointer() {
        let sval = TypeData {
            kind: TypeKind::Struct,
            name: TypeName::Struct("Foo".into()),
            ..Default::default()
        };
        assert!(!sval.is_cast_eligible());

        let mut sptr = sval.clone();
        sptr.pointer_depth = 1;
        sptr.flags.insert(TypeFlags::POINTER);
        assert!(sptr.is_cast_eligible());
    }

    #[test]
    fn get_contained_strips_outermost_dimension() {
        // Shapes are outer-to-inner: [3, 2] is three rows of two.
        let arr = array(Primitive::I32, &[3, 2]);
        let inner = arr.get_contained().unwrap();
        assert_eq!(inner.array_lengths, vec![2]);

        let innermost = inner.get_contained().unwrap();
        assert!(innermost.array_lengths.is_empty());
        assert!(!innermost.flags.contains(TypeFlags::ARRAY));
    }

    #[test]
    fn get_contained_fails_on_scalar_and_voidptr_bottom() {
        assert!(prim(Primitive::I32).get_contained().is_none());
        assert!(ptr(Primitive::Void, 1).get_contained().is_none());
        assert!(ptr(Primitive::Void, 2).get_contained().is_some());
    }

    #[test]
    fn get_pointer_to_rejects_arrays_and_rvalues() {
        assert!(array(Primitive::I32, &[2]).get_pointer_to().is_none());

        let mut rval = prim(Primitive::I32);
        rval.flags.insert(TypeFlags::RVALUE);
        assert!(rval.get_pointer_to().is_none());

        let addressed = prim(Primitive::I32).get_pointer_to().unwrap();
        assert_eq!(addressed.pointer_depth, 1);
        assert!(addressed.flags.contains(TypeFlags::RVALUE));
    }

    #[test]
    fn flip_sign_behavior() {
        let mut t = prim(Primitive::U32);
        assert!(t.flip_sign());
        assert_eq!(t.primitive(), Some(Primitive::I32));

        let mut f = prim(Primitive::F64);
        assert!(f.flip_sign());
        assert_eq!(f.primitive(), Some(Primitive::F64));

        let mut b = prim(Primitive::Bool);
        assert!(!b.flip_sign());
    }

    #[test]
    fn pointer_arithmetic_legality() {
        let p = ptr(Primitive::I32, 1);
        assert!(p.is_arithmetic_eligible(TokenType::Plus));
        assert!(p.is_arithmetic_eligible(TokenType::SubEq));
        assert!(!p.is_arithmetic_eligible(TokenType::Mul));

        let voidp = ptr(Primitive::Void, 1);
        assert!(!voidp.is_arithmetic_eligible(TokenType::Plus));
    }

    #[test]
    fn modulo_is_illegal_on_floats() {
        let f = prim(Primitive::F32);
        assert!(f.is_arithmetic_eligible(TokenType::Plus));
        assert!(!f.is_arithmetic_eligible(TokenType::Mod));
    }

    #[test]
    fn assignment_requires_mutable_lvalue() {
        let mut t = prim(Primitive::I32);
        assert!(TypeData::can_operator_be_applied_to(
            TokenType::ValueAssignment,
            &t
        ));

        t.flags.insert(TypeFlags::CONSTANT);
        assert!(!TypeData::can_operator_be_applied_to(
            TokenType::ValueAssignment,
            &t
        ));

        let mut rval = prim(Primitive::I32);
        rval.flags.insert(TypeFlags::RVALUE);
        assert!(!TypeData::can_operator_be_applied_to(
            TokenType::ValueAssignment,
            &rval
        ));
    }

    #[test]
    fn array_equivalence_allows_inferred_sizes() {
        let declared = array(Primitive::I32, &[0, 2]);
        let inferred = array(Primitive::I32, &[3, 2]);
        assert!(TypeData::are_arrays_equivalent(&declared, &inferred));

        let mismatched = array(Primitive::I32, &[3, 4]);
        assert!(!TypeData::are_arrays_equivalent(&declared, &mismatched));
    }

    #[test]
    fn display_renders_postfixes() {
        let mut t = ptr(Primitive::I32, 2);
        t.array_lengths = vec![4];
        t.flags.insert(TypeFlags::ARRAY);
        assert_eq!(t.to_string_opts(true, true), "i32^^[4]");
    }

    #[test]
    fn mangled_name_inlines_generic_args() {
        let t = TypeData {
            kind: TypeKind::Struct,
            name: TypeName::Struct("Pair".into()),
            parameters: Some(vec![prim(Primitive::I32), prim(Primitive::Bool)]),
            ..Default::default()
        };
        assert_eq!(t.mangled_name(), "Pair[i32,bool]");
    }

    #[test]
    fn proc_display_includes_signature() {
        let t = TypeData {
            kind: TypeKind::Procedure,
            name: TypeName::Procedure,
            parameters: Some(vec![prim(Primitive::I32)]),
            return_type: Some(Box::new(prim(Primitive::Bool))),
            ..Default::default()
        };
        assert_eq!(t.to_string_opts(true, true), "proc(i32) -> bool");
    }
}
