//! Token model: specific token types, token classes, operator precedence
//! and the operator classification predicates used by the parser, checker
//! and code generator.

/// Specific token tag. Token equality throughout the compiler compares this
/// tag only; the slice and position are payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenType {
    None,
    EndOfFile,
    Illegal,
    Identifier,
    ValueAssignment,
    TypeAssignment,
    ConstTypeAssignment,
    Semicolon,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LSquare,
    RSquare,
    Comma,
    Dot,
    ThreeDots,
    QuestionMark,
    Pound,
    At,
    CompEquals,
    CompNotEquals,
    CompLt,
    CompLte,
    CompGt,
    CompGte,
    NamespaceAccess,
    ConditionalAnd,
    ConditionalOr,
    ConditionalNot,
    IntegerLiteral,
    FloatLiteral,
    StringLiteral,
    CharacterLiteral,
    BooleanLiteral,
    HexLiteral,
    Plus,
    PlusEq,
    Sub,
    SubEq,
    Mul,
    MulEq,
    Div,
    DivEq,
    Mod,
    ModEq,
    Increment,
    Decrement,
    BitwiseAnd,
    BitwiseAndEq,
    BitwiseNot,
    BitwiseOr,
    BitwiseOrEq,
    XorOrPtr,
    BitwiseXorEq,
    Lshift,
    LshiftEq,
    Rshift,
    RshiftEq,
    KwRet,
    KwBrk,
    KwCont,
    KwFor,
    KwWhile,
    KwDo,
    KwIf,
    KwElse,
    KwStruct,
    KwEnum,
    KwSwitch,
    KwCase,
    KwDefault,
    KwFallthrough,
    KwNamespace,
    KwDefer,
    KwDeferIf,
    KwProc,
    KwBlk,
    KwCast,
    KwSizeof,
    KwF32,
    KwF64,
    KwBool,
    KwU8,
    KwI8,
    KwU16,
    KwI16,
    KwU32,
    KwI32,
    KwU64,
    KwI64,
    KwVoid,
    KwNullptr,
    Arrow,
}

/// Broad token class. Drives dispatch in the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TokenKind {
    #[default]
    Unspecific,
    Punctuator,
    BinaryOp,
    UnaryOp,
    Literal,
    Keyword,
    TypeIdent,
}

/// A lexed token. `value` borrows the source buffer; the parser copies what
/// it keeps (literal payloads, identifier names) into owned strings.
#[derive(Debug, Clone, Copy)]
pub struct Token<'s> {
    pub ty: TokenType,
    pub kind: TokenKind,
    pub pos: usize,
    pub line: u32,
    pub value: &'s str,
}

impl<'s> Token<'s> {
    pub fn new(ty: TokenType, kind: TokenKind, pos: usize, line: u32, value: &'s str) -> Self {
        Self {
            ty,
            kind,
            pos,
            line,
            value,
        }
    }

    pub fn eof(pos: usize, line: u32) -> Self {
        Self::new(TokenType::EndOfFile, TokenKind::Unspecific, pos, line, "\\0")
    }

    pub fn is(&self, ty: TokenType) -> bool {
        self.ty == ty
    }

    /// `&x`, `-x`, `+x`, `^x` reuse binary tags, so unary validity checks
    /// both the class and the specific tag.
    pub fn is_valid_unary_operator(&self) -> bool {
        self.kind == TokenKind::UnaryOp
            || matches!(
                self.ty,
                TokenType::Plus | TokenType::Sub | TokenType::XorOrPtr | TokenType::BitwiseAnd
            )
    }

    /// Converts an integer or character literal token to its numeric value.
    pub fn lit_to_int(&self) -> Option<u64> {
        match self.ty {
            TokenType::IntegerLiteral => self.value.parse::<u64>().ok(),
            TokenType::CharacterLiteral => {
                let payload = crate::lexer::unquote_string(self.value)?;
                payload.bytes().next().map(u64::from)
            }
            _ => None,
        }
    }
}

impl TokenType {
    /// Binary operator precedence; higher binds tighter. The assignment
    /// family is lowest and right-associative; everything else is
    /// left-associative.
    pub fn precedence(self) -> u16 {
        use TokenType::*;
        match self {
            ConditionalAnd => 13,
            ConditionalOr => 12,
            Mul | Div | Mod => 8,
            Plus | Sub => 7,
            Lshift | Rshift => 6,
            CompLt | CompLte | CompGt | CompGte => 5,
            CompEquals | CompNotEquals => 4,
            BitwiseAnd => 3,
            XorOrPtr => 2,
            BitwiseOr => 1,
            ValueAssignment | PlusEq | SubEq | MulEq | DivEq | ModEq | BitwiseAndEq
            | BitwiseOrEq | BitwiseXorEq | LshiftEq | RshiftEq => 0,
            _ => panic!("precedence: {:?} is not a binary operator", self),
        }
    }

    pub fn is_arith_assign_op(self) -> bool {
        use TokenType::*;
        matches!(self, PlusEq | SubEq | MulEq | DivEq | ModEq | Increment | Decrement)
    }

    pub fn is_arithmetic_op(self) -> bool {
        use TokenType::*;
        matches!(
            self,
            Plus | PlusEq
                | Sub
                | SubEq
                | Mul
                | MulEq
                | Div
                | DivEq
                | Mod
                | ModEq
                | Increment
                | Decrement
        )
    }

    /// The subset of arithmetic legal on pointers.
    pub fn is_valid_ptr_arith_op(self) -> bool {
        use TokenType::*;
        matches!(self, Plus | PlusEq | Sub | SubEq | Increment | Decrement)
    }

    pub fn is_bw_assign_op(self) -> bool {
        use TokenType::*;
        matches!(
            self,
            BitwiseAndEq | BitwiseOrEq | BitwiseXorEq | LshiftEq | RshiftEq
        )
    }

    pub fn is_bitwise_op(self) -> bool {
        use TokenType::*;
        matches!(
            self,
            BitwiseAnd
                | BitwiseAndEq
                | BitwiseOr
                | BitwiseNot
                | BitwiseOrEq
                | XorOrPtr
                | BitwiseXorEq
                | Lshift
                | LshiftEq
                | Rshift
                | RshiftEq
        )
    }

    pub fn is_comparison_op(self) -> bool {
        use TokenType::*;
        matches!(
            self,
            CompEquals | CompNotEquals | CompLt | CompLte | CompGt | CompGte
        )
    }

    pub fn is_logical_op(self) -> bool {
        use TokenType::*;
        self.is_comparison_op() || matches!(self, ConditionalAnd | ConditionalOr | ConditionalNot)
    }

    /// An identifier chain may begin with a name or a `\` (absolute path).
    pub fn is_ident_start(self) -> bool {
        matches!(self, TokenType::Identifier | TokenType::NamespaceAccess)
    }

    /// Operator spelling as written in source, for diagnostics.
    pub fn show(self) -> &'static str {
        use TokenType::*;
        match self {
            ValueAssignment => "=",
            TypeAssignment => ":",
            ConstTypeAssignment => "::",
            Semicolon => ";",
            LParen => "(",
            RParen => ")",
            LBrace => "{",
            RBrace => "}",
            LSquare => "[",
            RSquare => "]",
            Comma => ",",
            Dot => ".",
            ThreeDots => "...",
            NamespaceAccess => "\\",
            At => "@",
            CompEquals => "==",
            CompNotEquals => "!=",
            CompLt => "<",
            CompLte => "<=",
            CompGt => ">",
            CompGte => ">=",
            ConditionalAnd => "&&",
            ConditionalOr => "||",
            ConditionalNot => "!",
            Plus => "+",
            PlusEq => "+=",
            Sub => "-",
            SubEq => "-=",
            Mul => "*",
            MulEq => "*=",
            Div => "/",
            DivEq => "/=",
            Mod => "%",
            ModEq => "%=",
            Increment => "++",
            Decrement => "--",
            BitwiseAnd => "&",
            BitwiseAndEq => "&=",
            BitwiseNot => "~",
            BitwiseOr => "|",
            BitwiseOrEq => "|=",
            XorOrPtr => "^",
            BitwiseXorEq => "^=",
            Lshift => "<<",
            LshiftEq => "<<=",
            Rshift => ">>",
            RshiftEq => ">>=",
            Arrow => "->",
            KwRet => "ret",
            KwBrk => "brk",
            KwCont => "cont",
            KwFor => "for",
            KwWhile => "while",
            KwDo => "do",
            KwIf => "if",
            KwElse => "else",
            KwStruct => "struct",
            KwEnum => "enum",
            KwSwitch => "switch",
            KwCase => "case",
            KwDefault => "default",
            KwFallthrough => "fallthrough",
            KwNamespace => "namespace",
            KwDefer => "defer",
            KwDeferIf => "defer_if",
            KwProc => "proc",
            KwBlk => "block",
            KwCast => "cast",
            KwSizeof => "sizeof",
            KwNullptr => "nullptr",
            KwF32 => "f32",
            KwF64 => "f64",
            KwBool => "bool",
            KwU8 => "u8",
            KwI8 => "i8",
            KwU16 => "u16",
            KwI16 => "i16",
            KwU32 => "u32",
            KwI32 => "i32",
            KwU64 => "u64",
            KwI64 => "i64",
            KwVoid => "void",
            EndOfFile => "\\0",
            _ => "",
        }
    }
}

/// Keyword and type-identifier lookup for the lexer. `true`/`false` lex as
/// boolean literals rather than keywords.
pub fn keyword_for(ident: &str) -> Option<(TokenType, TokenKind)> {
    use TokenKind::*;
    use TokenType::*;
    let entry = match ident {
        "ret" => (KwRet, Keyword),
        "brk" => (KwBrk, Keyword),
        "cont" => (KwCont, Keyword),
        "for" => (KwFor, Keyword),
        "while" => (KwWhile, Keyword),
        "do" => (KwDo, Keyword),
        "if" => (KwIf, Keyword),
        "else" => (KwElse, Keyword),
        "struct" => (KwStruct, Keyword),
        "enum" => (KwEnum, Keyword),
        "switch" => (KwSwitch, Keyword),
        "case" => (KwCase, Keyword),
        "default" => (KwDefault, Keyword),
        "fallthrough" => (KwFallthrough, Keyword),
        "namespace" => (KwNamespace, Keyword),
        "defer" => (KwDefer, Keyword),
        "defer_if" => (KwDeferIf, Keyword),
        "block" => (KwBlk, Keyword),
        "cast" => (KwCast, Keyword),
        "sizeof" => (KwSizeof, Keyword),
        "nullptr" => (KwNullptr, Keyword),
        "proc" => (KwProc, TypeIdent),
        "f32" => (KwF32, TypeIdent),
        "f64" => (KwF64, TypeIdent),
        "bool" => (KwBool, TypeIdent),
        "u8" => (KwU8, TypeIdent),
        "i8" => (KwI8, TypeIdent),
        "u16" => (KwU16, TypeIdent),
        "i16" => (KwI16, TypeIdent),
        "u32" => (KwU32, TypeIdent),
        "i32" => (KwI32, TypeIdent),
        "u64" => (KwU64, TypeIdent),
        "i64" => (KwI64, TypeIdent),
        "void" => (KwVoid, TypeIdent),
        "true" | "false" => (BooleanLiteral, Literal),
        _ => return Option::None,
    };

    Some(entry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precedence_matches_table() {
        assert_eq!(TokenType::ConditionalAnd.precedence(), 13);
        assert_eq!(TokenType::ConditionalOr.precedence(), 12);
        assert_eq!(TokenType::Mul.precedence(), 8);
        assert_eq!(TokenType::Plus.precedence(), 7);
        assert_eq!(TokenType::Lshift.precedence(), 6);
        assert_eq!(TokenType::CompLt.precedence(), 5);
        assert_eq!(TokenType::CompEquals.precedence(), 4);
        assert_eq!(TokenType::BitwiseAnd.precedence(), 3);
        assert_eq!(TokenType::XorOrPtr.precedence(), 2);
        assert_eq!(TokenType::BitwiseOr.precedence(), 1);
        assert_eq!(TokenType::ValueAssignment.precedence(), 0);
        assert_eq!(TokenType::PlusEq.precedence(), 0);
    }

    #[test]
    fn ptr_arith_subset_of_arithmetic() {
        for op in [
            TokenType::Plus,
            TokenType::PlusEq,
            TokenType::Sub,
            TokenType::SubEq,
            TokenType::Increment,
            TokenType::Decrement,
        ] {
            assert!(op.is_valid_ptr_arith_op());
            assert!(op.is_arithmetic_op());
        }

        assert!(!TokenType::Mul.is_valid_ptr_arith_op());
        assert!(!TokenType::Mod.is_valid_ptr_arith_op());
    }

    #[test]
    fn logical_includes_comparisons() {
        assert!(TokenType::CompLte.is_logical_op());
        assert!(TokenType::ConditionalNot.is_logical_op());
        assert!(!TokenType::BitwiseNot.is_logical_op());
    }

    #[test]
    fn unary_validity_checks_tag_and_kind() {
        let amp = Token::new(TokenType::BitwiseAnd, TokenKind::BinaryOp, 0, 1, "&");
        let not = Token::new(TokenType::ConditionalNot, TokenKind::UnaryOp, 0, 1, "!");
        let comma = Token::new(TokenType::Comma, TokenKind::Punctuator, 0, 1, ",");
        assert!(amp.is_valid_unary_operator());
        assert!(not.is_valid_unary_operator());
        assert!(!comma.is_valid_unary_operator());
    }

    #[test]
    fn keywords_resolve_with_kinds() {
        assert_eq!(
            keyword_for("proc"),
            Some((TokenType::KwProc, TokenKind::TypeIdent))
        );
        assert_eq!(
            keyword_for("defer_if"),
            Some((TokenType::KwDeferIf, TokenKind::Keyword))
        );
        assert_eq!(
            keyword_for("true"),
            Some((TokenType::BooleanLiteral, TokenKind::Literal))
        );
        assert_eq!(keyword_for("banana"), None);
    }

    #[test]
    fn integer_literal_to_int() {
        let tok = Token::new(TokenType::IntegerLiteral, TokenKind::Literal, 0, 1, "42");
        assert_eq!(tok.lit_to_int(), Some(42));
    }

    #[test]
    fn char_literal_to_int() {
        let tok = Token::new(TokenType::CharacterLiteral, TokenKind::Literal, 0, 1, "'A'");
        assert_eq!(tok.lit_to_int(), Some(65));
    }
}
