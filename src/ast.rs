//! The AST: a tagged node enum stored in an index arena. Child links are
//! node ids owned by the parent; parent links are non-owning back ids so
//! walks up the tree (return-type lookup, loop checks) stay cheap.

use crate::token::TokenType;
use crate::types::TypeData;
use std::ops::{Index, IndexMut};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// What a `sizeof` was applied to: a spelled-out type or an expression.
#[derive(Debug, Clone)]
pub enum SizeofTarget {
    Type(TypeData),
    Expr(NodeId),
}

#[derive(Debug, Clone)]
pub enum AstKind {
    NamespaceDecl {
        full_path: String,
        children: Vec<NodeId>,
    },
    Block {
        children: Vec<NodeId>,
    },
    Procdecl {
        identifier: NodeId,
        parameters: Vec<NodeId>,
        children: Vec<NodeId>,
    },
    Vardecl {
        identifier: NodeId,
        init_value: Option<NodeId>,
    },
    TypeAlias {
        name: String,
    },
    StructDef {
        name: String,
    },
    EnumDef {
        namespace: NodeId,
        alias_name: String,
    },
    IncludeStmt {
        path: String,
    },
    If {
        condition: NodeId,
        body: Vec<NodeId>,
    },
    Else {
        body: Vec<NodeId>,
    },
    Branch {
        if_stmt: NodeId,
        else_stmt: Option<NodeId>,
    },
    For {
        init: Option<NodeId>,
        condition: Option<NodeId>,
        update: Option<NodeId>,
        body: Vec<NodeId>,
    },
    While {
        condition: NodeId,
        body: Vec<NodeId>,
    },
    DoWhile {
        condition: NodeId,
        body: Vec<NodeId>,
    },
    Switch {
        target: NodeId,
        cases: Vec<NodeId>,
        default: NodeId,
    },
    Case {
        value: NodeId,
        fallthrough: bool,
        body: Vec<NodeId>,
    },
    Default {
        body: Vec<NodeId>,
    },
    Ret {
        value: Option<NodeId>,
    },
    Brk,
    Cont,
    Defer {
        call: NodeId,
    },
    DeferIf {
        condition: NodeId,
        call: NodeId,
    },
    Call {
        target: NodeId,
        arguments: Vec<NodeId>,
    },
    Binexpr {
        op: TokenType,
        left: NodeId,
        right: NodeId,
    },
    Unaryexpr {
        op: TokenType,
        operand: NodeId,
    },
    Subscript {
        operand: NodeId,
        value: NodeId,
    },
    MemberAccess {
        target: NodeId,
        path: String,
    },
    Cast {
        target: NodeId,
        ty: TypeData,
    },
    Sizeof {
        target: SizeofTarget,
    },
    Identifier {
        symbol_index: u32,
    },
    /// Literal payloads are stored unquoted with escapes resolved.
    SingletonLiteral {
        literal_type: TokenType,
        value: String,
    },
    BracedExpr {
        members: Vec<NodeId>,
    },
}

impl AstKind {
    /// Expressions legal inside parentheses, initializers, arguments and
    /// braced expressions.
    pub fn is_valid_subexpression(&self) -> bool {
        matches!(
            self,
            AstKind::Call { .. }
                | AstKind::Identifier { .. }
                | AstKind::Binexpr { .. }
                | AstKind::SingletonLiteral { .. }
                | AstKind::Unaryexpr { .. }
                | AstKind::BracedExpr { .. }
                | AstKind::Cast { .. }
                | AstKind::Subscript { .. }
                | AstKind::MemberAccess { .. }
                | AstKind::Sizeof { .. }
        )
    }

    /// Brace-delimited forms never require a `;` terminator.
    pub fn never_needs_terminator(&self) -> bool {
        matches!(
            self,
            AstKind::Procdecl { .. }
                | AstKind::Branch { .. }
                | AstKind::If { .. }
                | AstKind::Else { .. }
                | AstKind::For { .. }
                | AstKind::While { .. }
                | AstKind::Switch { .. }
                | AstKind::NamespaceDecl { .. }
                | AstKind::Block { .. }
                | AstKind::StructDef { .. }
                | AstKind::EnumDef { .. }
        )
    }

    pub fn is_valid_at_toplevel(&self) -> bool {
        matches!(
            self,
            AstKind::Vardecl { .. }
                | AstKind::StructDef { .. }
                | AstKind::NamespaceDecl { .. }
                | AstKind::Procdecl { .. }
                | AstKind::EnumDef { .. }
                | AstKind::TypeAlias { .. }
                | AstKind::IncludeStmt { .. }
        )
    }

    /// Nodes the checker evaluates. Pure declarations of types are skipped.
    pub fn needs_evaluating(&self) -> bool {
        !matches!(
            self,
            AstKind::TypeAlias { .. } | AstKind::IncludeStmt { .. } | AstKind::StructDef { .. }
        )
    }

    /// Nodes the code generator visits. Same exclusions; struct layouts and
    /// aliases are resolved before body emission.
    pub fn needs_generating(&self) -> bool {
        !matches!(
            self,
            AstKind::TypeAlias { .. } | AstKind::IncludeStmt { .. } | AstKind::StructDef { .. }
        )
    }
}

#[derive(Debug)]
pub struct AstNode {
    pub kind: AstKind,
    pub pos: usize,
    pub line: u32,
    pub file: String,
    pub parent: Option<NodeId>,
}

/// Node arena. Ids are never invalidated; nodes are only appended.
#[derive(Debug, Default)]
pub struct Ast {
    nodes: Vec<AstNode>,
}

impl Ast {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, kind: AstKind, pos: usize, line: u32, file: &str) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(AstNode {
            kind,
            pos,
            line,
            file: file.to_string(),
            parent: None,
        });

        id
    }

    pub fn set_parent(&mut self, child: NodeId, parent: NodeId) {
        self.nodes[child.index()].parent = Some(parent);
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.index()].parent
    }

    pub fn kind(&self, id: NodeId) -> &AstKind {
        &self.nodes[id.index()].kind
    }

    pub fn kind_mut(&mut self, id: NodeId) -> &mut AstKind {
        &mut self.nodes[id.index()].kind
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The symbol index of an identifier node. Panics on other kinds.
    pub fn identifier_symbol(&self, id: NodeId) -> u32 {
        match self.kind(id) {
            AstKind::Identifier { symbol_index } => *symbol_index,
            other => panic!("expected identifier node, found {:?}", other),
        }
    }
}

impl Index<NodeId> for Ast {
    type Output = AstNode;

    fn index(&self, id: NodeId) -> &AstNode {
        &self.nodes[id.index()]
    }
}

impl IndexMut<NodeId> for Ast {
    fn index_mut(&mut self, id: NodeId) -> &mut AstNode {
        &mut self.nodes[id.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_assigns_sequential_ids() {
        let mut ast = Ast::new();
        let a = ast.alloc(AstKind::Brk, 0, 1, "t.tak");
        let b = ast.alloc(AstKind::Cont, 4, 1, "t.tak");
        assert_ne!(a, b);
        assert!(matches!(ast.kind(a), AstKind::Brk));
        assert!(matches!(ast.kind(b), AstKind::Cont));
    }

    #[test]
    fn parent_links_walk_upward() {
        let mut ast = Ast::new();
        let inner = ast.alloc(AstKind::Brk, 10, 2, "t.tak");
        let body = vec![inner];
        let outer = ast.alloc(
            AstKind::While {
                condition: inner,
                body,
            },
            0,
            1,
            "t.tak",
        );

        ast.set_parent(inner, outer);
        assert_eq!(ast.parent(inner), Some(outer));
        assert_eq!(ast.parent(outer), None);
    }

    #[test]
    fn subexpression_classification() {
        let lit = AstKind::SingletonLiteral {
            literal_type: TokenType::IntegerLiteral,
            value: "1".into(),
        };
        assert!(lit.is_valid_subexpression());
        assert!(!AstKind::Brk.is_valid_subexpression());
        assert!(!AstKind::Block { children: vec![] }.is_valid_subexpression());
    }

    #[test]
    fn terminator_exemptions() {
        assert!(AstKind::Block { children: vec![] }.never_needs_terminator());
        assert!(!AstKind::Brk.never_needs_terminator());
        assert!(!AstKind::Defer {
            call: NodeId(0)
        }
        .never_needs_terminator());
    }
}
