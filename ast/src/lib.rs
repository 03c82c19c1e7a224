//! The abstract syntax tree. Nodes are tagged variants with a common header
//! of scope handle, inferred type and originating span; the semantic passes
//! and the lowerer are match statements over the kind.

pub mod scope;

pub use scope::{Scope, ScopeId, ScopeTree, Symbol, SymbolId};

use codespan::{FileId, Span};
use ty::TypeId;

#[derive(Clone, Debug)]
pub struct Expression {
    pub kind: ExpressionKind,
    pub scope: ScopeId,
    /// Set by the type checker; literals carry a best-guess type from the
    /// parser.
    pub ty: Option<TypeId>,
    pub span: Span,
}

impl Expression {
    pub fn new(kind: ExpressionKind, scope: ScopeId, span: Span) -> Self {
        Self { kind, scope, ty: None, span }
    }

    pub fn with_type(kind: ExpressionKind, scope: ScopeId, ty: TypeId, span: Span) -> Self {
        Self { kind, scope, ty: Some(ty), span }
    }

    /// The inferred type. Valid once pass A has run.
    pub fn ty(&self) -> TypeId {
        self.ty.unwrap_or_else(ty::error)
    }
}

#[derive(Clone, Debug)]
pub enum ExpressionKind {
    Integer(u64),
    Boolean(bool),
    StringLiteral(String),
    /// A possibly qualified name; `A::B::x` parses to three segments.
    Variable { names: Vec<String> },
    Unary { op: UnaryOp, operand: Box<Expression> },
    Binary { op: BinOp, lhs: Box<Expression>, rhs: Box<Expression> },
    Call { callee: Box<Expression>, arguments: Vec<Expression>, resolved: Option<SymbolId> },
    Member { base: Box<Expression>, field: String, through_pointer: bool, index: Option<usize> },
    /// Compiler-inserted conversion; the destination type is the node type.
    Cast { operand: Box<Expression> },
    Return(Option<Box<Expression>>),
    Declaration { name: String, symbol: SymbolId, init: Option<Box<Expression>> },
    If {
        condition: Box<Expression>,
        then_body: Box<Expression>,
        else_body: Option<Box<Expression>>,
        own_scope: ScopeId,
    },
    Compound(Vec<Expression>),
}

impl ExpressionKind {
    /// Statements that end in a closing brace take no `;` terminator.
    pub fn ends_with_block(&self) -> bool {
        match self {
            ExpressionKind::Compound(_) => true,
            ExpressionKind::If { then_body, else_body, .. } => match else_body {
                Some(else_body) => else_body.kind.ends_with_block(),
                None => then_body.kind.ends_with_block(),
            },
            _ => false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    Deref,
    AddressOf,
}

impl std::fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            UnaryOp::Negate => "-",
            UnaryOp::Deref => "*",
            UnaryOp::AddressOf => "&",
        };
        write!(f, "{}", text)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Assign,
}

impl BinOp {
    pub fn is_arithmetic(self) -> bool {
        matches!(self, BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div)
    }

    pub fn is_comparison(self) -> bool {
        matches!(self, BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge)
    }
}

impl std::fmt::Display for BinOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::Assign => "=",
        };
        write!(f, "{}", text)
    }
}

#[derive(Clone, Debug)]
pub struct Global {
    pub kind: GlobalKind,
    pub file: FileId,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub enum GlobalKind {
    Function(Function),
    Class(Class),
}

#[derive(Clone, Debug)]
pub struct Function {
    pub name: String,
    /// The declaration symbol in the enclosing scope.
    pub symbol: SymbolId,
    pub ty: TypeId,
    pub arguments: Vec<(String, TypeId)>,
    /// `None` for declaration-only functions (`func f(...) -> T;`).
    pub body: Option<Vec<Expression>>,
    pub own_scope: ScopeId,
    pub pure: bool,
}

#[derive(Clone, Debug)]
pub struct Class {
    pub name: String,
    pub ty: TypeId,
    pub exported: bool,
}
