//! Go abstract syntax tree.
//!
//! Grouped declarations (`var ( ... )`) are flattened into one [`Decl`] per
//! spec, so every declaration carries its own directives and position.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::directive::Directive;

/// 1-based source position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pos {
    pub line: u32,
    pub column: u32,
}

impl Pos {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Identity of an expression node, unique within a process.
///
/// Type information produced by a checker is keyed by this id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExprId(pub u32);

static NEXT_EXPR_ID: AtomicU32 = AtomicU32::new(1);

impl ExprId {
    pub fn fresh() -> Self {
        ExprId(NEXT_EXPR_ID.fetch_add(1, Ordering::Relaxed))
    }
}

// ============================================================================
// Files and declarations
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct File {
    /// File name as given to the reader.
    pub path: String,
    pub package: String,
    pub imports: Vec<ImportSpec>,
    pub decls: Vec<Decl>,
}

impl File {
    /// Local name under which `import_path` is visible in this file.
    pub fn import_name(&self, import_path: &str) -> Option<String> {
        self.imports
            .iter()
            .find(|i| i.path == import_path)
            .map(ImportSpec::local_name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportSpec {
    /// Explicit name: an identifier, `_` or `.`.
    pub name: Option<String>,
    pub path: String,
    pub pos: Pos,
}

impl ImportSpec {
    /// Name the import binds, defaulting to the last path element.
    pub fn local_name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => self
                .path
                .rsplit('/')
                .next()
                .unwrap_or(&self.path)
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decl {
    Func(FuncDecl),
    Type(TypeSpec),
    Var(ValueSpec),
    Const(ValueSpec),
}

impl Decl {
    /// Names this declaration introduces at package scope. Methods introduce
    /// none.
    pub fn names(&self) -> Vec<&str> {
        match self {
            Decl::Func(f) if f.recv.is_none() => vec![f.name.as_str()],
            Decl::Func(_) => Vec::new(),
            Decl::Type(t) => vec![t.name.as_str()],
            Decl::Var(v) | Decl::Const(v) => v.names.iter().map(String::as_str).collect(),
        }
    }

    pub fn directives(&self) -> &[Directive] {
        match self {
            Decl::Func(f) => &f.directives,
            Decl::Type(t) => &t.directives,
            Decl::Var(v) | Decl::Const(v) => &v.directives,
        }
    }

    pub fn pos(&self) -> Pos {
        match self {
            Decl::Func(f) => f.pos,
            Decl::Type(t) => t.pos,
            Decl::Var(v) | Decl::Const(v) => v.pos,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FuncDecl {
    pub recv: Option<Receiver>,
    pub name: String,
    pub type_params: Vec<String>,
    pub sig: Signature,
    pub body: Option<Block>,
    pub directives: Vec<Directive>,
    pub pos: Pos,
}

impl FuncDecl {
    /// `Name` for functions, `Recv.Name` for methods.
    pub fn key(&self) -> String {
        match &self.recv {
            Some(recv) => format!("{}.{}", recv.type_name, self.name),
            None => self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Receiver {
    pub name: Option<String>,
    /// Base type name with any pointer and type arguments stripped.
    pub type_name: String,
    pub pointer: bool,
    pub type_args: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Signature {
    pub params: Vec<Field>,
    pub results: Vec<Field>,
    /// The last parameter is `...T`; its `ty` is the element type `T`.
    pub variadic: bool,
}

/// A parameter, result or struct field.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: Option<String>,
    pub ty: TypeExpr,
    pub tag: Option<String>,
    pub embedded: bool,
}

impl Field {
    pub fn unnamed(ty: TypeExpr) -> Self {
        Self {
            name: None,
            ty,
            tag: None,
            embedded: false,
        }
    }

    pub fn named(name: impl Into<String>, ty: TypeExpr) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::unnamed(ty)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeSpec {
    pub name: String,
    pub type_params: Vec<String>,
    pub alias: bool,
    pub ty: TypeExpr,
    pub directives: Vec<Directive>,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValueSpec {
    pub names: Vec<String>,
    pub ty: Option<TypeExpr>,
    pub values: Vec<Expr>,
    /// Index of the spec inside its `const` group.
    pub iota: u32,
    pub directives: Vec<Directive>,
    pub pos: Pos,
}

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChanDir {
    Both,
    Send,
    Recv,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeExpr {
    Name {
        pkg: Option<String>,
        name: String,
        args: Vec<TypeExpr>,
    },
    Pointer(Box<TypeExpr>),
    Slice(Box<TypeExpr>),
    /// `len` is `None` for `[...]T`.
    Array {
        len: Option<Box<Expr>>,
        elem: Box<TypeExpr>,
    },
    Map {
        key: Box<TypeExpr>,
        value: Box<TypeExpr>,
    },
    Chan {
        dir: ChanDir,
        elem: Box<TypeExpr>,
    },
    Func(Signature),
    Struct(Vec<Field>),
    Interface(Vec<InterfaceElem>),
}

impl TypeExpr {
    pub fn name(name: impl Into<String>) -> Self {
        TypeExpr::Name {
            pkg: None,
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn qualified(pkg: impl Into<String>, name: impl Into<String>) -> Self {
        TypeExpr::Name {
            pkg: Some(pkg.into()),
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn pointer(elem: TypeExpr) -> Self {
        TypeExpr::Pointer(Box::new(elem))
    }

    pub fn slice(elem: TypeExpr) -> Self {
        TypeExpr::Slice(Box::new(elem))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InterfaceElem {
    Method { name: String, sig: Signature },
    Embed(TypeExpr),
}

// ============================================================================
// Statements
// ============================================================================

pub type Block = Vec<Stmt>;

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub pos: Pos,
    pub kind: StmtKind,
}

impl Stmt {
    pub fn new(pos: Pos, kind: StmtKind) -> Self {
        Self { pos, kind }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Expr(Expr),
    Send {
        chan: Expr,
        value: Expr,
    },
    IncDec {
        target: Expr,
        inc: bool,
    },
    /// `lhs = rhs`, or `lhs op= rhs` when `op` is set.
    Assign {
        lhs: Vec<Expr>,
        op: Option<BinaryOp>,
        rhs: Vec<Expr>,
    },
    Define {
        names: Vec<String>,
        values: Vec<Expr>,
    },
    Decl(Decl),
    Go(Expr),
    Defer(Expr),
    Return(Vec<Expr>),
    If {
        init: Option<Box<Stmt>>,
        cond: Expr,
        then: Block,
        /// Either a `Block` or another `If`.
        els: Option<Box<Stmt>>,
    },
    For {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        post: Option<Box<Stmt>>,
        body: Block,
    },
    Range {
        key: Option<Expr>,
        value: Option<Expr>,
        define: bool,
        expr: Expr,
        body: Block,
    },
    Switch {
        init: Option<Box<Stmt>>,
        tag: Option<Expr>,
        cases: Vec<CaseClause>,
    },
    TypeSwitch {
        init: Option<Box<Stmt>>,
        bind: Option<String>,
        subject: Expr,
        cases: Vec<TypeCaseClause>,
    },
    Select(Vec<CommClause>),
    Block(Block),
    Labeled {
        label: String,
        stmt: Box<Stmt>,
    },
    Break(Option<String>),
    Continue(Option<String>),
    Fallthrough,
    Goto(String),
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaseClause {
    /// Empty for `default`.
    pub exprs: Vec<Expr>,
    pub default: bool,
    pub body: Block,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeCaseClause {
    /// `None` entries stand for `nil`.
    pub types: Vec<Option<TypeExpr>>,
    pub default: bool,
    pub body: Block,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommClause {
    /// `None` for `default`.
    pub comm: Option<CommOp>,
    pub body: Block,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommOp {
    Send {
        chan: Expr,
        value: Expr,
    },
    Recv {
        lhs: Vec<Expr>,
        define: bool,
        chan: Expr,
    },
}

// ============================================================================
// Expressions
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub id: ExprId,
    pub pos: Pos,
    pub kind: ExprKind,
}

impl Expr {
    pub fn new(pos: Pos, kind: ExprKind) -> Self {
        Self {
            id: ExprId::fresh(),
            pos,
            kind,
        }
    }

    pub fn ident(pos: Pos, name: impl Into<String>) -> Self {
        Self::new(pos, ExprKind::Ident(name.into()))
    }

    /// The identifier name, looking through parentheses.
    pub fn as_ident(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Ident(name) => Some(name),
            ExprKind::Paren(inner) => inner.as_ident(),
            _ => None,
        }
    }

    /// Strip any number of enclosing parentheses.
    pub fn unparen(&self) -> &Expr {
        match &self.kind {
            ExprKind::Paren(inner) => inner.unparen(),
            _ => self,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Lit {
    Int(String),
    Float(String),
    Imag(String),
    Rune(char),
    Str(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub key: Option<Expr>,
    pub value: Expr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
    Xor,
    Deref,
    Addr,
    Recv,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Quo,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    AndNot,
    LAnd,
    LOr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    pub fn from_token(tok: &str) -> Option<Self> {
        Some(match tok {
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Sub,
            "*" => BinaryOp::Mul,
            "/" => BinaryOp::Quo,
            "%" => BinaryOp::Rem,
            "&" => BinaryOp::And,
            "|" => BinaryOp::Or,
            "^" => BinaryOp::Xor,
            "<<" => BinaryOp::Shl,
            ">>" => BinaryOp::Shr,
            "&^" => BinaryOp::AndNot,
            "&&" => BinaryOp::LAnd,
            "||" => BinaryOp::LOr,
            "==" => BinaryOp::Eq,
            "!=" => BinaryOp::Ne,
            "<" => BinaryOp::Lt,
            "<=" => BinaryOp::Le,
            ">" => BinaryOp::Gt,
            ">=" => BinaryOp::Ge,
            _ => return None,
        })
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::LAnd | BinaryOp::LOr)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Ident(String),
    BasicLit(Lit),
    Composite {
        ty: Option<TypeExpr>,
        elems: Vec<Element>,
    },
    FuncLit {
        sig: Signature,
        body: Block,
    },
    Paren(Box<Expr>),
    Selector {
        x: Box<Expr>,
        sel: String,
    },
    Index {
        x: Box<Expr>,
        index: Vec<Expr>,
    },
    Slice {
        x: Box<Expr>,
        lo: Option<Box<Expr>>,
        hi: Option<Box<Expr>>,
        max: Option<Box<Expr>>,
    },
    /// `ty` is `None` for `x.(type)`.
    TypeAssert {
        x: Box<Expr>,
        ty: Option<TypeExpr>,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
        ellipsis: bool,
    },
    Unary {
        op: UnaryOp,
        x: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        x: Box<Expr>,
        y: Box<Expr>,
    },
    /// A type in expression position (`make([]int, n)`, `T(x)`).
    Type(TypeExpr),
}
