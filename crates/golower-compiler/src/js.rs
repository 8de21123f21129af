//! JavaScript target IR.
//!
//! A small statement/expression tree covering what the lowering emits.
//! Builders mirror the shapes the lowering reaches for most often.

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub body: Vec<Stmt>,
}

impl Program {
    pub fn new(body: Vec<Stmt>) -> Self {
        Self { body }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Undefined,
    Bool(bool),
    Number(f64),
    String(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    UShr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    InstanceOf,
}

impl BinaryOp {
    pub fn as_str(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::UShr => ">>>",
            BinaryOp::Eq => "===",
            BinaryOp::Ne => "!==",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::InstanceOf => "instanceof",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
    BitNot,
    TypeOf,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    Ident(String),
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    New {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    /// `object.property`; `property` must be a valid identifier name.
    Member {
        object: Box<Expr>,
        property: String,
    },
    /// `object[index]`
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    Array(Vec<Expr>),
    Object(Vec<(String, Expr)>),
    Function(Box<Function>),
    Conditional {
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
    },
    Assign {
        target: Box<Expr>,
        value: Box<Expr>,
    },
    /// `yield* arg` when `delegate`, plain `yield arg` otherwise.
    Yield {
        delegate: bool,
        arg: Box<Expr>,
    },
    Spread(Box<Expr>),
    Sequence(Vec<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Var,
    Let,
    Const,
}

impl VarKind {
    pub fn as_str(self) -> &'static str {
        match self {
            VarKind::Var => "var",
            VarKind::Let => "let",
            VarKind::Const => "const",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    /// `None` for `default:`.
    pub test: Option<Expr>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Expr(Expr),
    Var {
        kind: VarKind,
        name: String,
        init: Option<Expr>,
    },
    /// `const [a, b] = init;`
    Destructure {
        kind: VarKind,
        names: Vec<String>,
        init: Expr,
    },
    Block(Vec<Stmt>),
    If {
        test: Expr,
        consequent: Box<Stmt>,
        alternate: Option<Box<Stmt>>,
    },
    While {
        test: Expr,
        body: Box<Stmt>,
    },
    For {
        init: Option<Box<Stmt>>,
        test: Option<Expr>,
        update: Option<Expr>,
        body: Box<Stmt>,
    },
    /// `for (const x of iterable)`, or `for (const [a, b] of iterable)` with
    /// more than one binding.
    ForOf {
        bindings: Vec<String>,
        iterable: Expr,
        body: Box<Stmt>,
    },
    Switch {
        discriminant: Expr,
        cases: Vec<SwitchCase>,
    },
    Return(Option<Expr>),
    Break(Option<String>),
    Continue(Option<String>),
    Labeled {
        label: String,
        body: Box<Stmt>,
    },
    TryCatch {
        body: Box<Stmt>,
        catch_param: Option<String>,
        catch_body: Option<Box<Stmt>>,
        finally_body: Option<Box<Stmt>>,
    },
    Throw(Expr),
    Function(Function),
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    /// Empty for function expressions.
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
    pub generator: bool,
    /// Written as `(params) => { ... }`. Never combined with `generator`.
    pub arrow: bool,
}

impl Function {
    pub fn new(name: impl Into<String>, params: Vec<String>, body: Vec<Stmt>) -> Self {
        Self {
            name: name.into(),
            params,
            body,
            generator: false,
            arrow: false,
        }
    }

    pub fn anonymous(params: Vec<String>, body: Vec<Stmt>) -> Self {
        Self::new("", params, body)
    }

    pub fn arrow(params: Vec<String>, body: Vec<Stmt>) -> Self {
        Self {
            arrow: true,
            ..Self::anonymous(params, body)
        }
    }

    pub fn generator(mut self, generator: bool) -> Self {
        self.generator = generator;
        if generator {
            self.arrow = false;
        }
        self
    }
}

// ============================================================================
// Builders
// ============================================================================

impl Expr {
    pub fn null() -> Self {
        Expr::Literal(Literal::Null)
    }

    pub fn undefined() -> Self {
        Expr::Literal(Literal::Undefined)
    }

    pub fn bool(b: bool) -> Self {
        Expr::Literal(Literal::Bool(b))
    }

    pub fn number(n: impl Into<f64>) -> Self {
        Expr::Literal(Literal::Number(n.into()))
    }

    pub fn string(s: impl Into<String>) -> Self {
        Expr::Literal(Literal::String(s.into()))
    }

    pub fn ident(name: impl Into<String>) -> Self {
        Expr::Ident(name.into())
    }

    pub fn binary(left: Expr, op: BinaryOp, right: Expr) -> Self {
        Expr::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    pub fn unary(op: UnaryOp, expr: Expr) -> Self {
        Expr::Unary {
            op,
            expr: Box::new(expr),
        }
    }

    pub fn call(callee: Expr, args: Vec<Expr>) -> Self {
        Expr::Call {
            callee: Box::new(callee),
            args,
        }
    }

    /// Call of a runtime helper such as `$append`.
    pub fn helper(name: &str, args: Vec<Expr>) -> Self {
        Expr::call(Expr::ident(name), args)
    }

    pub fn new_(callee: Expr, args: Vec<Expr>) -> Self {
        Expr::New {
            callee: Box::new(callee),
            args,
        }
    }

    pub fn member(object: Expr, property: impl Into<String>) -> Self {
        Expr::Member {
            object: Box::new(object),
            property: property.into(),
        }
    }

    pub fn index(object: Expr, index: Expr) -> Self {
        Expr::Index {
            object: Box::new(object),
            index: Box::new(index),
        }
    }

    pub fn array(items: Vec<Expr>) -> Self {
        Expr::Array(items)
    }

    pub fn object(pairs: Vec<(String, Expr)>) -> Self {
        Expr::Object(pairs)
    }

    pub fn function(f: Function) -> Self {
        Expr::Function(Box::new(f))
    }

    /// `() => { return value; }`, used for lazily built zero values.
    pub fn thunk(value: Expr) -> Self {
        Expr::function(Function::arrow(Vec::new(), vec![Stmt::return_stmt(Some(value))]))
    }

    pub fn conditional(test: Expr, consequent: Expr, alternate: Expr) -> Self {
        Expr::Conditional {
            test: Box::new(test),
            consequent: Box::new(consequent),
            alternate: Box::new(alternate),
        }
    }

    pub fn assign(target: Expr, value: Expr) -> Self {
        Expr::Assign {
            target: Box::new(target),
            value: Box::new(value),
        }
    }

    pub fn yield_star(arg: Expr) -> Self {
        Expr::Yield {
            delegate: true,
            arg: Box::new(arg),
        }
    }

    pub fn spread(expr: Expr) -> Self {
        Expr::Spread(Box::new(expr))
    }

    /// Whether evaluating the expression has no side effects and is cheap
    /// enough to duplicate.
    pub fn is_simple(&self) -> bool {
        match self {
            Expr::Literal(_) | Expr::Ident(_) => true,
            Expr::Member { object, .. } => object.is_simple(),
            _ => false,
        }
    }
}

impl Stmt {
    pub fn expr(expr: Expr) -> Self {
        Stmt::Expr(expr)
    }

    pub fn const_decl(name: impl Into<String>, init: Expr) -> Self {
        Stmt::Var {
            kind: VarKind::Const,
            name: name.into(),
            init: Some(init),
        }
    }

    pub fn let_decl(name: impl Into<String>, init: Option<Expr>) -> Self {
        Stmt::Var {
            kind: VarKind::Let,
            name: name.into(),
            init,
        }
    }

    pub fn var_decl(name: impl Into<String>, init: Option<Expr>) -> Self {
        Stmt::Var {
            kind: VarKind::Var,
            name: name.into(),
            init,
        }
    }

    pub fn assign(target: Expr, value: Expr) -> Self {
        Stmt::Expr(Expr::assign(target, value))
    }

    pub fn block(stmts: Vec<Stmt>) -> Self {
        Stmt::Block(stmts)
    }

    pub fn if_stmt(test: Expr, consequent: Stmt, alternate: Option<Stmt>) -> Self {
        Stmt::If {
            test,
            consequent: Box::new(consequent),
            alternate: alternate.map(Box::new),
        }
    }

    pub fn while_loop(test: Expr, body: Stmt) -> Self {
        Stmt::While {
            test,
            body: Box::new(body),
        }
    }

    pub fn for_loop(init: Option<Stmt>, test: Option<Expr>, update: Option<Expr>, body: Stmt) -> Self {
        Stmt::For {
            init: init.map(Box::new),
            test,
            update,
            body: Box::new(body),
        }
    }

    pub fn return_stmt(expr: Option<Expr>) -> Self {
        Stmt::Return(expr)
    }

    pub fn throw(expr: Expr) -> Self {
        Stmt::Throw(expr)
    }

    pub fn labeled(label: impl Into<String>, body: Stmt) -> Self {
        Stmt::Labeled {
            label: label.into(),
            body: Box::new(body),
        }
    }
}

/// Reserved words that cannot name a binding or be written as a bare
/// property in every context.
const RESERVED: &[&str] = &[
    "arguments", "await", "break", "case", "catch", "class", "const", "constructor", "continue",
    "debugger", "default", "delete", "do", "else", "enum", "eval", "export", "extends", "false",
    "finally", "for", "function", "if", "implements", "import", "in", "instanceof", "interface",
    "let", "new", "null", "package", "private", "protected", "public", "return", "static",
    "super", "switch", "this", "throw", "true", "try", "typeof", "undefined", "var", "void",
    "while", "with", "yield", "Object", "Array", "Map", "Math", "String", "Number", "Symbol",
    "Error", "Function", "Infinity", "NaN", "__proto__",
];

/// Turn a Go identifier into a safe JavaScript one. Go identifiers never
/// contain `$`, so suffixing with it cannot collide with another Go name.
pub fn mangle(name: &str) -> String {
    if RESERVED.contains(&name) {
        format!("{name}$")
    } else {
        name.to_string()
    }
}

/// Property names (fields, methods) only need to avoid the few names with
/// special meaning on every object.
pub fn mangle_property(name: &str) -> String {
    match name {
        "constructor" | "__proto__" | "prototype" | "toString" | "valueOf" | "hasOwnProperty" => {
            format!("{name}$")
        }
        _ => name.to_string(),
    }
}

pub fn is_valid_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !first.is_alphabetic() && first != '_' && first != '$' {
        return false;
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mangle_reserved_words() {
        assert_eq!(mangle("new"), "new$");
        assert_eq!(mangle("this"), "this$");
        assert_eq!(mangle("constructor"), "constructor$");
        assert_eq!(mangle("count"), "count");
        assert_eq!(mangle_property("Error"), "Error");
        assert_eq!(mangle_property("toString"), "toString$");
    }

    #[test]
    fn test_identifier_validity() {
        assert!(is_valid_identifier("$pkg"));
        assert!(is_valid_identifier("héllo"));
        assert!(!is_valid_identifier("a-b"));
        assert!(!is_valid_identifier("1x"));
        assert!(!is_valid_identifier(""));
    }

    #[test]
    fn test_generator_is_never_arrow() {
        let f = Function::arrow(vec![], vec![]).generator(true);
        assert!(f.generator);
        assert!(!f.arrow);
    }
}
