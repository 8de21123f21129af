//! Turning syntactic type expressions into [`Type`]s.

use golower_syntax::{BinaryOp, Expr, ExprKind, Lit, Signature, TypeExpr, UnaryOp, ast};

use crate::types::{ChanDir, FuncType, Method, StructField, Type};
use crate::universe;

/// Names visible where a type expression appears.
pub trait TypeEnv {
    /// Type denoted by an unqualified name declared in the package or an
    /// enclosing block. Predeclared names are handled by the resolver.
    fn lookup_type(&self, name: &str) -> Option<Type>;

    /// Import path bound to a package qualifier in the current file.
    fn import_path(&self, qualifier: &str) -> Option<String>;

    /// Underlying type of a named type, when known.
    fn underlying(&self, ty: &Type) -> Option<Type>;

    /// Value of an integer constant, for array lengths.
    fn const_int(&self, _name: &str) -> Option<i64> {
        None
    }
}

pub fn resolve_type(env: &dyn TypeEnv, ty: &TypeExpr, tparams: &[String]) -> Type {
    match ty {
        TypeExpr::Name {
            pkg: None, name, ..
        } => {
            if tparams.iter().any(|p| p == name) {
                return Type::TypeParam(name.clone());
            }
            env.lookup_type(name)
                .or_else(|| universe::type_named(name))
                .unwrap_or(Type::Invalid)
        }
        TypeExpr::Name {
            pkg: Some(qualifier),
            name,
            ..
        } => match env.import_path(qualifier) {
            Some(path) if path == "unsafe" && name == "Pointer" => {
                Type::Basic(crate::types::Basic::UnsafePointer)
            }
            Some(path) => Type::named(path, name),
            None => Type::Invalid,
        },
        TypeExpr::Pointer(elem) => Type::pointer(resolve_type(env, elem, tparams)),
        TypeExpr::Slice(elem) => Type::slice(resolve_type(env, elem, tparams)),
        TypeExpr::Array { len, elem } => {
            let n = len
                .as_deref()
                .and_then(|e| eval_int(env, e))
                .and_then(|n| u64::try_from(n).ok())
                .unwrap_or(0);
            Type::Array(n, Box::new(resolve_type(env, elem, tparams)))
        }
        TypeExpr::Map { key, value } => Type::Map(
            Box::new(resolve_type(env, key, tparams)),
            Box::new(resolve_type(env, value, tparams)),
        ),
        TypeExpr::Chan { dir, elem } => {
            let dir = match dir {
                ast::ChanDir::Both => ChanDir::Both,
                ast::ChanDir::Send => ChanDir::Send,
                ast::ChanDir::Recv => ChanDir::Recv,
            };
            Type::Chan(dir, Box::new(resolve_type(env, elem, tparams)))
        }
        TypeExpr::Func(sig) => Type::Func(resolve_signature(env, sig, tparams)),
        TypeExpr::Struct(fields) => Type::Struct(
            fields
                .iter()
                .map(|f| StructField {
                    name: f
                        .name
                        .clone()
                        .unwrap_or_else(|| embedded_name(&f.ty).to_string()),
                    ty: resolve_type(env, &f.ty, tparams),
                    embedded: f.embedded,
                })
                .collect(),
        ),
        TypeExpr::Interface(elems) => {
            let mut methods = Vec::new();
            for elem in elems {
                match elem {
                    ast::InterfaceElem::Method { name, sig } => methods.push(Method {
                        name: name.clone(),
                        sig: resolve_signature(env, sig, tparams),
                    }),
                    ast::InterfaceElem::Embed(embed) => {
                        let embedded = resolve_type(env, embed, tparams);
                        let underlying = match &embedded {
                            Type::Interface(_) => Some(embedded.clone()),
                            Type::Named { pkg, name } if pkg.is_empty() && name == "error" => {
                                Some(Type::Interface(universe::error_methods()))
                            }
                            _ => env.underlying(&embedded),
                        };
                        // Type-set elements (`~int | string`) contribute no methods.
                        if let Some(Type::Interface(inner)) = underlying {
                            methods.extend(inner);
                        }
                    }
                }
            }
            methods.sort_by(|a, b| a.name.cmp(&b.name));
            methods.dedup_by(|a, b| a.name == b.name);
            Type::Interface(methods)
        }
    }
}

/// Resolve a signature. A variadic final parameter becomes a slice.
pub fn resolve_signature(env: &dyn TypeEnv, sig: &Signature, tparams: &[String]) -> FuncType {
    let mut params: Vec<Type> = sig
        .params
        .iter()
        .map(|p| resolve_type(env, &p.ty, tparams))
        .collect();
    if sig.variadic
        && let Some(last) = params.pop()
    {
        params.push(Type::slice(last));
    }
    FuncType {
        params,
        results: sig
            .results
            .iter()
            .map(|r| resolve_type(env, &r.ty, tparams))
            .collect(),
        variadic: sig.variadic,
    }
}

/// Field name an embedded field is accessed by.
pub fn embedded_name(ty: &TypeExpr) -> &str {
    match ty {
        TypeExpr::Name { name, .. } => name,
        TypeExpr::Pointer(inner) => embedded_name(inner),
        _ => "",
    }
}

/// Parse a Go integer literal (`42`, `0x2a`, `0o52`, `052`, `0b101010`, `1_000`).
pub fn parse_int_literal(text: &str) -> Option<u64> {
    let digits: String = text.chars().filter(|&c| c != '_').collect();
    let lower = digits.to_ascii_lowercase();
    let (radix, body) = if let Some(rest) = lower.strip_prefix("0x") {
        (16, rest)
    } else if let Some(rest) = lower.strip_prefix("0b") {
        (2, rest)
    } else if let Some(rest) = lower.strip_prefix("0o") {
        (8, rest)
    } else if lower.len() > 1 && lower.starts_with('0') {
        (8, &lower[1..])
    } else {
        (10, lower.as_str())
    };
    u64::from_str_radix(body, radix).ok()
}

/// Evaluate a constant integer expression built from literals, named
/// constants and arithmetic.
pub fn eval_int(env: &dyn TypeEnv, expr: &Expr) -> Option<i64> {
    match &expr.kind {
        ExprKind::BasicLit(Lit::Int(text)) => parse_int_literal(text).and_then(|n| i64::try_from(n).ok()),
        ExprKind::BasicLit(Lit::Rune(c)) => Some(*c as i64),
        ExprKind::Ident(name) => env.const_int(name),
        ExprKind::Paren(inner) => eval_int(env, inner),
        ExprKind::Unary { op, x } => {
            let x = eval_int(env, x)?;
            match op {
                UnaryOp::Neg => x.checked_neg(),
                UnaryOp::Pos => Some(x),
                UnaryOp::Xor => Some(!x),
                _ => None,
            }
        }
        ExprKind::Binary { op, x, y } => {
            let (x, y) = (eval_int(env, x)?, eval_int(env, y)?);
            match op {
                BinaryOp::Add => x.checked_add(y),
                BinaryOp::Sub => x.checked_sub(y),
                BinaryOp::Mul => x.checked_mul(y),
                BinaryOp::Quo => x.checked_div(y),
                BinaryOp::Rem => x.checked_rem(y),
                BinaryOp::And => Some(x & y),
                BinaryOp::Or => Some(x | y),
                BinaryOp::Xor => Some(x ^ y),
                BinaryOp::AndNot => Some(x & !y),
                BinaryOp::Shl => u32::try_from(y).ok().and_then(|s| x.checked_shl(s)),
                BinaryOp::Shr => u32::try_from(y).ok().and_then(|s| x.checked_shr(s)),
                _ => None,
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Basic;
    use golower_syntax::{Decl, parse_file};
    use std::collections::HashMap;

    struct Env {
        types: HashMap<String, Type>,
        imports: HashMap<String, String>,
        consts: HashMap<String, i64>,
    }

    impl TypeEnv for Env {
        fn lookup_type(&self, name: &str) -> Option<Type> {
            self.types.get(name).cloned()
        }

        fn import_path(&self, qualifier: &str) -> Option<String> {
            self.imports.get(qualifier).cloned()
        }

        fn underlying(&self, ty: &Type) -> Option<Type> {
            match ty {
                Type::Named { name, .. } if name == "Closer" => Some(Type::Interface(vec![Method {
                    name: "Close".into(),
                    sig: FuncType {
                        params: vec![],
                        results: vec![Type::error()],
                        variadic: false,
                    },
                }])),
                _ => None,
            }
        }

        fn const_int(&self, name: &str) -> Option<i64> {
            self.consts.get(name).copied()
        }
    }

    fn env() -> Env {
        Env {
            types: HashMap::from([
                ("Point".to_string(), Type::named("example.com/p", "Point")),
                ("Closer".to_string(), Type::named("example.com/p", "Closer")),
            ]),
            imports: HashMap::from([
                ("io".to_string(), "io".to_string()),
                ("unsafe".to_string(), "unsafe".to_string()),
            ]),
            consts: HashMap::from([("N".to_string(), 4)]),
        }
    }

    fn type_of(src: &str) -> Type {
        let file = parse_file("p.go", &format!("package p\n\ntype T {src}\n")).unwrap();
        let Decl::Type(spec) = &file.decls[0] else {
            panic!("expected a type declaration");
        };
        resolve_type(&env(), &spec.ty, &[])
    }

    #[test]
    fn test_resolve_composites() {
        assert_eq!(type_of("[]byte").to_string(), "[]uint8");
        assert_eq!(type_of("map[string]*Point").to_string(), "map[string]*example.com/p.Point");
        assert_eq!(type_of("[N * 2]int").to_string(), "[8]int");
        assert_eq!(type_of("<-chan io.Reader").to_string(), "<-chan io.Reader");
        assert_eq!(type_of("unsafe.Pointer"), Type::Basic(Basic::UnsafePointer));
        assert_eq!(type_of("Missing"), Type::Invalid);
    }

    #[test]
    fn test_resolve_interface_embedding() {
        let ty = type_of("interface { Closer; error; Read(p []byte) (int, error) }");
        assert_eq!(
            ty.to_string(),
            "interface{Close() error; Error() string; Read([]uint8) (int, error)}"
        );
    }

    #[test]
    fn test_resolve_variadic_signature() {
        let ty = type_of("func(format string, args ...any)");
        assert_eq!(ty.to_string(), "func(string, ...interface{})");
    }

    #[test]
    fn test_parse_int_literal() {
        assert_eq!(parse_int_literal("42"), Some(42));
        assert_eq!(parse_int_literal("0x2A"), Some(42));
        assert_eq!(parse_int_literal("0o52"), Some(42));
        assert_eq!(parse_int_literal("052"), Some(42));
        assert_eq!(parse_int_literal("0b101010"), Some(42));
        assert_eq!(parse_int_literal("1_000"), Some(1000));
        assert_eq!(parse_int_literal("0"), Some(0));
        assert_eq!(parse_int_literal("0x"), None);
    }
}
