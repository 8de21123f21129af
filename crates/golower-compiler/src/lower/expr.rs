//! Expressions.
//!
//! Integer arithmetic is wrapped back to the width of its type after every
//! operation: `| 0` for 32-bit signed values, `>>> 0` for 32-bit unsigned
//! ones, and masks or shift pairs for the narrower kinds. 64-bit integers
//! are plain doubles and are exact only up to 2^53.

use golower_syntax::{
    BinaryOp, Block, Element, Expr as GoExpr, ExprKind, Lit, Pos, Signature, UnaryOp,
};
use golower_types::{Basic, Builtin, FuncType, Member, Object, Selection, Type};

use super::blocking::{self, CallKind, Callee};
use super::fold::{self, ConstValue};
use super::types::field_property;
use super::{Binding, Lowerer};
use crate::error::GenerationError;
use crate::js::{self, BinaryOp as JsOp, Expr, Function, Stmt, UnaryOp as JsUnary};

type Result<T> = std::result::Result<T, GenerationError>;

/// Truncate a JS number to the integer kind `kind`.
pub(super) fn wrap(e: Expr, kind: Basic) -> Expr {
    match kind {
        Basic::Int | Basic::Int32 => Expr::binary(e, JsOp::BitOr, Expr::number(0)),
        Basic::Uint | Basic::Uint32 | Basic::Uintptr => Expr::binary(e, JsOp::UShr, Expr::number(0)),
        Basic::Int8 => Expr::binary(Expr::binary(e, JsOp::Shl, Expr::number(24)), JsOp::Shr, Expr::number(24)),
        Basic::Int16 => Expr::binary(Expr::binary(e, JsOp::Shl, Expr::number(16)), JsOp::Shr, Expr::number(16)),
        Basic::Uint8 => Expr::binary(e, JsOp::BitAnd, Expr::number(255)),
        Basic::Uint16 => Expr::binary(e, JsOp::BitAnd, Expr::number(65535)),
        _ => e,
    }
}

fn fround(e: Expr) -> Expr {
    Expr::call(Expr::member(Expr::ident("Math"), "fround"), vec![e])
}

fn is_64bit(kind: Basic) -> bool {
    matches!(kind, Basic::Int64 | Basic::Uint64)
}

/// Drop trailing `undefined` arguments of a helper call.
fn trim_undefined(mut args: Vec<Expr>) -> Vec<Expr> {
    while matches!(args.last(), Some(Expr::Literal(js::Literal::Undefined))) {
        args.pop();
    }
    args
}

impl Lowerer<'_> {
    // ========================================================================
    // Constants
    // ========================================================================

    /// The compile-time value of `e`, when it has one.
    pub(super) fn const_value(&self, e: &GoExpr) -> Option<ConstValue> {
        let value = match &e.kind {
            ExprKind::BasicLit(lit) => ConstValue::from_lit(lit)?,
            ExprKind::Paren(inner) => self.const_value(inner)?,
            ExprKind::Ident(name) => self.const_ident(e, name)?,
            ExprKind::Unary { op, x } => fold::unary(*op, self.const_value(x)?)?,
            ExprKind::Binary { op, x, y } => {
                let (a, b) = (self.const_value(x)?, self.const_value(y)?);
                let integer = [x, y].iter().all(|side| {
                    self.basic_of(&self.type_of(side))
                        .is_some_and(|k| k.is_integer() || k == Basic::UntypedRune)
                });
                fold::binary(*op, a, b, integer)?
            }
            // Imported constants are evaluated by their own package.
            ExprKind::Selector { .. } => return None,
            ExprKind::Call { func, args, .. } => self.const_call(func, args)?,
            _ => return None,
        };
        Some(self.normalize(value, &self.type_of(e)))
    }

    fn const_ident(&self, e: &GoExpr, name: &str) -> Option<ConstValue> {
        if let Some(binding) = self.lookup(name) {
            return match binding {
                Binding::Const(v) => Some(v.clone()),
                _ => None,
            };
        }
        match self.pkg.info.uses.get(&e.id) {
            Some(Object::Const { package_level: true }) => self.consts.get(name).cloned(),
            Some(Object::Const { package_level: false }) | None => match name {
                "true" => Some(ConstValue::Bool(true)),
                "false" => Some(ConstValue::Bool(false)),
                "iota" => self.iota.map(ConstValue::Int),
                _ => None,
            },
            _ => None,
        }
    }

    fn const_call(&self, func: &GoExpr, args: &[GoExpr]) -> Option<ConstValue> {
        let f = func.unparen();
        match self.pkg.info.uses.get(&f.id) {
            Some(Object::TypeName(to)) => {
                let [arg] = args else { return None };
                let kind = self.basic_of(to)?;
                return self.const_value(arg)?.convert(kind);
            }
            Some(Object::Builtin(Builtin::Len)) => {
                return match self.const_value(args.first()?)? {
                    ConstValue::Str(s) => Some(ConstValue::Int(s.len() as i128)),
                    _ => None,
                };
            }
            Some(Object::Builtin(b @ (Builtin::Min | Builtin::Max))) => {
                let mut values = args.iter().map(|a| self.const_value(a));
                let mut best = values.next()??;
                for value in values {
                    let value = value?;
                    let less = fold::binary(BinaryOp::Lt, value.clone(), best.clone(), false)?;
                    if (less == ConstValue::Bool(true)) == (*b == Builtin::Min) {
                        best = value;
                    }
                }
                return Some(best);
            }
            _ => {}
        }
        if let ExprKind::Selector { sel, .. } = &f.kind
            && let Some(Selection::Qualified { path, .. }) = self.pkg.info.selections.get(&f.id)
            && path == "math"
            && let [arg] = args
        {
            return fold::float_bits(sel, &self.const_value(arg)?);
        }
        None
    }

    /// A folded value as stored in its (typed) type.
    fn normalize(&self, value: ConstValue, ty: &Type) -> ConstValue {
        match self.basic_of(ty) {
            Some(kind) if !kind.is_untyped() => value.clone().convert(kind).unwrap_or(value),
            _ => value,
        }
    }

    // ========================================================================
    // Values
    // ========================================================================

    /// Lower `e` for storing in a location of type `to`: constants take the
    /// representation of `to`, concrete values are boxed for interfaces,
    /// and structs and arrays are copied.
    pub(super) fn value(&mut self, e: &GoExpr, to: &Type) -> Result<Expr> {
        let from = self.concrete_type(e);
        if let Some(v) = self.const_value(e) {
            if self.is_interface(to) {
                return Ok(self.box_value(v.to_js(), &from.defaulted()));
            }
            if let Some(kind) = self.basic_of(to)
                && let Some(converted) = v.clone().convert(kind)
            {
                return Ok(converted.to_js());
            }
            return Ok(v.to_js());
        }
        let lowered = self.expr(e)?;
        Ok(self.coerce(lowered, &from, to, self.is_fresh(e)))
    }

    /// Convert an already lowered value. `fresh` values need no copy.
    pub(super) fn coerce(&self, value: Expr, from: &Type, to: &Type, fresh: bool) -> Expr {
        if self.is_interface(to) {
            if from.is_invalid() || self.is_interface(from) {
                return value;
            }
            if fresh && self.is_value_aggregate(from) {
                return value;
            }
            return self.box_value(value, from);
        }
        if !fresh {
            let ty = if from.is_invalid() { to } else { from };
            if self.is_value_aggregate(ty) {
                return self.copy_value(value, ty);
            }
        }
        value
    }

    /// Type of `e` before any implicit conversion to an interface. Untyped
    /// constants compared with or assigned to interfaces are recorded with
    /// the interface type.
    fn concrete_type(&self, e: &GoExpr) -> Type {
        let ty = self.type_of(e);
        if !self.is_interface(&ty) {
            return ty;
        }
        if let Some(implicit) = self.pkg.info.implicit.get(&e.id) {
            return implicit.clone();
        }
        let kind = match self.const_value(e) {
            Some(ConstValue::Bool(_)) => Basic::Bool,
            Some(ConstValue::Int(_)) if matches!(e.unparen().kind, ExprKind::BasicLit(Lit::Rune(_))) => Basic::Int32,
            Some(ConstValue::Int(_)) => Basic::Int,
            Some(ConstValue::Float(_)) => Basic::Float64,
            Some(ConstValue::Str(_)) => Basic::String,
            None => return ty,
        };
        Type::Basic(kind)
    }

    /// Whether `e` produces a value nothing else refers to.
    pub(super) fn is_fresh(&self, e: &GoExpr) -> bool {
        let e = e.unparen();
        match &e.kind {
            ExprKind::Composite { .. } | ExprKind::FuncLit { .. } | ExprKind::BasicLit(_) => true,
            ExprKind::Binary { .. } => true,
            ExprKind::Unary { op, .. } => matches!(op, UnaryOp::Recv | UnaryOp::Addr),
            ExprKind::Call { func, .. } => !matches!(
                self.pkg.info.uses.get(&func.unparen().id),
                Some(Object::TypeName(_))
            ),
            _ => false,
        }
    }

    pub(super) fn expr(&mut self, e: &GoExpr) -> Result<Expr> {
        if let Some(v) = self.const_value(e) {
            return Ok(v.to_js());
        }
        match &e.kind {
            ExprKind::Ident(name) => self.ident(e, name),
            ExprKind::BasicLit(Lit::Imag(_)) => Err(self.error(e.pos, "complex number literal")),
            ExprKind::BasicLit(_) => Err(self.error(e.pos, "malformed literal")),
            ExprKind::Composite { elems, .. } => self.composite(e, elems),
            ExprKind::FuncLit { sig, body } => self.func_lit(e, sig, body),
            ExprKind::Paren(inner) => self.expr(inner),
            ExprKind::Selector { x, sel } => self.selector(e, x, sel),
            ExprKind::Index { x, index } => self.index(e, x, index),
            ExprKind::Slice { x, lo, hi, max } => {
                self.slice_expr(x, lo.as_deref(), hi.as_deref(), max.as_deref())
            }
            ExprKind::TypeAssert { x, ty: Some(_) } => {
                let ty = self.type_of(e);
                let value = self.expr(x)?;
                Ok(Expr::helper(
                    "$assertType",
                    vec![value, self.type_desc(&ty), Expr::bool(false)],
                ))
            }
            ExprKind::TypeAssert { ty: None, .. } => {
                Err(self.error(e.pos, "type switch guard outside a type switch"))
            }
            ExprKind::Call {
                func,
                args,
                ellipsis,
            } => self.call(e, func, args, *ellipsis),
            ExprKind::Unary { op, x } => self.unary(e, *op, x),
            ExprKind::Binary { op, x, y } => self.binary(e, *op, x, y),
            ExprKind::Type(_) => Err(self.error(e.pos, "type used as a value")),
        }
    }

    fn ident(&mut self, e: &GoExpr, name: &str) -> Result<Expr> {
        if let Some(binding) = self.lookup(name) {
            return match binding {
                Binding::Var(js_name) => Ok(Expr::ident(js_name.clone())),
                Binding::Const(v) => Ok(v.to_js()),
                Binding::Type(_) => Err(self.error(e.pos, format!("type {name} used as a value"))),
            };
        }
        match self.pkg.info.uses.get(&e.id) {
            Some(Object::Nil) => Ok(Expr::null()),
            Some(Object::TypeName(_)) => Err(self.error(e.pos, format!("type {name} used as a value"))),
            Some(Object::Builtin(_)) => Err(self.error(e.pos, format!("builtin {name} used as a value"))),
            Some(Object::PkgName(path)) => Err(self.error(e.pos, format!("package {path} used as a value"))),
            _ => Ok(Expr::ident(js::mangle(name))),
        }
    }

    /// Multi-valued expression as a JS array: a call with several results
    /// or one of the comma-ok forms.
    pub(super) fn tuple(&mut self, e: &GoExpr) -> Result<Expr> {
        let inner = e.unparen();
        match &inner.kind {
            ExprKind::Index { x, index } if matches!(self.under(&self.type_of(x)), Type::Map(..)) => {
                let Type::Map(key, value) = self.under(&self.type_of(x)) else {
                    return Err(self.error(e.pos, "map lookup"));
                };
                let Some(k) = index.first() else {
                    return Err(self.error(e.pos, "map lookup without a key"));
                };
                let m = self.expr(x)?;
                let k = self.value(k, &key)?;
                Ok(Expr::helper("$mapLookup", vec![m, k, self.zero_thunk(&value)]))
            }
            ExprKind::TypeAssert { x, ty: Some(ty) } => {
                let target = self.resolve(ty);
                let value = self.expr(x)?;
                Ok(Expr::helper(
                    "$assertType",
                    vec![value, self.type_desc(&target), Expr::bool(true), self.zero_thunk(&target)],
                ))
            }
            ExprKind::Unary { op: UnaryOp::Recv, x } => {
                let ch = self.expr(x)?;
                Ok(Expr::yield_star(Expr::helper("$recv", vec![ch])))
            }
            _ => self.expr(e),
        }
    }

    /// Element types of a multi-valued expression.
    pub(super) fn tuple_types(&self, e: &GoExpr) -> Vec<Type> {
        match self.type_of(e) {
            Type::Tuple(items) => items,
            single => vec![single, Type::Basic(Basic::Bool)],
        }
    }

    // ========================================================================
    // Operators
    // ========================================================================

    fn unary(&mut self, e: &GoExpr, op: UnaryOp, x: &GoExpr) -> Result<Expr> {
        match op {
            UnaryOp::Addr => self.address_of(x),
            UnaryOp::Recv => {
                let ch = self.expr(x)?;
                Ok(Expr::index(
                    Expr::yield_star(Expr::helper("$recv", vec![ch])),
                    Expr::number(0),
                ))
            }
            UnaryOp::Deref => {
                if matches!(self.pkg.info.uses.get(&e.id), Some(Object::TypeName(_))) {
                    return Err(self.error(e.pos, "pointer type used as a value"));
                }
                let p = self.expr(x)?;
                let elem = match self.under(&self.type_of(x)) {
                    Type::Pointer(elem) => *elem,
                    _ => Type::Invalid,
                };
                if self.points_to_object(&elem) {
                    Ok(p)
                } else {
                    Ok(Expr::helper("$deref", vec![p]))
                }
            }
            UnaryOp::Not => Ok(Expr::unary(JsUnary::Not, self.expr(x)?)),
            UnaryOp::Pos => self.expr(x),
            UnaryOp::Neg => {
                let value = self.expr(x)?;
                let negated = Expr::unary(JsUnary::Neg, value);
                Ok(match self.basic_of(&self.type_of(e)) {
                    Some(kind) if kind.is_integer() => wrap(negated, kind),
                    _ => negated,
                })
            }
            UnaryOp::Xor => {
                let value = self.expr(x)?;
                Ok(match self.basic_of(&self.type_of(e)) {
                    Some(Basic::Int64) => Expr::binary(
                        Expr::unary(JsUnary::Neg, value),
                        JsOp::Sub,
                        Expr::number(1),
                    ),
                    Some(Basic::Uint64) => Expr::binary(Expr::number(18446744073709551615.0), JsOp::Sub, value),
                    Some(kind) => wrap(Expr::unary(JsUnary::BitNot, value), kind),
                    None => Expr::unary(JsUnary::BitNot, value),
                })
            }
        }
    }

    fn binary(&mut self, e: &GoExpr, op: BinaryOp, x: &GoExpr, y: &GoExpr) -> Result<Expr> {
        match op {
            BinaryOp::LAnd => return Ok(Expr::binary(self.expr(x)?, JsOp::And, self.expr(y)?)),
            BinaryOp::LOr => return Ok(Expr::binary(self.expr(x)?, JsOp::Or, self.expr(y)?)),
            _ => {}
        }
        if matches!(op, BinaryOp::Eq | BinaryOp::Ne) {
            let equal = self.equality(x, y)?;
            return Ok(if op == BinaryOp::Eq { equal } else { negate(equal) });
        }
        let (xt, yt) = (self.type_of(x), self.type_of(y));
        if op.is_comparison() {
            let js_op = match op {
                BinaryOp::Lt => JsOp::Lt,
                BinaryOp::Le => JsOp::Le,
                BinaryOp::Gt => JsOp::Gt,
                _ => JsOp::Ge,
            };
            return Ok(Expr::binary(self.expr(x)?, js_op, self.expr(y)?));
        }

        let ty = self.type_of(e);
        let kind = self
            .basic_of(&ty)
            .or_else(|| self.basic_of(&xt))
            .or_else(|| self.basic_of(&yt))
            .map(Basic::default_type)
            .unwrap_or(Basic::Int);
        let (a, b) = (self.expr(x)?, self.expr(y)?);
        self.arithmetic(e.pos, op, a, b, kind)
    }

    /// Arithmetic on two lowered operands of kind `kind`.
    pub(super) fn arithmetic(&self, pos: Pos, op: BinaryOp, a: Expr, b: Expr, kind: Basic) -> Result<Expr> {
        if kind.is_string() {
            return Ok(Expr::binary(a, JsOp::Add, b));
        }
        if kind.is_complex() {
            return Err(self.error(pos, "complex arithmetic"));
        }
        if kind.is_float() {
            let js_op = match op {
                BinaryOp::Add => JsOp::Add,
                BinaryOp::Sub => JsOp::Sub,
                BinaryOp::Mul => JsOp::Mul,
                BinaryOp::Quo => JsOp::Div,
                _ => return Err(self.error(pos, "operator on floating-point values")),
            };
            let result = Expr::binary(a, js_op, b);
            return Ok(if kind == Basic::Float32 { fround(result) } else { result });
        }
        Ok(integer_op(op, a, b, kind))
    }

    /// `x == y`, boxing the concrete side of a mixed interface comparison.
    fn equality(&mut self, x: &GoExpr, y: &GoExpr) -> Result<Expr> {
        let nil = |l: &Self, side: &GoExpr| matches!(l.pkg.info.uses.get(&side.unparen().id), Some(Object::Nil));
        if nil(self, y) {
            return Ok(Expr::binary(self.expr(x)?, JsOp::Eq, Expr::null()));
        }
        if nil(self, x) {
            return Ok(Expr::binary(self.expr(y)?, JsOp::Eq, Expr::null()));
        }
        let (xt, yt) = (self.concrete_type(x), self.concrete_type(y));
        let (a, b, ty) = match (self.is_interface(&xt), self.is_interface(&yt)) {
            (true, false) => (self.expr(x)?, self.value(y, &xt)?, xt),
            (false, true) => (self.value(x, &yt)?, self.expr(y)?, yt),
            _ => (self.expr(x)?, self.expr(y)?, if xt.is_untyped() { yt } else { xt }),
        };
        Ok(self.equals(a, b, &ty))
    }

    /// Equality of two lowered values of type `ty`.
    pub(super) fn equals(&self, a: Expr, b: Expr, ty: &Type) -> Expr {
        if self.is_interface(ty) || self.is_value_aggregate(ty) {
            Expr::helper("$equal", vec![a, b])
        } else {
            Expr::binary(a, JsOp::Eq, b)
        }
    }

    // ========================================================================
    // Selectors, indexing and slicing
    // ========================================================================

    fn selector(&mut self, e: &GoExpr, x: &GoExpr, sel: &str) -> Result<Expr> {
        match self.pkg.info.selections.get(&e.id).cloned() {
            Some(Selection::Qualified { path, member }) => match member {
                Member::Type(_) => Err(self.error(e.pos, format!("type {sel} used as a value"))),
                _ if path == "unsafe" => Err(self.error(e.pos, format!("unsafe.{sel}"))),
                _ => Ok(Expr::member(self.package_ref(&path), js::mangle_property(sel))),
            },
            Some(Selection::Field { path }) => {
                let base = self.expr(x)?;
                Ok(field_path(base, &path))
            }
            Some(Selection::Method {
                path,
                recv,
                pointer_recv,
            }) => {
                let mut receiver = self.method_receiver(x, &path, recv.as_ref(), pointer_recv)?;
                // A method value binds a copy of a value receiver.
                if !pointer_recv
                    && let Some((pkg, name)) = &recv
                    && self.is_named_struct(&Type::named(pkg.clone(), name.clone()))
                {
                    receiver = Expr::call(Expr::member(receiver, "$copy"), Vec::new());
                }
                Ok(Expr::helper(
                    "$methodVal",
                    vec![receiver, Expr::string(js::mangle_property(sel))],
                ))
            }
            None => {
                if matches!(self.pkg.info.uses.get(&x.unparen().id), Some(Object::TypeName(_)))
                    || matches!(x.unparen().kind, ExprKind::Type(_))
                {
                    return Err(self.error(e.pos, format!("method expression {sel}")));
                }
                let base = self.expr(x)?;
                Ok(Expr::member(base, js::mangle_property(sel)))
            }
        }
    }

    /// The object a method selected on `x` is called on.
    pub(super) fn method_receiver(
        &mut self,
        x: &GoExpr,
        path: &[String],
        recv: Option<&(String, String)>,
        pointer_recv: bool,
    ) -> Result<Expr> {
        let Some((pkg, name)) = recv else {
            let base = self.expr(x)?;
            return Ok(field_path(base, path));
        };
        let named = Type::named(pkg.clone(), name.clone());
        if !self.is_boxed_named(&named) {
            let base = self.expr(x)?;
            return Ok(field_path(base, path));
        }
        let holder = self.embedded_type(&self.type_of(x), path);
        if matches!(self.under(&holder), Type::Pointer(_)) {
            let base = self.expr(x)?;
            return Ok(field_path(base, path));
        }
        if !pointer_recv {
            let base = self.expr(x)?;
            return Ok(Expr::new_(self.type_ref(pkg, name), vec![field_path(base, path)]));
        }
        match path.split_last() {
            None => self.address_of(x),
            Some((last, init)) => {
                let base = self.expr(x)?;
                Ok(Expr::helper(
                    "$fieldPtr",
                    vec![
                        field_path(base, init),
                        Expr::string(js::mangle_property(last)),
                        Expr::member(self.type_ref(pkg, name), "$ptr"),
                    ],
                ))
            }
        }
    }

    /// Type reached from `ty` by following the embedded fields in `path`.
    fn embedded_type(&self, ty: &Type, path: &[String]) -> Type {
        let mut ty = ty.clone();
        for field in path {
            let base = match self.under(&ty) {
                Type::Pointer(inner) => self.under(&inner),
                other => other,
            };
            ty = match base {
                Type::Struct(fields) => fields
                    .into_iter()
                    .find(|f| f.name == *field)
                    .map(|f| f.ty)
                    .unwrap_or(Type::Invalid),
                _ => Type::Invalid,
            };
        }
        ty
    }

    fn index(&mut self, e: &GoExpr, x: &GoExpr, index: &[GoExpr]) -> Result<Expr> {
        let [i] = index else {
            return Err(self.error(e.pos, "generic instantiation"));
        };
        let xt = self.type_of(x);
        if matches!(xt, Type::Func(_))
            || matches!(self.pkg.info.uses.get(&x.unparen().id), Some(Object::TypeName(_)))
        {
            return Err(self.error(e.pos, "generic instantiation"));
        }
        match self.under(&xt) {
            Type::Map(key, value) => {
                let m = self.expr(x)?;
                let k = self.value(i, &key)?;
                Ok(Expr::helper("$mapGet", vec![m, k, self.zero_thunk(&value)]))
            }
            Type::Slice(_) => Ok(Expr::helper("$index", vec![self.expr(x)?, self.expr(i)?])),
            Type::Array(..) => Ok(Expr::helper("$indexArray", vec![self.expr(x)?, self.expr(i)?])),
            Type::Pointer(inner) if matches!(self.under(&inner), Type::Array(..)) => {
                Ok(Expr::helper("$indexArray", vec![self.expr(x)?, self.expr(i)?]))
            }
            Type::Basic(kind) if kind.is_string() => {
                Ok(Expr::helper("$byteAt", vec![self.expr(x)?, self.expr(i)?]))
            }
            _ => Ok(Expr::index(self.expr(x)?, self.expr(i)?)),
        }
    }

    fn slice_expr(
        &mut self,
        x: &GoExpr,
        lo: Option<&GoExpr>,
        hi: Option<&GoExpr>,
        max: Option<&GoExpr>,
    ) -> Result<Expr> {
        let bound = |l: &mut Self, b: Option<&GoExpr>| match b {
            Some(b) => l.expr(b),
            None => Ok(Expr::undefined()),
        };
        let value = self.expr(x)?;
        let (lo, hi, max) = (bound(self, lo)?, bound(self, hi)?, bound(self, max)?);
        let (helper, args) = match self.under(&self.type_of(x)) {
            Type::Basic(kind) if kind.is_string() => ("$substring", vec![value, lo, hi]),
            Type::Array(..) | Type::Pointer(_) => ("$sliceArray", vec![value, lo, hi, max]),
            _ => ("$subslice", vec![value, lo, hi, max]),
        };
        let mut args = trim_undefined(args);
        if args.len() == 1 && helper == "$substring" {
            return Ok(args.remove(0));
        }
        Ok(Expr::helper(helper, args))
    }

    // ========================================================================
    // Composite literals and function literals
    // ========================================================================

    fn composite(&mut self, e: &GoExpr, elems: &[Element]) -> Result<Expr> {
        let ty = match self.type_of(e) {
            Type::Pointer(inner) => *inner,
            ty => ty,
        };
        match self.under(&ty) {
            Type::Struct(fields) => {
                let mut values: Vec<Option<Expr>> = vec![None; fields.len()];
                for (i, elem) in elems.iter().enumerate() {
                    let index = match &elem.key {
                        Some(key) => key.as_ident().and_then(|n| fields.iter().position(|f| f.name == n)),
                        None => Some(i),
                    };
                    let Some(index) = index.filter(|i| *i < fields.len()) else {
                        return Err(self.error(elem.value.pos, "unknown struct field"));
                    };
                    values[index] = Some(self.value(&elem.value, &fields[index].ty)?);
                }
                let values: Vec<Expr> = values
                    .into_iter()
                    .zip(&fields)
                    .map(|(v, f)| v.unwrap_or_else(|| self.zero(&f.ty)))
                    .collect();
                match &ty {
                    Type::Named { pkg, name } => Ok(Expr::new_(self.type_ref(pkg, name), values)),
                    _ => {
                        let mut values = values.into_iter();
                        Ok(self.struct_object(&fields, |_, _, _| values.next().unwrap_or_else(Expr::undefined)))
                    }
                }
            }
            Type::Array(n, elem) => {
                if elems.iter().all(|el| el.key.is_none()) && elems.len() as u64 == n {
                    let items = elems
                        .iter()
                        .map(|el| self.value(&el.value, &elem))
                        .collect::<Result<Vec<_>>>()?;
                    return Ok(Expr::array(items));
                }
                let entries = self.keyed_entries(elems, &elem)?;
                Ok(Expr::helper(
                    "$keyed",
                    vec![Expr::number(n as f64), self.zero_thunk(&elem), entries],
                ))
            }
            Type::Slice(elem) => {
                let array = if elems.iter().all(|el| el.key.is_none()) {
                    let items = elems
                        .iter()
                        .map(|el| self.value(&el.value, &elem))
                        .collect::<Result<Vec<_>>>()?;
                    Expr::array(items)
                } else {
                    let entries = self.keyed_entries(elems, &elem)?;
                    Expr::helper("$keyed", vec![Expr::number(0), self.zero_thunk(&elem), entries])
                };
                Ok(Expr::helper("$sliceOf", vec![array]))
            }
            Type::Map(key, value) => {
                let mut entries = Vec::new();
                for el in elems {
                    let Some(k) = &el.key else {
                        return Err(self.error(el.value.pos, "map literal entry without a key"));
                    };
                    let k = self.value(k, &key)?;
                    let v = self.value(&el.value, &value)?;
                    entries.push(Expr::array(vec![k, v]));
                }
                let mut args = vec![Expr::bool(self.is_hashed_key(&key))];
                if !entries.is_empty() {
                    args.push(Expr::array(entries));
                }
                Ok(Expr::helper("$makeMap", args))
            }
            _ => Err(self.error(e.pos, "composite literal of unknown type")),
        }
    }

    /// `[[index|null, value], ...]` for array and slice literals with keys.
    fn keyed_entries(&mut self, elems: &[Element], elem: &Type) -> Result<Expr> {
        let mut entries = Vec::new();
        for el in elems {
            let key = match &el.key {
                Some(k) => match self.const_value(k).and_then(|v| v.as_int()) {
                    Some(n) => Expr::number(n as f64),
                    None => return Err(self.error(k.pos, "non-constant array index")),
                },
                None => Expr::null(),
            };
            let value = self.value(&el.value, elem)?;
            entries.push(Expr::array(vec![key, value]));
        }
        Ok(Expr::array(entries))
    }

    fn func_lit(&mut self, e: &GoExpr, sig: &Signature, body: &Block) -> Result<Expr> {
        let ft = match self.type_of(e) {
            Type::Func(ft) => ft,
            _ => self
                .pkg
                .resolve_signature(sig, &[], &self.files[self.file].imports),
        };
        let generator = self.blocking.is_lit(e.id);
        let func = self.lower_function(sig, &ft, body, generator, None)?;
        Ok(Expr::function(func))
    }

    // ========================================================================
    // Calls
    // ========================================================================

    fn call(&mut self, e: &GoExpr, func: &GoExpr, args: &[GoExpr], ellipsis: bool) -> Result<Expr> {
        let f = func.unparen();
        match self.pkg.info.uses.get(&f.id).cloned() {
            Some(Object::TypeName(to)) => {
                let [arg] = args else {
                    return Err(self.error(e.pos, "conversion with several arguments"));
                };
                return self.convert(arg, &to);
            }
            Some(Object::Builtin(builtin)) => return self.builtin(e, builtin, args, ellipsis),
            _ => {}
        }
        if let ExprKind::Type(_) = &f.kind {
            let [arg] = args else {
                return Err(self.error(e.pos, "conversion with several arguments"));
            };
            return self.convert(arg, &self.type_of(e));
        }
        if let ExprKind::Index { .. } = &f.kind
            && !matches!(self.under(&self.type_of(f)), Type::Func(_))
        {
            return Err(self.error(e.pos, "call of a generic function"));
        }

        let sig = match self.under(&self.type_of(f)) {
            Type::Func(sig) => sig,
            _ => FuncType::default(),
        };
        let callee = match (&f.kind, self.pkg.info.selections.get(&f.id).cloned()) {
            (
                ExprKind::Selector { x, sel },
                Some(Selection::Method {
                    path,
                    recv,
                    pointer_recv,
                }),
            ) => {
                let receiver = self.method_receiver(x, &path, recv.as_ref(), pointer_recv)?;
                Expr::member(receiver, js::mangle_property(sel))
            }
            _ => self.expr(f)?,
        };
        let args = self.call_args(&sig, args, ellipsis)?;
        let call = Expr::call(callee, args);
        Ok(self.blocking_call(call, &blocking::classify(self.pkg, f)))
    }

    /// Wrap a call to a function that may block.
    pub(super) fn blocking_call(&self, call: Expr, callee: &Callee) -> Expr {
        let kind = self.blocking.call_kind(self.pkg, callee);
        if kind != CallKind::Plain && !self.in_generator() {
            return Expr::helper("$runToCompletion", vec![call]);
        }
        match kind {
            CallKind::Plain => call,
            CallKind::Delegate => Expr::yield_star(call),
            CallKind::Maybe => Expr::yield_star(Expr::helper("$maybe", vec![call])),
        }
    }

    /// Arguments converted to the parameter types, with variadic arguments
    /// packed into a slice.
    pub(super) fn call_args(&mut self, sig: &FuncType, args: &[GoExpr], ellipsis: bool) -> Result<Vec<Expr>> {
        let param = |i: usize| -> Type {
            if sig.variadic && !ellipsis && i + 1 >= sig.params.len() {
                match sig.params.last() {
                    Some(Type::Slice(elem)) => elem.as_ref().clone(),
                    _ => Type::Invalid,
                }
            } else {
                sig.params.get(i).cloned().unwrap_or(Type::Invalid)
            }
        };

        if let [single] = args
            && let Type::Tuple(items) = self.type_of(single)
            && items.len() > 1
        {
            let tuple = self.expr(single)?;
            let needs_conversion = sig.variadic
                || items.iter().enumerate().any(|(i, from)| {
                    let to = param(i);
                    self.is_interface(&to) && !self.is_interface(from)
                });
            if !needs_conversion {
                return Ok(vec![Expr::spread(tuple)]);
            }
            let mut fixed = Vec::new();
            let mut extra = Vec::new();
            for (i, from) in items.iter().enumerate() {
                let item = Expr::index(Expr::ident("$v"), Expr::number(i as f64));
                let converted = self.coerce(item, from, &param(i), true);
                if sig.variadic && i + 1 >= sig.params.len() {
                    extra.push(converted);
                } else {
                    fixed.push(converted);
                }
            }
            if sig.variadic {
                fixed.push(pack_variadic(extra));
            }
            let convert = Function::arrow(vec!["$v".into()], vec![Stmt::return_stmt(Some(Expr::array(fixed)))]);
            return Ok(vec![Expr::spread(Expr::call(Expr::function(convert), vec![tuple]))]);
        }

        let mut fixed = Vec::new();
        let mut extra = Vec::new();
        for (i, arg) in args.iter().enumerate() {
            let value = self.value(arg, &param(i))?;
            if sig.variadic && !ellipsis && i + 1 >= sig.params.len() {
                extra.push(value);
            } else {
                fixed.push(value);
            }
        }
        if sig.variadic && !ellipsis {
            fixed.push(pack_variadic(extra));
        }
        Ok(fixed)
    }

    // ========================================================================
    // Conversions
    // ========================================================================

    fn convert(&mut self, arg: &GoExpr, to: &Type) -> Result<Expr> {
        if let Some(v) = self.const_value(arg)
            && let Some(kind) = self.basic_of(to)
            && !self.is_interface(to)
            && let Some(converted) = v.convert(kind)
        {
            return Ok(converted.to_js());
        }
        if self.is_interface(to) {
            return self.value(arg, to);
        }
        let from = self.type_of(arg);
        let value = self.expr(arg)?;
        let (fu, tu) = (self.under(&from), self.under(to));
        Ok(match (&fu, &tu) {
            (_, Type::Basic(k)) if k.is_string() => match &fu {
                Type::Basic(f) if f.is_integer() => Expr::helper("$runeToString", vec![value]),
                Type::Slice(elem) => match self.basic_of(elem) {
                    Some(Basic::Uint8) => Expr::helper("$bytesToString", vec![value]),
                    Some(Basic::Int32) => Expr::helper("$runesToString", vec![value]),
                    _ => value,
                },
                _ => value,
            },
            (Type::Basic(f), Type::Basic(k)) if k.is_integer() => {
                if f.is_float() {
                    wrap(Expr::helper("$truncate", vec![value]), *k)
                } else if f.default_type() == *k || is_64bit(*k) {
                    value
                } else {
                    wrap(value, *k)
                }
            }
            (Type::Basic(f), Type::Basic(Basic::Float32)) if *f != Basic::Float32 => fround(value),
            (Type::Basic(f), Type::Slice(elem)) if f.is_string() => {
                match self.basic_of(elem) {
                    Some(Basic::Uint8) => Expr::helper("$stringToBytes", vec![value]),
                    Some(Basic::Int32) => Expr::helper("$stringToRunes", vec![value]),
                    _ => value,
                }
            }
            (Type::Struct(fields), Type::Struct(_)) if from != *to => match to {
                Type::Named { pkg, name } => {
                    let values = fields
                        .iter()
                        .enumerate()
                        .map(|(i, f)| {
                            self.copy_value(Expr::member(Expr::ident("$v"), field_property(&f.name, i)), &f.ty)
                        })
                        .collect();
                    let rebuild = Function::arrow(
                        vec!["$v".into()],
                        vec![Stmt::return_stmt(Some(Expr::new_(self.type_ref(pkg, name), values)))],
                    );
                    Expr::call(Expr::function(rebuild), vec![value])
                }
                _ => self.copy_value(value, &from),
            },
            _ => value,
        })
    }

    // ========================================================================
    // Builtins
    // ========================================================================

    fn builtin(&mut self, e: &GoExpr, builtin: Builtin, args: &[GoExpr], ellipsis: bool) -> Result<Expr> {
        let arg = |i: usize| args.get(i);
        let missing = |l: &Self| l.error(e.pos, "builtin call with missing arguments");
        match builtin {
            Builtin::Len | Builtin::Cap => {
                let x = arg(0).ok_or_else(|| missing(self))?;
                let ty = self.type_of(x);
                let under = match self.under(&ty) {
                    Type::Pointer(inner) => self.under(&inner),
                    other => other,
                };
                if let Type::Array(n, _) = under {
                    return Ok(Expr::number(n as f64));
                }
                let value = self.expr(x)?;
                Ok(match (builtin, under) {
                    (Builtin::Len, Type::Basic(k)) if k.is_string() => Expr::helper("$stringLen", vec![value]),
                    (Builtin::Len, _) => Expr::helper("$len", vec![value]),
                    _ => Expr::helper("$cap", vec![value]),
                })
            }
            Builtin::Append => {
                let s = arg(0).ok_or_else(|| missing(self))?;
                let slice_ty = self.type_of(e);
                let elem = match self.under(&slice_ty) {
                    Type::Slice(elem) => *elem,
                    _ => Type::Invalid,
                };
                let base = self.expr(s)?;
                if args.len() == 1 {
                    return Ok(base);
                }
                if ellipsis {
                    let rest = self.expr(&args[1])?;
                    return Ok(Expr::helper("$appendSlice", vec![base, rest]));
                }
                let mut call_args = vec![base];
                for value in &args[1..] {
                    call_args.push(self.value(value, &elem)?);
                }
                Ok(Expr::helper("$append", call_args))
            }
            Builtin::Copy => {
                let (Some(dst), Some(src)) = (arg(0), arg(1)) else {
                    return Err(missing(self));
                };
                Ok(Expr::helper("$copy", vec![self.expr(dst)?, self.expr(src)?]))
            }
            Builtin::Delete => {
                let (Some(m), Some(k)) = (arg(0), arg(1)) else {
                    return Err(missing(self));
                };
                let key = match self.under(&self.type_of(m)) {
                    Type::Map(key, _) => *key,
                    _ => Type::Invalid,
                };
                let m = self.expr(m)?;
                Ok(Expr::helper("$mapDelete", vec![m, self.value(k, &key)?]))
            }
            Builtin::Make => self.make(e, args),
            Builtin::New => {
                let ty = match self.type_of(e) {
                    Type::Pointer(elem) => *elem,
                    _ => arg(0).map(|t| self.type_of(t)).unwrap_or(Type::Invalid),
                };
                let zero = self.zero(&ty);
                if self.points_to_object(&ty) {
                    return Ok(zero);
                }
                let mut args = vec![zero];
                args.extend(self.pointer_ctor(&ty));
                Ok(Expr::helper("$newPtr", args))
            }
            Builtin::Panic => {
                let v = arg(0).ok_or_else(|| missing(self))?;
                let value = self.value(v, &Type::Interface(Vec::new()))?;
                Ok(Expr::helper("$panic", vec![value]))
            }
            Builtin::Recover => {
                // The token only reaches a function invoked by a defer frame,
                // as one argument past its declared parameters.
                let token = match self.funcs.last_mut() {
                    Some(state) if state.takes_unwind => {
                        state.recovers = true;
                        vec![Expr::ident("$rt")]
                    }
                    _ => Vec::new(),
                };
                Ok(Expr::helper("$recover", token))
            }
            Builtin::Print | Builtin::Println => {
                let mut values = Vec::new();
                for a in args {
                    let value = self.expr(a)?;
                    let is_float = self.basic_of(&self.type_of(a)).is_some_and(Basic::is_float);
                    values.push(if is_float { Expr::helper("$formatFloat", vec![value]) } else { value });
                }
                let helper = if builtin == Builtin::Print { "$print" } else { "$println" };
                Ok(Expr::helper(helper, values))
            }
            Builtin::Close => {
                let ch = arg(0).ok_or_else(|| missing(self))?;
                Ok(Expr::helper("$close", vec![self.expr(ch)?]))
            }
            Builtin::Clear => {
                let x = arg(0).ok_or_else(|| missing(self))?;
                let ty = self.under(&self.type_of(x));
                let value = self.expr(x)?;
                Ok(match ty {
                    Type::Map(..) => Expr::helper("$mapClear", vec![value]),
                    Type::Slice(elem) => Expr::helper("$clearSlice", vec![value, self.zero_thunk(&elem)]),
                    _ => return Err(self.error(e.pos, "clear of a non-map, non-slice value")),
                })
            }
            Builtin::Min | Builtin::Max => {
                let ty = self.type_of(e);
                let mut values = Vec::new();
                for a in args {
                    values.push(self.value(a, &ty)?);
                }
                let helper = if builtin == Builtin::Min { "$min" } else { "$max" };
                Ok(Expr::helper(helper, values))
            }
            Builtin::Complex | Builtin::Real | Builtin::Imag => {
                Err(self.error(e.pos, "complex numbers"))
            }
        }
    }

    fn make(&mut self, e: &GoExpr, args: &[GoExpr]) -> Result<Expr> {
        let ty = self.type_of(e);
        let size = |l: &mut Self, i: usize| -> Result<Option<Expr>> {
            args.get(i).map(|a| l.expr(a)).transpose()
        };
        match self.under(&ty) {
            Type::Slice(elem) => {
                let len = size(self, 1)?.unwrap_or_else(|| Expr::number(0));
                let cap = size(self, 2)?.unwrap_or_else(Expr::undefined);
                Ok(Expr::helper("$makeSlice", vec![len, cap, self.zero_thunk(&elem)]))
            }
            Type::Map(key, _) => Ok(Expr::helper("$makeMap", vec![Expr::bool(self.is_hashed_key(&key))])),
            Type::Chan(_, elem) => {
                let cap = size(self, 1)?.unwrap_or_else(|| Expr::number(0));
                Ok(Expr::new_(Expr::ident("$Chan"), vec![cap, self.zero_thunk(&elem)]))
            }
            _ => Err(self.error(e.pos, "make of a non-slice, non-map, non-channel type")),
        }
    }

    // ========================================================================
    // Pointers
    // ========================================================================

    /// `&x`.
    pub(super) fn address_of(&mut self, x: &GoExpr) -> Result<Expr> {
        let inner = x.unparen();
        let ty = self.type_of(inner);
        if self.points_to_object(&ty) {
            return self.expr(inner);
        }
        let ctor = self.pointer_ctor(&ty);
        let with_ctor = |mut args: Vec<Expr>| {
            args.extend(ctor.clone());
            args
        };
        match &inner.kind {
            ExprKind::Composite { .. } => {
                let value = self.expr(inner)?;
                Ok(Expr::helper("$newPtr", with_ctor(vec![value])))
            }
            ExprKind::Ident(_) => {
                let target = self.expr(inner)?;
                Ok(self.cell_pointer(target, ctor.clone()))
            }
            ExprKind::Selector { x: obj, sel } => match self.pkg.info.selections.get(&inner.id).cloned() {
                Some(Selection::Qualified { .. }) => {
                    let target = self.expr(inner)?;
                    Ok(self.cell_pointer(target, ctor.clone()))
                }
                Some(Selection::Field { path }) => {
                    let base = self.expr(obj)?;
                    let (last, init) = path.split_last().map(|(l, i)| (l.clone(), i.to_vec())).unwrap_or((sel.clone(), Vec::new()));
                    Ok(Expr::helper(
                        "$fieldPtr",
                        with_ctor(vec![field_path(base, &init), Expr::string(js::mangle_property(&last))]),
                    ))
                }
                _ => {
                    let value = self.expr(inner)?;
                    Ok(Expr::helper("$newPtr", with_ctor(vec![value])))
                }
            },
            ExprKind::Index { x: container, index } => {
                let Some(i) = index.first() else {
                    return Err(self.error(inner.pos, "address of a generic instantiation"));
                };
                let helper = match self.under(&self.type_of(container)) {
                    Type::Slice(_) => "$elemPtr",
                    Type::Array(..) | Type::Pointer(_) => "$arrayElemPtr",
                    _ => return Err(self.error(inner.pos, "address of a map element")),
                };
                let c = self.expr(container)?;
                let i = self.expr(i)?;
                Ok(Expr::helper(helper, with_ctor(vec![c, i])))
            }
            ExprKind::Unary { op: UnaryOp::Deref, x: p } => self.expr(p),
            _ => {
                let value = self.expr(inner)?;
                Ok(Expr::helper("$newPtr", with_ctor(vec![value])))
            }
        }
    }

    /// A pointer to a variable, reading and writing it through closures.
    fn cell_pointer(&self, target: Expr, ctor: Option<Expr>) -> Expr {
        let get = Function::arrow(Vec::new(), vec![Stmt::return_stmt(Some(target.clone()))]);
        let set = Function::arrow(vec!["$v".into()], vec![Stmt::assign(target, Expr::ident("$v"))]);
        Expr::new_(
            ctor.unwrap_or_else(|| Expr::ident("$Ptr")),
            vec![Expr::function(get), Expr::function(set)],
        )
    }
}

/// Member accesses along a field path.
pub(super) fn field_path(base: Expr, path: &[String]) -> Expr {
    path.iter()
        .fold(base, |obj, field| Expr::member(obj, js::mangle_property(field)))
}

fn pack_variadic(values: Vec<Expr>) -> Expr {
    if values.is_empty() {
        Expr::null()
    } else {
        Expr::helper("$sliceOf", vec![Expr::array(values)])
    }
}

fn negate(e: Expr) -> Expr {
    match e {
        Expr::Binary {
            left,
            op: JsOp::Eq,
            right,
        } => Expr::Binary {
            left,
            op: JsOp::Ne,
            right,
        },
        other => Expr::unary(JsUnary::Not, other),
    }
}

/// Integer arithmetic of kind `kind`, wrapped to its width.
fn integer_op(op: BinaryOp, a: Expr, b: Expr, kind: Basic) -> Expr {
    let wide = is_64bit(kind);
    let unsigned32 = matches!(kind, Basic::Uint | Basic::Uint32 | Basic::Uintptr);
    match op {
        BinaryOp::Add => wrap(Expr::binary(a, JsOp::Add, b), kind),
        BinaryOp::Sub => wrap(Expr::binary(a, JsOp::Sub, b), kind),
        BinaryOp::Mul if wide => Expr::binary(a, JsOp::Mul, b),
        BinaryOp::Mul => {
            let product = Expr::call(Expr::member(Expr::ident("Math"), "imul"), vec![a, b]);
            if matches!(kind, Basic::Int | Basic::Int32) { product } else { wrap(product, kind) }
        }
        BinaryOp::Quo => wrap(Expr::helper("$div", vec![a, b]), kind),
        BinaryOp::Rem => Expr::helper("$rem", vec![a, b]),
        BinaryOp::And | BinaryOp::Or | BinaryOp::Xor | BinaryOp::AndNot => {
            let result = match op {
                BinaryOp::And => Expr::binary(a, JsOp::BitAnd, b),
                BinaryOp::Or => Expr::binary(a, JsOp::BitOr, b),
                BinaryOp::Xor => Expr::binary(a, JsOp::BitXor, b),
                _ => Expr::binary(a, JsOp::BitAnd, Expr::unary(JsUnary::BitNot, b)),
            };
            if unsigned32 { wrap(result, kind) } else { result }
        }
        BinaryOp::Shl if wide => Expr::helper("$shiftLeft64", vec![a, b]),
        BinaryOp::Shl => {
            let shifted = Expr::helper("$shiftLeft32", vec![a, b]);
            if matches!(kind, Basic::Int | Basic::Int32) { shifted } else { wrap(shifted, kind) }
        }
        BinaryOp::Shr if wide => Expr::helper("$shiftRight64", vec![a, b]),
        BinaryOp::Shr if kind.is_unsigned() => Expr::helper("$shiftRightUint32", vec![a, b]),
        BinaryOp::Shr => Expr::helper("$shiftRightInt32", vec![a, b]),
        _ => Expr::binary(a, JsOp::Add, b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lower::tests::{compile, compile_err};

    fn body(src: &str) -> String {
        compile(&format!("package main\n\n{src}\n"))
    }

    #[test]
    fn test_wrap_by_kind() {
        let x = || Expr::ident("x");
        let emit = |e: Expr| crate::writer::JsWriter::emit_expr(&e);
        assert_eq!(emit(wrap(x(), Basic::Int)), "(x | 0)");
        assert_eq!(emit(wrap(x(), Basic::Uint32)), "(x >>> 0)");
        assert_eq!(emit(wrap(x(), Basic::Int8)), "((x << 24) >> 24)");
        assert_eq!(emit(wrap(x(), Basic::Uint16)), "(x & 65535)");
        assert_eq!(emit(wrap(x(), Basic::Int64)), "x");
    }

    #[test]
    fn test_integer_arithmetic_wraps() {
        let js = body(
            "func f(a, b int, c uint8, d uint32) (int, uint8, uint32, int) {\n\treturn a*b + 1, c + 1, d << 3, a / b\n}\n\nfunc main() {}",
        );
        assert!(js.contains("((Math.imul(a, b) + 1) | 0)"), "{js}");
        assert!(js.contains("((c + 1) & 255)"), "{js}");
        assert!(js.contains("($shiftLeft32(d, 3) >>> 0)"), "{js}");
        assert!(js.contains("($div(a, b) | 0)"), "{js}");
    }

    #[test]
    fn test_float32_rounds() {
        let js = body("func f(a, b float32) float32 { return a * b }\n\nfunc main() {}");
        assert!(js.contains("return Math.fround((a * b));"), "{js}");
    }

    #[test]
    fn test_string_operations() {
        let js = body(
            "func f(s string) (int, byte, string, string) {\n\treturn len(s), s[0], s[1:], s + \"!\"\n}\n\nfunc main() {}",
        );
        assert!(js.contains("$stringLen(s)"), "{js}");
        assert!(js.contains("$byteAt(s, 0)"), "{js}");
        assert!(js.contains("$substring(s, 1)"), "{js}");
        assert!(js.contains("(s + \"!\")"), "{js}");
    }

    #[test]
    fn test_interface_boxing_and_comparison() {
        let js = body(
            "func f(x interface{}) bool {\n\treturn x == 3\n}\n\nfunc g() interface{} { return \"s\" }\n\nfunc main() {}",
        );
        assert!(js.contains("$equal(x, new $Int(3))"), "{js}");
        assert!(js.contains("return new $String(\"s\");"), "{js}");
    }

    #[test]
    fn test_nil_comparison() {
        let js = body("func f(err error) bool { return err != nil }\n\nfunc main() {}");
        assert!(js.contains("return (err !== null);"), "{js}");
    }

    #[test]
    fn test_struct_literals_and_copies() {
        let js = body(
            "type P struct{ X, Y int }\n\nfunc f() P {\n\tp := P{Y: 2}\n\tq := p\n\treturn q\n}\n\nfunc main() {}",
        );
        assert!(js.contains("let p = new P(0, 2);"), "{js}");
        assert!(js.contains("let q = p.$copy();"), "{js}");
    }

    #[test]
    fn test_slices_and_maps() {
        let js = body(
            "func f() int {\n\ts := []int{1, 2, 3}\n\tm := map[string]int{\"a\": 1}\n\ts = append(s, 4)\n\treturn s[1] + m[\"a\"] + len(s)\n}\n\nfunc main() {}",
        );
        assert!(js.contains("let s = $sliceOf([1, 2, 3]);"), "{js}");
        assert!(js.contains("let m = $makeMap(false, [[\"a\", 1]]);"), "{js}");
        assert!(js.contains("s = $append(s, 4);"), "{js}");
        assert!(js.contains("$index(s, 1)"), "{js}");
        assert!(js.contains("$mapGet(m, \"a\", () => 0)"), "{js}");
        assert!(js.contains("$len(s)"), "{js}");
    }

    #[test]
    fn test_conversions() {
        let js = body(
            "func f(x float64, n int, b []byte) (int, uint8, string, []rune, float32) {\n\treturn int(x), uint8(n), string(b), []rune(\"hé\"), float32(x)\n}\n\nfunc main() {}",
        );
        assert!(js.contains("($truncate(x) | 0)"), "{js}");
        assert!(js.contains("(n & 255)"), "{js}");
        assert!(js.contains("$bytesToString(b)"), "{js}");
        assert!(js.contains("$stringToRunes(\"hé\")"), "{js}");
        assert!(js.contains("Math.fround(x)"), "{js}");
    }

    #[test]
    fn test_address_of_variable() {
        let js = body("func f() *int {\n\tx := 1\n\treturn &x\n}\n\nfunc main() {}");
        assert!(js.contains("return new $Ptr(() => x, ($v) => {"), "{js}");
    }

    #[test]
    fn test_variadic_call_packs_arguments() {
        let js = body(
            "func sum(xs ...int) int { return len(xs) }\n\nfunc main() {\n\tsum()\n\tsum(1, 2)\n\tsum([]int{3}...)\n}",
        );
        assert!(js.contains("sum(null);"), "{js}");
        assert!(js.contains("sum($sliceOf([1, 2]));"), "{js}");
        assert!(js.contains("sum($sliceOf([3]));"), "{js}");
    }

    #[test]
    fn test_println_formats_floats() {
        let js = body("func main() {\n\tx := 1.5\n\tprintln(\"x\", x, 2)\n}");
        assert!(js.contains("$println(\"x\", $formatFloat(x), 2);"), "{js}");
    }

    #[test]
    fn test_complex_numbers_are_rejected() {
        let err = compile_err("package main\n\nfunc main() {\n\tx := 1i\n\t_ = x\n}\n");
        assert!(err.contains("cannot compile complex number literal"), "{err}");
    }
}
