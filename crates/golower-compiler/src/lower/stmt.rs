//! Statements and function bodies.

use golower_syntax::{
    Block, CaseClause, CommClause, CommOp, Decl, Expr as GoExpr, ExprKind, Signature, Stmt as GoStmt,
    StmtKind, TypeCaseClause, UnaryOp, ValueSpec,
};
use golower_types::{Basic, Builtin, FuncType, Object, Selection, Type};

use super::expr::field_path;
use super::{Binding, FuncState, Lowerer};
use crate::error::GenerationError;
use crate::js::{self, BinaryOp as JsOp, Expr, Function, Stmt, SwitchCase, UnaryOp as JsUnary, VarKind};

type Result<T> = std::result::Result<T, GenerationError>;

/// A location an assignment writes to.
enum Place {
    Blank,
    /// A variable, package member or struct field.
    Direct(Expr),
    Slice(Expr, Expr),
    Array(Expr, Expr),
    /// Map, key and zero-value thunk.
    Map(Expr, Expr, Expr),
    Pointer(Expr),
    /// The pointee of a pointer to a struct or array.
    Object(Expr),
}

/// Whether a block defers, not counting nested function literals.
fn has_defer(block: &Block) -> bool {
    block.iter().any(|s| stmt_defers(s))
}

fn stmt_defers(s: &GoStmt) -> bool {
    match &s.kind {
        StmtKind::Defer(_) => true,
        StmtKind::Block(b) => has_defer(b),
        StmtKind::If { then, els, .. } => has_defer(then) || els.as_deref().is_some_and(stmt_defers),
        StmtKind::For { body, .. } | StmtKind::Range { body, .. } => has_defer(body),
        StmtKind::Switch { cases, .. } => cases.iter().any(|c| has_defer(&c.body)),
        StmtKind::TypeSwitch { cases, .. } => cases.iter().any(|c| has_defer(&c.body)),
        StmtKind::Select(clauses) => clauses.iter().any(|c| has_defer(&c.body)),
        StmtKind::Labeled { stmt, .. } => stmt_defers(stmt),
        _ => false,
    }
}

fn block_or_single(mut stmts: Vec<Stmt>) -> Stmt {
    if stmts.len() == 1 {
        stmts.remove(0)
    } else {
        Stmt::Block(stmts)
    }
}

impl Lowerer<'_> {
    // ========================================================================
    // Functions
    // ========================================================================

    /// Lower a function body. The receiver, when given, is bound to its
    /// initial value before the parameters.
    pub(super) fn lower_function(
        &mut self,
        sig: &Signature,
        ft: &FuncType,
        body: &Block,
        generator: bool,
        receiver: Option<(&str, Expr)>,
    ) -> Result<Function> {
        self.push_scope();
        self.funcs.push(FuncState {
            generator,
            results: ft.results.clone(),
            takes_unwind: true,
            ..FuncState::default()
        });
        let lowered = self.function_body(sig, ft, body, receiver);
        self.funcs.pop();
        self.pop_scope();
        let (params, stmts) = lowered?;
        Ok(Function::anonymous(params, stmts).generator(generator))
    }

    fn function_body(
        &mut self,
        sig: &Signature,
        ft: &FuncType,
        body: &Block,
        receiver: Option<(&str, Expr)>,
    ) -> Result<(Vec<String>, Vec<Stmt>)> {
        let mut prologue = Vec::new();
        if let Some((name, init)) = receiver
            && name != "_"
        {
            let js_name = self.declare_var(name);
            prologue.push(Stmt::let_decl(js_name, Some(init)));
        }
        let mut params = Vec::new();
        for (i, field) in sig.params.iter().enumerate() {
            params.push(match field.name.as_deref() {
                Some(name) if name != "_" => self.declare_var(name),
                _ => format!("$p{i}"),
            });
        }

        let named = sig.results.iter().any(|f| f.name.is_some());
        let frame = has_defer(body);
        if named || frame {
            let mut vars = Vec::new();
            for (i, ty) in ft.results.iter().enumerate() {
                let js_name = match sig.results.get(i).and_then(|f| f.name.as_deref()) {
                    Some(name) if name != "_" => self.declare_var(name),
                    _ => format!("$r{i}"),
                };
                prologue.push(Stmt::let_decl(js_name.clone(), Some(self.zero(ty))));
                vars.push(js_name);
            }
            if let Some(state) = self.funcs.last_mut() {
                state.result_vars = Some(vars);
                state.frame = frame;
            }
        }

        let stmts = self.block_stmts(body)?;
        if self.funcs.last().is_some_and(|f| f.recovers) {
            params.push("$rt".into());
        }
        if !frame {
            prologue.extend(stmts);
            return Ok((params, prologue));
        }

        let generator = self.in_generator();
        let f = || Expr::ident("$f");
        prologue.push(Stmt::const_decl("$f", Expr::new_(Expr::ident("$Frame"), Vec::new())));
        let exit = if generator {
            Expr::yield_star(Expr::call(Expr::member(f(), "exitGen"), Vec::new()))
        } else {
            Expr::call(Expr::member(f(), "exit"), Vec::new())
        };
        let mut finally = vec![Stmt::expr(exit)];
        if !ft.results.is_empty() {
            finally.push(Stmt::return_stmt(Some(self.result_vars_expr())));
        }
        prologue.push(Stmt::TryCatch {
            body: Box::new(Stmt::Block(stmts)),
            catch_param: Some("$e".into()),
            catch_body: Some(Box::new(Stmt::Block(vec![Stmt::expr(Expr::call(
                Expr::member(f(), "fail"),
                vec![Expr::ident("$e")],
            ))]))),
            finally_body: Some(Box::new(Stmt::Block(finally))),
        });
        Ok((params, prologue))
    }

    /// The current function's result variables as a return value.
    fn result_vars_expr(&self) -> Expr {
        let vars = self
            .funcs
            .last()
            .and_then(|f| f.result_vars.clone())
            .unwrap_or_default();
        match vars.as_slice() {
            [one] => Expr::ident(one.clone()),
            many => Expr::array(many.iter().map(|v| Expr::ident(v.clone())).collect()),
        }
    }

    pub(super) fn block_stmts(&mut self, block: &Block) -> Result<Vec<Stmt>> {
        let mut out = Vec::new();
        for s in block {
            out.extend(self.stmt(s)?);
        }
        Ok(out)
    }

    fn scoped_block(&mut self, block: &Block) -> Result<Stmt> {
        self.push_scope();
        let stmts = self.block_stmts(block);
        self.pop_scope();
        Ok(Stmt::Block(stmts?))
    }

    // ========================================================================
    // Statements
    // ========================================================================

    fn stmt(&mut self, s: &GoStmt) -> Result<Vec<Stmt>> {
        match &s.kind {
            StmtKind::Expr(e) => Ok(vec![self.expr_stmt(e)?]),
            StmtKind::Send { chan, value } => {
                let elem = match self.under(&self.type_of(chan)) {
                    Type::Chan(_, elem) => *elem,
                    _ => Type::Invalid,
                };
                let ch = self.expr(chan)?;
                let v = self.value(value, &elem)?;
                Ok(vec![Stmt::expr(Expr::yield_star(Expr::helper("$send", vec![ch, v])))])
            }
            StmtKind::IncDec { target, inc } => {
                let op = if *inc { golower_syntax::BinaryOp::Add } else { golower_syntax::BinaryOp::Sub };
                self.assign_op(target, op, None)
            }
            StmtKind::Assign { lhs, op: Some(op), rhs } => match (lhs.as_slice(), rhs.as_slice()) {
                ([target], [value]) => self.assign_op(target, *op, Some(value)),
                _ => Err(self.error(s.pos, "compound assignment to several targets")),
            },
            StmtKind::Assign { lhs, op: None, rhs } => self.assign(s, lhs, rhs),
            StmtKind::Define { names, values } => self.define(s, names, values),
            StmtKind::Decl(decl) => self.local_decl(decl),
            StmtKind::Go(call) => {
                let (mut out, func, args) = self.deferred_call(call)?;
                out.push(Stmt::expr(Expr::helper("$go", vec![func, Expr::array(args)])));
                Ok(out)
            }
            StmtKind::Defer(call) => {
                let (mut out, func, args) = self.deferred_call(call)?;
                out.push(Stmt::expr(Expr::call(
                    Expr::member(Expr::ident("$f"), "defer"),
                    vec![func, Expr::array(args)],
                )));
                Ok(out)
            }
            StmtKind::Return(values) => self.return_stmt(s, values),
            StmtKind::If {
                init,
                cond,
                then,
                els,
            } => self.if_stmt(init.as_deref(), cond, then, els.as_deref()),
            StmtKind::For { .. } | StmtKind::Range { .. } => self.loop_stmt(None, s),
            StmtKind::Switch { init, tag, cases } => self.switch_stmt(None, init.as_deref(), tag.as_ref(), cases),
            StmtKind::TypeSwitch {
                init,
                bind,
                subject,
                cases,
            } => self.type_switch(None, init.as_deref(), bind.as_deref(), subject, cases),
            StmtKind::Select(clauses) => self.select_stmt(None, clauses),
            StmtKind::Block(block) => Ok(vec![self.scoped_block(block)?]),
            StmtKind::Labeled { label, stmt } => {
                let name = js::mangle(label);
                match &stmt.kind {
                    StmtKind::For { .. } | StmtKind::Range { .. } => self.loop_stmt(Some(label), stmt),
                    StmtKind::Switch { init, tag, cases } => {
                        self.switch_stmt(Some(&name), init.as_deref(), tag.as_ref(), cases)
                    }
                    StmtKind::TypeSwitch {
                        init,
                        bind,
                        subject,
                        cases,
                    } => self.type_switch(Some(&name), init.as_deref(), bind.as_deref(), subject, cases),
                    StmtKind::Select(clauses) => self.select_stmt(Some(&name), clauses),
                    _ => {
                        let inner = self.stmt(stmt)?;
                        Ok(vec![Stmt::labeled(name, Stmt::Block(inner))])
                    }
                }
            }
            StmtKind::Break(label) => Ok(vec![Stmt::Break(label.as_deref().map(js::mangle))]),
            StmtKind::Continue(label) => {
                if let Some(label) = label
                    && !self.funcs.last().is_some_and(|f| f.loop_labels.contains(label))
                {
                    return Err(self.error(s.pos, format!("continue to non-loop label {label}")));
                }
                Ok(vec![Stmt::Continue(label.as_deref().map(js::mangle))])
            }
            // Handled by the enclosing switch.
            StmtKind::Fallthrough => Ok(Vec::new()),
            StmtKind::Goto(label) => Err(self.error(s.pos, format!("goto {label}"))),
            StmtKind::Empty => Ok(Vec::new()),
        }
    }

    fn expr_stmt(&mut self, e: &GoExpr) -> Result<Stmt> {
        if let ExprKind::Unary { op: UnaryOp::Recv, x } = &e.unparen().kind {
            let ch = self.expr(x)?;
            return Ok(Stmt::expr(Expr::yield_star(Expr::helper("$recv", vec![ch]))));
        }
        Ok(Stmt::expr(self.expr(e)?))
    }

    // ========================================================================
    // Assignment
    // ========================================================================

    fn place(&mut self, target: &GoExpr, pre: &mut Vec<Stmt>, once: bool) -> Result<Place> {
        let t = target.unparen();
        if t.as_ident() == Some("_") {
            return Ok(Place::Blank);
        }
        let hoist = |l: &mut Self, e: Expr, pre: &mut Vec<Stmt>| {
            if !once || e.is_simple() {
                return e;
            }
            let name = l.temp();
            pre.push(Stmt::const_decl(name.clone(), e));
            Expr::ident(name)
        };
        match &t.kind {
            ExprKind::Selector { x, .. } => match self.pkg.info.selections.get(&t.id).cloned() {
                Some(Selection::Field { path }) => {
                    let Some((last, init)) = path.split_last() else {
                        return Err(self.error(t.pos, "assignment to an empty field path"));
                    };
                    let base = self.expr(x)?;
                    let parent = hoist(self, field_path(base, init), pre);
                    Ok(Place::Direct(Expr::member(parent, js::mangle_property(last))))
                }
                _ => Ok(Place::Direct(self.expr(t)?)),
            },
            ExprKind::Ident(_) => Ok(Place::Direct(self.expr(t)?)),
            ExprKind::Index { x, index } => {
                let [i] = index.as_slice() else {
                    return Err(self.error(t.pos, "assignment to a generic instantiation"));
                };
                match self.under(&self.type_of(x)) {
                    Type::Map(key, value) => {
                        let m = self.expr(x)?;
                        let m = hoist(self, m, pre);
                        let k = self.value(i, &key)?;
                        let k = hoist(self, k, pre);
                        Ok(Place::Map(m, k, self.zero_thunk(&value)))
                    }
                    under => {
                        let c = self.expr(x)?;
                        let c = hoist(self, c, pre);
                        let i = self.expr(i)?;
                        let i = hoist(self, i, pre);
                        match under {
                            Type::Slice(_) => Ok(Place::Slice(c, i)),
                            Type::Array(..) | Type::Pointer(_) => Ok(Place::Array(c, i)),
                            _ => Err(self.error(t.pos, "assignment to a string byte")),
                        }
                    }
                }
            }
            ExprKind::Unary { op: UnaryOp::Deref, x: p } => {
                let elem = match self.under(&self.type_of(p)) {
                    Type::Pointer(elem) => *elem,
                    _ => Type::Invalid,
                };
                let p = self.expr(p)?;
                let p = hoist(self, p, pre);
                if self.points_to_object(&elem) {
                    Ok(Place::Object(p))
                } else {
                    Ok(Place::Pointer(p))
                }
            }
            _ => Err(self.error(t.pos, "assignment to this expression")),
        }
    }

    fn read(&self, place: &Place) -> Expr {
        match place {
            Place::Blank => Expr::undefined(),
            Place::Direct(e) | Place::Object(e) => e.clone(),
            Place::Slice(s, i) => Expr::helper("$index", vec![s.clone(), i.clone()]),
            Place::Array(a, i) => Expr::helper("$indexArray", vec![a.clone(), i.clone()]),
            Place::Map(m, k, zero) => Expr::helper("$mapGet", vec![m.clone(), k.clone(), zero.clone()]),
            Place::Pointer(p) => Expr::helper("$deref", vec![p.clone()]),
        }
    }

    /// Store `value` into `place`. Structs and arrays outside maps are
    /// updated in place so pointers to them stay valid.
    fn write(&self, place: Place, value: Expr, ty: &Type) -> Stmt {
        let in_place = self.is_value_aggregate(ty);
        let assign_object = |target: Expr| Stmt::expr(Expr::helper("$assignStruct", vec![target, value.clone()]));
        match place {
            Place::Blank => Stmt::expr(value),
            Place::Object(p) => assign_object(p),
            Place::Direct(e) if in_place => assign_object(e),
            Place::Direct(e) => Stmt::assign(e, value),
            Place::Slice(s, i) if in_place => assign_object(Expr::helper("$index", vec![s, i])),
            Place::Slice(s, i) => Stmt::expr(Expr::helper("$setIndex", vec![s, i, value])),
            Place::Array(a, i) if in_place => assign_object(Expr::helper("$indexArray", vec![a, i])),
            Place::Array(a, i) => Stmt::expr(Expr::helper("$setIndexArray", vec![a, i, value])),
            Place::Map(m, k, _) => Stmt::expr(Expr::helper("$mapSet", vec![m, k, value])),
            Place::Pointer(p) => Stmt::expr(Expr::helper("$store", vec![p, value])),
        }
    }

    /// `x op= y`, and `x++`/`x--` when `value` is `None`.
    fn assign_op(&mut self, target: &GoExpr, op: golower_syntax::BinaryOp, value: Option<&GoExpr>) -> Result<Vec<Stmt>> {
        let mut out = Vec::new();
        let place = self.place(target, &mut out, true)?;
        let ty = self.type_of(target);
        let current = self.read(&place);
        let operand = match value {
            Some(v) => match self.const_value(v) {
                Some(c) => self.basic_of(&ty).and_then(|k| c.clone().convert(k)).unwrap_or(c).to_js(),
                None => self.expr(v)?,
            },
            None => Expr::number(1),
        };
        let kind = self.basic_of(&ty).unwrap_or(Basic::Int);
        let result = self.arithmetic(target.pos, op, current, operand, kind)?;
        out.push(self.write(place, result, &ty));
        Ok(out)
    }

    fn assign(&mut self, s: &GoStmt, lhs: &[GoExpr], rhs: &[GoExpr]) -> Result<Vec<Stmt>> {
        let mut out = Vec::new();
        if lhs.len() == rhs.len() {
            if let ([target], [value]) = (lhs, rhs) {
                let place = self.place(target, &mut out, false)?;
                let ty = self.type_of(target);
                let lowered = match place {
                    Place::Blank => self.expr(value)?,
                    _ => self.value(value, &ty)?,
                };
                out.push(self.write(place, lowered, &ty));
                return Ok(out);
            }
            if self.plain_targets(lhs) {
                let targets = lhs.iter().map(|t| self.expr(t)).collect::<Result<Vec<_>>>()?;
                let mut values = Vec::new();
                for (t, v) in lhs.iter().zip(rhs) {
                    values.push(self.value(v, &self.type_of(t))?);
                }
                out.push(Stmt::assign(Expr::array(targets), Expr::array(values)));
                return Ok(out);
            }
            // Operands on both sides are evaluated before any assignment.
            let mut places = Vec::new();
            for target in lhs {
                places.push(self.place(target, &mut out, true)?);
            }
            let mut temps = Vec::new();
            for (target, value) in lhs.iter().zip(rhs) {
                let lowered = self.value(value, &self.type_of(target))?;
                let name = self.temp();
                out.push(Stmt::const_decl(name.clone(), lowered));
                temps.push(name);
            }
            for ((place, target), name) in places.into_iter().zip(lhs).zip(temps) {
                out.push(self.write(place, Expr::ident(name), &self.type_of(target)));
            }
            return Ok(out);
        }
        let [value] = rhs else {
            return Err(self.error(s.pos, "assignment count mismatch"));
        };
        let tuple = self.tuple(value)?;
        let types = self.tuple_types(value);
        let converts = lhs.iter().zip(&types).any(|(t, from)| {
            let to = self.type_of(t);
            self.is_interface(&to) && !self.is_interface(from)
        });
        if self.plain_targets(lhs) && !converts {
            let targets = lhs.iter().map(|t| self.expr(t)).collect::<Result<Vec<_>>>()?;
            out.push(Stmt::assign(Expr::array(targets), tuple));
            return Ok(out);
        }
        let name = self.temp();
        out.push(Stmt::const_decl(name.clone(), tuple));
        for (i, target) in lhs.iter().enumerate() {
            let place = self.place(target, &mut out, false)?;
            if matches!(place, Place::Blank) {
                continue;
            }
            let ty = self.type_of(target);
            let from = types.get(i).cloned().unwrap_or(Type::Invalid);
            let item = Expr::index(Expr::ident(name.clone()), Expr::number(i as f64));
            let item = self.coerce(item, &from, &ty, true);
            out.push(self.write(place, item, &ty));
        }
        Ok(out)
    }

    /// Targets that can be assigned together by destructuring: distinct
    /// plain variables holding neither structs nor arrays.
    fn plain_targets(&self, lhs: &[GoExpr]) -> bool {
        let mut seen = std::collections::HashSet::new();
        lhs.iter().all(|t| {
            let t = t.unparen();
            match t.as_ident() {
                Some("_") | None => false,
                Some(name) => {
                    let local = matches!(self.lookup(name), Some(Binding::Var(_)));
                    let global = matches!(self.pkg.info.uses.get(&t.id), Some(Object::Var { .. }));
                    (local || global) && !self.is_value_aggregate(&self.type_of(t)) && seen.insert(name)
                }
            }
        })
    }

    // ========================================================================
    // Declarations
    // ========================================================================

    fn define(&mut self, s: &GoStmt, names: &[String], values: &[GoExpr]) -> Result<Vec<Stmt>> {
        let mut out = Vec::new();
        if names.len() == values.len() {
            // Every value is lowered before any name comes into scope.
            let mut lowered = Vec::new();
            for value in values {
                let ty = self.type_of(value).defaulted();
                lowered.push((self.value(value, &ty)?, ty));
            }
            let redeclares = names.iter().any(|n| n != "_" && self.in_current_scope(n));
            if redeclares && names.len() > 1 {
                let mut temps = Vec::new();
                for (value, ty) in lowered {
                    let name = self.temp();
                    out.push(Stmt::const_decl(name.clone(), value));
                    temps.push((Expr::ident(name), ty));
                }
                lowered = temps;
            }
            for (name, (value, ty)) in names.iter().zip(lowered) {
                out.push(self.bind(name, value, &ty));
            }
            return Ok(out);
        }
        let [value] = values else {
            return Err(self.error(s.pos, "assignment count mismatch"));
        };
        let tuple = self.tuple(value)?;
        let types = self.tuple_types(value);
        let all_new = names.iter().all(|n| n != "_" && !self.in_current_scope(n));
        if all_new {
            let js_names = names.iter().map(|n| self.declare_var(n)).collect();
            out.push(Stmt::Destructure {
                kind: VarKind::Let,
                names: js_names,
                init: tuple,
            });
            return Ok(out);
        }
        let name = self.temp();
        out.push(Stmt::const_decl(name.clone(), tuple));
        for (i, target) in names.iter().enumerate() {
            if target == "_" {
                continue;
            }
            let item = Expr::index(Expr::ident(name.clone()), Expr::number(i as f64));
            let ty = types.get(i).cloned().unwrap_or(Type::Invalid);
            out.push(self.bind(target, item, &ty));
        }
        Ok(out)
    }

    /// Bind `name` to `value` in a `:=`: a new variable, or an assignment
    /// when the name already exists in the current block.
    fn bind(&mut self, name: &str, value: Expr, ty: &Type) -> Stmt {
        if name == "_" {
            return Stmt::expr(value);
        }
        if let Some(Binding::Var(js_name)) = self.scopes.last().and_then(|s| s.get(name)) {
            let target = Expr::ident(js_name.clone());
            return self.write(Place::Direct(target), value, ty);
        }
        let js_name = self.declare_var(name);
        Stmt::let_decl(js_name, Some(value))
    }

    fn local_decl(&mut self, decl: &Decl) -> Result<Vec<Stmt>> {
        match decl {
            Decl::Var(spec) => self.local_var(spec),
            Decl::Const(spec) => {
                let mut out = Vec::new();
                for (i, name) in spec.names.iter().enumerate() {
                    if name == "_" {
                        continue;
                    }
                    match self.const_spec_value(spec, i) {
                        Some(value) => self.declare(name, Binding::Const(value)),
                        None => {
                            let Some(value) = spec.values.get(i) else {
                                return Err(self.error(spec.pos, format!("constant {name} without a value")));
                            };
                            self.iota = Some(i128::from(spec.iota));
                            let lowered = self.expr(value);
                            self.iota = None;
                            let js_name = self.declare_var(name);
                            out.push(Stmt::const_decl(js_name, lowered?));
                        }
                    }
                }
                Ok(out)
            }
            Decl::Type(spec) => {
                if !spec.type_params.is_empty() {
                    return Err(self.error(spec.pos, format!("generic type {}", spec.name)));
                }
                let ty = self.resolve(&spec.ty);
                self.declare(&spec.name, Binding::Type(ty));
                Ok(Vec::new())
            }
            Decl::Func(f) => Err(self.error(f.pos, "nested function declaration")),
        }
    }

    fn local_var(&mut self, spec: &ValueSpec) -> Result<Vec<Stmt>> {
        let declared = spec.ty.as_ref().map(|t| self.resolve(t));
        let mut out = Vec::new();
        if spec.values.is_empty() {
            let ty = declared.unwrap_or(Type::Invalid);
            for name in &spec.names {
                let zero = self.zero(&ty);
                out.push(self.bind_new(name, zero));
            }
            return Ok(out);
        }
        if spec.values.len() == spec.names.len() {
            let mut lowered = Vec::new();
            for value in &spec.values {
                let ty = declared.clone().unwrap_or_else(|| self.type_of(value).defaulted());
                lowered.push(self.value(value, &ty)?);
            }
            for (name, value) in spec.names.iter().zip(lowered) {
                out.push(self.bind_new(name, value));
            }
            return Ok(out);
        }
        let [value] = spec.values.as_slice() else {
            return Err(self.error(spec.pos, "assignment count mismatch"));
        };
        let tuple = self.tuple(value)?;
        let types = self.tuple_types(value);
        let name = self.temp();
        out.push(Stmt::const_decl(name.clone(), tuple));
        for (i, target) in spec.names.iter().enumerate() {
            let item = Expr::index(Expr::ident(name.clone()), Expr::number(i as f64));
            let from = types.get(i).cloned().unwrap_or(Type::Invalid);
            let item = match &declared {
                Some(to) => self.coerce(item, &from, to, true),
                None => item,
            };
            out.push(self.bind_new(target, item));
        }
        Ok(out)
    }

    fn bind_new(&mut self, name: &str, value: Expr) -> Stmt {
        if name == "_" {
            return Stmt::expr(value);
        }
        let js_name = self.declare_var(name);
        Stmt::let_decl(js_name, Some(value))
    }

    // ========================================================================
    // Return
    // ========================================================================

    fn return_stmt(&mut self, s: &GoStmt, values: &[GoExpr]) -> Result<Vec<Stmt>> {
        let Some(state) = self.funcs.last() else {
            return Err(self.error(s.pos, "return outside a function"));
        };
        let results = state.results.clone();
        let frame = state.frame;
        let has_vars = state.result_vars.is_some();

        if values.is_empty() {
            if frame || !has_vars || results.is_empty() {
                return Ok(vec![Stmt::return_stmt(None)]);
            }
            return Ok(vec![Stmt::return_stmt(Some(self.result_vars_expr()))]);
        }

        let value = if values.len() == results.len() {
            let mut lowered = Vec::new();
            for (v, ty) in values.iter().zip(&results) {
                lowered.push(self.value(v, ty)?);
            }
            if lowered.len() == 1 {
                lowered.remove(0)
            } else {
                Expr::array(lowered)
            }
        } else if let [single] = values {
            let types = self.tuple_types(single);
            let tuple = self.expr(single)?;
            let converts = types.iter().zip(&results).any(|(from, to)| {
                self.is_interface(to) && !self.is_interface(from)
            });
            if converts {
                let items = types
                    .iter()
                    .zip(&results)
                    .enumerate()
                    .map(|(i, (from, to))| {
                        self.coerce(Expr::index(Expr::ident("$v"), Expr::number(i as f64)), from, to, true)
                    })
                    .collect();
                let convert = Function::arrow(vec!["$v".into()], vec![Stmt::return_stmt(Some(Expr::array(items)))]);
                Expr::call(Expr::function(convert), vec![tuple])
            } else {
                tuple
            }
        } else {
            return Err(self.error(s.pos, "wrong number of return values"));
        };

        if !frame {
            return Ok(vec![Stmt::return_stmt(Some(value))]);
        }
        // Deferred functions may still change named results, so the value
        // is returned by the `finally` block.
        let target = self.result_vars_expr();
        Ok(vec![Stmt::assign(target, value), Stmt::return_stmt(None)])
    }

    // ========================================================================
    // Control flow
    // ========================================================================

    fn if_stmt(
        &mut self,
        init: Option<&GoStmt>,
        cond: &GoExpr,
        then: &Block,
        els: Option<&GoStmt>,
    ) -> Result<Vec<Stmt>> {
        self.push_scope();
        let mut out = Vec::new();
        if let Some(init) = init {
            out.extend(self.stmt(init)?);
        }
        let test = self.expr(cond)?;
        let consequent = self.scoped_block(then)?;
        let alternate = match els {
            None => None,
            Some(s) => match &s.kind {
                StmtKind::Block(b) => Some(self.scoped_block(b)?),
                _ => Some(block_or_single(self.stmt(s)?)),
            },
        };
        self.pop_scope();
        out.push(Stmt::if_stmt(test, consequent, alternate));
        Ok(if init.is_some() { vec![Stmt::Block(out)] } else { out })
    }

    /// `for` and `range` loops, with an optional Go label.
    fn loop_stmt(&mut self, label: Option<&String>, s: &GoStmt) -> Result<Vec<Stmt>> {
        if let Some(label) = label
            && let Some(state) = self.funcs.last_mut()
        {
            state.loop_labels.insert(label.clone());
        }
        self.push_scope();
        let lowered = match &s.kind {
            StmtKind::For {
                init,
                cond,
                post,
                body,
            } => self.for_loop(init.as_deref(), cond.as_ref(), post.as_deref(), body),
            StmtKind::Range {
                key,
                value,
                define,
                expr,
                body,
            } => self.range_loop(s, key.as_ref(), value.as_ref(), *define, expr, body),
            _ => Err(self.error(s.pos, "loop")),
        };
        self.pop_scope();
        if let Some(label) = label
            && let Some(state) = self.funcs.last_mut()
        {
            state.loop_labels.remove(label);
        }
        let (mut pre, mut looped) = lowered?;
        if let Some(label) = label {
            looped = Stmt::labeled(js::mangle(label), looped);
        }
        if pre.is_empty() {
            return Ok(vec![looped]);
        }
        pre.push(looped);
        Ok(vec![Stmt::Block(pre)])
    }

    fn for_loop(
        &mut self,
        init: Option<&GoStmt>,
        cond: Option<&GoExpr>,
        post: Option<&GoStmt>,
        body: &Block,
    ) -> Result<(Vec<Stmt>, Stmt)> {
        let mut pre = Vec::new();
        let mut head = None;
        if let Some(init) = init {
            let mut lowered = self.stmt(init)?;
            if lowered.len() == 1 && matches!(lowered[0], Stmt::Var { .. } | Stmt::Destructure { .. }) {
                head = lowered.pop();
            } else {
                pre = lowered;
            }
        }
        let test = cond.map(|c| self.expr(c)).transpose()?;
        let update = match post {
            None => None,
            Some(post) => {
                let mut exprs = Vec::new();
                for lowered in self.stmt(post)? {
                    match lowered {
                        Stmt::Expr(e) => exprs.push(e),
                        _ => return Err(self.error(post.pos, "this loop post statement")),
                    }
                }
                match exprs.len() {
                    0 => None,
                    1 => exprs.pop(),
                    _ => Some(Expr::Sequence(exprs)),
                }
            }
        };
        let body = self.scoped_block(body)?;
        Ok((pre, Stmt::for_loop(head, test, update, body)))
    }

    fn range_loop(
        &mut self,
        s: &GoStmt,
        key: Option<&GoExpr>,
        value: Option<&GoExpr>,
        define: bool,
        x: &GoExpr,
        body: &Block,
    ) -> Result<(Vec<Stmt>, Stmt)> {
        let xt = self.type_of(x);
        let under = match self.under(&xt) {
            Type::Pointer(inner) if matches!(self.under(&inner), Type::Array(..)) => self.under(&inner),
            other => other,
        };
        let mut pre = Vec::new();
        let subject = self.expr(x)?;
        let subject = self.hoist_value(subject, &mut pre);
        let int = Type::Basic(Basic::Int);

        let looped = match under {
            Type::Basic(kind) if kind.is_integer() || kind == Basic::UntypedInt => {
                let i = self.temp();
                let mut inner = Vec::new();
                self.range_bind(key, define, Expr::ident(i.clone()), &xt.clone().defaulted(), &mut inner)?;
                inner.extend(self.block_stmts(body)?);
                counted_loop(&i, subject, Stmt::Block(inner))
            }
            Type::Basic(kind) if kind.is_string() => {
                let (i, r) = (self.temp(), self.temp());
                let mut inner = Vec::new();
                self.range_bind(key, define, Expr::ident(i.clone()), &int, &mut inner)?;
                self.range_bind(value, define, Expr::ident(r.clone()), &Type::Basic(Basic::Int32), &mut inner)?;
                inner.extend(self.block_stmts(body)?);
                Stmt::ForOf {
                    bindings: vec![i, r],
                    iterable: Expr::helper("$stringRange", vec![subject]),
                    body: Box::new(Stmt::Block(inner)),
                }
            }
            Type::Slice(elem) | Type::Array(_, elem) => {
                let array = matches!(self.under(&xt), Type::Array(..) | Type::Pointer(_));
                let n = self.temp();
                let len = if array {
                    Expr::member(subject.clone(), "length")
                } else {
                    Expr::helper("$len", vec![subject.clone()])
                };
                pre.push(Stmt::const_decl(n.clone(), len));
                let i = self.temp();
                let mut inner = Vec::new();
                self.range_bind(key, define, Expr::ident(i.clone()), &int, &mut inner)?;
                if value.is_some() {
                    let item = if array {
                        Expr::index(subject.clone(), Expr::ident(i.clone()))
                    } else {
                        Expr::index(
                            Expr::member(subject.clone(), "$array"),
                            Expr::binary(Expr::member(subject.clone(), "$offset"), JsOp::Add, Expr::ident(i.clone())),
                        )
                    };
                    let item = self.coerce(item, &elem, &elem, false);
                    self.range_bind(value, define, item, &elem, &mut inner)?;
                }
                inner.extend(self.block_stmts(body)?);
                counted_loop(&i, Expr::ident(n), Stmt::Block(inner))
            }
            Type::Map(key_ty, value_ty) => {
                let (k, v) = (self.temp(), self.temp());
                let mut inner = Vec::new();
                self.range_bind(key, define, Expr::ident(k.clone()), &key_ty, &mut inner)?;
                let item = self.coerce(Expr::ident(v.clone()), &value_ty, &value_ty, false);
                self.range_bind(value, define, item, &value_ty, &mut inner)?;
                inner.extend(self.block_stmts(body)?);
                Stmt::ForOf {
                    bindings: vec![k, v],
                    iterable: Expr::helper("$mapEntries", vec![subject]),
                    body: Box::new(Stmt::Block(inner)),
                }
            }
            Type::Chan(_, elem) => {
                let (v, ok) = (self.temp(), self.temp());
                let mut inner = vec![
                    Stmt::Destructure {
                        kind: VarKind::Const,
                        names: vec![v.clone(), ok.clone()],
                        init: Expr::yield_star(Expr::helper("$recv", vec![subject])),
                    },
                    Stmt::if_stmt(Expr::unary(JsUnary::Not, Expr::ident(ok)), Stmt::Break(None), None),
                ];
                self.range_bind(key, define, Expr::ident(v), &elem, &mut inner)?;
                inner.extend(self.block_stmts(body)?);
                Stmt::for_loop(None, None, None, Stmt::Block(inner))
            }
            Type::Func(_) => return Err(self.error(s.pos, "range over a function")),
            _ => return Err(self.error(s.pos, "range over a value of unknown type")),
        };
        Ok((pre, looped))
    }

    /// Bind a range key or value: a new variable with `:=`, otherwise an
    /// assignment to an existing location.
    fn range_bind(
        &mut self,
        target: Option<&GoExpr>,
        define: bool,
        value: Expr,
        ty: &Type,
        out: &mut Vec<Stmt>,
    ) -> Result<()> {
        let Some(target) = target else {
            return Ok(());
        };
        if target.as_ident() == Some("_") {
            return Ok(());
        }
        if define {
            let Some(name) = target.as_ident() else {
                return Err(self.error(target.pos, "range variable that is not an identifier"));
            };
            let js_name = self.declare_var(name);
            out.push(Stmt::let_decl(js_name, Some(value)));
            return Ok(());
        }
        let place = self.place(target, out, false)?;
        out.push(self.write(place, value, ty));
        Ok(())
    }

    /// Evaluate a loop subject once.
    fn hoist_value(&mut self, value: Expr, pre: &mut Vec<Stmt>) -> Expr {
        if value.is_simple() {
            return value;
        }
        let name = self.temp();
        pre.push(Stmt::const_decl(name.clone(), value));
        Expr::ident(name)
    }

    // ========================================================================
    // Switch statements
    // ========================================================================

    fn switch_stmt(
        &mut self,
        label: Option<&str>,
        init: Option<&GoStmt>,
        tag: Option<&GoExpr>,
        cases: &[CaseClause],
    ) -> Result<Vec<Stmt>> {
        self.push_scope();
        let mut out = Vec::new();
        if let Some(init) = init {
            out.extend(self.stmt(init)?);
        }
        let tag = match tag {
            Some(t) => {
                let ty = self.type_of(t).defaulted();
                let value = self.value(t, &ty)?;
                let name = self.temp();
                out.push(Stmt::const_decl(name.clone(), value));
                Some((Expr::ident(name), ty))
            }
            None => None,
        };
        let mut js_cases = Vec::new();
        for case in cases {
            let mut tests = Vec::new();
            if case.default {
                tests.push(None);
            }
            for e in &case.exprs {
                tests.push(Some(match &tag {
                    Some((value, ty)) => self.case_test(value.clone(), ty, e)?,
                    None => self.expr(e)?,
                }));
            }
            let falls = matches!(case.body.last(), Some(s) if matches!(s.kind, StmtKind::Fallthrough));
            let mut body = vec![self.scoped_block(&case.body)?];
            if !falls {
                body.push(Stmt::Break(None));
            }
            push_cases(&mut js_cases, tests, body);
        }
        self.pop_scope();
        let switch = Stmt::Switch {
            discriminant: Expr::bool(true),
            cases: js_cases,
        };
        out.push(match label {
            Some(label) => Stmt::labeled(label, switch),
            None => switch,
        });
        Ok(if out.len() > 1 { vec![Stmt::Block(out)] } else { out })
    }

    /// `tag == e` for an expression switch.
    fn case_test(&mut self, tag: Expr, tag_ty: &Type, e: &GoExpr) -> Result<Expr> {
        if matches!(self.pkg.info.uses.get(&e.unparen().id), Some(Object::Nil)) {
            return Ok(Expr::binary(tag, JsOp::Eq, Expr::null()));
        }
        let value = self.value(e, tag_ty)?;
        Ok(self.equals(tag, value, tag_ty))
    }

    fn type_switch(
        &mut self,
        label: Option<&str>,
        init: Option<&GoStmt>,
        bind: Option<&str>,
        subject: &GoExpr,
        cases: &[TypeCaseClause],
    ) -> Result<Vec<Stmt>> {
        self.push_scope();
        let mut out = Vec::new();
        if let Some(init) = init {
            out.extend(self.stmt(init)?);
        }
        let value = self.expr(subject)?;
        let x = self.temp();
        out.push(Stmt::const_decl(x.clone(), value));
        let xv = || Expr::ident(x.clone());

        let mut js_cases = Vec::new();
        for case in cases {
            let types: Vec<Option<Type>> = case
                .types
                .iter()
                .map(|t| t.as_ref().map(|t| self.resolve(t)))
                .collect();
            let mut test: Option<Expr> = None;
            for ty in &types {
                let check = match ty {
                    None => Expr::binary(xv(), JsOp::Eq, Expr::null()),
                    Some(ty) => Expr::helper("$is", vec![xv(), self.type_desc(ty)]),
                };
                test = Some(match test {
                    None => check,
                    Some(prev) => Expr::binary(prev, JsOp::Or, check),
                });
            }
            self.push_scope();
            let mut inner = Vec::new();
            if let Some(name) = bind
                && name != "_"
            {
                let bound = match types.as_slice() {
                    [Some(ty)] if !self.is_interface(ty) => Expr::helper(
                        "$assertType",
                        vec![xv(), self.type_desc(ty), Expr::bool(false)],
                    ),
                    _ => xv(),
                };
                let js_name = self.declare_var(name);
                inner.push(Stmt::let_decl(js_name, Some(bound)));
            }
            inner.extend(self.block_stmts(&case.body)?);
            self.pop_scope();
            let tests = if case.default { vec![None] } else { vec![test] };
            push_cases(&mut js_cases, tests, vec![Stmt::Block(inner), Stmt::Break(None)]);
        }
        self.pop_scope();
        let switch = Stmt::Switch {
            discriminant: Expr::bool(true),
            cases: js_cases,
        };
        out.push(match label {
            Some(label) => Stmt::labeled(label, switch),
            None => switch,
        });
        Ok(vec![Stmt::Block(out)])
    }

    // ========================================================================
    // Select
    // ========================================================================

    fn select_stmt(&mut self, label: Option<&str>, clauses: &[CommClause]) -> Result<Vec<Stmt>> {
        if clauses.is_empty() {
            return Ok(vec![Stmt::expr(Expr::yield_star(Expr::helper(
                "$select",
                vec![Expr::array(Vec::new())],
            )))]);
        }
        let mut out = Vec::new();
        let mut cases = Vec::new();
        for clause in clauses {
            match &clause.comm {
                Some(CommOp::Send { chan, value }) => {
                    let elem = match self.under(&self.type_of(chan)) {
                        Type::Chan(_, elem) => *elem,
                        _ => Type::Invalid,
                    };
                    let ch = self.expr(chan)?;
                    let v = self.value(value, &elem)?;
                    cases.push(Expr::array(vec![ch, v]));
                }
                Some(CommOp::Recv { chan, .. }) => cases.push(Expr::array(vec![self.expr(chan)?])),
                None => {}
            }
        }
        let has_default = clauses.iter().any(|c| c.comm.is_none());
        let (idx, val) = (self.temp(), self.temp());
        let chosen = if has_default {
            Expr::helper("$selectNow", vec![Expr::array(cases)])
        } else {
            Expr::yield_star(Expr::helper("$select", vec![Expr::array(cases)]))
        };
        out.push(Stmt::Destructure {
            kind: VarKind::Const,
            names: vec![idx.clone(), val.clone()],
            init: chosen,
        });

        let mut js_cases = Vec::new();
        let mut index = 0;
        for clause in clauses {
            self.push_scope();
            let mut inner = Vec::new();
            let test = match &clause.comm {
                None => Expr::unary(JsUnary::Neg, Expr::number(1)),
                Some(comm) => {
                    if let CommOp::Recv { lhs, define, chan } = comm {
                        let elem = match self.under(&self.type_of(chan)) {
                            Type::Chan(_, elem) => *elem,
                            _ => Type::Invalid,
                        };
                        let received = |i: usize| Expr::index(Expr::ident(val.clone()), Expr::number(i as f64));
                        let kinds = [elem, Type::Basic(Basic::Bool)];
                        for (i, target) in lhs.iter().enumerate().take(2) {
                            self.range_bind(Some(target), *define, received(i), &kinds[i], &mut inner)?;
                        }
                    }
                    let test = Expr::number(index as f64);
                    index += 1;
                    test
                }
            };
            inner.extend(self.block_stmts(&clause.body)?);
            self.pop_scope();
            js_cases.push(SwitchCase {
                test: Some(test),
                body: vec![Stmt::Block(inner), Stmt::Break(None)],
            });
        }
        let switch = Stmt::Switch {
            discriminant: Expr::ident(idx),
            cases: js_cases,
        };
        out.push(match label {
            Some(label) => Stmt::labeled(label, switch),
            None => switch,
        });
        Ok(vec![Stmt::Block(out)])
    }

    // ========================================================================
    // go and defer
    // ========================================================================

    /// The function and argument list of a `go` or `defer` call, evaluated
    /// at the statement.
    fn deferred_call(&mut self, call: &GoExpr) -> Result<(Vec<Stmt>, Expr, Vec<Expr>)> {
        let ExprKind::Call { func, args, ellipsis } = &call.unparen().kind else {
            return Err(self.error(call.pos, "go or defer of something that is not a call"));
        };
        let f = func.unparen();
        match self.pkg.info.uses.get(&f.id) {
            // A deferred recover is not called by a deferred function.
            Some(Object::Builtin(Builtin::Recover)) => {
                return Ok((Vec::new(), Expr::thunk(Expr::null()), Vec::new()));
            }
            Some(Object::Builtin(_)) => {
                return match self.expr(call)? {
                    Expr::Call { callee, args } if matches!(*callee, Expr::Ident(_)) => {
                        // Arguments are pinned now; the wrapper drops the
                        // unwind token a defer frame appends.
                        let forward = Function::arrow(
                            vec!["$a".into()],
                            vec![Stmt::return_stmt(Some(Expr::call(
                                *callee,
                                vec![Expr::spread(Expr::ident("$a"))],
                            )))],
                        );
                        Ok((Vec::new(), Expr::function(forward), vec![Expr::array(args)]))
                    }
                    other => Ok((Vec::new(), Expr::thunk(other), Vec::new())),
                };
            }
            Some(Object::TypeName(_)) => return Err(self.error(call.pos, "go or defer of a conversion")),
            _ => {}
        }
        let sig = match self.under(&self.type_of(f)) {
            Type::Func(sig) => sig,
            _ => FuncType::default(),
        };
        let target = match (&f.kind, self.pkg.info.selections.get(&f.id).cloned()) {
            (
                ExprKind::Selector { x, sel },
                Some(Selection::Method {
                    path,
                    recv,
                    pointer_recv,
                }),
            ) => {
                let receiver = self.method_receiver(x, &path, recv.as_ref(), pointer_recv)?;
                Expr::helper("$methodVal", vec![receiver, Expr::string(js::mangle_property(sel))])
            }
            _ => self.expr(f)?,
        };
        let args = self.call_args(&sig, args, *ellipsis)?;
        Ok((Vec::new(), target, args))
    }
}

/// `for (let i = 0; i < n; i = i + 1) body`.
fn counted_loop(i: &str, n: Expr, body: Stmt) -> Stmt {
    Stmt::for_loop(
        Some(Stmt::let_decl(i, Some(Expr::number(0)))),
        Some(Expr::binary(Expr::ident(i), JsOp::Lt, n)),
        Some(Expr::assign(
            Expr::ident(i),
            Expr::binary(Expr::ident(i), JsOp::Add, Expr::number(1)),
        )),
        body,
    )
}

/// One JS case label per test; all but the last fall through to the
/// shared body.
fn push_cases(cases: &mut Vec<SwitchCase>, tests: Vec<Option<Expr>>, body: Vec<Stmt>) {
    let n = tests.len();
    let mut body = Some(body);
    for (i, test) in tests.into_iter().enumerate() {
        let stmts = if i + 1 == n { body.take().unwrap_or_default() } else { Vec::new() };
        cases.push(SwitchCase { test, body: stmts });
    }
}
