//! Which functions may suspend.
//!
//! A blocking function is emitted as a generator and every call to it is a
//! `yield*` delegation, so the analysis must be closed under calls: a
//! function that calls a blocking function is blocking too. Units are
//! top-level functions and methods (by declaration key) and function
//! literals (by expression id); the result is a fixed point over the call
//! edges between them.

use std::collections::{BTreeSet, HashSet};

use golower_syntax::visit::{self, Visitor};
use golower_syntax::{
    Block, Decl, Directive, Expr, ExprId, ExprKind, File, Stmt, StmtKind, UnaryOp,
};
use golower_types::{Member, Object, Selection, Type, TypedPackage};
use tracing::debug;

/// Who a call expression invokes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Callee {
    /// A function or method of the package being compiled, by key.
    Func(String),
    /// A function or method of another package, by key.
    Dep { path: String, key: String },
    /// An interface method, by name.
    Iface(String),
    /// A function literal called where it is written.
    Lit(ExprId),
    /// Any other function value.
    Value,
    /// A builtin or a conversion.
    Static,
}

/// Classify the callee of a call expression.
pub fn classify(pkg: &TypedPackage, func: &Expr) -> Callee {
    let func = func.unparen();
    let info = &pkg.info;
    match info.uses.get(&func.id) {
        Some(Object::TypeName(_) | Object::Builtin(_)) => return Callee::Static,
        Some(Object::Func) => {
            if let Some(name) = func.as_ident() {
                return Callee::Func(name.to_string());
            }
        }
        _ => {}
    }
    match &func.kind {
        ExprKind::FuncLit { .. } => Callee::Lit(func.id),
        ExprKind::Type(_) => Callee::Static,
        ExprKind::Selector { sel, .. } => match info.selections.get(&func.id) {
            Some(Selection::Qualified {
                member: Member::Func(_),
                path,
            }) => Callee::Dep {
                path: path.clone(),
                key: sel.clone(),
            },
            Some(Selection::Qualified {
                member: Member::Type(_),
                ..
            }) => Callee::Static,
            Some(Selection::Method {
                recv: Some((recv_pkg, recv_name)),
                ..
            }) => {
                let key = format!("{recv_name}.{sel}");
                if *recv_pkg == pkg.export.path {
                    Callee::Func(key)
                } else {
                    Callee::Dep {
                        path: recv_pkg.clone(),
                        key,
                    }
                }
            }
            Some(Selection::Method { recv: None, .. }) => Callee::Iface(sel.clone()),
            _ => Callee::Value,
        },
        _ => Callee::Value,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum UnitKey {
    Decl(String),
    Lit(ExprId),
    /// Package variable initialisers. Always run inside a generator.
    Init,
}

#[derive(Debug)]
struct Unit {
    key: UnitKey,
    marked: bool,
    suspends: bool,
    calls: Vec<Callee>,
    /// Functions referenced other than by calling them.
    values: Vec<Callee>,
}

/// Result of the analysis for one package.
#[derive(Debug, Clone, Default)]
pub struct Blocking {
    funcs: BTreeSet<String>,
    lits: HashSet<ExprId>,
    iface_methods: BTreeSet<String>,
    /// Whether a call through an arbitrary function value may suspend.
    dynamic: bool,
}

impl Blocking {
    pub fn analyze(pkg: &TypedPackage, files: &[File]) -> Self {
        let mut units = Vec::new();
        for file in files {
            let mut init = UnitCollector::new(pkg, UnitKey::Init, &mut units);
            for decl in &file.decls {
                match decl {
                    Decl::Var(spec) => {
                        for value in &spec.values {
                            init.visit_expr(value);
                        }
                    }
                    Decl::Func(func) => {
                        // A bodyless function is bound to a native one and
                        // blocks only when marked.
                        let mut collector = UnitCollector::new(pkg, UnitKey::Decl(func.key()), init.units);
                        collector.marked = func.directives.contains(&Directive::Blocking);
                        if let Some(body) = &func.body {
                            collector.block(body);
                        }
                        collector.finish();
                    }
                    Decl::Type(_) | Decl::Const(_) => {}
                }
            }
            init.finish();
        }

        let dep_iface: BTreeSet<String> = pkg
            .deps
            .values()
            .flat_map(|d| d.blocking.iter())
            .filter_map(|key| key.split_once('.').map(|(_, m)| m.to_string()))
            .collect();

        let mut result = Blocking {
            iface_methods: dep_iface.clone(),
            ..Blocking::default()
        };
        let mut blocking = vec![false; units.len()];
        loop {
            let mut changed = false;
            for (i, unit) in units.iter().enumerate() {
                if blocking[i] {
                    continue;
                }
                let now = unit.marked
                    || unit.suspends
                    || unit.calls.iter().any(|c| result.callee_blocks(pkg, c));
                if now {
                    blocking[i] = true;
                    changed = true;
                    match &unit.key {
                        UnitKey::Decl(key) => {
                            if let Some((_, method)) = key.split_once('.') {
                                result.iface_methods.insert(method.to_string());
                            }
                            result.funcs.insert(key.clone());
                        }
                        UnitKey::Lit(id) => {
                            result.lits.insert(*id);
                        }
                        UnitKey::Init => {}
                    }
                }
            }
            let dynamic = !result.lits.is_empty()
                || units
                    .iter()
                    .flat_map(|u| &u.values)
                    .any(|v| result.callee_blocks(pkg, v));
            if dynamic != result.dynamic {
                result.dynamic = dynamic;
                changed = true;
            }
            if !changed {
                break;
            }
        }
        debug!(
            package = %pkg.export.path,
            funcs = result.funcs.len(),
            lits = result.lits.len(),
            dynamic = result.dynamic,
            "blocking analysis"
        );
        result
    }

    pub fn is_func(&self, key: &str) -> bool {
        self.funcs.contains(key)
    }

    pub fn is_lit(&self, id: ExprId) -> bool {
        self.lits.contains(&id)
    }

    /// Keys of blocking functions and methods, for the export data.
    pub fn funcs(&self) -> &BTreeSet<String> {
        &self.funcs
    }

    pub fn callee_blocks(&self, pkg: &TypedPackage, callee: &Callee) -> bool {
        match callee {
            Callee::Func(key) => self.funcs.contains(key),
            Callee::Dep { path, key } => pkg.deps.get(path).is_some_and(|d| d.is_blocking(key)),
            Callee::Iface(name) => self.iface_methods.contains(name),
            Callee::Lit(id) => self.lits.contains(id),
            Callee::Value => self.dynamic,
            Callee::Static => false,
        }
    }

    /// Whether a call must be delegated to with `yield*`. Calls whose
    /// target is only known at run time also need `$maybe`.
    pub fn call_kind(&self, pkg: &TypedPackage, callee: &Callee) -> CallKind {
        if !self.callee_blocks(pkg, callee) {
            return CallKind::Plain;
        }
        match callee {
            Callee::Iface(_) | Callee::Value => CallKind::Maybe,
            _ => CallKind::Delegate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Plain,
    Delegate,
    Maybe,
}

struct UnitCollector<'p, 'u> {
    pkg: &'p TypedPackage,
    units: &'u mut Vec<Unit>,
    key: UnitKey,
    marked: bool,
    suspends: bool,
    calls: Vec<Callee>,
    values: Vec<Callee>,
    callees: HashSet<ExprId>,
}

impl<'p, 'u> UnitCollector<'p, 'u> {
    fn new(pkg: &'p TypedPackage, key: UnitKey, units: &'u mut Vec<Unit>) -> Self {
        Self {
            pkg,
            units,
            key,
            marked: false,
            suspends: false,
            calls: Vec::new(),
            values: Vec::new(),
            callees: HashSet::new(),
        }
    }

    fn block(&mut self, block: &Block) {
        visit::walk_block(self, block);
    }

    fn finish(self) {
        self.units.push(Unit {
            key: self.key,
            marked: self.marked,
            suspends: self.suspends,
            calls: self.calls,
            values: self.values,
        });
    }

    fn is_chan(&self, expr: &Expr) -> bool {
        let mut ty = self.pkg.info.type_of(expr.id).clone();
        for _ in 0..8 {
            match ty {
                Type::Chan(..) => return true,
                Type::Named { ref pkg, ref name } => match self.pkg.named_def(pkg, name) {
                    Some(def) => ty = def.underlying.clone(),
                    None => return false,
                },
                _ => return false,
            }
        }
        false
    }

    /// A function referenced without being called.
    fn value_ref(&mut self, expr: &Expr) {
        if self.callees.contains(&expr.id) {
            return;
        }
        let referenced = match &expr.kind {
            ExprKind::Ident(_) => matches!(self.pkg.info.uses.get(&expr.id), Some(Object::Func)),
            ExprKind::Selector { .. } => matches!(
                self.pkg.info.selections.get(&expr.id),
                Some(Selection::Method { .. })
                    | Some(Selection::Qualified {
                        member: Member::Func(_),
                        ..
                    })
            ),
            _ => false,
        };
        if referenced {
            let callee = classify(self.pkg, expr);
            self.values.push(callee);
        }
    }
}

impl Visitor for UnitCollector<'_, '_> {
    fn visit_stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Send { .. } => self.suspends = true,
            StmtKind::Select(clauses) if clauses.iter().all(|c| c.comm.is_some()) => {
                self.suspends = true;
            }
            StmtKind::Range { expr, .. } if self.is_chan(expr) => self.suspends = true,
            StmtKind::Go(call) => {
                // Starting a goroutine never suspends the caller.
                if let ExprKind::Call { func, args, .. } = &call.unparen().kind {
                    self.callees.insert(func.unparen().id);
                    self.visit_expr(func);
                    for arg in args {
                        self.visit_expr(arg);
                    }
                    return;
                }
            }
            _ => {}
        }
        visit::walk_stmt(self, stmt);
    }

    fn visit_expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::FuncLit { body, .. } => {
                let mut nested = UnitCollector::new(self.pkg, UnitKey::Lit(expr.id), self.units);
                nested.block(body);
                nested.finish();
                return;
            }
            ExprKind::Unary {
                op: UnaryOp::Recv, ..
            } => self.suspends = true,
            ExprKind::Call { func, .. } => {
                let callee = classify(self.pkg, func);
                self.callees.insert(func.unparen().id);
                self.calls.push(callee);
            }
            ExprKind::Ident(_) | ExprKind::Selector { .. } => self.value_ref(expr),
            _ => {}
        }
        visit::walk_expr(self, expr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use golower_syntax::parse_file;
    use golower_types::{LenientChecker, MapImporter, TypeOracle};

    fn analyze(src: &str) -> Blocking {
        let file = parse_file("main.go", src).unwrap();
        let files = [file];
        let pkg = LenientChecker
            .check("example.com/main", &files, &mut MapImporter::new())
            .unwrap();
        Blocking::analyze(&pkg, &files)
    }

    #[test]
    fn test_suspension_points_propagate_to_callers() {
        let b = analyze(
            "package main\n\nfunc recv(ch chan int) int { return <-ch }\n\nfunc send(ch chan int) { ch <- 1 }\n\nfunc outer(ch chan int) int { return recv(ch) + 1 }\n\nfunc pure(x int) int { return x * 2 }\n",
        );
        assert!(b.is_func("recv"));
        assert!(b.is_func("send"));
        assert!(b.is_func("outer"));
        assert!(!b.is_func("pure"));
    }

    #[test]
    fn test_go_statement_does_not_block_the_caller() {
        let b = analyze(
            "package main\n\nfunc worker(ch chan int) { ch <- 1 }\n\nfunc start(ch chan int) { go worker(ch) }\n",
        );
        assert!(b.is_func("worker"));
        assert!(!b.is_func("start"));
    }

    #[test]
    fn test_select_with_default_does_not_suspend() {
        let b = analyze(
            "package main\n\nfunc poll(ch chan int) bool {\n\tselect {\n\tcase <-ch:\n\t\treturn true\n\tdefault:\n\t\treturn false\n\t}\n}\n\nfunc wait(ch chan int) {\n\tselect {\n\tcase <-ch:\n\t}\n}\n",
        );
        assert!(!b.is_func("poll"));
        assert!(b.is_func("wait"));
    }

    #[test]
    fn test_methods_and_interface_dispatch() {
        let b = analyze(
            "package main\n\ntype Q struct{ ch chan int }\n\nfunc (q *Q) Take() int { return <-q.ch }\n\ntype Taker interface{ Take() int }\n\nfunc use(t Taker) int { return t.Take() }\n\nfunc direct(q *Q) int { return q.Take() }\n",
        );
        assert!(b.is_func("Q.Take"));
        assert!(b.is_func("use"));
        assert!(b.is_func("direct"));
    }

    #[test]
    fn test_range_over_channel_and_directive() {
        let b = analyze(
            "package main\n\nfunc drain(ch chan int) {\n\tfor range ch {\n\t}\n}\n\n//golower:blocking\nfunc shim() {}\n\nfunc sum(xs []int) int {\n\tt := 0\n\tfor _, x := range xs {\n\t\tt += x\n\t}\n\treturn t\n}\n",
        );
        assert!(b.is_func("drain"));
        assert!(b.is_func("shim"));
        assert!(!b.is_func("sum"));
    }

    #[test]
    fn test_marked_bodyless_functions_block_their_callers() {
        let b = analyze(
            "package main\n\n//golower:blocking\nfunc sleep(ms int)\n\nfunc now() int\n\nfunc nap() { sleep(now()) }\n",
        );
        assert!(b.is_func("sleep"));
        assert!(!b.is_func("now"));
        assert!(b.is_func("nap"));
    }

    #[test]
    fn test_function_values_follow_blocking_literals() {
        let quiet = analyze(
            "package main\n\nfunc apply(f func(int) int, x int) int { return f(x) }\n\nfunc main() { apply(func(x int) int { return x }, 1) }\n",
        );
        assert!(!quiet.is_func("apply"));
        let b = analyze(
            "package main\n\nfunc apply(f func()) { f() }\n\nfunc main() {\n\tch := make(chan int, 1)\n\tapply(func() { ch <- 1 })\n}\n",
        );
        assert!(b.is_func("apply"));
        assert!(b.is_func("main"));
    }

    #[test]
    fn test_deferred_calls_count() {
        let b = analyze(
            "package main\n\nfunc wait(ch chan int) { <-ch }\n\nfunc f(ch chan int) { defer wait(ch) }\n",
        );
        assert!(b.is_func("f"));
    }
}
