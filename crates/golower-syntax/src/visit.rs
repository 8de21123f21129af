//! Read-only AST traversal.
//!
//! Override the `visit_*` methods of interest and call the matching `walk_*`
//! function to keep descending.

use crate::ast::*;

pub trait Visitor {
    fn visit_decl(&mut self, decl: &Decl) {
        walk_decl(self, decl);
    }

    fn visit_stmt(&mut self, stmt: &Stmt) {
        walk_stmt(self, stmt);
    }

    fn visit_expr(&mut self, expr: &Expr) {
        walk_expr(self, expr);
    }

    fn visit_type(&mut self, ty: &TypeExpr) {
        walk_type(self, ty);
    }
}

pub fn walk_file<V: Visitor + ?Sized>(v: &mut V, file: &File) {
    for decl in &file.decls {
        v.visit_decl(decl);
    }
}

pub fn walk_decl<V: Visitor + ?Sized>(v: &mut V, decl: &Decl) {
    match decl {
        Decl::Func(f) => {
            walk_signature(v, &f.sig);
            if let Some(body) = &f.body {
                walk_block(v, body);
            }
        }
        Decl::Type(t) => v.visit_type(&t.ty),
        Decl::Var(spec) | Decl::Const(spec) => {
            if let Some(ty) = &spec.ty {
                v.visit_type(ty);
            }
            for value in &spec.values {
                v.visit_expr(value);
            }
        }
    }
}

pub fn walk_signature<V: Visitor + ?Sized>(v: &mut V, sig: &Signature) {
    for field in sig.params.iter().chain(&sig.results) {
        v.visit_type(&field.ty);
    }
}

pub fn walk_block<V: Visitor + ?Sized>(v: &mut V, block: &Block) {
    for stmt in block {
        v.visit_stmt(stmt);
    }
}

fn walk_opt_stmt<V: Visitor + ?Sized>(v: &mut V, stmt: &Option<Box<Stmt>>) {
    if let Some(stmt) = stmt {
        v.visit_stmt(stmt);
    }
}

pub fn walk_stmt<V: Visitor + ?Sized>(v: &mut V, stmt: &Stmt) {
    match &stmt.kind {
        StmtKind::Expr(e) | StmtKind::Go(e) | StmtKind::Defer(e) => v.visit_expr(e),
        StmtKind::Send { chan, value } => {
            v.visit_expr(chan);
            v.visit_expr(value);
        }
        StmtKind::IncDec { target, .. } => v.visit_expr(target),
        StmtKind::Assign { lhs, rhs, .. } => {
            for e in lhs.iter().chain(rhs) {
                v.visit_expr(e);
            }
        }
        StmtKind::Define { values, .. } | StmtKind::Return(values) => {
            for e in values {
                v.visit_expr(e);
            }
        }
        StmtKind::Decl(decl) => v.visit_decl(decl),
        StmtKind::If {
            init,
            cond,
            then,
            els,
        } => {
            walk_opt_stmt(v, init);
            v.visit_expr(cond);
            walk_block(v, then);
            walk_opt_stmt(v, els);
        }
        StmtKind::For {
            init,
            cond,
            post,
            body,
        } => {
            walk_opt_stmt(v, init);
            if let Some(cond) = cond {
                v.visit_expr(cond);
            }
            walk_opt_stmt(v, post);
            walk_block(v, body);
        }
        StmtKind::Range {
            key,
            value,
            expr,
            body,
            ..
        } => {
            for e in key.iter().chain(value) {
                v.visit_expr(e);
            }
            v.visit_expr(expr);
            walk_block(v, body);
        }
        StmtKind::Switch { init, tag, cases } => {
            walk_opt_stmt(v, init);
            if let Some(tag) = tag {
                v.visit_expr(tag);
            }
            for case in cases {
                for e in &case.exprs {
                    v.visit_expr(e);
                }
                walk_block(v, &case.body);
            }
        }
        StmtKind::TypeSwitch {
            init,
            subject,
            cases,
            ..
        } => {
            walk_opt_stmt(v, init);
            v.visit_expr(subject);
            for case in cases {
                for ty in case.types.iter().flatten() {
                    v.visit_type(ty);
                }
                walk_block(v, &case.body);
            }
        }
        StmtKind::Select(clauses) => {
            for clause in clauses {
                match &clause.comm {
                    Some(CommOp::Send { chan, value }) => {
                        v.visit_expr(chan);
                        v.visit_expr(value);
                    }
                    Some(CommOp::Recv { lhs, chan, .. }) => {
                        for e in lhs {
                            v.visit_expr(e);
                        }
                        v.visit_expr(chan);
                    }
                    None => {}
                }
                walk_block(v, &clause.body);
            }
        }
        StmtKind::Block(block) => walk_block(v, block),
        StmtKind::Labeled { stmt, .. } => v.visit_stmt(stmt),
        StmtKind::Break(_)
        | StmtKind::Continue(_)
        | StmtKind::Fallthrough
        | StmtKind::Goto(_)
        | StmtKind::Empty => {}
    }
}

pub fn walk_expr<V: Visitor + ?Sized>(v: &mut V, expr: &Expr) {
    match &expr.kind {
        ExprKind::Ident(_) | ExprKind::BasicLit(_) => {}
        ExprKind::Composite { ty, elems } => {
            if let Some(ty) = ty {
                v.visit_type(ty);
            }
            for elem in elems {
                if let Some(key) = &elem.key {
                    v.visit_expr(key);
                }
                v.visit_expr(&elem.value);
            }
        }
        ExprKind::FuncLit { sig, body } => {
            walk_signature(v, sig);
            walk_block(v, body);
        }
        ExprKind::Paren(x) | ExprKind::Selector { x, .. } | ExprKind::Unary { x, .. } => {
            v.visit_expr(x)
        }
        ExprKind::Index { x, index } => {
            v.visit_expr(x);
            for i in index {
                v.visit_expr(i);
            }
        }
        ExprKind::Slice { x, lo, hi, max } => {
            v.visit_expr(x);
            for e in [lo, hi, max].into_iter().flatten() {
                v.visit_expr(e);
            }
        }
        ExprKind::TypeAssert { x, ty } => {
            v.visit_expr(x);
            if let Some(ty) = ty {
                v.visit_type(ty);
            }
        }
        ExprKind::Call { func, args, .. } => {
            v.visit_expr(func);
            for a in args {
                v.visit_expr(a);
            }
        }
        ExprKind::Binary { x, y, .. } => {
            v.visit_expr(x);
            v.visit_expr(y);
        }
        ExprKind::Type(ty) => v.visit_type(ty),
    }
}

pub fn walk_type<V: Visitor + ?Sized>(v: &mut V, ty: &TypeExpr) {
    match ty {
        TypeExpr::Name { args, .. } => {
            for a in args {
                v.visit_type(a);
            }
        }
        TypeExpr::Pointer(elem) | TypeExpr::Slice(elem) => v.visit_type(elem),
        TypeExpr::Array { len, elem } => {
            if let Some(len) = len {
                v.visit_expr(len);
            }
            v.visit_type(elem);
        }
        TypeExpr::Map { key, value } => {
            v.visit_type(key);
            v.visit_type(value);
        }
        TypeExpr::Chan { elem, .. } => v.visit_type(elem),
        TypeExpr::Func(sig) => walk_signature(v, sig),
        TypeExpr::Struct(fields) => {
            for f in fields {
                v.visit_type(&f.ty);
            }
        }
        TypeExpr::Interface(elems) => {
            for elem in elems {
                match elem {
                    InterfaceElem::Method { sig, .. } => walk_signature(v, sig),
                    InterfaceElem::Embed(ty) => v.visit_type(ty),
                }
            }
        }
    }
}

/// Package qualifiers referenced from `decls` (`fmt` in `fmt.Println` or
/// `io.Reader`). Local shadowing is not tracked, so this over-approximates.
pub fn referenced_qualifiers<'d>(decls: impl IntoIterator<Item = &'d Decl>) -> std::collections::BTreeSet<String> {
    struct Collect(std::collections::BTreeSet<String>);

    impl Visitor for Collect {
        fn visit_expr(&mut self, expr: &Expr) {
            if let ExprKind::Selector { x, .. } = &expr.kind
                && let ExprKind::Ident(name) = &x.kind
            {
                self.0.insert(name.clone());
            }
            walk_expr(self, expr);
        }

        fn visit_type(&mut self, ty: &TypeExpr) {
            if let TypeExpr::Name { pkg: Some(pkg), .. } = ty {
                self.0.insert(pkg.clone());
            }
            walk_type(self, ty);
        }
    }

    let mut c = Collect(Default::default());
    for decl in decls {
        c.visit_decl(decl);
    }
    c.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_file;

    #[test]
    fn test_referenced_qualifiers() {
        let src = "package p\n\nimport (\n\t\"fmt\"\n\t\"io\"\n\t\"os\"\n)\n\nvar w io.Writer\n\nfunc F() { fmt.Println(1) }\n";
        let file = parse_file("p.go", src).unwrap();
        let used = referenced_qualifiers(&file.decls);
        assert!(used.contains("fmt"));
        assert!(used.contains("io"));
        assert!(!used.contains("os"));
    }
}
