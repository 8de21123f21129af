//! A lenient type checker.
//!
//! Declares the package scope, resolves type expressions and infers the type
//! of every expression it can. Whatever it cannot determine degrades to
//! [`Type::Invalid`] silently; diagnostics are reserved for undefined names,
//! duplicate declarations, unresolvable imports and values that do not
//! implement the interface they are used as.

use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use golower_syntax::{
    Block, CommOp, Decl, Expr, ExprKind, File, FuncDecl, Lit, Pos, Signature, Stmt, StmtKind,
    TypeExpr, UnaryOp, ValueSpec,
};
use tracing::debug;

use crate::error::{TypeError, TypeErrors};
use crate::oracle::{Importer, TypeOracle};
use crate::package::{Builtin, ExportData, Member, Object, Selection, TypeInfo, TypedPackage};
use crate::resolve::{TypeEnv, eval_int, resolve_signature, resolve_type};
use crate::types::{Basic, FuncType, Method, MethodDef, NamedDef, Type};
use crate::universe;

/// Promoted fields and methods are searched this many embedding levels deep.
const MAX_EMBEDDING_DEPTH: usize = 4;

#[derive(Debug, Clone, Copy, Default)]
pub struct LenientChecker;

impl TypeOracle for LenientChecker {
    fn check(
        &self,
        path: &str,
        files: &[File],
        importer: &mut dyn Importer,
    ) -> Result<TypedPackage, TypeErrors> {
        let mut checker = Checker::new(path, files, importer);
        checker.check_package();
        checker.finish()
    }
}

#[derive(Debug, Clone)]
struct Entity {
    obj: Object,
    ty: Type,
}

impl Entity {
    fn new(obj: Object, ty: Type) -> Self {
        Self { obj, ty }
    }
}

struct Checker<'a> {
    files: &'a [File],
    importer: &'a mut dyn Importer,
    export: ExportData,
    info: TypeInfo,
    deps: BTreeMap<String, Rc<ExportData>>,
    errors: Vec<TypeError>,
    /// Suppresses diagnostics during the first pass over package variables.
    quiet: bool,
    package: HashMap<String, Entity>,
    sites: HashMap<String, (String, Pos)>,
    /// Import bindings per file, local name to path.
    imports: Vec<HashMap<String, String>>,
    current: usize,
    scopes: Vec<HashMap<String, Entity>>,
    results: Vec<Vec<Type>>,
    consts: HashMap<String, i64>,
    tparams: Vec<String>,
}

impl<'a> Checker<'a> {
    fn new(path: &str, files: &'a [File], importer: &'a mut dyn Importer) -> Self {
        let name = files.first().map(|f| f.package.clone()).unwrap_or_default();
        Self {
            files,
            importer,
            export: ExportData::new(path, name),
            info: TypeInfo::default(),
            deps: BTreeMap::new(),
            errors: Vec::new(),
            quiet: false,
            package: HashMap::new(),
            sites: HashMap::new(),
            imports: Vec::new(),
            current: 0,
            scopes: Vec::new(),
            results: Vec::new(),
            consts: HashMap::new(),
            tparams: Vec::new(),
        }
    }

    fn check_package(&mut self) {
        let files = self.files;
        for (i, file) in files.iter().enumerate() {
            self.current = i;
            if file.package != self.export.name {
                let message = format!(
                    "package {}; expected package {}",
                    file.package, self.export.name
                );
                self.error(Pos::new(1, 1), message);
            }
            let bindings = self.import_file(file);
            self.imports.push(bindings);
        }
        self.declare_types();
        self.resolve_types();
        self.declare_funcs();
        self.declare_values();
        self.check_bodies();
    }

    fn finish(mut self) -> Result<TypedPackage, TypeErrors> {
        if !self.errors.is_empty() {
            self.errors
                .sort_by(|a, b| (&a.file, a.pos).cmp(&(&b.file, b.pos)));
            self.errors.dedup();
            return Err(TypeErrors(self.errors));
        }
        self.export.imports = self.deps.keys().cloned().collect();
        debug!(
            package = %self.export.path,
            types = self.export.types.len(),
            funcs = self.export.funcs.len(),
            "checked package"
        );
        Ok(TypedPackage {
            export: self.export,
            info: self.info,
            deps: self.deps,
        })
    }

    fn error(&mut self, pos: Pos, message: impl Into<String>) {
        if self.quiet {
            return;
        }
        let file = self
            .files
            .get(self.current)
            .map(|f| f.path.clone())
            .unwrap_or_default();
        self.errors.push(TypeError::new(file, pos, message));
    }

    // ========================================================================
    // Package scope
    // ========================================================================

    fn import_file(&mut self, file: &File) -> HashMap<String, String> {
        let mut bindings = HashMap::new();
        for spec in &file.imports {
            let data = match self.deps.get(&spec.path).cloned() {
                Some(data) => Some(data),
                None => match self.importer.import(&spec.path) {
                    Ok(data) => {
                        self.deps.insert(spec.path.clone(), data.clone());
                        Some(data)
                    }
                    Err(reason) => {
                        let message = format!("could not import {} ({reason})", spec.path);
                        self.error(spec.pos, message);
                        None
                    }
                },
            };
            match spec.name.as_deref() {
                Some("_") => {}
                Some(".") => {
                    let message = format!("dot import of {} is not supported", spec.path);
                    self.error(spec.pos, message);
                }
                Some(name) => {
                    bindings.insert(name.to_string(), spec.path.clone());
                }
                None => {
                    let name = data
                        .filter(|d| !d.name.is_empty())
                        .map(|d| d.name.clone())
                        .unwrap_or_else(|| spec.local_name());
                    bindings.insert(name, spec.path.clone());
                }
            }
        }
        bindings
    }

    fn declare_package(&mut self, name: &str, entity: Entity, pos: Pos) {
        if name == "_" || (name == "init" && entity.obj == Object::Func) {
            return;
        }
        let file = self
            .files
            .get(self.current)
            .map(|f| f.path.clone())
            .unwrap_or_default();
        if let Some((first_file, first_pos)) = self.sites.get(name) {
            let message = format!(
                "{name} redeclared in this block (other declaration at {first_file}:{first_pos})"
            );
            self.error(pos, message);
            return;
        }
        self.sites.insert(name.to_string(), (file, pos));
        self.package.insert(name.to_string(), entity);
    }

    fn declare_types(&mut self) {
        let files = self.files;
        for (i, file) in files.iter().enumerate() {
            self.current = i;
            for decl in &file.decls {
                let Decl::Type(spec) = decl else { continue };
                let ty = if spec.alias {
                    Type::Invalid
                } else {
                    Type::named(&self.export.path, &spec.name)
                };
                self.declare_package(&spec.name, Entity::new(Object::TypeName(ty.clone()), ty), spec.pos);
                if !spec.alias && spec.name != "_" {
                    let pkg = self.export.path.clone();
                    self.export
                        .types
                        .entry(spec.name.clone())
                        .or_insert_with(|| NamedDef {
                            pkg,
                            name: spec.name.clone(),
                            underlying: Type::Invalid,
                            methods: Vec::new(),
                        });
                }
            }
        }
    }

    /// Resolve underlying types until nothing changes, so declaration order
    /// does not matter.
    fn resolve_types(&mut self) {
        let files = self.files;
        let specs: Vec<_> = files
            .iter()
            .enumerate()
            .flat_map(|(i, f)| {
                f.decls.iter().filter_map(move |d| match d {
                    Decl::Type(spec) => Some((i, spec)),
                    _ => None,
                })
            })
            .collect();
        for _ in 0..=specs.len() {
            let mut changed = false;
            for &(i, spec) in &specs {
                self.current = i;
                let resolved = resolve_type(&*self, &spec.ty, &spec.type_params);
                if spec.alias {
                    if let Some(entity) = self.package.get_mut(&spec.name)
                        && entity.ty != resolved
                    {
                        *entity = Entity::new(Object::TypeName(resolved.clone()), resolved);
                        changed = true;
                    }
                    continue;
                }
                let underlying = match &resolved {
                    Type::Named { .. } => self.underlying_of(&resolved).unwrap_or(Type::Invalid),
                    _ => resolved,
                };
                if let Some(def) = self.export.types.get_mut(&spec.name)
                    && def.underlying != underlying
                {
                    def.underlying = underlying;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
    }

    fn declare_funcs(&mut self) {
        let files = self.files;
        for (i, file) in files.iter().enumerate() {
            self.current = i;
            for decl in &file.decls {
                let Decl::Func(func) = decl else { continue };
                let Some(recv) = &func.recv else {
                    let sig = resolve_signature(&*self, &func.sig, &func.type_params);
                    if func.name != "init" && func.name != "_" {
                        self.export.funcs.insert(func.name.clone(), sig.clone());
                    }
                    self.declare_package(&func.name, Entity::new(Object::Func, Type::Func(sig)), func.pos);
                    continue;
                };
                let sig = resolve_signature(&*self, &func.sig, &recv.type_args);
                let existing = self
                    .export
                    .types
                    .get(&recv.type_name)
                    .map(|def| def.method(&func.name).is_some());
                match existing {
                    None => {
                        let message = format!("undefined: {}", recv.type_name);
                        self.error(func.pos, message);
                    }
                    Some(true) => {
                        let message =
                            format!("method {}.{} already declared", recv.type_name, func.name);
                        self.error(func.pos, message);
                    }
                    Some(false) => {
                        if let Some(def) = self.export.types.get_mut(&recv.type_name) {
                            def.methods.push(MethodDef {
                                name: func.name.clone(),
                                sig,
                                pointer_recv: recv.pointer,
                            });
                        }
                    }
                }
            }
        }
    }

    fn declare_values(&mut self) {
        let files = self.files;
        for (i, file) in files.iter().enumerate() {
            self.current = i;
            for decl in &file.decls {
                let (spec, obj) = match decl {
                    Decl::Var(spec) => (spec, Object::Var { package_level: true }),
                    Decl::Const(spec) => (spec, Object::Const { package_level: true }),
                    _ => continue,
                };
                let ty = spec
                    .ty
                    .as_ref()
                    .map(|t| self.resolve(t))
                    .unwrap_or(Type::Invalid);
                for name in &spec.names {
                    self.declare_package(name, Entity::new(obj.clone(), ty.clone()), spec.pos);
                }
            }
        }

        // Initialisers may refer to variables declared further down; the
        // first pass settles their types, the second reports problems.
        for quiet in [true, false] {
            self.quiet = quiet;
            for (i, file) in files.iter().enumerate() {
                self.current = i;
                for decl in &file.decls {
                    match decl {
                        Decl::Var(spec) => self.infer_package_values(spec, false),
                        Decl::Const(spec) => self.infer_package_values(spec, true),
                        _ => {}
                    }
                }
            }
        }
        self.quiet = false;
    }

    fn infer_package_values(&mut self, spec: &ValueSpec, constant: bool) {
        let types = self.value_spec_types(spec, constant);
        for (idx, (name, ty)) in spec.names.iter().zip(types).enumerate() {
            if name == "_" {
                continue;
            }
            if let Some(entity) = self.package.get_mut(name) {
                entity.ty = ty.clone();
            }
            if constant {
                if let Some(value) = spec.values.get(idx) {
                    let env = IotaEnv {
                        inner: &*self,
                        iota: i64::from(spec.iota),
                    };
                    if let Some(n) = eval_int(&env, value) {
                        self.consts.insert(name.clone(), n);
                    }
                }
                self.export.consts.insert(name.clone(), ty);
            } else {
                self.export.vars.insert(name.clone(), ty);
            }
        }
    }

    /// Types of the names of a value spec. Constants keep untyped types.
    fn value_spec_types(&mut self, spec: &ValueSpec, constant: bool) -> Vec<Type> {
        let declared = spec.ty.as_ref().map(|t| self.resolve(t));
        if spec.values.len() == 1 && spec.names.len() > 1 {
            let value = &spec.values[0];
            let ty = self.expr(value, None);
            return match declared {
                Some(d) => vec![d; spec.names.len()],
                None => unpack(value, ty, spec.names.len()),
            };
        }
        let mut out = Vec::with_capacity(spec.names.len());
        for idx in 0..spec.names.len() {
            let ty = match (&declared, spec.values.get(idx)) {
                (Some(d), Some(value)) => {
                    let vt = self.expr(value, Some(d));
                    self.assign(value, &vt, d);
                    d.clone()
                }
                (Some(d), None) => d.clone(),
                (None, Some(value)) if constant => self.expr(value, None),
                (None, Some(value)) => self.expr(value, None).defaulted(),
                (None, None) => Type::Invalid,
            };
            out.push(ty);
        }
        out
    }

    fn check_bodies(&mut self) {
        let files = self.files;
        for (i, file) in files.iter().enumerate() {
            self.current = i;
            for decl in &file.decls {
                if let Decl::Func(func) = decl
                    && let Some(body) = &func.body
                {
                    self.check_func(func, body);
                }
            }
        }
    }

    fn check_func(&mut self, func: &FuncDecl, body: &Block) {
        let mut tparams = func.type_params.clone();
        if let Some(recv) = &func.recv {
            tparams.extend(recv.type_args.iter().cloned());
        }
        let saved = std::mem::replace(&mut self.tparams, tparams);
        self.scopes.push(HashMap::new());
        if let Some(recv) = &func.recv
            && let Some(name) = &recv.name
        {
            let base = self.lookup_type(&recv.type_name).unwrap_or(Type::Invalid);
            let ty = if recv.pointer { Type::pointer(base) } else { base };
            self.declare_local(name, Object::Var { package_level: false }, ty);
        }
        let sig = resolve_signature(&*self, &func.sig, &self.tparams);
        self.declare_params(&func.sig, &sig);
        self.results.push(sig.results);
        self.block(body);
        self.results.pop();
        self.scopes.pop();
        self.tparams = saved;
    }

    // ========================================================================
    // Scopes
    // ========================================================================

    fn resolve(&self, ty: &TypeExpr) -> Type {
        resolve_type(self, ty, &self.tparams)
    }

    fn lookup(&self, name: &str) -> Option<Entity> {
        for scope in self.scopes.iter().rev() {
            if let Some(entity) = scope.get(name) {
                return Some(entity.clone());
            }
        }
        if let Some(entity) = self.package.get(name) {
            return Some(entity.clone());
        }
        if let Some(path) = self.imports.get(self.current).and_then(|b| b.get(name)) {
            return Some(Entity::new(Object::PkgName(path.clone()), Type::Invalid));
        }
        universe::lookup(name).map(|(obj, ty)| Entity::new(obj, ty))
    }

    fn declare_local(&mut self, name: &str, obj: Object, ty: Type) {
        if name == "_" {
            return;
        }
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), Entity::new(obj, ty));
        }
    }

    fn declare_params(&mut self, sig: &Signature, ty: &FuncType) {
        let fields = sig.params.iter().zip(&ty.params);
        let results = sig.results.iter().zip(&ty.results);
        for (field, ty) in fields.chain(results) {
            if let Some(name) = &field.name {
                self.declare_local(name, Object::Var { package_level: false }, ty.clone());
            }
        }
    }

    fn named_def(&self, pkg: &str, name: &str) -> Option<&NamedDef> {
        if pkg == self.export.path {
            self.export.types.get(name)
        } else {
            self.deps.get(pkg).and_then(|d| d.types.get(name))
        }
    }

    fn underlying_of(&self, ty: &Type) -> Option<Type> {
        match ty {
            Type::Named { pkg, name } if pkg.is_empty() && name == "error" => {
                Some(Type::Interface(universe::error_methods()))
            }
            Type::Named { pkg, name } => self.named_def(pkg, name).map(|d| d.underlying.clone()),
            _ => None,
        }
    }

    /// The underlying type, or the type itself when it is not named.
    fn under(&self, ty: &Type) -> Type {
        match ty {
            Type::Named { .. } => self.underlying_of(ty).unwrap_or(Type::Invalid),
            other => other.clone(),
        }
    }

    fn is_interface(&self, ty: &Type) -> bool {
        matches!(self.under(ty), Type::Interface(_))
    }

    /// Whether enough is known about `ty` to report a missing member.
    fn is_known(&self, ty: &Type) -> bool {
        if ty.has_invalid() {
            return false;
        }
        match ty {
            Type::Pointer(inner) => self.is_known(inner),
            Type::Named { .. } => self.underlying_of(ty).is_some_and(|u| !u.has_invalid()),
            Type::TypeParam(_) => false,
            _ => true,
        }
    }

    // ========================================================================
    // Statements
    // ========================================================================

    fn block(&mut self, block: &Block) {
        for stmt in block {
            self.stmt(stmt);
        }
    }

    fn scoped_block(&mut self, block: &Block) {
        self.scopes.push(HashMap::new());
        self.block(block);
        self.scopes.pop();
    }

    fn opt_stmt(&mut self, stmt: &Option<Box<Stmt>>) {
        if let Some(stmt) = stmt {
            self.stmt(stmt);
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Expr(e) | StmtKind::Go(e) | StmtKind::Defer(e) => {
                self.expr(e, None);
            }
            StmtKind::Send { chan, value } => self.send(chan, value),
            StmtKind::IncDec { target, .. } => {
                self.expr(target, None);
            }
            StmtKind::Assign { lhs, op, rhs } => {
                let targets: Vec<Type> = lhs
                    .iter()
                    .map(|e| match e.as_ident() {
                        Some("_") => Type::Invalid,
                        _ => self.expr(e, None),
                    })
                    .collect();
                if op.is_some() || lhs.len() == rhs.len() {
                    for (value, target) in rhs.iter().zip(&targets) {
                        let hint = Some(target).filter(|t| !t.is_invalid());
                        let vt = self.expr(value, hint);
                        if op.is_none() {
                            self.assign(value, &vt, target);
                        }
                    }
                } else {
                    for value in rhs {
                        self.expr(value, None);
                    }
                }
            }
            StmtKind::Define { names, values } => self.define(names, values),
            StmtKind::Decl(decl) => self.local_decl(decl),
            StmtKind::Return(values) => self.return_stmt(values),
            StmtKind::If {
                init,
                cond,
                then,
                els,
            } => {
                self.scopes.push(HashMap::new());
                self.opt_stmt(init);
                self.expr(cond, None);
                self.scoped_block(then);
                self.opt_stmt(els);
                self.scopes.pop();
            }
            StmtKind::For {
                init,
                cond,
                post,
                body,
            } => {
                self.scopes.push(HashMap::new());
                self.opt_stmt(init);
                if let Some(cond) = cond {
                    self.expr(cond, None);
                }
                self.opt_stmt(post);
                self.scoped_block(body);
                self.scopes.pop();
            }
            StmtKind::Range {
                key,
                value,
                define,
                expr,
                body,
            } => self.range(key.as_ref(), value.as_ref(), *define, expr, body),
            StmtKind::Switch { init, tag, cases } => {
                self.scopes.push(HashMap::new());
                self.opt_stmt(init);
                let tag_ty = tag.as_ref().map(|t| self.expr(t, None));
                for case in cases {
                    for e in &case.exprs {
                        self.expr(e, tag_ty.as_ref());
                    }
                    self.scoped_block(&case.body);
                }
                self.scopes.pop();
            }
            StmtKind::TypeSwitch {
                init,
                bind,
                subject,
                cases,
            } => {
                self.scopes.push(HashMap::new());
                self.opt_stmt(init);
                let subject_ty = self.expr(subject, None);
                for case in cases {
                    self.scopes.push(HashMap::new());
                    let types: Vec<Option<Type>> = case
                        .types
                        .iter()
                        .map(|t| t.as_ref().map(|t| self.resolve(t)))
                        .collect();
                    if let Some(bind) = bind {
                        let ty = match types.as_slice() {
                            [Some(single)] => single.clone(),
                            _ => subject_ty.clone(),
                        };
                        self.declare_local(bind, Object::Var { package_level: false }, ty);
                    }
                    self.block(&case.body);
                    self.scopes.pop();
                }
                self.scopes.pop();
            }
            StmtKind::Select(clauses) => {
                for clause in clauses {
                    self.scopes.push(HashMap::new());
                    match &clause.comm {
                        Some(CommOp::Send { chan, value }) => self.send(chan, value),
                        Some(CommOp::Recv { lhs, define, chan }) => {
                            let ct = self.expr(chan, None);
                            let elem = match self.under(&ct) {
                                Type::Chan(_, elem) => *elem,
                                _ => Type::Invalid,
                            };
                            let types = [elem, Type::Basic(Basic::Bool)];
                            for (target, ty) in lhs.iter().zip(types) {
                                if *define {
                                    self.define_expr(target, ty);
                                } else {
                                    self.expr(target, None);
                                }
                            }
                        }
                        None => {}
                    }
                    self.block(&clause.body);
                    self.scopes.pop();
                }
            }
            StmtKind::Block(block) => self.scoped_block(block),
            StmtKind::Labeled { stmt, .. } => self.stmt(stmt),
            StmtKind::Break(_)
            | StmtKind::Continue(_)
            | StmtKind::Fallthrough
            | StmtKind::Goto(_)
            | StmtKind::Empty => {}
        }
    }

    fn send(&mut self, chan: &Expr, value: &Expr) {
        let ct = self.expr(chan, None);
        let elem = match self.under(&ct) {
            Type::Chan(_, elem) => Some(*elem),
            _ => None,
        };
        let vt = self.expr(value, elem.as_ref());
        if let Some(elem) = elem {
            self.assign(value, &vt, &elem);
        }
    }

    fn define(&mut self, names: &[String], values: &[Expr]) {
        let types = if values.len() == 1 && names.len() > 1 {
            let ty = self.expr(&values[0], None);
            unpack(&values[0], ty, names.len())
        } else {
            values
                .iter()
                .map(|v| self.expr(v, None).defaulted())
                .collect()
        };
        for (i, name) in names.iter().enumerate() {
            // `:=` reuses variables already declared in the same block.
            if self.scopes.last().is_some_and(|s| s.contains_key(name)) {
                continue;
            }
            let ty = types.get(i).cloned().unwrap_or(Type::Invalid);
            self.declare_local(name, Object::Var { package_level: false }, ty);
        }
    }

    /// Declare the identifier `target` with type `ty` and record it.
    fn define_expr(&mut self, target: &Expr, ty: Type) {
        let Some(name) = target.as_ident() else { return };
        if name == "_" {
            return;
        }
        let obj = Object::Var { package_level: false };
        self.declare_local(name, obj.clone(), ty.clone());
        self.info.uses.insert(target.id, obj);
        if !ty.is_invalid() {
            self.info.types.insert(target.id, ty);
        }
    }

    fn local_decl(&mut self, decl: &Decl) {
        match decl {
            Decl::Var(spec) | Decl::Const(spec) => {
                let constant = matches!(decl, Decl::Const(_));
                let types = self.value_spec_types(spec, constant);
                let obj = if constant {
                    Object::Const { package_level: false }
                } else {
                    Object::Var { package_level: false }
                };
                for (name, ty) in spec.names.iter().zip(types) {
                    self.declare_local(name, obj.clone(), ty);
                }
            }
            // Local named types are treated structurally.
            Decl::Type(spec) => {
                let ty = self.resolve(&spec.ty);
                self.declare_local(&spec.name, Object::TypeName(ty.clone()), ty);
            }
            Decl::Func(_) => {}
        }
    }

    fn return_stmt(&mut self, values: &[Expr]) {
        let results = self.results.last().cloned().unwrap_or_default();
        if values.len() == results.len() {
            for (value, target) in values.iter().zip(&results) {
                let vt = self.expr(value, Some(target));
                self.assign(value, &vt, target);
            }
        } else {
            for value in values {
                self.expr(value, None);
            }
        }
    }

    fn range(
        &mut self,
        key: Option<&Expr>,
        value: Option<&Expr>,
        define: bool,
        expr: &Expr,
        body: &Block,
    ) {
        self.scopes.push(HashMap::new());
        let xt = self.expr(expr, None);
        let int = Type::Basic(Basic::Int);
        let (kt, vt) = match self.under(&xt) {
            Type::Basic(b) if b.is_string() => (int, Type::Basic(Basic::Int32)),
            Type::Basic(b) if b.is_integer() => (xt.clone().defaulted(), Type::Invalid),
            Type::Slice(elem) | Type::Array(_, elem) => (int, *elem),
            Type::Pointer(inner) => match self.under(&inner) {
                Type::Array(_, elem) => (int, *elem),
                _ => (Type::Invalid, Type::Invalid),
            },
            Type::Map(k, v) => (*k, *v),
            Type::Chan(_, elem) => (*elem, Type::Invalid),
            _ => (Type::Invalid, Type::Invalid),
        };
        for (target, ty) in [(key, kt), (value, vt)] {
            let Some(target) = target else { continue };
            if define {
                self.define_expr(target, ty);
            } else if target.as_ident() != Some("_") {
                self.expr(target, None);
            }
        }
        self.block(body);
        self.scopes.pop();
    }

    // ========================================================================
    // Assignability
    // ========================================================================

    /// Check that `value` of type `vt` can stand where `target` is expected,
    /// recording implicit conversions of concrete values to interfaces.
    fn assign(&mut self, value: &Expr, vt: &Type, target: &Type) {
        if vt.is_invalid() || target.is_invalid() || *vt == Type::Basic(Basic::UntypedNil) {
            return;
        }
        let Type::Interface(methods) = self.under(target) else {
            return;
        };
        if let Err(reason) = self.implements(vt, target, &methods) {
            if self.is_known(vt) {
                let message = format!("cannot use value of type {vt} as {target} value: {reason}");
                self.error(value.pos, message);
            }
            return;
        }
        if !self.is_interface(vt) {
            self.info.implicit.insert(value.id, vt.clone().defaulted());
        }
    }

    fn implements(&self, ty: &Type, iface: &Type, methods: &[Method]) -> Result<(), String> {
        for required in methods {
            let found = self.lookup_member(ty, &required.name);
            let reason = match found {
                Some((
                    Selection::Method {
                        path, pointer_recv, ..
                    },
                    Type::Func(sig),
                )) => {
                    if pointer_recv && path.is_empty() && !matches!(ty, Type::Pointer(_)) {
                        format!("method {} has pointer receiver", required.name)
                    } else if sig != required.sig && !sig.has_invalid() && !required.sig.has_invalid() {
                        format!("wrong type for method {}", required.name)
                    } else {
                        continue;
                    }
                }
                _ => format!("missing method {}", required.name),
            };
            return Err(format!("{ty} does not implement {iface} ({reason})"));
        }
        Ok(())
    }

    fn lookup_member(&self, ty: &Type, sel: &str) -> Option<(Selection, Type)> {
        self.find_member(ty, sel, &mut Vec::new(), 0)
    }

    fn find_member(
        &self,
        ty: &Type,
        sel: &str,
        path: &mut Vec<String>,
        depth: usize,
    ) -> Option<(Selection, Type)> {
        if depth > MAX_EMBEDDING_DEPTH {
            return None;
        }
        let base = match ty {
            Type::Pointer(inner) => inner.as_ref(),
            other => other,
        };
        if let Type::Named { pkg, name } = base
            && let Some(def) = self.named_def(pkg, name)
            && let Some(method) = def.method(sel)
        {
            let selection = Selection::Method {
                path: path.clone(),
                recv: Some((pkg.clone(), name.clone())),
                pointer_recv: method.pointer_recv,
            };
            return Some((selection, Type::Func(method.sig.clone())));
        }
        match self.under(base) {
            Type::Interface(methods) => methods.into_iter().find(|m| m.name == sel).map(|m| {
                let selection = Selection::Method {
                    path: path.clone(),
                    recv: None,
                    pointer_recv: false,
                };
                (selection, Type::Func(m.sig))
            }),
            Type::Struct(fields) => {
                if let Some(field) = fields.iter().find(|f| f.name == sel) {
                    let mut full = path.clone();
                    full.push(field.name.clone());
                    return Some((Selection::Field { path: full }, field.ty.clone()));
                }
                for field in fields.iter().filter(|f| f.embedded) {
                    path.push(field.name.clone());
                    let found = self.find_member(&field.ty, sel, path, depth + 1);
                    path.pop();
                    if found.is_some() {
                        return found;
                    }
                }
                None
            }
            _ => None,
        }
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    fn expr(&mut self, e: &Expr, expected: Option<&Type>) -> Type {
        let ty = self.infer(e, expected);
        if !ty.is_invalid() {
            self.info.types.insert(e.id, ty.clone());
        }
        ty
    }

    fn infer(&mut self, e: &Expr, expected: Option<&Type>) -> Type {
        match &e.kind {
            ExprKind::Ident(name) => {
                if name == "_" {
                    return Type::Invalid;
                }
                match self.lookup(name) {
                    Some(entity) => {
                        self.info.uses.insert(e.id, entity.obj);
                        entity.ty
                    }
                    None => {
                        self.error(e.pos, format!("undefined: {name}"));
                        Type::Invalid
                    }
                }
            }
            ExprKind::BasicLit(lit) => Type::Basic(match lit {
                Lit::Int(_) => Basic::UntypedInt,
                Lit::Float(_) => Basic::UntypedFloat,
                Lit::Imag(_) => Basic::Complex128,
                Lit::Rune(_) => Basic::UntypedRune,
                Lit::Str(_) => Basic::UntypedString,
            }),
            ExprKind::Composite { ty, elems } => self.composite(ty.as_ref(), elems, expected),
            ExprKind::FuncLit { sig, body } => {
                let ft = resolve_signature(&*self, sig, &self.tparams);
                self.scopes.push(HashMap::new());
                self.declare_params(sig, &ft);
                self.results.push(ft.results.clone());
                self.block(body);
                self.results.pop();
                self.scopes.pop();
                Type::Func(ft)
            }
            ExprKind::Paren(inner) => {
                let ty = self.expr(inner, expected);
                if let Some(obj @ Object::TypeName(_)) = self.info.uses.get(&inner.id).cloned() {
                    self.info.uses.insert(e.id, obj);
                }
                ty
            }
            ExprKind::Selector { x, sel } => self.selector(e, x, sel),
            ExprKind::Index { x, index } => {
                let xt = self.expr(x, None);
                if matches!(xt, Type::Func(_)) || self.denotes_type(x) {
                    // Generic instantiation.
                    for i in index {
                        self.expr(i, None);
                    }
                    return Type::Invalid;
                }
                match self.under(&xt) {
                    Type::Map(k, v) => {
                        for i in index {
                            let it = self.expr(i, Some(&k));
                            self.assign(i, &it, &k);
                        }
                        *v
                    }
                    other => {
                        for i in index {
                            self.expr(i, None);
                        }
                        match other {
                            Type::Slice(elem) | Type::Array(_, elem) => *elem,
                            Type::Pointer(inner) => match self.under(&inner) {
                                Type::Array(_, elem) => *elem,
                                _ => Type::Invalid,
                            },
                            Type::Basic(b) if b.is_string() => Type::Basic(Basic::Uint8),
                            _ => Type::Invalid,
                        }
                    }
                }
            }
            ExprKind::Slice { x, lo, hi, max } => {
                let xt = self.expr(x, None);
                for bound in [lo, hi, max].into_iter().flatten() {
                    self.expr(bound, None);
                }
                match self.under(&xt) {
                    Type::Basic(b) if b.is_string() => xt.defaulted(),
                    Type::Slice(_) => xt,
                    Type::Array(_, elem) => Type::Slice(elem),
                    Type::Pointer(inner) => match self.under(&inner) {
                        Type::Array(_, elem) => Type::Slice(elem),
                        _ => Type::Invalid,
                    },
                    _ => Type::Invalid,
                }
            }
            ExprKind::TypeAssert { x, ty } => {
                let xt = self.expr(x, None);
                if self.is_known(&xt) && !self.is_interface(&xt) {
                    let message =
                        format!("invalid operation: cannot type-assert non-interface value of type {xt}");
                    self.error(e.pos, message);
                }
                ty.as_ref().map(|t| self.resolve(t)).unwrap_or(Type::Invalid)
            }
            ExprKind::Call {
                func,
                args,
                ellipsis,
            } => self.call(func, args, *ellipsis, expected),
            ExprKind::Unary { op, x } => self.unary(e, *op, x, expected),
            ExprKind::Binary { op, x, y } => {
                let xt = self.expr(x, None);
                let hint = (!xt.is_untyped()).then(|| xt.clone());
                let yt = self.expr(y, hint.as_ref());
                if op.is_comparison() {
                    return Type::Basic(Basic::UntypedBool);
                }
                if matches!(op, golower_syntax::BinaryOp::Shl | golower_syntax::BinaryOp::Shr) {
                    if xt.is_untyped()
                        && let Some(want) = expected
                        && !want.is_untyped()
                        && !want.is_invalid()
                    {
                        return want.clone();
                    }
                    return xt;
                }
                match (xt.is_untyped(), yt.is_untyped()) {
                    (true, true) => wider_untyped(xt, yt),
                    (true, false) => {
                        self.info.types.insert(x.id, yt.clone());
                        yt
                    }
                    (false, true) => {
                        if !xt.is_invalid() {
                            self.info.types.insert(y.id, xt.clone());
                        }
                        xt
                    }
                    (false, false) => xt,
                }
            }
            ExprKind::Type(ty) => {
                let ty = self.resolve(ty);
                self.info.uses.insert(e.id, Object::TypeName(ty.clone()));
                ty
            }
        }
    }

    fn denotes_type(&self, e: &Expr) -> bool {
        matches!(self.info.uses.get(&e.unparen().id), Some(Object::TypeName(_)))
            || matches!(e.unparen().kind, ExprKind::Type(_))
    }

    fn composite(
        &mut self,
        ty: Option<&TypeExpr>,
        elems: &[golower_syntax::Element],
        expected: Option<&Type>,
    ) -> Type {
        let ty = match ty {
            Some(TypeExpr::Array { len: None, elem }) => {
                let elem = self.resolve(elem);
                Type::Array(elems.len() as u64, Box::new(elem))
            }
            Some(t) => self.resolve(t),
            None => expected.cloned().unwrap_or(Type::Invalid),
        };
        // `[]*T{{...}}` elides `&T`.
        let base = match &ty {
            Type::Pointer(inner) => (**inner).clone(),
            other => other.clone(),
        };
        match self.under(&base) {
            Type::Struct(fields) => {
                for (i, el) in elems.iter().enumerate() {
                    let field_ty = match &el.key {
                        Some(key) => {
                            let name = key.as_ident().unwrap_or_default();
                            let found = fields.iter().find(|f| f.name == name).map(|f| f.ty.clone());
                            if found.is_none() && self.is_known(&base) {
                                let message =
                                    format!("unknown field {name} in struct literal of type {base}");
                                self.error(key.pos, message);
                            }
                            found
                        }
                        None => fields.get(i).map(|f| f.ty.clone()),
                    };
                    let vt = self.expr(&el.value, field_ty.as_ref());
                    if let Some(ft) = &field_ty {
                        self.assign(&el.value, &vt, ft);
                    }
                }
            }
            Type::Slice(elem) | Type::Array(_, elem) => {
                let int = Type::Basic(Basic::Int);
                for el in elems {
                    if let Some(key) = &el.key {
                        self.expr(key, Some(&int));
                    }
                    let vt = self.expr(&el.value, Some(&elem));
                    self.assign(&el.value, &vt, &elem);
                }
            }
            Type::Map(k, v) => {
                for el in elems {
                    if let Some(key) = &el.key {
                        let kt = self.expr(key, Some(&k));
                        self.assign(key, &kt, &k);
                    }
                    let vt = self.expr(&el.value, Some(&v));
                    self.assign(&el.value, &vt, &v);
                }
            }
            _ => {
                for el in elems {
                    self.expr(&el.value, None);
                }
            }
        }
        ty
    }

    fn selector(&mut self, e: &Expr, x: &Expr, sel: &str) -> Type {
        if let Some(name) = x.as_ident()
            && let Some(Entity {
                obj: Object::PkgName(path),
                ..
            }) = self.lookup(name)
        {
            self.info
                .uses
                .insert(x.unparen().id, Object::PkgName(path.clone()));
            return self.qualified(e, name, &path, sel);
        }
        let xt = self.expr(x, None);
        if self.denotes_type(x) {
            // Method expressions are not modelled.
            return Type::Invalid;
        }
        match self.lookup_member(&xt, sel) {
            Some((selection, ty)) => {
                self.info.selections.insert(e.id, selection);
                ty
            }
            None => {
                if self.is_known(&xt) {
                    let message =
                        format!("{xt}.{sel} undefined (type {xt} has no field or method {sel})");
                    self.error(e.pos, message);
                }
                Type::Invalid
            }
        }
    }

    fn qualified(&mut self, e: &Expr, qualifier: &str, path: &str, sel: &str) -> Type {
        if path == "unsafe" {
            if sel == "Pointer" {
                let ty = Type::Basic(Basic::UnsafePointer);
                self.info.uses.insert(e.id, Object::TypeName(ty.clone()));
                return ty;
            }
            return Type::Invalid;
        }
        let Some(data) = self.deps.get(path).cloned() else {
            return Type::Invalid;
        };
        let Some(member) = data.member(sel) else {
            self.error(e.pos, format!("undefined: {qualifier}.{sel}"));
            return Type::Invalid;
        };
        let ty = match &member {
            Member::Type(t) => {
                self.info.uses.insert(e.id, Object::TypeName(t.clone()));
                t.clone()
            }
            Member::Func(sig) => Type::Func(sig.clone()),
            Member::Var(t) | Member::Const(t) => t.clone(),
        };
        self.info.selections.insert(
            e.id,
            Selection::Qualified {
                path: path.to_string(),
                member,
            },
        );
        ty
    }

    fn unary(&mut self, e: &Expr, op: UnaryOp, x: &Expr, expected: Option<&Type>) -> Type {
        match op {
            UnaryOp::Addr => {
                let hint = match expected {
                    Some(Type::Pointer(inner)) => Some((**inner).clone()),
                    _ => None,
                };
                match self.expr(x, hint.as_ref()) {
                    Type::Invalid => Type::Invalid,
                    t => Type::pointer(t),
                }
            }
            UnaryOp::Deref => {
                let xt = self.expr(x, None);
                if self.denotes_type(x) {
                    let ty = Type::pointer(xt);
                    self.info.uses.insert(e.id, Object::TypeName(ty.clone()));
                    return ty;
                }
                match self.under(&xt) {
                    Type::Pointer(elem) => *elem,
                    _ => Type::Invalid,
                }
            }
            UnaryOp::Recv => {
                let xt = self.expr(x, None);
                match self.under(&xt) {
                    Type::Chan(_, elem) => *elem,
                    _ => Type::Invalid,
                }
            }
            UnaryOp::Not => {
                let xt = self.expr(x, None);
                if xt.is_untyped() {
                    Type::Basic(Basic::UntypedBool)
                } else {
                    xt
                }
            }
            UnaryOp::Neg | UnaryOp::Pos | UnaryOp::Xor => self.expr(x, expected),
        }
    }

    fn call(&mut self, func: &Expr, args: &[Expr], ellipsis: bool, expected: Option<&Type>) -> Type {
        let ft = self.expr(func, None);
        match self.info.uses.get(&func.unparen().id).cloned() {
            Some(Object::TypeName(target)) => {
                for arg in args {
                    let at = self.expr(arg, Some(&target));
                    self.assign(arg, &at, &target);
                }
                return target;
            }
            Some(Object::Builtin(builtin)) => return self.builtin(builtin, args, ellipsis, expected),
            _ => {}
        }
        let Type::Func(sig) = self.under(&ft) else {
            for arg in args {
                self.expr(arg, None);
            }
            return Type::Invalid;
        };
        if args.len() == 1 && sig.params.len() > 1 {
            // f(g()) with a multi-valued g.
            self.expr(&args[0], None);
            return sig.result();
        }
        for (i, arg) in args.iter().enumerate() {
            let param = if sig.variadic && i + 1 >= sig.params.len() {
                match sig.params.last() {
                    Some(Type::Slice(elem)) if !ellipsis => Some((**elem).clone()),
                    other => other.cloned(),
                }
            } else {
                sig.params.get(i).cloned()
            };
            let at = self.expr(arg, param.as_ref());
            if let Some(param) = &param {
                self.assign(arg, &at, param);
            }
        }
        sig.result()
    }

    fn builtin(
        &mut self,
        builtin: Builtin,
        args: &[Expr],
        ellipsis: bool,
        expected: Option<&Type>,
    ) -> Type {
        match builtin {
            Builtin::Len | Builtin::Cap | Builtin::Copy => {
                for arg in args {
                    self.expr(arg, None);
                }
                Type::Basic(Basic::Int)
            }
            Builtin::Append => {
                let Some((first, rest)) = args.split_first() else {
                    return Type::Invalid;
                };
                let st = self.expr(first, expected);
                let elem = match self.under(&st) {
                    Type::Slice(elem) => Some(*elem),
                    _ => None,
                };
                for arg in rest {
                    let hint = if ellipsis { None } else { elem.as_ref() };
                    let at = self.expr(arg, hint);
                    if let Some(elem) = hint {
                        self.assign(arg, &at, elem);
                    }
                }
                st
            }
            Builtin::Make | Builtin::New => {
                let ty = args
                    .first()
                    .map(|a| self.expr(a, None))
                    .unwrap_or(Type::Invalid);
                for arg in args.iter().skip(1) {
                    self.expr(arg, None);
                }
                match (builtin, ty) {
                    (_, Type::Invalid) => Type::Invalid,
                    (Builtin::New, ty) => Type::pointer(ty),
                    (_, ty) => ty,
                }
            }
            Builtin::Panic => {
                let any = Type::Interface(Vec::new());
                for arg in args {
                    let at = self.expr(arg, Some(&any));
                    self.assign(arg, &at, &any);
                }
                Type::Tuple(Vec::new())
            }
            Builtin::Delete
            | Builtin::Close
            | Builtin::Print
            | Builtin::Println
            | Builtin::Clear => {
                for arg in args {
                    self.expr(arg, None);
                }
                Type::Tuple(Vec::new())
            }
            Builtin::Recover => Type::Interface(Vec::new()),
            Builtin::Complex | Builtin::Real | Builtin::Imag => {
                for arg in args {
                    self.expr(arg, None);
                }
                if builtin == Builtin::Complex {
                    Type::Basic(Basic::Complex128)
                } else {
                    Type::Basic(Basic::Float64)
                }
            }
            Builtin::Min | Builtin::Max => {
                let types: Vec<Type> = args.iter().map(|a| self.expr(a, expected)).collect();
                types
                    .iter()
                    .find(|t| !t.is_untyped())
                    .or(types.first())
                    .cloned()
                    .unwrap_or(Type::Invalid)
            }
        }
    }
}

impl TypeEnv for Checker<'_> {
    fn lookup_type(&self, name: &str) -> Option<Type> {
        let entity = self
            .scopes
            .iter()
            .rev()
            .find_map(|s| s.get(name))
            .or_else(|| self.package.get(name))?;
        match &entity.obj {
            Object::TypeName(ty) => Some(ty.clone()),
            _ => None,
        }
    }

    fn import_path(&self, qualifier: &str) -> Option<String> {
        self.imports.get(self.current)?.get(qualifier).cloned()
    }

    fn underlying(&self, ty: &Type) -> Option<Type> {
        self.underlying_of(ty)
    }

    fn const_int(&self, name: &str) -> Option<i64> {
        self.consts.get(name).copied()
    }
}

/// A view of the checker in which `iota` has a value.
struct IotaEnv<'c, 'a> {
    inner: &'c Checker<'a>,
    iota: i64,
}

impl TypeEnv for IotaEnv<'_, '_> {
    fn lookup_type(&self, name: &str) -> Option<Type> {
        self.inner.lookup_type(name)
    }

    fn import_path(&self, qualifier: &str) -> Option<String> {
        self.inner.import_path(qualifier)
    }

    fn underlying(&self, ty: &Type) -> Option<Type> {
        self.inner.underlying_of(ty)
    }

    fn const_int(&self, name: &str) -> Option<i64> {
        if name == "iota" {
            Some(self.iota)
        } else {
            self.inner.consts.get(name).copied()
        }
    }
}

/// Split the type of a multi-valued expression over `n` targets. Map index,
/// type assertion and receive yield a second boolean.
fn unpack(expr: &Expr, ty: Type, n: usize) -> Vec<Type> {
    match ty {
        Type::Tuple(items) if items.len() == n => items,
        single if n == 2 && is_comma_ok(expr) => vec![single.defaulted(), Type::Basic(Basic::Bool)],
        _ => vec![Type::Invalid; n],
    }
}

pub fn is_comma_ok(expr: &Expr) -> bool {
    matches!(
        expr.unparen().kind,
        ExprKind::Index { .. }
            | ExprKind::TypeAssert { .. }
            | ExprKind::Unary {
                op: UnaryOp::Recv,
                ..
            }
    )
}

fn wider_untyped(x: Type, y: Type) -> Type {
    fn rank(t: &Type) -> u8 {
        match t.as_basic() {
            Some(Basic::UntypedInt) => 1,
            Some(Basic::UntypedRune) => 2,
            Some(Basic::UntypedFloat) => 3,
            _ => 0,
        }
    }
    if rank(&y) > rank(&x) { y } else { x }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::MapImporter;
    use golower_syntax::{parse_file, visit::Visitor};

    fn check(src: &str, importer: &mut MapImporter) -> Result<TypedPackage, TypeErrors> {
        let file = parse_file("main.go", src).unwrap();
        LenientChecker.check("example.com/main", &[file], importer)
    }

    fn check_ok(src: &str) -> (TypedPackage, File) {
        let file = parse_file("main.go", src).unwrap();
        let mut importer = MapImporter::new();
        importer.insert(io_package());
        let pkg = LenientChecker
            .check("example.com/main", std::slice::from_ref(&file), &mut importer)
            .unwrap();
        (pkg, file)
    }

    fn io_package() -> ExportData {
        let mut io = ExportData::new("io", "io");
        io.types.insert(
            "Writer".into(),
            NamedDef {
                pkg: "io".into(),
                name: "Writer".into(),
                underlying: Type::Interface(vec![Method {
                    name: "Write".into(),
                    sig: FuncType {
                        params: vec![Type::slice(Type::Basic(Basic::Uint8))],
                        results: vec![Type::Basic(Basic::Int), Type::error()],
                        variadic: false,
                    },
                }]),
                methods: Vec::new(),
            },
        );
        io.vars.insert("EOF".into(), Type::error());
        io
    }

    /// Collects the recorded type of every call expression, by callee name.
    fn call_types(pkg: &TypedPackage, file: &File) -> BTreeMap<String, Type> {
        struct Calls<'p>(&'p TypedPackage, BTreeMap<String, Type>);
        impl Visitor for Calls<'_> {
            fn visit_expr(&mut self, expr: &Expr) {
                if let ExprKind::Call { func, .. } = &expr.kind
                    && let Some(name) = func.as_ident()
                {
                    self.1.insert(name.to_string(), self.0.info.type_of(expr.id).clone());
                }
                golower_syntax::visit::walk_expr(self, expr);
            }
        }
        let mut calls = Calls(pkg, BTreeMap::new());
        golower_syntax::visit::walk_file(&mut calls, file);
        calls.1
    }

    #[test]
    fn test_export_data() {
        let src = r#"package main

type Celsius float64

func (c Celsius) String() string { return "" }

func (c *Celsius) Set(v float64) { *c = Celsius(v) }

var Limit = 100

const Max, Min = 10, -10

func Convert(c Celsius) (float64, error) { return float64(c), nil }
"#;
        let (pkg, _) = check_ok(src);
        let export = &pkg.export;
        assert_eq!(export.name, "main");
        let celsius = &export.types["Celsius"];
        assert_eq!(celsius.underlying, Type::Basic(Basic::Float64));
        assert_eq!(celsius.methods.len(), 2);
        assert!(celsius.method("Set").unwrap().pointer_recv);
        assert_eq!(export.vars["Limit"], Type::Basic(Basic::Int));
        assert_eq!(export.consts["Max"], Type::Basic(Basic::UntypedInt));
        assert_eq!(
            export.funcs["Convert"].to_string(),
            "func(example.com/main.Celsius) (float64, error)"
        );
    }

    #[test]
    fn test_undefined_name() {
        let err = check(
            "package main\n\nfunc main() {\n\tx := y + 1\n\t_ = x\n}\n",
            &mut MapImporter::new(),
        )
        .unwrap_err();
        assert_eq!(err.len(), 1);
        assert_eq!(err.to_string(), "main.go:4:7: undefined: y");
    }

    #[test]
    fn test_duplicate_declaration() {
        let err = check(
            "package main\n\nfunc F() {}\n\nvar F = 1\n",
            &mut MapImporter::new(),
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "main.go:5:5: F redeclared in this block (other declaration at main.go:3:1)"
        );
    }

    #[test]
    fn test_unresolvable_import() {
        let err = check(
            "package main\n\nimport \"missing/pkg\"\n\nfunc main() { pkg.Do() }\n",
            &mut MapImporter::new(),
        )
        .unwrap_err();
        assert_eq!(err.len(), 1);
        let first = err.first().unwrap();
        assert_eq!(first.pos, Pos::new(3, 8));
        assert!(first.message.starts_with("could not import missing/pkg"));
    }

    #[test]
    fn test_interface_satisfaction() {
        let src = r#"package main

import "io"

type Buffer struct{ data []byte }

func (b *Buffer) Write(p []byte) (int, error) {
	b.data = append(b.data, p...)
	return len(p), nil
}

func use(w io.Writer) {}

func main() {
	use(&Buffer{})
	use(Buffer{})
}
"#;
        let mut importer = MapImporter::new();
        importer.insert(io_package());
        let err = check(src, &mut importer).unwrap_err();
        assert_eq!(err.len(), 1);
        let first = err.first().unwrap();
        assert_eq!(first.pos, Pos::new(16, 6));
        assert_eq!(
            first.message,
            "cannot use value of type example.com/main.Buffer as io.Writer value: \
             example.com/main.Buffer does not implement io.Writer (method Write has pointer receiver)"
        );
    }

    #[test]
    fn test_implicit_interface_conversion_recorded() {
        let src = r#"package main

type Name string

func (n Name) Error() string { return string(n) }

func fail() error { return Name("boom") }
"#;
        let (pkg, _) = check_ok(src);
        assert_eq!(pkg.info.implicit.len(), 1);
        let converted = pkg.info.implicit.values().next().unwrap();
        assert_eq!(converted, &Type::named("example.com/main", "Name"));
    }

    #[test]
    fn test_selections_and_promotion() {
        let src = r#"package main

type Base struct{ ID int }

func (b Base) Describe() string { return "" }

type Item struct {
	Base
	Name string
}

func main() {
	var it Item
	_ = it.ID
	_ = it.Describe()
}
"#;
        let (pkg, _) = check_ok(src);
        let fields: Vec<_> = pkg
            .info
            .selections
            .values()
            .filter_map(|s| match s {
                Selection::Field { path } => Some(path.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(fields, vec![vec!["Base".to_string(), "ID".to_string()]]);
        assert!(pkg.info.selections.values().any(|s| matches!(
            s,
            Selection::Method { path, recv: Some((_, name)), .. }
                if path == &["Base".to_string()] && name == "Base"
        )));
    }

    #[test]
    fn test_call_result_types() {
        let src = r#"package main

func pair() (int, string) { return 0, "" }

func single() float32 { return 0 }

func main() {
	pair()
	single()
}
"#;
        let (pkg, file) = check_ok(src);
        let calls = call_types(&pkg, &file);
        assert_eq!(calls["pair"].to_string(), "(int, string)");
        assert_eq!(calls["single"], Type::Basic(Basic::Float32));
    }

    #[test]
    fn test_array_length_from_constants() {
        let src = "package main\n\nconst (\n\tA = iota\n\tB\n\tC\n)\n\nvar table [C * 2]int\n";
        let (pkg, _) = check_ok(src);
        assert_eq!(
            pkg.export.vars["table"],
            Type::Array(4, Box::new(Type::Basic(Basic::Int)))
        );
    }

    #[test]
    fn test_unknown_types_degrade_silently() {
        let src = r#"package main

import "io"

func main() {
	var r io.Reader
	r.Read(nil)
	_ = io.EOF
}
"#;
        let mut importer = MapImporter::new();
        importer.insert(io_package());
        // io.Reader is not part of the export data: no error, just Invalid.
        let pkg = check(src, &mut importer).unwrap();
        assert_eq!(pkg.export.imports, vec!["io".to_string()]);
    }

    #[test]
    fn test_resolve_signature_across_files() {
        let (pkg, file) = check_ok("package main\n\nimport \"io\"\n\ntype T int\n\nfunc F(w io.Writer, t T) {}\n");
        let Decl::Func(f) = &file.decls[1] else {
            panic!("expected a function");
        };
        let sig = pkg.resolve_signature(&f.sig, &[], &file.imports);
        assert_eq!(sig.to_string(), "func(io.Writer, example.com/main.T)");
    }
}
