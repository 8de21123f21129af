//! Lowering of a checked package to the JavaScript IR.
//!
//! A package becomes one immediately invoked function that fills in
//! `$packages["<path>"]`:
//!
//! ```text
//! $packages["example.com/app"] = (function() {
//!   var $pkg = {};
//!   var $pkg_fmt = $packages["fmt"];
//!   ... types, constants, variables, functions, methods ...
//!   ... exports ...
//!   $pkg.$init = function*() { ... variable initialisers, init() ... };
//!   return $pkg;
//! })();
//! ```
//!
//! Expressions live in [`expr`], statements and function bodies in [`stmt`],
//! and the mapping from Go values to JS values in [`types`].

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use golower_syntax::visit::{self, Visitor};
use golower_syntax::{Decl, Expr as GoExpr, ExprKind, File, FuncDecl, Pos, TypeExpr, TypeSpec, ValueSpec};
use golower_types::resolve::{TypeEnv, resolve_type};
use golower_types::{Method, Object, Selection, StructField, Type, TypedPackage, universe};
use tracing::debug;

use crate::error::GenerationError;
use crate::js::{self, Expr, Function, Program, Stmt};

pub(crate) mod blocking;
mod expr;
pub(crate) mod fold;
mod stmt;
mod types;

use blocking::Blocking;
use fold::ConstValue;
use types::field_property;

/// Embedding depth searched for promoted methods.
const MAX_PROMOTION_DEPTH: usize = 4;

/// The generated code of one package.
#[derive(Debug, Clone)]
pub struct Lowered {
    pub program: Program,
    /// Functions and methods that may suspend, by key, including the
    /// wrappers generated for promoted methods.
    pub blocking: BTreeSet<String>,
}

/// Lower a checked package. `files` are the merged files the package was
/// checked from.
pub fn lower_package(pkg: &TypedPackage, files: &[File]) -> Result<Lowered, GenerationError> {
    let analysis = Blocking::analyze(pkg, files);
    let mut lowerer = Lowerer::new(pkg, files, analysis);
    let body = lowerer.package()?;

    let target = Expr::index(Expr::ident("$packages"), Expr::string(pkg.export.path.clone()));
    let wrapper = Expr::call(Expr::function(Function::anonymous(Vec::new(), body)), Vec::new());
    debug!(
        package = %pkg.export.path,
        blocking = lowerer.blocking_keys.len(),
        "lowered package"
    );
    Ok(Lowered {
        program: Program::new(vec![Stmt::assign(target, wrapper)]),
        blocking: lowerer.blocking_keys,
    })
}

/// What a name declared inside a function stands for.
#[derive(Debug, Clone)]
enum Binding {
    /// A variable, by its JS name.
    Var(String),
    Const(ConstValue),
    Type(Type),
}

/// Per-function lowering state.
#[derive(Debug, Default)]
struct FuncState {
    generator: bool,
    results: Vec<Type>,
    /// JS names of the result variables, when results are named or the
    /// function has a defer frame.
    result_vars: Option<Vec<String>>,
    frame: bool,
    /// Whether the activation is a Go function that a defer frame may call
    /// with an unwind token, and whether its body calls `recover`.
    takes_unwind: bool,
    recovers: bool,
    /// Labels of enclosing loops, the valid `continue` targets.
    loop_labels: HashSet<String>,
}

struct Lowerer<'a> {
    pkg: &'a TypedPackage,
    files: &'a [File],
    blocking: Blocking,
    blocking_keys: BTreeSet<String>,
    /// JS variable holding each imported package, by path.
    aliases: BTreeMap<String, String>,
    /// Folded package-level constants.
    consts: HashMap<String, ConstValue>,
    /// Package-level type aliases.
    type_aliases: HashMap<String, Type>,
    globals: HashSet<String>,
    /// Index of the file being lowered, for import resolution and errors.
    file: usize,
    scopes: Vec<HashMap<String, Binding>>,
    funcs: Vec<FuncState>,
    temps: usize,
    renames: usize,
    /// Value of `iota` inside the constant declaration being lowered.
    iota: Option<i128>,
}

impl<'a> Lowerer<'a> {
    fn new(pkg: &'a TypedPackage, files: &'a [File], blocking: Blocking) -> Self {
        let mut aliases = BTreeMap::new();
        let mut taken = HashSet::new();
        for path in pkg.deps.keys().filter(|p| p.as_str() != "unsafe") {
            let last = path.rsplit('/').next().unwrap_or(path);
            let base: String = last
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
                .collect();
            let mut alias = format!("$pkg_{base}");
            let mut n = 1;
            while !taken.insert(alias.clone()) {
                alias = format!("$pkg_{base}${n}");
                n += 1;
            }
            aliases.insert(path.clone(), alias);
        }
        Self {
            pkg,
            files,
            blocking_keys: blocking.funcs().clone(),
            blocking,
            aliases,
            consts: HashMap::new(),
            type_aliases: HashMap::new(),
            globals: HashSet::new(),
            file: 0,
            scopes: Vec::new(),
            funcs: Vec::new(),
            temps: 0,
            renames: 0,
            iota: None,
        }
    }

    pub(super) fn package_ref(&self, path: &str) -> Expr {
        match self.aliases.get(path) {
            Some(alias) => Expr::ident(alias.clone()),
            None => Expr::index(Expr::ident("$packages"), Expr::string(path)),
        }
    }

    fn error(&self, pos: Pos, construct: impl Into<String>) -> GenerationError {
        let file = self.files.get(self.file).map(|f| f.path.as_str()).unwrap_or("");
        GenerationError::new(file, pos, construct)
    }

    fn resolve(&self, ty: &TypeExpr) -> Type {
        resolve_type(self, ty, &[])
    }

    fn type_of(&self, e: &GoExpr) -> Type {
        self.pkg.info.type_of(e.id).clone()
    }

    /// Declarations of every file, with the index of their file.
    fn decls(&self) -> Vec<(usize, &'a Decl)> {
        let files: &'a [File] = self.files;
        files
            .iter()
            .enumerate()
            .flat_map(|(i, f)| f.decls.iter().map(move |d| (i, d)))
            .collect()
    }

    // ========================================================================
    // Scopes
    // ========================================================================

    fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn lookup(&self, name: &str) -> Option<&Binding> {
        self.scopes.iter().rev().find_map(|s| s.get(name))
    }

    fn in_current_scope(&self, name: &str) -> bool {
        self.scopes.last().is_some_and(|s| s.contains_key(name))
    }

    /// Declare a local variable and return its JS name. Names that would
    /// shadow a visible declaration get a numeric suffix, so closures keep
    /// referring to the variable they captured.
    fn declare_var(&mut self, name: &str) -> String {
        let mut js_name = js::mangle(name);
        let visible = self.lookup(name).is_some()
            || self.globals.contains(name)
            || self.scopes.iter().flat_map(|s| s.values()).any(
                |b| matches!(b, Binding::Var(existing) if *existing == js_name),
            );
        if visible {
            self.renames += 1;
            js_name = format!("{js_name}${}", self.renames);
        }
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), Binding::Var(js_name.clone()));
        }
        js_name
    }

    fn declare(&mut self, name: &str, binding: Binding) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), binding);
        }
    }

    fn temp(&mut self) -> String {
        self.temps += 1;
        format!("$t{}", self.temps)
    }

    fn in_generator(&self) -> bool {
        self.funcs.last().is_some_and(|f| f.generator)
    }

    fn lookup_const(&self, name: &str) -> Option<ConstValue> {
        if let Some(binding) = self.lookup(name) {
            return match binding {
                Binding::Const(v) => Some(v.clone()),
                _ => None,
            };
        }
        self.consts.get(name).cloned()
    }

    fn import_name(&self, spec: &golower_syntax::ImportSpec) -> String {
        match (&spec.name, self.pkg.deps.get(&spec.path)) {
            (None, Some(dep)) if !dep.name.is_empty() => dep.name.clone(),
            _ => spec.local_name(),
        }
    }

    // ========================================================================
    // Package assembly
    // ========================================================================

    fn package(&mut self) -> Result<Vec<Stmt>, GenerationError> {
        let mut out = vec![Stmt::var_decl("$pkg", Some(Expr::object(Vec::new())))];
        for (path, alias) in &self.aliases {
            out.push(Stmt::var_decl(
                alias.clone(),
                Some(Expr::index(Expr::ident("$packages"), Expr::string(path.clone()))),
            ));
        }

        let decls = self.decls();
        for (_, decl) in &decls {
            for name in decl.names() {
                if name != "_" && name != "init" {
                    self.globals.insert(name.to_string());
                }
            }
        }
        for (file, decl) in &decls {
            if let Decl::Type(spec) = decl
                && spec.alias
            {
                self.file = *file;
                let ty = self.resolve(&spec.ty);
                self.type_aliases.insert(spec.name.clone(), ty);
            }
        }
        self.fold_package_consts(&decls);

        for (file, decl) in &decls {
            if let Decl::Type(spec) = decl {
                self.file = *file;
                out.extend(self.type_decl(spec)?);
            }
        }
        for (file, decl) in &decls {
            if let Decl::Const(spec) = decl {
                self.file = *file;
                out.extend(self.unfolded_consts(spec)?);
            }
        }
        for (_, decl) in &decls {
            if let Decl::Var(spec) = decl {
                for name in spec.names.iter().filter(|n| *n != "_") {
                    let ty = self.pkg.export.vars.get(name).cloned().unwrap_or(Type::Invalid);
                    out.push(Stmt::var_decl(js::mangle(name), Some(self.zero(&ty))));
                }
            }
        }

        let mut inits = Vec::new();
        for (file, decl) in &decls {
            if let Decl::Func(func) = decl
                && func.recv.is_none()
                && func.name != "_"
            {
                self.file = *file;
                let name = if func.name == "init" {
                    let name = match inits.len() {
                        0 => "init".to_string(),
                        n => format!("init${n}"),
                    };
                    inits.push(name.clone());
                    name
                } else {
                    js::mangle(&func.name)
                };
                out.push(self.func_decl(func, name)?);
            }
        }
        for (file, decl) in &decls {
            if let Decl::Func(func) = decl
                && func.recv.is_some()
            {
                self.file = *file;
                out.extend(self.method_decl(func)?);
            }
        }
        for (_, decl) in &decls {
            if let Decl::Type(spec) = decl
                && !spec.alias
            {
                out.extend(self.promoted_methods(&spec.name));
            }
        }

        out.extend(self.exports(&decls));
        let init = self.init_function(&decls, &inits)?;
        out.push(Stmt::assign(
            Expr::member(Expr::ident("$pkg"), "$init"),
            Expr::function(init),
        ));
        out.push(Stmt::return_stmt(Some(Expr::ident("$pkg"))));
        Ok(out)
    }

    /// Fold package-level constants. Constants may refer to ones declared
    /// later, so passes repeat until nothing new folds.
    fn fold_package_consts(&mut self, decls: &[(usize, &Decl)]) {
        loop {
            let mut progress = false;
            for (file, decl) in decls {
                let Decl::Const(spec) = decl else { continue };
                self.file = *file;
                for (i, name) in spec.names.iter().enumerate() {
                    if name == "_" || self.consts.contains_key(name) {
                        continue;
                    }
                    if let Some(value) = self.const_spec_value(spec, i) {
                        self.consts.insert(name.clone(), value);
                        progress = true;
                    }
                }
            }
            if !progress {
                break;
            }
        }
    }

    /// Value of the `i`th constant of a spec, converted to its declared
    /// type.
    fn const_spec_value(&mut self, spec: &ValueSpec, i: usize) -> Option<ConstValue> {
        let value = spec.values.get(i)?;
        self.iota = Some(i128::from(spec.iota));
        let folded = self.const_value(value);
        self.iota = None;
        let folded = folded?;
        match spec.ty.as_ref().map(|t| self.resolve(t)) {
            Some(ty) => match self.basic_of(&ty) {
                Some(kind) => folded.convert(kind),
                None => Some(folded),
            },
            None => Some(folded),
        }
    }

    /// Constants whose value could not be computed at compile time are
    /// evaluated when the package loads.
    fn unfolded_consts(&mut self, spec: &ValueSpec) -> Result<Vec<Stmt>, GenerationError> {
        let mut out = Vec::new();
        for (i, name) in spec.names.iter().enumerate() {
            if name == "_" || self.consts.contains_key(name) {
                continue;
            }
            let Some(value) = spec.values.get(i) else {
                return Err(self.error(spec.pos, format!("constant {name} without a value")));
            };
            let ty = self.pkg.export.consts.get(name).cloned().unwrap_or(Type::Invalid);
            self.iota = Some(i128::from(spec.iota));
            let lowered = self.value(value, &ty);
            self.iota = None;
            out.push(Stmt::var_decl(js::mangle(name), Some(lowered?)));
        }
        Ok(out)
    }

    // ========================================================================
    // Types
    // ========================================================================

    fn type_decl(&mut self, spec: &TypeSpec) -> Result<Vec<Stmt>, GenerationError> {
        if !spec.type_params.is_empty() {
            return Err(self.error(spec.pos, format!("generic type {}", spec.name)));
        }
        if spec.alias || spec.name == "_" {
            return Ok(Vec::new());
        }
        let Some(def) = self.pkg.export.types.get(&spec.name) else {
            return Ok(Vec::new());
        };
        let name = js::mangle(&spec.name);
        let qualified = self.qualified_name(&def.pkg, &def.name);
        let this = || Expr::ident("this");

        let out = match &def.underlying {
            Type::Struct(fields) => {
                let params: Vec<String> = fields
                    .iter()
                    .enumerate()
                    .map(|(i, f)| match f.name.as_str() {
                        "_" => format!("$blank{i}"),
                        n => js::mangle(n),
                    })
                    .collect();
                let mut zeroed: Vec<Stmt> = fields
                    .iter()
                    .enumerate()
                    .map(|(i, f)| {
                        Stmt::assign(Expr::member(this(), field_property(&f.name, i)), self.zero(&f.ty))
                    })
                    .collect();
                zeroed.push(Stmt::return_stmt(None));
                let mut body = vec![Stmt::if_stmt(
                    Expr::binary(
                        Expr::member(Expr::ident("arguments"), "length"),
                        js::BinaryOp::Eq,
                        Expr::number(0),
                    ),
                    Stmt::block(zeroed),
                    None,
                )];
                for (i, (f, param)) in fields.iter().zip(&params).enumerate() {
                    body.push(Stmt::assign(
                        Expr::member(this(), field_property(&f.name, i)),
                        Expr::ident(param.clone()),
                    ));
                }
                let copied = fields
                    .iter()
                    .enumerate()
                    .map(|(i, f)| self.copy_value(Expr::member(this(), field_property(&f.name, i)), &f.ty))
                    .collect();
                let copy = Function::anonymous(
                    Vec::new(),
                    vec![Stmt::return_stmt(Some(Expr::new_(Expr::ident(name.clone()), copied)))],
                );
                vec![
                    Stmt::Function(Function::new(name.clone(), params, body)),
                    Stmt::expr(Expr::helper(
                        "$defineType",
                        vec![Expr::ident(name.clone()), Expr::string(qualified), Expr::string("struct")],
                    )),
                    Stmt::assign(
                        Expr::member(Expr::member(Expr::ident(name), "prototype"), "$copy"),
                        Expr::function(copy),
                    ),
                ]
            }
            Type::Interface(methods) => vec![Stmt::var_decl(
                name,
                Some(Expr::helper(
                    "$iface",
                    vec![method_names(methods), Expr::string(qualified)],
                )),
            )],
            _ => {
                let ctor = Function::new(
                    name.clone(),
                    vec!["v".into()],
                    vec![Stmt::assign(Expr::member(this(), "$val"), Expr::ident("v"))],
                );
                vec![
                    Stmt::Function(ctor),
                    Stmt::expr(Expr::helper(
                        "$defineType",
                        vec![Expr::ident(name.clone()), Expr::string(qualified.clone()), Expr::string("named")],
                    )),
                    Stmt::expr(Expr::helper(
                        "$ptrType",
                        vec![Expr::ident(name), Expr::string(format!("*{qualified}"))],
                    )),
                ]
            }
        };
        Ok(out)
    }

    // ========================================================================
    // Functions and methods
    // ========================================================================

    fn func_decl(&mut self, func: &FuncDecl, name: String) -> Result<Stmt, GenerationError> {
        if !func.type_params.is_empty() {
            return Err(self.error(func.pos, format!("generic function {}", func.name)));
        }
        let Some(body) = &func.body else {
            return Ok(Stmt::Function(self.native_binding(func, name)));
        };
        let sig = self.pkg.export.funcs.get(&func.name).cloned().unwrap_or_else(|| {
            self.pkg.resolve_signature(&func.sig, &[], &self.files[self.file].imports)
        });
        let generator = self.blocking.is_func(&func.key());
        let mut lowered = self.lower_function(&func.sig, &sig, body, generator, None)?;
        lowered.name = name;
        Ok(Stmt::Function(lowered))
    }

    /// A function declared without a body forwards to the native one the
    /// package's `.inc.js` registers as `$natives[path][key]`. Calling it
    /// panics when nothing was registered.
    fn native_binding(&self, func: &FuncDecl, name: String) -> Function {
        let key = func.key();
        let generator = self.blocking.is_func(&key);
        let native = Expr::helper(
            "$native",
            vec![Expr::string(self.pkg.export.path.clone()), Expr::string(key)],
        );
        let call = Expr::call(
            Expr::member(native, "apply"),
            vec![Expr::ident("this"), Expr::ident("arguments")],
        );
        let result = if generator {
            Expr::yield_star(Expr::helper("$maybe", vec![call]))
        } else {
            call
        };
        Function::new(name, Vec::new(), vec![Stmt::return_stmt(Some(result))]).generator(generator)
    }

    fn method_decl(&mut self, func: &FuncDecl) -> Result<Vec<Stmt>, GenerationError> {
        let Some(recv) = &func.recv else {
            return Ok(Vec::new());
        };
        if !recv.type_args.is_empty() || !func.type_params.is_empty() {
            return Err(self.error(func.pos, format!("method {} of a generic type", func.key())));
        }
        let Some(def) = self.pkg.export.types.get(&recv.type_name) else {
            return Err(self.error(func.pos, format!("method {} of an unknown type", func.key())));
        };
        let owner = Expr::ident(js::mangle(&recv.type_name));
        let prop = js::mangle_property(&func.name);
        let ty = Type::named(def.pkg.clone(), def.name.clone());
        let boxed = self.is_boxed_named(&ty);
        let prototype = if boxed && recv.pointer {
            Expr::member(Expr::member(owner.clone(), "$ptr"), "prototype")
        } else {
            Expr::member(owner.clone(), "prototype")
        };
        let target = Expr::member(prototype, prop.clone());

        let Some(body) = &func.body else {
            return Ok(vec![Stmt::assign(
                target,
                Expr::function(self.native_binding(func, String::new())),
            )]);
        };
        let sig = def
            .method(&func.name)
            .map(|m| m.sig.clone())
            .unwrap_or_else(|| self.pkg.resolve_signature(&func.sig, &[], &self.files[self.file].imports));
        let this = Expr::ident("this");
        let receiver_value = match (boxed, recv.pointer) {
            (true, false) => Expr::member(this, "$val"),
            (false, false) if matches!(def.underlying, Type::Struct(_)) => {
                Expr::call(Expr::member(this, "$copy"), Vec::new())
            }
            _ => this,
        };
        let generator = self.blocking.is_func(&func.key());
        let receiver = recv.name.as_deref().map(|n| (n, receiver_value));
        let method = self.lower_function(&func.sig, &sig, body, generator, receiver)?;
        let mut out = vec![Stmt::assign(target, Expr::function(method))];

        if boxed && !recv.pointer {
            // Pointers to a boxed type reach its value methods through a
            // fresh box of the pointee.
            let call = Expr::call(
                Expr::member(
                    Expr::new_(owner.clone(), vec![Expr::call(Expr::member(Expr::ident("this"), "$get"), Vec::new())]),
                    prop.clone(),
                ),
                vec![Expr::spread(Expr::ident("args"))],
            );
            let result = if generator { Expr::yield_star(call) } else { call };
            let forward = Function::anonymous(vec!["...args".into()], vec![Stmt::return_stmt(Some(result))])
                .generator(generator);
            out.push(Stmt::assign(
                Expr::member(Expr::member(Expr::member(owner, "$ptr"), "prototype"), prop),
                Expr::function(forward),
            ));
        }
        Ok(out)
    }

    // ========================================================================
    // Promoted methods
    // ========================================================================

    /// Forwarding methods for methods promoted from embedded fields.
    fn promoted_methods(&mut self, type_name: &str) -> Vec<Stmt> {
        let Some(def) = self.pkg.export.types.get(type_name) else {
            return Vec::new();
        };
        let Type::Struct(fields) = &def.underlying else {
            return Vec::new();
        };
        let owner = js::mangle(type_name);
        let mut out = Vec::new();
        for promotion in self.promotions(fields, def.methods.iter().map(|m| m.name.clone()).collect()) {
            let (call, blocks) = self.promoted_call(&promotion);
            let result = if blocks {
                Expr::yield_star(Expr::helper("$maybe", vec![call]))
            } else {
                call
            };
            if blocks {
                self.blocking_keys.insert(format!("{type_name}.{}", promotion.method));
            }
            let forward = Function::anonymous(vec!["...args".into()], vec![Stmt::return_stmt(Some(result))])
                .generator(blocks);
            out.push(Stmt::assign(
                Expr::member(
                    Expr::member(Expr::ident(owner.clone()), "prototype"),
                    js::mangle_property(&promotion.method),
                ),
                Expr::function(forward),
            ));
        }
        out
    }

    /// Methods reachable through embedded fields, shallowest first. Names
    /// found twice at the same depth are ambiguous in Go and never used, so
    /// taking the first is enough.
    fn promotions(&self, fields: &[StructField], declared: HashSet<String>) -> Vec<Promotion> {
        let mut seen = declared;
        let mut out = Vec::new();
        let mut level: Vec<Vec<StructField>> =
            fields.iter().filter(|f| f.embedded).map(|f| vec![f.clone()]).collect();
        for _ in 0..MAX_PROMOTION_DEPTH {
            let mut next = Vec::new();
            let mut found = Vec::new();
            for path in &level {
                let Some(last) = path.last() else { continue };
                let (base, pointer) = match &last.ty {
                    Type::Pointer(inner) => (inner.as_ref().clone(), true),
                    other => (other.clone(), false),
                };
                let methods: Vec<(String, Via)> = match &base {
                    Type::Named { pkg, name } if pkg.is_empty() && name == "error" => universe::error_methods()
                        .into_iter()
                        .map(|m| (m.name, Via::Interface))
                        .collect(),
                    Type::Named { pkg, name } => match self.pkg.named_def(pkg, name) {
                        Some(embedded) => {
                            let mut methods: Vec<(String, Via)> = embedded
                                .methods
                                .iter()
                                .map(|m| {
                                    let via = Via::Named {
                                        pkg: pkg.clone(),
                                        name: name.clone(),
                                        pointer,
                                        pointer_recv: m.pointer_recv,
                                    };
                                    (m.name.clone(), via)
                                })
                                .collect();
                            match &embedded.underlying {
                                Type::Struct(inner) => next.extend(inner.iter().filter(|f| f.embedded).map(|f| {
                                    let mut longer = path.clone();
                                    longer.push(f.clone());
                                    longer
                                })),
                                Type::Interface(iface) => {
                                    methods.extend(iface.iter().map(|m| (m.name.clone(), Via::Interface)))
                                }
                                _ => {}
                            }
                            methods
                        }
                        None => Vec::new(),
                    },
                    _ => Vec::new(),
                };
                for (method, via) in methods {
                    if !seen.contains(&method) {
                        found.push(Promotion {
                            method,
                            path: path.clone(),
                            via,
                        });
                    }
                }
            }
            for promotion in found {
                if seen.insert(promotion.method.clone()) {
                    out.push(promotion);
                }
            }
            if next.is_empty() {
                break;
            }
            level = next;
        }
        out
    }

    /// The forwarded call and whether it may block.
    fn promoted_call(&self, promotion: &Promotion) -> (Expr, bool) {
        let Some((last, init)) = promotion.path.split_last() else {
            return (Expr::undefined(), false);
        };
        let parent = init
            .iter()
            .fold(Expr::ident("this"), |obj, f| Expr::member(obj, js::mangle_property(&f.name)));
        let field = js::mangle_property(&last.name);
        let method = js::mangle_property(&promotion.method);
        let args = vec![Expr::spread(Expr::ident("args"))];
        match &promotion.via {
            Via::Interface => {
                let call = Expr::call(Expr::member(Expr::member(parent, field), method), args);
                let blocks = self
                    .blocking
                    .callee_blocks(self.pkg, &blocking::Callee::Iface(promotion.method.clone()));
                (call, blocks)
            }
            Via::Named {
                pkg,
                name,
                pointer,
                pointer_recv,
            } => {
                let ty = Type::named(pkg.clone(), name.clone());
                let receiver = if *pointer || !self.is_boxed_named(&ty) {
                    Expr::member(parent, field)
                } else if *pointer_recv {
                    Expr::helper(
                        "$fieldPtr",
                        vec![parent, Expr::string(field), Expr::member(self.type_ref(pkg, name), "$ptr")],
                    )
                } else {
                    Expr::new_(self.type_ref(pkg, name), vec![Expr::member(parent, field)])
                };
                let key = format!("{name}.{}", promotion.method);
                let blocks = if *pkg == self.pkg.export.path {
                    self.blocking_keys.contains(&key)
                } else {
                    self.pkg.deps.get(pkg).is_some_and(|d| d.is_blocking(&key))
                };
                (Expr::call(Expr::member(receiver, method), args), blocks)
            }
        }
    }

    // ========================================================================
    // Exports and initialisation
    // ========================================================================

    fn exports(&self, decls: &[(usize, &Decl)]) -> Vec<Stmt> {
        let pkg = || Expr::ident("$pkg");
        let mut out = Vec::new();
        for (_, decl) in decls {
            match decl {
                Decl::Func(f) if f.recv.is_none() && (is_exported(&f.name) || f.name == "main") => {
                    out.push(Stmt::assign(
                        Expr::member(pkg(), js::mangle_property(&f.name)),
                        Expr::ident(js::mangle(&f.name)),
                    ));
                }
                Decl::Type(t) if !t.alias && self.pkg.export.types.contains_key(&t.name) => {
                    out.push(Stmt::assign(
                        Expr::member(pkg(), js::mangle_property(&t.name)),
                        Expr::ident(js::mangle(&t.name)),
                    ));
                }
                Decl::Const(spec) => {
                    for name in spec.names.iter().filter(|n| is_exported(n)) {
                        let value = match self.consts.get(name) {
                            Some(v) => v.to_js(),
                            None => Expr::ident(js::mangle(name)),
                        };
                        out.push(Stmt::assign(Expr::member(pkg(), js::mangle_property(name)), value));
                    }
                }
                Decl::Var(spec) => {
                    for name in spec.names.iter().filter(|n| is_exported(n)) {
                        let var = js::mangle(name);
                        let get = Function::arrow(Vec::new(), vec![Stmt::return_stmt(Some(Expr::ident(var.clone())))]);
                        let set = Function::arrow(
                            vec!["$v".into()],
                            vec![Stmt::assign(Expr::ident(var), Expr::ident("$v"))],
                        );
                        out.push(Stmt::expr(Expr::helper(
                            "$exportVar",
                            vec![
                                pkg(),
                                Expr::string(js::mangle_property(name)),
                                Expr::function(get),
                                Expr::function(set),
                            ],
                        )));
                    }
                }
                _ => {}
            }
        }
        out
    }

    /// `$pkg.$init`: package variables in dependency order, then the
    /// `init` functions in source order.
    fn init_function(&mut self, decls: &[(usize, &'a Decl)], inits: &[String]) -> Result<Function, GenerationError> {
        self.funcs.push(FuncState {
            generator: true,
            ..FuncState::default()
        });
        self.push_scope();
        let mut body = Vec::new();
        for (file, spec) in self.init_order(decls) {
            self.file = file;
            body.extend(self.package_var_init(spec)?);
        }
        let init_blocks = self.blocking.is_func("init");
        for name in inits {
            let call = Expr::call(Expr::ident(name.clone()), Vec::new());
            body.push(Stmt::expr(if init_blocks { Expr::yield_star(call) } else { call }));
        }
        self.pop_scope();
        self.funcs.pop();
        Ok(Function::anonymous(Vec::new(), body).generator(true))
    }

    fn package_var_init(&mut self, spec: &ValueSpec) -> Result<Vec<Stmt>, GenerationError> {
        let var_type = |l: &Self, name: &str| l.pkg.export.vars.get(name).cloned().unwrap_or(Type::Invalid);
        let mut out = Vec::new();
        if spec.values.len() == spec.names.len() {
            for (name, value) in spec.names.iter().zip(&spec.values) {
                if name == "_" {
                    out.push(Stmt::expr(self.expr(value)?));
                } else {
                    let ty = var_type(self, name);
                    let lowered = self.value(value, &ty)?;
                    out.push(Stmt::assign(Expr::ident(js::mangle(name)), lowered));
                }
            }
        } else if let [value] = spec.values.as_slice() {
            let tuple = self.tuple(value)?;
            let t = self.temp();
            out.push(Stmt::const_decl(t.clone(), tuple));
            for (i, name) in spec.names.iter().enumerate().filter(|(_, n)| *n != "_") {
                out.push(Stmt::assign(
                    Expr::ident(js::mangle(name)),
                    Expr::index(Expr::ident(t.clone()), Expr::number(i as f64)),
                ));
            }
        }
        Ok(out)
    }

    /// Variable declarations ordered so each initialiser runs after the
    /// variables it refers to, directly or through the functions it calls.
    /// Among the ready declarations the earliest wins; a cycle falls back
    /// to declaration order.
    fn init_order(&self, decls: &[(usize, &'a Decl)]) -> Vec<(usize, &'a ValueSpec)> {
        let mut func_refs: HashMap<String, References> = HashMap::new();
        for (_, decl) in decls {
            if let Decl::Func(f) = decl
                && let Some(body) = &f.body
            {
                let mut refs = References::new(self.pkg);
                visit::walk_block(&mut refs, body);
                func_refs.insert(f.key(), refs);
            }
        }
        let mut pending: Vec<(usize, &'a ValueSpec, BTreeSet<String>)> = Vec::new();
        for (file, decl) in decls {
            let Decl::Var(spec) = decl else { continue };
            if spec.values.is_empty() {
                continue;
            }
            let mut refs = References::new(self.pkg);
            for value in &spec.values {
                refs.visit_expr(value);
            }
            let mut vars = refs.vars.clone();
            let mut stack: Vec<String> = refs.funcs.iter().cloned().collect();
            let mut visited = HashSet::new();
            while let Some(key) = stack.pop() {
                if !visited.insert(key.clone()) {
                    continue;
                }
                if let Some(r) = func_refs.get(&key) {
                    vars.extend(r.vars.iter().cloned());
                    stack.extend(r.funcs.iter().cloned());
                }
            }
            for name in &spec.names {
                vars.remove(name);
            }
            pending.push((*file, spec, vars));
        }

        let mut order = Vec::new();
        while !pending.is_empty() {
            let waiting: HashSet<&str> = pending
                .iter()
                .flat_map(|(_, spec, _)| spec.names.iter().map(String::as_str))
                .collect();
            let ready = pending
                .iter()
                .position(|(_, _, deps)| deps.iter().all(|d| !waiting.contains(d.as_str())))
                .unwrap_or(0);
            let (file, spec, _) = pending.remove(ready);
            order.push((file, spec));
        }
        order
    }
}

/// A method reachable through an embedded field.
#[derive(Debug, Clone)]
struct Promotion {
    method: String,
    /// Embedded fields from the outer struct to the one holding the method.
    path: Vec<StructField>,
    via: Via,
}

#[derive(Debug, Clone)]
enum Via {
    Interface,
    Named {
        pkg: String,
        name: String,
        /// The embedded field is a pointer.
        pointer: bool,
        pointer_recv: bool,
    },
}

/// Package-level variables and functions an expression refers to.
struct References<'p> {
    pkg: &'p TypedPackage,
    vars: BTreeSet<String>,
    funcs: BTreeSet<String>,
}

impl<'p> References<'p> {
    fn new(pkg: &'p TypedPackage) -> Self {
        Self {
            pkg,
            vars: BTreeSet::new(),
            funcs: BTreeSet::new(),
        }
    }
}

impl Visitor for References<'_> {
    fn visit_expr(&mut self, expr: &GoExpr) {
        match &expr.kind {
            ExprKind::Ident(name) => match self.pkg.info.uses.get(&expr.id) {
                Some(Object::Var { package_level: true }) => {
                    self.vars.insert(name.clone());
                }
                Some(Object::Func) => {
                    self.funcs.insert(name.clone());
                }
                _ => {}
            },
            ExprKind::Selector { sel, .. } => {
                if let Some(Selection::Method {
                    recv: Some((pkg, ty)), ..
                }) = self.pkg.info.selections.get(&expr.id)
                    && *pkg == self.pkg.export.path
                {
                    self.funcs.insert(format!("{ty}.{sel}"));
                }
            }
            _ => {}
        }
        visit::walk_expr(self, expr);
    }
}

impl TypeEnv for Lowerer<'_> {
    fn lookup_type(&self, name: &str) -> Option<Type> {
        if let Some(binding) = self.lookup(name) {
            return match binding {
                Binding::Type(ty) => Some(ty.clone()),
                _ => None,
            };
        }
        if let Some(ty) = self.type_aliases.get(name) {
            return Some(ty.clone());
        }
        self.pkg
            .export
            .types
            .get(name)
            .map(|def| Type::named(def.pkg.clone(), def.name.clone()))
    }

    fn import_path(&self, qualifier: &str) -> Option<String> {
        let file = self.files.get(self.file)?;
        file.imports
            .iter()
            .find(|spec| self.import_name(spec) == qualifier)
            .map(|spec| spec.path.clone())
    }

    fn underlying(&self, ty: &Type) -> Option<Type> {
        match self.under(ty) {
            Type::Invalid => None,
            under => Some(under),
        }
    }

    fn const_int(&self, name: &str) -> Option<i64> {
        self.lookup_const(name)
            .and_then(|v| v.as_int())
            .and_then(|n| i64::try_from(n).ok())
    }
}

fn is_exported(name: &str) -> bool {
    name.chars().next().is_some_and(char::is_uppercase)
}

fn method_names(methods: &[Method]) -> Expr {
    Expr::array(
        methods
            .iter()
            .map(|m| Expr::string(js::mangle_property(&m.name)))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::JsWriter;
    use golower_syntax::parse_file;
    use golower_types::{LenientChecker, MapImporter, TypeOracle};

    pub(super) fn compile(src: &str) -> String {
        let file = parse_file("main.go", src).unwrap();
        let files = vec![file];
        let pkg = LenientChecker
            .check("example.com/main", &files, &mut MapImporter::new())
            .unwrap();
        let lowered = lower_package(&pkg, &files).unwrap();
        JsWriter::emit(&lowered.program, false)
    }

    pub(super) fn compile_err(src: &str) -> String {
        let file = parse_file("main.go", src).unwrap();
        let files = vec![file];
        let pkg = LenientChecker
            .check("example.com/main", &files, &mut MapImporter::new())
            .unwrap();
        lower_package(&pkg, &files).unwrap_err().to_string()
    }

    #[test]
    fn test_package_wrapper() {
        let js = compile("package main\n\nfunc main() {}\n");
        assert!(js.starts_with("$packages[\"example.com/main\"] = (function() {"));
        assert!(js.contains("var $pkg = {};"));
        assert!(js.contains("function main() {"));
        assert!(js.contains("$pkg.main = main;"));
        assert!(js.contains("$pkg.$init = function*() {"));
        assert!(js.contains("return $pkg;"));
    }

    #[test]
    fn test_bodyless_functions_bind_natives() {
        let js = compile(
            "package main\n\n//golower:blocking\nfunc sleep(ms int)\n\nfunc now() int\n\nfunc main() {\n\tsleep(now())\n}\n",
        );
        assert!(js.contains("function* sleep() {"), "{js}");
        assert!(
            js.contains("$maybe($native(\"example.com/main\", \"sleep\").apply(this, arguments))"),
            "{js}"
        );
        assert!(
            js.contains("return $native(\"example.com/main\", \"now\").apply(this, arguments);"),
            "{js}"
        );
        assert!(js.contains("function* main() {"), "{js}");
        assert!(js.contains("yield* sleep(now());"), "{js}");
    }

    #[test]
    fn test_struct_type_declaration() {
        let js = compile(
            "package main\n\ntype Point struct {\n\tX, Y int\n\tname string\n}\n\nfunc main() {}\n",
        );
        assert!(js.contains("function Point(X, Y, name) {"));
        assert!(js.contains("if ((arguments.length === 0)) {"));
        assert!(js.contains("this.name = \"\";"));
        assert!(js.contains("$defineType(Point, \"main.Point\", \"struct\");"));
        assert!(js.contains("Point.prototype.$copy = function() {"));
        assert!(js.contains("return new Point(this.X, this.Y, this.name);"));
        assert!(js.contains("$pkg.Point = Point;"));
    }

    #[test]
    fn test_named_basic_type_and_methods() {
        let js = compile(
            "package main\n\ntype Celsius float64\n\nfunc (c Celsius) F() float64 { return float64(c)*9/5 + 32 }\n\nfunc (c *Celsius) Set(v float64) { *c = Celsius(v) }\n\nfunc main() {}\n",
        );
        assert!(js.contains("function Celsius(v) {"));
        assert!(js.contains("$ptrType(Celsius, \"*main.Celsius\");"));
        assert!(js.contains("Celsius.prototype.F = function() {"));
        assert!(js.contains("let c = this.$val;"));
        assert!(js.contains("Celsius.$ptr.prototype.Set = function(v) {"));
        assert!(js.contains("Celsius.$ptr.prototype.F = function(...args) {"));
        assert!(js.contains("$store(c, v);"));
    }

    #[test]
    fn test_interface_declaration() {
        let js = compile(
            "package main\n\ntype Shape interface {\n\tArea() float64\n\tPerimeter() float64\n}\n\nfunc main() {}\n",
        );
        assert!(js.contains("var Shape = $iface([\"Area\", \"Perimeter\"], \"main.Shape\");"));
    }

    #[test]
    fn test_constants_fold_and_export() {
        let js = compile(
            "package main\n\nconst (\n\tA = iota * 10\n\tB\n\tBig = 1 << 40\n\tsmall = Big >> 38\n)\n\nvar X = small + B\n\nfunc main() {}\n",
        );
        assert!(js.contains("$pkg.A = 0;"));
        assert!(js.contains("$pkg.B = 10;"));
        assert!(js.contains("$pkg.Big = 1099511627776;"));
        assert!(js.contains("X = 14;"));
        assert!(js.contains("$exportVar($pkg, \"X\", () => X, ($v) => {"));
    }

    #[test]
    fn test_var_initialisers_follow_dependencies() {
        let js = compile(
            "package main\n\nvar a = b + 1\nvar b = f()\n\nfunc f() int { return c }\n\nvar c = 3\n\nfunc main() {}\n",
        );
        let c = js.find("c = 3;").unwrap();
        let b = js.find("b = f();").unwrap();
        let a = js.find("a = ((b + 1) | 0);").unwrap();
        assert!(c < b && b < a);
    }

    #[test]
    fn test_multiple_init_functions() {
        let js = compile(
            "package main\n\nvar n int\n\nfunc init() { n++ }\nfunc init() { n++ }\n\nfunc main() {}\n",
        );
        assert!(js.contains("function init() {"));
        assert!(js.contains("function init$1() {"));
        assert!(js.contains("init();"));
        assert!(js.contains("init$1();"));
    }

    #[test]
    fn test_promoted_methods_forward() {
        let js = compile(
            "package main\n\ntype Base struct{ id int }\n\nfunc (b *Base) ID() int { return b.id }\n\ntype Derived struct {\n\tBase\n\tname string\n}\n\nfunc main() {}\n",
        );
        assert!(js.contains("Derived.prototype.ID = function(...args) {"));
        assert!(js.contains("return this.Base.ID(...args);"));
    }

    #[test]
    fn test_generic_function_is_rejected() {
        let err = compile_err("package main\n\nfunc Map[T any](x T) T { return x }\n\nfunc main() {}\n");
        assert!(err.contains("cannot compile generic function Map"), "{err}");
    }
}
