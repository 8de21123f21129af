//! Checked packages: exported metadata plus per-expression type information.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use golower_syntax::{ExprId, ImportSpec, Signature};

use crate::resolve::{TypeEnv, resolve_signature};
use crate::types::{FuncType, NamedDef, Type};

/// Everything a dependent package needs to know about a compiled package.
///
/// Persisted inside archives, so a cached package can be imported without
/// re-reading its sources.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportData {
    pub path: String,
    pub name: String,
    pub types: BTreeMap<String, NamedDef>,
    pub funcs: BTreeMap<String, FuncType>,
    pub vars: BTreeMap<String, Type>,
    pub consts: BTreeMap<String, Type>,
    pub imports: Vec<String>,
    /// Functions (`Name`) and methods (`Type.Name`) that may suspend.
    pub blocking: BTreeSet<String>,
}

impl ExportData {
    pub fn new(path: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn is_blocking(&self, key: &str) -> bool {
        self.blocking.contains(key)
    }

    /// Type of the package-level object `name`, if any.
    pub fn member(&self, name: &str) -> Option<Member> {
        if let Some(def) = self.types.get(name) {
            return Some(Member::Type(Type::named(&def.pkg, &def.name)));
        }
        if let Some(sig) = self.funcs.get(name) {
            return Some(Member::Func(sig.clone()));
        }
        if let Some(ty) = self.vars.get(name) {
            return Some(Member::Var(ty.clone()));
        }
        self.consts.get(name).map(|ty| Member::Const(ty.clone()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Member {
    Type(Type),
    Func(FuncType),
    Var(Type),
    Const(Type),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Append,
    Cap,
    Clear,
    Close,
    Complex,
    Copy,
    Delete,
    Imag,
    Len,
    Make,
    Max,
    Min,
    New,
    Panic,
    Print,
    Println,
    Real,
    Recover,
}

impl Builtin {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "append" => Builtin::Append,
            "cap" => Builtin::Cap,
            "clear" => Builtin::Clear,
            "close" => Builtin::Close,
            "complex" => Builtin::Complex,
            "copy" => Builtin::Copy,
            "delete" => Builtin::Delete,
            "imag" => Builtin::Imag,
            "len" => Builtin::Len,
            "make" => Builtin::Make,
            "max" => Builtin::Max,
            "min" => Builtin::Min,
            "new" => Builtin::New,
            "panic" => Builtin::Panic,
            "print" => Builtin::Print,
            "println" => Builtin::Println,
            "real" => Builtin::Real,
            "recover" => Builtin::Recover,
            _ => return None,
        })
    }
}

/// What an identifier refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Object {
    Var { package_level: bool },
    Const { package_level: bool },
    TypeName(Type),
    /// A package-level function of the package being checked.
    Func,
    Builtin(Builtin),
    /// An imported package, by path.
    PkgName(String),
    Nil,
}

/// What `x.sel` refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// `pkg.Name` of an imported package.
    Qualified { path: String, member: Member },
    /// A struct field. `path` lists the fields traversed, ending with the
    /// selected one, so promoted fields have more than one entry.
    Field { path: Vec<String> },
    /// A method, possibly promoted through the embedded fields in `path`.
    /// `recv` is the named type that declares it, `None` when the method
    /// comes from an interface.
    Method {
        path: Vec<String>,
        recv: Option<(String, String)>,
        pointer_recv: bool,
    },
}

/// Per-expression results of checking a package.
#[derive(Debug, Clone, Default)]
pub struct TypeInfo {
    pub types: HashMap<ExprId, Type>,
    pub uses: HashMap<ExprId, Object>,
    pub selections: HashMap<ExprId, Selection>,
    /// Concrete values implicitly converted to an interface type.
    pub implicit: HashMap<ExprId, Type>,
}

impl TypeInfo {
    pub fn type_of(&self, id: ExprId) -> &Type {
        self.types.get(&id).unwrap_or(&Type::Invalid)
    }
}

/// A checked package.
#[derive(Debug, Clone)]
pub struct TypedPackage {
    pub export: ExportData,
    pub info: TypeInfo,
    /// Export data of every package this one imports, by path.
    pub deps: BTreeMap<String, Rc<ExportData>>,
}

impl TypedPackage {
    /// Look up a named type in this package or one of its dependencies.
    pub fn named_def(&self, pkg: &str, name: &str) -> Option<&NamedDef> {
        if pkg == self.export.path {
            self.export.types.get(name)
        } else {
            self.deps.get(pkg).and_then(|d| d.types.get(name))
        }
    }

    /// Resolve a signature as it would read in a file with `imports`, so
    /// declarations from different files can be compared.
    pub fn resolve_signature(
        &self,
        sig: &Signature,
        type_params: &[String],
        imports: &[ImportSpec],
    ) -> FuncType {
        let env = SignatureEnv {
            package: self,
            imports: imports
                .iter()
                .map(|i| {
                    let name = match (&i.name, self.deps.get(&i.path)) {
                        (None, Some(dep)) if !dep.name.is_empty() => dep.name.clone(),
                        _ => i.local_name(),
                    };
                    (name, i.path.clone())
                })
                .collect(),
        };
        resolve_signature(&env, sig, type_params)
    }
}

struct SignatureEnv<'p> {
    package: &'p TypedPackage,
    imports: HashMap<String, String>,
}

impl TypeEnv for SignatureEnv<'_> {
    fn lookup_type(&self, name: &str) -> Option<Type> {
        self.package
            .export
            .types
            .get(name)
            .map(|def| Type::named(&def.pkg, &def.name))
    }

    fn import_path(&self, qualifier: &str) -> Option<String> {
        self.imports.get(qualifier).cloned()
    }

    fn underlying(&self, ty: &Type) -> Option<Type> {
        match ty {
            Type::Named { pkg, name } => self
                .package
                .named_def(pkg, name)
                .map(|def| def.underlying.clone()),
            _ => None,
        }
    }
}
