//! Value representation.
//!
//! | Go | JavaScript |
//! |---|---|
//! | bool, numbers, string | primitives |
//! | named struct | instance of the type's constructor |
//! | anonymous struct | plain object |
//! | array | JS array |
//! | pointer to struct or array | the pointee object itself |
//! | other pointer | `$Ptr` (or `T.$ptr` for named non-struct `T`) |
//! | slice, map, chan | `$Slice`, `$GoMap`, `$Chan` |
//! | interface | the dynamic value, boxed when it is not an object |

use golower_types::{Basic, StructField, Type, universe};

use super::Lowerer;
use crate::js::{self, Expr, Function, Stmt};

/// Runtime constructor boxing a basic value stored in an interface.
pub fn basic_box(kind: Basic) -> &'static str {
    match kind.default_type() {
        Basic::Bool => "$Bool",
        Basic::Int => "$Int",
        Basic::Int8 => "$Int8",
        Basic::Int16 => "$Int16",
        Basic::Int32 => "$Int32",
        Basic::Int64 => "$Int64",
        Basic::Uint => "$Uint",
        Basic::Uint8 => "$Uint8",
        Basic::Uint16 => "$Uint16",
        Basic::Uint32 => "$Uint32",
        Basic::Uint64 => "$Uint64",
        Basic::Uintptr => "$Uintptr",
        Basic::Float32 => "$Float32",
        Basic::Float64 => "$Float64",
        Basic::String => "$String",
        _ => "$UnsafePointer",
    }
}

impl Lowerer<'_> {
    /// Underlying type; the predeclared `error` is an interface.
    pub(super) fn under(&self, ty: &Type) -> Type {
        let mut ty = ty.clone();
        for _ in 0..16 {
            match &ty {
                Type::Named { pkg, name } if pkg.is_empty() && name == "error" => {
                    return Type::Interface(universe::error_methods());
                }
                Type::Named { pkg, name } => match self.pkg.named_def(pkg, name) {
                    Some(def) => ty = def.underlying.clone(),
                    None => return Type::Invalid,
                },
                _ => return ty,
            }
        }
        Type::Invalid
    }

    pub(super) fn basic_of(&self, ty: &Type) -> Option<Basic> {
        self.under(ty).as_basic()
    }

    pub(super) fn is_interface(&self, ty: &Type) -> bool {
        matches!(self.under(ty), Type::Interface(_))
    }

    /// A defined type whose values are struct instances.
    pub(super) fn is_named_struct(&self, ty: &Type) -> bool {
        matches!(ty, Type::Named { .. }) && matches!(self.under(ty), Type::Struct(_))
    }

    /// A defined type represented by a boxing constructor when it needs an
    /// identity: in interfaces, and as the receiver of its methods.
    pub(super) fn is_boxed_named(&self, ty: &Type) -> bool {
        match ty {
            Type::Named { pkg, .. } if !pkg.is_empty() => {
                !matches!(self.under(ty), Type::Struct(_) | Type::Interface(_) | Type::Invalid)
            }
            _ => false,
        }
    }

    /// Values that are JS objects copied on assignment.
    pub(super) fn is_value_aggregate(&self, ty: &Type) -> bool {
        matches!(self.under(ty), Type::Struct(_) | Type::Array(..))
    }

    /// Pointers to these types are the pointee object itself.
    pub(super) fn points_to_object(&self, elem: &Type) -> bool {
        self.is_value_aggregate(elem)
    }

    /// Map keys that must be hashed to compare by value.
    pub(super) fn is_hashed_key(&self, ty: &Type) -> bool {
        matches!(
            self.under(ty),
            Type::Struct(_) | Type::Array(..) | Type::Interface(_)
        )
    }

    /// Reference to the constructor or descriptor of a named type.
    pub(super) fn type_ref(&self, pkg: &str, name: &str) -> Expr {
        if pkg.is_empty() && name == "error" {
            return Expr::ident("$error");
        }
        if pkg == self.pkg.export.path {
            return Expr::ident(js::mangle(name));
        }
        Expr::member(self.package_ref(pkg), js::mangle_property(name))
    }

    /// `pkg.Name` as the runtime reports it.
    pub(super) fn qualified_name(&self, pkg: &str, name: &str) -> String {
        if pkg.is_empty() {
            return name.to_string();
        }
        let package = if pkg == self.pkg.export.path {
            self.pkg.export.name.clone()
        } else {
            self.pkg
                .deps
                .get(pkg)
                .map(|d| d.name.clone())
                .unwrap_or_else(|| pkg.rsplit('/').next().unwrap_or(pkg).to_string())
        };
        format!("{package}.{name}")
    }

    pub(super) fn zero(&self, ty: &Type) -> Expr {
        match ty {
            Type::Named { pkg, name } if self.is_named_struct(ty) => {
                Expr::new_(self.type_ref(pkg, name), Vec::new())
            }
            _ => match self.under(ty) {
                Type::Basic(Basic::Bool | Basic::UntypedBool) => Expr::bool(false),
                Type::Basic(Basic::String | Basic::UntypedString) => Expr::string(""),
                Type::Basic(Basic::UnsafePointer | Basic::UntypedNil) => Expr::null(),
                Type::Basic(_) => Expr::number(0.0),
                Type::Array(n, elem) => Expr::helper(
                    "$makeArray",
                    vec![Expr::number(n as f64), self.zero_thunk(&elem)],
                ),
                Type::Struct(fields) => self.struct_object(&fields, |l, _, f| l.zero(&f.ty)),
                _ => Expr::null(),
            },
        }
    }

    pub(super) fn zero_thunk(&self, ty: &Type) -> Expr {
        Expr::thunk(self.zero(ty))
    }

    /// Plain object for an anonymous struct, one entry per field.
    pub(super) fn struct_object(
        &self,
        fields: &[StructField],
        mut value: impl FnMut(&Self, usize, &StructField) -> Expr,
    ) -> Expr {
        let pairs = fields
            .iter()
            .enumerate()
            .map(|(i, f)| (field_property(&f.name, i), value(self, i, f)))
            .collect();
        Expr::object(pairs)
    }

    /// Copy of a struct or array value. Other values are returned as is.
    pub(super) fn copy_value(&self, value: Expr, ty: &Type) -> Expr {
        match self.under(ty) {
            Type::Struct(fields) => {
                if matches!(ty, Type::Named { .. }) {
                    return Expr::call(Expr::member(value, "$copy"), Vec::new());
                }
                // (($v) => ({ a: $v.a, ... }))(value)
                let copied = self.struct_object(&fields, |l, i, f| {
                    l.copy_value(Expr::member(Expr::ident("$v"), field_property(&f.name, i)), &f.ty)
                });
                let func = Function::arrow(vec!["$v".into()], vec![Stmt::return_stmt(Some(copied))]);
                Expr::call(Expr::function(func), vec![value])
            }
            Type::Array(_, elem) => {
                let mut args = vec![value];
                if self.is_value_aggregate(&elem) {
                    let inner = self.copy_value(Expr::ident("$e"), &elem);
                    let func = Function::arrow(vec!["$e".into()], vec![Stmt::return_stmt(Some(inner))]);
                    args.push(Expr::function(func));
                }
                Expr::helper("$copyArray", args)
            }
            _ => value,
        }
    }

    /// Convert a concrete value of type `from` to an interface value.
    pub(super) fn box_value(&self, value: Expr, from: &Type) -> Expr {
        if matches!(value, Expr::Literal(js::Literal::Null)) {
            return value;
        }
        match from {
            Type::Named { pkg, name } if self.is_boxed_named(from) => {
                Expr::new_(self.type_ref(pkg, name), vec![value])
            }
            Type::Named { .. } if self.is_named_struct(from) => self.copy_value(value, from),
            Type::Basic(Basic::UntypedNil) => Expr::null(),
            Type::Basic(kind) => Expr::new_(Expr::ident(basic_box(*kind)), vec![value]),
            Type::Array(..) | Type::Struct(_) => self.copy_value(value, from),
            _ => value,
        }
    }

    /// Constructor used for a pointer to `elem`, when not the plain `$Ptr`.
    pub(super) fn pointer_ctor(&self, elem: &Type) -> Option<Expr> {
        match elem {
            Type::Named { pkg, name } if self.is_boxed_named(elem) => {
                Some(Expr::member(self.type_ref(pkg, name), "$ptr"))
            }
            _ => None,
        }
    }

    /// Runtime descriptor checked by type assertions and type switches.
    pub(super) fn type_desc(&self, ty: &Type) -> Expr {
        match ty {
            Type::Named { pkg, name } => self.type_ref(pkg, name),
            Type::Basic(kind) => Expr::ident(basic_box(*kind)),
            Type::Pointer(elem) => {
                if self.points_to_object(elem) {
                    match elem.as_ref() {
                        Type::Named { pkg, name } => self.type_ref(pkg, name),
                        _ => Expr::ident("Object"),
                    }
                } else {
                    self.pointer_ctor(elem).unwrap_or_else(|| Expr::ident("$Ptr"))
                }
            }
            Type::Interface(methods) => Expr::helper(
                "$iface",
                vec![Expr::array(
                    methods
                        .iter()
                        .map(|m| Expr::string(js::mangle_property(&m.name)))
                        .collect(),
                )],
            ),
            Type::Slice(_) => Expr::ident("$Slice"),
            Type::Map(..) => Expr::ident("$GoMap"),
            Type::Chan(..) => Expr::ident("$Chan"),
            Type::Func(_) => Expr::ident("Function"),
            Type::Array(..) => Expr::ident("Array"),
            _ => Expr::ident("Object"),
        }
    }
}

/// Property name of a struct field. Blank fields get positional names.
pub fn field_property(name: &str, index: usize) -> String {
    if name == "_" {
        format!("$blank{index}")
    } else {
        js::mangle_property(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_boxes() {
        assert_eq!(basic_box(Basic::UntypedInt), "$Int");
        assert_eq!(basic_box(Basic::UntypedRune), "$Int32");
        assert_eq!(basic_box(Basic::Uint8), "$Uint8");
        assert_eq!(basic_box(Basic::UntypedString), "$String");
    }

    #[test]
    fn test_field_property() {
        assert_eq!(field_property("X", 0), "X");
        assert_eq!(field_property("_", 3), "$blank3");
        assert_eq!(field_property("constructor", 1), "constructor$");
    }
}
