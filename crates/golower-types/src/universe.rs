//! Predeclared identifiers.

use crate::package::{Builtin, Object};
use crate::types::{Basic, FuncType, Method, Type};

/// Methods of the predeclared `error` interface.
pub fn error_methods() -> Vec<Method> {
    vec![Method {
        name: "Error".into(),
        sig: FuncType {
            params: Vec::new(),
            results: vec![Type::Basic(Basic::String)],
            variadic: false,
        },
    }]
}

/// Predeclared type names.
pub fn type_named(name: &str) -> Option<Type> {
    match name {
        "error" => Some(Type::error()),
        "any" | "comparable" => Some(Type::Interface(Vec::new())),
        _ => Basic::from_name(name).map(Type::Basic),
    }
}

/// Any predeclared identifier, with the type of its value.
pub fn lookup(name: &str) -> Option<(Object, Type)> {
    if let Some(ty) = type_named(name) {
        return Some((Object::TypeName(ty.clone()), ty));
    }
    if let Some(builtin) = Builtin::from_name(name) {
        return Some((Object::Builtin(builtin), Type::Invalid));
    }
    let constant = Object::Const {
        package_level: false,
    };
    match name {
        "true" | "false" => Some((constant, Type::Basic(Basic::UntypedBool))),
        "iota" => Some((constant, Type::Basic(Basic::UntypedInt))),
        "nil" => Some((Object::Nil, Type::Basic(Basic::UntypedNil))),
        _ => None,
    }
}
