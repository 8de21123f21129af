//! The type model.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Basic {
    Bool,
    Int,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Uintptr,
    Float32,
    Float64,
    Complex64,
    Complex128,
    String,
    UnsafePointer,
    UntypedBool,
    UntypedInt,
    UntypedRune,
    UntypedFloat,
    UntypedString,
    UntypedNil,
}

impl Basic {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "bool" => Basic::Bool,
            "int" => Basic::Int,
            "int8" => Basic::Int8,
            "int16" => Basic::Int16,
            "int32" | "rune" => Basic::Int32,
            "int64" => Basic::Int64,
            "uint" => Basic::Uint,
            "uint8" | "byte" => Basic::Uint8,
            "uint16" => Basic::Uint16,
            "uint32" => Basic::Uint32,
            "uint64" => Basic::Uint64,
            "uintptr" => Basic::Uintptr,
            "float32" => Basic::Float32,
            "float64" => Basic::Float64,
            "complex64" => Basic::Complex64,
            "complex128" => Basic::Complex128,
            "string" => Basic::String,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Basic::Bool => "bool",
            Basic::Int => "int",
            Basic::Int8 => "int8",
            Basic::Int16 => "int16",
            Basic::Int32 => "int32",
            Basic::Int64 => "int64",
            Basic::Uint => "uint",
            Basic::Uint8 => "uint8",
            Basic::Uint16 => "uint16",
            Basic::Uint32 => "uint32",
            Basic::Uint64 => "uint64",
            Basic::Uintptr => "uintptr",
            Basic::Float32 => "float32",
            Basic::Float64 => "float64",
            Basic::Complex64 => "complex64",
            Basic::Complex128 => "complex128",
            Basic::String => "string",
            Basic::UnsafePointer => "unsafe.Pointer",
            Basic::UntypedBool => "untyped bool",
            Basic::UntypedInt => "untyped int",
            Basic::UntypedRune => "untyped rune",
            Basic::UntypedFloat => "untyped float",
            Basic::UntypedString => "untyped string",
            Basic::UntypedNil => "untyped nil",
        }
    }

    pub fn is_untyped(self) -> bool {
        matches!(
            self,
            Basic::UntypedBool
                | Basic::UntypedInt
                | Basic::UntypedRune
                | Basic::UntypedFloat
                | Basic::UntypedString
                | Basic::UntypedNil
        )
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            Basic::Int
                | Basic::Int8
                | Basic::Int16
                | Basic::Int32
                | Basic::Int64
                | Basic::Uint
                | Basic::Uint8
                | Basic::Uint16
                | Basic::Uint32
                | Basic::Uint64
                | Basic::Uintptr
                | Basic::UntypedInt
                | Basic::UntypedRune
        )
    }

    pub fn is_unsigned(self) -> bool {
        matches!(
            self,
            Basic::Uint | Basic::Uint8 | Basic::Uint16 | Basic::Uint32 | Basic::Uint64 | Basic::Uintptr
        )
    }

    pub fn is_float(self) -> bool {
        matches!(self, Basic::Float32 | Basic::Float64 | Basic::UntypedFloat)
    }

    pub fn is_complex(self) -> bool {
        matches!(self, Basic::Complex64 | Basic::Complex128)
    }

    pub fn is_numeric(self) -> bool {
        self.is_integer() || self.is_float() || self.is_complex()
    }

    pub fn is_string(self) -> bool {
        matches!(self, Basic::String | Basic::UntypedString)
    }

    /// Bit width of sized integer kinds. `int`, `uint` and `uintptr` are 32
    /// bits wide on the target.
    pub fn int_bits(self) -> Option<u32> {
        Some(match self {
            Basic::Int8 | Basic::Uint8 => 8,
            Basic::Int16 | Basic::Uint16 => 16,
            Basic::Int32 | Basic::Uint32 | Basic::Int | Basic::Uint | Basic::Uintptr => 32,
            Basic::Int64 | Basic::Uint64 => 64,
            _ => return None,
        })
    }

    /// Type an untyped constant assumes when it needs one.
    pub fn default_type(self) -> Basic {
        match self {
            Basic::UntypedBool => Basic::Bool,
            Basic::UntypedInt => Basic::Int,
            Basic::UntypedRune => Basic::Int32,
            Basic::UntypedFloat => Basic::Float64,
            Basic::UntypedString => Basic::String,
            other => other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChanDir {
    Both,
    Send,
    Recv,
}

/// A signature. The last parameter of a variadic function has slice type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FuncType {
    pub params: Vec<Type>,
    pub results: Vec<Type>,
    pub variadic: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StructField {
    pub name: String,
    pub ty: Type,
    pub embedded: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Method {
    pub name: String,
    pub sig: FuncType,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    /// Unknown or erroneous. Never reported twice.
    Invalid,
    Basic(Basic),
    /// A defined type. `pkg` is empty for the predeclared `error`.
    Named {
        pkg: String,
        name: String,
    },
    Pointer(Box<Type>),
    Slice(Box<Type>),
    Array(u64, Box<Type>),
    Map(Box<Type>, Box<Type>),
    Chan(ChanDir, Box<Type>),
    Func(FuncType),
    Struct(Vec<StructField>),
    /// Method set flattened and sorted by name.
    Interface(Vec<Method>),
    Tuple(Vec<Type>),
    TypeParam(String),
}

impl Type {
    pub fn named(pkg: impl Into<String>, name: impl Into<String>) -> Self {
        Type::Named {
            pkg: pkg.into(),
            name: name.into(),
        }
    }

    pub fn error() -> Self {
        Type::named("", "error")
    }

    pub fn pointer(elem: Type) -> Self {
        Type::Pointer(Box::new(elem))
    }

    pub fn slice(elem: Type) -> Self {
        Type::Slice(Box::new(elem))
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, Type::Invalid)
    }

    pub fn as_basic(&self) -> Option<Basic> {
        match self {
            Type::Basic(b) => Some(*b),
            _ => None,
        }
    }

    pub fn is_untyped(&self) -> bool {
        self.as_basic().is_some_and(Basic::is_untyped)
    }

    /// Whether any component of the type is `Invalid`.
    pub fn has_invalid(&self) -> bool {
        match self {
            Type::Invalid => true,
            Type::Basic(_) | Type::Named { .. } | Type::TypeParam(_) => false,
            Type::Pointer(t) | Type::Slice(t) | Type::Array(_, t) | Type::Chan(_, t) => {
                t.has_invalid()
            }
            Type::Map(k, v) => k.has_invalid() || v.has_invalid(),
            Type::Func(sig) => sig.has_invalid(),
            Type::Struct(fields) => fields.iter().any(|f| f.ty.has_invalid()),
            Type::Interface(methods) => methods.iter().any(|m| m.sig.has_invalid()),
            Type::Tuple(items) => items.iter().any(Type::has_invalid),
        }
    }

    /// Replace an untyped basic type with its default type.
    pub fn defaulted(self) -> Type {
        match self {
            Type::Basic(b) => Type::Basic(b.default_type()),
            other => other,
        }
    }
}

impl FuncType {
    pub fn has_invalid(&self) -> bool {
        self.params.iter().chain(&self.results).any(Type::has_invalid)
    }

    /// Result as a single type: the lone result, or a tuple otherwise.
    pub fn result(&self) -> Type {
        match self.results.as_slice() {
            [one] => one.clone(),
            many => Type::Tuple(many.to_vec()),
        }
    }
}

impl fmt::Display for FuncType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("func(")?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match p {
                Type::Slice(elem) if self.variadic && i + 1 == self.params.len() => {
                    write!(f, "...{elem}")?
                }
                _ => write!(f, "{p}")?,
            }
        }
        f.write_str(")")?;
        match self.results.as_slice() {
            [] => Ok(()),
            [one] => write!(f, " {one}"),
            many => {
                f.write_str(" (")?;
                for (i, r) in many.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{r}")?;
                }
                f.write_str(")")
            }
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Invalid => f.write_str("invalid type"),
            Type::Basic(b) => f.write_str(b.name()),
            Type::Named { pkg, name } if pkg.is_empty() => f.write_str(name),
            Type::Named { pkg, name } => write!(f, "{pkg}.{name}"),
            Type::Pointer(t) => write!(f, "*{t}"),
            Type::Slice(t) => write!(f, "[]{t}"),
            Type::Array(n, t) => write!(f, "[{n}]{t}"),
            Type::Map(k, v) => write!(f, "map[{k}]{v}"),
            Type::Chan(ChanDir::Both, t) => write!(f, "chan {t}"),
            Type::Chan(ChanDir::Send, t) => write!(f, "chan<- {t}"),
            Type::Chan(ChanDir::Recv, t) => write!(f, "<-chan {t}"),
            Type::Func(sig) => write!(f, "{sig}"),
            Type::Struct(fields) => {
                f.write_str("struct{")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str("; ")?;
                    }
                    if field.embedded {
                        write!(f, "{}", field.ty)?;
                    } else {
                        write!(f, "{} {}", field.name, field.ty)?;
                    }
                }
                f.write_str("}")
            }
            Type::Interface(methods) if methods.is_empty() => f.write_str("interface{}"),
            Type::Interface(methods) => {
                f.write_str("interface{")?;
                for (i, m) in methods.iter().enumerate() {
                    if i > 0 {
                        f.write_str("; ")?;
                    }
                    let sig = m.sig.to_string();
                    write!(f, "{}{}", m.name, sig.trim_start_matches("func"))?;
                }
                f.write_str("}")
            }
            Type::Tuple(items) => {
                f.write_str("(")?;
                for (i, t) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{t}")?;
                }
                f.write_str(")")
            }
            Type::TypeParam(name) => f.write_str(name),
        }
    }
}

/// A method declared on a named type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodDef {
    pub name: String,
    pub sig: FuncType,
    pub pointer_recv: bool,
}

/// A defined type together with its declared methods.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedDef {
    pub pkg: String,
    pub name: String,
    pub underlying: Type,
    pub methods: Vec<MethodDef>,
}

impl NamedDef {
    pub fn method(&self, name: &str) -> Option<&MethodDef> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// Methods callable on a value (`pointer == false`) or pointer.
    pub fn method_set(&self, pointer: bool) -> impl Iterator<Item = &MethodDef> {
        self.methods
            .iter()
            .filter(move |m| pointer || !m.pointer_recv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let sig = FuncType {
            params: vec![Type::Basic(Basic::String), Type::slice(Type::Basic(Basic::Int))],
            results: vec![Type::Basic(Basic::Int), Type::error()],
            variadic: true,
        };
        assert_eq!(sig.to_string(), "func(string, ...int) (int, error)");
        let iface = Type::Interface(vec![Method {
            name: "Read".into(),
            sig: FuncType {
                params: vec![Type::slice(Type::Basic(Basic::Uint8))],
                results: vec![Type::Basic(Basic::Int)],
                variadic: false,
            },
        }]);
        assert_eq!(iface.to_string(), "interface{Read([]uint8) int}");
        assert_eq!(Type::named("io", "Reader").to_string(), "io.Reader");
    }

    #[test]
    fn test_basic_properties() {
        assert_eq!(Basic::from_name("rune"), Some(Basic::Int32));
        assert_eq!(Basic::from_name("byte"), Some(Basic::Uint8));
        assert!(Basic::Uint16.is_unsigned());
        assert_eq!(Basic::Int.int_bits(), Some(32));
        assert_eq!(Basic::UntypedRune.default_type(), Basic::Int32);
        assert_eq!(
            Type::Basic(Basic::UntypedFloat).defaulted(),
            Type::Basic(Basic::Float64)
        );
    }
}
