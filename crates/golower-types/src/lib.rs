//! Types for golower.
//!
//! The checker is an oracle behind the [`TypeOracle`] trait: it receives the
//! merged files of one package plus an [`Importer`] for its dependencies, and
//! returns a [`TypedPackage`] carrying the [`ExportData`] dependents need and
//! the per-expression [`TypeInfo`] the code generator needs.

pub mod check;
mod error;
mod oracle;
pub mod package;
pub mod resolve;
pub mod types;
pub mod universe;

pub use check::LenientChecker;
pub use error::{TypeError, TypeErrors};
pub use oracle::{Importer, MapImporter, TypeOracle};
pub use package::{
    Builtin, ExportData, Member, Object, Selection, TypeInfo, TypedPackage,
};
pub use types::{Basic, ChanDir, FuncType, Method, MethodDef, NamedDef, StructField, Type};
