//! Go source model for golower.
//!
//! [`parse_file`] turns Go source into the [`ast`] via tree-sitter. Syntax
//! errors are never fatal one at a time: every problem in every file of a
//! package is collected into a [`ParseErrors`] and reported together.

pub mod ast;
pub mod directive;
mod error;
pub mod lit;
mod reader;
pub mod visit;

pub use ast::*;
pub use directive::Directive;
pub use error::{ParseError, ParseErrors};
pub use reader::{parse_file, parse_package};
