//! golower: compile Go packages to JavaScript.
//!
//! This crate ties the pipeline together. [`BuildSession`] resolves a
//! package and its imports depth-first, merges overlays, checks, compiles
//! and caches each one, then links the program into a single script.

pub mod bridge;
pub mod config;
pub mod error;
pub mod resolve;
pub mod session;

pub use config::GolowerConfig;
pub use error::BuildError;
pub use resolve::{COMMAND_LINE_PACKAGE, PRIMITIVE_PACKAGE, Resolver};
pub use session::{BuildOptions, BuildSession};
