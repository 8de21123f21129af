//! Code generation for golower.
//!
//! A checked package is lowered to the [`js`] IR, written out with
//! [`writer::JsWriter`] and wrapped in an [`Archive`] together with its export
//! metadata. [`link`] joins the archives of a program behind the runtime
//! [`prelude`].
//!
//! ```text
//! TypedPackage + merged files ──lower──▶ js::Program ──write──▶ Archive ──link──▶ program.js
//! ```

pub mod archive;
pub mod error;
pub mod js;
pub mod link;
pub mod lower;
pub mod prelude;
pub mod writer;

pub use archive::{Archive, DependencyBlock};
pub use error::{ArchiveError, GenerationError, LinkError};
pub use link::link;
pub use lower::{Lowered, lower_package};

use golower_syntax::File;
use golower_types::TypedPackage;
use writer::JsWriter;

#[derive(Debug, Clone, Copy, Default)]
pub struct CompileOptions {
    pub minify: bool,
}

/// Compile a checked package into an archive.
///
/// `dependencies` are the archives of every transitive dependency in
/// topological order; their digests are recorded so a cached archive can
/// later be checked against the dependencies of the running build.
pub fn compile_package(
    pkg: &TypedPackage,
    files: &[File],
    inc_js: String,
    dependencies: &[&Archive],
    options: CompileOptions,
) -> Result<Archive, GenerationError> {
    let lowered = lower_package(pkg, files)?;
    let code = JsWriter::emit(&lowered.program, options.minify);

    let mut export = pkg.export.clone();
    export.blocking.extend(lowered.blocking);
    let mut archive = Archive::new(export, code);
    archive.inc_js = inc_js;
    archive.minified = options.minify;
    archive.dependencies = dependencies.iter().map(|a| DependencyBlock::of(a)).collect();
    tracing::info!(
        package = %archive.import_path,
        bytes = archive.code.len(),
        "compiled package"
    );
    Ok(archive)
}

#[cfg(test)]
mod tests {
    use super::*;
    use golower_syntax::parse_file;
    use golower_types::{LenientChecker, MapImporter, TypeOracle};

    fn check(path: &str, src: &str, importer: &mut MapImporter) -> (TypedPackage, Vec<File>) {
        let files = vec![parse_file("a.go", src).unwrap()];
        let pkg = LenientChecker.check(path, &files, importer).unwrap();
        (pkg, files)
    }

    #[test]
    fn test_compile_and_link_program() {
        let mut importer = MapImporter::new();
        let (dep_pkg, dep_files) = check(
            "example.com/dep",
            "package dep\n\nfunc Wait(ch chan int) int {\n\treturn <-ch\n}\n",
            &mut importer,
        );
        let dep = compile_package(&dep_pkg, &dep_files, String::new(), &[], CompileOptions::default()).unwrap();
        assert!(dep.export.blocking.contains("Wait"));
        importer.insert(dep.export.clone());

        let (main_pkg, main_files) = check(
            "example.com/main",
            "package main\n\nimport \"example.com/dep\"\n\nfunc main() {\n\tch := make(chan int, 1)\n\tch <- 1\n\tprintln(dep.Wait(ch))\n}\n",
            &mut importer,
        );
        let main = compile_package(&main_pkg, &main_files, String::new(), &[&dep], CompileOptions::default()).unwrap();
        assert_eq!(main.dependencies, vec![DependencyBlock::of(&dep)]);
        assert!(main.code.contains("yield* $pkg_dep.Wait(ch)"), "{}", main.code);

        let archives = std::collections::BTreeMap::from([(dep.import_path.clone(), dep)]);
        let js = link(&main, &archives).unwrap();
        assert!(js.ends_with("$callMain($packages[\"example.com/main\"]);\n"));
    }

    #[test]
    fn test_minified_output() {
        let mut importer = MapImporter::new();
        let (pkg, files) = check("example.com/m", "package m\n\nfunc F(a int) int {\n\treturn a + 1\n}\n", &mut importer);
        let archive = compile_package(&pkg, &files, String::new(), &[], CompileOptions { minify: true }).unwrap();
        assert!(archive.minified);
        assert!(!archive.code.contains('\n'));
    }
}
