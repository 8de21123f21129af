//! Type-checking bridge: supplies the oracle with imports and verifies
//! overlay replacements.

use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use golower_compiler::Archive;
use golower_overlay::{MergedPackage, ReplacedDecl};
use golower_types::{ExportData, Importer, TypeError, TypeErrors, TypeOracle, TypedPackage};
use tracing::debug;

use crate::error::BuildError;
use crate::resolve::PRIMITIVE_PACKAGE;

/// Export data of the primitive package. Its only member, `Pointer`, is
/// known to the checker directly.
pub fn primitive_export() -> ExportData {
    ExportData::new(PRIMITIVE_PACKAGE, PRIMITIVE_PACKAGE)
}

/// Importer over the archives built so far in a session.
///
/// The session builds every import of a package before checking it, so a
/// lookup miss here means the import was never resolved.
pub struct SessionImporter<'a> {
    archives: &'a BTreeMap<String, Archive>,
    memo: HashMap<String, Rc<ExportData>>,
}

impl<'a> SessionImporter<'a> {
    pub fn new(archives: &'a BTreeMap<String, Archive>) -> Self {
        Self {
            archives,
            memo: HashMap::new(),
        }
    }
}

impl Importer for SessionImporter<'_> {
    fn import(&mut self, path: &str) -> Result<Rc<ExportData>, String> {
        if let Some(data) = self.memo.get(path) {
            return Ok(Rc::clone(data));
        }
        let data = if path == PRIMITIVE_PACKAGE {
            Rc::new(primitive_export())
        } else {
            let archive = self
                .archives
                .get(path)
                .ok_or_else(|| format!("could not import {path} (package not built)"))?;
            Rc::new(archive.export.clone())
        };
        self.memo.insert(path.to_string(), Rc::clone(&data));
        Ok(data)
    }
}

/// Check a merged package and its overlay replacements.
pub fn check_package(
    oracle: &dyn TypeOracle,
    import_path: &str,
    merged: &MergedPackage,
    importer: &mut dyn Importer,
) -> Result<TypedPackage, BuildError> {
    let type_errors = |errors: TypeErrors| BuildError::TypeCheck {
        path: import_path.to_string(),
        errors,
    };
    let pkg = oracle
        .check(import_path, &merged.files, importer)
        .map_err(type_errors)?;
    check_replacements(&pkg, &merged.replaced).map_err(type_errors)?;
    debug!(package = %import_path, replaced = merged.replaced.len(), "type checked");
    Ok(pkg)
}

/// Every replaced function must keep the signature of its original.
pub fn check_replacements(pkg: &TypedPackage, replaced: &[ReplacedDecl]) -> Result<(), TypeErrors> {
    let mut errors = Vec::new();
    for r in replaced {
        let type_params = match &r.original.recv {
            Some(recv) => recv.type_args.clone(),
            None => r.original.type_params.clone(),
        };
        let expected = pkg.resolve_signature(&r.original.sig, &type_params, &r.original_imports);
        let actual = match &r.original.recv {
            Some(recv) => pkg
                .export
                .types
                .get(&recv.type_name)
                .and_then(|def| def.method(&r.original.name))
                .map(|m| &m.sig),
            None => pkg.export.funcs.get(&r.original.name),
        };
        let Some(actual) = actual else { continue };
        // Signatures with unresolvable types cannot be compared.
        if expected.has_invalid() || actual.has_invalid() {
            continue;
        }
        if *actual != expected {
            let message = format!(
                "replacement of {} at {} has signature {} but the original at {} has {}",
                r.key, r.replacement_site, actual, r.original_site, expected
            );
            errors.push(TypeError::new(
                r.replacement_site.file.clone(),
                r.replacement_site.pos,
                message,
            ));
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(TypeErrors(errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use golower_overlay::merge;
    use golower_syntax::parse_file;
    use golower_types::{LenientChecker, MapImporter};

    fn merged(original: &str, overlay: &str) -> MergedPackage {
        let original = vec![parse_file("orig.go", original).unwrap()];
        let overlay = vec![parse_file("overlay.go", overlay).unwrap()];
        merge(original, overlay).unwrap()
    }

    #[test]
    fn test_matching_replacement_passes() {
        let m = merged(
            "package p\n\nfunc F(a int) string { return \"\" }\n",
            "package p\n\nfunc F(b int) string { return \"x\" }\n",
        );
        let pkg = check_package(&LenientChecker, "p", &m, &mut MapImporter::new()).unwrap();
        assert!(pkg.export.funcs.contains_key("F"));
    }

    #[test]
    fn test_mismatched_replacement_names_both_sites() {
        let m = merged(
            "package p\n\nfunc F(a int) string { return \"\" }\n",
            "package p\n\nfunc F(a string) string { return a }\n",
        );
        let err = check_package(&LenientChecker, "p", &m, &mut MapImporter::new()).unwrap_err();
        let BuildError::TypeCheck { path, errors } = err else {
            panic!("expected type error");
        };
        assert_eq!(path, "p");
        let message = errors.to_string();
        assert!(message.contains("overlay.go"), "{message}");
        assert!(message.contains("orig.go"), "{message}");
    }

    #[test]
    fn test_method_replacement_is_checked() {
        let m = merged(
            "package p\n\ntype T struct{}\n\nfunc (t *T) M() int { return 1 }\n",
            "package p\n\nfunc (t *T) M() bool { return true }\n",
        );
        let errors = check_package(&LenientChecker, "p", &m, &mut MapImporter::new()).unwrap_err();
        assert!(errors.to_string().contains("T.M"));
    }

    #[test]
    fn test_session_importer() {
        let mut archives = BTreeMap::new();
        let dep = Archive::new(ExportData::new("fake/dep", "dep"), String::new());
        archives.insert(dep.import_path.clone(), dep);
        let mut importer = SessionImporter::new(&archives);

        assert_eq!(importer.import("fake/dep").unwrap().name, "dep");
        assert_eq!(importer.import("unsafe").unwrap().path, "unsafe");
        assert!(importer.import("fake/other").unwrap_err().contains("fake/other"));
    }
}
