//! Linking archives into one runnable program.

use std::collections::BTreeMap;

use crate::archive::Archive;
use crate::error::LinkError;
use crate::js::Expr;
use crate::prelude::PRELUDE;
use crate::writer::JsWriter;

/// Link `entry` with its dependencies: the prelude, every package in
/// topological order, then a call to the entry package's `main`.
///
/// `archives` must hold an archive for every dependency recorded in
/// `entry`, each with the digest `entry` was compiled against.
pub fn link(entry: &Archive, archives: &BTreeMap<String, Archive>) -> Result<String, LinkError> {
    let mut out = String::with_capacity(PRELUDE.len() + entry.code.len());
    out.push_str(PRELUDE);
    if !PRELUDE.ends_with('\n') {
        out.push('\n');
    }
    for dep in &entry.dependencies {
        let archive = archives
            .get(&dep.import_path)
            .ok_or_else(|| LinkError::Missing(dep.import_path.clone()))?;
        if archive.digest() != dep.digest {
            return Err(LinkError::Stale {
                dependent: entry.import_path.clone(),
                dependency: dep.import_path.clone(),
            });
        }
        push_package(&mut out, archive);
    }
    push_package(&mut out, entry);
    out.push_str("$callMain($packages[");
    out.push_str(&JsWriter::emit_expr(&Expr::string(entry.import_path.clone())));
    out.push_str("]);\n");
    tracing::info!(
        entry = %entry.import_path,
        packages = entry.dependencies.len() + 1,
        bytes = out.len(),
        "linked program"
    );
    Ok(out)
}

fn push_package(out: &mut String, archive: &Archive) {
    if !archive.inc_js.is_empty() {
        out.push_str(&archive.inc_js);
        if !archive.inc_js.ends_with('\n') {
            out.push('\n');
        }
    }
    out.push_str(&archive.code);
    if !archive.code.ends_with('\n') {
        out.push('\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::DependencyBlock;
    use golower_types::ExportData;

    fn archive(path: &str, code: &str) -> Archive {
        Archive::new(ExportData::new(path, "p"), code.to_string())
    }

    #[test]
    fn test_link_orders_packages() {
        let dep = archive("fake/dep", "$packages[\"fake/dep\"] = 1;");
        let mut main = archive("main", "$packages[\"main\"] = 2;\n");
        main.dependencies.push(DependencyBlock::of(&dep));
        let archives = BTreeMap::from([(dep.import_path.clone(), dep)]);

        let js = link(&main, &archives).unwrap();
        assert!(js.starts_with(PRELUDE));
        let dep_at = js.find("$packages[\"fake/dep\"] = 1;").unwrap();
        let main_at = js.find("$packages[\"main\"] = 2;").unwrap();
        assert!(dep_at < main_at);
        assert!(js.ends_with("$callMain($packages[\"main\"]);\n"));
    }

    #[test]
    fn test_inc_js_precedes_package_code() {
        let mut main = archive("main", "CODE");
        main.inc_js = "INC".into();
        let js = link(&main, &BTreeMap::new()).unwrap();
        let tail = &js[PRELUDE.len()..];
        assert!(tail.trim_start().starts_with("INC\nCODE\n"), "{tail}");
    }

    #[test]
    fn test_missing_and_stale_dependencies() {
        let dep = archive("fake/dep", "old");
        let mut main = archive("main", "");
        main.dependencies.push(DependencyBlock::of(&dep));
        assert_eq!(
            link(&main, &BTreeMap::new()),
            Err(LinkError::Missing("fake/dep".into()))
        );

        let changed = archive("fake/dep", "new");
        let archives = BTreeMap::from([(changed.import_path.clone(), changed)]);
        assert!(matches!(link(&main, &archives), Err(LinkError::Stale { .. })));
    }
}
