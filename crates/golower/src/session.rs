//! Build sessions.
//!
//! A [`BuildSession`] owns every table of one build: resolved packages, their
//! archives in dependency order, the cache handle and the type oracle. The
//! import graph is walked depth-first; each package is built once.
//!
//! ```text
//! resolve ─▶ parse ─▶ merge overlays ─▶ build imports ─▶ cache? ─▶ check ─▶ compile ─▶ store
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use golower_cache::{BuildCache, BuildFingerprint};
use golower_compiler::{Archive, CompileOptions, LinkError, compile_package};
use golower_overlay::{MergedPackage, merge};
use golower_syntax::{File, ParseErrors, parse_package};
use golower_tags::TagSet;
use golower_types::{LenientChecker, TypeOracle};
use tracing::{debug, info};

use crate::bridge::{SessionImporter, check_package};
use crate::config::GolowerConfig;
use crate::error::BuildError;
use crate::resolve::{PRIMITIVE_PACKAGE, PackageSources, Resolver, SourceFile, compiler_mtime};

/// Inputs of a build, after config, environment and flags are combined.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildOptions {
    pub os: String,
    pub arch: String,
    pub tags: Vec<String>,
    pub goroot: PathBuf,
    pub source_roots: Vec<PathBuf>,
    pub overlay_root: Option<PathBuf>,
    /// `None` disables the cache.
    pub cache_dir: Option<PathBuf>,
    pub minify: bool,
    pub tested_package: Option<String>,
}

impl BuildOptions {
    pub fn from_config(config: &GolowerConfig) -> Self {
        Self {
            os: config.os().to_string(),
            arch: config.arch().to_string(),
            tags: config.target.tags.clone(),
            goroot: config.goroot(),
            source_roots: config.paths.source_roots.clone(),
            overlay_root: config.paths.overlay_root.clone(),
            cache_dir: config.cache_enabled().then(|| config.cache_dir()),
            minify: config.build.minify,
            tested_package: None,
        }
    }

    pub fn tag_set(&self) -> TagSet {
        TagSet::with_platform(&self.os, &self.arch, self.tags.iter().cloned())
    }

    pub fn fingerprint(&self) -> BuildFingerprint {
        let gopath = std::env::join_paths(&self.source_roots)
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        let fp = BuildFingerprint::new(&self.os, &self.arch)
            .with_goroot(self.goroot.display().to_string())
            .with_gopath(gopath)
            .with_minify(self.minify)
            .with_tags(self.tags.iter().cloned());
        match &self.tested_package {
            Some(path) => fp.with_tested_package(path.clone()),
            None => fp,
        }
    }

    fn resolver(&self) -> Resolver {
        let resolver = Resolver::new(
            &self.goroot,
            self.source_roots.clone(),
            self.overlay_root.clone(),
            self.tag_set(),
        );
        match &self.tested_package {
            Some(path) => resolver.with_tested_package(path.clone()),
            None => resolver,
        }
    }
}

/// Per-package record kept alongside the archive.
#[derive(Debug, Clone)]
struct PackageRecord {
    dir: PathBuf,
    watermark: u64,
    from_cache: bool,
}

pub struct BuildSession {
    options: BuildOptions,
    resolver: Resolver,
    cache: Option<BuildCache>,
    fingerprint: BuildFingerprint,
    oracle: Box<dyn TypeOracle>,
    compiler_mtime: Option<u64>,
    records: HashMap<String, PackageRecord>,
    archives: BTreeMap<String, Archive>,
    /// Built packages in dependency order.
    order: Vec<String>,
    /// Packages currently being built, for cycle detection.
    stack: Vec<String>,
}

impl BuildSession {
    pub fn new(options: BuildOptions) -> Self {
        Self::with_oracle(options, Box::new(LenientChecker))
    }

    pub fn with_oracle(options: BuildOptions, oracle: Box<dyn TypeOracle>) -> Self {
        let cache = options.cache_dir.as_ref().map(|dir| BuildCache::new(dir.clone()));
        Self {
            resolver: options.resolver(),
            fingerprint: options.fingerprint(),
            cache,
            oracle,
            compiler_mtime: compiler_mtime(),
            records: HashMap::new(),
            archives: BTreeMap::new(),
            order: Vec::new(),
            stack: Vec::new(),
            options,
        }
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    /// Forget everything built so far. Used between watch-mode rebuilds.
    pub fn reset(&mut self) {
        self.resolver = self.options.resolver();
        self.compiler_mtime = compiler_mtime();
        self.records.clear();
        self.archives.clear();
        self.order.clear();
        self.stack.clear();
        debug!("build session reset");
    }

    pub fn archive(&self, import_path: &str) -> Option<&Archive> {
        self.archives.get(import_path)
    }

    /// Built packages in dependency order.
    pub fn packages(&self) -> &[String] {
        &self.order
    }

    /// Whether `import_path` was loaded from the cache in this session.
    pub fn from_cache(&self, import_path: &str) -> bool {
        self.records.get(import_path).is_some_and(|r| r.from_cache)
    }

    /// Build a target named on the command line: a directory, a relative
    /// path, or an import path.
    pub fn build_target(&mut self, target: &str) -> Result<String, BuildError> {
        let path = Path::new(target);
        if target.starts_with('.') || path.is_absolute() || path.is_dir() {
            return self.build_dir(path);
        }
        self.build_package(target, None)
    }

    /// Build the package in `dir`.
    pub fn build_dir(&mut self, dir: &Path) -> Result<String, BuildError> {
        let dir = dir.canonicalize().map_err(|e| BuildError::io(dir, e))?;
        let import_path = self.resolver.import_path_of_dir(&dir);
        self.build_at(import_path, dir)
    }

    /// Build `import_path`, imported from a package in `from_dir`. Returns the
    /// canonical import path.
    pub fn build_package(&mut self, import_path: &str, from_dir: Option<&Path>) -> Result<String, BuildError> {
        if import_path == PRIMITIVE_PACKAGE {
            return Ok(import_path.to_string());
        }
        let (import_path, dir) = self.resolver.find(import_path, from_dir)?;
        self.build_at(import_path, dir)
    }

    fn build_at(&mut self, import_path: String, dir: PathBuf) -> Result<String, BuildError> {
        if self.records.contains_key(&import_path) {
            return Ok(import_path);
        }
        if let Some(start) = self.stack.iter().position(|p| *p == import_path) {
            let mut cycle = self.stack[start..].to_vec();
            cycle.push(import_path);
            return Err(BuildError::ImportCycle(cycle));
        }
        self.stack.push(import_path.clone());
        let result = self.compile(&import_path, &dir);
        self.stack.pop();
        let (archive, record) = result?;
        self.archives.insert(import_path.clone(), archive);
        self.records.insert(import_path.clone(), record);
        self.order.push(import_path.clone());
        Ok(import_path)
    }

    fn compile(&mut self, import_path: &str, dir: &Path) -> Result<(Archive, PackageRecord), BuildError> {
        let sources = self.resolver.load(import_path, dir)?;
        let mut merged = parse_and_merge(&sources)?;

        // Imports first; relative imports are rewritten to their canonical
        // paths so the checker and generator see one name per package.
        let mut canonical = BTreeMap::new();
        for file in &merged.files {
            for spec in &file.imports {
                if !canonical.contains_key(&spec.path) {
                    let resolved = self.build_package(&spec.path, Some(dir))?;
                    canonical.insert(spec.path.clone(), resolved);
                }
            }
        }
        for file in &mut merged.files {
            for spec in &mut file.imports {
                if let Some(resolved) = canonical.get(&spec.path) {
                    spec.path = resolved.clone();
                }
            }
        }

        let dep_watermark = canonical
            .values()
            .filter_map(|p| self.records.get(p))
            .map(|r| r.watermark)
            .max()
            .unwrap_or(0);
        let watermark = dep_watermark
            .max(sources.newest())
            .max(self.compiler_mtime.unwrap_or(0));
        let record = |from_cache| PackageRecord {
            dir: dir.to_path_buf(),
            watermark,
            from_cache,
        };

        let cacheable = !self.fingerprint.is_test_package(import_path);
        if cacheable && let Some(archive) = self.load_cached(import_path, watermark) {
            info!(package = %import_path, "using cached archive");
            return Ok((archive, record(true)));
        }

        let pkg = {
            let mut importer = SessionImporter::new(&self.archives);
            check_package(self.oracle.as_ref(), import_path, &merged, &mut importer)?
        };
        let imports: Vec<String> = canonical.into_values().collect();
        let dependencies = self.dependencies_of(&imports);
        let archive = compile_package(
            &pkg,
            &merged.files,
            sources.joined_inc_js(),
            &dependencies,
            CompileOptions {
                minify: self.options.minify,
            },
        )?;
        if cacheable && let Some(cache) = &self.cache {
            cache.store(&self.fingerprint, &archive);
        }
        Ok((archive, record(false)))
    }

    /// A cached archive is usable when it was built after every input changed
    /// and against the same dependency archives this session holds.
    fn load_cached(&self, import_path: &str, watermark: u64) -> Option<Archive> {
        let cache = self.cache.as_ref()?;
        let archive: Archive = cache.load(&self.fingerprint, import_path)?;
        if archive.build_time < watermark {
            debug!(
                package = %import_path,
                built = archive.build_time,
                watermark,
                "cached archive is stale"
            );
            return None;
        }
        if !archive.dependencies_match(|dep| self.archives.get(dep).map(Archive::digest)) {
            return None;
        }
        Some(archive)
    }

    /// Archives of every transitive dependency of `imports`, in dependency
    /// order.
    fn dependencies_of(&self, imports: &[String]) -> Vec<&Archive> {
        let mut needed = BTreeSet::new();
        let mut pending: Vec<&str> = imports.iter().map(String::as_str).collect();
        while let Some(path) = pending.pop() {
            let Some(archive) = self.archives.get(path) else { continue };
            if needed.insert(path) {
                pending.extend(archive.imports.iter().map(String::as_str));
            }
        }
        self.order
            .iter()
            .filter(|p| needed.contains(p.as_str()))
            .filter_map(|p| self.archives.get(p))
            .collect()
    }

    /// Link the program rooted at `entry` into JavaScript source.
    pub fn link(&self, entry: &str) -> Result<String, BuildError> {
        let archive = self
            .archives
            .get(entry)
            .ok_or_else(|| LinkError::Missing(entry.to_string()))?;
        Ok(golower_compiler::link(archive, &self.archives)?)
    }

    /// Directory a built package was read from.
    pub fn package_dir(&self, import_path: &str) -> Option<&Path> {
        self.records.get(import_path).map(|r| r.dir.as_path())
    }
}

/// Parse the original and overlay files of a package, reporting the syntax
/// errors of both sets together, then merge them.
fn parse_and_merge(sources: &PackageSources) -> Result<MergedPackage, BuildError> {
    let originals = parse_all(&sources.files);
    let overlays = parse_all(&sources.overlays);
    let (originals, overlays) = match (originals, overlays) {
        (Ok(o), Ok(v)) => (o, v),
        (Err(mut e), Err(more)) => {
            e.extend(more);
            return Err(e.into());
        }
        (Err(e), _) | (_, Err(e)) => return Err(e.into()),
    };
    Ok(merge(originals, overlays)?)
}

fn parse_all(files: &[SourceFile]) -> Result<Vec<File>, ParseErrors> {
    let names: Vec<String> = files.iter().map(SourceFile::display_name).collect();
    parse_package(
        names
            .iter()
            .zip(files)
            .map(|(name, file)| (name.as_str(), file.source.as_str())),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn options(root: &Path) -> BuildOptions {
        BuildOptions {
            os: "js".into(),
            arch: "ecmascript".into(),
            tags: Vec::new(),
            goroot: root.join("go"),
            source_roots: vec![root.join("ws")],
            overlay_root: Some(root.join("overlays")),
            cache_dir: Some(root.join("cache")),
            minify: false,
            tested_package: None,
        }
    }

    #[test]
    fn test_builds_dependencies_first() {
        let tmp = TempDir::new().unwrap();
        write(
            &tmp.path().join("ws/src/fake/dep/dep.go"),
            "package dep\n\nfunc Double(x int) int {\n\treturn x * 2\n}\n",
        );
        write(
            &tmp.path().join("ws/src/fake/app/main.go"),
            "package main\n\nimport \"fake/dep\"\n\nfunc main() {\n\tprintln(dep.Double(2))\n}\n",
        );

        let mut session = BuildSession::new(options(tmp.path()));
        let entry = session.build_package("fake/app", None).unwrap();
        assert_eq!(session.packages(), ["fake/dep".to_string(), "fake/app".to_string()]);
        let app = session.archive(&entry).unwrap();
        assert_eq!(app.dependencies.len(), 1);
        assert_eq!(app.dependencies[0].import_path, "fake/dep");

        let js = session.link(&entry).unwrap();
        assert!(js.ends_with("$callMain($packages[\"fake/app\"]);\n"));
    }

    #[test]
    fn test_import_cycle() {
        let tmp = TempDir::new().unwrap();
        write(&tmp.path().join("ws/src/fake/a/a.go"), "package a\n\nimport _ \"fake/b\"\n");
        write(&tmp.path().join("ws/src/fake/b/b.go"), "package b\n\nimport _ \"fake/a\"\n");

        let mut session = BuildSession::new(options(tmp.path()));
        match session.build_package("fake/a", None) {
            Err(BuildError::ImportCycle(cycle)) => assert_eq!(cycle, ["fake/a", "fake/b", "fake/a"]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_errors_of_all_files_are_reported() {
        let tmp = TempDir::new().unwrap();
        write(&tmp.path().join("ws/src/fake/bad/a.go"), "package bad\n\nfunc A( {\n");
        write(&tmp.path().join("ws/src/fake/bad/b.go"), "package bad\n\nfunc B() int { return + }\n");

        let mut session = BuildSession::new(options(tmp.path()));
        match session.build_package("fake/bad", None) {
            Err(BuildError::Parse(errors)) => {
                let text = errors.to_string();
                assert!(text.contains("a.go"), "{text}");
                assert!(text.contains("b.go"), "{text}");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_cache_reuse_and_reset() {
        let tmp = TempDir::new().unwrap();
        write(
            &tmp.path().join("ws/src/fake/lib/lib.go"),
            "package lib\n\nfunc One() int {\n\treturn 1\n}\n",
        );

        let mut session = BuildSession::new(options(tmp.path()));
        session.build_package("fake/lib", None).unwrap();
        assert!(!session.from_cache("fake/lib"));
        let first = session.archive("fake/lib").unwrap().clone();

        session.reset();
        assert!(session.archive("fake/lib").is_none());
        session.build_package("fake/lib", None).unwrap();
        assert!(session.from_cache("fake/lib"));
        assert_eq!(session.archive("fake/lib").unwrap(), &first);
    }

    #[test]
    fn test_touched_source_invalidates_cache() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("ws/src/fake/lib/lib.go");
        write(&file, "package lib\n\nfunc One() int {\n\treturn 1\n}\n");

        let mut session = BuildSession::new(options(tmp.path()));
        session.build_package("fake/lib", None).unwrap();

        let later = std::time::SystemTime::now() + std::time::Duration::from_secs(3600);
        std::fs::File::options()
            .write(true)
            .open(&file)
            .unwrap()
            .set_modified(later)
            .unwrap();

        session.reset();
        session.build_package("fake/lib", None).unwrap();
        assert!(!session.from_cache("fake/lib"));
    }

    #[test]
    fn test_overlay_replacement_is_applied() {
        let tmp = TempDir::new().unwrap();
        write(
            &tmp.path().join("go/src/fake/clock/clock.go"),
            "package clock\n\nfunc Now() int {\n\treturn 0\n}\n",
        );
        write(
            &tmp.path().join("overlays/fake/clock/clock.go"),
            "package clock\n\nfunc Now() int {\n\treturn 42\n}\n",
        );

        let mut opts = options(tmp.path());
        opts.cache_dir = None;
        let mut session = BuildSession::new(opts);
        session.build_package("fake/clock", None).unwrap();
        let code = &session.archive("fake/clock").unwrap().code;
        assert!(code.contains("42"), "{code}");
    }

    #[test]
    fn test_unsafe_is_never_resolved() {
        let tmp = TempDir::new().unwrap();
        let mut session = BuildSession::new(options(tmp.path()));
        assert_eq!(session.build_package("unsafe", None).unwrap(), "unsafe");
        assert!(session.packages().is_empty());
    }
}
