//! Package resolution: import path to source files on disk.
//!
//! Lookup order for an import path:
//! 1. `<goroot>/src/<path>` (standard library)
//! 2. the module whose `go.mod` declares a prefix of `<path>`
//! 3. each `<source_root>/src/<path>`
//! 4. for `./` and `../` imports, a directory relative to the importer
//!
//! Some standard-library packages use a fixed file list instead of a plain
//! directory listing, see [`file_list`].

use std::path::{Component, Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use golower_tags::{TagSet, Verdict, evaluate, good_os_arch_file};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::BuildError;

/// The primitive package. It has no sources and is never resolved.
pub const PRIMITIVE_PACKAGE: &str = "unsafe";

/// Import path of a package named by directory outside any module or root.
pub const COMMAND_LINE_PACKAGE: &str = "command-line-arguments";

const INC_JS_SUFFIX: &str = ".inc.js";

/// How a special package picks its original files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileList {
    /// No original files; the package is made of overlay files only.
    OverlayOnly,
    /// The directory listing minus these names.
    Without(&'static [&'static str]),
}

/// Hand-maintained file lists for standard-library packages whose original
/// files must be substituted wholesale.
pub fn file_list(import_path: &str) -> Option<FileList> {
    match import_path {
        "runtime" | "runtime/pprof" | "syscall/js" => Some(FileList::OverlayOnly),
        "sync" => Some(FileList::Without(&["pool.go"])),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub source: String,
    /// Modification time in seconds since the Unix epoch.
    pub mtime: u64,
}

impl SourceFile {
    pub fn read(path: &Path) -> Result<Self, BuildError> {
        let source = std::fs::read_to_string(path).map_err(|e| BuildError::io(path, e))?;
        let mtime = std::fs::metadata(path)
            .and_then(|m| m.modified())
            .map(unix_seconds)
            .map_err(|e| BuildError::io(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            source,
            mtime,
        })
    }

    /// Name used in diagnostics.
    pub fn display_name(&self) -> String {
        self.path.display().to_string()
    }
}

/// Everything read from disk for one package.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageSources {
    pub import_path: String,
    pub dir: PathBuf,
    pub files: Vec<SourceFile>,
    pub overlays: Vec<SourceFile>,
    /// Raw JavaScript shipped with the package or its overlay.
    pub inc_js: Vec<SourceFile>,
}

impl PackageSources {
    /// Newest modification time among all files read.
    pub fn newest(&self) -> u64 {
        self.files
            .iter()
            .chain(&self.overlays)
            .chain(&self.inc_js)
            .map(|f| f.mtime)
            .max()
            .unwrap_or(0)
    }

    pub fn joined_inc_js(&self) -> String {
        let mut out = String::new();
        for file in &self.inc_js {
            out.push_str(&file.source);
            if !file.source.ends_with('\n') {
                out.push('\n');
            }
        }
        out
    }
}

/// A module found through its `go.mod`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    pub path: String,
    pub root: PathBuf,
}

#[derive(Debug, Clone)]
pub struct Resolver {
    goroot: PathBuf,
    source_roots: Vec<PathBuf>,
    overlay_root: Option<PathBuf>,
    tags: TagSet,
    tested_package: Option<String>,
    modules: Vec<Module>,
}

impl Resolver {
    pub fn new(
        goroot: impl Into<PathBuf>,
        source_roots: Vec<PathBuf>,
        overlay_root: Option<PathBuf>,
        tags: TagSet,
    ) -> Self {
        Self {
            goroot: goroot.into(),
            source_roots,
            overlay_root,
            tags,
            tested_package: None,
            modules: Vec::new(),
        }
    }

    /// Include `_test.go` files of `import_path`.
    pub fn with_tested_package(mut self, import_path: impl Into<String>) -> Self {
        self.tested_package = Some(import_path.into());
        self
    }

    pub fn tags(&self) -> &TagSet {
        &self.tags
    }

    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    /// Import path of the package in `dir`, registering the enclosing module
    /// if there is one.
    pub fn import_path_of_dir(&mut self, dir: &Path) -> String {
        if let Some(module) = find_module(dir) {
            let path = match dir.strip_prefix(&module.root) {
                Ok(rest) if rest.as_os_str().is_empty() => module.path.clone(),
                Ok(rest) => format!("{}/{}", module.path, slash_path(rest)),
                Err(_) => module.path.clone(),
            };
            if !self.modules.contains(&module) {
                debug!(module = %module.path, root = %module.root.display(), "found module");
                self.modules.push(module);
            }
            return path;
        }
        for root in &self.source_roots {
            if let Ok(rest) = dir.strip_prefix(root.join("src")) {
                return slash_path(rest);
            }
        }
        COMMAND_LINE_PACKAGE.to_string()
    }

    /// Find the directory of `import_path`, imported from a package in
    /// `from_dir`. Returns the canonical import path together with the
    /// directory.
    pub fn find(&self, import_path: &str, from_dir: Option<&Path>) -> Result<(String, PathBuf), BuildError> {
        if is_local_import(import_path) {
            let base = from_dir.unwrap_or_else(|| Path::new("."));
            let dir = normalize(&base.join(import_path));
            if dir.is_dir() {
                return Ok((format!("_{}", slash_path(&dir)), dir));
            }
            return Err(BuildError::NotFound {
                path: import_path.to_string(),
                searched: vec![dir],
            });
        }

        let mut searched = Vec::new();
        let std_dir = self.goroot.join("src").join(import_path);
        if std_dir.is_dir() {
            return Ok((import_path.to_string(), std_dir));
        }
        searched.push(std_dir.clone());
        if file_list(import_path) == Some(FileList::OverlayOnly)
            && let Some(overlay) = self.overlay_dir(import_path)
            && overlay.is_dir()
        {
            return Ok((import_path.to_string(), std_dir));
        }

        for module in &self.modules {
            let rest = if import_path == module.path {
                Some("")
            } else {
                import_path
                    .strip_prefix(module.path.as_str())
                    .and_then(|r| r.strip_prefix('/'))
            };
            if let Some(rest) = rest {
                let dir = module.root.join(rest);
                if dir.is_dir() {
                    return Ok((import_path.to_string(), dir));
                }
                searched.push(dir);
            }
        }

        for root in &self.source_roots {
            let dir = root.join("src").join(import_path);
            if dir.is_dir() {
                return Ok((import_path.to_string(), dir));
            }
            searched.push(dir);
        }
        Err(BuildError::NotFound {
            path: import_path.to_string(),
            searched,
        })
    }

    fn overlay_dir(&self, import_path: &str) -> Option<PathBuf> {
        self.overlay_root.as_ref().map(|root| root.join(import_path))
    }

    /// Read the participating files of the package at `dir`.
    pub fn load(&self, import_path: &str, dir: &Path) -> Result<PackageSources, BuildError> {
        let mut sources = PackageSources {
            import_path: import_path.to_string(),
            dir: dir.to_path_buf(),
            ..PackageSources::default()
        };

        let list = file_list(import_path);
        if list != Some(FileList::OverlayOnly) {
            let skip: &[&str] = match list {
                Some(FileList::Without(names)) => names,
                _ => &[],
            };
            for path in list_dir(dir)? {
                let Some(name) = file_name(&path) else { continue };
                if skip.contains(&name) {
                    debug!(package = %import_path, file = %name, "file replaced by overlay");
                    continue;
                }
                if name.ends_with(INC_JS_SUFFIX) {
                    sources.inc_js.push(SourceFile::read(&path)?);
                } else if self.wants_go_file(import_path, name) {
                    let file = SourceFile::read(&path)?;
                    if self.constraints_hold(&file) {
                        sources.files.push(file);
                    }
                }
            }
        }

        if let Some(overlay) = self.overlay_dir(import_path)
            && overlay.is_dir()
        {
            for path in list_dir(&overlay)? {
                let Some(name) = file_name(&path) else { continue };
                if name.ends_with(INC_JS_SUFFIX) {
                    sources.inc_js.push(SourceFile::read(&path)?);
                } else if self.wants_go_file(import_path, name) {
                    let file = SourceFile::read(&path)?;
                    if self.constraints_hold(&file) {
                        sources.overlays.push(file);
                    }
                }
            }
        }

        if sources.files.is_empty() && sources.overlays.is_empty() {
            return Err(BuildError::NoGoFiles(dir.to_path_buf()));
        }
        debug!(
            package = %import_path,
            files = sources.files.len(),
            overlays = sources.overlays.len(),
            "resolved package"
        );
        Ok(sources)
    }

    /// File-name rules: `.go`, not hidden, tests only for the tested package,
    /// and a matching `_GOOS`/`_GOARCH` suffix.
    fn wants_go_file(&self, import_path: &str, name: &str) -> bool {
        if !name.ends_with(".go") || name.starts_with('_') || name.starts_with('.') {
            return false;
        }
        if name.ends_with("_test.go") && self.tested_package.as_deref() != Some(import_path) {
            return false;
        }
        good_os_arch_file(name, &self.tags)
    }

    fn constraints_hold(&self, file: &SourceFile) -> bool {
        match evaluate(&file.source, &self.tags) {
            Verdict::Included => true,
            Verdict::Excluded { line } => {
                debug!(file = %file.path.display(), %line, "excluded by build constraint");
                false
            }
            Verdict::Malformed { line, reason } => {
                warn!(file = %file.path.display(), %line, %reason, "malformed build constraint");
                false
            }
        }
    }
}

/// Modification time of the running compiler, if it can be located.
pub fn compiler_mtime() -> Option<u64> {
    let exe = match std::env::current_exe() {
        Ok(exe) => exe,
        Err(err) => {
            warn!(error = %err, "cannot locate compiler binary, staleness uses sources only");
            return None;
        }
    };
    match std::fs::metadata(&exe).and_then(|m| m.modified()) {
        Ok(time) => Some(unix_seconds(time)),
        Err(err) => {
            warn!(path = %exe.display(), error = %err, "cannot stat compiler binary, staleness uses sources only");
            None
        }
    }
}

/// The module path declared by go.mod content.
pub fn parse_module_path(content: &str) -> Option<String> {
    content.lines().find_map(|line| {
        let rest = line.trim().strip_prefix("module")?;
        if !rest.starts_with(char::is_whitespace) {
            return None;
        }
        let path = rest.trim().trim_matches('"');
        (!path.is_empty()).then(|| path.to_string())
    })
}

/// The module enclosing `dir`, found by walking up to the nearest go.mod.
pub fn find_module(dir: &Path) -> Option<Module> {
    let mut current = Some(dir);
    while let Some(d) = current {
        let go_mod = d.join("go.mod");
        if go_mod.is_file() {
            let content = std::fs::read_to_string(&go_mod).ok()?;
            return parse_module_path(&content).map(|path| Module {
                path,
                root: d.to_path_buf(),
            });
        }
        current = d.parent();
    }
    None
}

fn is_local_import(path: &str) -> bool {
    path == "." || path == ".." || path.starts_with("./") || path.starts_with("../")
}

fn list_dir(dir: &Path) -> Result<Vec<PathBuf>, BuildError> {
    let mut paths = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let source = e
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("directory walk failed"));
            BuildError::io(dir, source)
        })?;
        if entry.file_type().is_file() {
            paths.push(entry.into_path());
        }
    }
    Ok(paths)
}

fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}

fn slash_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(s) => s.to_str(),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Lexically resolve `.` and `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

pub(crate) fn unix_seconds(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn resolver(goroot: &Path, overlay: Option<PathBuf>) -> Resolver {
        Resolver::new(goroot, Vec::new(), overlay, TagSet::with_platform("js", "ecmascript", Vec::<String>::new()))
    }

    fn names(files: &[SourceFile]) -> Vec<String> {
        files
            .iter()
            .map(|f| f.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_file_selection() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("src/fake/pkg");
        write(&dir.join("a.go"), "package pkg\n");
        write(&dir.join("a_test.go"), "package pkg\n");
        write(&dir.join("_skip.go"), "package pkg\n");
        write(&dir.join("b_linux.go"), "package pkg\n");
        write(&dir.join("c_js.go"), "package pkg\n");
        write(&dir.join("d.go"), "//go:build linux\n\npackage pkg\n");
        write(&dir.join("e.go"), "//go:build js && !wasm\n\npackage pkg\n");
        write(&dir.join("f.go"), "//go:build (js\n\npackage pkg\n");
        write(&dir.join("g.inc.js"), "var g = 1;");
        write(&dir.join("notes.txt"), "");

        let r = resolver(tmp.path(), None);
        let (path, found) = r.find("fake/pkg", None).unwrap();
        assert_eq!(path, "fake/pkg");
        let sources = r.load(&path, &found).unwrap();
        assert_eq!(names(&sources.files), vec!["a.go", "c_js.go", "e.go"]);
        assert_eq!(names(&sources.inc_js), vec!["g.inc.js"]);
        assert_eq!(sources.joined_inc_js(), "var g = 1;\n");

        let tested = resolver(tmp.path(), None).with_tested_package("fake/pkg");
        let sources = tested.load("fake/pkg", &found).unwrap();
        assert!(names(&sources.files).contains(&"a_test.go".to_string()));
    }

    #[test]
    fn test_special_file_lists() {
        let tmp = TempDir::new().unwrap();
        write(&tmp.path().join("go/src/sync/mutex.go"), "package sync\n");
        write(&tmp.path().join("go/src/sync/pool.go"), "package sync\n");
        write(&tmp.path().join("go/src/runtime/proc.go"), "package runtime\n");
        write(&tmp.path().join("overlays/runtime/runtime.go"), "package runtime\n");
        write(&tmp.path().join("overlays/sync/pool.go"), "package sync\n");

        let r = resolver(&tmp.path().join("go"), Some(tmp.path().join("overlays")));
        let (_, dir) = r.find("sync", None).unwrap();
        let sync = r.load("sync", &dir).unwrap();
        assert_eq!(names(&sync.files), vec!["mutex.go"]);
        assert_eq!(names(&sync.overlays), vec!["pool.go"]);

        let (_, dir) = r.find("runtime", None).unwrap();
        let runtime = r.load("runtime", &dir).unwrap();
        assert!(runtime.files.is_empty());
        assert_eq!(names(&runtime.overlays), vec!["runtime.go"]);
    }

    #[test]
    fn test_lookup_order_and_not_found() {
        let tmp = TempDir::new().unwrap();
        write(&tmp.path().join("go/src/strings/s.go"), "package strings\n");
        write(&tmp.path().join("ws/src/strings/s.go"), "package strings\n");
        write(&tmp.path().join("ws/src/example.com/lib/l.go"), "package lib\n");

        let r = Resolver::new(
            tmp.path().join("go"),
            vec![tmp.path().join("ws")],
            None,
            TagSet::new(),
        );
        assert_eq!(r.find("strings", None).unwrap().1, tmp.path().join("go/src/strings"));
        assert_eq!(
            r.find("example.com/lib", None).unwrap().1,
            tmp.path().join("ws/src/example.com/lib")
        );
        match r.find("example.com/missing", None) {
            Err(BuildError::NotFound { path, searched }) => {
                assert_eq!(path, "example.com/missing");
                assert_eq!(searched.len(), 2);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_modules_and_relative_imports() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("proj");
        write(&root.join("go.mod"), "module example.com/proj\n\ngo 1.21\n");
        write(&root.join("cmd/app/main.go"), "package main\n");
        write(&root.join("util/u.go"), "package util\n");

        let mut r = resolver(&tmp.path().join("go"), None);
        assert_eq!(r.import_path_of_dir(&root.join("cmd/app")), "example.com/proj/cmd/app");
        assert_eq!(r.modules().len(), 1);
        assert_eq!(r.find("example.com/proj/util", None).unwrap().1, root.join("util"));

        let (path, dir) = r.find("../../util", Some(&root.join("cmd/app"))).unwrap();
        assert_eq!(dir, root.join("util"));
        assert!(path.starts_with('_'));

        let loose = tmp.path().join("loose");
        std::fs::create_dir_all(&loose).unwrap();
        assert_eq!(r.import_path_of_dir(&loose), COMMAND_LINE_PACKAGE);
    }

    #[test]
    fn test_no_go_files() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("src/empty");
        write(&dir.join("only_linux.go"), "package empty\n");
        let r = resolver(tmp.path(), None);
        assert!(matches!(r.load("empty", &dir), Err(BuildError::NoGoFiles(_))));
    }

    #[test]
    fn test_parse_module_path() {
        assert_eq!(parse_module_path("module example.com/x\n"), Some("example.com/x".into()));
        assert_eq!(parse_module_path("// c\nmodule \"q/r\"\n"), Some("q/r".into()));
        assert_eq!(parse_module_path("modules x\n"), None);
        assert_eq!(parse_module_path("go 1.21\n"), None);
    }
}
