//! End-to-end builds over scratch source trees.

use std::path::{Path, PathBuf};

use golower::{BuildError, BuildOptions, BuildSession};
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
        source_roots: Vec::new(),
        overlay_root: Some(root.join("overlays")),
        cache_dir: Some(root.join("cache")),
        minify: false,
        tested_package: None,
    }
}

fn project(root: &Path) -> PathBuf {
    write(
        &root.join("go/src/fake/strs/strs.go"),
        "package strs\n\nfunc Repeat(s string, n int) string {\n\tout := \"\"\n\tfor i := 0; i < n; i++ {\n\t\tout += s\n\t}\n\treturn out\n}\n",
    );
    write(
        &root.join("go/src/fake/strs/strs_linux.go"),
        "package strs\n\nfunc Broken( {\n",
    );
    let proj = root.join("proj");
    write(&proj.join("go.mod"), "module example.com/proj\n\ngo 1.21\n");
    write(
        &proj.join("greet/greet.go"),
        "package greet\n\nimport \"fake/strs\"\n\nfunc Hello(n int) string {\n\treturn \"hi\" + strs.Repeat(\"!\", n)\n}\n",
    );
    write(
        &proj.join("cmd/app/main.go"),
        "package main\n\nimport \"example.com/proj/greet\"\n\nfunc main() {\n\tprintln(greet.Hello(3))\n}\n",
    );
    proj
}

#[test]
fn test_build_and_link_module_program() {
    let tmp = TempDir::new().unwrap();
    let proj = project(tmp.path());

    let mut session = BuildSession::new(options(tmp.path()));
    let entry = session.build_dir(&proj.join("cmd/app")).unwrap();
    assert_eq!(entry, "example.com/proj/cmd/app");
    assert_eq!(
        session.packages(),
        ["fake/strs", "example.com/proj/greet", "example.com/proj/cmd/app"]
    );

    let js = session.link(&entry).unwrap();
    let strs = js.find("$packages[\"fake/strs\"]").unwrap();
    let greet = js.find("$packages[\"example.com/proj/greet\"]").unwrap();
    assert!(strs < greet);
    assert!(js.ends_with("$callMain($packages[\"example.com/proj/cmd/app\"]);\n"));
}

#[test]
fn test_second_session_uses_cache() {
    let tmp = TempDir::new().unwrap();
    let proj = project(tmp.path());

    let mut first = BuildSession::new(options(tmp.path()));
    let entry = first.build_dir(&proj.join("cmd/app")).unwrap();
    let linked = first.link(&entry).unwrap();

    let mut second = BuildSession::new(options(tmp.path()));
    second.build_dir(&proj.join("cmd/app")).unwrap();
    for path in second.packages() {
        assert!(second.from_cache(path), "{path} was rebuilt");
    }
    assert_eq!(second.link(&entry).unwrap(), linked);
}

#[test]
fn test_corrupt_cache_entries_are_misses() {
    let tmp = TempDir::new().unwrap();
    let proj = project(tmp.path());

    let mut first = BuildSession::new(options(tmp.path()));
    first.build_dir(&proj.join("cmd/app")).unwrap();

    for entry in walkdir_files(&tmp.path().join("cache")) {
        std::fs::write(entry, b"garbage").unwrap();
    }

    let mut second = BuildSession::new(options(tmp.path()));
    second.build_dir(&proj.join("cmd/app")).unwrap();
    assert!(!second.from_cache("fake/strs"));
}

fn walkdir_files(dir: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    for entry in std::fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
            out.extend(walkdir_files(&path));
        } else {
            out.push(path);
        }
    }
    out
}

#[test]
fn test_build_constraint_scenario() {
    let tmp = TempDir::new().unwrap();
    write(
        &tmp.path().join("go/src/fake/osonly/a.go"),
        "//go:build linux\n\npackage osonly\n\nfunc F() int { return 1 }\n",
    );

    let mut windows = options(tmp.path());
    windows.os = "windows".into();
    windows.arch = "amd64".into();
    let err = BuildSession::new(windows).build_package("fake/osonly", None).unwrap_err();
    assert!(matches!(err, BuildError::NoGoFiles(_)), "{err}");

    let mut linux = options(tmp.path());
    linux.os = "linux".into();
    linux.arch = "arm".into();
    BuildSession::new(linux).build_package("fake/osonly", None).unwrap();
}

#[test]
fn test_conflicting_overlays_fail_before_type_checking() {
    let tmp = TempDir::new().unwrap();
    write(
        &tmp.path().join("go/src/fake/target/t.go"),
        "package target\n\nfunc Foo() int { return undefinedName }\n",
    );
    write(
        &tmp.path().join("overlays/fake/target/a.go"),
        "package target\n\n//golower:replace\nfunc Foo() int { return 1 }\n",
    );
    write(
        &tmp.path().join("overlays/fake/target/b.go"),
        "package target\n\n//golower:replace\nfunc Foo() int { return 2 }\n",
    );

    let err = BuildSession::new(options(tmp.path()))
        .build_package("fake/target", None)
        .unwrap_err();
    assert!(matches!(err, BuildError::Merge(_)), "{err}");
}

#[test]
fn test_keep_original_overlay() {
    let tmp = TempDir::new().unwrap();
    write(
        &tmp.path().join("go/src/fake/clock/clock.go"),
        "package clock\n\nfunc Now() int {\n\treturn 1\n}\n",
    );
    write(
        &tmp.path().join("overlays/fake/clock/clock.go"),
        "package clock\n\n//golower:keep-original\nfunc Now() int {\n\treturn _golower_original_Now() + 1\n}\n",
    );
    write(&tmp.path().join("overlays/fake/clock/clock.inc.js"), "var $clockShim = true;\n");

    let mut session = BuildSession::new(options(tmp.path()));
    session.build_package("fake/clock", None).unwrap();
    let archive = session.archive("fake/clock").unwrap();
    assert!(archive.code.contains("_golower_original_Now"), "{}", archive.code);
    assert_eq!(archive.inc_js, "var $clockShim = true;\n");
}

#[test]
fn test_type_errors_abort_the_build() {
    let tmp = TempDir::new().unwrap();
    write(
        &tmp.path().join("go/src/fake/bad/bad.go"),
        "package bad\n\nfunc F() int {\n\treturn missing\n}\n",
    );
    let mut session = BuildSession::new(options(tmp.path()));
    let err = session.build_package("fake/bad", None).unwrap_err();
    let BuildError::TypeCheck { path, errors } = err else {
        panic!("expected a type error");
    };
    assert_eq!(path, "fake/bad");
    assert!(errors.to_string().contains("missing"));
    assert!(session.archive("fake/bad").is_none());
}
