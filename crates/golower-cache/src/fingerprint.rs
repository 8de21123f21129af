//! Build configuration fingerprints.

use serde::{Deserialize, Serialize};

/// Every configuration input that must match for a cached archive to be
/// reusable.
///
/// Source file contents are deliberately absent. Staleness is detected by
/// comparing modification-time watermarks against the archive build time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BuildFingerprint {
    pub os: String,
    pub arch: String,
    /// Toolchain (standard library) root.
    pub goroot: String,
    /// Additional source roots, joined with the platform separator.
    pub gopath: String,
    tags: Vec<String>,
    pub minify: bool,
    /// Compiler version string.
    pub version: String,
    /// Package under test, if this build compiles test sources.
    pub tested_package: Option<String>,
}

impl BuildFingerprint {
    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            ..Self::default()
        }
    }

    pub fn with_goroot(mut self, goroot: impl Into<String>) -> Self {
        self.goroot = goroot.into();
        self
    }

    pub fn with_gopath(mut self, gopath: impl Into<String>) -> Self {
        self.gopath = gopath.into();
        self
    }

    pub fn with_minify(mut self, minify: bool) -> Self {
        self.minify = minify;
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_tested_package(mut self, path: impl Into<String>) -> Self {
        self.tested_package = Some(path.into());
        self
    }

    /// Set the feature tags. Order and duplicates do not affect the key.
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut tags: Vec<String> = tags.into_iter().map(Into::into).collect();
        tags.sort();
        tags.dedup();
        self.tags = tags;
        self
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Whether archives for `import_path` include test sources and so must
    /// bypass the cache.
    pub fn is_test_package(&self, import_path: &str) -> bool {
        match &self.tested_package {
            Some(tested) => {
                import_path == tested
                    || import_path
                        .strip_prefix(tested.as_str())
                        .is_some_and(|rest| rest == "_test")
            }
            None => false,
        }
    }

    /// Content-addressed key for `import_path` under this configuration.
    pub fn key(&self, import_path: &str) -> String {
        let fields = [
            format!("os={}", self.os),
            format!("arch={}", self.arch),
            format!("goroot={}", self.goroot),
            format!("gopath={}", self.gopath),
            format!("tags={}", self.tags.join(",")),
            format!("minify={}", self.minify),
            format!("version={}", self.version),
            format!(
                "tested={}",
                self.tested_package.as_deref().unwrap_or_default()
            ),
            format!("import={import_path}"),
        ];
        blake3::hash(fields.join("\n").as_bytes()).to_hex().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> BuildFingerprint {
        BuildFingerprint::new("js", "ecmascript")
            .with_goroot("/usr/lib/go")
            .with_tags(["netgo", "purego"])
            .with_version("1.0")
    }

    #[test]
    fn test_key_is_stable() {
        assert_eq!(base().key("fmt"), base().key("fmt"));
        assert_eq!(base().key("fmt").len(), 64);
    }

    #[test]
    fn test_key_changes_with_each_field() {
        let key = base().key("fmt");
        let variants = [
            base().with_goroot("/opt/go"),
            base().with_gopath("/home/u/go"),
            base().with_tags(["netgo"]),
            base().with_minify(true),
            base().with_version("1.1"),
            base().with_tested_package("fmt"),
            BuildFingerprint { os: "linux".into(), ..base() },
            BuildFingerprint { arch: "wasm".into(), ..base() },
        ];
        for fp in variants {
            assert_ne!(fp.key("fmt"), key, "{fp:?}");
        }
        assert_ne!(base().key("os"), key);
    }

    #[test]
    fn test_tag_order_is_irrelevant() {
        let a = base().with_tags(["b", "a", "a"]);
        let b = base().with_tags(["a", "b"]);
        assert_eq!(a, b);
        assert_eq!(a.key("x"), b.key("x"));
    }

    #[test]
    fn test_is_test_package() {
        let fp = base().with_tested_package("strings");
        assert!(fp.is_test_package("strings"));
        assert!(fp.is_test_package("strings_test"));
        assert!(!fp.is_test_package("strings/internal"));
        assert!(!base().is_test_package("strings"));
    }
}
