//! Configuration for golower.
//!
//! Loaded from `.golower/config.toml` under the project root, then
//! overridden by `GOLOWER_GOROOT` and `GOLOWER_CACHE_DIR`. Command-line
//! flags override both.
//!
//! Example config.toml:
//! ```toml
//! [target]
//! tags = ["experimental"]
//!
//! [paths]
//! goroot = "/usr/local/go"
//! source_roots = ["/home/me/go"]
//! overlay_root = "/opt/golower/overlays"
//!
//! [cache]
//! enabled = true
//!
//! [build]
//! minify = false
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_OS: &str = "js";
pub const DEFAULT_ARCH: &str = "ecmascript";

/// Target platform and extra build tags.
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct TargetConfig {
    pub os: Option<String>,
    pub arch: Option<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct PathsConfig {
    /// Toolchain root holding the standard library under `src/`.
    pub goroot: Option<PathBuf>,
    /// Workspace roots searched as `<root>/src/<import path>`.
    pub source_roots: Vec<PathBuf>,
    /// Directory of overlay packages, laid out by import path.
    pub overlay_root: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: Option<bool>,
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct BuildConfig {
    pub minify: bool,
}

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct GolowerConfig {
    pub target: TargetConfig,
    pub paths: PathsConfig,
    pub cache: CacheConfig,
    pub build: BuildConfig,
}

impl GolowerConfig {
    /// Load the configuration of the project at `root`, with environment
    /// overrides applied.
    pub fn load(root: &Path) -> Self {
        let path = root.join(".golower").join("config.toml");
        Self::load_file(&path).with_env(|key| std::env::var(key).ok())
    }

    /// Parse `path`. A missing file yields defaults; an unreadable or invalid
    /// one is reported and also yields defaults.
    pub fn load_file(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "cannot read config");
                return Self::default();
            }
        };
        match toml::from_str(&content) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "invalid config, using defaults");
                Self::default()
            }
        }
    }

    /// Apply `GOLOWER_GOROOT` and `GOLOWER_CACHE_DIR` as looked up by `env`.
    pub fn with_env(mut self, env: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(goroot) = env("GOLOWER_GOROOT").filter(|s| !s.is_empty()) {
            self.paths.goroot = Some(PathBuf::from(goroot));
        }
        if let Some(dir) = env("GOLOWER_CACHE_DIR").filter(|s| !s.is_empty()) {
            self.cache.dir = Some(PathBuf::from(dir));
        }
        self
    }

    pub fn os(&self) -> &str {
        self.target.os.as_deref().unwrap_or(DEFAULT_OS)
    }

    pub fn arch(&self) -> &str {
        self.target.arch.as_deref().unwrap_or(DEFAULT_ARCH)
    }

    pub fn goroot(&self) -> PathBuf {
        self.paths.goroot.clone().unwrap_or_else(|| PathBuf::from("/usr/local/go"))
    }

    pub fn cache_enabled(&self) -> bool {
        self.cache.enabled.unwrap_or(true)
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.cache
            .dir
            .clone()
            .unwrap_or_else(|| golower_cache::default_cache_root(&self.goroot()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = GolowerConfig::default();
        assert_eq!(config.os(), "js");
        assert_eq!(config.arch(), "ecmascript");
        assert!(config.cache_enabled());
        assert!(!config.build.minify);
    }

    #[test]
    fn test_load_project_config() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join(".golower");
        std::fs::create_dir_all(&dir).unwrap();
        let mut file = std::fs::File::create(dir.join("config.toml")).unwrap();
        writeln!(
            file,
            "[target]\ntags = [\"x\"]\n\n[paths]\ngoroot = \"/go\"\nsource_roots = [\"/ws\"]\n\n[cache]\nenabled = false\n\n[build]\nminify = true"
        )
        .unwrap();

        let config = GolowerConfig::load_file(&dir.join("config.toml"));
        assert_eq!(config.target.tags, vec!["x".to_string()]);
        assert_eq!(config.goroot(), PathBuf::from("/go"));
        assert_eq!(config.paths.source_roots, vec![PathBuf::from("/ws")]);
        assert!(!config.cache_enabled());
        assert!(config.build.minify);
        assert_eq!(config.os(), "js");
    }

    #[test]
    fn test_missing_and_invalid_config() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(GolowerConfig::load_file(&tmp.path().join("none.toml")), GolowerConfig::default());

        let path = tmp.path().join("bad.toml");
        std::fs::write(&path, "[target\nos = 1").unwrap();
        assert_eq!(GolowerConfig::load_file(&path), GolowerConfig::default());
    }

    #[test]
    fn test_env_overrides() {
        let config = GolowerConfig::default().with_env(|key| match key {
            "GOLOWER_GOROOT" => Some("/env/go".into()),
            "GOLOWER_CACHE_DIR" => Some("/env/cache".into()),
            _ => None,
        });
        assert_eq!(config.goroot(), PathBuf::from("/env/go"));
        assert_eq!(config.cache_dir(), PathBuf::from("/env/cache"));
    }
}
