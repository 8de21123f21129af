//! On-disk build cache for compiled package archives.
//!
//! Entries live at `<root>/<hh>/<hash>` where `hash` is the fingerprint key
//! for an import path and `hh` its first two characters. Files are gzip
//! wrapped so a truncated or corrupted entry fails its checksum on read.
//!
//! The cache is strictly best-effort: [`BuildCache::store`] never fails from
//! the caller's point of view and [`BuildCache::load`] turns every problem
//! into a miss. Deleting the whole directory at any time is always safe.

mod fingerprint;

pub use fingerprint::BuildFingerprint;

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::fs;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// Anything the cache can persist.
pub trait Cacheable: Sized {
    type Error: std::error::Error + Send + Sync + 'static;

    fn import_path(&self) -> &str;

    fn write_to(&self, w: &mut dyn Write) -> Result<(), Self::Error>;

    fn read_from(import_path: &str, r: &mut dyn Read) -> Result<Self, Self::Error>;
}

/// Internal failures. Logged, never returned from `store`/`load`.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to persist entry: {0}")]
    Persist(#[from] tempfile::PersistError),

    #[error("encoding error: {0}")]
    Codec(Box<dyn std::error::Error + Send + Sync>),

    #[error("entry is for {found:?}, expected {expected:?}")]
    WrongPackage { expected: String, found: String },
}

/// Platform cache root: `<user cache dir>/golower/build_cache`, or
/// `<goroot>/pkg/golower_build_cache` when the platform has none.
pub fn default_cache_root(goroot: &Path) -> PathBuf {
    match dirs::cache_dir() {
        Some(dir) => dir.join("golower").join("build_cache"),
        None => goroot.join("pkg").join("golower_build_cache"),
    }
}

#[derive(Debug, Clone)]
pub struct BuildCache {
    root: PathBuf,
}

impl BuildCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.root.join(&key[..2]).join(key)
    }

    /// Persist `entry` under `fp`. Returns whether anything was written.
    pub fn store<A: Cacheable>(&self, fp: &BuildFingerprint, entry: &A) -> bool {
        let import_path = entry.import_path();
        if fp.is_test_package(import_path) {
            return false;
        }
        match self.try_store(fp, entry) {
            Ok(path) => {
                tracing::debug!(package = import_path, path = %path.display(), "stored archive");
                true
            }
            Err(err) => {
                tracing::warn!(package = import_path, "failed to store cached archive: {err}");
                false
            }
        }
    }

    fn try_store<A: Cacheable>(&self, fp: &BuildFingerprint, entry: &A) -> Result<PathBuf, CacheError> {
        let path = self.entry_path(&fp.key(entry.import_path()));
        let Some(dir) = path.parent() else {
            return Err(io::Error::other("cache entry has no parent directory").into());
        };
        fs::create_dir_all(dir)?;

        // Write next to the final location so the rename stays on one filesystem.
        let tmp = tempfile::NamedTempFile::new_in(dir)?;
        {
            let mut gz = GzEncoder::new(BufWriter::new(tmp.as_file()), Compression::default());
            entry
                .write_to(&mut gz)
                .map_err(|e| CacheError::Codec(Box::new(e)))?;
            gz.finish()?.flush()?;
        }
        tmp.persist(&path)?;
        Ok(path)
    }

    /// Load the entry for `import_path`, or `None` on any kind of miss.
    pub fn load<A: Cacheable>(&self, fp: &BuildFingerprint, import_path: &str) -> Option<A> {
        if fp.is_test_package(import_path) {
            return None;
        }
        match self.try_load(fp, import_path) {
            Ok(Some(entry)) => {
                tracing::debug!(package = import_path, "cache hit");
                Some(entry)
            }
            Ok(None) => {
                tracing::debug!(package = import_path, "cache miss");
                None
            }
            Err(err) => {
                tracing::warn!(package = import_path, "ignoring unreadable cache entry: {err}");
                None
            }
        }
    }

    fn try_load<A: Cacheable>(&self, fp: &BuildFingerprint, import_path: &str) -> Result<Option<A>, CacheError> {
        let path = self.entry_path(&fp.key(import_path));
        let file = match fs::File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut gz = GzDecoder::new(BufReader::new(file));
        let entry = A::read_from(import_path, &mut gz).map_err(|e| CacheError::Codec(Box::new(e)))?;
        // Drain the stream so the gzip trailer checksum is verified.
        io::copy(&mut gz, &mut io::sink())?;
        if entry.import_path() != import_path {
            return Err(CacheError::WrongPackage {
                expected: import_path.to_string(),
                found: entry.import_path().to_string(),
            });
        }
        Ok(Some(entry))
    }

    /// Delete every cached entry.
    pub fn clear(&self) -> io::Result<()> {
        match fs::remove_dir_all(&self.root) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct FakeArchive {
        import_path: String,
        imports: Vec<String>,
        code: Vec<u8>,
    }

    impl Cacheable for FakeArchive {
        type Error = bincode::Error;

        fn import_path(&self) -> &str {
            &self.import_path
        }

        fn write_to(&self, w: &mut dyn Write) -> Result<(), Self::Error> {
            bincode::serialize_into(w, self)
        }

        fn read_from(_import_path: &str, r: &mut dyn Read) -> Result<Self, Self::Error> {
            bincode::deserialize_from(r)
        }
    }

    fn archive(path: &str, imports: &[&str]) -> FakeArchive {
        FakeArchive {
            import_path: path.to_string(),
            imports: imports.iter().map(|s| s.to_string()).collect(),
            code: b"$packages[\"x\"] = {};".to_vec(),
        }
    }

    fn fingerprint() -> BuildFingerprint {
        BuildFingerprint::new("js", "ecmascript")
            .with_goroot("/goroot")
            .with_tags(["netgo"])
    }

    #[test]
    fn test_store_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = BuildCache::new(dir.path());
        let fp = fingerprint();
        let want = archive("fake/package", &["fake/dep"]);

        assert!(cache.store(&fp, &want));
        let got: FakeArchive = cache.load(&fp, "fake/package").unwrap();
        assert_eq!(got, want);
        assert_eq!(got.imports, vec!["fake/dep".to_string()]);

        assert!(cache.load::<FakeArchive>(&fp, "fake/other").is_none());
    }

    #[test]
    fn test_entry_layout_is_sharded() {
        let dir = tempfile::tempdir().unwrap();
        let cache = BuildCache::new(dir.path());
        let fp = fingerprint();
        assert!(cache.store(&fp, &archive("a/b", &[])));
        let key = fp.key("a/b");
        assert!(dir.path().join(&key[..2]).join(&key).is_file());
    }

    #[test]
    fn test_different_fingerprint_misses() {
        let dir = tempfile::tempdir().unwrap();
        let cache = BuildCache::new(dir.path());
        let fp = fingerprint();
        assert!(cache.store(&fp, &archive("fake/package", &[])));

        let mut linux = fingerprint();
        linux.os = "linux".into();
        let mut wasm = fingerprint();
        wasm.arch = "wasm".into();
        let others = [
            linux,
            wasm,
            fingerprint().with_minify(true),
            fingerprint().with_goroot("/elsewhere"),
            fingerprint().with_tags(["netgo", "purego"]),
        ];
        for other in others {
            assert!(cache.load::<FakeArchive>(&other, "fake/package").is_none());
        }
    }

    #[test]
    fn test_corrupted_entry_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = BuildCache::new(dir.path());
        let fp = fingerprint();
        assert!(cache.store(&fp, &archive("fake/package", &[])));

        let key = fp.key("fake/package");
        let path = dir.path().join(&key[..2]).join(&key);
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();
        assert!(cache.load::<FakeArchive>(&fp, "fake/package").is_none());

        fs::write(&path, b"not gzip at all").unwrap();
        assert!(cache.load::<FakeArchive>(&fp, "fake/package").is_none());
    }

    #[test]
    fn test_tested_package_bypasses_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = BuildCache::new(dir.path());
        let fp = fingerprint().with_tested_package("fake/package");
        assert!(!cache.store(&fp, &archive("fake/package", &[])));
        assert!(!cache.store(&fp, &archive("fake/package_test", &[])));
        assert!(cache.store(&fp, &archive("fake/dep", &[])));
        assert!(cache.load::<FakeArchive>(&fp, "fake/package").is_none());
    }

    #[test]
    fn test_store_failure_is_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the cache root directory should be.
        let root = dir.path().join("root");
        fs::write(&root, b"").unwrap();
        let cache = BuildCache::new(&root);
        assert!(!cache.store(&fingerprint(), &archive("fake/package", &[])));
        assert!(cache.load::<FakeArchive>(&fingerprint(), "fake/package").is_none());
    }

    #[test]
    fn test_clear_removes_everything() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("cache");
        let cache = BuildCache::new(&root);
        let fp = fingerprint();
        assert!(cache.store(&fp, &archive("fake/package", &[])));
        cache.clear().unwrap();
        assert!(!root.exists());
        assert!(cache.load::<FakeArchive>(&fp, "fake/package").is_none());
        // Clearing an absent cache is fine.
        cache.clear().unwrap();
    }
}
