//! Compiled package archives.
//!
//! Byte layout: the magic `GLAR`, a little-endian `u32` format version, then
//! the bincode encoding of [`Archive`]. Field order is the on-disk order:
//! header, dependency blocks, code, export metadata, timestamp.

use std::io::{Read, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use golower_cache::Cacheable;
use golower_types::ExportData;
use serde::{Deserialize, Serialize};

use crate::error::ArchiveError;

const MAGIC: &[u8; 4] = b"GLAR";
const FORMAT_VERSION: u32 = 1;

/// A dependency this archive was compiled against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyBlock {
    pub import_path: String,
    /// [`Archive::digest`] of the dependency at compile time.
    pub digest: String,
}

impl DependencyBlock {
    pub fn of(archive: &Archive) -> Self {
        Self {
            import_path: archive.import_path.clone(),
            digest: archive.digest(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Archive {
    pub import_path: String,
    pub name: String,
    /// Direct imports, as written in the sources.
    pub imports: Vec<String>,
    /// Every transitive dependency, in topological order.
    pub dependencies: Vec<DependencyBlock>,
    pub code: String,
    /// Hand-written JavaScript shipped with the package.
    pub inc_js: String,
    pub export: ExportData,
    pub minified: bool,
    /// Seconds since the Unix epoch.
    pub build_time: u64,
}

impl Archive {
    pub fn new(export: ExportData, code: String) -> Self {
        Self {
            import_path: export.path.clone(),
            name: export.name.clone(),
            imports: export.imports.clone(),
            dependencies: Vec::new(),
            code,
            inc_js: String::new(),
            export,
            minified: false,
            build_time: now(),
        }
    }

    /// Hash of everything a dependent relies on: the code and the export
    /// metadata.
    pub fn digest(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.code.as_bytes());
        hasher.update(&[0]);
        hasher.update(self.inc_js.as_bytes());
        hasher.update(&[0]);
        // Serializing plain data into memory cannot fail.
        if let Ok(export) = bincode::serialize(&self.export) {
            hasher.update(&export);
        }
        hasher.finalize().to_hex().to_string()
    }

    /// Whether every recorded dependency still has the digest it had when
    /// this archive was built. `current` returns the digest of a dependency
    /// as known to the running build.
    pub fn dependencies_match(&self, mut current: impl FnMut(&str) -> Option<String>) -> bool {
        self.dependencies.iter().all(|dep| {
            let matches = current(&dep.import_path).as_deref() == Some(dep.digest.as_str());
            if !matches {
                tracing::debug!(
                    package = %self.import_path,
                    dependency = %dep.import_path,
                    "dependency changed since archive was built"
                );
            }
            matches
        })
    }

    pub fn write(&self, w: &mut dyn Write) -> Result<(), ArchiveError> {
        w.write_all(MAGIC)?;
        w.write_all(&FORMAT_VERSION.to_le_bytes())?;
        bincode::serialize_into(w, self)?;
        Ok(())
    }

    /// Read the archive of `import_path`. Fails on anything that is not a
    /// complete archive of that package.
    pub fn read(import_path: &str, r: &mut dyn Read) -> Result<Self, ArchiveError> {
        let mut magic = [0u8; 4];
        r.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(ArchiveError::BadMagic);
        }
        let mut version = [0u8; 4];
        r.read_exact(&mut version)?;
        let version = u32::from_le_bytes(version);
        if version != FORMAT_VERSION {
            return Err(ArchiveError::UnsupportedVersion(version));
        }
        let archive: Archive = bincode::deserialize_from(r)?;
        if archive.import_path != import_path {
            return Err(ArchiveError::WrongPackage {
                expected: import_path.to_string(),
                found: archive.import_path,
            });
        }
        Ok(archive)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ArchiveError> {
        let mut out = Vec::new();
        self.write(&mut out)?;
        Ok(out)
    }
}

impl Cacheable for Archive {
    type Error = ArchiveError;

    fn import_path(&self) -> &str {
        &self.import_path
    }

    fn write_to(&self, w: &mut dyn Write) -> Result<(), Self::Error> {
        self.write(w)
    }

    fn read_from(import_path: &str, r: &mut dyn Read) -> Result<Self, Self::Error> {
        Archive::read(import_path, r)
    }
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use golower_cache::{BuildCache, BuildFingerprint};

    fn archive(path: &str, imports: &[&str]) -> Archive {
        let mut export = ExportData::new(path, path.rsplit('/').next().unwrap_or(path));
        export.imports = imports.iter().map(|s| s.to_string()).collect();
        export.blocking.insert("Wait".into());
        Archive::new(export, format!("$packages[\"{path}\"] = {{}};\n"))
    }

    #[test]
    fn test_bytes_roundtrip() {
        let mut a = archive("fake/package", &["fake/dep"]);
        a.dependencies.push(DependencyBlock::of(&archive("fake/dep", &[])));
        a.inc_js = "var x = 1;\n".into();
        let bytes = a.to_bytes().unwrap();
        assert_eq!(&bytes[..4], b"GLAR");
        let back = Archive::read("fake/package", &mut bytes.as_slice()).unwrap();
        assert_eq!(back, a);
        assert_eq!(back.imports, vec!["fake/dep".to_string()]);
    }

    #[test]
    fn test_truncated_archive_fails_cleanly() {
        let bytes = archive("fake/package", &[]).to_bytes().unwrap();
        for len in [0, 3, 8, bytes.len() / 2, bytes.len() - 1] {
            assert!(Archive::read("fake/package", &mut &bytes[..len]).is_err(), "length {len}");
        }
    }

    #[test]
    fn test_bad_magic_and_version() {
        let mut bytes = archive("p", &[]).to_bytes().unwrap();
        bytes[4] = 9;
        assert!(matches!(
            Archive::read("p", &mut bytes.as_slice()),
            Err(ArchiveError::UnsupportedVersion(9))
        ));
        bytes[0] = b'X';
        assert!(matches!(Archive::read("p", &mut bytes.as_slice()), Err(ArchiveError::BadMagic)));
    }

    #[test]
    fn test_wrong_package_is_rejected() {
        let bytes = archive("fake/package", &[]).to_bytes().unwrap();
        let err = Archive::read("fake/other", &mut bytes.as_slice()).unwrap_err();
        assert_eq!(err.to_string(), "archive is for fake/package, expected fake/other");
    }

    #[test]
    fn test_digest_tracks_code_and_exports() {
        let a = archive("p", &[]);
        let mut b = a.clone();
        b.build_time += 100;
        assert_eq!(a.digest(), b.digest());
        b.code.push_str("// changed\n");
        assert_ne!(a.digest(), b.digest());
        let mut c = a.clone();
        c.export.blocking.insert("Other".into());
        assert_ne!(a.digest(), c.digest());
    }

    #[test]
    fn test_dependencies_match() {
        let dep = archive("fake/dep", &[]);
        let mut a = archive("fake/package", &["fake/dep"]);
        a.dependencies.push(DependencyBlock::of(&dep));
        assert!(a.dependencies_match(|_| Some(dep.digest())));
        assert!(!a.dependencies_match(|_| Some("0".repeat(64))));
        assert!(!a.dependencies_match(|_| None));
    }

    #[test]
    fn test_cache_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = BuildCache::new(dir.path());
        let fp = BuildFingerprint::new("js", "ecmascript").with_goroot("/goroot");
        let a = archive("fake/package", &["fake/dep"]);
        assert!(cache.store(&fp, &a));
        let back: Archive = cache.load(&fp, "fake/package").unwrap();
        assert_eq!(back, a);
        assert!(cache.load::<Archive>(&fp, "fake/other").is_none());
    }
}
