use golower_syntax::Pos;
use thiserror::Error;

/// A construct the code generator cannot lower. Always fatal for the
/// package being compiled.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{file}:{pos}: cannot compile {construct}")]
pub struct GenerationError {
    pub file: String,
    pub pos: Pos,
    pub construct: String,
}

impl GenerationError {
    pub fn new(file: impl Into<String>, pos: Pos, construct: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            pos,
            construct: construct.into(),
        }
    }
}

/// Failure to read or write an archive. Callers loading from the cache
/// treat every variant as a miss.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("not a golower archive")]
    BadMagic,

    #[error("unsupported archive format version {0}")]
    UnsupportedVersion(u32),

    #[error("archive is for {found}, expected {expected}")]
    WrongPackage { expected: String, found: String },

    #[error("archive encoding: {0}")]
    Codec(#[from] bincode::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failure to assemble a program from archives.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LinkError {
    #[error("no archive for {0}")]
    Missing(String),

    #[error("{dependent} was compiled against a different version of {dependency}")]
    Stale { dependent: String, dependency: String },
}
