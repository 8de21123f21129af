use std::path::PathBuf;

use golower_compiler::{GenerationError, LinkError};
use golower_overlay::MergeError;
use golower_syntax::ParseErrors;
use golower_types::TypeErrors;
use thiserror::Error;

/// Every fatal build failure. Cache problems never appear here: they are
/// logged and treated as misses.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("cannot find package {path} in any of:\n{}", format_searched(.searched))]
    NotFound { path: String, searched: Vec<PathBuf> },

    #[error("no buildable Go source files in {}", .0.display())]
    NoGoFiles(PathBuf),

    #[error("import cycle not allowed: {}", .0.join(" -> "))]
    ImportCycle(Vec<String>),

    #[error(transparent)]
    Parse(#[from] ParseErrors),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error("type errors in {path}:\n{errors}")]
    TypeCheck { path: String, errors: TypeErrors },

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Link(#[from] LinkError),

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl BuildError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

fn format_searched(dirs: &[PathBuf]) -> String {
    dirs.iter()
        .map(|d| format!("\t{}", d.display()))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err = BuildError::ImportCycle(vec!["a".into(), "b".into(), "a".into()]);
        assert_eq!(err.to_string(), "import cycle not allowed: a -> b -> a");

        let err = BuildError::NotFound {
            path: "fake/pkg".into(),
            searched: vec![PathBuf::from("/go/src/fake/pkg"), PathBuf::from("/ws/src/fake/pkg")],
        };
        assert_eq!(
            err.to_string(),
            "cannot find package fake/pkg in any of:\n\t/go/src/fake/pkg\n\t/ws/src/fake/pkg"
        );
    }
}
