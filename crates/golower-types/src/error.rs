use std::fmt;

use golower_syntax::Pos;

/// A type-checking diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{file}:{pos}: {message}")]
pub struct TypeError {
    pub file: String,
    pub pos: Pos,
    pub message: String,
}

impl TypeError {
    pub fn new(file: impl Into<String>, pos: Pos, message: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            pos,
            message: message.into(),
        }
    }
}

/// Every type error of one package, in source order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeErrors(pub Vec<TypeError>);

impl TypeErrors {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TypeError> {
        self.0.iter()
    }

    pub fn first(&self) -> Option<&TypeError> {
        self.0.first()
    }
}

impl fmt::Display for TypeErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for TypeErrors {}

impl From<TypeError> for TypeErrors {
    fn from(err: TypeError) -> Self {
        TypeErrors(vec![err])
    }
}
