//! `//golower:<kind>` comment directives attached to declarations.

use std::fmt;

pub const DIRECTIVE_PREFIX: &str = "//golower:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Directive {
    /// Substitute the original declaration (the default for overlay decls).
    Replace,
    /// Remove the original declaration.
    Purge,
    /// Rename the original and keep both.
    KeepOriginal,
    /// Swap in this signature but keep the original body.
    OverrideSignature,
    /// The function suspends in ways static analysis cannot see.
    Blocking,
}

impl Directive {
    pub fn parse(kind: &str) -> Option<Self> {
        Some(match kind {
            "replace" => Directive::Replace,
            "purge" => Directive::Purge,
            "keep-original" => Directive::KeepOriginal,
            "override-signature" => Directive::OverrideSignature,
            "blocking" => Directive::Blocking,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Directive::Replace => "replace",
            Directive::Purge => "purge",
            Directive::KeepOriginal => "keep-original",
            Directive::OverrideSignature => "override-signature",
            Directive::Blocking => "blocking",
        }
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{DIRECTIVE_PREFIX}{}", self.as_str())
    }
}

/// Parse one comment. `None` if it is not a directive, `Some(Err(kind))` for
/// an unknown directive kind.
pub fn parse_comment(text: &str) -> Option<Result<Directive, String>> {
    let rest = text.trim().strip_prefix(DIRECTIVE_PREFIX)?;
    let kind = rest.split_whitespace().next().unwrap_or("");
    Some(Directive::parse(kind).ok_or_else(|| kind.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_comment() {
        assert_eq!(parse_comment("//golower:purge"), Some(Ok(Directive::Purge)));
        assert_eq!(
            parse_comment("//golower:keep-original wraps the original"),
            Some(Ok(Directive::KeepOriginal))
        );
        assert_eq!(parse_comment("// golower:purge"), None);
        assert_eq!(parse_comment("// regular comment"), None);
        assert_eq!(parse_comment("//golower:bogus"), Some(Err("bogus".into())));
    }

    #[test]
    fn test_display_roundtrips() {
        for d in [
            Directive::Replace,
            Directive::Purge,
            Directive::KeepOriginal,
            Directive::OverrideSignature,
            Directive::Blocking,
        ] {
            assert_eq!(parse_comment(&d.to_string()), Some(Ok(d)));
        }
    }
}
