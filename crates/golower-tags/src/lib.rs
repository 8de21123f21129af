//! Build constraint evaluation.
//!
//! Decides whether a Go source file takes part in a build for a given set of
//! tags. Only the comment block before the `package` clause is consulted;
//! every constraint line found there must hold.
//!
//! ```
//! use golower_tags::{matches, TagSet};
//!
//! let tags = TagSet::from_iter(["linux", "arm"]);
//! assert_eq!(matches("//go:build linux\n\npackage p\n", &tags), (true, String::new()));
//! ```

mod expr;
mod filename;

pub use expr::{ConstraintError, Expr, parse_go_build, parse_line, parse_plus_build};
pub use filename::{KNOWN_ARCH, KNOWN_OS, good_os_arch_file};

use std::collections::BTreeSet;

/// Tag the translation target always sets.
pub const TARGET_TAG: &str = "js";

/// Legacy platform tag implied by [`TARGET_TAG`].
pub const LEGACY_TARGET_TAG: &str = "nacl";

/// Tags added to every build regardless of configuration.
pub const DEFAULT_TAGS: &[&str] = &["netgo", "purego", "math_big_pure_go", "golower"];

/// The set of active build tags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSet {
    tags: BTreeSet<String>,
}

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tag set for a target platform: `os`, `arch`, the defaults and any extras.
    pub fn with_platform<I, S>(os: &str, arch: &str, extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = Self::new();
        set.insert(os);
        set.insert(arch);
        for tag in DEFAULT_TAGS {
            set.insert(*tag);
        }
        for tag in extra {
            set.insert(tag);
        }
        set
    }

    pub fn insert(&mut self, tag: impl Into<String>) {
        let tag = tag.into();
        if !tag.is_empty() {
            self.tags.insert(tag);
        }
    }

    /// Whether `tag` is active, including the synthesized legacy tag.
    pub fn has(&self, tag: &str) -> bool {
        if self.tags.contains(tag) {
            return true;
        }
        tag == LEGACY_TARGET_TAG && self.tags.contains(TARGET_TAG)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for TagSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = Self::new();
        for tag in iter {
            set.insert(tag);
        }
        set
    }
}

/// Outcome of evaluating a file header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// No constraint, or every constraint holds.
    Included,
    /// `line` is a well-formed constraint the tag set does not satisfy.
    Excluded { line: String },
    /// `line` could not be parsed.
    Malformed {
        line: String,
        reason: ConstraintError,
    },
}

impl Verdict {
    pub fn is_included(&self) -> bool {
        matches!(self, Verdict::Included)
    }

    /// The offending line, if any.
    pub fn line(&self) -> Option<&str> {
        match self {
            Verdict::Included => None,
            Verdict::Excluded { line } | Verdict::Malformed { line, .. } => Some(line),
        }
    }
}

/// Evaluate the constraint lines preceding the package clause of `src`.
///
/// A `//go:build` line supersedes any `// +build` lines, which are then
/// ignored. Without one, every `// +build` line must hold.
pub fn evaluate(src: &str, tags: &TagSet) -> Verdict {
    let header: Vec<&str> = src
        .lines()
        .map(str::trim)
        .take_while(|line| !line.starts_with("package"))
        .collect();
    let go_build: Vec<&str> = header
        .iter()
        .copied()
        .filter(|line| expr::go_build_text(line).is_some())
        .collect();
    let constraints = match go_build.as_slice() {
        [] => header,
        [one] => vec![*one],
        [_, second, ..] => {
            return Verdict::Malformed {
                line: second.to_string(),
                reason: ConstraintError::MultipleGoBuild,
            };
        }
    };

    let has = |t: &str| tags.has(t);
    for line in constraints {
        match parse_line(line) {
            Ok(None) => {}
            Ok(Some(expr)) => {
                if !expr.eval(&has) {
                    return Verdict::Excluded {
                        line: line.to_string(),
                    };
                }
            }
            Err(reason) => {
                return Verdict::Malformed {
                    line: line.to_string(),
                    reason,
                };
            }
        }
    }
    Verdict::Included
}

/// `(true, "")` when the file participates, otherwise `false` with the line
/// responsible.
pub fn matches(src: &str, tags: &TagSet) -> (bool, String) {
    match evaluate(src, tags) {
        Verdict::Included => (true, String::new()),
        Verdict::Excluded { line } | Verdict::Malformed { line, .. } => (false, line),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(list: &[&str]) -> TagSet {
        list.iter().copied().collect()
    }

    #[test]
    fn test_constraint_free_source() {
        let src = "// Package fmt formats things.\n\npackage fmt\n\nfunc F() {}\n";
        for set in [tags(&[]), tags(&["js"]), tags(&["linux", "amd64", "cgo"])] {
            assert_eq!(matches(src, &set), (true, String::new()));
        }
    }

    #[test]
    fn test_go_build_linux_scenario() {
        let src = "//go:build linux\n\npackage p\n";
        assert_eq!(
            matches(src, &tags(&["windows", "amd64"])),
            (false, "//go:build linux".to_string())
        );
        assert_eq!(matches(src, &tags(&["linux", "arm"])), (true, String::new()));
    }

    #[test]
    fn test_plus_build_or_and() {
        let or = "// +build a b\n\npackage p\n";
        assert!(matches(or, &tags(&["a"])).0);
        assert!(matches(or, &tags(&["b"])).0);
        assert!(!matches(or, &tags(&["c"])).0);

        let and = "// +build a,b\n\npackage p\n";
        assert!(matches(and, &tags(&["a", "b"])).0);
        assert!(!matches(and, &tags(&["a"])).0);
    }

    #[test]
    fn test_consecutive_lines_are_anded() {
        let src = "// +build a\n// +build b\n\npackage p\n";
        assert!(matches(src, &tags(&["a", "b"])).0);
        assert_eq!(
            matches(src, &tags(&["a"])),
            (false, "// +build b".to_string())
        );
    }

    #[test]
    fn test_go_build_supersedes_plus_build() {
        let src = "//go:build linux\n// +build windows\n\npackage p\n";
        assert_eq!(matches(src, &tags(&["linux"])), (true, String::new()));
        assert_eq!(
            matches(src, &tags(&["windows"])),
            (false, "//go:build linux".to_string())
        );

        // A broken +build line is never read once //go:build is present.
        let broken = "// +build !!x\n//go:build js\n\npackage p\n";
        assert_eq!(evaluate(broken, &tags(&["js"])), Verdict::Included);
    }

    #[test]
    fn test_second_go_build_line_is_malformed() {
        let src = "//go:build linux\n//go:build amd64\n\npackage p\n";
        assert_eq!(
            evaluate(src, &tags(&["linux", "amd64"])),
            Verdict::Malformed {
                line: "//go:build amd64".to_string(),
                reason: ConstraintError::MultipleGoBuild,
            }
        );
    }

    #[test]
    fn test_constraints_after_package_ignored() {
        let src = "package p\n\n//go:build ignore\n// +build ignore\n";
        assert_eq!(matches(src, &tags(&[])), (true, String::new()));
    }

    #[test]
    fn test_malformed_reports_line() {
        let src = "//go:build linux &&\n\npackage p\n";
        let verdict = evaluate(src, &tags(&["linux"]));
        assert!(matches!(verdict, Verdict::Malformed { .. }));
        assert_eq!(verdict.line(), Some("//go:build linux &&"));
        assert_eq!(
            matches(src, &tags(&["linux"])),
            (false, "//go:build linux &&".to_string())
        );
    }

    #[test]
    fn test_unsatisfied_vs_malformed_vs_free() {
        let set = tags(&["linux"]);
        assert_eq!(evaluate("package p", &set), Verdict::Included);
        assert!(matches!(
            evaluate("//go:build windows\npackage p", &set),
            Verdict::Excluded { .. }
        ));
        assert!(matches!(
            evaluate("// +build !!x\npackage p", &set),
            Verdict::Malformed { .. }
        ));
    }

    #[test]
    fn test_legacy_target_tag_synthesized() {
        let src = "// +build nacl\n\npackage p\n";
        assert!(matches(src, &tags(&["js"])).0);
        assert!(!matches(src, &tags(&["linux"])).0);
        assert!(!matches("//go:build !nacl\npackage p", &tags(&["js"])).0);
    }

    #[test]
    fn test_with_platform_defaults() {
        let set = TagSet::with_platform("js", "ecmascript", ["extra"]);
        for tag in ["js", "ecmascript", "netgo", "purego", "math_big_pure_go", "golower", "extra"] {
            assert!(set.has(tag), "missing {tag}");
        }
        assert!(set.has("nacl"));
    }
}
