//! Constraint expressions and the two line syntaxes that produce them.
//!
//! ```text
//! //go:build linux && (amd64 || arm64) && !cgo
//! // +build linux,amd64 linux,arm64
//! ```
//!
//! The newer syntax is a boolean expression over tags. The older one is a
//! list of space-separated options (OR), each a comma-separated list of
//! possibly negated tags (AND).

use std::fmt;

/// A parsed build constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Tag(String),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn tag(name: impl Into<String>) -> Self {
        Expr::Tag(name.into())
    }

    pub fn not(x: Expr) -> Self {
        Expr::Not(Box::new(x))
    }

    pub fn and(x: Expr, y: Expr) -> Self {
        Expr::And(Box::new(x), Box::new(y))
    }

    pub fn or(x: Expr, y: Expr) -> Self {
        Expr::Or(Box::new(x), Box::new(y))
    }

    /// Evaluate the expression, asking `has` whether each tag is set.
    pub fn eval(&self, has: &dyn Fn(&str) -> bool) -> bool {
        match self {
            Expr::Tag(t) => has(t),
            Expr::Not(x) => !x.eval(has),
            Expr::And(x, y) => x.eval(has) && y.eval(has),
            Expr::Or(x, y) => x.eval(has) || y.eval(has),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Tag(t) => f.write_str(t),
            Expr::Not(x) => write!(f, "!{x}"),
            Expr::And(x, y) => write!(f, "({x} && {y})"),
            Expr::Or(x, y) => write!(f, "({x} || {y})"),
        }
    }
}

/// Why a constraint line could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConstraintError {
    #[error("empty build constraint")]
    Empty,

    #[error("unexpected token {token:?} at offset {offset}")]
    UnexpectedToken { token: String, offset: usize },

    #[error("missing closing parenthesis")]
    UnclosedParen,

    #[error("invalid tag {0:?}")]
    InvalidTag(String),

    #[error("multiple //go:build lines")]
    MultipleGoBuild,
}

/// Parse a single source line.
///
/// Returns `Ok(None)` when the line is not a build constraint at all.
pub fn parse_line(line: &str) -> Result<Option<Expr>, ConstraintError> {
    let line = line.trim();
    if let Some(rest) = go_build_text(line) {
        return parse_go_build(rest).map(Some);
    }
    if let Some(rest) = plus_build_text(line) {
        return parse_plus_build(rest).map(Some);
    }
    Ok(None)
}

/// `//go:build` followed by whitespace or end of line.
pub(crate) fn go_build_text(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("//go:build")?;
    if rest.is_empty() || rest.starts_with([' ', '\t']) {
        Some(rest.trim())
    } else {
        None
    }
}

/// `//`, optional blanks, `+build`, then whitespace or end of line.
fn plus_build_text(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("//")?.trim_start();
    let rest = rest.strip_prefix("+build")?;
    if rest.is_empty() || rest.starts_with([' ', '\t']) {
        Some(rest.trim())
    } else {
        None
    }
}

fn is_valid_tag(tag: &str) -> bool {
    !tag.is_empty()
        && tag
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '.')
}

/// Parse the text after `// +build`.
pub fn parse_plus_build(text: &str) -> Result<Expr, ConstraintError> {
    let mut result: Option<Expr> = None;
    for option in text.split_whitespace() {
        let mut clause: Option<Expr> = None;
        for lit in option.split(',') {
            let (negated, name) = match lit.strip_prefix('!') {
                Some(name) => (true, name),
                None => (false, lit),
            };
            if !is_valid_tag(name) {
                return Err(ConstraintError::InvalidTag(lit.to_string()));
            }
            let term = if negated {
                Expr::not(Expr::tag(name))
            } else {
                Expr::tag(name)
            };
            clause = Some(match clause {
                Some(acc) => Expr::and(acc, term),
                None => term,
            });
        }
        let Some(clause) = clause else {
            continue;
        };
        result = Some(match result {
            Some(acc) => Expr::or(acc, clause),
            None => clause,
        });
    }
    result.ok_or(ConstraintError::Empty)
}

/// Parse the boolean expression after `//go:build`.
pub fn parse_go_build(text: &str) -> Result<Expr, ConstraintError> {
    let tokens = tokenize(text)?;
    if tokens.is_empty() {
        return Err(ConstraintError::Empty);
    }
    let mut parser = ExprParser { tokens, pos: 0 };
    let expr = parser.or()?;
    if let Some(tok) = parser.tokens.get(parser.pos) {
        return Err(ConstraintError::UnexpectedToken {
            token: tok.text.clone(),
            offset: tok.offset,
        });
    }
    Ok(expr)
}

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Tag,
    Not,
    And,
    Or,
    LParen,
    RParen,
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    text: String,
    offset: usize,
}

fn tokenize(text: &str) -> Result<Vec<Token>, ConstraintError> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        let (kind, len) = match c {
            '!' => (TokenKind::Not, 1),
            '(' => (TokenKind::LParen, 1),
            ')' => (TokenKind::RParen, 1),
            '&' if text[i..].starts_with("&&") => (TokenKind::And, 2),
            '|' if text[i..].starts_with("||") => (TokenKind::Or, 2),
            _ if c.is_alphanumeric() || c == '_' || c == '.' || !c.is_ascii() => {
                let end = text[i..]
                    .char_indices()
                    .find(|&(_, ch)| !(ch.is_alphanumeric() || ch == '_' || ch == '.'))
                    .map(|(off, _)| i + off)
                    .unwrap_or(text.len());
                if end == i {
                    return Err(ConstraintError::UnexpectedToken {
                        token: c.to_string(),
                        offset: i,
                    });
                }
                (TokenKind::Tag, end - i)
            }
            _ => {
                return Err(ConstraintError::UnexpectedToken {
                    token: c.to_string(),
                    offset: i,
                });
            }
        };
        tokens.push(Token {
            kind,
            text: text[i..i + len].to_string(),
            offset: i,
        });
        i += len;
    }
    Ok(tokens)
}

struct ExprParser {
    tokens: Vec<Token>,
    pos: usize,
}

impl ExprParser {
    fn peek(&self) -> Option<&TokenKind> {
        self.tokens.get(self.pos).map(|t| &t.kind)
    }

    fn or(&mut self) -> Result<Expr, ConstraintError> {
        let mut x = self.and()?;
        while self.peek() == Some(&TokenKind::Or) {
            self.pos += 1;
            x = Expr::or(x, self.and()?);
        }
        Ok(x)
    }

    fn and(&mut self) -> Result<Expr, ConstraintError> {
        let mut x = self.not()?;
        while self.peek() == Some(&TokenKind::And) {
            self.pos += 1;
            x = Expr::and(x, self.not()?);
        }
        Ok(x)
    }

    fn not(&mut self) -> Result<Expr, ConstraintError> {
        if self.peek() == Some(&TokenKind::Not) {
            self.pos += 1;
            return Ok(Expr::not(self.not()?));
        }
        self.atom()
    }

    fn atom(&mut self) -> Result<Expr, ConstraintError> {
        let Some(tok) = self.tokens.get(self.pos).cloned() else {
            return Err(ConstraintError::UnexpectedToken {
                token: "end of line".into(),
                offset: self.tokens.last().map(|t| t.offset + t.text.len()).unwrap_or(0),
            });
        };
        self.pos += 1;
        match tok.kind {
            TokenKind::Tag => Ok(Expr::Tag(tok.text)),
            TokenKind::LParen => {
                let x = self.or()?;
                if self.peek() != Some(&TokenKind::RParen) {
                    return Err(ConstraintError::UnclosedParen);
                }
                self.pos += 1;
                Ok(x)
            }
            _ => Err(ConstraintError::UnexpectedToken {
                token: tok.text,
                offset: tok.offset,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(expr: &Expr, tags: &[&str]) -> bool {
        expr.eval(&|t| tags.contains(&t))
    }

    #[test]
    fn test_not_a_constraint() {
        assert_eq!(parse_line("// Package foo does things."), Ok(None));
        assert_eq!(parse_line("//go:buildsomething"), Ok(None));
        assert_eq!(parse_line("// +builder"), Ok(None));
        assert_eq!(parse_line(""), Ok(None));
    }

    #[test]
    fn test_go_build_precedence() {
        let expr = parse_line("//go:build a || b && !c").unwrap().unwrap();
        assert_eq!(expr.to_string(), "(a || (b && !c))");
        assert!(eval(&expr, &["a", "c"]));
        assert!(eval(&expr, &["b"]));
        assert!(!eval(&expr, &["b", "c"]));
    }

    #[test]
    fn test_go_build_parens() {
        let expr = parse_go_build("linux && (amd64 || arm64)").unwrap();
        assert!(eval(&expr, &["linux", "arm64"]));
        assert!(!eval(&expr, &["linux", "386"]));
    }

    #[test]
    fn test_go_build_malformed() {
        assert_eq!(parse_go_build(""), Err(ConstraintError::Empty));
        assert_eq!(parse_go_build("(linux"), Err(ConstraintError::UnclosedParen));
        assert!(matches!(
            parse_go_build("linux &&"),
            Err(ConstraintError::UnexpectedToken { .. })
        ));
        assert!(matches!(
            parse_go_build("linux & amd64"),
            Err(ConstraintError::UnexpectedToken { .. })
        ));
        assert!(matches!(
            parse_go_build("linux amd64"),
            Err(ConstraintError::UnexpectedToken { .. })
        ));
    }

    #[test]
    fn test_plus_build_space_is_or() {
        let expr = parse_line("// +build a b").unwrap().unwrap();
        assert!(eval(&expr, &["a"]));
        assert!(eval(&expr, &["b"]));
        assert!(!eval(&expr, &["c"]));
    }

    #[test]
    fn test_plus_build_comma_is_and() {
        let expr = parse_line("// +build a,b").unwrap().unwrap();
        assert!(eval(&expr, &["a", "b"]));
        assert!(!eval(&expr, &["a"]));
        assert!(!eval(&expr, &["b"]));
    }

    #[test]
    fn test_plus_build_negation() {
        let expr = parse_line("//+build !windows,amd64").unwrap().unwrap();
        assert!(eval(&expr, &["linux", "amd64"]));
        assert!(!eval(&expr, &["windows", "amd64"]));
    }

    #[test]
    fn test_plus_build_malformed() {
        assert_eq!(parse_plus_build(""), Err(ConstraintError::Empty));
        assert_eq!(
            parse_plus_build("!!linux"),
            Err(ConstraintError::InvalidTag("!!linux".into()))
        );
        assert_eq!(
            parse_plus_build("linux,"),
            Err(ConstraintError::InvalidTag("".into()))
        );
        assert_eq!(
            parse_plus_build("lin-ux"),
            Err(ConstraintError::InvalidTag("lin-ux".into()))
        );
    }
}
