//! Decoding of quoted literals.
//!
//! `\x` and octal escapes produce the code point with the same value, so
//! byte strings that are not valid UTF-8 survive as Latin-1 text.

/// Decode an interpreted (`"..."`) or raw (`` `...` ``) string literal.
pub fn unquote_string(text: &str) -> Result<String, String> {
    if let Some(raw) = text.strip_prefix('`').and_then(|t| t.strip_suffix('`')) {
        return Ok(raw.replace('\r', ""));
    }
    let inner = text
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .ok_or_else(|| format!("malformed string literal {text}"))?;
    unescape(inner, '"')
}

/// Decode a rune literal (`'a'`, `'\n'`, `'é'`).
pub fn unquote_rune(text: &str) -> Result<char, String> {
    let inner = text
        .strip_prefix('\'')
        .and_then(|t| t.strip_suffix('\''))
        .ok_or_else(|| format!("malformed rune literal {text}"))?;
    let decoded = unescape(inner, '\'')?;
    let mut chars = decoded.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(format!("rune literal {text} must contain exactly one character")),
    }
}

fn unescape(s: &str, quote: char) -> Result<String, String> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(e) = chars.next() else {
            return Err("escape sequence not terminated".into());
        };
        let decoded = match e {
            'a' => '\u{7}',
            'b' => '\u{8}',
            'f' => '\u{c}',
            'n' => '\n',
            'r' => '\r',
            't' => '\t',
            'v' => '\u{b}',
            '\\' => '\\',
            c if c == quote => c,
            'x' => hex_escape(&mut chars, 2)?,
            'u' => hex_escape(&mut chars, 4)?,
            'U' => hex_escape(&mut chars, 8)?,
            '0'..='7' => {
                let mut value = e.to_digit(8).unwrap_or(0);
                for _ in 0..2 {
                    let digit = chars
                        .next()
                        .and_then(|d| d.to_digit(8))
                        .ok_or("invalid octal escape")?;
                    value = value * 8 + digit;
                }
                char::from_u32(value).ok_or("invalid octal escape")?
            }
            other => return Err(format!("unknown escape sequence \\{other}")),
        };
        out.push(decoded);
    }
    Ok(out)
}

fn hex_escape(chars: &mut impl Iterator<Item = char>, digits: usize) -> Result<char, String> {
    let mut value = 0u32;
    for _ in 0..digits {
        let digit = chars
            .next()
            .and_then(|d| d.to_digit(16))
            .ok_or("invalid hex escape")?;
        value = value * 16 + digit;
    }
    char::from_u32(value).ok_or_else(|| format!("escape value {value:#x} is not a valid character"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unquote_string() {
        assert_eq!(unquote_string(r#""a\tb\n""#).unwrap(), "a\tb\n");
        assert_eq!(unquote_string(r#""\x41\101é""#).unwrap(), "AAé");
        assert_eq!(unquote_string("`raw\\n`").unwrap(), "raw\\n");
        assert!(unquote_string(r#""\q""#).is_err());
    }

    #[test]
    fn test_unquote_rune() {
        assert_eq!(unquote_rune("'a'").unwrap(), 'a');
        assert_eq!(unquote_rune(r"'\n'").unwrap(), '\n');
        assert_eq!(unquote_rune(r"'\''").unwrap(), '\'');
        assert_eq!(unquote_rune("'世'").unwrap(), '世');
        assert!(unquote_rune("'ab'").is_err());
    }
}
