//! Escape sequences of the filter language
//!
//! Quoted strings accept the full escape set (single characters, `\xHH`,
//! `\uHHHH`, octal and the C letter escapes). Bare text only accepts the
//! single-character escapes, which the lexer enforces.

use super::error::FilterError;
use super::lexer::is_escapable;
use std::iter::Peekable;
use std::str::Chars;

/// Replaces every escape sequence in a quoted string body with the character it stands for.
///
/// Malformed `\x` and `\u` sequences are kept as written and a trailing
/// backslash stays a literal backslash. Unknown escapes are an error.
pub fn unquote(input: &str) -> Result<String, FilterError> {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }

        let Some(escaped) = chars.next() else {
            out.push('\\');
            break;
        };

        match escaped {
            c if is_escapable(c) => out.push(c),
            'u' => push_hex(&mut out, &mut chars, 'u', 4),
            'x' => push_hex(&mut out, &mut chars, 'x', 2),
            '0'..='7' => push_octal(&mut out, &mut chars, escaped),
            'a' => out.push('\u{07}'),
            'b' => out.push('\u{08}'),
            'f' => out.push('\u{0c}'),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            'v' => out.push('\u{0b}'),
            other => return Err(FilterError::InvalidEscape(other)),
        }
    }

    Ok(out)
}

/// Unescapes bare (unquoted) text, which only knows single-character escapes.
pub fn unescape_text(input: &str) -> Result<String, FilterError> {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(escaped) if is_escapable(escaped) => out.push(escaped),
            Some(other) => return Err(FilterError::InvalidEscape(other)),
            None => out.push('\\'),
        }
    }

    Ok(out)
}

fn push_hex(out: &mut String, chars: &mut Peekable<Chars<'_>>, marker: char, width: usize) {
    let digits: String = chars.by_ref().take(width).collect();
    let decoded = if digits.len() == width && digits.chars().all(|c| c.is_ascii_hexdigit()) {
        u32::from_str_radix(&digits, 16).ok().and_then(char::from_u32)
    } else {
        None
    };

    match decoded {
        Some(c) => out.push(c),
        None => {
            out.push('\\');
            out.push(marker);
            out.push_str(&digits);
        }
    }
}

fn push_octal(out: &mut String, chars: &mut Peekable<Chars<'_>>, first: char) {
    let mut digits = String::from(first);
    while digits.len() < 3 {
        match chars.peek() {
            Some(c @ '0'..='7') => {
                digits.push(*c);
                chars.next();
            }
            _ => break,
        }
        // \4x through \7x would overflow a byte with a third digit
        if first > '3' && digits.len() == 2 {
            break;
        }
    }

    match u8::from_str_radix(&digits, 8) {
        Ok(byte) => out.push(char::from(byte)),
        Err(_) => {
            out.push('\\');
            out.push_str(&digits);
        }
    }
}

/// Renders a logical string as a quoted string literal that unquotes to the same value.
pub fn quote(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 2);
    out.push('"');
    for c in input.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{07}' => out.push_str("\\a"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{0b}' => out.push_str("\\v"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Renders a string as a Lua string literal.
///
/// Printable ASCII is kept as is. Every other byte, and `"` and `\`, becomes a
/// decimal `\ddd` escape, so multi-byte characters are written byte by byte.
pub fn lua_quote(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 2);
    out.push('"');
    for byte in input.bytes() {
        match byte {
            b'"' | b'\\' => out.push_str(&format!("\\{byte}")),
            32..=126 => out.push(char::from(byte)),
            _ => out.push_str(&format!("\\{byte}")),
        }
    }
    out.push('"');
    out
}

/// Escapes whitespace so that a pattern fits on a single config line.
pub fn escape_whitespace(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '\u{07}' => out.push_str("\\a"),
            '\u{08}' => out.push_str("\\x08"),
            '\u{0c}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{0b}' => out.push_str("\\v"),
            ' ' => out.push_str("\\x20"),
            c => out.push(c),
        }
    }
    out
}
