//! Flat `key=value` properties text codec.
//!
//! Lines starting with `#` or `!` are comments, blank lines are ignored, and the first
//! unescaped `=` on a line separates key from value. Backslash, newline and carriage return
//! in values are escaped so any string survives a round trip. On read, the escapes of
//! `java.util.Properties` files (`\uXXXX`, `\:`, `\=`, ...) are decoded as well.

use crate::error::RecordError;
use chrono::Utc;
use std::collections::BTreeMap;

/// Ordered key/value pairs of one properties file.
pub type Properties = BTreeMap<String, String>;

/// Parse properties text.
pub fn parse(text: &str) -> Result<Properties, RecordError> {
    let mut props = Properties::new();
    for (idx, raw) in text.lines().enumerate() {
        let line = raw.strip_suffix('\r').unwrap_or(raw);
        let trimmed = line.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('!') {
            continue;
        }
        let malformed = || RecordError::MalformedLine {
            line: idx + 1,
            content: line.to_string(),
        };
        let (key, value) = split_separator(trimmed).ok_or_else(malformed)?;
        let key = key.trim_end();
        if key.is_empty() {
            return Err(malformed());
        }
        let key = unescape(key).ok_or_else(malformed)?;
        let value = unescape(value).ok_or_else(malformed)?;
        props.insert(key, value);
    }
    Ok(props)
}

/// Split at the first `=` not preceded by an escaping backslash.
fn split_separator(line: &str) -> Option<(&str, &str)> {
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        match c {
            '\\' => escaped = !escaped,
            '=' if !escaped => return Some((&line[..i], &line[i + 1..])),
            _ => escaped = false,
        }
    }
    None
}

/// Render properties text: a timestamp comment, then one `key=value` line per entry.
///
/// `leading` keys are written first in the given order; the remaining keys follow sorted.
pub fn render(props: &Properties, leading: &[&str]) -> Result<String, RecordError> {
    let mut out = format!("#{}\n", Utc::now().format("%a %b %d %H:%M:%S UTC %Y"));
    let mut push = |key: &str, value: &str| -> Result<(), RecordError> {
        validate_key(key)?;
        out.push_str(key);
        out.push('=');
        out.push_str(&escape(value));
        out.push('\n');
        Ok(())
    };
    for key in leading {
        if let Some(value) = props.get(*key) {
            push(key, value)?;
        }
    }
    for (key, value) in props {
        if !leading.contains(&key.as_str()) {
            push(key, value)?;
        }
    }
    Ok(out)
}

fn validate_key(key: &str) -> Result<(), RecordError> {
    let representable = !key.is_empty()
        && !key.starts_with(['#', '!'])
        && key.trim() == key
        && !key.contains(['=', '\\', '\n', '\r']);
    if representable {
        Ok(())
    } else {
        Err(RecordError::ReservedKey(key.to_string()))
    }
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}

/// Undo escaping, including the `\uXXXX` and `\:`-style escapes older writers emit.
/// `None` when a `\u` escape is not four hex digits or does not form valid UTF-16.
fn unescape(value: &str) -> Option<String> {
    let mut out = String::with_capacity(value.len());
    let mut units: Vec<u16> = Vec::new();
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        let next = if c == '\\' { chars.next() } else { None };
        if c == '\\' && next == Some('u') {
            let hex: String = chars.by_ref().take(4).collect();
            if hex.len() != 4 || !hex.chars().all(|h| h.is_ascii_hexdigit()) {
                return None;
            }
            units.push(u16::from_str_radix(&hex, 16).ok()?);
            continue;
        }
        if !units.is_empty() {
            out.push_str(&String::from_utf16(&units).ok()?);
            units.clear();
        }
        match (c, next) {
            ('\\', Some('n')) => out.push('\n'),
            ('\\', Some('r')) => out.push('\r'),
            ('\\', Some('t')) => out.push('\t'),
            ('\\', Some('f')) => out.push('\u{000c}'),
            ('\\', Some(other)) => out.push(other),
            ('\\', None) => {}
            (c, _) => out.push(c),
        }
    }
    if !units.is_empty() {
        out.push_str(&String::from_utf16(&units).ok()?);
    }
    Some(out)
}
