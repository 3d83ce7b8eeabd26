//! JavaScript literal encoding.

use std::fmt::Write;

/// Encode `text` as a single-quoted JavaScript string literal.
///
/// Line terminators, quotes, backslashes and control characters are
/// escaped. So are `/` after `<`, `<` before `!` and `>` after `--`, so the
/// literal can sit inside a `<script>` element.
pub fn js_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('\'');
    let mut chars = text.chars().peekable();
    let (mut prev, mut before_prev) = ('\0', '\0');
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            '/' if prev == '<' => out.push_str("\\/"),
            '<' if chars.peek() == Some(&'!') => out.push_str("\\x3c"),
            '>' if prev == '-' && before_prev == '-' => out.push_str("\\x3e"),
            c if c.is_ascii_control() => {
                let _ = write!(out, "\\x{:02x}", u32::from(c));
            }
            c => out.push(c),
        }
        before_prev = prev;
        prev = c;
    }
    out.push('\'');
    out
}

/// Words that cannot name a variable.
const RESERVED: &[&str] = &[
    "arguments", "await", "break", "case", "catch", "class", "const", "continue", "debugger",
    "default", "delete", "do", "else", "enum", "eval", "export", "extends", "false", "finally",
    "for", "function", "if", "implements", "import", "in", "instanceof", "interface", "let", "new",
    "null", "package", "private", "protected", "public", "return", "static", "super", "switch",
    "this", "throw", "true", "try", "typeof", "var", "void", "while", "with", "yield",
];

/// Whether `name` can be written bare after `.` or `var`.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_' || first == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        && !RESERVED.contains(&name)
}

/// `base` followed by an access of property `key`.
pub fn property(base: &str, key: &str) -> String {
    if is_identifier(key) {
        format!("{base}.{key}")
    } else {
        format!("{base}[{}]", js_string(key))
    }
}
