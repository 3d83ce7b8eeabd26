//! Decoding of quoted string and character constants.

/// One decoded unit: either a raw byte from `\x` or octal escapes, or a
/// full character.
enum Unit {
    Byte(u8),
    Char(char),
}

/// Decode a double-quoted or back-quoted string literal.
pub(crate) fn unquote(quoted: &str) -> Result<String, &'static str> {
    match quoted.as_bytes() {
        [b'`', .., b'`'] => {
            let body = &quoted[1..quoted.len() - 1];
            if body.contains('`') {
                return Err("invalid syntax");
            }
            // carriage returns are discarded from raw strings
            Ok(body.replace('\r', ""))
        }
        [b'"', .., b'"'] => {
            let mut rest = &quoted[1..quoted.len() - 1];
            let mut out = Vec::with_capacity(rest.len());
            while !rest.is_empty() {
                let (unit, tail) = unquote_unit(rest, '"')?;
                match unit {
                    Unit::Byte(b) => out.push(b),
                    Unit::Char(c) => {
                        let mut buf = [0; 4];
                        out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
                    }
                }
                rest = tail;
            }
            String::from_utf8(out).map_err(|_| "invalid UTF-8")
        }
        _ => Err("invalid syntax"),
    }
}

/// Decode a single-quoted character constant.
pub(crate) fn unquote_char(quoted: &str) -> Result<char, &'static str> {
    let body = quoted
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .ok_or("invalid syntax")?;
    if body.is_empty() {
        return Err("empty character constant");
    }
    let (unit, tail) = unquote_unit(body, '\'')?;
    if !tail.is_empty() {
        return Err("more than one character in character constant");
    }
    Ok(match unit {
        Unit::Byte(b) => char::from(b),
        Unit::Char(c) => c,
    })
}

fn unquote_unit(s: &str, quote: char) -> Result<(Unit, &str), &'static str> {
    let mut chars = s.chars();
    let Some(c) = chars.next() else {
        return Err("invalid syntax");
    };
    if c == quote {
        return Err("invalid syntax");
    }
    if c != '\\' {
        return Ok((Unit::Char(c), chars.as_str()));
    }
    let Some(esc) = chars.next() else {
        return Err("invalid escape");
    };
    let rest = chars.as_str();
    let simple = |c| Ok((Unit::Char(c), rest));
    match esc {
        'a' => simple('\x07'),
        'b' => simple('\x08'),
        'f' => simple('\x0c'),
        'n' => simple('\n'),
        'r' => simple('\r'),
        't' => simple('\t'),
        'v' => simple('\x0b'),
        '\\' => simple('\\'),
        '\'' | '"' if esc == quote => simple(esc),
        'x' => {
            let value = digits(rest, 2, 16)?;
            Ok((Unit::Byte(value as u8), &rest[2..]))
        }
        'u' | 'U' => {
            let len = if esc == 'u' { 4 } else { 8 };
            let value = digits(rest, len, 16)?;
            let c = char::from_u32(value).ok_or("invalid Unicode code point")?;
            Ok((Unit::Char(c), &rest[len..]))
        }
        '0'..='7' => {
            let value = digits(&s[1..], 3, 8)?;
            let byte = u8::try_from(value).map_err(|_| "octal escape out of range")?;
            Ok((Unit::Byte(byte), &s[4..]))
        }
        _ => Err("invalid escape"),
    }
}

fn digits(s: &str, len: usize, radix: u32) -> Result<u32, &'static str> {
    let digits = s.get(..len).ok_or("invalid escape")?;
    if !digits.chars().all(|c| c.is_digit(radix)) {
        return Err("invalid escape");
    }
    u32::from_str_radix(digits, radix).map_err(|_| "invalid escape")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn double_quoted() {
        assert_eq!(unquote(r#""a\tb""#).unwrap(), "a\tb");
        assert_eq!(unquote(r#""é\U0001F600""#).unwrap(), "é😀");
        assert_eq!(unquote(r#""\x41\101""#).unwrap(), "AA");
        assert_eq!(unquote(r#""say \"hi\"""#).unwrap(), "say \"hi\"");
        assert_eq!(unquote(r#""""#).unwrap(), "");
    }

    #[test]
    fn raw_strings_drop_carriage_returns() {
        assert_eq!(unquote("`a\r\nb`").unwrap(), "a\nb");
        assert_eq!(unquote(r"`\n`").unwrap(), "\\n");
    }

    #[test]
    fn invalid_strings() {
        assert_eq!(unquote(r#""\q""#), Err("invalid escape"));
        assert_eq!(unquote(r#""\'""#), Err("invalid escape"));
        assert_eq!(unquote(r#""\400""#), Err("octal escape out of range"));
        assert_eq!(unquote(r#""\xff""#), Err("invalid UTF-8"));
        assert_eq!(unquote("abc"), Err("invalid syntax"));
    }

    #[test]
    fn characters() {
        assert_eq!(unquote_char("'a'"), Ok('a'));
        assert_eq!(unquote_char(r"'\n'"), Ok('\n'));
        assert_eq!(unquote_char(r"'\''"), Ok('\''));
        assert_eq!(unquote_char(r"'\x41'"), Ok('A'));
        assert!(unquote_char("'ab'").is_err());
        assert_eq!(unquote_char("''"), Err("empty character constant"));
    }
}
