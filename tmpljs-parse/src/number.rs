//! Classification of numeric constants.
//!
//! The accepted syntax is Go's: decimal, `0x`, `0o`, `0b` and legacy `0`
//! octal integers, decimal and hexadecimal floats, underscores between
//! digits, imaginary suffix `i` and `a+bi` complex constants.

use crate::ast::{NumberKind, NumberNode};

/// Classify `text`, returning `None` when it is not a valid constant.
pub(crate) fn classify(text: &str, complex: bool) -> Option<NumberKind> {
    if complex {
        let split = text[1..].rfind(['+', '-'])? + 1;
        let (real, imag) = text.split_at(split);
        return (is_real(real) && is_real(imag.strip_suffix('i')?)).then_some(NumberKind::Complex);
    }
    if let Some(imag) = text.strip_suffix('i') {
        return is_real(imag).then_some(NumberKind::Complex);
    }
    if is_int(text) {
        return Some(NumberKind::Int);
    }
    if is_float(text) {
        return Some(NumberKind::Float);
    }
    None
}

fn is_real(text: &str) -> bool {
    is_int(text) || is_float(text)
}

/// Radix and digits of an integer literal, without sign.
fn int_parts(unsigned: &str) -> (u32, &str, bool) {
    match unsigned.get(..2) {
        Some("0x" | "0X") => (16, &unsigned[2..], true),
        Some("0o" | "0O") => (8, &unsigned[2..], true),
        Some("0b" | "0B") => (2, &unsigned[2..], true),
        _ if unsigned.len() > 1 && unsigned.starts_with('0') => (8, &unsigned[1..], true),
        _ => (10, unsigned, false),
    }
}

/// Underscores may only separate digits, or follow a base prefix.
fn underscores_ok(digits: &str, prefixed: bool) -> bool {
    !digits.ends_with('_') && !digits.contains("__") && (prefixed || !digits.starts_with('_'))
}

fn is_int(text: &str) -> bool {
    let negative = text.starts_with('-');
    let unsigned = text.strip_prefix(['+', '-']).unwrap_or(text);
    let (radix, digits, prefixed) = int_parts(unsigned);
    if !underscores_ok(digits, prefixed) {
        return false;
    }
    let clean: String = digits.chars().filter(|&c| c != '_').collect();
    if clean.is_empty() || !clean.chars().all(|c| c.is_digit(radix)) {
        return false;
    }
    match u64::from_str_radix(&clean, radix) {
        Ok(value) if negative => value <= i64::MIN.unsigned_abs(),
        Ok(_) => true,
        Err(_) => false,
    }
}

fn is_float(text: &str) -> bool {
    let unsigned = text.strip_prefix(['+', '-']).unwrap_or(text);
    if let Some(hex) = unsigned
        .strip_prefix("0x")
        .or_else(|| unsigned.strip_prefix("0X"))
    {
        return hex_float(hex).is_some();
    }
    if !unsigned.contains(['.', 'e', 'E']) {
        // digits only but not a valid int: overflow or bad octal
        return false;
    }
    if unsigned.starts_with('_') || unsigned.ends_with('_') || unsigned.contains("__") {
        return false;
    }
    let clean: String = unsigned.chars().filter(|&c| c != '_').collect();
    clean.starts_with(|c: char| c.is_ascii_digit() || c == '.')
        && clean.chars().all(|c| c.is_ascii_digit() || "._eE+-".contains(c))
        && clean.parse::<f64>().is_ok()
}

/// Value of a hexadecimal float body (after `0x`), such as `1.8p3`.
fn hex_float(body: &str) -> Option<f64> {
    let (mantissa, exponent) = body.split_once(['p', 'P'])?;
    let mantissa: String = mantissa.chars().filter(|&c| c != '_').collect();
    let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((&mantissa, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    let mut value = 0f64;
    for c in int_part.chars().chain(frac_part.chars()) {
        value = value * 16.0 + f64::from(c.to_digit(16)?);
    }
    let exponent: String = exponent.chars().filter(|&c| c != '_').collect();
    let exponent: i32 = exponent.parse().ok()?;
    let shift = exponent.checked_sub(4 * i32::try_from(frac_part.len()).ok()?)?;
    Some(value * 2f64.powi(shift))
}

impl NumberNode {
    /// The constant rewritten as a JavaScript numeric literal.
    ///
    /// Integers keep their base (legacy octal `0777` becomes `0o777`) and
    /// lose their underscores; character constants become their code point;
    /// hexadecimal floats are evaluated. Complex constants have no
    /// JavaScript form and yield `None`.
    pub fn to_js_literal(&self) -> Option<String> {
        let clean: String = self.text.chars().filter(|&c| c != '_').collect();
        let (sign, unsigned) = match clean.strip_prefix(['+', '-']) {
            Some(rest) => (&clean[..1], rest),
            None => ("", clean.as_str()),
        };
        let sign = if sign == "+" { "" } else { sign };
        match self.kind {
            NumberKind::Char(c) => Some(u32::from(c).to_string()),
            NumberKind::Complex => None,
            NumberKind::Int => {
                let (radix, digits, _) = int_parts(unsigned);
                Some(match radix {
                    8 if !unsigned[1..].starts_with(['o', 'O']) => format!("{sign}0o{digits}"),
                    _ => format!("{sign}{unsigned}"),
                })
            }
            NumberKind::Float => {
                if let Some(hex) = unsigned
                    .strip_prefix("0x")
                    .or_else(|| unsigned.strip_prefix("0X"))
                {
                    return hex_float(hex).map(|value| format!("{sign}{value:?}"));
                }
                // JavaScript rejects leading zeros such as `007.5`
                let trimmed = unsigned.trim_start_matches('0');
                let trimmed = if trimmed.is_empty() || trimmed.starts_with(['.', 'e', 'E']) {
                    format!("0{trimmed}")
                } else {
                    trimmed.to_string()
                };
                Some(format!("{sign}{trimmed}"))
            }
        }
    }
}
