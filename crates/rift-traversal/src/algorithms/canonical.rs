//! # Canonical Encoding
//!
//! Deterministic JSON text used as the signed byte string. Interoperates
//! with peers that sign `json.dumps(obj, sort_keys=True)` output:
//!
//! - object keys sorted by code point
//! - `", "` between items and `": "` after keys
//! - every non-printable or non-ASCII character escaped as `\uXXXX`
//!   (UTF-16 units, lowercase hex)
//! - floats in shortest round-trip form, positional for exponents in
//!   `-4..16` (always with a fractional part), otherwise `1e+16` style
//!
//! Non-finite floats have no encoding and are rejected.

use crate::domain::errors::TraversalError;
use serde::Serialize;
use serde_json::{Number, Value};
use std::fmt::Write as _;

/// Serialize `value` and encode it canonically.
pub fn to_canonical_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, TraversalError> {
    let value = serde_json::to_value(value)
        .map_err(|e| TraversalError::Protocol(format!("cannot encode: {e}")))?;
    encode_canonical(&value)
}

/// Encode an already-built JSON value.
pub fn encode_canonical(value: &Value) -> Result<Vec<u8>, TraversalError> {
    let mut out = String::with_capacity(256);
    write_value(&mut out, value)?;
    Ok(out.into_bytes())
}

fn write_value(out: &mut String, value: &Value) -> Result<(), TraversalError> {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(n) => write_number(out, n)?,
        Value::String(s) => write_string(out, s),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_value(out, item)?;
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_string(out, key);
                out.push_str(": ");
                write_value(out, item)?;
            }
            out.push('}');
        }
    }
    Ok(())
}

fn write_number(out: &mut String, n: &Number) -> Result<(), TraversalError> {
    if let Some(i) = n.as_i64() {
        let _ = write!(out, "{i}");
    } else if let Some(u) = n.as_u64() {
        let _ = write!(out, "{u}");
    } else {
        let f = n
            .as_f64()
            .ok_or_else(|| TraversalError::Protocol(format!("unrepresentable number {n}")))?;
        out.push_str(&format_float(f)?);
    }
    Ok(())
}

/// Shortest round-trip text for `v`.
pub fn format_float(v: f64) -> Result<String, TraversalError> {
    if !v.is_finite() {
        return Err(TraversalError::Protocol(format!(
            "non-finite number {v} cannot be encoded"
        )));
    }
    if v == 0.0 {
        return Ok(if v.is_sign_negative() { "-0.0" } else { "0.0" }.to_string());
    }

    // `{:e}` yields the shortest round-trip digits, e.g. "-1.2345e3".
    let sci = format!("{v:e}");
    let Some((mantissa, exponent)) = sci.split_once('e') else {
        return Ok(sci);
    };
    let Ok(exponent) = exponent.parse::<i32>() else {
        return Ok(sci);
    };
    let negative = mantissa.starts_with('-');
    let digits: String = mantissa.chars().filter(char::is_ascii_digit).collect();

    let mut text = String::with_capacity(digits.len() + 8);
    if negative {
        text.push('-');
    }

    if (-4..16).contains(&exponent) {
        let point = exponent + 1;
        if point <= 0 {
            text.push_str("0.");
            text.extend(std::iter::repeat('0').take(point.unsigned_abs() as usize));
            text.push_str(&digits);
        } else {
            let point = point as usize;
            if point >= digits.len() {
                text.push_str(&digits);
                text.extend(std::iter::repeat('0').take(point - digits.len()));
                text.push_str(".0");
            } else {
                text.push_str(&digits[..point]);
                text.push('.');
                text.push_str(&digits[point..]);
            }
        }
    } else {
        text.push_str(&digits[..1]);
        if digits.len() > 1 {
            text.push('.');
            text.push_str(&digits[1..]);
        }
        let sign = if exponent < 0 { '-' } else { '+' };
        let _ = write!(text, "e{sign}{:02}", exponent.unsigned_abs());
    }
    Ok(text)
}

fn write_string(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0C}' => out.push_str("\\f"),
            ' '..='~' => out.push(c),
            _ => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    let _ = write!(out, "\\u{unit:04x}");
                }
            }
        }
    }
    out.push('"');
}
