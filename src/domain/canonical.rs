//! Deterministic serialization of I-JSON values.
//!
//! The output is the byte string fed into SHA-256 to derive content ids, so
//! the rendering must be stable across processes and map-key orderings:
//! object keys sort ascending by code point, numbers normalize (`-0` to `0`,
//! integral values without a decimal point), and no whitespace is emitted.

use serde_json::Value;

use crate::domain::errors::{CoreError, CoreResult};

/// Largest f64 magnitude that is still exactly representable as an integer.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Render an I-JSON value to its canonical byte string.
pub fn canonicalize(value: &Value) -> CoreResult<String> {
    let mut out = String::new();
    write_value(value, &mut out)?;
    Ok(out)
}

fn write_value(value: &Value, out: &mut String) -> CoreResult<()> {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => write_number(n, out)?,
        Value::String(s) => write_string(s, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, out)?;
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(key, out);
                out.push(':');
                write_value(&map[key.as_str()], out)?;
            }
            out.push('}');
        }
    }
    Ok(())
}

fn write_number(n: &serde_json::Number, out: &mut String) -> CoreResult<()> {
    if let Some(i) = n.as_i64() {
        out.push_str(&i.to_string());
        return Ok(());
    }
    if let Some(u) = n.as_u64() {
        out.push_str(&u.to_string());
        return Ok(());
    }
    let f = n
        .as_f64()
        .filter(|f| f.is_finite())
        .ok_or_else(|| CoreError::InvalidInput(format!("non-finite number: {n}")))?;

    if f == 0.0 {
        // -0 normalizes to 0
        out.push('0');
    } else if f.fract() == 0.0 && f.abs() < MAX_SAFE_INTEGER {
        out.push_str(&format!("{}", f as i64));
    } else {
        // Rust's Display emits the shortest decimal that round-trips.
        out.push_str(&format!("{f}"));
    }
    Ok(())
}

fn write_string(s: &str, out: &mut String) {
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
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
}
