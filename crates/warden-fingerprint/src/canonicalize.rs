//! # Canonical JSON
//!
//! Deterministic serialization used as the input of every Warden hash.
//! Two semantically identical values always produce identical bytes:
//!
//! 1. **Object keys** are sorted by UTF-16 code units (RFC 8785 order)
//! 2. **Numbers** use their shortest form; integral floats print as integers
//! 3. **Strings** escape only `"`, `\` and control characters
//! 4. **Whitespace** is never emitted
//! 5. **Arrays** keep element order
//!
//! The writer appends into a single buffer instead of building
//! intermediate strings per node, since board grids are serialized on
//! every validation.
//!
//! ## References
//!
//! - RFC 8785 - "JSON Canonicalization Scheme (JCS)"

use crate::error::Result;
use serde::Serialize;
use serde_json::{Map, Number, Value};
use std::fmt::Write;

/// Canonical JSON text of `value`.
///
/// # Example
///
/// ```rust
/// use warden_fingerprint::canonicalize;
/// use serde_json::json;
///
/// let a = canonicalize(&json!({"score": 10, "board": [[0, 1]]}));
/// let b = canonicalize(&json!({"board": [[0, 1]], "score": 10.0}));
/// assert_eq!(a, b);
/// assert_eq!(a, r#"{"board":[[0,1]],"score":10}"#);
/// ```
#[must_use]
pub fn canonicalize(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value);
    out
}

/// Canonical JSON bytes of any serializable value.
///
/// # Errors
///
/// Returns [`FingerprintError::Serialization`](crate::FingerprintError)
/// if `value` cannot be represented as JSON.
pub fn canonical_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let value = serde_json::to_value(value)?;
    Ok(canonicalize(&value).into_bytes())
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(n) => write_number(out, n),
        Value::String(s) => write_string(out, s),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, item);
            }
            out.push(']');
        }
        Value::Object(map) => write_object(out, map),
    }
}

fn write_number(out: &mut String, n: &Number) {
    if let Some(i) = n.as_i64() {
        let _ = write!(out, "{i}");
    } else if let Some(u) = n.as_u64() {
        let _ = write!(out, "{u}");
    } else if let Some(f) = n.as_f64() {
        if !f.is_finite() {
            out.push_str("null");
        } else if f.fract() == 0.0 && f.abs() < 9.007_199_254_740_992e15 {
            // Integral floats below 2^53 are exact as i64.
            #[allow(clippy::cast_possible_truncation)]
            let _ = write!(out, "{}", f as i64);
        } else {
            let _ = write!(out, "{f}");
        }
    } else {
        let _ = write!(out, "{n}");
    }
}

fn write_string(out: &mut String, s: &str) {
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\x08' => out.push_str("\\b"),
            '\x0C' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c < '\x20' => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

fn write_object(out: &mut String, map: &Map<String, Value>) {
    let mut entries: Vec<(&String, &Value)> = map.iter().collect();
    entries.sort_by(|(a, _), (b, _)| a.encode_utf16().cmp(b.encode_utf16()));

    out.push('{');
    for (i, (key, value)) in entries.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        write_string(out, key);
        out.push(':');
        write_value(out, value);
    }
    out.push('}');
}
