//! Deterministic JSON serialization for signing.
//!
//! The wire protocol signs the JSON form of a payload, so both the sign and
//! verify paths must produce byte-identical output for the same value: object
//! keys sorted lexicographically, `,` and `:` separators, no whitespace.
//! This is the single shared implementation — nothing else in the workspace
//! may serialize a payload for signing.

use serde_json::Value;

/// Serialize a JSON value with sorted keys and compact separators.
///
/// Key order of the input never affects the output; two maps with the same
/// entries canonicalize identically.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value);
    out
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, &Value::String((*key).clone()));
                out.push(':');
                write_value(out, &map[key.as_str()]);
            }
            out.push('}');
        }
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
        // Scalars (null, bool, number, string) already have a single compact
        // form; serde_json handles string escaping.
        scalar => {
            // Serializing a scalar Value cannot fail.
            if let Ok(s) = serde_json::to_string(scalar) {
                out.push_str(&s);
            }
        }
    }
}
