//! Cache key derivation.
//!
//! `tc:{tool}:{digest}` where `digest` is the first 16 hex characters of the
//! SHA-256 of the tool input's canonical JSON. Canonical means object keys
//! sorted at every depth and no insignificant whitespace, so two inputs that
//! differ only in key order hash identically regardless of how the
//! `serde_json` map happens to be ordered in this build.
//!
//! Derivation works on a [`serde_json::Value`], which is always
//! serializable, so it cannot fail.

use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Prefix of tool-result entries.
pub const TOOL_PREFIX: &str = "tc:";

/// Prefix of reference-store entries.
pub const REF_PREFIX: &str = "ctx:";

/// Namespace for oversized payloads stored by reference.
pub const TASK_REF_PREFIX: &str = "ctx:task:";

/// Hex characters of the digest kept in a key.
const DIGEST_LEN: usize = 16;

/// Hex characters of the random part of a reference key.
const REF_ID_LEN: usize = 12;

/// Derive the cache key for a tool call.
pub fn derive_key(tool_name: &str, input: &Value) -> String {
    let canonical = canonical_json(input);
    let digest = hex::encode(Sha256::digest(canonical.as_bytes()));
    format!("{TOOL_PREFIX}{tool_name}:{}", &digest[..DIGEST_LEN])
}

/// Fresh random key under `ctx:task:`.
pub fn reference_key() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("{TASK_REF_PREFIX}{}", &id[..REF_ID_LEN])
}

/// Compact JSON with object keys sorted recursively.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // Display on a JSON string value yields the quoted, escaped form.
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(item, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
