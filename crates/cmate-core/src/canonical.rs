//! # Canonical Serialization: JCS Byte Production
//!
//! `CanonicalBytes` is the only input accepted by the digest functions, so
//! every integrity hash in the workspace is taken over RFC 8785 (JSON
//! Canonicalization Scheme) output: sorted keys, compact separators, UTF-8.
//!
//! A verifier recomputing a row hash long after it was written must see the
//! exact bytes the writer hashed. Two rules make that hold:
//!
//! 1. **No floats.** Credit hours, percentages and other fractional values
//!    travel as strings or integers. Float rendering is where JCS
//!    implementations disagree, so a float anywhere in the tree is an error
//!    naming its JSON Pointer.
//! 2. **Normalised time.** Timestamps arrive through [`crate::Timestamp`]
//!    (UTC, `Z`, whole seconds).

use serde::Serialize;
use serde_json::Value;

use crate::error::CanonicalizationError;

/// JCS bytes of a float-free JSON value. The field is private; the only
/// way in is [`CanonicalBytes::new`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalBytes(Vec<u8>);

impl CanonicalBytes {
    /// Serialize `obj` to JSON, reject floats, and canonicalize.
    pub fn new(obj: &impl Serialize) -> Result<Self, CanonicalizationError> {
        let tree = serde_json::to_value(obj)?;
        if let Some((path, value)) = first_float(&tree, String::new()) {
            return Err(CanonicalizationError::FloatRejected { path, value });
        }
        Ok(Self(serde_jcs::to_vec(&tree)?))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Depth-first search for a non-integer number; returns its JSON Pointer.
fn first_float(node: &Value, path: String) -> Option<(String, f64)> {
    match node {
        Value::Number(n) if n.as_i64().is_none() && n.as_u64().is_none() => {
            n.as_f64().map(|f| (if path.is_empty() { "/".to_string() } else { path }, f))
        }
        Value::Array(items) => items
            .iter()
            .enumerate()
            .find_map(|(i, item)| first_float(item, format!("{path}/{i}"))),
        Value::Object(fields) => fields.iter().find_map(|(key, item)| {
            let escaped = key.replace('~', "~0").replace('/', "~1");
            first_float(item, format!("{path}/{escaped}"))
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn text(v: Value) -> String {
        String::from_utf8(CanonicalBytes::new(&v).unwrap().as_bytes().to_vec()).unwrap()
    }

    #[test]
    fn test_keys_sorted_and_compact() {
        assert_eq!(
            text(json!({"resource_type": "license", "action_type": "READ"})),
            r#"{"action_type":"READ","resource_type":"license"}"#
        );
    }

    #[test]
    fn test_nested_change_payload() {
        assert_eq!(
            text(json!({
                "phi_fields": ["npi", "dob"],
                "changes": {"old": "pending", "new": "active"}
            })),
            r#"{"changes":{"new":"active","old":"pending"},"phi_fields":["npi","dob"]}"#
        );
    }

    #[test]
    fn test_float_rejected_with_path() {
        match CanonicalBytes::new(&json!({"cme": [{"credit_hours": 1.5}]})) {
            Err(CanonicalizationError::FloatRejected { path, value }) => {
                assert_eq!(path, "/cme/0/credit_hours");
                assert_eq!(value, 1.5);
            }
            other => panic!("expected FloatRejected, got {other:?}"),
        }
    }

    #[test]
    fn test_top_level_float_path_is_root() {
        match CanonicalBytes::new(&2.5f64) {
            Err(CanonicalizationError::FloatRejected { path, .. }) => assert_eq!(path, "/"),
            other => panic!("expected FloatRejected, got {other:?}"),
        }
    }

    #[test]
    fn test_pointer_escaping() {
        match CanonicalBytes::new(&json!({"a/b": {"c~d": 0.1}})) {
            Err(CanonicalizationError::FloatRejected { path, .. }) => {
                assert_eq!(path, "/a~1b/c~0d")
            }
            other => panic!("expected FloatRejected, got {other:?}"),
        }
    }

    #[test]
    fn test_string_and_integer_quantities_accepted() {
        assert_eq!(
            text(json!({"credit_hours": "1.5", "attempts": 3, "offset": -7})),
            r#"{"attempts":3,"credit_hours":"1.5","offset":-7}"#
        );
    }

    #[test]
    fn test_empty_containers() {
        assert_eq!(text(json!({})), "{}");
        assert_eq!(text(json!([])), "[]");
        assert!(!CanonicalBytes::new(&json!({})).unwrap().is_empty());
    }

    #[test]
    fn test_non_ascii_kept_as_utf8() {
        let out = text(json!({"provider": "Jos\u{00e9} Mu\u{00f1}oz"}));
        assert_eq!(out, "{\"provider\":\"Jos\u{00e9} Mu\u{00f1}oz\"}");
        assert_eq!(CanonicalBytes::new(&json!({"a": 1})).unwrap().len(), 7);
    }
}
