//! Dynamic matcher DSL used by payload rules and role mapping.
//!
//! A [`Matcher`] is evaluated against a single JSON value pulled out of a
//! request payload or an identity claim. It is intentionally a closed,
//! data-only representation so policy documents can express conditions
//! without embedding a scripting language.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A condition evaluated against one extracted JSON value.
///
/// `Scalar` and `Any` are shorthand forms; `Op` is the general form: an
/// object with exactly one operator key (`in`, `eq`, `contains`, `regex`).
/// All three are accepted in policy YAML so authors can write `region: "us"`
/// or `region: ["us", "eu"]` instead of always spelling out `{in: [...]}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Matcher {
    /// `{in: [...]}` / `{eq: ...}` / `{contains: "..."}` / `{regex: "..."}` —
    /// serde's externally-tagged enum representation already requires the
    /// object to have exactly one recognized key.
    Op(MatcherOp),
    /// Equivalent to `Op(MatcherOp::In(Value::Array(values)))`.
    Any(Vec<Value>),
    /// Equivalent to `Op(MatcherOp::Eq(value))`.
    Scalar(Value),
}

/// The general operator form, externally tagged so `{"in": [...]}` /
/// `{"eq": ...}` / `{"contains": "..."}` / `{"regex": "..."}` deserialize
/// directly, with exactly one operator key enforced by serde itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatcherOp {
    /// The extracted value must be contained in the argument (an array).
    In(Value),
    /// The extracted value must equal the argument exactly.
    Eq(Value),
    /// The extracted value, treated as a string, must contain the argument as a substring.
    Contains(Value),
    /// The extracted value, treated as a string, must match the argument as a regex.
    Regex(Value),
}

impl Matcher {
    /// Evaluate this matcher against an extracted value. Missing values
    /// (`None`) never match, regardless of operator.
    pub fn matches(&self, value: Option<&Value>) -> bool {
        let Some(value) = value else {
            return false;
        };
        match self {
            Matcher::Scalar(expected) => value == expected,
            Matcher::Any(candidates) => candidates.iter().any(|c| c == value),
            Matcher::Op(op) => op.matches(value),
        }
    }

    /// Validate that this matcher is well-formed (e.g. a `Regex` op's
    /// argument actually compiles). Used by [`super::validate`] to surface
    /// policy authoring mistakes at load time instead of at match time.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Matcher::Op(op) => op.validate(),
            _ => Ok(()),
        }
    }
}

impl MatcherOp {
    fn matches(&self, value: &Value) -> bool {
        match self {
            MatcherOp::Eq(arg) => value == arg,
            MatcherOp::In(arg) => arg.as_array().is_some_and(|items| items.contains(value)),
            MatcherOp::Contains(arg) => match arg.as_str() {
                Some(needle) => match value {
                    Value::String(haystack) => haystack.contains(needle),
                    Value::Array(items) => items
                        .iter()
                        .any(|item| item.as_str().is_some_and(|s| s.contains(needle))),
                    _ => false,
                },
                None => false,
            },
            MatcherOp::Regex(arg) => match (value.as_str(), arg.as_str()) {
                (Some(text), Some(pattern)) => Regex::new(pattern).is_ok_and(|re| re.is_match(text)),
                _ => false,
            },
        }
    }

    fn validate(&self) -> Result<(), String> {
        if let MatcherOp::Regex(arg) = self {
            match arg.as_str() {
                Some(pattern) => Regex::new(pattern)
                    .map(|_| ())
                    .map_err(|e| format!("invalid regex pattern {pattern:?}: {e}")),
                None => Err("regex matcher arg must be a string".to_string()),
            }
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalar_matches_equal_value_only() {
        let m = Matcher::Scalar(json!("us"));
        assert!(m.matches(Some(&json!("us"))));
        assert!(!m.matches(Some(&json!("eu"))));
        assert!(!m.matches(None));
    }

    #[test]
    fn any_matches_membership() {
        let m = Matcher::Any(vec![json!("us"), json!("eu")]);
        assert!(m.matches(Some(&json!("eu"))));
        assert!(!m.matches(Some(&json!("apac"))));
    }

    #[test]
    fn op_in_matches_array_arg() {
        let m = Matcher::Op(MatcherOp::In(json!(["gold", "platinum"])));
        assert!(m.matches(Some(&json!("gold"))));
        assert!(!m.matches(Some(&json!("silver"))));
    }

    #[test]
    fn op_contains_requires_strings() {
        let m = Matcher::Op(MatcherOp::Contains(json!("admin")));
        assert!(m.matches(Some(&json!("org-admin-team"))));
        assert!(!m.matches(Some(&json!(42))));
    }

    #[test]
    fn op_regex_matches_pattern() {
        let m = Matcher::Op(MatcherOp::Regex(json!("^case-\\d+$")));
        assert!(m.matches(Some(&json!("case-123"))));
        assert!(!m.matches(Some(&json!("case-abc"))));
    }

    #[test]
    fn op_contains_on_list_matches_any_element() {
        let m = Matcher::Op(MatcherOp::Contains(json!("admin")));
        assert!(m.matches(Some(&json!(["viewer", "org-admin-team"]))));
        assert!(!m.matches(Some(&json!(["viewer", "billing"]))));
    }

    #[test]
    fn validate_rejects_bad_regex() {
        let m = Matcher::Op(MatcherOp::Regex(json!("(unclosed")));
        assert!(m.validate().is_err());
    }

    #[test]
    fn deserializes_shorthand_forms() {
        let scalar: Matcher = serde_json::from_value(json!("us")).unwrap();
        assert!(matches!(scalar, Matcher::Scalar(_)));

        let any: Matcher = serde_json::from_value(json!(["us", "eu"])).unwrap();
        assert!(matches!(any, Matcher::Any(_)));

        let op: Matcher = serde_json::from_value(json!({"contains": "x"})).unwrap();
        assert!(matches!(op, Matcher::Op(MatcherOp::Contains(_))));
    }

    #[test]
    fn deserializes_single_operator_key_object_form() {
        let in_op: Matcher = serde_json::from_value(json!({"in": ["USD", "EUR", "GBP"]})).unwrap();
        assert!(in_op.matches(Some(&json!("EUR"))));
        assert!(!in_op.matches(Some(&json!("JPY"))));

        let eq_op: Matcher = serde_json::from_value(json!({"eq": "resolved"})).unwrap();
        assert!(eq_op.matches(Some(&json!("resolved"))));
        assert!(!eq_op.matches(Some(&json!("todo"))));

        let regex_op: Matcher = serde_json::from_value(json!({"regex": "^case-\\d+$"})).unwrap();
        assert!(regex_op.matches(Some(&json!("case-7"))));
    }
}
