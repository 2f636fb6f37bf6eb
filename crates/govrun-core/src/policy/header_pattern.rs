//! Compiled header/query pattern matching for the audit envelope builder:
//! case-insensitive glob (fnmatch-style) or regex, the latter signaled by a
//! `re:`/`regex:` prefix or a `{regex: "..."}` form.

use globset::{Glob, GlobMatcher};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// A pattern as authored in policy YAML: a bare string (glob, or
/// `re:`/`regex:` prefixed), or an explicit `{glob: "..."}` / `{regex:
/// "..."}` object.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PatternSpec {
    Str(String),
    Glob { glob: String },
    Regex { regex: String },
}

impl PatternSpec {
    /// Validate that this pattern compiles, without keeping the result.
    pub fn validate(&self) -> Result<(), String> {
        self.compile().map(|_| ())
    }

    fn compile(&self) -> Result<HeaderPattern, String> {
        match self {
            PatternSpec::Str(s) => HeaderPattern::compile(s),
            PatternSpec::Glob { glob } => {
                Glob::new(&glob.to_lowercase())
                    .map(|g| HeaderPattern::Glob(g.compile_matcher()))
                    .map_err(|e| e.to_string())
            }
            PatternSpec::Regex { regex } => Regex::new(regex)
                .map(HeaderPattern::Regex)
                .map_err(|e| e.to_string()),
        }
    }
}

/// A single compiled `allowlist_headers` / `redact_headers` pattern.
#[derive(Debug, Clone)]
pub enum HeaderPattern {
    Glob(GlobMatcher),
    Regex(Regex),
}

impl HeaderPattern {
    /// Compile a pattern string from policy YAML. Glob patterns are matched
    /// case-insensitively; regex patterns use the pattern as given.
    pub fn compile(raw: &str) -> Result<Self, String> {
        if let Some(pattern) = raw.strip_prefix("re:").or_else(|| raw.strip_prefix("regex:")) {
            return Regex::new(pattern)
                .map(HeaderPattern::Regex)
                .map_err(|e| e.to_string());
        }
        let glob = Glob::new(&raw.to_lowercase()).map_err(|e| e.to_string())?;
        Ok(HeaderPattern::Glob(glob.compile_matcher()))
    }

    /// Whether `candidate` (a header name or query key, already expected to
    /// be lowercase for glob patterns) matches this pattern.
    pub fn is_match(&self, candidate: &str) -> bool {
        match self {
            HeaderPattern::Glob(matcher) => matcher.is_match(candidate.to_lowercase()),
            HeaderPattern::Regex(re) => re.is_match(candidate),
        }
    }
}

/// Compile a list of pattern specs, silently dropping any that fail to
/// compile (the policy validator is expected to have already rejected bad
/// patterns before `save`; this is the defensive fallback at use-time).
pub fn compile_all(patterns: &[PatternSpec]) -> Vec<HeaderPattern> {
    patterns.iter().filter_map(|p| p.compile().ok()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_pattern_matches_case_insensitively() {
        let p = HeaderPattern::compile("x-b3-*").unwrap();
        assert!(p.is_match("x-b3-traceid"));
        assert!(p.is_match("X-B3-TraceId"));
        assert!(!p.is_match("x-secret-token"));
    }

    #[test]
    fn regex_prefixed_pattern_compiles_and_matches() {
        let p = HeaderPattern::compile("re:^x-secret-").unwrap();
        assert!(p.is_match("x-secret-token"));
        assert!(!p.is_match("x-b3-traceid"));
    }

    #[test]
    fn compile_all_drops_invalid_patterns() {
        let patterns = vec![
            PatternSpec::Str("x-ok-*".to_string()),
            PatternSpec::Str("re:(unclosed".to_string()),
        ];
        let compiled = compile_all(&patterns);
        assert_eq!(compiled.len(), 1);
    }

    #[test]
    fn object_form_glob_and_regex_compile() {
        let patterns = vec![
            PatternSpec::Glob {
                glob: "x-b3-*".to_string(),
            },
            PatternSpec::Regex {
                regex: "^x-pii-".to_string(),
            },
        ];
        let compiled = compile_all(&patterns);
        assert_eq!(compiled.len(), 2);
        assert!(compiled[0].is_match("x-b3-traceid"));
        assert!(compiled[1].is_match("x-pii-email"));
    }

    #[test]
    fn untagged_deserialization_accepts_all_three_forms() {
        let s: PatternSpec = serde_json::from_value(serde_json::json!("x-*")).unwrap();
        assert!(matches!(s, PatternSpec::Str(_)));
        let g: PatternSpec = serde_json::from_value(serde_json::json!({"glob": "x-*"})).unwrap();
        assert!(matches!(g, PatternSpec::Glob { .. }));
        let r: PatternSpec = serde_json::from_value(serde_json::json!({"regex": "^x"})).unwrap();
        assert!(matches!(r, PatternSpec::Regex { .. }));
    }
}
