//! Matching for `rbac.role_mapping` group/entitlement rules: glob string, list of globs, or an object with `patterns` /
//! `regex` / `contains` / `in`. Distinct from the payload [`super::Matcher`]
//! DSL, which operates on JSON values rather than a single claim string.

use globset::Glob;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// A `when` clause attached to a `group_rules` / `entitlement_rules` /
/// `deny` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RoleWhen {
    Glob(String),
    List(Vec<RoleWhenItem>),
    Rule(RoleWhenRule),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RoleWhenItem {
    Glob(String),
    Rule(RoleWhenRule),
}

impl RoleWhenItem {
    pub fn matches(&self, value: &str) -> bool {
        match self {
            RoleWhenItem::Glob(pattern) => glob_match(pattern, value),
            RoleWhenItem::Rule(rule) => rule.matches(value),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match self {
            RoleWhenItem::Glob(pattern) => validate_glob(pattern),
            RoleWhenItem::Rule(rule) => rule.validate(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleWhenRule {
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default)]
    pub regex: Option<String>,
    #[serde(default)]
    pub contains: Option<String>,
    #[serde(default, rename = "in")]
    pub in_list: Vec<String>,
}

impl RoleWhenRule {
    fn matches(&self, value: &str) -> bool {
        for pattern in &self.patterns {
            if glob_match(pattern, value) {
                return true;
            }
        }
        if let Some(pattern) = &self.regex {
            if let Ok(re) = Regex::new(pattern) {
                if re.is_match(value) {
                    return true;
                }
            }
        }
        if let Some(needle) = &self.contains {
            if value.contains(needle.as_str()) {
                return true;
            }
        }
        if self.in_list.iter().any(|v| v == value) {
            return true;
        }
        false
    }

    fn validate(&self) -> Result<(), String> {
        for pattern in &self.patterns {
            validate_glob(pattern)?;
        }
        if let Some(pattern) = &self.regex {
            Regex::new(pattern).map_err(|e| format!("invalid regex {pattern:?}: {e}"))?;
        }
        Ok(())
    }
}

fn validate_glob(pattern: &str) -> Result<(), String> {
    Glob::new(pattern)
        .map(|_| ())
        .map_err(|e| format!("invalid glob pattern {pattern:?}: {e}"))
}

fn glob_match(pattern: &str, value: &str) -> bool {
    Glob::new(pattern)
        .map(|g| g.compile_matcher().is_match(value))
        .unwrap_or(false)
}

impl RoleWhen {
    /// Does `value` satisfy this `when` clause?
    pub fn matches(&self, value: &str) -> bool {
        match self {
            RoleWhen::Glob(pattern) => glob_match(pattern, value),
            RoleWhen::List(items) => items.iter().any(|item| match item {
                RoleWhenItem::Glob(pattern) => glob_match(pattern, value),
                RoleWhenItem::Rule(rule) => rule.matches(value),
            }),
            RoleWhen::Rule(rule) => rule.matches(value),
        }
    }

    /// Validate any embedded glob/regex patterns compile.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            RoleWhen::Glob(pattern) => validate_glob(pattern),
            RoleWhen::List(items) => {
                for item in items {
                    match item {
                        RoleWhenItem::Glob(pattern) => validate_glob(pattern)?,
                        RoleWhenItem::Rule(rule) => rule.validate()?,
                    }
                }
                Ok(())
            }
            RoleWhen::Rule(rule) => rule.validate(),
        }
    }

    /// Does any of `values` satisfy this clause?
    pub fn matches_any(&self, values: &[String]) -> bool {
        values.iter().any(|v| self.matches(v))
    }
}
