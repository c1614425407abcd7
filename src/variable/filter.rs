//! Wildcard name filters such as `*latency*;rpc_?`.

use crate::core::{Result, TallyError};
use regex::Regex;

/// Matches names against a list of wildcard patterns.
///
/// Patterns are separated by `,` or `;`. `*` matches any run of characters
/// and `?` matches exactly one.
#[derive(Debug, Clone)]
pub struct WildcardFilter {
    regex: Option<Regex>,
}

impl WildcardFilter {
    /// Compile `patterns`. An empty list matches nothing.
    pub fn new(patterns: &str) -> Result<Self> {
        let alternatives: Vec<String> = patterns
            .split([',', ';'])
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(wildcard_to_regex)
            .collect();
        if alternatives.is_empty() {
            return Ok(Self { regex: None });
        }
        let source = format!("^(?:{})$", alternatives.join("|"));
        let regex = Regex::new(&source)
            .map_err(|e| TallyError::invalid_argument(format!("bad wildcard {:?}: {}", patterns, e)))?;
        Ok(Self { regex: Some(regex) })
    }

    /// True when `name` matches any pattern.
    pub fn matches(&self, name: &str) -> bool {
        self.regex.as_ref().map_or(false, |regex| regex.is_match(name))
    }
}

fn wildcard_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    let mut literal = String::new();
    for c in pattern.chars() {
        match c {
            '*' | '?' => {
                out.push_str(&regex::escape(&literal));
                literal.clear();
                out.push_str(if c == '*' { ".*" } else { "." });
            }
            _ => literal.push(c),
        }
    }
    out.push_str(&regex::escape(&literal));
    out
}
