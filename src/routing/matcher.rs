//! Route pattern matching.
//!
//! # Responsibilities
//! - Compile a route pattern (`/api`, `/tenants/:id`, `/files/*rest`)
//! - Match a request path against it and extract named parameters
//! - Report the matched prefix so it can be stripped before forwarding
//!
//! # Design Decisions
//! - Case-insensitive, trailing-slash tolerant, prefix mode by default
//! - Prefix matches stop on a segment boundary (`/api` never matches `/apiary`)
//! - No regex; one pass over the path segments
//! - Captures are percent-decoded; a malformed escape is no match

use std::borrow::Cow;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Options controlling how a pattern is matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct MatchOptions {
    /// Compare literal segments case-sensitively.
    pub sensitive: bool,
    /// Treat a trailing slash as significant.
    pub strict: bool,
    /// Require the whole path to match instead of a prefix.
    pub end: bool,
}

/// Error returned when a pattern cannot be compiled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("pattern '{0}' must start with '/'")]
    MissingLeadingSlash(String),

    #[error("pattern '{pattern}' has an invalid parameter name '{name}'")]
    InvalidParamName { pattern: String, name: String },

    #[error("pattern '{pattern}' declares parameter '{name}' twice")]
    DuplicateParam { pattern: String, name: String },

    #[error("pattern '{0}' has a wildcard that is not the last segment")]
    WildcardNotLast(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
    Wildcard(Option<String>),
}

/// A successful match.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MatchResult {
    /// Captured parameters by name. Empty for patterns without parameters.
    pub params: HashMap<String, String>,
    /// The part of the request path covered by the pattern, as the client spelled it.
    pub prefix: String,
    /// Whether the route compares literals case-sensitively.
    pub sensitive: bool,
}

impl MatchResult {
    /// Look up a captured parameter.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

/// A compiled route pattern.
#[derive(Debug, Clone)]
pub struct PathPattern {
    source: String,
    segments: Vec<Segment>,
    options: MatchOptions,
}

impl PathPattern {
    /// Compile a pattern with the given options.
    pub fn parse(pattern: &str, options: MatchOptions) -> Result<Self, PatternError> {
        let Some(rest) = pattern.strip_prefix('/') else {
            return Err(PatternError::MissingLeadingSlash(pattern.to_string()));
        };

        // Without `strict` a trailing slash on the pattern carries no meaning.
        let rest = if options.strict {
            rest
        } else {
            rest.trim_end_matches('/')
        };

        let mut segments = Vec::new();
        let mut names: Vec<&str> = Vec::new();

        if !rest.is_empty() {
            let raw: Vec<&str> = rest.split('/').collect();
            let last = raw.len() - 1;

            for (i, part) in raw.into_iter().enumerate() {
                if let Some(name) = part.strip_prefix(':') {
                    check_name(pattern, name, &names)?;
                    names.push(name);
                    segments.push(Segment::Param(name.to_string()));
                } else if let Some(name) = part.strip_prefix('*') {
                    if i != last {
                        return Err(PatternError::WildcardNotLast(pattern.to_string()));
                    }
                    if name.is_empty() {
                        segments.push(Segment::Wildcard(None));
                    } else {
                        check_name(pattern, name, &names)?;
                        names.push(name);
                        segments.push(Segment::Wildcard(Some(name.to_string())));
                    }
                } else {
                    segments.push(Segment::Literal(part.to_string()));
                }
            }
        }

        Ok(Self {
            source: pattern.to_string(),
            segments,
            options,
        })
    }

    /// The pattern as it was written.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// The options this pattern was compiled with.
    pub fn options(&self) -> MatchOptions {
        self.options
    }

    /// Match a request path (without query string).
    pub fn matches(&self, path: &str) -> Option<MatchResult> {
        let rest = path.strip_prefix('/')?;
        let parts: Vec<&str> = if rest.is_empty() {
            Vec::new()
        } else {
            rest.split('/').collect()
        };

        let mut params = HashMap::new();
        let mut consumed = 0;

        for segment in &self.segments {
            match segment {
                Segment::Literal(expected) => {
                    let actual = parts.get(consumed)?;
                    let equal = if self.options.sensitive {
                        actual == expected
                    } else {
                        actual.eq_ignore_ascii_case(expected)
                    };
                    if !equal {
                        return None;
                    }
                    consumed += 1;
                }
                Segment::Param(name) => {
                    let actual = parts.get(consumed)?;
                    if actual.is_empty() {
                        return None;
                    }
                    params.insert(name.clone(), decode_capture(actual)?);
                    consumed += 1;
                }
                Segment::Wildcard(name) => {
                    if let Some(name) = name {
                        params.insert(name.clone(), decode_capture(&parts[consumed..].join("/"))?);
                    }
                    consumed = parts.len();
                }
            }
        }

        let remaining = &parts[consumed..];
        if self.options.end {
            let trailing_slash_only = remaining.len() == 1 && remaining[0].is_empty();
            if !remaining.is_empty() && (self.options.strict || !trailing_slash_only) {
                return None;
            }
        }

        let prefix = if consumed == 0 {
            String::new()
        } else {
            format!("/{}", parts[..consumed].join("/"))
        };

        Some(MatchResult {
            params,
            prefix,
            sensitive: self.options.sensitive,
        })
    }
}

/// Percent-decode a captured value. `None` on a malformed escape or invalid UTF-8.
fn decode_capture(raw: &str) -> Option<String> {
    let bytes = raw.as_bytes();
    let well_formed = bytes
        .iter()
        .enumerate()
        .filter(|(_, b)| **b == b'%')
        .all(|(i, _)| {
            bytes
                .get(i + 1..i + 3)
                .is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit))
        });
    if !well_formed {
        return None;
    }
    urlencoding::decode(raw).ok().map(Cow::into_owned)
}

fn check_name(pattern: &str, name: &str, seen: &[&str]) -> Result<(), PatternError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(PatternError::InvalidParamName {
            pattern: pattern.to_string(),
            name: name.to_string(),
        });
    }
    if seen.contains(&name) {
        return Err(PatternError::DuplicateParam {
            pattern: pattern.to_string(),
            name: name.to_string(),
        });
    }
    Ok(())
}
