//! Path rewriting before forwarding.

use std::fmt;
use std::sync::Arc;

use axum::http::uri::PathAndQuery;
use serde::{Deserialize, Serialize};

use crate::forward::error::RewriteError;
use crate::http::request::RequestContext;

/// Rewrite rules expressible in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RewriteRule {
    /// Drop the part of the path matched by the route pattern.
    StripPrefix,
    /// Replace a leading `from` segment run with `to`, using the route's case rule.
    /// Paths not under `from` pass unchanged.
    ReplacePrefix { from: String, to: String },
}

pub type RewriteFn = Arc<dyn Fn(&str, &RequestContext) -> Result<String, RewriteError> + Send + Sync>;

/// How the forwarded path is derived from the original one.
#[derive(Clone)]
pub enum Rewrite {
    Rule(RewriteRule),
    Custom(RewriteFn),
}

impl Rewrite {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&str, &RequestContext) -> Result<String, RewriteError> + Send + Sync + 'static,
    {
        Rewrite::Custom(Arc::new(f))
    }

    /// Rewrite `original` (path and query). `mount_prefix` is the matched route prefix;
    /// `sensitive` is the route's case rule.
    pub fn apply(
        &self,
        original: &str,
        mount_prefix: &str,
        sensitive: bool,
        ctx: &RequestContext,
    ) -> Result<String, RewriteError> {
        let rewritten = match self {
            Rewrite::Rule(RewriteRule::StripPrefix) => {
                let rest = strip_mount(original, mount_prefix, true).ok_or_else(|| {
                    RewriteError(format!(
                        "path '{original}' does not start with mount prefix '{mount_prefix}'"
                    ))
                })?;
                normalize(rest)
            }
            Rewrite::Rule(RewriteRule::ReplacePrefix { from, to }) => match strip_mount(original, from, sensitive) {
                Some(rest) => normalize(&format!("{}{}", to.trim_end_matches('/'), rest)),
                None => original.to_string(),
            },
            Rewrite::Custom(f) => f(original, ctx)?,
        };

        if !rewritten.starts_with('/') {
            return Err(RewriteError(format!(
                "rewritten path '{rewritten}' must start with '/'"
            )));
        }
        PathAndQuery::try_from(rewritten.as_str())
            .map_err(|e| RewriteError(format!("rewritten path '{rewritten}' is invalid: {e}")))?;

        Ok(rewritten)
    }
}

/// Remainder of `path` after `prefix`, only when the prefix ends on a segment boundary.
fn strip_mount<'a>(path: &'a str, prefix: &str, sensitive: bool) -> Option<&'a str> {
    let prefix = prefix.trim_end_matches('/');
    let head = path.get(..prefix.len())?;
    let same = if sensitive {
        head == prefix
    } else {
        head.eq_ignore_ascii_case(prefix)
    };
    if !same {
        return None;
    }
    let rest = &path[prefix.len()..];
    (rest.is_empty() || rest.starts_with('/') || rest.starts_with('?')).then_some(rest)
}

fn normalize(rest: &str) -> String {
    if rest.is_empty() {
        "/".to_string()
    } else if rest.starts_with('?') {
        format!("/{rest}")
    } else {
        rest.to_string()
    }
}

impl From<RewriteRule> for Rewrite {
    fn from(rule: RewriteRule) -> Self {
        Rewrite::Rule(rule)
    }
}

impl fmt::Debug for Rewrite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rewrite::Rule(rule) => fmt::Debug::fmt(rule, f),
            Rewrite::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}
