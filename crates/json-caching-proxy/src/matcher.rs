//! Excluded-route matching.
//!
//! Routes are excluded from the cache by regex patterns evaluated against a
//! `"METHOD path"` descriptor. Patterns are compiled once at startup; a bad
//! pattern is a configuration error, never a per-request failure.

use hyper::Method;
use regex::Regex;

/// Compiled set of route-exclusion patterns.
pub struct ExcludedRoutes {
    patterns: Vec<Regex>,
}

impl ExcludedRoutes {
    pub fn compile(patterns: &[String]) -> Result<Self, anyhow::Error> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Regex::new(p)
                    .map_err(|e| anyhow::anyhow!("invalid excluded route pattern '{p}': {e}"))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// Whether `method` + `path` matches any exclusion pattern. Matching
    /// requests are always forwarded and never looked up or stored.
    pub fn is_excluded(&self, method: &Method, path: &str) -> bool {
        if self.patterns.is_empty() {
            return false;
        }
        let descriptor = format!("{} {}", method.as_str(), path);
        self.patterns.iter().any(|re| re.is_match(&descriptor))
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
