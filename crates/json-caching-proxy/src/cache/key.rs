//! Deterministic cache-key derivation.
//!
//! Two requests that differ only in query-parameter order or in the value of
//! a configured cache-busting parameter must map to the same key. For
//! non-idempotent methods the body participates in the key through a SHA-256
//! digest, so replayed POSTs only hit when the payload matches.

use super::types::CacheKey;
use sha2::{Digest, Sha256};
use std::borrow::Cow;
use std::collections::HashSet;

/// Derives cache keys from request components, filtering the configured
/// cache-busting parameters.
pub struct KeyNormalizer {
    busting_params: HashSet<String>,
}

impl KeyNormalizer {
    pub fn new(busting_params: &[String]) -> Self {
        Self {
            busting_params: busting_params.iter().cloned().collect(),
        }
    }

    /// Derive the key for a request. `method` is uppercased, the query is
    /// canonicalized (busting params dropped, rest sorted by name then
    /// value), and the body is digested for anything other than a retrieval
    /// method.
    pub fn normalize(&self, method: &str, path: &str, query: Option<&str>, body: &[u8]) -> CacheKey {
        let method = method.to_ascii_uppercase();
        let mut key = format!("{method} {path}");

        let canonical = self.canonical_query(query);
        if !canonical.is_empty() {
            key.push('?');
            key.push_str(&canonical);
        }

        if !is_retrieval_method(&method) {
            key.push('#');
            key.push_str(&hex::encode(Sha256::digest(body)));
        }

        CacheKey::from_string(key)
    }

    fn canonical_query(&self, query: Option<&str>) -> String {
        let Some(query) = query.filter(|q| !q.is_empty()) else {
            return String::new();
        };

        let mut pairs: Vec<(String, String)> = query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| {
                let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
                (decode_component(name), decode_component(value))
            })
            .filter(|(name, _)| !self.busting_params.contains(name))
            .collect();
        pairs.sort();

        let encoded: Vec<String> = pairs
            .iter()
            .map(|(name, value)| format!("{}={}", urlencoding::encode(name), urlencoding::encode(value)))
            .collect();
        encoded.join("&")
    }
}

/// Safe/idempotent methods whose bodies do not participate in the key.
fn is_retrieval_method(method: &str) -> bool {
    matches!(method, "GET" | "HEAD" | "OPTIONS")
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(Cow::Borrowed(s)) => s.to_string(),
        Ok(Cow::Owned(s)) => s,
        Err(_) => spaced,
    }
}
