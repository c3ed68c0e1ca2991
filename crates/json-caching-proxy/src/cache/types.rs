//! Cache key and entry types.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque deterministic cache key derived from a request by
/// [`crate::cache::KeyNormalizer`].
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub(crate) fn from_string(raw: String) -> Self {
        Self(raw)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One recorded request/response pair. Immutable once stored; a re-record
/// replaces the whole entry, never part of it.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub method: String,
    pub path: String,
    /// Raw query string as received, retained so an exported entry re-derives
    /// the same key on import.
    pub query: Option<String>,
    /// Request body as received, part of the key for non-idempotent methods.
    pub request_body: Bytes,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub recorded_at: DateTime<Utc>,
}
