//! HAR-subset interchange format and its translation to cache entries.
//!
//! The cache's internal representation stays independent of the interchange
//! shape; this module is the only place that maps between the two. Import
//! derives each entry's key through the same normalizer used for live
//! traffic, which is what guarantees replayed requests hit at runtime.

use crate::cache::{CacheEntry, CacheStore, KeyNormalizer};
use crate::matcher::ExcludedRoutes;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use hyper::Uri;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarDocument {
    pub log: HarLog,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarLog {
    pub version: String,
    pub creator: HarCreator,
    #[serde(default)]
    pub entries: Vec<HarEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarCreator {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarEntry {
    pub started_date_time: DateTime<Utc>,
    pub request: HarRequest,
    pub response: HarResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarRequest {
    pub method: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_data: Option<HarPostData>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarPostData {
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarResponse {
    pub status: u16,
    #[serde(default)]
    pub headers: Vec<HarHeader>,
    pub content: HarContent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarHeader {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarContent {
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// `"base64"` when `text` holds an encoded binary body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
}

/// Import a HAR document into the store. Structurally invalid entries are
/// skipped with a warning; a single bad entry never aborts the batch.
/// Returns the number of entries imported.
pub fn import(
    store: &CacheStore,
    normalizer: &KeyNormalizer,
    excluded: &ExcludedRoutes,
    doc: &HarDocument,
) -> usize {
    let mut imported = 0;
    for entry in &doc.log.entries {
        match entry_to_cache(normalizer, excluded, entry) {
            Ok(Some(cache_entry)) => {
                store.put(cache_entry);
                imported += 1;
            }
            Ok(None) => {
                debug!(
                    "HAR entry {} {} matches an excluded route, not imported",
                    entry.request.method, entry.request.url
                );
            }
            Err(reason) => {
                warn!(
                    "Skipping HAR entry {} {}: {reason}",
                    entry.request.method, entry.request.url
                );
            }
        }
    }
    imported
}

/// Export the store's ordered listing as a HAR document. Timestamps reflect
/// original record time.
pub fn export(store: &CacheStore) -> HarDocument {
    let entries = store.list().iter().map(cache_to_entry).collect();
    HarDocument {
        log: HarLog {
            version: "1.2".to_string(),
            creator: HarCreator {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            entries,
        },
    }
}

fn entry_to_cache(
    normalizer: &KeyNormalizer,
    excluded: &ExcludedRoutes,
    entry: &HarEntry,
) -> Result<Option<CacheEntry>, String> {
    let uri: Uri = entry
        .request
        .url
        .parse()
        .map_err(|e| format!("invalid request url: {e}"))?;
    let path = uri.path().to_string();
    let query = uri.query().map(|q| q.to_string());

    let method: hyper::Method = entry
        .request
        .method
        .parse()
        .map_err(|_| format!("invalid request method '{}'", entry.request.method))?;
    if excluded.is_excluded(&method, &path) {
        return Ok(None);
    }

    let request_body = entry
        .request
        .post_data
        .as_ref()
        .map(|pd| Bytes::copy_from_slice(pd.text.as_bytes()))
        .unwrap_or_default();

    let body = match &entry.response.content.text {
        None => Bytes::new(),
        Some(text) => match entry.response.content.encoding.as_deref() {
            Some("base64") => BASE64
                .decode(text)
                .map(Bytes::from)
                .map_err(|e| format!("invalid base64 response body: {e}"))?,
            Some(other) => return Err(format!("unsupported content encoding '{other}'")),
            None => Bytes::copy_from_slice(text.as_bytes()),
        },
    };

    let key = normalizer.normalize(method.as_str(), &path, query.as_deref(), &request_body);
    let headers = entry
        .response
        .headers
        .iter()
        .map(|h| (h.name.clone(), h.value.clone()))
        .collect();

    Ok(Some(CacheEntry {
        key,
        method: method.as_str().to_string(),
        path,
        query,
        request_body,
        status: entry.response.status,
        headers,
        body,
        recorded_at: entry.started_date_time,
    }))
}

fn cache_to_entry(entry: &CacheEntry) -> HarEntry {
    let url = match &entry.query {
        Some(query) => format!("{}?{}", entry.path, query),
        None => entry.path.clone(),
    };

    let post_data = if entry.request_body.is_empty() {
        None
    } else {
        Some(HarPostData {
            mime_type: String::new(),
            text: String::from_utf8_lossy(&entry.request_body).into_owned(),
        })
    };

    let mime_type = entry
        .headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
        .map(|(_, value)| value.clone())
        .unwrap_or_default();

    let (text, encoding) = match std::str::from_utf8(&entry.body) {
        Ok(text) => (Some(text.to_string()), None),
        Err(_) => (Some(BASE64.encode(&entry.body)), Some("base64".to_string())),
    };

    HarEntry {
        started_date_time: entry.recorded_at,
        request: HarRequest {
            method: entry.method.clone(),
            url,
            post_data,
        },
        response: HarResponse {
            status: entry.status,
            headers: entry
                .headers
                .iter()
                .map(|(name, value)| HarHeader {
                    name: name.clone(),
                    value: value.clone(),
                })
                .collect(),
            content: HarContent {
                size: entry.body.len() as i64,
                mime_type,
                text,
                encoding,
            },
        },
    }
}
