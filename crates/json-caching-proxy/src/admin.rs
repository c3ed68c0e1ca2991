//! Admin control plane for inspecting and mutating proxy state at runtime.
//!
//! Requests whose path starts with the configured command prefix are handled
//! here before any cache or forwarding logic runs. Admin requests are never
//! matched against route exclusions, never cached, and never forwarded
//! upstream.

use crate::cache::{CacheEntry, CacheKey, CacheStore};
use crate::har;
use crate::state::ProxyState;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use serde::Serialize;
use tracing::{debug, info};

/// Parsed admin route under the command prefix.
#[derive(Debug, PartialEq, Eq)]
enum AdminRoute {
    /// GET/DELETE {prefix}/cache
    Cache,
    /// GET/DELETE {prefix}/cache/:key (key percent-encoded)
    CacheEntry(String),
    /// GET {prefix}/export
    Export,
    /// POST {prefix}/playback
    Playback,
    /// POST {prefix}/record
    Record,
    /// POST {prefix}/cache-everything
    CacheEverything,
    /// GET {prefix}/status
    Status,
}

impl AdminRoute {
    /// Parse route from path segments after the command prefix.
    fn parse(segments: &[&str]) -> Option<Self> {
        match segments {
            ["cache"] => Some(AdminRoute::Cache),
            ["cache", encoded_key] => {
                let key = urlencoding::decode(encoded_key).ok()?.into_owned();
                Some(AdminRoute::CacheEntry(key))
            }
            ["export"] => Some(AdminRoute::Export),
            ["playback"] => Some(AdminRoute::Playback),
            ["record"] => Some(AdminRoute::Record),
            ["cache-everything"] => Some(AdminRoute::CacheEverything),
            ["status"] => Some(AdminRoute::Status),
            _ => None,
        }
    }
}

/// Strip the admin prefix from a request path. Returns the remainder when the
/// path addresses the admin plane (`/{prefix}` exactly, or `/{prefix}/...`).
pub fn strip_prefix<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() || rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}

/// Handle an admin request. `rest` is the path remainder after the prefix.
pub async fn handle_request(
    req: Request<Incoming>,
    rest: &str,
    store: &CacheStore,
    state: &ProxyState,
) -> Response<Full<Bytes>> {
    let method = req.method().clone();
    debug!("Admin request: {} {}", method, req.uri().path());

    let segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();
    let route = match AdminRoute::parse(&segments) {
        Some(route) => route,
        None => return not_found(),
    };

    match (&method, route) {
        (&Method::GET, AdminRoute::Cache) => handle_list(store),
        (&Method::DELETE, AdminRoute::Cache) => handle_clear(store),
        (&Method::GET, AdminRoute::CacheEntry(key)) => handle_get_entry(store, &key),
        (&Method::DELETE, AdminRoute::CacheEntry(key)) => handle_delete_entry(store, &key),
        (&Method::GET, AdminRoute::Export) => handle_export(store),
        (&Method::GET, AdminRoute::Status) => handle_status(store, state),
        (&Method::POST, AdminRoute::Playback) => {
            handle_toggle(req, "playback", |enabled| state.set_playback(enabled)).await
        }
        (&Method::POST, AdminRoute::Record) => {
            handle_toggle(req, "record", |enabled| state.set_recording(enabled)).await
        }
        (&Method::POST, AdminRoute::CacheEverything) => {
            handle_toggle(req, "cacheEverything", |enabled| {
                state.set_cache_everything(enabled)
            })
            .await
        }
        _ => not_found(),
    }
}

// =============================================================================
// Response types
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EntrySummary {
    key: String,
    method: String,
    path: String,
    status: u16,
    recorded_at: String,
    body_bytes: usize,
}

impl EntrySummary {
    fn from_entry(entry: &CacheEntry) -> Self {
        Self {
            key: entry.key.to_string(),
            method: entry.method.clone(),
            path: entry.path.clone(),
            status: entry.status,
            recorded_at: entry.recorded_at.to_rfc3339(),
            body_bytes: entry.body.len(),
        }
    }
}

#[derive(Debug, Serialize)]
struct CacheListing {
    entries: Vec<EntrySummary>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EntryDetail {
    #[serde(flatten)]
    summary: EntrySummary,
    headers: Vec<(String, String)>,
    body: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    playback: bool,
    record: bool,
    cache_everything: bool,
    entry_count: usize,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

// =============================================================================
// Handlers
// =============================================================================

fn handle_list(store: &CacheStore) -> Response<Full<Bytes>> {
    let entries = store.list().iter().map(EntrySummary::from_entry).collect();
    json_response(StatusCode::OK, &CacheListing { entries })
}

fn handle_clear(store: &CacheStore) -> Response<Full<Bytes>> {
    let cleared = store.len();
    store.clear();
    info!("Admin cleared cache ({cleared} entries)");
    json_response(StatusCode::OK, &serde_json::json!({ "cleared": cleared }))
}

fn handle_get_entry(store: &CacheStore, raw_key: &str) -> Response<Full<Bytes>> {
    let key = CacheKey::from_string(raw_key.to_string());
    match store.get(&key) {
        Some(entry) => json_response(
            StatusCode::OK,
            &EntryDetail {
                summary: EntrySummary::from_entry(&entry),
                headers: entry.headers.clone(),
                body: String::from_utf8_lossy(&entry.body).into_owned(),
            },
        ),
        None => not_found(),
    }
}

fn handle_delete_entry(store: &CacheStore, raw_key: &str) -> Response<Full<Bytes>> {
    let key = CacheKey::from_string(raw_key.to_string());
    if store.delete(&key) {
        info!("Admin deleted cache entry {raw_key}");
        json_response(StatusCode::OK, &serde_json::json!({ "deleted": raw_key }))
    } else {
        not_found()
    }
}

fn handle_export(store: &CacheStore) -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, &har::export(store))
}

fn handle_status(store: &CacheStore, state: &ProxyState) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::OK,
        &StatusResponse {
            playback: state.playback(),
            record: state.recording(),
            cache_everything: state.cache_everything(),
            entry_count: store.len(),
        },
    )
}

/// Apply a boolean toggle. A body that is not a JSON boolean is rejected
/// without mutating any state.
async fn handle_toggle<F>(
    req: Request<Incoming>,
    flag_name: &str,
    apply: F,
) -> Response<Full<Bytes>>
where
    F: FnOnce(bool),
{
    let body = match req.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                &format!("failed to read request body: {e}"),
            )
        }
    };

    let enabled = match parse_bool_body(&body) {
        Some(enabled) => enabled,
        None => {
            return error_response(
                StatusCode::BAD_REQUEST,
                &format!("{flag_name} toggle requires a JSON boolean body"),
            )
        }
    };

    apply(enabled);
    info!("Admin set {flag_name} = {enabled}");
    json_response(StatusCode::OK, &serde_json::json!({ flag_name: enabled }))
}

/// Parse a toggle body: strictly a JSON boolean (`true`/`false`).
fn parse_bool_body(body: &[u8]) -> Option<bool> {
    serde_json::from_slice::<bool>(body).ok()
}

// =============================================================================
// Response helpers
// =============================================================================

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let json = serde_json::to_string_pretty(body).unwrap_or_else(|_| "{}".to_string());
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Full::new(Bytes::from(json)))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::from("{}"))))
}

fn error_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    json_response(
        status,
        &ErrorResponse {
            error: message.to_string(),
        },
    )
}

fn not_found() -> Response<Full<Bytes>> {
    error_response(StatusCode::NOT_FOUND, "Not Found")
}
