//! Per-request dispatch.
//!
//! Order of interception: admin plane first, then route exclusions, then the
//! cache decision, then upstream forwarding with a conditional record. Flags
//! are read fresh on every request so an admin toggle applies from the next
//! request onward.

use super::forward;
use super::response_ext::ResponseExt;
use super::server::ProxyContext;
use crate::admin;
use crate::cache::{CacheEntry, CacheKey};
use crate::state::{decide, storable, Decision};
use chrono::Utc;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use hyper::{Method, Request, Response};
use std::convert::Infallible;
use tracing::{debug, warn};

/// Headers that describe the connection rather than the payload; never
/// recorded and never replayed.
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS.iter().any(|h| name.eq_ignore_ascii_case(h))
}

/// Handle one incoming request end to end.
pub async fn handle_request(
    ctx: &ProxyContext,
    req: Request<Incoming>,
) -> Result<Response<BoxBody<Bytes, hyper::Error>>, Infallible> {
    let path = req.uri().path().to_string();

    // Admin plane is intercepted before any matching, caching, or forwarding.
    if let Some(rest) = admin::strip_prefix(&path, &ctx.admin_prefix) {
        let response = admin::handle_request(req, rest, &ctx.store, &ctx.state).await;
        return Ok(response.into_boxed());
    }

    let method = req.method().clone();

    // Excluded routes bypass the cache entirely and stream straight through.
    if ctx.excluded.is_excluded(&method, &path) {
        debug!("Excluded route: {} {}", method, path);
        return Ok(stream_forward(ctx, req).await);
    }

    let playback = ctx.state.playback();
    let recording = ctx.state.recording();

    if !playback && !recording {
        // Neither cache reads nor writes can happen; no need to buffer.
        return Ok(stream_forward(ctx, req).await);
    }

    // Buffer the request body so the key can include a body digest.
    let (parts, body) = req.into_parts();
    let body_bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!("Failed to read request body: {e}");
            return Ok(forward::error_response(500, "Failed to read request body").into_boxed());
        }
    };

    let query = parts.uri.query().map(|q| q.to_string());
    let key = ctx
        .normalizer
        .normalize(method.as_str(), &path, query.as_deref(), &body_bytes);

    let cached = ctx.store.get(&key);
    let decision = decide(playback, recording, cached.is_some());

    if let (Decision::ServeCached, Some(entry)) = (decision, &cached) {
        debug!("Cache hit: {key}");
        return Ok(serve_cached(entry, &ctx.header_name));
    }

    match forward::forward_buffered(
        &ctx.client,
        method.clone(),
        &parts.uri,
        &parts.headers,
        body_bytes.clone(),
        &ctx.remote_base,
        ctx.timeout,
    )
    .await
    {
        Ok((resp_parts, resp_body)) => {
            if decision == Decision::ForwardAndRecord {
                let content_type = resp_parts
                    .headers
                    .get(CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok());
                if storable(ctx.state.cache_everything(), content_type) {
                    debug!("Recording: {key}");
                    ctx.store.put(build_entry(
                        key,
                        &method,
                        &path,
                        query,
                        body_bytes,
                        &resp_parts,
                        resp_body.clone(),
                    ));
                }
            }

            let mut response = Response::from_parts(resp_parts, Full::new(resp_body));
            response
                .headers_mut()
                .insert(ctx.header_name.clone(), HeaderValue::from_static("MISS"));
            Ok(response.into_boxed())
        }
        Err(err) => {
            warn!("Upstream error for {} {}: {err}", method, path);
            Ok(forward::gateway_response(&err).into_boxed())
        }
    }
}

/// Forward without touching the cache, streaming the response through.
async fn stream_forward(
    ctx: &ProxyContext,
    req: Request<Incoming>,
) -> Response<BoxBody<Bytes, hyper::Error>> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    match forward::forward_streaming(&ctx.client, req, &ctx.remote_base, ctx.timeout).await {
        Ok(mut response) => {
            response
                .headers_mut()
                .insert(ctx.header_name.clone(), HeaderValue::from_static("MISS"));
            response
        }
        Err(err) => {
            warn!("Upstream error for {} {}: {err}", method, path);
            forward::gateway_response(&err).into_boxed()
        }
    }
}

/// Rebuild a response from a stored entry. Hop-by-hop and length headers are
/// recomputed for the replayed body rather than restored.
fn serve_cached(
    entry: &CacheEntry,
    header_name: &HeaderName,
) -> Response<BoxBody<Bytes, hyper::Error>> {
    let mut builder = Response::builder().status(entry.status);

    for (name, value) in &entry.headers {
        if is_hop_by_hop(name) || name.eq_ignore_ascii_case(CONTENT_LENGTH.as_str()) {
            continue;
        }
        let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
            continue;
        };
        let Ok(value) = HeaderValue::from_str(value) else {
            continue;
        };
        builder = builder.header(name, value);
    }

    let mut response = builder
        .body(Full::new(entry.body.clone()))
        .unwrap_or_else(|_| Response::new(Full::new(entry.body.clone())));
    response
        .headers_mut()
        .insert(header_name.clone(), HeaderValue::from_static("HIT"));
    response.into_boxed()
}

fn build_entry(
    key: CacheKey,
    method: &Method,
    path: &str,
    query: Option<String>,
    request_body: Bytes,
    parts: &hyper::http::response::Parts,
    body: Bytes,
) -> CacheEntry {
    let headers = parts
        .headers
        .iter()
        .filter(|(name, _)| !is_hop_by_hop(name.as_str()))
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();

    CacheEntry {
        key,
        method: method.as_str().to_string(),
        path: path.to_string(),
        query,
        request_body,
        status: parts.status.as_u16(),
        headers,
        body,
        recorded_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::KeyNormalizer;

    fn sample_entry() -> CacheEntry {
        let normalizer = KeyNormalizer::new(&[]);
        CacheEntry {
            key: normalizer.normalize("GET", "/items", Some("id=5"), b""),
            method: "GET".to_string(),
            path: "/items".to_string(),
            query: Some("id=5".to_string()),
            request_body: Bytes::new(),
            status: 200,
            headers: vec![
                ("content-type".to_string(), "application/json".to_string()),
                ("content-length".to_string(), "999".to_string()),
                ("transfer-encoding".to_string(), "chunked".to_string()),
            ],
            body: Bytes::from_static(b"{\"a\":1}"),
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn test_is_hop_by_hop() {
        assert!(is_hop_by_hop("Connection"));
        assert!(is_hop_by_hop("transfer-encoding"));
        assert!(!is_hop_by_hop("content-type"));
    }

    #[test]
    fn test_serve_cached_marks_hit_and_restores_payload_headers() {
        let header_name = HeaderName::from_static("x-cache");
        let response = serve_cached(&sample_entry(), &header_name);

        assert_eq!(response.status(), 200);
        assert_eq!(response.headers().get("x-cache").unwrap(), "HIT");
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/json"
        );
        // Stale length and connection headers are not replayed.
        assert!(response.headers().get("content-length").is_none());
        assert!(response.headers().get("transfer-encoding").is_none());
    }
}
