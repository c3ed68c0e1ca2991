//! Upstream request forwarding.
//!
//! Rewrites the target host to the configured remote base URL, preserving
//! method, headers, and body. Network failures and timeouts surface as
//! [`UpstreamError`]; the handler maps them to gateway-style responses and
//! never touches the cache.

use super::client::HttpClient;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::http::response::Parts;
use hyper::{HeaderMap, Method, Request, Response, Uri};
use std::convert::Infallible;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Failure to obtain a response from the remote server.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("upstream request failed: {0}")]
    Request(#[from] hyper_util::client::legacy::Error),
    #[error("upstream did not respond within {0:?}")]
    Timeout(Duration),
    #[error("failed to read upstream response body: {0}")]
    Body(#[source] hyper::Error),
}

/// Helper function to create a JSON error response.
pub fn error_response(status: u16, message: &str) -> Response<Full<Bytes>> {
    let body = format!(r#"{{"error": "{message}"}}"#);
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())))
}

/// Map an upstream failure to the gateway-style response sent to the client.
pub fn gateway_response(err: &UpstreamError) -> Response<Full<Bytes>> {
    match err {
        UpstreamError::Timeout(_) => error_response(504, "Gateway Timeout"),
        _ => error_response(502, "Bad Gateway"),
    }
}

/// Forward a request with a pre-collected body, returning the response parts
/// and fully buffered body so the caller can record it.
pub async fn forward_buffered(
    client: &HttpClient,
    method: Method,
    uri: &Uri,
    headers: &HeaderMap,
    body: Bytes,
    remote_base: &str,
    timeout: Duration,
) -> Result<(Parts, Bytes), UpstreamError> {
    let upstream_req = build_upstream_request(method, uri, headers, full_body(body), remote_base);

    let response = tokio::time::timeout(timeout, client.request(upstream_req))
        .await
        .map_err(|_| UpstreamError::Timeout(timeout))??;

    let (parts, body) = response.into_parts();
    let body = tokio::time::timeout(timeout, body.collect())
        .await
        .map_err(|_| UpstreamError::Timeout(timeout))?
        .map_err(UpstreamError::Body)?
        .to_bytes();

    Ok((parts, body))
}

/// Forward a request without buffering, streaming the upstream response body
/// back as it is received. The timeout bounds the wait for response headers;
/// the body then streams on the client's own pace.
pub async fn forward_streaming(
    client: &HttpClient,
    req: Request<Incoming>,
    remote_base: &str,
    timeout: Duration,
) -> Result<Response<BoxBody<Bytes, hyper::Error>>, UpstreamError> {
    let (parts, body) = req.into_parts();
    let upstream_req = build_upstream_request(
        parts.method,
        &parts.uri,
        &parts.headers,
        BoxBody::new(body),
        remote_base,
    );

    let response = tokio::time::timeout(timeout, client.request(upstream_req))
        .await
        .map_err(|_| UpstreamError::Timeout(timeout))??;

    Ok(response.map(BoxBody::new))
}

fn full_body(bytes: Bytes) -> BoxBody<Bytes, hyper::Error> {
    BoxBody::new(Full::new(bytes).map_err(|never: Infallible| match never {}))
}

fn build_upstream_request(
    method: Method,
    uri: &Uri,
    headers: &HeaderMap,
    body: BoxBody<Bytes, hyper::Error>,
    remote_base: &str,
) -> Request<BoxBody<Bytes, hyper::Error>> {
    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    let full_uri = format!("{remote_base}{path_and_query}");

    debug!("Forwarding to: {}", full_uri);

    let mut builder = Request::builder().method(method).uri(full_uri);

    // Copy headers; host is dropped so the connector sets the upstream host.
    for (key, value) in headers.iter() {
        if key != "host" {
            builder = builder.header(key, value);
        }
    }

    builder.body(body).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_shape() {
        let response = error_response(502, "Bad Gateway");
        assert_eq!(response.status(), 502);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/json"
        );
    }

    #[test]
    fn test_gateway_response_maps_timeout_to_504() {
        let err = UpstreamError::Timeout(Duration::from_secs(30));
        assert_eq!(gateway_response(&err).status(), 504);
    }

    #[test]
    fn test_upstream_error_display() {
        let err = UpstreamError::Timeout(Duration::from_secs(5));
        assert!(err.to_string().contains("did not respond"));
    }
}
