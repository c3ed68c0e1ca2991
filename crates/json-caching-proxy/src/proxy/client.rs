//! HTTP client creation and configuration.
//!
//! One pooled client is shared by every request the proxy forwards; the
//! remote base URL may be http or https.

use http_body_util::combinators::BoxBody;
use hyper::body::Bytes;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::time::Duration;
use tracing::debug;

/// Type alias for the HTTP client used to reach the remote server.
pub type HttpClient = Client<
    hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>,
    BoxBody<Bytes, hyper::Error>,
>;

/// Create the shared upstream client with connection pooling.
pub fn create_http_client(connect_timeout: Duration) -> HttpClient {
    let mut http_connector = hyper_util::client::legacy::connect::HttpConnector::new();
    http_connector.set_keepalive(Some(Duration::from_secs(60)));
    http_connector.set_connect_timeout(Some(connect_timeout));
    http_connector.enforce_http(false); // Allow both HTTP and HTTPS

    let https_connector = hyper_rustls::HttpsConnectorBuilder::new()
        .with_native_roots()
        .expect("Failed to load native root certificates")
        .https_or_http()
        .enable_http1()
        .wrap_connector(http_connector);

    let client = Client::builder(TokioExecutor::new())
        .pool_idle_timeout(Duration::from_secs(90))
        .pool_max_idle_per_host(32)
        .build(https_connector);

    debug!(
        "Upstream client configured (HTTP/1.1, connect timeout {:?})",
        connect_timeout
    );

    client
}
