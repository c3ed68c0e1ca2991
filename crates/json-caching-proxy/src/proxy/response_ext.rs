//! Response extension traits for common transformations.

use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::Response;
use std::convert::Infallible;

/// Extension trait for `Response<Full<Bytes>>`.
pub trait ResponseExt {
    /// Convert the response body into the boxed body type handlers return.
    fn into_boxed(self) -> Response<BoxBody<Bytes, hyper::Error>>;
}

impl ResponseExt for Response<Full<Bytes>> {
    fn into_boxed(self) -> Response<BoxBody<Bytes, hyper::Error>> {
        self.map(|b| BoxBody::new(b.map_err(|never: Infallible| match never {})))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_boxed_preserves_status_and_headers() {
        let response = Response::builder()
            .status(404)
            .header("x-custom", "value")
            .body(Full::new(Bytes::from("not found")))
            .unwrap();

        let boxed = response.into_boxed();
        assert_eq!(boxed.status(), 404);
        assert_eq!(boxed.headers().get("x-custom").unwrap(), "value");
    }
}
