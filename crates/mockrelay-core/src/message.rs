//! HTTP request/response values exchanged between the front-end, the
//! dispatcher, and the outbound client

use axum::http::header::HOST;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use bytes::Bytes;
use std::net::SocketAddr;

/// Name of the loop-detection header added to exploratory proxy requests
pub const FORWARDED_BY_HEADER: &str = "x-forwarded-by";

/// Value written to the loop-detection header (exact-case on write,
/// case-insensitive on read)
pub const FORWARDED_BY_VALUE: &str = "MockServer";

/// An incoming HTTP request as seen by the dispatcher.
///
/// Headers are a case-insensitive multi-map that preserves the order of
/// duplicate values. The value is immutable once constructed, except via
/// [`HttpRequest::with_header`] which returns a modified clone.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// Request method
    pub method: Method,
    /// Request URI (origin-form for requests received by the server)
    pub uri: Uri,
    /// Request headers
    pub headers: HeaderMap,
    /// Opaque request body (content type travels in the headers)
    pub body: Bytes,
    /// Socket address of the peer that sent the request, when known
    pub remote_address: Option<SocketAddr>,
}

impl HttpRequest {
    /// Create a new request with empty headers and body
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            remote_address: None,
        }
    }

    /// Return a clone of this request with one additional header appended
    pub fn with_header(&self, name: HeaderName, value: HeaderValue) -> Self {
        let mut cloned = self.clone();
        cloned.headers.append(name, value);
        cloned
    }

    /// Set the request body
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Set the peer socket address
    pub fn with_remote_address(mut self, addr: SocketAddr) -> Self {
        self.remote_address = Some(addr);
        self
    }

    /// First value of the named header, if present and valid UTF-8
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Value of the `Host` header, if present and non-empty
    pub fn host_header(&self) -> Option<&str> {
        self.headers
            .get(HOST)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
    }

    /// Request path
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Path plus query string, as sent on the wire
    pub fn path_and_query(&self) -> &str {
        self.uri
            .path_and_query()
            .map_or_else(|| self.uri.path(), |pq| pq.as_str())
    }

    /// Whether this request carries the loop-detection sentinel.
    ///
    /// The sentinel marks a request the server sent to itself through the
    /// exploratory proxy; it must never be dispatched against expectations
    /// again.
    pub fn carries_sentinel(&self) -> bool {
        header_value_matches(&self.headers, FORWARDED_BY_HEADER, FORWARDED_BY_VALUE)
    }

    /// Return a clone of this request with the loop-detection sentinel set
    pub fn with_sentinel(&self) -> Self {
        self.with_header(
            HeaderName::from_static(FORWARDED_BY_HEADER),
            HeaderValue::from_static(FORWARDED_BY_VALUE),
        )
    }
}

/// An HTTP response produced by an action, a callback, or a forwarded
/// origin. Immutable; builder methods consume and return the value.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Response status code
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Response body
    pub body: Bytes,
}

impl HttpResponse {
    /// Create an empty response with the given status
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// A `200 OK` response with no body
    pub fn ok() -> Self {
        Self::new(StatusCode::OK)
    }

    /// The `404 Not Found` response written for unmatched requests
    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND)
    }

    /// Append a header
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Set the response body
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// First value of the named header, if present and valid UTF-8
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Whether this response carries the loop-detection sentinel, meaning
    /// the forwarded request was answered by this server itself
    pub fn carries_sentinel(&self) -> bool {
        header_value_matches(&self.headers, FORWARDED_BY_HEADER, FORWARDED_BY_VALUE)
    }

    /// Append the loop-detection sentinel so the exploratory sender can
    /// recognize its own mock on the far side
    pub fn with_sentinel(self) -> Self {
        self.with_header(
            HeaderName::from_static(FORWARDED_BY_HEADER),
            HeaderValue::from_static(FORWARDED_BY_VALUE),
        )
    }

    /// Remove the loop-detection sentinel. Forwarded responses never carry
    /// it on the wire to the client.
    pub fn without_sentinel(mut self) -> Self {
        self.headers.remove(FORWARDED_BY_HEADER);
        self
    }
}

fn header_value_matches(headers: &HeaderMap, name: &str, expected: &str) -> bool {
    headers
        .get_all(name)
        .iter()
        .any(|v| v.to_str().is_ok_and(|v| v.eq_ignore_ascii_case(expected)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_header_clones() {
        let request = HttpRequest::new(Method::GET, Uri::from_static("/a"));
        let tagged = request.with_header(
            HeaderName::from_static("x-test"),
            HeaderValue::from_static("1"),
        );

        assert!(request.header("x-test").is_none());
        assert_eq!(tagged.header("x-test"), Some("1"));
    }

    #[test]
    fn test_sentinel_read_is_case_insensitive() {
        let request = HttpRequest::new(Method::GET, Uri::from_static("/a")).with_header(
            HeaderName::from_static(FORWARDED_BY_HEADER),
            HeaderValue::from_static("mockserver"),
        );

        assert!(request.carries_sentinel());
    }

    #[test]
    fn test_sentinel_write_is_exact_case() {
        let request = HttpRequest::new(Method::GET, Uri::from_static("/a")).with_sentinel();
        assert_eq!(request.header(FORWARDED_BY_HEADER), Some(FORWARDED_BY_VALUE));
    }

    #[test]
    fn test_duplicate_headers_preserved_in_order() {
        let request = HttpRequest::new(Method::GET, Uri::from_static("/a"))
            .with_header(
                HeaderName::from_static("x-multi"),
                HeaderValue::from_static("first"),
            )
            .with_header(
                HeaderName::from_static("x-multi"),
                HeaderValue::from_static("second"),
            );

        let values: Vec<_> = request.headers.get_all("x-multi").iter().collect();
        assert_eq!(values, vec!["first", "second"]);
    }

    #[test]
    fn test_host_header_empty_is_none() {
        let request = HttpRequest::new(Method::GET, Uri::from_static("/a"))
            .with_header(HOST, HeaderValue::from_static(""));
        assert!(request.host_header().is_none());
    }

    #[test]
    fn test_response_without_sentinel() {
        let response = HttpResponse::ok().with_sentinel();
        assert!(response.carries_sentinel());

        let cleaned = response.without_sentinel();
        assert!(!cleaned.carries_sentinel());
    }

    #[test]
    fn test_path_and_query() {
        let request = HttpRequest::new(Method::GET, Uri::from_static("/a/b?x=1"));
        assert_eq!(request.path(), "/a/b");
        assert_eq!(request.path_and_query(), "/a/b?x=1");
    }
}
