//! Hop-by-hop header stripping for forwarded requests

use crate::message::HttpRequest;
use axum::http::header::CONNECTION;
use axum::http::HeaderMap;

/// Headers scoped to a single HTTP hop, never propagated by a proxy
const HOP_BY_HOP_HEADERS: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Strip hop-by-hop headers from a request before forwarding.
///
/// Removes the standard hop-by-hop set plus any header named in the inbound
/// `Connection` header. Returns a new request; the input is unchanged.
pub fn filter(request: &HttpRequest) -> HttpRequest {
    let connection_named: Vec<String> = request
        .headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|name| name.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .collect();

    let mut filtered = HeaderMap::with_capacity(request.headers.len());
    for (name, value) in &request.headers {
        let lowered = name.as_str().to_ascii_lowercase();
        if HOP_BY_HOP_HEADERS.contains(&lowered.as_str()) || connection_named.contains(&lowered) {
            continue;
        }
        filtered.append(name.clone(), value.clone());
    }

    let mut cloned = request.clone();
    cloned.headers = filtered;
    cloned
}
