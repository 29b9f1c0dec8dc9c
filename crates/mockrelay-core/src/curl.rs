//! Render a request as a `curl` command for diagnostics.
//!
//! Used in the forwarded-request log line so a failing forward can be
//! replayed by hand.

use crate::message::HttpRequest;
use axum::http::Method;

/// Render `request` as a `curl` command.
///
/// The target host comes from the `Host` header, falling back to the remote
/// socket captured with the request. Without either there is nothing to
/// point curl at and a placeholder message is returned instead.
pub fn to_curl(request: &HttpRequest) -> String {
    let host = request
        .host_header()
        .map(ToString::to_string)
        .or_else(|| request.remote_address.map(|addr| addr.to_string()));

    let Some(host) = host else {
        return "no host header or remote address to render a curl command".to_string();
    };

    let mut command = format!("curl -v '{}'", quote(&format!("http://{}{}", host, request.path_and_query())));
    if request.method != Method::GET {
        command.push_str(&format!(" -X {}", request.method));
    }
    for (name, value) in &request.headers {
        if let Ok(value) = value.to_str() {
            command.push_str(&format!(" -H '{}'", quote(&format!("{name}: {value}"))));
        }
    }
    if !request.body.is_empty() {
        let body = String::from_utf8_lossy(&request.body);
        command.push_str(&format!(" --data '{}'", quote(&body)));
    }
    command
}

/// Escape embedded single quotes for a single-quoted shell string
fn quote(text: &str) -> String {
    text.replace('\'', "'\\''")
}
