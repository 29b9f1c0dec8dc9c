//! Outbound HTTP client used for forwards and proxying.
//!
//! The dispatcher only depends on the [`HttpClient`] trait; the
//! [`OutboundClient`] implementation drives a shared `reqwest` client that
//! owns the connection pool for the life of the server process and honors
//! the configured upstream proxy.

use crate::config::UpstreamProxyConfig;
use crate::error::{Error, Result};
use crate::expectation::Scheme;
use crate::message::{HttpRequest, HttpResponse};
use crate::scheduler::PendingResponse;
use axum::http::header::HOST;
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

/// Resolved target of an outbound request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteAddress {
    /// Scheme used to reach the target
    pub scheme: Scheme,
    /// Target host
    pub host: String,
    /// Target port
    pub port: u16,
}

impl RemoteAddress {
    /// Create a remote address
    pub fn new(scheme: Scheme, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme,
            host: host.into(),
            port,
        }
    }

    /// Parse a `Host` header value (`host`, `host:port`, or a bracketed
    /// IPv6 literal), using the scheme's default port when none is given
    pub fn from_host_header(value: &str, scheme: Scheme) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }
        if let Some(rest) = value.strip_prefix('[') {
            // bracketed IPv6 literal: [::1] or [::1]:8080
            let (host, after) = rest.split_once(']')?;
            let port = match after.strip_prefix(':') {
                Some(port) => port.parse().ok()?,
                None if after.is_empty() => scheme.default_port(),
                None => return None,
            };
            return Some(Self::new(scheme, host, port));
        }
        match value.rsplit_once(':') {
            // a second colon means an unbracketed IPv6 literal, not a port
            Some((host, port)) if !host.is_empty() && !host.contains(':') => {
                let port = port.parse().ok()?;
                Some(Self::new(scheme, host, port))
            }
            Some((host, _)) if host.contains(':') => {
                Some(Self::new(scheme, value, scheme.default_port()))
            }
            _ => Some(Self::new(scheme, value, scheme.default_port())),
        }
    }

    /// Remote address of a socket captured by the transparent-proxy
    /// front-end
    pub fn from_socket(addr: SocketAddr, scheme: Scheme) -> Self {
        Self::new(scheme, addr.ip().to_string(), addr.port())
    }

    /// Base URL of the target, without a trailing slash. IPv6 hosts are
    /// bracketed.
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.scheme.as_str(), self.authority_host(), self.port)
    }

    fn authority_host(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        }
    }
}

impl fmt::Display for RemoteAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.authority_host(), self.port)
    }
}

/// Sends requests to an origin and yields pending responses
pub trait HttpClient: Send + Sync {
    /// Send `request` to `remote`, completing within `timeout`.
    ///
    /// The pending handle completes with the origin's response, `None` for
    /// an empty response, or a typed transport error.
    fn send_request(
        &self,
        request: HttpRequest,
        remote: RemoteAddress,
        timeout: Duration,
    ) -> PendingResponse;
}

/// `reqwest`-backed [`HttpClient`]. One shared instance per dispatcher;
/// the inner client manages its own connection pool.
#[derive(Debug, Clone)]
pub struct OutboundClient {
    client: reqwest::Client,
}

impl OutboundClient {
    /// Build a client, tunneling through `upstream_proxy` when configured
    pub fn new(upstream_proxy: Option<&UpstreamProxyConfig>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(config) = upstream_proxy {
            let mut proxy = reqwest::Proxy::all(config.url())
                .map_err(|e| Error::config(format!("invalid upstream proxy: {e}")))?;
            if let (Some(username), Some(password)) = (&config.username, &config.password) {
                proxy = proxy.basic_auth(username, password);
            }
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

impl HttpClient for OutboundClient {
    fn send_request(
        &self,
        request: HttpRequest,
        remote: RemoteAddress,
        timeout: Duration,
    ) -> PendingResponse {
        let client = self.client.clone();
        Box::pin(async move {
            let url = format!("{}{}", remote.base_url(), request.path_and_query());

            // The Host header is rewritten for the new target; everything
            // else passes through as received.
            let mut headers = request.headers.clone();
            headers.remove(HOST);

            let mut builder = client
                .request(request.method.clone(), &url)
                .headers(headers)
                .timeout(timeout);
            if !request.body.is_empty() {
                builder = builder.body(request.body.clone());
            }

            let response = builder.send().await.map_err(map_send_error)?;

            let status = response.status();
            let headers = response.headers().clone();
            let body = response
                .bytes()
                .await
                .map_err(|e| Error::communication(format!("failed to read response body: {e}")))?;

            let mut http_response = HttpResponse::new(status).with_body(body);
            http_response.headers = headers;
            Ok(Some(http_response))
        })
    }
}

fn map_send_error(error: reqwest::Error) -> Error {
    if error.is_timeout() {
        Error::connection_timeout(error.to_string())
    } else if error.is_connect() {
        Error::connection_refused(error.to_string())
    } else {
        Error::communication(error.to_string())
    }
}
