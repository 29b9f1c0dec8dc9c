//! Expectations and the actions they trigger.
//!
//! An expectation pairs a request matcher with one of the ten action kinds
//! the dispatcher knows how to execute. The matching algorithm proper is an
//! external collaborator behind [`ExpectationMatcher`]; [`ExpectationStore`]
//! is the in-memory, first-match-wins reference implementation.

use crate::message::{HttpRequest, HttpResponse};
use axum::http::uri::PathAndQuery;
use axum::http::{HeaderName, HeaderValue, Method, StatusCode, Uri};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use uuid::Uuid;

/// Time unit for action delays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    /// Milliseconds
    #[default]
    Milliseconds,
    /// Seconds
    Seconds,
    /// Minutes
    Minutes,
    /// Hours
    Hours,
}

/// Delay applied before a response is written. A zero value means "inline".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delay {
    /// Unit of `value`
    pub unit: TimeUnit,
    /// Amount of time in `unit`s
    pub value: u64,
}

impl Default for Delay {
    fn default() -> Self {
        Self::none()
    }
}

impl Delay {
    /// Create a delay
    pub fn new(unit: TimeUnit, value: u64) -> Self {
        Self { unit, value }
    }

    /// No delay; the response is written inline
    pub fn none() -> Self {
        Self {
            unit: TimeUnit::Milliseconds,
            value: 0,
        }
    }

    /// Delay of `value` milliseconds
    pub fn milliseconds(value: u64) -> Self {
        Self::new(TimeUnit::Milliseconds, value)
    }

    /// Delay of `value` seconds
    pub fn seconds(value: u64) -> Self {
        Self::new(TimeUnit::Seconds, value)
    }

    /// Whether this delay is zero
    pub fn is_none(&self) -> bool {
        self.value == 0
    }

    /// Convert to a wall-clock duration
    pub fn to_duration(&self) -> Duration {
        match self.unit {
            TimeUnit::Milliseconds => Duration::from_millis(self.value),
            TimeUnit::Seconds => Duration::from_secs(self.value),
            TimeUnit::Minutes => Duration::from_secs(self.value.saturating_mul(60)),
            TimeUnit::Hours => Duration::from_secs(self.value.saturating_mul(3600)),
        }
    }
}

/// Scheme used to reach a forward target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    /// Plain HTTP
    #[default]
    Http,
    /// HTTP over TLS
    Https,
}

impl Scheme {
    /// Scheme as it appears in a URL
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }

    /// Default port for this scheme
    pub fn default_port(&self) -> u16 {
        match self {
            Self::Http => 80,
            Self::Https => 443,
        }
    }
}

/// Opaque template source rendered by an external [`TemplateEngine`].
///
/// [`TemplateEngine`]: crate::executors::TemplateEngine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    /// Template source text
    pub source: String,
}

impl Template {
    /// Create a template from source text
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

/// Transport-level fault produced instead of a response
#[derive(Debug, Clone)]
pub enum ErrorBehavior {
    /// Close the client connection without writing anything
    DropConnection,
    /// Write raw bytes to the channel in place of a valid response
    ResponseBytes(Bytes),
}

/// Field overrides applied to the original request before forwarding
#[derive(Debug, Clone, Default)]
pub struct RequestOverride {
    /// Replacement method
    pub method: Option<Method>,
    /// Replacement path (query string of the original URI is kept)
    pub path: Option<String>,
    /// Headers to set, replacing any existing values of the same name
    pub headers: Vec<(HeaderName, HeaderValue)>,
    /// Replacement body
    pub body: Option<Bytes>,
    /// Target host; the original `Host` header is used when absent
    pub host: Option<String>,
    /// Target port
    pub port: Option<u16>,
    /// Target scheme
    pub scheme: Option<Scheme>,
}

impl RequestOverride {
    /// Apply the overrides, returning a new request
    pub fn apply(&self, request: &HttpRequest) -> HttpRequest {
        let mut overridden = request.clone();
        if let Some(method) = &self.method {
            overridden.method = method.clone();
        }
        if let Some(path) = &self.path {
            overridden.uri = replace_path(&overridden.uri, path);
        }
        for (name, value) in &self.headers {
            overridden.headers.insert(name.clone(), value.clone());
        }
        if let Some(body) = &self.body {
            overridden.body = body.clone();
        }
        overridden
    }
}

/// Field overrides applied to a forwarded response before it is written
#[derive(Debug, Clone, Default)]
pub struct ResponseOverride {
    /// Replacement status code
    pub status: Option<StatusCode>,
    /// Headers to set, replacing any existing values of the same name
    pub headers: Vec<(HeaderName, HeaderValue)>,
    /// Replacement body
    pub body: Option<Bytes>,
}

impl ResponseOverride {
    /// Apply the overrides, returning the transformed response
    pub fn apply(&self, mut response: HttpResponse) -> HttpResponse {
        if let Some(status) = self.status {
            response.status = status;
        }
        for (name, value) in &self.headers {
            response.headers.insert(name.clone(), value.clone());
        }
        if let Some(body) = &self.body {
            response.body = body.clone();
        }
        response
    }
}

/// What the server does when an expectation matches
#[derive(Debug, Clone)]
pub enum Action {
    /// Return a canned response
    Response {
        /// The response to return
        response: HttpResponse,
        /// Delay before the response is written
        delay: Delay,
    },
    /// Render a template against the request to produce a response
    ResponseTemplate {
        /// Template producing the response
        template: Template,
        /// Delay before the response is written
        delay: Delay,
    },
    /// Invoke a named server-side callback to produce a response
    ResponseClassCallback {
        /// Registered callback name
        class_name: String,
    },
    /// Round-trip to a remote callback handler that owns response completion
    ResponseObjectCallback {
        /// Identity of the remote callback handler
        callback_id: String,
    },
    /// Forward the request verbatim (minus hop-by-hop headers) to an origin
    Forward {
        /// Target host
        host: String,
        /// Target port
        port: u16,
        /// Target scheme
        scheme: Scheme,
        /// Delay before the forward is attempted
        delay: Delay,
    },
    /// Forward a request computed by rendering a template
    ForwardTemplate {
        /// Template producing the outbound request
        template: Template,
        /// Delay before the forward is attempted
        delay: Delay,
    },
    /// Forward a request produced by a named server-side callback
    ForwardClassCallback {
        /// Registered callback name
        class_name: String,
    },
    /// Forward a request produced by a remote callback handler
    ForwardObjectCallback {
        /// Identity of the remote callback handler
        callback_id: String,
    },
    /// Forward the original request with field overrides applied
    ForwardReplace {
        /// Overrides applied to the outbound request
        request_override: RequestOverride,
        /// Optional transformation of the origin's response
        response_override: Option<ResponseOverride>,
        /// Delay before the forward is attempted
        delay: Delay,
    },
    /// Produce a transport-level fault instead of a response
    Error {
        /// The fault to produce
        behavior: ErrorBehavior,
        /// Delay before the fault is produced
        delay: Delay,
    },
}

impl Action {
    /// Short name of this action kind, for log lines
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Response { .. } => "response",
            Self::ResponseTemplate { .. } => "response_template",
            Self::ResponseClassCallback { .. } => "response_class_callback",
            Self::ResponseObjectCallback { .. } => "response_object_callback",
            Self::Forward { .. } => "forward",
            Self::ForwardTemplate { .. } => "forward_template",
            Self::ForwardClassCallback { .. } => "forward_class_callback",
            Self::ForwardObjectCallback { .. } => "forward_object_callback",
            Self::ForwardReplace { .. } => "forward_replace",
            Self::Error { .. } => "error",
        }
    }
}

/// A matcher plus the action executed when the matcher accepts a request
#[derive(Debug, Clone)]
pub struct Expectation {
    /// Opaque identity of this expectation
    pub id: Uuid,
    /// Predicate over incoming requests
    pub matcher: RequestMatcher,
    /// Action executed on a match
    pub action: Action,
}

impl Expectation {
    /// Create an expectation with a fresh identity
    pub fn new(matcher: RequestMatcher, action: Action) -> Self {
        Self {
            id: Uuid::new_v4(),
            matcher,
            action,
        }
    }
}

/// Predicate over incoming requests. Empty fields match anything.
#[derive(Debug, Clone, Default)]
pub struct RequestMatcher {
    /// Required method
    pub method: Option<Method>,
    /// Required path; `*` matches any single segment
    pub path: Option<String>,
    /// Required header name/value pairs
    pub headers: Vec<(String, String)>,
}

impl RequestMatcher {
    /// Matcher accepting every request
    pub fn any() -> Self {
        Self::default()
    }

    /// Require a method
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Require a path pattern
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Require a header to be present with the given value
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Whether this matcher accepts the request
    pub fn matches(&self, request: &HttpRequest) -> bool {
        if let Some(method) = &self.method {
            if request.method != *method {
                return false;
            }
        }
        if let Some(pattern) = &self.path {
            if !matches_path(pattern, request.path()) {
                return false;
            }
        }
        self.headers
            .iter()
            .all(|(name, value)| request.header(name) == Some(value.as_str()))
    }
}

/// Check if a path matches a pattern (`*` matches any segment)
fn matches_path(pattern: &str, path: &str) -> bool {
    if pattern == path {
        return true;
    }

    if pattern.contains('*') {
        let pattern_parts: Vec<&str> = pattern.split('/').collect();
        let path_parts: Vec<&str> = path.split('/').collect();

        if pattern_parts.len() != path_parts.len() {
            return false;
        }

        for (pattern_part, path_part) in pattern_parts.iter().zip(path_parts.iter()) {
            if *pattern_part != "*" && *pattern_part != *path_part {
                return false;
            }
        }
        return true;
    }

    false
}

/// Looks up the first expectation whose matcher accepts a request
pub trait ExpectationMatcher: Send + Sync {
    /// First matching expectation, or `None`
    fn first_matching(&self, request: &HttpRequest) -> Option<Expectation>;
}

/// In-memory expectation store, first match wins in insertion order.
///
/// Read-mostly; writes only happen when expectations are configured.
#[derive(Debug, Default)]
pub struct ExpectationStore {
    expectations: RwLock<Vec<Expectation>>,
}

impl ExpectationStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an expectation, returning its identity
    pub fn add(&self, expectation: Expectation) -> Uuid {
        let id = expectation.id;
        self.expectations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(expectation);
        id
    }

    /// Remove the expectation with the given identity
    pub fn remove(&self, id: Uuid) -> bool {
        let mut expectations = self
            .expectations
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = expectations.len();
        expectations.retain(|e| e.id != id);
        expectations.len() != before
    }

    /// Remove all expectations
    pub fn clear(&self) {
        self.expectations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl ExpectationMatcher for ExpectationStore {
    fn first_matching(&self, request: &HttpRequest) -> Option<Expectation> {
        self.expectations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|e| e.matcher.matches(request))
            .cloned()
    }
}

fn replace_path(uri: &Uri, path: &str) -> Uri {
    let replacement = match uri.query() {
        Some(query) => format!("{path}?{query}"),
        None => path.to_string(),
    };
    let mut parts = uri.clone().into_parts();
    parts.path_and_query = replacement.parse::<PathAndQuery>().ok();
    Uri::from_parts(parts).unwrap_or_else(|_| uri.clone())
}
