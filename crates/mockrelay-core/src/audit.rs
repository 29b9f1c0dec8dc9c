//! Audit log of matched, forwarded, and unmatched requests.
//!
//! Every request the dispatcher handles leaves a structured trail here in
//! addition to the tracing output. The log is an append-only bounded buffer;
//! order is preserved per request, while entries from concurrent requests
//! may interleave.

use crate::message::{HttpRequest, HttpResponse};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Log-message kind for a response served from a matched expectation
pub const EXPECTATION_RESPONSE: &str = "EXPECTATION_RESPONSE";
/// Log-message kind for a request no expectation matched
pub const EXPECTATION_NOT_MATCHED: &str = "EXPECTATION_NOT_MATCHED";
/// Log-message kind for a request forwarded to an origin
pub const FORWARDED_REQUEST: &str = "FORWARDED_REQUEST";

/// A structured audit entry. Timestamps are applied at append time.
#[derive(Debug, Clone)]
pub enum AuditEntry {
    /// A request that produced no response beyond the not-found fallback
    RequestOnly {
        /// Time of append
        timestamp: DateTime<Utc>,
        /// The recorded request
        request: HttpRequest,
    },
    /// A request together with the response sent for it
    RequestResponse {
        /// Time of append
        timestamp: DateTime<Utc>,
        /// The recorded request
        request: HttpRequest,
        /// The response written to the client
        response: HttpResponse,
    },
    /// A request accepted by an expectation's matcher
    ExpectationMatch {
        /// Time of append
        timestamp: DateTime<Utc>,
        /// The recorded request
        request: HttpRequest,
        /// Identity of the matched expectation
        expectation_id: Uuid,
    },
}

impl AuditEntry {
    /// Whether this is a request-only entry
    pub fn is_request_only(&self) -> bool {
        matches!(self, Self::RequestOnly { .. })
    }

    /// Whether this is a request/response entry
    pub fn is_request_response(&self) -> bool {
        matches!(self, Self::RequestResponse { .. })
    }

    /// Whether this is an expectation-match entry
    pub fn is_expectation_match(&self) -> bool {
        matches!(self, Self::ExpectationMatch { .. })
    }

    /// The recorded request
    pub fn request(&self) -> &HttpRequest {
        match self {
            Self::RequestOnly { request, .. }
            | Self::RequestResponse { request, .. }
            | Self::ExpectationMatch { request, .. } => request,
        }
    }
}

/// Append-only, internally synchronized audit log.
///
/// Cloning is cheap and shares the underlying buffer.
#[derive(Debug, Clone)]
pub struct AuditLog {
    entries: Arc<RwLock<VecDeque<AuditEntry>>>,
    max_entries: usize,
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new(1000) // keep last 1000 entries by default
    }
}

impl AuditLog {
    /// Create a log bounded to `max_entries`
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(VecDeque::new())),
            max_entries: max_entries.max(1),
        }
    }

    async fn append(&self, entry: AuditEntry) {
        let mut entries = self.entries.write().await;
        entries.push_back(entry);
        while entries.len() > self.max_entries {
            entries.pop_front();
        }
    }

    /// Append a request-only entry
    pub async fn append_request_only(&self, request: HttpRequest) {
        self.append(AuditEntry::RequestOnly {
            timestamp: Utc::now(),
            request,
        })
        .await;
    }

    /// Append a request/response entry
    pub async fn append_request_response(&self, request: HttpRequest, response: HttpResponse) {
        self.append(AuditEntry::RequestResponse {
            timestamp: Utc::now(),
            request,
            response,
        })
        .await;
    }

    /// Append an expectation-match entry
    pub async fn append_expectation_match(&self, request: HttpRequest, expectation_id: Uuid) {
        self.append(AuditEntry::ExpectationMatch {
            timestamp: Utc::now(),
            request,
            expectation_id,
        })
        .await;
    }

    /// Snapshot of all entries, oldest first
    pub async fn entries(&self) -> Vec<AuditEntry> {
        self.entries.read().await.iter().cloned().collect()
    }

    /// Number of entries currently held
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the log is empty
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Remove all entries
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{Method, Uri};

    fn request() -> HttpRequest {
        HttpRequest::new(Method::GET, Uri::from_static("/audited"))
    }

    #[tokio::test]
    async fn test_per_request_order_preserved() {
        let log = AuditLog::default();
        let id = Uuid::new_v4();

        log.append_expectation_match(request(), id).await;
        log.append_request_response(request(), HttpResponse::ok()).await;

        let entries = log.entries().await;
        assert_eq!(entries.len(), 2);
        assert!(entries[0].is_expectation_match());
        assert!(entries[1].is_request_response());
    }

    #[tokio::test]
    async fn test_bounded_capacity_drops_oldest() {
        let log = AuditLog::new(2);
        log.append_request_only(request()).await;
        log.append_expectation_match(request(), Uuid::new_v4()).await;
        log.append_request_response(request(), HttpResponse::ok()).await;

        let entries = log.entries().await;
        assert_eq!(entries.len(), 2);
        assert!(entries[0].is_expectation_match());
        assert!(entries[1].is_request_response());
    }

    #[tokio::test]
    async fn test_clear() {
        let log = AuditLog::default();
        log.append_request_only(request()).await;
        assert_eq!(log.len().await, 1);

        log.clear().await;
        assert!(log.is_empty().await);
    }

    #[tokio::test]
    async fn test_clones_share_the_buffer() {
        let log = AuditLog::default();
        let shared = log.clone();
        shared.append_request_only(request()).await;

        assert_eq!(log.len().await, 1);
    }
}
