//! Response writing seam between the dispatcher and the HTTP front-end

use crate::message::{HttpRequest, HttpResponse};
use axum::http::StatusCode;
use bytes::Bytes;

/// Writes responses back to the client channel.
///
/// Supplied by the front-end per connection. A writer accepts at most one
/// `write_response`/`write_status` call per request; the front-end is
/// responsible for serializing writes on the underlying channel and for
/// turning late writes on a closed channel into no-ops.
#[async_trait::async_trait]
pub trait ResponseWriter: Send + Sync {
    /// Write a full response for `request`
    async fn write_response(&self, request: &HttpRequest, response: HttpResponse);

    /// Write an empty response with the given status
    async fn write_status(&self, request: &HttpRequest, status: StatusCode) {
        self.write_response(request, HttpResponse::new(status)).await;
    }

    /// Write raw bytes to the channel in place of a valid response
    async fn write_raw(&self, bytes: Bytes);

    /// Close the client connection without writing anything further
    async fn close_connection(&self);
}
