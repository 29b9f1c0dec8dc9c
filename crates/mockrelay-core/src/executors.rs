//! Per-action-kind execution.
//!
//! Executors are stateless: each produces either an [`HttpResponse`]
//! directly (response family) or a [`PendingResponse`] from the outbound
//! client (forward family). Template rendering and callback invocation are
//! external collaborators behind trait seams; object callbacks additionally
//! receive the response writer because the remote peer owns response
//! completion.

use crate::client::{HttpClient, RemoteAddress};
use crate::config::CoreConfig;
use crate::error::{Error, Result};
use crate::expectation::{RequestOverride, Scheme, Template};
use crate::hop_by_hop;
use crate::message::{HttpRequest, HttpResponse};
use crate::scheduler::PendingResponse;
use crate::writer::ResponseWriter;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

/// Renders templates against an incoming request
#[async_trait::async_trait]
pub trait TemplateEngine: Send + Sync {
    /// Render a response from `template` and the incoming request
    async fn render_response(
        &self,
        template: &Template,
        request: &HttpRequest,
    ) -> Result<HttpResponse>;

    /// Render an outbound request from `template` and the incoming request
    async fn render_request(
        &self,
        template: &Template,
        request: &HttpRequest,
    ) -> Result<HttpRequest>;
}

/// Invokes named server-side callbacks
#[async_trait::async_trait]
pub trait CallbackRegistry: Send + Sync {
    /// Produce a response via the callback registered under `class_name`
    async fn response_callback(
        &self,
        class_name: &str,
        request: &HttpRequest,
    ) -> Result<HttpResponse>;

    /// Produce an outbound request via the callback registered under
    /// `class_name`
    async fn request_callback(
        &self,
        class_name: &str,
        request: &HttpRequest,
    ) -> Result<HttpRequest>;
}

/// Round-trips to remote callback handlers over a persistent channel.
///
/// The handler owns the full response lifecycle: it is given the writer and
/// must eventually complete (or abandon) the response itself.
#[async_trait::async_trait]
pub trait ObjectCallbackHandler: Send + Sync {
    /// Obtain a response from the remote handler identified by
    /// `callback_id` and write it
    async fn handle_response_callback(
        &self,
        callback_id: &str,
        request: HttpRequest,
        writer: Arc<dyn ResponseWriter>,
    );

    /// Have the remote handler produce a request, forward it, and write the
    /// origin's response
    async fn handle_forward_callback(
        &self,
        callback_id: &str,
        request: HttpRequest,
        writer: Arc<dyn ResponseWriter>,
    );
}

/// Placeholder [`TemplateEngine`] for servers with no engine wired up.
/// Every render fails with a template error, which the dispatcher logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredTemplates;

#[async_trait::async_trait]
impl TemplateEngine for UnconfiguredTemplates {
    async fn render_response(
        &self,
        _template: &Template,
        _request: &HttpRequest,
    ) -> Result<HttpResponse> {
        Err(Error::template("no template engine configured"))
    }

    async fn render_request(
        &self,
        _template: &Template,
        _request: &HttpRequest,
    ) -> Result<HttpRequest> {
        Err(Error::template("no template engine configured"))
    }
}

/// Placeholder [`ObjectCallbackHandler`] for servers with no callback
/// channel connected. Completes every callback with a 404 so clients do not
/// hang waiting on a peer that is not there.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredObjectCallbacks;

#[async_trait::async_trait]
impl ObjectCallbackHandler for UnconfiguredObjectCallbacks {
    async fn handle_response_callback(
        &self,
        callback_id: &str,
        request: HttpRequest,
        writer: Arc<dyn ResponseWriter>,
    ) {
        tracing::warn!(callback_id, "no object callback channel connected");
        writer
            .write_response(&request, HttpResponse::not_found())
            .await;
    }

    async fn handle_forward_callback(
        &self,
        callback_id: &str,
        request: HttpRequest,
        writer: Arc<dyn ResponseWriter>,
    ) {
        tracing::warn!(callback_id, "no object callback channel connected");
        writer
            .write_response(&request, HttpResponse::not_found())
            .await;
    }
}

type ResponseCallbackFn = dyn Fn(&HttpRequest) -> Result<HttpResponse> + Send + Sync;
type RequestCallbackFn = dyn Fn(&HttpRequest) -> Result<HttpRequest> + Send + Sync;

/// Callback registry holding closures registered by name
#[derive(Default)]
pub struct InMemoryCallbackRegistry {
    response_callbacks: RwLock<HashMap<String, Arc<ResponseCallbackFn>>>,
    request_callbacks: RwLock<HashMap<String, Arc<RequestCallbackFn>>>,
}

impl InMemoryCallbackRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a response-producing callback under `name`
    pub fn register_response_callback<F>(&self, name: impl Into<String>, callback: F)
    where
        F: Fn(&HttpRequest) -> Result<HttpResponse> + Send + Sync + 'static,
    {
        self.response_callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), Arc::new(callback));
    }

    /// Register a request-producing callback under `name`
    pub fn register_request_callback<F>(&self, name: impl Into<String>, callback: F)
    where
        F: Fn(&HttpRequest) -> Result<HttpRequest> + Send + Sync + 'static,
    {
        self.request_callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), Arc::new(callback));
    }
}

#[async_trait::async_trait]
impl CallbackRegistry for InMemoryCallbackRegistry {
    async fn response_callback(
        &self,
        class_name: &str,
        request: &HttpRequest,
    ) -> Result<HttpResponse> {
        let callback = self
            .response_callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(class_name)
            .cloned()
            .ok_or_else(|| {
                Error::callback(format!("no response callback registered under '{class_name}'"))
            })?;
        callback(request)
    }

    async fn request_callback(
        &self,
        class_name: &str,
        request: &HttpRequest,
    ) -> Result<HttpRequest> {
        let callback = self
            .request_callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(class_name)
            .cloned()
            .ok_or_else(|| {
                Error::callback(format!("no request callback registered under '{class_name}'"))
            })?;
        callback(request)
    }
}

/// Executors for all ten action kinds
#[derive(Clone)]
pub struct ActionExecutors {
    templates: Arc<dyn TemplateEngine>,
    callbacks: Arc<dyn CallbackRegistry>,
    object_callbacks: Arc<dyn ObjectCallbackHandler>,
    client: Arc<dyn HttpClient>,
    forward_timeout: Duration,
}

impl ActionExecutors {
    /// Wire up the executors against their collaborators
    pub fn new(
        templates: Arc<dyn TemplateEngine>,
        callbacks: Arc<dyn CallbackRegistry>,
        object_callbacks: Arc<dyn ObjectCallbackHandler>,
        client: Arc<dyn HttpClient>,
        config: &CoreConfig,
    ) -> Self {
        Self {
            templates,
            callbacks,
            object_callbacks,
            client,
            forward_timeout: config.socket_connection_timeout(),
        }
    }

    /// Render a response template against the request
    pub async fn render_response(
        &self,
        template: &Template,
        request: &HttpRequest,
    ) -> Result<HttpResponse> {
        self.templates.render_response(template, request).await
    }

    /// Produce a response via a named server-side callback
    pub async fn class_response(
        &self,
        class_name: &str,
        request: &HttpRequest,
    ) -> Result<HttpResponse> {
        self.callbacks.response_callback(class_name, request).await
    }

    /// Hand a response object callback its request and the writer
    pub async fn object_response(
        &self,
        callback_id: &str,
        request: HttpRequest,
        writer: Arc<dyn ResponseWriter>,
    ) {
        self.object_callbacks
            .handle_response_callback(callback_id, request, writer)
            .await;
    }

    /// Hand a forward object callback its request and the writer
    pub async fn object_forward(
        &self,
        callback_id: &str,
        request: HttpRequest,
        writer: Arc<dyn ResponseWriter>,
    ) {
        self.object_callbacks
            .handle_forward_callback(callback_id, request, writer)
            .await;
    }

    /// Forward the request verbatim (minus hop-by-hop headers) to the
    /// configured target
    pub fn forward(
        &self,
        request: &HttpRequest,
        host: &str,
        port: u16,
        scheme: Scheme,
    ) -> PendingResponse {
        let outbound = hop_by_hop::filter(request);
        let remote = RemoteAddress::new(scheme, host, port);
        self.client.send_request(outbound, remote, self.forward_timeout)
    }

    /// Forward a request computed by rendering a template
    pub async fn forward_template(
        &self,
        template: &Template,
        request: &HttpRequest,
    ) -> Result<PendingResponse> {
        let rendered = self.templates.render_request(template, request).await?;
        self.forward_to_request_target(rendered)
    }

    /// Forward a request produced by a named server-side callback
    pub async fn forward_class(
        &self,
        class_name: &str,
        request: &HttpRequest,
    ) -> Result<PendingResponse> {
        let produced = self.callbacks.request_callback(class_name, request).await?;
        self.forward_to_request_target(produced)
    }

    /// Forward the original request with field overrides applied
    pub fn forward_replace(
        &self,
        request: &HttpRequest,
        request_override: &RequestOverride,
    ) -> Result<PendingResponse> {
        let overridden = request_override.apply(request);
        let scheme = request_override.scheme.unwrap_or_default();
        let remote = match &request_override.host {
            Some(host) => RemoteAddress::new(
                scheme,
                host.clone(),
                request_override.port.unwrap_or_else(|| scheme.default_port()),
            ),
            None => target_from_host_header(&overridden, scheme)?,
        };
        let outbound = hop_by_hop::filter(&overridden);
        Ok(self.client.send_request(outbound, remote, self.forward_timeout))
    }

    fn forward_to_request_target(&self, produced: HttpRequest) -> Result<PendingResponse> {
        let remote = target_from_host_header(&produced, Scheme::Http)?;
        let outbound = hop_by_hop::filter(&produced);
        Ok(self.client.send_request(outbound, remote, self.forward_timeout))
    }
}

fn target_from_host_header(request: &HttpRequest, scheme: Scheme) -> Result<RemoteAddress> {
    request
        .host_header()
        .and_then(|host| RemoteAddress::from_host_header(host, scheme))
        .ok_or_else(|| Error::generic("forwarded request has no resolvable target host"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::HOST;
    use axum::http::{HeaderValue, Method, StatusCode, Uri};
    use std::sync::Mutex;

    struct RecordingClient {
        sent: Mutex<Vec<(HttpRequest, RemoteAddress, Duration)>>,
    }

    impl RecordingClient {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
            })
        }
    }

    impl HttpClient for RecordingClient {
        fn send_request(
            &self,
            request: HttpRequest,
            remote: RemoteAddress,
            timeout: Duration,
        ) -> PendingResponse {
            self.sent
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((request, remote, timeout));
            Box::pin(async { Ok(Some(HttpResponse::ok())) })
        }
    }

    struct NullTemplates;

    #[async_trait::async_trait]
    impl TemplateEngine for NullTemplates {
        async fn render_response(
            &self,
            _template: &Template,
            _request: &HttpRequest,
        ) -> Result<HttpResponse> {
            Ok(HttpResponse::ok())
        }

        async fn render_request(
            &self,
            template: &Template,
            request: &HttpRequest,
        ) -> Result<HttpRequest> {
            // render as "retarget to the host named in the template source"
            Ok(request.with_header(
                HOST,
                HeaderValue::from_str(&template.source)
                    .map_err(|e| Error::template(e.to_string()))?,
            ))
        }
    }

    struct NullObjectCallbacks;

    #[async_trait::async_trait]
    impl ObjectCallbackHandler for NullObjectCallbacks {
        async fn handle_response_callback(
            &self,
            _callback_id: &str,
            _request: HttpRequest,
            _writer: Arc<dyn ResponseWriter>,
        ) {
        }

        async fn handle_forward_callback(
            &self,
            _callback_id: &str,
            _request: HttpRequest,
            _writer: Arc<dyn ResponseWriter>,
        ) {
        }
    }

    fn executors(client: Arc<RecordingClient>) -> ActionExecutors {
        ActionExecutors::new(
            Arc::new(NullTemplates),
            Arc::new(InMemoryCallbackRegistry::new()),
            Arc::new(NullObjectCallbacks),
            client,
            &CoreConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_forward_strips_hop_by_hop_and_targets_origin() {
        let client = RecordingClient::new();
        let executors = executors(client.clone());

        let request = HttpRequest::new(Method::GET, Uri::from_static("/fwd")).with_header(
            axum::http::header::CONNECTION,
            HeaderValue::from_static("close"),
        );
        let pending = executors.forward(&request, "origin", 8080, Scheme::Http);
        pending.await.expect("forward completes");

        let sent = client.sent.lock().expect("lock").clone();
        let (outbound, remote, timeout) = &sent[0];
        assert!(outbound.header("connection").is_none());
        assert_eq!(remote, &RemoteAddress::new(Scheme::Http, "origin", 8080));
        assert_eq!(*timeout, CoreConfig::default().socket_connection_timeout());
    }

    #[tokio::test]
    async fn test_forward_template_targets_rendered_host() {
        let client = RecordingClient::new();
        let executors = executors(client.clone());

        let request = HttpRequest::new(Method::GET, Uri::from_static("/t"));
        let pending = executors
            .forward_template(&Template::new("rendered:9000"), &request)
            .await
            .expect("render succeeds");
        pending.await.expect("forward completes");

        let sent = client.sent.lock().expect("lock").clone();
        assert_eq!(sent[0].1, RemoteAddress::new(Scheme::Http, "rendered", 9000));
    }

    #[tokio::test]
    async fn test_forward_replace_prefers_override_target() {
        let client = RecordingClient::new();
        let executors = executors(client.clone());

        let request = HttpRequest::new(Method::GET, Uri::from_static("/r"))
            .with_header(HOST, HeaderValue::from_static("original:1"));
        let request_override = RequestOverride {
            host: Some("replaced".to_string()),
            port: Some(81),
            ..Default::default()
        };
        let pending = executors
            .forward_replace(&request, &request_override)
            .expect("target resolves");
        pending.await.expect("forward completes");

        let sent = client.sent.lock().expect("lock").clone();
        assert_eq!(sent[0].1, RemoteAddress::new(Scheme::Http, "replaced", 81));
    }

    #[tokio::test]
    async fn test_forward_replace_without_target_fails() {
        let client = RecordingClient::new();
        let executors = executors(client);

        let request = HttpRequest::new(Method::GET, Uri::from_static("/r"));
        assert!(executors
            .forward_replace(&request, &RequestOverride::default())
            .is_err());
    }

    #[tokio::test]
    async fn test_registry_dispatches_by_name() {
        let registry = InMemoryCallbackRegistry::new();
        registry.register_response_callback("teapot", |_request| {
            Ok(HttpResponse::new(StatusCode::IM_A_TEAPOT))
        });

        let request = HttpRequest::new(Method::GET, Uri::from_static("/"));
        let response = registry
            .response_callback("teapot", &request)
            .await
            .expect("registered callback runs");
        assert_eq!(response.status, StatusCode::IM_A_TEAPOT);

        assert!(registry.response_callback("missing", &request).await.is_err());
    }
}
