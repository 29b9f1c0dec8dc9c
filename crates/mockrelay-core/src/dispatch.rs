//! Top-level action dispatch.
//!
//! [`Dispatcher::process_action`] is the single entry point the HTTP
//! front-end calls per request: look up a matching expectation, branch on
//! its action kind, schedule the work under the action's delay, write the
//! response, and record the audit trail. Unmatched requests fall through to
//! CORS preflight handling, the transparent-proxy fallback, or a 404.
//!
//! The dispatcher is stateless per call and may be invoked concurrently
//! from any number of front-end connections.

use crate::audit::{AuditLog, EXPECTATION_NOT_MATCHED, EXPECTATION_RESPONSE, FORWARDED_REQUEST};
use crate::client::{HttpClient, RemoteAddress};
use crate::config::CoreConfig;
use crate::curl;
use crate::error::Error;
use crate::executors::ActionExecutors;
use crate::expectation::{
    Action, ErrorBehavior, Expectation, ExpectationMatcher, ResponseOverride, Scheme,
};
use crate::hop_by_hop;
use crate::message::{HttpRequest, HttpResponse};
use crate::scheduler::Scheduler;
use crate::writer::ResponseWriter;
use axum::http::{Method, StatusCode};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// Budget for exploratory proxy forwards. Kept short so a request aimed at
/// an unreachable host degrades to a 404 quickly instead of hanging the
/// client.
const EXPLORATORY_TIMEOUT: Duration = Duration::from_millis(1000);

/// Matches requests against the expectation store and executes the chosen
/// action
pub struct Dispatcher {
    matcher: Arc<dyn ExpectationMatcher>,
    executors: ActionExecutors,
    client: Arc<dyn HttpClient>,
    scheduler: Scheduler,
    audit: AuditLog,
    config: Arc<CoreConfig>,
}

impl Dispatcher {
    /// Wire up a dispatcher. `client` must be the same shared instance the
    /// executors forward through.
    pub fn new(
        matcher: Arc<dyn ExpectationMatcher>,
        executors: ActionExecutors,
        client: Arc<dyn HttpClient>,
        audit: AuditLog,
        config: CoreConfig,
    ) -> Self {
        Self {
            matcher,
            executors,
            client,
            scheduler: Scheduler::new(),
            audit,
            config: Arc::new(config),
        }
    }

    /// The audit log this dispatcher appends to
    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Process one incoming request.
    ///
    /// `original_destination` is the connection's original target when the
    /// transparent-proxy front-end captured one. `local_addresses` are the
    /// host names this server answers as; a foreign `Host` header triggers
    /// the exploratory proxy. With `synchronous` set, the call does not
    /// return until the response has been written (delays included);
    /// otherwise remaining work runs on the scheduler's workers.
    ///
    /// Never fails: every error is translated into a response, a channel
    /// fault, or a log entry.
    pub async fn process_action(
        &self,
        request: HttpRequest,
        writer: Arc<dyn ResponseWriter>,
        original_destination: Option<SocketAddr>,
        local_addresses: &[String],
        proxy_this_request: bool,
        synchronous: bool,
    ) {
        let expectation = self.matcher.first_matching(&request);

        // Loop guard: this request is our own exploratory probe coming back
        // around and must not recurse.
        if request.carries_sentinel() {
            self.return_not_found(&request, &writer).await;
            return;
        }

        if let Some(expectation) = expectation {
            self.dispatch_action(expectation, request, writer, synchronous).await;
            return;
        }

        if self.is_cors_preflight(&request) {
            // CORS headers themselves are applied by the response writer.
            writer.write_status(&request, StatusCode::OK).await;
            return;
        }

        let foreign_host = request.host_header().is_some_and(|host| {
            !local_addresses.iter().any(|local| local.eq_ignore_ascii_case(host))
        });
        if proxy_this_request || foreign_host {
            self.proxy_request(request, writer, original_destination, proxy_this_request, synchronous)
                .await;
            return;
        }

        self.return_not_found(&request, &writer).await;
    }

    async fn dispatch_action(
        &self,
        expectation: Expectation,
        request: HttpRequest,
        writer: Arc<dyn ResponseWriter>,
        synchronous: bool,
    ) {
        let Expectation { id, action, .. } = expectation;
        tracing::debug!(action = action.kind(), expectation = %id, "dispatching matched expectation");

        match action {
            Action::Response { response, delay } => {
                self.audit.append_expectation_match(request.clone(), id).await;
                self.scheduler
                    .schedule(delay.to_duration(), synchronous, async move {
                        writer.write_response(&request, response).await;
                        tracing::info!(
                            kind = EXPECTATION_RESPONSE,
                            "returned canned response for {} {}",
                            request.method,
                            request.path()
                        );
                    })
                    .await;
            }

            Action::ResponseTemplate { template, delay } => {
                self.audit.append_expectation_match(request.clone(), id).await;
                let executors = self.executors.clone();
                self.scheduler
                    .schedule(delay.to_duration(), synchronous, async move {
                        let rendered = executors.render_response(&template, &request).await;
                        match rendered {
                            Ok(response) => {
                                writer.write_response(&request, response).await;
                                tracing::info!(
                                    kind = EXPECTATION_RESPONSE,
                                    "returned templated response for {} {}",
                                    request.method,
                                    request.path()
                                );
                            }
                            Err(error) => {
                                tracing::error!(%error, "response template rendering failed");
                            }
                        }
                    })
                    .await;
            }

            Action::ResponseClassCallback { class_name } => {
                self.audit.append_expectation_match(request.clone(), id).await;
                let executors = self.executors.clone();
                self.scheduler
                    .submit(synchronous, async move {
                        let produced = executors.class_response(&class_name, &request).await;
                        match produced {
                            Ok(response) => {
                                writer.write_response(&request, response).await;
                                tracing::info!(
                                    kind = EXPECTATION_RESPONSE,
                                    "returned callback response for {} {}",
                                    request.method,
                                    request.path()
                                );
                            }
                            Err(error) => {
                                tracing::error!(%error, "response callback '{class_name}' failed");
                            }
                        }
                    })
                    .await;
            }

            Action::ResponseObjectCallback { callback_id } => {
                self.audit.append_expectation_match(request.clone(), id).await;
                let executors = self.executors.clone();
                // The remote handler owns response completion; hand it the
                // writer and step aside.
                self.scheduler
                    .submit(synchronous, async move {
                        executors.object_response(&callback_id, request, writer).await;
                    })
                    .await;
            }

            Action::Forward {
                host,
                port,
                scheme,
                delay,
            } => {
                // Plain forwards record the exchange once the origin
                // answers; no match entry is appended up front.
                let executors = self.executors.clone();
                let scheduler = self.scheduler;
                let audit = self.audit.clone();
                self.scheduler
                    .schedule(delay.to_duration(), synchronous, async move {
                        let pending = executors.forward(&request, &host, port, scheme);
                        scheduler
                            .submit_on_complete(pending, synchronous, move |result| {
                                forwarded_exchange_complete(result, request, writer, audit)
                            })
                            .await;
                    })
                    .await;
            }

            Action::ForwardTemplate { template, delay } => {
                let executors = self.executors.clone();
                let scheduler = self.scheduler;
                let audit = self.audit.clone();
                self.scheduler
                    .schedule(delay.to_duration(), synchronous, async move {
                        let rendered = executors.forward_template(&template, &request).await;
                        match rendered {
                            Ok(pending) => {
                                scheduler
                                    .submit_on_complete(pending, synchronous, move |result| {
                                        forwarded_exchange_complete(result, request, writer, audit)
                                    })
                                    .await;
                            }
                            Err(error) => {
                                tracing::error!(%error, "forward template rendering failed");
                            }
                        }
                    })
                    .await;
            }

            Action::ForwardClassCallback { class_name } => {
                self.audit.append_expectation_match(request.clone(), id).await;
                let executors = self.executors.clone();
                let scheduler = self.scheduler;
                self.scheduler
                    .submit(synchronous, async move {
                        let produced = executors.forward_class(&class_name, &request).await;
                        match produced {
                            Ok(pending) => {
                                scheduler
                                    .submit_on_complete(pending, synchronous, move |result| {
                                        matched_forward_complete(result, None, request, writer)
                                    })
                                    .await;
                            }
                            Err(error) => {
                                tracing::error!(%error, "forward callback '{class_name}' failed");
                            }
                        }
                    })
                    .await;
            }

            Action::ForwardObjectCallback { callback_id } => {
                self.audit.append_expectation_match(request.clone(), id).await;
                let executors = self.executors.clone();
                self.scheduler
                    .submit(synchronous, async move {
                        executors.object_forward(&callback_id, request, writer).await;
                    })
                    .await;
            }

            Action::ForwardReplace {
                request_override,
                response_override,
                delay,
            } => {
                self.audit.append_expectation_match(request.clone(), id).await;
                let executors = self.executors.clone();
                let scheduler = self.scheduler;
                self.scheduler
                    .schedule(delay.to_duration(), synchronous, async move {
                        let pending = executors.forward_replace(&request, &request_override);
                        match pending {
                            Ok(pending) => {
                                scheduler
                                    .submit_on_complete(pending, synchronous, move |result| {
                                        matched_forward_complete(
                                            result,
                                            response_override,
                                            request,
                                            writer,
                                        )
                                    })
                                    .await;
                            }
                            Err(error) => {
                                tracing::error!(%error, "forward with overrides failed to start");
                            }
                        }
                    })
                    .await;
            }

            Action::Error { behavior, delay } => {
                self.audit.append_expectation_match(request.clone(), id).await;
                self.scheduler
                    .schedule(delay.to_duration(), synchronous, async move {
                        match behavior {
                            ErrorBehavior::DropConnection => writer.close_connection().await,
                            ErrorBehavior::ResponseBytes(bytes) => writer.write_raw(bytes).await,
                        }
                        tracing::info!(
                            "emitted transport fault for {} {}",
                            request.method,
                            request.path()
                        );
                    })
                    .await;
            }
        }
    }

    /// Forward an unmatched request, either as the configured forward proxy
    /// or as a best-effort exploratory probe toward the named host
    async fn proxy_request(
        &self,
        request: HttpRequest,
        writer: Arc<dyn ResponseWriter>,
        original_destination: Option<SocketAddr>,
        explicit: bool,
        synchronous: bool,
    ) {
        let exploratory = !explicit;
        let mut outbound = hop_by_hop::filter(&request);
        if exploratory {
            // Mark the probe so we recognize our own mock answering on the
            // far side.
            outbound = outbound.with_sentinel();
        }

        let remote = match original_destination {
            Some(addr) => RemoteAddress::from_socket(addr, Scheme::Http),
            None => {
                let resolved = request
                    .host_header()
                    .and_then(|host| RemoteAddress::from_host_header(host, Scheme::Http));
                match resolved {
                    Some(remote) => remote,
                    None => {
                        self.return_not_found(&request, &writer).await;
                        return;
                    }
                }
            }
        };
        let timeout = if exploratory {
            EXPLORATORY_TIMEOUT
        } else {
            self.config.socket_connection_timeout()
        };

        tracing::debug!(%remote, exploratory, "proxying {} {}", request.method, request.path());
        let pending = self.client.send_request(outbound, remote, timeout);
        let audit = self.audit.clone();
        self.scheduler
            .submit_on_complete(pending, synchronous, move |result| {
                proxied_exchange_complete(result, request, writer, audit, exploratory)
            })
            .await;
    }

    /// Whether this is a CORS preflight the server should answer despite no
    /// expectation matching
    fn is_cors_preflight(&self, request: &HttpRequest) -> bool {
        if request.method != Method::OPTIONS
            || request.header("access-control-request-method").is_none()
        {
            return false;
        }
        self.config.enable_cors_for_all_responses
            || (self.config.enable_cors_for_api
                && request.path().starts_with(&self.config.api_path_prefix))
    }

    async fn return_not_found(&self, request: &HttpRequest, writer: &Arc<dyn ResponseWriter>) {
        write_not_found(request, writer, &self.audit).await;
    }
}

/// Write the 404 fallback. A request carrying the loop sentinel gets it
/// echoed back with no audit entry; anything else is recorded as unmatched.
async fn write_not_found(
    request: &HttpRequest,
    writer: &Arc<dyn ResponseWriter>,
    audit: &AuditLog,
) {
    if request.carries_sentinel() {
        writer
            .write_response(request, HttpResponse::not_found().with_sentinel())
            .await;
    } else {
        writer.write_response(request, HttpResponse::not_found()).await;
        audit.append_request_only(request.clone()).await;
        tracing::info!(
            kind = EXPECTATION_NOT_MATCHED,
            "no expectation matched {} {}",
            request.method,
            request.path()
        );
    }
}

/// Completion of a `Forward`/`ForwardTemplate` action: write the origin's
/// response and record the exchange
async fn forwarded_exchange_complete(
    result: crate::error::Result<Option<HttpResponse>>,
    request: HttpRequest,
    writer: Arc<dyn ResponseWriter>,
    audit: AuditLog,
) {
    match result {
        Ok(response) => {
            let response = response.unwrap_or_else(HttpResponse::not_found).without_sentinel();
            writer.write_response(&request, response.clone()).await;
            audit.append_request_response(request.clone(), response).await;
            tracing::info!(
                kind = FORWARDED_REQUEST,
                curl = %curl::to_curl(&request),
                "forwarded {} {}",
                request.method,
                request.path()
            );
        }
        Err(error) => {
            tracing::error!(%error, "forward failed for {} {}", request.method, request.path());
        }
    }
}

/// Completion of a matched callback/override forward: write the (possibly
/// transformed) response and log the match outcome
async fn matched_forward_complete(
    result: crate::error::Result<Option<HttpResponse>>,
    response_override: Option<ResponseOverride>,
    request: HttpRequest,
    writer: Arc<dyn ResponseWriter>,
) {
    match result {
        Ok(response) => {
            let mut response = response.unwrap_or_else(HttpResponse::not_found).without_sentinel();
            if let Some(response_override) = response_override {
                response = response_override.apply(response);
            }
            writer.write_response(&request, response).await;
            tracing::info!(
                kind = EXPECTATION_RESPONSE,
                "returned forwarded response for {} {}",
                request.method,
                request.path()
            );
        }
        Err(error) => {
            tracing::error!(%error, "forward failed for {} {}", request.method, request.path());
        }
    }
}

/// Completion of a proxy-fallback forward
async fn proxied_exchange_complete(
    result: crate::error::Result<Option<HttpResponse>>,
    request: HttpRequest,
    writer: Arc<dyn ResponseWriter>,
    audit: AuditLog,
    exploratory: bool,
) {
    match result {
        Ok(response) => {
            let response = response.unwrap_or_else(HttpResponse::not_found);
            let answered_by_ourselves = response.carries_sentinel();
            // The sentinel is an internal wire contract and never reaches
            // the client.
            let response = response.without_sentinel();
            writer.write_response(&request, response.clone()).await;
            if answered_by_ourselves {
                audit.append_request_only(request.clone()).await;
                tracing::info!(
                    kind = EXPECTATION_NOT_MATCHED,
                    "no expectation matched {} {} (forward reached this server)",
                    request.method,
                    request.path()
                );
            } else {
                audit.append_request_response(request.clone(), response).await;
                tracing::info!(
                    kind = FORWARDED_REQUEST,
                    curl = %curl::to_curl(&request),
                    "forwarded {} {}",
                    request.method,
                    request.path()
                );
            }
        }
        Err(error @ Error::Communication { .. }) => {
            tracing::warn!(%error, "proxy exchange failed, returning 404");
            write_not_found(&request, &writer, &audit).await;
        }
        Err(error) if exploratory && error.is_connection_error() => {
            // Quiet fallback: the named origin is unreachable and the
            // client's intent is unclear. Never retried.
            tracing::debug!(%error, "exploratory forward failed");
            write_not_found(&request, &writer, &audit).await;
        }
        Err(error) => {
            tracing::error!(%error, "proxy forward failed for {} {}", request.method, request.path());
        }
    }
}
