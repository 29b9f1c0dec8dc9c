//! # MockRelay Core
//!
//! Action dispatch core for the MockRelay HTTP mock/proxy server.
//!
//! Clients configure the server with *expectations*: predicates over
//! incoming requests paired with an *action* describing how to respond.
//! This crate sits between the HTTP front-end and the outbound client and
//! does the rest:
//!
//! - **Matching**: look up the first expectation accepting the request
//! - **Execution**: ten action kinds, from canned responses to forwards
//!   with request/response overrides and transport-level faults
//! - **Scheduling**: delays and pending-response continuations, inline or
//!   on runtime workers
//! - **Proxy fallback**: transparent forwarding for unmatched requests,
//!   with loop detection for the exploratory mode
//! - **Audit**: a structured record of every matched, forwarded, or
//!   unmatched request
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use mockrelay_core::{
//!     Action, ActionExecutors, AuditLog, CoreConfig, Delay, Dispatcher, Expectation,
//!     ExpectationStore, HttpResponse, InMemoryCallbackRegistry, OutboundClient,
//!     RequestMatcher, Result, UnconfiguredObjectCallbacks, UnconfiguredTemplates,
//! };
//! use std::sync::Arc;
//!
//! fn build_dispatcher() -> Result<Dispatcher> {
//!     let store = Arc::new(ExpectationStore::new());
//!     store.add(Expectation::new(
//!         RequestMatcher::any().with_path("/health"),
//!         Action::Response {
//!             response: HttpResponse::ok().with_body("ok"),
//!             delay: Delay::none(),
//!         },
//!     ));
//!
//!     let config = CoreConfig::default();
//!     let client = Arc::new(OutboundClient::new(config.upstream_proxy.as_ref())?);
//!     let executors = ActionExecutors::new(
//!         Arc::new(UnconfiguredTemplates),
//!         Arc::new(InMemoryCallbackRegistry::new()),
//!         Arc::new(UnconfiguredObjectCallbacks),
//!         client.clone(),
//!         &config,
//!     );
//!
//!     Ok(Dispatcher::new(store, executors, client, AuditLog::default(), config))
//! }
//! ```
//!
//! The front-end then calls [`Dispatcher::process_action`] once per request
//! with its [`ResponseWriter`] for the connection.
//!
//! ## Key modules
//!
//! - [`expectation`]: expectations, matchers, and the action data model
//! - [`dispatch`]: the per-request dispatch routine and proxy fallback
//! - [`scheduler`]: delayed and continuation-based execution
//! - [`executors`]: per-action-kind execution and collaborator seams
//! - [`client`]: the outbound HTTP client contract and implementation
//! - [`audit`]: the structured audit log

pub mod audit;
pub mod client;
pub mod config;
pub mod curl;
pub mod dispatch;
pub mod error;
pub mod executors;
pub mod expectation;
pub mod hop_by_hop;
pub mod message;
pub mod scheduler;
pub mod writer;

pub use audit::{AuditEntry, AuditLog};
pub use client::{HttpClient, OutboundClient, RemoteAddress};
pub use config::{CoreConfig, UpstreamProxyConfig};
pub use dispatch::Dispatcher;
pub use error::{Error, Result};
pub use executors::{
    ActionExecutors, CallbackRegistry, InMemoryCallbackRegistry, ObjectCallbackHandler,
    TemplateEngine, UnconfiguredObjectCallbacks, UnconfiguredTemplates,
};
pub use expectation::{
    Action, Delay, ErrorBehavior, Expectation, ExpectationMatcher, ExpectationStore,
    RequestMatcher, RequestOverride, ResponseOverride, Scheme, Template, TimeUnit,
};
pub use message::{HttpRequest, HttpResponse, FORWARDED_BY_HEADER, FORWARDED_BY_VALUE};
pub use scheduler::{PendingResponse, Scheduler};
pub use writer::ResponseWriter;
