//! HTTP transport for agent-trace.

pub mod error;
pub mod handlers;

use std::sync::Arc;
use std::time::Duration;

use agenttrace_core::TokenAccountant;
use agenttrace_monitor::{CallContext, IngestionPipeline, QueryEngine, TraceStore};
use axum::body::Body;
use axum::http::{HeaderName, Request, Response};
use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

const REQUEST_ID_HEADER: &str = "x-request-id";

pub struct ServerState {
    pub ingest: IngestionPipeline,
    pub query: QueryEngine,
    pub request_timeout: Duration,
}

impl ServerState {
    pub fn new(accountant: TokenAccountant, store: Arc<dyn TraceStore>, request_timeout: Duration) -> Self {
        Self {
            ingest: IngestionPipeline::new(accountant, Arc::clone(&store)),
            query: QueryEngine::new(store),
            request_timeout,
        }
    }

    /// Fresh per-request context bounded by the request timeout.
    pub fn call_context(&self) -> CallContext {
        CallContext::with_timeout(self.request_timeout)
    }
}

/// Builds the application router with request-id and request logging layers.
pub fn build_router(state: Arc<ServerState>) -> Router {
    let request_id_header = HeaderName::from_static(REQUEST_ID_HEADER);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|req: &Request<Body>| {
            let request_id = req
                .headers()
                .get(REQUEST_ID_HEADER)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("-");
            tracing::info_span!(
                "request",
                method = %req.method(),
                path = %req.uri().path(),
                request_id = %request_id,
            )
        })
        .on_response(|res: &Response<Body>, latency: Duration, _span: &tracing::Span| {
            info!(
                latency = %format!("{} ms", latency.as_millis()),
                status = %res.status().as_u16(),
                "finished processing request"
            );
        });

    let api = Router::new()
        .route("/traces", get(handlers::traces::list).post(handlers::traces::create))
        .route("/traces/{id}", get(handlers::traces::get));

    Router::new()
        .nest("/api", api)
        .route("/health", get(handlers::health))
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(trace_layer)
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .layer(cors)
        .with_state(state)
}
